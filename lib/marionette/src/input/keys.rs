//! Named-key resolution.
//!
//! Maps lowercased key names to engine keycodes. Single-character names that
//! miss the table fall back to their ASCII uppercase scalar, which covers
//! letters, digits and plain punctuation in one rule.

use hashbrown::HashMap;
use lazy_static::lazy_static;
use strand::contract::keys;

lazy_static! {
    static ref KEY_TABLE: HashMap<&'static str, u32> = {
        let mut table = HashMap::new();

        // Whitespace & editing
        table.insert("space", keys::SPACE);
        table.insert("spacebar", keys::SPACE);
        table.insert("enter", keys::ENTER);
        table.insert("return", keys::ENTER);
        table.insert("tab", keys::TAB);
        table.insert("backspace", keys::BACKSPACE);
        table.insert("delete", keys::DELETE);
        table.insert("del", keys::DELETE);
        table.insert("insert", keys::INSERT);
        table.insert("escape", keys::ESCAPE);
        table.insert("esc", keys::ESCAPE);

        // Navigation
        table.insert("home", keys::HOME);
        table.insert("end", keys::END);
        table.insert("pageup", keys::PAGE_UP);
        table.insert("page_up", keys::PAGE_UP);
        table.insert("pagedown", keys::PAGE_DOWN);
        table.insert("page_down", keys::PAGE_DOWN);
        table.insert("left", keys::LEFT);
        table.insert("up", keys::UP);
        table.insert("right", keys::RIGHT);
        table.insert("down", keys::DOWN);

        // Modifiers, including the platform super-key aliases
        table.insert("shift", keys::SHIFT);
        table.insert("ctrl", keys::CTRL);
        table.insert("control", keys::CTRL);
        table.insert("alt", keys::ALT);
        table.insert("meta", keys::META);
        table.insert("super", keys::META);
        table.insert("win", keys::META);
        table.insert("cmd", keys::META);
        table.insert("command", keys::META);

        // Locks & misc
        table.insert("capslock", keys::CAPS_LOCK);
        table.insert("caps_lock", keys::CAPS_LOCK);
        table.insert("numlock", keys::NUM_LOCK);
        table.insert("num_lock", keys::NUM_LOCK);
        table.insert("scrolllock", keys::SCROLL_LOCK);
        table.insert("scroll_lock", keys::SCROLL_LOCK);
        table.insert("pause", keys::PAUSE);
        table.insert("printscreen", keys::PRINT_SCREEN);
        table.insert("menu", keys::MENU);

        // Function keys
        table.insert("f1", keys::F1);
        table.insert("f2", keys::F2);
        table.insert("f3", keys::F3);
        table.insert("f4", keys::F4);
        table.insert("f5", keys::F5);
        table.insert("f6", keys::F6);
        table.insert("f7", keys::F7);
        table.insert("f8", keys::F8);
        table.insert("f9", keys::F9);
        table.insert("f10", keys::F10);
        table.insert("f11", keys::F11);
        table.insert("f12", keys::F12);

        // Punctuation by name
        table.insert("minus", b'-' as u32);
        table.insert("equals", b'=' as u32);
        table.insert("comma", b',' as u32);
        table.insert("period", b'.' as u32);
        table.insert("slash", b'/' as u32);
        table.insert("backslash", b'\\' as u32);
        table.insert("semicolon", b';' as u32);
        table.insert("apostrophe", b'\'' as u32);
        table.insert("quote", b'\'' as u32);
        table.insert("grave", b'`' as u32);
        table.insert("backtick", b'`' as u32);
        table.insert("bracketleft", b'[' as u32);
        table.insert("bracketright", b']' as u32);

        table
    };
}

/// Resolves a key name to a keycode. Returns None for names the table and
/// the single-character fallback both miss.
pub fn resolve(name: &str) -> Option<u32> {
    let lowered = name.to_ascii_lowercase();

    if let Some(&keycode) = KEY_TABLE.get(lowered.as_str()) {
        return Some(keycode);
    }

    let mut chars = lowered.chars();
    match (chars.next(), chars.next()) {
        (Some(ch), None) if ch.is_ascii_graphic() => Some(ch.to_ascii_uppercase() as u32),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_keys() {
        assert_eq!(resolve("enter"), Some(keys::ENTER));
        assert_eq!(resolve("Return"), Some(keys::ENTER));
        assert_eq!(resolve("ESC"), Some(keys::ESCAPE));
        assert_eq!(resolve("page_down"), Some(keys::PAGE_DOWN));
        assert_eq!(resolve("cmd"), Some(keys::META));
        assert_eq!(resolve("f11"), Some(keys::F11));
    }

    #[test]
    fn test_single_char_fallback() {
        assert_eq!(resolve("d"), Some(b'D' as u32));
        assert_eq!(resolve("D"), Some(b'D' as u32));
        assert_eq!(resolve("7"), Some(b'7' as u32));
        assert_eq!(resolve("-"), Some(b'-' as u32));
    }

    #[test]
    fn test_unknown_key() {
        assert_eq!(resolve("hyperdrive"), None);
        assert_eq!(resolve(""), None);
    }
}
