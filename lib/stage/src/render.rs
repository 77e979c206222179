//! Flat-color software viewport. Enough of a frame for screenshot work:
//! a clear color, a filled rectangle per UI node, a small quad per spatial
//! node, each tinted by its class.

use crate::Stage;
use strand::contract::{Engine, FrameImage};

const CLEAR: [u8; 4] = [38, 38, 46, 255];
const QUAD_HALF: i32 = 8;

pub(crate) fn render(stage: &Stage) -> FrameImage {
    let (width, height) = stage.viewport_size();
    let mut frame = FrameImage::new(width, height);

    for chunk in frame.pixels.chunks_exact_mut(4) {
        chunk.copy_from_slice(&CLEAR);
    }

    for item in stage.render_items() {
        let color = class_color(&item.class);

        if let Some(rect) = item.rect {
            fill(
                &mut frame,
                rect.x as i32,
                rect.y as i32,
                (rect.x + rect.w) as i32,
                (rect.y + rect.h) as i32,
                color,
            );
        } else if let Some((x, y)) = item.point {
            fill(
                &mut frame,
                x as i32 - QUAD_HALF,
                y as i32 - QUAD_HALF,
                x as i32 + QUAD_HALF,
                y as i32 + QUAD_HALF,
                color,
            );
        }
    }

    frame
}

fn fill(frame: &mut FrameImage, x0: i32, y0: i32, x1: i32, y1: i32, color: [u8; 4]) {
    for y in y0.max(0)..y1.min(frame.height as i32) {
        for x in x0.max(0)..x1.min(frame.width as i32) {
            let offset = ((y as u32 * frame.width + x as u32) * 4) as usize;
            frame.pixels[offset..offset + 4].copy_from_slice(&color);
        }
    }
}

/// Deterministic per-class tint.
fn class_color(class: &str) -> [u8; 4] {
    let mut hash: u32 = 2166136261;
    for byte in class.bytes() {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(16777619);
    }

    [
        96 + (hash & 0x7F) as u8,
        96 + ((hash >> 8) & 0x7F) as u8,
        96 + ((hash >> 16) & 0x7F) as u8,
        255,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand::value::Value;

    #[test]
    fn test_render_paints_nodes() {
        let mut stage = Stage::new(None);
        stage.set_viewport(64, 64);
        let root = stage.set_scene("res://r.tscn", "R");
        let sprite = stage.add_node(root, "Sprite2D", "S");
        stage.set_builtin(sprite, "position", Value::Vector2([32.0, 32.0]));

        let frame = render(&stage);
        let center = ((32u32 * 64 + 32) * 4) as usize;

        assert_eq!(frame.width, 64);
        assert_ne!(&frame.pixels[center..center + 4], &CLEAR);
    }
}
