//! Route handlers: thin adapters between HTTP parameters and the bridge
//! subsystems.
//!
//! Conventions: semantic failures travel as `{error: …}` in a 200 body,
//! keeping 4xx/5xx for transport-level problems. Successful responses carry
//! a short `_description` for the activity feed. `ref` and `path` are
//! interchangeable wherever a node is addressed. Mutation endpoints accept
//! trailing `snapshot`/`screenshot` flags so one round-trip can act and
//! observe.

use crate::bridge::{BridgeCtx, Outcome, Reply};
use crate::capture::{self, CaptureOptions};
use crate::input::inject::{self, KeyAction};
use crate::input::keys;
use crate::net::http::Request;
use crate::net::server::HttpServer;
use crate::scene::state::read_state;
use crate::scene::{relative_path, snapshot, take_snapshot};
use crate::tasks::{HoldTask, Observe, PressReleaseTask, SequenceTask, Task, WaitTask};
use crate::wait::{self, Condition, WaitForTask};
use serde_json::{json, Value as Json};
use std::fs::File;
use std::io::{Read as _, Seek, SeekFrom};
use strand::contract::InstanceId;

pub fn register_all(server: &mut HttpServer) {
    server.register("GET", "/snapshot", Box::new(get_snapshot));
    server.register("GET", "/snapshot/diff", Box::new(get_snapshot_diff));
    server.register("GET", "/scene_history", Box::new(get_scene_history));
    server.register("GET", "/screenshot", Box::new(get_screenshot));
    server.register("GET", "/screenshot/node", Box::new(get_screenshot_node));
    server.register("GET", "/state", Box::new(get_state));
    server.register("GET", "/info", Box::new(get_info));
    server.register("GET", "/actions", Box::new(get_actions));
    server.register("GET", "/console", Box::new(get_console));
    server.register("GET", "/events", Box::new(get_events));
    server.register("GET", "/watches", Box::new(get_watches));
    server.register("POST", "/click", Box::new(post_click));
    server.register("POST", "/click_node", Box::new(post_click_node));
    server.register("POST", "/key", Box::new(post_key));
    server.register("POST", "/action", Box::new(post_action));
    server.register("POST", "/mouse_move", Box::new(post_mouse_move));
    server.register("POST", "/sequence", Box::new(post_sequence));
    server.register("POST", "/set_property", Box::new(post_set_property));
    server.register("POST", "/call_method", Box::new(post_call_method));
    server.register("POST", "/wait", Box::new(post_wait));
    server.register("POST", "/wait_for", Box::new(post_wait_for));
    server.register("POST", "/pause", Box::new(post_pause));
    server.register("POST", "/timescale", Box::new(post_timescale));
    server.register("POST", "/watch", Box::new(post_watch));
    server.register("POST", "/unwatch", Box::new(post_unwatch));
}

// ---- shared plumbing ------------------------------------------------------

fn reply(value: Json) -> Outcome {
    Outcome::Reply(Reply::Json(value))
}

fn fail(message: impl Into<String>) -> Outcome {
    reply(json!({"error": message.into()}))
}

fn missing(name: &str) -> Outcome {
    fail(format!("Must provide '{}'", name))
}

/// The interchangeable `ref`/`path` node address.
fn node_key(request: &Request) -> Option<String> {
    request
        .nonempty_param("ref")
        .or_else(|| request.nonempty_param("path"))
}

fn resolve_node(request: &Request, ctx: &mut BridgeCtx) -> Result<(InstanceId, String), Outcome> {
    let key = match node_key(request) {
        Some(key) => key,
        None => return Err(missing("ref' or 'path")),
    };

    match ctx.refs.resolve(&*ctx.engine, &key, None) {
        Some(id) => Ok((id, key)),
        None => Err(fail(format!("Node not found: {}", key))),
    }
}

fn observe_flags(request: &Request, snapshot_key: &str, screenshot_key: &str) -> Observe {
    Observe {
        snapshot: request.bool_param(snapshot_key).unwrap_or(false),
        screenshot: request.bool_param(screenshot_key).unwrap_or(false),
    }
}

/// Attaches the trailing observation payloads a mutation endpoint asked for.
pub fn attach_observation(ctx: &mut BridgeCtx, value: &mut Json, observe: Observe) {
    let obj = match value.as_object_mut() {
        Some(obj) => obj,
        None => return,
    };

    if observe.snapshot {
        match take_snapshot(
            &*ctx.engine,
            ctx.refs,
            None,
            ctx.config.max_snapshot_depth,
            ctx.config.max_node_count,
        ) {
            Ok(snapshot) => {
                obj.insert("snapshot".into(), serde_json::to_value(&snapshot).unwrap_or(Json::Null));
            }
            Err(message) => {
                obj.insert("snapshot_error".into(), Json::String(message));
            }
        }
    }

    if observe.screenshot {
        let shot = capture::capture_viewport(ctx.engine, ctx.refs, ctx.config, &CaptureOptions::default());
        obj.insert("screenshot".into(), shot);
    }
}

fn capture_options(request: &Request) -> CaptureOptions {
    CaptureOptions {
        width: request.i64_param("width").map(|v| v.max(0) as u32),
        height: request.i64_param("height").map(|v| v.max(0) as u32),
        quality: request.f64_param("quality").map(|v| v as f32),
        annotate: request.bool_param("annotate").unwrap_or(false),
    }
}

// ---- observation ----------------------------------------------------------

fn get_snapshot(request: &Request, ctx: &mut BridgeCtx) -> Outcome {
    let root = match request.nonempty_param("root") {
        Some(key) => match ctx.refs.resolve(&*ctx.engine, &key, None) {
            Some(id) => Some(id),
            None => return fail(format!("Node not found: {}", key)),
        },
        None => None,
    };

    let depth = request
        .i64_param("depth")
        .map(|v| v.max(0) as usize)
        .unwrap_or(ctx.config.max_snapshot_depth);

    let snap = match take_snapshot(&*ctx.engine, ctx.refs, root, depth, ctx.config.max_node_count) {
        Ok(snap) => snap,
        Err(message) => return fail(message),
    };

    let node_count = snapshot::flatten(&snap).len();
    let mut value = serde_json::to_value(&snap).unwrap_or(Json::Null);

    if let Some(obj) = value.as_object_mut() {
        obj.insert(
            "_description".into(),
            Json::String(format!(
                "Snapshot of {} ({} nodes)",
                snap.scene.as_deref().unwrap_or("<no scene>"),
                node_count
            )),
        );

        if request.bool_param("include_screenshot").unwrap_or(false) {
            let mut options = capture_options(request);
            options.width = None;
            options.height = None;
            let shot = capture::capture_viewport(ctx.engine, ctx.refs, ctx.config, &options);
            obj.insert("screenshot".into(), shot);
        }
    }

    ctx.diff.set_baseline(snap);
    reply(value)
}

fn get_snapshot_diff(request: &Request, ctx: &mut BridgeCtx) -> Outcome {
    let depth = request
        .i64_param("depth")
        .map(|v| v.max(0) as usize)
        .unwrap_or(ctx.config.max_snapshot_depth);

    let snap = match take_snapshot(&*ctx.engine, ctx.refs, None, depth, ctx.config.max_node_count) {
        Ok(snap) => snap,
        Err(message) => return fail(message),
    };

    let mut report = ctx.diff.diff_against(snap);
    if let Some(obj) = report.as_object_mut() {
        let counts = format!(
            "Diff: {} added, {} removed, {} changed",
            obj.get("added").and_then(Json::as_array).map(Vec::len).unwrap_or(0),
            obj.get("removed").and_then(Json::as_array).map(Vec::len).unwrap_or(0),
            obj.get("changed").and_then(Json::as_array).map(Vec::len).unwrap_or(0),
        );
        obj.insert("_description".into(), Json::String(counts));
    }
    reply(report)
}

fn get_scene_history(_request: &Request, ctx: &mut BridgeCtx) -> Outcome {
    let history = ctx.events.scene_history();
    let count = history.as_array().map(Vec::len).unwrap_or(0);
    reply(json!({
        "history": history,
        "_description": format!("{} recorded scene changes", count),
    }))
}

fn get_screenshot(request: &Request, ctx: &mut BridgeCtx) -> Outcome {
    let options = capture_options(request);
    let mut shot = capture::capture_viewport(ctx.engine, ctx.refs, ctx.config, &options);

    if let Some(obj) = shot.as_object_mut() {
        if !obj.contains_key("error") {
            obj.insert("_description".into(), Json::String("Captured viewport screenshot".into()));
        }
    }
    reply(shot)
}

fn get_screenshot_node(request: &Request, ctx: &mut BridgeCtx) -> Outcome {
    let (id, key) = match resolve_node(request, ctx) {
        Ok(resolved) => resolved,
        Err(outcome) => return outcome,
    };

    let options = capture_options(request);
    let mut shot = capture::capture_node(ctx.engine, ctx.config, &options, id, &key);

    if let Some(obj) = shot.as_object_mut() {
        if !obj.contains_key("error") {
            obj.insert("_description".into(), Json::String(format!("Captured screenshot of {}", key)));
        }
    }
    reply(shot)
}

fn get_state(request: &Request, ctx: &mut BridgeCtx) -> Outcome {
    let (id, key) = match resolve_node(request, ctx) {
        Ok(resolved) => resolved,
        Err(outcome) => return outcome,
    };

    let path = relative_path(&*ctx.engine, id).unwrap_or_else(|| key.clone());
    let mut state = read_state(&*ctx.engine, id, &path);
    state.insert("_description".into(), Json::String(format!("State of {}", path)));

    reply(Json::Object(state))
}

fn get_info(_request: &Request, ctx: &mut BridgeCtx) -> Outcome {
    let clock = ctx.engine.clock();
    let (vw, vh) = ctx.engine.viewport_size();

    reply(json!({
        "project": ctx.engine.project_name(),
        "scene": ctx.engine.scene_file_path(),
        "scene_name": ctx.engine.scene_name(),
        "viewport": [vw, vh],
        "fps": clock.fps,
        "frame": clock.frame,
        "time": clock.seconds,
        "paused": clock.paused,
        "time_scale": clock.time_scale,
        "_description": format!("Project {}", ctx.engine.project_name()),
    }))
}

fn get_console(_request: &Request, ctx: &mut BridgeCtx) -> Outcome {
    let path = match ctx.engine.log_file_path() {
        Some(path) => path,
        None => {
            return reply(json!({
                "text": "",
                "note": "Engine log file not configured",
            }))
        }
    };

    let mut file = match File::open(&path) {
        Ok(file) => file,
        Err(_) => {
            return reply(json!({
                "text": "",
                "note": "Log file not found",
            }))
        }
    };

    let tail = ctx.config.console_tail_bytes;
    let length = file.metadata().map(|meta| meta.len()).unwrap_or(0);
    let start = length.saturating_sub(tail);

    let mut text = String::new();
    let read = file
        .seek(SeekFrom::Start(start))
        .and_then(|_| {
            let mut bytes = Vec::new();
            file.read_to_end(&mut bytes).map(|_| bytes)
        })
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned());

    match read {
        Ok(contents) => text.push_str(&contents),
        Err(_) => {
            return reply(json!({
                "text": "",
                "note": "Log file could not be read",
            }))
        }
    }

    reply(json!({
        "text": text,
        "path": path.to_string_lossy(),
        "_description": format!("Tail of {}", path.to_string_lossy()),
    }))
}

fn get_events(request: &Request, ctx: &mut BridgeCtx) -> Outcome {
    let peek = request.bool_param("peek").unwrap_or(false);
    let events = if peek { ctx.events.peek() } else { ctx.events.drain() };

    let value = serde_json::to_value(&events).unwrap_or_else(|_| Json::Array(Vec::new()));
    reply(json!({
        "events": value,
        "count": events.len(),
        "_description": format!("{} buffered events{}", events.len(), if peek { " (peek)" } else { "" }),
    }))
}

fn get_watches(_request: &Request, ctx: &mut BridgeCtx) -> Outcome {
    let watches = ctx.events.get_watches();
    let count = watches.as_array().map(Vec::len).unwrap_or(0);
    reply(json!({
        "watches": watches,
        "_description": format!("{} active watches", count),
    }))
}

// ---- input ----------------------------------------------------------------

fn post_click(request: &Request, _ctx: &mut BridgeCtx) -> Outcome {
    let x = match request.f64_param("x") {
        Some(x) => x as f32,
        None => return missing("x"),
    };
    let y = match request.f64_param("y") {
        Some(y) => y as f32,
        None => return missing("y"),
    };

    let button_name = request.param("button");
    let button = match inject::resolve_button(button_name.as_deref()) {
        Some(button) => button,
        None => return fail(format!("Unknown mouse button: {}", button_name.unwrap_or_default())),
    };
    let double = request.bool_param("double").unwrap_or(false);

    let base = json!({
        "clicked": [x, y],
        "button": button.name(),
        "_description": format!("Clicked at ({}, {}) with {} button", x, y, button.name()),
    });

    Outcome::Task(Task::PressRelease(PressReleaseTask::click(
        x,
        y,
        button,
        double,
        base,
        observe_flags(request, "snapshot", "screenshot"),
    )))
}

fn post_click_node(request: &Request, ctx: &mut BridgeCtx) -> Outcome {
    let (id, key) = match resolve_node(request, ctx) {
        Ok(resolved) => resolved,
        Err(outcome) => return outcome,
    };

    let (x, y) = match inject::click_target(&*ctx.engine, id) {
        Ok(point) => point,
        Err(message) => return fail(message),
    };

    let base = json!({
        "clicked": [x, y],
        "target": key,
        "_description": format!("Clicked {} at ({}, {})", key, x, y),
    });

    Outcome::Task(Task::PressRelease(PressReleaseTask::click(
        x,
        y,
        strand::contract::MouseButton::Left,
        false,
        base,
        observe_flags(request, "snapshot", "screenshot"),
    )))
}

fn post_key(request: &Request, ctx: &mut BridgeCtx) -> Outcome {
    let name = match request.nonempty_param("key") {
        Some(name) => name,
        None => return missing("key"),
    };
    let keycode = match keys::resolve(&name) {
        Some(keycode) => keycode,
        None => return fail(format!("Unknown key: {}", name)),
    };

    let action_name = request.param("action").unwrap_or_else(|| "tap".to_string());
    let action = match KeyAction::parse(&action_name) {
        Some(action) => action,
        None => return fail(format!("Unknown key action: {}", action_name)),
    };
    let duration = request.f64_param("duration").unwrap_or(0.1).max(0.0);

    let observe = observe_flags(request, "snapshot", "screenshot");
    let press = inject::key_event(keycode, true);
    let release = inject::key_event(keycode, false);

    match action {
        KeyAction::Tap => {
            let base = json!({
                "key": name,
                "action": "tap",
                "_description": format!("Tapped key '{}'", name),
            });
            Outcome::Task(Task::PressRelease(PressReleaseTask::new(press, release, base, observe)))
        }
        KeyAction::Hold => {
            let base = json!({
                "key": name,
                "action": "hold",
                "duration": duration,
                "_description": format!("Held key '{}' for {} s", name, duration),
            });
            Outcome::Task(Task::Hold(HoldTask::new(press, release, duration, base, observe)))
        }
        KeyAction::Press => {
            ctx.engine.dispatch_input(press);
            let mut value = json!({
                "key": name,
                "action": "press",
                "_description": format!("Pressed key '{}'", name),
            });
            attach_observation(ctx, &mut value, observe);
            reply(value)
        }
        KeyAction::Release => {
            ctx.engine.dispatch_input(release);
            let mut value = json!({
                "key": name,
                "action": "release",
                "_description": format!("Released key '{}'", name),
            });
            attach_observation(ctx, &mut value, observe);
            reply(value)
        }
    }
}

fn post_action(request: &Request, ctx: &mut BridgeCtx) -> Outcome {
    let name = match request.nonempty_param("action") {
        Some(name) => name,
        None => return missing("action"),
    };
    if !ctx.engine.action_names().iter().any(|known| known == &name) {
        return fail(format!("Unknown action: {}", name));
    }

    let pressed = request.bool_param("pressed").unwrap_or(true);
    let strength = request.f64_param("strength").unwrap_or(1.0).max(0.0).min(1.0) as f32;

    ctx.engine.dispatch_input(inject::action_event(&name, pressed, strength));

    let mut value = json!({
        "action": name,
        "pressed": pressed,
        "strength": strength,
        "_description": format!(
            "{} action '{}'",
            if pressed { "Pressed" } else { "Released" },
            name
        ),
    });
    attach_observation(ctx, &mut value, observe_flags(request, "snapshot", "screenshot"));
    reply(value)
}

fn get_actions(_request: &Request, ctx: &mut BridgeCtx) -> Outcome {
    let actions = ctx.engine.action_names();
    reply(json!({
        "actions": actions,
        "_description": format!("{} mapped actions", actions.len()),
    }))
}

fn post_mouse_move(request: &Request, ctx: &mut BridgeCtx) -> Outcome {
    let x = match request.f64_param("x") {
        Some(x) => x as f32,
        None => return missing("x"),
    };
    let y = match request.f64_param("y") {
        Some(y) => y as f32,
        None => return missing("y"),
    };

    let (mx, my) = ctx.engine.mouse_position();
    let relative_x = request.f64_param("relative_x").map(|v| v as f32).unwrap_or(x - mx);
    let relative_y = request.f64_param("relative_y").map(|v| v as f32).unwrap_or(y - my);

    ctx.engine
        .dispatch_input(inject::mouse_move_event(x, y, relative_x, relative_y));

    reply(json!({
        "position": [x, y],
        "_description": format!("Moved mouse to ({}, {})", x, y),
    }))
}

fn post_sequence(request: &Request, _ctx: &mut BridgeCtx) -> Outcome {
    let steps = match request.body_field("steps") {
        Some(steps) => steps,
        None => return missing("steps"),
    };

    let steps = match inject::parse_steps(steps) {
        Ok(steps) => steps,
        Err(message) => return fail(message),
    };

    Outcome::Task(Task::Sequence(SequenceTask::new(
        steps,
        observe_flags(request, "snapshot_after", "screenshot_after"),
    )))
}

// ---- mutation -------------------------------------------------------------

fn post_set_property(request: &Request, ctx: &mut BridgeCtx) -> Outcome {
    let (id, key) = match resolve_node(request, ctx) {
        Ok(resolved) => resolved,
        Err(outcome) => return outcome,
    };

    let property = match request.nonempty_param("property") {
        Some(property) => property,
        None => return missing("property"),
    };
    let raw_value = match request.body_field("value") {
        Some(raw_value) => raw_value.clone(),
        None => return missing("value"),
    };

    let kind = ctx.engine.property_kind(id, &property);
    let value = match crate::serialize::from_json(&raw_value, kind) {
        Ok(value) => value,
        Err(message) => return fail(message),
    };

    if let Err(err) = ctx.engine.set_property(id, &property, value) {
        return fail(err.to_string());
    }

    let mut result = json!({
        "target": key,
        "property": property,
        "value": raw_value,
        "_description": format!("Set {}.{}", key, property),
    });
    attach_observation(ctx, &mut result, observe_flags(request, "snapshot", "screenshot"));
    reply(result)
}

fn post_call_method(request: &Request, ctx: &mut BridgeCtx) -> Outcome {
    let (id, key) = match resolve_node(request, ctx) {
        Ok(resolved) => resolved,
        Err(outcome) => return outcome,
    };

    let method = match request.nonempty_param("method") {
        Some(method) => method,
        None => return missing("method"),
    };

    let args = match request.body_field("args") {
        Some(Json::Array(items)) => items.iter().map(crate::serialize::natural).collect(),
        Some(_) => return fail("'args' must be an array"),
        None => Vec::new(),
    };

    match ctx.engine.call_method(id, &method, args) {
        Ok(result) => {
            let mut value = json!({
                "result": crate::serialize::to_json(&result),
                "_description": format!("Called {}.{}()", key, method),
            });
            attach_observation(ctx, &mut value, observe_flags(request, "snapshot", "screenshot"));
            reply(value)
        }
        Err(err) => fail(err.to_string()),
    }
}

// ---- waiting --------------------------------------------------------------

fn post_wait(request: &Request, ctx: &mut BridgeCtx) -> Outcome {
    let seconds = match request.f64_param("seconds") {
        Some(seconds) if seconds >= 0.0 => seconds,
        Some(_) => return fail("'seconds' must be non-negative"),
        None => return missing("seconds"),
    };

    let base = json!({
        "_description": format!("Waited {} s on the engine clock", seconds),
    });

    Outcome::Task(Task::Wait(WaitTask::new(
        ctx,
        seconds,
        base,
        observe_flags(request, "snapshot", "screenshot"),
    )))
}

fn post_wait_for(request: &Request, ctx: &mut BridgeCtx) -> Outcome {
    let condition_name = match request.nonempty_param("condition") {
        Some(condition_name) => condition_name,
        None => return missing("condition"),
    };
    let condition = match Condition::parse(&condition_name) {
        Some(condition) => condition,
        None => return fail(format!("Unknown condition: {}", condition_name)),
    };

    let target = match node_key(request) {
        Some(target) => target,
        None => return missing("ref' or 'path"),
    };

    let timeout = request.f64_param("timeout").unwrap_or(wait::DEFAULT_TIMEOUT).max(0.0);
    let mut poll_interval = request
        .f64_param("poll_interval")
        .unwrap_or(wait::DEFAULT_POLL_INTERVAL)
        .max(0.01);

    let mut property = None;
    let mut expected = Json::Null;
    let mut signal_sub = None;

    match condition {
        Condition::PropertyEquals | Condition::PropertyGreater | Condition::PropertyLess => {
            property = match request.nonempty_param("property") {
                Some(name) => Some(name),
                None => return missing("property"),
            };
            expected = match request.body_field("value") {
                Some(value) => value.clone(),
                // The query form must decode to the same typed value the
                // body form carries, or numeric comparisons can never match.
                None => match request.query.get("value") {
                    Some(raw) => serde_json::from_str(raw).unwrap_or_else(|_| Json::String(raw.clone())),
                    None => return missing("value"),
                },
            };
        }
        Condition::Signal => {
            let signal = match request.nonempty_param("signal") {
                Some(signal) => signal,
                None => return missing("signal"),
            };
            let id = match ctx.refs.resolve(&*ctx.engine, &target, None) {
                Some(id) => id,
                None => return fail(format!("Node not found: {}", target)),
            };
            let sub = match ctx.engine.connect(id, &signal) {
                Ok(sub) => sub,
                Err(err) => return fail(err.to_string()),
            };
            ctx.hub.register_waiter(sub);
            signal_sub = Some(sub);
            poll_interval = wait::SIGNAL_POLL_INTERVAL;
        }
        Condition::NodeExists | Condition::NodeFreed => (),
    }

    let description = format!("Waited for {} on {}", condition_name, target);

    Outcome::Task(Task::WaitFor(WaitForTask::new(
        condition,
        target,
        property,
        expected,
        signal_sub,
        timeout,
        poll_interval,
        observe_flags(request, "snapshot", "screenshot"),
        description,
    )))
}

// ---- engine controls ------------------------------------------------------

fn post_pause(request: &Request, ctx: &mut BridgeCtx) -> Outcome {
    let paused = match request.bool_param("paused") {
        Some(paused) => paused,
        None => return missing("paused"),
    };

    ctx.engine.set_paused(paused);

    reply(json!({
        "paused": paused,
        "_description": if paused { "Paused the engine" } else { "Unpaused the engine" },
    }))
}

fn post_timescale(request: &Request, ctx: &mut BridgeCtx) -> Outcome {
    let scale = match request.f64_param("scale") {
        Some(scale) => scale,
        None => return missing("scale"),
    };

    let clamped = scale.max(0.01).min(10.0);
    ctx.engine.set_time_scale(clamped);

    reply(json!({
        "scale": clamped,
        "_description": format!("Set time scale to {}", clamped),
    }))
}

// ---- watches --------------------------------------------------------------

fn post_watch(request: &Request, ctx: &mut BridgeCtx) -> Outcome {
    let (id, key) = match resolve_node(request, ctx) {
        Ok(resolved) => resolved,
        Err(outcome) => return outcome,
    };
    let property = match request.nonempty_param("property") {
        Some(property) => property,
        None => return missing("property"),
    };
    let label = request.param("label").unwrap_or_default();

    let node_path = relative_path(&*ctx.engine, id).unwrap_or_else(|| key.clone());

    if let Err(message) = ctx.events.add_watch(&*ctx.engine, &node_path, &property, &label) {
        return fail(message);
    }

    reply(json!({
        "node_path": node_path,
        "property": property,
        "_description": format!("Watching {}.{}", node_path, property),
    }))
}

fn post_unwatch(request: &Request, ctx: &mut BridgeCtx) -> Outcome {
    let key = match node_key(request) {
        Some(key) => key,
        None => return missing("ref' or 'path"),
    };
    let property = match request.nonempty_param("property") {
        Some(property) => property,
        None => return missing("property"),
    };

    // Accept either the stored watch path or a ref that resolves to it.
    let node_path = match ctx.refs.resolve(&*ctx.engine, &key, None) {
        Some(id) => relative_path(&*ctx.engine, id).unwrap_or_else(|| key.clone()),
        None => key.clone(),
    };

    let removed = ctx.events.remove_watch(&node_path, &property);
    reply(json!({
        "removed": removed,
        "_description": format!("Removed watch on {}.{}", node_path, property),
    }))
}
