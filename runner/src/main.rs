//! Demo host: a small stage scene with the runtime bridge attached,
//! ticking at a fixed frame rate until interrupted.

use stage::Stage;
use strand::logging;
use strand::value::{Value, ValueKind};
use std::path::Path;
use std::thread;
use std::time;

const FPS: u64 = 60;

fn main() {
    let log = logging::init();

    let mut stage = build_scene(&log);

    let config = if Path::new("bridge.toml").exists() {
        marionette::BridgeConfig::load("bridge.toml")
    } else {
        marionette::BridgeConfig::default()
    };

    let mut bridge = marionette::Bridge::new(config, &log).expect("Failed binding runtime bridge");
    bridge.start(&mut stage);

    logging::info!(log, "demo stage running"; "context" => "main", "fps" => FPS);

    let frame_delta = time::Duration::from_millis(1000 / FPS);
    let dt = 1.0 / FPS as f64;

    loop {
        let frame_start = time::Instant::now();

        stage.tick(dt);
        bridge.sync(&mut stage, frame_start);

        let elapsed = frame_start.elapsed();
        if elapsed < frame_delta {
            thread::sleep(frame_delta - elapsed);
        }
    }
}

fn build_scene(log: &logging::Logger) -> Stage {
    let mut stage = Stage::new(log);
    stage.set_viewport(1152, 648);

    let root = stage.set_scene("res://demo.tscn", "Demo");

    let player = stage.add_node(root, "CharacterBody2D", "Player");
    stage.set_builtin(player, "position", Value::Vector2([200.0, 400.0]));
    stage.set_builtin(player, "velocity", Value::Vector2([0.0, 0.0]));
    stage.set_builtin(player, "is_on_floor", Value::Bool(true));
    stage.add_script_property(player, "health", ValueKind::Int, Value::Int(100));
    stage.add_script_property(player, "coins", ValueKind::Int, Value::Int(0));
    stage.add_to_group(player, "actors");

    let exit_zone = stage.add_node(root, "Area2D", "ExitZone");
    stage.set_builtin(exit_zone, "position", Value::Vector2([1000.0, 400.0]));

    let spawner = stage.add_node(root, "Timer", "SpawnTimer");
    stage.set_builtin(spawner, "wait_time", Value::Float(2.0));
    stage.set_builtin(spawner, "time_left", Value::Float(2.0));
    stage.set_builtin(spawner, "one_shot", Value::Bool(false));
    stage.set_builtin(spawner, "autostart", Value::Bool(true));
    stage.set_builtin(spawner, "stopped", Value::Bool(false));

    let hud = stage.add_node(root, "Control", "Hud");
    stage.set_rect(hud, 0.0, 0.0, 1152.0, 64.0);
    let score = stage.add_node(hud, "Label", "Score");
    stage.set_rect(score, 16.0, 16.0, 160.0, 32.0);
    stage.set_builtin(score, "text", Value::Str("Coins: 0".into()));
    let menu = stage.add_node(hud, "Button", "MenuButton");
    stage.set_rect(menu, 1000.0, 16.0, 136.0, 32.0);
    stage.set_builtin(menu, "text", Value::Str("Menu".into()));
    stage.set_builtin(menu, "disabled", Value::Bool(false));

    stage.define_action("jump");
    stage.define_action("move_left");
    stage.define_action("move_right");

    stage
}
