//! The runtime bridge object: owns the HTTP endpoint and every piece of
//! module-scoped state (ref table, event buffer, watches, diff baseline,
//! signal hub), and advances all of it once per engine frame.

use crate::config::BridgeConfig;
use crate::error::NetResult;
use crate::events::EventAccumulator;
use crate::net::http::{Request, Response};
use crate::net::server::HttpServer;
use crate::routes;
use crate::scene::diff::DiffTracker;
use crate::scene::refs::RefTable;
use crate::tasks::Task;
use crate::wait::SignalHub;
use serde_json::{json, Value as Json};
use std::net::SocketAddr;
use std::time;
use strand::contract::Engine;
use strand::logging;

/// What a handler hands back to the transport.
pub enum Reply {
    Json(Json),
    Text(String),
    Bytes(Vec<u8>),
    /// Handlers with nothing to say produce `{ok: true}`.
    Empty,
}

impl Reply {
    pub fn into_response(self) -> Response {
        match self {
            Reply::Json(value) => Response::json(200, &value),
            Reply::Text(text) => Response::text(text),
            Reply::Bytes(bytes) => Response::bytes(bytes),
            Reply::Empty => Response::json(200, &json!({"ok": true})),
        }
    }
}

/// Immediate reply, or a continuation the server advances on later frames.
pub enum Outcome {
    Reply(Reply),
    Task(Task),
}

pub type Handler = Box<dyn Fn(&Request, &mut BridgeCtx) -> Outcome>;

/// Everything a handler or task may touch during one frame. All mutation is
/// serialized by the frame loop; nothing here is shared across threads.
pub struct BridgeCtx<'a> {
    pub engine: &'a mut dyn Engine,
    pub refs: &'a mut RefTable,
    pub events: &'a mut EventAccumulator,
    pub hub: &'a mut SignalHub,
    pub diff: &'a mut DiffTracker,
    pub config: &'a BridgeConfig,
    pub log: &'a logging::Logger,
}

pub struct Bridge {
    server: HttpServer,
    refs: RefTable,
    events: EventAccumulator,
    hub: SignalHub,
    diff: DiffTracker,
    config: BridgeConfig,
    log: logging::Logger,
}

impl Bridge {
    /// Binds the runtime endpoint and installs the route table. Port 0 binds
    /// an ephemeral port, which the tests use.
    pub fn new<'a, L: Into<Option<&'a logging::Logger>>>(config: BridgeConfig, log: L) -> NetResult<Bridge> {
        let log = logging::child_or_discard(log);

        let mut server = HttpServer::bind(&config.host, config.runtime_port, &log)?;
        routes::register_all(&mut server);

        logging::info!(log, "runtime bridge listening";
                       "context" => "new",
                       "addr" => %server.local_addr());

        Ok(Bridge {
            server,
            refs: RefTable::new(),
            events: EventAccumulator::new(config.event_buffer_cap, &log),
            hub: SignalHub::new(),
            diff: DiffTracker::new(),
            config,
            log,
        })
    }

    #[inline]
    pub fn local_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    /// Starts event accumulation against the current scene.
    pub fn start(&mut self, engine: &mut dyn Engine) {
        self.events.start(engine);
    }

    /// One frame of bridge work, called from inside the engine tick:
    /// accumulator upkeep, signal routing, then the socket/task pump.
    pub fn sync(&mut self, engine: &mut dyn Engine, now: time::Instant) {
        // Upkeep first so deferred attaches from the previous frame land
        // before this frame's fires are routed.
        self.events.poll(engine);

        for fire in engine.drain_signal_fires() {
            if self.hub.note_fire(fire.subscription) {
                continue;
            }
            self.events.ingest_fire(engine, &fire);
        }

        let mut ctx = BridgeCtx {
            engine,
            refs: &mut self.refs,
            events: &mut self.events,
            hub: &mut self.hub,
            diff: &mut self.diff,
            config: &self.config,
            log: &self.log,
        };

        self.server.sync(&mut ctx, now);
    }

    /// Tears down every engine subscription. Call before dropping the bridge.
    pub fn shutdown(&mut self, engine: &mut dyn Engine) {
        self.events.stop(engine);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stage::Stage;
    use std::io::{Read, Write};
    use std::net::TcpStream;
    use std::time::{Duration, Instant};
    use strand::value::{Value, ValueKind};

    const TICK: f64 = 1.0 / 60.0;

    fn test_bridge() -> Bridge {
        let mut config = BridgeConfig::default();
        config.runtime_port = 0;
        Bridge::new(config, None).unwrap()
    }

    fn demo_stage() -> (Stage, strand::contract::InstanceId) {
        let mut stage = Stage::new(None);
        stage.set_viewport(320, 180);
        let root = stage.set_scene("res://level.tscn", "Level");
        let player = stage.add_node(root, "CharacterBody2D", "Player");
        stage.set_builtin(player, "position", Value::Vector2([100.0, 50.0]));
        stage.add_script_property(player, "health", ValueKind::Int, Value::Int(100));
        (stage, player)
    }

    fn pump(stage: &mut Stage, bridge: &mut Bridge) {
        stage.tick(TICK);
        bridge.sync(stage, Instant::now());
    }

    fn connect(bridge: &Bridge) -> TcpStream {
        let client = TcpStream::connect(bridge.local_addr()).unwrap();
        client.set_nonblocking(true).unwrap();
        client.set_nodelay(true).unwrap();
        client
    }

    /// Writes a raw request and pumps frames until the server closes the
    /// connection, returning the raw response bytes.
    fn drive(stage: &mut Stage, bridge: &mut Bridge, client: &mut TcpStream, raw: &[u8]) -> Vec<u8> {
        let mut written = 0;
        let mut response = Vec::new();

        for _ in 0..2000 {
            pump(stage, bridge);

            if written < raw.len() {
                match client.write(&raw[written..]) {
                    Ok(count) => written += count,
                    Err(ref err) if err.kind() == std::io::ErrorKind::WouldBlock => (),
                    Err(err) => panic!("Client write failed: {:?}", err),
                }
            }

            let mut chunk = [0u8; 16384];
            match client.read(&mut chunk) {
                Ok(0) => return response,
                Ok(count) => response.extend_from_slice(&chunk[..count]),
                Err(ref err) if err.kind() == std::io::ErrorKind::WouldBlock => (),
                Err(_) if !response.is_empty() => return response,
                Err(err) => panic!("Client read failed: {:?}", err),
            }
        }

        panic!("No response within the pump budget");
    }

    fn request(stage: &mut Stage, bridge: &mut Bridge, raw: &str) -> (u16, Json) {
        let mut client = connect(bridge);
        let response = drive(stage, bridge, &mut client, raw.as_bytes());
        parse_response(&response)
    }

    fn get(stage: &mut Stage, bridge: &mut Bridge, path: &str) -> (u16, Json) {
        request(stage, bridge, &format!("GET {} HTTP/1.1\r\nHost: localhost\r\n\r\n", path))
    }

    fn post(stage: &mut Stage, bridge: &mut Bridge, path: &str, body: &Json) -> (u16, Json) {
        let body = serde_json::to_string(body).unwrap();
        request(
            stage,
            bridge,
            &format!(
                "POST {} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
                path,
                body.len(),
                body
            ),
        )
    }

    fn parse_response(raw: &[u8]) -> (u16, Json) {
        let text = String::from_utf8_lossy(raw);
        let boundary = text.find("\r\n\r\n").expect("No header boundary in response");
        let head = &text[..boundary];
        let body = &text[boundary + 4..];

        let status: u16 = head
            .split_whitespace()
            .nth(1)
            .expect("No status code")
            .parse()
            .expect("Bad status code");

        let json = serde_json::from_str(body).unwrap_or(Json::Null);
        (status, json)
    }

    #[test]
    fn test_info_endpoint() {
        let (mut stage, _) = demo_stage();
        let mut bridge = test_bridge();

        let (status, body) = get(&mut stage, &mut bridge, "/info");

        assert_eq!(status, 200);
        assert_eq!(body["scene"], json!("res://level.tscn"));
        assert_eq!(body["viewport"], json!([320, 180]));
        assert!(body["_description"].is_string());
    }

    #[test]
    fn test_unknown_route_404() {
        let (mut stage, _) = demo_stage();
        let mut bridge = test_bridge();

        let (status, body) = get(&mut stage, &mut bridge, "/warp");

        assert_eq!(status, 404);
        assert_eq!(body["path"], json!("/warp"));
        assert_eq!(body["method"], json!("GET"));
        assert!(body["error"].is_string());
    }

    #[test]
    fn test_malformed_json_400() {
        let (mut stage, _) = demo_stage();
        let mut bridge = test_bridge();

        let (status, body) = request(
            &mut stage,
            &mut bridge,
            "POST /click HTTP/1.1\r\nHost: x\r\nContent-Type: application/json\r\nContent-Length: 1\r\n\r\n{",
        );

        assert_eq!(status, 400);
        assert_eq!(body["error"], json!("Invalid JSON in request body"));
    }

    #[test]
    fn test_missing_param_is_body_error() {
        let (mut stage, _) = demo_stage();
        let mut bridge = test_bridge();

        let (status, body) = post(&mut stage, &mut bridge, "/click", &json!({"y": 10}));

        assert_eq!(status, 200);
        assert_eq!(body["error"], json!("Must provide 'x'"));
    }

    #[test]
    fn test_stable_refs_across_set_property() {
        let (mut stage, player) = demo_stage();
        let mut bridge = test_bridge();

        let (_, first) = get(&mut stage, &mut bridge, "/snapshot");
        let player_ref = first["tree"]["children"][0]["ref"].as_str().unwrap().to_string();
        assert_eq!(player_ref, format!("Cha{}", player.0));

        let (_, set) = post(
            &mut stage,
            &mut bridge,
            "/set_property",
            &json!({"ref": player_ref, "property": "position", "value": [400.0, 100.0]}),
        );
        assert!(set.get("error").is_none(), "set_property failed: {}", set);

        let (_, second) = get(&mut stage, &mut bridge, "/snapshot");
        let moved = &second["tree"]["children"][0];
        assert_eq!(moved["ref"].as_str().unwrap(), player_ref);
        assert_eq!(moved["position"], json!([400.0, 100.0]));
    }

    #[test]
    fn test_state_endpoint() {
        let (mut stage, _) = demo_stage();
        let mut bridge = test_bridge();

        let (_, body) = get(&mut stage, &mut bridge, "/state?path=Player");

        assert_eq!(body["type"], json!("CharacterBody2D"));
        assert_eq!(body["properties"]["health"], json!(100));
    }

    #[test]
    fn test_call_method() {
        let (mut stage, _) = demo_stage();
        let mut bridge = test_bridge();

        let (_, body) = post(
            &mut stage,
            &mut bridge,
            "/call_method",
            &json!({"path": "Player", "method": "get_child_count", "args": []}),
        );
        assert_eq!(body["result"], json!(0));

        let (_, body) = post(
            &mut stage,
            &mut bridge,
            "/call_method",
            &json!({"path": "Player", "method": "explode", "args": []}),
        );
        assert_eq!(body["error"], json!("No method 'explode'"));
    }

    #[test]
    fn test_key_hold_frame_spacing() {
        let (mut stage, _) = demo_stage();
        let mut bridge = test_bridge();

        let (_, body) = post(
            &mut stage,
            &mut bridge,
            "/key",
            &json!({"key": "d", "action": "hold", "duration": 0.0}),
        );
        assert!(body.get("error").is_none(), "key failed: {}", body);

        let log = stage.input_log();
        let press = log
            .iter()
            .position(|(_, event)| matches!(event, strand::contract::InputEvent::Key { pressed: true, .. }))
            .unwrap();
        let release = log
            .iter()
            .position(|(_, event)| matches!(event, strand::contract::InputEvent::Key { pressed: false, .. }))
            .unwrap();

        // Exactly one engine frame between press and release.
        assert_eq!(log[release].0 - log[press].0, 1);
    }

    #[test]
    fn test_action_and_actions_list() {
        let (mut stage, _) = demo_stage();
        stage.define_action("jump");
        let mut bridge = test_bridge();

        let (_, list) = get(&mut stage, &mut bridge, "/actions");
        assert_eq!(list["actions"], json!(["jump"]));

        let (_, body) = post(
            &mut stage,
            &mut bridge,
            "/action",
            &json!({"action": "jump", "pressed": true}),
        );
        assert!(body.get("error").is_none());
        assert!(stage.is_action_pressed("jump"));
    }

    #[test]
    fn test_wait_for_property_less() {
        let (mut stage, player) = demo_stage();
        let mut bridge = test_bridge();

        let raw = {
            let body = json!({
                "condition": "property_less",
                "path": "Player",
                "property": "health",
                "value": 50,
                "timeout": 5.0,
            })
            .to_string();
            format!(
                "POST /wait_for HTTP/1.1\r\nHost: x\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
                body.len(),
                body
            )
        };

        let mut client = connect(&bridge);
        client.write_all(raw.as_bytes()).unwrap();

        // Let the waiter start polling, then inflict damage.
        for _ in 0..20 {
            pump(&mut stage, &mut bridge);
        }
        stage.set_builtin(player, "health", Value::Int(40));

        let response = drive(&mut stage, &mut bridge, &mut client, b"");
        let (status, body) = parse_response(&response);

        assert_eq!(status, 200);
        assert_eq!(body["condition_met"], json!(true));
        assert!(body["elapsed"].as_f64().unwrap() <= 5.0);
    }

    #[test]
    fn test_wait_for_value_in_query_string() {
        let (mut stage, player) = demo_stage();
        stage.set_builtin(player, "health", Value::Int(40));
        let mut bridge = test_bridge();

        // No body at all: every parameter, including the numeric `value`,
        // arrives through the query string.
        let (_, body) = request(
            &mut stage,
            &mut bridge,
            "POST /wait_for?condition=property_less&path=Player&property=health&value=50&timeout=1.0 HTTP/1.1\r\nHost: x\r\nContent-Length: 0\r\n\r\n",
        );
        assert_eq!(body["condition_met"], json!(true));

        let (_, body) = request(
            &mut stage,
            &mut bridge,
            "POST /wait_for?condition=property_equals&path=Player&property=health&value=40&timeout=0.2 HTTP/1.1\r\nHost: x\r\nContent-Length: 0\r\n\r\n",
        );
        assert_eq!(body["condition_met"], json!(true));
    }

    #[test]
    fn test_wait_for_signal_and_timeout() {
        let (mut stage, _) = demo_stage();
        let root = stage.current_scene_id();
        let button = stage.add_node(root, "Button", "Go");
        let mut bridge = test_bridge();

        // Timeout path: nothing presses the button.
        let (_, body) = post(
            &mut stage,
            &mut bridge,
            "/wait_for",
            &json!({"condition": "signal", "path": "Go", "signal": "pressed", "timeout": 0.1}),
        );
        assert_eq!(body["condition_met"], json!(false));
        // The one-shot subscription was explicitly disconnected on timeout.
        assert_eq!(stage.subscription_count(), 0);

        // Success path: press the button mid-wait.
        let raw_body = json!({"condition": "signal", "path": "Go", "signal": "pressed", "timeout": 5.0}).to_string();
        let raw = format!(
            "POST /wait_for HTTP/1.1\r\nHost: x\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
            raw_body.len(),
            raw_body
        );
        let mut client = connect(&bridge);
        client.write_all(raw.as_bytes()).unwrap();

        for _ in 0..10 {
            pump(&mut stage, &mut bridge);
        }
        stage.emit_signal(button, "pressed", None);

        let response = drive(&mut stage, &mut bridge, &mut client, b"");
        let (_, body) = parse_response(&response);
        assert_eq!(body["condition_met"], json!(true));
        assert_eq!(stage.subscription_count(), 0);
    }

    #[test]
    fn test_wait_for_already_true() {
        let (mut stage, _) = demo_stage();
        let mut bridge = test_bridge();

        let (_, body) = post(
            &mut stage,
            &mut bridge,
            "/wait_for",
            &json!({"condition": "node_exists", "path": "Player", "timeout": 2.0}),
        );

        assert_eq!(body["condition_met"], json!(true));
        assert!(body["elapsed"].as_f64().unwrap() <= 0.1);
    }

    #[test]
    fn test_wait_spans_engine_time() {
        let (mut stage, _) = demo_stage();
        let mut bridge = test_bridge();

        let before = stage.clock().seconds;
        let (_, body) = post(
            &mut stage,
            &mut bridge,
            "/wait",
            &json!({"seconds": 0.25, "snapshot": true}),
        );

        assert_eq!(body["waited"], json!(0.25));
        assert!(body["snapshot"]["tree"].is_object());
        assert!(stage.clock().seconds - before >= 0.25);
    }

    #[test]
    fn test_sequence_with_snapshot() {
        let (mut stage, _) = demo_stage();
        stage.define_action("jump");
        let mut bridge = test_bridge();

        let (_, body) = post(
            &mut stage,
            &mut bridge,
            "/sequence",
            &json!({
                "steps": [
                    {"key": "d", "action": "hold", "duration": 1.0},
                    {"wait": 0.2},
                    {"action": "jump", "pressed": true},
                ],
                "snapshot_after": true,
            }),
        );

        assert_eq!(body["steps_executed"], json!(3));
        assert!(body["elapsed"].as_f64().unwrap() >= 1.2);
        assert!(body["snapshot"]["tree"].is_object());
        assert!(stage.is_action_pressed("jump"));
    }

    #[test]
    fn test_click_and_click_node() {
        let (mut stage, _) = demo_stage();
        let root = stage.current_scene_id();
        let button = stage.add_node(root, "Button", "Go");
        stage.set_rect(button, 10.0, 10.0, 80.0, 20.0);
        let mut bridge = test_bridge();

        let (_, body) = post(&mut stage, &mut bridge, "/click", &json!({"x": 15, "y": 15}));
        assert!(body.get("error").is_none());

        let (_, body) = post(&mut stage, &mut bridge, "/click_node", &json!({"path": "Go"}));
        assert!(body.get("error").is_none());

        let clicks: Vec<_> = stage
            .input_log()
            .iter()
            .filter(|(_, event)| matches!(event, strand::contract::InputEvent::MouseButton { pressed: true, .. }))
            .collect();
        assert_eq!(clicks.len(), 2);

        match &clicks[1].1 {
            strand::contract::InputEvent::MouseButton { x, y, .. } => {
                assert_eq!((*x, *y), (50.0, 20.0));
            }
            other => panic!("Unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_pause_and_timescale() {
        let (mut stage, _) = demo_stage();
        let mut bridge = test_bridge();

        let (_, body) = post(&mut stage, &mut bridge, "/pause", &json!({"paused": true}));
        assert!(body.get("error").is_none());
        assert!(stage.clock().paused);

        // The bridge keeps answering while the engine is paused.
        let (status, _) = get(&mut stage, &mut bridge, "/info");
        assert_eq!(status, 200);

        let (_, body) = post(&mut stage, &mut bridge, "/timescale", &json!({"scale": 99.0}));
        assert_eq!(body["scale"], json!(10.0));
        assert_eq!(stage.clock().time_scale, 10.0);
    }

    #[test]
    fn test_events_and_watch_endpoints() {
        let (mut stage, player) = demo_stage();
        let mut bridge = test_bridge();
        bridge.start(&mut stage);

        let (_, body) = post(
            &mut stage,
            &mut bridge,
            "/watch",
            &json!({"path": "Player", "property": "health", "label": "health"}),
        );
        assert!(body.get("error").is_none());

        stage.set_builtin(player, "health", Value::Int(90));
        for _ in 0..3 {
            pump(&mut stage, &mut bridge);
        }

        let (_, body) = get(&mut stage, &mut bridge, "/events");
        let events = body["events"].as_array().unwrap();
        assert!(events
            .iter()
            .any(|event| event["type"] == json!("property_changed") && event["detail"]["new_value"] == json!(90)));

        // Drained: a second read comes back empty.
        let (_, body) = get(&mut stage, &mut bridge, "/events");
        assert!(body["events"].as_array().unwrap().is_empty());

        let (_, body) = get(&mut stage, &mut bridge, "/watches");
        assert_eq!(body["watches"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_snapshot_diff_and_history() {
        let (mut stage, player) = demo_stage();
        let mut bridge = test_bridge();

        let (_, first) = get(&mut stage, &mut bridge, "/snapshot/diff");
        assert!(first["note"].as_str().unwrap().contains("No baseline"));

        stage.set_builtin(player, "position", Value::Vector2([1.0, 2.0]));
        let (_, second) = get(&mut stage, &mut bridge, "/snapshot/diff");
        assert_eq!(second["changed"].as_array().unwrap().len(), 1);

        let (_, history) = get(&mut stage, &mut bridge, "/scene_history");
        assert!(history["history"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_screenshot_endpoint() {
        let (mut stage, _) = demo_stage();
        let mut bridge = test_bridge();

        let (_, body) = get(&mut stage, &mut bridge, "/screenshot?width=64&height=36");

        assert_eq!(body["mime"], json!("image/jpeg"));
        assert_eq!(body["size"], json!([64, 36]));
        let len = body["image"].as_str().unwrap().len();
        assert!(len > 0 && len <= BridgeConfig::default().screenshot.max_base64_len);
    }

    #[test]
    fn test_console_endpoint() {
        let (mut stage, _) = demo_stage();
        let dir = std::env::temp_dir().join(format!("marionette-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let log_path = dir.join("engine.log");
        std::fs::write(&log_path, "line one\nline two\n").unwrap();
        stage.set_log_file(&log_path);

        let mut bridge = test_bridge();
        let (_, body) = get(&mut stage, &mut bridge, "/console");
        assert!(body["text"].as_str().unwrap().contains("line two"));

        std::fs::remove_file(&log_path).unwrap();
        let (_, body) = get(&mut stage, &mut bridge, "/console");
        assert_eq!(body["text"], json!(""));
        assert!(body["note"].is_string());
    }

    #[test]
    fn test_connection_timeout_reaped() {
        let (mut stage, _) = demo_stage();
        let mut bridge = test_bridge();

        let mut client = connect(&bridge);
        client.write_all(b"GET /info HTTP/1.1\r\n").unwrap();

        // Accept and buffer the partial request.
        for _ in 0..5 {
            pump(&mut stage, &mut bridge);
        }

        // Jump past the socket timeout.
        let future = Instant::now() + Duration::from_secs(40);
        stage.tick(TICK);
        bridge.sync(&mut stage, future);
        stage.tick(TICK);
        bridge.sync(&mut stage, future);

        let mut chunk = [0u8; 64];
        let closed = loop {
            match client.read(&mut chunk) {
                Ok(0) => break true,
                Ok(_) => continue,
                Err(ref err) if err.kind() == std::io::ErrorKind::WouldBlock => break false,
                Err(_) => break true,
            }
        };
        assert!(closed, "Connection survived past the timeout");
    }

    #[test]
    fn test_handler_panic_becomes_500() {
        let (mut stage, _) = demo_stage();
        let mut bridge = test_bridge();
        bridge
            .server
            .register("GET", "/boom", Box::new(|_, _| panic!("kaboom")));

        let (status, body) = get(&mut stage, &mut bridge, "/boom");

        assert_eq!(status, 500);
        assert!(body["error"].as_str().unwrap().starts_with("Internal:"));

        // The server survives and keeps answering.
        let (status, _) = get(&mut stage, &mut bridge, "/info");
        assert_eq!(status, 200);
    }
}
