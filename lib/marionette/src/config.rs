use serde_derive::{Deserialize, Serialize};
use std::path::Path;

/// Process-wide bridge configuration. Everything has a sensible default so a
/// bridge can be constructed with no config file at all.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct BridgeConfig {
    /// Loopback only; the bridge never accepts remote connections.
    pub host: String,
    pub editor_port: u16,
    pub runtime_port: u16,
    pub max_snapshot_depth: usize,
    pub max_node_count: usize,
    pub connection_timeout_secs: u64,
    pub event_buffer_cap: usize,
    pub console_tail_bytes: u64,
    pub screenshot: ScreenshotConfig,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct ScreenshotConfig {
    pub width: u32,
    pub height: u32,
    /// JPEG quality in 0.0..=1.0.
    pub quality: f32,
    /// Budget for the base64 payload of one capture response.
    pub max_base64_len: usize,
}

impl Default for BridgeConfig {
    fn default() -> BridgeConfig {
        BridgeConfig {
            host: strand::LISTEN_HOST.to_string(),
            editor_port: strand::EDITOR_PORT,
            runtime_port: strand::RUNTIME_PORT,
            max_snapshot_depth: 12,
            max_node_count: 2000,
            connection_timeout_secs: 30,
            event_buffer_cap: 200,
            console_tail_bytes: 16 * 1024,
            screenshot: ScreenshotConfig::default(),
        }
    }
}

impl Default for ScreenshotConfig {
    fn default() -> ScreenshotConfig {
        ScreenshotConfig {
            width: 960,
            height: 540,
            quality: 0.75,
            max_base64_len: 1_500_000,
        }
    }
}

impl BridgeConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> BridgeConfig {
        serdeconv::from_toml_file(path).expect("Error loading bridge configuration file")
    }
}
