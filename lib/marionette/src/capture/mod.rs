//! Viewport capture, annotation, resize, and byte-budgeted JPEG encoding.

pub mod annotate;

use crate::config::BridgeConfig;
use crate::scene::refs::RefTable;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{ExtendedColorType, RgbaImage};
use serde_json::{json, Value as Json};
use strand::contract::{Engine, FrameImage, InstanceId};

/// Quality floor and step for the budget adaptation loop.
const QUALITY_FLOOR: f32 = 0.2;
const QUALITY_STEP: f32 = 0.15;

/// Pixel pad around a UI rect and half-size of the square region used for
/// 2D/3D node crops.
const NODE_RECT_PAD: f32 = 8.0;
const NODE_CROP_HALF: f32 = 128.0;

#[derive(Clone, Debug, Default)]
pub struct CaptureOptions {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub quality: Option<f32>,
    pub annotate: bool,
}

/// Captures the whole viewport. Returns the response value directly; capture
/// failure is a degraded local error, not a transport one.
pub fn capture_viewport(
    engine: &mut dyn Engine,
    refs: &mut RefTable,
    config: &BridgeConfig,
    options: &CaptureOptions,
) -> Json {
    let mut frame = match engine.capture_viewport() {
        Some(frame) => frame,
        None => return json!({"error": "Viewport capture returned no image"}),
    };

    if options.annotate {
        let annotations = annotate::collect(engine, refs);
        annotate::render(&mut frame, &annotations);
    }

    encode_response(engine, config, options, frame, "viewport")
}

/// Captures a screen-space crop focused on one node.
pub fn capture_node(
    engine: &mut dyn Engine,
    config: &BridgeConfig,
    options: &CaptureOptions,
    id: InstanceId,
    context: &str,
) -> Json {
    let frame = match engine.capture_viewport() {
        Some(frame) => frame,
        None => return json!({"error": "Viewport capture returned no image"}),
    };

    let (vw, vh) = engine.viewport_size();

    let (mut x0, mut y0, mut x1, mut y1) = match engine.screen_rect(id) {
        Some(rect) => (
            rect.x - NODE_RECT_PAD,
            rect.y - NODE_RECT_PAD,
            rect.x + rect.w + NODE_RECT_PAD,
            rect.y + rect.h + NODE_RECT_PAD,
        ),
        None => match engine.screen_point(id) {
            Ok(point) if point.behind => return json!({"error": "Node is behind the active camera"}),
            Ok(point) => (
                point.x - NODE_CROP_HALF,
                point.y - NODE_CROP_HALF,
                point.x + NODE_CROP_HALF,
                point.y + NODE_CROP_HALF,
            ),
            Err(err) => return json!({"error": err.to_string()}),
        },
    };

    x0 = x0.max(0.0);
    y0 = y0.max(0.0);
    x1 = x1.min(vw as f32);
    y1 = y1.min(vh as f32);

    if x1 - x0 < 1.0 || y1 - y0 < 1.0 {
        return json!({"error": "Node region is outside the viewport"});
    }

    let rgba = match to_rgba(frame) {
        Some(rgba) => rgba,
        None => return json!({"error": "Captured image has inconsistent dimensions"}),
    };

    let cropped = imageops::crop_imm(&rgba, x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32).to_image();
    let frame = FrameImage {
        width: cropped.width(),
        height: cropped.height(),
        pixels: cropped.into_raw(),
    };

    // Crops default to their natural size rather than the full-shot
    // dimensions.
    let mut options = options.clone();
    if options.width.is_none() && options.height.is_none() {
        options.width = Some(frame.width);
        options.height = Some(frame.height);
    }

    encode_response(engine, config, &options, frame, context)
}

fn encode_response(
    engine: &dyn Engine,
    config: &BridgeConfig,
    options: &CaptureOptions,
    frame: FrameImage,
    context: &str,
) -> Json {
    let source_w = frame.width;
    let source_h = frame.height;

    let (target_w, target_h) = target_dimensions(options, config, source_w, source_h);

    let rgba = match to_rgba(frame) {
        Some(rgba) => rgba,
        None => return json!({"error": "Captured image has inconsistent dimensions"}),
    };

    let rgba = if target_w != source_w || target_h != source_h {
        imageops::resize(&rgba, target_w, target_h, FilterType::Lanczos3)
    } else {
        rgba
    };

    let quality = options
        .quality
        .unwrap_or(config.screenshot.quality)
        .max(QUALITY_FLOOR)
        .min(1.0);

    let (encoded, final_quality) = encode_within_budget(&rgba, quality, config.screenshot.max_base64_len);

    let clock = engine.clock();

    json!({
        "image": encoded,
        "mime": "image/jpeg",
        "size": [target_w, target_h],
        "quality": final_quality,
        "encoded_length": encoded_len(&encoded),
        "context": context,
        "frame": clock.frame,
        "timestamp": strand::time::timestamp_secs(),
    })
}

fn encoded_len(encoded: &Json) -> usize {
    encoded.as_str().map(str::len).unwrap_or(0)
}

/// Encodes at descending quality until the base64 form fits the budget.
/// The floor result is returned even when it still exceeds the budget, with
/// the true size reported alongside.
fn encode_within_budget(rgba: &RgbaImage, start_quality: f32, max_base64_len: usize) -> (Json, f32) {
    let mut quality = start_quality;

    loop {
        let jpeg = encode_jpeg(rgba, quality);
        let encoded = BASE64.encode(&jpeg);

        if encoded.len() <= max_base64_len || quality <= QUALITY_FLOOR + f32::EPSILON {
            return (Json::String(encoded), quality);
        }

        quality = (quality - QUALITY_STEP).max(QUALITY_FLOOR);
    }
}

fn encode_jpeg(rgba: &RgbaImage, quality: f32) -> Vec<u8> {
    // JPEG has no alpha channel; flatten to RGB first.
    let mut rgb = Vec::with_capacity((rgba.width() * rgba.height() * 3) as usize);
    for pixel in rgba.pixels() {
        rgb.extend_from_slice(&pixel.0[..3]);
    }

    let mut out = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut out, (quality * 100.0).round().max(1.0) as u8);
    encoder
        .encode(&rgb, rgba.width(), rgba.height(), ExtendedColorType::Rgb8)
        .expect("JPEG encoding to memory cannot fail");

    out
}

fn to_rgba(frame: FrameImage) -> Option<RgbaImage> {
    RgbaImage::from_raw(frame.width, frame.height, frame.pixels)
}

fn target_dimensions(options: &CaptureOptions, config: &BridgeConfig, source_w: u32, source_h: u32) -> (u32, u32) {
    let aspect = source_w as f64 / source_h.max(1) as f64;

    match (options.width, options.height) {
        (Some(w), Some(h)) => (w.max(16), h.max(16)),
        (Some(w), None) => (w.max(16), ((w.max(16) as f64 / aspect) as u32).max(16)),
        (None, Some(h)) => (((h.max(16) as f64 * aspect) as u32).max(16), h.max(16)),
        (None, None) => (config.screenshot.width, config.screenshot.height),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stage::Stage;
    use strand::value::Value;

    fn decode(b64: &Json) -> image::DynamicImage {
        let bytes = BASE64.decode(b64.as_str().unwrap()).unwrap();
        image::load_from_memory(&bytes).unwrap()
    }

    #[test]
    fn test_capture_viewport_encodes_jpeg() {
        let mut stage = Stage::new(None);
        stage.set_viewport(320, 180);
        let root = stage.set_scene("res://t.tscn", "T");
        let sprite = stage.add_node(root, "Sprite2D", "S");
        stage.set_builtin(sprite, "position", Value::Vector2([100.0, 80.0]));

        let mut refs = RefTable::new();
        let config = BridgeConfig::default();
        let options = CaptureOptions {
            width: Some(160),
            height: Some(90),
            ..CaptureOptions::default()
        };

        let result = capture_viewport(&mut stage, &mut refs, &config, &options);

        assert_eq!(result["mime"], json!("image/jpeg"));
        assert_eq!(result["size"], json!([160, 90]));
        let decoded = decode(&result["image"]);
        assert_eq!(decoded.width(), 160);
        assert_eq!(decoded.height(), 90);
        assert_eq!(result["encoded_length"].as_u64().unwrap() as usize, result["image"].as_str().unwrap().len());
    }

    #[test]
    fn test_budget_steps_quality_down() {
        let mut stage = Stage::new(None);
        stage.set_viewport(320, 180);
        stage.set_scene("res://t.tscn", "T");

        let mut refs = RefTable::new();
        let mut config = BridgeConfig::default();
        config.screenshot.max_base64_len = 64;

        let options = CaptureOptions {
            quality: Some(0.9),
            ..CaptureOptions::default()
        };
        let result = capture_viewport(&mut stage, &mut refs, &config, &options);

        // Impossible budget: the encoder walks down to the floor and reports
        // the real size.
        let quality = result["quality"].as_f64().unwrap();
        assert!((quality - QUALITY_FLOOR as f64).abs() < 1e-6);
        assert!(result["encoded_length"].as_u64().unwrap() > 64);
    }

    #[test]
    fn test_capture_node_crop() {
        let mut stage = Stage::new(None);
        stage.set_viewport(320, 180);
        let root = stage.set_scene("res://t.tscn", "T");
        let button = stage.add_node(root, "Button", "Go");
        stage.set_rect(button, 20.0, 20.0, 64.0, 32.0);

        let config = BridgeConfig::default();

        let result = capture_node(&mut stage, &config, &CaptureOptions::default(), button, "Go");

        // Rect plus pad on each side.
        assert_eq!(result["size"], json!([80, 48]));
        assert_eq!(result["context"], json!("Go"));
    }

    #[test]
    fn test_capture_node_offscreen() {
        let mut stage = Stage::new(None);
        stage.set_viewport(320, 180);
        let root = stage.set_scene("res://t.tscn", "T");
        let sprite = stage.add_node(root, "Sprite2D", "S");
        stage.set_builtin(sprite, "position", Value::Vector2([-4000.0, -4000.0]));

        let config = BridgeConfig::default();

        let result = capture_node(&mut stage, &config, &CaptureOptions::default(), sprite, "S");

        assert!(result["error"].as_str().unwrap().contains("outside the viewport"));
    }

    #[test]
    fn test_annotated_capture_differs() {
        let mut stage = Stage::new(None);
        stage.set_viewport(320, 180);
        let root = stage.set_scene("res://t.tscn", "T");
        let sprite = stage.add_node(root, "Sprite2D", "S");
        stage.set_builtin(sprite, "position", Value::Vector2([160.0, 90.0]));

        let mut refs = RefTable::new();
        let config = BridgeConfig::default();

        let plain = capture_viewport(&mut stage, &mut refs, &config, &CaptureOptions::default());
        let annotated = capture_viewport(
            &mut stage,
            &mut refs,
            &config,
            &CaptureOptions {
                annotate: true,
                ..CaptureOptions::default()
            },
        );

        assert_ne!(plain["image"], annotated["image"]);
    }
}
