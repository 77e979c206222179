//! Annotation overlay: ref labels composited onto captured frames.
//!
//! Each eligible node gets a dot at its exact screen position and a centered
//! pill label carrying its ref, drawn with an embedded 5×7 glyph set (refs
//! are alphanumeric only). UI nodes additionally get a bounding outline.

use crate::scene::refs::RefTable;
use crate::scene::snapshot::skip_node;
use strand::contract::{Engine, FrameImage, InstanceId, ScreenRect};

/// Purely organizational classes; skipped unless a script gives them state
/// worth seeing.
const CONTAINER_CLASSES: &[&str] = &[
    "Node",
    "Node2D",
    "Node3D",
    "CanvasLayer",
    "Control",
    "Container",
    "HBoxContainer",
    "VBoxContainer",
    "GridContainer",
    "MarginContainer",
    "PanelContainer",
    "CenterContainer",
    "ScrollContainer",
];

/// Visual or interactive families annotated even without script state.
const VISUAL_CLASSES: &[&str] = &[
    "Control",
    "Sprite2D",
    "Sprite3D",
    "AnimatedSprite2D",
    "AnimatedSprite3D",
    "PhysicsBody2D",
    "PhysicsBody3D",
    "Area2D",
    "Area3D",
    "Camera2D",
    "Camera3D",
];

#[derive(Clone, Debug)]
pub struct Annotation {
    pub label: String,
    pub class: String,
    pub x: f32,
    pub y: f32,
    pub rect: Option<ScreenRect>,
}

/// Walks the scene and produces the annotation set for the current frame.
/// Invisible nodes, bare containers, off-screen points and points behind the
/// 3D camera are skipped.
pub fn collect(engine: &dyn Engine, refs: &mut RefTable) -> Vec<Annotation> {
    let mut annotations = Vec::new();

    if let Some(root) = engine.current_scene() {
        collect_recursive(engine, refs, root, &mut annotations);
    }

    annotations
}

fn collect_recursive(engine: &dyn Engine, refs: &mut RefTable, id: InstanceId, out: &mut Vec<Annotation>) {
    let name = match engine.node_name(id) {
        Ok(name) => name,
        Err(_) => return,
    };
    if skip_node(&name) {
        return;
    }

    if engine.is_visible(id) {
        if let Some(annotation) = annotate_node(engine, refs, id) {
            out.push(annotation);
        }
    }

    for child in engine.children(id) {
        collect_recursive(engine, refs, child, out);
    }
}

fn annotate_node(engine: &dyn Engine, refs: &mut RefTable, id: InstanceId) -> Option<Annotation> {
    let class = engine.class_name(id).ok()?;

    let scripted = engine.text_of(id).is_some() || engine.has_script(id);
    if !scripted {
        if CONTAINER_CLASSES.iter().any(|container| *container == class) {
            return None;
        }
        if !VISUAL_CLASSES.iter().any(|visual| engine.is_class(id, visual)) {
            return None;
        }
    }

    let rect = engine.screen_rect(id);
    let (x, y) = match rect {
        Some(rect) => rect.center(),
        None => match engine.screen_point(id) {
            Ok(point) if point.behind => return None,
            Ok(point) => (point.x, point.y),
            Err(_) => return None,
        },
    };

    let (vw, vh) = engine.viewport_size();
    if x < 0.0 || y < 0.0 || x >= vw as f32 || y >= vh as f32 {
        return None;
    }

    Some(Annotation {
        label: refs.assign(engine, id),
        class,
        x,
        y,
        rect,
    })
}

const OUTLINE: [u8; 4] = [120, 240, 140, 255];
const PILL_BG: [u8; 4] = [16, 16, 20, 215];
const TEXT: [u8; 4] = [255, 255, 255, 255];
const TEXT_EDGE: [u8; 4] = [0, 0, 0, 255];
const DOT: [u8; 4] = [255, 170, 40, 255];

const GLYPH_W: i32 = 5;
const GLYPH_H: i32 = 7;
const GLYPH_STRIDE: i32 = 6;

/// Alpha-blends the annotation layer straight onto the captured frame.
pub fn render(frame: &mut FrameImage, annotations: &[Annotation]) {
    for annotation in annotations {
        if let Some(rect) = annotation.rect {
            outline_rect(frame, rect);
        }

        let x = annotation.x as i32;
        let y = annotation.y as i32;

        disc(frame, x, y, 2, DOT);
        pill_label(frame, x, y - 12, &annotation.label);
    }
}

fn pill_label(frame: &mut FrameImage, cx: i32, cy: i32, label: &str) {
    let text_w = label.chars().count() as i32 * GLYPH_STRIDE - 1;
    let half_w = text_w / 2 + 5;
    let half_h = GLYPH_H / 2 + 3;

    // Pill body: a rect with disc-rounded ends.
    fill_rect(frame, cx - half_w, cy - half_h, cx + half_w, cy + half_h, PILL_BG);
    disc(frame, cx - half_w, cy, half_h, PILL_BG);
    disc(frame, cx + half_w, cy, half_h, PILL_BG);

    let text_x = cx - text_w / 2;
    let text_y = cy - GLYPH_H / 2;

    // One-pixel dark halo so the label stays readable on any backdrop.
    for (dx, dy) in &[(-1, 0), (1, 0), (0, -1), (0, 1)] {
        draw_text(frame, text_x + dx, text_y + dy, label, TEXT_EDGE);
    }
    draw_text(frame, text_x, text_y, label, TEXT);
}

fn draw_text(frame: &mut FrameImage, x: i32, y: i32, text: &str, color: [u8; 4]) {
    let mut pen_x = x;
    for ch in text.chars() {
        draw_glyph(frame, pen_x, y, ch, color);
        pen_x += GLYPH_STRIDE;
    }
}

fn draw_glyph(frame: &mut FrameImage, x: i32, y: i32, ch: char, color: [u8; 4]) {
    let glyph = glyph_rows(ch);
    for (row, bits) in glyph.iter().enumerate() {
        for col in 0..GLYPH_W {
            if bits & (0x10 >> col) != 0 {
                blend_px(frame, x + col, y + row as i32, color);
            }
        }
    }
}

fn outline_rect(frame: &mut FrameImage, rect: ScreenRect) {
    let x0 = rect.x as i32;
    let y0 = rect.y as i32;
    let x1 = (rect.x + rect.w) as i32;
    let y1 = (rect.y + rect.h) as i32;

    for x in x0..=x1 {
        blend_px(frame, x, y0, OUTLINE);
        blend_px(frame, x, y1, OUTLINE);
    }
    for y in y0..=y1 {
        blend_px(frame, x0, y, OUTLINE);
        blend_px(frame, x1, y, OUTLINE);
    }
}

fn fill_rect(frame: &mut FrameImage, x0: i32, y0: i32, x1: i32, y1: i32, color: [u8; 4]) {
    for y in y0..=y1 {
        for x in x0..=x1 {
            blend_px(frame, x, y, color);
        }
    }
}

fn disc(frame: &mut FrameImage, cx: i32, cy: i32, radius: i32, color: [u8; 4]) {
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= radius * radius {
                blend_px(frame, cx + dx, cy + dy, color);
            }
        }
    }
}

fn blend_px(frame: &mut FrameImage, x: i32, y: i32, color: [u8; 4]) {
    if x < 0 || y < 0 || x >= frame.width as i32 || y >= frame.height as i32 {
        return;
    }

    let offset = ((y as u32 * frame.width + x as u32) * 4) as usize;
    let alpha = color[3] as u32;
    let inverse = 255 - alpha;

    for channel in 0..3 {
        let src = color[channel] as u32;
        let dst = frame.pixels[offset + channel] as u32;
        frame.pixels[offset + channel] = ((src * alpha + dst * inverse) / 255) as u8;
    }
    frame.pixels[offset + 3] = 255;
}

/// 5×7 row bitmaps for the alphanumeric set refs are built from. Anything
/// else renders as a filled box.
fn glyph_rows(ch: char) -> [u8; 7] {
    match ch.to_ascii_uppercase() {
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1C, 0x12, 0x11, 0x11, 0x11, 0x12, 0x1C],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x19, 0x15, 0x13, 0x11, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x1B, 0x11],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x0A, 0x04, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        _ => [0x1F, 0x1F, 0x1F, 0x1F, 0x1F, 0x1F, 0x1F],
    }
}
