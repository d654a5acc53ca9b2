//! Raster drawing on `RgbaImage` and the annotation compositor.

use std::f64::consts::PI;
use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{ImageFormat, Rgba, RgbaImage};
use thiserror::Error;

use crate::annotation::{
    Annotation, ANNOTATION_COLOR, ARROW_HEAD_SIZE, ARROW_WIDTH, MARKER_OPACITY, MARKER_WIDTH,
    TEXT_BORDER, TEXT_PADDING, TEXT_SIZE,
};
use crate::geometry::Point;

pub const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("image data is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("failed to decode image: {0}")]
    Decode(#[source] image::ImageError),
    #[error("failed to encode image: {0}")]
    Encode(#[source] image::ImageError),
    #[error("image is empty")]
    Empty,
}

pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>, ImageError> {
    let mut bytes: Vec<u8> = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(ImageError::Encode)?;
    Ok(bytes)
}

pub fn encode_png_data_url(img: &RgbaImage) -> Result<String, ImageError> {
    let bytes = encode_png(img)?;
    Ok(format!("{PNG_DATA_URL_PREFIX}{}", STANDARD.encode(bytes)))
}

/// Accepts `data:image/<fmt>;base64,<payload>` or a bare base64 payload.
pub fn strip_data_url_prefix(data_url: &str) -> &str {
    let trimmed = data_url.trim();
    if trimmed.starts_with("data:") {
        if let Some(idx) = trimmed.find(";base64,") {
            return &trimmed[idx + ";base64,".len()..];
        }
    }
    trimmed
}

pub fn decode_data_url(data_url: &str) -> Result<RgbaImage, ImageError> {
    let bytes = STANDARD.decode(strip_data_url_prefix(data_url))?;
    let decoded = image::load_from_memory(&bytes).map_err(ImageError::Decode)?;
    let rgba = decoded.to_rgba8();
    if rgba.width() == 0 || rgba.height() == 0 {
        return Err(ImageError::Empty);
    }
    Ok(rgba)
}

/// Base image, then committed annotations in order, then the stroke being
/// drawn. Nothing else feeds the result.
pub fn compose(
    base: &RgbaImage,
    annotations: &[Annotation],
    in_progress: Option<&Annotation>,
) -> RgbaImage {
    let mut out = base.clone();
    for annotation in annotations {
        draw_annotation(&mut out, annotation);
    }
    if let Some(annotation) = in_progress {
        draw_annotation(&mut out, annotation);
    }
    out
}

pub fn draw_annotation(img: &mut RgbaImage, annotation: &Annotation) {
    match annotation {
        Annotation::Marker { points } => draw_marker(img, points),
        Annotation::Arrow { start, end } => draw_arrow(img, *start, *end),
        Annotation::Text { position, text } => draw_text(img, *position, text),
    }
}

pub fn with_opacity(color: Rgba<u8>, opacity: f64) -> Rgba<u8> {
    let alpha = (f64::from(color[3]) * opacity).round().clamp(0.0, 255.0) as u8;
    Rgba([color[0], color[1], color[2], alpha])
}

/// Round-capped, round-joined polyline. Coverage is collected first and
/// blended once so overlapping segments keep a uniform opacity.
pub fn draw_marker(img: &mut RgbaImage, points: &[Point]) {
    if points.len() < 2 || img.width() == 0 || img.height() == 0 {
        return;
    }
    let mut mask = CoverageMask::new(img.width(), img.height());
    let radius = MARKER_WIDTH / 2.0;
    for pair in points.windows(2) {
        mask.stamp_line(pair[0], pair[1], radius);
    }
    mask.blend_onto(img, with_opacity(ANNOTATION_COLOR, MARKER_OPACITY));
}

/// Straight shaft plus a filled head whose sides sit 30° off the shaft.
pub fn draw_arrow(img: &mut RgbaImage, start: Point, end: Point) {
    let angle = (end.y - start.y).atan2(end.x - start.x);
    draw_thick_line(
        img,
        start.x,
        start.y,
        end.x,
        end.y,
        ANNOTATION_COLOR,
        ARROW_WIDTH,
    );
    let left = (
        end.x - ARROW_HEAD_SIZE * (angle - PI / 6.0).cos(),
        end.y - ARROW_HEAD_SIZE * (angle - PI / 6.0).sin(),
    );
    let right = (
        end.x - ARROW_HEAD_SIZE * (angle + PI / 6.0).cos(),
        end.y - ARROW_HEAD_SIZE * (angle + PI / 6.0).sin(),
    );
    fill_triangle(img, (end.x, end.y), left, right, ANNOTATION_COLOR);
}

/// Label with its baseline at `position.y`, boxed in white with a coloured
/// border.
pub fn draw_text(img: &mut RgbaImage, position: Point, text: &str) {
    if text.is_empty() {
        return;
    }
    let glyph_scale = glyph_scale_for(TEXT_SIZE);
    let (text_w, _) = measure_text(text, glyph_scale, true);
    let x = position.x.round() as i32;
    let y = position.y.round() as i32;
    let size = TEXT_SIZE as i32;

    let box_x0 = x - TEXT_PADDING;
    let box_y0 = y - size - TEXT_PADDING;
    let box_x1 = x + text_w + TEXT_PADDING;
    let box_y1 = y + 4 + TEXT_PADDING;

    fill_rect_alpha(img, box_x0, box_y0, box_x1, box_y1, Rgba([255, 255, 255, 255]));
    stroke_rect(img, box_x0, box_y0, box_x1, box_y1, ANNOTATION_COLOR, TEXT_BORDER);
    draw_bitmap_text(img, x, y - size, text, ANNOTATION_COLOR, glyph_scale, true);
}

pub fn glyph_scale_for(size: u32) -> u32 {
    ((f64::from(size) / 8.0).round() as u32).max(1)
}

/// Width/height in pixels of `text` drawn with the 8x8 font.
pub fn measure_text(text: &str, scale: u32, bold: bool) -> (i32, i32) {
    let scale_i = scale.max(1) as i32;
    let lines: Vec<&str> = text.split('\n').collect();
    let width_chars = lines
        .iter()
        .map(|line| line.chars().count() as i32)
        .max()
        .unwrap_or(0);
    let extra = if bold && width_chars > 0 { 1 } else { 0 };
    (
        width_chars * 8 * scale_i + extra,
        lines.len().max(1) as i32 * 8 * scale_i,
    )
}

pub fn draw_bitmap_text(
    img: &mut RgbaImage,
    x: i32,
    y: i32,
    text: &str,
    color: Rgba<u8>,
    scale: u32,
    bold: bool,
) {
    let scale_i = scale.max(1) as i32;
    let mut mask = CoverageMask::new(img.width(), img.height());
    let mut cursor_x = x;
    let mut cursor_y = y;
    for ch in text.chars() {
        if ch == '\n' {
            cursor_x = x;
            cursor_y += 8 * scale_i;
            continue;
        }
        let Some(glyph) = BASIC_FONTS.get(ch).or_else(|| BASIC_FONTS.get('?')) else {
            cursor_x += 8 * scale_i;
            continue;
        };
        for (row_idx, row) in glyph.iter().enumerate() {
            for col_idx in 0..8 {
                if (*row >> col_idx) & 1 == 0 {
                    continue;
                }
                let px = cursor_x + col_idx * scale_i;
                let py = cursor_y + row_idx as i32 * scale_i;
                let width = if bold { scale_i + 1 } else { scale_i };
                for sy in 0..scale_i {
                    for sx in 0..width {
                        mask.set(px + sx, py + sy);
                    }
                }
            }
        }
        cursor_x += 8 * scale_i;
    }
    mask.blend_onto(img, color);
}

pub fn blend_pixel(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let a = f64::from(src[3]) / 255.0;
    if a <= 0.0 {
        return dst;
    }
    let inv = 1.0 - a;
    let channel = |d: u8, s: u8| {
        (f64::from(d) * inv + f64::from(s) * a)
            .round()
            .clamp(0.0, 255.0) as u8
    };
    let out_a = (f64::from(dst[3]) * inv + f64::from(src[3]))
        .round()
        .clamp(0.0, 255.0) as u8;
    Rgba([
        channel(dst[0], src[0]),
        channel(dst[1], src[1]),
        channel(dst[2], src[2]),
        out_a,
    ])
}

fn clamp_i32(value: i32, min_value: i32, max_value: i32) -> i32 {
    value.max(min_value).min(max_value)
}

fn blend_at(img: &mut RgbaImage, x: i32, y: i32, color: Rgba<u8>) {
    if x < 0 || y < 0 || x >= img.width() as i32 || y >= img.height() as i32 {
        return;
    }
    let dst = *img.get_pixel(x as u32, y as u32);
    img.put_pixel(x as u32, y as u32, blend_pixel(dst, color));
}

pub fn draw_disc(img: &mut RgbaImage, cx: f64, cy: f64, radius: f64, color: Rgba<u8>) {
    if img.width() == 0 || img.height() == 0 {
        return;
    }
    if radius <= 0.1 {
        blend_at(img, cx.round() as i32, cy.round() as i32, color);
        return;
    }
    let min_x = clamp_i32((cx - radius).floor() as i32, 0, img.width() as i32 - 1);
    let max_x = clamp_i32((cx + radius).ceil() as i32, 0, img.width() as i32 - 1);
    let min_y = clamp_i32((cy - radius).floor() as i32, 0, img.height() as i32 - 1);
    let max_y = clamp_i32((cy + radius).ceil() as i32, 0, img.height() as i32 - 1);
    let r2 = radius * radius;
    for y in min_y..=max_y {
        for x in min_x..=max_x {
            let dx = f64::from(x) - cx;
            let dy = f64::from(y) - cy;
            if dx * dx + dy * dy <= r2 {
                blend_at(img, x, y, color);
            }
        }
    }
}

/// Opaque colours only; translucent strokes go through `CoverageMask`.
pub fn draw_thick_line(
    img: &mut RgbaImage,
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    color: Rgba<u8>,
    width: f64,
) {
    let dx = x2 - x1;
    let dy = y2 - y1;
    let distance = (dx * dx + dy * dy).sqrt();
    let steps = distance.max(1.0).ceil() as i32;
    let radius = (width.max(1.0) / 2.0).max(0.6);
    for step in 0..=steps {
        let t = f64::from(step) / f64::from(steps.max(1));
        draw_disc(img, x1 + dx * t, y1 + dy * t, radius, color);
    }
}

fn triangle_area(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> f64 {
    ((a.0 * (b.1 - c.1) + b.0 * (c.1 - a.1) + c.0 * (a.1 - b.1)).abs()) / 2.0
}

fn point_in_triangle(p: (f64, f64), a: (f64, f64), b: (f64, f64), c: (f64, f64), eps: f64) -> bool {
    let total = triangle_area(a, b, c);
    if total <= eps {
        return false;
    }
    let a1 = triangle_area(p, b, c);
    let a2 = triangle_area(a, p, c);
    let a3 = triangle_area(a, b, p);
    (a1 + a2 + a3 - total).abs() <= eps
}

pub fn fill_triangle(
    img: &mut RgbaImage,
    a: (f64, f64),
    b: (f64, f64),
    c: (f64, f64),
    color: Rgba<u8>,
) {
    if img.width() == 0 || img.height() == 0 {
        return;
    }
    let min_x = clamp_i32(a.0.min(b.0).min(c.0).floor() as i32, 0, img.width() as i32 - 1);
    let max_x = clamp_i32(a.0.max(b.0).max(c.0).ceil() as i32, 0, img.width() as i32 - 1);
    let min_y = clamp_i32(a.1.min(b.1).min(c.1).floor() as i32, 0, img.height() as i32 - 1);
    let max_y = clamp_i32(a.1.max(b.1).max(c.1).ceil() as i32, 0, img.height() as i32 - 1);
    for y in min_y..=max_y {
        for x in min_x..=max_x {
            let p = (f64::from(x) + 0.5, f64::from(y) + 0.5);
            if point_in_triangle(p, a, b, c, 0.8) {
                blend_at(img, x, y, color);
            }
        }
    }
}

pub fn fill_rect_alpha(img: &mut RgbaImage, x0: i32, y0: i32, x1: i32, y1: i32, color: Rgba<u8>) {
    if img.width() == 0 || img.height() == 0 {
        return;
    }
    let min_x = x0.min(x1).max(0);
    let max_x = x0.max(x1).min(img.width() as i32 - 1);
    let min_y = y0.min(y1).max(0);
    let max_y = y0.max(y1).min(img.height() as i32 - 1);
    for y in min_y..=max_y {
        for x in min_x..=max_x {
            blend_at(img, x, y, color);
        }
    }
}

/// Rectangle border growing inward from the given edges.
pub fn stroke_rect(
    img: &mut RgbaImage,
    x0: i32,
    y0: i32,
    x1: i32,
    y1: i32,
    color: Rgba<u8>,
    thickness: u32,
) {
    let t = thickness.max(1) as i32 - 1;
    fill_rect_alpha(img, x0, y0, x1, y0 + t, color);
    fill_rect_alpha(img, x0, y1 - t, x1, y1, color);
    fill_rect_alpha(img, x0, y0 + t + 1, x0 + t, y1 - t - 1, color);
    fill_rect_alpha(img, x1 - t, y0 + t + 1, x1, y1 - t - 1, color);
}

/// Dashed 2px border, used for the region selection outline.
pub fn stroke_dashed_rect(
    img: &mut RgbaImage,
    x0: i32,
    y0: i32,
    x1: i32,
    y1: i32,
    color: Rgba<u8>,
    dash: i32,
) {
    let dash = dash.max(1);
    let on = |i: i32| (i / dash) % 2 == 0;
    for x in x0..=x1 {
        if on(x - x0) {
            fill_rect_alpha(img, x, y0, x, y0 + 1, color);
            fill_rect_alpha(img, x, y1 - 1, x, y1, color);
        }
    }
    for y in (y0 + 2)..=(y1 - 2) {
        if on(y - y0) {
            fill_rect_alpha(img, x0, y, x0 + 1, y, color);
            fill_rect_alpha(img, x1 - 1, y, x1, y, color);
        }
    }
}

/// Pixel coverage collected before a single blend pass.
struct CoverageMask {
    width: u32,
    height: u32,
    covered: Vec<bool>,
}

impl CoverageMask {
    fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            covered: vec![false; (width as usize) * (height as usize)],
        }
    }

    fn set(&mut self, x: i32, y: i32) {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return;
        }
        let idx = (y as u32 * self.width + x as u32) as usize;
        self.covered[idx] = true;
    }

    fn stamp_disc(&mut self, cx: f64, cy: f64, radius: f64) {
        let min_x = (cx - radius).floor() as i32;
        let max_x = (cx + radius).ceil() as i32;
        let min_y = (cy - radius).floor() as i32;
        let max_y = (cy + radius).ceil() as i32;
        let r2 = radius * radius;
        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let dx = f64::from(x) - cx;
                let dy = f64::from(y) - cy;
                if dx * dx + dy * dy <= r2 {
                    self.set(x, y);
                }
            }
        }
    }

    fn stamp_line(&mut self, from: Point, to: Point, radius: f64) {
        let distance = from.distance_to(&to);
        let steps = distance.max(1.0).ceil() as i32;
        for step in 0..=steps {
            let t = f64::from(step) / f64::from(steps);
            self.stamp_disc(
                from.x + (to.x - from.x) * t,
                from.y + (to.y - from.y) * t,
                radius,
            );
        }
    }

    fn blend_onto(&self, img: &mut RgbaImage, color: Rgba<u8>) {
        for y in 0..self.height.min(img.height()) {
            for x in 0..self.width.min(img.width()) {
                if self.covered[(y * self.width + x) as usize] {
                    let dst = *img.get_pixel(x, y);
                    img.put_pixel(x, y, blend_pixel(dst, color));
                }
            }
        }
    }
}
