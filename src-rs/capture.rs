//! Full-screen capture through the platform screenshot tool.

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context, Result};
use image::imageops::FilterType;
use image::RgbaImage;
use rand::Rng;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::util::{abs_path, command_exists, ensure_parent_dir, round_to, timestamp_compact, timestamp_iso};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureOptions {
    /// Output pixels per viewport pixel, already capped at 2.
    pub scale: f64,
    /// Viewport size in CSS pixels, when known.
    pub viewport: Option<(u32, u32)>,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            scale: 1.0,
            viewport: None,
        }
    }
}

impl CaptureOptions {
    pub fn new(device_pixel_ratio: f64, viewport: Option<(u32, u32)>) -> Self {
        Self {
            scale: device_pixel_ratio.clamp(0.1, 2.0),
            viewport,
        }
    }

    /// Pixel size the capture should have, if the viewport is known.
    pub fn target_size(&self) -> Option<(u32, u32)> {
        self.viewport.map(|(w, h)| {
            (
                (f64::from(w) * self.scale).round().max(1.0) as u32,
                (f64::from(h) * self.scale).round().max(1.0) as u32,
            )
        })
    }
}

/// Renders the current screen into a bitmap.
pub trait ScreenCapturer {
    fn capture(&self, options: &CaptureOptions) -> Result<RgbaImage>;
}

impl<T: ScreenCapturer + ?Sized> ScreenCapturer for Box<T> {
    fn capture(&self, options: &CaptureOptions) -> Result<RgbaImage> {
        (**self).capture(options)
    }
}

/// Uses an existing image as the "screen", for headless runs.
#[derive(Debug, Clone)]
pub struct ImageFileCapturer {
    path: PathBuf,
}

impl ImageFileCapturer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ScreenCapturer for ImageFileCapturer {
    fn capture(&self, options: &CaptureOptions) -> Result<RgbaImage> {
        let image = image::open(&self.path)
            .with_context(|| format!("failed to open screenshot: {}", self.path.display()))?
            .to_rgba8();
        debug!(path = %self.path.display(), "loaded screenshot from file");
        normalize_capture(image, options)
    }
}

/// Shells out to `screencapture` (macOS), `grim` or ImageMagick `import`.
#[derive(Debug, Clone)]
pub struct SystemCapturer {
    captures_dir: PathBuf,
}

impl SystemCapturer {
    pub fn new(out_root: &Path) -> Self {
        Self {
            captures_dir: out_root.join("capture"),
        }
    }

    pub fn next_path(&self) -> PathBuf {
        let rand = rand::thread_rng().gen_range(1000..9999);
        self.captures_dir.join(format!(
            "screen-{}-{}-{rand}.png",
            timestamp_compact(),
            std::process::id()
        ))
    }

    /// Writes a raw screenshot to `out_path` and reports which tool made it.
    pub fn capture_to(&self, out_path: &Path) -> Result<&'static str> {
        ensure_parent_dir(out_path)?;
        let attempts: &[(&'static str, &[&str])] = if cfg!(target_os = "macos") {
            &[("screencapture", &["-x"])]
        } else {
            &[("grim", &[]), ("import", &["-window", "root"])]
        };

        for (tool, args) in attempts {
            if !command_exists(tool) {
                debug!(tool, "screenshot tool not available");
                continue;
            }
            let ok = Command::new(tool)
                .args(*args)
                .arg(out_path)
                .status()
                .map(|s| s.success())
                .unwrap_or(false);
            if ok && out_path.exists() {
                return Ok(*tool);
            }
            debug!(tool, "screenshot tool failed");
        }
        bail!("no working screenshot tool found (tried screencapture/grim/import)")
    }
}

impl ScreenCapturer for SystemCapturer {
    /// The raw screenshot file only lives until it is decoded.
    fn capture(&self, options: &CaptureOptions) -> Result<RgbaImage> {
        let path = self.next_path();
        let tool = self.capture_to(&path)?;
        let image = read_and_discard(&path)?;
        info!(tool, "captured screen");
        normalize_capture(image, options)
    }
}

/// Decodes a capture file and removes it, whether or not decoding worked.
fn read_and_discard(path: &Path) -> Result<RgbaImage> {
    let decoded = image::open(path);
    if let Err(err) = std::fs::remove_file(path) {
        debug!(path = %path.display(), "could not remove capture file: {err}");
    }
    Ok(decoded
        .with_context(|| format!("failed to read capture image: {}", path.display()))?
        .to_rgba8())
}

/// Rejects empty captures and resizes to `viewport * scale` when the
/// viewport is known.
pub fn normalize_capture(image: RgbaImage, options: &CaptureOptions) -> Result<RgbaImage> {
    if image.width() == 0 || image.height() == 0 {
        bail!("capture produced an empty image");
    }
    match options.target_size() {
        Some((w, h)) if (w, h) != image.dimensions() => {
            Ok(image::imageops::resize(&image, w, h, FilterType::Triangle))
        }
        _ => Ok(image),
    }
}

/// Sidecar JSON describing a saved capture.
pub fn capture_metadata(
    image_path: &Path,
    image: &RgbaImage,
    options: &CaptureOptions,
    sidecar: Option<&Path>,
) -> Value {
    let (image_w, image_h) = image.dimensions();
    let viewport = options.viewport.unwrap_or_else(|| {
        (
            (f64::from(image_w) / options.scale).round() as u32,
            (f64::from(image_h) / options.scale).round() as u32,
        )
    });
    json!({
        "image_path": abs_path(image_path).display().to_string(),
        "sidecar_path": sidecar.map(|p| abs_path(p).display().to_string()),
        "captured_at": timestamp_iso(),
        "image_size": {"w": image_w, "h": image_h, "units": "px"},
        "viewport": {"w": viewport.0, "h": viewport.1, "units": "css_px"},
        "scale": round_to(options.scale, 6),
        "capture_tool": "feedback-capture capture",
        "capture_sidecar_version": 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::path::PathBuf;

    #[test]
    fn scale_is_capped_at_two() {
        assert_eq!(CaptureOptions::new(3.0, None).scale, 2.0);
        assert_eq!(CaptureOptions::new(1.5, None).scale, 1.5);
        assert_eq!(
            CaptureOptions::new(3.0, Some((100, 50))).target_size(),
            Some((200, 100))
        );
    }

    #[test]
    fn empty_capture_is_a_failure() {
        let err = normalize_capture(RgbaImage::new(0, 0), &CaptureOptions::default());
        assert!(err.is_err());
    }

    #[test]
    fn capture_is_resized_to_scaled_viewport() {
        let raw = RgbaImage::from_pixel(300, 150, Rgba([1, 2, 3, 255]));
        let options = CaptureOptions::new(2.0, Some((100, 50)));
        let normalized = normalize_capture(raw, &options).unwrap();
        assert_eq!(normalized.dimensions(), (200, 100));
    }

    #[test]
    fn capture_paths_land_in_capture_dir() {
        let capturer = SystemCapturer::new(Path::new("/tmp/fbc"));
        let path = capturer.next_path();
        assert_eq!(path.parent(), Some(PathBuf::from("/tmp/fbc/capture").as_path()));
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("png"));
    }

    #[test]
    fn file_capturer_reads_and_normalizes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("screen.png");
        RgbaImage::from_pixel(40, 20, Rgba([9, 9, 9, 255])).save(&path).unwrap();

        let capturer: Box<dyn ScreenCapturer> = Box::new(ImageFileCapturer::new(&path));
        let image = capturer.capture(&CaptureOptions::new(1.0, Some((20, 10)))).unwrap();
        assert_eq!(image.dimensions(), (20, 10));

        let missing = ImageFileCapturer::new(dir.path().join("missing.png"));
        assert!(missing.capture(&CaptureOptions::default()).is_err());
    }

    #[test]
    fn session_capture_file_is_removed_after_decoding() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("screen.png");
        RgbaImage::from_pixel(8, 4, Rgba([5, 6, 7, 255])).save(&path).unwrap();

        let image = read_and_discard(&path).unwrap();
        assert_eq!(image.dimensions(), (8, 4));
        assert!(!path.exists());

        let broken = dir.path().join("broken.png");
        std::fs::write(&broken, b"not a png").unwrap();
        assert!(read_and_discard(&broken).is_err());
        assert!(!broken.exists());
    }

    #[test]
    fn metadata_derives_viewport_from_scale() {
        let image = RgbaImage::new(200, 100);
        let options = CaptureOptions::new(2.0, None);
        let meta = capture_metadata(Path::new("/tmp/shot.png"), &image, &options, None);
        assert_eq!(meta["viewport"]["w"], 100);
        assert_eq!(meta["viewport"]["h"], 50);
        assert_eq!(meta["image_size"]["w"], 200);
        assert!(meta["sidecar_path"].is_null());
    }
}
