//! Drag-to-select over a captured screenshot.

use image::{Rgba, RgbaImage};
use tracing::debug;

use crate::geometry::{Point, Region};
use crate::input::{Key, KeyEvent, PointerInput};
use crate::render::{fill_rect_alpha, stroke_dashed_rect};

const OVERLAY_DIM: Rgba<u8> = Rgba([0, 0, 0, 153]);
const SELECTION_BORDER: Rgba<u8> = Rgba([59, 130, 246, 255]);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SelectorState {
    Idle,
    Selecting { start: Point, current: Point },
}

#[derive(Debug, Clone, PartialEq)]
pub enum RegionEvent {
    PointerDown(PointerInput),
    PointerMove(PointerInput),
    PointerUp,
    PointerLeave,
    Key(KeyEvent),
    Cancel,
    FullScreen,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RegionOutcome {
    Selected { region: Region, image: RgbaImage },
    FullScreen { region: Region, image: RgbaImage },
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct RegionSelector {
    screenshot: RgbaImage,
    device_pixel_ratio: f64,
    state: SelectorState,
}

impl RegionSelector {
    /// `device_pixel_ratio` maps viewport pixels onto screenshot pixels.
    pub fn new(screenshot: RgbaImage, device_pixel_ratio: f64) -> Self {
        Self {
            screenshot,
            device_pixel_ratio: if device_pixel_ratio > 0.0 {
                device_pixel_ratio
            } else {
                1.0
            },
            state: SelectorState::Idle,
        }
    }

    pub fn state(&self) -> SelectorState {
        self.state
    }

    pub fn screenshot(&self) -> &RgbaImage {
        &self.screenshot
    }

    /// Viewport size in CSS pixels.
    pub fn viewport(&self) -> Region {
        Region::viewport(
            f64::from(self.screenshot.width()) / self.device_pixel_ratio,
            f64::from(self.screenshot.height()) / self.device_pixel_ratio,
        )
    }

    /// Rectangle currently being dragged.
    pub fn selection(&self) -> Option<Region> {
        match self.state {
            SelectorState::Idle => None,
            SelectorState::Selecting { start, current } => Some(Region::from_corners(start, current)),
        }
    }

    pub fn handle(&mut self, event: RegionEvent) -> Option<RegionOutcome> {
        match event {
            RegionEvent::PointerDown(input) => {
                let point = self.clamp_to_viewport(input.client_position()?);
                self.state = SelectorState::Selecting {
                    start: point,
                    current: point,
                };
                None
            }
            RegionEvent::PointerMove(input) => {
                if let (SelectorState::Selecting { start, .. }, Some(point)) =
                    (self.state, input.client_position())
                {
                    self.state = SelectorState::Selecting {
                        start,
                        current: self.clamp_to_viewport(point),
                    };
                }
                None
            }
            RegionEvent::PointerUp | RegionEvent::PointerLeave => self.finish(),
            RegionEvent::Key(key) if key.key == Key::Escape => self.cancel(),
            RegionEvent::Key(_) => None,
            RegionEvent::Cancel => self.cancel(),
            RegionEvent::FullScreen => {
                self.state = SelectorState::Idle;
                Some(RegionOutcome::FullScreen {
                    region: self.viewport(),
                    image: self.screenshot.clone(),
                })
            }
        }
    }

    /// The overlay covers the viewport, so pointers never land outside it.
    fn clamp_to_viewport(&self, point: Point) -> Point {
        let viewport = self.viewport();
        let clamp = |v: f64, max: f64| if v.is_nan() { 0.0 } else { v.clamp(0.0, max) };
        Point::new(clamp(point.x, viewport.width), clamp(point.y, viewport.height))
    }

    fn cancel(&mut self) -> Option<RegionOutcome> {
        self.state = SelectorState::Idle;
        Some(RegionOutcome::Cancelled)
    }

    fn finish(&mut self) -> Option<RegionOutcome> {
        let region = self.selection()?;
        self.state = SelectorState::Idle;
        if !region.is_selectable() {
            debug!(
                width = region.width,
                height = region.height,
                "region below minimum size; ignoring"
            );
            return None;
        }
        let image = crop_scaled(&self.screenshot, region, self.device_pixel_ratio);
        Some(RegionOutcome::Selected { region, image })
    }

    /// Screenshot dimmed outside the current selection, with a dashed border
    /// around it.
    pub fn overlay(&self) -> RgbaImage {
        let mut out = self.screenshot.clone();
        let dpr = self.device_pixel_ratio;
        let w = out.width() as i32;
        let h = out.height() as i32;
        let Some(region) = self.selection() else {
            fill_rect_alpha(&mut out, 0, 0, w - 1, h - 1, OVERLAY_DIM);
            return out;
        };

        let x0 = (region.x * dpr).round() as i32;
        let y0 = (region.y * dpr).round() as i32;
        let x1 = ((region.x + region.width) * dpr).round() as i32;
        let y1 = ((region.y + region.height) * dpr).round() as i32;

        let strips = [
            (0, 0, w - 1, y0 - 1),
            (0, y1, w - 1, h - 1),
            (0, y0, x0 - 1, y1 - 1),
            (x1, y0, w - 1, y1 - 1),
        ];
        for (sx0, sy0, sx1, sy1) in strips {
            // fill_rect_alpha swaps reversed corners; an empty strip stays empty.
            if sx0 <= sx1 && sy0 <= sy1 {
                fill_rect_alpha(&mut out, sx0, sy0, sx1, sy1, OVERLAY_DIM);
            }
        }
        if region.width > 0.0 && region.height > 0.0 {
            stroke_dashed_rect(&mut out, x0, y0, x1 - 1, y1 - 1, SELECTION_BORDER, 6);
        }
        out
    }
}

/// Crops `region` (viewport pixels) out of a screenshot rendered at
/// `dpr`. Output is `region * dpr` pixels, never larger than the source;
/// anything outside the source stays transparent.
pub fn crop_scaled(source: &RgbaImage, region: Region, dpr: f64) -> RgbaImage {
    let out_w = (region.width * dpr)
        .round()
        .clamp(0.0, f64::from(source.width())) as u32;
    let out_h = (region.height * dpr)
        .round()
        .clamp(0.0, f64::from(source.height())) as u32;
    let src_x = (region.x * dpr).round() as i64;
    let src_y = (region.y * dpr).round() as i64;

    let mut out = RgbaImage::new(out_w, out_h);
    for y in 0..out_h {
        let sy = src_y + i64::from(y);
        if sy < 0 || sy >= i64::from(source.height()) {
            continue;
        }
        for x in 0..out_w {
            let sx = src_x + i64::from(x);
            if sx < 0 || sx >= i64::from(source.width()) {
                continue;
            }
            out.put_pixel(x, y, *source.get_pixel(sx as u32, sy as u32));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| Rgba([(x % 256) as u8, (y % 256) as u8, 0, 255]))
    }

    fn drag(selector: &mut RegionSelector, from: (f64, f64), to: (f64, f64)) -> Option<RegionOutcome> {
        selector.handle(RegionEvent::PointerDown(PointerInput::mouse(from.0, from.1)));
        selector.handle(RegionEvent::PointerMove(PointerInput::mouse(to.0, to.1)));
        selector.handle(RegionEvent::PointerUp)
    }

    #[test]
    fn small_drag_emits_nothing_and_returns_to_idle() {
        let mut selector = RegionSelector::new(gradient(200, 100), 1.0);
        assert_eq!(drag(&mut selector, (10.0, 10.0), (15.0, 15.0)), None);
        assert_eq!(selector.state(), SelectorState::Idle);
    }

    #[test]
    fn reverse_drag_crops_normalized_region() {
        let mut selector = RegionSelector::new(gradient(200, 100), 1.0);
        let outcome = drag(&mut selector, (80.0, 70.0), (30.0, 20.0)).unwrap();
        let RegionOutcome::Selected { region, image } = outcome else {
            panic!("expected a selection");
        };
        assert_eq!(
            region,
            Region {
                x: 30.0,
                y: 20.0,
                width: 50.0,
                height: 50.0
            }
        );
        assert_eq!(image.dimensions(), (50, 50));
        assert_eq!(*image.get_pixel(0, 0), Rgba([30, 20, 0, 255]));
    }

    #[test]
    fn crop_scales_by_device_pixel_ratio() {
        let mut selector = RegionSelector::new(gradient(400, 200), 2.0);
        let outcome = drag(&mut selector, (10.0, 5.0), (40.0, 35.0)).unwrap();
        let RegionOutcome::Selected { image, .. } = outcome else {
            panic!("expected a selection");
        };
        assert_eq!(image.dimensions(), (60, 60));
        assert_eq!(*image.get_pixel(0, 0), Rgba([20, 10, 0, 255]));
        assert_eq!(*image.get_pixel(59, 59), Rgba([79, 69, 0, 255]));
    }

    #[test]
    fn crop_outside_source_is_transparent() {
        let source = gradient(30, 30);
        let out = crop_scaled(
            &source,
            Region {
                x: 20.0,
                y: 20.0,
                width: 20.0,
                height: 20.0,
            },
            1.0,
        );
        assert_eq!(out.dimensions(), (20, 20));
        assert_eq!(*out.get_pixel(5, 5), Rgba([25, 25, 0, 255]));
        assert_eq!(*out.get_pixel(15, 15), Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn drag_past_the_edge_stops_at_the_viewport() {
        let mut selector = RegionSelector::new(gradient(100, 100), 1.0);
        let outcome = drag(&mut selector, (50.0, 50.0), (400.0, 300.0)).unwrap();
        let RegionOutcome::Selected { region, image } = outcome else {
            panic!("expected a selection");
        };
        assert_eq!(
            region,
            Region {
                x: 50.0,
                y: 50.0,
                width: 50.0,
                height: 50.0
            }
        );
        assert_eq!(image.dimensions(), (50, 50));
        assert_eq!(*image.get_pixel(49, 49), Rgba([99, 99, 0, 255]));

        let outcome = drag(&mut selector, (-20.0, -5.0), (1e10, 1e10)).unwrap();
        let RegionOutcome::Selected { region, image } = outcome else {
            panic!("expected a selection");
        };
        assert_eq!(region, Region::viewport(100.0, 100.0));
        assert_eq!(image.dimensions(), (100, 100));
    }

    #[test]
    fn oversized_crop_is_bounded_by_source() {
        let out = crop_scaled(&gradient(30, 20), Region::viewport(1e12, 1e12), 2.0);
        assert_eq!(out.dimensions(), (30, 20));
    }

    #[test]
    fn escape_and_cancel_abort() {
        let mut selector = RegionSelector::new(gradient(100, 100), 1.0);
        selector.handle(RegionEvent::PointerDown(PointerInput::mouse(1.0, 1.0)));
        assert_eq!(
            selector.handle(RegionEvent::Key(KeyEvent::plain(Key::Escape))),
            Some(RegionOutcome::Cancelled)
        );
        assert_eq!(selector.state(), SelectorState::Idle);
        assert_eq!(selector.handle(RegionEvent::Cancel), Some(RegionOutcome::Cancelled));
        assert_eq!(selector.handle(RegionEvent::Key(KeyEvent::char('q'))), None);
    }

    #[test]
    fn full_screen_returns_whole_capture_with_viewport_region() {
        let shot = gradient(200, 100);
        let mut selector = RegionSelector::new(shot.clone(), 2.0);
        let outcome = selector.handle(RegionEvent::FullScreen).unwrap();
        assert_eq!(
            outcome,
            RegionOutcome::FullScreen {
                region: Region::viewport(100.0, 50.0),
                image: shot,
            }
        );
    }

    #[test]
    fn pointer_leave_finishes_like_pointer_up() {
        let mut selector = RegionSelector::new(gradient(100, 100), 1.0);
        selector.handle(RegionEvent::PointerDown(PointerInput::touch(0.0, 0.0)));
        selector.handle(RegionEvent::PointerMove(PointerInput::touch(40.0, 40.0)));
        assert!(matches!(
            selector.handle(RegionEvent::PointerLeave),
            Some(RegionOutcome::Selected { .. })
        ));
        // Leave without a drag in progress does nothing.
        assert_eq!(selector.handle(RegionEvent::PointerLeave), None);
    }

    #[test]
    fn overlay_dims_outside_selection_only() {
        let mut selector = RegionSelector::new(RgbaImage::from_pixel(100, 100, Rgba([255, 255, 255, 255])), 1.0);
        selector.handle(RegionEvent::PointerDown(PointerInput::mouse(20.0, 20.0)));
        selector.handle(RegionEvent::PointerMove(PointerInput::mouse(80.0, 80.0)));
        let overlay = selector.overlay();
        assert_ne!(*overlay.get_pixel(5, 5), Rgba([255, 255, 255, 255]));
        assert_eq!(*overlay.get_pixel(50, 50), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn selection_at_the_edge_leaves_inside_undimmed() {
        let white = Rgba([255, 255, 255, 255]);
        let mut selector = RegionSelector::new(RgbaImage::from_pixel(100, 100, white), 1.0);
        selector.handle(RegionEvent::PointerDown(PointerInput::mouse(0.0, 0.0)));
        selector.handle(RegionEvent::PointerMove(PointerInput::mouse(60.0, 60.0)));
        let overlay = selector.overlay();
        // Edge row and column, in a gap between dashes.
        assert_eq!(*overlay.get_pixel(30, 0), white);
        assert_eq!(*overlay.get_pixel(0, 30), white);
        assert_eq!(*overlay.get_pixel(30, 30), white);
        assert_ne!(*overlay.get_pixel(80, 80), white);
    }
}
