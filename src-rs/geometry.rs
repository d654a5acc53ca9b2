use serde::{Deserialize, Serialize};

/// Smallest width/height (viewport px) a dragged region must have to be used.
pub const MIN_REGION_SIZE: f64 = 20.0;

/// Pixel coordinate in the canvas' local space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Rectangle in viewport pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Region {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Region {
    /// Normalised rectangle spanned by two drag corners, in any direction.
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self {
            x: a.x.min(b.x),
            y: a.y.min(b.y),
            width: (b.x - a.x).abs(),
            height: (b.y - a.y).abs(),
        }
    }

    /// Zero region used when feedback is sent without a screenshot.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn viewport(width: f64, height: f64) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width,
            height,
        }
    }

    pub fn is_selectable(&self) -> bool {
        self.width >= MIN_REGION_SIZE && self.height >= MIN_REGION_SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// Parse `"x,y"` as used by CLI drag arguments.
pub fn parse_point(raw: &str) -> Option<Point> {
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    if parts.len() != 2 {
        return None;
    }
    let x = parts[0].parse::<f64>().ok()?;
    let y = parts[1].parse::<f64>().ok()?;
    Some(Point::new(x, y))
}

/// Parse `"WxH"` (also accepts `×`).
pub fn parse_size(raw: &str) -> Option<(u32, u32)> {
    let normalized = raw.trim().to_ascii_lowercase().replace('×', "x");
    let (w, h) = normalized.split_once('x')?;
    let w = w.trim().parse::<u32>().ok()?;
    let h = h.trim().parse::<u32>().ok()?;
    if w == 0 || h == 0 {
        return None;
    }
    Some((w, h))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corners_normalize_in_every_direction() {
        let expected = Region {
            x: 10.0,
            y: 20.0,
            width: 30.0,
            height: 40.0,
        };
        let a = Point::new(10.0, 20.0);
        let b = Point::new(40.0, 60.0);
        assert_eq!(Region::from_corners(a, b), expected);
        assert_eq!(Region::from_corners(b, a), expected);
        assert_eq!(
            Region::from_corners(Point::new(40.0, 20.0), Point::new(10.0, 60.0)),
            expected
        );
    }

    #[test]
    fn tiny_regions_are_not_selectable() {
        assert!(!Region::from_corners(Point::new(0.0, 0.0), Point::new(5.0, 5.0)).is_selectable());
        assert!(!Region::from_corners(Point::new(0.0, 0.0), Point::new(100.0, 19.0)).is_selectable());
        assert!(Region::from_corners(Point::new(0.0, 0.0), Point::new(20.0, 20.0)).is_selectable());
    }

    #[test]
    fn parses_cli_points_and_sizes() {
        assert_eq!(parse_point("12, 34.5"), Some(Point::new(12.0, 34.5)));
        assert_eq!(parse_point("12"), None);
        assert_eq!(parse_size("1280x720"), Some((1280, 720)));
        assert_eq!(parse_size("390 × 844"), Some((390, 844)));
        assert_eq!(parse_size("0x10"), None);
    }
}
