use image::Rgba;
use serde::{Deserialize, Serialize};

use crate::geometry::Point;

/// `#EF4444`
pub const ANNOTATION_COLOR: Rgba<u8> = Rgba([239, 68, 68, 255]);
pub const MARKER_WIDTH: f64 = 4.0;
pub const MARKER_OPACITY: f64 = 0.8;
pub const ARROW_WIDTH: f64 = 3.0;
pub const ARROW_HEAD_SIZE: f64 = 12.0;
pub const TEXT_SIZE: u32 = 14;
pub const TEXT_PADDING: i32 = 4;
pub const TEXT_BORDER: u32 = 2;

/// One committed marking. Vector order is z-order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Annotation {
    Marker { points: Vec<Point> },
    Arrow { start: Point, end: Point },
    Text { position: Point, text: String },
}

impl Annotation {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Marker { .. } => "marker",
            Self::Arrow { .. } => "arrow",
            Self::Text { .. } => "text",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    #[default]
    Marker,
    Arrow,
    Text,
}

impl Tool {
    /// 1/M, 2/A, 3/T
    pub fn from_shortcut(key: char) -> Option<Self> {
        match key.to_ascii_lowercase() {
            '1' | 'm' => Some(Self::Marker),
            '2' | 'a' => Some(Self::Arrow),
            '3' | 't' => Some(Self::Text),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Marker => "Marker",
            Self::Arrow => "Arrow",
            Self::Text => "Text",
        }
    }
}

/// Editor keyboard shortcuts, as shown in the toolbar help.
pub const SHORTCUTS: [(&str, &str); 6] = [
    ("1 / M", "Marker tool"),
    ("2 / A", "Arrow tool"),
    ("3 / T", "Text tool"),
    ("Ctrl+Z", "Undo"),
    ("Ctrl+Y", "Redo"),
    ("Ctrl+Shift+X", "Clear all"),
];

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_shortcuts_accept_digits_and_letters() {
        assert_eq!(Tool::from_shortcut('1'), Some(Tool::Marker));
        assert_eq!(Tool::from_shortcut('A'), Some(Tool::Arrow));
        assert_eq!(Tool::from_shortcut('t'), Some(Tool::Text));
        assert_eq!(Tool::from_shortcut('x'), None);
    }

    #[test]
    fn annotations_serialize_with_type_tag() {
        let ann = Annotation::Text {
            position: Point::new(50.0, 60.0),
            text: "Great spike!".to_string(),
        };
        let value = serde_json::to_value(&ann).unwrap();
        assert_eq!(
            value,
            json!({"type": "text", "position": {"x": 50.0, "y": 60.0}, "text": "Great spike!"})
        );
    }
}
