//! Pointer and keyboard events shared by the region selector, the
//! annotation editor and the session's global shortcuts.

use serde::{Deserialize, Serialize};

use crate::geometry::Point;

/// One touch contact in client coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TouchPoint {
    pub client_x: f64,
    pub client_y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PointerInput {
    Mouse {
        client_x: f64,
        client_y: f64,
    },
    Touch {
        #[serde(default)]
        touches: Vec<TouchPoint>,
        #[serde(default)]
        changed_touches: Vec<TouchPoint>,
    },
}

impl PointerInput {
    pub fn mouse(client_x: f64, client_y: f64) -> Self {
        Self::Mouse { client_x, client_y }
    }

    pub fn touch(client_x: f64, client_y: f64) -> Self {
        Self::Touch {
            touches: vec![TouchPoint { client_x, client_y }],
            changed_touches: Vec::new(),
        }
    }

    /// Client position; touches prefer the first active contact and fall
    /// back to the last changed one (touch end has no active contacts).
    pub fn client_position(&self) -> Option<Point> {
        match self {
            Self::Mouse { client_x, client_y } => Some(Point::new(*client_x, *client_y)),
            Self::Touch {
                touches,
                changed_touches,
            } => touches
                .first()
                .or_else(|| changed_touches.first())
                .map(|t| Point::new(t.client_x, t.client_y)),
        }
    }

    /// Position relative to a surface whose top-left sits at `origin`.
    pub fn position(&self, origin: Point) -> Option<Point> {
        self.client_position()
            .map(|p| Point::new(p.x - origin.x, p.y - origin.y))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Key {
    Char(char),
    Enter,
    Escape,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub key: Key,
    #[serde(default)]
    pub ctrl: bool,
    #[serde(default)]
    pub meta: bool,
    #[serde(default)]
    pub shift: bool,
    /// Focus is inside a text field; shortcuts must not fire.
    #[serde(default)]
    pub in_text_input: bool,
}

impl KeyEvent {
    pub fn plain(key: Key) -> Self {
        Self {
            key,
            ctrl: false,
            meta: false,
            shift: false,
            in_text_input: false,
        }
    }

    pub fn char(c: char) -> Self {
        Self::plain(Key::Char(c))
    }

    pub fn ctrl(c: char) -> Self {
        Self {
            ctrl: true,
            ..Self::char(c)
        }
    }

    pub fn ctrl_shift(c: char) -> Self {
        Self {
            ctrl: true,
            shift: true,
            ..Self::char(c)
        }
    }

    /// Ctrl on Linux/Windows, Cmd on macOS.
    pub fn command(&self) -> bool {
        self.ctrl || self.meta
    }

    /// Lowercased character, if the key is one.
    pub fn lower_char(&self) -> Option<char> {
        match self.key {
            Key::Char(c) => c.to_lowercase().next(),
            _ => None,
        }
    }
}
