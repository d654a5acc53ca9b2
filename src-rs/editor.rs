//! Annotation editor: marker/arrow/text tools over one base image, with
//! undo/redo/clear and a composite exported after every change.

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::annotation::{Annotation, Tool};
use crate::geometry::Point;
use crate::history::AnnotationHistory;
use crate::input::{Key, KeyEvent, PointerInput};
use crate::render::{self, ImageError};

/// Width reserved for the inline label input when clamping its position.
pub const TEXT_INPUT_WIDTH: f64 = 160.0;

/// Receives the flattened image as a PNG data URL.
pub type ExportFn = Box<dyn FnMut(String)>;

/// Stroke being drawn between pointer down and up.
#[derive(Debug, Clone, PartialEq)]
enum Draft {
    Marker(Vec<Point>),
    Arrow { start: Point, end: Point },
}

impl Draft {
    fn preview(&self) -> Annotation {
        match self {
            Self::Marker(points) => Annotation::Marker {
                points: points.clone(),
            },
            Self::Arrow { start, end } => Annotation::Arrow {
                start: *start,
                end: *end,
            },
        }
    }
}

/// Inline label input opened by the text tool.
#[derive(Debug, Clone, PartialEq)]
pub struct TextEntry {
    /// Where the label will be drawn.
    pub canvas_position: Point,
    /// Where the input box sits inside the container.
    pub overlay_position: Point,
    pub value: String,
}

pub struct AnnotationEditor {
    base: RgbaImage,
    tool: Tool,
    history: AnnotationHistory,
    draft: Option<Draft>,
    text_entry: Option<TextEntry>,
    canvas_origin: Point,
    container_width: f64,
    on_export: Option<ExportFn>,
    last_export: Option<String>,
}

impl std::fmt::Debug for AnnotationEditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnotationEditor")
            .field("size", &self.base.dimensions())
            .field("tool", &self.tool)
            .field("annotations", &self.history.annotations().len())
            .field("redo_depth", &self.history.redo_depth())
            .finish()
    }
}

impl AnnotationEditor {
    pub fn new(base: RgbaImage) -> Self {
        let container_width = f64::from(base.width());
        Self {
            base,
            tool: Tool::default(),
            history: AnnotationHistory::new(),
            draft: None,
            text_entry: None,
            canvas_origin: Point::default(),
            container_width,
            on_export: None,
            last_export: None,
        }
    }

    /// Decoding happens up front so a bad image is reported, not drawn stale.
    pub fn from_data_url(data_url: &str) -> Result<Self, ImageError> {
        Ok(Self::new(render::decode_data_url(data_url)?))
    }

    /// Installs the export callback and immediately exports the current state.
    pub fn with_export(mut self, on_export: ExportFn) -> Self {
        self.on_export = Some(on_export);
        self.redraw();
        self
    }

    /// Canvas placement inside its container, used for pointer coordinates
    /// and for keeping the label input on screen.
    pub fn with_layout(mut self, canvas_origin: Point, container_width: f64) -> Self {
        self.canvas_origin = canvas_origin;
        self.container_width = container_width;
        self
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn annotations(&self) -> &[Annotation] {
        self.history.annotations()
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn is_drawing(&self) -> bool {
        self.draft.is_some()
    }

    pub fn text_entry(&self) -> Option<&TextEntry> {
        self.text_entry.as_ref()
    }

    pub fn last_export(&self) -> Option<&str> {
        self.last_export.as_deref()
    }

    pub fn set_tool(&mut self, tool: Tool) {
        self.tool = tool;
        self.redraw();
    }

    pub fn pointer_down(&mut self, input: &PointerInput) {
        let Some(point) = input.position(self.canvas_origin) else {
            return;
        };

        if self.tool == Tool::Text {
            let overlay = Point::new(
                (point.x + self.canvas_origin.x).min(self.container_width - TEXT_INPUT_WIDTH),
                point.y + self.canvas_origin.y,
            );
            self.text_entry = Some(TextEntry {
                canvas_position: point,
                overlay_position: overlay,
                value: String::new(),
            });
            return;
        }

        self.draft = Some(match self.tool {
            Tool::Arrow => Draft::Arrow {
                start: point,
                end: point,
            },
            _ => Draft::Marker(vec![point]),
        });
        self.redraw();
    }

    pub fn pointer_move(&mut self, input: &PointerInput) {
        let Some(point) = input.position(self.canvas_origin) else {
            return;
        };
        match self.draft.as_mut() {
            Some(Draft::Marker(points)) => points.push(point),
            Some(Draft::Arrow { end, .. }) => *end = point,
            None => return,
        }
        self.redraw();
    }

    /// Also used for pointer-leave and touch-end.
    pub fn pointer_up(&mut self) {
        let Some(draft) = self.draft.take() else {
            return;
        };
        match draft {
            Draft::Marker(points) if points.len() >= 2 => {
                self.history.commit(Annotation::Marker { points });
            }
            Draft::Marker(_) => debug!("discarded marker stroke with fewer than 2 points"),
            // Degenerate arrows are dropped just like single-point markers.
            Draft::Arrow { start, end } if start.distance_to(&end) >= 1.0 => {
                self.history.commit(Annotation::Arrow { start, end });
            }
            Draft::Arrow { .. } => debug!("discarded zero-length arrow"),
        }
        self.redraw();
    }

    pub fn set_text_value(&mut self, value: &str) {
        if let Some(entry) = self.text_entry.as_mut() {
            entry.value = value.to_string();
        }
    }

    /// Commits the label when it is non-empty after trimming; the input
    /// closes either way.
    pub fn submit_text(&mut self) {
        let Some(entry) = self.text_entry.take() else {
            return;
        };
        let text = entry.value.trim();
        if text.is_empty() {
            return;
        }
        self.history.commit(Annotation::Text {
            position: entry.canvas_position,
            text: text.to_string(),
        });
        self.redraw();
    }

    pub fn cancel_text(&mut self) {
        self.text_entry = None;
    }

    /// Keys typed into the label input.
    pub fn text_key(&mut self, event: &KeyEvent) {
        match event.key {
            Key::Enter => self.submit_text(),
            Key::Escape => self.cancel_text(),
            _ => {}
        }
    }

    pub fn undo(&mut self) {
        if self.history.undo() {
            self.redraw();
        }
    }

    pub fn redo(&mut self) {
        if self.history.redo() {
            self.redraw();
        }
    }

    pub fn clear(&mut self) {
        if self.history.clear() {
            self.redraw();
        }
    }

    /// Editor-wide shortcuts. Returns true when the key was handled.
    pub fn handle_key(&mut self, event: &KeyEvent) -> bool {
        if event.in_text_input {
            return false;
        }
        let Some(key) = event.lower_char() else {
            return false;
        };

        if event.command() {
            match key {
                'z' if !event.shift => self.undo(),
                'z' | 'y' => self.redo(),
                'x' if event.shift => self.clear(),
                _ => return false,
            }
            return true;
        }

        match Tool::from_shortcut(key) {
            Some(tool) => {
                self.set_tool(tool);
                true
            }
            None => false,
        }
    }

    /// Current composite, including the stroke in progress.
    pub fn render(&self) -> RgbaImage {
        let preview = self.draft.as_ref().map(Draft::preview);
        render::compose(&self.base, self.history.annotations(), preview.as_ref())
    }

    pub fn export(&self) -> Result<String, ImageError> {
        render::encode_png_data_url(&self.render())
    }

    fn redraw(&mut self) {
        if self.on_export.is_none() {
            return;
        }
        match self.export() {
            Ok(data_url) => {
                self.last_export = Some(data_url.clone());
                if let Some(on_export) = self.on_export.as_mut() {
                    on_export(data_url);
                }
            }
            Err(err) => warn!("annotation export failed: {err}"),
        }
    }

    pub fn apply(&mut self, command: &EditorCommand) {
        match command {
            EditorCommand::Tool { tool } => self.set_tool(*tool),
            EditorCommand::Down { input } => self.pointer_down(input),
            EditorCommand::Move { input } => self.pointer_move(input),
            EditorCommand::Up | EditorCommand::Leave => self.pointer_up(),
            EditorCommand::Type { text } => self.set_text_value(text),
            EditorCommand::Enter => self.submit_text(),
            EditorCommand::Escape => self.cancel_text(),
            EditorCommand::Key { key } => {
                self.handle_key(key);
            }
            EditorCommand::Undo => self.undo(),
            EditorCommand::Redo => self.redo(),
            EditorCommand::Clear => self.clear(),
        }
    }
}

/// One scripted editor interaction, as read from an annotate script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EditorCommand {
    Tool {
        tool: Tool,
    },
    Down {
        #[serde(flatten)]
        input: PointerInput,
    },
    Move {
        #[serde(flatten)]
        input: PointerInput,
    },
    Up,
    Leave,
    /// Replaces the label input's contents.
    Type {
        text: String,
    },
    Enter,
    Escape,
    Key {
        #[serde(flatten)]
        key: KeyEvent,
    },
    Undo,
    Redo,
    Clear,
}

/// Script files are either a bare list of commands or `{"events": [...]}`.
pub fn parse_script(raw: &str) -> serde_json::Result<Vec<EditorCommand>> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Script {
        List(Vec<EditorCommand>),
        Wrapped { events: Vec<EditorCommand> },
    }

    Ok(match serde_json::from_str::<Script>(raw)? {
        Script::List(events) | Script::Wrapped { events } => events,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn editor() -> AnnotationEditor {
        AnnotationEditor::new(RgbaImage::from_pixel(200, 120, Rgba([255, 255, 255, 255])))
    }

    fn at(x: f64, y: f64) -> PointerInput {
        PointerInput::mouse(x, y)
    }

    fn draw_marker(ed: &mut AnnotationEditor) {
        ed.set_tool(Tool::Marker);
        ed.pointer_down(&at(10.0, 10.0));
        ed.pointer_move(&at(20.0, 15.0));
        ed.pointer_move(&at(30.0, 25.0));
        ed.pointer_up();
    }

    fn draw_arrow(ed: &mut AnnotationEditor) {
        ed.set_tool(Tool::Arrow);
        ed.pointer_down(&at(50.0, 50.0));
        ed.pointer_move(&at(80.0, 60.0));
        ed.pointer_move(&at(100.0, 90.0));
        ed.pointer_up();
    }

    #[test]
    fn click_with_marker_commits_nothing() {
        let mut ed = editor();
        ed.pointer_down(&at(10.0, 10.0));
        ed.pointer_up();
        assert!(ed.annotations().is_empty());
        assert!(!ed.is_drawing());
    }

    #[test]
    fn marker_then_arrow_undo_redo_scenario() {
        let mut ed = editor();
        draw_marker(&mut ed);
        draw_arrow(&mut ed);
        assert_eq!(ed.annotations().len(), 2);
        let before = ed.annotations().to_vec();

        ed.undo();
        assert_eq!(ed.annotations().len(), 1);
        assert_eq!(ed.annotations()[0].kind(), "marker");

        ed.redo();
        assert_eq!(ed.annotations(), before.as_slice());
        assert_eq!(
            ed.annotations()[1],
            Annotation::Arrow {
                start: Point::new(50.0, 50.0),
                end: Point::new(100.0, 90.0),
            }
        );
    }

    #[test]
    fn zero_length_arrow_is_discarded() {
        let mut ed = editor();
        ed.set_tool(Tool::Arrow);
        ed.pointer_down(&at(40.0, 40.0));
        ed.pointer_up();
        assert!(ed.annotations().is_empty());
    }

    #[test]
    fn text_enter_commits_and_escape_discards() {
        let mut ed = editor();
        ed.set_tool(Tool::Text);
        ed.pointer_down(&at(50.0, 60.0));
        ed.set_text_value("Great spike!");
        ed.text_key(&KeyEvent::plain(Key::Enter));
        assert_eq!(
            ed.annotations(),
            &[Annotation::Text {
                position: Point::new(50.0, 60.0),
                text: "Great spike!".to_string(),
            }]
        );
        assert!(ed.text_entry().is_none());

        let mut ed = editor();
        ed.set_tool(Tool::Text);
        ed.pointer_down(&at(50.0, 60.0));
        ed.set_text_value("Great spike!");
        ed.text_key(&KeyEvent::plain(Key::Escape));
        assert!(ed.annotations().is_empty());
        assert!(ed.text_entry().is_none());
    }

    #[test]
    fn blank_text_is_not_committed() {
        let mut ed = editor();
        ed.set_tool(Tool::Text);
        ed.pointer_down(&at(5.0, 5.0));
        ed.set_text_value("   ");
        ed.submit_text();
        assert!(ed.annotations().is_empty());
    }

    #[test]
    fn text_overlay_is_clamped_inside_container() {
        let mut ed = editor().with_layout(Point::new(10.0, 20.0), 300.0);
        ed.set_tool(Tool::Text);
        ed.pointer_down(&at(250.0, 60.0));
        let entry = ed.text_entry().unwrap();
        assert_eq!(entry.canvas_position, Point::new(240.0, 40.0));
        assert_eq!(entry.overlay_position, Point::new(140.0, 60.0));
    }

    #[test]
    fn shortcuts_switch_tools_and_edit_history() {
        let mut ed = editor();
        assert!(ed.handle_key(&KeyEvent::char('2')));
        assert_eq!(ed.tool(), Tool::Arrow);
        assert!(ed.handle_key(&KeyEvent::char('T')));
        assert_eq!(ed.tool(), Tool::Text);
        assert!(ed.handle_key(&KeyEvent::char('m')));
        assert_eq!(ed.tool(), Tool::Marker);

        draw_marker(&mut ed);
        draw_arrow(&mut ed);
        assert!(ed.handle_key(&KeyEvent::ctrl('z')));
        assert_eq!(ed.annotations().len(), 1);
        assert!(ed.handle_key(&KeyEvent::ctrl_shift('z')));
        assert_eq!(ed.annotations().len(), 2);
        ed.handle_key(&KeyEvent::ctrl('z'));
        assert!(ed.handle_key(&KeyEvent::ctrl('y')));
        assert_eq!(ed.annotations().len(), 2);
        assert!(ed.handle_key(&KeyEvent::ctrl_shift('x')));
        assert!(ed.annotations().is_empty());
        ed.redo();
        assert_eq!(ed.annotations().len(), 2);
    }

    #[test]
    fn shortcuts_are_ignored_while_typing_or_with_ctrl_tool_keys() {
        let mut ed = editor();
        let typing = KeyEvent {
            in_text_input: true,
            ..KeyEvent::char('a')
        };
        assert!(!ed.handle_key(&typing));
        assert_eq!(ed.tool(), Tool::Marker);
        assert!(!ed.handle_key(&KeyEvent::ctrl('a')));
        assert_eq!(ed.tool(), Tool::Marker);
    }

    #[test]
    fn every_change_exports_a_fresh_composite() {
        let exports = Rc::new(RefCell::new(Vec::<String>::new()));
        let sink = Rc::clone(&exports);
        let mut ed = editor().with_export(Box::new(move |url| sink.borrow_mut().push(url)));
        assert_eq!(exports.borrow().len(), 1);

        ed.pointer_down(&at(10.0, 10.0));
        ed.pointer_move(&at(40.0, 40.0));
        ed.pointer_up();
        // down, move, up
        assert_eq!(exports.borrow().len(), 4);

        let last = exports.borrow().last().cloned().unwrap();
        let decoded = render::decode_data_url(&last).unwrap();
        assert_eq!(decoded, ed.render());
        assert_eq!(ed.last_export(), Some(last.as_str()));

        ed.undo();
        assert_eq!(exports.borrow().len(), 5);
        // Undo with nothing left is a no-op and does not export.
        ed.undo();
        assert_eq!(exports.borrow().len(), 5);
    }

    #[test]
    fn touch_input_draws_like_mouse() {
        let mut ed = editor();
        ed.pointer_down(&PointerInput::touch(10.0, 10.0));
        ed.pointer_move(&PointerInput::touch(30.0, 30.0));
        ed.pointer_up();
        assert_eq!(ed.annotations().len(), 1);
    }

    #[test]
    fn scripts_replay_through_apply() {
        let raw = r#"{"events": [
            {"event": "tool", "tool": "arrow"},
            {"event": "down", "kind": "mouse", "client_x": 10, "client_y": 10},
            {"event": "move", "kind": "mouse", "client_x": 60, "client_y": 40},
            {"event": "up"},
            {"event": "key", "key": {"char": "3"}},
            {"event": "down", "kind": "touch", "touches": [{"client_x": 50, "client_y": 60}]},
            {"event": "type", "text": "Great spike!"},
            {"event": "enter"},
            {"event": "key", "key": {"char": "z"}, "ctrl": true}
        ]}"#;
        let commands = parse_script(raw).unwrap();
        assert_eq!(commands.len(), 9);

        let mut ed = editor();
        for command in &commands {
            ed.apply(command);
        }
        assert_eq!(ed.tool(), Tool::Text);
        assert_eq!(ed.annotations().len(), 1);
        assert_eq!(ed.annotations()[0].kind(), "arrow");
        assert!(ed.can_redo());
    }

    #[test]
    fn undecodable_base_image_is_an_error() {
        assert!(AnnotationEditor::from_data_url("data:image/png;base64,AAAA").is_err());
    }
}
