//! One feedback round trip: trigger, capture, select, annotate, submit.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use image::RgbaImage;
use tracing::{debug, info, warn};

use crate::capture::{CaptureOptions, ScreenCapturer};
use crate::client::{FeedbackTransport, SubmitError, SubmitResponse};
use crate::config::Config;
use crate::diagnostics::{self, DiagnosticsSnapshot, DiagnosticsStore};
use crate::editor::{AnnotationEditor, EditorCommand};
use crate::feedback::{FeedbackForm, FeedbackMetadata, FeedbackSubmission, FormError, Reporter};
use crate::geometry::Region;
use crate::input::KeyEvent;
use crate::region::{RegionEvent, RegionOutcome, RegionSelector};
use crate::render::encode_png_data_url;

pub const SUBMIT_SUCCESS_MESSAGE: &str = "Feedback submitted! Thanks for helping improve the app.";
pub const SUBMIT_FAILURE_MESSAGE: &str = "Failed to submit feedback. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    /// Picking full screen, region or text only.
    Choosing,
    Selecting,
    /// The form is open; the editor exists only when there is a screenshot.
    Annotating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    FullScreen,
    Region,
    TextOnly,
}

impl CaptureMode {
    /// Ctrl/Cmd+Shift+<key>.
    pub fn from_shortcut(key: char) -> Option<Self> {
        match key {
            'f' => Some(Self::TextOnly),
            's' => Some(Self::FullScreen),
            'a' => Some(Self::Region),
            _ => None,
        }
    }
}

/// Transient notification shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Success {
        message: String,
        issue_url: Option<String>,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Sent(SubmitResponse),
    Invalid(Vec<FormError>),
    Failed(String),
    /// A previous submission has not finished yet.
    Busy,
    NotOpen,
}

pub struct FeedbackSession<C: ScreenCapturer> {
    config: Config,
    capturer: C,
    store: Arc<DiagnosticsStore>,
    phase: Phase,
    trigger_visible: bool,
    diagnostics: Option<DiagnosticsSnapshot>,
    selector: Option<RegionSelector>,
    editor: Option<AnnotationEditor>,
    region: Option<Region>,
    exported: Rc<RefCell<Option<String>>>,
    submitting: bool,
    notices: Vec<Notice>,
}

impl<C: ScreenCapturer> std::fmt::Debug for FeedbackSession<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedbackSession")
            .field("phase", &self.phase)
            .field("trigger_visible", &self.trigger_visible)
            .field("region", &self.region)
            .field("editor", &self.editor)
            .field("submitting", &self.submitting)
            .finish()
    }
}

impl<C: ScreenCapturer> FeedbackSession<C> {
    pub fn new(config: Config, capturer: C) -> Self {
        Self::with_store(config, capturer, diagnostics::global())
    }

    pub fn with_store(config: Config, capturer: C, store: Arc<DiagnosticsStore>) -> Self {
        Self {
            config,
            capturer,
            store,
            phase: Phase::Idle,
            trigger_visible: true,
            diagnostics: None,
            selector: None,
            editor: None,
            region: None,
            exported: Rc::new(RefCell::new(None)),
            submitting: false,
            notices: Vec::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn trigger_visible(&self) -> bool {
        self.trigger_visible
    }

    /// Diagnostics as they were when the session was triggered.
    pub fn diagnostics(&self) -> Option<&DiagnosticsSnapshot> {
        self.diagnostics.as_ref()
    }

    pub fn selector(&self) -> Option<&RegionSelector> {
        self.selector.as_ref()
    }

    pub fn editor(&self) -> Option<&AnnotationEditor> {
        self.editor.as_ref()
    }

    pub fn editor_mut(&mut self) -> Option<&mut AnnotationEditor> {
        self.editor.as_mut()
    }

    pub fn region(&self) -> Option<Region> {
        self.region
    }

    /// Latest composite exported by the editor.
    pub fn screenshot(&self) -> Option<String> {
        self.exported.borrow().clone()
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Trigger pressed. Diagnostics are frozen now, before capturing adds
    /// its own log lines.
    pub fn open(&mut self) -> bool {
        if !self.config.feedback_enabled {
            debug!("feedback disabled; ignoring trigger");
            return false;
        }
        if self.phase != Phase::Idle {
            return false;
        }
        self.diagnostics = Some(self.store.snapshot());
        self.phase = Phase::Choosing;
        true
    }

    pub fn choose(&mut self, mode: CaptureMode) {
        if self.phase != Phase::Choosing {
            debug!(?mode, phase = ?self.phase, "capture mode chosen outside the chooser");
            return;
        }
        info!(?mode, "starting feedback capture");
        match mode {
            CaptureMode::TextOnly => self.start_text_only(),
            CaptureMode::FullScreen => match self.capture() {
                Some(image) => {
                    let viewport = self.viewport_for(&image);
                    self.region = Some(viewport);
                    self.start_annotating(image);
                }
                None => self.start_text_only(),
            },
            CaptureMode::Region => match self.capture() {
                Some(image) => {
                    self.selector = Some(RegionSelector::new(image, self.config.capture_scale()));
                    self.phase = Phase::Selecting;
                }
                None => self.start_text_only(),
            },
        }
    }

    fn start_text_only(&mut self) {
        self.region = Some(Region::empty());
        self.editor = None;
        self.phase = Phase::Annotating;
    }

    /// Ctrl/Cmd+Shift+F/S/A. Returns whether the key was consumed. Pressed
    /// mid-session it drops the current capture and starts over with fresh
    /// diagnostics, unless a submission is in flight.
    pub fn handle_global_key(&mut self, event: &KeyEvent) -> bool {
        if !self.config.feedback_enabled || event.in_text_input {
            return false;
        }
        if !(event.command() && event.shift) {
            return false;
        }
        let Some(mode) = event.lower_char().and_then(CaptureMode::from_shortcut) else {
            return false;
        };
        if self.phase != Phase::Choosing {
            if self.submitting {
                return false;
            }
            if self.phase != Phase::Idle {
                debug!(phase = ?self.phase, ?mode, "shortcut restarts capture");
                self.close();
            }
            if !self.open() {
                return false;
            }
        }
        self.choose(mode);
        true
    }

    /// Runs the capturer with the trigger hidden. Failures and empty
    /// images degrade to text-only feedback.
    fn capture(&mut self) -> Option<RgbaImage> {
        let options = CaptureOptions::new(self.config.device_pixel_ratio, self.config.viewport);
        self.trigger_visible = false;
        let result = self.capturer.capture(&options);
        self.trigger_visible = true;

        match result {
            Ok(image) if image.width() > 0 && image.height() > 0 => Some(image),
            Ok(_) => {
                warn!("screenshot came back empty; continuing with text-only feedback");
                None
            }
            Err(err) => {
                warn!("screenshot capture failed; continuing with text-only feedback: {err:#}");
                None
            }
        }
    }

    fn viewport_for(&self, image: &RgbaImage) -> Region {
        match self.config.viewport {
            Some((w, h)) => Region::viewport(f64::from(w), f64::from(h)),
            None => {
                let scale = self.config.capture_scale();
                Region::viewport(f64::from(image.width()) / scale, f64::from(image.height()) / scale)
            }
        }
    }

    pub fn region_event(&mut self, event: RegionEvent) {
        if self.phase != Phase::Selecting {
            return;
        }
        let Some(selector) = self.selector.as_mut() else {
            return;
        };
        match selector.handle(event) {
            Some(RegionOutcome::Selected { region, image })
            | Some(RegionOutcome::FullScreen { region, image }) => {
                self.selector = None;
                self.region = Some(region);
                self.start_annotating(image);
            }
            Some(RegionOutcome::Cancelled) => self.close(),
            None => {}
        }
    }

    fn start_annotating(&mut self, image: RgbaImage) {
        match encode_png_data_url(&image) {
            Ok(base) => *self.exported.borrow_mut() = Some(base),
            Err(err) => warn!("could not encode screenshot: {err}"),
        }
        let exported = Rc::clone(&self.exported);
        let editor = AnnotationEditor::new(image).with_export(Box::new(move |data_url| {
            *exported.borrow_mut() = Some(data_url);
        }));
        self.editor = Some(editor);
        self.phase = Phase::Annotating;
    }

    pub fn editor_command(&mut self, command: &EditorCommand) {
        if let Some(editor) = self.editor.as_mut() {
            editor.apply(command);
        }
    }

    /// Drops everything captured and returns to the trigger.
    pub fn close(&mut self) {
        self.phase = Phase::Idle;
        self.diagnostics = None;
        self.selector = None;
        self.editor = None;
        self.region = None;
        *self.exported.borrow_mut() = None;
    }

    /// Validates the form and builds the submission, marking the session
    /// busy until [`finish_submit`](Self::finish_submit).
    pub fn begin_submit(&mut self, form: &FeedbackForm) -> Result<FeedbackSubmission, SubmitOutcome> {
        if self.phase != Phase::Annotating {
            return Err(SubmitOutcome::NotOpen);
        }
        if self.submitting {
            return Err(SubmitOutcome::Busy);
        }
        let valid = form.validate().map_err(SubmitOutcome::Invalid)?;

        let diagnostics = self.diagnostics.clone().unwrap_or_default();
        let viewport = self
            .config
            .viewport
            .or_else(|| {
                self.region
                    .filter(|r| !r.is_empty())
                    .map(|r| (r.width.round() as u32, r.height.round() as u32))
            });
        let metadata = FeedbackMetadata::collect(&self.config.page_url, viewport, &diagnostics);
        let screenshot = if self.editor.is_some() {
            self.screenshot()
        } else {
            None
        };

        self.submitting = true;
        Ok(FeedbackSubmission::new(
            valid,
            screenshot,
            metadata,
            Reporter::from_config(&self.config),
        ))
    }

    pub fn finish_submit(&mut self, result: Result<SubmitResponse, SubmitError>) -> SubmitOutcome {
        self.submitting = false;
        match result {
            Ok(response) if response.success => {
                if let Some(warning) = response.warning.as_deref() {
                    warn!("feedback accepted with warning: {warning}");
                }
                self.notices.push(Notice::Success {
                    message: SUBMIT_SUCCESS_MESSAGE.to_string(),
                    issue_url: response.issue_url.clone(),
                });
                self.close();
                SubmitOutcome::Sent(response)
            }
            Ok(response) => {
                let message = response
                    .error
                    .unwrap_or_else(|| SUBMIT_FAILURE_MESSAGE.to_string());
                self.fail(message)
            }
            Err(err) => {
                warn!("feedback submission failed: {err}");
                let message = err
                    .collector_message()
                    .unwrap_or(SUBMIT_FAILURE_MESSAGE)
                    .to_string();
                self.fail(message)
            }
        }
    }

    fn fail(&mut self, message: String) -> SubmitOutcome {
        self.notices.push(Notice::Error {
            message: message.clone(),
        });
        SubmitOutcome::Failed(message)
    }

    pub fn submit(&mut self, form: &FeedbackForm, transport: &dyn FeedbackTransport) -> SubmitOutcome {
        match self.begin_submit(form) {
            Ok(submission) => {
                let result = transport.submit(&submission);
                self.finish_submit(result)
            }
            Err(outcome) => outcome,
        }
    }
}
