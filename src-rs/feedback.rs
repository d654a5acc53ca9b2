//! Feedback form state and the submission sent to the collector.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{Config, ANONYMOUS_EMAIL, ANONYMOUS_NAME};
use crate::diagnostics::{timestamp_now, ConsoleEntry, DiagnosticsSnapshot, NetworkEntry};

pub const MAX_TITLE_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackCategory {
    #[default]
    Bug,
    Visual,
    Suggestion,
}

impl FeedbackCategory {
    pub const ALL: [Self; 3] = [Self::Bug, Self::Visual, Self::Suggestion];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Bug => "Bug",
            Self::Visual => "Visual Issue",
            Self::Suggestion => "Suggestion",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Bug => "Something is broken",
            Self::Visual => "Layout or styling problem",
            Self::Suggestion => "Idea for improvement",
        }
    }

    /// Only bug reports carry console logs and failed requests.
    pub fn attaches_diagnostics(&self) -> bool {
        matches!(self, Self::Bug)
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "bug" => Some(Self::Bug),
            "visual" | "visual-issue" => Some(Self::Visual),
            "suggestion" => Some(Self::Suggestion),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackPriority {
    Urgent,
    High,
    Medium,
    Low,
    /// "Auto": the collector picks a default from the category.
    #[default]
    None,
}

impl FeedbackPriority {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "urgent" => Some(Self::Urgent),
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            "none" | "auto" => Some(Self::None),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackLabel {
    Frontend,
    Backend,
    Mobile,
    Design,
    Performance,
    Accessibility,
    Ux,
}

impl FeedbackLabel {
    pub const ALL: [Self; 7] = [
        Self::Frontend,
        Self::Backend,
        Self::Mobile,
        Self::Design,
        Self::Performance,
        Self::Accessibility,
        Self::Ux,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Frontend => "frontend",
            Self::Backend => "backend",
            Self::Mobile => "mobile",
            Self::Design => "design",
            Self::Performance => "performance",
            Self::Accessibility => "accessibility",
            Self::Ux => "ux",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let key = raw.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|label| label.as_str() == key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("title is required")]
    TitleMissing,
    #[error("title must be at most {max} characters (got {len})")]
    TitleTooLong { len: usize, max: usize },
    #[error("description is required")]
    DescriptionMissing,
}

impl FormError {
    /// Form field the message belongs under.
    pub fn field(&self) -> &'static str {
        match self {
            Self::TitleMissing | Self::TitleTooLong { .. } => "title",
            Self::DescriptionMissing => "description",
        }
    }
}

/// Advanced options, present only when the advanced section was used.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedbackOptions {
    pub priority: Option<FeedbackPriority>,
    pub requires_planning: Option<bool>,
    pub labels: Option<Vec<FeedbackLabel>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedbackForm {
    pub category: FeedbackCategory,
    pub title: String,
    pub description: String,
    pub show_advanced: bool,
    pub priority: FeedbackPriority,
    pub requires_planning: bool,
    pub labels: Vec<FeedbackLabel>,
}

/// Trimmed form contents that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidForm {
    pub category: FeedbackCategory,
    pub title: String,
    pub description: String,
    pub options: Option<FeedbackOptions>,
}

impl FeedbackForm {
    pub fn new(category: FeedbackCategory, title: &str, description: &str) -> Self {
        Self {
            category,
            title: title.to_string(),
            description: description.to_string(),
            ..Self::default()
        }
    }

    pub fn toggle_label(&mut self, label: FeedbackLabel) {
        if let Some(index) = self.labels.iter().position(|l| *l == label) {
            self.labels.remove(index);
        } else {
            self.labels.push(label);
        }
    }

    /// Whether any advanced option differs from its default.
    pub fn has_advanced_changes(&self) -> bool {
        self.priority != FeedbackPriority::None || self.requires_planning || !self.labels.is_empty()
    }

    pub fn can_submit(&self) -> bool {
        self.validate().is_ok()
    }

    pub fn options(&self) -> Option<FeedbackOptions> {
        if !self.show_advanced {
            return None;
        }
        Some(FeedbackOptions {
            priority: (self.priority != FeedbackPriority::None).then_some(self.priority),
            requires_planning: self.requires_planning.then_some(true),
            labels: (!self.labels.is_empty()).then(|| self.labels.clone()),
        })
    }

    pub fn validate(&self) -> Result<ValidForm, Vec<FormError>> {
        let title = self.title.trim();
        let description = self.description.trim();
        let mut errors = Vec::new();

        let title_len = title.chars().count();
        if title_len == 0 {
            errors.push(FormError::TitleMissing);
        } else if title_len > MAX_TITLE_CHARS {
            errors.push(FormError::TitleTooLong {
                len: title_len,
                max: MAX_TITLE_CHARS,
            });
        }
        if description.is_empty() {
            errors.push(FormError::DescriptionMissing);
        }
        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(ValidForm {
            category: self.category,
            title: title.to_string(),
            description: description.to_string(),
            options: self.options(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackMetadata {
    pub url: String,
    pub browser: String,
    /// `"W × H"` in CSS pixels, or `"Unknown"`.
    pub viewport: String,
    pub timestamp: String,
    #[serde(default)]
    pub user_agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub console_logs: Option<Vec<ConsoleEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_errors: Option<Vec<NetworkEntry>>,
}

impl FeedbackMetadata {
    pub fn collect(page_url: &str, viewport: Option<(u32, u32)>, diagnostics: &DiagnosticsSnapshot) -> Self {
        Self {
            url: page_url.to_string(),
            browser: client_info(),
            viewport: viewport
                .map(|(w, h)| format!("{w} × {h}"))
                .unwrap_or_else(|| "Unknown".to_string()),
            timestamp: timestamp_now(),
            user_agent: user_agent(),
            console_logs: Some(diagnostics.console_logs.clone()),
            network_errors: Some(diagnostics.network_errors.clone()),
        }
    }

    fn without_diagnostics(self) -> Self {
        Self {
            console_logs: None,
            network_errors: None,
            ..self
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reporter {
    pub name: String,
    pub email: String,
}

impl Default for Reporter {
    fn default() -> Self {
        Self {
            name: ANONYMOUS_NAME.to_string(),
            email: ANONYMOUS_EMAIL.to_string(),
        }
    }
}

impl Reporter {
    pub fn from_config(config: &Config) -> Self {
        let defaults = Self::default();
        Self {
            name: config
                .reporter_name
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .unwrap_or(defaults.name),
            email: config.reporter_email.clone().unwrap_or(defaults.email),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackSubmission {
    pub category: FeedbackCategory,
    pub title: String,
    pub description: String,
    /// Annotated composite as a PNG data URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    pub metadata: FeedbackMetadata,
    pub reporter: Reporter,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<FeedbackPriority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_planning: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<FeedbackLabel>>,
}

impl FeedbackSubmission {
    pub fn new(
        form: ValidForm,
        screenshot: Option<String>,
        metadata: FeedbackMetadata,
        reporter: Reporter,
    ) -> Self {
        let metadata = if form.category.attaches_diagnostics() {
            metadata
        } else {
            metadata.without_diagnostics()
        };
        let options = form.options.unwrap_or_default();
        Self {
            category: form.category,
            title: form.title,
            description: form.description,
            screenshot,
            metadata,
            reporter,
            priority: options.priority,
            requires_planning: options.requires_planning,
            labels: options.labels,
        }
    }
}

fn os_name(os: &str) -> &'static str {
    match os {
        "windows" => "Windows",
        "macos" => "macOS",
        "linux" => "Linux",
        "android" => "Android",
        "ios" => "iOS",
        _ => "Unknown",
    }
}

/// `"<client> <major> on <OS>"`, the reporting client's short name.
pub fn client_info() -> String {
    let major = env!("CARGO_PKG_VERSION")
        .split('.')
        .next()
        .unwrap_or_default();
    format!(
        "{} {major} on {}",
        env!("CARGO_PKG_NAME"),
        os_name(std::env::consts::OS)
    )
}

pub fn user_agent() -> String {
    format!(
        "{}/{} ({}; {})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        os_name(std::env::consts::OS),
        std::env::consts::ARCH
    )
}
