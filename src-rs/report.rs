//! Turns a submission into the issue the collector files for it.

use serde::Serialize;

use crate::diagnostics::{truncate_chars, ConsoleLevel};
use crate::feedback::{FeedbackCategory, FeedbackPriority, FeedbackSubmission};

pub const BETA_FEEDBACK_LABEL: &str = "beta-feedback";

const MAX_CONSOLE_ERRORS: usize = 10;
const MAX_CONSOLE_WARNINGS: usize = 5;
const MAX_NETWORK_ERRORS: usize = 10;
const CONSOLE_MESSAGE_CHARS: usize = 300;
const NETWORK_URL_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueDraft {
    pub title: String,
    pub body: String,
    /// 1 urgent, 2 high, 3 medium, 4 low.
    pub priority: u8,
    pub labels: Vec<String>,
    pub requires_planning: bool,
}

fn category_label(category: FeedbackCategory) -> &'static str {
    match category {
        FeedbackCategory::Bug => "bug",
        FeedbackCategory::Visual => "visual-issue",
        FeedbackCategory::Suggestion => "suggestion",
    }
}

fn category_priority(category: FeedbackCategory) -> u8 {
    match category {
        FeedbackCategory::Bug | FeedbackCategory::Visual => 3,
        FeedbackCategory::Suggestion => 4,
    }
}

fn priority_value(priority: FeedbackPriority) -> Option<u8> {
    match priority {
        FeedbackPriority::Urgent => Some(1),
        FeedbackPriority::High => Some(2),
        FeedbackPriority::Medium => Some(3),
        FeedbackPriority::Low => Some(4),
        FeedbackPriority::None => None,
    }
}

pub fn issue_priority(submission: &FeedbackSubmission) -> u8 {
    submission
        .priority
        .and_then(priority_value)
        .unwrap_or_else(|| category_priority(submission.category))
}

pub fn issue_labels(submission: &FeedbackSubmission) -> Vec<String> {
    let mut labels = vec![
        BETA_FEEDBACK_LABEL.to_string(),
        category_label(submission.category).to_string(),
    ];
    for label in submission.labels.iter().flatten() {
        let name = label.as_str().to_string();
        if !labels.contains(&name) {
            labels.push(name);
        }
    }
    labels
}

/// `screenshot_url` is where the uploaded screenshot ended up, if anywhere.
pub fn issue_body(submission: &FeedbackSubmission, screenshot_url: Option<&str>) -> String {
    let meta = &submission.metadata;
    let mut body = format!(
        "**Reporter:** {} ({})\n**Page:** {}\n**Browser:** {}\n**Viewport:** {}\n\n---\n\n{}",
        submission.reporter.name,
        submission.reporter.email,
        meta.url,
        meta.browser,
        meta.viewport,
        submission.description
    );

    if let Some(url) = screenshot_url.filter(|u| !u.is_empty()) {
        body.push_str(&format!("\n\n---\n\n![Screenshot]({url})"));
    }

    let console = meta.console_logs.as_deref().unwrap_or_default();
    let network = meta.network_errors.as_deref().unwrap_or_default();
    let errors: Vec<_> = console
        .iter()
        .filter(|e| e.level == ConsoleLevel::Error)
        .collect();
    let warnings: Vec<_> = console
        .iter()
        .filter(|e| e.level == ConsoleLevel::Warn)
        .collect();

    body.push_str(&format!(
        "\n\n---\n\n**Diagnostics:** {} console entries ({} errors, {} warnings), {} failed requests",
        console.len(),
        errors.len(),
        warnings.len(),
        network.len()
    ));

    if !errors.is_empty() {
        body.push_str("\n\n**Console Errors:**\n```\n");
        for entry in errors.iter().take(MAX_CONSOLE_ERRORS) {
            body.push_str(&format!(
                "[ERROR] {}\n",
                truncate_chars(&entry.message, CONSOLE_MESSAGE_CHARS)
            ));
        }
        if errors.len() > MAX_CONSOLE_ERRORS {
            body.push_str(&format!("... and {} more errors\n", errors.len() - MAX_CONSOLE_ERRORS));
        }
        body.push_str("```");
    } else if !warnings.is_empty() {
        body.push_str("\n\n**Console Warnings:**\n```\n");
        for entry in warnings.iter().take(MAX_CONSOLE_WARNINGS) {
            body.push_str(&format!(
                "[WARN] {}\n",
                truncate_chars(&entry.message, CONSOLE_MESSAGE_CHARS)
            ));
        }
        if warnings.len() > MAX_CONSOLE_WARNINGS {
            body.push_str(&format!(
                "... and {} more warnings\n",
                warnings.len() - MAX_CONSOLE_WARNINGS
            ));
        }
        body.push_str("```");
    }

    if !network.is_empty() {
        body.push_str("\n\n**Network Errors:**\n```\n");
        for entry in network.iter().take(MAX_NETWORK_ERRORS) {
            body.push_str(&format!(
                "{} {} → {} {}\n",
                entry.method,
                truncate_chars(&entry.url, NETWORK_URL_CHARS),
                entry.status,
                entry.status_text
            ));
        }
        if network.len() > MAX_NETWORK_ERRORS {
            body.push_str(&format!("... and {} more\n", network.len() - MAX_NETWORK_ERRORS));
        }
        body.push_str("```");
    }

    body
}

pub fn issue_draft(submission: &FeedbackSubmission, screenshot_url: Option<&str>) -> IssueDraft {
    IssueDraft {
        title: format!("[{}] {}", submission.category.label(), submission.title),
        body: issue_body(submission, screenshot_url),
        priority: issue_priority(submission),
        labels: issue_labels(submission),
        requires_planning: submission.requires_planning.unwrap_or(false),
    }
}
