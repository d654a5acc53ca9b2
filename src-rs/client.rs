//! Posts submissions to the feedback collector.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::diagnostics::{self, DiagnosticsStore, NetworkRecorder};
use crate::feedback::{user_agent, FeedbackSubmission};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub issue_url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub warning: Option<String>,
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("could not reach feedback collector: {0}")]
    Transport(String),
    #[error("feedback collector returned HTTP {status}")]
    Status { status: u16, message: Option<String> },
    #[error("feedback collector sent an unreadable response: {0}")]
    Decode(String),
}

impl SubmitError {
    /// Message the collector itself attached to a failed response.
    pub fn collector_message(&self) -> Option<&str> {
        match self {
            Self::Status { message, .. } => message.as_deref(),
            _ => None,
        }
    }
}

pub trait FeedbackTransport {
    fn submit(&self, submission: &FeedbackSubmission) -> Result<SubmitResponse, SubmitError>;
}

#[derive(Debug, Clone)]
pub struct FeedbackClient {
    endpoint: String,
    agent: ureq::Agent,
    timeout: Option<Duration>,
}

impl FeedbackClient {
    /// Client whose failed requests land in the process-wide diagnostics.
    pub fn new(endpoint: &str) -> Self {
        Self::with_store(endpoint, diagnostics::global())
    }

    /// No overall timeout: a slow upload runs until the connection fails.
    pub fn with_store(endpoint: &str, store: Arc<DiagnosticsStore>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .user_agent(&user_agent())
            .middleware(NetworkRecorder::new(store))
            .build();
        Self {
            endpoint: endpoint.to_string(),
            agent,
            timeout: None,
        }
    }

    /// Bounds each POST. Only callers that ask for it get one.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

impl FeedbackTransport for FeedbackClient {
    fn submit(&self, submission: &FeedbackSubmission) -> Result<SubmitResponse, SubmitError> {
        debug!(
            endpoint = %self.endpoint,
            category = ?submission.category,
            has_screenshot = submission.screenshot.is_some(),
            "posting feedback"
        );
        let mut request = self.agent.post(&self.endpoint);
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }
        match request.send_json(submission) {
            Ok(response) => {
                let body: SubmitResponse = response
                    .into_json()
                    .map_err(|err| SubmitError::Decode(err.to_string()))?;
                info!(
                    success = body.success,
                    issue_url = body.issue_url.as_deref().unwrap_or(""),
                    "feedback collector responded"
                );
                Ok(body)
            }
            Err(ureq::Error::Status(status, response)) => {
                let message = response
                    .into_string()
                    .ok()
                    .and_then(|raw| serde_json::from_str::<SubmitResponse>(&raw).ok())
                    .and_then(|body| body.error);
                warn!(status, reason = message.as_deref().unwrap_or(""), "feedback rejected");
                Err(SubmitError::Status { status, message })
            }
            Err(ureq::Error::Transport(transport)) => {
                warn!("feedback request failed: {transport}");
                Err(SubmitError::Transport(transport.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::{FeedbackCategory, FeedbackForm, FeedbackMetadata, Reporter};
    use crate::diagnostics::DiagnosticsSnapshot;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;

    /// Answers one request with `response` and hands back the request body.
    fn serve_once(response: String) -> (String, mpsc::Receiver<String>) {
        serve_once_after(Duration::ZERO, response)
    }

    /// Like `serve_once`, but waits `delay` after reading the request.
    fn serve_once_after(delay: Duration, response: String) -> (String, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            let header_end = loop {
                if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
                match stream.read(&mut chunk) {
                    Ok(0) | Err(_) => return,
                    Ok(n) => buf.extend_from_slice(&chunk[..n]),
                }
            };
            let headers = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
            let length = headers
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            while buf.len() < header_end + length {
                match stream.read(&mut chunk) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => buf.extend_from_slice(&chunk[..n]),
                }
            }
            let _ = tx.send(String::from_utf8_lossy(&buf[header_end..]).into_owned());
            thread::sleep(delay);
            let _ = stream.write_all(response.as_bytes());
        });
        (format!("http://{addr}/api/feedback"), rx)
    }

    fn json_response(status_line: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    fn submission() -> FeedbackSubmission {
        let form = FeedbackForm::new(FeedbackCategory::Bug, "Save fails", "Nothing happens")
            .validate()
            .unwrap();
        let metadata = FeedbackMetadata::collect("https://app.test/", None, &DiagnosticsSnapshot::default());
        FeedbackSubmission::new(form, None, metadata, Reporter::default())
    }

    #[test]
    fn posts_json_and_reads_issue_url() {
        let (url, body_rx) = serve_once(json_response(
            "200 OK",
            r#"{"success":true,"issueUrl":"https://tracker.test/ISS-1"}"#,
        ));
        let store = Arc::new(DiagnosticsStore::new());
        let client = FeedbackClient::with_store(&url, Arc::clone(&store));

        let response = client.submit(&submission()).unwrap();
        assert!(response.success);
        assert_eq!(response.issue_url.as_deref(), Some("https://tracker.test/ISS-1"));

        let sent: serde_json::Value = serde_json::from_str(&body_rx.recv().unwrap()).unwrap();
        assert_eq!(sent["title"], "Save fails");
        assert_eq!(sent["category"], "bug");
        assert!(store.snapshot().network_errors.is_empty());
    }

    #[test]
    fn error_status_carries_collector_message_and_is_recorded() {
        let (url, _body_rx) = serve_once(json_response(
            "400 Bad Request",
            r#"{"success":false,"error":"Missing required fields"}"#,
        ));
        let store = Arc::new(DiagnosticsStore::new());
        let client = FeedbackClient::with_store(&url, Arc::clone(&store));

        let err = client.submit(&submission()).unwrap_err();
        assert!(matches!(err, SubmitError::Status { status: 400, .. }));
        assert_eq!(err.collector_message(), Some("Missing required fields"));

        let network = store.snapshot().network_errors;
        assert_eq!(network.len(), 1);
        assert_eq!(network[0].method, "POST");
        assert_eq!(network[0].status, 400);
    }

    #[test]
    fn unreachable_collector_is_a_transport_error() {
        let closed = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/api/feedback", closed.local_addr().unwrap());
        drop(closed);
        let client = FeedbackClient::with_store(&url, Arc::new(DiagnosticsStore::new()));
        let err = client.submit(&submission()).unwrap_err();
        assert!(matches!(err, SubmitError::Transport(_)));
        assert_eq!(err.collector_message(), None);
    }

    #[test]
    fn non_json_success_body_is_a_decode_error() {
        let (url, _body_rx) = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok".to_string(),
        );
        let client = FeedbackClient::with_store(&url, Arc::new(DiagnosticsStore::new()));
        assert!(matches!(client.submit(&submission()), Err(SubmitError::Decode(_))));
    }

    #[test]
    fn slow_collector_is_waited_for_without_a_timeout() {
        let (url, _body_rx) = serve_once_after(
            Duration::from_millis(1500),
            json_response("200 OK", r#"{"success":true}"#),
        );
        let client = FeedbackClient::with_store(&url, Arc::new(DiagnosticsStore::new()));
        assert_eq!(client.timeout(), None);
        assert!(client.submit(&submission()).unwrap().success);
    }

    #[test]
    fn explicit_timeout_turns_a_stall_into_a_transport_error() {
        let (url, _body_rx) = serve_once_after(
            Duration::from_secs(3),
            json_response("200 OK", r#"{"success":true}"#),
        );
        let client = FeedbackClient::with_store(&url, Arc::new(DiagnosticsStore::new()))
            .with_timeout(Duration::from_millis(200));
        assert_eq!(client.timeout(), Some(Duration::from_millis(200)));
        assert!(matches!(client.submit(&submission()), Err(SubmitError::Transport(_))));
    }
}
