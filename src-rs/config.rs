//! Environment-driven settings.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use crate::geometry::parse_size;
use crate::util::parse_flag;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:3000/api/feedback";
pub const DEFAULT_OUT_DIR: &str = ".feedback-capture";
pub const DEFAULT_LOG_FILTER: &str = "info,feedback_capture=debug";
pub const ANONYMOUS_NAME: &str = "Anonymous";
pub const ANONYMOUS_EMAIL: &str = "unknown@example.com";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Gate for the whole feedback surface.
    pub feedback_enabled: bool,
    pub endpoint: String,
    pub out_dir: PathBuf,
    pub page_url: String,
    /// CSS pixels; `None` means "derive from the capture".
    pub viewport: Option<(u32, u32)>,
    pub device_pixel_ratio: f64,
    pub reporter_name: Option<String>,
    pub reporter_email: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feedback_enabled: false,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            out_dir: PathBuf::from(DEFAULT_OUT_DIR),
            page_url: String::new(),
            viewport: None,
            device_pixel_ratio: 1.0,
            reporter_name: None,
            reporter_email: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_vars(vars: &HashMap<String, String>) -> Self {
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Self {
            feedback_enabled: get("FBC_FEEDBACK_ENABLED")
                .and_then(|v| parse_flag(&v))
                .unwrap_or(defaults.feedback_enabled),
            endpoint: get("FBC_ENDPOINT").unwrap_or(defaults.endpoint),
            out_dir: get("FBC_OUT_DIR")
                .or_else(|| get("FBC_TMP_DIR"))
                .map(PathBuf::from)
                .unwrap_or(defaults.out_dir),
            page_url: get("FBC_PAGE_URL").unwrap_or(defaults.page_url),
            viewport: get("FBC_VIEWPORT").and_then(|v| parse_size(&v)),
            device_pixel_ratio: get("FBC_DEVICE_PIXEL_RATIO")
                .and_then(|v| v.trim().parse::<f64>().ok())
                .filter(|v| *v > 0.0)
                .unwrap_or(defaults.device_pixel_ratio),
            reporter_name: get("FBC_REPORTER_NAME"),
            reporter_email: get("FBC_REPORTER_EMAIL"),
        }
    }

    /// Screenshot scale: the device pixel ratio, capped at 2x.
    pub fn capture_scale(&self) -> f64 {
        self.device_pixel_ratio.min(2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_vars(&HashMap::new());
        assert_eq!(config, Config::default());
        assert!(!config.feedback_enabled);
    }

    #[test]
    fn reads_all_settings() {
        let config = Config::from_vars(&vars(&[
            ("FBC_FEEDBACK_ENABLED", "true"),
            ("FBC_ENDPOINT", "https://collector.test/feedback"),
            ("FBC_TMP_DIR", "/tmp/fbc"),
            ("FBC_VIEWPORT", "390x844"),
            ("FBC_DEVICE_PIXEL_RATIO", "3"),
            ("FBC_REPORTER_NAME", "Sam Setter"),
        ]));
        assert!(config.feedback_enabled);
        assert_eq!(config.endpoint, "https://collector.test/feedback");
        assert_eq!(config.out_dir, PathBuf::from("/tmp/fbc"));
        assert_eq!(config.viewport, Some((390, 844)));
        assert_eq!(config.capture_scale(), 2.0);
        assert_eq!(config.reporter_name.as_deref(), Some("Sam Setter"));
        assert_eq!(config.reporter_email, None);
    }

    #[test]
    fn invalid_values_fall_back() {
        let config = Config::from_vars(&vars(&[
            ("FBC_FEEDBACK_ENABLED", "sometimes"),
            ("FBC_DEVICE_PIXEL_RATIO", "-1"),
            ("FBC_VIEWPORT", "wide"),
        ]));
        assert!(!config.feedback_enabled);
        assert_eq!(config.device_pixel_ratio, 1.0);
        assert_eq!(config.viewport, None);
    }
}
