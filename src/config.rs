//! Screening configuration.
//!
//! Values come from JSON or from `DISH_GATE_*` environment variables. Anything
//! missing or unparsable falls back to the default.

use std::env;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_BLOCK_THRESHOLD: f32 = 0.6;
const DEFAULT_INFERENCE_TIMEOUT_SECS: u64 = 10;
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_MODEL_REPO: &str = "LukeJacob2023/nsfw-image-detector";

/// What to do when an image cannot be screened for technical reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Treat the image as safe and leave moderation to later layers.
    #[default]
    FailOpen,
    /// Reject the image as if it had been blocked.
    FailClosed,
}

impl FailurePolicy {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fail_open" | "open" => Some(FailurePolicy::FailOpen),
            "fail_closed" | "closed" => Some(FailurePolicy::FailClosed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Labels that block an image when their probability exceeds the threshold.
    pub blocked_labels: Vec<String>,
    pub block_threshold: f32,
    pub failure_policy: FailurePolicy,
    pub inference_timeout_secs: u64,
    pub fetch_timeout_secs: u64,
    /// Upper bound for uploaded files. `None` accepts any size.
    pub max_image_bytes: Option<usize>,
    pub model_repo: String,
    /// When false the classifier is replaced by one that allows everything.
    pub screening_enabled: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            blocked_labels: vec!["Porn".into(), "Hentai".into(), "Sexy".into()],
            block_threshold: DEFAULT_BLOCK_THRESHOLD,
            failure_policy: FailurePolicy::default(),
            inference_timeout_secs: DEFAULT_INFERENCE_TIMEOUT_SECS,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            max_image_bytes: None,
            model_repo: DEFAULT_MODEL_REPO.to_string(),
            screening_enabled: true,
        }
    }
}

impl GateConfig {
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        let config: GateConfig = serde_json::from_str(raw)?;
        Ok(config.sanitized())
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup, using the same variable
    /// names as [`GateConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let block_threshold = lookup("DISH_GATE_BLOCK_THRESHOLD")
            .and_then(|s| s.parse::<f32>().ok())
            .filter(|v| (0.0..=1.0).contains(v))
            .unwrap_or(defaults.block_threshold);
        let failure_policy = lookup("DISH_GATE_FAILURE_POLICY")
            .and_then(|s| FailurePolicy::parse(&s))
            .unwrap_or(defaults.failure_policy);
        let inference_timeout_secs = lookup("DISH_GATE_INFERENCE_TIMEOUT_SECS")
            .and_then(|s| s.parse().ok())
            .filter(|v| *v > 0)
            .unwrap_or(defaults.inference_timeout_secs);
        let fetch_timeout_secs = lookup("DISH_GATE_FETCH_TIMEOUT_SECS")
            .and_then(|s| s.parse().ok())
            .filter(|v| *v > 0)
            .unwrap_or(defaults.fetch_timeout_secs);
        let max_image_bytes = lookup("DISH_GATE_MAX_IMAGE_BYTES")
            .and_then(|s| s.parse::<usize>().ok())
            .filter(|v| *v > 0);
        let model_repo = lookup("DISH_GATE_MODEL_REPO")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.model_repo);
        let screening_enabled = lookup("DISH_GATE_SCREENING")
            .map(|s| !matches!(s.trim(), "0" | "false" | "off"))
            .unwrap_or(true);

        Self {
            blocked_labels: defaults.blocked_labels,
            block_threshold,
            failure_policy,
            inference_timeout_secs,
            fetch_timeout_secs,
            max_image_bytes,
            model_repo,
            screening_enabled,
        }
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_secs(self.inference_timeout_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if !(0.0..=1.0).contains(&self.block_threshold) {
            self.block_threshold = defaults.block_threshold;
        }
        if self.inference_timeout_secs == 0 {
            self.inference_timeout_secs = defaults.inference_timeout_secs;
        }
        if self.fetch_timeout_secs == 0 {
            self.fetch_timeout_secs = defaults.fetch_timeout_secs;
        }
        self
    }
}
