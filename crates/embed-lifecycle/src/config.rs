//! Embed configuration.
//!
//! Loaded from JSON (or built in code) and validated once, before an
//! orchestrator is created. Timing fields are clamped rather than rejected so
//! that a misconfigured page still ends in either a ready widget or the
//! fallback link.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default readiness poll interval (milliseconds).
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 200;
/// Default number of readiness checks per generation.
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 50;
/// Default fallback deadline (milliseconds).
pub const DEFAULT_FALLBACK_TIMEOUT_MS: u64 = 10_000;

const MIN_POLL_INTERVAL_MS: u64 = 50;
const MAX_POLL_INTERVAL_MS: u64 = 5_000;
const MIN_FALLBACK_TIMEOUT_MS: u64 = 1_000;
const MAX_FALLBACK_TIMEOUT_MS: u64 = 120_000;

const DEFAULT_PARTNER_ATTRIBUTE: &str = "data-partner-id";
const DEFAULT_WIDGET_ATTRIBUTE: &str = "data-widget-ref";
const DEFAULT_READY_EVENT_NAME: &str = "widget:ready";

/// What to do with an existing provider script tag that already failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptReusePolicy {
    /// Keep the tag; the new generation sees the failure.
    #[default]
    Reuse,
    /// Remove the failed tag and insert a single replacement.
    ReplaceFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedConfig {
    /// Provider script URL.
    pub script_url: String,
    /// Opaque partner identifier stamped onto the mount node.
    pub partner_id: String,
    /// Opaque widget reference stamped onto the mount node.
    pub widget_ref: String,
    /// Outbound link shown when the widget gives up.
    pub fallback_url: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,
    #[serde(default = "default_fallback_timeout_ms")]
    pub fallback_timeout_ms: u64,
    #[serde(default = "default_partner_attribute")]
    pub partner_attribute: String,
    #[serde(default = "default_widget_attribute")]
    pub widget_attribute: String,
    #[serde(default)]
    pub script_reuse: ScriptReusePolicy,
    /// Also dispatch a synthetic ready event after invoking init.
    #[serde(default)]
    pub dispatch_ready_event: bool,
    #[serde(default = "default_ready_event_name")]
    pub ready_event_name: String,
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_max_poll_attempts() -> u32 {
    DEFAULT_MAX_POLL_ATTEMPTS
}

fn default_fallback_timeout_ms() -> u64 {
    DEFAULT_FALLBACK_TIMEOUT_MS
}

fn default_partner_attribute() -> String {
    DEFAULT_PARTNER_ATTRIBUTE.to_string()
}

fn default_widget_attribute() -> String {
    DEFAULT_WIDGET_ATTRIBUTE.to_string()
}

fn default_ready_event_name() -> String {
    DEFAULT_READY_EVENT_NAME.to_string()
}

impl EmbedConfig {
    /// Config with every optional field at its default.
    pub fn new(
        script_url: impl Into<String>,
        partner_id: impl Into<String>,
        widget_ref: impl Into<String>,
        fallback_url: impl Into<String>,
    ) -> Self {
        Self {
            script_url: script_url.into(),
            partner_id: partner_id.into(),
            widget_ref: widget_ref.into(),
            fallback_url: fallback_url.into(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_poll_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
            fallback_timeout_ms: DEFAULT_FALLBACK_TIMEOUT_MS,
            partner_attribute: default_partner_attribute(),
            widget_attribute: default_widget_attribute(),
            script_reuse: ScriptReusePolicy::default(),
            dispatch_ready_event: false,
            ready_event_name: default_ready_event_name(),
        }
    }

    pub fn with_polling(mut self, interval_ms: u64, max_attempts: u32) -> Self {
        self.poll_interval_ms = interval_ms;
        self.max_poll_attempts = max_attempts;
        self
    }

    pub fn with_fallback_timeout(mut self, timeout_ms: u64) -> Self {
        self.fallback_timeout_ms = timeout_ms;
        self
    }

    pub fn with_script_reuse(mut self, policy: ScriptReusePolicy) -> Self {
        self.script_reuse = policy;
        self
    }

    pub fn with_ready_event(mut self, name: impl Into<String>) -> Self {
        self.dispatch_ready_event = true;
        self.ready_event_name = name.into();
        self
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let raw: Self =
            serde_json::from_str(text).map_err(|err| ConfigError::Parse(err.to_string()))?;
        raw.validate()
    }

    /// Check required fields and clamp timing into the supported range.
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        for (field, value) in [
            ("script_url", &self.script_url),
            ("partner_id", &self.partner_id),
            ("widget_ref", &self.widget_ref),
            ("fallback_url", &self.fallback_url),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::EmptyField { field });
            }
        }
        for attribute in [&self.partner_attribute, &self.widget_attribute] {
            if !attribute.starts_with("data-") || attribute.len() == "data-".len() {
                return Err(ConfigError::InvalidAttribute {
                    attribute: attribute.clone(),
                });
            }
        }
        if self.partner_attribute == self.widget_attribute {
            return Err(ConfigError::DuplicateAttribute {
                attribute: self.partner_attribute.clone(),
            });
        }
        if self.max_poll_attempts == 0 {
            return Err(ConfigError::BelowMinimum {
                field: "max_poll_attempts",
                min: 1,
                value: 0,
            });
        }
        if self.dispatch_ready_event && self.ready_event_name.trim().is_empty() {
            return Err(ConfigError::EmptyField {
                field: "ready_event_name",
            });
        }
        self.poll_interval_ms = self
            .poll_interval_ms
            .clamp(MIN_POLL_INTERVAL_MS, MAX_POLL_INTERVAL_MS);
        self.fallback_timeout_ms = self
            .fallback_timeout_ms
            .clamp(MIN_FALLBACK_TIMEOUT_MS, MAX_FALLBACK_TIMEOUT_MS);
        Ok(self)
    }
}
