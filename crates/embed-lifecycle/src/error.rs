//! Error taxonomy for the embed lifecycle.
//!
//! Lifecycle failures never surface to the host as `Err` values from the
//! orchestrator's entry points. They are classified here so that every
//! failure path carries a stable error code into the structured event stream,
//! and the only user-visible outcome is the fallback link.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::generation::{GenerationId, GenerationState};

/// Lifecycle failure classes.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmbedError {
    /// The provider script tag failed to load (network error, blocked).
    #[error("provider script failed to load: {url}")]
    ScriptLoadFailure { url: String },
    /// The script loaded but the runtime or its init entry point never
    /// appeared within the poll budget.
    #[error("provider never became ready for generation {generation} after {attempts} attempts")]
    ProviderNeverReady {
        generation: GenerationId,
        attempts: u32,
    },
    /// A callback arrived for a generation that has been superseded.
    #[error(
        "stale callback for generation {callback_generation} ignored (current: {})",
        display_current(current)
    )]
    StaleCallbackIgnored {
        callback_generation: GenerationId,
        current: Option<GenerationId>,
    },
    /// A callback arrived after the host tore down the mount region.
    #[error("mount region for generation {generation} is gone")]
    ContainerMissingRace { generation: GenerationId },
    /// A callback arrived in a state that cannot accept it.
    #[error("callback `{callback}` not accepted in state {state}")]
    UnexpectedCallback {
        callback: String,
        state: GenerationState,
    },
}

impl EmbedError {
    /// Stable error code for structured logging.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ScriptLoadFailure { .. } => "EMBED_SCRIPT_LOAD_FAILURE",
            Self::ProviderNeverReady { .. } => "EMBED_PROVIDER_NEVER_READY",
            Self::StaleCallbackIgnored { .. } => "EMBED_STALE_CALLBACK",
            Self::ContainerMissingRace { .. } => "EMBED_CONTAINER_MISSING",
            Self::UnexpectedCallback { .. } => "EMBED_UNEXPECTED_CALLBACK",
        }
    }

    /// Whether the failure is a silently dropped callback rather than an
    /// attempt-ending failure.
    pub fn is_ignorable(&self) -> bool {
        matches!(
            self,
            Self::StaleCallbackIgnored { .. }
                | Self::ContainerMissingRace { .. }
                | Self::UnexpectedCallback { .. }
        )
    }
}

fn display_current(current: &Option<GenerationId>) -> String {
    current.map_or_else(|| "none".to_string(), |g| g.to_string())
}

/// Invalid embed configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("required field `{field}` is empty")]
    EmptyField { field: &'static str },
    #[error("`{field}` must be at least {min} (got {value})")]
    BelowMinimum {
        field: &'static str,
        min: u64,
        value: u64,
    },
    #[error("partner and widget attributes must differ (both `{attribute}`)")]
    DuplicateAttribute { attribute: String },
    #[error("attribute `{attribute}` is not a data attribute")]
    InvalidAttribute { attribute: String },
    #[error("failed to parse config: {0}")]
    Parse(String),
}

impl ConfigError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::EmptyField { .. } => "CONFIG_EMPTY_FIELD",
            Self::BelowMinimum { .. } => "CONFIG_BELOW_MINIMUM",
            Self::DuplicateAttribute { .. } => "CONFIG_DUPLICATE_ATTRIBUTE",
            Self::InvalidAttribute { .. } => "CONFIG_INVALID_ATTRIBUTE",
            Self::Parse(_) => "CONFIG_PARSE",
        }
    }
}
