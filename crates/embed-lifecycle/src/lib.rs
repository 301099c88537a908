#![forbid(unsafe_code)]

//! Lifecycle controller for an embedded third-party booking widget.
//!
//! The provider script is a page-wide resource shared by every widget on the
//! page. Each widget is driven by a [`LifecycleOrchestrator`] that issues
//! generations: one identified attempt to render a mount node, load the
//! script, poll for the provider runtime and either become ready or fall back
//! to an outbound link. Timers and listeners carry a [`CallbackToken`] naming
//! the generation they belong to, so anything addressed to a superseded
//! generation is ignored.
//!
//! The page itself is abstracted behind the [`host`] traits.
//! [`page_sim::SimulatedPage`] implements them on a virtual clock.

pub mod config;
pub mod error;
pub mod fallback_timer;
pub mod generation;
pub mod host;
pub mod orchestrator;
pub mod page_sim;
pub mod readiness_poller;
pub mod remount_controller;
pub mod scenario;
pub mod script_resource;
pub mod telemetry;
pub mod watchers;

pub use config::{EmbedConfig, ScriptReusePolicy};
pub use error::{ConfigError, EmbedError};
pub use generation::{
    EmbedGeneration, GenerationId, GenerationState, GenerationTrigger, MountKey, OrchestratorId,
    TransitionRecord,
};
pub use host::{CallbackKind, CallbackToken, PageHost};
pub use orchestrator::{LifecycleOrchestrator, OrchestratorSnapshot};
pub use telemetry::{EmbedEvent, EmbedObserver};
pub use watchers::RecoveryAction;
