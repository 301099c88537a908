//! Host boundary.
//!
//! The orchestrator never touches a browser directly. A host adapter exposes
//! the document, the render slot, timers and page listeners through these
//! traits, and feeds asynchronous outcomes back as [`CallbackToken`]s. Tokens
//! carry the owning orchestrator and generation, so a callback can always be
//! checked against the current generation before it is acted on.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::generation::{GenerationId, MountKey, OrchestratorId};

// ---------------------------------------------------------------------------
// Handles and tokens
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimerId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListenerId(pub u64);

/// A `<script>` element referencing the provider URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScriptHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackKind {
    PollTick,
    FallbackDeadline,
    ScriptLoaded,
    ScriptFailed,
}

impl CallbackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PollTick => "poll_tick",
            Self::FallbackDeadline => "fallback_deadline",
            Self::ScriptLoaded => "script_loaded",
            Self::ScriptFailed => "script_failed",
        }
    }
}

impl fmt::Display for CallbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a scheduled callback, handed back to the orchestrator when it
/// fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallbackToken {
    pub owner: OrchestratorId,
    pub generation: GenerationId,
    pub kind: CallbackKind,
}

impl CallbackToken {
    pub fn new(owner: OrchestratorId, generation: GenerationId, kind: CallbackKind) -> Self {
        Self {
            owner,
            generation,
            kind,
        }
    }

    pub fn with_kind(self, kind: CallbackKind) -> Self {
        Self { kind, ..self }
    }
}

// ---------------------------------------------------------------------------
// Document-side value types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptStatus {
    Loading,
    Loaded,
    Failed,
}

/// What the page-global provider object currently looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeProbe {
    Absent,
    /// Installed, but without a callable init entry point.
    NoInit,
    Ready,
}

/// Observable content of a mount node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountContent {
    pub child_count: usize,
    /// Source of the embedded frame, if the provider injected one.
    pub frame_src: Option<String>,
}

impl MountContent {
    /// No child nodes and no recognizable frame.
    pub fn is_empty(&self) -> bool {
        self.child_count == 0 && self.frame_src.is_none()
    }

    pub fn has_frame(&self) -> bool {
        self.frame_src.is_some()
    }
}

/// Identification attributes stamped onto a mount node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountAttributes {
    pub partner_attribute: String,
    pub partner_id: String,
    pub widget_attribute: String,
    pub widget_ref: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageEventKind {
    VisibilityChange,
    Focus,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Timers on the host's event loop.
pub trait Scheduler {
    fn now_ms(&self) -> u64;
    /// Fire `token` every `period_ms` until cleared.
    fn set_interval(&mut self, period_ms: u64, token: CallbackToken) -> TimerId;
    /// Fire `token` once after `delay_ms` unless cleared.
    fn set_timeout(&mut self, delay_ms: u64, token: CallbackToken) -> TimerId;
    /// Clearing an unknown or already-fired timer is a no-op.
    fn clear_timer(&mut self, timer: TimerId);
}

/// Page-wide script tags and the provider runtime.
pub trait ScriptDocument {
    fn find_script(&self, url: &str) -> Option<(ScriptHandle, ScriptStatus)>;
    /// Insert one `async` script tag for `url`.
    fn insert_script(&mut self, url: &str) -> ScriptHandle;
    fn remove_script(&mut self, handle: ScriptHandle);
    /// Deliver `token` (with kind set to `ScriptLoaded` or `ScriptFailed`)
    /// when the tag settles.
    fn listen_script(&mut self, handle: ScriptHandle, token: CallbackToken) -> ListenerId;
    fn unlisten_script(&mut self, listener: ListenerId);
    fn probe_runtime(&self) -> RuntimeProbe;
    /// Call the runtime's init entry point. Returns `false` if it was not
    /// callable.
    fn invoke_init(&mut self) -> bool;
    fn dispatch_ready_event(&mut self, name: &str);
}

/// The keyed render slot the host owns.
pub trait RenderSlot {
    /// Render the mount region with `key` as its identity. The host replaces
    /// the previous node for the same owner and later confirms with
    /// `LifecycleOrchestrator::mount_rendered`.
    fn request_render(&mut self, key: MountKey);
    /// `None` if no node with this key exists.
    fn inspect_mount(&self, key: MountKey) -> Option<MountContent>;
    /// Returns `false` if the node is gone.
    fn apply_attributes(&mut self, key: MountKey, attributes: &MountAttributes) -> bool;
    /// Remove identification attributes and clear content.
    fn strip_mount(&mut self, key: MountKey);
    /// Clear and restore the embedded frame's source. Returns `false` if there
    /// is no frame.
    fn refresh_frame(&mut self, key: MountKey) -> bool;
}

/// Document-level listeners.
pub trait PageEvents {
    fn add_page_listener(&mut self, owner: OrchestratorId, kind: PageEventKind) -> ListenerId;
    fn remove_page_listener(&mut self, listener: ListenerId);
}

/// Everything the orchestrator needs from its page.
pub trait PageHost: Scheduler + ScriptDocument + RenderSlot + PageEvents {}

impl<T: Scheduler + ScriptDocument + RenderSlot + PageEvents> PageHost for T {}
