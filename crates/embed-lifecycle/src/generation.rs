//! Generation identity and the per-generation state machine.
//!
//! A generation is one attempt to mount and initialize the widget. States:
//! `Idle → ScriptLoading → Polling → Ready`, with `Failed` as the unsuccessful
//! terminal state and `Stale` once a newer generation (or teardown)
//! supersedes it. Transitions are looked up in a fixed table; anything not in
//! the table is rejected.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Monotonic generation token, unique per orchestrator.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct GenerationId(pub u64);

impl GenerationId {
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for GenerationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one orchestrator on a page; routes callbacks back to it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct OrchestratorId(pub u32);

impl fmt::Display for OrchestratorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "embed-{}", self.0)
    }
}

/// Render key for a mount point. The host uses it as the identity of the
/// rendered node, so a new key always produces a fresh node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MountKey {
    pub owner: OrchestratorId,
    pub generation: GenerationId,
}

impl fmt::Display for MountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-g{}", self.owner, self.generation)
    }
}

// ---------------------------------------------------------------------------
// GenerationState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationState {
    /// Waiting for the host to confirm the mount node.
    Idle,
    /// Attributes applied; waiting for the provider script.
    ScriptLoading,
    /// Script available; polling for the runtime's init entry point.
    Polling,
    /// Init invoked.
    Ready,
    /// Script failed, poll budget exhausted, or deadline elapsed.
    Failed,
    /// Superseded or torn down; all callbacks are ignored.
    Stale,
}

impl GenerationState {
    /// Still waiting on an external event.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Idle | Self::ScriptLoading | Self::Polling)
    }

    /// Finished for this generation (success or failure), but not superseded.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Ready | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::ScriptLoading => "script_loading",
            Self::Polling => "polling",
            Self::Ready => "ready",
            Self::Failed => "failed",
            Self::Stale => "stale",
        }
    }
}

impl fmt::Display for GenerationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// GenerationTrigger
// ---------------------------------------------------------------------------

/// Named triggers that drive generation transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationTrigger {
    /// Mount node confirmed and attributes applied (`Idle → ScriptLoading`).
    Attach,
    /// Script loaded or runtime already present (`ScriptLoading → Polling`).
    ScriptLoaded,
    /// Script load failed (`ScriptLoading → Failed`).
    ScriptFailed,
    /// Runtime init invoked (`Polling → Ready`).
    ProviderReady,
    /// Poll budget spent (`Polling → Failed`).
    PollExhausted,
    /// Fallback deadline elapsed before readiness (in-flight → `Failed`).
    DeadlineExpired,
    /// Newer generation issued or host teardown (any live state → `Stale`).
    Supersede,
}

impl GenerationTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Attach => "attach",
            Self::ScriptLoaded => "script_loaded",
            Self::ScriptFailed => "script_failed",
            Self::ProviderReady => "provider_ready",
            Self::PollExhausted => "poll_exhausted",
            Self::DeadlineExpired => "deadline_expired",
            Self::Supersede => "supersede",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::ScriptFailed | Self::PollExhausted | Self::DeadlineExpired
        )
    }
}

impl fmt::Display for GenerationTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target state for `(current, trigger)`, or `None` if not allowed.
pub fn target_state(
    current: GenerationState,
    trigger: GenerationTrigger,
) -> Option<GenerationState> {
    use GenerationState as S;
    use GenerationTrigger as T;
    match (current, trigger) {
        (S::Idle, T::Attach) => Some(S::ScriptLoading),
        (S::ScriptLoading, T::ScriptLoaded) => Some(S::Polling),
        (S::ScriptLoading, T::ScriptFailed) => Some(S::Failed),
        (S::Polling, T::ProviderReady) => Some(S::Ready),
        (S::Polling, T::PollExhausted) => Some(S::Failed),

        (S::Idle, T::DeadlineExpired)
        | (S::ScriptLoading, T::DeadlineExpired)
        | (S::Polling, T::DeadlineExpired) => Some(S::Failed),

        (S::Idle, T::Supersede)
        | (S::ScriptLoading, T::Supersede)
        | (S::Polling, T::Supersede)
        | (S::Ready, T::Supersede)
        | (S::Failed, T::Supersede) => Some(S::Stale),

        _ => None,
    }
}

// ---------------------------------------------------------------------------
// EmbedGeneration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedGeneration {
    pub id: GenerationId,
    pub owner: OrchestratorId,
    pub partner_id: String,
    pub widget_ref: String,
    pub state: GenerationState,
    pub created_at_ms: u64,
    pub poll_attempts: u32,
}

impl EmbedGeneration {
    pub fn new(
        id: GenerationId,
        owner: OrchestratorId,
        partner_id: &str,
        widget_ref: &str,
        created_at_ms: u64,
    ) -> Self {
        Self {
            id,
            owner,
            partner_id: partner_id.to_string(),
            widget_ref: widget_ref.to_string(),
            state: GenerationState::Idle,
            created_at_ms,
            poll_attempts: 0,
        }
    }

    pub fn key(&self) -> MountKey {
        MountKey {
            owner: self.owner,
            generation: self.id,
        }
    }

    /// Apply `trigger`, returning `(from, to)` on success.
    pub fn apply(
        &mut self,
        trigger: GenerationTrigger,
    ) -> Option<(GenerationState, GenerationState)> {
        let from = self.state;
        let to = target_state(from, trigger)?;
        self.state = to;
        Some((from, to))
    }
}

/// Single entry in the append-only transition log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub sequence: u64,
    pub timestamp_ms: u64,
    pub generation: GenerationId,
    pub from_state: GenerationState,
    pub to_state: GenerationState,
    pub trigger: GenerationTrigger,
}
