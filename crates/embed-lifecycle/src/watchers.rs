//! Recovery triggers: tab visibility and SPA navigation.

use serde::{Deserialize, Serialize};

use crate::generation::{GenerationState, OrchestratorId};
use crate::host::{ListenerId, MountContent, PageEventKind, PageEvents};

/// What the orchestrator should do about a revisit or a route change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    None,
    /// Full remount with a new generation.
    Remount,
    /// Clear and restore the embedded frame's source in place.
    RefreshFrame,
}

impl RecoveryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Remount => "remount",
            Self::RefreshFrame => "refresh_frame",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageSignal {
    Hidden,
    Visible,
    Focus,
}

/// How a page signal relates to the last known visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Revisit {
    /// Not a revisit.
    No,
    /// Observed hidden → visible (from either event).
    Confirmed,
    /// Focus with no preceding hidden event.
    FocusOnly,
}

// ---------------------------------------------------------------------------
// VisibilityWatcher
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisibilityWatcher {
    hidden: bool,
    listeners: Vec<ListenerId>,
}

impl VisibilityWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_attached(&self) -> bool {
        !self.listeners.is_empty()
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// Register `visibilitychange` and `focus` listeners. Idempotent.
    pub fn attach<E: PageEvents + ?Sized>(&mut self, events: &mut E, owner: OrchestratorId) {
        if self.is_attached() {
            return;
        }
        self.listeners = vec![
            events.add_page_listener(owner, PageEventKind::VisibilityChange),
            events.add_page_listener(owner, PageEventKind::Focus),
        ];
    }

    pub fn detach<E: PageEvents + ?Sized>(&mut self, events: &mut E) {
        for listener in self.listeners.drain(..) {
            events.remove_page_listener(listener);
        }
        self.hidden = false;
    }

    pub fn observe(&mut self, signal: PageSignal) -> Revisit {
        match signal {
            PageSignal::Hidden => {
                self.hidden = true;
                Revisit::No
            }
            PageSignal::Visible | PageSignal::Focus if self.hidden => {
                self.hidden = false;
                Revisit::Confirmed
            }
            PageSignal::Visible => Revisit::No,
            PageSignal::Focus => Revisit::FocusOnly,
        }
    }

    /// Decide how to recover on a revisit.
    ///
    /// An empty mount is remounted whatever the generation's state. A frame
    /// is refreshed only for a settled generation on a confirmed revisit; a
    /// bare focus never refreshes.
    pub fn decide(
        revisit: Revisit,
        state: GenerationState,
        content: Option<&MountContent>,
    ) -> RecoveryAction {
        let Some(content) = content else {
            return RecoveryAction::None;
        };
        if revisit == Revisit::No {
            return RecoveryAction::None;
        }
        if content.is_empty() {
            return RecoveryAction::Remount;
        }
        if revisit == Revisit::Confirmed && state.is_settled() && content.has_frame() {
            return RecoveryAction::RefreshFrame;
        }
        RecoveryAction::None
    }
}

// ---------------------------------------------------------------------------
// NavigationWatcher
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "change")]
pub enum RouteChange {
    Initial { route: String },
    Unchanged,
    Changed { from: String, to: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavigationWatcher {
    route: Option<String>,
}

impl NavigationWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&self) -> Option<&str> {
        self.route.as_deref()
    }

    pub fn observe(&mut self, route: &str) -> RouteChange {
        match self.route.replace(route.to_string()) {
            None => RouteChange::Initial {
                route: route.to_string(),
            },
            Some(previous) if previous == route => RouteChange::Unchanged,
            Some(previous) => RouteChange::Changed {
                from: previous,
                to: route.to_string(),
            },
        }
    }

    pub fn reset(&mut self) {
        self.route = None;
    }
}
