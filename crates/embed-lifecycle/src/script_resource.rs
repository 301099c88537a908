//! Page-wide provider script acquisition.
//!
//! The script tag and the runtime it installs belong to the page, not to any
//! generation or orchestrator. [`ScriptResource::ensure_loaded`] is the only
//! place that inserts the tag; it checks the document first, so any number of
//! callers in the same event-loop turn end up sharing one tag.

use serde::{Deserialize, Serialize};

use crate::config::ScriptReusePolicy;
use crate::generation::GenerationId;
use crate::host::{CallbackToken, ListenerId, RuntimeProbe, ScriptDocument, ScriptHandle, ScriptStatus};

/// Result of asking for the provider script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum ScriptAcquisition {
    /// Script already executed (tag loaded or runtime present).
    Ready { handle: Option<ScriptHandle> },
    /// Tag exists and is still loading; subscribe to it.
    Pending { handle: ScriptHandle, inserted: bool },
    /// Tag exists and failed; the reuse policy kept it.
    Failed { handle: ScriptHandle },
}

impl ScriptAcquisition {
    pub fn handle(&self) -> Option<ScriptHandle> {
        match self {
            Self::Ready { handle } => *handle,
            Self::Pending { handle, .. } | Self::Failed { handle } => Some(*handle),
        }
    }

    pub fn inserted(&self) -> bool {
        matches!(self, Self::Pending { inserted: true, .. })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptResource;

impl ScriptResource {
    /// Make sure exactly one tag for `url` exists and report its status.
    pub fn ensure_loaded<D: ScriptDocument + ?Sized>(
        document: &mut D,
        url: &str,
        policy: ScriptReusePolicy,
    ) -> ScriptAcquisition {
        let existing = document.find_script(url);
        if document.probe_runtime() != RuntimeProbe::Absent {
            return ScriptAcquisition::Ready {
                handle: existing.map(|(handle, _)| handle),
            };
        }
        match existing {
            Some((handle, ScriptStatus::Loaded)) => ScriptAcquisition::Ready {
                handle: Some(handle),
            },
            Some((handle, ScriptStatus::Loading)) => ScriptAcquisition::Pending {
                handle,
                inserted: false,
            },
            Some((handle, ScriptStatus::Failed)) => match policy {
                ScriptReusePolicy::Reuse => ScriptAcquisition::Failed { handle },
                ScriptReusePolicy::ReplaceFailed => {
                    // Remove before inserting so two tags never coexist.
                    document.remove_script(handle);
                    ScriptAcquisition::Pending {
                        handle: document.insert_script(url),
                        inserted: true,
                    }
                }
            },
            None => ScriptAcquisition::Pending {
                handle: document.insert_script(url),
                inserted: true,
            },
        }
    }
}

/// One generation's load/error subscription on a shared tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptSubscription {
    pub generation: GenerationId,
    pub handle: ScriptHandle,
    listener: ListenerId,
}

impl ScriptSubscription {
    pub fn subscribe<D: ScriptDocument + ?Sized>(
        document: &mut D,
        handle: ScriptHandle,
        token: CallbackToken,
    ) -> Self {
        Self {
            generation: token.generation,
            handle,
            listener: document.listen_script(handle, token),
        }
    }

    /// Stop listening. The tag itself stays for other subscribers.
    pub fn release<D: ScriptDocument + ?Sized>(self, document: &mut D) {
        document.unlisten_script(self.listener);
    }
}
