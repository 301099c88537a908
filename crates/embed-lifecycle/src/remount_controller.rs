//! Generation issuing and keyed mount-point replacement.
//!
//! A remount never mutates the old node back into service: the old node is
//! stripped, a new generation id is issued, and the host renders a fresh node
//! keyed by that id. Attributes are applied only after the host confirms the
//! new node, which keeps at most one attributed node per orchestrator.

use crate::config::EmbedConfig;
use crate::error::EmbedError;
use crate::generation::{
    EmbedGeneration, GenerationId, GenerationState, GenerationTrigger, MountKey, OrchestratorId,
};
use crate::host::{MountAttributes, RenderSlot};

/// A generation retired by a remount or teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Superseded {
    pub generation: GenerationId,
    pub from_state: GenerationState,
}

/// Issues generations and owns the keyed mount node for one orchestrator.
#[derive(Debug, Clone)]
pub struct RemountController {
    owner: OrchestratorId,
    attributes: MountAttributes,
    last_issued: GenerationId,
    current: Option<EmbedGeneration>,
}

impl RemountController {
    pub fn new(owner: OrchestratorId, config: &EmbedConfig) -> Self {
        Self {
            owner,
            attributes: MountAttributes {
                partner_attribute: config.partner_attribute.clone(),
                partner_id: config.partner_id.clone(),
                widget_attribute: config.widget_attribute.clone(),
                widget_ref: config.widget_ref.clone(),
            },
            last_issued: GenerationId::default(),
            current: None,
        }
    }

    pub fn current(&self) -> Option<&EmbedGeneration> {
        self.current.as_ref()
    }

    pub fn current_mut(&mut self) -> Option<&mut EmbedGeneration> {
        self.current.as_mut()
    }

    pub fn current_key(&self) -> Option<MountKey> {
        self.current.as_ref().map(EmbedGeneration::key)
    }

    pub fn is_current(&self, generation: GenerationId) -> bool {
        self.current.as_ref().is_some_and(|g| g.id == generation)
    }

    /// Number of generations issued so far.
    pub fn issued(&self) -> u64 {
        self.last_issued.0
    }

    /// Strip the current mount (if any), issue the next generation and ask
    /// the host for a fresh node.
    pub fn remount<H: RenderSlot + ?Sized>(
        &mut self,
        host: &mut H,
        now_ms: u64,
    ) -> (GenerationId, Option<Superseded>) {
        let superseded = self.retire(host);
        self.last_issued = self.last_issued.next();
        let generation = EmbedGeneration::new(
            self.last_issued,
            self.owner,
            &self.attributes.partner_id,
            &self.attributes.widget_ref,
            now_ms,
        );
        let key = generation.key();
        self.current = Some(generation);
        host.request_render(key);
        (self.last_issued, superseded)
    }

    /// Strip the current mount and drop the current generation.
    pub fn retire<H: RenderSlot + ?Sized>(&mut self, host: &mut H) -> Option<Superseded> {
        let mut old = self.current.take()?;
        host.strip_mount(old.key());
        let (from_state, _) = old.apply(GenerationTrigger::Supersede)?;
        Some(Superseded {
            generation: old.id,
            from_state,
        })
    }

    /// The host confirmed a rendered node. Applies attributes if `key` is the
    /// current, still-idle generation and its node exists.
    pub fn confirm<H: RenderSlot + ?Sized>(
        &mut self,
        host: &mut H,
        key: MountKey,
    ) -> Result<GenerationId, EmbedError> {
        let current = self.current.as_ref();
        let Some(generation) = current.filter(|g| g.key() == key) else {
            return Err(EmbedError::StaleCallbackIgnored {
                callback_generation: key.generation,
                current: current.map(|g| g.id),
            });
        };
        if generation.state != GenerationState::Idle {
            return Err(EmbedError::UnexpectedCallback {
                callback: "mount_rendered".to_string(),
                state: generation.state,
            });
        }
        if !host.apply_attributes(key, &self.attributes) {
            return Err(EmbedError::ContainerMissingRace {
                generation: key.generation,
            });
        }
        Ok(key.generation)
    }
}
