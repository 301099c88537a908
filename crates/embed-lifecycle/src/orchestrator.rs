//! Lifecycle orchestrator: the only type host pages talk to.
//!
//! Owns at most one current generation. Mount, navigation, revisit and
//! explicit remount requests all go through [`LifecycleOrchestrator::remount`]'s
//! internal path, which tears down the previous generation's timers and
//! script subscription before issuing the next one. Every asynchronous entry
//! point checks generation identity first; anything addressed to a superseded
//! generation is recorded as an ignored event and otherwise has no effect.
//!
//! No entry point returns an error. Failures end as events with a stable
//! error code, and the only user-visible failure is `show_fallback`.

use serde::{Deserialize, Serialize};

use crate::config::EmbedConfig;
use crate::error::{ConfigError, EmbedError};
use crate::fallback_timer::FallbackTimer;
use crate::generation::{
    EmbedGeneration, GenerationId, GenerationState, GenerationTrigger, MountKey, OrchestratorId,
    TransitionRecord,
};
use crate::host::{CallbackKind, CallbackToken, PageHost};
use crate::readiness_poller::{PollOutcome, ReadinessPoller};
use crate::remount_controller::RemountController;
use crate::script_resource::{ScriptAcquisition, ScriptResource, ScriptSubscription};
use crate::telemetry::{EmbedEvent, EmbedObserver, EventRecorder};
use crate::watchers::{NavigationWatcher, PageSignal, RecoveryAction, RouteChange, VisibilityWatcher};

/// Serializable view of an orchestrator for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorSnapshot {
    pub orchestrator_id: OrchestratorId,
    pub mounted: bool,
    pub route: Option<String>,
    pub generation: Option<GenerationId>,
    pub state: Option<GenerationState>,
    pub poll_attempts: u32,
    pub show_fallback: bool,
    pub fallback_url: String,
    pub generations_issued: u64,
    pub fallbacks_shown: u64,
    pub transitions: usize,
    pub events_emitted: u64,
}

/// Drives one widget's generations on a page.
#[derive(Debug)]
pub struct LifecycleOrchestrator {
    id: OrchestratorId,
    config: EmbedConfig,
    mounted: bool,
    remounts: RemountController,
    poller: Option<ReadinessPoller>,
    fallback: Option<FallbackTimer>,
    script: Option<ScriptSubscription>,
    visibility: VisibilityWatcher,
    navigation: NavigationWatcher,
    show_fallback: bool,
    fallbacks_shown: u64,
    transition_log: Vec<TransitionRecord>,
    events: EventRecorder,
}

impl LifecycleOrchestrator {
    /// Validate `config` and build an unmounted orchestrator.
    pub fn new(id: OrchestratorId, config: EmbedConfig) -> Result<Self, ConfigError> {
        let config = config.validate()?;
        Ok(Self {
            id,
            remounts: RemountController::new(id, &config),
            config,
            mounted: false,
            poller: None,
            fallback: None,
            script: None,
            visibility: VisibilityWatcher::new(),
            navigation: NavigationWatcher::new(),
            show_fallback: false,
            fallbacks_shown: 0,
            transition_log: Vec::new(),
            events: EventRecorder::new(),
        })
    }

    pub fn with_observer(mut self, observer: impl EmbedObserver + 'static) -> Self {
        self.events.set_observer(Box::new(observer));
        self
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn id(&self) -> OrchestratorId {
        self.id
    }

    pub fn config(&self) -> &EmbedConfig {
        &self.config
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Whether the host should render the outbound link instead of the embed.
    pub fn show_fallback(&self) -> bool {
        self.show_fallback
    }

    pub fn fallback_url(&self) -> &str {
        &self.config.fallback_url
    }

    pub fn fallbacks_shown(&self) -> u64 {
        self.fallbacks_shown
    }

    pub fn current_generation(&self) -> Option<&EmbedGeneration> {
        self.remounts.current()
    }

    /// Key the host should render the mount region with.
    pub fn current_key(&self) -> Option<MountKey> {
        self.remounts.current_key()
    }

    pub fn state(&self) -> Option<GenerationState> {
        self.remounts.current().map(|g| g.state)
    }

    pub fn route(&self) -> Option<&str> {
        self.navigation.route()
    }

    pub fn generations_issued(&self) -> u64 {
        self.remounts.issued()
    }

    pub fn transition_log(&self) -> &[TransitionRecord] {
        &self.transition_log
    }

    pub fn events(&self) -> &[EmbedEvent] {
        self.events.events()
    }

    pub fn drain_events(&mut self) -> Vec<EmbedEvent> {
        self.events.drain()
    }

    pub fn snapshot(&self) -> OrchestratorSnapshot {
        let current = self.remounts.current();
        OrchestratorSnapshot {
            orchestrator_id: self.id,
            mounted: self.mounted,
            route: self.navigation.route().map(str::to_string),
            generation: current.map(|g| g.id),
            state: current.map(|g| g.state),
            poll_attempts: current.map_or(0, |g| g.poll_attempts),
            show_fallback: self.show_fallback,
            fallback_url: self.config.fallback_url.clone(),
            generations_issued: self.remounts.issued(),
            fallbacks_shown: self.fallbacks_shown,
            transitions: self.transition_log.len(),
            events_emitted: self.events.emitted(),
        }
    }

    // -----------------------------------------------------------------------
    // Host entry points
    // -----------------------------------------------------------------------

    /// The host rendered the page region. Registers page listeners and
    /// issues the first generation. Returns `None` if already mounted.
    pub fn mount<H: PageHost + ?Sized>(
        &mut self,
        host: &mut H,
        route: &str,
    ) -> Option<GenerationId> {
        let now = host.now_ms();
        if self.mounted {
            self.emit(now, EmbedEvent::new(self.id, "mount", "already_mounted"));
            return None;
        }
        self.mounted = true;
        self.navigation.observe(route);
        self.visibility.attach(host, self.id);
        self.emit(now, EmbedEvent::new(self.id, "mount", "ok").detail(route));
        Some(self.issue_generation(host, "mount"))
    }

    /// Force a clean reattachment. Returns `None` if not mounted.
    pub fn remount<H: PageHost + ?Sized>(&mut self, host: &mut H) -> Option<GenerationId> {
        if !self.mounted {
            let now = host.now_ms();
            self.emit(now, EmbedEvent::new(self.id, "remount", "not_mounted"));
            return None;
        }
        Some(self.issue_generation(host, "explicit"))
    }

    /// The host's current route identifier changed.
    pub fn route_changed<H: PageHost + ?Sized>(
        &mut self,
        host: &mut H,
        route: &str,
    ) -> Option<GenerationId> {
        let change = self.navigation.observe(route);
        if !self.mounted {
            return None;
        }
        match change {
            RouteChange::Changed { from, to } => {
                let now = host.now_ms();
                self.emit(
                    now,
                    EmbedEvent::new(self.id, "navigation", "changed").detail(format!("{from} -> {to}")),
                );
                Some(self.issue_generation(host, "navigation"))
            }
            RouteChange::Initial { .. } | RouteChange::Unchanged => None,
        }
    }

    /// `visibilitychange` fired.
    pub fn visibility_changed<H: PageHost + ?Sized>(
        &mut self,
        host: &mut H,
        visible: bool,
    ) -> RecoveryAction {
        let signal = if visible {
            PageSignal::Visible
        } else {
            PageSignal::Hidden
        };
        self.page_signal(host, signal)
    }

    /// Window `focus` fired.
    pub fn window_focused<H: PageHost + ?Sized>(&mut self, host: &mut H) -> RecoveryAction {
        self.page_signal(host, PageSignal::Focus)
    }

    /// The host confirmed the node rendered for `key`.
    pub fn mount_rendered<H: PageHost + ?Sized>(&mut self, host: &mut H, key: MountKey) {
        let now = host.now_ms();
        match self.remounts.confirm(host, key) {
            Ok(generation) => {
                self.emit(
                    now,
                    EmbedEvent::new(self.id, "mount_rendered", "ok").generation(generation),
                );
                self.attach_script(host, generation);
            }
            Err(err) => self.ignore(now, "mount_rendered", key.generation, &err),
        }
    }

    /// A timer or script listener fired.
    pub fn on_callback<H: PageHost + ?Sized>(&mut self, host: &mut H, token: CallbackToken) {
        let now = host.now_ms();
        if let Err(err) = self.check_callback(host, token) {
            self.ignore(now, token.kind.as_str(), token.generation, &err);
            return;
        }
        match token.kind {
            CallbackKind::PollTick => self.on_poll_tick(host, token.generation),
            CallbackKind::FallbackDeadline => self.on_deadline(host, token.generation),
            CallbackKind::ScriptLoaded => self.on_script_settled(host, token.generation, true),
            CallbackKind::ScriptFailed => self.on_script_settled(host, token.generation, false),
        }
    }

    /// The host is removing the page region. Clears every timer and listener
    /// and strips the mount. Returns `false` if not mounted.
    pub fn unmount<H: PageHost + ?Sized>(&mut self, host: &mut H) -> bool {
        let now = host.now_ms();
        if !self.mounted {
            self.emit(now, EmbedEvent::new(self.id, "unmount", "not_mounted"));
            return false;
        }
        self.cancel_wiring(host);
        if let Some(retired) = self.remounts.retire(host) {
            self.record(
                now,
                retired.generation,
                retired.from_state,
                GenerationState::Stale,
                GenerationTrigger::Supersede,
            );
        }
        self.visibility.detach(host);
        self.navigation.reset();
        self.mounted = false;
        self.show_fallback = false;
        self.emit(now, EmbedEvent::new(self.id, "unmount", "ok"));
        true
    }

    // -----------------------------------------------------------------------
    // Generation wiring
    // -----------------------------------------------------------------------

    fn issue_generation<H: PageHost + ?Sized>(&mut self, host: &mut H, reason: &str) -> GenerationId {
        self.cancel_wiring(host);
        self.show_fallback = false;
        let now = host.now_ms();
        let (generation, superseded) = self.remounts.remount(host, now);
        if let Some(retired) = superseded {
            self.record(
                now,
                retired.generation,
                retired.from_state,
                GenerationState::Stale,
                GenerationTrigger::Supersede,
            );
        }
        self.fallback = Some(FallbackTimer::arm(
            host,
            self.token(generation, CallbackKind::FallbackDeadline),
            now,
            self.config.fallback_timeout_ms,
        ));
        self.emit(
            now,
            EmbedEvent::new(self.id, "remount", "ok")
                .generation(generation)
                .detail(reason),
        );
        generation
    }

    /// Clear the current generation's poll interval, deadline and script
    /// subscription. The shared script tag stays.
    fn cancel_wiring<H: PageHost + ?Sized>(&mut self, host: &mut H) {
        if let Some(mut poller) = self.poller.take() {
            poller.cancel(host);
        }
        if let Some(mut fallback) = self.fallback.take() {
            fallback.cancel(host);
        }
        if let Some(subscription) = self.script.take() {
            subscription.release(host);
        }
    }

    fn attach_script<H: PageHost + ?Sized>(&mut self, host: &mut H, generation: GenerationId) {
        let now = host.now_ms();
        if self.transition(now, GenerationTrigger::Attach).is_none() {
            return;
        }
        let acquisition =
            ScriptResource::ensure_loaded(host, &self.config.script_url, self.config.script_reuse);
        let outcome = match acquisition {
            ScriptAcquisition::Ready { .. } => "ready",
            ScriptAcquisition::Pending { inserted: true, .. } => "inserted",
            ScriptAcquisition::Pending { inserted: false, .. } => "shared",
            ScriptAcquisition::Failed { .. } => "failed",
        };
        self.emit(
            now,
            EmbedEvent::new(self.id, "script_acquire", outcome).generation(generation),
        );
        match acquisition {
            ScriptAcquisition::Ready { .. } => self.start_polling(host, generation),
            ScriptAcquisition::Pending { handle, .. } => {
                self.script = Some(ScriptSubscription::subscribe(
                    host,
                    handle,
                    self.token(generation, CallbackKind::ScriptLoaded),
                ));
            }
            ScriptAcquisition::Failed { .. } => self.script_failed(now),
        }
    }

    fn start_polling<H: PageHost + ?Sized>(&mut self, host: &mut H, generation: GenerationId) {
        let now = host.now_ms();
        if self.transition(now, GenerationTrigger::ScriptLoaded).is_none() {
            return;
        }
        self.poller = Some(ReadinessPoller::start(
            host,
            self.token(generation, CallbackKind::PollTick),
            self.config.poll_interval_ms,
            self.config.max_poll_attempts,
        ));
    }

    /// The fallback deadline stays armed; the failure only stops this
    /// generation from progressing.
    fn script_failed(&mut self, now: u64) {
        if self.transition(now, GenerationTrigger::ScriptFailed).is_none() {
            return;
        }
        let err = EmbedError::ScriptLoadFailure {
            url: self.config.script_url.clone(),
        };
        let generation = self.remounts.current().map(|g| g.id);
        let mut event = EmbedEvent::new(self.id, "script", "failed").error(&err);
        if let Some(generation) = generation {
            event = event.generation(generation);
        }
        self.emit(now, event);
    }

    // -----------------------------------------------------------------------
    // Callback handlers (generation already checked)
    // -----------------------------------------------------------------------

    fn check_callback<H: PageHost + ?Sized>(
        &self,
        host: &H,
        token: CallbackToken,
    ) -> Result<(), EmbedError> {
        let is_current = token.owner == self.id && self.remounts.is_current(token.generation);
        if !self.mounted || !is_current {
            return Err(EmbedError::StaleCallbackIgnored {
                callback_generation: token.generation,
                current: self.remounts.current().map(|g| g.id),
            });
        }
        let key = MountKey {
            owner: self.id,
            generation: token.generation,
        };
        let needs_container = !matches!(token.kind, CallbackKind::FallbackDeadline);
        if needs_container && host.inspect_mount(key).is_none() {
            return Err(EmbedError::ContainerMissingRace {
                generation: token.generation,
            });
        }
        Ok(())
    }

    fn on_poll_tick<H: PageHost + ?Sized>(&mut self, host: &mut H, generation: GenerationId) {
        let now = host.now_ms();
        let outcome = match self.poller.as_mut() {
            Some(poller) => poller.tick(host, generation),
            None => None,
        };
        let Some(outcome) = outcome else {
            let err = self.unexpected(CallbackKind::PollTick);
            self.ignore(now, "poll_tick", generation, &err);
            return;
        };
        let attempts = match outcome {
            PollOutcome::Ready { attempts } | PollOutcome::Exhausted { attempts } => attempts,
            PollOutcome::Pending { attempt, .. } => attempt,
        };
        if let Some(current) = self.remounts.current_mut() {
            current.poll_attempts = attempts;
        }
        match outcome {
            PollOutcome::Pending { attempt, probe } => {
                self.emit(
                    now,
                    EmbedEvent::new(self.id, "poll_tick", "pending")
                        .generation(generation)
                        .detail(format!("attempt={attempt} runtime={probe:?}")),
                );
            }
            PollOutcome::Ready { .. } => {
                self.poller = None;
                if let Some(mut fallback) = self.fallback.take() {
                    fallback.cancel(host);
                }
                if self.config.dispatch_ready_event {
                    host.dispatch_ready_event(&self.config.ready_event_name);
                }
                self.transition(now, GenerationTrigger::ProviderReady);
            }
            PollOutcome::Exhausted { attempts } => {
                self.poller = None;
                if self.transition(now, GenerationTrigger::PollExhausted).is_some() {
                    let err = EmbedError::ProviderNeverReady {
                        generation,
                        attempts,
                    };
                    self.emit(
                        now,
                        EmbedEvent::new(self.id, "poll", "exhausted")
                            .generation(generation)
                            .error(&err),
                    );
                }
            }
        }
    }

    fn on_deadline<H: PageHost + ?Sized>(&mut self, host: &mut H, generation: GenerationId) {
        let now = host.now_ms();
        let expired = self
            .fallback
            .as_mut()
            .is_some_and(|fallback| fallback.expire(generation));
        if !expired {
            let err = self.unexpected(CallbackKind::FallbackDeadline);
            self.ignore(now, "fallback_deadline", generation, &err);
            return;
        }
        self.fallback = None;
        if self.state() == Some(GenerationState::Ready) {
            return;
        }
        if let Some(mut poller) = self.poller.take() {
            poller.cancel(host);
        }
        if let Some(subscription) = self.script.take() {
            subscription.release(host);
        }
        if self.state().is_some_and(|s| s.is_in_flight()) {
            self.transition(now, GenerationTrigger::DeadlineExpired);
        }
        self.show_fallback = true;
        self.fallbacks_shown += 1;
        self.emit(
            now,
            EmbedEvent::new(self.id, "fallback", "shown")
                .generation(generation)
                .detail(self.config.fallback_url.clone()),
        );
    }

    fn on_script_settled<H: PageHost + ?Sized>(
        &mut self,
        host: &mut H,
        generation: GenerationId,
        loaded: bool,
    ) {
        let now = host.now_ms();
        let kind = if loaded {
            CallbackKind::ScriptLoaded
        } else {
            CallbackKind::ScriptFailed
        };
        let subscribed = self
            .script
            .as_ref()
            .is_some_and(|s| s.generation == generation);
        if !subscribed || self.state() != Some(GenerationState::ScriptLoading) {
            let err = self.unexpected(kind);
            self.ignore(now, kind.as_str(), generation, &err);
            return;
        }
        if let Some(subscription) = self.script.take() {
            subscription.release(host);
        }
        if loaded {
            self.start_polling(host, generation);
        } else {
            self.script_failed(now);
        }
    }

    // -----------------------------------------------------------------------
    // Revisit handling
    // -----------------------------------------------------------------------

    fn page_signal<H: PageHost + ?Sized>(
        &mut self,
        host: &mut H,
        signal: PageSignal,
    ) -> RecoveryAction {
        if !self.mounted {
            return RecoveryAction::None;
        }
        let now = host.now_ms();
        let revisit = self.visibility.observe(signal);
        let Some((key, state)) = self.remounts.current().map(|g| (g.key(), g.state)) else {
            return RecoveryAction::None;
        };
        let content = host.inspect_mount(key);
        if content.is_none() {
            let err = EmbedError::ContainerMissingRace {
                generation: key.generation,
            };
            self.ignore(now, "revisit", key.generation, &err);
            return RecoveryAction::None;
        }
        let action = VisibilityWatcher::decide(revisit, state, content.as_ref());
        self.emit(
            now,
            EmbedEvent::new(self.id, "revisit", action.as_str())
                .generation(key.generation)
                .detail(format!("{signal:?}/{revisit:?}")),
        );
        match action {
            RecoveryAction::Remount => {
                self.issue_generation(host, "visibility");
            }
            RecoveryAction::RefreshFrame => {
                host.refresh_frame(key);
            }
            RecoveryAction::None => {}
        }
        action
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    fn token(&self, generation: GenerationId, kind: CallbackKind) -> CallbackToken {
        CallbackToken::new(self.id, generation, kind)
    }

    fn unexpected(&self, kind: CallbackKind) -> EmbedError {
        EmbedError::UnexpectedCallback {
            callback: kind.as_str().to_string(),
            state: self.state().unwrap_or(GenerationState::Stale),
        }
    }

    /// Apply `trigger` to the current generation and log it.
    fn transition(
        &mut self,
        now: u64,
        trigger: GenerationTrigger,
    ) -> Option<(GenerationState, GenerationState)> {
        let current = self.remounts.current_mut()?;
        let generation = current.id;
        let Some((from, to)) = current.apply(trigger) else {
            let err = EmbedError::UnexpectedCallback {
                callback: trigger.as_str().to_string(),
                state: current.state,
            };
            self.ignore(now, trigger.as_str(), generation, &err);
            return None;
        };
        self.record(now, generation, from, to, trigger);
        Some((from, to))
    }

    fn record(
        &mut self,
        now: u64,
        generation: GenerationId,
        from: GenerationState,
        to: GenerationState,
        trigger: GenerationTrigger,
    ) {
        let outcome = if trigger.is_failure() { "failed" } else { "ok" };
        self.transition_log.push(TransitionRecord {
            sequence: self.transition_log.len() as u64,
            timestamp_ms: now,
            generation,
            from_state: from,
            to_state: to,
            trigger,
        });
        self.emit(
            now,
            EmbedEvent::new(self.id, trigger.as_str(), outcome)
                .generation(generation)
                .states(from, to),
        );
    }

    fn ignore(&mut self, now: u64, event: &str, generation: GenerationId, err: &EmbedError) {
        let outcome = if err.is_ignorable() { "ignored" } else { "failed" };
        self.emit(
            now,
            EmbedEvent::new(self.id, event, outcome)
                .generation(generation)
                .error(err),
        );
    }

    fn emit(&mut self, now: u64, event: EmbedEvent) {
        self.events.emit(now, event);
    }
}
