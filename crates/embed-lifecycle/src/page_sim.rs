//! Deterministic simulated page.
//!
//! Implements every host trait on a virtual clock so the lifecycle can be
//! driven without a browser. Timers, script settlement, provider injection,
//! keyed renders and scripted page actions all go through one ordered task
//! queue; ties at the same timestamp run in scheduling order.
//!
//! The page keeps instrumentation for assertions: script tag counts, live
//! timers and listeners, init and frame-refresh counters, and a log of every
//! DOM mutation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::generation::{MountKey, OrchestratorId};
use crate::host::{
    CallbackKind, CallbackToken, ListenerId, MountAttributes, MountContent, PageEventKind,
    PageEvents, RenderSlot, RuntimeProbe, Scheduler, ScriptDocument, ScriptHandle, ScriptStatus,
    TimerId,
};
use crate::orchestrator::LifecycleOrchestrator;

// ---------------------------------------------------------------------------
// Provider behavior
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ScriptBehavior {
    LoadAfter { delay_ms: u64 },
    FailAfter { delay_ms: u64 },
    /// The tag never settles.
    Never,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderBehavior {
    pub script: ScriptBehavior,
    /// Loading the script installs the runtime.
    pub runtime_on_load: bool,
    /// The installed runtime exposes a callable init entry point.
    pub runtime_has_init: bool,
    /// Delay between init and frame injection.
    pub inject_after_init_ms: u64,
    pub frame_url: String,
}

impl Default for ProviderBehavior {
    fn default() -> Self {
        Self {
            script: ScriptBehavior::LoadAfter { delay_ms: 30 },
            runtime_on_load: true,
            runtime_has_init: true,
            inject_after_init_ms: 50,
            frame_url: "https://widgets.example/frame".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Scripted page actions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum SimAction {
    Mount { route: String },
    Navigate { route: String },
    Hide,
    Show,
    Focus,
    InstallRuntime,
    /// Drop all mount content (e.g. the browser discarded frames).
    ClearMountContent,
    /// Remove every mount node without telling the orchestrators.
    RemoveRegions,
    Recover,
    Unmount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mutation")]
pub enum DomMutation {
    InsertScript { handle: ScriptHandle },
    RemoveScript { handle: ScriptHandle },
    ReplaceMount { key: MountKey },
    RemoveMount { key: MountKey },
    ApplyAttributes { key: MountKey },
    StripMount { key: MountKey },
    InjectFrame { key: MountKey },
    RefreshFrame { key: MountKey },
    ClearContent { key: MountKey },
}

// ---------------------------------------------------------------------------
// Internal page state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct ScriptTag {
    handle: ScriptHandle,
    url: String,
    status: ScriptStatus,
}

#[derive(Debug, Clone)]
struct MountNode {
    key: MountKey,
    attributes: Option<MountAttributes>,
    child_count: usize,
    frame_src: Option<String>,
}

#[derive(Debug, Clone, Copy)]
struct TimerEntry {
    token: CallbackToken,
    period_ms: Option<u64>,
}

#[derive(Debug, Clone)]
enum SimTask {
    Timer(TimerId),
    ScriptSettle { handle: ScriptHandle, loaded: bool },
    RuntimeInstall,
    ProviderInject,
    Render(MountKey),
    Action(SimAction),
}

#[derive(Debug)]
pub struct SimulatedPage {
    now_ms: u64,
    next_seq: u64,
    next_id: u64,
    provider: ProviderBehavior,
    render_delay_ms: u64,
    tasks: BTreeMap<(u64, u64), SimTask>,
    timers: BTreeMap<TimerId, TimerEntry>,
    scripts: Vec<ScriptTag>,
    script_listeners: BTreeMap<ListenerId, (ScriptHandle, CallbackToken)>,
    page_listeners: BTreeMap<ListenerId, (OrchestratorId, PageEventKind)>,
    nodes: Vec<MountNode>,
    pending_renders: BTreeMap<OrchestratorId, MountKey>,
    runtime: Option<bool>,
    visible: bool,
    scripts_inserted: u64,
    init_calls: u64,
    frame_refreshes: u64,
    dispatched: Vec<String>,
    mutations: Vec<DomMutation>,
}

impl SimulatedPage {
    pub fn new(provider: ProviderBehavior) -> Self {
        Self {
            now_ms: 0,
            next_seq: 0,
            next_id: 1,
            provider,
            render_delay_ms: 0,
            tasks: BTreeMap::new(),
            timers: BTreeMap::new(),
            scripts: Vec::new(),
            script_listeners: BTreeMap::new(),
            page_listeners: BTreeMap::new(),
            nodes: Vec::new(),
            pending_renders: BTreeMap::new(),
            runtime: None,
            visible: true,
            scripts_inserted: 0,
            init_calls: 0,
            frame_refreshes: 0,
            dispatched: Vec::new(),
            mutations: Vec::new(),
        }
    }

    /// Delay between a render request and the keyed node appearing.
    pub fn with_render_delay(mut self, delay_ms: u64) -> Self {
        self.render_delay_ms = delay_ms;
        self
    }

    // -----------------------------------------------------------------------
    // Driving
    // -----------------------------------------------------------------------

    pub fn schedule(&mut self, at_ms: u64, action: SimAction) {
        self.push_task(at_ms.max(self.now_ms), SimTask::Action(action));
    }

    pub fn schedule_runtime_install(&mut self, at_ms: u64) {
        self.push_task(at_ms.max(self.now_ms), SimTask::RuntimeInstall);
    }

    /// Install the provider runtime immediately.
    pub fn install_runtime(&mut self) {
        self.runtime = Some(self.provider.runtime_has_init);
    }

    /// Remove all content from every mount node.
    pub fn clear_mount_content(&mut self) {
        for node in &mut self.nodes {
            node.child_count = 0;
            node.frame_src = None;
            self.mutations.push(DomMutation::ClearContent { key: node.key });
        }
    }

    /// Remove `owner`'s mount node behind the orchestrator's back.
    pub fn remove_region(&mut self, owner: OrchestratorId) {
        let removed: Vec<MountKey> = self
            .nodes
            .iter()
            .filter(|n| n.key.owner == owner)
            .map(|n| n.key)
            .collect();
        self.nodes.retain(|n| n.key.owner != owner);
        for key in removed {
            self.mutations.push(DomMutation::RemoveMount { key });
        }
    }

    /// Run every task due at or before `until_ms`, delivering callbacks to
    /// the matching orchestrators.
    pub fn run_until(&mut self, until_ms: u64, orchestrators: &mut [&mut LifecycleOrchestrator]) {
        while let Some((&(due, seq), _)) = self.tasks.first_key_value() {
            if due > until_ms {
                break;
            }
            let Some(task) = self.tasks.remove(&(due, seq)) else {
                break;
            };
            self.now_ms = due;
            self.dispatch(task, orchestrators);
        }
        self.now_ms = self.now_ms.max(until_ms);
    }

    fn dispatch(&mut self, task: SimTask, orchestrators: &mut [&mut LifecycleOrchestrator]) {
        match task {
            SimTask::Timer(timer) => {
                let Some(entry) = self.timers.get(&timer).copied() else {
                    return;
                };
                match entry.period_ms {
                    Some(period) => self.push_task(self.now_ms + period, SimTask::Timer(timer)),
                    None => {
                        self.timers.remove(&timer);
                    }
                }
                if let Some(orch) = find(orchestrators, entry.token.owner) {
                    orch.on_callback(self, entry.token);
                }
            }
            SimTask::ScriptSettle { handle, loaded } => {
                let Some(tag) = self.scripts.iter_mut().find(|t| t.handle == handle) else {
                    return;
                };
                tag.status = if loaded {
                    ScriptStatus::Loaded
                } else {
                    ScriptStatus::Failed
                };
                if loaded && self.provider.runtime_on_load && self.runtime.is_none() {
                    self.install_runtime();
                }
                let kind = if loaded {
                    CallbackKind::ScriptLoaded
                } else {
                    CallbackKind::ScriptFailed
                };
                let listeners: Vec<ListenerId> = self
                    .script_listeners
                    .iter()
                    .filter(|(_, (h, _))| *h == handle)
                    .map(|(id, _)| *id)
                    .collect();
                for listener in listeners {
                    // An earlier handler may have unsubscribed this one.
                    let Some(&(_, token)) = self.script_listeners.get(&listener) else {
                        continue;
                    };
                    if let Some(orch) = find(orchestrators, token.owner) {
                        orch.on_callback(self, token.with_kind(kind));
                    }
                }
            }
            SimTask::RuntimeInstall => self.install_runtime(),
            SimTask::ProviderInject => self.inject_frames(),
            SimTask::Render(key) => {
                if self.pending_renders.get(&key.owner) != Some(&key) {
                    return;
                }
                self.pending_renders.remove(&key.owner);
                self.nodes.retain(|n| n.key.owner != key.owner);
                self.nodes.push(MountNode {
                    key,
                    attributes: None,
                    child_count: 0,
                    frame_src: None,
                });
                self.mutations.push(DomMutation::ReplaceMount { key });
                if let Some(orch) = find(orchestrators, key.owner) {
                    orch.mount_rendered(self, key);
                }
            }
            SimTask::Action(action) => self.perform(action, orchestrators),
        }
    }

    fn perform(&mut self, action: SimAction, orchestrators: &mut [&mut LifecycleOrchestrator]) {
        match action {
            SimAction::Mount { route } => {
                for orch in orchestrators.iter_mut() {
                    orch.mount(self, &route);
                }
            }
            SimAction::Navigate { route } => {
                for orch in orchestrators.iter_mut() {
                    orch.route_changed(self, &route);
                }
            }
            SimAction::Hide => self.set_visibility(false, orchestrators),
            SimAction::Show => self.set_visibility(true, orchestrators),
            SimAction::Focus => {
                for orch in orchestrators.iter_mut() {
                    if self.listens(orch.id(), PageEventKind::Focus) {
                        orch.window_focused(self);
                    }
                }
            }
            SimAction::InstallRuntime => self.install_runtime(),
            SimAction::ClearMountContent => self.clear_mount_content(),
            SimAction::RemoveRegions => {
                let owners: Vec<OrchestratorId> = self.nodes.iter().map(|n| n.key.owner).collect();
                for owner in owners {
                    self.remove_region(owner);
                }
            }
            SimAction::Recover => {
                for orch in orchestrators.iter_mut() {
                    orch.remount(self);
                }
            }
            SimAction::Unmount => {
                for orch in orchestrators.iter_mut() {
                    orch.unmount(self);
                }
            }
        }
    }

    fn set_visibility(&mut self, visible: bool, orchestrators: &mut [&mut LifecycleOrchestrator]) {
        self.visible = visible;
        for orch in orchestrators.iter_mut() {
            if self.listens(orch.id(), PageEventKind::VisibilityChange) {
                orch.visibility_changed(self, visible);
            }
        }
    }

    fn inject_frames(&mut self) {
        let frame_url = self.provider.frame_url.clone();
        for node in &mut self.nodes {
            let Some(attributes) = node.attributes.as_ref() else {
                continue;
            };
            if node.frame_src.is_some() {
                continue;
            }
            node.frame_src = Some(format!(
                "{frame_url}?partner={}&widget={}",
                attributes.partner_id, attributes.widget_ref
            ));
            node.child_count += 1;
            self.mutations.push(DomMutation::InjectFrame { key: node.key });
        }
    }

    fn push_task(&mut self, at_ms: u64, task: SimTask) {
        self.tasks.insert((at_ms, self.next_seq), task);
        self.next_seq += 1;
    }

    fn allocate(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn listens(&self, owner: OrchestratorId, kind: PageEventKind) -> bool {
        self.page_listeners
            .values()
            .any(|(o, k)| *o == owner && *k == kind)
    }

    // -----------------------------------------------------------------------
    // Instrumentation
    // -----------------------------------------------------------------------

    pub fn now(&self) -> u64 {
        self.now_ms
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn script_tag_count(&self, url: &str) -> usize {
        self.scripts.iter().filter(|t| t.url == url).count()
    }

    /// Script tags inserted over the page's lifetime.
    pub fn scripts_inserted(&self) -> u64 {
        self.scripts_inserted
    }

    pub fn active_timer_count(&self) -> usize {
        self.timers.len()
    }

    pub fn active_timers_for(&self, owner: OrchestratorId) -> usize {
        self.timers
            .values()
            .filter(|t| t.token.owner == owner)
            .count()
    }

    /// Due time of the earliest live timer.
    pub fn next_timer_due(&self) -> Option<u64> {
        self.tasks.iter().find_map(|(&(due, _), task)| match task {
            SimTask::Timer(timer) if self.timers.contains_key(timer) => Some(due),
            _ => None,
        })
    }

    /// Page-level (`visibilitychange`/`focus`) listeners for `owner`.
    pub fn listener_count(&self, owner: OrchestratorId) -> usize {
        self.page_listeners
            .values()
            .filter(|(o, _)| *o == owner)
            .count()
    }

    pub fn script_listener_count(&self) -> usize {
        self.script_listeners.len()
    }

    /// Mount nodes for `owner` bearing identification attributes.
    pub fn live_mount_count(&self, owner: OrchestratorId) -> usize {
        self.nodes
            .iter()
            .filter(|n| n.key.owner == owner && n.attributes.is_some())
            .count()
    }

    pub fn mount_content(&self, key: MountKey) -> Option<MountContent> {
        self.inspect_mount(key)
    }

    pub fn runtime_probe(&self) -> RuntimeProbe {
        self.probe_runtime()
    }

    pub fn init_calls(&self) -> u64 {
        self.init_calls
    }

    pub fn frame_refreshes(&self) -> u64 {
        self.frame_refreshes
    }

    pub fn dispatched_events(&self) -> &[String] {
        &self.dispatched
    }

    pub fn mutations(&self) -> &[DomMutation] {
        &self.mutations
    }

    pub fn dom_mutation_count(&self) -> usize {
        self.mutations.len()
    }
}

fn find<'a>(
    orchestrators: &'a mut [&mut LifecycleOrchestrator],
    owner: OrchestratorId,
) -> Option<&'a mut LifecycleOrchestrator> {
    orchestrators
        .iter_mut()
        .find(|o| o.id() == owner)
        .map(|o| &mut **o)
}

// ---------------------------------------------------------------------------
// Host trait implementations
// ---------------------------------------------------------------------------

impl Scheduler for SimulatedPage {
    fn now_ms(&self) -> u64 {
        self.now_ms
    }

    fn set_interval(&mut self, period_ms: u64, token: CallbackToken) -> TimerId {
        let period = period_ms.max(1);
        let timer = TimerId(self.allocate());
        self.timers.insert(
            timer,
            TimerEntry {
                token,
                period_ms: Some(period),
            },
        );
        self.push_task(self.now_ms + period, SimTask::Timer(timer));
        timer
    }

    fn set_timeout(&mut self, delay_ms: u64, token: CallbackToken) -> TimerId {
        let timer = TimerId(self.allocate());
        self.timers.insert(
            timer,
            TimerEntry {
                token,
                period_ms: None,
            },
        );
        self.push_task(self.now_ms + delay_ms, SimTask::Timer(timer));
        timer
    }

    fn clear_timer(&mut self, timer: TimerId) {
        self.timers.remove(&timer);
    }
}

impl ScriptDocument for SimulatedPage {
    fn find_script(&self, url: &str) -> Option<(ScriptHandle, ScriptStatus)> {
        self.scripts
            .iter()
            .find(|t| t.url == url)
            .map(|t| (t.handle, t.status))
    }

    fn insert_script(&mut self, url: &str) -> ScriptHandle {
        let handle = ScriptHandle(self.allocate());
        self.scripts.push(ScriptTag {
            handle,
            url: url.to_string(),
            status: ScriptStatus::Loading,
        });
        self.scripts_inserted += 1;
        self.mutations.push(DomMutation::InsertScript { handle });
        match self.provider.script {
            ScriptBehavior::LoadAfter { delay_ms } => self.push_task(
                self.now_ms + delay_ms,
                SimTask::ScriptSettle {
                    handle,
                    loaded: true,
                },
            ),
            ScriptBehavior::FailAfter { delay_ms } => self.push_task(
                self.now_ms + delay_ms,
                SimTask::ScriptSettle {
                    handle,
                    loaded: false,
                },
            ),
            ScriptBehavior::Never => {}
        }
        handle
    }

    fn remove_script(&mut self, handle: ScriptHandle) {
        let before = self.scripts.len();
        self.scripts.retain(|t| t.handle != handle);
        if self.scripts.len() != before {
            self.script_listeners.retain(|_, (h, _)| *h != handle);
            self.mutations.push(DomMutation::RemoveScript { handle });
        }
    }

    fn listen_script(&mut self, handle: ScriptHandle, token: CallbackToken) -> ListenerId {
        let listener = ListenerId(self.allocate());
        self.script_listeners.insert(listener, (handle, token));
        listener
    }

    fn unlisten_script(&mut self, listener: ListenerId) {
        self.script_listeners.remove(&listener);
    }

    fn probe_runtime(&self) -> RuntimeProbe {
        match self.runtime {
            None => RuntimeProbe::Absent,
            Some(false) => RuntimeProbe::NoInit,
            Some(true) => RuntimeProbe::Ready,
        }
    }

    fn invoke_init(&mut self) -> bool {
        if self.runtime != Some(true) {
            return false;
        }
        self.init_calls += 1;
        self.push_task(
            self.now_ms + self.provider.inject_after_init_ms,
            SimTask::ProviderInject,
        );
        true
    }

    fn dispatch_ready_event(&mut self, name: &str) {
        self.dispatched.push(name.to_string());
    }
}

impl RenderSlot for SimulatedPage {
    fn request_render(&mut self, key: MountKey) {
        self.pending_renders.insert(key.owner, key);
        self.push_task(self.now_ms + self.render_delay_ms, SimTask::Render(key));
    }

    fn inspect_mount(&self, key: MountKey) -> Option<MountContent> {
        self.nodes
            .iter()
            .find(|n| n.key == key)
            .map(|n| MountContent {
                child_count: n.child_count,
                frame_src: n.frame_src.clone(),
            })
    }

    fn apply_attributes(&mut self, key: MountKey, attributes: &MountAttributes) -> bool {
        let Some(node) = self.nodes.iter_mut().find(|n| n.key == key) else {
            return false;
        };
        node.attributes = Some(attributes.clone());
        self.mutations.push(DomMutation::ApplyAttributes { key });
        true
    }

    fn strip_mount(&mut self, key: MountKey) {
        let Some(node) = self.nodes.iter_mut().find(|n| n.key == key) else {
            return;
        };
        node.attributes = None;
        node.child_count = 0;
        node.frame_src = None;
        self.mutations.push(DomMutation::StripMount { key });
    }

    fn refresh_frame(&mut self, key: MountKey) -> bool {
        let has_frame = self
            .nodes
            .iter()
            .any(|n| n.key == key && n.frame_src.is_some());
        if has_frame {
            self.frame_refreshes += 1;
            self.mutations.push(DomMutation::RefreshFrame { key });
        }
        has_frame
    }
}

impl PageEvents for SimulatedPage {
    fn add_page_listener(&mut self, owner: OrchestratorId, kind: PageEventKind) -> ListenerId {
        let listener = ListenerId(self.allocate());
        self.page_listeners.insert(listener, (owner, kind));
        listener
    }

    fn remove_page_listener(&mut self, listener: ListenerId) {
        self.page_listeners.remove(&listener);
    }
}
