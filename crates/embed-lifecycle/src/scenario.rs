//! Scripted scenarios on the simulated page.
//!
//! A [`Scenario`] describes a page (provider behavior, widget count, timed
//! user and host actions) and a horizon. [`run_scenario`] mounts every widget
//! at t=0, drives the page to the horizon and reports per-widget snapshots,
//! the merged event stream, page instrumentation, and a SHA-256 digest of the
//! events so two runs can be compared for determinism.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::EmbedConfig;
use crate::error::ConfigError;
use crate::generation::OrchestratorId;
use crate::orchestrator::{LifecycleOrchestrator, OrchestratorSnapshot};
use crate::page_sim::{ProviderBehavior, SimAction, SimulatedPage};
use crate::telemetry::EmbedEvent;

fn default_widgets() -> u32 {
    1
}

fn default_route() -> String {
    "/".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedAction {
    pub at_ms: u64,
    #[serde(flatten)]
    pub action: SimAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub config: EmbedConfig,
    #[serde(default)]
    pub provider: ProviderBehavior,
    #[serde(default = "default_widgets")]
    pub widgets: u32,
    #[serde(default = "default_route")]
    pub route: String,
    #[serde(default)]
    pub runtime_installed_at_ms: Option<u64>,
    #[serde(default)]
    pub render_delay_ms: u64,
    #[serde(default)]
    pub actions: Vec<TimedAction>,
    pub horizon_ms: u64,
}

impl Scenario {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|err| ConfigError::Parse(err.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageStats {
    pub now_ms: u64,
    pub script_tags: usize,
    pub scripts_inserted: u64,
    pub active_timers: usize,
    pub script_listeners: usize,
    pub page_listeners: usize,
    pub init_calls: u64,
    pub frame_refreshes: u64,
    pub dom_mutations: usize,
    pub dispatched_events: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub widgets: Vec<OrchestratorSnapshot>,
    pub page: PageStats,
    pub event_digest: String,
    pub events: Vec<EmbedEvent>,
}

pub fn run_scenario(scenario: &Scenario) -> Result<ScenarioReport, ConfigError> {
    let mut page =
        SimulatedPage::new(scenario.provider.clone()).with_render_delay(scenario.render_delay_ms);
    let mut orchestrators = (0..scenario.widgets)
        .map(|n| LifecycleOrchestrator::new(OrchestratorId(n), scenario.config.clone()))
        .collect::<Result<Vec<_>, _>>()?;

    if let Some(at_ms) = scenario.runtime_installed_at_ms {
        page.schedule_runtime_install(at_ms);
    }
    for timed in &scenario.actions {
        page.schedule(timed.at_ms, timed.action.clone());
    }
    for orch in &mut orchestrators {
        orch.mount(&mut page, &scenario.route);
    }

    let mut handles: Vec<&mut LifecycleOrchestrator> = orchestrators.iter_mut().collect();
    page.run_until(scenario.horizon_ms, &mut handles);

    let mut events: Vec<EmbedEvent> = orchestrators
        .iter_mut()
        .flat_map(LifecycleOrchestrator::drain_events)
        .collect();
    events.sort_by_key(|e| (e.timestamp_ms, e.orchestrator_id, e.sequence));

    let page_listeners: usize = orchestrators
        .iter()
        .map(|o| page.listener_count(o.id()))
        .sum();
    let url = &scenario.config.script_url;
    Ok(ScenarioReport {
        widgets: orchestrators.iter().map(LifecycleOrchestrator::snapshot).collect(),
        page: PageStats {
            now_ms: page.now(),
            script_tags: page.script_tag_count(url),
            scripts_inserted: page.scripts_inserted(),
            active_timers: page.active_timer_count(),
            script_listeners: page.script_listener_count(),
            page_listeners,
            init_calls: page.init_calls(),
            frame_refreshes: page.frame_refreshes(),
            dom_mutations: page.dom_mutation_count(),
            dispatched_events: page.dispatched_events().to_vec(),
        },
        event_digest: event_digest(&events),
        events,
    })
}

/// `sha256:`-prefixed digest over one canonical line per event.
pub fn event_digest(events: &[EmbedEvent]) -> String {
    let mut hasher = Sha256::new();
    for e in events {
        let line = format!(
            "{}|{}|{}|{}|{}|{}|{}\n",
            e.timestamp_ms,
            e.orchestrator_id,
            e.generation.map_or(0, |g| g.0),
            e.event,
            e.outcome,
            e.error_code.as_deref().unwrap_or("-"),
            e.to_state.map_or("-", |s| s.as_str()),
        );
        hasher.update(line.as_bytes());
    }
    let digest = hasher.finalize();
    let mut out = String::with_capacity(7 + digest.len() * 2);
    out.push_str("sha256:");
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

pub fn render_scenario_summary(report: &ScenarioReport) -> String {
    let mut lines = Vec::new();
    lines.push(format!("now_ms: {}", report.page.now_ms));
    lines.push(format!("widgets: {}", report.widgets.len()));
    for w in &report.widgets {
        let state = w.state.map_or("none", |s| s.as_str());
        lines.push(format!(
            "  - {} generation={} state={} fallback={} issued={}",
            w.orchestrator_id,
            w.generation.map_or(0, |g| g.0),
            state,
            w.show_fallback,
            w.generations_issued
        ));
    }
    lines.push(format!("script_tags: {}", report.page.script_tags));
    lines.push(format!("active_timers: {}", report.page.active_timers));
    lines.push(format!("page_listeners: {}", report.page.page_listeners));
    lines.push(format!("init_calls: {}", report.page.init_calls));
    lines.push(format!("frame_refreshes: {}", report.page.frame_refreshes));
    lines.push(format!("events: {}", report.events.len()));
    lines.push(format!("event_digest: {}", report.event_digest));
    lines.join("\n")
}
