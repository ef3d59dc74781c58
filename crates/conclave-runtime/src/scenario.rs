//! Meeting scenarios: round topics, role emphasis and guidance.
//!
//! A [`Scenario`] is immutable configuration resolved once when a session is
//! created. [`ScenarioCatalog`] holds the built-in set and can be extended
//! from a directory of JSON definitions.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use conclave_core::Role;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::{MeetingError, Result};
use crate::scheduler::DEFAULT_WEIGHT;

/// Id of the scenario used when nothing else matches.
pub const DEFAULT_SCENARIO_ID: &str = "business_meeting";

/// Chair key tried when a scenario names no default chair.
pub const FALLBACK_CHAIR_KEY: &str = "business_manager";

/// One meeting flavor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    /// Catalog key.
    pub id: String,
    /// Display name.
    pub name: String,
    /// One-line description.
    #[serde(default)]
    pub description: String,
    /// Extra system prompt shared by every role.
    #[serde(default)]
    pub system_prompt: String,
    /// Round number → topic template containing `{topic}`.
    #[serde(default)]
    pub round_topics: BTreeMap<u32, String>,
    /// Normalized role key → emphasis weight.
    #[serde(default)]
    pub role_emphasis: BTreeMap<String, f64>,
    /// How the discussion should be conducted.
    #[serde(default)]
    pub guidance: String,
    /// Role key preferred as chair when the request names none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_chair: Option<String>,
}

/// Listing entry for clients.
#[derive(Clone, Debug, Serialize)]
pub struct ScenarioSummary {
    /// Catalog key.
    pub id: String,
    /// Display name.
    pub name: String,
    /// One-line description.
    pub description: String,
}

impl Scenario {
    /// Topic for `round`, with `{topic}` filled in.
    pub fn round_topic(&self, round: u32, topic: &str) -> String {
        self.round_topics.get(&round).map_or_else(
            || format!("Further discussion of {topic}"),
            |template| template.replace("{topic}", topic),
        )
    }

    /// Emphasis weight for `role`, matched on id, then name, then title.
    pub fn weight_for(&self, role: &Role) -> f64 {
        [&role.id, &role.name, &role.title]
            .into_iter()
            .find_map(|key| self.role_emphasis.get(&role_key(key)))
            .copied()
            .unwrap_or(DEFAULT_WEIGHT)
    }

    /// Chair key for this scenario.
    pub fn chair_key(&self) -> &str {
        self.default_chair.as_deref().unwrap_or(FALLBACK_CHAIR_KEY)
    }

    fn summary(&self) -> ScenarioSummary {
        ScenarioSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
        }
    }
}

/// Normalize a role id, name or title for lookups: lowercase, runs of
/// non-alphanumerics collapsed to `_`.
///
/// `"R&D Director"` → `"r_d_director"`, `"General manager"` → `"general_manager"`.
pub fn role_key(raw: &str) -> String {
    let mut key = String::with_capacity(raw.len());
    for ch in raw.trim().chars() {
        if ch.is_alphanumeric() {
            key.extend(ch.to_lowercase());
        } else if !key.is_empty() && !key.ends_with('_') {
            key.push('_');
        }
    }
    while key.ends_with('_') {
        let _ = key.pop();
    }
    key
}

/// Whether `role` answers to `key` by id, name or title.
pub fn role_matches(role: &Role, key: &str) -> bool {
    let key = role_key(key);
    !key.is_empty() && [&role.id, &role.name, &role.title].into_iter().any(|k| role_key(k) == key)
}

// ─────────────────────────────────────────────────────────────────────────────
// Catalog
// ─────────────────────────────────────────────────────────────────────────────

/// Set of known scenarios with a guaranteed default.
#[derive(Clone, Debug)]
pub struct ScenarioCatalog {
    scenarios: BTreeMap<String, Arc<Scenario>>,
    default_id: String,
}

impl ScenarioCatalog {
    /// Catalog holding the built-in scenarios.
    pub fn builtin() -> Self {
        let scenarios = builtin_scenarios()
            .into_iter()
            .map(|s| (s.id.clone(), Arc::new(s)))
            .collect();
        Self {
            scenarios,
            default_id: DEFAULT_SCENARIO_ID.to_string(),
        }
    }

    /// Use `id` as the default when it is present in the catalog.
    #[must_use]
    pub fn with_default(mut self, id: &str) -> Self {
        if self.scenarios.contains_key(id) {
            self.default_id = id.to_string();
        } else {
            warn!(scenario = id, default = %self.default_id, "unknown default scenario, keeping current");
        }
        self
    }

    /// Add or replace a scenario.
    pub fn insert(&mut self, scenario: Scenario) {
        let _ = self
            .scenarios
            .insert(scenario.id.clone(), Arc::new(scenario));
    }

    /// Look up a scenario by id.
    pub fn get(&self, id: &str) -> Option<Arc<Scenario>> {
        self.scenarios.get(id).cloned()
    }

    /// Resolve a requested id, falling back to the default.
    pub fn resolve(&self, requested: Option<&str>) -> Arc<Scenario> {
        if let Some(id) = requested.filter(|id| !id.is_empty()) {
            if let Some(scenario) = self.get(id) {
                return scenario;
            }
            warn!(scenario = id, default = %self.default_id, "unknown scenario, using default");
        }
        self.get(&self.default_id)
            .unwrap_or_else(|| Arc::new(business_meeting()))
    }

    /// Id of the default scenario.
    pub fn default_id(&self) -> &str {
        &self.default_id
    }

    /// Summaries of every scenario, ordered by id.
    pub fn list(&self) -> Vec<ScenarioSummary> {
        self.scenarios.values().map(|s| s.summary()).collect()
    }

    /// Load every `*.json` file in `dir` as a scenario.
    ///
    /// Returns how many were loaded. A file that fails to parse aborts the load.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize> {
        let entries = std::fs::read_dir(dir)
            .map_err(|e| MeetingError::Config(format!("{}: {e}", dir.display())))?;

        let mut paths: Vec<_> = entries
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        for path in &paths {
            let content = std::fs::read_to_string(path)
                .map_err(|e| MeetingError::Config(format!("{}: {e}", path.display())))?;
            let scenario: Scenario = serde_json::from_str(&content)
                .map_err(|e| MeetingError::Config(format!("{}: {e}", path.display())))?;
            debug!(scenario = %scenario.id, path = %path.display(), "loaded scenario");
            self.insert(scenario);
        }
        Ok(paths.len())
    }
}

impl Default for ScenarioCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Built-ins
// ─────────────────────────────────────────────────────────────────────────────

fn topics(entries: &[(u32, &str)]) -> BTreeMap<u32, String> {
    entries.iter().map(|(n, t)| (*n, (*t).to_string())).collect()
}

fn weights(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
    entries.iter().map(|(k, w)| ((*k).to_string(), *w)).collect()
}

fn business_meeting() -> Scenario {
    Scenario {
        id: DEFAULT_SCENARIO_ID.into(),
        name: "Business Meeting".into(),
        description: "A general cross-functional meeting working through a business topic".into(),
        system_prompt: "This is a business meeting. Stay practical, refer to what colleagues \
            said, and keep each contribution focused."
            .into(),
        round_topics: topics(&[
            (1, "Opportunities and advantages of {topic}"),
            (2, "Challenges and risks of {topic}"),
            (3, "Market potential and customer demand for {topic}"),
            (4, "Resources and budget needed for {topic}"),
            (5, "Timeline and milestones for {topic}"),
            (6, "Action plan and ownership for {topic}"),
        ]),
        role_emphasis: BTreeMap::new(),
        guidance: "Build on earlier points, disagree constructively, and move toward concrete \
            next steps."
            .into(),
        default_chair: None,
    }
}

fn board_meeting() -> Scenario {
    Scenario {
        id: "board_meeting".into(),
        name: "Board Meeting".into(),
        description: "A formal board session focused on strategy, governance and oversight".into(),
        system_prompt: "This is a formal board meeting. Use precise business language, think \
            strategically, and weigh governance, risk and long-term shareholder value."
            .into(),
        round_topics: topics(&[
            (1, "Agenda: confirm the issues around {topic} and set priorities"),
            (2, "Deep dive: financial analysis and risk assessment of {topic}"),
            (3, "Decision: form a clear resolution on {topic}"),
            (4, "Accountability: owners and timeline for {topic}"),
        ]),
        role_emphasis: weights(&[
            ("general_manager", 1.4),
            ("financial_manager", 1.3),
            ("hr", 1.1),
            ("business_manager", 1.1),
            ("marketing_manager", 0.9),
            ("r_d_director", 0.9),
        ]),
        guidance: "Ground every statement in data and long-term consequences; keep a high \
            standard of accountability."
            .into(),
        default_chair: Some("general_manager".into()),
    }
}

fn debate() -> Scenario {
    Scenario {
        id: "debate".into(),
        name: "Debate".into(),
        description: "Opposing viewpoints clash to explore every angle of the motion".into(),
        system_prompt: "This is a debate. State your position clearly, back it with arguments, \
            and answer other speakers directly while staying respectful."
            .into(),
        round_topics: topics(&[
            (1, "Positions: each side states its stance on {topic}"),
            (2, "Arguments: supporting evidence for each position on {topic}"),
            (3, "Rebuttal: respond to and challenge the other arguments on {topic}"),
            (4, "Closing: summarize and look for common ground on {topic}"),
        ]),
        role_emphasis: weights(&[
            ("r_d_director", 1.5),
            ("financial_manager", 1.5),
            ("marketing_manager", 1.1),
            ("business_manager", 1.1),
            ("general_manager", 1.0),
            ("hr", 0.8),
        ]),
        guidance: "Listen for logical gaps in opposing arguments and answer them with reasons, \
            never with personal attacks."
            .into(),
        default_chair: Some("general_manager".into()),
    }
}

fn brainstorming() -> Scenario {
    Scenario {
        id: "brainstorming".into(),
        name: "Brainstorming".into(),
        description: "Open-ended idea generation without early judgement".into(),
        system_prompt: "This is a brainstorming session. Be imaginative, build on other ideas, \
            and do not criticize ideas too early."
            .into(),
        round_topics: topics(&[
            (1, "Free ideation: as many ideas about {topic} as possible"),
            (2, "Expansion: extend and build on the ideas so far about {topic}"),
            (3, "Combination: merge ideas into fuller proposals for {topic}"),
            (4, "Evaluation: shortlist the most promising directions for {topic}"),
        ]),
        role_emphasis: weights(&[
            ("marketing_manager", 1.3),
            ("r_d_director", 1.3),
            ("hr", 1.2),
            ("general_manager", 1.0),
            ("business_manager", 1.0),
            ("financial_manager", 0.8),
        ]),
        guidance: "Favor quantity and variety; combine and extend ideas instead of dismissing them."
            .into(),
        default_chair: None,
    }
}

fn creative_relay() -> Scenario {
    Scenario {
        id: "creative_relay".into(),
        name: "Creative Relay".into(),
        description: "Each speaker continues the previous idea, growing one creative thread".into(),
        system_prompt: "This is a creative relay. Pick up exactly where the previous speaker \
            left off and add a new element or angle."
            .into(),
        round_topics: topics(&[
            (1, "Starting point: an opening idea or story about {topic}"),
            (2, "Development: continue and extend the thread on {topic}"),
            (3, "Twist: introduce a new element that enriches {topic}"),
            (4, "Resolution: pull every element of {topic} into one whole"),
        ]),
        role_emphasis: weights(&[
            ("marketing_manager", 1.5),
            ("r_d_director", 1.2),
            ("hr", 1.2),
            ("general_manager", 1.0),
            ("business_manager", 1.0),
            ("financial_manager", 0.7),
        ]),
        guidance: "Every contribution must connect clearly to the one before it.".into(),
        default_chair: None,
    }
}

fn builtin_scenarios() -> Vec<Scenario> {
    vec![
        business_meeting(),
        board_meeting(),
        debate(),
        brainstorming(),
        creative_relay(),
    ]
}
