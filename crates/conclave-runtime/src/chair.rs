//! Chair selection and first-speaker extraction from the chair's opening.

use conclave_core::Role;

use crate::roster::Roster;
use crate::scenario::{Scenario, role_matches};

/// Pick the chair.
///
/// Order of preference: the designated role if active, the scenario's chair
/// role if active, the first active participant, the moderator.
pub fn select_chair<'r>(roster: &'r Roster, scenario: &Scenario, designated: Option<&str>) -> &'r Role {
    let active_match = |key: &str| {
        roster
            .roles()
            .iter()
            .find(|r| r.active && (r.id == key || role_matches(r, key)))
    };

    designated
        .and_then(active_match)
        .or_else(|| active_match(scenario.chair_key()))
        .or_else(|| roster.active_participants().next())
        .unwrap_or_else(|| roster.moderator())
}

/// Find a candidate the chair explicitly named in `opening`.
///
/// Every candidate's name and title is matched case-insensitively as a
/// substring; longer needles are tried first so "Vice President" wins over
/// "President". Returns the matched role id.
pub fn find_named_speaker(opening: &str, candidates: &[&Role]) -> Option<String> {
    let haystack = opening.to_lowercase();

    let mut needles: Vec<(String, &str)> = candidates
        .iter()
        .flat_map(|role| {
            [role.name.as_str(), role.title.as_str()]
                .into_iter()
                .map(str::trim)
                .filter(|needle| !needle.is_empty())
                .map(move |needle| (needle.to_lowercase(), role.id.as_str()))
        })
        .collect();
    // stable sort: equal lengths keep roster order
    needles.sort_by(|a, b| b.0.chars().count().cmp(&a.0.chars().count()));

    needles
        .into_iter()
        .find(|(needle, _)| haystack.contains(needle.as_str()))
        .map(|(_, id)| id.to_string())
}

/// Move `first` to the front of `order` when present.
pub fn lead_with(mut order: Vec<String>, first: Option<&str>) -> Vec<String> {
    if let Some(first) = first
        && let Some(pos) = order.iter().position(|id| id == first)
    {
        let id = order.remove(pos);
        order.insert(0, id);
    }
    order
}
