//! Speaking order for a discussion round.
//!
//! Two strategies:
//!
//! - **Weighted**, when any candidate's emphasis weight differs from 1.0:
//!   `weight × recency_penalty × jitter`, sorted descending, ties keep
//!   roster order.
//! - **Anti-repetition**, otherwise: recent speakers move to the back (most
//!   recent last), everyone else keeps roster order. No randomness.

use std::ops::RangeInclusive;

use conclave_core::Utterance;
use rand::Rng;

/// Weight a role gets when its scenario says nothing about it.
pub const DEFAULT_WEIGHT: f64 = 1.0;

/// How many distinct recent speakers feed the penalty.
pub const RECENT_SPEAKER_LIMIT: usize = 3;

/// Plan for one discussion round, computed when the round starts.
#[derive(Clone, Debug, PartialEq)]
pub struct RoundPlan {
    /// Round number, starting at 1.
    pub round: u32,
    /// Topic of this round.
    pub topic: String,
    /// Role opening the round.
    pub chair_id: String,
    /// Speaking order after the chair.
    pub speakers: Vec<String>,
}

/// A role eligible to speak this round.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate<'a> {
    /// Role id.
    pub id: &'a str,
    /// Scenario emphasis weight.
    pub weight: f64,
}

impl<'a> Candidate<'a> {
    /// Candidate with the default weight.
    pub fn new(id: &'a str) -> Self {
        Self {
            id,
            weight: DEFAULT_WEIGHT,
        }
    }

    /// Candidate with an explicit weight.
    pub fn weighted(id: &'a str, weight: f64) -> Self {
        Self { id, weight }
    }
}

/// Produces the per-round speaking order.
#[derive(Clone, Debug)]
pub struct TurnScheduler {
    jitter: RangeInclusive<f64>,
}

impl TurnScheduler {
    /// Scheduler with the standard ±10% jitter.
    pub fn new() -> Self {
        Self { jitter: 0.9..=1.1 }
    }

    /// Order `candidates` given the `recent` speakers (most recent first).
    pub fn order(&self, candidates: &[Candidate<'_>], recent: &[String]) -> Vec<String> {
        self.order_with_rng(candidates, recent, &mut rand::rng())
    }

    /// Same as [`order`](Self::order) with a caller-supplied RNG.
    pub fn order_with_rng<R: Rng>(
        &self,
        candidates: &[Candidate<'_>],
        recent: &[String],
        rng: &mut R,
    ) -> Vec<String> {
        let recent = &recent[..recent.len().min(RECENT_SPEAKER_LIMIT)];
        let weighted = candidates
            .iter()
            .any(|c| (c.weight - DEFAULT_WEIGHT).abs() > f64::EPSILON);

        if weighted {
            let mut scored: Vec<(&str, f64)> = candidates
                .iter()
                .map(|c| {
                    let position = recent.iter().position(|r| r == c.id);
                    let jitter = rng.random_range(self.jitter.clone());
                    (c.id, c.weight * recency_penalty(position) * jitter)
                })
                .collect();
            // sort_by is stable, so equal scores keep roster order
            scored.sort_by(|a, b| b.1.total_cmp(&a.1));
            scored.into_iter().map(|(id, _)| id.to_string()).collect()
        } else {
            anti_repetition(candidates, recent)
        }
    }
}

impl Default for TurnScheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Penalty for a role at `position` in the recent-speaker list.
///
/// Most recent (0) → 0.5, then 0.6, 0.7; absent → 1.0.
pub fn recency_penalty(position: Option<usize>) -> f64 {
    match position {
        Some(p) if p < RECENT_SPEAKER_LIMIT => 1.0 - (0.5 - 0.1 * p as f64),
        _ => 1.0,
    }
}

fn anti_repetition(candidates: &[Candidate<'_>], recent: &[String]) -> Vec<String> {
    let mut order: Vec<String> = candidates
        .iter()
        .filter(|c| !recent.iter().any(|r| r == c.id))
        .map(|c| c.id.to_string())
        .collect();
    // oldest recent speaker first, the most recent one last
    for id in recent.iter().rev() {
        if candidates.iter().any(|c| c.id == id) && !order.contains(id) {
            order.push(id.clone());
        }
    }
    order
}

/// Distinct speakers walking back from the end of `transcript`, most recent
/// first, skipping `excluded` ids, at most `limit` of them.
pub fn recent_speakers(transcript: &[Utterance], excluded: &[&str], limit: usize) -> Vec<String> {
    let mut found: Vec<String> = Vec::with_capacity(limit);
    for utterance in transcript.iter().rev() {
        if found.len() == limit {
            break;
        }
        let id = utterance.speaker_id.as_str();
        if excluded.contains(&id) || found.iter().any(|f| f == id) {
            continue;
        }
        found.push(id.to_string());
    }
    found
}
