//! Prompt construction and the fixed lines spoken without generation.

use conclave_core::{Role, Utterance};
use conclave_llm::GenerationError;

use crate::request::MeetingConfig;
use crate::scheduler::RoundPlan;

/// Marker opening every fallback line.
pub const FALLBACK_PREFIX: &str = "[generation error]";

const FALLBACK_REASON_CHARS: usize = 120;

/// A system/user prompt pair.
#[derive(Clone, Debug, PartialEq)]
pub struct Prompt {
    /// Identity and ground rules.
    pub system: String,
    /// The concrete request.
    pub user: String,
}

/// System prompt for `role`.
pub fn system_for(config: &MeetingConfig, role: &Role) -> String {
    let mut out = format!("You are {}", role.name);
    if !role.title.is_empty() {
        out.push_str(&format!(", {}", role.title));
    }
    out.push_str(", taking part in a meeting.");
    for extra in [&role.persona, &role.personality, &role.expertise]
        .into_iter()
        .flatten()
    {
        out.push(' ');
        out.push_str(extra.trim());
    }
    if !config.scenario.system_prompt.is_empty() {
        out.push(' ');
        out.push_str(&config.scenario.system_prompt);
    }
    out.push_str(&format!(
        " Always answer in {} and speak in the first person, without stage directions.",
        config.language
    ));
    out
}

fn notes_line(config: &MeetingConfig) -> String {
    config
        .notes
        .as_ref()
        .map(|n| format!("\nAdditional notes from the organizer: {n}"))
        .unwrap_or_default()
}

/// Render utterances as `"Name (Title): text"` lines.
pub fn render_context(context: &[Utterance]) -> String {
    context
        .iter()
        .map(Utterance::context_line)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Moderator's opening of the meeting.
pub fn welcome(config: &MeetingConfig) -> Prompt {
    let moderator = config.roster.moderator();
    let attendees = config
        .roster
        .active_participants()
        .map(Role::label)
        .collect::<Vec<_>>()
        .join(", ");
    Prompt {
        system: system_for(config, moderator),
        user: format!(
            "Open the meeting on \"{topic}\". Welcome the attendees ({attendees}), state \
             that there will be {rounds} discussion round(s), and invite everyone to introduce \
             themselves. Keep it under 80 words.{notes}",
            topic = config.topic,
            rounds = config.total_rounds,
            notes = notes_line(config),
        ),
    }
}

/// A participant's self-introduction.
pub fn introduction(config: &MeetingConfig, role: &Role) -> Prompt {
    Prompt {
        system: system_for(config, role),
        user: format!(
            "Briefly introduce yourself as {label}: your role and responsibilities. Then give \
             your first impression of the topic \"{topic}\". No more than 100 words.{notes}",
            label = role.label(),
            topic = config.topic,
            notes = notes_line(config),
        ),
    }
}

/// Chair's opening of a discussion round.
pub fn chair_opening(config: &MeetingConfig, chair: &Role, plan: &RoundPlan) -> Prompt {
    let speakers = plan
        .speakers
        .iter()
        .filter_map(|id| config.roster.get(id))
        .map(Role::label)
        .collect::<Vec<_>>()
        .join(", ");
    let guidance = if config.scenario.guidance.is_empty() {
        String::new()
    } else {
        format!("\nGuidance: {}", config.scenario.guidance)
    };
    Prompt {
        system: system_for(config, chair),
        user: format!(
            "You chair round {round} of {total} of the meeting on \"{topic}\". This round \
             covers: {round_topic}. Participants: {speakers}. Open the round and invite one \
             participant by name to speak first. No more than 100 words.{guidance}{notes}",
            round = plan.round,
            total = config.total_rounds,
            topic = config.topic,
            round_topic = plan.topic,
            notes = notes_line(config),
        ),
    }
}

/// A participant's contribution to a round.
pub fn discussion_turn(
    config: &MeetingConfig,
    role: &Role,
    plan: &RoundPlan,
    context: &[Utterance],
) -> Prompt {
    Prompt {
        system: system_for(config, role),
        user: format!(
            "The meeting topic is \"{topic}\"; the current focus is: {round_topic}.\n\n\
             Recent discussion:\n{context}\n\nFrom your role's perspective, give your view and \
             respond to points raised by others. No more than 150 words.{notes}",
            topic = config.topic,
            round_topic = plan.topic,
            context = render_context(context),
            notes = notes_line(config),
        ),
    }
}

/// Moderator's summary of the whole meeting.
pub fn summary(config: &MeetingConfig, context: &[Utterance]) -> Prompt {
    Prompt {
        system: system_for(config, config.roster.moderator()),
        user: format!(
            "You are the meeting secretary. The meeting on \"{topic}\" ran {rounds} round(s). \
             Excerpts:\n{context}\n\nSummarize the key points and list five numbered conclusions \
             or action items. No more than 300 words.{notes}",
            topic = config.topic,
            rounds = config.total_rounds,
            context = render_context(context),
            notes = notes_line(config),
        ),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Fixed lines
// ─────────────────────────────────────────────────────────────────────────────

/// Moderator hands the floor to the round-1 chair after introductions.
pub fn intro_handoff(config: &MeetingConfig, chair: &Role) -> String {
    if config.roster.is_moderator(&chair.id) {
        format!(
            "Thank you all for the introductions. I will chair the discussion myself, starting \
             with round 1 of {}.",
            config.total_rounds
        )
    } else {
        format!(
            "Thank you all for the introductions. {} will chair the discussion; over to you for \
             round 1 of {}.",
            chair.label(),
            config.total_rounds
        )
    }
}

/// Chair passes the floor to the moderator for the summary.
pub fn conclusion_handoff(moderator: &Role) -> String {
    format!(
        "That concludes our discussion rounds. {}, could you please summarize what we agreed?",
        moderator.name
    )
}

/// Moderator announces its own summary when it chaired.
pub fn self_announcement() -> String {
    "That concludes our discussion rounds. I will now summarize the key points.".to_string()
}

/// Moderator's closing line.
pub fn closing(config: &MeetingConfig) -> String {
    format!(
        "This concludes our meeting on \"{}\". Thank you all for your contributions.",
        config.topic
    )
}

/// Role-attributed line standing in for a failed generation.
pub fn fallback_text(role: &Role, error: &GenerationError) -> String {
    let reason: String = error.to_string().chars().take(FALLBACK_REASON_CHARS).collect();
    format!(
        "{FALLBACK_PREFIX} {} could not respond this turn: {reason}",
        role.label()
    )
}

/// Whether `text` is a fallback line.
pub fn is_fallback(text: &str) -> bool {
    text.starts_with(FALLBACK_PREFIX)
}

#[cfg(test)]
mod tests {
    use conclave_settings::MeetingSettings;

    use super::*;
    use crate::request::CreateMeetingRequest;
    use crate::scenario::ScenarioCatalog;

    fn config(notes: Option<&str>) -> MeetingConfig {
        CreateMeetingRequest {
            topic: "Q3 budget".into(),
            participants: vec![
                Role::new("cfo", "Dana", "Finance Manager").with_persona("Guard every cent."),
                Role::new("cto", "Sam", "R&D Director"),
            ],
            notes: notes.map(String::from),
            ..Default::default()
        }
        .resolve(&MeetingSettings::default(), &ScenarioCatalog::builtin())
        .unwrap()
    }

    fn plan() -> RoundPlan {
        RoundPlan {
            round: 1,
            topic: "Opportunities and advantages of Q3 budget".into(),
            chair_id: "moderator".into(),
            speakers: vec!["cto".into(), "cfo".into()],
        }
    }

    #[test]
    fn system_prompt_carries_persona_and_language() {
        let c = config(None);
        let role = c.roster.get("cfo").unwrap();
        let system = system_for(&c, role);
        assert!(system.starts_with("You are Dana, Finance Manager"));
        assert!(system.contains("Guard every cent."));
        assert!(system.contains("answer in English"));
    }

    #[test]
    fn notes_reach_every_prompt() {
        let c = config(Some("Budget is capped at 2M"));
        let role = c.roster.get("cto").unwrap();
        assert!(welcome(&c).user.contains("Budget is capped at 2M"));
        assert!(introduction(&c, role).user.contains("Budget is capped at 2M"));
        assert!(chair_opening(&c, role, &plan()).user.contains("Budget is capped at 2M"));
        assert!(discussion_turn(&c, role, &plan(), &[]).user.contains("Budget is capped at 2M"));
        assert!(summary(&c, &[]).user.contains("Budget is capped at 2M"));
    }

    #[test]
    fn chair_opening_lists_speakers_and_round() {
        let c = config(None);
        let prompt = chair_opening(&c, c.roster.moderator(), &plan());
        assert!(prompt.user.contains("round 1 of 3"));
        assert!(prompt.user.contains("Sam (R&D Director), Dana (Finance Manager)"));
    }

    #[test]
    fn discussion_embeds_context_lines() {
        let c = config(None);
        let role = c.roster.get("cfo").unwrap();
        let context = vec![Utterance::new(c.roster.get("cto").unwrap(), "We need GPUs.")];
        let prompt = discussion_turn(&c, role, &plan(), &context);
        assert!(prompt.user.contains("Sam (R&D Director): We need GPUs."));
    }

    #[test]
    fn handoff_names_chair() {
        let c = config(None);
        let chair = c.roster.get("cfo").unwrap();
        assert!(intro_handoff(&c, chair).contains("Dana (Finance Manager) will chair"));
        assert!(intro_handoff(&c, c.roster.moderator()).contains("chair the discussion myself"));
    }

    #[test]
    fn conclusion_handoff_addresses_moderator_only() {
        let c = config(None);
        let moderator = c.roster.moderator();
        let text = conclusion_handoff(moderator);
        assert!(text.starts_with("That concludes our discussion rounds."));
        assert!(text.ends_with("could you please summarize what we agreed?"));
        assert!(text.contains(&moderator.name));
        assert!(!text.contains("(from"));
        assert!(!text.contains("Dana"));
    }

    #[test]
    fn fallback_is_marked_and_truncated() {
        let role = Role::new("cfo", "Dana", "Finance Manager");
        let err = GenerationError::Other {
            message: "x".repeat(500),
        };
        let text = fallback_text(&role, &err);
        assert!(is_fallback(&text));
        assert!(text.contains("Dana (Finance Manager)"));
        assert!(text.len() < 250);
        assert!(!is_fallback("All good"));
    }
}
