//! The driving loop: introduction, discussion rounds, conclusion.

use std::sync::Arc;
use std::time::{Duration, Instant};

use conclave_core::{Role, Stage};
use metrics::{counter, histogram};
use tracing::{debug, info, instrument, warn};

use super::{LoopExit, MeetingSession, UtteranceKind};
use crate::chair::{find_named_speaker, lead_with, select_chair};
use crate::metrics::{GENERATION_DURATION_SECONDS, GENERATION_FAILURES_TOTAL};
use crate::prompts::{self, Prompt};
use crate::request::AdvanceMode;
use crate::scheduler::{Candidate, RoundPlan, TurnScheduler};

#[instrument(skip_all, fields(session_id = %session.id))]
pub(super) async fn run(session: Arc<MeetingSession>) -> Result<(), LoopExit> {
    let config = &session.config;
    let chair = select_chair(&config.roster, &config.scenario, config.chair.as_deref());
    info!(
        chair = %chair.id,
        rounds = config.total_rounds,
        scenario = %config.scenario.id,
        "meeting started"
    );

    introduction(&session, chair).await?;
    discussion(&session, chair).await?;
    conclusion(&session, chair).await?;
    session.transition(Stage::Ended).await
}

async fn introduction(session: &MeetingSession, chair: &Role) -> Result<(), LoopExit> {
    session.transition(Stage::Introduction).await?;
    let config = &session.config;
    let moderator = config.roster.moderator();

    let _ = session.speak(moderator, prompts::welcome(config), None).await?;
    for role in config.roster.active_participants() {
        let _ = session
            .speak(role, prompts::introduction(config, role), None)
            .await?;
    }
    session
        .say(moderator, prompts::intro_handoff(config, chair))
        .await
}

async fn discussion(session: &MeetingSession, chair: &Role) -> Result<(), LoopExit> {
    session.enter_discussion().await?;
    let config = &session.config;
    let scheduler = TurnScheduler::new();

    for round in 1..=config.total_rounds {
        if round > 1 {
            session.begin_round(round).await?;
        }
        let plan = session.plan_round(&scheduler, chair, round);
        debug!(round, speakers = ?plan.speakers, "round planned");

        let opening = session
            .speak(chair, prompts::chair_opening(config, chair, &plan), None)
            .await?;
        let named = if prompts::is_fallback(&opening) {
            None
        } else {
            let candidates: Vec<&Role> = plan
                .speakers
                .iter()
                .filter_map(|id| config.roster.get(id))
                .collect();
            find_named_speaker(&opening, &candidates)
        };
        if let Some(first) = &named {
            debug!(round, first = %first, "chair named the first speaker");
        }
        let order = lead_with(plan.speakers.clone(), named.as_deref());

        let mut cut_short = false;
        for id in &order {
            if session.take_advance() {
                info!(round, "round ended early by next_round");
                cut_short = true;
                break;
            }
            let Some(role) = config.roster.get(id) else {
                continue;
            };
            let context = session.recent_window(session.settings.discussion_window);
            let _ = session
                .speak(
                    role,
                    prompts::discussion_turn(config, role, &plan, &context),
                    None,
                )
                .await?;
        }
        session.complete_round(round).await?;

        let advanced = cut_short || session.take_advance();
        if config.advance == AdvanceMode::Manual && !advanced {
            info!(round, "waiting for next_round");
            session.wait_for_advance().await?;
        }
    }
    Ok(())
}

async fn conclusion(session: &MeetingSession, chair: &Role) -> Result<(), LoopExit> {
    session.transition(Stage::Conclusion).await?;
    let config = &session.config;
    let moderator = config.roster.moderator();

    if config.roster.is_moderator(&chair.id) {
        session.say(moderator, prompts::self_announcement()).await?;
    } else {
        session
            .say(chair, prompts::conclusion_handoff(moderator))
            .await?;
    }

    let context = session.recent_window(session.settings.conclusion_window);
    let summary = session
        .speak(
            moderator,
            prompts::summary(config, &context),
            Some(session.settings.conclusion_temperature),
        )
        .await?;
    session.publish_conclusion(&summary).await?;
    session.say(moderator, prompts::closing(config)).await
}

impl MeetingSession {
    /// Order this round's speakers: active roles other than the chair and
    /// the moderator, weighted by the scenario and damped by recency.
    fn plan_round(&self, scheduler: &TurnScheduler, chair: &Role, round: u32) -> RoundPlan {
        let config = &self.config;
        let moderator_id = config.roster.moderator().id.as_str();
        let excluded = [chair.id.as_str(), moderator_id];

        let candidates: Vec<Candidate<'_>> = config
            .roster
            .active_participants()
            .filter(|role| role.id != chair.id)
            .map(|role| Candidate::weighted(&role.id, config.scenario.weight_for(role)))
            .collect();
        let recent = self.recent_speakers(&excluded);

        RoundPlan {
            round,
            topic: config.scenario.round_topic(round, &config.topic),
            chair_id: chair.id.clone(),
            speakers: scheduler.order(&candidates, &recent),
        }
    }

    /// Generate and append one utterance, substituting a fallback line when
    /// generation fails. Returns the appended text.
    async fn speak(
        &self,
        role: &Role,
        prompt: Prompt,
        temperature: Option<f64>,
    ) -> Result<String, LoopExit> {
        self.checkpoint().await?;
        let temperature =
            temperature.unwrap_or_else(|| role.temperature_or(self.settings.default_temperature));

        let started = Instant::now();
        let result = self
            .generator
            .generate(&prompt.system, &prompt.user, temperature)
            .await;
        histogram!(GENERATION_DURATION_SECONDS).record(started.elapsed().as_secs_f64());

        let (text, kind) = match result {
            Ok(text) => (text, UtteranceKind::Generated),
            Err(err) => {
                warn!(
                    role_id = %role.id,
                    category = err.category(),
                    error = %err,
                    "generation failed, using fallback line"
                );
                counter!(GENERATION_FAILURES_TOTAL, "category" => err.category()).increment(1);
                (prompts::fallback_text(role, &err), UtteranceKind::Fallback)
            }
        };

        self.append(role, text.clone(), kind).await?;
        self.pace().await;
        Ok(text)
    }

    /// Append a fixed line.
    async fn say(&self, role: &Role, text: String) -> Result<(), LoopExit> {
        self.append(role, text, UtteranceKind::Templated).await?;
        self.pace().await;
        Ok(())
    }

    async fn pace(&self) {
        if self.settings.turn_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.settings.turn_delay_ms)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use conclave_core::ControlCommand;
    use conclave_llm::{GenerationResult, TextGenerator};
    use conclave_settings::MeetingSettings;
    use mockall::mock;
    use parking_lot::Mutex;

    use super::*;
    use crate::broadcast::BroadcastManager;
    use crate::request::CreateMeetingRequest;
    use crate::scenario::ScenarioCatalog;

    mock! {
        Generator {}

        #[async_trait]
        impl TextGenerator for Generator {
            fn name(&self) -> &str;
            async fn generate(
                &self,
                system_prompt: &str,
                user_prompt: &str,
                temperature: f64,
            ) -> GenerationResult<String>;
        }
    }

    fn session_with(generator: MockGenerator, participants: Vec<Role>) -> Arc<MeetingSession> {
        let settings = MeetingSettings::default();
        let config = CreateMeetingRequest {
            topic: "Q3 budget".into(),
            participants,
            rounds: Some(1),
            ..Default::default()
        }
        .resolve(&settings, &ScenarioCatalog::builtin())
        .unwrap();
        Arc::new(MeetingSession::new(
            config,
            settings,
            Arc::new(BroadcastManager::new()),
            Arc::new(generator),
        ))
    }

    fn two_roles() -> Vec<Role> {
        vec![
            Role::new("cfo", "Dana", "Finance Manager"),
            Role::new("cto", "Sam", "R&D Director").with_temperature(0.9),
        ]
    }

    type CallLog = Arc<Mutex<Vec<(String, String, f64)>>>;

    fn recording(log: &CallLog) -> MockGenerator {
        let log = Arc::clone(log);
        let mut generator = MockGenerator::new();
        let _ = generator
            .expect_generate()
            .returning(move |system, user, temperature| {
                log.lock()
                    .push((system.to_string(), user.to_string(), temperature));
                if user.contains("Summarize the key points") {
                    Ok("Final summary.".into())
                } else {
                    Ok("Noted.".into())
                }
            });
        generator
    }

    #[tokio::test]
    async fn temperatures_follow_role_and_stage() {
        let log = CallLog::default();
        let session = session_with(recording(&log), two_roles());
        run(Arc::clone(&session)).await.unwrap();

        assert_eq!(session.stage(), Stage::Ended);
        assert_eq!(session.snapshot().conclusion.as_deref(), Some("Final summary."));

        let calls = log.lock();
        let summaries: Vec<_> = calls
            .iter()
            .filter(|(_, user, _)| user.contains("Summarize the key points"))
            .collect();
        assert_eq!(summaries.len(), 1);
        assert!((summaries[0].2 - 0.5).abs() < f64::EPSILON);

        for (system, user, temperature) in calls.iter() {
            if user.contains("Summarize the key points") {
                continue;
            }
            let expected = if system.starts_with("You are Sam") { 0.9 } else { 0.7 };
            assert!((temperature - expected).abs() < f64::EPSILON, "{system}");
        }
    }

    #[tokio::test]
    async fn chair_named_speaker_goes_first() {
        let mut generator = MockGenerator::new();
        let _ = generator.expect_generate().returning(|_, user, _| {
            if user.contains("invite one participant by name") {
                Ok("Let's hear from Sam first.".into())
            } else {
                Ok("Noted.".into())
            }
        });

        let participants = vec![
            Role::new("cfo", "Dana", "Finance Manager"),
            Role::new("cmo", "Ari", "Marketing Manager"),
            Role::new("cto", "Sam", "R&D Director"),
        ];
        let session = session_with(generator, participants);
        run(Arc::clone(&session)).await.unwrap();

        let messages = session.snapshot().messages;
        let opening = messages
            .iter()
            .position(|m| m.text == "Let's hear from Sam first.")
            .unwrap();
        assert_eq!(messages[opening + 1].speaker_id, "cto");
    }

    #[tokio::test]
    async fn forced_end_stops_loop() {
        let mut generator = MockGenerator::new();
        let _ = generator
            .expect_generate()
            .returning(|_, _, _| Ok("Noted.".into()));
        let session = session_with(generator, two_roles());
        let _ = session.apply(ControlCommand::EndSession);

        assert!(matches!(run(Arc::clone(&session)).await, Err(LoopExit::Terminated)));
        assert_eq!(session.message_count(), 0);
    }

    #[test]
    fn plan_excludes_chair_and_moderator() {
        let participants = vec![
            Role::new("business_manager", "Bo", "Business Manager"),
            Role::new("cfo", "Dana", "Finance Manager"),
            Role::new("cto", "Sam", "R&D Director"),
        ];
        let session = session_with(MockGenerator::new(), participants);
        let config = &session.config;
        let chair = select_chair(&config.roster, &config.scenario, None);
        assert_eq!(chair.id, "business_manager");

        let plan = session.plan_round(&TurnScheduler::new(), chair, 2);
        assert_eq!(plan.speakers, ["cfo", "cto"]);
        assert_eq!(plan.chair_id, "business_manager");
        assert_eq!(plan.round, 2);
    }
}
