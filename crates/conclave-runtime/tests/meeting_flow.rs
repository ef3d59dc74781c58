//! Full meeting loops driven through the orchestrator with scripted generators.

use std::sync::Arc;
use std::time::Duration;

use conclave_core::{ControlCommand, MeetingEvent, Role, SessionId, Stage};
use conclave_llm::mock::ScriptedGenerator;
use conclave_runtime::prompts::is_fallback;
use conclave_runtime::{
    CommandOutcome, CreateMeetingRequest, MeetingOrchestrator, ObserverConnection,
    ScenarioCatalog,
};
use conclave_settings::MeetingSettings;
use tokio::sync::mpsc::Receiver;
use tokio::time::timeout;

const TIMEOUT: Duration = Duration::from_secs(5);

struct Observer {
    _connection: Arc<ObserverConnection>,
    rx: Receiver<Arc<String>>,
}

impl Observer {
    fn attach(orch: &MeetingOrchestrator, id: &SessionId) -> Self {
        let (connection, rx) = ObserverConnection::channel(id.clone(), 1024);
        orch.register_observer(Arc::clone(&connection)).unwrap();
        Self {
            _connection: connection,
            rx,
        }
    }

    async fn next(&mut self) -> MeetingEvent {
        let json = timeout(TIMEOUT, self.rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("observer channel closed");
        serde_json::from_str(&json).unwrap()
    }

    /// Collect events up to and including the first matching one.
    async fn until(&mut self, mut stop: impl FnMut(&MeetingEvent) -> bool) -> Vec<MeetingEvent> {
        let mut events = Vec::new();
        loop {
            let event = self.next().await;
            let done = stop(&event);
            events.push(event);
            if done {
                return events;
            }
        }
    }

    async fn until_finished(&mut self) -> Vec<MeetingEvent> {
        self.until(|e| matches!(e, MeetingEvent::StageChange { stage, .. } if stage.is_terminal()))
            .await
    }

    fn drain(&mut self) -> Vec<MeetingEvent> {
        let mut events = Vec::new();
        while let Ok(json) = self.rx.try_recv() {
            events.push(serde_json::from_str(&json).unwrap());
        }
        events
    }
}

fn orchestrator(generator: ScriptedGenerator) -> MeetingOrchestrator {
    MeetingOrchestrator::new(
        MeetingSettings {
            pause_poll_ms: 20,
            ..MeetingSettings::default()
        },
        ScenarioCatalog::builtin(),
        Arc::new(generator),
    )
}

fn request(rounds: u32, auto_advance: bool) -> CreateMeetingRequest {
    CreateMeetingRequest {
        topic: "Entering the Nordic market".into(),
        participants: vec![
            Role::new("cfo", "Dana", "Finance Manager"),
            Role::new("cmo", "Ari", "Marketing Manager"),
        ],
        rounds: Some(rounds),
        auto_advance: Some(auto_advance),
        ..Default::default()
    }
}

fn count(events: &[MeetingEvent], kind: &str) -> usize {
    events.iter().filter(|e| e.kind() == kind).count()
}

fn stages(events: &[MeetingEvent]) -> Vec<Stage> {
    events
        .iter()
        .filter_map(|e| match e {
            MeetingEvent::StageChange { stage, .. } => Some(*stage),
            _ => None,
        })
        .collect()
}

fn speakers(events: &[MeetingEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            MeetingEvent::NewMessage { current_speaker, .. } => Some(current_speaker.clone()),
            _ => None,
        })
        .collect()
}

/// Every `round_update` moves strictly forward and stays within the meeting.
fn assert_round_updates(events: &[MeetingEvent], total: u32) {
    let rounds: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            MeetingEvent::RoundUpdate { round } => Some(*round),
            _ => None,
        })
        .collect();
    assert!(
        rounds.iter().all(|r| (1..=total).contains(r)),
        "round out of range: {rounds:?}"
    );
    assert!(
        rounds.windows(2).all(|w| w[0] < w[1]),
        "rounds not increasing: {rounds:?}"
    );
}

#[tokio::test]
async fn meeting_runs_from_introduction_to_ended() {
    let orch = orchestrator(ScriptedGenerator::numbered());
    let id = orch.create_session(request(1, true)).unwrap();
    let mut observer = Observer::attach(&orch, &id);

    let events = observer.until_finished().await;
    assert!(matches!(&events[0], MeetingEvent::Init { stage: Stage::Waiting, messages, .. } if messages.is_empty()));
    assert_eq!(
        stages(&events),
        [Stage::Introduction, Stage::Discussion, Stage::Conclusion, Stage::Ended]
    );
    assert_eq!(count(&events, "round_update"), 1);
    assert_eq!(count(&events, "round_completed"), 1);
    assert_eq!(count(&events, "conclusion"), 1);
    assert_round_updates(&events, 1);

    let discussion_events: Vec<&str> = events
        .iter()
        .skip_while(|e| !matches!(e, MeetingEvent::StageChange { stage: Stage::Discussion, .. }))
        .take(2)
        .map(MeetingEvent::kind)
        .collect();
    assert_eq!(discussion_events, ["stage_change", "round_update"]);

    let discussion_at = events
        .iter()
        .position(|e| matches!(e, MeetingEvent::StageChange { stage: Stage::Discussion, .. }))
        .unwrap();
    let intro_speakers = speakers(&events[..discussion_at]);
    assert!(intro_speakers.iter().any(|s| s == "cfo"));
    assert!(intro_speakers.iter().any(|s| s == "cmo"));

    let snapshot = orch.snapshot(&id).unwrap();
    assert_eq!(snapshot.stage, Stage::Ended);
    let conclusion = snapshot.conclusion.unwrap();
    assert!(
        snapshot
            .messages
            .iter()
            .any(|m| m.speaker_id == "moderator" && m.text == conclusion)
    );
    assert_eq!(snapshot.messages.len(), speakers(&events).len());
}

#[tokio::test]
async fn failing_generator_still_reaches_ended() {
    let orch = orchestrator(ScriptedGenerator::failing());
    let id = orch.create_session(request(1, true)).unwrap();
    let mut observer = Observer::attach(&orch, &id);

    let events = observer.until_finished().await;
    assert_eq!(stages(&events).last(), Some(&Stage::Ended));
    assert_eq!(count(&events, "error"), 0);
    assert_round_updates(&events, 1);

    let snapshot = orch.snapshot(&id).unwrap();
    assert!(is_fallback(&snapshot.conclusion.unwrap()));
    let (fallback, templated): (Vec<_>, Vec<_>) =
        snapshot.messages.iter().partition(|m| is_fallback(&m.text));
    assert!(!fallback.is_empty());
    // intro hand-off, conclusion hand-off and closing line are never generated
    assert_eq!(templated.len(), 3);
}

#[tokio::test]
async fn late_joiner_sees_no_gap_and_no_duplicate() {
    let orch = orchestrator(ScriptedGenerator::numbered().with_delay(Duration::from_millis(10)));
    let id = orch.create_session(request(2, true)).unwrap();
    let mut early = Observer::attach(&orch, &id);

    let mut seen = 0;
    let _ = early
        .until(|e| {
            if e.kind() == "new_message" {
                seen += 1;
            }
            seen == 5
        })
        .await;

    let mut late = Observer::attach(&orch, &id);
    let early_rest = early.until_finished().await;
    let late_events = late.until_finished().await;
    assert_round_updates(&early_rest, 2);
    assert_round_updates(&late_events, 2);

    let MeetingEvent::Init { messages, .. } = &late_events[0] else {
        panic!("first event must be init, got {:?}", late_events[0]);
    };
    assert!(messages.len() >= 5);

    let mut late_ids: Vec<_> = messages.iter().map(|m| m.id.clone()).collect();
    late_ids.extend(late_events.iter().filter_map(|e| match e {
        MeetingEvent::NewMessage { message, .. } => Some(message.id.clone()),
        _ => None,
    }));
    let final_ids: Vec<_> = orch
        .snapshot(&id)
        .unwrap()
        .messages
        .into_iter()
        .map(|m| m.id)
        .collect();
    assert_eq!(late_ids, final_ids);
    assert_eq!(speakers(&early_rest).len() + 5, final_ids.len());
}

#[tokio::test]
async fn next_round_outside_discussion_is_ignored() {
    let orch = orchestrator(ScriptedGenerator::numbered());
    let id = orch.create_session(request(2, true)).unwrap();
    let mut observer = Observer::attach(&orch, &id);

    assert_eq!(
        orch.handle_command(&id, ControlCommand::PauseSession).unwrap(),
        CommandOutcome::Applied
    );
    assert!(matches!(
        orch.handle_command(&id, ControlCommand::AdvanceRound).unwrap(),
        CommandOutcome::Ignored(_)
    ));
    assert_eq!(
        orch.handle_command(&id, ControlCommand::ResumeSession).unwrap(),
        CommandOutcome::Applied
    );

    let events = observer.until_finished().await;
    assert_eq!(count(&events, "round_update"), 2);
    assert_eq!(count(&events, "round_completed"), 2);
    assert_round_updates(&events, 2);
    assert_eq!(orch.snapshot(&id).unwrap().stage, Stage::Ended);
}

#[tokio::test]
async fn pause_stops_new_messages_until_resume() {
    let orch = orchestrator(ScriptedGenerator::numbered().with_delay(Duration::from_millis(10)));
    let id = orch.create_session(request(1, true)).unwrap();
    let mut observer = Observer::attach(&orch, &id);

    let _ = observer.until(|e| e.kind() == "new_message").await;
    assert_eq!(
        orch.handle_command(&id, ControlCommand::PauseSession).unwrap(),
        CommandOutcome::Applied
    );
    let _ = observer
        .until(|e| matches!(e, MeetingEvent::StageChange { stage: Stage::Paused, .. }))
        .await;
    let frozen = orch.snapshot(&id).unwrap().messages.len();

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(count(&observer.drain(), "new_message"), 0);
    assert_eq!(orch.snapshot(&id).unwrap().messages.len(), frozen);

    let _ = orch.handle_command(&id, ControlCommand::ResumeSession).unwrap();
    let events = observer.until_finished().await;
    assert!(matches!(
        &events[0],
        MeetingEvent::StageChange { stage: Stage::Introduction, previous_stage: Some(Stage::Paused) }
    ));
    assert_eq!(stages(&events).last(), Some(&Stage::Ended));
    assert_round_updates(&events, 1);
}

#[tokio::test]
async fn manual_mode_waits_for_next_round() {
    let orch = orchestrator(ScriptedGenerator::numbered());
    let id = orch.create_session(request(2, false)).unwrap();
    let mut observer = Observer::attach(&orch, &id);

    let mut all = observer.until(|e| e.kind() == "round_completed").await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(observer.drain().is_empty());
    assert_eq!(orch.snapshot(&id).unwrap().current_round, 1);

    assert_eq!(
        orch.handle_command(&id, ControlCommand::AdvanceRound).unwrap(),
        CommandOutcome::Applied
    );
    let events = observer.until(|e| e.kind() == "round_completed").await;
    assert!(matches!(events[0], MeetingEvent::RoundUpdate { round: 2 }));
    all.extend(events);

    let _ = orch.handle_command(&id, ControlCommand::AdvanceRound).unwrap();
    let events = observer.until_finished().await;
    assert_eq!(
        stages(&events),
        [Stage::Conclusion, Stage::Ended]
    );
    all.extend(events);
    assert_round_updates(&all, 2);
}

#[tokio::test]
async fn next_round_cuts_the_current_round_short() {
    let orch = orchestrator(ScriptedGenerator::numbered().with_delay(Duration::from_millis(50)));
    let mut req = request(3, true);
    req.participants.extend([
        Role::new("cto", "Sam", "R&D Director"),
        Role::new("coo", "Lee", "Operations Manager"),
    ]);
    let participant_ids: Vec<String> = req.participants.iter().map(|r| r.id.clone()).collect();
    let id = orch.create_session(req).unwrap();
    let mut observer = Observer::attach(&orch, &id);

    let mut all = observer
        .until(|e| matches!(e, MeetingEvent::RoundUpdate { round: 1 }))
        .await;
    let opening = observer.until(|e| e.kind() == "new_message").await;
    let chair = speakers(&opening).pop().unwrap();
    all.extend(opening);

    assert_eq!(
        orch.handle_command(&id, ControlCommand::AdvanceRound).unwrap(),
        CommandOutcome::Applied
    );
    let round_one = observer.until(|e| e.kind() == "round_completed").await;
    assert!(matches!(round_one.last(), Some(MeetingEvent::RoundCompleted { round: 1 })));
    // the chair opens the round and is not scheduled again
    let scheduled = participant_ids.iter().filter(|p| **p != chair).count();
    assert!(
        count(&round_one, "new_message") < scheduled,
        "round 1 ran {} of {scheduled} turns",
        count(&round_one, "new_message")
    );
    all.extend(round_one);

    let next = observer
        .until(|e| matches!(e, MeetingEvent::RoundUpdate { .. } | MeetingEvent::NewMessage { .. }))
        .await;
    assert!(matches!(next.last(), Some(MeetingEvent::RoundUpdate { round: 2 })));
    all.extend(next);

    all.extend(observer.until_finished().await);
    assert_eq!(stages(&all).last(), Some(&Stage::Ended));
    assert_eq!(count(&all, "round_completed"), 3);
    assert_round_updates(&all, 3);
}

#[tokio::test]
async fn end_is_idempotent_and_closes_observers() {
    let orch = orchestrator(ScriptedGenerator::numbered().with_delay(Duration::from_millis(10)));
    let id = orch.create_session(request(3, true)).unwrap();
    let (connection, mut rx) = ObserverConnection::channel(id.clone(), 1024);
    orch.register_observer(Arc::clone(&connection)).unwrap();

    assert_eq!(
        orch.handle_command(&id, ControlCommand::EndSession).unwrap(),
        CommandOutcome::Applied
    );
    assert!(matches!(
        orch.handle_command(&id, ControlCommand::EndSession).unwrap(),
        CommandOutcome::Ignored(_)
    ));
    assert!(connection.is_closed());

    tokio::time::sleep(Duration::from_millis(50)).await;
    let mut events = Vec::new();
    while let Ok(json) = rx.try_recv() {
        events.push(serde_json::from_str::<MeetingEvent>(&json).unwrap());
    }
    let ended = events
        .iter()
        .filter(|e| matches!(e, MeetingEvent::StageChange { stage: Stage::Ended, .. }))
        .count();
    assert_eq!(ended, 1);
    assert_round_updates(&events, 3);
    assert_eq!(orch.broadcast().session_connection_count(&id), 0);
    assert_eq!(orch.snapshot(&id).unwrap().messages.len(), 0);
}
