//! Observer WebSocket lifecycle, from upgrade through disconnect.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use conclave_core::{ControlCommand, MeetingEvent, SessionId};
use conclave_runtime::metrics::WS_MESSAGES_RECEIVED_TOTAL;
use conclave_runtime::{CommandOutcome, MeetingOrchestrator, ObserverConnection};
use futures::{SinkExt, StreamExt};
use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::ServerConfig;

/// How long the forwarder gets to flush queued events once the socket winds down.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Run one observer connection.
///
/// 1. Registers with the session (which sends `init`); unknown sessions get an
///    `error` event and a close frame
/// 2. Forwards queued events and sends periodic pings
/// 3. Applies inbound text frames as control commands
/// 4. Unregisters on disconnect, server shutdown or a forced session end
#[instrument(skip_all, fields(session_id = %session_id))]
pub async fn run_observer_session(
    ws: WebSocket,
    session_id: SessionId,
    orchestrator: Arc<MeetingOrchestrator>,
    config: Arc<ServerConfig>,
    shutdown: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (connection, mut send_rx) =
        ObserverConnection::channel(session_id.clone(), config.outbound_buffer);

    if let Err(err) = orchestrator.register_observer(Arc::clone(&connection)) {
        warn!(error = %err, "observer rejected");
        if let Ok(json) = serde_json::to_string(&MeetingEvent::error(err.to_string())) {
            let _ = ws_tx.send(Message::Text(json.into())).await;
        }
        let _ = ws_tx.send(Message::Close(None)).await;
        return;
    }

    let connection_start = Instant::now();
    info!(conn_id = %connection.id, "observer connected");

    let closed = connection.closed_token();
    let outbound_conn = Arc::clone(&connection);
    let ping_every = config.ping_interval();
    let pong_timeout = config.pong_timeout();
    let mut outbound = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(ping_every);
        let _ = ping_interval.tick().await;

        loop {
            tokio::select! {
                biased;
                msg = send_rx.recv() => {
                    let Some(text) = msg else { break };
                    if ws_tx.send(Message::Text(Arc::unwrap_or_clone(text).into())).await.is_err() {
                        break;
                    }
                }
                () = closed.cancelled() => {
                    while let Ok(text) = send_rx.try_recv() {
                        if ws_tx.send(Message::Text(Arc::unwrap_or_clone(text).into())).await.is_err() {
                            break;
                        }
                    }
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
                _ = ping_interval.tick() => {
                    if !outbound_conn.check_alive() && outbound_conn.last_pong_elapsed() > pong_timeout {
                        warn!(conn_id = %outbound_conn.id, ?pong_timeout, "observer unresponsive, disconnecting");
                        break;
                    }
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let closed = connection.closed_token();
    loop {
        let frame = tokio::select! {
            frame = ws_rx.next() => frame,
            () = closed.cancelled() => break,
            () = shutdown.cancelled() => {
                connection.close();
                break;
            }
            _ = &mut outbound => break,
        };
        let Some(Ok(msg)) = frame else { break };
        counter!(WS_MESSAGES_RECEIVED_TOTAL).increment(1);
        connection.mark_alive();

        match msg {
            Message::Text(text) => handle_control(&orchestrator, &session_id, text.as_str()),
            Message::Binary(data) => match std::str::from_utf8(&data) {
                Ok(text) => handle_control(&orchestrator, &session_id, text),
                Err(_) => warn!(len = data.len(), "ignoring non-UTF8 binary frame"),
            },
            Message::Close(_) => {
                debug!("observer sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    orchestrator.unregister_observer(&session_id, &connection.id);
    connection.close();
    if !outbound.is_finished() && tokio::time::timeout(FLUSH_TIMEOUT, &mut outbound).await.is_err() {
        outbound.abort();
    }
    info!(
        conn_id = %connection.id,
        duration_secs = connection_start.elapsed().as_secs_f64(),
        dropped = connection.dropped_messages(),
        "observer disconnected"
    );
}

/// Apply one inbound payload. Unrecognized payloads are logged and ignored.
pub fn handle_control(orchestrator: &MeetingOrchestrator, session_id: &SessionId, text: &str) {
    let Some(command) = ControlCommand::parse(text) else {
        return;
    };
    match orchestrator.handle_command(session_id, command) {
        Ok(CommandOutcome::Applied) => debug!(command = command.as_str(), "control command applied"),
        Ok(CommandOutcome::Ignored(reason)) => {
            debug!(command = command.as_str(), reason, "control command ignored");
        }
        Err(err) => warn!(command = command.as_str(), error = %err, "control command failed"),
    }
}

#[cfg(test)]
mod tests {
    use conclave_core::{Role, Stage};
    use conclave_llm::mock::ScriptedGenerator;
    use conclave_runtime::{CreateMeetingRequest, ScenarioCatalog};
    use conclave_settings::MeetingSettings;

    use super::*;

    fn orchestrator() -> MeetingOrchestrator {
        MeetingOrchestrator::new(
            MeetingSettings::default(),
            ScenarioCatalog::builtin(),
            Arc::new(ScriptedGenerator::numbered().with_delay(Duration::from_millis(10))),
        )
    }

    fn start(orch: &MeetingOrchestrator) -> SessionId {
        orch.create_session(CreateMeetingRequest {
            topic: "Pricing".into(),
            participants: vec![Role::new("a", "Ann", "Analyst"), Role::new("b", "Ben", "Buyer")],
            rounds: Some(3),
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn end_payload_ends_session() {
        let orch = orchestrator();
        let id = start(&orch);
        handle_control(&orch, &id, r#"{"type":"end_conference"}"#);
        assert_eq!(orch.snapshot(&id).unwrap().stage, Stage::Ended);
    }

    #[tokio::test]
    async fn malformed_payload_is_ignored() {
        let orch = orchestrator();
        let id = start(&orch);
        handle_control(&orch, &id, "not json");
        handle_control(&orch, &id, r#"{"type":"dance"}"#);
        assert!(!orch.snapshot(&id).unwrap().stage.is_terminal());
        handle_control(&orch, &id, r#"{"type":"end_conference"}"#);
    }

    #[test]
    fn unknown_session_is_logged_not_raised() {
        let orch = orchestrator();
        handle_control(&orch, &SessionId::new(), r#"{"type":"pause_conference"}"#);
        assert_eq!(orch.session_count(), 0);
    }
}
