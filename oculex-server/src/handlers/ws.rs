use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use oculex_core::session::ensure_timestamp;
use oculex_core::{EventPayload, Role, SessionEvent};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::infra::app_state::AppState;
use crate::relay::{Connection, RelayHub, messages};

/// Handle WebSocket upgrade request
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle an individual WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<SessionEvent>(100);

    let connection = Arc::new(Connection::new(tx));
    let conn_id = connection.id;

    state.relay.add_connection(conn_id, connection);

    // Spawn task to handle outgoing events
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let Ok(ws_msg) = messages::event_to_ws(&event) {
                if ws_sender.send(ws_msg).await.is_err() {
                    break;
                }
            }
        }
    });

    // Handle incoming events
    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                match serde_json::from_str::<SessionEvent>(text.as_str()) {
                    Ok(event) => {
                        handle_session_event(&state.relay, conn_id, event).await;
                    }
                    Err(e) => {
                        // Malformed events are dropped, never forwarded.
                        tracing::warn!(%conn_id, "dropping malformed event: {}", e);
                    }
                }
            }
            Ok(Message::Binary(bin)) => {
                match serde_json::from_slice::<SessionEvent>(bin.as_ref()) {
                    Ok(event) => {
                        handle_session_event(&state.relay, conn_id, event).await;
                    }
                    Err(e) => {
                        tracing::warn!(%conn_id, "dropping malformed event: {}", e);
                    }
                }
            }
            Ok(Message::Close(_)) => {
                break;
            }
            Err(e) => {
                tracing::error!(%conn_id, "websocket error: {}", e);
                break;
            }
            _ => {}
        }
    }

    // Clean up on disconnect
    handle_disconnect(&state.relay, conn_id).await;
}

/// Dispatch one session event according to the relay's forwarding rules.
pub(crate) async fn handle_session_event(
    hub: &RelayHub,
    conn_id: Uuid,
    event: SessionEvent,
) {
    match event {
        SessionEvent::JoinDoctor => {
            hub.join(conn_id, Role::Doctor).await;
            send_to(hub, conn_id, SessionEvent::Status {
                msg: "Doctor connected".to_string(),
            })
            .await;
            tracing::info!(%conn_id, "doctor joined the session");
        }

        SessionEvent::JoinPatient => {
            hub.join(conn_id, Role::Patient).await;
            send_to(hub, conn_id, SessionEvent::Status {
                msg: "Patient connected".to_string(),
            })
            .await;
            // Notify doctors that the patient is online
            hub.broadcast(Role::Doctor, SessionEvent::PatientStatus { online: true })
                .await;
            tracing::info!(%conn_id, "patient joined the session");
        }

        SessionEvent::DoctorCommand { command, test } => {
            tracing::info!(%command, %test, "doctor command");
            hub.broadcast(Role::Patient, SessionEvent::DoctorInstruction {
                command: command.clone(),
                test: test.clone(),
            })
            .await;
            // Confirm to the sender
            send_to(hub, conn_id, SessionEvent::CommandSent { command, test }).await;
        }

        SessionEvent::TestCompleted { mut data } => {
            let timestamp = ensure_timestamp(&mut data);
            tracing::info!(
                test = data.get("test_name").and_then(|v| v.as_str()).unwrap_or("unknown"),
                "test completed"
            );

            let summary = completion_summary(&data, timestamp);
            hub.broadcast(Role::Doctor, SessionEvent::TestResult { data })
                .await;
            // Also surface the completion in the live monitoring feed
            hub.broadcast(Role::Doctor, SessionEvent::PatientViewUpdate {
                data: summary,
            })
            .await;
        }

        SessionEvent::PatientViewUpdate { mut data } => {
            ensure_timestamp(&mut data);
            data.insert("mirror_enabled".to_string(), Value::Bool(true));
            hub.broadcast(Role::Doctor, SessionEvent::PatientViewUpdate { data })
                .await;
        }

        SessionEvent::EnableScreenMirror { data } => {
            hub.broadcast(Role::Patient, SessionEvent::MirrorScreen { data })
                .await;
        }

        SessionEvent::PatientScreenData { data } => {
            hub.broadcast(Role::Doctor, SessionEvent::PatientScreenMirror { data })
                .await;
        }

        SessionEvent::PatientNavigation { data } => {
            hub.broadcast(Role::Doctor, SessionEvent::PatientNavigation { data })
                .await;
        }

        SessionEvent::PatientIdentified { data } => {
            hub.broadcast(Role::Doctor, SessionEvent::PatientIdentified { data })
                .await;
        }

        // Server-initiated events should not come from clients
        SessionEvent::Status { .. }
        | SessionEvent::PatientStatus { .. }
        | SessionEvent::CommandSent { .. }
        | SessionEvent::DoctorInstruction { .. }
        | SessionEvent::TestResult { .. }
        | SessionEvent::MirrorScreen { .. }
        | SessionEvent::PatientScreenMirror { .. } => {
            tracing::warn!(%conn_id, "client sent server-only event type");
        }
    }
}

/// Handle connection teardown.
///
/// The offline presence always goes to the doctor group, even when the
/// dropped connection never joined a group; with no doctors connected the
/// broadcast is a no-op.
pub(crate) async fn handle_disconnect(hub: &RelayHub, conn_id: Uuid) {
    hub.remove_connection(conn_id);
    hub.broadcast(Role::Doctor, SessionEvent::PatientStatus { online: false })
        .await;
    tracing::info!(%conn_id, "client disconnected");
}

/// Derived summary broadcast alongside the raw result on test completion.
fn completion_summary(data: &EventPayload, timestamp: Value) -> EventPayload {
    let mut summary = EventPayload::new();
    summary.insert("action".to_string(), json!("test_completed"));
    summary.insert(
        "test".to_string(),
        data.get("test_name").cloned().unwrap_or_else(|| json!("unknown")),
    );
    summary.insert(
        "patient".to_string(),
        data.get("patient_name").cloned().unwrap_or_else(|| json!("unknown")),
    );
    summary.insert(
        "accuracy".to_string(),
        data.get("accuracy").cloned().unwrap_or_else(|| json!(0)),
    );
    summary.insert("timestamp".to_string(), timestamp);
    summary
}

async fn send_to(hub: &RelayHub, conn_id: Uuid, event: SessionEvent) {
    if let Some(connection) = hub.get_connection(&conn_id) {
        if let Err(e) = connection.send_event(event).await {
            tracing::error!(%conn_id, "failed to send event: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn connect(hub: &RelayHub) -> (Uuid, mpsc::Receiver<SessionEvent>) {
        let (tx, rx) = mpsc::channel(16);
        let connection = Arc::new(Connection::new(tx));
        let conn_id = connection.id;
        hub.add_connection(conn_id, connection);
        (conn_id, rx)
    }

    async fn join(hub: &RelayHub, role: Role) -> (Uuid, mpsc::Receiver<SessionEvent>) {
        let (conn_id, mut rx) = connect(hub);
        let event = match role {
            Role::Doctor => SessionEvent::JoinDoctor,
            Role::Patient => SessionEvent::JoinPatient,
        };
        handle_session_event(hub, conn_id, event).await;
        // Drain the join ack
        assert!(matches!(rx.recv().await, Some(SessionEvent::Status { .. })));
        (conn_id, rx)
    }

    #[tokio::test]
    async fn join_patient_acks_and_notifies_the_doctor_group_once() {
        let hub = RelayHub::new();
        let (_doctor, mut doctor_rx) = join(&hub, Role::Doctor).await;
        let (_patient, _patient_rx) = join(&hub, Role::Patient).await;

        assert!(matches!(
            doctor_rx.recv().await,
            Some(SessionEvent::PatientStatus { online: true })
        ));
        assert!(doctor_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn join_patient_with_no_doctor_connected_does_not_error() {
        let hub = RelayHub::new();
        let (_patient, mut patient_rx) = join(&hub, Role::Patient).await;

        // Only the ack arrived; the presence broadcast found no doctors.
        assert!(patient_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn doctor_command_reaches_patients_and_acks_the_doctor() {
        let hub = RelayHub::new();
        let (doctor, mut doctor_rx) = join(&hub, Role::Doctor).await;
        let (_patient, mut patient_rx) = join(&hub, Role::Patient).await;
        // Drain the patient-online notification
        assert!(matches!(
            doctor_rx.recv().await,
            Some(SessionEvent::PatientStatus { online: true })
        ));

        handle_session_event(&hub, doctor, SessionEvent::DoctorCommand {
            command: "start_test".into(),
            test: "visual_field".into(),
        })
        .await;

        match patient_rx.recv().await {
            Some(SessionEvent::DoctorInstruction { command, test }) => {
                assert_eq!(command, "start_test");
                assert_eq!(test, "visual_field");
            }
            other => panic!("expected doctor_instruction, got {other:?}"),
        }
        assert!(matches!(
            doctor_rx.recv().await,
            Some(SessionEvent::CommandSent { .. })
        ));
        // The instruction never echoes into the doctor group.
        assert!(doctor_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_completed_fans_out_result_and_timestamped_summary() {
        let hub = RelayHub::new();
        let (patient, _patient_rx) = join(&hub, Role::Patient).await;
        let (_doctor, mut doctor_rx) = join(&hub, Role::Doctor).await;

        let mut data = EventPayload::new();
        data.insert("test_name".into(), json!("visual_field"));
        data.insert("patient_name".into(), json!("Jane Doe"));
        data.insert("accuracy".into(), json!(88.89));
        handle_session_event(&hub, patient, SessionEvent::TestCompleted { data })
            .await;

        match doctor_rx.recv().await {
            Some(SessionEvent::TestResult { data }) => {
                assert_eq!(data["test_name"], json!("visual_field"));
                assert!(data["timestamp"].as_i64().unwrap() > 0);
            }
            other => panic!("expected test_result, got {other:?}"),
        }
        match doctor_rx.recv().await {
            Some(SessionEvent::PatientViewUpdate { data }) => {
                assert_eq!(data["action"], json!("test_completed"));
                assert_eq!(data["test"], json!("visual_field"));
                assert_eq!(data["patient"], json!("Jane Doe"));
                assert_eq!(data["accuracy"], json!(88.89));
                assert!(data["timestamp"].as_i64().unwrap() > 0);
            }
            other => panic!("expected patient_view_update, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn view_updates_are_enriched_before_forwarding() {
        let hub = RelayHub::new();
        let (patient, _patient_rx) = join(&hub, Role::Patient).await;
        let (_doctor, mut doctor_rx) = join(&hub, Role::Doctor).await;

        let mut data = EventPayload::new();
        data.insert("action".into(), json!("navigate"));
        handle_session_event(&hub, patient, SessionEvent::PatientViewUpdate {
            data,
        })
        .await;

        match doctor_rx.recv().await {
            Some(SessionEvent::PatientViewUpdate { data }) => {
                assert_eq!(data["mirror_enabled"], json!(true));
                assert!(data["timestamp"].as_i64().unwrap() > 0);
            }
            other => panic!("expected patient_view_update, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn screen_mirror_events_cross_between_the_groups() {
        let hub = RelayHub::new();
        let (doctor, mut doctor_rx) = join(&hub, Role::Doctor).await;
        let (patient, mut patient_rx) = join(&hub, Role::Patient).await;
        assert!(matches!(
            doctor_rx.recv().await,
            Some(SessionEvent::PatientStatus { online: true })
        ));

        let mut data = EventPayload::new();
        data.insert("enabled".into(), json!(true));
        handle_session_event(&hub, doctor, SessionEvent::EnableScreenMirror {
            data,
        })
        .await;
        assert!(matches!(
            patient_rx.recv().await,
            Some(SessionEvent::MirrorScreen { .. })
        ));

        let mut frame = EventPayload::new();
        frame.insert("screen".into(), json!("test_select"));
        handle_session_event(&hub, patient, SessionEvent::PatientScreenData {
            data: frame,
        })
        .await;
        assert!(matches!(
            doctor_rx.recv().await,
            Some(SessionEvent::PatientScreenMirror { .. })
        ));
    }

    #[tokio::test]
    async fn disconnect_always_notifies_the_doctor_group() {
        let hub = RelayHub::new();
        let (_doctor, mut doctor_rx) = join(&hub, Role::Doctor).await;

        // A connection that never joined any group drops away.
        let (stranger, _stranger_rx) = connect(&hub);
        handle_disconnect(&hub, stranger).await;

        assert!(matches!(
            doctor_rx.recv().await,
            Some(SessionEvent::PatientStatus { online: false })
        ));
    }

    #[tokio::test]
    async fn server_only_events_from_clients_are_dropped() {
        let hub = RelayHub::new();
        let (patient, _patient_rx) = join(&hub, Role::Patient).await;
        let (_doctor, mut doctor_rx) = join(&hub, Role::Doctor).await;

        handle_session_event(&hub, patient, SessionEvent::TestResult {
            data: EventPayload::new(),
        })
        .await;

        assert!(doctor_rx.try_recv().is_err());
    }
}
