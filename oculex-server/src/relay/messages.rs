use anyhow::Result;
use axum::extract::ws::{Message, Utf8Bytes};
use oculex_core::SessionEvent;

/// Convert a SessionEvent to a WebSocket message
pub fn event_to_ws(event: &SessionEvent) -> Result<Message> {
    let json = serde_json::to_string(event)?;
    Ok(Message::Text(Utf8Bytes::from(json)))
}

/// Convert a WebSocket message to a SessionEvent
pub fn ws_to_event(msg: Message) -> Result<SessionEvent> {
    match msg {
        Message::Text(text) => {
            let event: SessionEvent = serde_json::from_str(text.as_str())?;
            Ok(event)
        }
        Message::Binary(bin) => {
            let event: SessionEvent = serde_json::from_slice(bin.as_ref())?;
            Ok(event)
        }
        _ => Err(anyhow::anyhow!("unsupported message type")),
    }
}
