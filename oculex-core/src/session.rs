use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Flat key-value payload carried by most session events.
pub type EventPayload = serde_json::Map<String, Value>;

/// Logical role a connection assumes for the supervised session.
///
/// There is exactly one doctor group and one patient group process-wide;
/// the relay does not key sessions beyond these two roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Doctor,
    Patient,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Doctor => write!(f, "doctor"),
            Role::Patient => write!(f, "patient"),
        }
    }
}

/// WebSocket message types for a supervised testing session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    // Client -> Server
    JoinDoctor,
    JoinPatient,
    DoctorCommand {
        command: String,
        #[serde(default)]
        test: String,
    },
    TestCompleted {
        #[serde(flatten)]
        data: EventPayload,
    },
    EnableScreenMirror {
        #[serde(flatten)]
        data: EventPayload,
    },
    PatientScreenData {
        #[serde(flatten)]
        data: EventPayload,
    },

    // Client -> Server -> Doctor group (forwarded, possibly enriched)
    PatientViewUpdate {
        #[serde(flatten)]
        data: EventPayload,
    },
    PatientNavigation {
        #[serde(flatten)]
        data: EventPayload,
    },
    PatientIdentified {
        #[serde(flatten)]
        data: EventPayload,
    },

    // Server -> Client
    Status {
        msg: String,
    },
    PatientStatus {
        online: bool,
    },
    CommandSent {
        command: String,
        test: String,
    },
    DoctorInstruction {
        command: String,
        test: String,
    },
    TestResult {
        #[serde(flatten)]
        data: EventPayload,
    },
    MirrorScreen {
        #[serde(flatten)]
        data: EventPayload,
    },
    PatientScreenMirror {
        #[serde(flatten)]
        data: EventPayload,
    },
}

/// Return the payload's `timestamp`, inserting the current time in
/// milliseconds since the epoch when the field is absent.
pub fn ensure_timestamp(data: &mut EventPayload) -> Value {
    if let Some(ts) = data.get("timestamp") {
        return ts.clone();
    }
    let ts = Value::from(chrono::Utc::now().timestamp_millis());
    data.insert("timestamp".to_string(), ts.clone());
    ts
}
