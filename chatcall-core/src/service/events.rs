use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ActorBrief, CallId, Identity};

/// Events fanned out to users over the event channel
///
/// Payload keys are camelCase on the wire because the chat application's
/// web client consumes them directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum CallEvent {
    /// Someone is ringing the addressee
    IncomingCall {
        call_id: CallId,
        caller: Identity,
        channel_name: String,
        timestamp: DateTime<Utc>,
    },

    /// The invited user picked up; both sides may join the channel
    CallAccepted {
        call_id: CallId,
        receiver: Identity,
        channel_name: String,
        timestamp: DateTime<Utc>,
    },

    /// The call was declined while still ringing
    CallRejected {
        call_id: CallId,
        receiver: ActorBrief,
        timestamp: DateTime<Utc>,
    },

    /// An active call was hung up by one of its parties
    CallEnded {
        call_id: CallId,
        ended_by: String,
        timestamp: DateTime<Utc>,
    },

    /// A ringing call ran out its deadline without an answer
    CallExpired {
        call_id: CallId,
        timestamp: DateTime<Utc>,
    },
}

impl CallEvent {
    /// Get the call this event belongs to
    #[must_use]
    pub const fn call_id(&self) -> &CallId {
        match self {
            Self::IncomingCall { call_id, .. }
            | Self::CallAccepted { call_id, .. }
            | Self::CallRejected { call_id, .. }
            | Self::CallEnded { call_id, .. }
            | Self::CallExpired { call_id, .. } => call_id,
        }
    }

    /// Get the timestamp of this event
    #[must_use]
    pub const fn timestamp(&self) -> &DateTime<Utc> {
        match self {
            Self::IncomingCall { timestamp, .. }
            | Self::CallAccepted { timestamp, .. }
            | Self::CallRejected { timestamp, .. }
            | Self::CallEnded { timestamp, .. }
            | Self::CallExpired { timestamp, .. } => timestamp,
        }
    }

    /// Get a short description of the event type
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::IncomingCall { .. } => "incoming_call",
            Self::CallAccepted { .. } => "call_accepted",
            Self::CallRejected { .. } => "call_rejected",
            Self::CallEnded { .. } => "call_ended",
            Self::CallExpired { .. } => "call_expired",
        }
    }
}
