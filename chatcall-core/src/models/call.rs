use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::id::CallId;
use super::identity::Identity;

/// Lifecycle state of a call attempt
///
/// Transitions are strictly forward: pending -> active -> ended. Rejected,
/// cancelled and expired calls never reach `Active`; their records are
/// dropped while still pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Pending,
    Active,
    Ended,
}

impl CallStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Ended => "ended",
        }
    }
}

impl std::fmt::Display for CallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One call attempt or session.
///
/// `caller` is snapshotted at initiation, `receiver` only once the invited
/// user accepts. Until then the invitation is addressed purely by
/// `receiver_username`; nothing checks that such a user exists.
#[derive(Debug, Clone, Serialize)]
pub struct CallRecord {
    pub call_id: CallId,
    pub caller: Identity,
    pub receiver_username: String,
    pub receiver: Option<Identity>,
    pub channel_name: String,
    pub status: CallStatus,
    pub started_at: DateTime<Utc>,
    pub ring_deadline: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

impl CallRecord {
    /// Create a fresh pending record ringing `receiver_username`.
    #[must_use]
    pub fn new(caller: Identity, receiver_username: String, ring_ttl: Duration) -> Self {
        let call_id = CallId::new();
        let channel_name = format!("call_{call_id}");
        let started_at = Utc::now();

        Self {
            call_id,
            caller,
            receiver_username,
            receiver: None,
            channel_name,
            status: CallStatus::Pending,
            started_at,
            ring_deadline: started_at + ring_ttl,
            accepted_at: None,
            ended_at: None,
            duration_ms: None,
        }
    }

    /// Attach the accepting user and move the record to active.
    pub fn accept(&mut self, receiver: Identity) {
        self.receiver = Some(receiver);
        self.status = CallStatus::Active;
        self.accepted_at = Some(Utc::now());
    }

    /// Close the record, stamping the wall-clock duration of the attempt.
    pub fn finish(&mut self) {
        let ended_at = Utc::now();
        self.status = CallStatus::Ended;
        self.ended_at = Some(ended_at);
        self.duration_ms = Some((ended_at - self.started_at).num_milliseconds());
    }

    /// True once a pending record has rung past its deadline.
    #[must_use]
    pub fn ring_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == CallStatus::Pending && now > self.ring_deadline
    }

    #[must_use]
    pub fn is_caller(&self, actor: &Identity) -> bool {
        self.caller.id == actor.id
    }

    /// True for the receiver snapshot attached on acceptance.
    #[must_use]
    pub fn is_receiver(&self, actor: &Identity) -> bool {
        self.receiver
            .as_ref()
            .is_some_and(|receiver| receiver.id == actor.id)
    }

    /// True for the user the pending invitation is addressed to.
    #[must_use]
    pub fn is_invited(&self, actor: &Identity) -> bool {
        self.receiver_username == actor.username
    }
}
