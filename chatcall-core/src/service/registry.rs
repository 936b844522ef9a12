//! Call Lifecycle Registry
//!
//! Process-local registry of every in-flight call attempt. Both lifecycle
//! tables live behind a single lock so each operation is one atomic
//! transaction: concurrent accept/reject/end races on the same call id have
//! exactly one winner, and a call id is never visible in both tables.
//! Notifications always go out after the lock is released.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};

use crate::models::{CallId, CallRecord, CallStatus, Identity};
use crate::{Error, Result};

use super::events::CallEvent;
use super::hub::{Address, UserEventHub};

/// Response payload for a freshly initiated call
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiatedCall {
    pub call_id: CallId,
    pub channel_name: String,
}

/// Response payload for an accepted call
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedCall {
    pub call_id: CallId,
    pub channel_name: String,
}

/// Response payload for an ended call
#[derive(Debug, Clone, Serialize)]
pub struct EndedCall {
    /// Wall-clock lifetime of the call attempt in milliseconds
    #[serde(rename = "duration")]
    pub duration_ms: i64,
}

/// What a party is allowed to learn about a call's current state
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallStatusView {
    pub status: CallStatus,
    pub channel_name: String,
    #[serde(rename = "startTime")]
    pub started_at: DateTime<Utc>,
}

#[derive(Default)]
struct CallTables {
    pending: HashMap<CallId, CallRecord>,
    active: HashMap<CallId, CallRecord>,
}

/// In-memory call registry
///
/// Records live here and nowhere else: a process restart drops every
/// in-flight call. Pending records carry a ring deadline; expired ones are
/// evicted lazily on access and by the periodic sweep.
pub struct CallRegistry {
    tables: Mutex<CallTables>,
    hub: UserEventHub,
    pending_ttl: Duration,
}

impl CallRegistry {
    #[must_use]
    pub fn new(hub: UserEventHub, pending_ttl: Duration) -> Self {
        Self {
            tables: Mutex::new(CallTables::default()),
            hub,
            pending_ttl,
        }
    }

    /// Start ringing `receiver_username` on behalf of `caller`.
    ///
    /// The handle is not checked against any user store; dialing an unknown
    /// or offline user succeeds and simply rings nobody until the record
    /// expires.
    pub fn initiate(&self, caller: Identity, receiver_username: &str) -> Result<InitiatedCall> {
        if receiver_username.is_empty() {
            return Err(Error::InvalidInput("Receiver username is required".to_string()));
        }

        let record = CallRecord::new(caller, receiver_username.to_string(), self.pending_ttl);
        let initiated = InitiatedCall {
            call_id: record.call_id.clone(),
            channel_name: record.channel_name.clone(),
        };
        let ring = CallEvent::IncomingCall {
            call_id: record.call_id.clone(),
            caller: record.caller.clone(),
            channel_name: record.channel_name.clone(),
            timestamp: Utc::now(),
        };
        let address = Address::Handle(record.receiver_username.clone());

        info!(
            call_id = %record.call_id,
            caller = %record.caller.username,
            receiver = %record.receiver_username,
            "Call initiated"
        );

        {
            let mut tables = self.tables.lock();
            tables.pending.insert(record.call_id.clone(), record);
        }

        let delivered = self.hub.notify(&address, ring);
        debug!(call_id = %initiated.call_id, delivered, "Ring notification dispatched");

        Ok(initiated)
    }

    /// Answer a ringing call, attaching `receiver` and activating the record.
    pub fn accept(&self, receiver: Identity, call_id: &CallId) -> Result<AcceptedCall> {
        let now = Utc::now();
        let receiver_username = receiver.username.clone();

        let (result, notification) = {
            let mut tables = self.tables.lock();
            match tables.pending.remove(call_id) {
                None => (
                    Err(Error::NotFound("Call not found or already ended".to_string())),
                    None,
                ),
                Some(record) if record.ring_expired(now) => (
                    Err(Error::NotFound("Call not found or already ended".to_string())),
                    Some(expiry_notification(record)),
                ),
                Some(mut record) => {
                    record.accept(receiver.clone());
                    let accepted = AcceptedCall {
                        call_id: record.call_id.clone(),
                        channel_name: record.channel_name.clone(),
                    };
                    let notification = (
                        Address::User(record.caller.id.clone()),
                        CallEvent::CallAccepted {
                            call_id: record.call_id.clone(),
                            receiver,
                            channel_name: record.channel_name.clone(),
                            timestamp: Utc::now(),
                        },
                    );
                    tables.active.insert(call_id.clone(), record);
                    (Ok(accepted), Some(notification))
                }
            }
        };

        if let Some((address, event)) = notification {
            self.hub.notify(&address, event);
        }

        if let Ok(accepted) = &result {
            info!(call_id = %accepted.call_id, receiver = %receiver_username, "Call accepted");
        }
        result
    }

    /// Decline a ringing call.
    ///
    /// Only the invited user or the caller may do this; a caller-side
    /// reject is how an unanswered call gets cancelled. The record is left
    /// untouched when the actor is neither.
    pub fn reject(&self, actor: &Identity, call_id: &CallId) -> Result<()> {
        let now = Utc::now();

        let (result, notification) = {
            let mut tables = self.tables.lock();
            match tables.pending.remove(call_id) {
                None => (
                    Err(Error::NotFound("Call not found or already ended".to_string())),
                    None,
                ),
                Some(record) if record.ring_expired(now) => (
                    Err(Error::NotFound("Call not found or already ended".to_string())),
                    Some(expiry_notification(record)),
                ),
                Some(record) if !record.is_invited(actor) && !record.is_caller(actor) => {
                    tables.pending.insert(call_id.clone(), record);
                    (
                        Err(Error::Authorization("You are not part of this call".to_string())),
                        None,
                    )
                }
                Some(record) => {
                    // The declined side hears about it, whichever side acted.
                    let address = if record.is_caller(actor) {
                        Address::Handle(record.receiver_username.clone())
                    } else {
                        Address::User(record.caller.id.clone())
                    };
                    let notification = (
                        address,
                        CallEvent::CallRejected {
                            call_id: record.call_id.clone(),
                            receiver: actor.brief(),
                            timestamp: Utc::now(),
                        },
                    );
                    (Ok(()), Some(notification))
                }
            }
        };

        if let Some((address, event)) = notification {
            self.hub.notify(&address, event);
        }

        if result.is_ok() {
            info!(call_id = %call_id, actor = %actor.username, "Call rejected");
        }
        result
    }

    /// Hang up an active call, reporting how long it ran.
    pub fn end(&self, actor: &Identity, call_id: &CallId) -> Result<EndedCall> {
        let (result, notification) = {
            let mut tables = self.tables.lock();
            match tables.active.remove(call_id) {
                None => (
                    Err(Error::NotFound("Active call not found".to_string())),
                    None,
                ),
                Some(record) if !record.is_caller(actor) && !record.is_receiver(actor) => {
                    tables.active.insert(call_id.clone(), record);
                    (
                        Err(Error::Authorization("You are not part of this call".to_string())),
                        None,
                    )
                }
                Some(mut record) => {
                    record.finish();
                    let ended = EndedCall {
                        duration_ms: record.duration_ms.unwrap_or_default(),
                    };
                    let other_party = if record.is_caller(actor) {
                        record.receiver.as_ref().map(|r| r.id.clone())
                    } else {
                        Some(record.caller.id.clone())
                    };
                    let notification = other_party.map(|user_id| {
                        (
                            Address::User(user_id),
                            CallEvent::CallEnded {
                                call_id: record.call_id.clone(),
                                ended_by: actor.username.clone(),
                                timestamp: Utc::now(),
                            },
                        )
                    });
                    (Ok(ended), notification)
                }
            }
        };

        if let Some((address, event)) = notification {
            self.hub.notify(&address, event);
        }

        if let Ok(ended) = &result {
            info!(
                call_id = %call_id,
                actor = %actor.username,
                duration_ms = ended.duration_ms,
                "Call ended"
            );
        }
        result
    }

    /// Report a call's state to one of its parties.
    ///
    /// Strangers get the same answer as an unknown call id, so the endpoint
    /// leaks nothing about calls the requester is not part of. A pending
    /// call is only visible to its caller; the invited user learns about it
    /// through the ring notification instead.
    pub fn status(&self, requester: &Identity, call_id: &CallId) -> Result<CallStatusView> {
        let now = Utc::now();
        let not_found = || Error::NotFound("Call not found".to_string());

        let (result, notification) = {
            let mut tables = self.tables.lock();

            if let Some(record) = tables.active.get(call_id) {
                if record.is_caller(requester) || record.is_receiver(requester) {
                    (Ok(status_view(record)), None)
                } else {
                    (Err(not_found()), None)
                }
            } else if tables
                .pending
                .get(call_id)
                .is_some_and(|record| record.ring_expired(now))
            {
                match tables.pending.remove(call_id) {
                    Some(record) => (Err(not_found()), Some(expiry_notification(record))),
                    None => (Err(not_found()), None),
                }
            } else if let Some(record) = tables.pending.get(call_id) {
                if record.is_caller(requester) {
                    (Ok(status_view(record)), None)
                } else {
                    (Err(not_found()), None)
                }
            } else {
                (Err(not_found()), None)
            }
        };

        if let Some((address, event)) = notification {
            self.hub.notify(&address, event);
        }

        result
    }

    /// Evict every pending call that rang past its deadline.
    /// Returns how many records were dropped.
    pub fn sweep_expired(&self) -> usize {
        let now = Utc::now();

        let expired: Vec<CallRecord> = {
            let mut tables = self.tables.lock();
            let expired_ids: Vec<CallId> = tables
                .pending
                .iter()
                .filter(|(_, record)| record.ring_expired(now))
                .map(|(call_id, _)| call_id.clone())
                .collect();
            expired_ids
                .iter()
                .filter_map(|call_id| tables.pending.remove(call_id))
                .collect()
        };

        let count = expired.len();
        for record in expired {
            info!(
                call_id = %record.call_id,
                caller = %record.caller.username,
                "Unanswered call expired"
            );
            self.hub.notify(
                &Address::User(record.caller.id.clone()),
                CallEvent::CallExpired {
                    call_id: record.call_id,
                    timestamp: Utc::now(),
                },
            );
        }

        count
    }

    /// Number of calls currently ringing
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.tables.lock().pending.len()
    }

    /// Number of calls currently connected
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.tables.lock().active.len()
    }

    #[must_use]
    pub fn is_pending(&self, call_id: &CallId) -> bool {
        self.tables.lock().pending.contains_key(call_id)
    }

    #[must_use]
    pub fn is_active(&self, call_id: &CallId) -> bool {
        self.tables.lock().active.contains_key(call_id)
    }
}

fn status_view(record: &CallRecord) -> CallStatusView {
    CallStatusView {
        status: record.status,
        channel_name: record.channel_name.clone(),
        started_at: record.started_at,
    }
}

/// Eviction notice for a pending record that rang past its deadline.
/// The caller is the one told; the ringing side already has its own timeout.
fn expiry_notification(record: CallRecord) -> (Address, CallEvent) {
    (
        Address::User(record.caller.id.clone()),
        CallEvent::CallExpired {
            call_id: record.call_id,
            timestamp: Utc::now(),
        },
    )
}
