use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::models::{ConnectionId, Identity, UserId};

use super::events::CallEvent;

/// Sending half of a subscriber's event channel
pub type EventSender = mpsc::UnboundedSender<CallEvent>;

/// Where an event is aimed.
///
/// Ring notifications are addressed by login handle because the caller only
/// knows who they dialed; every other lifecycle event goes to a user id
/// recorded on the call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    User(UserId),
    Handle(String),
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{id}"),
            Self::Handle(handle) => write!(f, "handle:{handle}"),
        }
    }
}

/// One connection's registration under an address
#[derive(Debug, Clone)]
pub struct Subscriber {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
    pub sender: EventSender,
}

/// In-memory hub for routing call events to connected clients.
///
/// Each connection is registered under both of its identity's addresses, so
/// a single subscription hears invitations (addressed by handle) as well as
/// answers (addressed by user id). Delivery is at-most-once and
/// best-effort: offline users miss events, nothing is queued or retried.
#[derive(Clone)]
pub struct UserEventHub {
    /// Subscribers listening under each address
    addresses: Arc<DashMap<Address, Vec<Subscriber>>>,

    /// Connection id -> owning user and registered addresses, for cleanup
    connections: Arc<DashMap<ConnectionId, (UserId, Vec<Address>)>>,
}

impl UserEventHub {
    #[must_use]
    pub fn new() -> Self {
        Self {
            addresses: Arc::new(DashMap::new()),
            connections: Arc::new(DashMap::new()),
        }
    }

    /// Subscribe a client connection for the given identity
    /// Returns a receiver for events
    pub fn subscribe(
        &self,
        identity: &Identity,
        connection_id: ConnectionId,
    ) -> mpsc::UnboundedReceiver<CallEvent> {
        let (tx, rx) = mpsc::unbounded_channel();

        let registered = vec![
            Address::User(identity.id.clone()),
            Address::Handle(identity.username.clone()),
        ];

        for address in &registered {
            let subscriber = Subscriber {
                connection_id: connection_id.clone(),
                user_id: identity.id.clone(),
                sender: tx.clone(),
            };
            self.addresses
                .entry(address.clone())
                .or_default()
                .push(subscriber);
        }

        self.connections
            .insert(connection_id.clone(), (identity.id.clone(), registered));

        info!(
            user_id = %identity.id.as_str(),
            username = %identity.username,
            connection_id = %connection_id,
            "Client subscribed to call events"
        );

        rx
    }

    /// Unsubscribe a client connection from call events
    pub fn unsubscribe(&self, connection_id: &ConnectionId) {
        if let Some((_, (user_id, registered))) = self.connections.remove(connection_id) {
            for address in registered {
                if let Some(mut subscribers) = self.addresses.get_mut(&address) {
                    subscribers.retain(|sub| sub.connection_id != *connection_id);

                    if subscribers.is_empty() {
                        // The guard must drop before the entry is removed.
                        drop(subscribers);
                        self.addresses.remove(&address);
                        debug!(address = %address, "Last subscriber left, address dropped");
                    }
                }
            }

            info!(
                user_id = %user_id.as_str(),
                connection_id = %connection_id,
                "Client unsubscribed from call events"
            );
        } else {
            warn!(
                connection_id = %connection_id,
                "Unsubscribe for unknown connection ignored"
            );
        }
    }

    /// Deliver an event to every connection registered under an address.
    /// Returns the number of connections that took the event.
    pub fn notify(&self, address: &Address, event: CallEvent) -> usize {
        let mut delivered = 0;
        let mut dead = Vec::new();

        if let Some(subscribers) = self.addresses.get(address) {
            for subscriber in subscribers.iter() {
                if subscriber.sender.send(event.clone()).is_ok() {
                    delivered += 1;
                    debug!(
                        address = %address,
                        connection_id = %subscriber.connection_id,
                        event_type = %event.event_type(),
                        "Event delivered"
                    );
                } else {
                    warn!(
                        address = %address,
                        connection_id = %subscriber.connection_id,
                        "Subscriber channel closed, dropping connection"
                    );
                    dead.push(subscriber.connection_id.clone());
                }
            }
        }

        // The read guard is gone by here; unsubscribe takes write locks.
        for connection_id in dead {
            self.unsubscribe(&connection_id);
        }

        delivered
    }

    /// How many connections listen under an address
    #[must_use]
    pub fn subscriber_count(&self, address: &Address) -> usize {
        self.addresses
            .get(address)
            .map_or(0, |subscribers| subscribers.len())
    }

    /// How many connections are registered in total
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

impl Default for UserEventHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CallId;
    use chrono::Utc;

    fn identity(id: &str, username: &str) -> Identity {
        Identity {
            id: UserId::from_string(id.to_string()),
            username: username.to_string(),
            name: username.to_uppercase(),
            picture: None,
        }
    }

    fn ended_event() -> CallEvent {
        CallEvent::CallEnded {
            call_id: CallId::from_string("call123".to_string()),
            ended_by: "ada".to_string(),
            timestamp: Utc::now(),
        }
    }

    fn ring_event(caller: &Identity) -> CallEvent {
        CallEvent::IncomingCall {
            call_id: CallId::from_string("call123".to_string()),
            caller: caller.clone(),
            channel_name: "call_call123".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_subscribe_and_notify_by_user_id() {
        let hub = UserEventHub::new();
        let user = identity("user1", "ada");

        let mut rx = hub.subscribe(&user, ConnectionId::from_string("conn1".to_string()));
        assert_eq!(hub.connection_count(), 1);

        let sent = hub.notify(&Address::User(user.id.clone()), ended_event());
        assert_eq!(sent, 1);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_type(), "call_ended");
    }

    #[tokio::test]
    async fn test_notify_by_handle_rings_the_same_connection() {
        let hub = UserEventHub::new();
        let caller = identity("user1", "ada");
        let receiver = identity("user2", "grace");

        let mut rx = hub.subscribe(&receiver, ConnectionId::from_string("conn1".to_string()));

        let sent = hub.notify(&Address::Handle("grace".to_string()), ring_event(&caller));
        assert_eq!(sent, 1);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_type(), "incoming_call");
    }

    #[tokio::test]
    async fn test_unsubscribe_clears_both_addresses() {
        let hub = UserEventHub::new();
        let user = identity("user1", "ada");
        let conn = ConnectionId::from_string("conn1".to_string());

        let _rx = hub.subscribe(&user, conn.clone());
        assert_eq!(hub.subscriber_count(&Address::User(user.id.clone())), 1);
        assert_eq!(hub.subscriber_count(&Address::Handle("ada".to_string())), 1);

        hub.unsubscribe(&conn);
        assert_eq!(hub.subscriber_count(&Address::User(user.id.clone())), 0);
        assert_eq!(hub.subscriber_count(&Address::Handle("ada".to_string())), 0);
        assert_eq!(hub.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_notify_reaches_only_the_addressee() {
        let hub = UserEventHub::new();
        let user1 = identity("user1", "ada");
        let user2 = identity("user2", "grace");

        let mut rx1 = hub.subscribe(&user1, ConnectionId::from_string("conn1".to_string()));
        let mut rx2 = hub.subscribe(&user2, ConnectionId::from_string("conn2".to_string()));

        let sent = hub.notify(&Address::User(user1.id.clone()), ended_event());
        assert_eq!(sent, 1);

        let received = rx1.recv().await.unwrap();
        assert_eq!(received.event_type(), "call_ended");

        // Delivery into the channel is synchronous, so an empty queue here
        // means user2 was never addressed.
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_multiple_connections_per_user() {
        let hub = UserEventHub::new();
        let user = identity("user1", "ada");

        let mut rx1 = hub.subscribe(&user, ConnectionId::from_string("conn1".to_string()));
        let mut rx2 = hub.subscribe(&user, ConnectionId::from_string("conn2".to_string()));

        let sent = hub.notify(&Address::User(user.id.clone()), ended_event());
        assert_eq!(sent, 2);

        assert!(rx1.recv().await.is_some());
        assert!(rx2.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_dead_connection_pruned_on_notify() {
        let hub = UserEventHub::new();
        let user = identity("user1", "ada");

        let rx = hub.subscribe(&user, ConnectionId::from_string("conn1".to_string()));
        drop(rx);

        let sent = hub.notify(&Address::User(user.id.clone()), ended_event());
        assert_eq!(sent, 0);
        assert_eq!(hub.connection_count(), 0);
        assert_eq!(hub.subscriber_count(&Address::Handle("ada".to_string())), 0);
    }

    #[tokio::test]
    async fn test_notify_unknown_address_delivers_nothing() {
        let hub = UserEventHub::new();

        let sent = hub.notify(&Address::Handle("nobody".to_string()), ended_event());
        assert_eq!(sent, 0);
    }
}
