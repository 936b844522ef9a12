//! Call state machine
//!
//! Owns the connect and teardown choreography around the signaling client
//! and the media engine, and publishes an observable [`CallView`] for the
//! UI to render. The chat application owns the notification socket; it
//! decodes frames into `CallEvent`s and forwards them into [`CallDriver::run`].

use std::sync::Arc;

use rand::RngExt;
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use chatcall_core::models::{CallId, Identity};
use chatcall_core::service::CallEvent;

use crate::engine::{EngineError, EngineEvent, LocalTracks, MediaEngine, TrackKind};
use crate::error::ClientError;
use crate::signaling::Signaling;

/// What the call UI should render right now
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallView {
    /// No call activity
    Idle,

    /// Someone is ringing; waiting for the user to answer or decline
    Ringing { call_id: CallId, caller: Identity },

    /// No provider app id is configured; calls cannot run at all
    MissingConfig,

    /// Camera or microphone access was refused
    PermissionDenied,

    /// The provider's gateway or the call service could not be reached
    GatewayError,

    /// Joining the call's channel
    Connecting,

    /// In the call. 1:1 calls show at most one remote participant.
    Connected { remote: Option<u32> },
}

/// Why a driver action could not run
#[derive(Debug, Error)]
pub enum DriverError {
    /// The embedding application has no provider app id configured
    #[error("Video calling is not configured")]
    NotConfigured,

    /// There is no ringing call to answer or decline
    #[error("No ringing call")]
    NoPendingCall,

    /// There is no call in progress
    #[error("No call in progress")]
    NoActiveCall,

    /// A call is already in progress
    #[error("Already in a call")]
    AlreadyInCall,

    #[error(transparent)]
    Signaling(#[from] ClientError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Live engine session for one call
struct Session {
    call_id: CallId,
    channel_name: String,
    tracks: Option<LocalTracks>,
    pump: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct DriverState {
    session: Option<Session>,
    /// Ringing call waiting for the user's answer
    invite: Option<CallId>,
}

/// Drives one user's call lifecycle against the service and the engine.
///
/// Every action runs under one lock, held across the engine awaits, so
/// connects and teardowns never interleave. Hardware release happens on
/// every exit path: connect failures, hangups, and remote-side endings all
/// funnel through the same disposal.
pub struct CallDriver {
    signaling: Arc<dyn Signaling>,
    engine: Arc<dyn MediaEngine>,
    /// Provider app id from the embedding application's configuration.
    /// Empty means calling is not set up; the token response carries the
    /// authoritative id used to join.
    app_id: String,
    view_tx: Arc<watch::Sender<CallView>>,
    state: Mutex<DriverState>,
}

impl CallDriver {
    pub fn new(
        signaling: Arc<dyn Signaling>,
        engine: Arc<dyn MediaEngine>,
        app_id: impl Into<String>,
    ) -> Self {
        let (view_tx, _) = watch::channel(CallView::Idle);

        Self {
            signaling,
            engine,
            app_id: app_id.into(),
            view_tx: Arc::new(view_tx),
            state: Mutex::new(DriverState::default()),
        }
    }

    /// Subscribe to view updates. The receiver always holds the latest view.
    #[must_use]
    pub fn watch_view(&self) -> watch::Receiver<CallView> {
        self.view_tx.subscribe()
    }

    /// Ring another user and join the call's channel.
    ///
    /// The caller joins immediately and waits in the channel while the
    /// other side rings; the remote feed appears once they pick up and
    /// publish.
    pub async fn place_call(&self, receiver_username: &str) -> Result<CallId, DriverError> {
        let mut state = self.state.lock().await;

        if self.app_id.is_empty() {
            self.view_tx.send_replace(CallView::MissingConfig);
            return Err(DriverError::NotConfigured);
        }
        if state.session.is_some() {
            return Err(DriverError::AlreadyInCall);
        }

        let handle = self.signaling.initiate(receiver_username).await?;
        let call_id = handle.call_id.clone();
        info!(call_id = %call_id, "Placed call");

        self.connect(&mut state, handle.call_id, handle.channel_name)
            .await?;
        Ok(call_id)
    }

    /// Pick up the ringing call and join its channel
    pub async fn answer(&self) -> Result<CallId, DriverError> {
        let mut state = self.state.lock().await;

        let Some(invite) = state.invite.take() else {
            return Err(DriverError::NoPendingCall);
        };

        if self.app_id.is_empty() {
            self.view_tx.send_replace(CallView::MissingConfig);
            return Err(DriverError::NotConfigured);
        }

        let handle = match self.signaling.accept(&invite).await {
            Ok(handle) => handle,
            // Most likely the ring expired or the caller hung up first
            Err(err) => {
                self.view_tx.send_replace(CallView::Idle);
                return Err(err.into());
            }
        };

        let call_id = handle.call_id.clone();
        info!(call_id = %call_id, "Answered call");

        self.connect(&mut state, handle.call_id, handle.channel_name)
            .await?;
        Ok(call_id)
    }

    /// Turn down the ringing call
    pub async fn decline(&self) -> Result<(), DriverError> {
        let mut state = self.state.lock().await;

        let Some(invite) = state.invite.take() else {
            return Err(DriverError::NoPendingCall);
        };

        self.view_tx.send_replace(CallView::Idle);
        self.signaling.reject(&invite).await?;
        info!(call_id = %invite, "Declined call");
        Ok(())
    }

    /// Leave the call and tell the service.
    ///
    /// A call that is still ringing has no active record to end, so a
    /// NotFound from `end` falls back to cancelling via `reject`. Local
    /// cleanup runs regardless of what the service answers.
    pub async fn hang_up(&self) {
        let mut state = self.state.lock().await;

        let Some(session) = state.session.take() else {
            return;
        };

        match self.signaling.end(&session.call_id).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {
                if let Err(err) = self.signaling.reject(&session.call_id).await {
                    debug!(call_id = %session.call_id, "Failed to cancel ringing call: {err}");
                }
            }
            Err(err) => debug!(call_id = %session.call_id, "Failed to end call: {err}"),
        }

        self.dispose(session).await;
        self.view_tx.send_replace(CallView::Idle);
    }

    /// Mute or unmute one of the local tracks mid-call
    pub async fn set_muted(&self, kind: TrackKind, muted: bool) -> Result<(), DriverError> {
        let state = self.state.lock().await;

        if state.session.is_none() {
            return Err(DriverError::NoActiveCall);
        }

        self.engine.set_muted(kind, muted).await?;
        Ok(())
    }

    /// Drive the state machine from call notifications.
    ///
    /// Runs until the channel closes.
    pub async fn run(&self, mut notifications: mpsc::UnboundedReceiver<CallEvent>) {
        while let Some(event) = notifications.recv().await {
            self.handle_notification(event).await;
        }
        debug!("Notification channel closed; call driver loop exiting");
    }

    async fn handle_notification(&self, event: CallEvent) {
        match event {
            CallEvent::IncomingCall {
                call_id, caller, ..
            } => {
                let mut state = self.state.lock().await;
                if state.session.is_some() || state.invite.is_some() {
                    debug!(call_id = %call_id, "Ignoring incoming call while busy");
                    return;
                }
                state.invite = Some(call_id.clone());
                self.view_tx
                    .send_replace(CallView::Ringing { call_id, caller });
            }

            CallEvent::CallAccepted {
                call_id, receiver, ..
            } => {
                // The caller is already in the channel; the remote feed
                // shows up through engine events once the receiver publishes
                info!(call_id = %call_id, receiver = %receiver.username, "Call accepted");
            }

            CallEvent::CallRejected { call_id, .. } | CallEvent::CallEnded { call_id, .. } => {
                self.close_if_current(&call_id).await;
            }

            CallEvent::CallExpired { call_id, .. } => {
                let mut state = self.state.lock().await;
                if state.invite.as_ref() == Some(&call_id) {
                    state.invite = None;
                    self.view_tx.send_replace(CallView::Idle);
                    return;
                }
                if let Some(session) = state
                    .session
                    .take_if(|session| session.call_id == call_id)
                {
                    self.dispose(session).await;
                    self.view_tx.send_replace(CallView::Idle);
                }
            }
        }
    }

    /// Tear down the session if the event is about the call we are in
    async fn close_if_current(&self, call_id: &CallId) {
        let mut state = self.state.lock().await;

        let Some(session) = state
            .session
            .take_if(|session| session.call_id == *call_id)
        else {
            return;
        };

        self.dispose(session).await;
        self.view_tx.send_replace(CallView::Idle);
    }

    async fn connect(
        &self,
        state: &mut DriverState,
        call_id: CallId,
        channel_name: String,
    ) -> Result<(), DriverError> {
        self.view_tx.send_replace(CallView::Connecting);

        let mut session = Session {
            call_id,
            channel_name,
            tracks: None,
            pump: None,
        };

        match self.join_and_publish(&mut session).await {
            Ok(()) => {
                session.pump = Some(self.spawn_event_pump());
                state.session = Some(session);
                self.view_tx
                    .send_replace(CallView::Connected { remote: None });
                Ok(())
            }
            Err(err) => {
                self.dispose(session).await;
                self.view_tx.send_replace(match &err {
                    DriverError::Engine(EngineError::PermissionDenied) => {
                        CallView::PermissionDenied
                    }
                    _ => CallView::GatewayError,
                });
                Err(err)
            }
        }
    }

    async fn join_and_publish(&self, session: &mut Session) -> Result<(), DriverError> {
        let tracks = self.engine.acquire_tracks().await?;
        session.tracks = Some(tracks);

        // Channel uids are picked at random per join; the service accepts
        // whatever uid the client minted its token for
        let uid = rand::rng().random_range(0..10_000);
        let grant = self
            .signaling
            .mint_token(&session.channel_name, uid)
            .await?;

        self.engine
            .join(&grant.app_id, &session.channel_name, &grant.token, uid)
            .await?;
        self.engine.publish(tracks).await?;
        Ok(())
    }

    /// Tear down a session: stop the event pump, close the local tracks,
    /// and leave the channel. Errors are logged and swallowed so cleanup
    /// always finishes.
    async fn dispose(&self, session: Session) {
        if let Some(pump) = session.pump {
            pump.abort();
            // Make sure the pump cannot publish a stale view after this
            let _ = pump.await;
        }

        if let Some(tracks) = session.tracks {
            if let Err(err) = self.engine.close_tracks(tracks).await {
                warn!("Failed to close local tracks: {err}");
            }
        }

        if let Err(err) = self.engine.leave().await {
            warn!("Failed to leave channel: {err}");
        }
    }

    /// Forward engine events into subscriptions and view updates.
    ///
    /// 1:1 calls carry at most one remote participant, so the view keeps a
    /// single optional uid.
    fn spawn_event_pump(&self) -> JoinHandle<()> {
        let mut events = self.engine.events();
        let engine = Arc::clone(&self.engine);
        let view_tx = Arc::clone(&self.view_tx);

        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    EngineEvent::UserPublished { uid, kind } => {
                        if let Err(err) = engine.subscribe(uid, kind).await {
                            warn!(uid, "Failed to subscribe to remote track: {err}");
                            continue;
                        }
                        if kind == TrackKind::Video {
                            view_tx.send_replace(CallView::Connected { remote: Some(uid) });
                        }
                    }
                    EngineEvent::UserUnpublished { uid, kind } => {
                        if let Err(err) = engine.unsubscribe(uid, kind).await {
                            debug!(uid, "Failed to unsubscribe from remote track: {err}");
                        }
                        if kind == TrackKind::Video {
                            view_tx.send_replace(CallView::Connected { remote: None });
                        }
                    }
                    EngineEvent::UserLeft { uid } => {
                        debug!(uid, "Remote user left the channel");
                        view_tx.send_replace(CallView::Connected { remote: None });
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use mockall::predicate::eq;
    use tokio::sync::Notify;

    use chatcall_core::models::UserId;

    use crate::engine::MockMediaEngine;
    use crate::signaling::{CallHandle, MockSignaling, TokenGrant};

    const APP_ID: &str = "970ca35de60c44645bbae8a215061b33";

    fn caller_identity() -> Identity {
        Identity {
            id: UserId::from_string("u1".to_string()),
            username: "ada".to_string(),
            name: "Ada Lovelace".to_string(),
            picture: None,
        }
    }

    fn tracks() -> LocalTracks {
        LocalTracks {
            audio_track_id: 1,
            video_track_id: 2,
        }
    }

    fn handle(raw: &str) -> CallHandle {
        CallHandle {
            call_id: CallId::from_string(raw.to_string()),
            channel_name: format!("call_{raw}"),
        }
    }

    fn grant_for(channel: &str, uid: u32) -> TokenGrant {
        TokenGrant {
            token: "007token".to_string(),
            app_id: APP_ID.to_string(),
            channel_name: channel.to_string(),
            uid,
        }
    }

    fn driver(signaling: MockSignaling, engine: MockMediaEngine) -> CallDriver {
        CallDriver::new(Arc::new(signaling), Arc::new(engine), APP_ID)
    }

    /// Wire up a signaling mock for the initiate-then-connect happy path
    fn happy_signaling() -> MockSignaling {
        let mut signaling = MockSignaling::new();
        signaling
            .expect_initiate()
            .returning(|_| Ok(handle("abc")));
        signaling
            .expect_mint_token()
            .returning(|channel, uid| Ok(grant_for(channel, uid)));
        signaling
    }

    /// Wire up an engine mock that connects cleanly with no remote events
    fn happy_engine() -> MockMediaEngine {
        let mut engine = MockMediaEngine::new();
        engine.expect_acquire_tracks().returning(|| Ok(tracks()));
        engine.expect_join().returning(|_, _, _, _| Ok(()));
        engine.expect_publish().returning(|_| Ok(()));
        engine
            .expect_events()
            .returning(|| mpsc::unbounded_channel().1);
        engine
    }

    async fn wait_for_view(view: &mut watch::Receiver<CallView>, want: CallView) {
        tokio::time::timeout(Duration::from_secs(5), view.wait_for(|v| *v == want))
            .await
            .expect("timed out waiting for view update")
            .expect("view channel closed");
    }

    #[tokio::test]
    async fn test_place_call_connects_and_publishes() {
        let mut signaling = MockSignaling::new();
        signaling
            .expect_initiate()
            .withf(|username| username == "grace")
            .times(1)
            .returning(|_| Ok(handle("abc")));
        signaling
            .expect_mint_token()
            .withf(|channel, uid| channel == "call_abc" && *uid < 10_000)
            .times(1)
            .returning(|channel, uid| Ok(grant_for(channel, uid)));

        let mut engine = MockMediaEngine::new();
        engine
            .expect_acquire_tracks()
            .times(1)
            .returning(|| Ok(tracks()));
        engine
            .expect_join()
            .withf(|app_id, channel, token, uid| {
                app_id == APP_ID && channel == "call_abc" && token == "007token" && *uid < 10_000
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        engine
            .expect_publish()
            .with(eq(tracks()))
            .times(1)
            .returning(|_| Ok(()));
        engine
            .expect_events()
            .returning(|| mpsc::unbounded_channel().1);

        let driver = driver(signaling, engine);
        let mut view = driver.watch_view();

        let call_id = driver.place_call("grace").await.unwrap();

        assert_eq!(call_id.as_str(), "abc");
        assert_eq!(
            *view.borrow_and_update(),
            CallView::Connected { remote: None }
        );
    }

    #[tokio::test]
    async fn test_missing_app_id_blocks_before_any_request() {
        let mut signaling = MockSignaling::new();
        signaling.expect_initiate().times(0);
        let mut engine = MockMediaEngine::new();
        engine.expect_acquire_tracks().times(0);

        let driver = CallDriver::new(Arc::new(signaling), Arc::new(engine), "");
        let mut view = driver.watch_view();

        let err = driver.place_call("grace").await.unwrap_err();

        assert!(matches!(err, DriverError::NotConfigured));
        assert_eq!(*view.borrow_and_update(), CallView::MissingConfig);
    }

    #[tokio::test]
    async fn test_permission_denied_reports_and_leaves() {
        let mut signaling = MockSignaling::new();
        signaling
            .expect_initiate()
            .returning(|_| Ok(handle("abc")));
        signaling.expect_mint_token().times(0);

        let mut engine = MockMediaEngine::new();
        engine
            .expect_acquire_tracks()
            .times(1)
            .returning(|| Err(EngineError::PermissionDenied));
        engine.expect_close_tracks().times(0);
        engine.expect_leave().times(1).returning(|| Ok(()));

        let driver = driver(signaling, engine);
        let mut view = driver.watch_view();

        let err = driver.place_call("grace").await.unwrap_err();

        assert!(matches!(
            err,
            DriverError::Engine(EngineError::PermissionDenied)
        ));
        assert_eq!(*view.borrow_and_update(), CallView::PermissionDenied);
    }

    #[tokio::test]
    async fn test_join_failure_releases_tracks_and_reports_gateway() {
        let signaling = happy_signaling();

        let mut engine = MockMediaEngine::new();
        engine
            .expect_acquire_tracks()
            .times(1)
            .returning(|| Ok(tracks()));
        engine
            .expect_join()
            .times(1)
            .returning(|_, _, _, _| Err(EngineError::GatewayUnreachable));
        engine.expect_publish().times(0);
        engine
            .expect_close_tracks()
            .with(eq(tracks()))
            .times(1)
            .returning(|_| Ok(()));
        engine.expect_leave().times(1).returning(|| Ok(()));

        let driver = driver(signaling, engine);
        let mut view = driver.watch_view();

        let err = driver.place_call("grace").await.unwrap_err();

        assert!(matches!(
            err,
            DriverError::Engine(EngineError::GatewayUnreachable)
        ));
        assert_eq!(*view.borrow_and_update(), CallView::GatewayError);
    }

    #[tokio::test]
    async fn test_token_failure_releases_tracks() {
        let mut signaling = MockSignaling::new();
        signaling
            .expect_initiate()
            .returning(|_| Ok(handle("abc")));
        signaling.expect_mint_token().times(1).returning(|_, _| {
            Err(ClientError::Api {
                status: 500,
                message: "Failed to generate token".to_string(),
            })
        });

        let mut engine = MockMediaEngine::new();
        engine
            .expect_acquire_tracks()
            .times(1)
            .returning(|| Ok(tracks()));
        engine.expect_join().times(0);
        engine
            .expect_close_tracks()
            .times(1)
            .returning(|_| Ok(()));
        engine.expect_leave().times(1).returning(|| Ok(()));

        let driver = driver(signaling, engine);
        let mut view = driver.watch_view();

        let err = driver.place_call("grace").await.unwrap_err();

        assert!(matches!(err, DriverError::Signaling(_)));
        assert_eq!(*view.borrow_and_update(), CallView::GatewayError);
    }

    #[tokio::test]
    async fn test_hang_up_ends_call_and_releases_hardware() {
        let mut signaling = happy_signaling();
        signaling
            .expect_end()
            .withf(|call_id| call_id.as_str() == "abc")
            .times(1)
            .returning(|_| Ok(()));

        let mut engine = happy_engine();
        engine
            .expect_close_tracks()
            .with(eq(tracks()))
            .times(1)
            .returning(|_| Ok(()));
        engine.expect_leave().times(1).returning(|| Ok(()));

        let driver = driver(signaling, engine);
        let mut view = driver.watch_view();

        driver.place_call("grace").await.unwrap();
        driver.hang_up().await;

        assert_eq!(*view.borrow_and_update(), CallView::Idle);
    }

    #[tokio::test]
    async fn test_hang_up_is_idempotent() {
        let mut signaling = happy_signaling();
        signaling.expect_end().times(1).returning(|_| Ok(()));

        let mut engine = happy_engine();
        engine
            .expect_close_tracks()
            .times(1)
            .returning(|_| Ok(()));
        engine.expect_leave().times(1).returning(|| Ok(()));

        let driver = driver(signaling, engine);

        driver.place_call("grace").await.unwrap();
        driver.hang_up().await;
        driver.hang_up().await;
    }

    #[tokio::test]
    async fn test_hang_up_while_ringing_cancels_the_call() {
        let mut signaling = happy_signaling();
        signaling.expect_end().times(1).returning(|_| {
            Err(ClientError::Api {
                status: 404,
                message: "Active call not found".to_string(),
            })
        });
        signaling
            .expect_reject()
            .withf(|call_id| call_id.as_str() == "abc")
            .times(1)
            .returning(|_| Ok(()));

        let mut engine = happy_engine();
        engine
            .expect_close_tracks()
            .times(1)
            .returning(|_| Ok(()));
        engine.expect_leave().times(1).returning(|| Ok(()));

        let driver = driver(signaling, engine);
        let mut view = driver.watch_view();

        driver.place_call("grace").await.unwrap();
        driver.hang_up().await;

        assert_eq!(*view.borrow_and_update(), CallView::Idle);
    }

    #[tokio::test]
    async fn test_place_call_refuses_while_in_a_call() {
        let mut signaling = MockSignaling::new();
        signaling
            .expect_initiate()
            .times(1)
            .returning(|_| Ok(handle("abc")));
        signaling
            .expect_mint_token()
            .returning(|channel, uid| Ok(grant_for(channel, uid)));

        let engine = happy_engine();

        let driver = driver(signaling, engine);
        driver.place_call("grace").await.unwrap();

        let err = driver.place_call("lin").await.unwrap_err();
        assert!(matches!(err, DriverError::AlreadyInCall));
    }

    #[tokio::test]
    async fn test_view_is_connecting_until_join_completes() {
        /// Engine stub whose join waits until the test releases it
        struct GatedEngine {
            join_gate: Arc<Notify>,
        }

        #[async_trait]
        impl MediaEngine for GatedEngine {
            async fn acquire_tracks(&self) -> Result<LocalTracks, EngineError> {
                Ok(tracks())
            }

            async fn join(
                &self,
                _app_id: &str,
                _channel_name: &str,
                _token: &str,
                _uid: u32,
            ) -> Result<(), EngineError> {
                self.join_gate.notified().await;
                Ok(())
            }

            async fn publish(&self, _tracks: LocalTracks) -> Result<(), EngineError> {
                Ok(())
            }

            async fn subscribe(&self, _uid: u32, _kind: TrackKind) -> Result<(), EngineError> {
                Ok(())
            }

            async fn unsubscribe(&self, _uid: u32, _kind: TrackKind) -> Result<(), EngineError> {
                Ok(())
            }

            async fn set_muted(&self, _kind: TrackKind, _muted: bool) -> Result<(), EngineError> {
                Ok(())
            }

            async fn close_tracks(&self, _tracks: LocalTracks) -> Result<(), EngineError> {
                Ok(())
            }

            async fn leave(&self) -> Result<(), EngineError> {
                Ok(())
            }

            fn events(&self) -> mpsc::UnboundedReceiver<EngineEvent> {
                mpsc::unbounded_channel().1
            }
        }

        let signaling = happy_signaling();
        let join_gate = Arc::new(Notify::new());
        let engine = GatedEngine {
            join_gate: Arc::clone(&join_gate),
        };

        let driver = Arc::new(CallDriver::new(
            Arc::new(signaling),
            Arc::new(engine),
            APP_ID,
        ));
        let mut view = driver.watch_view();

        let placing = tokio::spawn({
            let driver = Arc::clone(&driver);
            async move { driver.place_call("grace").await }
        });

        wait_for_view(&mut view, CallView::Connecting).await;
        join_gate.notify_one();

        placing.await.unwrap().unwrap();
        assert_eq!(
            *view.borrow_and_update(),
            CallView::Connected { remote: None }
        );
    }

    #[tokio::test]
    async fn test_remote_feed_follows_engine_events() {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let signaling = happy_signaling();

        let mut engine = MockMediaEngine::new();
        engine.expect_acquire_tracks().returning(|| Ok(tracks()));
        engine.expect_join().returning(|_, _, _, _| Ok(()));
        engine.expect_publish().returning(|_| Ok(()));
        engine.expect_events().return_once(move || event_rx);
        engine
            .expect_subscribe()
            .withf(|uid, kind| *uid == 7 && *kind == TrackKind::Video)
            .times(1)
            .returning(|_, _| Ok(()));

        let driver = driver(signaling, engine);
        let mut view = driver.watch_view();

        driver.place_call("grace").await.unwrap();

        event_tx
            .send(EngineEvent::UserPublished {
                uid: 7,
                kind: TrackKind::Video,
            })
            .unwrap();
        wait_for_view(&mut view, CallView::Connected { remote: Some(7) }).await;

        event_tx.send(EngineEvent::UserLeft { uid: 7 }).unwrap();
        wait_for_view(&mut view, CallView::Connected { remote: None }).await;
    }

    #[tokio::test]
    async fn test_incoming_call_rings_and_answer_connects() {
        let mut signaling = MockSignaling::new();
        signaling
            .expect_accept()
            .withf(|call_id| call_id.as_str() == "abc")
            .times(1)
            .returning(|_| Ok(handle("abc")));
        signaling
            .expect_mint_token()
            .returning(|channel, uid| Ok(grant_for(channel, uid)));

        let engine = happy_engine();

        let driver = Arc::new(driver(signaling, engine));
        let mut view = driver.watch_view();

        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let runner = tokio::spawn({
            let driver = Arc::clone(&driver);
            async move { driver.run(notify_rx).await }
        });

        notify_tx
            .send(CallEvent::IncomingCall {
                call_id: CallId::from_string("abc".to_string()),
                caller: caller_identity(),
                channel_name: "call_abc".to_string(),
                timestamp: Utc::now(),
            })
            .unwrap();

        wait_for_view(
            &mut view,
            CallView::Ringing {
                call_id: CallId::from_string("abc".to_string()),
                caller: caller_identity(),
            },
        )
        .await;

        driver.answer().await.unwrap();
        assert_eq!(
            *view.borrow_and_update(),
            CallView::Connected { remote: None }
        );

        drop(notify_tx);
        runner.await.unwrap();
    }

    #[tokio::test]
    async fn test_decline_rejects_the_invitation() {
        let mut signaling = MockSignaling::new();
        signaling
            .expect_reject()
            .withf(|call_id| call_id.as_str() == "abc")
            .times(1)
            .returning(|_| Ok(()));

        let engine = MockMediaEngine::new();

        let driver = Arc::new(driver(signaling, engine));
        let mut view = driver.watch_view();

        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let runner = tokio::spawn({
            let driver = Arc::clone(&driver);
            async move { driver.run(notify_rx).await }
        });

        notify_tx
            .send(CallEvent::IncomingCall {
                call_id: CallId::from_string("abc".to_string()),
                caller: caller_identity(),
                channel_name: "call_abc".to_string(),
                timestamp: Utc::now(),
            })
            .unwrap();

        wait_for_view(
            &mut view,
            CallView::Ringing {
                call_id: CallId::from_string("abc".to_string()),
                caller: caller_identity(),
            },
        )
        .await;

        driver.decline().await.unwrap();
        assert_eq!(*view.borrow_and_update(), CallView::Idle);

        drop(notify_tx);
        runner.await.unwrap();
    }

    #[tokio::test]
    async fn test_remote_hangup_notification_tears_down() {
        let mut signaling = happy_signaling();
        // The other side ended the call; we must not call end ourselves
        signaling.expect_end().times(0);

        let mut engine = happy_engine();
        engine
            .expect_close_tracks()
            .times(1)
            .returning(|_| Ok(()));
        engine.expect_leave().times(1).returning(|| Ok(()));

        let driver = Arc::new(driver(signaling, engine));
        let mut view = driver.watch_view();

        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let runner = tokio::spawn({
            let driver = Arc::clone(&driver);
            async move { driver.run(notify_rx).await }
        });

        driver.place_call("grace").await.unwrap();

        notify_tx
            .send(CallEvent::CallEnded {
                call_id: CallId::from_string("abc".to_string()),
                ended_by: "grace".to_string(),
                timestamp: Utc::now(),
            })
            .unwrap();

        wait_for_view(&mut view, CallView::Idle).await;

        drop(notify_tx);
        runner.await.unwrap();
    }

    #[tokio::test]
    async fn test_second_incoming_call_is_ignored_while_busy() {
        let mut signaling = happy_signaling();
        signaling.expect_end().times(0);

        let mut engine = happy_engine();
        engine
            .expect_close_tracks()
            .times(1)
            .returning(|_| Ok(()));
        engine.expect_leave().times(1).returning(|| Ok(()));

        let driver = Arc::new(driver(signaling, engine));
        let mut view = driver.watch_view();

        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let runner = tokio::spawn({
            let driver = Arc::clone(&driver);
            async move { driver.run(notify_rx).await }
        });

        driver.place_call("grace").await.unwrap();

        // Ignored while in a call, then the active call ends
        notify_tx
            .send(CallEvent::IncomingCall {
                call_id: CallId::from_string("other".to_string()),
                caller: caller_identity(),
                channel_name: "call_other".to_string(),
                timestamp: Utc::now(),
            })
            .unwrap();
        notify_tx
            .send(CallEvent::CallEnded {
                call_id: CallId::from_string("abc".to_string()),
                ended_by: "grace".to_string(),
                timestamp: Utc::now(),
            })
            .unwrap();

        wait_for_view(&mut view, CallView::Idle).await;

        // The while-busy invitation was dropped, not parked
        let err = driver.answer().await.unwrap_err();
        assert!(matches!(err, DriverError::NoPendingCall));

        drop(notify_tx);
        runner.await.unwrap();
    }

    #[tokio::test]
    async fn test_expired_invitation_clears_the_ring() {
        let signaling = MockSignaling::new();
        let engine = MockMediaEngine::new();

        let driver = Arc::new(driver(signaling, engine));
        let mut view = driver.watch_view();

        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let runner = tokio::spawn({
            let driver = Arc::clone(&driver);
            async move { driver.run(notify_rx).await }
        });

        notify_tx
            .send(CallEvent::IncomingCall {
                call_id: CallId::from_string("abc".to_string()),
                caller: caller_identity(),
                channel_name: "call_abc".to_string(),
                timestamp: Utc::now(),
            })
            .unwrap();

        wait_for_view(
            &mut view,
            CallView::Ringing {
                call_id: CallId::from_string("abc".to_string()),
                caller: caller_identity(),
            },
        )
        .await;

        notify_tx
            .send(CallEvent::CallExpired {
                call_id: CallId::from_string("abc".to_string()),
                timestamp: Utc::now(),
            })
            .unwrap();

        wait_for_view(&mut view, CallView::Idle).await;

        let err = driver.answer().await.unwrap_err();
        assert!(matches!(err, DriverError::NoPendingCall));

        drop(notify_tx);
        runner.await.unwrap();
    }

    #[tokio::test]
    async fn test_set_muted_forwards_to_engine() {
        let signaling = happy_signaling();

        let mut engine = happy_engine();
        engine
            .expect_set_muted()
            .withf(|kind, muted| *kind == TrackKind::Audio && *muted)
            .times(1)
            .returning(|_, _| Ok(()));

        let driver = driver(signaling, engine);

        driver.place_call("grace").await.unwrap();
        driver.set_muted(TrackKind::Audio, true).await.unwrap();
    }

    #[tokio::test]
    async fn test_set_muted_without_call_is_an_error() {
        let driver = driver(MockSignaling::new(), MockMediaEngine::new());

        let err = driver.set_muted(TrackKind::Video, true).await.unwrap_err();
        assert!(matches!(err, DriverError::NoActiveCall));
    }
}
