//! Media engine seam
//!
//! The provider's SDK does the actual capture and transport. This trait is
//! the narrow boundary the call driver talks to, so the connect and teardown
//! choreography stays testable without hardware or a live gateway.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Which of the two tracks a 1:1 call carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// Handles to the acquired microphone and camera tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalTracks {
    pub audio_track_id: u64,
    pub video_track_id: u64,
}

/// Remote-side activity reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    /// A remote user started publishing a track
    UserPublished { uid: u32, kind: TrackKind },
    /// A remote user stopped publishing a track
    UserUnpublished { uid: u32, kind: TrackKind },
    /// A remote user left the channel
    UserLeft { uid: u32 },
}

/// Engine failures the UI has to tell apart
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The user or platform refused camera/microphone access
    #[error("Camera or microphone permission denied")]
    PermissionDenied,

    /// The provider's gateway could not be reached
    #[error("Cannot reach the media gateway")]
    GatewayUnreachable,

    #[error("Engine error: {0}")]
    Other(String),
}

/// The boundary to the media provider's SDK
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Request camera and microphone access and create the local tracks
    async fn acquire_tracks(&self) -> Result<LocalTracks, EngineError>;

    /// Join a channel with a minted token
    async fn join(
        &self,
        app_id: &str,
        channel_name: &str,
        token: &str,
        uid: u32,
    ) -> Result<(), EngineError>;

    /// Publish the local tracks into the joined channel
    async fn publish(&self, tracks: LocalTracks) -> Result<(), EngineError>;

    /// Subscribe to a track a remote user published
    async fn subscribe(&self, uid: u32, kind: TrackKind) -> Result<(), EngineError>;

    /// Drop the subscription to a remote user's track
    async fn unsubscribe(&self, uid: u32, kind: TrackKind) -> Result<(), EngineError>;

    /// Mute or unmute one of the local tracks
    async fn set_muted(&self, kind: TrackKind, muted: bool) -> Result<(), EngineError>;

    /// Close the local tracks and release their hardware
    async fn close_tracks(&self, tracks: LocalTracks) -> Result<(), EngineError>;

    /// Leave the channel. Safe to call when no channel was ever joined.
    async fn leave(&self) -> Result<(), EngineError>;

    /// Stream of remote-side events. Each call hands out a fresh receiver.
    fn events(&self) -> mpsc::UnboundedReceiver<EngineEvent>;
}
