// ChatCall Client Library
//
// Client-side building blocks for embedding 1:1 video calls in the chat
// application:
// - signaling: bearer-authenticated REST client for the call service
// - engine: the seam to the media provider's SDK (tracks, channels, events)
// - driver: the call state machine that a UI renders from

// Shared error type for signaling requests
pub mod error;

// REST signaling client
pub mod signaling;

// Media engine seam
pub mod engine;

// Call state machine
pub mod driver;

// Re-export the types a UI integration touches
pub use driver::{CallDriver, CallView, DriverError};
pub use engine::{EngineError, EngineEvent, LocalTracks, MediaEngine, TrackKind};
pub use error::ClientError;
pub use signaling::{CallHandle, CallStatusInfo, Signaling, SignalingClient, TokenGrant};
