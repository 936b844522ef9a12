pub mod call;
pub mod id;
pub mod identity;

pub use call::{CallRecord, CallStatus};
pub use id::{generate_id, CallId, ConnectionId, UserId};
pub use identity::{ActorBrief, Identity};
