pub mod auth;
pub mod events;
pub mod hub;
pub mod registry;
pub mod token;

pub use auth::{Claims, JwtService};
pub use events::CallEvent;
pub use hub::{Address, UserEventHub};
pub use registry::{AcceptedCall, CallRegistry, CallStatusView, EndedCall, InitiatedCall};
pub use token::{ChannelRole, DecodedToken, MintedToken, RtcTokenService};
