// ChatCall API Library
//
// Provides the HTTP/JSON and WebSocket API surface for ChatCall

pub mod http;

// Re-export commonly used types
pub use http::AppState;
