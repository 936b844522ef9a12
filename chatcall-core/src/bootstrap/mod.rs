//! Process startup: resolve configuration, then build the service graph
//! the binary hands to the API layer.

pub mod config;
pub mod services;

pub use config::load_config;
pub use services::{init_services, Services};
