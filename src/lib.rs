pub mod config;
pub mod core;
pub mod error;
pub mod log;
pub mod util;

// Coordinator, workers and transport
pub mod net;
pub mod system;

// Problem domains
pub mod tasks;

pub use error::{Error, Result};
