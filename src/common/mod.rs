//! Common utilities and types shared across instance-bus

pub mod config;
pub mod error;
pub mod identity;

pub use config::{ExitPolicy, ManagerConfig, Mode};
pub use error::{Error, Result};
pub use identity::Identity;
