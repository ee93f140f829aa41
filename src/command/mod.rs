//! Command execution for the servo service
//!
//! This module handles:
//! - Mapping decoded requests onto the command translator
//! - Running hardware calls off the async runtime
//! - Turning outcomes into replies

mod executor;

pub use executor::CommandExecutor;
