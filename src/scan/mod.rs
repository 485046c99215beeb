pub mod types;
pub mod error;
pub mod models;
pub mod log;
pub mod control;
pub mod aggregator;
pub mod producer;
pub mod worker;
pub mod session;
pub mod manager;

#[cfg(test)]
pub(crate) mod mock;

pub use types::*;
pub use error::*;
pub use models::*;
pub use self::log::{LogBuffer, LogLine, SYSTEM_WORKER};
pub use control::StopCoordinator;
pub use manager::*;
