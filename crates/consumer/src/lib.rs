//! Consumer side of the event choreography.
//!
//! - [`EventHandler`] is the contract for processing delivered events
//! - [`ConsumerLoop`] subscribes a group and feeds handlers until shut down
//! - [`ShutdownHandle`] stops a running loop from another task

pub mod error;
pub mod handler;
pub mod processor;
pub mod shutdown;

pub use error::{ConsumerError, HandlerError, Result};
pub use handler::{EventHandler, HandlerSet};
pub use processor::{ConsumerConfig, ConsumerLoop, ConsumerState, ConsumerStats};
pub use shutdown::ShutdownHandle;
