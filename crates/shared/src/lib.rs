//! Shared types for the CribzConnect dashboard client: REST wire models,
//! realtime events and the realtime frame codec.

pub mod error;
pub mod events;
pub mod models;
pub mod protocol;

pub use error::*;
pub use events::*;
pub use models::*;
pub use protocol::*;
