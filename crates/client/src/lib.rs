//! CribzConnect dashboard client core.
//!
//! Session management against the CribzConnect REST API and the realtime
//! push channel. UI layers build an [`AppContext`] once and run [`boot`].

pub mod api_client;
pub mod bookings;
pub mod boot;
pub mod config;
pub mod context;
pub mod error;
pub mod notify;
pub mod realtime;
pub mod retry;
pub mod session;
pub mod storage;
pub mod token;

pub use api_client::ApiClient;
pub use boot::{boot, BootOutcome, Navigator};
pub use config::ClientConfig;
pub use context::AppContext;
pub use error::SessionError;
pub use notify::{Banner, BannerCenter};
pub use realtime::{ConnectionState, RealtimeChannel};
pub use session::{Session, SessionManager};
