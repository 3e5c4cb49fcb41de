pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod realtime;
pub mod routes;
pub mod services;
pub mod state;

pub use client::{ConnectionStatus, RealtimeClient, RealtimeClientConfig};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use models::{EventKey, RealtimeMessage, RefreshCategory};
pub use realtime::{broadcaster::Broadcaster, notifier::Notifier, ConnectionRegistry};
pub use state::AppState;
