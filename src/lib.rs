pub mod app;
pub mod auth;
pub mod compensation;
pub mod config;
pub mod conversion;
pub mod errors;
pub mod format;
pub mod gateway;
pub mod handlers;
pub mod models;
pub mod monitoring;
pub mod notifications;
pub mod registry;
pub mod session;
pub mod state;
pub mod stats;
pub mod storage;
pub mod tokenization;
pub mod ui;

pub use app::router;
pub use config::AppConfig;
pub use state::AppState;
