//! HTTP server for the Stockroom assignment engine and audit event feed.

pub mod bootstrap;
pub mod config;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod rate_limit;
pub mod realtime;
pub mod server;

pub use config::AppConfig;
pub use error::ApiError;
pub use server::{AppState, ServerBuilder, StockroomServer, build_app};
