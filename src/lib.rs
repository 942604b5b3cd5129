//! Shared household supplies: categorized inventory, restock notifications,
//! backups and share codes, served over HTTP with a live change feed.

pub mod attachments;
pub mod categories;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod error;
pub mod export;
pub mod household;
pub mod id;
pub mod import;
pub mod logging;
pub mod members;
pub mod migrate;
pub mod notifications;
pub mod notify;
pub mod realtime;
pub mod repo;
pub mod route_logging;
pub mod server;
pub mod session;
pub mod shopping_list;
pub mod slug;
pub mod state;
pub mod supplies;
pub mod time;
pub mod util;

pub use error::{AppError, AppResult, ErrorBody};
pub use logging::{init_logging, LoggingGuard};
