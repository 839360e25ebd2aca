//! Ossatura kernel: notification, plugin, and structure-registry core
//! for a modular content management system.

pub mod cache;
pub mod config;
pub mod db;
pub mod definitions;
pub mod error;
pub mod hook;
pub mod jobs;
pub mod middleware;
pub mod models;
pub mod notify;
pub mod plugin;
pub mod registry;
pub mod routes;
pub mod services;
pub mod state;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use state::AppState;
