//! Command implementations.

pub mod account;
pub mod admin;
pub mod shop;

use sweetshop_storefront::AppError;
use sweetshop_storefront::api::ApiError;
use sweetshop_storefront::config::ConfigError;
use thiserror::Error;

/// Errors that end a command.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("Could not set up the API client: {0}")]
    Client(#[from] ApiError),

    #[error("{}", .0.user_message())]
    App(#[from] AppError),
}
