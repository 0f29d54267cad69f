//! Sweet Shop storefront client.
//!
//! Everything a front end needs to run the shop against the remote
//! inventory API: a read-through catalog cache, the persisted cart and
//! session, optimistic inventory edits, and the three-step payment
//! handshake. The command-line front end in `sweetshop-cli` is a thin shell
//! around [`state::Storefront`].

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod config;
pub mod error;
pub mod optimistic;
pub mod persist;
pub mod session;
pub mod state;
pub mod stats;

pub use error::{AppError, Result};
pub use state::{Storefront, StorefrontOptions};
