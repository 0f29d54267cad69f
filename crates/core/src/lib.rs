//! Sweet Shop Core - Shared types library.
//!
//! This crate provides common types used across all Sweet Shop components:
//! - `storefront` - Client library (catalog cache, cart, session, checkout)
//! - `cli` - Command-line front end
//!
//! # Architecture
//!
//! The core crate contains only types and validation - no I/O, no HTTP
//! clients, no persistence. This keeps it lightweight and allows it to be
//! used by both the client and any fake backend.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, emails, prices, roles, catalog and payment records

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
