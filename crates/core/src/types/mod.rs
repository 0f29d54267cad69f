//! Core types for the Sweet Shop.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod payment;
pub mod price;
pub mod role;
pub mod sweet;
pub mod user;
pub mod validation;

pub use email::{Email, EmailError};
pub use id::*;
pub use payment::{PaymentOrder, PaymentProof, PurchaseReceipt};
pub use price::{CurrencyCode, Price};
pub use role::Role;
pub use sweet::{NewSweet, PriceRange, SearchFilter, Sweet, SweetUpdate};
pub use user::UserProfile;
pub use validation::{FieldError, ValidationErrors};
