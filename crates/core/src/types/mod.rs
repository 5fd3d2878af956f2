//! Core types for the Naked Pineapple checkout.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod cart;
pub mod email;
pub mod id;
pub mod money;
pub mod status;

pub use cart::{CartItem, CartItemError, CartSnapshot, LineId};
pub use email::{Email, EmailError};
pub use id::*;
pub use money::{CurrencyCode, Money};
pub use status::*;
