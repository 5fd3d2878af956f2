//! Naked Pineapple Checkout Core - Shared types library.
//!
//! This crate provides the domain types shared by the checkout components:
//! - `storefront` - Cart engine, checkout flow, webhook reconciler and HTTP server
//! - `integration-tests` - End-to-end reconciliation scenarios
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no HTTP
//! clients, no async. Every invariant that can be enforced by construction
//! (derived cart totals, one line per variant, tentative vs confirmed line ids)
//! is enforced here so the engines above cannot violate it.
//!
//! # Modules
//!
//! - [`types`] - Newtype ids, money, email, order states, cart items and snapshots

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
