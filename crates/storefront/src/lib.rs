//! Naked Pineapple Checkout library.
//!
//! Keeps a one-product storefront's three views of an order in agreement:
//! the client-side cart, the commerce platform's order state machine and the
//! payment processor's payment lifecycle.
//!
//! # Modules
//!
//! - [`commerce`] - Shop and Admin API clients for the commerce platform
//! - [`payment`] - Embedded payment widgets, hosted checkout sessions, webhook signatures
//! - [`cart`] - Optimistic cart engine reconciled against the active order
//! - [`checkout`] - Contact → Shipping → Payment → Confirmed state machine
//! - [`reconciler`] - Records processor payments against orders
//! - [`routes`] - Webhook and checkout session HTTP endpoints

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod checkout;
pub mod commerce;
pub mod config;
pub mod error;
pub mod middleware;
pub mod payment;
pub mod reconciler;
pub mod routes;
pub mod state;
pub mod storage;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
