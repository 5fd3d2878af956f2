//! HTTP middleware stack for storefront.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layers (capture errors, transactions)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. Rate limiting on `/api` (governor)

pub mod rate_limit;
pub mod request_id;

pub use rate_limit::{session_create_rate_limiter, session_lookup_rate_limiter};
pub use request_id::request_id_middleware;
