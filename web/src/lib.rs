//! Axum HTTP surface for the home-services marketplace.
//!
//! Handlers are thin: extract the caller and the request, call one
//! marketplace service, map the result to a response. All decisions live
//! in `marketplace-core`, all persistence in `marketplace-runtime`.
//!
//! # Request Flow
//!
//! 1. **Correlation id** assigned by [`correlation_id_layer`]
//! 2. **Caller** read from the `X-User-Id` / `X-User-Email` headers ([`Caller`])
//! 3. **Service call** on the shared [`Marketplace`](marketplace_runtime::Marketplace)
//! 4. **Errors** mapped to status codes by [`AppError`]
//!
//! # Example
//!
//! ```ignore
//! use marketplace_web::{AppState, marketplace_router};
//!
//! let app = marketplace_router(AppState::new(marketplace));
//! axum::serve(listener, app).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

// Re-export key types for convenience
pub use error::AppError;
pub use extractors::{Caller, CorrelationId, HeaderIdentity, USER_EMAIL_HEADER, USER_ID_HEADER};
pub use middleware::{CORRELATION_ID_HEADER, correlation_id_layer};
pub use router::marketplace_router;
pub use state::AppState;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
