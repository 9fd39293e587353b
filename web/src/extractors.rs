//! Custom Axum extractors.
//!
//! - [`Caller`]: the signed-in user, from the `X-User-Id` / `X-User-Email`
//!   headers set by the authenticating proxy in front of this service
//! - [`CorrelationId`]: the id assigned by
//!   [`correlation_id_layer`](crate::middleware::correlation_id_layer)
//!
//! ```ignore
//! async fn handler(caller: Caller, CorrelationId(id): CorrelationId) -> String {
//!     format!("{} in request {id}", caller.id())
//! }
//! ```

use crate::error::AppError;
use axum::{async_trait, extract::FromRequestParts};
use http::{HeaderMap, request::Parts};
use marketplace_core::environment::{Identity, IdentityProvider};
use marketplace_core::types::UserId;
use uuid::Uuid;

/// Header carrying the caller's user id.
pub const USER_ID_HEADER: &str = "X-User-Id";

/// Header carrying the caller's login email.
pub const USER_EMAIL_HEADER: &str = "X-User-Email";

/// Identity read from request headers.
#[derive(Debug, Clone, Default)]
pub struct HeaderIdentity {
    identity: Option<Identity>,
}

impl HeaderIdentity {
    /// Read the identity headers. A missing or malformed id means anonymous.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|s| !s.is_empty())
        };

        let identity = header(USER_ID_HEADER)
            .and_then(|raw| raw.parse::<UserId>().ok())
            .map(|id| Identity {
                id,
                email: header(USER_EMAIL_HEADER).unwrap_or_default().to_string(),
            });
        Self { identity }
    }
}

impl IdentityProvider for HeaderIdentity {
    fn current_user(&self) -> Option<Identity> {
        self.identity.clone()
    }
}

/// The authenticated caller. Rejects anonymous requests with 401.
#[derive(Debug, Clone)]
pub struct Caller(pub Identity);

impl Caller {
    /// The caller's user id.
    #[must_use]
    pub const fn id(&self) -> UserId {
        self.0.id
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        HeaderIdentity::from_headers(&parts.headers)
            .current_user()
            .map(Self)
            .ok_or_else(|| AppError::unauthorized("sign in to continue"))
    }
}

/// Correlation ID for request tracing.
///
/// Reads the id stored by the correlation middleware; without the
/// middleware a fresh id is generated.
#[derive(Debug, Clone, Copy)]
pub struct CorrelationId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .extensions
            .get::<Uuid>()
            .copied()
            .unwrap_or_else(Uuid::new_v4);
        Ok(Self(id))
    }
}
