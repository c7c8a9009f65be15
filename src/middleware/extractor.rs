use std::convert::Infallible;

use axum::extract::{FromRequestParts, OptionalFromRequestParts};
use axum::http::request::Parts;

use super::error::IdentityRejection;
use crate::identity::ClientIdentity;

/// Client identity of the incoming request.
///
/// Resolved from the `client_id` query parameter, falling back to the
/// identity cookies (variant from `X-OpenAuth-Copy-ID` first). Rejects with
/// the `invalid_request` error page when nothing identifies the client.
///
/// ```rust,ignore
/// async fn authorize(RequestIdentity(identity): RequestIdentity) -> String {
///     identity.encode()
/// }
///
/// // Optional: anonymous requests get `None` instead of the error page
/// async fn landing(identity: Option<RequestIdentity>) -> String {
///     identity.map(|RequestIdentity(id)| id.encode()).unwrap_or_default()
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestIdentity(pub ClientIdentity);

impl<S> FromRequestParts<S> for RequestIdentity
where
    S: Send + Sync,
{
    type Rejection = IdentityRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        resolve(parts).ok_or(IdentityRejection::MissingClientId)
    }
}

impl<S> OptionalFromRequestParts<S> for RequestIdentity
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(resolve(parts))
    }
}

fn resolve(parts: &Parts) -> Option<RequestIdentity> {
    let identity = ClientIdentity::from_request(parts.uri.query(), &parts.headers)?;
    tracing::debug!(client_id = %identity, "Resolved request identity");
    Some(RequestIdentity(identity))
}
