//! Axum helpers for servers sitting in front of an OpenAuth issuer.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use axum::{Router, routing::get};
//! use axum_extra::extract::CookieJar;
//! use openauthster::middleware::{RequestIdentity, identity_cookies};
//!
//! async fn authorize(RequestIdentity(identity): RequestIdentity, jar: CookieJar) -> CookieJar {
//!     let (base, copy) = identity_cookies(&identity, true);
//!     jar.add(base).add(copy)
//! }
//!
//! let app = Router::new().route("/authorize", get(authorize));
//! ```
//!
//! A request without any identity is answered with the fallback error page.

mod cookies;
mod error;
mod extractor;

pub use cookies::{clear_identity_cookies, identity_cookies};
pub use error::IdentityRejection;
pub use extractor::RequestIdentity;
