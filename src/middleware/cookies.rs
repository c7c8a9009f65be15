use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;

use crate::identity::{CLIENT_ID_COOKIE, COPY_TEMPLATE_COOKIE, ClientIdentity};

const IDENTITY_COOKIE_TTL: Duration = Duration::minutes(10);

/// Create the `oauth_client_id` + `oauth_copy_template_id` cookie pair.
///
/// Without a variant the copy cookie is a removal cookie, so a variant left
/// over from an earlier flow does not leak into this one.
#[must_use]
pub fn identity_cookies(
    identity: &ClientIdentity,
    secure: bool,
) -> (Cookie<'static>, Cookie<'static>) {
    let base = identity_cookie(CLIENT_ID_COOKIE, identity.base(), secure);
    let copy = match identity.variant() {
        Some(variant) => identity_cookie(COPY_TEMPLATE_COOKIE, variant, secure),
        None => removal_cookie(COPY_TEMPLATE_COOKIE),
    };
    (base, copy)
}

/// Create removal cookies for both identity cookies.
#[must_use]
pub fn clear_identity_cookies() -> (Cookie<'static>, Cookie<'static>) {
    (
        removal_cookie(CLIENT_ID_COOKIE),
        removal_cookie(COPY_TEMPLATE_COOKIE),
    )
}

fn identity_cookie(name: &'static str, value: &str, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value.to_string()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(IDENTITY_COOKIE_TTL)
        .build()
}

fn removal_cookie(name: &'static str) -> Cookie<'static> {
    Cookie::build((name, ""))
        .path("/")
        .max_age(Duration::ZERO)
        .build()
}
