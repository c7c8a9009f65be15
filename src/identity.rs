use std::borrow::Cow;
use std::fmt;

use cookie::Cookie;
use reqwest::header::{COOKIE, HeaderMap, HeaderName, HeaderValue};
use url::Url;

use crate::error::Error;

/// Separator between the base client ID and the copy variant.
pub const DELIMITER: &str = "::";

/// Cookie carrying the base client ID.
pub const CLIENT_ID_COOKIE: &str = "oauth_client_id";

/// Cookie carrying the copy template (variant) ID.
pub const COPY_TEMPLATE_COOKIE: &str = "oauth_copy_template_id";

/// Header carrying the copy template (variant) ID.
pub const COPY_ID_HEADER: HeaderName = HeaderName::from_static("x-openauth-copy-id");

/// How the variant travels alongside the base client ID.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Propagation {
    /// `client_id=base::variant` on every request.
    #[default]
    Embedded,
    /// `client_id=base`, variant in the `X-OpenAuth-Copy-ID` header.
    Header,
    /// `client_id=base`, both pieces in the `oauth_*` cookie pair.
    Cookie,
}

impl std::str::FromStr for Propagation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "embedded" => Ok(Self::Embedded),
            "header" => Ok(Self::Header),
            "cookie" => Ok(Self::Cookie),
            other => Err(Error::Config(format!("unknown propagation mode: {other}"))),
        }
    }
}

/// Composite client identity: a base client ID plus an optional copy variant.
///
/// The base never contains [`DELIMITER`], so the encoded form
/// `base::variant` always decodes back to the same pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity {
    base: String,
    variant: Option<String>,
}

impl ClientIdentity {
    /// Build an identity, rejecting an empty base or one containing `::`.
    ///
    /// An empty variant is treated as no variant.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidClientId`] when the base is unusable.
    pub fn new(base: impl Into<String>, variant: Option<String>) -> Result<Self, Error> {
        let base = base.into();
        if base.is_empty() {
            return Err(Error::InvalidClientId("client ID is empty".into()));
        }
        if base.contains(DELIMITER) {
            return Err(Error::InvalidClientId(format!(
                "'{base}' contains the reserved delimiter '{DELIMITER}'"
            )));
        }
        Ok(Self {
            base,
            variant: variant.filter(|v| !v.is_empty()),
        })
    }

    /// Split an incoming `client_id` on the first `::`.
    ///
    /// No validation: whatever precedes the first delimiter is the base.
    #[must_use]
    pub fn decode(client_id: &str) -> Self {
        match client_id.split_once(DELIMITER) {
            Some((base, variant)) => Self {
                base: base.to_owned(),
                variant: (!variant.is_empty()).then(|| variant.to_owned()),
            },
            None => Self {
                base: client_id.to_owned(),
                variant: None,
            },
        }
    }

    /// Server-side resolution: keep the configured base and adopt the variant
    /// from the request's `client_id` query value, if any.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidClientId`] when `base` is unusable.
    pub fn for_server(base: impl Into<String>, incoming_client_id: Option<&str>) -> Result<Self, Error> {
        let variant = incoming_client_id.and_then(|id| Self::decode(id).variant);
        Self::new(base, variant)
    }

    /// Resolve the identity of an incoming request.
    ///
    /// Order: the `client_id` query parameter, then the `oauth_client_id`
    /// cookie with its variant taken from the `X-OpenAuth-Copy-ID` header or
    /// the `oauth_copy_template_id` cookie. Either source must yield a
    /// non-empty base; a `client_id` parameter that does not is rejected
    /// outright rather than falling back to cookies.
    #[must_use]
    pub fn from_request(query: Option<&str>, headers: &HeaderMap) -> Option<Self> {
        if let Some(client_id) = query.and_then(client_id_from_query) {
            let decoded = Self::decode(&client_id);
            return Self::new(decoded.base, decoded.variant).ok();
        }

        let cookies = request_cookies(headers);
        let cookie_value = |name: &str| {
            cookies
                .iter()
                .find(|c| c.name() == name)
                .map(|c| c.value().to_owned())
        };

        let base = cookie_value(CLIENT_ID_COOKIE)?;
        let variant = headers
            .get(&COPY_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
            .or_else(|| cookie_value(COPY_TEMPLATE_COOKIE));

        Self::new(base, variant).ok()
    }

    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    #[must_use]
    pub fn variant(&self) -> Option<&str> {
        self.variant.as_deref()
    }

    /// Same base, different variant.
    #[must_use]
    pub fn with_variant(&self, variant: Option<String>) -> Self {
        Self {
            base: self.base.clone(),
            variant: variant.filter(|v| !v.is_empty()),
        }
    }

    /// Composite form: `base` or `base::variant`.
    #[must_use]
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// The `client_id` to hand to the issuer under the given propagation mode.
    #[must_use]
    pub fn client_id(&self, propagation: Propagation) -> Cow<'_, str> {
        match propagation {
            Propagation::Embedded => Cow::Owned(self.encode()),
            Propagation::Header | Propagation::Cookie => Cow::Borrowed(&self.base),
        }
    }

    /// Attach the out-of-band pieces of the identity to an outgoing request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidClientId`] if a value cannot be carried in a header.
    pub fn apply_headers(&self, propagation: Propagation, headers: &mut HeaderMap) -> Result<(), Error> {
        match propagation {
            Propagation::Embedded => {}
            Propagation::Header => {
                if let Some(variant) = &self.variant {
                    headers.insert(COPY_ID_HEADER, header_value(variant)?);
                }
            }
            Propagation::Cookie => {
                let mut pairs = vec![Cookie::new(CLIENT_ID_COOKIE, self.base.as_str())
                    .encoded()
                    .to_string()];
                if let Some(variant) = &self.variant {
                    pairs.push(
                        Cookie::new(COPY_TEMPLATE_COOKIE, variant.as_str())
                            .encoded()
                            .to_string(),
                    );
                }
                headers.insert(COOKIE, header_value(&pairs.join("; "))?);
            }
        }
        Ok(())
    }

    /// Headers for [`apply_headers`](Self::apply_headers) as a fresh map.
    ///
    /// # Errors
    ///
    /// See [`apply_headers`](Self::apply_headers).
    pub fn headers(&self, propagation: Propagation) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        self.apply_headers(propagation, &mut headers)?;
        Ok(headers)
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.variant {
            Some(variant) => write!(f, "{}{DELIMITER}{variant}", self.base),
            None => f.write_str(&self.base),
        }
    }
}

fn header_value(value: &str) -> Result<HeaderValue, Error> {
    HeaderValue::from_str(value)
        .map_err(|_| Error::InvalidClientId(format!("'{value}' is not a valid header value")))
}

fn client_id_from_query(query: &str) -> Option<String> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == "client_id")
        .map(|(_, v)| v.into_owned())
}

/// Read the `client_id` query parameter of a full URL.
#[must_use]
pub fn client_id_from_url(url: &Url) -> Option<String> {
    url.query().and_then(client_id_from_query)
}

/// Every percent-decoded cookie across all `Cookie` headers; malformed pairs are skipped.
fn request_cookies(headers: &HeaderMap) -> Vec<Cookie<'static>> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|raw| Cookie::split_parse_encoded(raw.to_owned()))
        .filter_map(Result::ok)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_without_variant_is_base() {
        let id = ClientIdentity::new("acme", None).unwrap();
        assert_eq!(id.encode(), "acme");

        let id = ClientIdentity::new("acme", Some(String::new())).unwrap();
        assert_eq!(id.encode(), "acme");
        assert_eq!(id.variant(), None);
    }

    #[test]
    fn encode_decode_recovers_pair() {
        for (base, variant) in [
            ("acme", None),
            ("acme", Some("spring-sale")),
            ("a", Some("b::c")),
            ("tenant_42", Some("x")),
        ] {
            let id = ClientIdentity::new(base, variant.map(str::to_owned)).unwrap();
            let decoded = ClientIdentity::decode(&id.encode());
            assert_eq!(decoded, id, "roundtrip of {base:?}/{variant:?}");
        }
    }

    #[test]
    fn decode_without_delimiter_has_no_variant() {
        let id = ClientIdentity::decode("acme");
        assert_eq!(id.base(), "acme");
        assert_eq!(id.variant(), None);

        let id = ClientIdentity::decode("acme::");
        assert_eq!(id.variant(), None);
    }

    #[test]
    fn base_with_delimiter_is_rejected() {
        assert!(matches!(
            ClientIdentity::new("ac::me", None),
            Err(Error::InvalidClientId(_))
        ));
        assert!(ClientIdentity::new("", None).is_err());
    }

    #[test]
    fn client_id_depends_on_propagation() {
        let id = ClientIdentity::new("acme", Some("v1".into())).unwrap();
        assert_eq!(id.client_id(Propagation::Embedded), "acme::v1");
        assert_eq!(id.client_id(Propagation::Header), "acme");
        assert_eq!(id.client_id(Propagation::Cookie), "acme");
    }

    #[test]
    fn header_propagation_adds_copy_header() {
        let id = ClientIdentity::new("acme", Some("v1".into())).unwrap();
        let headers = id.headers(Propagation::Header).unwrap();
        assert_eq!(headers.get(&COPY_ID_HEADER).unwrap(), "v1");

        let plain = ClientIdentity::new("acme", None).unwrap();
        assert!(plain.headers(Propagation::Header).unwrap().is_empty());
        assert!(id.headers(Propagation::Embedded).unwrap().is_empty());
    }

    #[test]
    fn cookie_propagation_roundtrips_through_request_resolution() {
        let id = ClientIdentity::new("acme", Some("summer sale".into())).unwrap();
        let headers = id.headers(Propagation::Cookie).unwrap();
        assert_eq!(
            headers.get(COOKIE).unwrap(),
            "oauth_client_id=acme; oauth_copy_template_id=summer%20sale"
        );
        assert_eq!(ClientIdentity::from_request(None, &headers), Some(id));
    }

    #[test]
    fn header_propagation_resolves_with_client_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("oauth_client_id=acme"));
        headers.insert(COPY_ID_HEADER, HeaderValue::from_static("v2"));

        let id = ClientIdentity::from_request(None, &headers).unwrap();
        assert_eq!(id.base(), "acme");
        assert_eq!(id.variant(), Some("v2"));
    }

    #[test]
    fn query_takes_precedence_over_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("oauth_client_id=other"));

        let id = ClientIdentity::from_request(Some("client_id=acme%3A%3Av3&code=x"), &headers)
            .unwrap();
        assert_eq!(id.encode(), "acme::v3");
    }

    #[test]
    fn empty_query_base_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("oauth_client_id=acme"));

        assert_eq!(ClientIdentity::from_request(Some("client_id="), &HeaderMap::new()), None);
        assert_eq!(ClientIdentity::from_request(Some("client_id=%3A%3Av1"), &HeaderMap::new()), None);
        assert_eq!(ClientIdentity::from_request(Some("client_id="), &headers), None);
    }

    #[test]
    fn empty_cookie_base_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("oauth_client_id=; oauth_copy_template_id=v1"));
        assert_eq!(ClientIdentity::from_request(None, &headers), None);
    }

    #[test]
    fn cookie_values_are_percent_decoded_across_headers() {
        let id = ClientIdentity::new("acme;corp", Some("a=b c".into())).unwrap();
        let headers = id.headers(Propagation::Cookie).unwrap();
        assert_eq!(ClientIdentity::from_request(None, &headers), Some(id));

        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("theme=dark; oauth_client_id=acme"));
        headers.append(COOKIE, HeaderValue::from_static("oauth_copy_template_id=spring%20sale"));
        let id = ClientIdentity::from_request(None, &headers).unwrap();
        assert_eq!(id.encode(), "acme::spring sale");
    }

    #[test]
    fn request_without_identity_resolves_to_none() {
        assert_eq!(ClientIdentity::from_request(Some("code=x"), &HeaderMap::new()), None);
    }

    #[test]
    fn server_keeps_configured_base() {
        let id = ClientIdentity::for_server("acme", Some("spoofed::v9")).unwrap();
        assert_eq!(id.encode(), "acme::v9");

        let id = ClientIdentity::for_server("acme", Some("acme")).unwrap();
        assert_eq!(id.variant(), None);

        let id = ClientIdentity::for_server("acme", None).unwrap();
        assert_eq!(id.encode(), "acme");
    }

    #[test]
    fn client_id_from_url_reads_query() {
        let url: Url = "https://auth.example.com/authorize?client_id=acme%3A%3Av1"
            .parse()
            .unwrap();
        assert_eq!(client_id_from_url(&url).as_deref(), Some("acme::v1"));
    }

    #[test]
    fn propagation_parses_from_str() {
        assert_eq!("Header".parse::<Propagation>().unwrap(), Propagation::Header);
        assert_eq!("cookie".parse::<Propagation>().unwrap(), Propagation::Cookie);
        assert!("bogus".parse::<Propagation>().is_err());
    }
}
