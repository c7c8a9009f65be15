use std::future::Future;

use serde::Deserialize;
use url::Url;

use crate::config::ClientConfig;
use crate::error::Error;
use crate::identity::{ClientIdentity, Propagation};
use crate::pkce::Challenge;

/// Authorization URL plus the challenge to persist until the callback.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct AuthorizationRequest {
    pub url: Url,
    pub challenge: Challenge,
}

impl AuthorizationRequest {
    #[must_use]
    pub fn new(url: Url, challenge: Challenge) -> Self {
        Self { url, challenge }
    }
}

/// Tokens issued by an exchange or refresh.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[non_exhaustive]
pub struct Tokens {
    #[serde(rename = "access_token")]
    pub access: String,
    #[serde(rename = "refresh_token", default)]
    pub refresh: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

impl Tokens {
    #[must_use]
    pub fn new(access: impl Into<String>, refresh: Option<String>, expires_in: Option<u64>) -> Self {
        Self {
            access: access.into(),
            refresh,
            expires_in,
        }
    }
}

/// The external issuer the session client drives.
///
/// Every call receives the client identity so implementations can shape
/// `client_id` and propagation headers per request.
pub trait Issuer: Send + Sync + 'static {
    /// Build an authorization URL (response type `code`) and its challenge.
    fn authorize(
        &self,
        identity: &ClientIdentity,
        redirect_uri: &Url,
    ) -> impl Future<Output = Result<AuthorizationRequest, Error>> + Send;

    /// Exchange an authorization code and PKCE verifier for tokens.
    fn exchange(
        &self,
        identity: &ClientIdentity,
        code: &str,
        redirect_uri: &Url,
        verifier: &str,
    ) -> impl Future<Output = Result<Tokens, Error>> + Send;

    /// Trade a refresh token for a new token set.
    fn refresh(
        &self,
        identity: &ClientIdentity,
        refresh_token: &str,
    ) -> impl Future<Output = Result<Tokens, Error>> + Send;
}

/// [`Issuer`] speaking to an OpenAuth issuer over HTTP.
#[derive(Debug, Clone)]
pub struct HttpIssuer {
    authorize_url: Url,
    token_url: Url,
    propagation: Propagation,
    scopes: Vec<String>,
    http: reqwest::Client,
}

impl HttpIssuer {
    /// Endpoints derived from the config's issuer: `/authorize` and `/token`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the issuer URL cannot be extended.
    pub fn new(config: &ClientConfig) -> Result<Self, Error> {
        Ok(Self {
            authorize_url: config.issuer_endpoint("/authorize")?,
            token_url: config.issuer_endpoint("/token")?,
            propagation: config.propagation,
            scopes: config.scopes.clone(),
            http: reqwest::Client::new(),
        })
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    async fn token_request(
        &self,
        identity: &ClientIdentity,
        params: &[(&str, &str)],
        operation: &'static str,
    ) -> Result<Tokens, Error> {
        let response = self
            .http
            .post(self.token_url.clone())
            .headers(identity.headers(self.propagation)?)
            .form(params)
            .send()
            .await?;

        let response = ensure_success(response, operation).await?;
        response.json::<Tokens>().await.map_err(Into::into)
    }
}

impl Issuer for HttpIssuer {
    async fn authorize(
        &self,
        identity: &ClientIdentity,
        redirect_uri: &Url,
    ) -> Result<AuthorizationRequest, Error> {
        let challenge = Challenge::generate();
        let code_challenge = challenge.code_challenge();

        let mut url = self.authorize_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &identity.client_id(self.propagation))
                .append_pair("redirect_uri", redirect_uri.as_str())
                .append_pair("response_type", "code")
                .append_pair("state", &challenge.state)
                .append_pair("code_challenge", &code_challenge)
                .append_pair("code_challenge_method", "S256");
            if !self.scopes.is_empty() {
                query.append_pair("scope", &self.scopes.join(" "));
            }
        }

        Ok(AuthorizationRequest::new(url, challenge))
    }

    async fn exchange(
        &self,
        identity: &ClientIdentity,
        code: &str,
        redirect_uri: &Url,
        verifier: &str,
    ) -> Result<Tokens, Error> {
        let client_id = identity.client_id(self.propagation);
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri.as_str()),
            ("client_id", client_id.as_ref()),
            ("code_verifier", verifier),
        ];
        self.token_request(identity, &params, "token exchange").await
    }

    async fn refresh(&self, identity: &ClientIdentity, refresh_token: &str) -> Result<Tokens, Error> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        self.token_request(identity, &params, "token refresh").await
    }
}

/// Checks HTTP response status; returns the response on success or an error with details.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
    operation: &'static str,
) -> Result<reqwest::Response, Error> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(Error::OAuth {
        operation,
        status: Some(status),
        detail: body,
    })
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn test_config(issuer: &str) -> ClientConfig {
        ClientConfig::new(
            issuer.parse().unwrap(),
            "acme",
            "https://app.example.com/callback".parse().unwrap(),
        )
    }

    fn query_value(url: &Url, key: &str) -> Option<String> {
        url.query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    #[tokio::test]
    async fn authorize_url_carries_composite_client_id_and_pkce() {
        let config = test_config("https://auth.example.com");
        let issuer = HttpIssuer::new(&config).unwrap();
        let identity = ClientIdentity::new("acme", Some("v1".into())).unwrap();

        let req = issuer.authorize(&identity, config.redirect_uri()).await.unwrap();

        assert_eq!(req.url.path(), "/authorize");
        assert_eq!(query_value(&req.url, "client_id").as_deref(), Some("acme::v1"));
        assert_eq!(query_value(&req.url, "response_type").as_deref(), Some("code"));
        assert_eq!(
            query_value(&req.url, "code_challenge_method").as_deref(),
            Some("S256")
        );
        assert_eq!(
            query_value(&req.url, "code_challenge"),
            Some(req.challenge.code_challenge())
        );
        assert_eq!(query_value(&req.url, "state"), Some(req.challenge.state.clone()));
        assert_eq!(query_value(&req.url, "scope"), None);
    }

    #[tokio::test]
    async fn authorize_with_header_propagation_sends_base_only() {
        let config = test_config("https://auth.example.com")
            .with_propagation(Propagation::Header)
            .with_scopes(vec!["openid".into(), "email".into()]);
        let issuer = HttpIssuer::new(&config).unwrap();
        let identity = ClientIdentity::new("acme", Some("v1".into())).unwrap();

        let req = issuer.authorize(&identity, config.redirect_uri()).await.unwrap();

        assert_eq!(query_value(&req.url, "client_id").as_deref(), Some("acme"));
        assert_eq!(query_value(&req.url, "scope").as_deref(), Some("openid email"));
    }

    #[tokio::test]
    async fn exchange_posts_code_and_verifier() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=the-code"))
            .and(body_string_contains("code_verifier=the-verifier"))
            .and(body_string_contains("client_id=acme%3A%3Av1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "acc",
                "refresh_token": "ref",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let config = test_config(&server.uri());
        let issuer = HttpIssuer::new(&config).unwrap();
        let identity = ClientIdentity::new("acme", Some("v1".into())).unwrap();

        let tokens = issuer
            .exchange(&identity, "the-code", config.redirect_uri(), "the-verifier")
            .await
            .unwrap();

        assert_eq!(tokens, Tokens::new("acc", Some("ref".into()), Some(3600)));
    }

    #[tokio::test]
    async fn refresh_attaches_copy_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(header("x-openauth-copy-id", "v1"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=ref"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"access_token": "acc2"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let config = test_config(&server.uri()).with_propagation(Propagation::Header);
        let issuer = HttpIssuer::new(&config).unwrap();
        let identity = ClientIdentity::new("acme", Some("v1".into())).unwrap();

        let tokens = issuer.refresh(&identity, "ref").await.unwrap();
        assert_eq!(tokens.access, "acc2");
        assert_eq!(tokens.refresh, None);
        assert_eq!(tokens.expires_in, None);
    }

    #[tokio::test]
    async fn token_endpoint_error_is_reported_with_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let config = test_config(&server.uri());
        let issuer = HttpIssuer::new(&config).unwrap();
        let identity = ClientIdentity::new("acme", None).unwrap();

        let err = issuer
            .exchange(&identity, "c", config.redirect_uri(), "v")
            .await
            .unwrap_err();
        match err {
            Error::OAuth {
                operation,
                status,
                detail,
            } => {
                assert_eq!(operation, "token exchange");
                assert_eq!(status, Some(400));
                assert_eq!(detail, "invalid_grant");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
