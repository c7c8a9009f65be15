use url::Url;

use crate::error::Error;
use crate::identity::{ClientIdentity, Propagation};

/// Client configuration, passed explicitly into [`SessionClient::new`](crate::SessionClient::new).
///
/// Required fields are constructor parameters; everything else has a
/// default and a `with_*` override.
///
/// ```rust,ignore
/// use openauthster::ClientConfig;
///
/// let config = ClientConfig::new(
///     "https://auth.example.com".parse()?,
///     "acme",
///     "https://app.example.com/callback".parse()?,
/// )
/// .with_copy_id("spring-sale");
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ClientConfig {
    pub(crate) issuer: Url,
    pub(crate) client_id: String,
    pub(crate) copy_id: Option<String>,
    pub(crate) redirect_uri: Url,
    pub(crate) user_id: Option<String>,
    pub(crate) secret: Option<String>,
    pub(crate) propagation: Propagation,
    pub(crate) token: Option<String>,
    pub(crate) refresh_token: Option<String>,
    pub(crate) scopes: Vec<String>,
}

impl ClientConfig {
    #[must_use]
    pub fn new(issuer: Url, client_id: impl Into<String>, redirect_uri: Url) -> Self {
        Self {
            issuer,
            client_id: client_id.into(),
            copy_id: None,
            redirect_uri,
            user_id: None,
            secret: None,
            propagation: Propagation::default(),
            token: None,
            refresh_token: None,
            scopes: Vec::new(),
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `OPENAUTH_ISSUER`: issuer base URL
    /// - `OPENAUTH_CLIENT_ID`: base client ID
    /// - `OPENAUTH_REDIRECT_URI`: OAuth2 callback URI
    ///
    /// # Optional env vars
    /// - `OPENAUTH_COPY_ID`: copy template variant
    /// - `OPENAUTH_CLIENT_SECRET`: server-side secret for private session data
    /// - `OPENAUTH_PROPAGATION`: `embedded`, `header` or `cookie`
    /// - `OPENAUTH_SCOPES`: comma-separated scopes
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a required var is missing or a value is invalid.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| Error::Config(format!("{key} is required")))
        };
        let parse_url = |key: &str, raw: String| {
            raw.parse::<Url>()
                .map_err(|e| Error::Config(format!("{key}: {e}")))
        };

        let issuer = parse_url("OPENAUTH_ISSUER", required("OPENAUTH_ISSUER")?)?;
        let client_id = required("OPENAUTH_CLIENT_ID")?;
        let redirect_uri = parse_url("OPENAUTH_REDIRECT_URI", required("OPENAUTH_REDIRECT_URI")?)?;

        let mut config = Self::new(issuer, client_id, redirect_uri);

        if let Some(copy_id) = lookup("OPENAUTH_COPY_ID") {
            config = config.with_copy_id(copy_id);
        }
        if let Some(secret) = lookup("OPENAUTH_CLIENT_SECRET").filter(|s| !s.is_empty()) {
            config = config.with_secret(secret);
        }
        if let Some(mode) = lookup("OPENAUTH_PROPAGATION") {
            config = config.with_propagation(mode.parse()?);
        }
        if let Some(scopes) = lookup("OPENAUTH_SCOPES") {
            config = config.with_scopes(
                scopes
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_owned)
                    .collect(),
            );
        }

        Ok(config)
    }

    #[must_use]
    pub fn with_copy_id(mut self, copy_id: impl Into<String>) -> Self {
        self.copy_id = Some(copy_id.into()).filter(|c| !c.is_empty());
        self
    }

    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Server-side only: sent as `X-Client-Secret`, required for private data.
    #[must_use]
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    #[must_use]
    pub fn with_propagation(mut self, propagation: Propagation) -> Self {
        self.propagation = propagation;
        self
    }

    /// Tokens to start from instead of the stored ones.
    #[must_use]
    pub fn with_tokens(mut self, token: Option<String>, refresh_token: Option<String>) -> Self {
        self.token = token;
        self.refresh_token = refresh_token;
        self
    }

    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    #[must_use]
    pub fn issuer(&self) -> &Url {
        &self.issuer
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn copy_id(&self) -> Option<&str> {
        self.copy_id.as_deref()
    }

    #[must_use]
    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    #[must_use]
    pub fn propagation(&self) -> Propagation {
        self.propagation
    }

    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Composite identity derived from the client ID and copy ID.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidClientId`] if the client ID contains `::`.
    pub fn identity(&self) -> Result<ClientIdentity, Error> {
        ClientIdentity::new(self.client_id.clone(), self.copy_id.clone())
    }

    /// `{issuer}{path}` without doubling the slash.
    pub(crate) fn issuer_endpoint(&self, path: &str) -> Result<Url, Error> {
        let base = self.issuer.as_str().trim_end_matches('/');
        format!("{base}{path}")
            .parse()
            .map_err(|e| Error::Config(format!("issuer endpoint {path}: {e}")))
    }
}
