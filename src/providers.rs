//! Identity provider catalogue: static metadata for the admin UI and the
//! per-project provider configuration stored with each project.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "lowercase")]
#[display(rename_all = "lowercase")]
pub enum ProviderType {
    Code,
    Oidc,
    Oauth,
    Apple,
    X,
    Slack,
    Yahoo,
    Google,
    Github,
    Twitch,
    Spotify,
    Cognito,
    Discord,
    Facebook,
    Keycloak,
    Password,
    Microsoft,
    Jumpcloud,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderCategory {
    Social,
    Enterprise,
    Custom,
    Form,
}

/// Display metadata for one provider kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderMeta {
    #[serde(rename = "type")]
    pub kind: ProviderType,
    pub name: &'static str,
    pub category: ProviderCategory,
    pub icon: &'static str,
    pub description: &'static str,
    pub required_fields: &'static [&'static str],
    pub optional_fields: &'static [&'static str],
}

const CLIENT_CREDENTIALS: &[&str] = &["clientID", "clientSecret"];
const SCOPES: &[&str] = &["scopes"];

const fn oauth2(
    kind: ProviderType,
    name: &'static str,
    category: ProviderCategory,
    icon: &'static str,
    description: &'static str,
) -> ProviderMeta {
    ProviderMeta {
        kind,
        name,
        category,
        icon,
        description,
        required_fields: CLIENT_CREDENTIALS,
        optional_fields: SCOPES,
    }
}

pub static PROVIDER_REGISTRY: &[ProviderMeta] = &[
    // Social
    oauth2(ProviderType::Google, "Google", ProviderCategory::Social, "🔵", "Sign in with Google OAuth2"),
    oauth2(ProviderType::Github, "GitHub", ProviderCategory::Social, "⚫", "Sign in with GitHub OAuth2"),
    oauth2(ProviderType::Discord, "Discord", ProviderCategory::Social, "💜", "Sign in with Discord OAuth2"),
    oauth2(ProviderType::X, "X (Twitter)", ProviderCategory::Social, "✖️", "Sign in with X OAuth2"),
    oauth2(ProviderType::Facebook, "Facebook", ProviderCategory::Social, "📘", "Sign in with Facebook OAuth2"),
    oauth2(ProviderType::Apple, "Apple", ProviderCategory::Social, "🍎", "Sign in with Apple"),
    oauth2(ProviderType::Slack, "Slack", ProviderCategory::Social, "💬", "Sign in with Slack OAuth2"),
    oauth2(ProviderType::Spotify, "Spotify", ProviderCategory::Social, "🎵", "Sign in with Spotify OAuth2"),
    oauth2(ProviderType::Twitch, "Twitch", ProviderCategory::Social, "🎮", "Sign in with Twitch OAuth2"),
    oauth2(ProviderType::Yahoo, "Yahoo", ProviderCategory::Social, "🟣", "Sign in with Yahoo OAuth2"),
    // Enterprise
    oauth2(ProviderType::Microsoft, "Microsoft", ProviderCategory::Enterprise, "🪟", "Sign in with Microsoft Azure AD"),
    oauth2(ProviderType::Cognito, "AWS Cognito", ProviderCategory::Enterprise, "☁️", "Sign in with AWS Cognito"),
    ProviderMeta {
        kind: ProviderType::Keycloak,
        name: "Keycloak",
        category: ProviderCategory::Enterprise,
        icon: "🔐",
        description: "Sign in with Keycloak",
        required_fields: &["clientID", "clientSecret", "realm", "baseUrl"],
        optional_fields: SCOPES,
    },
    oauth2(ProviderType::Jumpcloud, "JumpCloud", ProviderCategory::Enterprise, "☁️", "Sign in with JumpCloud"),
    // Custom
    ProviderMeta {
        kind: ProviderType::Oidc,
        name: "Custom OIDC",
        category: ProviderCategory::Custom,
        icon: "🔗",
        description: "Connect to any OIDC provider",
        required_fields: &["clientID", "issuer"],
        optional_fields: &["scopes", "query"],
    },
    ProviderMeta {
        kind: ProviderType::Oauth,
        name: "Custom OAuth2",
        category: ProviderCategory::Custom,
        icon: "🔑",
        description: "Connect to any OAuth2 provider",
        required_fields: &["clientID", "clientSecret", "authorizationEndpoint", "tokenEndpoint"],
        optional_fields: &["jwksEndpoint", "scopes", "query"],
    },
    // Form
    ProviderMeta {
        kind: ProviderType::Code,
        name: "Pin Code",
        category: ProviderCategory::Form,
        icon: "📧",
        description: "Email or SMS verification code",
        required_fields: &["mode"],
        optional_fields: &["length"],
    },
    ProviderMeta {
        kind: ProviderType::Password,
        name: "Password",
        category: ProviderCategory::Form,
        icon: "🔒",
        description: "Traditional email and password",
        required_fields: &[],
        optional_fields: &["minLength", "requireUppercase", "requireNumber", "requireSpecialChar"],
    },
];

#[must_use]
pub fn provider_meta(kind: ProviderType) -> Option<&'static ProviderMeta> {
    PROVIDER_REGISTRY.iter().find(|meta| meta.kind == kind)
}

pub fn providers_by_category(category: ProviderCategory) -> impl Iterator<Item = &'static ProviderMeta> {
    PROVIDER_REGISTRY
        .iter()
        .filter(move |meta| meta.category == category)
}

/// A provider as stored in a project's `providers_data` column.
///
/// `data` stays raw JSON; [`settings`](Self::settings) gives the typed view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(rename = "type")]
    pub kind: ProviderType,
    pub enabled: bool,
    #[serde(default)]
    pub data: Value,
}

impl ProviderConfig {
    /// Disabled config with the defaults the admin UI starts from.
    #[must_use]
    pub fn default_for(kind: ProviderType) -> Self {
        let data = match kind {
            ProviderType::Code => json!({ "length": 6, "mode": "email" }),
            ProviderType::Password => json!({
                "minLength": 8,
                "requireUppercase": true,
                "requireNumber": true,
                "requireSpecialChar": false,
            }),
            ProviderType::Oidc => json!({
                "clientID": "",
                "issuer": "",
                "scopes": ["openid", "email", "profile"],
            }),
            ProviderType::Oauth => json!({
                "clientID": "",
                "clientSecret": "",
                "authorizationEndpoint": "",
                "tokenEndpoint": "",
                "scopes": [],
            }),
            ProviderType::Keycloak => json!({
                "clientID": "",
                "clientSecret": "",
                "realm": "",
                "baseUrl": "",
                "scopes": ["openid", "email", "profile"],
            }),
            _ => json!({ "clientID": "", "clientSecret": "", "scopes": [] }),
        };
        Self {
            kind,
            enabled: false,
            data,
        }
    }

    /// Typed view of `data` for this provider's kind.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if `data` does not fit the kind's shape.
    pub fn settings(&self) -> Result<ProviderSettings, Error> {
        fn parse<T: DeserializeOwned>(data: &Value) -> Result<T, Error> {
            T::deserialize(data).map_err(Into::into)
        }
        Ok(match self.kind {
            ProviderType::Code => ProviderSettings::Code(parse(&self.data)?),
            ProviderType::Password => ProviderSettings::Password(parse(&self.data)?),
            ProviderType::Oidc => ProviderSettings::Oidc(parse(&self.data)?),
            ProviderType::Oauth => ProviderSettings::GenericOAuth(parse(&self.data)?),
            ProviderType::Keycloak => ProviderSettings::Keycloak(parse(&self.data)?),
            ProviderType::Slack => ProviderSettings::Slack(parse(&self.data)?),
            ProviderType::Microsoft => ProviderSettings::Microsoft(parse(&self.data)?),
            ProviderType::Cognito => ProviderSettings::Cognito(parse(&self.data)?),
            _ => ProviderSettings::OAuth2(parse(&self.data)?),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderSettings {
    OAuth2(OAuth2Settings),
    Slack(SlackSettings),
    Microsoft(MicrosoftSettings),
    Cognito(CognitoSettings),
    Oidc(OidcSettings),
    GenericOAuth(GenericOAuthSettings),
    Keycloak(KeycloakSettings),
    Code(CodeSettings),
    Password(PasswordSettings),
}

/// Shared shape of the plain OAuth2 social providers (Google, GitHub, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OAuth2Settings {
    #[serde(rename = "clientID")]
    pub client_id: String,
    #[serde(rename = "clientSecret")]
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Option<Vec<String>>,
    #[serde(default)]
    pub pkce: Option<bool>,
    #[serde(default)]
    pub query: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlackSettings {
    #[serde(rename = "clientID")]
    pub client_id: String,
    #[serde(rename = "clientSecret")]
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Option<Vec<String>>,
    pub team: String,
    #[serde(default)]
    pub pkce: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MicrosoftSettings {
    #[serde(rename = "clientID")]
    pub client_id: String,
    #[serde(rename = "clientSecret")]
    pub client_secret: String,
    #[serde(default)]
    pub tenant: Option<String>,
    #[serde(default)]
    pub scopes: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CognitoSettings {
    #[serde(rename = "clientID")]
    pub client_id: String,
    #[serde(rename = "clientSecret")]
    pub client_secret: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub scopes: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OidcSettings {
    #[serde(rename = "clientID")]
    pub client_id: String,
    pub issuer: String,
    #[serde(default)]
    pub scopes: Option<Vec<String>>,
    #[serde(default)]
    pub query: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenericOAuthSettings {
    #[serde(rename = "clientID")]
    pub client_id: String,
    pub client_secret: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default)]
    pub jwks_endpoint: Option<String>,
    #[serde(default)]
    pub scopes: Option<Vec<String>>,
    #[serde(default)]
    pub query: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakSettings {
    #[serde(rename = "clientID")]
    pub client_id: String,
    pub client_secret: String,
    pub realm: String,
    pub base_url: String,
    #[serde(default)]
    pub scopes: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeMode {
    #[default]
    Email,
    Phone,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeSettings {
    #[serde(default = "default_code_length")]
    pub length: u32,
    #[serde(default)]
    pub mode: CodeMode,
}

fn default_code_length() -> u32 {
    6
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordSettings {
    pub min_length: Option<u32>,
    pub short_password_msg: Option<String>,
    pub require_uppercase: Option<bool>,
    pub require_uppercase_msg: Option<String>,
    pub require_number: Option<bool>,
    pub require_number_msg: Option<String>,
    pub require_special_char: Option<bool>,
    pub require_special_char_msg: Option<String>,
}
