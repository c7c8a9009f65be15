use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, SqlitePool};

use super::{
    COPY_TEMPLATES_TABLE, EMAIL_TEMPLATES_TABLE, PROJECTS_TABLE, UI_STYLES_TABLE, WEBUI_TABLE,
};
use crate::error::Error;
use crate::providers::{CodeMode, ProviderConfig};

/// Raw project row as stored; JSON columns are still text.
#[derive(Debug, Clone, FromRow)]
pub struct ProjectRow {
    #[sqlx(rename = "clientID")]
    pub client_id: String,
    pub created_at: String,
    pub active: Option<bool>,
    pub providers_data: Option<String>,
    #[sqlx(rename = "themeId")]
    pub theme_id: Option<String>,
    #[sqlx(rename = "codeMode")]
    pub code_mode: Option<String>,
    #[sqlx(rename = "emailTemplateId")]
    pub email_template_id: Option<String>,
    #[sqlx(rename = "projectData")]
    pub project_data: Option<String>,
}

/// Branding and contact details used by templates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub support_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_from: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(rename = "clientID")]
    pub client_id: String,
    #[serde(rename = "created_at")]
    pub created_at: String,
    pub active: bool,
    #[serde(rename = "providers_data")]
    pub providers: Vec<ProviderConfig>,
    pub theme_id: Option<String>,
    pub email_template_id: Option<String>,
    pub code_mode: CodeMode,
    pub project_data: ProjectData,
}

impl ProjectRow {
    /// Decode JSON columns and normalize the rest.
    ///
    /// A missing `active` counts as active, empty IDs become `None`, and any
    /// `codeMode` other than `phone` is email.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if a JSON column is malformed.
    pub fn parse(self) -> Result<Project, Error> {
        let providers = match self.providers_data.as_deref() {
            Some(raw) if !raw.is_empty() => serde_json::from_str(raw)?,
            _ => Vec::new(),
        };
        let project_data = match self.project_data.as_deref() {
            Some(raw) if !raw.is_empty() => serde_json::from_str(raw)?,
            _ => ProjectData::default(),
        };
        let code_mode = match self.code_mode.as_deref() {
            Some("phone") => CodeMode::Phone,
            _ => CodeMode::Email,
        };

        Ok(Project {
            client_id: self.client_id,
            created_at: self.created_at,
            active: self.active.unwrap_or(true),
            providers,
            theme_id: self.theme_id.filter(|s| !s.is_empty()),
            email_template_id: self.email_template_id.filter(|s| !s.is_empty()),
            code_mode,
            project_data,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct CopyTemplateRow {
    pub name: String,
    #[sqlx(rename = "providerType")]
    pub provider_type: String,
    #[sqlx(rename = "copyData")]
    pub copy_data: String,
    pub created_at: String,
    pub updated_at: String,
}

/// UI copy for a provider's login screen, typed by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CopyTemplate<T> {
    pub name: String,
    #[serde(rename = "providerType")]
    pub provider_type: String,
    #[serde(rename = "copyData")]
    pub copy_data: T,
    pub created_at: String,
    pub updated_at: String,
}

impl CopyTemplateRow {
    /// # Errors
    ///
    /// Returns [`Error::Json`] if `copyData` does not decode as `T`.
    pub fn parse<T: DeserializeOwned>(self) -> Result<CopyTemplate<T>, Error> {
        Ok(CopyTemplate {
            copy_data: serde_json::from_str(&self.copy_data)?,
            name: self.name,
            provider_type: self.provider_type,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct EmailTemplate {
    pub name: String,
    pub body: String,
    pub subject: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct UiStyleRow {
    pub id: String,
    #[sqlx(rename = "themeData")]
    pub theme_data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiStyle {
    pub id: String,
    #[serde(rename = "themeData")]
    pub theme_data: Value,
}

impl TryFrom<UiStyleRow> for UiStyle {
    type Error = Error;

    fn try_from(row: UiStyleRow) -> Result<Self, Error> {
        Ok(Self {
            id: row.id,
            theme_data: serde_json::from_str(&row.theme_data)?,
        })
    }
}

/// Key/value entry of the admin UI's own settings table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct WebUiEntry {
    pub key: String,
    pub value: String,
    pub expiry: Option<i64>,
}

pub async fn fetch_project(pool: &SqlitePool, client_id: &str) -> Result<Option<Project>, Error> {
    let sql = format!("SELECT * FROM {PROJECTS_TABLE} WHERE clientID = ?");
    sqlx::query_as::<_, ProjectRow>(&sql)
        .bind(client_id)
        .fetch_optional(pool)
        .await?
        .map(ProjectRow::parse)
        .transpose()
}

pub async fn fetch_copy_template<T: DeserializeOwned>(
    pool: &SqlitePool,
    name: &str,
) -> Result<Option<CopyTemplate<T>>, Error> {
    let sql = format!("SELECT * FROM {COPY_TEMPLATES_TABLE} WHERE name = ?");
    sqlx::query_as::<_, CopyTemplateRow>(&sql)
        .bind(name)
        .fetch_optional(pool)
        .await?
        .map(CopyTemplateRow::parse::<T>)
        .transpose()
}

pub async fn fetch_email_template(
    pool: &SqlitePool,
    name: &str,
) -> Result<Option<EmailTemplate>, Error> {
    let sql = format!("SELECT * FROM {EMAIL_TEMPLATES_TABLE} WHERE name = ?");
    Ok(sqlx::query_as::<_, EmailTemplate>(&sql)
        .bind(name)
        .fetch_optional(pool)
        .await?)
}

pub async fn fetch_ui_style(pool: &SqlitePool, id: &str) -> Result<Option<UiStyle>, Error> {
    let sql = format!("SELECT id, themeData FROM {UI_STYLES_TABLE} WHERE id = ?");
    sqlx::query_as::<_, UiStyleRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .map(UiStyle::try_from)
        .transpose()
}

/// Read a settings entry, ignoring it once `expiry` (unix seconds) has passed.
pub async fn fetch_web_ui_entry(pool: &SqlitePool, key: &str) -> Result<Option<WebUiEntry>, Error> {
    let sql = format!("SELECT key, value, expiry FROM {WEBUI_TABLE} WHERE key = ?");
    let entry = sqlx::query_as::<_, WebUiEntry>(&sql)
        .bind(key)
        .fetch_optional(pool)
        .await?;
    let now = time::OffsetDateTime::now_utc().unix_timestamp();
    Ok(entry.filter(|e| e.expiry.is_none_or(|at| at > now)))
}
