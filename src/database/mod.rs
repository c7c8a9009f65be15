//! SQLite persistence for projects, templates and per-tenant user tables.
//!
//! System tables are shared by every tenant. Each tenant additionally gets a
//! `{client_id}_users` table, created through [`UserTable`].

mod models;
mod tables;

use sqlx::SqlitePool;

use crate::error::Error;

pub use models::{
    CopyTemplate, CopyTemplateRow, EmailTemplate, Project, ProjectData, ProjectRow, UiStyle,
    UiStyleRow, WebUiEntry, fetch_copy_template, fetch_email_template, fetch_project,
    fetch_ui_style, fetch_web_ui_entry,
};
pub use tables::{UserRecord, UserTable};

pub const PROJECTS_TABLE: &str = "openauth_webui_projects";
pub const EMAIL_TEMPLATES_TABLE: &str = "openauth_webui_email_templates";
pub const UI_STYLES_TABLE: &str = "openauth_webui_ui_styles";
pub const WEBUI_TABLE: &str = "openauth_webui";
pub const COPY_TEMPLATES_TABLE: &str = "openauth_webui_copy_templates";

/// Names no tenant may use as its client ID.
pub const RESERVED_TABLE_NAMES: [&str; 5] = [
    PROJECTS_TABLE,
    EMAIL_TEMPLATES_TABLE,
    WEBUI_TABLE,
    UI_STYLES_TABLE,
    COPY_TEMPLATES_TABLE,
];

#[must_use]
pub fn is_reserved(name: &str) -> bool {
    RESERVED_TABLE_NAMES.contains(&name)
}

/// Create every system table, plus the web UI's own user table.
///
/// Safe to call on an initialized database.
///
/// # Errors
///
/// Returns [`Error::Database`] if any statement fails.
pub async fn create_system_tables(pool: &SqlitePool) -> Result<(), Error> {
    let statements = [
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {PROJECTS_TABLE} (
                clientID TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                active INTEGER DEFAULT 1,
                providers_data TEXT DEFAULT '[]',
                themeId TEXT,
                codeMode TEXT,
                emailTemplateId TEXT,
                projectData TEXT DEFAULT '{{}}'
            )
            "#
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {EMAIL_TEMPLATES_TABLE} (
                name TEXT PRIMARY KEY,
                body TEXT NOT NULL,
                subject TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {UI_STYLES_TABLE} (
                id TEXT PRIMARY KEY,
                themeData TEXT NOT NULL
            )
            "#
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {WEBUI_TABLE} (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expiry INTEGER
            )
            "#
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {COPY_TEMPLATES_TABLE} (
                name TEXT PRIMARY KEY,
                providerType TEXT NOT NULL,
                copyData TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#
        ),
    ];

    for sql in &statements {
        sqlx::query(sql).execute(pool).await?;
    }
    UserTable::web_ui().create(pool).await?;

    tracing::debug!("System tables ready");
    Ok(())
}
