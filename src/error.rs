#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("Invalid client ID: {0}")]
    InvalidClientId(String),

    #[error("Client is not authenticated. {0}")]
    NotAuthenticated(&'static str),

    #[error("No challenge found in storage")]
    ChallengeMissing,

    #[error("OAuth state mismatch")]
    StateMismatch,

    #[error("A callback is already being processed")]
    CallbackInProgress,

    #[error("OAuth2 {operation} failed{}: {detail}", fmt_status(.status))]
    OAuth {
        operation: &'static str,
        status: Option<u16>,
        detail: String,
    },

    #[error("No tokens received from exchange")]
    Exchange(#[source] Box<Error>),

    #[error("No tokens received from refresh")]
    Refresh(#[source] Box<Error>),

    #[error("Failed to {operation} user session data: {detail}")]
    SessionEndpoint {
        operation: &'static str,
        detail: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Table name is reserved: {0}")]
    ReservedTableName(String),

    #[error("Invalid table name: {0:?}")]
    InvalidTableName(String),

    #[cfg(feature = "database")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}
