//! Standalone HTML page shown when an auth flow cannot continue.

use handlebars::Handlebars;
use serde_json::json;

use crate::error::Error;

const TEMPLATE_NAME: &str = "error_fallback";

/// Render the fallback page for an OAuth-style error code and description.
///
/// Both values are HTML-escaped.
///
/// # Errors
///
/// Returns [`Error::Template`] if the template fails to register or render.
pub fn render_error_page(code: &str, description: &str) -> Result<String, Error> {
    let mut handlebars = Handlebars::new();
    handlebars
        .register_template_string(TEMPLATE_NAME, include_str!("../templates/error_fallback.hbs"))
        .map_err(|e| Error::Template(e.to_string()))?;

    let data = json!({
        "error": code,
        "error_description": description,
    });

    handlebars
        .render(TEMPLATE_NAME, &data)
        .map_err(|e| Error::Template(e.to_string()))
}

/// An error page ready to be returned from an axum handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorPage {
    pub code: String,
    pub description: String,
    #[cfg(feature = "server")]
    pub status: axum::http::StatusCode,
}

impl ErrorPage {
    #[must_use]
    pub fn new(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            description: description.into(),
            #[cfg(feature = "server")]
            status: axum::http::StatusCode::BAD_REQUEST,
        }
    }

    #[cfg(feature = "server")]
    #[must_use]
    pub fn with_status(mut self, status: axum::http::StatusCode) -> Self {
        self.status = status;
        self
    }

    /// # Errors
    ///
    /// See [`render_error_page`].
    pub fn render(&self) -> Result<String, Error> {
        render_error_page(&self.code, &self.description)
    }
}

impl From<&Error> for ErrorPage {
    fn from(err: &Error) -> Self {
        let code = match err {
            Error::StateMismatch | Error::ChallengeMissing | Error::InvalidClientId(_) => {
                "invalid_request"
            }
            Error::NotAuthenticated(_) => "access_denied",
            _ => "server_error",
        };
        Self::new(code, err.to_string())
    }
}

#[cfg(feature = "server")]
impl axum::response::IntoResponse for ErrorPage {
    fn into_response(self) -> axum::response::Response {
        use axum::response::Html;

        match self.render() {
            Ok(html) => (self.status, Html(html)).into_response(),
            Err(e) => {
                tracing::error!(error = %e, code = %self.code, "Error page render failed");
                (self.status, format!("{}: {}", self.code, self.description)).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_code_and_description() {
        let html = render_error_page("invalid_request", "Missing client_id").unwrap();
        assert!(html.contains("<title>Error - invalid_request</title>"));
        assert!(html.contains(r#"<div class="error-code">invalid_request</div>"#));
        assert!(html.contains("Missing client_id"));
        assert!(html.contains("OpenAuthster"));
    }

    #[test]
    fn escapes_markup() {
        let html = render_error_page("<b>x</b>", "<script>alert(1)</script>").unwrap();
        assert!(!html.contains("<script>alert(1)</script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("&lt;b&gt;x"));
    }

    #[test]
    fn error_mapping() {
        assert_eq!(ErrorPage::from(&Error::StateMismatch).code, "invalid_request");
        assert_eq!(
            ErrorPage::from(&Error::NotAuthenticated("No token")).code,
            "access_denied"
        );
        let page = ErrorPage::from(&Error::Config("x".into()));
        assert_eq!(page.code, "server_error");
        assert!(page.description.contains('x'));
    }

    #[cfg(feature = "server")]
    #[tokio::test]
    async fn into_response_is_html_with_status() {
        use axum::http::{StatusCode, header};
        use axum::response::IntoResponse;

        let response = ErrorPage::new("access_denied", "nope")
            .with_status(StatusCode::FORBIDDEN)
            .into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let content_type = response.headers().get(header::CONTENT_TYPE).unwrap();
        assert!(content_type.to_str().unwrap().starts_with("text/html"));

        let default = ErrorPage::new("invalid_request", "bad").into_response();
        assert_eq!(default.status(), StatusCode::BAD_REQUEST);
    }
}
