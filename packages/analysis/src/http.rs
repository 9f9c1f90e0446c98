//! HTTP client for a JSON compute endpoint.
//!
//! Posts each [`Submission`] as JSON and maps the response onto the
//! [`BackendError`] classes. There is no retry loop here; the executor
//! owns retry policy and per-attempt timeouts.

use crate::backend::{BackendError, QueryBackend, RawResult, Submission};

/// Maximum length of an error body carried into a [`BackendError`].
const BODY_PREVIEW_LEN: usize = 500;

/// [`QueryBackend`] that talks to a remote compute service over HTTP.
pub struct HttpBackend {
    url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl HttpBackend {
    /// Creates a client for the endpoint at `url`, authenticating with a
    /// bearer `token` when one is given.
    #[must_use]
    pub fn new(url: String, token: Option<String>) -> Self {
        Self {
            url,
            token,
            client: reqwest::Client::new(),
        }
    }

    /// The endpoint URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl std::fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackend")
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl QueryBackend for HttpBackend {
    async fn submit(&self, submission: &Submission) -> Result<RawResult, BackendError> {
        log::debug!(
            "POST {} ({} at {}m{})",
            self.url,
            submission.dataset_id,
            submission.plan.scale_meters,
            if submission.plan.best_effort { ", best effort" } else { "" }
        );

        let mut request = self.client.post(&self.url).json(submission);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(classify_transport)?;
        let status = response.status();
        let body = response.text().await.map_err(classify_transport)?;

        if !status.is_success() {
            log::debug!("Backend returned HTTP {status}");
            return Err(classify_status(status.as_u16(), &body));
        }

        serde_json::from_str(&body).map_err(|e| BackendError::Compute {
            message: format!("Invalid backend response: {e}"),
        })
    }
}

/// Maps a non-success HTTP response onto a [`BackendError`] class.
///
/// * 429, 502, 503, 504: transient
/// * 413 or a quota message in the body: resource exceeded
/// * anything else: compute error
#[must_use]
pub fn classify_status(status: u16, body: &str) -> BackendError {
    let detail = error_detail(body);
    let message = format!("HTTP {status}: {detail}");

    match status {
        429 | 502 | 503 | 504 => BackendError::Transient { message },
        413 => BackendError::ResourceExceeded { message },
        _ => BackendError::from_message(message),
    }
}

/// Connection failures and timeouts are transient; anything else that
/// goes wrong before a status arrives is not.
fn classify_transport(e: reqwest::Error) -> BackendError {
    if e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() {
        BackendError::Transient {
            message: e.to_string(),
        }
    } else {
        BackendError::Compute {
            message: e.to_string(),
        }
    }
}

/// Pulls `error` or `message` out of a JSON error body, falling back to
/// a truncated copy of the raw body.
fn error_detail(body: &str) -> String {
    let from_json = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            ["error", "message"]
                .iter()
                .find_map(|key| match &v[*key] {
                    serde_json::Value::String(s) => Some(s.clone()),
                    serde_json::Value::Object(o) => o
                        .get("message")
                        .and_then(serde_json::Value::as_str)
                        .map(ToString::to_string),
                    _ => None,
                })
        });

    from_json.unwrap_or_else(|| {
        let trimmed = body.trim();
        if trimmed.chars().count() > BODY_PREVIEW_LEN {
            format!(
                "{}...",
                trimmed.chars().take(BODY_PREVIEW_LEN).collect::<String>()
            )
        } else {
            trimmed.to_string()
        }
    })
}
