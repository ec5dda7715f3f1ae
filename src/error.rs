// Error taxonomy for the Maestro client and the classifier that turns a
// failed HTTP exchange into one of its variants.

use std::fmt;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use url::Url;

use crate::models::ApiError;
use crate::pipeline::{Request, RequestMethod, Response};
use crate::serialization;

/// Remediation message attached to every 401 response.
pub const UNAUTHORIZED_MESSAGE: &str = "Unauthorized access while trying to use Maestro API. \
    Make sure your darc client is authenticated. \
    More details: https://github.com/dotnet/arcade/blob/main/Documentation/Darc.md";

/// Number of body characters kept in a `RestApiError` display message.
pub const BODY_PREVIEW_CHARS: usize = 300;

/// Errors that can occur when using the Maestro client.
#[derive(Debug, Error)]
pub enum MaestroError {
    /// Credentials could not be resolved or the server answered 401.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The server rejected the request with a 400 and a readable message.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        message: String,
        #[source]
        source: Box<RestApiError>,
    },

    /// Any other non-success status.
    #[error(transparent)]
    RestApi(Box<RestApiError>),

    /// A success body did not match the expected schema.
    #[error("Failed to deserialize response: {0}")]
    Deserialize(#[source] serde_json::Error),

    #[error("Failed to serialize value: {0}")]
    Serialize(#[source] serde_json::Error),

    /// Network-level failure, passed through untouched.
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    #[error("Operation was cancelled")]
    Cancelled,

    /// Reading or writing the local token cache, or prompting, failed.
    #[error("Credential storage error: {0}")]
    CredentialIo(#[from] std::io::Error),
}

impl MaestroError {
    /// HTTP status of the failed response, if the error came from one.
    pub fn status(&self) -> Option<u16> {
        match self {
            MaestroError::RestApi(err) => Some(err.response.status),
            MaestroError::InvalidArgument { source, .. } => Some(source.response.status),
            _ => None,
        }
    }

    /// Typed error body of the failed response, if it parsed.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            MaestroError::RestApi(err) => err.body.as_ref(),
            MaestroError::InvalidArgument { source, .. } => source.body.as_ref(),
            _ => None,
        }
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, MaestroError>;

/// What was sent. The `Authorization` value is redacted.
#[derive(Debug, Clone)]
pub struct RequestSnapshot {
    pub uri: Url,
    pub method: RequestMethod,
    pub headers: Vec<(String, String)>,
}

impl From<&Request> for RequestSnapshot {
    fn from(request: &Request) -> Self {
        let headers = request
            .headers()
            .iter()
            .map(|(name, value)| {
                if name.eq_ignore_ascii_case("authorization") {
                    (name.clone(), "Bearer ***".to_string())
                } else {
                    (name.clone(), value.clone())
                }
            })
            .collect();
        RequestSnapshot {
            uri: request.uri().clone(),
            method: request.method(),
            headers,
        }
    }
}

/// What came back, with the body fully read.
#[derive(Debug, Clone)]
pub struct ResponseSnapshot {
    pub status: u16,
    pub reason_phrase: String,
    pub headers: Vec<(String, String)>,
    pub content: Option<String>,
}

/// A non-success response together with the request that caused it.
#[derive(Debug, Clone)]
pub struct RestApiError {
    pub request: RequestSnapshot,
    pub response: ResponseSnapshot,
    pub body: Option<ApiError>,
}

impl fmt::Display for RestApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "The response contained an invalid status code {} {}",
            self.response.status, self.response.reason_phrase
        )?;
        if let Some(content) = &self.response.content {
            let preview: String = content.chars().take(BODY_PREVIEW_CHARS).collect();
            write!(f, "\n\nBody: {}", preview)?;
        }
        Ok(())
    }
}

impl std::error::Error for RestApiError {}

/// Drain a failed response and classify it.
///
/// The body is read to the end before returning, whatever the outcome. A
/// transport failure while reading is returned as-is, and so is
/// cancellation of a stalled read.
pub(crate) async fn on_failed_request(
    request: &Request,
    mut response: Response,
    cancel: &CancellationToken,
) -> MaestroError {
    let content = match response.take_content() {
        Some(body) => {
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => return MaestroError::Cancelled,
                read = body.read_to_string() => read,
            };
            match read {
                Ok(text) => Some(text),
                Err(err) => return err,
            }
        }
        None => None,
    };

    let body = content
        .as_deref()
        .and_then(|text| serialization::deserialize::<ApiError>(text).ok());

    let error = RestApiError {
        request: RequestSnapshot::from(request),
        response: ResponseSnapshot {
            status: response.status(),
            reason_phrase: response.reason_phrase().to_string(),
            headers: response.headers().to_vec(),
            content,
        },
        body,
    };

    warn!(
        method = %error.request.method,
        uri = %error.request.uri,
        status = error.response.status,
        "maestro_request_failed"
    );

    classify(error)
}

/// Map a failed exchange onto the error taxonomy.
pub fn classify(error: RestApiError) -> MaestroError {
    match error.response.status {
        400 => match error.response.content.as_deref().and_then(bad_request_message) {
            Some(message) => MaestroError::InvalidArgument {
                message,
                source: Box::new(error),
            },
            None => MaestroError::RestApi(Box::new(error)),
        },
        401 => MaestroError::Authentication(UNAUTHORIZED_MESSAGE.to_string()),
        _ => MaestroError::RestApi(Box::new(error)),
    }
}

// Only a JSON object with a string `Message` qualifies.
fn bad_request_message(content: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(content).ok()?;
    value.get("Message")?.as_str().map(str::to_owned)
}
