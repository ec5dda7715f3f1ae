// Transport pipeline: the request/response types the client works with,
// the transport seam, the response classifier and the pipeline that ties
// credentials to a transport.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::credentials::TokenProvider;
use crate::error::{MaestroError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl RequestMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestMethod::Get => "GET",
            RequestMethod::Post => "POST",
            RequestMethod::Put => "PUT",
            RequestMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for RequestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outgoing request. Built per call and never reused.
#[derive(Debug, Clone)]
pub struct Request {
    uri: Url,
    method: RequestMethod,
    headers: Vec<(String, String)>,
    body: Option<Vec<u8>>,
}

impl Request {
    pub fn new(method: RequestMethod, uri: Url) -> Self {
        Request {
            uri,
            method,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn method(&self) -> RequestMethod {
        self.method
    }

    /// Headers in insertion order.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Set a header, replacing an existing one of the same name in place.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(&name))
        {
            Some(slot) => slot.1 = value,
            None => self.headers.push((name, value)),
        }
    }

    pub fn set_body(&mut self, body: impl Into<Vec<u8>>) {
        self.body = Some(body.into());
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }
}

/// Response content. Consumed by reading, so it can be read only once.
pub struct Body(BodyInner);

enum BodyInner {
    Http(reqwest::Response),
    Bytes(Vec<u8>),
}

impl Body {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Body(BodyInner::Bytes(bytes.into()))
    }

    /// Drain the body to the end.
    pub async fn read_to_end(self) -> Result<Vec<u8>> {
        match self.0 {
            BodyInner::Http(response) => Ok(response.bytes().await?.to_vec()),
            BodyInner::Bytes(bytes) => Ok(bytes),
        }
    }

    pub async fn read_to_string(self) -> Result<String> {
        let bytes = self.read_to_end().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            BodyInner::Http(_) => f.write_str("Body(<stream>)"),
            BodyInner::Bytes(bytes) => write!(f, "Body({} bytes)", bytes.len()),
        }
    }
}

/// A received response. The pipeline never buffers its content.
#[derive(Debug)]
pub struct Response {
    status: u16,
    reason_phrase: String,
    headers: Vec<(String, String)>,
    content: Option<Body>,
}

impl Response {
    /// A response with no content and the canonical reason phrase.
    pub fn new(status: u16) -> Self {
        let reason_phrase = reqwest::StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("")
            .to_string();
        Response {
            status,
            reason_phrase,
            headers: Vec::new(),
            content: None,
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.content = Some(Body::from_bytes(body));
        self
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn reason_phrase(&self) -> &str {
        &self.reason_phrase
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn has_content(&self) -> bool {
        self.content.is_some()
    }

    /// Take ownership of the content. Returns `None` once taken.
    pub fn take_content(&mut self) -> Option<Body> {
        self.content.take()
    }
}

/// Sends a request over the wire. Implementations must not retry.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: &Request) -> Result<Response>;
}

/// Production transport backed by an async `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder().build()?;
        Ok(ReqwestTransport { http })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &Request) -> Result<Response> {
        let method = match request.method() {
            RequestMethod::Get => reqwest::Method::GET,
            RequestMethod::Post => reqwest::Method::POST,
            RequestMethod::Put => reqwest::Method::PUT,
            RequestMethod::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self.http.request(method, request.uri().clone());
        for (name, value) in request.headers() {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body() {
            builder = builder.body(body.to_vec());
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();

        Ok(Response {
            status: status.as_u16(),
            reason_phrase: status.canonical_reason().unwrap_or("").to_string(),
            headers,
            content: Some(Body(BodyInner::Http(response))),
        })
    }
}

/// Decides which statuses the caller must treat as failures.
pub trait ResponseClassifier: Send + Sync {
    fn is_error(&self, status: u16) -> bool;
}

/// Everything outside `[200, 300)` is an error.
#[derive(Debug, Default, Clone, Copy)]
pub struct MaestroResponseClassifier;

impl ResponseClassifier for MaestroResponseClassifier {
    fn is_error(&self, status: u16) -> bool {
        !(200..300).contains(&status)
    }
}

/// Attaches the bearer token and hands the request to the transport.
#[derive(Clone)]
pub struct HttpPipeline {
    transport: Arc<dyn HttpTransport>,
    credentials: Option<Arc<dyn TokenProvider>>,
    classifier: Arc<dyn ResponseClassifier>,
}

impl HttpPipeline {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        credentials: Option<Arc<dyn TokenProvider>>,
        classifier: Arc<dyn ResponseClassifier>,
    ) -> Self {
        HttpPipeline {
            transport,
            credentials,
            classifier,
        }
    }

    pub fn create_request(&self, method: RequestMethod, uri: Url) -> Request {
        Request::new(method, uri)
    }

    pub fn classifier(&self) -> &dyn ResponseClassifier {
        self.classifier.as_ref()
    }

    /// Send `request`, adding the `Authorization` header first. The
    /// response status is passed through as received.
    pub async fn send(
        &self,
        request: &mut Request,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        if cancel.is_cancelled() {
            return Err(MaestroError::Cancelled);
        }

        if let Some(credentials) = &self.credentials {
            let token = credentials.get_token(cancel).await?;
            request.set_header("Authorization", format!("Bearer {}", token.token));
        }

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(MaestroError::Cancelled),
            result = self.transport.send(request) => result?,
        };

        debug!(
            method = %request.method(),
            uri = %request.uri(),
            status = response.status(),
            is_error = self.classifier.is_error(response.status()),
            "maestro_response"
        );

        Ok(response)
    }
}

impl fmt::Debug for HttpPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpPipeline")
            .field("has_credentials", &self.credentials.is_some())
            .finish()
    }
}
