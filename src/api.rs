// API client module: holds the service options, owns the transport
// pipeline built from them and hands out the operation groups that issue
// the typed REST calls.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::credentials::TokenProvider;
use crate::error::{MaestroError, Result};
use crate::pipeline::{
    HttpPipeline, HttpTransport, MaestroResponseClassifier, ReqwestTransport, Request, Response,
};
use crate::serialization;
use crate::subscriptions::Subscriptions;

/// Base URI plus the credentials every request is signed with.
#[derive(Clone)]
pub struct MaestroApiOptions {
    base_uri: Url,
    credentials: Option<Arc<dyn TokenProvider>>,
}

impl MaestroApiOptions {
    /// Validate `base_uri` as an absolute http(s) URI.
    pub fn new(base_uri: &str, credentials: Option<Arc<dyn TokenProvider>>) -> Result<Self> {
        let parsed = Url::parse(base_uri)
            .map_err(|e| MaestroError::InvalidUri(format!("{}: {}", base_uri, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.cannot_be_a_base() {
            return Err(MaestroError::InvalidUri(format!(
                "URI must be an absolute http:// or https:// address, got: {}",
                base_uri
            )));
        }
        Ok(MaestroApiOptions {
            base_uri: parsed,
            credentials,
        })
    }

    pub fn base_uri(&self) -> &Url {
        &self.base_uri
    }

    pub fn credentials(&self) -> Option<&Arc<dyn TokenProvider>> {
        self.credentials.as_ref()
    }
}

impl fmt::Debug for MaestroApiOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaestroApiOptions")
            .field("base_uri", &self.base_uri.as_str())
            .field("has_credentials", &self.credentials.is_some())
            .finish()
    }
}

/// The Maestro API surface operation groups are written against.
///
/// `send` is the one place requests leave the client, so a test double
/// only has to answer it.
#[async_trait]
pub trait MaestroApi: Send + Sync {
    fn options(&self) -> &MaestroApiOptions;

    fn subscriptions(&self) -> Subscriptions<'_>;

    async fn send(&self, request: &mut Request, cancel: &CancellationToken) -> Result<Response>;
}

/// Concrete client. Owns the pipeline and rebuilds it whenever the options
/// are replaced.
pub struct MaestroApiClient {
    options: MaestroApiOptions,
    transport: Arc<dyn HttpTransport>,
    pipeline: HttpPipeline,
}

impl MaestroApiClient {
    /// Create a client that talks HTTP through `reqwest`.
    pub fn new(options: MaestroApiOptions) -> Result<Self> {
        Ok(Self::with_transport(options, Arc::new(ReqwestTransport::new()?)))
    }

    pub fn with_transport(options: MaestroApiOptions, transport: Arc<dyn HttpTransport>) -> Self {
        let pipeline = create_pipeline(&options, transport.clone());
        MaestroApiClient {
            options,
            transport,
            pipeline,
        }
    }

    /// Replace the options. The pipeline is rebuilt before this returns.
    pub fn set_options(&mut self, options: MaestroApiOptions) {
        debug!(base_uri = %options.base_uri(), "maestro_options_replaced");
        self.pipeline = create_pipeline(&options, self.transport.clone());
        self.options = options;
    }

    pub fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<String> {
        serialization::serialize(value)
    }

    pub fn deserialize<T: DeserializeOwned + 'static>(&self, content: &str) -> Result<T> {
        serialization::deserialize(content)
    }
}

#[async_trait]
impl MaestroApi for MaestroApiClient {
    fn options(&self) -> &MaestroApiOptions {
        &self.options
    }

    fn subscriptions(&self) -> Subscriptions<'_> {
        Subscriptions::new(self)
    }

    async fn send(&self, request: &mut Request, cancel: &CancellationToken) -> Result<Response> {
        self.pipeline.send(request, cancel).await
    }
}

impl fmt::Debug for MaestroApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaestroApiClient")
            .field("options", &self.options)
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

fn create_pipeline(options: &MaestroApiOptions, transport: Arc<dyn HttpTransport>) -> HttpPipeline {
    HttpPipeline::new(
        transport,
        options.credentials.clone(),
        Arc::new(MaestroResponseClassifier),
    )
}
