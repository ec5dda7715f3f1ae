// Subscriptions operation group.

use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::api::MaestroApi;
use crate::error::{self, MaestroError, Result};
use crate::models::Subscription;
use crate::pipeline::{Request, RequestMethod};
use crate::serialization;

const API_VERSION: &str = "2020-02-20";

/// Read-only queries against `/api/subscriptions`.
///
/// Borrows the client it was obtained from to reuse its pipeline.
#[derive(Clone, Copy)]
pub struct Subscriptions<'a> {
    client: &'a dyn MaestroApi,
}

impl<'a> Subscriptions<'a> {
    pub fn new(client: &'a dyn MaestroApi) -> Self {
        Subscriptions { client }
    }

    /// `GET /api/subscriptions/{id}`
    pub async fn get_subscription(
        &self,
        id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Subscription> {
        let id = serialization::serialize(&id)?;
        let uri = self.request_uri(&["api", "subscriptions", id.as_str()])?;
        self.get(uri, cancel).await
    }

    /// `GET /api/subscriptions`
    pub async fn list_subscriptions(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<Subscription>> {
        let uri = self.request_uri(&["api", "subscriptions"])?;
        self.get(uri, cancel).await
    }

    // Each segment is percent-escaped; the base path is kept as a prefix.
    fn request_uri(&self, segments: &[&str]) -> Result<Url> {
        let mut uri = self.client.options().base_uri().clone();
        uri.path_segments_mut()
            .map_err(|_| MaestroError::InvalidUri("base URI cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        uri.query_pairs_mut()
            .append_pair("api-version", &serialization::serialize(API_VERSION)?);
        Ok(uri)
    }

    async fn get<T: DeserializeOwned + 'static>(
        &self,
        uri: Url,
        cancel: &CancellationToken,
    ) -> Result<T> {
        let mut request = Request::new(RequestMethod::Get, uri);
        let mut response = self.client.send(&mut request, cancel).await?;

        if !response.is_success() {
            return Err(error::on_failed_request(&request, response, cancel).await);
        }
        let body = match response.take_content() {
            Some(body) => body,
            None => return Err(error::on_failed_request(&request, response, cancel).await),
        };

        let content = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(MaestroError::Cancelled),
            content = body.read_to_string() => content?,
        };
        debug!(uri = %request.uri(), bytes = content.len(), "maestro_response_read");

        serialization::deserialize(&content)
    }
}
