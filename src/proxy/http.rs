//! HTTP plumbing shared by the remote lookup clients

use crate::config::ServiceConfig;
use crate::error::LookupError;
use crate::Result;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// Keyed JSON endpoint with a per-request timeout
#[derive(Clone)]
pub(crate) struct ServiceClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl ServiceClient {
    pub(crate) fn new(config: &ServiceConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            timeout: config.timeout,
        })
    }

    pub(crate) fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// API key for the next request, or `MissingApiKey` when none is configured
    pub(crate) fn api_key(&self) -> std::result::Result<&str, LookupError> {
        self.api_key.as_deref().ok_or(LookupError::MissingApiKey)
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// GET `url` with `query` and decode the JSON body
    ///
    /// Non-success statuses map to `Status`, undecodable bodies to
    /// `InvalidResponse` and slow requests to `Timeout`.
    pub(crate) async fn get_json<T, Q>(
        &self,
        url: &str,
        query: &Q,
    ) -> std::result::Result<T, LookupError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        tokio::time::timeout(self.timeout, fetch_json(&self.client, url, query)).await?
    }
}

async fn fetch_json<T, Q>(
    client: &Client,
    url: &str,
    query: &Q,
) -> std::result::Result<T, LookupError>
where
    T: DeserializeOwned,
    Q: Serialize + ?Sized,
{
    let response = client.get(url).query(query).send().await?;

    if !response.status().is_success() {
        return Err(LookupError::Status(response.status()));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| LookupError::InvalidResponse(e.to_string()))
}
