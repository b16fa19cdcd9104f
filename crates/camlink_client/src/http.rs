//! HTTP transport for bulk requests.
//!
//! Covers the request/response half of the transport adapter: one request to
//! the fixed base endpoint, decoded as JSON. Used for metadata that is not
//! mirrored (e.g. `/system`) and for the device's REST-only controls.

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use camlink_protocol::{AutoExposure, SystemInfo};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

/// Bulk request client bound to one base URL.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    config: ClientConfig,
    client: reqwest::Client,
}

impl HttpTransport {
    /// Creates a transport using the configured base URL and timeout.
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ClientError::Network(e.to_string()))?;
        Ok(Self { config, client })
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Issues `GET {base}{path}` and decodes the JSON body.
    ///
    /// Non-success statuses fail with [`ClientError::Transport`], connection
    /// failures with [`ClientError::Network`] and unparseable bodies with
    /// [`ClientError::Decode`].
    pub async fn request(&self, path: &str, query: &[(&str, &str)]) -> ClientResult<Value> {
        let url = self.config.resource_url(path);
        debug!(url = %url, "GET");
        let mut builder = self
            .client
            .get(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if !query.is_empty() {
            builder = builder.query(query);
        }
        let response = builder.send().await?;
        decode_body(response).await
    }

    /// Issues a `GET` and deserializes the body into `T`.
    pub async fn request_as<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> ClientResult<T> {
        let value = self.request(path, query).await?;
        serde_json::from_value(value).map_err(|e| ClientError::Decode(e.to_string()))
    }

    /// Issues `PUT {base}{path}` with a JSON body.
    ///
    /// `204 No Content` decodes as `Value::Null`; any other success status
    /// must carry a JSON body.
    pub async fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> ClientResult<Value> {
        let url = self.config.resource_url(path);
        debug!(url = %url, "PUT");
        let response = self.client.put(&url).json(body).send().await?;
        decode_body(response).await
    }

    /// Fetches `/system`.
    pub async fn system(&self) -> ClientResult<SystemInfo> {
        self.request_as("/system", &[]).await
    }

    /// Reads `/video/autoExposure` through the REST endpoint.
    pub async fn auto_exposure(&self) -> ClientResult<AutoExposure> {
        self.request_as("/video/autoExposure", &[]).await
    }

    /// Writes `/video/autoExposure` through the REST endpoint.
    pub async fn set_auto_exposure(&self, value: &AutoExposure) -> ClientResult<AutoExposure> {
        let body = self.put("/video/autoExposure", value).await?;
        serde_json::from_value(body).map_err(|e| ClientError::Decode(e.to_string()))
    }

    /// Triggers a one-shot automatic white balance.
    pub async fn trigger_auto_white_balance(&self) -> ClientResult<()> {
        self.put("/video/whiteBalance/doAuto", &Value::Null).await?;
        Ok(())
    }
}

async fn decode_body(response: reqwest::Response) -> ClientResult<Value> {
    let status = response.status();
    let url = response.url().to_string();
    if !status.is_success() {
        return Err(ClientError::Transport {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("").to_string(),
        });
    }

    let bytes = response.bytes().await?;
    if status == reqwest::StatusCode::NO_CONTENT {
        return Ok(Value::Null);
    }
    serde_json::from_slice(&bytes).map_err(|e| {
        warn!(url = %url, status = status.as_u16(), error = %e, "response body is not valid JSON");
        ClientError::Decode(e.to_string())
    })
}
