//! HTTP upload transport
//!
//! A single `POST <endpoint>?project=..&branch=..&filename=..` carrying the
//! archive bytes, with basic auth and `Content-Type: application/zip`.

use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use std::fs;
use std::time::Duration;

use super::{Credentials, UploadError, UploadRequest};

/// MIME type of the request body
pub const ZIP_CONTENT_TYPE: &str = "application/zip";

/// HTTP transport settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    pub endpoint: String,
    pub credentials: Credentials,
}

/// Response to a successful upload
#[derive(Debug, Clone)]
pub struct HttpReceipt {
    pub status: u16,
    pub body: String,
}

/// Posts archives over HTTP.
///
/// The built-in client has no request timeout, so a slow upload runs to
/// completion. A client passed to [`HttpUploader::with_client`] keeps its
/// own timeout and proxy settings.
#[derive(Debug, Clone)]
pub struct HttpUploader {
    client: Option<Client>,
    timeout: Option<Duration>,
    use_proxy: bool,
}

impl Default for HttpUploader {
    fn default() -> Self {
        Self {
            client: None,
            timeout: None,
            use_proxy: true,
        }
    }
}

impl HttpUploader {
    /// Uploader that builds its client on first use
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client: Some(client),
            ..Self::default()
        }
    }

    /// Limit each request to `timeout` (`None` waits indefinitely)
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Ignore proxy settings from the environment
    pub fn without_proxy(mut self) -> Self {
        self.use_proxy = false;
        self
    }

    /// Request timeout of the built-in client
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn client(&self) -> Result<Client, UploadError> {
        if let Some(client) = &self.client {
            return Ok(client.clone());
        }
        let mut builder = Client::builder().timeout(self.timeout);
        if !self.use_proxy {
            builder = builder.no_proxy();
        }
        Ok(builder.build()?)
    }

    /// POST the archive and return the response body.
    ///
    /// Non-2xx responses are errors carrying the body.
    pub fn post(
        &self,
        config: &HttpConfig,
        request: &UploadRequest<'_>,
    ) -> Result<HttpReceipt, UploadError> {
        let url = upload_url(&config.endpoint, request)?;
        let bytes = fs::read(request.archive_path).map_err(|source| UploadError::Archive {
            path: request.archive_path.to_path_buf(),
            source,
        })?;

        let client = self.client()?;

        tracing::debug!(url = %url, bytes = bytes.len(), "posting archive");

        let response = client
            .post(url)
            .basic_auth(&config.credentials.username, Some(&config.credentials.password))
            .header(CONTENT_TYPE, ZIP_CONTENT_TYPE)
            .body(bytes)
            .send()?;

        let status = response.status();
        let body = response.text()?;

        if !status.is_success() {
            return Err(UploadError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        Ok(HttpReceipt {
            status: status.as_u16(),
            body,
        })
    }
}

/// Endpoint with `project`, `branch` and `filename` query parameters
pub fn upload_url(endpoint: &str, request: &UploadRequest<'_>) -> Result<Url, UploadError> {
    Url::parse_with_params(
        endpoint,
        &[
            ("project", request.project),
            ("branch", request.branch),
            ("filename", request.file_name),
        ],
    )
    .map_err(|e| UploadError::Endpoint {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    })
}
