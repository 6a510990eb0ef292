//! Archive upload
//!
//! The transport is chosen once from the environment snapshot:
//! - `ftp_hostname` set → FTP (`STOR` into the configured directory)
//! - else `ftp_username` set → HTTP POST with basic auth
//! - else → no upload
//!
//! Each transport performs a single attempt; failures are not retried.

pub mod ftp;
pub mod http;

pub use ftp::{FtpConfig, FtpFailure, FtpSession, FtpState, FtpUpload, MockFtpSession, SuppaFtpSession};
pub use http::{HttpConfig, HttpUploader};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::Path;

use crate::config::env::{FTP_DIRECTORY, FTP_HOSTNAME, FTP_PASSWORD, FTP_USERNAME};
use crate::config::{ConfigError, EnvSnapshot};

/// User name and password; the password never appears in Debug output
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Where the archive goes, resolved once per run
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum UploadTarget {
    #[default]
    None,
    Http(HttpConfig),
    Ftp(FtpConfig),
}

impl UploadTarget {
    /// Select the transport from the recognized variables
    pub fn from_env(env: &EnvSnapshot, endpoint: &str) -> Result<Self, ConfigError> {
        if let Some(host) = env.get(FTP_HOSTNAME) {
            let require = |variable| {
                env.get(variable)
                    .map(str::to_string)
                    .ok_or(ConfigError::MissingVariable {
                        transport: "FTP",
                        variable,
                    })
            };
            return Ok(UploadTarget::Ftp(FtpConfig {
                host: host.to_string(),
                credentials: Credentials::new(require(FTP_USERNAME)?, require(FTP_PASSWORD)?),
                directory: require(FTP_DIRECTORY)?,
            }));
        }

        if let Some(username) = env.get(FTP_USERNAME) {
            let password = env.get(FTP_PASSWORD).ok_or(ConfigError::MissingVariable {
                transport: "HTTP",
                variable: FTP_PASSWORD,
            })?;
            return Ok(UploadTarget::Http(HttpConfig {
                endpoint: endpoint.to_string(),
                credentials: Credentials::new(username, password),
            }));
        }

        Ok(UploadTarget::None)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            UploadTarget::None => "none",
            UploadTarget::Http(_) => "http",
            UploadTarget::Ftp(_) => "ftp",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, UploadTarget::None)
    }
}

/// What to upload and under which names
#[derive(Debug, Clone, Copy)]
pub struct UploadRequest<'a> {
    pub project: &'a str,
    pub branch: &'a str,
    pub default_branch: &'a str,
    pub archive_path: &'a Path,
    /// Remote file name
    pub file_name: &'a str,
}

/// Result of the upload step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum UploadOutcome {
    Skipped,
    Http {
        status: u16,
        /// Raw response body
        body: String,
    },
    Ftp {
        /// Remote directory relative to the configured base
        remote_dir: String,
        bytes: u64,
    },
}

/// Upload errors
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Invalid upload endpoint {endpoint}: {reason}")]
    Endpoint { endpoint: String, reason: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upload rejected with HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("FTP failure while {state}: {failure}")]
    Ftp { state: FtpState, failure: FtpFailure },

    #[error("Cannot read archive {}: {source}", path.display())]
    Archive {
        path: std::path::PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Opens an FTP control connection to a `host` or `host:port`
pub type FtpConnector = Box<dyn Fn(&str) -> Result<Box<dyn FtpSession>, FtpFailure>>;

fn suppaftp_connector() -> FtpConnector {
    Box::new(|host: &str| {
        SuppaFtpSession::connect(host).map(|session| Box::new(session) as Box<dyn FtpSession>)
    })
}

/// Dispatches one upload to the selected transport
pub struct Uploader {
    target: UploadTarget,
    http: HttpUploader,
    ftp_connect: FtpConnector,
}

impl Uploader {
    pub fn new(target: UploadTarget) -> Self {
        Self {
            target,
            http: HttpUploader::new(),
            ftp_connect: suppaftp_connector(),
        }
    }

    /// Use a preconfigured HTTP uploader
    pub fn with_http(mut self, http: HttpUploader) -> Self {
        self.http = http;
        self
    }

    /// Open FTP sessions with `connect` instead of a real control connection
    pub fn with_ftp_connector<F, S>(mut self, connect: F) -> Self
    where
        F: Fn(&str) -> Result<S, FtpFailure> + 'static,
        S: FtpSession + 'static,
    {
        self.ftp_connect = Box::new(move |host: &str| {
            connect(host).map(|session| Box::new(session) as Box<dyn FtpSession>)
        });
        self
    }

    pub fn target(&self) -> &UploadTarget {
        &self.target
    }

    pub fn upload(&self, request: &UploadRequest<'_>) -> Result<UploadOutcome, UploadError> {
        match &self.target {
            UploadTarget::None => {
                tracing::info!("no upload configuration, skipping upload");
                Ok(UploadOutcome::Skipped)
            }
            UploadTarget::Http(config) => {
                tracing::info!(endpoint = %config.endpoint, file = request.file_name, "uploading over HTTP");
                let receipt = self.http.post(config, request)?;
                Ok(UploadOutcome::Http {
                    status: receipt.status,
                    body: receipt.body,
                })
            }
            UploadTarget::Ftp(config) => {
                tracing::info!(host = %config.host, file = request.file_name, "uploading over FTP");
                let upload = FtpUpload::connect(&config.host, |host| (self.ftp_connect)(host))?;
                let receipt = upload.run(config, request)?;
                Ok(UploadOutcome::Ftp {
                    remote_dir: receipt.remote_dir,
                    bytes: receipt.bytes,
                })
            }
        }
    }
}
