//! FTP upload transport
//!
//! Session states, in order:
//!
//! ```text
//! Disconnected → Authenticated → DirectorySelected → [BranchSubdirSelected] → Uploaded → Closed
//! ```
//!
//! Builds for a branch other than the default branch land in
//! `branch/<project>-<branch>` under the configured directory; both levels
//! are created when missing. No step is retried. Once connected, the
//! session is always sent `QUIT`, even when an earlier step failed.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::sync::{Arc, Mutex, MutexGuard};

use suppaftp::types::FileType;
use suppaftp::FtpStream;

use super::{Credentials, UploadError, UploadRequest};

/// Folder that holds per-branch upload directories
pub const BRANCH_FOLDER: &str = "branch";

/// Port used when the host has none
pub const DEFAULT_FTP_PORT: u16 = 21;

/// FTP transport settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtpConfig {
    /// `host` or `host:port`
    pub host: String,
    pub credentials: Credentials,
    /// Base directory on the server
    pub directory: String,
}

/// Where an FTP upload currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FtpState {
    Disconnected,
    Authenticated,
    DirectorySelected,
    BranchSubdirSelected,
    Uploaded,
    Closed,
}

impl fmt::Display for FtpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FtpState::Disconnected => "disconnected",
            FtpState::Authenticated => "authenticated",
            FtpState::DirectorySelected => "in upload directory",
            FtpState::BranchSubdirSelected => "in branch directory",
            FtpState::Uploaded => "uploaded",
            FtpState::Closed => "closed",
        };
        f.write_str(text)
    }
}

/// A failed FTP command, carrying the server reply or I/O error text
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{command}: {reply}")]
pub struct FtpFailure {
    pub command: String,
    pub reply: String,
}

impl FtpFailure {
    pub fn new(command: impl Into<String>, reply: impl fmt::Display) -> Self {
        Self {
            command: command.into(),
            reply: reply.to_string().trim_end().to_string(),
        }
    }
}

/// The FTP commands an upload needs
pub trait FtpSession {
    fn login(&mut self, credentials: &Credentials) -> Result<(), FtpFailure>;

    /// `CWD`
    fn cwd(&mut self, dir: &str) -> Result<(), FtpFailure>;

    /// `MKD`
    fn mkdir(&mut self, dir: &str) -> Result<(), FtpFailure>;

    /// Binary `STOR`, returning the number of bytes sent
    fn store(&mut self, name: &str, reader: &mut dyn Read) -> Result<u64, FtpFailure>;

    /// `QUIT`
    fn quit(&mut self) -> Result<(), FtpFailure>;
}

impl<S: FtpSession + ?Sized> FtpSession for Box<S> {
    fn login(&mut self, credentials: &Credentials) -> Result<(), FtpFailure> {
        (**self).login(credentials)
    }

    fn cwd(&mut self, dir: &str) -> Result<(), FtpFailure> {
        (**self).cwd(dir)
    }

    fn mkdir(&mut self, dir: &str) -> Result<(), FtpFailure> {
        (**self).mkdir(dir)
    }

    fn store(&mut self, name: &str, reader: &mut dyn Read) -> Result<u64, FtpFailure> {
        (**self).store(name, reader)
    }

    fn quit(&mut self) -> Result<(), FtpFailure> {
        (**self).quit()
    }
}

/// Per-branch directory name, or `None` for the default branch
pub fn branch_subdir(project: &str, branch: &str, default_branch: &str) -> Option<String> {
    (branch != default_branch).then(|| format!("{}-{}", project, branch))
}

/// Result of a completed FTP upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtpReceipt {
    /// Directory relative to the configured base (empty for the default branch)
    pub remote_dir: String,
    pub bytes: u64,
}

/// One FTP upload, tracking its session state
pub struct FtpUpload<S: FtpSession> {
    session: S,
    state: FtpState,
}

impl<S: FtpSession> FtpUpload<S> {
    /// Open the control connection via `connect`
    pub fn connect<F>(host: &str, connect: F) -> Result<Self, UploadError>
    where
        F: FnOnce(&str) -> Result<S, FtpFailure>,
    {
        let session = connect(host).map_err(|failure| UploadError::Ftp {
            state: FtpState::Disconnected,
            failure,
        })?;
        Ok(Self::from_session(session))
    }

    /// Wrap an already connected session
    pub fn from_session(session: S) -> Self {
        Self {
            session,
            state: FtpState::Disconnected,
        }
    }

    pub fn state(&self) -> FtpState {
        self.state
    }

    /// Log in, select the directory, store the archive and close the session
    pub fn run(
        mut self,
        config: &FtpConfig,
        request: &UploadRequest<'_>,
    ) -> Result<FtpReceipt, UploadError> {
        let result = self.transfer(config, request);

        let quit = self.session.quit();
        self.advance(FtpState::Closed);

        match (result, quit) {
            (Ok(receipt), Ok(())) => Ok(receipt),
            (Ok(_), Err(failure)) => Err(UploadError::Ftp {
                state: FtpState::Uploaded,
                failure,
            }),
            (Err(e), quit) => {
                if let Err(failure) = quit {
                    tracing::warn!(%failure, "FTP QUIT failed after an earlier error");
                }
                Err(e)
            }
        }
    }

    fn transfer(
        &mut self,
        config: &FtpConfig,
        request: &UploadRequest<'_>,
    ) -> Result<FtpReceipt, UploadError> {
        self.session
            .login(&config.credentials)
            .map_err(|f| self.fail(f))?;
        self.advance(FtpState::Authenticated);

        self.session
            .cwd(&config.directory)
            .map_err(|f| self.fail(f))?;
        self.advance(FtpState::DirectorySelected);

        let mut remote_dir = String::new();
        if let Some(subdir) = branch_subdir(request.project, request.branch, request.default_branch)
        {
            self.enter_or_create(BRANCH_FOLDER)?;
            self.enter_or_create(&subdir)?;
            self.advance(FtpState::BranchSubdirSelected);
            remote_dir = format!("{}/{}", BRANCH_FOLDER, subdir);
        }

        let file = File::open(request.archive_path).map_err(|source| UploadError::Archive {
            path: request.archive_path.to_path_buf(),
            source,
        })?;
        let mut reader = BufReader::new(file);
        let bytes = self
            .session
            .store(request.file_name, &mut reader)
            .map_err(|f| self.fail(f))?;
        self.advance(FtpState::Uploaded);

        Ok(FtpReceipt { remote_dir, bytes })
    }

    /// `MKD` then `CWD`. A failed `MKD` is only accepted when the directory
    /// turns out to exist, i.e. `CWD` into it succeeds.
    fn enter_or_create(&mut self, dir: &str) -> Result<(), UploadError> {
        match self.session.mkdir(dir) {
            Ok(()) => {
                tracing::debug!(dir, "created remote directory");
                self.session.cwd(dir).map_err(|f| self.fail(f))
            }
            Err(mkdir_failure) => match self.session.cwd(dir) {
                Ok(()) => {
                    tracing::debug!(dir, "remote directory already exists");
                    Ok(())
                }
                Err(_) => Err(self.fail(mkdir_failure)),
            },
        }
    }

    fn advance(&mut self, next: FtpState) {
        tracing::debug!(from = %self.state, to = %next, "FTP state");
        self.state = next;
    }

    fn fail(&self, failure: FtpFailure) -> UploadError {
        UploadError::Ftp {
            state: self.state,
            failure,
        }
    }
}

/// [`FtpSession`] over a real control connection
pub struct SuppaFtpSession {
    stream: FtpStream,
}

impl SuppaFtpSession {
    /// Connect to `host`, defaulting to port 21
    pub fn connect(host: &str) -> Result<Self, FtpFailure> {
        let addr = with_default_port(host);
        let stream = FtpStream::connect(addr.as_str()).map_err(|e| FtpFailure::new("CONNECT", e))?;
        Ok(Self { stream })
    }
}

impl FtpSession for SuppaFtpSession {
    fn login(&mut self, credentials: &Credentials) -> Result<(), FtpFailure> {
        self.stream
            .login(credentials.username.as_str(), credentials.password.as_str())
            .map_err(|e| FtpFailure::new("USER/PASS", e))
    }

    fn cwd(&mut self, dir: &str) -> Result<(), FtpFailure> {
        self.stream
            .cwd(dir)
            .map_err(|e| FtpFailure::new(format!("CWD {}", dir), e))
    }

    fn mkdir(&mut self, dir: &str) -> Result<(), FtpFailure> {
        self.stream
            .mkdir(dir)
            .map_err(|e| FtpFailure::new(format!("MKD {}", dir), e))
    }

    fn store(&mut self, name: &str, mut reader: &mut dyn Read) -> Result<u64, FtpFailure> {
        self.stream
            .transfer_type(FileType::Binary)
            .map_err(|e| FtpFailure::new("TYPE I", e))?;
        self.stream
            .put_file(name, &mut reader)
            .map_err(|e| FtpFailure::new(format!("STOR {}", name), e))
    }

    fn quit(&mut self) -> Result<(), FtpFailure> {
        self.stream.quit().map_err(|e| FtpFailure::new("QUIT", e))
    }
}

/// Append `:21` unless the host already names a port.
///
/// Bare IPv6 literals are bracketed first; `[addr]:port` is kept.
fn with_default_port(host: &str) -> String {
    if let Some(rest) = host.strip_prefix('[') {
        let has_port = rest
            .split_once("]:")
            .is_some_and(|(_, port)| port.parse::<u16>().is_ok());
        return if has_port {
            host.to_string()
        } else {
            format!("{}:{}", host, DEFAULT_FTP_PORT)
        };
    }

    match host.rsplit_once(':') {
        Some((name, _)) if name.contains(':') => format!("[{}]:{}", host, DEFAULT_FTP_PORT),
        Some((_, port)) if port.parse::<u16>().is_ok() => host.to_string(),
        _ => format!("{}:{}", host, DEFAULT_FTP_PORT),
    }
}

#[derive(Debug, Default)]
struct MockFtpInner {
    logged_in: bool,
    cwd: Vec<String>,
    existing: Vec<String>,
    commands: Vec<String>,
    stored: Vec<(String, Vec<u8>)>,
    fail_on: Option<String>,
}

impl MockFtpInner {
    fn path_of(&self, dir: &str) -> String {
        if dir.starts_with('/') {
            dir.trim_end_matches('/').to_string()
        } else {
            let mut parts = self.cwd.clone();
            parts.extend(dir.split('/').filter(|p| !p.is_empty()).map(str::to_string));
            format!("/{}", parts.join("/"))
        }
    }

    fn check_fail(&self, command: &str) -> Result<(), FtpFailure> {
        match &self.fail_on {
            Some(verb) if command.starts_with(verb.as_str()) => {
                Err(FtpFailure::new(command, "550 Requested action not taken"))
            }
            _ => Ok(()),
        }
    }
}

/// In-memory FTP server for tests; clones share one state
#[derive(Debug, Clone, Default)]
pub struct MockFtpSession {
    inner: Arc<Mutex<MockFtpInner>>,
}

impl MockFtpSession {
    /// Server whose filesystem already holds `dirs` (absolute paths)
    pub fn with_dirs(dirs: &[&str]) -> Self {
        let session = Self::default();
        session.lock().existing = dirs.iter().map(|d| d.trim_end_matches('/').to_string()).collect();
        session
    }

    /// Fail every command starting with `verb` (e.g. `"STOR"`)
    pub fn fail_on(self, verb: &str) -> Self {
        self.lock().fail_on = Some(verb.to_string());
        self
    }

    fn lock(&self) -> MutexGuard<'_, MockFtpInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Commands received, in order
    pub fn commands(&self) -> Vec<String> {
        self.lock().commands.clone()
    }

    /// Absolute working directory
    pub fn current_dir(&self) -> String {
        format!("/{}", self.lock().cwd.join("/"))
    }

    pub fn dir_exists(&self, path: &str) -> bool {
        self.lock().existing.iter().any(|d| d == path)
    }

    /// Files stored as (absolute path, bytes)
    pub fn stored(&self) -> Vec<(String, Vec<u8>)> {
        self.lock().stored.clone()
    }
}

impl FtpSession for MockFtpSession {
    fn login(&mut self, credentials: &Credentials) -> Result<(), FtpFailure> {
        let mut inner = self.lock();
        inner.commands.push(format!("USER {}", credentials.username));
        inner.check_fail("USER")?;
        inner.logged_in = true;
        Ok(())
    }

    fn cwd(&mut self, dir: &str) -> Result<(), FtpFailure> {
        let mut inner = self.lock();
        let command = format!("CWD {}", dir);
        inner.commands.push(command.clone());
        inner.check_fail(&command)?;

        let target = inner.path_of(dir);
        if target != "/" && !inner.existing.contains(&target) {
            return Err(FtpFailure::new(command, "550 No such directory"));
        }
        inner.cwd = target
            .split('/')
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
        Ok(())
    }

    fn mkdir(&mut self, dir: &str) -> Result<(), FtpFailure> {
        let mut inner = self.lock();
        let command = format!("MKD {}", dir);
        inner.commands.push(command.clone());
        inner.check_fail(&command)?;

        let target = inner.path_of(dir);
        if inner.existing.contains(&target) {
            return Err(FtpFailure::new(command, "550 File exists"));
        }
        inner.existing.push(target);
        Ok(())
    }

    fn store(&mut self, name: &str, reader: &mut dyn Read) -> Result<u64, FtpFailure> {
        let mut inner = self.lock();
        let command = format!("STOR {}", name);
        inner.commands.push(command.clone());
        inner.check_fail(&command)?;
        if !inner.logged_in {
            return Err(FtpFailure::new(command, "530 Not logged in"));
        }

        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .map_err(|e| FtpFailure::new(command.as_str(), e))?;
        let path = inner.path_of(name);
        let len = bytes.len() as u64;
        inner.stored.push((path, bytes));
        Ok(len)
    }

    fn quit(&mut self) -> Result<(), FtpFailure> {
        let mut inner = self.lock();
        inner.commands.push("QUIT".to_string());
        inner.check_fail("QUIT")?;
        inner.logged_in = false;
        Ok(())
    }
}
