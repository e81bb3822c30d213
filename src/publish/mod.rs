//! Publishing the built site to the hosting server.
//!
//! ```text
//! connect → login (binary mode) → cwd remote_root → mirror(public/, ".") → quit
//! ```
//!
//! Connection, login and entering the remote root are fatal: nothing can be
//! uploaded without them. Everything after that is contained in the
//! [`MirrorReport`]. The session is closed whichever way the run ends.

pub mod local;
pub mod mirror;
pub mod session;

pub use local::LocalSession;
pub use mirror::{FileOutcome, MirrorFailure, MirrorReport, UploadStatus, mirror};
pub use session::{FtpSession, RemoteEntry, SessionError, TransferSession};

use crate::config::Credentials;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("session error: {0}")]
    Session(#[from] SessionError),
    #[error("cannot enter remote root {path}: {source}")]
    RemoteRoot { path: String, source: SessionError },
    #[error("build output not found: {}", .0.display())]
    MissingOutput(PathBuf),
}

/// Log in, enter `remote_root` and mirror `local_dir` into it, then quit.
pub fn publish<S: TransferSession + ?Sized>(
    session: &mut S,
    credentials: &Credentials,
    remote_root: &str,
    local_dir: &Path,
) -> Result<MirrorReport, PublishError> {
    if !local_dir.is_dir() {
        return Err(PublishError::MissingOutput(local_dir.to_path_buf()));
    }
    let result = login_and_mirror(session, credentials, remote_root, local_dir);
    close(session);
    result
}

fn login_and_mirror<S: TransferSession + ?Sized>(
    session: &mut S,
    credentials: &Credentials,
    remote_root: &str,
    local_dir: &Path,
) -> Result<MirrorReport, PublishError> {
    session.login(&credentials.user, &credentials.password)?;
    info!(host = %credentials.host, user = %credentials.user, "logged in");

    session
        .cwd(remote_root)
        .map_err(|source| PublishError::RemoteRoot {
            path: remote_root.to_string(),
            source,
        })?;
    info!(remote = %remote_root, local = %local_dir.display(), "uploading");

    Ok(mirror(session, local_dir, "."))
}

/// Connect over FTP and [`publish`].
pub fn publish_ftp(
    credentials: &Credentials,
    port: u16,
    remote_root: &str,
    local_dir: &Path,
) -> Result<MirrorReport, PublishError> {
    if !local_dir.is_dir() {
        return Err(PublishError::MissingOutput(local_dir.to_path_buf()));
    }
    let mut session = FtpSession::connect(&credentials.host, port)?;
    info!(host = %credentials.host, "connected");
    publish(&mut session, credentials, remote_root, local_dir)
}

/// Log in and list one remote directory.
pub fn list_remote<S: TransferSession + ?Sized>(
    session: &mut S,
    credentials: &Credentials,
    path: Option<&str>,
) -> Result<Vec<RemoteEntry>, PublishError> {
    let result = session
        .login(&credentials.user, &credentials.password)
        .and_then(|()| session.list(path))
        .map_err(PublishError::from);
    close(session);
    result
}

fn close<S: TransferSession + ?Sized>(session: &mut S) {
    if let Err(e) = session.quit() {
        warn!("failed to close session: {e}");
    }
}
