//! Recursive upload of a local tree into a remote session.
//!
//! Each subtree runs the same four steps:
//!
//! ```text
//! enter      cwd(remote_dir)
//! create     on failure: mkdir(remote_dir), cwd(remote_dir)
//! populate   sorted entries: recurse into directories, store files
//! restore    cwd(<pwd before enter>), always
//! ```
//!
//! A subtree whose directory cannot be entered or created is abandoned: its
//! files are reported as skipped and siblings carry on. A failed upload only
//! affects that file. The session's working directory is the same on return
//! as on entry, whatever happened below.
//!
//! Entries are visited in byte-wise name order so two runs over the same tree
//! issue the same remote operations.

use super::session::{SessionError, TransferSession};
use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum MirrorFailure {
    #[error("remote directory {remote} ({}): {source}", local.display())]
    RemoteDirectory {
        local: PathBuf,
        remote: String,
        source: SessionError,
    },
    #[error("upload of {} to {remote} failed: {source}", local.display())]
    RemoteUpload {
        local: PathBuf,
        remote: String,
        source: SessionError,
    },
    #[error("cannot read {}: {source}", local.display())]
    LocalRead {
        local: PathBuf,
        source: std::io::Error,
    },
    #[error("file name is not valid UTF-8: {}", .0.display())]
    InvalidName(PathBuf),
    #[error("failed to return to {remote}: {source}")]
    Restore {
        remote: String,
        source: SessionError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    Uploaded { bytes: u64 },
    Failed,
    /// Never attempted because its directory could not be entered.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutcome {
    pub local_path: PathBuf,
    pub remote_path: String,
    pub status: UploadStatus,
}

#[derive(Debug, Default)]
pub struct MirrorReport {
    pub files: Vec<FileOutcome>,
    /// Remote directories created during the run.
    pub created_dirs: Vec<String>,
    pub failures: Vec<MirrorFailure>,
}

impl MirrorReport {
    /// Every directory entered and every file uploaded.
    pub fn success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn uploaded(&self) -> impl Iterator<Item = &FileOutcome> {
        self.files
            .iter()
            .filter(|f| matches!(f.status, UploadStatus::Uploaded { .. }))
    }

    pub fn uploaded_bytes(&self) -> u64 {
        self.files
            .iter()
            .map(|f| match f.status {
                UploadStatus::Uploaded { bytes } => bytes,
                _ => 0,
            })
            .sum()
    }
}

/// Mirror `local_dir` into `remote_dir` (relative to the session's current
/// directory). The returned report says whether everything made it.
pub fn mirror<S: TransferSession + ?Sized>(
    session: &mut S,
    local_dir: &Path,
    remote_dir: &str,
) -> MirrorReport {
    let mut report = MirrorReport::default();
    let _ = mirror_subtree(session, local_dir, remote_dir, &mut report);
    if report.success() {
        info!(files = report.files.len(), "mirror complete");
    } else {
        warn!(failures = report.failures.len(), "mirror finished with errors");
    }
    report
}

/// Returns `false` when the session could not be put back in the directory
/// it was in on entry; the caller's working directory is then unknown.
#[must_use]
fn mirror_subtree<S: TransferSession + ?Sized>(
    session: &mut S,
    local_dir: &Path,
    remote_dir: &str,
    report: &mut MirrorReport,
) -> bool {
    let previous = match session.pwd() {
        Ok(path) => path,
        Err(source) => {
            error!(local = %local_dir.display(), "cannot read remote working directory: {source}");
            report.failures.push(MirrorFailure::RemoteDirectory {
                local: local_dir.to_path_buf(),
                remote: remote_dir.to_string(),
                source,
            });
            skip_subtree(local_dir, remote_dir, report);
            return true;
        }
    };
    let here = remote_join(&previous, remote_dir);

    match enter(session, remote_dir, &here, report) {
        Ok(()) => {
            info!(local = %local_dir.display(), remote = %here, "entered");
            populate(session, local_dir, &here, report);
        }
        Err(source) => {
            error!(remote = %here, "cannot enter or create directory: {source}");
            report.failures.push(MirrorFailure::RemoteDirectory {
                local: local_dir.to_path_buf(),
                remote: here.clone(),
                source,
            });
            skip_subtree(local_dir, &here, report);
        }
    }

    match session.cwd(&previous) {
        Ok(()) => true,
        Err(source) => {
            error!(remote = %previous, "cannot restore working directory: {source}");
            report.failures.push(MirrorFailure::Restore {
                remote: previous,
                source,
            });
            false
        }
    }
}

/// `cwd`, falling back to `mkdir` + `cwd`. A `cwd` failing right after a
/// successful `mkdir` is not retried.
fn enter<S: TransferSession + ?Sized>(
    session: &mut S,
    remote_dir: &str,
    absolute: &str,
    report: &mut MirrorReport,
) -> Result<(), SessionError> {
    match session.cwd(remote_dir) {
        Ok(()) => return Ok(()),
        Err(e) => debug!(remote = %absolute, "cwd failed, creating: {e}"),
    }
    session.mkdir(remote_dir)?;
    info!(remote = %absolute, "created directory");
    report.created_dirs.push(absolute.to_string());
    session.cwd(remote_dir)
}

fn populate<S: TransferSession + ?Sized>(
    session: &mut S,
    local_dir: &Path,
    here: &str,
    report: &mut MirrorReport,
) {
    let entries = match sorted_entries(local_dir) {
        Ok(entries) => entries,
        Err(source) => {
            error!(local = %local_dir.display(), "cannot list directory: {source}");
            report.failures.push(MirrorFailure::LocalRead {
                local: local_dir.to_path_buf(),
                source,
            });
            return;
        }
    };

    let mut remaining = entries.into_iter();
    while let Some(path) = remaining.next() {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            warn!(local = %path.display(), "skipping non UTF-8 name");
            report.failures.push(MirrorFailure::InvalidName(path.clone()));
            continue;
        };
        let name = name.to_string();
        if !path.is_dir() {
            upload(session, &path, &name, here, report);
            continue;
        }
        if !mirror_subtree(session, &path, &name, report) {
            // The session is stranded in some other directory: anything
            // stored now would land there.
            warn!(remote = %here, "abandoning rest of directory");
            for rest in remaining.by_ref() {
                skip_entry(&rest, here, report);
            }
        }
    }
}

/// Record a file, or every file under a directory, as skipped.
fn skip_entry(path: &Path, here: &str, report: &mut MirrorReport) {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let remote = remote_join(here, &name);
    if path.is_dir() {
        skip_subtree(path, &remote, report);
    } else {
        report.files.push(FileOutcome {
            local_path: path.to_path_buf(),
            remote_path: remote,
            status: UploadStatus::Skipped,
        });
    }
}

fn sorted_entries(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort();
    Ok(entries)
}

fn upload<S: TransferSession + ?Sized>(
    session: &mut S,
    local: &Path,
    name: &str,
    here: &str,
    report: &mut MirrorReport,
) {
    let remote_path = remote_join(here, name);
    let status = match fs::File::open(local) {
        Ok(file) => match session.store(name, &mut BufReader::new(file)) {
            Ok(bytes) => {
                info!(local = %local.display(), remote = %remote_path, bytes, "uploaded");
                UploadStatus::Uploaded { bytes }
            }
            Err(source) => {
                warn!(local = %local.display(), remote = %remote_path, "upload failed: {source}");
                report.failures.push(MirrorFailure::RemoteUpload {
                    local: local.to_path_buf(),
                    remote: remote_path.clone(),
                    source,
                });
                UploadStatus::Failed
            }
        },
        Err(source) => {
            warn!(local = %local.display(), "cannot open: {source}");
            report.failures.push(MirrorFailure::LocalRead {
                local: local.to_path_buf(),
                source,
            });
            UploadStatus::Failed
        }
    };
    report.files.push(FileOutcome {
        local_path: local.to_path_buf(),
        remote_path,
        status,
    });
}

/// Record every file under an abandoned directory as skipped.
fn skip_subtree(local_dir: &Path, remote_base: &str, report: &mut MirrorReport) {
    for entry in WalkDir::new(local_dir)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| !e.file_type().is_dir())
    {
        let relative = entry
            .path()
            .strip_prefix(local_dir)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");
        report.files.push(FileOutcome {
            local_path: entry.path().to_path_buf(),
            remote_path: remote_join(remote_base, &relative),
            status: UploadStatus::Skipped,
        });
    }
}

/// Join a remote base path and a relative name, treating `.` as "here".
fn remote_join(base: &str, name: &str) -> String {
    if name.starts_with('/') {
        return name.to_string();
    }
    let name = name.trim_start_matches("./");
    if name.is_empty() || name == "." {
        base.to_string()
    } else if base.ends_with('/') {
        format!("{base}{name}")
    } else {
        format!("{base}/{name}")
    }
}
