//! The site working copy: fresh clone before a deploy, external build after
//! the generated assets are in place.
//!
//! Both steps shell out (`git`, the site's own build tool) with inherited
//! stdout/stderr, so their progress shows up directly in the terminal.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum WorkdirError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to walk working copy: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("`{command}` exited with {status}")]
    CommandFailed { command: String, status: ExitStatus },
    #[error("no repository url configured")]
    NoRepository,
    #[error("working copy not found: {}", .0.display())]
    MissingWorkingCopy(PathBuf),
}

/// Delete `dir` (if present) and clone `url` into it.
pub fn refresh_working_copy(url: &str, dir: &Path) -> Result<(), WorkdirError> {
    if url.is_empty() {
        return Err(WorkdirError::NoRepository);
    }
    remove_working_copy(dir)?;
    let dir_arg = dir.to_string_lossy().into_owned();
    run_command(&["git".into(), "clone".into(), url.into(), dir_arg], None)?;
    info!(url, dir = %dir.display(), "cloned");
    Ok(())
}

/// Remove a directory tree, clearing read-only bits first (git marks pack
/// files read-only).
pub fn remove_working_copy(dir: &Path) -> Result<(), WorkdirError> {
    if !dir.exists() {
        return Ok(());
    }
    for entry in WalkDir::new(dir) {
        let entry = entry?;
        if entry.path_is_symlink() {
            continue;
        }
        let mut permissions = entry.metadata()?.permissions();
        if permissions.readonly() {
            #[allow(clippy::permissions_set_readonly_false)]
            permissions.set_readonly(false);
            fs::set_permissions(entry.path(), permissions)?;
        }
    }
    fs::remove_dir_all(dir)?;
    debug!(dir = %dir.display(), "removed working copy");
    Ok(())
}

/// Run each build command in order inside `dir`; the first failure stops.
pub fn run_build(dir: &Path, commands: &[Vec<String>]) -> Result<(), WorkdirError> {
    if !dir.is_dir() {
        return Err(WorkdirError::MissingWorkingCopy(dir.to_path_buf()));
    }
    for argv in commands {
        run_command(argv, Some(dir))?;
    }
    Ok(())
}

fn run_command(argv: &[String], cwd: Option<&Path>) -> Result<(), WorkdirError> {
    let command = argv.join(" ");
    let Some((program, args)) = argv.split_first() else {
        return Ok(());
    };
    info!(%command, "running");

    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    let status = cmd.status().map_err(|source| WorkdirError::Spawn {
        command: command.clone(),
        source,
    })?;
    if !status.success() {
        return Err(WorkdirError::CommandFailed { command, status });
    }
    Ok(())
}
