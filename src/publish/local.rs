//! [`TransferSession`] backed by a local directory.
//!
//! Used by `publish --to-dir` to stage a deploy on disk, and by integration
//! tests. The directory plays the role of the server root: `pwd` reports
//! `/`-rooted virtual paths and `..` never climbs above it.

use super::session::{RemoteEntry, SessionError, TransferSession};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

pub struct LocalSession {
    root: PathBuf,
    /// Components below `root` of the current directory.
    current: Vec<String>,
}

impl LocalSession {
    /// Open a session rooted at `root`, creating it if needed.
    pub fn open(root: &Path) -> Result<Self, SessionError> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
            current: Vec::new(),
        })
    }

    fn resolve(&self, path: &str) -> Vec<String> {
        let mut parts = if path.starts_with('/') {
            Vec::new()
        } else {
            self.current.clone()
        };
        for part in path.split('/') {
            match part {
                "" | "." => {}
                ".." => {
                    parts.pop();
                }
                other => parts.push(other.to_string()),
            }
        }
        parts
    }

    fn on_disk(&self, parts: &[String]) -> PathBuf {
        parts.iter().fold(self.root.clone(), |acc, p| acc.join(p))
    }
}

impl TransferSession for LocalSession {
    fn login(&mut self, _user: &str, _password: &str) -> Result<(), SessionError> {
        Ok(())
    }

    fn pwd(&mut self) -> Result<String, SessionError> {
        Ok(format!("/{}", self.current.join("/")))
    }

    fn cwd(&mut self, path: &str) -> Result<(), SessionError> {
        let parts = self.resolve(path);
        if !self.on_disk(&parts).is_dir() {
            return Err(SessionError::Rejected(format!("no such directory: {path}")));
        }
        self.current = parts;
        Ok(())
    }

    fn mkdir(&mut self, path: &str) -> Result<(), SessionError> {
        let target = self.on_disk(&self.resolve(path));
        fs::create_dir(target)?;
        Ok(())
    }

    fn store(&mut self, name: &str, reader: &mut dyn Read) -> Result<u64, SessionError> {
        if name.contains('/') {
            return Err(SessionError::Rejected(format!("invalid file name: {name}")));
        }
        let mut file = fs::File::create(self.on_disk(&self.current).join(name))?;
        Ok(std::io::copy(reader, &mut file)?)
    }

    fn list(&mut self, path: Option<&str>) -> Result<Vec<RemoteEntry>, SessionError> {
        let dir = self.on_disk(&self.resolve(path.unwrap_or(".")));
        let mut entries = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            entries.push(RemoteEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_directory: entry.file_type()?.is_dir(),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn quit(&mut self) -> Result<(), SessionError> {
        Ok(())
    }
}
