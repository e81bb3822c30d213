//! Stateful remote file store sessions.
//!
//! A [`TransferSession`] is a logged-in connection with a current working
//! directory: `cwd`, `mkdir` and `store` all act relative to it. The mirror
//! relies on that shared state, so sessions are `&mut` everywhere and never
//! shared between threads.
//!
//! | Implementation | Transport |
//! |---|---|
//! | [`FtpSession`] | FTP via `suppaftp`, binary transfer mode |
//! | [`LocalSession`](super::local::LocalSession) | a directory on local disk |
//! | [`FakeSession`](tests::FakeSession) | in-memory tree with scripted failures (tests) |

use std::io::Read;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("FTP error: {0}")]
    Ftp(#[from] suppaftp::FtpError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Rejected(String),
}

/// One entry of a remote directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub is_directory: bool,
}

/// Operations the mirror and publish steps need from a remote store.
pub trait TransferSession {
    fn login(&mut self, user: &str, password: &str) -> Result<(), SessionError>;

    /// Absolute path of the current working directory.
    fn pwd(&mut self) -> Result<String, SessionError>;

    /// Change directory; relative paths resolve against the current one.
    fn cwd(&mut self, path: &str) -> Result<(), SessionError>;

    fn mkdir(&mut self, path: &str) -> Result<(), SessionError>;

    /// Upload `reader` as `name` in the current directory, returning bytes sent.
    fn store(&mut self, name: &str, reader: &mut dyn Read) -> Result<u64, SessionError>;

    /// List `path`, or the current directory when `None`.
    fn list(&mut self, path: Option<&str>) -> Result<Vec<RemoteEntry>, SessionError>;

    fn quit(&mut self) -> Result<(), SessionError>;
}

/// `host:port` for a host that may already carry a port.
pub fn endpoint(host: &str, default_port: u16) -> String {
    if let Some(rest) = host.strip_prefix('[') {
        return if rest.contains("]:") {
            host.to_string()
        } else {
            format!("{host}:{default_port}")
        };
    }
    match host.matches(':').count() {
        0 => format!("{host}:{default_port}"),
        1 => host.to_string(),
        _ => format!("[{host}]:{default_port}"),
    }
}

/// FTP session over a plain control connection.
pub struct FtpSession {
    stream: suppaftp::FtpStream,
}

impl FtpSession {
    pub fn connect(host: &str, default_port: u16) -> Result<Self, SessionError> {
        let address = endpoint(host, default_port);
        debug!(%address, "connecting");
        let stream = suppaftp::FtpStream::connect(address.as_str())?;
        Ok(Self { stream })
    }
}

impl TransferSession for FtpSession {
    fn login(&mut self, user: &str, password: &str) -> Result<(), SessionError> {
        self.stream.login(user, password)?;
        self.stream
            .transfer_type(suppaftp::types::FileType::Binary)?;
        Ok(())
    }

    fn pwd(&mut self) -> Result<String, SessionError> {
        Ok(self.stream.pwd()?)
    }

    fn cwd(&mut self, path: &str) -> Result<(), SessionError> {
        Ok(self.stream.cwd(path)?)
    }

    fn mkdir(&mut self, path: &str) -> Result<(), SessionError> {
        Ok(self.stream.mkdir(path)?)
    }

    fn store(&mut self, name: &str, mut reader: &mut dyn Read) -> Result<u64, SessionError> {
        Ok(self.stream.put_file(name, &mut reader)?)
    }

    fn list(&mut self, path: Option<&str>) -> Result<Vec<RemoteEntry>, SessionError> {
        let lines = self.stream.list(path)?;
        Ok(parse_listing(&lines))
    }

    fn quit(&mut self) -> Result<(), SessionError> {
        Ok(self.stream.quit()?)
    }
}

/// Parse `LIST` output. Lines that are not entries ("total 12") are skipped.
fn parse_listing(lines: &[String]) -> Vec<RemoteEntry> {
    lines
        .iter()
        .filter_map(|line| match line.parse::<suppaftp::list::File>() {
            Ok(file) => Some(RemoteEntry {
                name: file.name().to_string(),
                is_directory: file.is_directory(),
            }),
            Err(_) => {
                debug!(%line, "skipping unparsable listing line");
                None
            }
        })
        .filter(|entry| entry.name != "." && entry.name != "..")
        .collect()
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};

    /// Every call made against a [`FakeSession`], in order.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum SessionOp {
        Login(String),
        Pwd,
        Cwd(String),
        Mkdir(String),
        /// Upload of `name` while the working directory was `dir`.
        Store { name: String, dir: String },
        List(Option<String>),
        Quit,
    }

    /// In-memory remote tree with scripted failures.
    ///
    /// Paths are absolute, `/`-separated; `/` always exists.
    pub struct FakeSession {
        pub dirs: BTreeSet<String>,
        pub files: BTreeMap<String, Vec<u8>>,
        pub current: String,
        pub ops: Vec<SessionOp>,
        /// Absolute paths whose `mkdir` is refused.
        pub fail_mkdir: BTreeSet<String>,
        /// Absolute paths whose `mkdir` reports success without creating anything.
        pub phantom_mkdir: BTreeSet<String>,
        /// File names whose `store` is refused.
        pub fail_store: BTreeSet<String>,
        /// `cwd` arguments, as passed, refused the next time each is seen.
        pub refuse_cwd_once: BTreeSet<String>,
        pub fail_login: bool,
        pub fail_pwd: bool,
    }

    impl Default for FakeSession {
        fn default() -> Self {
            Self {
                dirs: BTreeSet::from(["/".to_string()]),
                files: BTreeMap::new(),
                current: "/".to_string(),
                ops: Vec::new(),
                fail_mkdir: BTreeSet::new(),
                phantom_mkdir: BTreeSet::new(),
                fail_store: BTreeSet::new(),
                refuse_cwd_once: BTreeSet::new(),
                fail_login: false,
                fail_pwd: false,
            }
        }
    }

    impl FakeSession {
        pub fn new() -> Self {
            Self::default()
        }

        /// Pre-create a directory (and its parents).
        pub fn with_dir(mut self, path: &str) -> Self {
            let mut built = String::new();
            for part in path.split('/').filter(|p| !p.is_empty()) {
                built = format!("{built}/{part}");
                self.dirs.insert(built.clone());
            }
            self
        }

        pub fn failing_mkdir(mut self, path: &str) -> Self {
            self.fail_mkdir.insert(path.to_string());
            self
        }

        pub fn phantom_mkdir(mut self, path: &str) -> Self {
            self.phantom_mkdir.insert(path.to_string());
            self
        }

        pub fn failing_store(mut self, name: &str) -> Self {
            self.fail_store.insert(name.to_string());
            self
        }

        pub fn refusing_cwd_once(mut self, path: &str) -> Self {
            self.refuse_cwd_once.insert(path.to_string());
            self
        }

        pub fn store_count(&self) -> usize {
            self.ops
                .iter()
                .filter(|op| matches!(op, SessionOp::Store { .. }))
                .count()
        }

        /// Ops other than `Pwd`, which the mirror issues for bookkeeping.
        pub fn visible_ops(&self) -> Vec<SessionOp> {
            self.ops
                .iter()
                .filter(|op| **op != SessionOp::Pwd)
                .cloned()
                .collect()
        }

        pub fn resolve(&self, path: &str) -> String {
            let mut parts: Vec<&str> = if path.starts_with('/') {
                Vec::new()
            } else {
                self.current.split('/').filter(|p| !p.is_empty()).collect()
            };
            for part in path.split('/') {
                match part {
                    "" | "." => {}
                    ".." => {
                        parts.pop();
                    }
                    other => parts.push(other),
                }
            }
            format!("/{}", parts.join("/"))
        }

        fn child(dir: &str, name: &str) -> String {
            if dir == "/" {
                format!("/{name}")
            } else {
                format!("{dir}/{name}")
            }
        }

        fn rejected(what: &str, path: &str) -> SessionError {
            SessionError::Rejected(format!("550 {what} {path}"))
        }
    }

    impl TransferSession for FakeSession {
        fn login(&mut self, user: &str, _password: &str) -> Result<(), SessionError> {
            self.ops.push(SessionOp::Login(user.to_string()));
            if self.fail_login {
                return Err(SessionError::Rejected("530 Login incorrect".to_string()));
            }
            Ok(())
        }

        fn pwd(&mut self) -> Result<String, SessionError> {
            self.ops.push(SessionOp::Pwd);
            if self.fail_pwd {
                return Err(Self::rejected("pwd", &self.current));
            }
            Ok(self.current.clone())
        }

        fn cwd(&mut self, path: &str) -> Result<(), SessionError> {
            self.ops.push(SessionOp::Cwd(path.to_string()));
            if self.refuse_cwd_once.remove(path) {
                return Err(Self::rejected("cannot change to", path));
            }
            let target = self.resolve(path);
            if !self.dirs.contains(&target) {
                return Err(Self::rejected("no such directory", &target));
            }
            self.current = target;
            Ok(())
        }

        fn mkdir(&mut self, path: &str) -> Result<(), SessionError> {
            self.ops.push(SessionOp::Mkdir(path.to_string()));
            let target = self.resolve(path);
            if self.fail_mkdir.contains(&target) || self.dirs.contains(&target) {
                return Err(Self::rejected("cannot create", &target));
            }
            if !self.phantom_mkdir.contains(&target) {
                self.dirs.insert(target);
            }
            Ok(())
        }

        fn store(&mut self, name: &str, reader: &mut dyn Read) -> Result<u64, SessionError> {
            self.ops.push(SessionOp::Store {
                name: name.to_string(),
                dir: self.current.clone(),
            });
            if self.fail_store.contains(name) {
                return Err(Self::rejected("cannot store", name));
            }
            let mut content = Vec::new();
            reader.read_to_end(&mut content)?;
            let size = content.len() as u64;
            self.files
                .insert(Self::child(&self.current, name), content);
            Ok(size)
        }

        fn list(&mut self, path: Option<&str>) -> Result<Vec<RemoteEntry>, SessionError> {
            self.ops.push(SessionOp::List(path.map(str::to_string)));
            let dir = self.resolve(path.unwrap_or("."));
            if !self.dirs.contains(&dir) {
                return Err(Self::rejected("no such directory", &dir));
            }
            let prefix = Self::child(&dir, "");
            let direct = |p: &String| {
                p.strip_prefix(&prefix)
                    .filter(|rest| !rest.is_empty() && !rest.contains('/'))
                    .map(str::to_string)
            };
            let mut entries: Vec<RemoteEntry> = self
                .dirs
                .iter()
                .filter_map(direct)
                .map(|name| RemoteEntry {
                    name,
                    is_directory: true,
                })
                .chain(self.files.keys().filter_map(direct).map(|name| RemoteEntry {
                    name,
                    is_directory: false,
                }))
                .collect();
            entries.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(entries)
        }

        fn quit(&mut self) -> Result<(), SessionError> {
            self.ops.push(SessionOp::Quit);
            Ok(())
        }
    }

    // =========================================================================
    // Endpoint + listing parsing
    // =========================================================================

    #[test]
    fn endpoint_adds_port_only_when_missing() {
        assert_eq!(endpoint("ftp.example.com", 21), "ftp.example.com:21");
        assert_eq!(endpoint("ftp.example.com:2121", 21), "ftp.example.com:2121");
        assert_eq!(endpoint("10.0.0.5", 990), "10.0.0.5:990");
        assert_eq!(endpoint("::1", 21), "[::1]:21");
        assert_eq!(endpoint("[::1]", 21), "[::1]:21");
        assert_eq!(endpoint("[::1]:2121", 21), "[::1]:2121");
    }

    #[test]
    fn parse_listing_reads_unix_lines() {
        let lines = vec![
            "total 8".to_string(),
            "drwxr-xr-x    2 web      web          4096 Mar 01 12:00 assets".to_string(),
            "-rw-r--r--    1 web      web          1534 Mar 01 12:00 index.html".to_string(),
        ];
        assert_eq!(
            parse_listing(&lines),
            vec![
                RemoteEntry {
                    name: "assets".to_string(),
                    is_directory: true
                },
                RemoteEntry {
                    name: "index.html".to_string(),
                    is_directory: false
                },
            ]
        );
    }

    // =========================================================================
    // FakeSession behaviour the mirror tests rely on
    // =========================================================================

    #[test]
    fn fake_resolves_relative_paths() {
        let mut session = FakeSession::new().with_dir("/a/b");
        session.cwd("a").unwrap();
        assert_eq!(session.resolve("b/../c"), "/a/c");
        assert_eq!(session.resolve("."), "/a");
        assert_eq!(session.resolve("/x/./y"), "/x/y");
        session.cwd("..").unwrap();
        assert_eq!(session.pwd().unwrap(), "/");
    }

    #[test]
    fn fake_cwd_into_missing_dir_fails_and_stays() {
        let mut session = FakeSession::new();
        assert!(session.cwd("nope").is_err());
        assert_eq!(session.current, "/");
    }

    #[test]
    fn fake_phantom_mkdir_succeeds_but_cwd_fails() {
        let mut session = FakeSession::new().phantom_mkdir("/ghost");
        session.mkdir("ghost").unwrap();
        assert!(session.cwd("ghost").is_err());
    }

    #[test]
    fn fake_store_and_list() {
        let mut session = FakeSession::new().with_dir("/site/css");
        session.cwd("site").unwrap();
        session.store("index.html", &mut &b"<html>"[..]).unwrap();

        assert_eq!(session.files["/site/index.html"], b"<html>");
        let names: Vec<_> = session
            .list(None)
            .unwrap()
            .into_iter()
            .map(|e| (e.name, e.is_directory))
            .collect();
        assert_eq!(
            names,
            vec![("css".to_string(), true), ("index.html".to_string(), false)]
        );
    }
}
