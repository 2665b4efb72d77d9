pub mod ftps;
pub mod listing;
#[cfg(test)]
pub mod memory;

use crate::error::{RemoteError, RemoteResult};
use serde::Serialize;
use std::io::{Read, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Dir,
    File,
    Link,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub name: String,
    pub kind: EntryKind,
    pub size: u64,
    /// Modification stamp as reported by the server, `YYYYMMDDHHMMSS` for MLSD
    /// or the raw `ls -l` date columns for LIST.
    pub modified: Option<String>,
}

impl Entry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }
}

/// A file-transfer session against a remote web space.
///
/// All paths are absolute and `/`-separated; implementations keep no
/// working-directory state between calls.
pub trait Remote {
    fn list(&mut self, dir: &str) -> RemoteResult<Vec<Entry>>;
    fn names(&mut self, dir: &str) -> RemoteResult<Vec<String>>;
    fn put(&mut self, path: &str, reader: &mut dyn Read) -> RemoteResult<u64>;
    fn get(&mut self, path: &str, writer: &mut dyn Write) -> RemoteResult<u64>;
    fn mkdir(&mut self, path: &str) -> RemoteResult<()>;
    fn rename(&mut self, from: &str, to: &str) -> RemoteResult<()>;
    fn remove(&mut self, path: &str) -> RemoteResult<()>;
    fn size(&mut self, path: &str) -> RemoteResult<Option<u64>>;
    /// Set permission bits, e.g. `0o755` for shell scripts.
    fn chmod(&mut self, path: &str, mode: u32) -> RemoteResult<()>;

    /// Look up a single entry by listing its parent.
    fn stat(&mut self, path: &str) -> RemoteResult<Option<Entry>> {
        let path = normalize(path);
        if path == "/" {
            return Ok(Some(Entry {
                name: "/".into(),
                kind: EntryKind::Dir,
                size: 0,
                modified: None,
            }));
        }
        let (parent, name) = split_parent_name(&path)?;
        match self.list(&parent) {
            Ok(entries) => Ok(entries.into_iter().find(|e| e.name == name)),
            Err(RemoteError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn exists(&mut self, path: &str) -> RemoteResult<bool> {
        Ok(self.stat(path)?.is_some())
    }

    /// Create `path` and any missing parents.
    ///
    /// A failed MKD only counts as success when the directory is then seen
    /// in its parent listing.
    fn ensure_dir(&mut self, path: &str) -> RemoteResult<()> {
        let path = normalize(path);
        let mut current = String::from("/");
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = join(&current, segment);
            match self.mkdir(&current) {
                Ok(()) => {}
                Err(RemoteError::AlreadyExists { .. }) => {}
                Err(err @ RemoteError::Reply { .. }) => match self.stat(&current)? {
                    Some(e) if e.kind != EntryKind::File => {}
                    _ => return Err(err),
                },
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// Join a directory and a relative name.
pub fn join(base: &str, name: &str) -> String {
    let name = name.trim_start_matches('/');
    let base = base.trim_end_matches('/');
    if name.is_empty() {
        return if base.is_empty() { "/".into() } else { base.into() };
    }
    format!("{base}/{name}")
}

/// Collapse duplicate slashes, drop `.` segments and force a leading `/`.
pub fn normalize(path: &str) -> String {
    let parts: Vec<&str> = path
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();
    format!("/{}", parts.join("/"))
}

pub fn split_parent_name(path: &str) -> RemoteResult<(String, String)> {
    let path = path.trim().trim_end_matches('/');
    if path.is_empty() || path == "/" {
        return Err(RemoteError::Config(
            "invalid path: cannot operate on root".into(),
        ));
    }
    match path.rsplit_once('/') {
        Some(("", name)) => Ok(("/".to_string(), name.to_string())),
        Some((parent, name)) => Ok((parent.to_string(), name.to_string())),
        None => Ok(("/".to_string(), path.to_string())),
    }
}

/// Resolve a command-line path against a target root: absolute paths are
/// taken as-is, relative ones hang off `root`.
pub fn resolve(root: &str, path: &str) -> String {
    if path.starts_with('/') {
        normalize(path)
    } else {
        normalize(&join(root, path))
    }
}
