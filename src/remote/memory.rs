//! In-memory [`Remote`] used by tests, with simple fault injection.

use super::{Entry, EntryKind, Remote, join, normalize, split_parent_name};
use crate::error::{RemoteError, RemoteResult};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::{Read, Write};

#[derive(Debug, Clone)]
enum Node {
    Dir,
    File(Vec<u8>),
    Link(String),
}

#[derive(Debug, Default)]
pub struct MemoryRemote {
    nodes: BTreeMap<String, Node>,
    /// Remaining transient failures per path for `put`/`get`.
    flaky: HashMap<String, u32>,
    /// Paths whose `put`/`get`/`remove`/`rename` always fail permanently.
    denied: HashSet<String>,
    /// Permanent replies forced for one command on one path.
    replies: HashMap<(&'static str, String), (u32, String)>,
    pub modes: HashMap<String, u32>,
    pub puts: Vec<String>,
    pub removed: Vec<String>,
    pub renames: Vec<(String, String)>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::Dir);
        Self {
            nodes,
            ..Self::default()
        }
    }

    pub fn add_dir(&mut self, path: &str) {
        let path = normalize(path);
        let mut current = String::from("/");
        for seg in path.split('/').filter(|s| !s.is_empty()) {
            current = join(&current, seg);
            self.nodes.entry(current.clone()).or_insert(Node::Dir);
        }
    }

    pub fn add_file(&mut self, path: &str, data: &[u8]) {
        let path = normalize(path);
        if let Ok((parent, _)) = split_parent_name(&path) {
            self.add_dir(&parent);
        }
        self.nodes.insert(path, Node::File(data.to_vec()));
    }

    pub fn add_link(&mut self, path: &str, target: &str) {
        let path = normalize(path);
        if let Ok((parent, _)) = split_parent_name(&path) {
            self.add_dir(&parent);
        }
        self.nodes.insert(path, Node::Link(target.to_string()));
    }

    pub fn fail_times(&mut self, path: &str, times: u32) {
        self.flaky.insert(normalize(path), times);
    }

    pub fn deny(&mut self, path: &str) {
        self.denied.insert(normalize(path));
    }

    /// Make every `op` on `path` fail with `code`, e.g. `("STOR", 552)`.
    pub fn reply(&mut self, op: &'static str, path: &str, code: u32, message: &str) {
        self.replies
            .insert((op, normalize(path)), (code, message.to_string()));
    }

    pub fn has_dir(&self, path: &str) -> bool {
        matches!(self.nodes.get(&normalize(path)), Some(Node::Dir))
    }

    pub fn file(&self, path: &str) -> Option<&[u8]> {
        match self.nodes.get(&normalize(path)) {
            Some(Node::File(data)) => Some(data),
            _ => None,
        }
    }

    fn check_faults(&mut self, op: &'static str, path: &str) -> RemoteResult<()> {
        if let Some((code, message)) = self.replies.get(&(op, path.to_string())) {
            return Err(RemoteError::Reply {
                op,
                code: *code,
                message: message.clone(),
            });
        }
        if self.denied.contains(path) {
            return Err(RemoteError::Reply {
                op,
                code: 553,
                message: "Permission denied".into(),
            });
        }
        if let Some(n) = self.flaky.get_mut(path)
            && *n > 0
        {
            *n -= 1;
            return Err(RemoteError::Connection("connection reset by peer".into()));
        }
        Ok(())
    }

    fn children(&self, dir: &str) -> Vec<(String, &Node)> {
        let prefix = if dir == "/" {
            "/".to_string()
        } else {
            format!("{dir}/")
        };
        self.nodes
            .iter()
            .filter(|(k, _)| k.as_str() != "/" && k.starts_with(&prefix))
            .filter(|(k, _)| !k[prefix.len()..].contains('/'))
            .map(|(k, v)| (k[prefix.len()..].to_string(), v))
            .collect()
    }
}

impl Remote for MemoryRemote {
    fn list(&mut self, dir: &str) -> RemoteResult<Vec<Entry>> {
        let dir = normalize(dir);
        if !self.has_dir(&dir) {
            return Err(RemoteError::NotFound { path: dir });
        }
        Ok(self
            .children(&dir)
            .into_iter()
            .map(|(name, node)| match node {
                Node::Dir => Entry {
                    name,
                    kind: EntryKind::Dir,
                    size: 0,
                    modified: None,
                },
                Node::File(data) => Entry {
                    name,
                    kind: EntryKind::File,
                    size: data.len() as u64,
                    modified: Some("20250101120000".into()),
                },
                Node::Link(target) => Entry {
                    name,
                    kind: EntryKind::Link,
                    size: target.len() as u64,
                    modified: None,
                },
            })
            .collect())
    }

    fn names(&mut self, dir: &str) -> RemoteResult<Vec<String>> {
        self.check_faults("NLST", &normalize(dir))?;
        Ok(self.list(dir)?.into_iter().map(|e| e.name).collect())
    }

    fn put(&mut self, path: &str, reader: &mut dyn Read) -> RemoteResult<u64> {
        let path = normalize(path);
        self.check_faults("STOR", &path)?;
        let (parent, _) = split_parent_name(&path)?;
        if !self.has_dir(&parent) {
            return Err(RemoteError::Reply {
                op: "STOR",
                code: 553,
                message: format!("{parent}: no such directory"),
            });
        }
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        let len = data.len() as u64;
        self.nodes.insert(path.clone(), Node::File(data));
        self.puts.push(path);
        Ok(len)
    }

    fn get(&mut self, path: &str, writer: &mut dyn Write) -> RemoteResult<u64> {
        let path = normalize(path);
        self.check_faults("RETR", &path)?;
        match self.nodes.get(&path) {
            Some(Node::File(data)) => {
                writer.write_all(data)?;
                Ok(data.len() as u64)
            }
            _ => Err(RemoteError::NotFound { path }),
        }
    }

    fn mkdir(&mut self, path: &str) -> RemoteResult<()> {
        let path = normalize(path);
        match self.nodes.get(&path) {
            Some(Node::Dir) => return Err(RemoteError::AlreadyExists { path }),
            Some(_) => {
                return Err(RemoteError::Reply {
                    op: "MKD",
                    code: 550,
                    message: "File exists".into(),
                });
            }
            None => {}
        }
        let (parent, _) = split_parent_name(&path)?;
        if !self.has_dir(&parent) {
            return Err(RemoteError::Reply {
                op: "MKD",
                code: 550,
                message: format!("{parent}: no such directory"),
            });
        }
        self.nodes.insert(path, Node::Dir);
        Ok(())
    }

    fn rename(&mut self, from: &str, to: &str) -> RemoteResult<()> {
        let from = normalize(from);
        let to = normalize(to);
        self.check_faults("RNFR", &from)?;
        let node = self
            .nodes
            .remove(&from)
            .ok_or_else(|| RemoteError::NotFound { path: from.clone() })?;
        self.nodes.insert(to.clone(), node);
        self.renames.push((from, to));
        Ok(())
    }

    fn remove(&mut self, path: &str) -> RemoteResult<()> {
        let path = normalize(path);
        self.check_faults("DELE", &path)?;
        match self.nodes.get(&path) {
            Some(Node::File(_)) | Some(Node::Link(_)) => {
                self.nodes.remove(&path);
                self.removed.push(path);
                Ok(())
            }
            Some(Node::Dir) => Err(RemoteError::Reply {
                op: "DELE",
                code: 550,
                message: "Is a directory".into(),
            }),
            None => Err(RemoteError::NotFound { path }),
        }
    }

    fn size(&mut self, path: &str) -> RemoteResult<Option<u64>> {
        match self.nodes.get(&normalize(path)) {
            Some(Node::File(data)) => Ok(Some(data.len() as u64)),
            _ => Ok(None),
        }
    }

    fn chmod(&mut self, path: &str, mode: u32) -> RemoteResult<()> {
        let path = normalize(path);
        self.check_faults("SITE", &path)?;
        match self.nodes.get(&path) {
            Some(Node::File(_)) | Some(Node::Dir) => {
                self.modes.insert(path, mode);
                Ok(())
            }
            _ => Err(RemoteError::Reply {
                op: "SITE",
                code: 550,
                message: format!("{path}: No such file or directory"),
            }),
        }
    }
}
