use std::collections::{HashMap, HashSet};
use std::path::Path;

use graft_common::{Bytes, Digest};
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::RepositoryError;

/// On-disk snapshot of the head tables. Tuples rather than maps so the
/// encoding stays within strict CBOR map-key rules and round-trips exactly.
#[derive(Serialize, Deserialize)]
struct Snapshot {
    branches: Vec<(Bytes, Vec<(String, Digest)>)>,
    latest: Vec<(Bytes, Vec<Digest>)>,
}

/// The in-memory tables of branch heads and latest version tips, one
/// instance owned by each [`crate::Worker`].
///
/// `branch_ver` maps a user key to its named branch heads (one version per
/// branch); `latest_ver` holds, per key, every version with no known
/// successor.
#[derive(Debug, Default)]
pub struct HeadVersion {
    branch_ver: HashMap<Bytes, HashMap<String, Digest>>,
    latest_ver: HashMap<Bytes, HashSet<Digest>>,
}

impl HeadVersion {
    /// Create empty tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hook invoked on every branch mutation. Placeholder for a future
    /// write-ahead log of head updates.
    // TODO(wal): append (key, branch, version) to a persistent log here.
    pub fn log_branch_update(&self, key: &[u8], branch: &str, version: &Digest) {
        trace!(
            key = %String::from_utf8_lossy(key),
            branch,
            version = %version,
            "branch update"
        );
    }

    /// The head version of `branch` under `key`, if any.
    pub fn get_branch(&self, key: &[u8], branch: &str) -> Option<Digest> {
        self.branch_ver.get(key)?.get(branch).copied()
    }

    /// Every latest (successor-less) version known under `key`.
    pub fn get_latest(&self, key: &[u8]) -> Vec<Digest> {
        match self.latest_ver.get(key) {
            Some(versions) => versions.iter().copied().collect(),
            None => Vec::new(),
        }
    }

    /// Install (or move) the head of `branch` under `key`.
    pub fn put_branch(&mut self, key: &[u8], branch: &str, version: &Digest) {
        self.branch_ver
            .entry(Bytes::copy_from_slice(key))
            .or_default()
            .insert(branch.to_string(), *version);
        self.log_branch_update(key, branch, version);
    }

    /// Record `version` as a latest tip of `key`, displacing the parents it
    /// supersedes.
    pub fn put_latest(&mut self, key: &[u8], pre1: &Digest, pre2: &Digest, version: &Digest) {
        let tips = self
            .latest_ver
            .entry(Bytes::copy_from_slice(key))
            .or_default();
        tips.remove(pre1);
        tips.remove(pre2);
        tips.insert(*version);
    }

    /// Drop the head of `branch` under `key`. A missing branch is a warned
    /// no-op.
    pub fn remove_branch(&mut self, key: &[u8], branch: &str) {
        let removed = self
            .branch_ver
            .get_mut(key)
            .map(|branches| branches.remove(branch).is_some())
            .unwrap_or(false);
        if removed {
            self.log_branch_update(key, branch, &Digest::NULL);
        } else {
            warn!(
                key = %String::from_utf8_lossy(key),
                branch,
                "removing a branch that does not exist"
            );
        }
    }

    /// Move the head of `old_branch` to `new_branch` under `key`. The
    /// caller guarantees the old branch exists and the new one does not.
    pub fn rename_branch(&mut self, key: &[u8], old_branch: &str, new_branch: &str) {
        let Some(branches) = self.branch_ver.get_mut(key) else {
            warn!(
                key = %String::from_utf8_lossy(key),
                branch = old_branch,
                "renaming a branch under an unknown key"
            );
            return;
        };
        if let Some(version) = branches.remove(old_branch) {
            branches.insert(new_branch.to_string(), version);
            self.log_branch_update(key, new_branch, &version);
            self.log_branch_update(key, old_branch, &Digest::NULL);
        }
    }

    /// Whether any version exists under `key`.
    pub fn exists_key(&self, key: &[u8]) -> bool {
        self.latest_ver.contains_key(key)
    }

    /// Whether `branch` exists under `key`.
    pub fn exists_branch(&self, key: &[u8], branch: &str) -> bool {
        self.branch_ver
            .get(key)
            .map(|branches| branches.contains_key(branch))
            .unwrap_or(false)
    }

    /// Whether `version` is a latest tip of `key`.
    pub fn is_latest(&self, key: &[u8], version: &Digest) -> bool {
        self.latest_ver
            .get(key)
            .map(|tips| tips.contains(version))
            .unwrap_or(false)
    }

    /// Whether `version` is the head of `branch` under `key`.
    pub fn is_branch_head(&self, key: &[u8], branch: &str, version: &Digest) -> bool {
        self.get_branch(key, branch)
            .map(|head| head == *version)
            .unwrap_or(false)
    }

    /// Every key with any recorded version.
    pub fn list_key(&self) -> Vec<Bytes> {
        self.latest_ver.keys().cloned().collect()
    }

    /// Every branch name under `key`.
    pub fn list_branch(&self, key: &[u8]) -> Vec<String> {
        match self.branch_ver.get(key) {
            Some(branches) => branches.keys().cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Write both tables to `path` so that [`HeadVersion::load`]
    /// reconstructs them exactly.
    pub async fn dump(&self, path: impl AsRef<Path>) -> Result<(), RepositoryError> {
        let mut branches: Vec<(Bytes, Vec<(String, Digest)>)> = self
            .branch_ver
            .iter()
            .map(|(key, heads)| {
                let mut heads: Vec<(String, Digest)> = heads
                    .iter()
                    .map(|(branch, version)| (branch.clone(), *version))
                    .collect();
                heads.sort();
                (key.clone(), heads)
            })
            .collect();
        branches.sort();
        let mut latest: Vec<(Bytes, Vec<Digest>)> = self
            .latest_ver
            .iter()
            .map(|(key, tips)| {
                let mut tips: Vec<Digest> = tips.iter().copied().collect();
                tips.sort();
                (key.clone(), tips)
            })
            .collect();
        latest.sort();

        let encoded = serde_ipld_dagcbor::to_vec(&Snapshot { branches, latest })
            .map_err(|error| RepositoryError::IoFault(format!("{error}")))?;
        tokio::fs::write(path.as_ref(), encoded)
            .await
            .map_err(|error| RepositoryError::IoFault(format!("{error}")))?;
        Ok(())
    }

    /// Replace both tables with the snapshot stored at `path`.
    pub async fn load(&mut self, path: impl AsRef<Path>) -> Result<(), RepositoryError> {
        let encoded = tokio::fs::read(path.as_ref())
            .await
            .map_err(|error| RepositoryError::InvalidPath(format!("{error}")))?;
        let snapshot: Snapshot = serde_ipld_dagcbor::from_slice(&encoded)
            .map_err(|error| RepositoryError::IoFault(format!("{error}")))?;

        self.branch_ver = snapshot
            .branches
            .into_iter()
            .map(|(key, heads)| (key, heads.into_iter().collect()))
            .collect();
        self.latest_ver = snapshot
            .latest
            .into_iter()
            .map(|(key, tips)| (key, tips.into_iter().collect()))
            .collect();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn version(tag: &str) -> Digest {
        Digest::compute(tag.as_bytes())
    }

    #[test]
    fn it_tracks_branch_heads() {
        let mut head = HeadVersion::new();
        head.put_branch(b"key", "master", &version("v1"));
        assert_eq!(head.get_branch(b"key", "master"), Some(version("v1")));
        assert!(head.is_branch_head(b"key", "master", &version("v1")));

        head.put_branch(b"key", "master", &version("v2"));
        assert_eq!(head.get_branch(b"key", "master"), Some(version("v2")));
        assert!(!head.is_branch_head(b"key", "master", &version("v1")));
    }

    #[test]
    fn latest_tips_displace_their_parents() {
        let mut head = HeadVersion::new();
        head.put_latest(b"key", &Digest::NULL, &Digest::NULL, &version("v1"));
        head.put_latest(b"key", &version("v1"), &Digest::NULL, &version("v2"));
        assert!(head.is_latest(b"key", &version("v2")));
        assert!(!head.is_latest(b"key", &version("v1")));

        // A fork: two children of v2, then a merge of both.
        head.put_latest(b"key", &version("v2"), &Digest::NULL, &version("v3a"));
        head.put_latest(b"key", &version("v2"), &Digest::NULL, &version("v3b"));
        assert_eq!(head.get_latest(b"key").len(), 2);

        head.put_latest(b"key", &version("v3a"), &version("v3b"), &version("v4"));
        assert_eq!(head.get_latest(b"key"), vec![version("v4")]);
    }

    #[test]
    fn renaming_moves_the_head() {
        let mut head = HeadVersion::new();
        head.put_branch(b"key", "old", &version("v1"));
        head.rename_branch(b"key", "old", "new");
        assert!(!head.exists_branch(b"key", "old"));
        assert_eq!(head.get_branch(b"key", "new"), Some(version("v1")));
    }

    #[tokio::test]
    async fn snapshots_round_trip() -> Result<()> {
        let mut head = HeadVersion::new();
        head.put_branch(b"alpha", "master", &version("v1"));
        head.put_branch(b"alpha", "dev", &version("v2"));
        head.put_branch(b"beta", "master", &version("v3"));
        head.put_latest(b"alpha", &Digest::NULL, &Digest::NULL, &version("v1"));
        head.put_latest(b"alpha", &version("v1"), &Digest::NULL, &version("v2"));
        head.put_latest(b"beta", &Digest::NULL, &Digest::NULL, &version("v3"));

        let dir = tempfile::tempdir()?;
        let path = dir.path().join("heads.cbor");
        head.dump(&path).await?;

        let mut restored = HeadVersion::new();
        restored.load(&path).await?;

        assert_eq!(
            restored.get_branch(b"alpha", "master"),
            Some(version("v1"))
        );
        assert_eq!(restored.get_branch(b"alpha", "dev"), Some(version("v2")));
        assert_eq!(restored.get_branch(b"beta", "master"), Some(version("v3")));
        assert!(restored.is_latest(b"alpha", &version("v2")));
        assert!(!restored.is_latest(b"alpha", &version("v1")));
        assert_eq!(restored.list_key().len(), 2);
        Ok(())
    }
}
