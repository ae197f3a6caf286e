use std::path::Path;

use graft_common::{Bytes, Digest};
use graft_prolly_tree::{ChunkCacher, Chunker};
use graft_storage::{Chunk, ChunkStore};
use tracing::debug;

use crate::{
    merge::{empty_root, find_lca, load_cell, merge_data},
    types::{map_del, map_set, set_insert, set_remove},
    HeadVersion, RepositoryError, UBlob, UCell, UList, UMap, UString, UType, Value,
};

/// Identifies one worker within a deployment.
pub type WorkerId = u32;

/// How a merge concluded.
enum MergeResolution {
    /// One tip already contained the other; no cell was written.
    FastForward(Digest),
    /// A new merge cell was committed.
    Committed(Digest),
}

/// The write orchestrator: the single owner of a [`HeadVersion`] table,
/// serializing every update against one chunk store.
///
/// All operations return a [`RepositoryError`] on failure and leave state
/// untouched: head tables are only updated after the cell chunk they point
/// at is durably stored, and chunks unreferenced by any head are inert.
pub struct Worker<Store: ChunkStore + Clone> {
    id: WorkerId,
    store: Store,
    head: HeadVersion,
}

impl<Store: ChunkStore + Clone> Worker<Store> {
    /// A worker with the given id over the given chunk store.
    pub fn new(id: WorkerId, store: Store) -> Self {
        Worker {
            id,
            store,
            head: HeadVersion::new(),
        }
    }

    /// This worker's id.
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// The chunk store this worker writes to.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Read the cell at the head of `branch`.
    pub async fn get(&self, key: &[u8], branch: &str) -> Result<UCell, RepositoryError> {
        let version = self
            .head
            .get_branch(key, branch)
            .ok_or(RepositoryError::BranchNotExists)?;
        self.get_version(key, &version).await
    }

    /// Read the cell of an explicit `version`.
    pub async fn get_version(
        &self,
        key: &[u8],
        version: &Digest,
    ) -> Result<UCell, RepositoryError> {
        let cell = load_cell(&self.store, version).await?;
        if cell.key() != key {
            return Err(RepositoryError::InconsistentKey);
        }
        Ok(cell)
    }

    /// The raw cell chunk of `version`.
    pub async fn get_chunk(&self, key: &[u8], version: &Digest) -> Result<Chunk, RepositoryError> {
        Ok(self.get_version(key, version).await?.chunk().clone())
    }

    /// Write `value` as the new head of `branch`, creating the branch when
    /// it does not exist yet. Returns the new version.
    pub async fn put(
        &mut self,
        key: &[u8],
        value: &Value,
        branch: &str,
    ) -> Result<Digest, RepositoryError> {
        let prev = self.head.get_branch(key, branch).unwrap_or(Digest::NULL);
        let version = self.write(key, value, prev, Digest::NULL).await?;
        self.head.put_branch(key, branch, &version);
        self.head
            .put_latest(key, &prev, &Digest::NULL, &version);
        debug!(worker = self.id, branch, version = %version, "put");
        Ok(version)
    }

    /// Write `value` as a successor of `prev_version`, without touching any
    /// branch. Returns the new version.
    pub async fn put_version(
        &mut self,
        key: &[u8],
        value: &Value,
        prev_version: &Digest,
    ) -> Result<Digest, RepositoryError> {
        if !prev_version.is_null() && load_cell(&self.store, prev_version).await.is_err() {
            return Err(RepositoryError::ReferringVersionNotExist);
        }
        let version = self.write(key, value, *prev_version, Digest::NULL).await?;
        self.head
            .put_latest(key, prev_version, &Digest::NULL, &version);
        debug!(worker = self.id, version = %version, "put version");
        Ok(version)
    }

    /// Create `new_branch` pointing at the head of `base_branch`.
    pub async fn branch(
        &mut self,
        key: &[u8],
        base_branch: &str,
        new_branch: &str,
    ) -> Result<(), RepositoryError> {
        if self.head.exists_branch(key, new_branch) {
            return Err(RepositoryError::BranchExists);
        }
        let version = self
            .head
            .get_branch(key, base_branch)
            .ok_or(RepositoryError::BranchNotExists)?;
        self.head.put_branch(key, new_branch, &version);
        Ok(())
    }

    /// Create `new_branch` pointing at an explicit `version`.
    pub async fn branch_from_version(
        &mut self,
        key: &[u8],
        version: &Digest,
        new_branch: &str,
    ) -> Result<(), RepositoryError> {
        if self.head.exists_branch(key, new_branch) {
            return Err(RepositoryError::BranchExists);
        }
        if load_cell(&self.store, version).await.is_err() {
            return Err(RepositoryError::ReferringVersionNotExist);
        }
        self.head.put_branch(key, new_branch, version);
        Ok(())
    }

    /// Rename `old_branch` to `new_branch` under `key`.
    pub fn rename(
        &mut self,
        key: &[u8],
        old_branch: &str,
        new_branch: &str,
    ) -> Result<(), RepositoryError> {
        if !self.head.exists_branch(key, old_branch) {
            return Err(RepositoryError::BranchNotExists);
        }
        if self.head.exists_branch(key, new_branch) {
            return Err(RepositoryError::BranchExists);
        }
        self.head.rename_branch(key, old_branch, new_branch);
        Ok(())
    }

    /// Delete `branch` under `key`. Data chunks are never removed.
    pub fn delete(&mut self, key: &[u8], branch: &str) -> Result<(), RepositoryError> {
        if !self.head.exists_branch(key, branch) {
            return Err(RepositoryError::BranchNotExists);
        }
        self.head.remove_branch(key, branch);
        Ok(())
    }

    /// Merge the head of `ref_branch` into `tgt_branch`. On fast-forward the
    /// target head simply moves; otherwise a merge cell with both parents is
    /// committed and becomes the target head. `value` resolves conflicts.
    pub async fn merge(
        &mut self,
        key: &[u8],
        value: Option<&Value>,
        tgt_branch: &str,
        ref_branch: &str,
    ) -> Result<Digest, RepositoryError> {
        let ref_version = self
            .head
            .get_branch(key, ref_branch)
            .ok_or(RepositoryError::BranchNotExists)?;
        self.merge_with_version(key, value, tgt_branch, &ref_version)
            .await
    }

    /// Merge an explicit `ref_version` into `tgt_branch`.
    pub async fn merge_with_version(
        &mut self,
        key: &[u8],
        value: Option<&Value>,
        tgt_branch: &str,
        ref_version: &Digest,
    ) -> Result<Digest, RepositoryError> {
        let tgt_version = self
            .head
            .get_branch(key, tgt_branch)
            .ok_or(RepositoryError::BranchNotExists)?;
        let version = match self
            .resolve_merge(key, value, &tgt_version, ref_version)
            .await?
        {
            MergeResolution::FastForward(version) => version,
            MergeResolution::Committed(version) => version,
        };
        self.head.put_branch(key, tgt_branch, &version);
        Ok(version)
    }

    /// Merge two explicit versions, committing a merge cell unless one
    /// already contains the other. No branch is updated.
    pub async fn merge_versions(
        &mut self,
        key: &[u8],
        value: Option<&Value>,
        ref_version1: &Digest,
        ref_version2: &Digest,
    ) -> Result<Digest, RepositoryError> {
        match self
            .resolve_merge(key, value, ref_version1, ref_version2)
            .await?
        {
            MergeResolution::FastForward(version) => Ok(version),
            MergeResolution::Committed(version) => Ok(version),
        }
    }

    async fn resolve_merge(
        &mut self,
        key: &[u8],
        value: Option<&Value>,
        ours: &Digest,
        theirs: &Digest,
    ) -> Result<MergeResolution, RepositoryError> {
        if ours == theirs {
            return Ok(MergeResolution::FastForward(*ours));
        }
        let ours_cell = self
            .get_version(key, ours)
            .await
            .map_err(|_| RepositoryError::ReferringVersionNotExist)?;
        let theirs_cell = self
            .get_version(key, theirs)
            .await
            .map_err(|_| RepositoryError::ReferringVersionNotExist)?;
        if ours_cell.utype() != theirs_cell.utype() {
            return Err(RepositoryError::InconsistentType);
        }

        let base = find_lca(&self.store, ours, theirs).await?;
        if base.as_ref() == Some(ours) {
            return Ok(MergeResolution::FastForward(*theirs));
        }
        if base.as_ref() == Some(theirs) {
            return Ok(MergeResolution::FastForward(*ours));
        }

        let auto = match base {
            Some(base_version) => {
                let base_cell = self.get_version(key, &base_version).await?;
                if base_cell.utype() == ours_cell.utype() {
                    merge_data(&self.store, &base_cell, &ours_cell, &theirs_cell).await?
                } else {
                    None
                }
            }
            // Unrelated histories have no base to merge against.
            None => None,
        };

        let data_root = match auto {
            Some(root) => root,
            None => match value {
                Some(value) => {
                    if value.utype != ours_cell.utype() {
                        return Err(RepositoryError::InconsistentType);
                    }
                    self.apply_value(value, None).await?
                }
                None => return Err(RepositoryError::InvalidValue),
            },
        };

        let chunk = UCell::new_chunk(ours_cell.utype(), key, &data_root, ours, Some(theirs));
        let version = chunk.digest();
        self.store.put(&version, &chunk).await?;
        self.head.put_latest(key, ours, theirs, &version);
        debug!(worker = self.id, version = %version, "merge");
        Ok(MergeResolution::Committed(version))
    }

    async fn write(
        &self,
        key: &[u8],
        value: &Value,
        pre1: Digest,
        pre2: Digest,
    ) -> Result<Digest, RepositoryError> {
        let prev_root = if pre1.is_null() {
            None
        } else {
            let cell = load_cell(&self.store, &pre1).await?;
            if cell.key() != key {
                return Err(RepositoryError::InconsistentKey);
            }
            if cell.utype() != value.utype {
                return Err(RepositoryError::InconsistentType);
            }
            Some(cell.data_root())
        };

        let data_root = self.apply_value(value, prev_root).await?;
        let pre2 = (!pre2.is_null()).then_some(&pre2);
        let chunk = UCell::new_chunk(value.utype, key, &data_root, &pre1, pre2);
        let version = chunk.digest();
        self.store.put(&version, &chunk).await?;
        Ok(version)
    }

    /// Build the data root `value` describes, editing from `value.base`,
    /// else from `prev_root`, else from scratch.
    async fn apply_value(
        &self,
        value: &Value,
        prev_root: Option<Digest>,
    ) -> Result<Digest, RepositoryError> {
        let base = value.base.or(prev_root);
        match value.utype {
            UType::Blob => {
                let data = concat_bytes(&value.vals);
                match base {
                    Some(root) => {
                        let blob = UBlob::load(root, self.store.clone()).await?;
                        blob.splice(value.pos, value.dels, &data).await
                    }
                    None => UBlob::create(&self.store, &data).await,
                }
            }
            UType::String => {
                let text = value
                    .vals
                    .first()
                    .map(|bytes| bytes.as_slice())
                    .unwrap_or_default();
                UString::create(&self.store, text).await
            }
            UType::List => match base {
                Some(root) => {
                    let list = UList::load(root, self.store.clone()).await?;
                    list.splice(value.pos, value.dels, &value.vals).await
                }
                None => UList::create(&self.store, &value.vals).await,
            },
            UType::Map => {
                if value.keys.len() != value.vals.len() {
                    return Err(RepositoryError::InvalidParameter(
                        "Map keys and values must pair up".into(),
                    ));
                }
                if base.is_none() && value.del_keys.is_empty() {
                    return UMap::create(
                        &self.store,
                        value.keys.iter().cloned().zip(value.vals.iter().cloned()),
                    )
                    .await;
                }
                let cacher = ChunkCacher::new(&self.store, &self.store);
                let mut root = match base {
                    Some(root) => root,
                    None => empty_root(&self.store, Chunker::Map).await?,
                };
                for (upsert_key, upsert_value) in value.keys.iter().zip(value.vals.iter()) {
                    root = map_set(&cacher, root, upsert_key, upsert_value).await?;
                }
                for del_key in &value.del_keys {
                    root = map_del(&cacher, root, del_key).await?;
                }
                cacher.dump_reachable(&root).await?;
                Ok(root)
            }
            UType::Set => {
                if base.is_none() && value.del_keys.is_empty() {
                    return crate::USet::create(&self.store, value.keys.iter().cloned()).await;
                }
                let cacher = ChunkCacher::new(&self.store, &self.store);
                let mut root = match base {
                    Some(root) => root,
                    None => empty_root(&self.store, Chunker::Set).await?,
                };
                for set_key in &value.keys {
                    root = set_insert(&cacher, root, set_key).await?;
                }
                for del_key in &value.del_keys {
                    root = set_remove(&cacher, root, del_key).await?;
                }
                cacher.dump_reachable(&root).await?;
                Ok(root)
            }
            UType::Bool | UType::Num => Err(RepositoryError::TypeUnsupported),
        }
    }

    /// The head version of `branch`, if any.
    pub fn get_branch_head(&self, key: &[u8], branch: &str) -> Option<Digest> {
        self.head.get_branch(key, branch)
    }

    /// Whether any version exists under `key`.
    pub fn exists(&self, key: &[u8]) -> bool {
        self.head.exists_key(key)
    }

    /// Whether `branch` exists under `key`.
    pub fn exists_branch(&self, key: &[u8], branch: &str) -> bool {
        self.head.exists_branch(key, branch)
    }

    /// Whether `version` is the head of `branch`.
    pub fn is_branch_head(&self, key: &[u8], branch: &str, version: &Digest) -> bool {
        self.head.is_branch_head(key, branch, version)
    }

    /// Every latest (successor-less) version of `key`.
    pub fn get_latest_versions(&self, key: &[u8]) -> Vec<Digest> {
        self.head.get_latest(key)
    }

    /// Whether `version` is one of the latest versions of `key`.
    pub fn is_latest_version(&self, key: &[u8], version: &Digest) -> bool {
        self.head.is_latest(key, version)
    }

    /// Every key with any recorded version.
    pub fn list_keys(&self) -> Vec<Bytes> {
        self.head.list_key()
    }

    /// Every branch name under `key`.
    pub fn list_branches(&self, key: &[u8]) -> Vec<String> {
        self.head.list_branch(key)
    }

    /// Persist the head tables to `path`.
    pub async fn dump_branch_version(&self, path: impl AsRef<Path>) -> Result<(), RepositoryError> {
        self.head.dump(path).await
    }

    /// Replace the head tables with the snapshot at `path`.
    pub async fn load_branch_version(
        &mut self,
        path: impl AsRef<Path>,
    ) -> Result<(), RepositoryError> {
        self.head.load(path).await
    }
}

fn concat_bytes(parts: &[Bytes]) -> Vec<u8> {
    let mut out = Vec::with_capacity(parts.iter().map(|part| part.len()).sum());
    for part in parts {
        out.extend_from_slice(part);
    }
    out
}
