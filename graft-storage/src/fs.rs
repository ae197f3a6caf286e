use std::path::{Path, PathBuf};

use async_trait::async_trait;
use graft_common::Digest;

use crate::{Chunk, ChunkStore, GraftStorageError, StoreInfo};

/// A [`ChunkStore`] that keeps every chunk as one file inside a root
/// directory, named by the base-32 form of its digest.
///
/// Writes go through a temporary file followed by a rename, so a crashed
/// writer leaves no partially-written chunk under its final name.
#[derive(Clone)]
pub struct FsChunkStore {
    root_dir: PathBuf,
}

impl FsChunkStore {
    /// Open (creating if necessary) a store rooted at `root_dir`.
    pub async fn new<Pathlike>(root_dir: Pathlike) -> Result<Self, GraftStorageError>
    where
        Pathlike: AsRef<Path>,
    {
        let root_dir = root_dir.as_ref().to_owned();
        tokio::fs::create_dir_all(&root_dir)
            .await
            .map_err(|error| GraftStorageError::StorageBackend(format!("{error}")))?;
        Ok(Self { root_dir })
    }

    fn chunk_path(&self, digest: &Digest) -> PathBuf {
        self.root_dir.join(digest.to_base32())
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl ChunkStore for FsChunkStore {
    async fn put(&self, digest: &Digest, chunk: &Chunk) -> Result<bool, GraftStorageError> {
        if chunk.digest() != *digest {
            return Err(GraftStorageError::Verification(format!(
                "Chunk does not hash to {digest}"
            )));
        }
        let path = self.chunk_path(digest);
        if path.exists() {
            // Content addressing: an existing file already holds these bytes.
            return Ok(false);
        }
        let temp_path = path.with_extension("tmp");
        tokio::fs::write(&temp_path, chunk.encode())
            .await
            .map_err(|error| GraftStorageError::StorageBackend(format!("{error}")))?;
        tokio::fs::rename(&temp_path, &path)
            .await
            .map_err(|error| GraftStorageError::StorageBackend(format!("{error}")))?;
        Ok(true)
    }

    async fn get(&self, digest: &Digest) -> Result<Option<Chunk>, GraftStorageError> {
        match tokio::fs::read(self.chunk_path(digest)).await {
            Ok(bytes) => Ok(Some(Chunk::decode(&bytes)?)),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(GraftStorageError::StorageBackend(format!("{error}"))),
        }
    }

    async fn exists(&self, digest: &Digest) -> Result<bool, GraftStorageError> {
        Ok(self.chunk_path(digest).exists())
    }

    async fn info(&self) -> Result<StoreInfo, GraftStorageError> {
        let mut entries = tokio::fs::read_dir(&self.root_dir)
            .await
            .map_err(|error| GraftStorageError::StorageBackend(format!("{error}")))?;
        let mut info = StoreInfo::default();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|error| GraftStorageError::StorageBackend(format!("{error}")))?
        {
            let metadata = entry
                .metadata()
                .await
                .map_err(|error| GraftStorageError::StorageBackend(format!("{error}")))?;
            if metadata.is_file() {
                info.chunk_count += 1;
                info.total_bytes += metadata.len();
            }
        }
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChunkType;
    use anyhow::Result;
    use graft_common::Bytes;

    async fn make_store() -> Result<(FsChunkStore, tempfile::TempDir)> {
        let tempdir = tempfile::tempdir()?;
        let store = FsChunkStore::new(tempdir.path()).await?;
        Ok((store, tempdir))
    }

    #[tokio::test]
    async fn it_persists_chunks_as_files() -> Result<()> {
        let (store, _tempdir) = make_store().await?;
        let chunk = Chunk::new(ChunkType::List, Bytes::from(&b"list body"[..]));
        let digest = chunk.digest();

        assert!(store.put(&digest, &chunk).await?);
        assert_eq!(store.get(&digest).await?, Some(chunk));

        let info = store.info().await?;
        assert_eq!(info.chunk_count, 1);
        Ok(())
    }

    #[tokio::test]
    async fn it_survives_reopening() -> Result<()> {
        let tempdir = tempfile::tempdir()?;
        let chunk = Chunk::new(ChunkType::Blob, Bytes::from(&b"durable"[..]));
        let digest = chunk.digest();

        {
            let store = FsChunkStore::new(tempdir.path()).await?;
            store.put(&digest, &chunk).await?;
        }

        let reopened = FsChunkStore::new(tempdir.path()).await?;
        assert_eq!(reopened.get(&digest).await?, Some(chunk));
        Ok(())
    }

    #[tokio::test]
    async fn it_reports_missing_chunks_as_absent() -> Result<()> {
        let (store, _tempdir) = make_store().await?;
        assert_eq!(store.get(&Digest::compute(b"nothing")).await?, None);
        Ok(())
    }
}
