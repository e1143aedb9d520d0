use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dfs_lib::{DfsError, DfsPath, DfsResult};
use dfs_proto::{
    CommandDispatcher, CommandHandler, CommandStub, RegistrationStub, StorageDispatcher,
    StorageHandler, StorageStub, COMMAND_INTERFACE, STORAGE_INTERFACE,
};
use log::{info, warn};
use rmi::Skeleton;
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, SeekFrom};

/// Replica copies stream through the source server in chunks of this size.
const COPY_CHUNK_SIZE: u64 = 1024 * 1024;

/// Runtime knobs of a storage server. With no declared addresses the system
/// assigns both ports at `start`.
#[derive(Debug, Clone, Default)]
pub struct StorageConfig {
    pub root: PathBuf,
    pub storage_addr: Option<SocketAddr>,
    pub command_addr: Option<SocketAddr>,
}

struct StorageInner {
    root: PathBuf,
}

impl StorageInner {
    /// Maps a filesystem path onto the local root. Dot components are
    /// rejected so a path cannot escape the root.
    fn local_path(&self, path: &DfsPath) -> DfsResult<PathBuf> {
        for component in path.components() {
            if component == "." || component == ".." {
                return Err(DfsError::IllegalArg(format!(
                    "dot components are not allowed: {}",
                    path
                )));
            }
        }
        Ok(path.to_local(&self.root))
    }

    async fn file_len(&self, path: &DfsPath) -> DfsResult<u64> {
        let local = self.local_path(path)?;
        let meta = fs::metadata(&local)
            .await
            .map_err(|_| DfsError::NotFound(format!("file does not exist: {}", path)))?;
        if meta.is_dir() {
            return Err(DfsError::NotFound(format!("not a file: {}", path)));
        }
        Ok(meta.len())
    }

    /// Removes one duplicate reported by registration, then prunes every
    /// directory above it that became empty.
    async fn remove_duplicate(&self, path: &DfsPath) {
        let local = match self.local_path(path) {
            Ok(v) => v,
            Err(e) => {
                warn!("storage: skipping duplicate {}: {}", path, e);
                return;
            }
        };
        if let Err(e) = fs::remove_file(&local).await {
            warn!("storage: could not delete duplicate {}: {}", path, e);
            return;
        }
        let mut dir = local.parent().map(Path::to_path_buf);
        while let Some(parent) = dir {
            if parent == self.root {
                break;
            }
            match fs::read_dir(&parent).await {
                Ok(mut entries) => match entries.next_entry().await {
                    Ok(None) => {
                        if fs::remove_dir(&parent).await.is_err() {
                            break;
                        }
                    }
                    _ => break,
                },
                Err(_) => break,
            }
            dir = parent.parent().map(Path::to_path_buf);
        }
    }
}

#[async_trait]
impl StorageHandler for StorageInner {
    async fn size(&self, path: DfsPath) -> DfsResult<u64> {
        self.file_len(&path).await
    }

    async fn read(&self, path: DfsPath, offset: u64, length: u64) -> DfsResult<Vec<u8>> {
        let len = self.file_len(&path).await?;
        let end = offset
            .checked_add(length)
            .ok_or_else(|| DfsError::OutOfRange("offset plus length overflows".to_string()))?;
        if end > len {
            return Err(DfsError::OutOfRange(format!(
                "read of [{}, {}) past end of {} ({} bytes)",
                offset, end, path, len
            )));
        }
        let local = self.local_path(&path)?;
        let mut file = fs::File::open(&local)
            .await
            .map_err(|_| DfsError::NotFound(format!("file does not exist: {}", path)))?;
        file.seek(SeekFrom::Start(offset)).await?;
        let mut buf = vec![0u8; length as usize];
        file.read_exact(&mut buf).await?;
        Ok(buf)
    }

    async fn write(&self, path: DfsPath, offset: u64, data: Vec<u8>) -> DfsResult<()> {
        // Seek-then-write: a seek past the end zero-fills the gap.
        self.file_len(&path).await?;
        let local = self.local_path(&path)?;
        let mut file = OpenOptions::new()
            .write(true)
            .open(&local)
            .await
            .map_err(|_| DfsError::NotFound(format!("file does not exist: {}", path)))?;
        file.seek(SeekFrom::Start(offset)).await?;
        file.write_all(&data).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl CommandHandler for StorageInner {
    async fn create(&self, path: DfsPath) -> DfsResult<bool> {
        if path.is_root() {
            return Ok(false);
        }
        let local = self.local_path(&path)?;
        if fs::metadata(&local).await.is_ok() {
            return Ok(false);
        }
        // Build the full parent prefix first, then create the leaf.
        if let Some(parent) = local.parent() {
            fs::create_dir_all(parent).await?;
        }
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&local)
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, path: DfsPath) -> DfsResult<bool> {
        if path.is_root() {
            return Ok(false);
        }
        let local = self.local_path(&path)?;
        let meta = match fs::metadata(&local).await {
            Ok(v) => v,
            Err(_) => return Ok(false),
        };
        if meta.is_dir() {
            fs::remove_dir_all(&local).await?;
        } else {
            fs::remove_file(&local).await?;
        }
        Ok(true)
    }

    async fn copy(&self, path: DfsPath, source: StorageStub) -> DfsResult<bool> {
        let size = source.size(&path).await?;
        let local = self.local_path(&path)?;
        if let Some(parent) = local.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&local)
            .await?;
        let mut offset = 0u64;
        while offset < size {
            let chunk = COPY_CHUNK_SIZE.min(size - offset);
            let data = source.read(&path, offset, chunk).await?;
            if data.len() as u64 != chunk {
                return Err(DfsError::Io(format!(
                    "short read of {} from source server",
                    path
                )));
            }
            file.write_all(&data).await?;
            offset += chunk;
        }
        file.flush().await?;
        Ok(true)
    }
}

/// A storage server: two skeletons over one local root directory.
///
/// `start` brings up both skeletons, registers with the naming server, and
/// prunes the duplicates the registration reports.
pub struct StorageServer {
    inner: Arc<StorageInner>,
    storage_skeleton: Skeleton,
    command_skeleton: Skeleton,
}

impl StorageServer {
    pub fn new(config: StorageConfig) -> DfsResult<Self> {
        let inner = Arc::new(StorageInner { root: config.root });
        let storage_dispatch = Arc::new(StorageDispatcher(inner.clone()));
        let storage_skeleton = match config.storage_addr {
            Some(addr) => Skeleton::with_address(&STORAGE_INTERFACE, storage_dispatch, addr)?,
            None => Skeleton::new(&STORAGE_INTERFACE, storage_dispatch)?,
        };
        let command_dispatch = Arc::new(CommandDispatcher(inner.clone()));
        let command_skeleton = match config.command_addr {
            Some(addr) => Skeleton::with_address(&COMMAND_INTERFACE, command_dispatch, addr)?,
            None => Skeleton::new(&COMMAND_INTERFACE, command_dispatch)?,
        };
        Ok(StorageServer {
            inner,
            storage_skeleton,
            command_skeleton,
        })
    }

    /// Starts both skeletons and registers with the naming server under the
    /// given externally-routable hostname. Duplicates reported back are
    /// deleted from the local disk and emptied directories pruned.
    pub async fn start(&mut self, hostname: &str, naming: &RegistrationStub) -> DfsResult<()> {
        if !self.inner.root.exists() {
            return Err(DfsError::NotFound(format!(
                "storage root does not exist: {}",
                self.inner.root.display()
            )));
        }
        if !self.inner.root.is_dir() {
            return Err(DfsError::NotADirectory(format!(
                "storage root is not a directory: {}",
                self.inner.root.display()
            )));
        }

        self.storage_skeleton.start().await?;
        self.command_skeleton.start().await?;

        let storage_stub = StorageStub::from_skeleton_with_host(&self.storage_skeleton, hostname)?;
        let command_stub = CommandStub::from_skeleton_with_host(&self.command_skeleton, hostname)?;

        let files = DfsPath::list(&self.inner.root)?;
        let duplicates = naming.register(&storage_stub, &command_stub, &files).await?;
        for duplicate in &duplicates {
            self.inner.remove_duplicate(duplicate).await;
        }
        info!(
            "storage: registered {} files under {}, pruned {} duplicates",
            files.len(),
            self.inner.root.display(),
            duplicates.len()
        );
        Ok(())
    }

    pub async fn stop(&mut self) {
        self.storage_skeleton.stop().await;
        self.command_skeleton.stop().await;
        info!("storage: server stopped");
    }

    pub fn storage_addr(&self) -> Option<SocketAddr> {
        self.storage_skeleton.local_addr()
    }

    pub fn command_addr(&self) -> Option<SocketAddr> {
        self.command_skeleton.local_addr()
    }
}
