use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fs2::FileExt;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::trace;

use super::{OpenFlags, StorageBackend, StorageFile};
use crate::error::StorageError;

/// Local-filesystem storage rooted at a base directory.
#[derive(Debug, Clone)]
pub struct LocalFsStorage {
    base_path: PathBuf,
}

impl LocalFsStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self { base_path: base_path.into() }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        self.base_path.join(path)
    }
}

#[async_trait]
impl StorageBackend for LocalFsStorage {
    async fn mkdir(&self, path: &Path, allow_exists: bool) -> Result<(), StorageError> {
        let abs = self.resolve(path);
        trace!(path = %abs.display(), "mkdir");
        match fs::create_dir(&abs).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::AlreadyExists && allow_exists => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn open(
        &self,
        path: &Path,
        flags: OpenFlags,
    ) -> Result<Box<dyn StorageFile>, StorageError> {
        let abs = self.resolve(path);
        trace!(path = %abs.display(), ?flags, "open");
        let mut options = fs::OpenOptions::new();
        options
            .read(flags.read)
            .write(flags.write)
            .create(flags.create)
            .truncate(flags.truncate);
        #[cfg(unix)]
        if flags.create {
            options.mode(flags.mode);
        }
        let file = options.open(&abs).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StorageError::NotFound(abs.clone())
            } else {
                StorageError::Io(err)
            }
        })?;
        Ok(Box::new(LocalFsFile { file: Some(file), locked: false }))
    }
}

/// An open local file; implements locking over the raw descriptor so two
/// handles on the same path contend even within one process.
#[derive(Debug)]
pub struct LocalFsFile {
    file: Option<fs::File>,
    locked: bool,
}

impl LocalFsFile {
    fn file_mut(&mut self) -> Result<&mut fs::File, StorageError> {
        self.file.as_mut().ok_or(StorageError::Closed)
    }

    /// Run a blocking flock operation by round-tripping through the std
    /// handle; position and descriptor are preserved.
    async fn with_std<F>(&mut self, op: F) -> Result<(), StorageError>
    where
        F: FnOnce(&std::fs::File) -> std::io::Result<()> + Send + 'static,
    {
        let file = self.file.take().ok_or(StorageError::Closed)?;
        let std_file = file.into_std().await;
        let result = op(&std_file);
        self.file = Some(fs::File::from_std(std_file));
        result.map_err(|err| {
            if err.kind() == ErrorKind::WouldBlock {
                StorageError::LockContended
            } else {
                StorageError::Io(err)
            }
        })
    }
}

#[async_trait]
impl StorageFile for LocalFsFile {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, StorageError> {
        let file = self.file_mut()?;
        let mut filled = 0;
        while filled < buf.len() {
            let n = file.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<(), StorageError> {
        let file = self.file_mut()?;
        file.write_all(data).await?;
        Ok(())
    }

    async fn try_lock_exclusive(&mut self) -> Result<(), StorageError> {
        self.with_std(|f| FileExt::try_lock_exclusive(f)).await?;
        self.locked = true;
        Ok(())
    }

    async fn unlock(&mut self) -> Result<(), StorageError> {
        if !self.locked {
            return Ok(());
        }
        self.with_std(|f| FileExt::unlock(f)).await?;
        self.locked = false;
        Ok(())
    }

    async fn close(mut self: Box<Self>) -> Result<(), StorageError> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            file.sync_all().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    fn backend() -> (TempDir, LocalFsStorage) {
        let dir = TempDir::new().expect("tempdir");
        let storage = LocalFsStorage::new(dir.path());
        (dir, storage)
    }

    #[tokio::test]
    async fn mkdir_respects_allow_exists() {
        let (_dir, storage) = backend();
        storage.mkdir(Path::new("a"), false).await.expect("first mkdir");
        storage.mkdir(Path::new("a"), true).await.expect("mkdir allow_exists");
        let err = storage.mkdir(Path::new("a"), false).await.unwrap_err();
        assert!(!err.is_not_found());
    }

    #[tokio::test]
    async fn mkdir_of_orphan_path_fails() {
        let (_dir, storage) = backend();
        let err = storage.mkdir(Path::new("no/parent/here"), true).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn read_fills_until_eof() {
        let (dir, storage) = backend();
        std::fs::write(dir.path().join("blob"), b"0123456789").unwrap();

        let mut file = storage
            .open(Path::new("blob"), OpenFlags::read_only())
            .await
            .expect("open");
        let mut buf = [0u8; 6];
        assert_eq!(file.read(&mut buf).await.unwrap(), 6);
        assert_eq!(&buf, b"012345");
        assert_eq!(file.read(&mut buf).await.unwrap(), 4);
        assert_eq!(&buf[..4], b"6789");
        assert_eq!(file.read(&mut buf).await.unwrap(), 0);
        file.close().await.unwrap();
    }

    #[tokio::test]
    async fn open_read_only_reports_missing() {
        let (_dir, storage) = backend();
        let err = storage
            .open(Path::new("absent"), OpenFlags::read_only())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn exclusive_lock_contends_across_handles() {
        let (dir, storage) = backend();

        let mut first = storage
            .open(Path::new("artifact"), OpenFlags::write_create())
            .await
            .expect("create");
        first.try_lock_exclusive().await.expect("first lock");

        let holder = std::fs::File::open(dir.path().join("artifact")).unwrap();
        let contended = FileExt::try_lock_exclusive(&holder);
        assert_eq!(contended.unwrap_err().kind(), ErrorKind::WouldBlock);

        first.unlock().await.expect("unlock");
        FileExt::try_lock_exclusive(&holder).expect("lock after release");
        FileExt::unlock(&holder).unwrap();
        Box::new(LocalFsFile { file: None, locked: false })
            .close()
            .await
            .expect("closing empty handle is fine");
        first.close().await.unwrap();
    }
}
