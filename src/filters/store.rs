//! Directory-scoped storage for filter contents.
//!
//! New content is always written to a temporary file inside the filters
//! directory and then renamed over `<ID>.txt`, so the target path only ever
//! holds a complete, previously committed list.

use std::future::Future;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt, BufReader};
use tracing::error;
use uuid::Uuid;

use super::parser::{parse_filter, ParsedFilter};
use super::validator::PrefixProbe;
use crate::error::FilterResult;

/// Subdirectory of the data directory holding filter lists.
pub const FILTER_DIR: &str = "filters";

/// A body that arrives chunk by chunk.
pub trait ChunkSource {
    /// Next chunk, `None` at end of stream.
    fn next_chunk(&mut self) -> impl Future<Output = FilterResult<Option<Vec<u8>>>> + Send;
}

/// What [`ContentStore::put`] did with the streamed content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutcome {
    /// The content differed and now sits at the target path.
    Committed(ParsedFilter),
    /// Same checksum as before; the target was only touched.
    Unchanged(ParsedFilter),
}

#[derive(Debug, Clone)]
pub struct ContentStore {
    dir: PathBuf,
}

impl ContentStore {
    /// Store rooted at `<data_dir>/filters`.
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            dir: data_dir.as_ref().join(FILTER_DIR),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Canonical path of a filter's committed content.
    pub fn path(&self, id: i64) -> PathBuf {
        self.dir.join(format!("{id}.txt"))
    }

    pub async fn ensure_dir(&self) -> FilterResult<()> {
        fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    /// Open a fresh temporary file next to the target of `id`.
    async fn stage(&self, id: i64) -> FilterResult<StagedFile> {
        let tmp = self.dir.join(format!(".{}.{}.tmp", id, Uuid::new_v4().simple()));

        let mut opts = OpenOptions::new();
        opts.read(true).write(true).create_new(true);
        #[cfg(unix)]
        opts.mode(0o644);
        let file = opts.open(&tmp).await?;

        Ok(StagedFile {
            file: Some(file),
            tmp,
            target: self.path(id),
            finished: false,
        })
    }

    /// Stream `src` into the store under `id`.
    ///
    /// The head of the stream is validated on the way in, then the staged
    /// copy is parsed. Content whose CRC-32 differs from `previous_checksum`
    /// is renamed over the target; otherwise the staged copy is dropped and
    /// only the target's modification time is bumped. On any error the
    /// target is left untouched.
    pub async fn put<S>(&self, id: i64, src: &mut S, previous_checksum: u32) -> FilterResult<PutOutcome>
    where
        S: ChunkSource,
    {
        let mut staged = self.stage(id).await?;

        let mut probe = PrefixProbe::new();
        while let Some(chunk) = src.next_chunk().await? {
            probe.feed(&chunk)?;
            staged.write_all(&chunk).await?;
        }
        probe.finish()?;

        let parsed = parse_filter(&mut staged.reader().await?).await?;

        if parsed.checksum == previous_checksum {
            staged.discard().await?;
            if let Err(e) = self.touch(id).await {
                error!("Updating mtime of filter {}: {}", id, e);
            }
            return Ok(PutOutcome::Unchanged(parsed));
        }

        staged.commit().await?;
        Ok(PutOutcome::Committed(parsed))
    }

    /// Set the modification time of a committed filter to now.
    pub async fn touch(&self, id: i64) -> FilterResult<()> {
        let path = self.path(id);
        tokio::task::spawn_blocking(move || {
            let now = filetime::FileTime::from_system_time(SystemTime::now());
            filetime::set_file_times(path, now, now)
        })
        .await
        .map_err(std::io::Error::other)??;
        Ok(())
    }

    /// Open committed content for reading. `None` if nothing was committed yet.
    pub async fn open(&self, id: i64) -> FilterResult<Option<File>> {
        match File::open(self.path(id)).await {
            Ok(file) => Ok(Some(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete committed content. A missing file is not an error.
    pub async fn remove(&self, id: i64) -> FilterResult<()> {
        match fs::remove_file(self.path(id)).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

/// A temporary file that either gets renamed onto its target or removed.
///
/// Dropping a staged file without committing removes it.
#[derive(Debug)]
struct StagedFile {
    file: Option<File>,
    tmp: PathBuf,
    target: PathBuf,
    finished: bool,
}

impl StagedFile {
    async fn write_all(&mut self, data: &[u8]) -> FilterResult<()> {
        let file = self.file.as_mut().ok_or_else(closed)?;
        file.write_all(data).await?;
        Ok(())
    }

    /// Rewind to the start and hand out a buffered reader over what was written.
    async fn reader(&mut self) -> FilterResult<BufReader<&mut File>> {
        let file = self.file.as_mut().ok_or_else(closed)?;
        file.flush().await?;
        file.seek(SeekFrom::Start(0)).await?;
        Ok(BufReader::new(file))
    }

    /// Atomically replace the target with the staged content.
    async fn commit(mut self) -> FilterResult<()> {
        // Close before renaming; Windows refuses to rename open files.
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            file.sync_all().await?;
        }

        self.finished = true;
        if let Err(e) = fs::rename(&self.tmp, &self.target).await {
            let _ = fs::remove_file(&self.tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Remove the staged content without touching the target.
    async fn discard(mut self) -> FilterResult<()> {
        self.file.take();
        self.finished = true;
        fs::remove_file(&self.tmp).await?;
        Ok(())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.file.take();
        if let Err(e) = std::fs::remove_file(&self.tmp) {
            tracing::warn!("Failed to remove temporary file {}: {}", self.tmp.display(), e);
        }
    }
}

fn closed() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, "staged file already closed")
}
