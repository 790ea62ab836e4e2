use super::tables::{Mutation, Tables};
use crate::{
    BucketKey, BucketState, Error, RecordStore, Result, SctId, SctIdRecord, StatusChange,
    StatusFilter,
};
use fs2::FileExt;
use parking_lot::RwLock;
use std::{
    fs::{self, File, OpenOptions},
    io::{BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

const JOURNAL: &str = "journal.jsonl";
const JOURNAL_TMP: &str = "journal.jsonl.tmp";
const LOCK: &str = "sctid.lock";
const SNAPSHOT_BATCH: usize = 512;
const COMPACTION_FLOOR: u64 = 4 << 20;

/// Durable [`RecordStore`] backed by an append-only JSON-lines journal.
///
/// Each mutation is one line, written and synced before the call returns,
/// so a crash loses at most the line being written. Opening replays the
/// journal (dropping a torn final line) and compacts it into a snapshot.
/// While running, the journal is compacted again whenever it grows past
/// twice the last snapshot, or past the compaction floor if that is larger.
/// The directory is held under an exclusive OS file lock for the lifetime
/// of the store.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    inner: RwLock<Inner>,
    compaction_floor: u64,
    _lock: File,
}

#[derive(Debug)]
struct Inner {
    tables: Tables,
    journal: File,
    journal_len: u64,
    snapshot_len: u64,
}

impl FileStore {
    /// Opens (or creates) the store in `dir`.
    ///
    /// # Errors
    /// [`Error::Unavailable`] if the directory is locked by another process,
    /// the journal cannot be read, or a line other than the last is corrupt.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(dir.join(LOCK))?;
        if let Err(err) = lock.try_lock_exclusive() {
            let contended = err.kind() == std::io::ErrorKind::WouldBlock
                || err.raw_os_error() == fs2::lock_contended_error().raw_os_error();
            if contended {
                return Err(Error::unavailable(format!(
                    "data directory {} is in use by another process",
                    dir.display()
                )));
            }
            return Err(err.into());
        }

        let mut tables = Tables::default();
        let replayed = replay(&dir.join(JOURNAL), &mut tables)?;
        let (journal, journal_len) = compact_into(&dir, &tables)?;

        tracing::info!(
            dir = %dir.display(),
            mutations = replayed,
            records = tables.record_count(),
            "opened identifier journal"
        );

        Ok(Self {
            dir,
            inner: RwLock::new(Inner {
                tables,
                journal,
                journal_len,
                snapshot_len: journal_len,
            }),
            compaction_floor: COMPACTION_FLOOR,
            _lock: lock,
        })
    }

    /// Journal size below which no automatic compaction happens, whatever
    /// the snapshot size. Defaults to 4 MiB.
    #[must_use]
    pub fn with_compaction_floor(mut self, bytes: u64) -> Self {
        self.compaction_floor = bytes;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Rewrites the journal as a snapshot of the current image.
    pub fn compact(&self) -> Result<()> {
        self.compact_locked(&mut self.inner.write())
    }

    fn compact_locked(&self, inner: &mut Inner) -> Result<()> {
        let (journal, journal_len) = compact_into(&self.dir, &inner.tables)?;
        inner.journal = journal;
        inner.journal_len = journal_len;
        inner.snapshot_len = journal_len;
        Ok(())
    }

    fn commit(&self, inner: &mut Inner, mutation: Mutation) -> Result<()> {
        let mut line = serde_json::to_vec(&mutation)?;
        line.push(b'\n');
        let written = inner
            .journal
            .write_all(&line)
            .and_then(|()| inner.journal.sync_data());
        if let Err(err) = written {
            // Drop any partial line so later appends stay parseable.
            if let Err(trunc) = inner.journal.set_len(inner.journal_len) {
                tracing::warn!(error = %trunc, "failed to truncate journal after write error");
            }
            return Err(err.into());
        }
        inner.journal_len += line.len() as u64;
        inner.tables.apply(mutation);

        let threshold = self.compaction_floor.max(inner.snapshot_len.saturating_mul(2));
        if inner.journal_len > threshold {
            // The mutation is already durable; a failed compaction is retried
            // on the next commit.
            if let Err(err) = self.compact_locked(inner) {
                tracing::warn!(error = %err, bytes = inner.journal_len, "journal compaction failed");
            }
        }
        Ok(())
    }
}

/// Applies every journal line to `tables`. Returns the number of lines
/// applied.
fn replay(path: &Path, tables: &mut Tables) -> Result<usize> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(err.into()),
    };
    // Raw bytes: a crash can cut the final line inside a multi-byte character.
    let lines: Vec<Vec<u8>> = BufReader::new(file)
        .split(b'\n')
        .collect::<std::io::Result<_>>()?;
    let last = lines
        .iter()
        .rposition(|line| !line.trim_ascii().is_empty())
        .unwrap_or_default();
    let mut applied = 0;
    for (n, line) in lines.iter().enumerate() {
        if line.trim_ascii().is_empty() {
            continue;
        }
        match serde_json::from_slice::<Mutation>(line) {
            Ok(mutation) => {
                tables.apply(mutation);
                applied += 1;
            }
            Err(err) if n == last => {
                tracing::warn!(line = n + 1, error = %err, "discarding torn journal line");
            }
            Err(err) => {
                return Err(Error::unavailable(format!(
                    "journal {} is corrupt at line {}: {err}",
                    path.display(),
                    n + 1
                )));
            }
        }
    }
    Ok(applied)
}

/// Writes a snapshot to a temporary file and renames it over the journal.
/// Returns an append handle on the new journal and its length.
///
/// The append handle is opened before the rename, so once the rename has
/// happened the caller always gets a handle on the live journal.
fn compact_into(dir: &Path, tables: &Tables) -> Result<(File, u64)> {
    let tmp = dir.join(JOURNAL_TMP);
    {
        let mut out = BufWriter::new(File::create(&tmp)?);
        for mutation in tables.snapshot(SNAPSHOT_BATCH) {
            serde_json::to_writer(&mut out, &mutation)?;
            out.write_all(b"\n")?;
        }
        let file = out.into_inner().map_err(|err| err.into_error())?;
        file.sync_all()?;
    }
    let journal = OpenOptions::new().append(true).open(&tmp)?;
    let len = journal.metadata()?.len();
    fs::rename(&tmp, dir.join(JOURNAL))?;
    #[cfg(unix)]
    if let Err(err) = File::open(dir).and_then(|d| d.sync_all()) {
        tracing::warn!(error = %err, "failed to sync data directory after compaction");
    }

    tracing::info!(bytes = len, "compacted identifier journal");
    Ok((journal, len))
}

impl RecordStore for FileStore {
    fn find(&self, id: SctId) -> Result<Option<SctIdRecord>> {
        Ok(self.inner.read().tables.find(id).cloned())
    }

    fn list_by_bucket(&self, key: BucketKey, filter: StatusFilter) -> Result<Vec<SctIdRecord>> {
        Ok(self.inner.read().tables.list_by_bucket(key, filter))
    }

    fn load_bucket(&self, key: BucketKey) -> Result<Option<BucketState>> {
        Ok(self.inner.read().tables.bucket(key).cloned())
    }

    fn put_new(&self, key: BucketKey, records: &[SctIdRecord], bucket: &BucketState) -> Result<()> {
        let mut inner = self.inner.write();
        let mutation = inner.tables.prepare_put(key, records, bucket)?;
        self.commit(&mut inner, mutation)
    }

    fn transition(&self, change: &StatusChange) -> Result<()> {
        let mut inner = self.inner.write();
        let mutation = inner.tables.prepare_transition(change)?;
        self.commit(&mut inner, mutation)
    }
}
