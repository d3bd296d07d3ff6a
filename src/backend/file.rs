use crate::backend::memory::{read_table, write_table, DocumentTable};
use crate::backend::{BackendKind, SearchBackend, SearchOptions, SearchResults};
use crate::document::{DocumentId, IndexedDocument};
use crate::error::{Result, SheafError};
use crate::record::RecordType;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

const DOCUMENTS_FILE: &str = "documents.json";
const META_FILE: &str = "meta.json";
const FORMAT_VERSION: u32 = 1;

/// Snapshot metadata stored in meta.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub version: u32,
    pub connection: String,
    pub doc_count: usize,
    pub created_at: u64,
    pub updated_at: u64,
}

/// Backend persisting its documents under a directory.
///
/// The whole table is rewritten after every mutation (temp file, then rename),
/// so a crash leaves either the previous or the new snapshot on disk.
pub struct FileBackend {
    connection: String,
    dir: PathBuf,
    table: RwLock<DocumentTable>,
    compaction_ratio: f32,
    created_at: u64,
}

impl FileBackend {
    /// Open (or create) the snapshot directory and load any existing documents
    pub fn open(connection: &str, dir: &Path, compaction_ratio: f32) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| io_error(connection, dir, e))?;

        let documents_path = dir.join(DOCUMENTS_FILE);
        let documents: Vec<IndexedDocument> = if documents_path.exists() {
            let file = File::open(&documents_path).map_err(|e| io_error(connection, &documents_path, e))?;
            serde_json::from_reader(BufReader::new(file)).map_err(|e| {
                SheafError::backend(
                    connection,
                    format!("Corrupt snapshot {}: {}", documents_path.display(), e),
                )
            })?
        } else {
            Vec::new()
        };

        let meta_path = dir.join(META_FILE);
        let created_at = fs::read_to_string(&meta_path)
            .ok()
            .and_then(|s| serde_json::from_str::<SnapshotMeta>(&s).ok())
            .map(|m| m.created_at)
            .unwrap_or_else(now_secs);

        tracing::debug!(
            connection,
            path = %dir.display(),
            documents = documents.len(),
            "opened file backend"
        );

        Ok(Self {
            connection: connection.to_string(),
            dir: dir.to_path_buf(),
            table: RwLock::new(DocumentTable::from_documents(documents)),
            compaction_ratio,
            created_at,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Remove the snapshot directory from disk
    pub fn destroy(self) -> Result<()> {
        if self.dir.exists() {
            fs::remove_dir_all(&self.dir).map_err(|e| io_error(&self.connection, &self.dir, e))?;
        }
        Ok(())
    }

    /// Read the metadata of the last written snapshot
    pub fn meta(&self) -> Result<Option<SnapshotMeta>> {
        read_snapshot_meta(&self.dir)
    }

    /// Apply `change` to a copy of the table, write the copy to disk, then
    /// swap it in. A failed write leaves both disk and memory unchanged.
    fn commit<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut DocumentTable) -> bool,
    {
        let mut table = write_table(&self.connection, &self.table)?;
        let mut staged = table.clone();
        if !change(&mut staged) {
            return Ok(());
        }
        staged.maybe_compact(self.compaction_ratio);
        self.persist(&staged)?;
        *table = staged;
        Ok(())
    }

    /// Write the table to disk; caller holds the write lock
    fn persist(&self, table: &DocumentTable) -> Result<()> {
        let documents: Vec<&IndexedDocument> = table.documents().collect();

        let documents_path = self.dir.join(DOCUMENTS_FILE);
        write_atomically(&documents_path, |file| {
            serde_json::to_writer(&mut *file, &documents)?;
            Ok(())
        })
        .map_err(|e| self.wrap(&documents_path, e))?;

        let meta = SnapshotMeta {
            version: FORMAT_VERSION,
            connection: self.connection.clone(),
            doc_count: documents.len(),
            created_at: self.created_at,
            updated_at: now_secs(),
        };
        let meta_path = self.dir.join(META_FILE);
        write_atomically(&meta_path, |file| {
            serde_json::to_writer_pretty(&mut *file, &meta)?;
            Ok(())
        })
        .map_err(|e| self.wrap(&meta_path, e))?;

        Ok(())
    }

    fn wrap(&self, path: &Path, err: SheafError) -> SheafError {
        match err {
            SheafError::Io(e) => io_error(&self.connection, path, e),
            other => SheafError::backend(&self.connection, other.to_string()),
        }
    }
}

impl SearchBackend for FileBackend {
    fn connection_name(&self) -> &str {
        &self.connection
    }

    fn kind(&self) -> BackendKind {
        BackendKind::File
    }

    fn update(&self, documents: &[IndexedDocument]) -> Result<()> {
        self.commit(|table| {
            for document in documents {
                table.upsert(document.clone());
            }
            true
        })
    }

    fn remove(&self, id: &DocumentId) -> Result<()> {
        self.commit(|table| table.remove(id))
    }

    fn clear(&self, models: Option<&[RecordType]>) -> Result<()> {
        self.commit(|table| {
            table.clear(models);
            true
        })
    }

    fn search(&self, query_string: &str, options: &SearchOptions) -> Result<SearchResults> {
        let table = read_table(&self.connection, &self.table)?;
        Ok(table.search(query_string, options))
    }

    fn document_count(&self) -> Result<usize> {
        Ok(read_table(&self.connection, &self.table)?.len())
    }
}

/// Read a snapshot's meta.json without loading its documents
pub fn read_snapshot_meta(dir: &Path) -> Result<Option<SnapshotMeta>> {
    let meta_path = dir.join(META_FILE);
    if !meta_path.exists() {
        return Ok(None);
    }
    let file = File::open(&meta_path)?;
    Ok(Some(serde_json::from_reader(BufReader::new(file))?))
}

/// Write through a temp file in the same directory, then rename over `path`
fn write_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let tmp_path = path.with_extension("json.tmp");
    let mut file = BufWriter::new(File::create(&tmp_path)?);
    write(&mut file)?;
    file.flush()?;
    file.get_ref().sync_all()?;
    drop(file);
    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn io_error(connection: &str, path: &Path, err: std::io::Error) -> SheafError {
    SheafError::backend(connection, format!("{}: {}", path.display(), err))
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
