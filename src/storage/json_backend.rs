use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use super::{sort_records, Record, RecordKind, RecordQuery, StorageBackend, StorageError};

const RECORD_EXTENSION: &str = "json";
const TMP_SUFFIX: &str = "tmp";

/// Filesystem-backed storage keeping one JSON document per record under
/// `<root>/<kind>/<id>.json`.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    root: PathBuf,
}

impl JsonFileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        for kind in [
            RecordKind::Account,
            RecordKind::Transaction,
            RecordKind::Category,
            RecordKind::Checkpoint,
        ] {
            fs::create_dir_all(root.join(kind.as_str()))?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn record_path(&self, kind: RecordKind, id: &str) -> PathBuf {
        self.root
            .join(kind.as_str())
            .join(format!("{}.{}", canonical_name(id), RECORD_EXTENSION))
    }

    fn read_record(path: &Path) -> Result<Record, StorageError> {
        let data = fs::read_to_string(path)?;
        serde_json::from_str(&data)
            .map_err(|err| StorageError::Corrupt(format!("{}: {}", path.display(), err)))
    }
}

impl StorageBackend for JsonFileStorage {
    fn save_record(&self, record: &Record) -> Result<(), StorageError> {
        let path = self.record_path(record.kind, &record.id);
        let json = serde_json::to_string_pretty(record)?;
        let tmp = tmp_path(&path);
        write_atomic(&tmp, &json)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn load_record(&self, kind: RecordKind, id: &str) -> Result<Option<Record>, StorageError> {
        let path = self.record_path(kind, id);
        if !path.exists() {
            return Ok(None);
        }
        let record = Self::read_record(&path)?;
        // A hand-copied file may carry some other record's id.
        if record.id != id {
            return Ok(None);
        }
        Ok(Some(record))
    }

    fn query_range(&self, query: &RecordQuery) -> Result<Vec<Record>, StorageError> {
        let dir = self.root.join(query.kind.as_str());
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut records = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            let record = Self::read_record(&path)?;
            if query.matches(&record) {
                records.push(record);
            }
        }
        sort_records(&mut records);
        Ok(records)
    }
}

/// Maps a record id to a file stem. Lowercase ASCII letters, digits and `-`
/// pass through; every other byte becomes `_xx` (hex), so distinct ids never
/// share a file.
fn canonical_name(id: &str) -> String {
    if id.is_empty() {
        return "_".into();
    }
    let mut name = String::with_capacity(id.len());
    for byte in id.bytes() {
        match byte {
            b'a'..=b'z' | b'0'..=b'9' | b'-' => name.push(char::from(byte)),
            _ => name.push_str(&format!("_{byte:02x}")),
        }
    }
    name
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.to_path_buf();
    let ext = match path.extension().and_then(|ext| ext.to_str()) {
        Some(existing) => format!("{}.{}", existing, TMP_SUFFIX),
        None => TMP_SUFFIX.to_string(),
    };
    tmp.set_extension(ext);
    tmp
}

fn write_atomic(path: &Path, data: &str) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    file.write_all(data.as_bytes())?;
    file.flush()?;
    file.sync_all()?;
    Ok(())
}
