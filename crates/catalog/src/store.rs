use std::fs;
use std::path::Path;
use std::sync::Arc;

use common::TrackRecord;
use redb::{Database, ReadableTable, TableDefinition, TableError};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::CatalogError;

const CATALOG_VERSION: u32 = 1;

const TRACKS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("tracks");
const META_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");

const META_VERSION_KEY: &str = "version";

/// The catalog: one record per known file, keyed by library-relative path.
///
/// redb gives the single-writer discipline for free: write transactions
/// serialize, readers see a consistent snapshot. The store is opened once
/// and passed by handle into every component.
#[derive(Clone)]
pub struct CatalogStore {
    db: Arc<Database>,
}

impl CatalogStore {
    /// Opens (or creates) the catalog. A version mismatch drops all records
    /// so the next scan rebuilds from scratch.
    pub fn open(path: &Path) -> Result<Self, CatalogError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let db = if path.exists() {
            Database::open(path)?
        } else {
            Database::create(path)?
        };
        let store = Self { db: Arc::new(db) };

        match store.read_version()? {
            Some(version) if version == CATALOG_VERSION => {}
            Some(version) => {
                warn!("Catalog version mismatch ({}); clearing records", version);
                store.clear()?;
            }
            None => {
                store.write_version()?;
            }
        }
        Ok(store)
    }

    pub fn upsert(&self, record: &TrackRecord) -> Result<(), CatalogError> {
        let bytes = encode_value(record)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(TRACKS_TABLE)?;
            table.insert(record.path.as_str(), bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Refreshes last_seen without touching any other field. Used when an
    /// incremental scan finds the file unchanged.
    pub fn touch(&self, path: &str, now: u64) -> Result<bool, CatalogError> {
        let write_txn = self.db.begin_write()?;
        let touched = {
            let mut table = write_txn.open_table(TRACKS_TABLE)?;
            let mut record: TrackRecord = match table.get(path)? {
                Some(value) => decode_value(value.value())?,
                None => return Ok(false),
            };
            record.last_seen = now;
            let bytes = encode_value(&record)?;
            table.insert(path, bytes.as_slice())?;
            true
        };
        write_txn.commit()?;
        Ok(touched)
    }

    pub fn get(&self, path: &str) -> Result<Option<TrackRecord>, CatalogError> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(TRACKS_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let record = match table.get(path)? {
            Some(value) => Some(decode_value(value.value())?),
            None => None,
        };
        Ok(record)
    }

    /// All live records, ordered by path.
    pub fn all(&self) -> Result<Vec<TrackRecord>, CatalogError> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(TRACKS_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut records = Vec::new();
        for entry in table.iter()? {
            let entry = entry?;
            records.push(decode_value(entry.1.value())?);
        }
        Ok(records)
    }

    pub fn len(&self) -> Result<usize, CatalogError> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(TRACKS_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(0),
            Err(err) => return Err(err.into()),
        };
        Ok(table.len()? as usize)
    }

    pub fn is_empty(&self) -> Result<bool, CatalogError> {
        Ok(self.len()? == 0)
    }

    pub fn remove(&self, path: &str) -> Result<bool, CatalogError> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(TRACKS_TABLE)?;
            let removed = table.remove(path)?.is_some();
            removed
        };
        write_txn.commit()?;
        Ok(removed)
    }

    /// Rewrites a record under a new path key, as after an executed move.
    pub fn rekey(&self, old_path: &str, new_path: &str) -> Result<bool, CatalogError> {
        let write_txn = self.db.begin_write()?;
        let moved = {
            let mut table = write_txn.open_table(TRACKS_TABLE)?;
            let record: Option<TrackRecord> = match table.get(old_path)? {
                Some(value) => Some(decode_value(value.value())?),
                None => None,
            };
            match record {
                Some(mut record) => {
                    record.path = new_path.to_string();
                    let bytes = encode_value(&record)?;
                    table.remove(old_path)?;
                    table.insert(new_path, bytes.as_slice())?;
                    true
                }
                None => false,
            }
        };
        write_txn.commit()?;
        Ok(moved)
    }

    fn clear(&self) -> Result<(), CatalogError> {
        let write_txn = self.db.begin_write()?;
        match write_txn.delete_table(TRACKS_TABLE) {
            Ok(_) => {}
            Err(TableError::TableDoesNotExist(_)) => {}
            Err(err) => return Err(err.into()),
        }
        {
            let mut meta = write_txn.open_table(META_TABLE)?;
            let bytes = encode_value(&CATALOG_VERSION)?;
            meta.insert(META_VERSION_KEY, bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn read_version(&self) -> Result<Option<u32>, CatalogError> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(META_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let version = match table.get(META_VERSION_KEY)? {
            Some(value) => Some(decode_value(value.value())?),
            None => None,
        };
        Ok(version)
    }

    fn write_version(&self) -> Result<(), CatalogError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(META_TABLE)?;
            let bytes = encode_value(&CATALOG_VERSION)?;
            table.insert(META_VERSION_KEY, bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }
}

fn encode_value<T: Serialize>(value: &T) -> Result<Vec<u8>, CatalogError> {
    Ok(bincode::serialize(value)?)
}

fn decode_value<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, CatalogError> {
    Ok(bincode::deserialize(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::CatalogStore;
    use common::{now_secs, TrackRecord};

    fn record(path: &str) -> TrackRecord {
        TrackRecord {
            path: path.to_string(),
            size_bytes: 42,
            content_hash: Some("abc".to_string()),
            raw_artist: Some("Artist".to_string()),
            raw_album: Some("Album".to_string()),
            raw_title: Some("Title".to_string()),
            raw_track_number: Some(1),
            raw_year: Some(1977),
            raw_genre: Some("Rock".to_string()),
            parsed_artist: "Artist".to_string(),
            parsed_album: "Album".to_string(),
            parsed_title: "Title".to_string(),
            normalized_artist: "artist".to_string(),
            normalized_album: "album".to_string(),
            normalized_title: "title".to_string(),
            duration_seconds: Some(180.5),
            bitrate: Some(320),
            last_seen: now_secs(),
            modified: 100,
        }
    }

    #[test]
    fn upsert_get_remove_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = CatalogStore::open(&dir.path().join("catalog.redb")).unwrap();

        let rec = record("a/b.mp3");
        store.upsert(&rec).unwrap();
        assert_eq!(store.get("a/b.mp3").unwrap(), Some(rec));
        assert_eq!(store.len().unwrap(), 1);

        assert!(store.remove("a/b.mp3").unwrap());
        assert!(store.get("a/b.mp3").unwrap().is_none());
        assert!(!store.remove("a/b.mp3").unwrap());
    }

    #[test]
    fn touch_refreshes_last_seen_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = CatalogStore::open(&dir.path().join("catalog.redb")).unwrap();

        let mut rec = record("a/b.mp3");
        rec.last_seen = 5;
        store.upsert(&rec).unwrap();
        assert!(store.touch("a/b.mp3", 99).unwrap());

        let loaded = store.get("a/b.mp3").unwrap().unwrap();
        assert_eq!(loaded.last_seen, 99);
        assert_eq!(loaded.content_hash, rec.content_hash);
        assert!(!store.touch("missing.mp3", 99).unwrap());
    }

    #[test]
    fn rekey_moves_a_record_to_its_new_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = CatalogStore::open(&dir.path().join("catalog.redb")).unwrap();

        store.upsert(&record("old/name.mp3")).unwrap();
        assert!(store.rekey("old/name.mp3", "new/name.mp3").unwrap());
        assert!(store.get("old/name.mp3").unwrap().is_none());
        assert_eq!(
            store.get("new/name.mp3").unwrap().unwrap().path,
            "new/name.mp3"
        );
    }

    #[test]
    fn reopen_preserves_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.redb");
        {
            let store = CatalogStore::open(&path).unwrap();
            store.upsert(&record("keep.mp3")).unwrap();
        }
        let store = CatalogStore::open(&path).unwrap();
        assert_eq!(store.len().unwrap(), 1);
    }
}
