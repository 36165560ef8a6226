// src/store.rs
//! Flat CSV store for incidents.
//!
//! The file is the single shared mutable resource of a pipeline run. Appends go
//! out as one buffered write; full rewrites always go through a sibling temp
//! file followed by a rename, so readers see either the old or the new file and
//! never a partial one.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::incident::{Incident, INCIDENT_FIELDS};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("reading store {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("store {} is not valid CSV: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("store {} has header {found:?}, expected the incident schema", path.display())]
    Schema { path: PathBuf, found: Vec<String> },
    #[error("writing store {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("store task for {} did not complete: {source}", path.display())]
    Task {
        path: PathBuf,
        #[source]
        source: tokio::task::JoinError,
    },
}

impl StoreError {
    fn write(path: &Path, source: impl Into<io::Error>) -> Self {
        Self::Write {
            path: path.to_path_buf(),
            source: source.into(),
        }
    }
}

/// Handle to the store file. Cheap to clone; holds no open descriptors.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
}

impl Store {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling used by [`Store::rewrite_with`]: `<file>.tmp`.
    pub fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn read_err(&self, source: io::Error) -> StoreError {
        StoreError::Read {
            path: self.path.clone(),
            source,
        }
    }

    /// Runs `f` against this store on the blocking thread pool, for callers
    /// on the async runtime.
    pub async fn blocking<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(Store) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || f(store))
            .await
            .map_err(|source| StoreError::Task {
                path: self.path.clone(),
                source,
            })?
    }

    /// `true` when no data has ever been written (missing or zero-length file).
    fn is_blank(&self) -> Result<bool, StoreError> {
        match fs::metadata(&self.path) {
            Ok(meta) => Ok(meta.len() == 0),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(true),
            Err(e) => Err(self.read_err(e)),
        }
    }

    /// Whether the non-empty file ends with a line feed. A hand-edited store
    /// often lacks the final one.
    fn ends_with_newline(&self) -> Result<bool, StoreError> {
        let mut file = File::open(&self.path).map_err(|e| self.read_err(e))?;
        file.seek(SeekFrom::End(-1)).map_err(|e| self.read_err(e))?;
        let mut last = [0u8; 1];
        file.read_exact(&mut last).map_err(|e| self.read_err(e))?;
        Ok(last[0] == b'\n')
    }

    fn open_reader(&self) -> Result<Option<csv::Reader<File>>, StoreError> {
        if self.is_blank()? {
            return Ok(None);
        }
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.read_err(e)),
        };
        let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(file);
        let headers = rdr.headers().map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        if !headers.iter().eq(INCIDENT_FIELDS.iter().copied()) {
            return Err(StoreError::Schema {
                path: self.path.clone(),
                found: headers.iter().map(str::to_string).collect(),
            });
        }
        Ok(Some(rdr))
    }

    /// Full read in file order. `None` when the store does not exist yet or is
    /// empty; a header-only file yields `Some(vec![])`.
    pub fn load(&self) -> Result<Option<Vec<Incident>>, StoreError> {
        let Some(mut rdr) = self.open_reader()? else {
            return Ok(None);
        };
        let mut rows = Vec::new();
        for rec in rdr.deserialize::<Incident>() {
            rows.push(rec.map_err(|source| StoreError::Corrupt {
                path: self.path.clone(),
                source,
            })?);
        }
        Ok(Some(rows))
    }

    /// Every non-empty `source_url` currently stored.
    pub fn source_urls(&self) -> Result<HashSet<String>, StoreError> {
        let rows = self.load()?.unwrap_or_default();
        Ok(rows
            .into_iter()
            .map(|r| r.source_url)
            .filter(|u| !u.is_empty())
            .collect())
    }

    /// Appends `rows` with a single append-mode write, writing the header first
    /// when the file is missing or empty. A missing final line feed is restored
    /// first so the new rows never merge into the last existing one.
    pub fn append(&self, rows: &[Incident]) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }
        let write_header = self.is_blank()?;

        let mut buf = Vec::new();
        if !write_header && !self.ends_with_newline()? {
            buf.push(b'\n');
        }
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(buf);
        if write_header {
            wtr.write_record(INCIDENT_FIELDS)
                .map_err(|e| StoreError::write(&self.path, e))?;
        }
        for row in rows {
            wtr.serialize(row)
                .map_err(|e| StoreError::write(&self.path, e))?;
        }
        let buf = wtr
            .into_inner()
            .map_err(|e| StoreError::write(&self.path, e.into_error()))?;

        ensure_parent(&self.path)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| StoreError::write(&self.path, e))?;
        file.write_all(&buf)
            .map_err(|e| StoreError::write(&self.path, e))?;
        file.sync_all()
            .map_err(|e| StoreError::write(&self.path, e))?;
        Ok(())
    }

    /// Replaces the whole store with `rows` (header + rows, fixed column order).
    pub fn rewrite_all(&self, rows: &[Incident]) -> Result<(), StoreError> {
        self.rewrite_with(|sink| rows.iter().try_for_each(|row| sink.push(row)))
    }

    /// Streams a full replacement into `<file>.tmp` and renames it over the
    /// store. If `fill` or any write step fails, the temp file is removed and
    /// the original file is left untouched.
    pub fn rewrite_with<F>(&self, fill: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut RowSink<'_>) -> Result<(), StoreError>,
    {
        let tmp = self.temp_path();
        ensure_parent(&tmp)?;
        let file = File::create(&tmp).map_err(|e| StoreError::write(&tmp, e))?;

        match self.write_and_swap(file, &tmp, fill) {
            Ok(()) => Ok(()),
            Err(err) => {
                if let Err(rm) = fs::remove_file(&tmp) {
                    tracing::warn!(
                        target: "store",
                        path = %tmp.display(),
                        error = %rm,
                        "could not remove temp file after failed rewrite"
                    );
                }
                Err(err)
            }
        }
    }

    fn write_and_swap<F>(&self, file: File, tmp: &Path, fill: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut RowSink<'_>) -> Result<(), StoreError>,
    {
        let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        wtr.write_record(INCIDENT_FIELDS)
            .map_err(|e| StoreError::write(tmp, e))?;
        {
            let mut sink = RowSink {
                inner: &mut wtr,
                path: tmp,
            };
            fill(&mut sink)?;
        }
        let file = wtr
            .into_inner()
            .map_err(|e| StoreError::write(tmp, e.into_error()))?;
        file.sync_all().map_err(|e| StoreError::write(tmp, e))?;
        drop(file);
        fs::rename(tmp, &self.path).map_err(|e| StoreError::write(&self.path, e))
    }
}

/// Row writer handed to [`Store::rewrite_with`].
pub struct RowSink<'a> {
    inner: &'a mut csv::Writer<File>,
    path: &'a Path,
}

impl RowSink<'_> {
    pub fn push(&mut self, row: &Incident) -> Result<(), StoreError> {
        self.inner
            .serialize(row)
            .map_err(|e| StoreError::write(self.path, e))
    }
}

fn ensure_parent(path: &Path) -> Result<(), StoreError> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => {
            fs::create_dir_all(dir).map_err(|e| StoreError::write(path, e))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn incident(url: &str) -> Incident {
        Incident {
            title: "Burglary".into(),
            post_date: "Tue, 02 Jul 2024 14:00:00 +0000".into(),
            address_string: "4500 Brooklyn Ave NE".into(),
            summary_text: "Suspect entered, with \"tools\", through a window".into(),
            source_url: url.into(),
            ..Default::default()
        }
    }

    #[test]
    fn missing_store_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("incidents.csv"));
        assert!(store.load().unwrap().is_none());
        assert!(store.source_urls().unwrap().is_empty());
    }

    #[test]
    fn append_writes_header_once_and_round_trips_quoting() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("data").join("incidents.csv"));

        store.append(&[incident("https://e.test/a")]).unwrap();
        store.append(&[incident("https://e.test/b")]).unwrap();

        let raw = fs::read_to_string(store.path()).unwrap();
        assert_eq!(raw.matches("source_url").count(), 1);
        assert!(raw.starts_with(&INCIDENT_FIELDS.join(",")));

        let rows = store.load().unwrap().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], incident("https://e.test/a"));
        assert_eq!(rows[1].source_url, "https://e.test/b");
    }

    #[test]
    fn append_after_unterminated_last_row_starts_a_new_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("incidents.csv");
        fs::write(
            &path,
            format!("{}\n,A,,,,,,,https://e.test/a", INCIDENT_FIELDS.join(",")),
        )
        .unwrap();

        let store = Store::new(&path);
        store.append(&[incident("https://e.test/b")]).unwrap();

        let rows = store.load().unwrap().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].title, "A");
        assert_eq!(rows[0].source_url, "https://e.test/a");
        assert_eq!(rows[1], incident("https://e.test/b"));

        store.append(&[incident("https://e.test/c")]).unwrap();
        assert_eq!(store.load().unwrap().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn blocking_runs_store_io_off_the_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("incidents.csv"));
        store
            .blocking(|s| s.append(&[incident("https://e.test/a")]))
            .await
            .unwrap();
        let rows = store.blocking(|s| s.load()).await.unwrap().unwrap();
        assert_eq!(rows, vec![incident("https://e.test/a")]);
    }

    #[test]
    fn unexpected_header_is_a_schema_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("incidents.csv");
        fs::write(&path, "title,link\nA,https://e.test/a\n").unwrap();
        let err = Store::new(&path).source_urls().unwrap_err();
        assert!(matches!(err, StoreError::Schema { .. }), "got {err:?}");
    }

    #[test]
    fn ragged_rows_are_reported_as_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("incidents.csv");
        fs::write(&path, format!("{}\nonly,three,fields\n", INCIDENT_FIELDS.join(","))).unwrap();
        let err = Store::new(&path).load().unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }), "got {err:?}");
    }

    #[test]
    fn rewrite_replaces_contents_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("incidents.csv"));
        store
            .append(&[incident("https://e.test/a"), incident("https://e.test/b")])
            .unwrap();

        let mut rows = store.load().unwrap().unwrap();
        rows[1].set_coordinates(47.66, -122.31);
        store.rewrite_all(&rows).unwrap();

        let again = store.load().unwrap().unwrap();
        assert_eq!(again, rows);
        assert!(!store.temp_path().exists());
    }

    #[test]
    fn failed_rewrite_keeps_original_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("incidents.csv"));
        store.append(&[incident("https://e.test/a")]).unwrap();
        let before = fs::read(store.path()).unwrap();

        let err = store
            .rewrite_with(|sink| {
                sink.push(&incident("https://e.test/replacement"))?;
                assert!(store.temp_path().exists(), "temp file should exist mid-write");
                Err(StoreError::Write {
                    path: store.temp_path(),
                    source: io::Error::other("disk full"),
                })
            })
            .unwrap_err();

        assert!(matches!(err, StoreError::Write { .. }));
        assert_eq!(fs::read(store.path()).unwrap(), before);
        assert!(!store.temp_path().exists());
    }
}
