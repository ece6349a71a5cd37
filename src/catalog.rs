//! Purpose: Read-facing facade that reconstructs typed records from the store.
//! Exports: `Catalog`, `ListAll`, `READ_FALLBACK_CLUSTER`.
//! Role: Entry point for queries (`get`, `filter`, `list_all`) and for ingest/download runs.
//! Invariants: Every query re-resolves its clusters and reflects all completed writes.
//! Invariants: A decode failure aborts the query; no partially decoded cluster is returned.
use std::iter::FusedIterator;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::CatalogConfig;
use crate::core::cluster::Cluster;
use crate::core::collection::Collection;
use crate::core::error::{Error, ErrorKind};
use crate::core::store::{Store, StoreOptions, WRITE_FALLBACK_CLUSTER};
use crate::declared::{DescriptorTable, IngestReport};
use crate::models::Model;
use crate::remote::{CSV_FOLDER, DataSource};

/// Cluster read by `get`/`filter` when no cluster is named.
///
/// Records written without a cluster land in `unique`; reads without a cluster
/// look in `default` first and then in `unique`, so both paths meet.
pub const READ_FALLBACK_CLUSTER: &str = "default";

pub struct Catalog {
    store: Store,
    table: Arc<DescriptorTable>,
    csv_folder: PathBuf,
    source: Option<Box<dyn DataSource>>,
}

impl Catalog {
    /// A catalog over `store` using the standard descriptor table. CSV files are
    /// expected in `remote/csv` next to the store directory.
    pub fn new(store: Store) -> Self {
        let base = store.root().parent().unwrap_or(store.root());
        let csv_folder = base.join("remote").join(CSV_FOLDER);
        Self {
            store,
            table: DescriptorTable::standard(),
            csv_folder,
            source: None,
        }
    }

    pub fn open(config: &CatalogConfig) -> Result<Self, Error> {
        let options = StoreOptions::new().with_cache(config.cache());
        let store = Store::with_options(config.store_dir(), options);
        Ok(Self::new(store)
            .with_csv_folder(config.csv_dir())
            .with_source(config.data_source()?))
    }

    pub fn with_table(mut self, table: Arc<DescriptorTable>) -> Self {
        self.table = table;
        self
    }

    pub fn with_csv_folder(mut self, csv_folder: impl Into<PathBuf>) -> Self {
        self.csv_folder = csv_folder.into();
        self
    }

    pub fn with_source(mut self, source: Box<dyn DataSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }

    pub fn table(&self) -> &DescriptorTable {
        &self.table
    }

    pub fn csv_folder(&self) -> &Path {
        &self.csv_folder
    }

    pub fn source(&self) -> Result<&dyn DataSource, Error> {
        self.source.as_deref().ok_or_else(|| {
            Error::new(ErrorKind::Usage)
                .with_message("no data source configured")
                .with_hint("Pass --source with a service URL or a directory of CSV files.")
        })
    }

    pub fn download(&mut self) -> Result<(), Error> {
        self.source()?.download()
    }

    /// Ingests every declared file from `csv_folder`, or the configured folder.
    pub fn ingest_all(&mut self, csv_folder: Option<&Path>) -> Result<IngestReport, Error> {
        let folder = csv_folder.unwrap_or(self.csv_folder.as_path()).to_path_buf();
        let report = self.store.ingest_all(&folder, &self.table)?;
        self.store.flush()?;
        Ok(report)
    }

    /// Downloads first; ingestion starts only after the download has completed.
    pub fn download_and_ingest(&mut self) -> Result<IngestReport, Error> {
        self.download()?;
        self.ingest_all(None)
    }

    pub fn find_model_collection<M: Model>(&mut self) -> Result<&mut Collection, Error> {
        let name = self
            .table
            .find_model::<M>()
            .map(|declared| declared.name().to_string())
            .ok_or_else(|| {
                Error::new(ErrorKind::NotFound)
                    .with_message(format!("no declared file stores {}", M::NAME))
            })?;
        self.store.collection(&name)
    }

    /// Every stored `M`, cluster by cluster in registration order.
    pub fn list_all<M: Model>(&mut self) -> Result<ListAll<M>, Error> {
        let collection = self.find_model_collection::<M>()?;
        let clusters: Vec<Cluster> = collection.clusters().iter().cloned().collect();
        Ok(ListAll {
            clusters: clusters.into_iter(),
            pending: Vec::new().into_iter(),
            done: false,
        })
    }

    /// Every stored `M` of one named cluster, in file order.
    pub fn list_cluster<M: Model>(&mut self, cluster: &str) -> Result<Vec<M>, Error> {
        let cluster = self.find_model_collection::<M>()?.cluster(cluster)?.clone();
        decode_cluster(&cluster)
    }

    pub fn get<M: Model>(&mut self, key: &str, cluster: Option<&str>) -> Result<Option<M>, Error> {
        for cluster in self.read_clusters::<M>(cluster)? {
            let data = cluster.load_all()?;
            if let Some(record) = data.get(key) {
                return decode(record, &cluster).map(Some);
            }
        }
        Ok(None)
    }

    /// Records whose key `k` satisfies `key_start <= k <= key_end` as plain strings.
    ///
    /// Keys are never parsed: date keys must be zero-padded ISO dates for text
    /// order to match calendar order.
    pub fn filter<M: Model>(
        &mut self,
        key_start: &str,
        key_end: &str,
        cluster: Option<&str>,
    ) -> Result<std::vec::IntoIter<M>, Error> {
        let mut found = Vec::new();
        for cluster in self.read_clusters::<M>(cluster)? {
            let data = cluster.load_all()?;
            for entry in data.range(key_start, key_end) {
                found.push(decode(&entry.record, &cluster)?);
            }
        }
        Ok(found.into_iter())
    }

    fn read_clusters<M: Model>(&mut self, cluster: Option<&str>) -> Result<Vec<Cluster>, Error> {
        let collection = self.find_model_collection::<M>()?;
        match cluster {
            Some(name) => Ok(vec![collection.cluster(name)?.clone()]),
            None => {
                let mut clusters = vec![collection.cluster(READ_FALLBACK_CLUSTER)?.clone()];
                if let Some(unique) = collection.clusters().lookup(WRITE_FALLBACK_CLUSTER) {
                    clusters.push(unique.clone());
                }
                Ok(clusters)
            }
        }
    }
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("store", &self.store)
            .field("table", &self.table)
            .field("csv_folder", &self.csv_folder)
            .field("source", &self.source.is_some())
            .finish()
    }
}

fn decode<M: Model>(record: &serde_json::Value, cluster: &Cluster) -> Result<M, Error> {
    M::from_record(record).map_err(|err| err.with_path(cluster.path()))
}

fn decode_cluster<M: Model>(cluster: &Cluster) -> Result<Vec<M>, Error> {
    let data = cluster.load_all()?;
    data.entries()
        .iter()
        .map(|entry| decode(&entry.record, cluster))
        .collect()
}

/// Lazy listing over a collection; each cluster is loaded and fully decoded
/// when the iterator reaches it. Stops after the first error.
pub struct ListAll<M: Model> {
    clusters: std::vec::IntoIter<Cluster>,
    pending: std::vec::IntoIter<M>,
    done: bool,
}

impl<M: Model> Iterator for ListAll<M> {
    type Item = Result<M, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.pending.next() {
                return Some(Ok(item));
            }
            if self.done {
                return None;
            }
            let Some(cluster) = self.clusters.next() else {
                self.done = true;
                return None;
            };
            match decode_cluster(&cluster) {
                Ok(items) => self.pending = items.into_iter(),
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
    }
}

impl<M: Model> FusedIterator for ListAll<M> {}

#[cfg(test)]
mod tests {
    use super::Catalog;
    use crate::core::error::{Error, ErrorKind};
    use crate::core::store::Store;
    use crate::models::{Currency, Market};
    use crate::remote::DataSource;
    use std::cell::RefCell;
    use std::path::PathBuf;
    use std::rc::Rc;
    use time::OffsetDateTime;

    struct ScriptedSource {
        csv_folder: PathBuf,
        log: Rc<RefCell<Vec<&'static str>>>,
    }

    impl DataSource for ScriptedSource {
        fn remote_timestamp(&self) -> Result<OffsetDateTime, Error> {
            Ok(OffsetDateTime::UNIX_EPOCH)
        }

        fn local_timestamp(&self) -> Result<Option<OffsetDateTime>, Error> {
            Ok(None)
        }

        fn download(&self) -> Result<(), Error> {
            self.log.borrow_mut().push("download");
            std::fs::create_dir_all(&self.csv_folder).expect("mkdir");
            for name in ["currency-holidays", "markets", "holidays", "schedules"] {
                let header = match name {
                    "currency-holidays" => "Currency Code,Date\n",
                    _ => "FinID\n",
                };
                std::fs::write(self.csv_folder.join(format!("{name}.csv")), header)
                    .expect("write");
            }
            std::fs::write(
                self.csv_folder.join("currencies.csv"),
                "Currency Code,Currency Name\nUSD,US Dollar\n",
            )
            .expect("write");
            self.log.borrow_mut().push("downloaded");
            Ok(())
        }
    }

    #[test]
    fn download_completes_before_ingest() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = Rc::new(RefCell::new(Vec::new()));
        let csv_folder = dir.path().join("remote").join("csv");
        let mut catalog = Catalog::new(Store::new(dir.path().join("store"))).with_source(
            Box::new(ScriptedSource {
                csv_folder: csv_folder.clone(),
                log: Rc::clone(&log),
            }),
        );
        assert_eq!(catalog.csv_folder(), csv_folder.as_path());

        let report = catalog.download_and_ingest().expect("download and ingest");
        assert_eq!(*log.borrow(), vec!["download", "downloaded"]);
        assert_eq!(report.records(), 1);
        let usd = catalog.get::<Currency>("USD", None).expect("get");
        assert_eq!(usd.map(|currency| currency.name), Some("US Dollar".to_string()));
    }

    #[test]
    fn download_without_source_is_usage_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut catalog = Catalog::new(Store::new(dir.path()));
        let err = catalog.download().expect_err("no source");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn undeclared_model_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut catalog = Catalog::new(Store::new(dir.path()))
            .with_table(std::sync::Arc::new(crate::declared::DescriptorTable::new()));
        let err = catalog.get::<Market>("US.NYSE", Some("us")).expect_err("undeclared");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(catalog.list_all::<Market>().is_err());
    }
}
