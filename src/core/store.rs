// Root of the storage hierarchy: a directory of collections.
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde_json::Value;

use crate::core::collection::Collection;
use crate::core::error::Error;
use crate::core::registry::{Factory, Registry};
use crate::declared::{DescriptorTable, IngestReport};
use crate::models::Model;

/// Cluster used by `store_item` when a record resolves to no cluster.
pub const WRITE_FALLBACK_CLUSTER: &str = "unique";

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct StoreOptions {
    pub cache: bool,
}

impl StoreOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }
}

#[derive(Clone, Debug)]
pub struct CollectionFactory {
    root: PathBuf,
    cache: bool,
}

impl Factory for CollectionFactory {
    type Output = Collection;

    fn create(&self, slug: &str) -> Result<Collection, Error> {
        let collection = Collection::open(slug, self.root.join(slug), self.cache)?;
        tracing::debug!(
            collection = slug,
            clusters = collection.clusters().len(),
            "opened collection"
        );
        Ok(collection)
    }
}

pub type CollectionRegistry = Registry<CollectionFactory>;

pub struct Store {
    root: PathBuf,
    collections: CollectionRegistry,
}

impl Store {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_options(root, StoreOptions::default())
    }

    pub fn with_options(root: impl Into<PathBuf>, options: StoreOptions) -> Self {
        let root = root.into();
        Self {
            collections: Registry::new(CollectionFactory {
                root: root.clone(),
                cache: options.cache,
            }),
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn collections(&self) -> &CollectionRegistry {
        &self.collections
    }

    /// Returns the collection for `name`, creating its directory on first use.
    pub fn collection(&mut self, name: &str) -> Result<&mut Collection, Error> {
        self.collections.get(name)
    }

    pub fn touch(&self) -> Result<(), Error> {
        fs::create_dir_all(&self.root).map_err(|err| Error::io(err, &self.root))
    }

    pub fn clear_collection(&mut self, name: &str) -> Result<(), Error> {
        self.collection(name)?.clear()
    }

    /// Appends `item` as a dictionary record to `collection`, in `cluster` or
    /// the `unique` fallback cluster.
    pub fn store_item<M: Model>(
        &mut self,
        item: &M,
        collection: &str,
        cluster: Option<&str>,
        key: Option<&str>,
    ) -> Result<(), Error> {
        let record = Value::Object(item.to_dict()?);
        self.store_record(&record, collection, cluster, key)
    }

    pub fn store_record(
        &mut self,
        record: &Value,
        collection: &str,
        cluster: Option<&str>,
        key: Option<&str>,
    ) -> Result<(), Error> {
        let cluster = cluster.unwrap_or(WRITE_FALLBACK_CLUSTER);
        self.collection(collection)?
            .cluster(cluster)?
            .append(key, record)
    }

    /// Runs every descriptor in `table` against CSV files under `data_folder`.
    ///
    /// The first failing descriptor aborts the run; records written by earlier
    /// descriptors stay on disk.
    pub fn ingest_all(
        &mut self,
        data_folder: &Path,
        table: &DescriptorTable,
    ) -> Result<IngestReport, Error> {
        self.touch()?;
        let started = Instant::now();
        let mut report = IngestReport::default();
        for declared in table.iter() {
            report.outcomes.push(declared.ingest(data_folder, self)?);
        }
        tracing::info!(
            files = report.outcomes.len(),
            records = report.records(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "ingest finished"
        );
        Ok(report)
    }

    /// Writes go straight to the cluster files, so there is nothing buffered.
    pub fn flush(&mut self) -> Result<(), Error> {
        tracing::trace!(root = %self.root.display(), "flush");
        Ok(())
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("root", &self.root)
            .field("collections", &self.collections.len())
            .finish()
    }
}
