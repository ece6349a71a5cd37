//! Purpose: Route parsed CSV records onto collections, clusters, and keys.
//! Exports: `SourceFile`, `DeclaredFile`, `Declared`, `DescriptorTable`, `IngestOutcome`,
//! `IngestReport`.
//! Role: Static ingestion rules consumed by `Store::ingest_all` and the catalog.
//! Invariants: The standard table is built once per process, in a fixed order.
//! Invariants: Descriptor names are non-empty, slug-safe, and unique within a table.
use std::any::TypeId;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use crate::core::error::{Error, ErrorKind};
use crate::core::slug::slugify;
use crate::core::store::Store;
use crate::models::{
    CsvRecords, Currency, CurrencyHoliday, Market, MarketHoliday, Model, Schedule,
};

/// One CSV source of a model: `<root>/<name with '_' as '-'>.csv`.
#[derive(Clone, Debug)]
pub struct SourceFile<M: Model> {
    root: PathBuf,
    name: String,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> SourceFile<M> {
    pub fn new(root: impl Into<PathBuf>, name: &str) -> Result<Self, Error> {
        if name.trim().is_empty() {
            return Err(Error::new(ErrorKind::Usage).with_message("source name is empty"));
        }
        Ok(Self {
            root: root.into(),
            name: name.to_string(),
            _model: PhantomData,
        })
    }

    pub fn name(&self) -> String {
        self.name.replace('-', "_")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn filename(&self) -> String {
        source_filename(&self.name)
    }

    pub fn path(&self) -> PathBuf {
        self.root.join(self.filename())
    }

    /// Starts a fresh read of the file; each call parses it from the top.
    pub fn load(&self) -> Result<CsvRecords<M>, Error> {
        M::from_csv(&self.path())
    }
}

pub(crate) fn source_filename(name: &str) -> String {
    format!("{}.csv", name.replace('_', "-"))
}

type Resolver<M> = fn(&M) -> Option<String>;
type PreIngest = fn(&str, &mut Store) -> Result<(), Error>;

/// Routing rule binding one model to one source file.
pub struct DeclaredFile<M: Model> {
    name: &'static str,
    collection: Option<fn(&M) -> String>,
    cluster: Resolver<M>,
    key: Resolver<M>,
    pre_ingest: PreIngest,
}

impl<M: Model> DeclaredFile<M> {
    /// A descriptor writing into the collection `name`, with no cluster and no key.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            collection: None,
            cluster: |_| None,
            key: |_| None,
            pre_ingest: |_, _| Ok(()),
        }
    }

    pub fn collection(mut self, resolve: fn(&M) -> String) -> Self {
        self.collection = Some(resolve);
        self
    }

    pub fn cluster(mut self, resolve: Resolver<M>) -> Self {
        self.cluster = resolve;
        self
    }

    pub fn key(mut self, resolve: Resolver<M>) -> Self {
        self.key = resolve;
        self
    }

    pub fn pre_ingest(mut self, hook: PreIngest) -> Self {
        self.pre_ingest = hook;
        self
    }

    /// Empties the target collection before every ingest.
    pub fn replace_on_ingest(self) -> Self {
        self.pre_ingest(|name, store| store.clear_collection(name))
    }

    pub fn resolve_collection(&self, item: &M) -> String {
        match self.collection {
            Some(resolve) => resolve(item),
            None => self.name.to_string(),
        }
    }

    pub fn resolve_cluster(&self, item: &M) -> Option<String> {
        (self.cluster)(item)
    }

    pub fn resolve_key(&self, item: &M) -> Option<String> {
        (self.key)(item)
    }

    pub fn source(&self, root: &Path) -> Result<SourceFile<M>, Error> {
        SourceFile::new(root, self.name)
    }
}

/// Type-erased view of a `DeclaredFile` so descriptors of every model share one table.
pub trait Declared: Send + Sync {
    fn name(&self) -> &str;
    fn model_type(&self) -> TypeId;
    fn model_name(&self) -> &'static str;
    fn filename(&self) -> String;
    fn ingest(&self, csv_root: &Path, store: &mut Store) -> Result<IngestOutcome, Error>;
}

impl<M: Model> Declared for DeclaredFile<M> {
    fn name(&self) -> &str {
        self.name
    }

    fn model_type(&self) -> TypeId {
        TypeId::of::<M>()
    }

    fn model_name(&self) -> &'static str {
        M::NAME
    }

    fn filename(&self) -> String {
        source_filename(self.name)
    }

    fn ingest(&self, csv_root: &Path, store: &mut Store) -> Result<IngestOutcome, Error> {
        let started = Instant::now();
        // Open the source before the hook so a missing file never clears a collection.
        let rows = self.source(csv_root)?.load()?;
        (self.pre_ingest)(self.name, store)?;

        let mut records = 0u64;
        for item in rows {
            let item = item?;
            let collection = self.resolve_collection(&item);
            let cluster = self.resolve_cluster(&item);
            let key = self.resolve_key(&item);
            store.store_item(&item, &collection, cluster.as_deref(), key.as_deref())?;
            records += 1;
        }

        tracing::info!(
            file = self.name,
            model = M::NAME,
            records,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "ingested source file"
        );
        Ok(IngestOutcome {
            descriptor: self.name.to_string(),
            records,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IngestOutcome {
    pub descriptor: String,
    pub records: u64,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct IngestReport {
    pub outcomes: Vec<IngestOutcome>,
}

impl IngestReport {
    pub fn records(&self) -> u64 {
        self.outcomes.iter().map(|outcome| outcome.records).sum()
    }
}

/// Ordered set of descriptors, keyed by name.
#[derive(Default)]
pub struct DescriptorTable {
    files: Vec<Box<dyn Declared>>,
}

impl DescriptorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The five TradingHours sources, shared for the whole process.
    pub fn standard() -> Arc<DescriptorTable> {
        static STANDARD: OnceLock<Arc<DescriptorTable>> = OnceLock::new();
        Arc::clone(STANDARD.get_or_init(|| Arc::new(standard_files())))
    }

    pub fn register(&mut self, file: impl Declared + 'static) -> Result<(), Error> {
        self.register_boxed(Box::new(file))
    }

    fn register_boxed(&mut self, file: Box<dyn Declared>) -> Result<(), Error> {
        let name = file.name();
        if name.trim().is_empty() {
            return Err(Error::new(ErrorKind::Config)
                .with_message(format!("{} descriptor has no name", file.model_name())));
        }
        if slugify(name).is_err() {
            return Err(Error::new(ErrorKind::Config)
                .with_message(format!("descriptor name {name:?} is not usable as a collection")));
        }
        if self.get(name).is_some() {
            return Err(Error::new(ErrorKind::Config)
                .with_message(format!("descriptor {name:?} is already registered")));
        }
        self.files.push(file);
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Declared> {
        self.files.iter().map(|file| file.as_ref())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.iter().map(|file| file.name())
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&dyn Declared> {
        self.iter().find(|file| file.name() == name)
    }

    /// First descriptor whose model is `M`.
    pub fn find_model<M: Model>(&self) -> Option<&dyn Declared> {
        self.iter()
            .find(|file| file.model_type() == TypeId::of::<M>())
    }
}

impl std::fmt::Debug for DescriptorTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

fn standard_files() -> DescriptorTable {
    let files: Vec<Box<dyn Declared>> = vec![
        Box::new(DeclaredFile::<Currency>::new("currencies").key(|item| Some(item.code.clone()))),
        Box::new(
            DeclaredFile::<CurrencyHoliday>::new("currency_holidays")
                .cluster(|item| Some(item.currency_code.clone()))
                .key(|item| Some(item.date.clone())),
        ),
        Box::new(
            DeclaredFile::<Market>::new("markets")
                .cluster(|item| Some(item.fin_id.country().to_string()))
                .key(|item| Some(item.fin_id.to_string())),
        ),
        Box::new(
            DeclaredFile::<MarketHoliday>::new("holidays")
                .cluster(|item| Some(item.fin_id.to_string()))
                .key(|item| Some(item.date.clone())),
        ),
        Box::new(
            DeclaredFile::<Schedule>::new("schedules")
                .cluster(|item| Some(item.fin_id.to_string()))
                .replace_on_ingest(),
        ),
    ];
    let mut table = DescriptorTable::new();
    let mut rejected = Vec::new();
    for file in files {
        if let Err(err) = table.register_boxed(file) {
            tracing::error!(error = %err, "standard descriptor rejected");
            rejected.push(err.to_string());
        }
    }
    debug_assert!(rejected.is_empty(), "standard descriptors rejected: {rejected:?}");
    table
}
