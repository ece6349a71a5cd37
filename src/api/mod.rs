//! Purpose: Define the public Rust API boundary for the calendar cache.
//! Exports: Storage hierarchy, catalog, descriptor table, models, data sources, errors.
//! Role: Stable surface for the CLI and for embedding applications.
//! Invariants: This module is the only public path to storage primitives.
//! Invariants: Internal modules remain private and are not directly exposed.

pub use crate::catalog::{Catalog, ListAll, READ_FALLBACK_CLUSTER};
pub use crate::config::{
    CatalogConfig, DEFAULT_SOURCE_URL, HOME_ENV, SOURCE_ENV, SourceSpec, TOKEN_ENV, default_home,
};
pub use crate::core::cluster::{CLUSTER_EXTENSION, Cluster, ClusterData, ClusterEntry};
pub use crate::core::collection::{ClusterFactory, ClusterRegistry, Collection};
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::registry::{Factory, Registry};
pub use crate::core::slug::slugify;
pub use crate::core::store::{
    CollectionFactory, CollectionRegistry, Store, StoreOptions, WRITE_FALLBACK_CLUSTER,
};
pub use crate::declared::{
    Declared, DeclaredFile, DescriptorTable, IngestOutcome, IngestReport, SourceFile,
};
pub use crate::models::{
    CsvRecords, Currency, CurrencyHoliday, FinId, Market, MarketHoliday, Model, Phase,
    PhaseGenerator, REGULAR_GROUP, Schedule, parse_date,
};
pub use crate::remote::{
    CSV_FOLDER, DataSource, DirectoryDataSource, HttpDataSource, LocalMirror, TIMESTAMP_FILE,
    format_timestamp, parse_timestamp,
};
