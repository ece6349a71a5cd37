// Storage hierarchy: store -> collection -> cluster, plus errors and slugs.
pub mod cluster;
pub mod collection;
pub mod error;
pub mod registry;
pub mod slug;
pub mod store;
