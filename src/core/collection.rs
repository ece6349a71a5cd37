// A named directory of clusters holding one logical record type.
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::cluster::{CLUSTER_EXTENSION, Cluster};
use crate::core::error::Error;
use crate::core::registry::{Factory, Registry};
use crate::core::slug::slugify;

#[derive(Clone, Debug)]
pub struct ClusterFactory {
    folder: PathBuf,
    cache: bool,
}

impl ClusterFactory {
    pub fn new(folder: impl Into<PathBuf>, cache: bool) -> Self {
        Self {
            folder: folder.into(),
            cache,
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    fn cluster_at(&self, slug: &str) -> Cluster {
        let path = self.folder.join(format!("{slug}.{CLUSTER_EXTENSION}"));
        if self.cache {
            Cluster::with_cache(path)
        } else {
            Cluster::new(path)
        }
    }
}

impl Factory for ClusterFactory {
    type Output = Cluster;

    fn create(&self, slug: &str) -> Result<Cluster, Error> {
        let cluster = self.cluster_at(slug);
        cluster.touch()?;
        tracing::debug!(path = %cluster.path().display(), "created cluster");
        Ok(cluster)
    }
}

pub type ClusterRegistry = Registry<ClusterFactory>;

pub struct Collection {
    name: String,
    folder: PathBuf,
    cache: bool,
    clusters: ClusterRegistry,
}

impl Collection {
    /// Binds a collection to `folder` without touching the filesystem.
    pub fn new(name: impl Into<String>, folder: impl Into<PathBuf>, cache: bool) -> Self {
        let folder = folder.into();
        Self {
            name: name.into(),
            clusters: Registry::new(ClusterFactory::new(&folder, cache)),
            folder,
            cache,
        }
    }

    /// Creates the directory and registers the cluster files already in it, sorted
    /// by file name, so data written by earlier runs stays reachable.
    pub fn open(
        name: impl Into<String>,
        folder: impl Into<PathBuf>,
        cache: bool,
    ) -> Result<Self, Error> {
        let mut collection = Self::new(name, folder, cache);
        collection.touch()?;
        collection.discover()?;
        Ok(collection)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn clusters(&self) -> &ClusterRegistry {
        &self.clusters
    }

    pub fn clusters_mut(&mut self) -> &mut ClusterRegistry {
        &mut self.clusters
    }

    /// Returns the cluster for `name`, creating its file on first use.
    pub fn cluster(&mut self, name: &str) -> Result<&Cluster, Error> {
        self.clusters.get(name).map(|cluster| &*cluster)
    }

    pub fn touch(&self) -> Result<(), Error> {
        fs::create_dir_all(&self.folder).map_err(|err| Error::io(err, &self.folder))
    }

    /// Deletes every cluster file and forgets all clusters.
    pub fn clear(&mut self) -> Result<(), Error> {
        let mut removed = 0usize;
        for cluster in self.clusters.iter() {
            if !cluster.path().exists() {
                tracing::warn!(path = %cluster.path().display(), "cluster file already missing");
            }
            cluster.delete()?;
            removed += 1;
        }
        self.clusters = Registry::new(ClusterFactory::new(&self.folder, self.cache));
        tracing::debug!(collection = %self.name, removed, "cleared collection");
        Ok(())
    }

    fn discover(&mut self) -> Result<(), Error> {
        let entries = fs::read_dir(&self.folder).map_err(|err| Error::io(err, &self.folder))?;
        let mut slugs = Vec::new();
        for entry in entries {
            let path = entry.map_err(|err| Error::io(err, &self.folder))?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(CLUSTER_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            if slugify(stem).ok().as_deref() == Some(stem) {
                slugs.push(stem.to_string());
            }
        }
        slugs.sort();
        for slug in slugs {
            let cluster = self.clusters.factory().cluster_at(&slug);
            self.clusters.insert(slug, cluster);
        }
        Ok(())
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("folder", &self.folder)
            .field("clusters", &self.clusters.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::Collection;
    use serde_json::json;

    #[test]
    fn clusters_are_created_lazily_as_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let folder = dir.path().join("holidays");
        let mut collection = Collection::open("holidays", &folder, false).expect("open");
        assert!(folder.is_dir());
        assert!(collection.clusters().is_empty());

        let cluster = collection.cluster("US.NYSE").expect("cluster");
        assert_eq!(cluster.path(), folder.join("us-nyse.dat"));
        assert!(cluster.path().exists());
    }

    #[test]
    fn clear_removes_files_and_registry() {
        let dir = tempfile::tempdir().expect("tempdir");
        let folder = dir.path().join("schedules");
        let mut collection = Collection::open("schedules", &folder, false).expect("open");
        collection
            .cluster("US.NYSE")
            .expect("cluster")
            .append(None, &json!({ "phase": "open" }))
            .expect("append");
        collection.cluster("GB.LSE").expect("cluster");

        collection.clear().expect("clear");
        assert!(collection.clusters().is_empty());
        assert!(!folder.join("us-nyse.dat").exists());
        assert!(!folder.join("gb-lse.dat").exists());

        let fresh = collection.cluster("US.NYSE").expect("recreate");
        assert!(fresh.load_all().expect("load").is_empty());
    }

    #[test]
    fn reopening_discovers_existing_clusters() {
        let dir = tempfile::tempdir().expect("tempdir");
        let folder = dir.path().join("markets");
        {
            let mut collection = Collection::open("markets", &folder, false).expect("open");
            collection.cluster("us").expect("us");
            collection.cluster("gb").expect("gb");
        }
        std::fs::write(folder.join("notes.txt"), "ignored").expect("write");

        let reopened = Collection::open("markets", &folder, true).expect("reopen");
        let slugs: Vec<&str> = reopened.clusters().slugs().collect();
        assert_eq!(slugs, vec!["gb", "us"]);
    }
}
