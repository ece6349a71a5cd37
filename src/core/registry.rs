// Lazily populated keyed factory memoizing one resource per slug.
use std::collections::HashMap;

use crate::core::error::Error;
use crate::core::slug::slugify;

/// Builds the resource for a slug the registry has not seen yet.
pub trait Factory {
    type Output;

    fn create(&self, slug: &str) -> Result<Self::Output, Error>;
}

/// Memoizes at most one live resource per slug, in creation order.
///
/// Single-owner: `get` takes `&mut self`, so two callers can never race on the
/// creation of the same slug.
pub struct Registry<F: Factory> {
    factory: F,
    entries: Vec<(String, F::Output)>,
    index: HashMap<String, usize>,
}

impl<F: Factory> Registry<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Returns the resource for `name`, creating it through the factory on first use.
    pub fn get(&mut self, name: &str) -> Result<&mut F::Output, Error> {
        let slug = slugify(name)?;
        if let Some(&position) = self.index.get(&slug) {
            return Ok(&mut self.entries[position].1);
        }
        let resource = self.factory.create(&slug)?;
        Ok(self.insert(slug, resource))
    }

    /// Looks up an already created resource without creating one.
    pub fn lookup(&self, name: &str) -> Option<&F::Output> {
        let slug = slugify(name).ok()?;
        self.index
            .get(&slug)
            .map(|&position| &self.entries[position].1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &F::Output> {
        self.entries.iter().map(|(_, resource)| resource)
    }

    pub fn slugs(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(slug, _)| slug.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forgets every resource; the next `get` of any slug creates it afresh.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    pub(crate) fn insert(&mut self, slug: String, resource: F::Output) -> &mut F::Output {
        let position = self.entries.len();
        self.index.insert(slug.clone(), position);
        self.entries.push((slug, resource));
        &mut self.entries[position].1
    }
}
