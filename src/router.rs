//! Radix-tree request router.
//!
//! One [`matchit`] tree per HTTP method, O(path-length) lookup. Each leaf
//! points at a list of pipelines: registering the same method and path a
//! second time appends to the list, and lookups always return the first
//! entry, so a duplicate registration is accepted but never serves traffic.

use std::collections::HashMap;
use std::sync::Arc;

use matchit::Router as MatchitRouter;

use crate::error::ConfigError;
use crate::method::Method;
use crate::pipeline::Pipeline;

/// Whether a registration is the one that will serve the route.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Registration {
    Serving,
    Shadowed,
}

#[derive(Default)]
pub(crate) struct Router {
    trees: HashMap<Method, MatchitRouter<usize>>,
    index: HashMap<(Method, String), usize>,
    entries: Vec<Vec<Arc<Pipeline>>>,
}

impl Router {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(
        &mut self,
        method: Method,
        path: &str,
        pipeline: Arc<Pipeline>,
    ) -> Result<Registration, ConfigError> {
        if let Some(&slot) = self.index.get(&(method, path.to_owned())) {
            self.entries[slot].push(pipeline);
            return Ok(Registration::Shadowed);
        }

        let slot = self.entries.len();
        self.trees
            .entry(method)
            .or_default()
            .insert(path, slot)
            .map_err(|e| ConfigError::InvalidRoute { path: path.to_owned(), reason: e.to_string() })?;
        self.index.insert((method, path.to_owned()), slot);
        self.entries.push(vec![pipeline]);
        Ok(Registration::Serving)
    }

    pub(crate) fn lookup(
        &self,
        method: Method,
        path: &str,
    ) -> Option<(Arc<Pipeline>, HashMap<String, String>)> {
        let tree = self.trees.get(&method)?;
        let matched = tree.at(path).ok()?;
        let pipeline = Arc::clone(self.entries.get(*matched.value)?.first()?);
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((pipeline, params))
    }

    /// Number of registrations, shadowed ones included.
    pub(crate) fn len(&self) -> usize {
        self.entries.iter().map(Vec::len).sum()
    }
}
