use std::collections::HashMap;
use std::sync::Arc;

use crate::SourceMap;

/// Outcome of [`SourceMapCache::request`].
#[derive(Debug, Clone)]
pub enum CacheLookup {
    /// The map was loaded earlier.
    Loaded(Arc<SourceMap>),
    /// A load for this URL is already in flight; the waiter was queued on it.
    Joined,
    /// No load is in flight; the caller must start one and report back
    /// through [`SourceMapCache::complete`].
    Fetch,
}

/// Loaded source maps plus the loads still in flight, keyed by map URL.
///
/// `W` identifies whoever is waiting for a map (a script, in the debugger).
#[derive(Debug)]
pub struct SourceMapCache<W> {
    loaded: HashMap<String, Arc<SourceMap>>,
    pending: HashMap<String, Vec<W>>,
}

impl<W> Default for SourceMapCache<W> {
    fn default() -> Self {
        Self {
            loaded: HashMap::new(),
            pending: HashMap::new(),
        }
    }
}

impl<W> SourceMapCache<W> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&mut self, map_url: &str, waiter: W) -> CacheLookup {
        if let Some(map) = self.loaded.get(map_url) {
            return CacheLookup::Loaded(map.clone());
        }
        if let Some(waiters) = self.pending.get_mut(map_url) {
            waiters.push(waiter);
            return CacheLookup::Joined;
        }
        self.pending.insert(map_url.to_owned(), vec![waiter]);
        CacheLookup::Fetch
    }

    /// Settles the pending load for `map_url` and hands back every waiter.
    ///
    /// Successful loads are cached; failures are not, so a later request
    /// retries. A completion for a URL with no pending load (for example one
    /// started before [`reset`](Self::reset)) is dropped and yields no
    /// waiters.
    pub fn complete(
        &mut self,
        map_url: &str,
        map: Option<SourceMap>,
    ) -> (Option<Arc<SourceMap>>, Vec<W>) {
        let Some(waiters) = self.pending.remove(map_url) else {
            tracing::debug!(
                target: "spyglass.sourcemap",
                map_url,
                "dropping source map load that is no longer pending"
            );
            return (None, Vec::new());
        };

        let map = map.map(Arc::new);
        if let Some(map) = &map {
            self.loaded.insert(map_url.to_owned(), map.clone());
        }
        (map, waiters)
    }

    pub fn get(&self, map_url: &str) -> Option<Arc<SourceMap>> {
        self.loaded.get(map_url).cloned()
    }

    pub fn is_pending(&self, map_url: &str) -> bool {
        self.pending.contains_key(map_url)
    }

    pub fn reset(&mut self) {
        self.loaded.clear();
        self.pending.clear();
    }
}
