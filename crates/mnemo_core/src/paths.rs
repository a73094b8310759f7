//! Filesystem path reconstruction from MFT parent back-references.
//!
//! The parent graph must be assumed cyclic on corrupted volumes, so
//! resolution walks an arena of `(name, parent)` links with a per-traversal
//! visited set instead of following owning pointers.

use std::collections::{HashMap, HashSet};

use crate::types::well_known;

/// Immutable entry → full-path map built from one MFT pass. Build once,
/// then share read-only (typically behind an `Arc`).
#[derive(Debug, Default)]
pub struct PathCache {
    paths: HashMap<u64, String>,
}

impl PathCache {
    /// Resolves every linked entry. `links`: entry → (best filename, parent
    /// entry number).
    ///
    /// Rules: entry 5 is `\`; a parent of 5, a self-parent, a missing parent
    /// or a cycle all ground the path at `\name`; otherwise the parent path
    /// is prefixed.
    #[must_use]
    pub fn build(links: &HashMap<u64, (String, u64)>) -> PathCache {
        let mut cache = PathCache::default();
        for &entry in links.keys() {
            cache.resolve(entry, links);
        }
        cache
    }

    /// Full path for an entry; empty when unknown.
    #[must_use]
    pub fn get(&self, entry: u64) -> &str {
        self.paths.get(&entry).map(String::as_str).unwrap_or("")
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    fn resolve(&mut self, entry: u64, links: &HashMap<u64, (String, u64)>) {
        if self.paths.contains_key(&entry) {
            return;
        }

        // Collect the unresolved ancestor chain iteratively (corrupt volumes
        // can chain arbitrarily deep), then unwind it computing paths.
        let mut chain: Vec<u64> = Vec::new();
        let mut visited: HashSet<u64> = HashSet::new();
        let mut current = entry;
        let mut base: String = loop {
            if let Some(path) = self.paths.get(&current) {
                break path.clone();
            }
            if current == well_known::ROOT {
                self.paths.insert(current, "\\".to_string());
                break "\\".to_string();
            }
            let Some((_, parent)) = links.get(&current) else {
                break String::new();
            };
            if !visited.insert(current) {
                break String::new();
            }
            chain.push(current);
            if *parent == well_known::ROOT || *parent == current {
                break String::new();
            }
            current = *parent;
        };

        while let Some(e) = chain.pop() {
            let (name, parent) = &links[&e];
            let path = if *parent == well_known::ROOT || *parent == e || base.is_empty() {
                format!("\\{name}")
            } else {
                format!("{base}\\{name}")
            };
            self.paths.insert(e, path.clone());
            base = path;
        }
    }
}
