use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::analyze::AnalysisReport;
use crate::stubs::StubRegistry;
use crate::transform::TransformOutput;
use crate::validate::ValidationIssue;

/// Everything a preview derives from its source before the session-specific
/// document is assembled.
#[derive(Debug, Clone)]
pub struct PipelineArtifacts {
    pub analysis: AnalysisReport,
    pub warnings: Vec<ValidationIssue>,
    pub transformed: TransformOutput,
    pub stubs: StubRegistry,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    code_hash: String,
    config_fingerprint: String,
    known_symbols: Vec<String>,
}

impl CacheKey {
    pub fn new(code_hash: &str, config_fingerprint: &str, known_symbols: &[String]) -> Self {
        let mut known_symbols = known_symbols.to_vec();
        known_symbols.sort();
        known_symbols.dedup();
        Self {
            code_hash: code_hash.to_string(),
            config_fingerprint: config_fingerprint.to_string(),
            known_symbols,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Content-keyed LRU of pipeline artifacts. Entries are immutable and
/// shared through `Arc`; a capacity of zero disables caching.
pub struct PipelineCache {
    entries: Option<Mutex<LruCache<CacheKey, Arc<PipelineArtifacts>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl PipelineCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: NonZeroUsize::new(capacity).map(|c| Mutex::new(LruCache::new(c))),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<PipelineArtifacts>> {
        let entries = self.entries.as_ref()?;
        match entries.lock().get(key) {
            Some(found) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(Arc::clone(found))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn insert(&self, key: CacheKey, artifacts: PipelineArtifacts) -> Arc<PipelineArtifacts> {
        let artifacts = Arc::new(artifacts);
        if let Some(entries) = &self.entries {
            entries.lock().put(key, Arc::clone(&artifacts));
        }
        artifacts
    }

    pub fn clear(&self) {
        if let Some(entries) = &self.entries {
            entries.lock().clear();
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.as_ref().map_or(0, |e| e.lock().len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::analyze_source;
    use crate::transform::transform;

    fn artifacts(code: &str) -> PipelineArtifacts {
        PipelineArtifacts {
            analysis: analyze_source(code),
            warnings: vec![],
            transformed: transform(code),
            stubs: StubRegistry::new(),
        }
    }

    #[test]
    fn test_known_symbol_order_does_not_matter() {
        let a = CacheKey::new("h", "f", &["B".into(), "A".into()]);
        let b = CacheKey::new("h", "f", &["A".into(), "B".into(), "A".into()]);
        assert_eq!(a, b);
        assert_ne!(a, CacheKey::new("h", "other", &["A".into(), "B".into()]));
    }

    #[test]
    fn test_lru_eviction_and_stats() {
        let cache = PipelineCache::new(1);
        let first = CacheKey::new("1", "f", &[]);
        let second = CacheKey::new("2", "f", &[]);

        cache.insert(first.clone(), artifacts("const A = () => <a/>;"));
        assert!(cache.get(&first).is_some());
        cache.insert(second.clone(), artifacts("const B = () => <b/>;"));
        assert!(cache.get(&first).is_none());
        assert!(cache.get(&second).is_some());

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_zero_capacity_disables() {
        let cache = PipelineCache::new(0);
        let key = CacheKey::new("1", "f", &[]);
        cache.insert(key.clone(), artifacts("const A = 1;"));
        assert!(cache.get(&key).is_none());
        assert_eq!(cache.stats(), CacheStats::default());
    }
}
