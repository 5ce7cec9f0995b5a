use std::{collections::HashMap, time::Duration};

use tokio::time::Instant;

use crate::domain::{ResultPage, ResultQuery};

#[derive(Debug, Clone)]
struct CacheEntry {
    page: ResultPage,
    fetched_at: Instant,
    invalidated: bool,
}

/// Response cache for result pages, keyed by query parameters.
///
/// Entries become stale after `stale_time` or after an explicit
/// [`invalidate_all`](ResultCache::invalidate_all). Stale pages are kept so
/// they can still be shown while a refetch is in flight.
#[derive(Debug)]
pub struct ResultCache {
    entries: HashMap<ResultQuery, CacheEntry>,
    stale_time: Duration,
    generation: u64,
}

impl ResultCache {
    pub fn new(stale_time: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            stale_time,
            generation: 0,
        }
    }

    pub fn get_fresh(&self, key: &ResultQuery, now: Instant) -> Option<&ResultPage> {
        self.entries
            .get(key)
            .filter(|entry| !entry.invalidated && now.duration_since(entry.fetched_at) < self.stale_time)
            .map(|entry| &entry.page)
    }

    pub fn get(&self, key: &ResultQuery) -> Option<&ResultPage> {
        self.entries.get(key).map(|entry| &entry.page)
    }

    pub fn is_stale(&self, key: &ResultQuery, now: Instant) -> bool {
        self.get_fresh(key, now).is_none()
    }

    /// Counter bumped by every [`invalidate_all`](ResultCache::invalidate_all).
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Stores a page read while the cache was at `generation`.
    ///
    /// A page whose read began before the latest invalidation is stored
    /// already stale.
    pub fn insert(&mut self, key: ResultQuery, page: ResultPage, now: Instant, generation: u64) {
        self.entries.insert(
            key,
            CacheEntry {
                page,
                fetched_at: now,
                invalidated: generation < self.generation,
            },
        );
    }

    /// Marks every cached page stale so the next read goes to the service.
    pub fn invalidate_all(&mut self) {
        self.generation += 1;
        for entry in self.entries.values_mut() {
            entry.invalidated = true;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::ClassificationResult;

    use super::*;

    fn page(count: usize) -> ResultPage {
        ResultPage {
            results: vec![ClassificationResult::default(); count],
            total: Some(count as u64),
        }
    }

    #[test]
    fn entries_go_stale_after_threshold() {
        let mut cache = ResultCache::new(Duration::from_secs(3));
        let key = ResultQuery::new(0, 10, None);
        let start = Instant::now();
        cache.insert(key.clone(), page(2), start, 0);

        assert!(cache.get_fresh(&key, start + Duration::from_secs(2)).is_some());
        assert!(cache.is_stale(&key, start + Duration::from_secs(3)));
        assert_eq!(cache.get(&key).map(|p| p.results.len()), Some(2));
    }

    #[test]
    fn keys_differ_by_category_and_window() {
        let mut cache = ResultCache::new(Duration::from_secs(3));
        let now = Instant::now();
        cache.insert(ResultQuery::new(0, 10, None), page(1), now, 0);
        cache.insert(ResultQuery::new(0, 10, Some("Job".into())), page(2), now, 0);
        cache.insert(ResultQuery::new(10, 10, None), page(3), now, 0);

        assert_eq!(cache.len(), 3);
        let job = cache.get(&ResultQuery::new(0, 10, Some("Job".into()))).unwrap();
        assert_eq!(job.results.len(), 2);
        assert!(cache.get(&ResultQuery::new(0, 5, None)).is_none());
    }

    #[test]
    fn invalidation_keeps_data_but_forces_refetch() {
        let mut cache = ResultCache::new(Duration::from_secs(60));
        let key = ResultQuery::new(0, 10, None);
        let now = Instant::now();
        cache.insert(key.clone(), page(4), now, 0);

        cache.invalidate_all();

        assert!(cache.get_fresh(&key, now).is_none());
        assert_eq!(cache.get(&key).map(|p| p.results.len()), Some(4));

        cache.insert(key.clone(), page(5), now, cache.generation());
        assert!(cache.get_fresh(&key, now).is_some());
    }

    #[test]
    fn read_started_before_invalidation_is_stored_stale() {
        let mut cache = ResultCache::new(Duration::from_secs(60));
        let key = ResultQuery::new(0, 10, None);
        let now = Instant::now();
        let started_at = cache.generation();

        cache.invalidate_all();
        cache.insert(key.clone(), page(3), now, started_at);

        assert!(cache.is_stale(&key, now));
        assert_eq!(cache.get(&key).map(|p| p.results.len()), Some(3));
    }
}
