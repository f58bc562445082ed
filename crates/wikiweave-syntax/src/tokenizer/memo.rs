//! Bounded memoization of rule results.
//!
//! Wikitext is ambiguous enough that the grammar backtracks: an unclosed
//! `{{` is first tried as a template, then as literal text, and every nested
//! `{{` inside it gets the same treatment. Without a cache, a line of
//! unclosed braces costs exponential time.
//!
//! Results are keyed by `(position, limit, rule)`. A key is only stored once
//! it has been visited `visit_threshold` times, so ordinary documents (where
//! almost every rule runs once per position) do not pay for the cache. The
//! cache holds at most `max_entries` results and evicts the oldest first.
//!
//! Two facts about the source are kept outside that bound, because without
//! them runs of unclosed openers cost quadratic time: scan positions from
//! which content runs out before its closing syntax (dead ends), and where
//! the last `>` is.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::token::Token;

use super::grammar::Stops;
use super::{NoMatch, Rule};

/// Memoization knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoConfig {
    /// Maximum number of cached rule results. `0` disables caching.
    pub max_entries: usize,
    /// Number of visits to a key before its result is cached.
    pub visit_threshold: u32,
}

impl Default for MemoConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            visit_threshold: 2,
        }
    }
}

/// Cache counters, reset with the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoStats {
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
    pub evictions: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct MemoKey {
    pub pos: usize,
    pub limit: usize,
    pub rule: Rule,
}

pub(crate) type Memo = Result<(usize, Vec<Token>), NoMatch>;

/// One step of a scan for closing syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ScanKey {
    pub pos: usize,
    pub limit: usize,
    pub stops: Stops,
    pub table_depth: usize,
}

#[derive(Debug)]
pub(crate) struct MemoCache {
    config: MemoConfig,
    entries: HashMap<MemoKey, Memo>,
    order: VecDeque<MemoKey>,
    visits: HashMap<MemoKey, u32>,
    dead_ends: HashSet<ScanKey>,
    last_tag_end: Option<Option<usize>>,
    stats: MemoStats,
}

impl MemoCache {
    pub fn new(config: MemoConfig) -> Self {
        Self {
            config,
            entries: HashMap::new(),
            order: VecDeque::new(),
            visits: HashMap::new(),
            dead_ends: HashSet::new(),
            last_tag_end: None,
            stats: MemoStats::default(),
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.visits.clear();
        self.dead_ends.clear();
        self.last_tag_end = None;
        self.stats = MemoStats::default();
    }

    pub fn stats(&self) -> MemoStats {
        self.stats
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_dead_end(&self, key: &ScanKey) -> bool {
        self.dead_ends.contains(key)
    }

    pub fn mark_dead_ends(&mut self, keys: impl IntoIterator<Item = ScanKey>) {
        self.dead_ends.extend(keys);
    }

    /// Byte position of the last `>` in `src`. Computed once per call, so
    /// `src` must be the source the cache was cleared for.
    pub fn last_tag_end(&mut self, src: &str) -> Option<usize> {
        *self.last_tag_end.get_or_insert_with(|| src.rfind('>'))
    }

    pub fn lookup(&mut self, key: &MemoKey) -> Option<Memo> {
        match self.entries.get(key) {
            Some(memo) => {
                self.stats.hits += 1;
                Some(memo.clone())
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    pub fn record(&mut self, key: MemoKey, memo: Memo) {
        if self.config.max_entries == 0 {
            return;
        }

        // The visit map only needs to remember recent positions.
        if self.visits.len() > self.config.max_entries.saturating_mul(4) {
            self.visits.clear();
        }
        let visits = self.visits.entry(key).or_insert(0);
        *visits += 1;
        if *visits < self.config.visit_threshold {
            return;
        }

        while self.entries.len() >= self.config.max_entries {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if self.entries.remove(&oldest).is_some() {
                self.stats.evictions += 1;
            }
        }

        if self.entries.insert(key, memo).is_none() {
            self.order.push_back(key);
        }
        self.stats.stores += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn key(pos: usize) -> MemoKey {
        MemoKey {
            pos,
            limit: 100,
            rule: Rule::TemplateOrArg,
        }
    }

    fn no_match(pos: usize) -> Memo {
        Err(NoMatch {
            rule: Rule::TemplateOrArg,
            pos,
        })
    }

    #[test]
    fn first_visit_is_not_cached() {
        let mut cache = MemoCache::new(MemoConfig::default());
        cache.record(key(1), no_match(1));
        assert!(cache.lookup(&key(1)).is_none());

        cache.record(key(1), no_match(1));
        assert_eq!(cache.lookup(&key(1)), Some(no_match(1)));
    }

    #[test]
    fn oldest_entries_are_evicted_first() {
        let mut cache = MemoCache::new(MemoConfig {
            max_entries: 2,
            visit_threshold: 1,
        });
        for pos in 0..3 {
            cache.record(key(pos), no_match(pos));
        }

        assert_eq!(cache.len(), 2);
        assert!(cache.lookup(&key(0)).is_none());
        assert!(cache.lookup(&key(2)).is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn dead_ends_are_kept_until_cleared() {
        let mut cache = MemoCache::new(MemoConfig::default());
        let scan = ScanKey {
            pos: 4,
            limit: 10,
            stops: Stops::template(),
            table_depth: 0,
        };
        cache.mark_dead_ends([scan]);
        assert!(cache.is_dead_end(&scan));
        assert!(!cache.is_dead_end(&ScanKey {
            stops: Stops::tplarg(),
            ..scan
        }));

        cache.clear();
        assert!(!cache.is_dead_end(&scan));
    }

    #[test]
    fn last_tag_end_is_computed_once() {
        let mut cache = MemoCache::new(MemoConfig::default());
        assert_eq!(cache.last_tag_end("<a> b"), Some(2));
        assert_eq!(cache.last_tag_end("ignored>"), Some(2));
        cache.clear();
        assert_eq!(cache.last_tag_end("no tags"), None);
    }

    #[test]
    fn zero_capacity_disables_caching() {
        let mut cache = MemoCache::new(MemoConfig {
            max_entries: 0,
            visit_threshold: 1,
        });
        cache.record(key(0), no_match(0));
        assert_eq!(cache.len(), 0);
    }
}
