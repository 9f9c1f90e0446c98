//! In-memory administrative boundary index.
//!
//! Built once from the boundary table at startup and never mutated
//! afterwards. Lookups are keyed by normalized name (see
//! [`crate::normalize`]) and by parent code for hierarchy queries.
//! [`SharedIndex`] allows a refreshed index to be swapped in atomically
//! while in-flight readers keep their snapshot.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use indiageo_region_models::{AdminLevel, AdministrativeRecord, RegionDescriptor};

use crate::RegionError;
use crate::normalize::normalize_name;

/// Options for [`AdministrativeIndex::search_with`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchOptions {
    /// Restrict hits to one hierarchy level.
    pub level: Option<AdminLevel>,
    /// Maximum number of hits to return (`None` = unlimited).
    pub limit: Option<usize>,
}

/// Read-only lookup table over administrative units.
#[derive(Debug, Default)]
pub struct AdministrativeIndex {
    records: Vec<AdministrativeRecord>,
    /// Normalized name of each record, parallel to `records`.
    keys: Vec<String>,
    by_code: BTreeMap<String, usize>,
    by_name: BTreeMap<String, Vec<usize>>,
    children: BTreeMap<String, Vec<usize>>,
}

impl AdministrativeIndex {
    /// Builds the index from a boundary table.
    ///
    /// Records with a blank name or a non-positive area are dropped with a
    /// warning. Parent codes that do not resolve to a loaded record are
    /// kept but logged, since hierarchy queries simply won't reach them.
    ///
    /// # Errors
    ///
    /// Returns [`RegionError::Index`] if two records share a code.
    pub fn build(records: Vec<AdministrativeRecord>) -> Result<Self, RegionError> {
        let mut index = Self::default();

        for record in records {
            let key = normalize_name(&record.name);
            if key.is_empty() || record.area_km2.is_nan() || record.area_km2 <= 0.0 {
                log::warn!(
                    "Dropping administrative record {} ('{}'): blank name or non-positive area",
                    record.code,
                    record.name
                );
                continue;
            }

            if index.by_code.contains_key(&record.code) {
                return Err(RegionError::Index {
                    message: format!("duplicate administrative code {}", record.code),
                });
            }

            let idx = index.records.len();
            index.by_code.insert(record.code.clone(), idx);
            index.by_name.entry(key.clone()).or_default().push(idx);
            if let Some(parent) = &record.parent_code {
                index.children.entry(parent.clone()).or_default().push(idx);
            }
            index.keys.push(key);
            index.records.push(record);
        }

        let orphans = index
            .records
            .iter()
            .filter(|r| {
                r.parent_code
                    .as_ref()
                    .is_some_and(|p| !index.by_code.contains_key(p))
            })
            .count();
        if orphans > 0 {
            log::warn!("{orphans} administrative records reference an unknown parent code");
        }

        // Stable, reproducible ordering inside each bucket.
        for bucket in index.by_name.values_mut() {
            bucket.sort_by(|a, b| index_order(&index.records, &index.by_code, *a, *b));
        }
        for bucket in index.children.values_mut() {
            bucket.sort_by(|a, b| {
                index.keys[*a]
                    .cmp(&index.keys[*b])
                    .then_with(|| index.records[*a].code.cmp(&index.records[*b].code))
            });
        }

        log::info!(
            "Built administrative index: {} records, {} distinct names",
            index.records.len(),
            index.by_name.len()
        );

        Ok(index)
    }

    /// Number of records in the index.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the index holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Looks up a record by its GAUL code.
    #[must_use]
    pub fn get(&self, code: &str) -> Option<&AdministrativeRecord> {
        self.by_code.get(code).map(|idx| &self.records[*idx])
    }

    /// Returns the enclosing unit of a record, if it is loaded.
    #[must_use]
    pub fn parent_of(&self, record: &AdministrativeRecord) -> Option<&AdministrativeRecord> {
        record.parent_code.as_deref().and_then(|code| self.get(code))
    }

    /// Returns the display name of a record's enclosing unit.
    #[must_use]
    pub fn parent_name(&self, record: &AdministrativeRecord) -> Option<&str> {
        self.parent_of(record).map(|p| p.name.as_str())
    }

    /// All records whose normalized name equals the normalized `name`,
    /// ordered by parent name then code. May span several parents.
    #[must_use]
    pub fn by_exact_name(&self, name: &str) -> Vec<&AdministrativeRecord> {
        self.by_name
            .get(&normalize_name(name))
            .map(|bucket| bucket.iter().map(|idx| &self.records[*idx]).collect())
            .unwrap_or_default()
    }

    /// All records named `name` whose parent is named `parent_name`.
    ///
    /// Usually zero or one record; GAUL occasionally splits one district
    /// into several features under the same state.
    #[must_use]
    pub fn named_under(&self, name: &str, parent_name: &str) -> Vec<&AdministrativeRecord> {
        let parent_key = normalize_name(parent_name);
        self.by_exact_name(name)
            .into_iter()
            .filter(|record| {
                self.parent_name(record)
                    .is_some_and(|p| normalize_name(p) == parent_key)
            })
            .collect()
    }

    /// Disambiguated lookup: the record named `name` under the parent
    /// named `parent_name`, or `None` if there is no such record.
    #[must_use]
    pub fn by_name_and_parent(
        &self,
        name: &str,
        parent_name: &str,
    ) -> Option<&AdministrativeRecord> {
        self.named_under(name, parent_name).into_iter().next()
    }

    /// All direct children of every unit named `parent_name` (e.g. the
    /// districts of a state), ordered by name.
    #[must_use]
    pub fn children_of(&self, parent_name: &str) -> Vec<&AdministrativeRecord> {
        self.by_exact_name(parent_name)
            .into_iter()
            .filter_map(|parent| self.children.get(&parent.code))
            .flatten()
            .map(|idx| &self.records[*idx])
            .collect()
    }

    /// Case-insensitive substring search over every record, ranked.
    #[must_use]
    pub fn search(&self, substring: &str) -> Vec<&AdministrativeRecord> {
        self.search_with(substring, SearchOptions::default())
    }

    /// Case-insensitive substring search with a level filter and limit.
    ///
    /// Ranking is a deterministic total order:
    /// 1. exact name matches, then prefix matches, then other matches
    /// 2. earliest match offset (in characters)
    /// 3. name, alphabetically
    /// 4. parent name, alphabetically
    /// 5. code
    #[must_use]
    pub fn search_with(&self, substring: &str, options: SearchOptions) -> Vec<&AdministrativeRecord> {
        let query = normalize_name(substring);
        if query.is_empty() {
            return Vec::new();
        }

        let mut hits: Vec<(MatchRank, usize)> = self
            .keys
            .iter()
            .enumerate()
            .filter(|(idx, _)| options.level.is_none_or(|l| self.records[*idx].level == l))
            .filter_map(|(idx, key)| {
                let byte_offset = key.find(&query)?;
                let tier = if key.len() == query.len() {
                    0
                } else if byte_offset == 0 {
                    1
                } else {
                    2
                };
                Some((
                    MatchRank {
                        tier,
                        offset: key[..byte_offset].chars().count(),
                    },
                    idx,
                ))
            })
            .collect();

        hits.sort_by(|(rank_a, a), (rank_b, b)| {
            rank_a
                .cmp(rank_b)
                .then_with(|| self.keys[*a].cmp(&self.keys[*b]))
                .then_with(|| self.parent_key(*a).cmp(&self.parent_key(*b)))
                .then_with(|| self.records[*a].code.cmp(&self.records[*b].code))
        });

        hits.into_iter()
            .take(options.limit.unwrap_or(usize::MAX))
            .map(|(_, idx)| &self.records[idx])
            .collect()
    }

    /// A descriptor that resolves to `record`'s name group: bare when the
    /// name is unique across parents, qualified by the parent name when
    /// it is not.
    #[must_use]
    pub fn descriptor_for(&self, record: &AdministrativeRecord) -> RegionDescriptor {
        let namesakes = self.by_exact_name(&record.name);
        let shared = namesakes
            .iter()
            .any(|other| other.parent_code != record.parent_code);
        match self.parent_name(record) {
            Some(parent) if shared => RegionDescriptor::administrative_in(&record.name, parent),
            _ => RegionDescriptor::administrative(&record.name),
        }
    }

    fn parent_key(&self, idx: usize) -> Option<&str> {
        self.records[idx]
            .parent_code
            .as_ref()
            .and_then(|code| self.by_code.get(code))
            .map(|parent| self.keys[*parent].as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct MatchRank {
    tier: u8,
    offset: usize,
}

/// Orders two records by parent name (normalized), then code.
fn index_order(
    records: &[AdministrativeRecord],
    by_code: &BTreeMap<String, usize>,
    a: usize,
    b: usize,
) -> Ordering {
    let parent = |idx: usize| {
        records[idx]
            .parent_code
            .as_ref()
            .and_then(|code| by_code.get(code))
            .map(|p| normalize_name(&records[*p].name))
    };
    parent(a)
        .cmp(&parent(b))
        .then_with(|| records[a].code.cmp(&records[b].code))
}

/// Atomically replaceable handle to the current index.
///
/// Readers take an [`Arc`] snapshot and keep using it for the whole
/// request; [`Self::replace`] swaps the reference and never touches the
/// old index in place.
#[derive(Debug)]
pub struct SharedIndex {
    current: RwLock<Arc<AdministrativeIndex>>,
}

impl SharedIndex {
    /// Wraps an initial index.
    #[must_use]
    pub fn new(index: AdministrativeIndex) -> Self {
        Self {
            current: RwLock::new(Arc::new(index)),
        }
    }

    /// Returns the current index.
    #[must_use]
    pub fn snapshot(&self) -> Arc<AdministrativeIndex> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Swaps in a freshly built index, returning the previous one.
    pub fn replace(&self, index: AdministrativeIndex) -> Arc<AdministrativeIndex> {
        let next = Arc::new(index);
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        log::info!(
            "Replacing administrative index ({} -> {} records)",
            guard.len(),
            next.len()
        );
        std::mem::replace(&mut *guard, next)
    }
}
