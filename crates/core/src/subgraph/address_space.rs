use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{Offset, Size};

/// Half-open byte range `[start, start + size)` in the original block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceRange {
    pub start: Offset,
    pub size: Size,
}

impl SourceRange {
    pub fn new(start: Offset, size: Size) -> Self {
        Self { start, size }
    }

    /// Exclusive end. Computed wide so `i32::MAX + size` cannot wrap.
    pub fn end(&self) -> i64 {
        i64::from(self.start) + i64::from(self.size)
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn contains(&self, offset: Offset) -> bool {
        let offset = i64::from(offset);
        offset >= i64::from(self.start) && offset < self.end()
    }

    pub fn intersects(&self, other: &SourceRange) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && i64::from(self.start) < other.end()
            && i64::from(other.start) < self.end()
    }
}

impl fmt::Display for SourceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end())
    }
}

/// Map of non-overlapping source ranges to items, keyed by range start.
///
/// Lookups are predecessor queries on a `BTreeMap`, so finding the range that
/// covers an offset is logarithmic in the number of ranges.
#[derive(Debug, Clone)]
pub struct AddressSpace<T> {
    ranges: BTreeMap<Offset, (SourceRange, T)>,
}

impl<T> Default for AddressSpace<T> {
    fn default() -> Self {
        Self { ranges: BTreeMap::new() }
    }
}

impl<T> AddressSpace<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Insert `item` at `range`. Returns false (and leaves the map untouched)
    /// when the range is empty or intersects an existing range.
    pub fn insert(&mut self, range: SourceRange, item: T) -> bool {
        if range.is_empty() || self.find_intersecting(&range).is_some() {
            return false;
        }
        self.ranges.insert(range.start, (range, item));
        true
    }

    /// The entry whose range contains `offset`.
    pub fn find_containing(&self, offset: Offset) -> Option<(&SourceRange, &T)> {
        let (_, (range, item)) = self.ranges.range(..=offset).next_back()?;
        range.contains(offset).then_some((range, item))
    }

    /// The first entry (by start) whose range intersects `range`.
    pub fn find_intersecting(&self, range: &SourceRange) -> Option<(&SourceRange, &T)> {
        if range.is_empty() {
            return None;
        }
        // Only the predecessor can straddle `range.start`; anything else that
        // intersects must start inside `range`.
        if let Some((_, (existing, item))) = self.ranges.range(..=range.start).next_back() {
            if existing.intersects(range) {
                return Some((existing, item));
            }
        }
        self.ranges
            .range(range.start..)
            .map(|(_, (existing, item))| (existing, item))
            .take_while(|(existing, _)| i64::from(existing.start) < range.end())
            .find(|(existing, _)| existing.intersects(range))
    }

    /// The entry starting exactly at `start`.
    pub fn get(&self, start: Offset) -> Option<(&SourceRange, &T)> {
        self.ranges.get(&start).map(|(range, item)| (range, item))
    }

    /// Entries in ascending start order.
    pub fn iter(&self) -> impl Iterator<Item = (&SourceRange, &T)> + '_ {
        self.ranges.values().map(|(range, item)| (range, item))
    }
}
