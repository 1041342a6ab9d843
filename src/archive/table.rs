//! Sorted entry table shared by the archive drivers.
//!
//! Names use `/` as separator. Directories that only exist because some
//! entry lives below them ("implicit" directories) are derived from the
//! sorted order instead of being stored.

use std::cmp::Ordering;
use std::collections::HashSet;

/// An entry that can live in an [`EntryTable`]
pub trait TableEntry {
    fn name(&self) -> &str;

    /// Explicit directory record (ZIP `name/` entries)
    fn is_dir(&self) -> bool {
        false
    }
}

/// Immutable, sorted table of archive entries
#[derive(Debug)]
pub struct EntryTable<E> {
    entries: Vec<E>,
    case_insensitive: bool,
}

fn compare(a: &str, b: &str, case_insensitive: bool) -> Ordering {
    if case_insensitive {
        let a = a.bytes().map(|c| c.to_ascii_lowercase());
        let b = b.bytes().map(|c| c.to_ascii_lowercase());
        a.cmp(b)
    } else {
        a.as_bytes().cmp(b.as_bytes())
    }
}

fn has_prefix(name: &str, prefix: &str, case_insensitive: bool) -> bool {
    if case_insensitive {
        name.len() >= prefix.len()
            && name.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
    } else {
        name.starts_with(prefix)
    }
}

impl<E: TableEntry> EntryTable<E> {
    /// Sort `entries` and build the table
    pub fn new(mut entries: Vec<E>, case_insensitive: bool) -> Self {
        entries.sort_by(|a, b| compare(a.name(), b.name(), case_insensitive));
        Self {
            entries,
            case_insensitive,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> &E {
        &self.entries[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &E> {
        self.entries.iter()
    }

    /// Binary search for an exact name
    pub fn find_index(&self, name: &str) -> Option<usize> {
        self.entries
            .binary_search_by(|e| compare(e.name(), name, self.case_insensitive))
            .ok()
    }

    pub fn find(&self, name: &str) -> Option<&E> {
        self.find_index(name).map(|i| &self.entries[i])
    }

    /// Index of the first entry whose name starts with `prefix`
    fn lower_bound(&self, prefix: &str) -> usize {
        self.entries
            .partition_point(|e| compare(e.name(), prefix, self.case_insensitive) == Ordering::Less)
    }

    /// True when some entry lives below `name`
    pub fn is_implicit_dir(&self, name: &str) -> bool {
        if name.is_empty() {
            return true;
        }
        let prefix = format!("{}/", name);
        let start = self.lower_bound(&prefix);
        self.entries
            .get(start)
            .is_some_and(|e| has_prefix(e.name(), &prefix, self.case_insensitive))
    }

    /// Explicit entry or implicit directory
    pub fn contains(&self, name: &str) -> bool {
        name.is_empty() || self.find_index(name).is_some() || self.is_implicit_dir(name)
    }

    /// Directory test for a name known to the table
    pub fn is_directory(&self, name: &str) -> Option<bool> {
        if name.is_empty() {
            return Some(true);
        }
        match self.find(name) {
            Some(entry) if !entry.is_dir() => Some(false),
            Some(_) => Some(true),
            None if self.is_implicit_dir(name) => Some(true),
            None => None,
        }
    }

    /// Visit each distinct child name of `dir`.
    ///
    /// Direct entries for which `omit` returns true are skipped. The visitor
    /// receives the index of the direct entry when the child has one.
    pub fn children(
        &self,
        dir: &str,
        omit: impl Fn(usize, &E) -> bool,
        mut visit: impl FnMut(&str, Option<usize>),
    ) {
        let prefix = if dir.is_empty() {
            String::new()
        } else {
            format!("{}/", dir)
        };
        let mut seen = HashSet::new();

        let start = self.lower_bound(&prefix);
        for (index, entry) in self.entries.iter().enumerate().skip(start) {
            let name = entry.name();
            if !has_prefix(name, &prefix, self.case_insensitive) {
                break;
            }
            let rest = &name[prefix.len()..];
            if rest.is_empty() {
                continue;
            }
            let (child, direct) = match rest.find('/') {
                Some(slash) => (&rest[..slash], None),
                None => (rest, Some(index)),
            };
            if direct.is_some() && omit(index, entry) {
                continue;
            }
            let key = if self.case_insensitive {
                child.to_ascii_lowercase()
            } else {
                child.to_string()
            };
            if seen.insert(key) {
                visit(child, direct);
            }
        }
    }
}
