//! Dependency-aware batching of pending migrations
//!
//! Each migration script is scanned for the tables and indexes it touches. A
//! migration lands in the first batch after every earlier migration sharing one
//! of those resources, so migrations within a batch never touch the same table
//! and can run concurrently while batches run in order. A script whose resources
//! cannot be recognized runs alone, after everything before it and before
//! everything after it.

use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;

static TABLE_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)\b(?:TABLE|INTO|FROM|REFERENCES|RENAME\s+TO)\s+(?:IF\s+(?:NOT\s+)?EXISTS\s+)?([\w"`\[\]]+)"#,
    )
    .ok()
});

static INDEX_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bINDEX\s+(?:IF\s+(?:NOT\s+)?EXISTS\s+)?([\w"`\[\]]+)"#).ok()
});

static INDEX_TABLE_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"(?i)\bON\s+([\w"`\[\]]+)\s*\("#).ok());

/// Lower-cased, unquoted names of the tables and indexes a script touches
pub fn resources(sql: &str) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    for re in [&TABLE_RE, &INDEX_RE, &INDEX_TABLE_RE] {
        let Some(re) = re.as_ref() else {
            continue;
        };
        for caps in re.captures_iter(sql) {
            if let Some(name) = caps.get(1) {
                let name = name
                    .as_str()
                    .trim_matches(|c| matches!(c, '"' | '`' | '[' | ']'))
                    .to_lowercase();
                if !name.is_empty() {
                    out.insert(name);
                }
            }
        }
    }
    out
}

/// Group migrations (given in application order) into batches of indices.
///
/// Batches must run in order; the members of one batch have pairwise disjoint
/// resources.
pub fn plan_batches(scripts: &[BTreeSet<String>]) -> Vec<Vec<usize>> {
    let mut batches: Vec<Vec<usize>> = Vec::new();
    let mut last: HashMap<&str, usize> = HashMap::new();
    let mut floor = 0usize;

    for (i, touched) in scripts.iter().enumerate() {
        let level = if touched.is_empty() {
            batches.len()
        } else {
            touched
                .iter()
                .filter_map(|r| last.get(r.as_str()).map(|l| l + 1))
                .max()
                .unwrap_or(0)
                .max(floor)
        };

        if level == batches.len() {
            batches.push(Vec::new());
        }
        batches[level].push(i);

        if touched.is_empty() {
            floor = level + 1;
        } else {
            for r in touched {
                last.insert(r.as_str(), level);
            }
        }
    }
    batches
}

/// Resources of failed migrations; later migrations touching them are skipped
#[derive(Debug, Default)]
pub struct Poisoned {
    resources: BTreeSet<String>,
    everything: bool,
}

impl Poisoned {
    /// Mark a failed or skipped migration's resources
    pub fn poison(&mut self, touched: &BTreeSet<String>) {
        if touched.is_empty() {
            self.everything = true;
        }
        self.resources.extend(touched.iter().cloned());
    }

    /// Whether a migration touching `touched` must be skipped
    pub fn blocks(&self, touched: &BTreeSet<String>) -> bool {
        if self.everything {
            return true;
        }
        if touched.is_empty() {
            return !self.resources.is_empty();
        }
        touched.iter().any(|r| self.resources.contains(r))
    }
}
