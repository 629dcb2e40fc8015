//! Dependency version ordering
//!
//! Total order over version strings following conventional Maven-style
//! semantics: dot/dash separated segments, numeric segments compare
//! numerically and sort above textual ones, and a fixed family of
//! pre-release qualifiers (`alpha` < `beta` < `milestone` < `rc` <
//! `snapshot` < "" < `sp`) sorts below a plain release. Trailing "zero"
//! segments are insignificant, so `1.0`, `1.0.0` and `1.0-ga` are equal.

use std::cmp::Ordering;
use std::fmt;

/// A parsed version string with a defined total order
///
/// Holds the original string for display; comparison happens on the
/// parsed segment tree.
#[derive(Debug, Clone)]
pub struct ComparableVersion {
    raw: String,
    items: Vec<Item>,
}

/// Compare two version strings
pub fn compare(a: &str, b: &str) -> Ordering {
    ComparableVersion::new(a).cmp(&ComparableVersion::new(b))
}

impl ComparableVersion {
    pub fn new(version: &str) -> Self {
        Self {
            raw: version.to_string(),
            items: parse(version),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for ComparableVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl PartialEq for ComparableVersion {
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
    }
}

impl Eq for ComparableVersion {}

impl PartialOrd for ComparableVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ComparableVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_lists(&self.items, &other.items)
    }
}

/// One parsed version segment
///
/// Numbers are kept as normalized decimal strings (no leading zeros) so
/// arbitrarily large segments compare without overflow. A dash or a
/// digit/letter transition opens a nested list; shorter lists compare
/// as if padded with "lowest" entries.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Item {
    Number(String),
    Qualifier(String),
    List(Vec<Item>),
}

/// Rank of a textual segment; unknown qualifiers sort last, after `sp`,
/// and compare lexically among themselves.
fn qualifier_rank(q: &str) -> u8 {
    match q {
        "alpha" => 0,
        "beta" => 1,
        "milestone" => 2,
        "rc" => 3,
        "snapshot" => 4,
        "" => 5,
        "sp" => 6,
        _ => 7,
    }
}

const RELEASE_RANK: u8 = 5;

fn cmp_numbers(a: &str, b: &str) -> Ordering {
    // normalized: no leading zeros, so longer means larger
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn cmp_qualifiers(a: &str, b: &str) -> Ordering {
    qualifier_rank(a)
        .cmp(&qualifier_rank(b))
        .then_with(|| a.cmp(b))
}

impl Item {
    /// Compare against an implicit "lowest" padding entry
    fn cmp_null(&self) -> Ordering {
        match self {
            Item::Number(n) => {
                if n == "0" {
                    Ordering::Equal
                } else {
                    Ordering::Greater
                }
            }
            Item::Qualifier(q) => qualifier_rank(q).cmp(&RELEASE_RANK).then_with(|| q.cmp(&String::new())),
            Item::List(items) => {
                for item in items {
                    let result = item.cmp_null();
                    if result != Ordering::Equal {
                        return result;
                    }
                }
                Ordering::Equal
            }
        }
    }

    /// Insignificant when it compares equal to padding; such trailing
    /// entries are trimmed during parsing.
    fn is_null(&self) -> bool {
        match self {
            Item::Number(n) => n == "0",
            Item::Qualifier(q) => qualifier_rank(q) == RELEASE_RANK && q.is_empty(),
            Item::List(items) => items.is_empty(),
        }
    }

    fn cmp_item(&self, other: &Item) -> Ordering {
        match (self, other) {
            (Item::Number(a), Item::Number(b)) => cmp_numbers(a, b),
            // numbers sort above everything else at the same position
            (Item::Number(_), _) => Ordering::Greater,
            (_, Item::Number(_)) => Ordering::Less,
            (Item::Qualifier(a), Item::Qualifier(b)) => cmp_qualifiers(a, b),
            // a sub-list (e.g. `-1` in `1.0-1`) sorts above a qualifier
            (Item::Qualifier(_), Item::List(_)) => Ordering::Less,
            (Item::List(_), Item::Qualifier(_)) => Ordering::Greater,
            (Item::List(a), Item::List(b)) => cmp_lists(a, b),
        }
    }
}

fn cmp_lists(a: &[Item], b: &[Item]) -> Ordering {
    let len = a.len().max(b.len());
    for i in 0..len {
        let result = match (a.get(i), b.get(i)) {
            (Some(l), Some(r)) => l.cmp_item(r),
            (Some(l), None) => l.cmp_null(),
            (None, Some(r)) => r.cmp_null().reverse(),
            (None, None) => Ordering::Equal,
        };
        if result != Ordering::Equal {
            return result;
        }
    }
    Ordering::Equal
}

/// Normalize a textual segment: well-known aliases collapse to their
/// canonical qualifier, and the single letters a/b/m expand when
/// directly followed by a digit (`1.0a1` reads as `1.0-alpha-1`).
fn normalize_qualifier(raw: &str, followed_by_digit: bool) -> String {
    if followed_by_digit && raw.len() == 1 {
        match raw {
            "a" => return "alpha".to_string(),
            "b" => return "beta".to_string(),
            "m" => return "milestone".to_string(),
            _ => {}
        }
    }
    match raw {
        "ga" | "final" | "release" => String::new(),
        "cr" => "rc".to_string(),
        other => other.to_string(),
    }
}

fn number_item(raw: &str) -> Item {
    let trimmed = raw.trim_start_matches('0');
    Item::Number(if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    })
}

/// Drop trailing insignificant entries; stop at the first significant
/// non-list entry so embedded zeros (`1.0.1`) survive.
fn trim_nulls(items: &mut Vec<Item>) {
    let mut i = items.len();
    while i > 0 {
        i -= 1;
        if items[i].is_null() {
            items.remove(i);
        } else if !matches!(items[i], Item::List(_)) {
            break;
        }
    }
}

fn parse(version: &str) -> Vec<Item> {
    let lower = version.to_ascii_lowercase();
    let bytes = lower.as_bytes();

    // stack of open lists; dashes and digit/letter transitions nest
    let mut stack: Vec<Vec<Item>> = vec![Vec::new()];
    let mut start = 0usize;
    let mut in_digits = false;

    let flush = |stack: &mut Vec<Vec<Item>>, segment: &str, digits: bool, followed_by_digit: bool| {
        let top = stack.last_mut().expect("parser stack never empty");
        if segment.is_empty() {
            top.push(Item::Number("0".to_string()));
        } else if digits {
            top.push(number_item(segment));
        } else {
            top.push(Item::Qualifier(normalize_qualifier(segment, followed_by_digit)));
        }
    };

    for (i, &c) in bytes.iter().enumerate() {
        match c {
            b'.' => {
                flush(&mut stack, &lower[start..i], in_digits, false);
                start = i + 1;
            }
            b'-' => {
                flush(&mut stack, &lower[start..i], in_digits, false);
                start = i + 1;
                stack.push(Vec::new());
            }
            c if c.is_ascii_digit() => {
                if !in_digits && i > start {
                    flush(&mut stack, &lower[start..i], false, true);
                    start = i;
                    stack.push(Vec::new());
                }
                in_digits = true;
            }
            _ => {
                if in_digits && i > start {
                    flush(&mut stack, &lower[start..i], true, false);
                    start = i;
                    stack.push(Vec::new());
                }
                in_digits = false;
            }
        }
    }
    if lower.len() > start {
        flush(&mut stack, &lower[start..], in_digits, false);
    }

    while stack.len() > 1 {
        let mut child = stack.pop().expect("parser stack never empty");
        trim_nulls(&mut child);
        stack
            .last_mut()
            .expect("parser stack never empty")
            .push(Item::List(child));
    }
    let mut root = stack.pop().expect("parser stack never empty");
    trim_nulls(&mut root);
    root
}
