//! Ordered-set helpers over `Vec<String>`.
//!
//! Lists in the data model are insertion-ordered sets: the first occurrence
//! wins and later duplicates are dropped. Entries are trimmed; empty entries
//! are never stored.

/// Push `item` unless an equal entry is already present. Returns whether it was added.
pub fn push_unique(list: &mut Vec<String>, item: impl AsRef<str>) -> bool {
    let item = item.as_ref().trim();
    if item.is_empty() || list.iter().any(|existing| existing == item) {
        return false;
    }
    list.push(item.to_string());
    true
}

/// Collect items into an ordered set, preserving first-seen order.
pub fn dedup_preserving_order<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = Vec::new();
    for item in items {
        push_unique(&mut out, item);
    }
    out
}
