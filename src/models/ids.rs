//! Identifier arithmetic.
//!
//! Top-level ids are decimal sequence numbers rendered zero-padded
//! (`0007`). Child ids append a dotted sequence number to their parent
//! (`0007.2`, `0007.2.1`). Everything here is pure; the allocator in
//! `storage::allocator` wraps it with the re-read/verify discipline.

use std::cmp::Ordering;

use crate::{Error, Result};

/// Default zero padding for top-level ids.
pub const DEFAULT_WIDTH: usize = 4;

/// Validate that an id is a dotted sequence of decimal segments, each
/// fitting in a `u64`.
pub fn validate(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(Error::Validation("id must not be empty".to_string()));
    }
    for segment in id.split('.') {
        if segment.is_empty() || !segment.chars().all(|c| c.is_ascii_digit()) {
            return Err(Error::Validation(format!(
                "id must be dotted decimal segments, got: {}",
                id
            )));
        }
        if segment.parse::<u64>().is_err() {
            return Err(Error::Validation(format!(
                "id segment {} of {} is out of range",
                segment, id
            )));
        }
    }
    Ok(())
}

/// Numeric segments of an id. Segments that fail [`validate`] read as 0.
pub fn segments(id: &str) -> Vec<u64> {
    id.split('.').map(|s| s.parse().unwrap_or(0)).collect()
}

/// Natural ordering: `0002` < `0002.1` < `0002.10` < `0010`.
pub fn compare(a: &str, b: &str) -> Ordering {
    segments(a).cmp(&segments(b))
}

pub fn sort(ids: &mut [String]) {
    ids.sort_by(|a, b| compare(a, b));
}

/// Render a top-level sequence number.
pub fn format_top_level(n: u64, width: usize) -> String {
    format!("{:0width$}", n, width = width)
}

/// Next top-level id: numeric max over all top-level ids plus one.
///
/// Child ids count toward their top-level segment, so an orphaned
/// `0009.1` still reserves `0009`.
pub fn next_top_level<'a, I>(existing: I, width: usize) -> Result<String>
where
    I: IntoIterator<Item = &'a String>,
{
    let max = existing
        .into_iter()
        .filter_map(|id| segments(id).first().copied())
        .max()
        .unwrap_or(0);
    let next = max
        .checked_add(1)
        .ok_or_else(|| Error::Validation(format!("no top-level id left after {}", max)))?;
    Ok(format_top_level(next, width))
}

/// Suffix `n` when `id` is a direct child of `parent` (`{parent}.{n}`).
pub fn child_suffix(id: &str, parent: &str) -> Option<u64> {
    let rest = id.strip_prefix(parent)?.strip_prefix('.')?;
    if rest.is_empty() || !rest.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    rest.parse().ok()
}

/// Next unused direct child id of `parent`.
pub fn next_child<'a, I>(existing: I, parent: &str) -> Result<String>
where
    I: IntoIterator<Item = &'a String>,
{
    let max = existing
        .into_iter()
        .filter_map(|id| child_suffix(id, parent))
        .max()
        .unwrap_or(0);
    let next = max
        .checked_add(1)
        .ok_or_else(|| Error::Validation(format!("no child id left under {}", parent)))?;
    Ok(child(parent, next))
}

pub fn child(parent: &str, n: u64) -> String {
    format!("{}.{}", parent, n)
}

/// Parent implied by a dotted id, if any.
pub fn implied_parent(id: &str) -> Option<&str> {
    id.rsplit_once('.').map(|(parent, _)| parent)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_validate() {
        assert!(validate("0001").is_ok());
        assert!(validate("0001.2.10").is_ok());
        assert!(validate("").is_err());
        assert!(validate("0001.").is_err());
        assert!(validate("wb-a1b2").is_err());
        assert!(validate("18446744073709551615").is_ok());
        assert!(validate("18446744073709551616").is_err());
        assert!(validate("0001.99999999999999999999").is_err());
    }

    #[test]
    fn test_next_top_level_empty() {
        assert_eq!(next_top_level(&Vec::new(), 4).unwrap(), "0001");
    }

    #[test]
    fn test_next_top_level_is_numeric_max() {
        let ids = owned(&["0001", "0009", "0002", "0010.3"]);
        assert_eq!(next_top_level(&ids, 4).unwrap(), "0011");
    }

    #[test]
    fn test_next_top_level_ignores_padding_differences() {
        let ids = owned(&["7", "0003"]);
        assert_eq!(next_top_level(&ids, 3).unwrap(), "008");
    }

    #[test]
    fn test_next_child() {
        let ids = owned(&["0001", "0001.1", "0001.3", "0001.3.1", "0010.7", "00011.9"]);
        assert_eq!(next_child(&ids, "0001").unwrap(), "0001.4");
        assert_eq!(next_child(&ids, "0001.3").unwrap(), "0001.3.2");
        assert_eq!(next_child(&ids, "0002").unwrap(), "0002.1");
    }

    #[test]
    fn test_exhausted_sequence_is_an_error() {
        let ids = owned(&["18446744073709551615", "0001.18446744073709551615"]);
        assert!(matches!(next_top_level(&ids, 4), Err(Error::Validation(_))));
        assert!(matches!(next_child(&ids, "0001"), Err(Error::Validation(_))));
        assert_eq!(next_child(&ids, "0002").unwrap(), "0002.1");
    }

    #[test]
    fn test_child_suffix_requires_direct_child() {
        assert_eq!(child_suffix("0001.2", "0001"), Some(2));
        assert_eq!(child_suffix("0001.2.1", "0001"), None);
        assert_eq!(child_suffix("00012", "0001"), None);
    }

    #[test]
    fn test_natural_sort() {
        let mut ids = owned(&["0010", "0002.10", "0002", "0002.2"]);
        sort(&mut ids);
        assert_eq!(ids, owned(&["0002", "0002.2", "0002.10", "0010"]));
    }

    #[test]
    fn test_implied_parent() {
        assert_eq!(implied_parent("0001.2.3"), Some("0001.2"));
        assert_eq!(implied_parent("0001"), None);
    }
}
