//! Transform input resolution.

use crate::core::Record;
use std::collections::BTreeMap;

/// Computes the input of transform `id`.
///
/// Transform 0, and any transform with no requirements, consumes the fetch
/// output. Otherwise the input is the concatenation, in ascending id order,
/// of the stored outputs of every required id strictly below `id`. Required
/// ids at or above `id` are dropped, as are duplicates.
#[must_use]
pub fn resolve_transform_input(
    id: usize,
    requires: &[usize],
    outputs: &BTreeMap<usize, Vec<Record>>,
    fetched: &[Record],
) -> Vec<Record> {
    if id == 0 || requires.is_empty() {
        return fetched.to_vec();
    }

    let mut required: Vec<usize> = requires.iter().copied().filter(|&r| r < id).collect();
    required.sort_unstable();
    required.dedup();

    required
        .iter()
        .filter_map(|r| outputs.get(r))
        .flatten()
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::record;
    use pretty_assertions::assert_eq;

    fn sources(records: &[Record]) -> Vec<&str> {
        records.iter().map(|r| r.source.as_str()).collect()
    }

    fn outputs() -> BTreeMap<usize, Vec<Record>> {
        let mut outputs = BTreeMap::new();
        outputs.insert(0, vec![record("f", "t0-a"), record("f", "t0-b")]);
        outputs.insert(1, Vec::new());
        outputs.insert(2, vec![record("f", "t2-a")]);
        outputs
    }

    #[test]
    fn test_first_transform_gets_fetch_output() {
        let fetched = vec![record("f", "fetched")];
        // Requirements on transform 0 are meaningless and ignored.
        let input = resolve_transform_input(0, &[1], &outputs(), &fetched);
        assert_eq!(sources(&input), vec!["fetched"]);
    }

    #[test]
    fn test_no_requirements_gets_fetch_output() {
        let fetched = vec![record("f", "fetched")];
        let input = resolve_transform_input(3, &[], &outputs(), &fetched);
        assert_eq!(sources(&input), vec!["fetched"]);
    }

    #[test]
    fn test_concatenates_in_ascending_order() {
        let input = resolve_transform_input(3, &[2, 0, 1], &outputs(), &[]);
        assert_eq!(sources(&input), vec!["t0-a", "t0-b", "t2-a"]);
    }

    #[test]
    fn test_forward_reference_yields_empty_input() {
        let fetched = vec![record("f", "fetched")];
        let input = resolve_transform_input(1, &[2], &outputs(), &fetched);
        assert!(input.is_empty());
    }

    #[test]
    fn test_self_reference_and_duplicates_dropped() {
        let input = resolve_transform_input(2, &[0, 0, 2, 5], &outputs(), &[]);
        assert_eq!(sources(&input), vec!["t0-a", "t0-b"]);
    }
}
