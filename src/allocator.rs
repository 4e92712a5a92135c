use std::collections::HashSet;

use tracing::debug;

use crate::models::{LedgerRow, ID_COLUMN};

/// Smallest positive integer not used by any cell in `ids`.
///
/// Cells that are not plain positive integers (the header, blanks,
/// corrupted values) are left out of the used set rather than rejected.
pub fn next_available_id<'a, I>(ids: I) -> u64
where
    I: IntoIterator<Item = &'a str>,
{
    let mut used = HashSet::new();
    for cell in ids {
        match parse_id(cell) {
            Some(id) => {
                used.insert(id);
            }
            None => debug!(cell, "ignoring malformed id cell"),
        }
    }

    let mut next = 1;
    while used.contains(&next) {
        next += 1;
    }
    next
}

/// Applies [`next_available_id`] to the id column of a ledger snapshot.
pub fn next_id_for_rows(rows: &[LedgerRow]) -> u64 {
    next_available_id(
        rows.iter()
            .filter_map(|row| row.get(ID_COLUMN))
            .map(String::as_str),
    )
}

fn parse_id(cell: &str) -> Option<u64> {
    let cell = cell.trim();
    if cell.is_empty() || !cell.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    cell.parse::<u64>().ok().filter(|id| *id > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::header_row;
    use proptest::prelude::*;

    fn ids(values: &[u64]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn allocate(values: &[u64]) -> u64 {
        let cells = ids(values);
        next_available_id(cells.iter().map(String::as_str))
    }

    #[test]
    fn empty_ledger_starts_at_one() {
        assert_eq!(allocate(&[]), 1);
        assert_eq!(next_id_for_rows(&[]), 1);
        assert_eq!(next_id_for_rows(&[header_row()]), 1);
    }

    #[test]
    fn contiguous_ids_extend_the_sequence() {
        assert_eq!(allocate(&[1, 2, 3]), 4);
    }

    #[test]
    fn gaps_are_recycled_smallest_first() {
        assert_eq!(allocate(&[1, 3]), 2);
        assert_eq!(allocate(&[2, 3]), 1);
        assert_eq!(allocate(&[5, 1, 2, 4]), 3);
    }

    #[test]
    fn malformed_cells_are_ignored() {
        assert_eq!(next_available_id(["1", "x", "3"]), 2);
        assert_eq!(next_available_id(["", "  ", "-1", "+2", "1.0", "0"]), 1);
        assert_eq!(next_available_id([" 1 ", "2"]), 3);
        assert_eq!(next_available_id(["99999999999999999999999", "1"]), 2);
    }

    #[test]
    fn short_rows_do_not_panic() {
        let rows = vec![header_row(), Vec::new(), vec!["1".to_string()]];
        assert_eq!(next_id_for_rows(&rows), 2);
    }

    proptest! {
        #[test]
        fn returns_minimum_excluded_positive(values in proptest::collection::vec(1u64..64, 0..48)) {
            let next = allocate(&values);
            prop_assert!(next >= 1);
            prop_assert!(!values.contains(&next));
            for smaller in 1..next {
                prop_assert!(values.contains(&smaller));
            }
            prop_assert!(next <= values.len() as u64 + 1);
        }

        #[test]
        fn order_of_rows_does_not_matter(mut values in proptest::collection::vec(1u64..32, 0..24)) {
            let forward = allocate(&values);
            values.reverse();
            prop_assert_eq!(forward, allocate(&values));
        }
    }
}
