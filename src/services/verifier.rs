//! Win verification against the called numbers.

use std::collections::BTreeSet;

use crate::state::card::{CardGrid, FREE_SPACE, GRID_SIZE};

/// Whether `grid` has a full row, column or diagonal covered by `called` plus the free space.
///
/// Malformed grids never win.
pub fn verify(grid: &CardGrid, called: &BTreeSet<u8>) -> bool {
    if !grid.is_well_formed() {
        return false;
    }

    let covered = |row: usize, col: usize| {
        grid.cell(row, col)
            .is_some_and(|value| value == FREE_SPACE || called.contains(&value))
    };

    let any_row = (0..GRID_SIZE).any(|row| (0..GRID_SIZE).all(|col| covered(row, col)));
    let any_col = (0..GRID_SIZE).any(|col| (0..GRID_SIZE).all(|row| covered(row, col)));
    let diagonal = (0..GRID_SIZE).all(|i| covered(i, i));
    let anti_diagonal = (0..GRID_SIZE).all(|i| covered(i, GRID_SIZE - 1 - i));

    any_row || any_col || diagonal || anti_diagonal
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CardGrid {
        CardGrid::from_rows([
            [1, 16, 31, 46, 61],
            [2, 17, 32, 47, 62],
            [3, 18, 0, 48, 63],
            [4, 19, 34, 49, 64],
            [5, 20, 35, 50, 65],
        ])
    }

    fn called(numbers: &[u8]) -> BTreeSet<u8> {
        numbers.iter().copied().collect()
    }

    #[test]
    fn middle_row_with_free_space_wins() {
        assert!(verify(&sample(), &called(&[3, 18, 48, 63])));
    }

    #[test]
    fn column_wins() {
        assert!(verify(&sample(), &called(&[16, 17, 18, 19, 20])));
    }

    #[test]
    fn both_diagonals_win() {
        assert!(verify(&sample(), &called(&[1, 17, 49, 65])));
        assert!(verify(&sample(), &called(&[61, 47, 19, 5])));
    }

    #[test]
    fn scattered_numbers_do_not_win() {
        assert!(!verify(&sample(), &called(&[1, 17, 49, 64, 3, 18])));
        assert!(!verify(&sample(), &BTreeSet::new()));
    }

    #[test]
    fn malformed_grid_is_not_a_win() {
        let mut grid = sample();
        grid.0.pop();
        assert!(!verify(&grid, &called(&[3, 18, 48, 63])));
        assert!(!verify(&CardGrid(Vec::new()), &called(&[1, 2, 3])));
    }
}
