//! Validation helpers for DTOs.

use validator::ValidationError;

use crate::state::card::{COLUMN_BAND, CardGrid, FREE_SPACE, GRID_SIZE};

/// Validates that a submitted card is a 5×5 grid whose numbers sit in their column band.
///
/// The centre cell must be the free space (0).
///
/// # Examples
///
/// ```ignore
/// validate_card_grid(&CardGrid(vec![vec![1, 16, 31, 46, 61]; 5])) // Err - centre not free
/// validate_card_grid(&CardGrid(vec![]))                            // Err - wrong shape
/// ```
pub fn validate_card_grid(grid: &CardGrid) -> Result<(), ValidationError> {
    if !grid.is_well_formed() {
        let mut err = ValidationError::new("card_grid_shape");
        err.message = Some(
            format!(
                "Card must have {GRID_SIZE} rows of {GRID_SIZE} numbers (got {} rows)",
                grid.rows().len()
            )
            .into(),
        );
        return Err(err);
    }

    let centre = GRID_SIZE / 2;
    for (row, cells) in grid.rows().iter().enumerate() {
        for (col, &value) in cells.iter().enumerate() {
            if row == centre && col == centre {
                if value != FREE_SPACE {
                    let mut err = ValidationError::new("card_grid_free_space");
                    err.message = Some("Centre cell must be the free space (0)".into());
                    return Err(err);
                }
                continue;
            }

            let low = COLUMN_BAND * col as u8 + 1;
            let high = low + COLUMN_BAND - 1;
            if !(low..=high).contains(&value) {
                let mut err = ValidationError::new("card_grid_range");
                err.message = Some(
                    format!("Cell ({row},{col}) must be between {low} and {high} (got {value})")
                        .into(),
                );
                return Err(err);
            }
        }
    }

    Ok(())
}
