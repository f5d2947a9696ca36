use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Side length of a Bingo card.
pub const GRID_SIZE: usize = 5;
/// Value stored in the centre cell; always counts as covered.
pub const FREE_SPACE: u8 = 0;
/// Highest number the caller can draw.
pub const MAX_NUMBER: u8 = 75;
/// Width of the number band assigned to each column.
pub const COLUMN_BAND: u8 = 15;

/// 5×5 grid of numbers, row-major, exactly as the player sees it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct CardGrid(pub Vec<Vec<u8>>);

impl CardGrid {
    /// Build a grid from fixed-size rows.
    pub fn from_rows(rows: [[u8; GRID_SIZE]; GRID_SIZE]) -> Self {
        Self(rows.iter().map(|row| row.to_vec()).collect())
    }

    /// Rows of the grid.
    pub fn rows(&self) -> &[Vec<u8>] {
        &self.0
    }

    /// Whether the grid has exactly five rows of five cells.
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == GRID_SIZE && self.0.iter().all(|row| row.len() == GRID_SIZE)
    }

    /// Cell value, `None` when the coordinates fall outside the stored rows.
    pub fn cell(&self, row: usize, col: usize) -> Option<u8> {
        self.0.get(row).and_then(|cells| cells.get(col)).copied()
    }
}

/// Pre-generated card addressed by its 1-based code within the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    /// Card code players select when joining.
    pub code: u32,
    /// Card numbers.
    pub numbers: CardGrid,
}

/// B/I/N/G/O prefix for a drawn number, `None` outside `1..=75`.
pub fn letter_prefix(number: u8) -> Option<char> {
    match number {
        1..=15 => Some('B'),
        16..=30 => Some('I'),
        31..=45 => Some('N'),
        46..=60 => Some('G'),
        61..=75 => Some('O'),
        _ => None,
    }
}

/// Human-readable call such as `B-12`.
pub fn format_call(number: u8) -> String {
    match letter_prefix(number) {
        Some(letter) => format!("{letter}-{number}"),
        None => number.to_string(),
    }
}
