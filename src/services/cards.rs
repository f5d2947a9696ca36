//! Card batch generation.

use std::collections::HashSet;

use rand::{Rng, seq::index};
use thiserror::Error;
use tracing::{debug, info};

use crate::state::card::{COLUMN_BAND, Card, CardGrid, FREE_SPACE, GRID_SIZE};

/// Attempts allowed per requested card before giving up on finding distinct layouts.
const ATTEMPTS_PER_CARD: usize = 50;

/// Failure to produce a batch of distinct cards.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("generated only {generated} distinct cards out of {requested} after {attempts} attempts")]
pub struct CardBatchError {
    /// Cards asked for.
    pub requested: usize,
    /// Distinct cards produced before giving up.
    pub generated: usize,
    /// Layouts drawn in total.
    pub attempts: usize,
}

/// Generate `count` structurally distinct cards with codes `1..=count`.
pub fn generate_card_batch(count: usize) -> Result<Vec<Card>, CardBatchError> {
    generate_card_batch_with(&mut rand::rng(), count)
}

/// Same as [`generate_card_batch`] with an explicit random source.
pub fn generate_card_batch_with<R: Rng + ?Sized>(
    rng: &mut R,
    count: usize,
) -> Result<Vec<Card>, CardBatchError> {
    let max_attempts = count.saturating_mul(ATTEMPTS_PER_CARD);
    let mut seen: HashSet<CardGrid> = HashSet::with_capacity(count);
    let mut cards = Vec::with_capacity(count);
    let mut attempts = 0;

    while cards.len() < count {
        if attempts >= max_attempts {
            return Err(CardBatchError {
                requested: count,
                generated: cards.len(),
                attempts,
            });
        }
        attempts += 1;

        let grid = random_grid(rng);
        if seen.insert(grid.clone()) {
            cards.push(Card {
                code: (cards.len() + 1) as u32,
                numbers: grid,
            });
        } else {
            debug!(attempt = attempts, "discarded duplicate card layout");
        }
    }

    info!(count, attempts, "generated card batch");
    Ok(cards)
}

/// One card: column `c` holds five distinct numbers from `15c+1..=15c+15`, centre is free.
fn random_grid<R: Rng + ?Sized>(rng: &mut R) -> CardGrid {
    let mut rows = [[FREE_SPACE; GRID_SIZE]; GRID_SIZE];
    for col in 0..GRID_SIZE {
        let base = COLUMN_BAND * col as u8 + 1;
        let picks = index::sample(rng, COLUMN_BAND as usize, GRID_SIZE);
        for (row, offset) in picks.into_iter().enumerate() {
            rows[row][col] = base + offset as u8;
        }
    }
    rows[GRID_SIZE / 2][GRID_SIZE / 2] = FREE_SPACE;
    CardGrid::from_rows(rows)
}
