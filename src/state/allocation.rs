use std::collections::{BTreeMap, BTreeSet};

use tracing::warn;
use uuid::Uuid;

use crate::state::session::PlayerSession;

/// Player holding a reserved card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardHolder {
    /// Player session that owns the reservation.
    pub player_session_id: Uuid,
    /// External player identifier, reported back on conflicts.
    pub player_id: i64,
}

/// Result of a reservation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// Card now belongs to the caller (or already did).
    Reserved,
    /// Another player holds the card.
    AlreadyTaken {
        /// Current holder.
        holder: CardHolder,
    },
}

/// Drift found while rebuilding the table from the player list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocationAudit {
    /// Entries dropped because no player backs them.
    pub orphaned: usize,
    /// Entries added because a player held a card the table did not know about.
    pub restored: usize,
}

impl AllocationAudit {
    /// Whether the table already matched the player list.
    pub fn is_clean(&self) -> bool {
        self.orphaned == 0 && self.restored == 0
    }
}

/// Per-session index of card code to holder.
///
/// Derived from the players' selected card codes; [`CardAllocationTable::reconcile`] rebuilds it
/// from that list. The owning session actor is the only writer, which makes `try_reserve` an
/// atomic check-and-set with respect to every other mutation of the session.
#[derive(Debug, Clone)]
pub struct CardAllocationTable {
    session_code: String,
    holders: BTreeMap<u32, CardHolder>,
}

impl CardAllocationTable {
    /// Empty table for the given session.
    pub fn new(session_code: impl Into<String>) -> Self {
        Self {
            session_code: session_code.into(),
            holders: BTreeMap::new(),
        }
    }

    /// Reserve `card_code` for `holder` unless somebody else already owns it.
    pub fn try_reserve(&mut self, card_code: u32, holder: CardHolder) -> Reservation {
        match self.holders.get(&card_code) {
            Some(current) if current.player_session_id != holder.player_session_id => {
                Reservation::AlreadyTaken { holder: *current }
            }
            Some(_) => Reservation::Reserved,
            None => {
                self.holders.insert(card_code, holder);
                Reservation::Reserved
            }
        }
    }

    /// Drop the reservation for `card_code`; absent codes are ignored.
    pub fn release(&mut self, card_code: u32) {
        self.holders.remove(&card_code);
    }

    /// Current holder of `card_code`.
    pub fn holder(&self, card_code: u32) -> Option<CardHolder> {
        self.holders.get(&card_code).copied()
    }

    /// Reserved codes in ascending order.
    pub fn taken(&self) -> Vec<u32> {
        self.holders.keys().copied().collect()
    }

    /// Number of reserved cards.
    pub fn len(&self) -> usize {
        self.holders.len()
    }

    /// Whether no card is reserved.
    pub fn is_empty(&self) -> bool {
        self.holders.is_empty()
    }

    /// Remove every reservation.
    pub fn clear(&mut self) {
        self.holders.clear();
    }

    /// Replace the table with the reservations implied by `players`.
    ///
    /// The first player (in iteration order) claiming a code wins; later claimants are left for
    /// the caller to clean up since this table only mirrors the player list.
    pub fn reconcile<'a>(
        &mut self,
        players: impl IntoIterator<Item = &'a PlayerSession>,
    ) -> AllocationAudit {
        let mut rebuilt = BTreeMap::new();
        for player in players {
            if let Some(code) = player.selected_card_code {
                rebuilt.entry(code).or_insert(CardHolder {
                    player_session_id: player.id,
                    player_id: player.player.player_id,
                });
            }
        }

        let before: BTreeSet<u32> = self.holders.keys().copied().collect();
        let after: BTreeSet<u32> = rebuilt.keys().copied().collect();
        let audit = AllocationAudit {
            orphaned: before.difference(&after).count(),
            restored: after.difference(&before).count(),
        };

        if !audit.is_clean() {
            warn!(
                session = %self.session_code,
                orphaned = audit.orphaned,
                restored = audit.restored,
                "card allocation drifted from player list; rebuilt"
            );
        }

        self.holders = rebuilt;
        audit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::session::test_support::player_with_card;

    fn holder(player_id: i64) -> CardHolder {
        CardHolder {
            player_session_id: Uuid::new_v4(),
            player_id,
        }
    }

    #[test]
    fn second_reservation_reports_holder() {
        let mut table = CardAllocationTable::new("GAME_X");
        let first = holder(1);
        assert_eq!(table.try_reserve(7, first), Reservation::Reserved);

        match table.try_reserve(7, holder(2)) {
            Reservation::AlreadyTaken { holder } => assert_eq!(holder.player_id, 1),
            other => panic!("expected conflict, got {other:?}"),
        }
        // same player re-selecting is not a conflict
        assert_eq!(table.try_reserve(7, first), Reservation::Reserved);
    }

    #[test]
    fn release_is_idempotent() {
        let mut table = CardAllocationTable::new("GAME_X");
        table.try_reserve(3, holder(1));
        table.release(3);
        table.release(3);
        table.release(99);
        assert!(table.is_empty());
    }

    #[test]
    fn reconcile_drops_orphans_and_restores_missing() {
        let mut table = CardAllocationTable::new("GAME_X");
        table.try_reserve(10, holder(1));

        let players = vec![player_with_card(2, Some(4)), player_with_card(3, None)];
        let audit = table.reconcile(&players);

        assert_eq!(audit.orphaned, 1);
        assert_eq!(audit.restored, 1);
        assert_eq!(table.taken(), vec![4]);
        assert_eq!(table.holder(4).map(|h| h.player_id), Some(2));
    }

    #[test]
    fn reconcile_keeps_first_claimant() {
        let mut table = CardAllocationTable::new("GAME_X");
        let players = vec![player_with_card(5, Some(9)), player_with_card(6, Some(9))];
        table.reconcile(&players);
        assert_eq!(table.len(), 1);
        assert_eq!(table.holder(9).map(|h| h.player_id), Some(5));
        assert!(table.reconcile(&players).is_clean());
    }
}
