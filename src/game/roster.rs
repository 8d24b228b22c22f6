//! Seating and role assignment for a new game.

use std::collections::HashMap;

use rand::Rng;
use rand::seq::SliceRandom;

use crate::errors::RosterError;
use crate::game::{Game, Player, PlayerId, Role};

/// Fixed number of seats per role. The multiset never changes after dealing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleCounts {
    pub werewolves: usize,
    pub seers: usize,
    pub villagers: usize,
}

impl RoleCounts {
    pub fn total(&self) -> usize {
        self.werewolves + self.seers + self.villagers
    }

    /// The role multiset in a fixed order, ready to be shuffled.
    pub fn deck(&self) -> Vec<Role> {
        let mut deck = Vec::with_capacity(self.total());
        deck.extend(std::iter::repeat_n(Role::Werewolf, self.werewolves));
        deck.extend(std::iter::repeat_n(Role::Seer, self.seers));
        deck.extend(std::iter::repeat_n(Role::Villager, self.villagers));
        deck
    }
}

impl Default for RoleCounts {
    fn default() -> Self {
        Self {
            werewolves: 2,
            seers: 1,
            villagers: 5,
        }
    }
}

/// Everything needed to deal a table.
#[derive(Debug, Clone)]
pub struct TableSpec {
    pub players: usize,
    pub human_id: PlayerId,
    pub counts: RoleCounts,
    pub nicknames: HashMap<PlayerId, String>,
}

/// Shuffle the role deck and hand one role to each seat.
///
/// Seats keep their ids; only roles move. The seer is given an empty
/// knowledge list and everybody else loses theirs.
pub fn assign_roles<R: Rng + ?Sized>(
    players: &mut [Player],
    counts: &RoleCounts,
    rng: &mut R,
) -> Result<(), RosterError> {
    if counts.total() != players.len() {
        return Err(RosterError::CountMismatch {
            players: players.len(),
            roles: counts.total(),
        });
    }

    let mut deck = counts.deck();
    deck.shuffle(rng);

    for (player, role) in players.iter_mut().zip(deck) {
        player.role = role;
        player.seer_knowledge = (role == Role::Seer).then(Vec::new);
    }
    Ok(())
}

/// Seat the table in id order and deal shuffled roles.
pub fn deal<R: Rng + ?Sized>(
    game_id: &str,
    spec: &TableSpec,
    rng: &mut R,
) -> Result<Game, RosterError> {
    let seat_count = PlayerId::try_from(spec.players).unwrap_or(PlayerId::MAX);
    if spec.human_id == 0 || spec.human_id > seat_count {
        return Err(RosterError::HumanSeatOutOfRange {
            human_id: spec.human_id,
            players: spec.players,
        });
    }

    let mut players: Vec<Player> = (1..=seat_count)
        .map(|id| {
            let nickname = spec
                .nicknames
                .get(&id)
                .cloned()
                .unwrap_or_else(|| format!("Player {}", id));
            Player::new(id, nickname, Role::Villager, id == spec.human_id)
        })
        .collect();

    assign_roles(&mut players, &spec.counts, rng)?;
    Ok(Game::new(game_id, players))
}
