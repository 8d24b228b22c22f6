//! Elimination and terminal-condition checks.

use crate::game::{Camp, Game, Phase, PlayerId, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EliminationReason {
    Vote,
    Night,
}

impl std::fmt::Display for EliminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EliminationReason::Vote => write!(f, "vote"),
            EliminationReason::Night => write!(f, "night"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WinCheck {
    Continue,
    Winner(Camp),
}

/// Remove a player from play and record it on the current day.
///
/// Returns `false` without touching anything if the player is unknown or
/// already dead.
pub fn eliminate(game: &mut Game, player_id: PlayerId, reason: EliminationReason) -> bool {
    let Some(player) = game.player_mut(player_id) else {
        return false;
    };
    if !player.is_alive {
        return false;
    }
    player.is_alive = false;
    player.revealed_role = Some(player.role);

    let day = game.day;
    let log = game.day_log_mut(day);
    match reason {
        EliminationReason::Vote => log.eliminated_vote = Some(player_id),
        EliminationReason::Night => log.eliminated_night = Some(player_id),
    }
    true
}

pub fn check_win(game: &Game) -> WinCheck {
    let werewolves = game.alive_players().filter(|p| p.role.is_werewolf()).count();
    let good = game.alive_players().filter(|p| !p.role.is_werewolf()).count();

    if werewolves == 0 {
        WinCheck::Winner(Camp::Good)
    } else if werewolves >= good {
        WinCheck::Winner(Camp::Werewolves)
    } else {
        WinCheck::Continue
    }
}

/// Move the game to its terminal state. Has no effect on an ended game.
pub fn conclude(game: &mut Game, winner: Camp) -> bool {
    if game.is_ended() {
        return false;
    }
    game.phase = Phase::Ended;
    game.winner = Some(winner);
    true
}

/// Every seat with its role, ascending by id. Only sent once the game ends.
pub fn role_disclosure(game: &Game) -> Vec<(PlayerId, Role)> {
    let mut roles: Vec<(PlayerId, Role)> = game.players.iter().map(|p| (p.id, p.role)).collect();
    roles.sort_unstable_by_key(|(id, _)| *id);
    roles
}
