//! Game history rendered for a single viewer.
//!
//! Everyone sees the public record: speeches, vote results, overnight
//! results and revealed roles. The seer also sees its own checks, and a
//! werewolf sees its teammates. Nothing else about hidden roles leaks.

use std::fmt::Write;

use crate::game::{CheckResult, Game, PlayerId, Role};

pub fn history_for(game: &Game, viewer: PlayerId) -> String {
    let mut out = String::new();

    let mut days: Vec<u32> = game.game_log.iter().map(|log| log.day).collect();
    if game.day > 1 && !days.contains(&game.day) {
        days.push(game.day);
    }
    days.sort_unstable();

    for day in days {
        if day > 1 {
            let _ = writeln!(out, "--- Day {} (dawn) ---", day);
            let _ = writeln!(out, "{}", overnight_line(game, day));
        } else {
            let _ = writeln!(out, "--- Day {} ---", day);
        }

        let Some(log) = game.day_log(day) else {
            continue;
        };
        if !log.speeches.is_empty() {
            let _ = writeln!(out, "[Speeches]");
            for speech in &log.speeches {
                let _ = writeln!(
                    out,
                    "  - {} (#{}): \"{}\"",
                    game.nickname(speech.player_id),
                    speech.player_id,
                    speech.text
                );
            }
        }
        if let Some(id) = log.eliminated_vote {
            let _ = writeln!(
                out,
                "[Vote] {} (#{}) was voted out. Role: {}.",
                game.nickname(id),
                id,
                revealed(game, id)
            );
        }
    }

    if out.is_empty() {
        out.push_str("The game has just started. Nothing has happened yet.\n");
    }

    if let Some(section) = private_section(game, viewer) {
        out.push_str(&section);
    }

    let _ = write!(out, "Alive players: {:?}", game.alive_ids());
    out
}

/// The announcement made at the start of `day` about the previous night.
pub fn overnight_line(game: &Game, day: u32) -> String {
    let victim = day
        .checked_sub(1)
        .and_then(|previous| game.day_log(previous))
        .and_then(|log| log.eliminated_night);
    match victim {
        Some(id) => format!(
            "[Last night] {} (#{}) was eliminated. Role: {}.",
            game.nickname(id),
            id,
            revealed(game, id)
        ),
        None => "[Last night] It was a safe night.".to_string(),
    }
}

fn revealed(game: &Game, id: PlayerId) -> String {
    game.player(id)
        .and_then(|p| p.revealed_role)
        .map(|role| role.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn private_section(game: &Game, viewer: PlayerId) -> Option<String> {
    let player = game.player(viewer)?;
    let mut out = String::new();

    match player.role {
        Role::Seer => {
            let checks = player.seer_knowledge.as_deref().unwrap_or_default();
            if checks.is_empty() {
                return None;
            }
            let _ = writeln!(out, "[Your checks, private]");
            for check in checks {
                let when = if check.day == 0 {
                    "before the game".to_string()
                } else {
                    format!("on night {}", check.day)
                };
                let verdict = match check.result {
                    CheckResult::Werewolf => "a werewolf",
                    CheckResult::NotWerewolf => "not a werewolf",
                };
                let _ = writeln!(
                    out,
                    "  - {} you checked {} (#{}): {}",
                    when,
                    game.nickname(check.checked_id),
                    check.checked_id,
                    verdict
                );
            }
        }
        Role::Werewolf => {
            let mates: Vec<String> = game
                .players
                .iter()
                .filter(|p| p.role.is_werewolf() && p.id != viewer)
                .map(|p| {
                    let state = if p.is_alive { "" } else { ", eliminated" };
                    format!("{} (#{}{})", p.nickname, p.id, state)
                })
                .collect();
            let _ = writeln!(
                out,
                "[Your teammates, private] {}",
                if mates.is_empty() {
                    "none".to_string()
                } else {
                    mates.join(", ")
                }
            );
        }
        Role::Villager => return None,
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{EliminationReason, Player, eliminate, seer::record_check};

    fn game() -> Game {
        Game::new(
            "h",
            vec![
                Player::new(1, "Ash", Role::Werewolf, false),
                Player::new(2, "Birch", Role::Seer, false),
                Player::new(3, "Cedar", Role::Villager, true),
                Player::new(4, "Dune", Role::Werewolf, false),
                Player::new(5, "Elm", Role::Villager, false),
            ],
        )
    }

    #[test]
    fn fresh_game_has_placeholder() {
        let text = history_for(&game(), 3);
        assert!(text.contains("just started"));
        assert!(text.ends_with("Alive players: [1, 2, 3, 4, 5]"));
    }

    #[test]
    fn speeches_and_vote_results_are_public() {
        let mut g = game();
        g.add_speech(1, "I trust Cedar.");
        eliminate(&mut g, 5, EliminationReason::Vote);

        let text = history_for(&g, 3);
        assert!(text.contains("--- Day 1 ---"));
        assert!(text.contains("Ash (#1): \"I trust Cedar.\""));
        assert!(text.contains("[Vote] Elm (#5) was voted out. Role: villager."));
    }

    #[test]
    fn dawn_reports_night_victim_or_safe_night() {
        let mut g = game();
        eliminate(&mut g, 2, EliminationReason::Night);
        g.day = 2;
        assert!(history_for(&g, 3).contains("[Last night] Birch (#2) was eliminated. Role: seer."));

        g.day = 3;
        assert!(overnight_line(&g, 3).contains("safe night"));
    }

    #[test]
    fn seer_sees_checks_others_do_not() {
        let mut g = game();
        record_check(&mut g, 1, 0);

        let seer_view = history_for(&g, 2);
        assert!(seer_view.contains("before the game you checked Ash (#1): a werewolf"));

        let villager_view = history_for(&g, 3);
        assert!(!villager_view.contains("you checked"));
    }

    #[test]
    fn werewolves_see_teammates() {
        let g = game();
        assert!(history_for(&g, 1).contains("[Your teammates, private] Dune (#4)"));
        assert!(!history_for(&g, 5).contains("teammates"));
    }
}
