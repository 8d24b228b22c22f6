use crate::game::{CheckRecord, CheckResult, Game, PlayerId};

/// Living players the seer has not checked yet, ascending by id.
///
/// Empty when there is no living seer.
pub fn checkable_targets(game: &Game) -> Vec<PlayerId> {
    let Some(seer) = game.living_seer() else {
        return Vec::new();
    };
    let checked = seer.seer_knowledge.as_deref().unwrap_or_default();
    game.alive_ids()
        .into_iter()
        .filter(|&id| id != seer.id)
        .filter(|&id| !checked.iter().any(|record| record.checked_id == id))
        .collect()
}

/// Append a check to the seer's knowledge and return the record.
///
/// `day` is 0 for the check made before the first day.
pub fn record_check(game: &mut Game, target: PlayerId, day: u32) -> Option<CheckRecord> {
    let result = CheckResult::of(game.player(target)?.role);
    let seer_id = game.seer()?.id;
    let record = CheckRecord {
        day,
        checked_id: target,
        result,
    };
    game.player_mut(seer_id)?
        .seer_knowledge
        .get_or_insert_with(Vec::new)
        .push(record.clone());
    Some(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{Player, Role};

    fn game() -> Game {
        Game::new(
            "seer",
            vec![
                Player::new(1, "A", Role::Seer, true),
                Player::new(2, "B", Role::Werewolf, false),
                Player::new(3, "C", Role::Villager, false),
                Player::new(4, "D", Role::Villager, false),
            ],
        )
    }

    #[test]
    fn targets_exclude_self_and_checked() {
        let mut g = game();
        assert_eq!(checkable_targets(&g), vec![2, 3, 4]);

        let record = record_check(&mut g, 2, 0).unwrap();
        assert_eq!(record.result, CheckResult::Werewolf);
        assert_eq!(record.day, 0);
        assert_eq!(checkable_targets(&g), vec![3, 4]);
    }

    #[test]
    fn targets_exclude_dead_players() {
        let mut g = game();
        g.player_mut(3).unwrap().is_alive = false;
        assert_eq!(checkable_targets(&g), vec![2, 4]);
    }

    #[test]
    fn exhausted_seer_has_no_targets() {
        let mut g = game();
        for id in [2, 3, 4] {
            record_check(&mut g, id, 1);
        }
        assert!(checkable_targets(&g).is_empty());
        let knowledge = g.player(1).unwrap().seer_knowledge.as_ref().unwrap();
        assert_eq!(knowledge.len(), 3);
        assert_eq!(knowledge[1].result, CheckResult::NotWerewolf);
    }

    #[test]
    fn dead_seer_has_no_targets() {
        let mut g = game();
        g.player_mut(1).unwrap().is_alive = false;
        assert!(checkable_targets(&g).is_empty());
    }
}
