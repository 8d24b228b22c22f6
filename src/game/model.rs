use serde::{Deserialize, Serialize};

/// Bumped whenever the persisted snapshot layout changes.
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// Seat number, unique within a game and starting at 1.
pub type PlayerId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Werewolf,
    Seer,
    Villager,
}

impl Role {
    pub fn is_werewolf(self) -> bool {
        matches!(self, Role::Werewolf)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Werewolf => write!(f, "werewolf"),
            Role::Seer => write!(f, "seer"),
            Role::Villager => write!(f, "villager"),
        }
    }
}

/// The two factions. Also used as the winner of a finished game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Camp {
    Good,
    Werewolves,
}

impl std::fmt::Display for Camp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Camp::Good => write!(f, "good camp"),
            Camp::Werewolves => write!(f, "werewolves"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Waiting,
    PreGameSeer,
    Day,
    Discussion,
    Voting,
    NightSeer,
    NightWerewolf,
    Ended,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Waiting => "waiting",
            Phase::PreGameSeer => "pre_game_seer",
            Phase::Day => "day",
            Phase::Discussion => "discussion",
            Phase::Voting => "voting",
            Phase::NightSeer => "night_seer",
            Phase::NightWerewolf => "night_werewolf",
            Phase::Ended => "ended",
        };
        write!(f, "{}", name)
    }
}

/// What a seer learns from a check. Deliberately coarser than the role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckResult {
    Werewolf,
    NotWerewolf,
}

impl CheckResult {
    pub fn of(role: Role) -> Self {
        if role.is_werewolf() {
            CheckResult::Werewolf
        } else {
            CheckResult::NotWerewolf
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRecord {
    /// Day of the check; 0 for the check made before the first day.
    pub day: u32,
    pub checked_id: PlayerId,
    pub result: CheckResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub nickname: String,
    pub role: Role,
    pub is_alive: bool,
    pub is_human: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revealed_role: Option<Role>,
    /// Present only for the seer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seer_knowledge: Option<Vec<CheckRecord>>,
}

impl Player {
    pub fn new(id: PlayerId, nickname: impl Into<String>, role: Role, is_human: bool) -> Self {
        Self {
            id,
            nickname: nickname.into(),
            role,
            is_alive: true,
            is_human,
            revealed_role: None,
            seer_knowledge: (role == Role::Seer).then(Vec::new),
        }
    }

    /// "Nickname (#3)", used in log lines and history text.
    pub fn label(&self) -> String {
        format!("{} (#{})", self.nickname, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Speech {
    pub player_id: PlayerId,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayLog {
    pub day: u32,
    pub speeches: Vec<Speech>,
    pub eliminated_vote: Option<PlayerId>,
    pub eliminated_night: Option<PlayerId>,
}

impl DayLog {
    pub fn new(day: u32) -> Self {
        Self {
            day,
            speeches: Vec::new(),
            eliminated_vote: None,
            eliminated_night: None,
        }
    }
}

/// Canonical state of one game. Only the session that owns it mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub schema_version: u32,
    pub id: String,
    pub day: u32,
    pub phase: Phase,
    pub players: Vec<Player>,
    pub game_log: Vec<DayLog>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<Camp>,
}

impl Game {
    pub fn new(id: impl Into<String>, players: Vec<Player>) -> Self {
        Self {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            id: id.into(),
            day: 1,
            phase: Phase::Waiting,
            players,
            game_log: Vec::new(),
            winner: None,
        }
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    pub fn human(&self) -> Option<&Player> {
        self.players.iter().find(|p| p.is_human)
    }

    /// The seer, alive or not.
    pub fn seer(&self) -> Option<&Player> {
        self.players.iter().find(|p| p.role == Role::Seer)
    }

    pub fn living_seer(&self) -> Option<&Player> {
        self.seer().filter(|p| p.is_alive)
    }

    pub fn alive_players(&self) -> impl Iterator<Item = &Player> {
        self.players.iter().filter(|p| p.is_alive)
    }

    /// Ids of living players in ascending order.
    pub fn alive_ids(&self) -> Vec<PlayerId> {
        let mut ids: Vec<PlayerId> = self.alive_players().map(|p| p.id).collect();
        ids.sort_unstable();
        ids
    }

    pub fn living_werewolves(&self) -> Vec<&Player> {
        let mut wolves: Vec<&Player> = self
            .alive_players()
            .filter(|p| p.role.is_werewolf())
            .collect();
        wolves.sort_by_key(|p| p.id);
        wolves
    }

    pub fn is_ended(&self) -> bool {
        self.phase == Phase::Ended
    }

    pub fn day_log(&self, day: u32) -> Option<&DayLog> {
        self.game_log.iter().find(|log| log.day == day)
    }

    /// The log for `day`, created on first write.
    pub fn day_log_mut(&mut self, day: u32) -> &mut DayLog {
        let index = match self.game_log.iter().position(|log| log.day == day) {
            Some(index) => index,
            None => {
                self.game_log.push(DayLog::new(day));
                self.game_log.len() - 1
            }
        };
        &mut self.game_log[index]
    }

    pub fn add_speech(&mut self, player_id: PlayerId, text: impl Into<String>) {
        let day = self.day;
        self.day_log_mut(day).speeches.push(Speech {
            player_id,
            text: text.into(),
        });
    }

    pub fn nickname(&self, id: PlayerId) -> String {
        self.player(id)
            .map(|p| p.nickname.clone())
            .unwrap_or_else(|| format!("Player {}", id))
    }

    /// The other living werewolves, seen from `id`.
    pub fn werewolf_teammates(&self, id: PlayerId) -> Vec<PlayerId> {
        self.living_werewolves()
            .into_iter()
            .map(|p| p.id)
            .filter(|&wolf| wolf != id)
            .collect()
    }
}
