//! Game state and the pure rules that act on it.
//!
//! Nothing in here performs I/O or waits. The session task owns a [`Game`]
//! and calls these functions to mutate it.

pub mod evaluator;
pub mod model;
pub mod roster;
pub mod seer;

pub use evaluator::{EliminationReason, WinCheck, check_win, conclude, eliminate, role_disclosure};
pub use model::{
    Camp, CheckRecord, CheckResult, DayLog, Game, Phase, Player, PlayerId, Role,
    SNAPSHOT_SCHEMA_VERSION, Speech,
};
pub use roster::{RoleCounts, TableSpec, assign_roles, deal};
