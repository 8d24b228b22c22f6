pub mod agent;
pub mod config;
pub mod decision;
pub mod errors;
pub mod game;
pub mod persistence;
pub mod schedule;
pub mod server;
pub mod session;
pub mod telemetry;
pub mod tts;
