//! linkup coordination server library.
//! This crate exposes internal modules for integration testing.
//! The binary entry point is in main.rs.

pub mod analyzer;
pub mod chat;
pub mod config;
pub mod delivery;
pub mod directory;
pub mod dm;
pub mod error;
pub mod events;
pub mod matching;
pub mod models;
pub mod presence;
pub mod routes;
pub mod state;
pub mod ws;
