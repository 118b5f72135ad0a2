//! Lectern Database Library
//!
//! Persistence for upload sessions, quota accounts, reservations and media assets. Services
//! talk to the [`MediaStore`] trait; multi-step changes go through a [`StoreTx`] unit of work
//! that commits atomically or not at all.

pub mod db;

pub use db::memory::{self, MemoryStore};
pub use db::postgres::PgMediaStore;
pub use db::store::{MediaStore, StoreTx};
