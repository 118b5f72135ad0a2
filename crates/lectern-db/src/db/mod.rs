//! Database repositories for the upload/quota core
//!
//! `store` holds the traits, `postgres` the production implementation and `memory` an
//! in-process implementation used by service and API tests.

pub mod memory;
pub mod postgres;
mod rows;
pub mod store;

pub use store::{MediaStore, StoreTx};
