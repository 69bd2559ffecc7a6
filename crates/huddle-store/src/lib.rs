//! # huddle-store
//!
//! Record storage for the Huddle chat server: users, chats, per-user
//! pending-message records and the anonymous-chat matching pool.
//!
//! The server talks to storage only through the [`RecordStore`] trait.
//! [`SqliteStore`] is the durable implementation, a `rusqlite` connection
//! with typed CRUD helpers on [`Database`]; [`MemoryStore`] keeps
//! everything in process.

pub mod chats;
pub mod database;
pub mod memory;
pub mod migrations;
pub mod models;
pub mod pending;
pub mod store;
pub mod users;
pub mod waiting;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use memory::MemoryStore;
pub use models::*;
pub use store::{RecordStore, SqliteStore};
