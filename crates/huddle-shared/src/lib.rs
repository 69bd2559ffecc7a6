//! # huddle-shared
//!
//! Types shared by the Huddle server crates: identifiers and chat kinds,
//! the live-connection wire protocol, session token verification and the
//! common-interest matching engine.

pub mod constants;
pub mod error;
pub mod matching;
pub mod protocol;
pub mod session;
pub mod types;

pub use error::{ProtocolError, SessionError};
pub use types::{ChatId, ChatKind, DisplayIdentity, UserId};
