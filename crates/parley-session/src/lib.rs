//! Connection bookkeeping for Parley.
//!
//! Every live client connection is a [`SessionId`](parley_protocol::SessionId).
//! The [`SessionRegistry`] remembers which topics each connection is
//! subscribed to and which nickname it speaks as.
//!
//! # How it fits in the stack
//!
//! ```text
//! Room layer (above)      ← asks "is this session subscribed to X?"
//!     ↕
//! Session layer (this)    ← session → topics, session → nickname
//!     ↕
//! Protocol layer (below)  ← SessionId, Topic
//! ```

mod error;
mod registry;

pub use error::SessionError;
pub use registry::SessionRegistry;
