//! # Parley
//!
//! A WebSocket server for debate rooms: two sides and their spectators
//! move through timed phases and vote at the end, or a free room simply
//! chats for a fixed time.
//!
//! This crate is the gateway. It speaks JSON frames over WebSocket, keeps
//! each connection's topic subscriptions in a
//! [`SessionRegistry`](parley_session::SessionRegistry), and routes
//! requests to a [`RoomCoordinator`](parley_room::RoomCoordinator).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use parley::prelude::*;
//!
//! # async fn run() -> Result<(), ParleyError> {
//! let server = ParleyServer::builder().bind("0.0.0.0:8080").build().await?;
//! server.run().await
//! # }
//! ```

mod error;
mod frames;
mod handler;
mod relay;
mod server;

pub use error::ParleyError;
pub use frames::{ClientFrame, ErrorBody, Outcome, ServerFrame};
pub use relay::Relay;
pub use server::{ParleyServer, ParleyServerBuilder};

/// Everything needed to run a server and talk to it.
pub mod prelude {
    pub use crate::{ClientFrame, ParleyError, ParleyServer, ParleyServerBuilder, ServerFrame};
    pub use parley_protocol::{
        Broadcast, ChatMode, Command, CreateRoomRequest, DebateSettings, JoinRequest, Role,
        RoomId, Topic,
    };
    pub use parley_room::{CoordinatorConfig, RoomCoordinator};
}
