//! # conclave-core
//!
//! Foundation types shared by every conclave crate.
//!
//! - **Branded IDs**: [`ids::SessionId`], [`ids::UtteranceId`], [`ids::ConnectionId`]
//! - **Meeting model**: [`meeting::Role`], [`meeting::Stage`], [`meeting::Utterance`]
//! - **Wire events**: [`events::MeetingEvent`] pushed to observers
//! - **Control commands**: [`control::ControlCommand`] received from observers
//! - **Logging**: [`logging::init_subscriber`] bootstrap for `tracing`
//!
//! ## Crate Position
//!
//! Leaf crate. Depends on nothing internal; every other conclave crate
//! depends on it.

#![deny(unsafe_code)]

pub mod control;
pub mod events;
pub mod ids;
pub mod logging;
pub mod meeting;

pub use control::ControlCommand;
pub use events::MeetingEvent;
pub use ids::{ConnectionId, SessionId, UtteranceId};
pub use meeting::{Role, Stage, Utterance};
