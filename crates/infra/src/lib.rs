//! Infrastructure layer: event store, command pipeline, read models,
//! configuration, collaborators and the application services built on them.

pub mod collaborators;
pub mod command_dispatcher;
pub mod config;
pub mod event_store;
pub mod read_model;
pub mod sequence;
pub mod services;
pub mod side_effects;
pub mod streams;
pub mod transaction;

pub use command_dispatcher::{CommandDispatcher, DispatchError};
pub use config::EngineConfig;
pub use services::VenueEngine;
pub use transaction::Transaction;

#[cfg(test)]
mod integration_tests;
