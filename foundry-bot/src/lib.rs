//! foundry-bot: turns "factory" voice channels into on-demand room spawners.
//!
//! When a member joins a factory, a sibling channel named after the factory
//! with the next index is created and the member is moved into it. Removing a
//! factory deletes it along with every channel it ever spawned.
//!
//! - [`registry`]: factory → children bookkeeping
//! - [`sequencer`]: per-factory FIFO lanes
//! - [`orchestrator`]: provisioning, teardown and factory creation workflows
//! - [`commands`]: operator command parsing and replies
//! - [`bot`]: the event loop
//! - [`source`]: line-delimited JSON event input
//! - [`config`]: command line and TOML configuration

pub mod bot;
pub mod commands;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod registry;
pub mod sequencer;
pub mod source;
