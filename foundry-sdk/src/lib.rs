//! foundry-sdk: platform-facing building blocks for the channel-factory bot.
//!
//! - [`types`]: snowflake identifiers and resource descriptions
//! - [`event`]: typed events delivered by the event source
//! - [`client`]: the [`client::ResourceClient`] trait every backend implements
//! - [`rest`]: HTTP backend for a Discord-style REST API
//! - [`sim`]: in-process backend with latency and fault injection

pub mod client;
pub mod event;
pub mod rest;
pub mod sim;
pub mod types;
