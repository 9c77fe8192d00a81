//! Passive network asset discovery: observe traffic on a mirror/SPAN
//! port (or replay a capture file), parse link- and application-layer
//! protocols, and correlate the observations into long-lived asset
//! records persisted to a document store. No packet is ever sent.

pub mod alerting;
pub mod cli;
pub mod config;
pub mod domain;
pub mod engine;
pub mod network;
pub mod storage;

pub use config::Config;
pub use domain::manager::AssetManager;
pub use domain::models::{Asset, AssetStats, Observation};
pub use engine::Engine;
