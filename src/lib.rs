//! Library crate for lan-recon-rs exposing reusable modules.
pub mod brute;
pub mod config;
pub mod discovery;
pub mod error;
pub mod logging;
pub mod net;
pub mod pipeline;
mod pool;
pub mod ports;
pub mod progress;
pub mod scanner;
pub mod targets;
pub mod types;
