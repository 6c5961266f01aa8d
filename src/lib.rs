// ===============================
// src/lib.rs
// ===============================
pub mod automation;
pub mod config;
pub mod corewriter;  // placeIoc / approveBuilderFee via HyperEVM
pub mod domain;
pub mod error;
pub mod exchange;
pub mod fixed;
pub mod gateway;     // Transport: HTTP / dry-run / mock
pub mod info;
pub mod lending;
pub mod metrics;
pub mod morpho;
pub mod order;
pub mod poller;
pub mod recorder;
pub mod signer;
pub mod trader;
pub mod wallet;

pub use error::{Error, Result};
