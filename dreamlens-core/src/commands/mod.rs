// src/commands/mod.rs
pub mod init;
mod api;

pub use api::Commands;

pub use init::{dreamlens_root, ensure_initialized, InitReport};
