//! Dreamlens core: dream classification, archetype analytics and the
//! metrics that observe them. The HTTP surface lives in `dreamlens-server`.

pub mod commands;
pub mod config;
pub mod error;
pub mod services;
pub mod utils;

pub use commands::Commands;
pub use config::CoreConfig;
