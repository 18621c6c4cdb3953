//! Encrypted, retained backups of a MySQL database, plus restore from them.

pub mod backup;
pub mod config;
pub mod credentials;
pub mod errors;
pub mod events;
pub mod orchestrator;
pub mod process;
pub mod profile;
pub mod restore;
pub mod utils;
