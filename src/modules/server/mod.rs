pub mod backup;
pub mod commands;

pub use commands::{backup, docker, mcd, server, wake, whitelist};
