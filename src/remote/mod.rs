pub mod power;
pub mod rcon;
pub mod ssh;

pub use rcon::{RconClient, RconError};
pub use ssh::SshClient;
