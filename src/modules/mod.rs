pub mod chat;
pub mod fun;
pub mod info;
pub mod roles;
pub mod server;
pub mod stats;
pub mod system;
pub mod watchdog;
