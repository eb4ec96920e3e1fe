pub mod commands;
pub mod model;

pub use commands::{stats, top};
