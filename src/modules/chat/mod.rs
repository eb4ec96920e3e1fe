pub mod log;
pub mod relay;
pub mod task;
