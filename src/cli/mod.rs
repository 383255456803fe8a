pub mod actions;
pub mod commands;
pub mod dispatch;
pub mod telemetry;

pub use self::dispatch::start;
