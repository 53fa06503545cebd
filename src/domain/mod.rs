// Domain layer - pure charging decisions, no I/O
pub mod auto_reset;
pub mod policy;
pub mod schedule;
pub mod suggestion;
pub mod telemetry;
