//! Subcommand implementations.

mod exit;
mod run;
mod status;

pub use exit::run_exit;
pub use run::run_strategy;
pub use status::run_status;
