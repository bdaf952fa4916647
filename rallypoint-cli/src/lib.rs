pub mod infrastructure;
pub mod simulation;

pub use infrastructure::{CliError, LogConfig, Result};
pub use simulation::{RuntimeClock, SimulationOptions, SimulationReport};
