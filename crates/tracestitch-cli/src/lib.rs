// The CLI owns no correlation logic. It resolves configuration, builds the
// output sinks for each planned run and hands everything to the runtime.

mod args;
mod commands;
mod handlers;
pub mod logging;
pub mod sinks;

pub use args::{Cli, Commands, ConfigCommand, ConvertArgs, InspectFormat, LogLevel, OutputKind};
pub use commands::run;
