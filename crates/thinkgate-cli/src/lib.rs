pub mod commands;
pub mod error;
pub mod output;

pub use commands::{LoadedCommand, QueryCommand, TrackedCommand, UnloadCommand};
pub use error::{CliError, CliResult};
pub use output::{OutputFormat, format_idle, format_size, format_timestamp};
