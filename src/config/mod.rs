//! Release configuration
//!
//! Strictly decoded from `relforge.toml`, then completed with the global
//! defaults before it reaches the plan compiler.

mod env;
mod load;
mod model;

pub use env::{load_env_file, parse_env, ENV_FILE};
pub use load::{decode_error, decode_str, line_column, load_file, LoadError, ReportsPosition, DEFAULT_CONFIG_FILE};
pub use model::{
    Archive, ArchiveSettings, ArchiveType, Build, BuildOs, BuildSettings, Config, ExtraFile,
    PluginConfig, Release, ReleaseSettings, DEFAULT_CHECKSUMS_TEMPLATE, DEFAULT_NAME_TEMPLATE,
};
