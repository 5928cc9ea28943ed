//! `relforge.env`
//!
//! Optional `KEY=VALUE` file in the project directory. Values only fill
//! variables that are unset or empty in the environment.

use std::fs;
use std::io;
use std::path::Path;

/// Env file name, relative to the project directory
pub const ENV_FILE: &str = "relforge.env";

/// Parse env file contents. Blank lines and `#` comments are skipped,
/// a leading `export ` is allowed and matching quotes around the value
/// are removed.
pub fn parse_env(source: &str) -> Vec<(String, String)> {
    let mut vars = Vec::new();
    for line in source.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        vars.push((key.to_string(), unquote(value.trim()).to_string()));
    }
    vars
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Load `path` into the process environment without overriding non-empty
/// variables. A missing file is not an error. Returns how many variables
/// were set.
///
/// Must run before any threads are started.
pub fn load_env_file(path: &Path) -> io::Result<usize> {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut set = 0;
    for (key, value) in parse_env(&source) {
        if std::env::var_os(&key).map_or(true, |v| v.is_empty()) {
            std::env::set_var(&key, value);
            set += 1;
        }
    }
    Ok(set)
}
