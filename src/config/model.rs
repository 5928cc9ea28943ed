//! Configuration tree
//!
//! Mirrors `relforge.toml`. Unknown fields are rejected. Global
//! `build_settings` and `archive_settings` act as shallow defaults: any
//! field a build or archive leaves empty is taken from the global table.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Default archive name template
pub const DEFAULT_NAME_TEMPLATE: &str = "{{ .Project }}_{{ .Tag }}_{{ .Os }}-{{ .Arch }}";

/// Default checksums file name template
pub const DEFAULT_CHECKSUMS_TEMPLATE: &str = "{{ .Project }}_{{ .Tag }}_checksums.txt";

/// Root of `relforge.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Project name, available to templates as `.Project`
    pub project: String,

    /// Defaults for every build
    #[serde(default)]
    pub build_settings: BuildSettings,

    /// Defaults for every archive
    #[serde(default)]
    pub archive_settings: ArchiveSettings,

    /// Target matrix
    #[serde(default)]
    pub builds: Vec<Build>,

    #[serde(default)]
    pub archives: Vec<Archive>,

    #[serde(default)]
    pub releases: Vec<Release>,
}

impl Config {
    /// Fill empty per-definition settings from the global defaults.
    pub fn apply_defaults(&mut self) {
        let mut build_defaults = self.build_settings.clone();
        if build_defaults.binary.is_empty() {
            build_defaults.binary = self.project.clone();
        }
        for build in &mut self.builds {
            build.build_settings.merge_defaults(&build_defaults);
        }

        let mut archive_defaults = self.archive_settings.clone();
        if archive_defaults.name_template.is_empty() {
            archive_defaults.name_template = DEFAULT_NAME_TEMPLATE.to_string();
        }
        for archive in &mut self.archives {
            archive.archive_settings.merge_defaults(&archive_defaults);
        }

        for release in &mut self.releases {
            if release.release_settings.checksums_template.is_empty() {
                release.release_settings.checksums_template = DEFAULT_CHECKSUMS_TEMPLATE.to_string();
            }
        }
    }
}

/// How a target binary is produced
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildSettings {
    /// Binary file name (defaults to the project name)
    pub binary: String,

    /// Build command and arguments. Runs with `RELFORGE_OS`,
    /// `RELFORGE_ARCH` and `RELFORGE_OUTPUT` set.
    pub command: Vec<String>,

    /// Extra environment for the build command
    pub env: BTreeMap<String, String>,
}

impl BuildSettings {
    pub fn merge_defaults(&mut self, defaults: &BuildSettings) {
        if self.binary.is_empty() {
            self.binary = defaults.binary.clone();
        }
        if self.command.is_empty() {
            self.command = defaults.command.clone();
        }
        for (k, v) in &defaults.env {
            self.env.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }
}

/// One entry of the target matrix
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Build {
    /// Build path segment, e.g. `unix`. Archive patterns match
    /// `<path>/<os>/<arch>`.
    pub path: String,

    #[serde(default)]
    pub os: Vec<BuildOs>,

    #[serde(default)]
    pub build_settings: BuildSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildOs {
    pub name: String,
    pub archs: Vec<String>,
}

/// Archive definition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Archive {
    /// Build path globs, each starting with `builds/`. Multiple paths are ANDed.
    pub paths: Vec<String>,

    #[serde(default)]
    pub archive_settings: ArchiveSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArchiveSettings {
    #[serde(rename = "type")]
    pub archive_type: ArchiveType,

    /// Directory inside the archive holding the binary
    pub binary_dir: String,

    pub name_template: String,

    /// Files added next to the binary
    pub extra_files: Vec<ExtraFile>,

    /// Literal replacements applied to the rendered name
    pub replacements: BTreeMap<String, String>,

    /// Each key found in the final name yields an alias with the key replaced
    pub alias_replacements: BTreeMap<String, String>,

    /// Plugin used when the format is `plugin`
    pub plugin: PluginConfig,

    /// Format-specific settings, passed through to the encoder or plugin
    pub custom_settings: serde_json::Map<String, serde_json::Value>,
}

impl ArchiveSettings {
    pub fn merge_defaults(&mut self, defaults: &ArchiveSettings) {
        if self.archive_type.is_zero() {
            self.archive_type = defaults.archive_type.clone();
        }
        if self.binary_dir.is_empty() {
            self.binary_dir = defaults.binary_dir.clone();
        }
        if self.name_template.is_empty() {
            self.name_template = defaults.name_template.clone();
        }
        if self.extra_files.is_empty() {
            self.extra_files = defaults.extra_files.clone();
        }
        if self.replacements.is_empty() {
            self.replacements = defaults.replacements.clone();
        }
        if self.alias_replacements.is_empty() {
            self.alias_replacements = defaults.alias_replacements.clone();
        }
        if self.plugin.is_zero() {
            self.plugin = defaults.plugin.clone();
        }
        if self.custom_settings.is_empty() {
            self.custom_settings = defaults.custom_settings.clone();
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArchiveType {
    /// `tar`, `zip` or `plugin`
    pub format: String,
    /// File extension including the dot, e.g. `.tar`
    pub extension: String,
}

impl ArchiveType {
    pub fn is_zero(&self) -> bool {
        self.format.is_empty() && self.extension.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtraFile {
    /// Path relative to the project directory
    pub source_path: String,
    /// Path inside the archive
    pub target_path: String,
    /// Unix mode, defaults to 0o644
    #[serde(default)]
    pub mode: Option<u32>,
}

/// External archive plugin
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PluginConfig {
    /// Identity; definitions sharing an id share one process
    pub id: String,
    /// Executable to launch
    pub command: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    /// Working directory, relative to the project directory
    pub dir: Option<String>,
}

impl PluginConfig {
    pub fn is_zero(&self) -> bool {
        self.id.is_empty() && self.command.is_empty()
    }
}

/// Release definition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Release {
    /// Archive path globs, each starting with `archives/`
    pub paths: Vec<String>,

    /// Directory below `releases/`
    pub dir: String,

    #[serde(default)]
    pub release_settings: ReleaseSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReleaseSettings {
    pub checksums_template: String,
    /// Skip writing the checksums file
    pub skip_checksums: bool,
}
