//! Execution plan
//!
//! The immutable result of compiling a [`Config`](crate::config::Config)
//! for one release tag. Every unit the pipeline runs is listed here; the
//! stages only read it.

mod compiler;
mod format;

use std::collections::BTreeMap;

use relforge_plugin::BuildInfo;
use serde::Serialize;

use crate::config::{ExtraFile, PluginConfig};
use crate::matcher::PathMatcher;

pub use compiler::{compile, PlanError, ARCHIVES_NAMESPACE, BUILDS_NAMESPACE};
pub use format::ArchiveFormat;

/// One target of the build matrix
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BuildArch {
    /// Build path segment from the configuration
    pub build_path: String,
    pub os: String,
    pub arch: String,
}

impl BuildArch {
    pub fn new(build_path: impl Into<String>, os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            build_path: build_path.into(),
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// `<build path>/<os>/<arch>`, the string archive patterns match against
    pub fn path(&self) -> String {
        format!("{}/{}/{}", self.build_path, self.os, self.arch)
    }

    /// Template context for this target
    pub fn build_info(&self, project: &str, tag: &str) -> BuildInfo {
        BuildInfo {
            project: project.to_string(),
            tag: tag.to_string(),
            os: self.os.clone(),
            arch: self.arch.clone(),
        }
    }
}

/// A resolved build unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildTarget {
    pub arch: BuildArch,
    pub binary: String,
    pub command: Vec<String>,
    pub env: BTreeMap<String, String>,
}

/// A resolved archive unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchivePath {
    pub arch: BuildArch,
    /// `<build path>/<os>/<arch>`
    pub path: String,
    /// Binary file name inside the build directory
    pub binary: String,
    /// Archive file name including the extension
    pub name: String,
    /// Additional file names for the same archive bytes
    pub aliases: Vec<String>,
}

impl ArchivePath {
    /// Every file name this unit produces, the primary name first
    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

/// One compiled archive definition and the units it expanded to
#[derive(Debug, Clone)]
pub struct CompiledArchive {
    pub index: usize,
    /// Identifies the definition in logs and errors
    pub label: String,
    pub format: ArchiveFormat,
    pub extension: String,
    pub binary_dir: String,
    pub extra_files: Vec<ExtraFile>,
    pub custom_settings: serde_json::Map<String, serde_json::Value>,
    /// Set only for plugin-backed definitions
    pub plugin: Option<PluginConfig>,
    pub matcher: PathMatcher,
    pub paths: Vec<ArchivePath>,
}

/// One compiled release definition
#[derive(Debug, Clone)]
pub struct CompiledRelease {
    pub index: usize,
    pub label: String,
    /// Directory below `releases/`
    pub dir: String,
    pub matcher: PathMatcher,
    /// Checksums file name, `None` when disabled
    pub checksums_name: Option<String>,
}

/// An archive file selected for a release
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseFile {
    /// `<build path>/<os>/<arch>` of the archive
    pub path: String,
    pub name: String,
}

/// Everything a run executes, compiled once and read-only afterwards
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub project: String,
    pub tag: String,
    pub builds: Vec<BuildTarget>,
    pub archives: Vec<CompiledArchive>,
    pub releases: Vec<CompiledRelease>,
}

impl ExecutionPlan {
    /// Plugins referenced by the plan, one per identity, in first-reference order
    pub fn plugins(&self) -> Vec<&PluginConfig> {
        let mut plugins: Vec<&PluginConfig> = Vec::new();
        for plugin in self.archives.iter().filter_map(|a| a.plugin.as_ref()) {
            if !plugins.iter().any(|p| p.id == plugin.id) {
                plugins.push(plugin);
            }
        }
        plugins
    }

    /// All archive units, definition by definition
    pub fn archive_units(&self) -> impl Iterator<Item = (&CompiledArchive, &ArchivePath)> {
        self.archives
            .iter()
            .flat_map(|a| a.paths.iter().map(move |p| (a, p)))
    }

    /// Archive files (names and aliases) selected by a release's patterns
    pub fn release_files(&self, release: &CompiledRelease) -> Vec<ReleaseFile> {
        let mut files = Vec::new();
        for (_, archive_path) in self.archive_units() {
            for name in archive_path.file_names() {
                let candidate = format!("{}/{}", archive_path.path, name);
                if release.matcher.is_match(&candidate) {
                    files.push(ReleaseFile {
                        path: archive_path.path.clone(),
                        name: name.to_string(),
                    });
                }
            }
        }
        files
    }

    /// Total number of archive units
    pub fn archive_count(&self) -> usize {
        self.archives.iter().map(|a| a.paths.len()).sum()
    }
}
