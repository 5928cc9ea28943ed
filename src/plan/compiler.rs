//! Plan compilation
//!
//! Validates the configuration top to bottom and expands it into an
//! [`ExecutionPlan`]. The first structural error aborts compilation; nothing
//! is started or written here.

use std::collections::HashMap;

use relforge_plugin::BuildInfo;

use super::{
    ArchiveFormat, ArchivePath, BuildArch, BuildTarget, CompiledArchive, CompiledRelease,
    ExecutionPlan,
};
use crate::config::{Archive, Build, Config, Release};
use crate::matcher::{strip_namespace, MatcherError, PathMatcher};
use crate::template::{Replacer, Template, TemplateError};

/// Prefix every archive path pattern must carry
pub const BUILDS_NAMESPACE: &str = "builds/";

/// Prefix every release path pattern must carry
pub const ARCHIVES_NAMESPACE: &str = "archives/";

/// Structural configuration errors
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("project name is required")]
    NoProject,

    #[error("release tag is required")]
    NoTag,

    #[error("{what}: paths must start with {prefix}, got {pattern:?}")]
    MissingPrefix {
        what: String,
        prefix: &'static str,
        pattern: String,
    },

    #[error("{what}: failed to compile paths: {source}")]
    Matcher { what: String, source: MatcherError },

    #[error("{what}: type has no format")]
    NoFormat { what: String },

    #[error("{what}: type has no extension")]
    NoExtension { what: String },

    #[error("{what}: {reason}")]
    UnknownFormat { what: String, reason: String },

    #[error("{what}: plugin format requires a plugin {field}")]
    IncompletePlugin { what: String, field: &'static str },

    #[error("{what}: replacement keys must not be empty")]
    EmptyReplacementKey { what: String },

    #[error("{what}: template {template:?}: {source}")]
    Template {
        what: String,
        template: String,
        source: TemplateError,
    },

    #[error("{what}: {reason}")]
    InvalidBuild { what: String, reason: String },

    #[error("{what}: {reason}")]
    InvalidRelease { what: String, reason: String },

    #[error("{what}: {field} {value:?} {reason}")]
    UnsafePath {
        what: String,
        field: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("archive {name:?} for {path} is produced by both {first} and {second}")]
    DuplicateArchive {
        path: String,
        name: String,
        first: String,
        second: String,
    },
}

/// Compile a configuration (with defaults applied) into an execution plan.
pub fn compile(config: &Config, tag: &str) -> Result<ExecutionPlan, PlanError> {
    if config.project.is_empty() {
        return Err(PlanError::NoProject);
    }
    if tag.is_empty() {
        return Err(PlanError::NoTag);
    }
    check_segment("project", "project", &config.project)?;
    check_segment("tag", "tag", tag)?;

    let matrix = compile_builds(&config.builds)?;

    let mut archives = Vec::with_capacity(config.archives.len());
    for (index, archive) in config.archives.iter().enumerate() {
        archives.push(compile_archive(index, archive, &matrix, &config.project, tag)?);
    }
    check_unique_outputs(&archives)?;

    let mut releases: Vec<CompiledRelease> = Vec::with_capacity(config.releases.len());
    for (index, release) in config.releases.iter().enumerate() {
        let compiled = compile_release(index, release, &config.project, tag)?;
        if let Some(first) = releases.iter().find(|r| r.dir == compiled.dir) {
            return Err(PlanError::InvalidRelease {
                what: compiled.label,
                reason: format!("dir {:?} is already used by {}", first.dir, first.label),
            });
        }
        releases.push(compiled);
    }

    Ok(ExecutionPlan {
        project: config.project.clone(),
        tag: tag.to_string(),
        builds: matrix,
        archives,
        releases,
    })
}

fn compile_builds(builds: &[Build]) -> Result<Vec<BuildTarget>, PlanError> {
    let mut targets: Vec<BuildTarget> = Vec::new();

    for (index, build) in builds.iter().enumerate() {
        let what = format!("builds[{}] {:?}", index, build.path);
        let invalid = |reason: &str| PlanError::InvalidBuild {
            what: what.clone(),
            reason: reason.to_string(),
        };

        if build.path.is_empty() {
            return Err(invalid("path is required"));
        }
        if build.build_settings.command.is_empty() {
            return Err(invalid("build_settings.command is required"));
        }
        if build.build_settings.binary.is_empty() {
            return Err(invalid("build_settings.binary is required"));
        }

        check_segment(&what, "path", &build.path)?;
        check_segment(&what, "binary", &build.build_settings.binary)?;

        for os in &build.os {
            if os.name.is_empty() {
                return Err(invalid("os name is required"));
            }
            check_segment(&what, "os", &os.name)?;
            if os.archs.is_empty() {
                return Err(invalid(&format!("os {:?} has no archs", os.name)));
            }
            for arch in &os.archs {
                if arch.is_empty() {
                    return Err(invalid(&format!("os {:?} has an empty arch", os.name)));
                }
                check_segment(&what, "arch", arch)?;
                let arch = BuildArch::new(&build.path, &os.name, arch);
                if targets.iter().any(|t| t.arch == arch) {
                    return Err(invalid(&format!("target {} is defined twice", arch.path())));
                }
                targets.push(BuildTarget {
                    arch,
                    binary: build.build_settings.binary.clone(),
                    command: build.build_settings.command.clone(),
                    env: build.build_settings.env.clone(),
                });
            }
        }
    }

    Ok(targets)
}

fn compile_archive(
    index: usize,
    archive: &Archive,
    matrix: &[BuildTarget],
    project: &str,
    tag: &str,
) -> Result<CompiledArchive, PlanError> {
    let what = format!("archives[{}] {:?}", index, archive.paths);
    let settings = &archive.archive_settings;

    // 1. Paths
    let patterns = strip_namespace(&archive.paths, BUILDS_NAMESPACE).map_err(|pattern| {
        PlanError::MissingPrefix {
            what: what.clone(),
            prefix: BUILDS_NAMESPACE,
            pattern,
        }
    })?;
    let matcher = PathMatcher::new(&patterns).map_err(|source| PlanError::Matcher {
        what: what.clone(),
        source,
    })?;

    // 2. Type
    let archive_type = &settings.archive_type;
    if archive_type.format.is_empty() {
        return Err(PlanError::NoFormat { what });
    }
    if archive_type.extension.is_empty() {
        return Err(PlanError::NoExtension { what });
    }
    let format: ArchiveFormat = archive_type
        .format
        .parse()
        .map_err(|reason| PlanError::UnknownFormat {
            what: what.clone(),
            reason,
        })?;

    // 3. Plugin
    let plugin = if format.is_plugin() {
        if settings.plugin.id.is_empty() {
            return Err(PlanError::IncompletePlugin { what, field: "id" });
        }
        if settings.plugin.command.is_empty() {
            return Err(PlanError::IncompletePlugin { what, field: "command" });
        }
        Some(settings.plugin.clone())
    } else {
        None
    };

    // 4. Replacements
    if settings.replacements.keys().any(String::is_empty)
        || settings.alias_replacements.keys().any(String::is_empty)
    {
        return Err(PlanError::EmptyReplacementKey { what });
    }
    let replacer = Replacer::new(settings.replacements.iter().map(|(k, v)| (k.as_str(), v.as_str())));

    // 5. Expand over the matrix
    let template = Template::parse(&settings.name_template).map_err(|source| PlanError::Template {
        what: what.clone(),
        template: settings.name_template.clone(),
        source,
    })?;

    let mut paths = Vec::new();
    for target in matrix {
        let arch_path = target.arch.path();
        if !matcher.is_match(&arch_path) {
            continue;
        }

        let info = target.arch.build_info(project, tag);
        let rendered = template.render(&info).map_err(|source| PlanError::Template {
            what: what.clone(),
            template: settings.name_template.clone(),
            source,
        })?;
        let name = format!("{}{}", replacer.replace(&rendered), archive_type.extension);
        check_segment(&what, "archive name", &name)?;

        let mut aliases: Vec<String> = Vec::new();
        for (from, to) in &settings.alias_replacements {
            if !name.contains(from.as_str()) {
                continue;
            }
            let alias = name.replace(from.as_str(), to);
            if alias != name && !aliases.contains(&alias) {
                check_segment(&what, "alias", &alias)?;
                aliases.push(alias);
            }
        }

        paths.push(ArchivePath {
            arch: target.arch.clone(),
            path: arch_path,
            binary: target.binary.clone(),
            name,
            aliases,
        });
    }

    Ok(CompiledArchive {
        index,
        label: what,
        format,
        extension: archive_type.extension.clone(),
        binary_dir: settings.binary_dir.clone(),
        extra_files: settings.extra_files.clone(),
        custom_settings: settings.custom_settings.clone(),
        plugin,
        matcher,
        paths,
    })
}

fn check_unique_outputs(archives: &[CompiledArchive]) -> Result<(), PlanError> {
    let mut seen: HashMap<(String, String), &str> = HashMap::new();
    for archive in archives {
        for path in &archive.paths {
            for name in path.file_names() {
                let key = (path.path.clone(), name.to_string());
                if let Some(first) = seen.get(&key) {
                    return Err(PlanError::DuplicateArchive {
                        path: key.0,
                        name: key.1,
                        first: first.to_string(),
                        second: archive.label.clone(),
                    });
                }
                seen.insert(key, archive.label.as_str());
            }
        }
    }
    Ok(())
}

/// Every value that becomes a path component under the dist directory must
/// name exactly one entry inside its parent.
fn check_segment(what: &str, field: &'static str, value: &str) -> Result<(), PlanError> {
    let reason = if value.is_empty() {
        "is empty"
    } else if value == "." || value == ".." {
        "is not a file name"
    } else if value.contains(['/', '\\']) {
        "contains a path separator"
    } else if value.contains('\0') {
        "contains a NUL byte"
    } else {
        return Ok(());
    };
    Err(PlanError::UnsafePath {
        what: what.to_string(),
        field,
        value: value.to_string(),
        reason,
    })
}

fn compile_release(
    index: usize,
    release: &Release,
    project: &str,
    tag: &str,
) -> Result<CompiledRelease, PlanError> {
    let what = format!("releases[{}] {:?}", index, release.paths);

    let patterns = strip_namespace(&release.paths, ARCHIVES_NAMESPACE).map_err(|pattern| {
        PlanError::MissingPrefix {
            what: what.clone(),
            prefix: ARCHIVES_NAMESPACE,
            pattern,
        }
    })?;
    let matcher = PathMatcher::new(&patterns).map_err(|source| PlanError::Matcher {
        what: what.clone(),
        source,
    })?;

    if release.dir.is_empty() {
        return Err(PlanError::InvalidRelease {
            what,
            reason: "dir is required".to_string(),
        });
    }
    check_segment(&what, "dir", &release.dir)?;

    let settings = &release.release_settings;
    let checksums_name = if settings.skip_checksums {
        None
    } else {
        let info = BuildInfo {
            project: project.to_string(),
            tag: tag.to_string(),
            ..Default::default()
        };
        let name = Template::parse(&settings.checksums_template)
            .and_then(|t| t.render(&info))
            .map_err(|source| PlanError::Template {
                what: what.clone(),
                template: settings.checksums_template.clone(),
                source,
            })?;
        check_segment(&what, "checksums name", &name)?;
        Some(name)
    };

    Ok(CompiledRelease {
        index,
        label: what,
        dir: release.dir.clone(),
        matcher,
        checksums_name,
    })
}
