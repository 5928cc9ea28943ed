//! Dist directory layout
//!
//! ```text
//! <dist>/<project>/<tag>/
//!   builds/<build path>/<os>/<arch>/<binary>
//!   archives/<build path>/<os>/<arch>/<archive name>
//!   releases/<dir>/<archive name>
//!   run_summary.json
//! ```

use std::path::{Path, PathBuf};

use crate::plan::{ArchivePath, BuildArch, BuildTarget, CompiledRelease};

/// File name of the run summary
pub const RUN_SUMMARY_FILE: &str = "run_summary.json";

/// Paths below the dist directory for one project and tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistLayout {
    dist: PathBuf,
    base: PathBuf,
}

impl DistLayout {
    pub fn new(dist: impl Into<PathBuf>, project: &str, tag: &str) -> Self {
        let dist = dist.into();
        let base = dist.join(project).join(tag);
        Self { dist, base }
    }

    /// The dist root as given
    pub fn dist(&self) -> &Path {
        &self.dist
    }

    /// `<dist>/<project>/<tag>`
    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn builds_dir(&self) -> PathBuf {
        self.base.join("builds")
    }

    pub fn archives_dir(&self) -> PathBuf {
        self.base.join("archives")
    }

    pub fn releases_dir(&self) -> PathBuf {
        self.base.join("releases")
    }

    pub fn build_dir(&self, arch: &BuildArch) -> PathBuf {
        join_arch(self.builds_dir(), arch)
    }

    /// Where a build target's binary is written
    pub fn build_output(&self, target: &BuildTarget) -> PathBuf {
        self.build_dir(&target.arch).join(&target.binary)
    }

    pub fn archive_dir(&self, arch: &BuildArch) -> PathBuf {
        join_arch(self.archives_dir(), arch)
    }

    /// Source binary of an archive unit
    pub fn archive_source(&self, path: &ArchivePath) -> PathBuf {
        self.build_dir(&path.arch).join(&path.binary)
    }

    pub fn release_dir(&self, release: &CompiledRelease) -> PathBuf {
        self.releases_dir().join(&release.dir)
    }

    pub fn run_summary(&self) -> PathBuf {
        self.base.join(RUN_SUMMARY_FILE)
    }

    /// Render a path for logs, with the dist root shortened to `$DIST`
    pub fn display(&self, path: &Path) -> String {
        match path.strip_prefix(&self.dist) {
            Ok(rest) if rest.as_os_str().is_empty() => "$DIST".to_string(),
            Ok(rest) => format!("$DIST/{}", rest.display()),
            Err(_) => path.display().to_string(),
        }
    }
}

fn join_arch(dir: PathBuf, arch: &BuildArch) -> PathBuf {
    dir.join(&arch.build_path).join(&arch.os).join(&arch.arch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_layout_paths() {
        let layout = DistLayout::new("/tmp/dist", "hugo", "v1.2.0");
        let target = BuildTarget {
            arch: BuildArch::new("unix", "linux", "amd64"),
            binary: "hugo".to_string(),
            command: vec![],
            env: BTreeMap::new(),
        };

        assert_eq!(
            layout.build_output(&target),
            PathBuf::from("/tmp/dist/hugo/v1.2.0/builds/unix/linux/amd64/hugo")
        );
        assert_eq!(
            layout.archive_dir(&target.arch),
            PathBuf::from("/tmp/dist/hugo/v1.2.0/archives/unix/linux/amd64")
        );
        assert_eq!(
            layout.run_summary(),
            PathBuf::from("/tmp/dist/hugo/v1.2.0/run_summary.json")
        );
    }

    #[test]
    fn test_display_shortens_dist() {
        let layout = DistLayout::new("/tmp/dist", "hugo", "v1");
        assert_eq!(layout.display(&layout.builds_dir()), "$DIST/hugo/v1/builds");
        assert_eq!(layout.display(Path::new("/tmp/dist")), "$DIST");
        assert_eq!(layout.display(Path::new("/elsewhere/x")), "/elsewhere/x");
    }
}
