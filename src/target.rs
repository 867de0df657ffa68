// ============================================================================
// 模块目标 - ModuleTarget 路径解析与模块发现
// ============================================================================

use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::ApiConfig;

/// One unit under test: `<project>/<root_dir>/<module>`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ModuleTarget {
    pub root_dir: String,
    pub module: String,
}

impl ModuleTarget {
    pub fn new(root_dir: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            root_dir: root_dir.into(),
            module: module.into(),
        }
    }

    pub fn module_dir(&self, config: &ApiConfig) -> PathBuf {
        normalize(&config.project_dir.join(&self.root_dir).join(&self.module))
    }

    pub fn libs_dir(&self, config: &ApiConfig) -> PathBuf {
        normalize(&self.module_dir(config).join(&config.libs_dir))
    }

    /// Override sources in merge order
    pub fn override_paths(&self, config: &ApiConfig) -> Vec<PathBuf> {
        let libs = self.libs_dir(config);
        config
            .visibility_files
            .iter()
            .map(|f| normalize(&libs.join(f)))
            .collect()
    }

    pub fn reference_path(&self, config: &ApiConfig) -> PathBuf {
        config
            .resolved_reference_dir()
            .join(format!("{}.txt", self.module))
    }
}

impl fmt::Display for ModuleTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.root_dir, self.module)
    }
}

/// Lexical `..`/`.` folding (no filesystem access, symlinks untouched)
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let can_pop = matches!(
                    out.components().next_back(),
                    Some(Component::Normal(_))
                );
                if can_pop {
                    out.pop();
                } else {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Every `<root>/<dir>` that carries the module marker and is not ignored,
/// sorted by (root, module). Missing roots are skipped with a warning.
pub fn discover_modules(config: &ApiConfig) -> Vec<ModuleTarget> {
    let mut modules = Vec::new();

    for root in &config.module_roots {
        let root_path = config.project_dir.join(root);
        if !root_path.is_dir() {
            warn!(root = %root_path.display(), "module root is not a directory");
            continue;
        }

        for entry in WalkDir::new(&root_path)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_dir())
        {
            let name = entry.file_name().to_string_lossy().to_string();
            if config.module_ignore.contains(&name) {
                debug!(module = %name, "ignored module");
                continue;
            }
            if entry.path().join(&config.module_marker).exists() {
                modules.push(ModuleTarget::new(root.clone(), name));
            }
        }
    }

    modules.sort();
    modules
}
