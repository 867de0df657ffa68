// ============================================================================
// 配置模块 - api.properties
// ============================================================================
//
// Process-wide, read-only configuration. Built once at startup and passed by
// reference into every module check.
//
// The file follows java.util.Properties syntax: `key=value`, `key: value` or
// `key value`, `#` and `!` comments, `\` escapes (`\t`, `\uXXXX`, `\=`, ...)
// and a trailing unescaped `\` continuing the entry on the next line. List
// values are space-separated.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::api::to_binary_package;
use crate::error::{ApiCheckError, Result};
use crate::leak::DEFAULT_FORBIDDEN_SIGNATURE;

pub const DEFAULT_CONFIG_FILE: &str = "api.properties";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base directory for module roots and relative paths
    pub project_dir: PathBuf,
    /// Dotted package prefixes excluded from the API (`packages.internal`)
    pub internal_packages: Vec<String>,
    /// Directories scanned for modules (`module.roots`)
    pub module_roots: Vec<String>,
    /// File whose presence marks a module directory (`module.marker`)
    pub module_marker: String,
    /// Module names never checked (`module.ignore`)
    pub module_ignore: BTreeSet<String>,
    /// Forbidden byte signature (`leak.signature`)
    pub leak_signature: String,
    /// Where `<module>.txt` reference dumps live (`reference.dir`)
    pub reference_dir: PathBuf,
    /// Jar directory, relative to the module directory
    pub libs_dir: PathBuf,
    /// Override sources, relative to the libs directory, merged in order
    pub visibility_files: Vec<PathBuf>,
    /// Restrict the API to packages exported by `module-info.class` (`module.exports`)
    pub honor_module_exports: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            project_dir: PathBuf::from("."),
            internal_packages: Vec::new(),
            module_roots: vec![".".to_string()],
            module_marker: "build.gradle".to_string(),
            module_ignore: BTreeSet::new(),
            leak_signature: DEFAULT_FORBIDDEN_SIGNATURE.to_string(),
            reference_dir: PathBuf::from("reference-public-api"),
            libs_dir: PathBuf::from("build/libs"),
            visibility_files: vec![PathBuf::from("../visibilities.json")],
            honor_module_exports: false,
        }
    }
}

impl ApiConfig {
    /// Load `api.properties`; keys that are absent keep their defaults
    pub fn load(path: &Path, project_dir: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| ApiCheckError::io(path, e))?;
        Self::from_properties(&content, path).map(|c| c.with_project_dir(project_dir))
    }

    /// Look for `api.properties` in the project directory, fall back to defaults
    pub fn discover(project_dir: &Path) -> Result<Self> {
        let candidate = project_dir.join(DEFAULT_CONFIG_FILE);
        if candidate.is_file() {
            Self::load(&candidate, project_dir)
        } else {
            Ok(Self::default().with_project_dir(project_dir))
        }
    }

    pub fn from_properties(content: &str, source: &Path) -> Result<Self> {
        let invalid = |detail: String| ApiCheckError::Config {
            path: source.to_path_buf(),
            detail,
        };

        let mut config = Self::default();
        for (key, value) in parse_properties(content) {
            match key.as_str() {
                "packages.internal" => config.internal_packages = split_list(&value),
                "module.roots" => config.module_roots = split_list(&value),
                "module.marker" => config.module_marker = value,
                "module.ignore" => config.module_ignore = split_list(&value).into_iter().collect(),
                "leak.signature" => config.leak_signature = value,
                "reference.dir" => config.reference_dir = PathBuf::from(value),
                "libs.dir" => config.libs_dir = PathBuf::from(value),
                "visibility.files" => {
                    config.visibility_files = split_list(&value).into_iter().map(PathBuf::from).collect()
                }
                "module.exports" => {
                    config.honor_module_exports = match value.to_lowercase().as_str() {
                        "true" => true,
                        "false" => false,
                        other => return Err(invalid(format!("module.exports must be true or false, got '{other}'"))),
                    }
                }
                other => warn!(key = other, "ignoring unknown configuration key"),
            }
        }

        if config.leak_signature.is_empty() {
            return Err(invalid("leak.signature must not be empty".to_string()));
        }
        if config.module_marker.is_empty() {
            return Err(invalid("module.marker must not be empty".to_string()));
        }
        Ok(config)
    }

    pub fn with_project_dir(mut self, project_dir: &Path) -> Self {
        self.project_dir = project_dir.to_path_buf();
        self
    }

    /// Internal packages in binary form (`com/foo/internal`)
    pub fn internal_package_prefixes(&self) -> Vec<String> {
        self.internal_packages
            .iter()
            .map(|p| to_binary_package(p))
            .filter(|p| !p.is_empty())
            .collect()
    }

    pub fn resolved_reference_dir(&self) -> PathBuf {
        self.project_dir.join(&self.reference_dir)
    }

    pub fn leak_signature_bytes(&self) -> &[u8] {
        self.leak_signature.as_bytes()
    }
}

fn split_list(value: &str) -> Vec<String> {
    value.split_whitespace().map(str::to_string).collect()
}

/// `key -> value`; later duplicates win
fn parse_properties(content: &str) -> BTreeMap<String, String> {
    let mut props = BTreeMap::new();
    let mut logical = String::new();
    let mut continued = false;

    for raw in content.lines() {
        let line = raw.trim_start();
        if !continued && (line.is_empty() || line.starts_with('#') || line.starts_with('!')) {
            continue;
        }

        continued = ends_with_continuation(line);
        if continued {
            logical.push_str(&line[..line.len() - 1]);
            continue;
        }
        logical.push_str(line);
        let (key, value) = split_entry(&logical);
        props.insert(key, value);
        logical.clear();
    }

    if continued && !logical.trim().is_empty() {
        let (key, value) = split_entry(&logical);
        props.insert(key, value);
    }
    props
}

/// Odd number of trailing backslashes; `\\` is an escaped backslash
fn ends_with_continuation(line: &str) -> bool {
    line.bytes().rev().take_while(|&b| b == b'\\').count() % 2 == 1
}

/// Key ends at the first unescaped `=`, `:` or whitespace. Whitespace around
/// the separator is skipped and trailing whitespace of the value is dropped.
fn split_entry(line: &str) -> (String, String) {
    let mut key_end = line.len();
    let mut value_start = line.len();
    let mut escaped = false;

    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' => {
                key_end = i;
                value_start = i + 1;
                break;
            }
            c if c.is_whitespace() => {
                key_end = i;
                let rest = line[i..].trim_start();
                value_start = line.len() - rest.len();
                if rest.starts_with('=') || rest.starts_with(':') {
                    value_start += 1;
                }
                break;
            }
            _ => {}
        }
    }

    let key = unescape(&line[..key_end]);
    let value = unescape(line[value_start..].trim());
    (key, value)
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\u{000C}'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) if hex.len() == 4 => out.push(decoded),
                    _ => {
                        out.push_str("\\u");
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}
