// ============================================================================
// Jar 读取模块 - Archive Locator & Reader
// ============================================================================

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;
use zip::ZipArchive;

use crate::error::{ApiCheckError, Result};

pub const CLASS_SUFFIX: &str = ".class";

/// Platform qualifier used by multiplatform builds (`<module>-jvm-<version>.jar`)
pub const PLATFORM_QUALIFIER: &str = "jvm";

/// Upper bound on buffer preallocation from an entry's declared size
const MAX_PREALLOC: usize = 1 << 20;

/// Classified side artifacts that never hold the module's classes
static CLASSIFIED_VARIANT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-(sources|javadoc|tests)\.jar$").unwrap());

/// Outcome of picking the module jar among directory entries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveSelection {
    Single(String),
    NotFound(Vec<String>),
    Ambiguous(Vec<String>),
}

fn module_pattern(module: &str) -> String {
    format!("^{}-.+\\.jar$", regex::escape(module))
}

/// Pure selection over file names:
/// `<module>-<version>.jar`, minus sources/javadoc/tests/metadata variants,
/// narrowed to `<module>-jvm-*` when several candidates remain.
pub fn select_archive<I, S>(module: &str, file_names: I) -> ArchiveSelection
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    // the escaped module name always forms a valid pattern
    let Ok(pattern) = Regex::new(&module_pattern(module)) else {
        return ArchiveSelection::NotFound(Vec::new());
    };

    let mut candidates: Vec<String> = file_names
        .into_iter()
        .map(Into::into)
        .filter(|name| {
            pattern.is_match(name)
                && !CLASSIFIED_VARIANT.is_match(name)
                && !name.contains("-metadata-")
        })
        .collect();
    candidates.sort();

    if candidates.len() > 1 {
        // maybe multiplatform?
        let qualified = format!("{module}-{PLATFORM_QUALIFIER}-");
        let narrowed: Vec<String> = candidates
            .iter()
            .filter(|name| name.starts_with(&qualified))
            .cloned()
            .collect();
        if narrowed.is_empty() {
            return ArchiveSelection::Ambiguous(candidates);
        }
        candidates = narrowed;
    }

    match candidates.len() {
        1 => ArchiveSelection::Single(candidates.remove(0)),
        0 => ArchiveSelection::NotFound(candidates),
        _ => ArchiveSelection::Ambiguous(candidates),
    }
}

/// Find the single jar for `module` inside its libs directory
pub fn locate_archive(libs_dir: &Path, module: &str) -> Result<PathBuf> {
    let not_found = |candidates: Vec<String>| ApiCheckError::ArchiveNotFound {
        dir: libs_dir.to_path_buf(),
        pattern: module_pattern(module),
        candidates,
    };

    let entries = std::fs::read_dir(libs_dir).map_err(|_| not_found(Vec::new()))?;
    let names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect();

    match select_archive(module, names) {
        ArchiveSelection::Single(name) => {
            let path = libs_dir.join(name);
            debug!(archive = %path.display(), "located module archive");
            Ok(path)
        }
        ArchiveSelection::NotFound(candidates) => Err(not_found(candidates)),
        ArchiveSelection::Ambiguous(candidates) => Err(ApiCheckError::AmbiguousArchive {
            dir: libs_dir.to_path_buf(),
            candidates,
        }),
    }
}

/// Raw bytes of one `.class` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawUnit {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// An open jar. The file handle is released when this value is dropped.
pub struct ClassArchive {
    path: PathBuf,
    zip: ZipArchive<File>,
}

impl ClassArchive {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| ApiCheckError::io(path, e))?;
        let zip = ZipArchive::new(file).map_err(|source| ApiCheckError::Archive {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            zip,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lazily yields every `.class` entry in archive order
    pub fn class_entries(&mut self) -> ClassEntries<'_> {
        ClassEntries {
            path: &self.path,
            zip: &mut self.zip,
            index: 0,
        }
    }

    pub fn read_units(&mut self) -> Result<Vec<RawUnit>> {
        self.class_entries().collect()
    }
}

pub struct ClassEntries<'a> {
    path: &'a Path,
    zip: &'a mut ZipArchive<File>,
    index: usize,
}

impl Iterator for ClassEntries<'_> {
    type Item = Result<RawUnit>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.index < self.zip.len() {
            let i = self.index;
            self.index += 1;

            let mut entry = match self.zip.by_index(i) {
                Ok(entry) => entry,
                Err(source) => {
                    return Some(Err(ApiCheckError::Archive {
                        path: self.path.to_path_buf(),
                        source,
                    }))
                }
            };
            if entry.is_dir() || !entry.name().ends_with(CLASS_SUFFIX) {
                continue;
            }

            let name = entry.name().to_string();
            let mut bytes = Vec::with_capacity(initial_capacity(entry.size()));
            if let Err(e) = entry.read_to_end(&mut bytes) {
                return Some(Err(ApiCheckError::io(self.path.join(&name), e)));
            }
            return Some(Ok(RawUnit { name, bytes }));
        }
        None
    }
}

/// Declared sizes come from the archive and are not trusted past `MAX_PREALLOC`
fn initial_capacity(declared: u64) -> usize {
    declared.min(MAX_PREALLOC as u64) as usize
}
