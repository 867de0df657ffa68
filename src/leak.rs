// ============================================================================
// 依赖泄漏扫描 - Forbidden Signature Scanner
// ============================================================================
//
// Compile-time-only helpers (atomicfu by default) must be erased from the
// shipped bytecode. Any surviving type reference shows up verbatim as a
// descriptor fragment (`Lkotlinx/atomicfu/...;`) in the constant pool, so a
// plain byte search over every unit is enough.

use memchr::memmem;
use serde::Serialize;
use tracing::warn;

pub const DEFAULT_FORBIDDEN_SIGNATURE: &str = "Lkotlinx/atomicfu/";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "units", rename_all = "lowercase")]
pub enum LeakReport {
    Clean,
    /// Entry names containing the signature, in scan order
    Leak(Vec<String>),
}

impl LeakReport {
    pub fn is_clean(&self) -> bool {
        matches!(self, LeakReport::Clean)
    }

    pub fn units(&self) -> &[String] {
        match self {
            LeakReport::Clean => &[],
            LeakReport::Leak(units) => units,
        }
    }
}

pub struct LeakScanner {
    finder: memmem::Finder<'static>,
}

impl LeakScanner {
    pub fn new(signature: &[u8]) -> Self {
        Self {
            finder: memmem::Finder::new(signature).into_owned(),
        }
    }

    pub fn signature(&self) -> &[u8] {
        self.finder.needle()
    }

    /// First match is enough; an empty signature never matches
    pub fn contains(&self, bytes: &[u8]) -> bool {
        !self.signature().is_empty() && self.finder.find(bytes).is_some()
    }

    /// Scan every unit before concluding
    pub fn scan<'a, I>(&self, units: I) -> LeakReport
    where
        I: IntoIterator<Item = (&'a str, &'a [u8])>,
    {
        let found: Vec<String> = units
            .into_iter()
            .filter(|(_, bytes)| self.contains(bytes))
            .map(|(name, _)| {
                warn!(unit = name, "found forbidden signature reference");
                name.to_string()
            })
            .collect();

        if found.is_empty() {
            LeakReport::Clean
        } else {
            LeakReport::Leak(found)
        }
    }
}

impl Default for LeakScanner {
    fn default() -> Self {
        Self::new(DEFAULT_FORBIDDEN_SIGNATURE.as_bytes())
    }
}
