// ============================================================================
// Jar Public API Guard - Library Interface
// ============================================================================
//
// Reads a module's compiled jar, renders its public API in the kotlinx dump
// format, diffs it against the committed reference, and scans the bytecode
// for compile-time-only dependencies that must not ship.
//
// The binary (main.rs) is a thin clap front end over `cli`.

pub mod api;
pub mod archive;
pub mod check;
pub mod classfile;
pub mod cli;
pub mod config;
pub mod dump;
pub mod error;
pub mod leak;
pub mod target;
pub mod visibility;

pub use api::ApiSnapshot;
pub use check::{build_snapshot, check_module, check_modules, dump_module, ModuleReport};
pub use config::ApiConfig;
pub use dump::{Comparison, LineDiff};
pub use error::{ApiCheckError, Result};
pub use leak::{LeakReport, LeakScanner};
pub use target::{discover_modules, ModuleTarget};
pub use visibility::{Visibility, VisibilityOverrides};

#[cfg(test)]
#[path = "../tests/common/mod.rs"]
pub(crate) mod testkit;
