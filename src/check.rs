// ============================================================================
// 检查流水线 - Per-Module API Check
// ============================================================================
//
// archive → parse → resolve visibility → package filter → render/diff
//         ↘ leak scan
//
// Each module is an independent, strictly ordered pipeline. Modules share
// nothing but the read-only `ApiConfig`, so the multi-module runner simply
// fans them out over rayon.

use std::path::PathBuf;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::api::{filter_internal_packages, filter_to_exports, ApiSnapshot};
use crate::archive::{locate_archive, ClassArchive, RawUnit};
use crate::classfile::{parse_unit, ClassUnit, CompiledUnit, ModuleDescriptor};
use crate::config::ApiConfig;
use crate::dump::{compare_with_reference, Comparison};
use crate::error::{ApiCheckError, Result};
use crate::leak::{LeakReport, LeakScanner};
use crate::target::ModuleTarget;
use crate::visibility::{resolve, VisibilityOverrides};

/// Entries under this prefix (manifest, multi-release variants) are not API
const META_INF: &str = "META-INF/";

/// Outcome of one module check that ran to completion
#[derive(Debug, Clone, Serialize)]
pub struct ModuleReport {
    pub target: ModuleTarget,
    pub archive: PathBuf,
    pub reference: PathBuf,
    pub classes: usize,
    pub members: usize,
    pub api: Comparison,
    pub leak: LeakReport,
}

impl ModuleReport {
    pub fn is_success(&self) -> bool {
        self.api.is_match() && self.leak.is_clean()
    }

    /// Turn a failed report into its error: API mismatch first, then leak
    pub fn ensure_clean(&self) -> Result<()> {
        if let Comparison::Mismatch(diffs) = &self.api {
            return Err(ApiCheckError::Mismatch {
                reference: self.reference.clone(),
                diffs: diffs.clone(),
            });
        }
        if let LeakReport::Leak(units) = &self.leak {
            return Err(ApiCheckError::Leak {
                archive: self.archive.clone(),
                units: units.clone(),
            });
        }
        Ok(())
    }
}

/// Parse every unit; the first malformed one fails the module
pub fn parse_units(units: &[RawUnit]) -> Result<(Vec<ClassUnit>, Option<ModuleDescriptor>)> {
    let mut classes = Vec::with_capacity(units.len());
    let mut descriptor = None;

    for unit in units.iter().filter(|u| !u.name.starts_with(META_INF)) {
        let parsed = parse_unit(&unit.bytes).map_err(|e| ApiCheckError::MalformedUnit {
            entry: unit.name.clone(),
            detail: e.to_string(),
        })?;
        match parsed {
            CompiledUnit::Class(class) => classes.push(class),
            CompiledUnit::Module(module) => {
                debug!(module = ?module.name, exports = module.exports.len(), "module descriptor");
                descriptor = Some(module);
            }
        }
    }
    Ok((classes, descriptor))
}

/// parse → resolve → filter → sort
pub fn build_snapshot(
    units: &[RawUnit],
    overrides: &VisibilityOverrides,
    config: &ApiConfig,
) -> Result<ApiSnapshot> {
    let (classes, descriptor) = parse_units(units)?;

    let visible = resolve(&classes, overrides);
    let mut api = filter_internal_packages(visible, &config.internal_package_prefixes());

    let module_exports = descriptor.map(|d| d.exports);
    if config.honor_module_exports {
        match &module_exports {
            Some(exports) if !exports.is_empty() => api = filter_to_exports(api, exports),
            _ => debug!("no module exports to honor"),
        }
    }

    Ok(ApiSnapshot::new(api, module_exports))
}

/// Everything `check_module` and `dump_module` need from the build output
struct LoadedModule {
    archive: PathBuf,
    units: Vec<RawUnit>,
    snapshot: ApiSnapshot,
}

fn load_module(config: &ApiConfig, target: &ModuleTarget) -> Result<LoadedModule> {
    let archive_path = locate_archive(&target.libs_dir(config), &target.module)?;
    let overrides = VisibilityOverrides::load_all(&target.override_paths(config))?;

    let units = {
        let mut archive = ClassArchive::open(&archive_path)?;
        archive.read_units()?
    };
    debug!(module = %target, units = units.len(), "read archive");

    let snapshot = build_snapshot(&units, &overrides, config)?;
    Ok(LoadedModule {
        archive: archive_path,
        units,
        snapshot,
    })
}

/// Rendered public API of one module (what its reference file should contain)
pub fn dump_module(config: &ApiConfig, target: &ModuleTarget) -> Result<String> {
    Ok(load_module(config, target)?.snapshot.render())
}

/// Run the full check for one module.
///
/// Configuration, archive and input-file problems are returned as `Err`.
/// An API mismatch or a leak is reported in the `ModuleReport`; use
/// [`ModuleReport::ensure_clean`] to turn those into errors.
pub fn check_module(config: &ApiConfig, target: &ModuleTarget) -> Result<ModuleReport> {
    info!(module = %target, "checking public API");
    let loaded = load_module(config, target)?;

    let reference = target.reference_path(config);
    let api = compare_with_reference(&loaded.snapshot.render(), &reference)?;
    if let Comparison::Mismatch(diffs) = &api {
        warn!(module = %target, diffs = diffs.len(), reference = %reference.display(), "public API differs from reference");
    }

    let scanner = LeakScanner::new(config.leak_signature_bytes());
    let leak = scanner.scan(
        loaded
            .units
            .iter()
            .map(|u| (u.name.as_str(), u.bytes.as_slice())),
    );

    Ok(ModuleReport {
        target: target.clone(),
        archive: loaded.archive,
        reference,
        classes: loaded.snapshot.classes.len(),
        members: loaded.snapshot.member_count(),
        api,
        leak,
    })
}

/// Check modules in parallel; one failing module never stops the others.
/// Results come back in input order.
pub fn check_modules(
    config: &ApiConfig,
    targets: &[ModuleTarget],
) -> Vec<(ModuleTarget, Result<ModuleReport>)> {
    targets
        .par_iter()
        .map(|target| (target.clone(), check_module(config, target)))
        .collect()
}
