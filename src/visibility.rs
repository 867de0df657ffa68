// ============================================================================
// 可见性解析模块 - Visibility Overrides & Resolver
// ============================================================================
//
// Raw access flags do not always describe the intended API: some members are
// public in bytecode only for interop, others are declared internal but are
// meant to be used. `visibilities.json` corrects that, and its value always
// wins over the declared flag.
//
// Override key grammar:
//   class   com/example/Foo
//   method  com/example/Foo.bar(I)V
//   field   com/example/Foo.x:I

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::{ClassApiEntry, MemberApiEntry};
use crate::classfile::{AccessFlags, ClassUnit, MemberInfo, MemberKind};
use crate::error::{ApiCheckError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Protected,
    Internal,
    Private,
}

impl Visibility {
    /// Declared visibility; package-private maps to internal
    pub fn from_access(access: AccessFlags) -> Self {
        if access.contains(AccessFlags::PUBLIC) {
            Visibility::Public
        } else if access.contains(AccessFlags::PROTECTED) {
            Visibility::Protected
        } else if access.contains(AccessFlags::PRIVATE) {
            Visibility::Private
        } else {
            Visibility::Internal
        }
    }

    /// Public and protected are reachable by library users (protected through subclassing)
    pub fn is_api_visible(self) -> bool {
        matches!(self, Visibility::Public | Visibility::Protected)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Protected => "protected",
            Visibility::Internal => "internal",
            Visibility::Private => "private",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "public" => Ok(Visibility::Public),
            "protected" => Ok(Visibility::Protected),
            "internal" => Ok(Visibility::Internal),
            "private" => Ok(Visibility::Private),
            other => Err(format!("unknown visibility '{other}'")),
        }
    }
}

// ============================================================================
// VisibilityOverrides - 外部可见性映射
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VisibilityOverrides {
    entries: BTreeMap<String, Visibility>,
}

impl VisibilityOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn class_key(class: &str) -> String {
        class.to_string()
    }

    pub fn method_key(class: &str, name: &str, descriptor: &str) -> String {
        format!("{class}.{name}{descriptor}")
    }

    pub fn field_key(class: &str, name: &str, descriptor: &str) -> String {
        format!("{class}.{name}:{descriptor}")
    }

    pub fn member_key(class: &str, member: &MemberInfo) -> String {
        match member.kind {
            MemberKind::Field => Self::field_key(class, &member.name, &member.descriptor),
            MemberKind::Method => Self::method_key(class, &member.name, &member.descriptor),
        }
    }

    pub fn from_json_str(content: &str) -> serde_json::Result<Self> {
        serde_json::from_str(content)
    }

    /// Load one mapping file. A missing file is fatal for the module check.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ApiCheckError::MissingOverrideFile {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => return Err(ApiCheckError::io(path, e)),
        };
        let overrides =
            Self::from_json_str(&content).map_err(|source| ApiCheckError::InvalidOverrideFile {
                path: path.to_path_buf(),
                source,
            })?;
        debug!(path = %path.display(), entries = overrides.len(), "loaded visibility overrides");
        Ok(overrides)
    }

    /// Load every source in order and merge them (later files win)
    pub fn load_all<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let sources = paths
            .iter()
            .map(|p| Self::load(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::merge(sources))
    }

    /// Ordered union of all sources; on key collision the later source wins
    pub fn merge<I>(sources: I) -> Self
    where
        I: IntoIterator<Item = Self>,
    {
        sources.into_iter().fold(Self::new(), Self::union)
    }

    /// `self ∪ later`, with `later` taking precedence
    pub fn union(self, later: Self) -> Self {
        let mut entries = self.entries;
        entries.extend(later.entries);
        Self { entries }
    }

    pub fn with(mut self, key: impl Into<String>, visibility: Visibility) -> Self {
        self.entries.insert(key.into(), visibility);
        self
    }

    pub fn get(&self, key: &str) -> Option<Visibility> {
        self.entries.get(key).copied()
    }

    /// Override if present, declared otherwise
    pub fn effective(&self, key: &str, declared: Visibility) -> Visibility {
        self.get(key).unwrap_or(declared)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Resolver - 计算有效可见性
// ============================================================================

/// Keep only the classes and members whose effective visibility is public or
/// protected. Synthetic classes and synthetic/bridge members are dropped
/// regardless of overrides. A nested class survives only if its outer class
/// (when present in the archive) survives; local and anonymous classes never do.
pub fn resolve(units: &[ClassUnit], overrides: &VisibilityOverrides) -> Vec<ClassApiEntry> {
    let by_name: HashMap<&str, &ClassUnit> = units.iter().map(|u| (u.name.as_str(), u)).collect();

    units
        .iter()
        .filter(|unit| is_class_retained(*unit, &by_name, overrides))
        .map(|unit| {
            let visibility = class_visibility(unit, overrides);
            let members = unit
                .members()
                .filter(|m| !m.is_synthetic_or_bridge())
                .filter_map(|m| resolve_member(&unit.name, m, overrides))
                .collect();
            ClassApiEntry {
                name: unit.name.clone(),
                kind: unit.kind,
                visibility,
                access: unit.declared_access(),
                super_name: unit.super_name.clone(),
                interfaces: unit.interfaces.clone(),
                outer_name: unit.own_inner_entry().and_then(|ic| ic.outer.clone()),
                members,
            }
        })
        .collect()
}

fn class_visibility(unit: &ClassUnit, overrides: &VisibilityOverrides) -> Visibility {
    let declared = Visibility::from_access(unit.declared_access());
    overrides.effective(&VisibilityOverrides::class_key(&unit.name), declared)
}

fn is_class_retained<'a>(
    unit: &'a ClassUnit,
    by_name: &HashMap<&'a str, &'a ClassUnit>,
    overrides: &VisibilityOverrides,
) -> bool {
    let mut current = unit;
    let mut seen: HashSet<&'a str> = HashSet::new();
    loop {
        if !seen.insert(current.name.as_str()) {
            // InnerClasses cycle in malformed input
            return false;
        }
        if current.is_synthetic() || !class_visibility(current, overrides).is_api_visible() {
            return false;
        }
        let outer = match current.own_inner_entry() {
            None => return true,
            Some(ic) => match &ic.outer {
                None => return false,
                Some(outer) => outer,
            },
        };
        match by_name.get(outer.as_str()) {
            Some(outer_unit) => current = *outer_unit,
            None => return true,
        }
    }
}

fn resolve_member(
    class: &str,
    member: &MemberInfo,
    overrides: &VisibilityOverrides,
) -> Option<MemberApiEntry> {
    let declared = Visibility::from_access(member.access);
    let visibility = overrides.effective(&VisibilityOverrides::member_key(class, member), declared);
    if !visibility.is_api_visible() {
        return None;
    }
    Some(MemberApiEntry {
        kind: member.kind,
        name: member.name.clone(),
        descriptor: member.descriptor.clone(),
        visibility,
        access: member.access,
        exceptions: member.exceptions.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::{parse_unit, CompiledUnit};
    use crate::testkit::*;

    fn unit(builder: ClassBuilder) -> ClassUnit {
        match parse_unit(&builder.build()).unwrap() {
            CompiledUnit::Class(c) => c,
            other => panic!("expected class, got {other:?}"),
        }
    }

    fn member_names(entry: &ClassApiEntry) -> Vec<&str> {
        entry.members.iter().map(|m| m.name.as_str()).collect()
    }

    #[test]
    fn test_effective_visibility_without_override() {
        let overrides = VisibilityOverrides::new();
        assert_eq!(
            overrides.effective("a/B.c()V", Visibility::Protected),
            Visibility::Protected
        );
    }

    #[test]
    fn test_effective_visibility_with_override() {
        let overrides = VisibilityOverrides::new().with("a/B.c()V", Visibility::Internal);
        assert_eq!(
            overrides.effective("a/B.c()V", Visibility::Public),
            Visibility::Internal
        );
        assert_eq!(
            overrides.effective("a/B.d()V", Visibility::Public),
            Visibility::Public
        );
    }

    #[test]
    fn test_merge_later_source_wins() {
        let first = VisibilityOverrides::new()
            .with("a/B", Visibility::Public)
            .with("a/B.x:I", Visibility::Internal);
        let second = VisibilityOverrides::new()
            .with("a/B.x:I", Visibility::Public)
            .with("a/C", Visibility::Private);

        let merged = VisibilityOverrides::merge(vec![first.clone(), second.clone()]);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged.get("a/B.x:I"), Some(Visibility::Public));
        assert_eq!(merged.get("a/B"), Some(Visibility::Public));
        assert_eq!(merged.get("a/C"), Some(Visibility::Private));

        let reversed = VisibilityOverrides::merge(vec![second, first]);
        assert_eq!(reversed.get("a/B.x:I"), Some(Visibility::Internal));
    }

    #[test]
    fn test_merge_of_nothing_is_empty() {
        assert!(VisibilityOverrides::merge(Vec::new()).is_empty());
    }

    #[test]
    fn test_parse_json_mapping() {
        let json = r#"{
            "com/example/Foo": "public",
            "com/example/Foo.bar(I)V": "internal",
            "com/example/Foo.x:I": "protected"
        }"#;
        let overrides = VisibilityOverrides::from_json_str(json).unwrap();
        assert_eq!(overrides.get("com/example/Foo.bar(I)V"), Some(Visibility::Internal));
        assert_eq!(overrides.get("com/example/Foo.x:I"), Some(Visibility::Protected));
        assert!(VisibilityOverrides::from_json_str(r#"{"a": "friendly"}"#).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = VisibilityOverrides::load(&dir.path().join("visibilities.json")).unwrap_err();
        assert!(matches!(err, ApiCheckError::MissingOverrideFile { .. }));
    }

    #[test]
    fn test_load_all_merges_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.json");
        let b = dir.path().join("b.json");
        std::fs::write(&a, r#"{"x/Y": "internal"}"#).unwrap();
        std::fs::write(&b, r#"{"x/Y": "public"}"#).unwrap();
        let merged = VisibilityOverrides::load_all(&[a, b]).unwrap();
        assert_eq!(merged.get("x/Y"), Some(Visibility::Public));
    }

    #[test]
    fn test_resolve_applies_member_overrides() {
        let foo = unit(
            ClassBuilder::new("com/example/Foo")
                .method(ACC_PUBLIC, "shown", "()V")
                .method(ACC_PUBLIC, "hidden", "()V")
                .method(0, "promoted", "()V")
                .method(ACC_PROTECTED, "extend", "()V")
                .method(ACC_PRIVATE, "secret", "()V")
                .field(ACC_PUBLIC, "count", "I"),
        );
        let overrides = VisibilityOverrides::new()
            .with("com/example/Foo.hidden()V", Visibility::Internal)
            .with("com/example/Foo.promoted()V", Visibility::Public)
            .with("com/example/Foo.count:I", Visibility::Private);

        let api = resolve(&[foo], &overrides);
        assert_eq!(api.len(), 1);
        assert_eq!(member_names(&api[0]), vec!["shown", "promoted", "extend"]);
    }

    #[test]
    fn test_resolve_class_override_hides_class() {
        let foo = unit(ClassBuilder::new("com/example/Foo").method(ACC_PUBLIC, "run", "()V"));
        let overrides = VisibilityOverrides::new().with("com/example/Foo", Visibility::Internal);
        assert!(resolve(&[foo], &overrides).is_empty());
    }

    #[test]
    fn test_resolve_drops_synthetic_and_bridge() {
        let foo = unit(
            ClassBuilder::new("com/example/Foo")
                .method(ACC_PUBLIC, "compareTo", "(Lcom/example/Foo;)I")
                .method(ACC_PUBLIC | ACC_BRIDGE | ACC_SYNTHETIC, "compareTo", "(Ljava/lang/Object;)I")
                .method(ACC_PUBLIC | ACC_STATIC | ACC_SYNTHETIC, "access$get", "()I"),
        );
        // an override cannot resurrect a synthetic member
        let overrides =
            VisibilityOverrides::new().with("com/example/Foo.access$get()I", Visibility::Public);
        let api = resolve(&[foo], &overrides);
        assert_eq!(api[0].members.len(), 1);
        assert_eq!(api[0].members[0].descriptor, "(Lcom/example/Foo;)I");
    }

    #[test]
    fn test_nested_class_visibility() {
        let outer = unit(ClassBuilder::new("a/Outer").inner_class(
            "a/Outer$Nested",
            Some("a/Outer"),
            Some("Nested"),
            ACC_PROTECTED | ACC_STATIC,
        ));
        // binary flags say public, InnerClasses says protected
        let nested = unit(ClassBuilder::new("a/Outer$Nested").inner_class(
            "a/Outer$Nested",
            Some("a/Outer"),
            Some("Nested"),
            ACC_PROTECTED | ACC_STATIC,
        ));
        let private_nested = unit(ClassBuilder::new("a/Outer$Hidden").inner_class(
            "a/Outer$Hidden",
            Some("a/Outer"),
            Some("Hidden"),
            ACC_PRIVATE | ACC_STATIC,
        ));
        let anonymous = unit(
            ClassBuilder::new("a/Outer$1").inner_class("a/Outer$1", None, None, ACC_STATIC),
        );

        let api = resolve(&[outer, nested, private_nested, anonymous], &VisibilityOverrides::new());
        let names: Vec<_> = api.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a/Outer", "a/Outer$Nested"]);
        assert_eq!(api[1].visibility, Visibility::Protected);
        assert!(api[1].access.is_static());
    }

    #[test]
    fn test_nested_class_of_hidden_outer_is_hidden() {
        let outer = unit(ClassBuilder::new("a/Outer").access(ACC_SUPER));
        let nested = unit(ClassBuilder::new("a/Outer$Nested").inner_class(
            "a/Outer$Nested",
            Some("a/Outer"),
            Some("Nested"),
            ACC_PUBLIC | ACC_STATIC,
        ));
        assert!(resolve(&[outer, nested], &VisibilityOverrides::new()).is_empty());
    }
}
