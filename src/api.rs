// ============================================================================
// Public API 模型 - 类/成员条目与包过滤
// ============================================================================

use serde::Serialize;

use crate::classfile::{AccessFlags, ClassKind, MemberKind};
use crate::visibility::Visibility;

/// One field or method that is part of the public surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberApiEntry {
    pub kind: MemberKind,
    pub name: String,
    pub descriptor: String,
    /// Effective visibility (after overrides)
    pub visibility: Visibility,
    pub access: AccessFlags,
    pub exceptions: Vec<String>,
}

impl MemberApiEntry {
    /// Modifier words in canonical order, visibility first
    pub fn modifiers(&self) -> Vec<&'static str> {
        let mut mods = vec![self.visibility.as_str()];
        if self.access.is_static() {
            mods.push("static");
        }
        if self.access.is_final() {
            mods.push("final");
        }
        if self.kind == MemberKind::Method && self.access.is_abstract() {
            mods.push("abstract");
        }
        mods
    }

    fn sort_key(&self) -> (&str, &str) {
        (&self.name, &self.descriptor)
    }
}

/// One class-like declaration that is part of the public surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassApiEntry {
    /// Binary name (`com/example/Foo$Bar`)
    pub name: String,
    pub kind: ClassKind,
    pub visibility: Visibility,
    /// Declared flags (InnerClasses flags for nested classes)
    pub access: AccessFlags,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub outer_name: Option<String>,
    pub members: Vec<MemberApiEntry>,
}

impl ClassApiEntry {
    /// Package part of the binary name (`""` for the default package)
    pub fn package(&self) -> &str {
        self.name.rsplit_once('/').map(|(pkg, _)| pkg).unwrap_or("")
    }

    /// Header modifiers. A nested class's `static` is never shown.
    pub fn modifiers(&self) -> Vec<&'static str> {
        let mut mods = vec![self.visibility.as_str()];
        if self.access.is_final() {
            mods.push("final");
        }
        if self.access.is_abstract() {
            mods.push("abstract");
        }
        mods
    }

    /// Superclass (unless `java/lang/Object`) followed by the sorted interfaces
    pub fn supertypes(&self) -> Vec<&str> {
        let mut interfaces: Vec<&str> = self.interfaces.iter().map(String::as_str).collect();
        interfaces.sort_unstable();

        self.super_name
            .as_deref()
            .filter(|s| *s != "java/lang/Object")
            .into_iter()
            .chain(interfaces)
            .collect()
    }
}

/// Filtered, sorted public surface of one archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiSnapshot {
    pub classes: Vec<ClassApiEntry>,
    /// Unqualified exports of `module-info.class`, if the archive has one
    pub module_exports: Option<Vec<String>>,
}

impl ApiSnapshot {
    /// Canonical ordering: classes by binary name, members by (name, descriptor).
    /// Input order (archive enumeration order) does not matter.
    pub fn new(mut classes: Vec<ClassApiEntry>, module_exports: Option<Vec<String>>) -> Self {
        classes.sort_by(|a, b| a.name.cmp(&b.name));
        for class in &mut classes {
            class.members.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        }
        Self {
            classes,
            module_exports,
        }
    }

    pub fn member_count(&self) -> usize {
        self.classes.iter().map(|c| c.members.len()).sum()
    }

    pub fn render(&self) -> String {
        crate::dump::render(self)
    }
}

// ============================================================================
// 包过滤 - Package Filter
// ============================================================================

/// Dotted package name (`com.foo.internal`) to binary form (`com/foo/internal`)
pub fn to_binary_package(package: &str) -> String {
    package.trim().trim_end_matches('.').replace('.', "/")
}

/// Path-segment prefix match on binary names: `com/foo/internal` covers
/// `com/foo/internal` and `com/foo/internal/X`, never `com/foo/internalization/X`.
pub fn is_under_package(class_name: &str, package: &str) -> bool {
    if package.is_empty() {
        return false;
    }
    match class_name.strip_prefix(package) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Drop classes living under any of the internal packages (binary form).
/// Surviving entries keep their relative order.
pub fn filter_internal_packages<S: AsRef<str>>(
    classes: Vec<ClassApiEntry>,
    internal_packages: &[S],
) -> Vec<ClassApiEntry> {
    classes
        .into_iter()
        .filter(|c| {
            !internal_packages
                .iter()
                .any(|p| is_under_package(&c.name, p.as_ref()))
        })
        .collect()
}

/// Keep only classes whose own package is exported by the module descriptor.
/// Module exports are not hierarchical, so this is an exact package match.
pub fn filter_to_exports<S: AsRef<str>>(
    classes: Vec<ClassApiEntry>,
    exports: &[S],
) -> Vec<ClassApiEntry> {
    classes
        .into_iter()
        .filter(|c| exports.iter().any(|e| e.as_ref() == c.package()))
        .collect()
}
