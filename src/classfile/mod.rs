// ============================================================================
// 字节码结构模块 - Compiled-Unit 类型定义
// ============================================================================
//
// Typed view of one `.class` file, restricted to what an API contract needs:
// names, access flags, supertypes, member signatures, nested-class links and
// module exports. Method bodies and debug metadata are never decoded.

mod constant_pool;
mod parser;
mod reader;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use parser::parse_unit;
pub use reader::ParseError;

/// JVM access flags (`access_flags` of classes, fields, methods and inner classes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessFlags(pub u16);

impl AccessFlags {
    pub const PUBLIC: u16 = 0x0001;
    pub const PRIVATE: u16 = 0x0002;
    pub const PROTECTED: u16 = 0x0004;
    pub const STATIC: u16 = 0x0008;
    pub const FINAL: u16 = 0x0010;
    pub const SUPER: u16 = 0x0020;
    /// Methods only (shares the bit with `ACC_VOLATILE` on fields)
    pub const BRIDGE: u16 = 0x0040;
    pub const VARARGS: u16 = 0x0080;
    pub const NATIVE: u16 = 0x0100;
    pub const INTERFACE: u16 = 0x0200;
    pub const ABSTRACT: u16 = 0x0400;
    pub const STRICT: u16 = 0x0800;
    pub const SYNTHETIC: u16 = 0x1000;
    pub const ANNOTATION: u16 = 0x2000;
    pub const ENUM: u16 = 0x4000;
    pub const MODULE: u16 = 0x8000;

    pub fn contains(self, flag: u16) -> bool {
        self.0 & flag != 0
    }

    pub fn is_static(self) -> bool {
        self.contains(Self::STATIC)
    }

    pub fn is_final(self) -> bool {
        self.contains(Self::FINAL)
    }

    pub fn is_abstract(self) -> bool {
        self.contains(Self::ABSTRACT)
    }

    pub fn is_synthetic(self) -> bool {
        self.contains(Self::SYNTHETIC)
    }
}

/// Class-like declaration kind, derived from access flags and shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassKind {
    Class,
    Interface,
    Enum,
    Annotation,
    /// Singleton holder: final class exposing `static final INSTANCE` of its own type
    Object,
}

impl ClassKind {
    pub(crate) fn classify(
        name: &str,
        access: AccessFlags,
        fields: &[MemberInfo],
    ) -> Self {
        if access.contains(AccessFlags::ANNOTATION) {
            return ClassKind::Annotation;
        }
        if access.contains(AccessFlags::INTERFACE) {
            return ClassKind::Interface;
        }
        if access.contains(AccessFlags::ENUM) {
            return ClassKind::Enum;
        }
        let self_descriptor = format!("L{name};");
        let has_instance = fields.iter().any(|f| {
            f.name == "INSTANCE"
                && f.descriptor == self_descriptor
                && f.access.is_static()
                && f.access.is_final()
        });
        if access.is_final() && has_instance {
            ClassKind::Object
        } else {
            ClassKind::Class
        }
    }

    /// Keyword(s) used in the rendered class header
    pub fn keyword(self) -> &'static str {
        match self {
            ClassKind::Class | ClassKind::Enum | ClassKind::Object => "class",
            ClassKind::Interface => "interface class",
            ClassKind::Annotation => "interface annotation class",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberKind {
    Field,
    Method,
}

impl fmt::Display for MemberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberKind::Field => write!(f, "field"),
            MemberKind::Method => write!(f, "fun"),
        }
    }
}

/// One field or method as declared in the class file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    pub kind: MemberKind,
    pub name: String,
    pub descriptor: String,
    pub access: AccessFlags,
    /// Declared `throws` list (methods only, from the `Exceptions` attribute)
    pub exceptions: Vec<String>,
    /// Set by the legacy `Synthetic` attribute
    pub synthetic_attribute: bool,
}

impl MemberInfo {
    /// Compiler artifacts that are never part of the contract
    pub fn is_synthetic_or_bridge(&self) -> bool {
        self.synthetic_attribute
            || self.access.is_synthetic()
            || (self.kind == MemberKind::Method && self.access.contains(AccessFlags::BRIDGE))
    }
}

/// One row of the `InnerClasses` attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerClassInfo {
    pub inner: String,
    /// `None` for local and anonymous classes
    pub outer: Option<String>,
    pub simple_name: Option<String>,
    pub access: AccessFlags,
}

/// Parsed class, interface, enum, annotation or object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassUnit {
    pub name: String,
    pub kind: ClassKind,
    pub access: AccessFlags,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<MemberInfo>,
    pub methods: Vec<MemberInfo>,
    pub inner_classes: Vec<InnerClassInfo>,
    pub synthetic_attribute: bool,
}

impl ClassUnit {
    /// The `InnerClasses` row describing this class itself, if it is nested
    pub fn own_inner_entry(&self) -> Option<&InnerClassInfo> {
        self.inner_classes.iter().find(|ic| ic.inner == self.name)
    }

    /// Flags to report for the declaration: nested classes keep their real
    /// (source-level) flags in the `InnerClasses` row, not in `access_flags`.
    pub fn declared_access(&self) -> AccessFlags {
        self.own_inner_entry()
            .map(|ic| ic.access)
            .unwrap_or(self.access)
    }

    pub fn is_synthetic(&self) -> bool {
        self.synthetic_attribute || self.access.is_synthetic()
    }

    pub fn members(&self) -> impl Iterator<Item = &MemberInfo> {
        self.fields.iter().chain(self.methods.iter())
    }
}

/// `module-info.class`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ModuleDescriptor {
    pub name: Option<String>,
    /// Unqualified exports, binary form (`com/example/api`)
    pub exports: Vec<String>,
}

/// Result of parsing one compiled unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompiledUnit {
    Class(ClassUnit),
    Module(ModuleDescriptor),
}
