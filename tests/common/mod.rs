// ============================================================================
// Test Kit - class file / jar / project layout builders
// ============================================================================
//
// Shared by the integration tests and (through `#[path]`) by the library's
// unit tests. Emits just enough of the class file format for the parser:
// constant pool, flags, supertypes, members (with a stub Code attribute),
// InnerClasses, SourceFile and Module attributes.

#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_PRIVATE: u16 = 0x0002;
pub const ACC_PROTECTED: u16 = 0x0004;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_FINAL: u16 = 0x0010;
pub const ACC_SUPER: u16 = 0x0020;
pub const ACC_BRIDGE: u16 = 0x0040;
pub const ACC_VOLATILE: u16 = 0x0040;
pub const ACC_INTERFACE: u16 = 0x0200;
pub const ACC_ABSTRACT: u16 = 0x0400;
pub const ACC_SYNTHETIC: u16 = 0x1000;
pub const ACC_ANNOTATION: u16 = 0x2000;
pub const ACC_ENUM: u16 = 0x4000;
pub const ACC_MODULE: u16 = 0x8000;

struct PoolBuilder {
    entries: Vec<Vec<u8>>,
    index: HashMap<Vec<u8>, u16>,
    next: u16,
}

impl PoolBuilder {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            next: 1,
        }
    }

    fn push(&mut self, entry: Vec<u8>, slots: u16) -> u16 {
        if let Some(&i) = self.index.get(&entry) {
            return i;
        }
        let i = self.next;
        self.next += slots;
        self.index.insert(entry.clone(), i);
        self.entries.push(entry);
        i
    }

    fn utf8(&mut self, s: &str) -> u16 {
        let mut e = vec![1u8];
        e.extend_from_slice(&(s.len() as u16).to_be_bytes());
        e.extend_from_slice(s.as_bytes());
        self.push(e, 1)
    }

    fn tagged_ref(&mut self, tag: u8, name: &str) -> u16 {
        let n = self.utf8(name);
        let mut e = vec![tag];
        e.extend_from_slice(&n.to_be_bytes());
        self.push(e, 1)
    }

    fn class(&mut self, name: &str) -> u16 {
        self.tagged_ref(7, name)
    }

    fn string(&mut self, value: &str) -> u16 {
        self.tagged_ref(8, value)
    }

    fn module(&mut self, name: &str) -> u16 {
        self.tagged_ref(19, name)
    }

    fn package(&mut self, name: &str) -> u16 {
        self.tagged_ref(20, name)
    }

    fn long(&mut self, value: i64) -> u16 {
        let mut e = vec![5u8];
        e.extend_from_slice(&value.to_be_bytes());
        self.push(e, 2)
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.next.to_be_bytes());
        for e in &self.entries {
            out.extend_from_slice(e);
        }
    }
}

fn header(out: &mut Vec<u8>) {
    out.extend_from_slice(&0xCAFEBABEu32.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    out.extend_from_slice(&52u16.to_be_bytes());
}

fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn put_attribute(out: &mut Vec<u8>, name_index: u16, payload: &[u8]) {
    put_u16(out, name_index);
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
}

#[derive(Clone)]
struct MemberSpec {
    access: u16,
    name: String,
    descriptor: String,
    exceptions: Vec<String>,
    synthetic_attribute: bool,
}

#[derive(Clone)]
struct InnerSpec {
    inner: String,
    outer: Option<String>,
    simple_name: Option<String>,
    access: u16,
}

/// Fluent builder for a single `.class` file
#[derive(Clone)]
pub struct ClassBuilder {
    name: String,
    access: u16,
    super_name: Option<String>,
    interfaces: Vec<String>,
    fields: Vec<MemberSpec>,
    methods: Vec<MemberSpec>,
    inner_classes: Vec<InnerSpec>,
    strings: Vec<String>,
    longs: Vec<i64>,
}

impl ClassBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            access: ACC_PUBLIC | ACC_SUPER,
            super_name: Some("java/lang/Object".to_string()),
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            inner_classes: Vec::new(),
            strings: Vec::new(),
            longs: Vec::new(),
        }
    }

    pub fn access(mut self, access: u16) -> Self {
        self.access = access;
        self
    }

    pub fn super_class(mut self, name: &str) -> Self {
        self.super_name = Some(name.to_string());
        self
    }

    pub fn interface(mut self, name: &str) -> Self {
        self.interfaces.push(name.to_string());
        self
    }

    pub fn field(mut self, access: u16, name: &str, descriptor: &str) -> Self {
        self.fields.push(MemberSpec {
            access,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            exceptions: Vec::new(),
            synthetic_attribute: false,
        });
        self
    }

    pub fn method(self, access: u16, name: &str, descriptor: &str) -> Self {
        self.method_throws(access, name, descriptor, &[])
    }

    pub fn method_throws(
        mut self,
        access: u16,
        name: &str,
        descriptor: &str,
        exceptions: &[&str],
    ) -> Self {
        self.methods.push(MemberSpec {
            access,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            exceptions: exceptions.iter().map(|e| e.to_string()).collect(),
            synthetic_attribute: false,
        });
        self
    }

    /// Method marked synthetic through the legacy attribute instead of the flag
    pub fn synthetic_attribute_method(mut self, access: u16, name: &str, descriptor: &str) -> Self {
        self.methods.push(MemberSpec {
            access,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            exceptions: Vec::new(),
            synthetic_attribute: true,
        });
        self
    }

    pub fn inner_class(
        mut self,
        inner: &str,
        outer: Option<&str>,
        simple_name: Option<&str>,
        access: u16,
    ) -> Self {
        self.inner_classes.push(InnerSpec {
            inner: inner.to_string(),
            outer: outer.map(str::to_string),
            simple_name: simple_name.map(str::to_string),
            access,
        });
        self
    }

    /// Embeds an extra string literal in the constant pool
    pub fn string_constant(mut self, value: &str) -> Self {
        self.strings.push(value.to_string());
        self
    }

    pub fn long_constant(mut self, value: i64) -> Self {
        self.longs.push(value);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut cp = PoolBuilder::new();
        let mut body = Vec::new();

        let this_index = cp.class(&self.name);
        let super_index = self.super_name.as_deref().map(|s| cp.class(s)).unwrap_or(0);
        for s in &self.strings {
            cp.string(s);
        }
        for v in &self.longs {
            cp.long(*v);
        }

        put_u16(&mut body, self.access);
        put_u16(&mut body, this_index);
        put_u16(&mut body, super_index);

        put_u16(&mut body, self.interfaces.len() as u16);
        for i in &self.interfaces {
            let idx = cp.class(i);
            put_u16(&mut body, idx);
        }

        put_u16(&mut body, self.fields.len() as u16);
        for f in &self.fields {
            write_member(&mut body, &mut cp, f, false);
        }

        put_u16(&mut body, self.methods.len() as u16);
        for m in &self.methods {
            write_member(&mut body, &mut cp, m, true);
        }

        let mut attrs: Vec<(u16, Vec<u8>)> = Vec::new();
        if !self.inner_classes.is_empty() {
            let mut payload = Vec::new();
            put_u16(&mut payload, self.inner_classes.len() as u16);
            for ic in &self.inner_classes {
                let inner = cp.class(&ic.inner);
                let outer = ic.outer.as_deref().map(|o| cp.class(o)).unwrap_or(0);
                let name = ic.simple_name.as_deref().map(|n| cp.utf8(n)).unwrap_or(0);
                put_u16(&mut payload, inner);
                put_u16(&mut payload, outer);
                put_u16(&mut payload, name);
                put_u16(&mut payload, ic.access);
            }
            attrs.push((cp.utf8("InnerClasses"), payload));
        }
        let source = cp.utf8("Source.kt");
        attrs.push((cp.utf8("SourceFile"), source.to_be_bytes().to_vec()));

        put_u16(&mut body, attrs.len() as u16);
        for (name, payload) in &attrs {
            put_attribute(&mut body, *name, payload);
        }

        let mut out = Vec::new();
        header(&mut out);
        cp.write(&mut out);
        out.extend_from_slice(&body);
        out
    }
}

fn write_member(body: &mut Vec<u8>, cp: &mut PoolBuilder, m: &MemberSpec, is_method: bool) {
    put_u16(body, m.access);
    let name = cp.utf8(&m.name);
    let desc = cp.utf8(&m.descriptor);
    put_u16(body, name);
    put_u16(body, desc);

    let mut attrs: Vec<(u16, Vec<u8>)> = Vec::new();
    if is_method && m.access & ACC_ABSTRACT == 0 {
        // max_stack, max_locals, code_length=1, `return`, no handlers, no attributes
        let code = vec![0, 1, 0, 1, 0, 0, 0, 1, 0xB1, 0, 0, 0, 0];
        attrs.push((cp.utf8("Code"), code));
    }
    if !m.exceptions.is_empty() {
        let mut payload = Vec::new();
        put_u16(&mut payload, m.exceptions.len() as u16);
        for e in &m.exceptions {
            let idx = cp.class(e);
            put_u16(&mut payload, idx);
        }
        attrs.push((cp.utf8("Exceptions"), payload));
    }
    if m.synthetic_attribute {
        attrs.push((cp.utf8("Synthetic"), Vec::new()));
    }

    put_u16(body, attrs.len() as u16);
    for (name, payload) in &attrs {
        put_attribute(body, *name, payload);
    }
}

/// `module-info.class` with unqualified and qualified (`exports .. to ..`) exports
pub fn module_info(name: &str, exports: &[&str], qualified: &[(&str, &str)]) -> Vec<u8> {
    let mut cp = PoolBuilder::new();
    let this_index = cp.class("module-info");

    let mut module = Vec::new();
    put_u16(&mut module, cp.module(name));
    put_u16(&mut module, 0);
    put_u16(&mut module, 0);
    // requires java.base (mandated)
    put_u16(&mut module, 1);
    put_u16(&mut module, cp.module("java.base"));
    put_u16(&mut module, 0x8000);
    put_u16(&mut module, 0);
    put_u16(&mut module, (exports.len() + qualified.len()) as u16);
    for pkg in exports {
        put_u16(&mut module, cp.package(pkg));
        put_u16(&mut module, 0);
        put_u16(&mut module, 0);
    }
    for (pkg, friend) in qualified {
        put_u16(&mut module, cp.package(pkg));
        put_u16(&mut module, 0);
        put_u16(&mut module, 1);
        put_u16(&mut module, cp.module(friend));
    }
    // opens, uses, provides
    put_u16(&mut module, 0);
    put_u16(&mut module, 0);
    put_u16(&mut module, 0);
    let module_attr = cp.utf8("Module");

    let mut body = Vec::new();
    put_u16(&mut body, ACC_MODULE);
    put_u16(&mut body, this_index);
    put_u16(&mut body, 0);
    put_u16(&mut body, 0);
    put_u16(&mut body, 0);
    put_u16(&mut body, 0);
    put_u16(&mut body, 1);
    put_attribute(&mut body, module_attr, &module);

    let mut out = Vec::new();
    header(&mut out);
    cp.write(&mut out);
    out.extend_from_slice(&body);
    out
}

/// Entry path inside a jar for a binary class name
pub fn class_entry(name: &str) -> String {
    format!("{name}.class")
}

/// Write a jar with a manifest, one directory entry and the given entries
pub fn write_jar(path: &Path, entries: &[(String, Vec<u8>)]) {
    use zip::write::SimpleFileOptions;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let file = fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);

    zip.add_directory("META-INF/", options).unwrap();
    zip.start_file("META-INF/MANIFEST.MF", options).unwrap();
    zip.write_all(b"Manifest-Version: 1.0\n").unwrap();

    for (name, bytes) in entries {
        zip.start_file(name.as_str(), options).unwrap();
        zip.write_all(bytes).unwrap();
    }
    zip.finish().unwrap();
}

/// On-disk project: `<root>/<module>/build/libs/*.jar`, `build/visibilities.json`,
/// the module marker and `reference-public-api/<module>.txt`
pub struct ProjectLayout {
    pub dir: tempfile::TempDir,
}

impl ProjectLayout {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn module_dir(&self, root: &str, module: &str) -> PathBuf {
        self.path().join(root).join(module)
    }

    /// Creates the module directory with its marker file
    pub fn add_module(&self, root: &str, module: &str) -> PathBuf {
        let dir = self.module_dir(root, module);
        fs::create_dir_all(dir.join("build/libs")).unwrap();
        fs::write(dir.join("build.gradle"), "// module\n").unwrap();
        dir
    }

    pub fn write_jar(
        &self,
        root: &str,
        module: &str,
        file_name: &str,
        entries: &[(String, Vec<u8>)],
    ) -> PathBuf {
        let path = self.module_dir(root, module).join("build/libs").join(file_name);
        write_jar(&path, entries);
        path
    }

    pub fn write_visibilities(&self, root: &str, module: &str, json: &str) -> PathBuf {
        let path = self.module_dir(root, module).join("build/visibilities.json");
        fs::write(&path, json).unwrap();
        path
    }

    pub fn write_reference(&self, module: &str, content: &str) -> PathBuf {
        let dir = self.path().join("reference-public-api");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(format!("{module}.txt"));
        fs::write(&path, content).unwrap();
        path
    }

    pub fn write_properties(&self, content: &str) -> PathBuf {
        let path = self.path().join("api.properties");
        fs::write(&path, content).unwrap();
        path
    }
}
