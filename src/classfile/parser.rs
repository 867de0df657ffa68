// ============================================================================
// 字节码解析器 - Class File Parser
// ============================================================================
//
// Layout (JVMS §4.1):
//
//   magic u4, minor u2, major u2
//   constant_pool_count u2, constant_pool[count-1]
//   access_flags u2, this_class u2, super_class u2
//   interfaces_count u2, interfaces[]
//   fields_count u2, fields[]      (access, name, descriptor, attributes)
//   methods_count u2, methods[]
//   attributes_count u2, attributes[]
//
// Magic and version are read but not validated: the archive is trusted to
// contain class files. Attributes other than Exceptions, Synthetic,
// InnerClasses and Module are skipped by length.

use super::constant_pool::ConstantPool;
use super::reader::{ByteReader, ParseError};
use super::{
    AccessFlags, ClassKind, ClassUnit, CompiledUnit, InnerClassInfo, MemberInfo, MemberKind,
    ModuleDescriptor,
};

/// Parse one compiled unit into its typed structure
pub fn parse_unit(bytes: &[u8]) -> Result<CompiledUnit, ParseError> {
    let mut r = ByteReader::new(bytes);

    let _magic = r.u32()?;
    let _minor = r.u16()?;
    let _major = r.u16()?;

    let cp = ConstantPool::parse(&mut r)?;

    let access = AccessFlags(r.u16()?);
    let this_index = r.u16()?;
    let super_index = r.u16()?;

    let interface_count = r.u16()? as usize;
    r.ensure_count(interface_count, 2, "interface")?;
    let mut interfaces = Vec::with_capacity(interface_count);
    for _ in 0..interface_count {
        interfaces.push(cp.class_name(r.u16()?)?.to_string());
    }

    let fields = parse_members(&mut r, &cp, MemberKind::Field)?;
    let methods = parse_members(&mut r, &cp, MemberKind::Method)?;

    if access.contains(AccessFlags::MODULE) {
        return parse_module_attributes(&mut r, &cp).map(CompiledUnit::Module);
    }

    let name = cp.class_name(this_index)?.to_string();
    let super_name = cp.optional_class_name(super_index)?.map(str::to_string);

    let mut inner_classes = Vec::new();
    let mut synthetic_attribute = false;
    read_attributes(&mut r, &cp, |attr, data| {
        match attr {
            "InnerClasses" => inner_classes = parse_inner_classes(data, &cp)?,
            "Synthetic" => synthetic_attribute = true,
            _ => {}
        }
        Ok(())
    })?;

    let kind = ClassKind::classify(&name, access, &fields);

    Ok(CompiledUnit::Class(ClassUnit {
        name,
        kind,
        access,
        super_name,
        interfaces,
        fields,
        methods,
        inner_classes,
        synthetic_attribute,
    }))
}

fn parse_members(
    r: &mut ByteReader<'_>,
    cp: &ConstantPool,
    kind: MemberKind,
) -> Result<Vec<MemberInfo>, ParseError> {
    let count = r.u16()? as usize;
    let what = match kind {
        MemberKind::Field => "field",
        MemberKind::Method => "method",
    };
    // access + name + descriptor + attributes_count
    r.ensure_count(count, 8, what)?;

    let mut members = Vec::with_capacity(count);
    for _ in 0..count {
        let access = AccessFlags(r.u16()?);
        let name = cp.utf8(r.u16()?)?.to_string();
        let descriptor = cp.utf8(r.u16()?)?.to_string();

        let mut exceptions = Vec::new();
        let mut synthetic_attribute = false;
        read_attributes(r, cp, |attr, data| {
            match attr {
                "Exceptions" if kind == MemberKind::Method => {
                    exceptions = parse_exceptions(data, cp)?;
                }
                "Synthetic" => synthetic_attribute = true,
                _ => {}
            }
            Ok(())
        })?;

        members.push(MemberInfo {
            kind,
            name,
            descriptor,
            access,
            exceptions,
            synthetic_attribute,
        });
    }
    Ok(members)
}

/// Walk an attribute table, handing each (name, payload) to `visit`
fn read_attributes<'a, F>(
    r: &mut ByteReader<'a>,
    cp: &ConstantPool,
    mut visit: F,
) -> Result<(), ParseError>
where
    F: FnMut(&str, &'a [u8]) -> Result<(), ParseError>,
{
    let count = r.u16()? as usize;
    // name u2 + length u4
    r.ensure_count(count, 6, "attribute")?;
    for _ in 0..count {
        let name = cp.utf8(r.u16()?)?;
        let len = r.u32()? as usize;
        let data = r.bytes(len)?;
        visit(name, data)?;
    }
    Ok(())
}

fn parse_exceptions(data: &[u8], cp: &ConstantPool) -> Result<Vec<String>, ParseError> {
    let mut r = ByteReader::new(data);
    let count = r.u16()? as usize;
    r.ensure_count(count, 2, "exception")?;
    let mut exceptions = Vec::with_capacity(count);
    for _ in 0..count {
        exceptions.push(cp.class_name(r.u16()?)?.to_string());
    }
    Ok(exceptions)
}

fn parse_inner_classes(data: &[u8], cp: &ConstantPool) -> Result<Vec<InnerClassInfo>, ParseError> {
    let mut r = ByteReader::new(data);
    let count = r.u16()? as usize;
    r.ensure_count(count, 8, "inner class")?;

    let mut inner = Vec::with_capacity(count);
    for _ in 0..count {
        let inner_index = r.u16()?;
        let outer_index = r.u16()?;
        let name_index = r.u16()?;
        let access = AccessFlags(r.u16()?);
        inner.push(InnerClassInfo {
            inner: cp.class_name(inner_index)?.to_string(),
            outer: cp.optional_class_name(outer_index)?.map(str::to_string),
            simple_name: cp.optional_utf8(name_index)?.map(str::to_string),
            access,
        });
    }
    Ok(inner)
}

fn parse_module_attributes(
    r: &mut ByteReader<'_>,
    cp: &ConstantPool,
) -> Result<ModuleDescriptor, ParseError> {
    let mut descriptor = ModuleDescriptor::default();
    read_attributes(r, cp, |attr, data| {
        if attr == "Module" {
            descriptor = parse_module(data, cp)?;
        }
        Ok(())
    })?;
    Ok(descriptor)
}

/// `Module` attribute: header, requires[], exports[]; opens/uses/provides are not read
fn parse_module(data: &[u8], cp: &ConstantPool) -> Result<ModuleDescriptor, ParseError> {
    let mut r = ByteReader::new(data);
    let name = cp.module_name(r.u16()?)?.to_string();
    let _flags = r.u16()?;
    let _version = r.u16()?;

    let requires = r.u16()? as usize;
    r.ensure_count(requires, 6, "requires")?;
    r.skip(requires * 6)?;

    let exports_count = r.u16()? as usize;
    r.ensure_count(exports_count, 6, "exports")?;
    let mut exports = Vec::with_capacity(exports_count);
    for _ in 0..exports_count {
        let package = cp.package_name(r.u16()?)?.to_string();
        let _flags = r.u16()?;
        let targets = r.u16()? as usize;
        r.ensure_count(targets, 2, "exports_to")?;
        r.skip(targets * 2)?;
        // qualified exports are friend access, not API
        if targets == 0 {
            exports.push(package);
        }
    }

    Ok(ModuleDescriptor {
        name: Some(name),
        exports,
    })
}
