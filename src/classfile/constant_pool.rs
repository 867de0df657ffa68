// ============================================================================
// 常量池 - Constant Pool
// ============================================================================
//
// Only UTF-8, Class, Module and Package constants are retained; every other
// tag is decoded just far enough to skip it.

use super::reader::{ByteReader, ParseError};

const TAG_UTF8: u8 = 1;
const TAG_INTEGER: u8 = 3;
const TAG_FLOAT: u8 = 4;
const TAG_LONG: u8 = 5;
const TAG_DOUBLE: u8 = 6;
const TAG_CLASS: u8 = 7;
const TAG_STRING: u8 = 8;
const TAG_FIELDREF: u8 = 9;
const TAG_METHODREF: u8 = 10;
const TAG_INTERFACE_METHODREF: u8 = 11;
const TAG_NAME_AND_TYPE: u8 = 12;
const TAG_METHOD_HANDLE: u8 = 15;
const TAG_METHOD_TYPE: u8 = 16;
const TAG_DYNAMIC: u8 = 17;
const TAG_INVOKE_DYNAMIC: u8 = 18;
const TAG_MODULE: u8 = 19;
const TAG_PACKAGE: u8 = 20;

#[derive(Debug, Clone)]
enum Constant {
    /// Slot 0 and the upper half of Long/Double
    Unusable,
    Utf8(String),
    Class(u16),
    Module(u16),
    Package(u16),
    Other,
}

#[derive(Debug)]
pub(crate) struct ConstantPool {
    entries: Vec<Constant>,
}

impl ConstantPool {
    pub fn parse(r: &mut ByteReader<'_>) -> Result<Self, ParseError> {
        let count = r.u16()? as usize;
        // smallest entry is tag + u16
        r.ensure_count(count.saturating_sub(1), 3, "constant pool")?;

        let mut entries = Vec::with_capacity(count.max(1));
        entries.push(Constant::Unusable);

        while entries.len() < count {
            let index = entries.len() as u16;
            let tag = r.u8()?;
            match tag {
                TAG_UTF8 => {
                    let len = r.u16()? as usize;
                    let raw = r.bytes(len)?;
                    let text = decode_modified_utf8(raw).ok_or(ParseError::BadUtf8 { index })?;
                    entries.push(Constant::Utf8(text));
                }
                TAG_CLASS => entries.push(Constant::Class(r.u16()?)),
                TAG_MODULE => entries.push(Constant::Module(r.u16()?)),
                TAG_PACKAGE => entries.push(Constant::Package(r.u16()?)),
                TAG_STRING | TAG_METHOD_TYPE => {
                    r.skip(2)?;
                    entries.push(Constant::Other);
                }
                TAG_METHOD_HANDLE => {
                    r.skip(3)?;
                    entries.push(Constant::Other);
                }
                TAG_INTEGER
                | TAG_FLOAT
                | TAG_FIELDREF
                | TAG_METHODREF
                | TAG_INTERFACE_METHODREF
                | TAG_NAME_AND_TYPE
                | TAG_DYNAMIC
                | TAG_INVOKE_DYNAMIC => {
                    r.skip(4)?;
                    entries.push(Constant::Other);
                }
                TAG_LONG | TAG_DOUBLE => {
                    r.skip(8)?;
                    // 8-byte constants take two slots
                    entries.push(Constant::Other);
                    entries.push(Constant::Unusable);
                }
                _ => return Err(ParseError::UnknownTag { tag, index }),
            }
        }

        // a Long/Double in the last slot overshoots the declared count
        if entries.len() > count && count > 0 {
            return Err(ParseError::BadIndex {
                index: (entries.len() - 1) as u16,
            });
        }

        Ok(Self { entries })
    }

    fn get(&self, index: u16) -> Result<&Constant, ParseError> {
        match self.entries.get(index as usize) {
            None | Some(Constant::Unusable) => Err(ParseError::BadIndex { index }),
            Some(c) => Ok(c),
        }
    }

    pub fn utf8(&self, index: u16) -> Result<&str, ParseError> {
        match self.get(index)? {
            Constant::Utf8(s) => Ok(s),
            _ => Err(ParseError::WrongTag {
                index,
                expected: "Utf8",
            }),
        }
    }

    pub fn class_name(&self, index: u16) -> Result<&str, ParseError> {
        match self.get(index)? {
            Constant::Class(name) => self.utf8(*name),
            _ => Err(ParseError::WrongTag {
                index,
                expected: "Class",
            }),
        }
    }

    /// Index 0 means "absent" (e.g. `super_class` of `java/lang/Object`)
    pub fn optional_class_name(&self, index: u16) -> Result<Option<&str>, ParseError> {
        if index == 0 {
            return Ok(None);
        }
        self.class_name(index).map(Some)
    }

    pub fn optional_utf8(&self, index: u16) -> Result<Option<&str>, ParseError> {
        if index == 0 {
            return Ok(None);
        }
        self.utf8(index).map(Some)
    }

    pub fn module_name(&self, index: u16) -> Result<&str, ParseError> {
        match self.get(index)? {
            Constant::Module(name) => self.utf8(*name),
            _ => Err(ParseError::WrongTag {
                index,
                expected: "Module",
            }),
        }
    }

    pub fn package_name(&self, index: u16) -> Result<&str, ParseError> {
        match self.get(index)? {
            Constant::Package(name) => self.utf8(*name),
            _ => Err(ParseError::WrongTag {
                index,
                expected: "Package",
            }),
        }
    }
}

/// JVM "modified UTF-8": NUL is `C0 80` and supplementary characters are
/// encoded as surrogate pairs, so plain UTF-8 validation is only a fast path.
fn decode_modified_utf8(raw: &[u8]) -> Option<String> {
    if let Ok(s) = std::str::from_utf8(raw) {
        return Some(s.to_string());
    }

    let mut units: Vec<u16> = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        let b = raw[i];
        if b & 0x80 == 0 {
            units.push(b as u16);
            i += 1;
        } else if b & 0xE0 == 0xC0 {
            let b2 = *raw.get(i + 1)?;
            units.push((((b & 0x1F) as u16) << 6) | (b2 & 0x3F) as u16);
            i += 2;
        } else if b & 0xF0 == 0xE0 {
            let b2 = *raw.get(i + 1)?;
            let b3 = *raw.get(i + 2)?;
            units.push(
                (((b & 0x0F) as u16) << 12) | (((b2 & 0x3F) as u16) << 6) | (b3 & 0x3F) as u16,
            );
            i += 3;
        } else {
            return None;
        }
    }
    // Unpaired surrogates are legal in a class file; they become U+FFFD.
    Some(String::from_utf16_lossy(&units))
}
