use crate::error::{Error, Result};
use crate::reader::Reader;

#[derive(Debug, Clone)]
pub(crate) enum CpInfo {
    /// Index 0 and the second slot of `Long`/`Double` entries.
    Unusable,
    Utf8(String),
    Integer,
    Float,
    Long,
    Double,
    Class { name_index: u16 },
    String,
    FieldRef,
    MethodRef,
    InterfaceMethodRef,
    NameAndType,
    MethodHandle,
    MethodType,
    Dynamic,
    InvokeDynamic,
    Module,
    Package,
}

impl CpInfo {
    fn kind(&self) -> &'static str {
        match self {
            CpInfo::Unusable => "unusable",
            CpInfo::Utf8(_) => "Utf8",
            CpInfo::Integer => "Integer",
            CpInfo::Float => "Float",
            CpInfo::Long => "Long",
            CpInfo::Double => "Double",
            CpInfo::Class { .. } => "Class",
            CpInfo::String => "String",
            CpInfo::FieldRef => "Fieldref",
            CpInfo::MethodRef => "Methodref",
            CpInfo::InterfaceMethodRef => "InterfaceMethodref",
            CpInfo::NameAndType => "NameAndType",
            CpInfo::MethodHandle => "MethodHandle",
            CpInfo::MethodType => "MethodType",
            CpInfo::Dynamic => "Dynamic",
            CpInfo::InvokeDynamic => "InvokeDynamic",
            CpInfo::Module => "Module",
            CpInfo::Package => "Package",
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ConstantPool {
    entries: Vec<CpInfo>,
}

impl ConstantPool {
    pub(crate) fn parse(reader: &mut Reader<'_>) -> Result<Self> {
        let count = reader.read_u2()?;
        let mut entries = Vec::with_capacity(count as usize);
        entries.push(CpInfo::Unusable);

        while entries.len() < count as usize {
            let tag = reader.read_u1()?;
            let entry = match tag {
                1 => {
                    let len = reader.read_u2()? as usize;
                    CpInfo::Utf8(decode_modified_utf8(reader.read_bytes(len)?)?)
                }
                3 => {
                    reader.skip(4)?;
                    CpInfo::Integer
                }
                4 => {
                    reader.skip(4)?;
                    CpInfo::Float
                }
                5 | 6 => {
                    reader.skip(8)?;
                    entries.push(if tag == 5 { CpInfo::Long } else { CpInfo::Double });
                    // 8-byte constants take up two slots.
                    CpInfo::Unusable
                }
                7 => CpInfo::Class {
                    name_index: reader.read_u2()?,
                },
                8 => {
                    reader.skip(2)?;
                    CpInfo::String
                }
                9 | 10 | 11 => {
                    reader.skip(4)?;
                    match tag {
                        9 => CpInfo::FieldRef,
                        10 => CpInfo::MethodRef,
                        _ => CpInfo::InterfaceMethodRef,
                    }
                }
                12 => {
                    reader.skip(4)?;
                    CpInfo::NameAndType
                }
                15 => {
                    reader.skip(3)?;
                    CpInfo::MethodHandle
                }
                16 => {
                    reader.skip(2)?;
                    CpInfo::MethodType
                }
                17 | 18 => {
                    reader.skip(4)?;
                    if tag == 17 {
                        CpInfo::Dynamic
                    } else {
                        CpInfo::InvokeDynamic
                    }
                }
                19 => {
                    reader.skip(2)?;
                    CpInfo::Module
                }
                20 => {
                    reader.skip(2)?;
                    CpInfo::Package
                }
                other => return Err(Error::InvalidConstantPoolTag(other)),
            };
            entries.push(entry);
        }

        if entries.len() != count as usize {
            // A trailing Long/Double overflowed the declared pool size.
            return Err(Error::InvalidConstantPoolIndex(count));
        }

        Ok(Self { entries })
    }

    fn get(&self, index: u16) -> Result<&CpInfo> {
        match self.entries.get(index as usize) {
            Some(CpInfo::Unusable) | None => Err(Error::InvalidConstantPoolIndex(index)),
            Some(entry) => Ok(entry),
        }
    }

    pub(crate) fn get_utf8(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            CpInfo::Utf8(value) => Ok(value),
            other => Err(Error::ConstantPoolTypeMismatch {
                index,
                expected: "Utf8",
                found: other.kind(),
            }),
        }
    }

    pub(crate) fn get_class_name(&self, index: u16) -> Result<String> {
        match self.get(index)? {
            CpInfo::Class { name_index } => Ok(self.get_utf8(*name_index)?.to_string()),
            other => Err(Error::ConstantPoolTypeMismatch {
                index,
                expected: "Class",
                found: other.kind(),
            }),
        }
    }
}

/// Decodes the JVM's "modified UTF-8": `0xC0 0x80` for NUL and surrogate pairs
/// encoded as two 3-byte sequences.
fn decode_modified_utf8(bytes: &[u8]) -> Result<String> {
    if bytes.is_ascii() && !bytes.contains(&0) {
        return std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| Error::InvalidModifiedUtf8);
    }

    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b0 = bytes[i];
        if b0 & 0x80 == 0 {
            if b0 == 0 {
                return Err(Error::InvalidModifiedUtf8);
            }
            units.push(b0 as u16);
            i += 1;
        } else if b0 & 0xE0 == 0xC0 {
            let b1 = *bytes.get(i + 1).ok_or(Error::InvalidModifiedUtf8)?;
            if b1 & 0xC0 != 0x80 {
                return Err(Error::InvalidModifiedUtf8);
            }
            units.push((((b0 & 0x1F) as u16) << 6) | (b1 & 0x3F) as u16);
            i += 2;
        } else if b0 & 0xF0 == 0xE0 {
            let b1 = *bytes.get(i + 1).ok_or(Error::InvalidModifiedUtf8)?;
            let b2 = *bytes.get(i + 2).ok_or(Error::InvalidModifiedUtf8)?;
            if b1 & 0xC0 != 0x80 || b2 & 0xC0 != 0x80 {
                return Err(Error::InvalidModifiedUtf8);
            }
            units.push(
                (((b0 & 0x0F) as u16) << 12) | (((b1 & 0x3F) as u16) << 6) | (b2 & 0x3F) as u16,
            );
            i += 3;
        } else {
            return Err(Error::InvalidModifiedUtf8);
        }
    }

    String::from_utf16(&units).map_err(|_| Error::InvalidModifiedUtf8)
}
