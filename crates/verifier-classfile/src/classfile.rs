use crate::constant_pool::ConstantPool;
use crate::error::{Error, Result};
use crate::reader::Reader;
use crate::{ACC_ABSTRACT, ACC_INTERFACE};

/// A parsed class file, reduced to what compatibility checks need: names,
/// hierarchy, member signatures and deprecation markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub access_flags: u16,
    /// Internal name, e.g. `com/example/Foo$Inner`.
    pub this_class: String,
    pub super_class: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<ClassMember>,
    pub methods: Vec<ClassMember>,
    pub signature: Option<String>,
    pub source_file: Option<String>,
    pub deprecated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassMember {
    pub access_flags: u16,
    pub name: String,
    pub descriptor: String,
    pub signature: Option<String>,
    pub deprecated: bool,
}

impl ClassFile {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        let magic = reader.read_u4()?;
        if magic != 0xCAFEBABE {
            return Err(Error::InvalidMagic(magic));
        }

        let minor_version = reader.read_u2()?;
        let major_version = reader.read_u2()?;
        let cp = ConstantPool::parse(&mut reader)?;

        let access_flags = reader.read_u2()?;
        let this_class = cp.get_class_name(reader.read_u2()?)?;
        let super_class_idx = reader.read_u2()?;
        let super_class = if super_class_idx == 0 {
            None
        } else {
            Some(cp.get_class_name(super_class_idx)?)
        };

        let interfaces_count = reader.read_u2()? as usize;
        let mut interfaces = Vec::with_capacity(interfaces_count);
        for _ in 0..interfaces_count {
            interfaces.push(cp.get_class_name(reader.read_u2()?)?);
        }

        let fields_count = reader.read_u2()? as usize;
        let mut fields = Vec::with_capacity(fields_count);
        for _ in 0..fields_count {
            fields.push(parse_member(&mut reader, &cp)?);
        }

        let methods_count = reader.read_u2()? as usize;
        let mut methods = Vec::with_capacity(methods_count);
        for _ in 0..methods_count {
            methods.push(parse_member(&mut reader, &cp)?);
        }

        let class_attrs = parse_attributes(&mut reader, &cp)?;

        reader.ensure_empty()?;

        Ok(Self {
            minor_version,
            major_version,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            signature: class_attrs.signature,
            source_file: class_attrs.source_file,
            deprecated: class_attrs.deprecated,
        })
    }

    pub fn package_name(&self) -> &str {
        crate::package_of(&self.this_class)
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags & ACC_INTERFACE != 0
    }

    pub fn is_abstract(&self) -> bool {
        self.access_flags & ACC_ABSTRACT != 0
    }

    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<&ClassMember> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.descriptor == descriptor)
    }

    pub fn find_field(&self, name: &str) -> Option<&ClassMember> {
        self.fields.iter().find(|f| f.name == name)
    }
}

fn parse_member(reader: &mut Reader<'_>, cp: &ConstantPool) -> Result<ClassMember> {
    let access_flags = reader.read_u2()?;
    let name = cp.get_utf8(reader.read_u2()?)?.to_string();
    let descriptor = cp.get_utf8(reader.read_u2()?)?.to_string();

    let attrs = parse_attributes(reader, cp)?;
    Ok(ClassMember {
        access_flags,
        name,
        descriptor,
        signature: attrs.signature,
        deprecated: attrs.deprecated,
    })
}

#[derive(Default)]
struct ParsedAttributes {
    signature: Option<String>,
    source_file: Option<String>,
    deprecated: bool,
}

fn parse_attributes(reader: &mut Reader<'_>, cp: &ConstantPool) -> Result<ParsedAttributes> {
    let attributes_count = reader.read_u2()? as usize;
    let mut parsed = ParsedAttributes::default();
    for _ in 0..attributes_count {
        let name_index = reader.read_u2()?;
        let length = reader.read_u4()? as usize;
        let info = reader.read_bytes(length)?;
        let name = cp.get_utf8(name_index)?;

        let mut sub = Reader::new(info);
        match name {
            "Signature" => {
                let sig_index = sub.read_u2().map_err(|_| Error::MalformedAttribute("Signature"))?;
                parsed.signature = Some(cp.get_utf8(sig_index)?.to_string());
                sub.ensure_empty()
                    .map_err(|_| Error::MalformedAttribute("Signature"))?;
            }
            "SourceFile" => {
                let index = sub
                    .read_u2()
                    .map_err(|_| Error::MalformedAttribute("SourceFile"))?;
                parsed.source_file = Some(cp.get_utf8(index)?.to_string());
                sub.ensure_empty()
                    .map_err(|_| Error::MalformedAttribute("SourceFile"))?;
            }
            "Deprecated" => {
                sub.ensure_empty()
                    .map_err(|_| Error::MalformedAttribute("Deprecated"))?;
                parsed.deprecated = true;
            }
            _ => {
                // Code, annotations, etc. are irrelevant to class resolution.
            }
        }
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use verifier_test_utils::ClassBuilder;

    #[test]
    fn parses_hierarchy_and_members() {
        let bytes = ClassBuilder::new("com/example/Foo")
            .super_class("com/example/Base")
            .interface("java/lang/Runnable")
            .method("run", "()V")
            .deprecated_method("old", "()I")
            .field("count", "I")
            .build();

        let class = ClassFile::parse(&bytes).unwrap();
        assert_eq!(class.this_class, "com/example/Foo");
        assert_eq!(class.super_class.as_deref(), Some("com/example/Base"));
        assert_eq!(class.interfaces, vec!["java/lang/Runnable".to_string()]);
        assert_eq!(class.package_name(), "com/example");
        assert!(!class.is_interface());

        let run = class.find_method("run", "()V").unwrap();
        assert!(!run.deprecated);
        assert!(class.find_method("old", "()I").unwrap().deprecated);
        assert_eq!(class.find_field("count").unwrap().descriptor, "I");
    }

    #[test]
    fn class_without_super_class() {
        let bytes = ClassBuilder::new("java/lang/Object").no_super_class().build();
        let class = ClassFile::parse(&bytes).unwrap();
        assert!(class.super_class.is_none());
        assert_eq!(class.package_name(), "java/lang");
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = ClassBuilder::new("A").build();
        bytes[0] = 0;
        assert!(matches!(
            ClassFile::parse(&bytes),
            Err(Error::InvalidMagic(_))
        ));
    }

    #[test]
    fn rejects_truncated_and_trailing_input() {
        let bytes = ClassBuilder::new("A").build();
        assert_eq!(
            ClassFile::parse(&bytes[..bytes.len() - 1]),
            Err(Error::UnexpectedEof)
        );

        let mut padded = bytes.clone();
        padded.push(0);
        assert_eq!(ClassFile::parse(&padded), Err(Error::TrailingBytes(1)));
    }
}
