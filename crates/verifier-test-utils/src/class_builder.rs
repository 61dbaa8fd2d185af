use std::collections::HashMap;

const ACC_PUBLIC: u16 = 0x0001;
const ACC_SUPER: u16 = 0x0020;

struct Member {
    access_flags: u16,
    name: String,
    descriptor: String,
    deprecated: bool,
}

/// Writes a structurally valid (not verifiable) class file.
pub struct ClassBuilder {
    name: String,
    super_class: Option<String>,
    interfaces: Vec<String>,
    access_flags: u16,
    fields: Vec<Member>,
    methods: Vec<Member>,
    deprecated: bool,
    major_version: u16,
}

impl ClassBuilder {
    pub fn new(internal_name: &str) -> Self {
        Self {
            name: internal_name.to_string(),
            super_class: Some("java/lang/Object".to_string()),
            interfaces: Vec::new(),
            access_flags: ACC_PUBLIC | ACC_SUPER,
            fields: Vec::new(),
            methods: Vec::new(),
            deprecated: false,
            major_version: 52,
        }
    }

    pub fn super_class(mut self, internal_name: &str) -> Self {
        self.super_class = Some(internal_name.to_string());
        self
    }

    pub fn no_super_class(mut self) -> Self {
        self.super_class = None;
        self
    }

    pub fn interface(mut self, internal_name: &str) -> Self {
        self.interfaces.push(internal_name.to_string());
        self
    }

    pub fn access_flags(mut self, flags: u16) -> Self {
        self.access_flags = flags;
        self
    }

    pub fn deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }

    pub fn major_version(mut self, version: u16) -> Self {
        self.major_version = version;
        self
    }

    pub fn field(mut self, name: &str, descriptor: &str) -> Self {
        self.fields.push(Member {
            access_flags: ACC_PUBLIC,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            deprecated: false,
        });
        self
    }

    pub fn method(mut self, name: &str, descriptor: &str) -> Self {
        self.methods.push(Member {
            access_flags: ACC_PUBLIC,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            deprecated: false,
        });
        self
    }

    pub fn deprecated_method(mut self, name: &str, descriptor: &str) -> Self {
        self.methods.push(Member {
            access_flags: ACC_PUBLIC,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            deprecated: true,
        });
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut pool = PoolWriter::default();

        let this_index = pool.class(&self.name);
        let super_index = self.super_class.as_deref().map(|s| pool.class(s)).unwrap_or(0);
        let interface_indices: Vec<u16> = self.interfaces.iter().map(|i| pool.class(i)).collect();

        let mut body = Vec::new();
        push_u2(&mut body, self.access_flags);
        push_u2(&mut body, this_index);
        push_u2(&mut body, super_index);
        push_u2(&mut body, interface_indices.len() as u16);
        for index in interface_indices {
            push_u2(&mut body, index);
        }
        for members in [&self.fields, &self.methods] {
            push_u2(&mut body, members.len() as u16);
            for member in members {
                push_u2(&mut body, member.access_flags);
                push_u2(&mut body, pool.utf8(&member.name));
                push_u2(&mut body, pool.utf8(&member.descriptor));
                write_deprecated_attr(&mut body, &mut pool, member.deprecated);
            }
        }
        write_deprecated_attr(&mut body, &mut pool, self.deprecated);

        let mut out = Vec::new();
        out.extend_from_slice(&0xCAFEBABEu32.to_be_bytes());
        push_u2(&mut out, 0);
        push_u2(&mut out, self.major_version);
        push_u2(&mut out, pool.entries.len() as u16 + 1);
        for entry in &pool.entries {
            out.extend_from_slice(entry);
        }
        out.extend_from_slice(&body);
        out
    }
}

fn write_deprecated_attr(body: &mut Vec<u8>, pool: &mut PoolWriter, deprecated: bool) {
    if deprecated {
        push_u2(body, 1);
        push_u2(body, pool.utf8("Deprecated"));
        body.extend_from_slice(&0u32.to_be_bytes());
    } else {
        push_u2(body, 0);
    }
}

fn push_u2(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

#[derive(Default)]
struct PoolWriter {
    entries: Vec<Vec<u8>>,
    utf8: HashMap<String, u16>,
    classes: HashMap<String, u16>,
}

impl PoolWriter {
    fn utf8(&mut self, value: &str) -> u16 {
        if let Some(index) = self.utf8.get(value) {
            return *index;
        }
        let mut entry = vec![1u8];
        push_u2(&mut entry, value.len() as u16);
        entry.extend_from_slice(value.as_bytes());
        let index = self.push(entry);
        self.utf8.insert(value.to_string(), index);
        index
    }

    fn class(&mut self, name: &str) -> u16 {
        if let Some(index) = self.classes.get(name) {
            return *index;
        }
        let name_index = self.utf8(name);
        let mut entry = vec![7u8];
        push_u2(&mut entry, name_index);
        let index = self.push(entry);
        self.classes.insert(name.to_string(), index);
        index
    }

    fn push(&mut self, entry: Vec<u8>) -> u16 {
        self.entries.push(entry);
        self.entries.len() as u16
    }
}
