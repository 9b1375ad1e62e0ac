//! Whole-class decoding and encoding.

use anyhow::{anyhow, Context, Result};

use crate::annotation::{parse_annotations, Annotation};
use crate::attribute::{
    find_attribute, parse_attributes, write_attributes, Attribute, CODE,
    RUNTIME_INVISIBLE_ANNOTATIONS, RUNTIME_VISIBLE_ANNOTATIONS,
};
use crate::code::CodeAttribute;
use crate::constant_pool::{ConstantPool, RefKind};
use crate::invoke::InvocationKind;
use crate::reader::{u16_len, write_u16, write_u32, ByteReader};

pub const MAGIC: u32 = 0xCAFE_BABE;

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_SUPER: u16 = 0x0020;
pub const ACC_INTERFACE: u16 = 0x0200;
pub const ACC_ABSTRACT: u16 = 0x0400;

/// A field or method declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub access_flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<Attribute>,
}

impl Member {
    fn parse(r: &mut ByteReader<'_>) -> Result<Self> {
        Ok(Self {
            access_flags: r.read_u16()?,
            name_index: r.read_u16()?,
            descriptor_index: r.read_u16()?,
            attributes: parse_attributes(r)?,
        })
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        write_u16(out, self.access_flags);
        write_u16(out, self.name_index);
        write_u16(out, self.descriptor_index);
        write_attributes(out, &self.attributes)
    }

    pub fn name(&self, pool: &ConstantPool) -> Result<String> {
        pool.utf8(self.name_index)
    }

    pub fn descriptor(&self, pool: &ConstantPool) -> Result<String> {
        pool.utf8(self.descriptor_index)
    }

    pub fn is_static(&self) -> bool {
        self.access_flags & ACC_STATIC != 0
    }

    /// Annotations from both the visible and invisible attributes, visible first.
    pub fn annotations(&self, pool: &ConstantPool) -> Result<Vec<Annotation>> {
        let mut out = Vec::new();
        for name in [RUNTIME_VISIBLE_ANNOTATIONS, RUNTIME_INVISIBLE_ANNOTATIONS] {
            if let Some(attr) = find_attribute(&self.attributes, pool, name) {
                out.extend(parse_annotations(&attr.info, pool).with_context(|| {
                    format!("failed to decode {}", name)
                })?);
            }
        }
        Ok(out)
    }

    /// Position of the `Code` attribute, if the member has a body.
    pub fn code_index(&self, pool: &ConstantPool) -> Option<usize> {
        self.attributes
            .iter()
            .position(|a| a.name(pool).map(|n| n == CODE).unwrap_or(false))
    }

    pub fn code(&self, pool: &ConstantPool) -> Result<Option<CodeAttribute>> {
        match self.code_index(pool) {
            Some(i) => Ok(Some(CodeAttribute::parse(&self.attributes[i].info)?)),
            None => Ok(None),
        }
    }
}

/// A call instruction resolved through the constant pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeSite {
    pub offset: usize,
    pub kind: InvocationKind,
    /// Empty for `invokedynamic`, which has no static owner.
    pub owner: String,
    pub name: String,
    pub descriptor: String,
    pub interface_ref: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub constant_pool: ConstantPool,
    pub access_flags: u16,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<Member>,
    pub methods: Vec<Member>,
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(bytes);
        let magic = r.read_u32()?;
        if magic != MAGIC {
            return Err(anyhow!("bad magic {:#010x}, not a class file", magic));
        }
        let minor_version = r.read_u16()?;
        let major_version = r.read_u16()?;
        let constant_pool = ConstantPool::parse(&mut r).context("constant pool")?;
        let access_flags = r.read_u16()?;
        let this_class = r.read_u16()?;
        let super_class = r.read_u16()?;

        let interface_count = r.read_u16()?;
        let mut interfaces = Vec::with_capacity(interface_count as usize);
        for _ in 0..interface_count {
            interfaces.push(r.read_u16()?);
        }

        let field_count = r.read_u16()?;
        let mut fields = Vec::with_capacity(field_count as usize);
        for i in 0..field_count {
            fields.push(Member::parse(&mut r).with_context(|| format!("field #{}", i))?);
        }

        let method_count = r.read_u16()?;
        let mut methods = Vec::with_capacity(method_count as usize);
        for i in 0..method_count {
            methods.push(Member::parse(&mut r).with_context(|| format!("method #{}", i))?);
        }

        let attributes = parse_attributes(&mut r).context("class attributes")?;
        if !r.is_empty() {
            return Err(anyhow!(
                "{} trailing bytes after class attributes",
                r.remaining()
            ));
        }

        Ok(Self {
            minor_version,
            major_version,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        write_u32(&mut out, MAGIC);
        write_u16(&mut out, self.minor_version);
        write_u16(&mut out, self.major_version);
        self.constant_pool.write(&mut out);
        write_u16(&mut out, self.access_flags);
        write_u16(&mut out, self.this_class);
        write_u16(&mut out, self.super_class);
        write_u16(&mut out, u16_len(self.interfaces.len(), "interfaces")?);
        for i in &self.interfaces {
            write_u16(&mut out, *i);
        }
        write_u16(&mut out, u16_len(self.fields.len(), "fields")?);
        for f in &self.fields {
            f.write(&mut out)?;
        }
        write_u16(&mut out, u16_len(self.methods.len(), "methods")?);
        for m in &self.methods {
            m.write(&mut out)?;
        }
        write_attributes(&mut out, &self.attributes)?;
        Ok(out)
    }

    /// Internal name, e.g. `com/example/Foo`.
    pub fn name(&self) -> Result<String> {
        self.constant_pool.class_name(self.this_class)
    }

    pub fn super_name(&self) -> Result<Option<String>> {
        if self.super_class == 0 {
            return Ok(None);
        }
        self.constant_pool.class_name(self.super_class).map(Some)
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags & ACC_INTERFACE != 0
    }

    /// Every call instruction in `code`, resolved to owner/name/descriptor.
    pub fn invoke_sites(&self, code: &CodeAttribute) -> Result<Vec<InvokeSite>> {
        let mut sites = Vec::new();
        for insn in code.instructions()? {
            let Some((kind, index)) = code.invoke_operand(&insn) else {
                continue;
            };
            let site = if kind == InvocationKind::Dynamic {
                let (name, descriptor) = self.constant_pool.invoke_dynamic(index)?;
                InvokeSite {
                    offset: insn.offset,
                    kind,
                    owner: String::new(),
                    name,
                    descriptor,
                    interface_ref: false,
                }
            } else {
                let member = self.constant_pool.member_ref(index)?;
                if member.kind == RefKind::Field {
                    return Err(anyhow!(
                        "{} at offset {} references a field",
                        kind,
                        insn.offset
                    ));
                }
                InvokeSite {
                    offset: insn.offset,
                    kind,
                    owner: member.owner,
                    name: member.name,
                    descriptor: member.descriptor,
                    interface_ref: member.kind == RefKind::InterfaceMethod,
                }
            };
            sites.push(site);
        }
        Ok(sites)
    }
}
