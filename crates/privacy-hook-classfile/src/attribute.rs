//! Raw attributes. Interpreted on demand, re-encoded verbatim otherwise.

use anyhow::Result;

use crate::constant_pool::ConstantPool;
use crate::reader::{u16_len, write_u16, write_u32, ByteReader};

pub const CODE: &str = "Code";
pub const RUNTIME_VISIBLE_ANNOTATIONS: &str = "RuntimeVisibleAnnotations";
pub const RUNTIME_INVISIBLE_ANNOTATIONS: &str = "RuntimeInvisibleAnnotations";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name_index: u16,
    pub info: Vec<u8>,
}

impl Attribute {
    pub fn name(&self, pool: &ConstantPool) -> Result<String> {
        pool.utf8(self.name_index)
    }
}

pub fn parse_attributes(r: &mut ByteReader<'_>) -> Result<Vec<Attribute>> {
    let count = r.read_u16()?;
    let mut attributes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name_index = r.read_u16()?;
        let len = r.read_u32()? as usize;
        let info = r.read_bytes(len)?.to_vec();
        attributes.push(Attribute { name_index, info });
    }
    Ok(attributes)
}

pub fn write_attributes(out: &mut Vec<u8>, attributes: &[Attribute]) -> Result<()> {
    write_u16(out, u16_len(attributes.len(), "attributes")?);
    for attr in attributes {
        write_u16(out, attr.name_index);
        write_u32(out, attr.info.len() as u32);
        out.extend_from_slice(&attr.info);
    }
    Ok(())
}

/// First attribute whose name resolves to `name`.
pub fn find_attribute<'a>(
    attributes: &'a [Attribute],
    pool: &ConstantPool,
    name: &str,
) -> Option<&'a Attribute> {
    attributes
        .iter()
        .find(|a| a.name(pool).map(|n| n == name).unwrap_or(false))
}
