//! `Runtime{Visible,Invisible}Annotations` decoding and encoding.
//!
//! Element values are resolved against the constant pool on read, so callers
//! see names and literals rather than indices.

use anyhow::{anyhow, Result};

use crate::constant_pool::{Constant, ConstantPool};
use crate::reader::{u16_len, write_u16, ByteReader};

#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    /// Field descriptor of the annotation type, e.g. `Lcom/example/Marker;`.
    pub type_descriptor: String,
    pub elements: Vec<(String, ElementValue)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElementValue {
    /// `B`, `C`, `I`, `S` and `Z` all carry an Integer constant.
    Int { tag: char, value: i32 },
    Long(i64),
    /// Raw IEEE-754 bits.
    Float(u32),
    /// Raw IEEE-754 bits.
    Double(u64),
    String(String),
    Enum {
        type_descriptor: String,
        const_name: String,
    },
    /// Return descriptor of a class literal, e.g. `Landroid/app/ActivityManager;`.
    Class(String),
    Annotation(Annotation),
    Array(Vec<ElementValue>),
}

impl ElementValue {
    pub fn tag(&self) -> char {
        match self {
            ElementValue::Int { tag, .. } => *tag,
            ElementValue::Long(_) => 'J',
            ElementValue::Float(_) => 'F',
            ElementValue::Double(_) => 'D',
            ElementValue::String(_) => 's',
            ElementValue::Enum { .. } => 'e',
            ElementValue::Class(_) => 'c',
            ElementValue::Annotation(_) => '@',
            ElementValue::Array(_) => '[',
        }
    }

    /// Short description for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ElementValue::Int { .. } => "int",
            ElementValue::Long(_) => "long",
            ElementValue::Float(_) => "float",
            ElementValue::Double(_) => "double",
            ElementValue::String(_) => "string",
            ElementValue::Enum { .. } => "enum",
            ElementValue::Class(_) => "class",
            ElementValue::Annotation(_) => "annotation",
            ElementValue::Array(_) => "array",
        }
    }
}

impl Annotation {
    pub fn new(type_descriptor: impl Into<String>) -> Self {
        Self {
            type_descriptor: type_descriptor.into(),
            elements: Vec::new(),
        }
    }

    pub fn with_element(mut self, name: impl Into<String>, value: ElementValue) -> Self {
        self.elements.push((name.into(), value));
        self
    }

    pub fn element(&self, name: &str) -> Option<&ElementValue> {
        self.elements
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

/// Decode the body of an annotations attribute.
pub fn parse_annotations(info: &[u8], pool: &ConstantPool) -> Result<Vec<Annotation>> {
    let mut r = ByteReader::new(info);
    let count = r.read_u16()?;
    let mut annotations = Vec::with_capacity(count as usize);
    for _ in 0..count {
        annotations.push(parse_annotation(&mut r, pool)?);
    }
    if !r.is_empty() {
        return Err(anyhow!(
            "{} trailing bytes after annotations",
            r.remaining()
        ));
    }
    Ok(annotations)
}

fn parse_annotation(r: &mut ByteReader<'_>, pool: &ConstantPool) -> Result<Annotation> {
    let type_descriptor = pool.utf8(r.read_u16()?)?;
    let pairs = r.read_u16()?;
    let mut elements = Vec::with_capacity(pairs as usize);
    for _ in 0..pairs {
        let name = pool.utf8(r.read_u16()?)?;
        let value = parse_element_value(r, pool)?;
        elements.push((name, value));
    }
    Ok(Annotation {
        type_descriptor,
        elements,
    })
}

fn parse_element_value(r: &mut ByteReader<'_>, pool: &ConstantPool) -> Result<ElementValue> {
    let tag = r.read_u8()? as char;
    let value = match tag {
        'B' | 'C' | 'I' | 'S' | 'Z' => {
            let index = r.read_u16()?;
            match pool.get(index)? {
                Constant::Integer(value) => ElementValue::Int { tag, value: *value },
                other => return Err(anyhow!("element '{}' expects Integer, got {:?}", tag, other)),
            }
        }
        'J' => match pool.get(r.read_u16()?)? {
            Constant::Long(v) => ElementValue::Long(*v),
            other => return Err(anyhow!("element 'J' expects Long, got {:?}", other)),
        },
        'F' => match pool.get(r.read_u16()?)? {
            Constant::Float(v) => ElementValue::Float(*v),
            other => return Err(anyhow!("element 'F' expects Float, got {:?}", other)),
        },
        'D' => match pool.get(r.read_u16()?)? {
            Constant::Double(v) => ElementValue::Double(*v),
            other => return Err(anyhow!("element 'D' expects Double, got {:?}", other)),
        },
        's' => ElementValue::String(pool.utf8(r.read_u16()?)?),
        'e' => ElementValue::Enum {
            type_descriptor: pool.utf8(r.read_u16()?)?,
            const_name: pool.utf8(r.read_u16()?)?,
        },
        'c' => ElementValue::Class(pool.utf8(r.read_u16()?)?),
        '@' => ElementValue::Annotation(parse_annotation(r, pool)?),
        '[' => {
            let n = r.read_u16()?;
            let mut values = Vec::with_capacity(n as usize);
            for _ in 0..n {
                values.push(parse_element_value(r, pool)?);
            }
            ElementValue::Array(values)
        }
        other => return Err(anyhow!("unknown element_value tag {:?}", other)),
    };
    Ok(value)
}

/// Encode an annotations attribute body, interning what it needs into `pool`.
pub fn write_annotations(annotations: &[Annotation], pool: &mut ConstantPool) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    write_u16(&mut out, u16_len(annotations.len(), "annotations")?);
    for a in annotations {
        write_annotation(&mut out, a, pool)?;
    }
    Ok(out)
}

fn write_annotation(out: &mut Vec<u8>, a: &Annotation, pool: &mut ConstantPool) -> Result<()> {
    write_u16(out, pool.intern_utf8(&a.type_descriptor)?);
    write_u16(out, u16_len(a.elements.len(), "annotation elements")?);
    for (name, value) in &a.elements {
        write_u16(out, pool.intern_utf8(name)?);
        write_element_value(out, value, pool)?;
    }
    Ok(())
}

fn write_element_value(out: &mut Vec<u8>, value: &ElementValue, pool: &mut ConstantPool) -> Result<()> {
    out.push(value.tag() as u8);
    match value {
        ElementValue::Int { value, .. } => write_u16(out, pool.intern_integer(*value)?),
        ElementValue::String(s) => write_u16(out, pool.intern_utf8(s)?),
        ElementValue::Enum {
            type_descriptor,
            const_name,
        } => {
            write_u16(out, pool.intern_utf8(type_descriptor)?);
            write_u16(out, pool.intern_utf8(const_name)?);
        }
        ElementValue::Class(descriptor) => write_u16(out, pool.intern_utf8(descriptor)?),
        ElementValue::Annotation(nested) => write_annotation(out, nested, pool)?,
        ElementValue::Array(values) => {
            write_u16(out, u16_len(values.len(), "array elements")?);
            for v in values {
                write_element_value(out, v, pool)?;
            }
        }
        ElementValue::Long(_) | ElementValue::Float(_) | ElementValue::Double(_) => {
            return Err(anyhow!(
                "encoding {} element values is not supported",
                value.kind_name()
            ))
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_shaped_annotation_round_trip() {
        let mut pool = ConstantPool::new();
        let marker = Annotation::new("Lcom/example/Marker;")
            .with_element(
                "oriClass",
                ElementValue::Class("Landroid/app/ActivityManager;".to_string()),
            )
            .with_element("oriMethod", ElementValue::String("getRunningTasks".to_string()))
            .with_element("oriAccess", ElementValue::Int { tag: 'I', value: 182 })
            .with_element(
                "tags",
                ElementValue::Array(vec![ElementValue::String("a".to_string())]),
            );

        let bytes = write_annotations(std::slice::from_ref(&marker), &mut pool).unwrap();
        let parsed = parse_annotations(&bytes, &pool).unwrap();
        assert_eq!(parsed, vec![marker]);
        assert_eq!(
            parsed[0].element("oriAccess"),
            Some(&ElementValue::Int { tag: 'I', value: 182 })
        );
        assert!(parsed[0].element("missing").is_none());
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut pool = ConstantPool::new();
        let mut bytes = write_annotations(&[], &mut pool).unwrap();
        bytes.push(0);
        assert!(parse_annotations(&bytes, &pool).is_err());
    }
}
