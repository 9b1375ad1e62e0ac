//! Constant pool decoding, lookup and interning.
//!
//! Entries keep their raw payloads so an untouched pool re-encodes to the
//! exact input bytes. Interning only ever appends, which keeps every existing
//! index stable.

use anyhow::{anyhow, Result};

use crate::mutf8;
use crate::reader::{write_u16, write_u32, ByteReader};

pub const TAG_UTF8: u8 = 1;
pub const TAG_INTEGER: u8 = 3;
pub const TAG_FLOAT: u8 = 4;
pub const TAG_LONG: u8 = 5;
pub const TAG_DOUBLE: u8 = 6;
pub const TAG_CLASS: u8 = 7;
pub const TAG_STRING: u8 = 8;
pub const TAG_FIELDREF: u8 = 9;
pub const TAG_METHODREF: u8 = 10;
pub const TAG_INTERFACE_METHODREF: u8 = 11;
pub const TAG_NAME_AND_TYPE: u8 = 12;
pub const TAG_METHOD_HANDLE: u8 = 15;
pub const TAG_METHOD_TYPE: u8 = 16;
pub const TAG_DYNAMIC: u8 = 17;
pub const TAG_INVOKE_DYNAMIC: u8 = 18;
pub const TAG_MODULE: u8 = 19;
pub const TAG_PACKAGE: u8 = 20;

/// Highest number of slots a pool may hold (the count field is a u16).
const MAX_SLOTS: usize = u16::MAX as usize;

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Raw modified UTF-8 bytes.
    Utf8(Vec<u8>),
    Integer(i32),
    /// Raw IEEE-754 bits.
    Float(u32),
    Long(i64),
    /// Raw IEEE-754 bits.
    Double(u64),
    Class {
        name_index: u16,
    },
    String {
        string_index: u16,
    },
    FieldRef {
        class_index: u16,
        name_and_type_index: u16,
    },
    MethodRef {
        class_index: u16,
        name_and_type_index: u16,
    },
    InterfaceMethodRef {
        class_index: u16,
        name_and_type_index: u16,
    },
    NameAndType {
        name_index: u16,
        descriptor_index: u16,
    },
    MethodHandle {
        reference_kind: u8,
        reference_index: u16,
    },
    MethodType {
        descriptor_index: u16,
    },
    Dynamic {
        bootstrap_method_attr_index: u16,
        name_and_type_index: u16,
    },
    InvokeDynamic {
        bootstrap_method_attr_index: u16,
        name_and_type_index: u16,
    },
    Module {
        name_index: u16,
    },
    Package {
        name_index: u16,
    },
    /// Slot 0 and the second slot of every Long/Double.
    Unusable,
}

/// What a `*ref` constant points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    Field,
    Method,
    InterfaceMethod,
}

/// A resolved Fieldref/Methodref/InterfaceMethodref.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRef {
    pub kind: RefKind,
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstantPool {
    entries: Vec<Constant>,
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantPool {
    pub fn new() -> Self {
        Self {
            entries: vec![Constant::Unusable],
        }
    }

    pub fn parse(r: &mut ByteReader<'_>) -> Result<Self> {
        let count = r.read_u16()? as usize;
        if count == 0 {
            return Err(anyhow!("constant_pool_count must be at least 1"));
        }
        let mut entries = Vec::with_capacity(count);
        entries.push(Constant::Unusable);

        while entries.len() < count {
            let index = entries.len();
            let tag = r.read_u8()?;
            let constant = match tag {
                TAG_UTF8 => {
                    let len = r.read_u16()? as usize;
                    Constant::Utf8(r.read_bytes(len)?.to_vec())
                }
                TAG_INTEGER => Constant::Integer(r.read_i32()?),
                TAG_FLOAT => Constant::Float(r.read_u32()?),
                TAG_LONG => {
                    let hi = r.read_u32()? as u64;
                    let lo = r.read_u32()? as u64;
                    Constant::Long(((hi << 32) | lo) as i64)
                }
                TAG_DOUBLE => {
                    let hi = r.read_u32()? as u64;
                    let lo = r.read_u32()? as u64;
                    Constant::Double((hi << 32) | lo)
                }
                TAG_CLASS => Constant::Class {
                    name_index: r.read_u16()?,
                },
                TAG_STRING => Constant::String {
                    string_index: r.read_u16()?,
                },
                TAG_FIELDREF => Constant::FieldRef {
                    class_index: r.read_u16()?,
                    name_and_type_index: r.read_u16()?,
                },
                TAG_METHODREF => Constant::MethodRef {
                    class_index: r.read_u16()?,
                    name_and_type_index: r.read_u16()?,
                },
                TAG_INTERFACE_METHODREF => Constant::InterfaceMethodRef {
                    class_index: r.read_u16()?,
                    name_and_type_index: r.read_u16()?,
                },
                TAG_NAME_AND_TYPE => Constant::NameAndType {
                    name_index: r.read_u16()?,
                    descriptor_index: r.read_u16()?,
                },
                TAG_METHOD_HANDLE => Constant::MethodHandle {
                    reference_kind: r.read_u8()?,
                    reference_index: r.read_u16()?,
                },
                TAG_METHOD_TYPE => Constant::MethodType {
                    descriptor_index: r.read_u16()?,
                },
                TAG_DYNAMIC => Constant::Dynamic {
                    bootstrap_method_attr_index: r.read_u16()?,
                    name_and_type_index: r.read_u16()?,
                },
                TAG_INVOKE_DYNAMIC => Constant::InvokeDynamic {
                    bootstrap_method_attr_index: r.read_u16()?,
                    name_and_type_index: r.read_u16()?,
                },
                TAG_MODULE => Constant::Module {
                    name_index: r.read_u16()?,
                },
                TAG_PACKAGE => Constant::Package {
                    name_index: r.read_u16()?,
                },
                other => {
                    return Err(anyhow!(
                        "unknown constant pool tag {} at index {} (offset {})",
                        other,
                        index,
                        r.position() - 1
                    ))
                }
            };
            let wide = matches!(constant, Constant::Long(_) | Constant::Double(_));
            entries.push(constant);
            if wide {
                entries.push(Constant::Unusable);
            }
        }

        if entries.len() != count {
            return Err(anyhow!(
                "wide constant overruns constant_pool_count {}",
                count
            ));
        }
        Ok(Self { entries })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        write_u16(out, self.entries.len() as u16);
        for constant in self.entries.iter().skip(1) {
            match constant {
                Constant::Utf8(bytes) => {
                    out.push(TAG_UTF8);
                    write_u16(out, bytes.len() as u16);
                    out.extend_from_slice(bytes);
                }
                Constant::Integer(v) => {
                    out.push(TAG_INTEGER);
                    write_u32(out, *v as u32);
                }
                Constant::Float(bits) => {
                    out.push(TAG_FLOAT);
                    write_u32(out, *bits);
                }
                Constant::Long(v) => {
                    out.push(TAG_LONG);
                    out.extend_from_slice(&v.to_be_bytes());
                }
                Constant::Double(bits) => {
                    out.push(TAG_DOUBLE);
                    out.extend_from_slice(&bits.to_be_bytes());
                }
                Constant::Class { name_index } => {
                    out.push(TAG_CLASS);
                    write_u16(out, *name_index);
                }
                Constant::String { string_index } => {
                    out.push(TAG_STRING);
                    write_u16(out, *string_index);
                }
                Constant::FieldRef {
                    class_index,
                    name_and_type_index,
                } => write_pair(out, TAG_FIELDREF, *class_index, *name_and_type_index),
                Constant::MethodRef {
                    class_index,
                    name_and_type_index,
                } => write_pair(out, TAG_METHODREF, *class_index, *name_and_type_index),
                Constant::InterfaceMethodRef {
                    class_index,
                    name_and_type_index,
                } => write_pair(
                    out,
                    TAG_INTERFACE_METHODREF,
                    *class_index,
                    *name_and_type_index,
                ),
                Constant::NameAndType {
                    name_index,
                    descriptor_index,
                } => write_pair(out, TAG_NAME_AND_TYPE, *name_index, *descriptor_index),
                Constant::MethodHandle {
                    reference_kind,
                    reference_index,
                } => {
                    out.push(TAG_METHOD_HANDLE);
                    out.push(*reference_kind);
                    write_u16(out, *reference_index);
                }
                Constant::MethodType { descriptor_index } => {
                    out.push(TAG_METHOD_TYPE);
                    write_u16(out, *descriptor_index);
                }
                Constant::Dynamic {
                    bootstrap_method_attr_index,
                    name_and_type_index,
                } => write_pair(
                    out,
                    TAG_DYNAMIC,
                    *bootstrap_method_attr_index,
                    *name_and_type_index,
                ),
                Constant::InvokeDynamic {
                    bootstrap_method_attr_index,
                    name_and_type_index,
                } => write_pair(
                    out,
                    TAG_INVOKE_DYNAMIC,
                    *bootstrap_method_attr_index,
                    *name_and_type_index,
                ),
                Constant::Module { name_index } => {
                    out.push(TAG_MODULE);
                    write_u16(out, *name_index);
                }
                Constant::Package { name_index } => {
                    out.push(TAG_PACKAGE);
                    write_u16(out, *name_index);
                }
                Constant::Unusable => {}
            }
        }
    }

    /// Number of slots including the unused slot 0.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    pub fn get(&self, index: u16) -> Result<&Constant> {
        match self.entries.get(index as usize) {
            Some(Constant::Unusable) | None => {
                Err(anyhow!("invalid constant pool index {}", index))
            }
            Some(c) => Ok(c),
        }
    }

    pub fn utf8(&self, index: u16) -> Result<String> {
        match self.get(index)? {
            Constant::Utf8(bytes) => mutf8::decode(bytes)
                .map_err(|e| anyhow!("constant pool index {}: {}", index, e)),
            other => Err(anyhow!("index {} is not Utf8: {:?}", index, other)),
        }
    }

    pub fn class_name(&self, index: u16) -> Result<String> {
        match self.get(index)? {
            Constant::Class { name_index } => self.utf8(*name_index),
            other => Err(anyhow!("index {} is not a Class: {:?}", index, other)),
        }
    }

    pub fn name_and_type(&self, index: u16) -> Result<(String, String)> {
        match self.get(index)? {
            Constant::NameAndType {
                name_index,
                descriptor_index,
            } => Ok((self.utf8(*name_index)?, self.utf8(*descriptor_index)?)),
            other => Err(anyhow!("index {} is not a NameAndType: {:?}", index, other)),
        }
    }

    pub fn member_ref(&self, index: u16) -> Result<MemberRef> {
        let (kind, class_index, nat_index) = match self.get(index)? {
            Constant::FieldRef {
                class_index,
                name_and_type_index,
            } => (RefKind::Field, *class_index, *name_and_type_index),
            Constant::MethodRef {
                class_index,
                name_and_type_index,
            } => (RefKind::Method, *class_index, *name_and_type_index),
            Constant::InterfaceMethodRef {
                class_index,
                name_and_type_index,
            } => (RefKind::InterfaceMethod, *class_index, *name_and_type_index),
            other => return Err(anyhow!("index {} is not a member ref: {:?}", index, other)),
        };
        let owner = self.class_name(class_index)?;
        let (name, descriptor) = self.name_and_type(nat_index)?;
        Ok(MemberRef {
            kind,
            owner,
            name,
            descriptor,
        })
    }

    /// Name and descriptor of an `InvokeDynamic` call site.
    pub fn invoke_dynamic(&self, index: u16) -> Result<(String, String)> {
        match self.get(index)? {
            Constant::InvokeDynamic {
                name_and_type_index,
                ..
            } => self.name_and_type(*name_and_type_index),
            other => Err(anyhow!("index {} is not InvokeDynamic: {:?}", index, other)),
        }
    }

    fn push(&mut self, constant: Constant) -> Result<u16> {
        let slots = if matches!(constant, Constant::Long(_) | Constant::Double(_)) {
            2
        } else {
            1
        };
        if self.entries.len() + slots > MAX_SLOTS {
            return Err(anyhow!(
                "constant pool is full ({} slots), cannot add {:?}",
                self.entries.len(),
                constant
            ));
        }
        let index = self.entries.len() as u16;
        self.entries.push(constant);
        if slots == 2 {
            self.entries.push(Constant::Unusable);
        }
        Ok(index)
    }

    fn find(&self, constant: &Constant) -> Option<u16> {
        self.entries
            .iter()
            .position(|c| c == constant)
            .filter(|i| *i > 0)
            .map(|i| i as u16)
    }

    fn intern(&mut self, constant: Constant) -> Result<u16> {
        match self.find(&constant) {
            Some(index) => Ok(index),
            None => self.push(constant),
        }
    }

    pub fn intern_utf8(&mut self, value: &str) -> Result<u16> {
        let bytes = mutf8::encode(value);
        if bytes.len() > u16::MAX as usize {
            return Err(anyhow!("Utf8 constant too long: {} bytes", bytes.len()));
        }
        self.intern(Constant::Utf8(bytes))
    }

    pub fn intern_integer(&mut self, value: i32) -> Result<u16> {
        self.intern(Constant::Integer(value))
    }

    pub fn intern_class(&mut self, name: &str) -> Result<u16> {
        let name_index = self.intern_utf8(name)?;
        self.intern(Constant::Class { name_index })
    }

    pub fn intern_name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16> {
        let name_index = self.intern_utf8(name)?;
        let descriptor_index = self.intern_utf8(descriptor)?;
        self.intern(Constant::NameAndType {
            name_index,
            descriptor_index,
        })
    }

    /// Intern a Methodref (or InterfaceMethodref when `interface` is set).
    pub fn intern_method_ref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
        interface: bool,
    ) -> Result<u16> {
        let class_index = self.intern_class(owner)?;
        let name_and_type_index = self.intern_name_and_type(name, descriptor)?;
        let constant = if interface {
            Constant::InterfaceMethodRef {
                class_index,
                name_and_type_index,
            }
        } else {
            Constant::MethodRef {
                class_index,
                name_and_type_index,
            }
        };
        self.intern(constant)
    }

    pub fn intern_invoke_dynamic(
        &mut self,
        bootstrap_method_attr_index: u16,
        name: &str,
        descriptor: &str,
    ) -> Result<u16> {
        let name_and_type_index = self.intern_name_and_type(name, descriptor)?;
        self.intern(Constant::InvokeDynamic {
            bootstrap_method_attr_index,
            name_and_type_index,
        })
    }
}

fn write_pair(out: &mut Vec<u8>, tag: u8, a: u16, b: u16) {
    out.push(tag);
    write_u16(out, a);
    write_u16(out, b);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_reuses_existing_entries() {
        let mut pool = ConstantPool::new();
        let a = pool
            .intern_method_ref("android/location/LocationManager", "getLastKnownLocation", "(Ljava/lang/String;)Landroid/location/Location;", false)
            .unwrap();
        let len_after_first = pool.len();
        let b = pool
            .intern_method_ref("android/location/LocationManager", "getLastKnownLocation", "(Ljava/lang/String;)Landroid/location/Location;", false)
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(pool.len(), len_after_first);

        let iface = pool
            .intern_method_ref("android/location/LocationManager", "getLastKnownLocation", "(Ljava/lang/String;)Landroid/location/Location;", true)
            .unwrap();
        assert_ne!(a, iface, "interface refs are distinct constants");
        assert_eq!(pool.member_ref(iface).unwrap().kind, RefKind::InterfaceMethod);
    }

    #[test]
    fn test_long_takes_two_slots_and_round_trips() {
        let mut pool = ConstantPool::new();
        pool.push(Constant::Long(-2)).unwrap();
        let after = pool.intern_utf8("x").unwrap();
        assert_eq!(after, 3);
        assert!(pool.get(2).is_err(), "second half of a Long is unusable");

        let mut bytes = Vec::new();
        pool.write(&mut bytes);
        let parsed = ConstantPool::parse(&mut ByteReader::new(&bytes)).unwrap();
        assert_eq!(parsed, pool);
        assert_eq!(parsed.get(1).unwrap(), &Constant::Long(-2));
    }

    #[test]
    fn test_member_ref_resolution() {
        let mut pool = ConstantPool::new();
        let idx = pool
            .intern_method_ref("java/util/List", "size", "()I", true)
            .unwrap();
        let r = pool.member_ref(idx).unwrap();
        assert_eq!(r.owner, "java/util/List");
        assert_eq!(r.name, "size");
        assert_eq!(r.descriptor, "()I");
        assert!(pool.member_ref(1).is_err(), "slot 1 is a Utf8");
    }

    #[test]
    fn test_unknown_tag_is_rejected() {
        let bytes = [0x00, 0x02, 0x63];
        let err = ConstantPool::parse(&mut ByteReader::new(&bytes))
            .unwrap_err()
            .to_string();
        assert!(err.contains("unknown constant pool tag 99"), "{}", err);
    }
}
