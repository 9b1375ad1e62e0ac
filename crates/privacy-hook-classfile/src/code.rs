//! The `Code` attribute as a mutable instruction stream.
//!
//! Rewrites never move an instruction: a replacement must fit in the bytes
//! of the instruction it replaces (shorter ones are padded with `nop`), so
//! branch offsets, exception ranges and stack map frames stay valid.

use anyhow::{anyhow, Result};

use crate::attribute::{parse_attributes, write_attributes, Attribute};
use crate::descriptor::MethodDescriptor;
use crate::invoke::InvocationKind;
use crate::reader::{u16_len, write_u16, write_u32, ByteReader};

pub const NOP: u8 = 0x00;
const TABLESWITCH: u8 = 0xaa;
const LOOKUPSWITCH: u8 = 0xab;
const WIDE: u8 = 0xc4;
const IINC: u8 = 0x84;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionHandler {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    pub catch_type: u16,
}

/// One decoded instruction boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub offset: usize,
    pub opcode: u8,
    pub len: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionHandler>,
    pub attributes: Vec<Attribute>,
}

impl CodeAttribute {
    pub fn parse(info: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(info);
        let max_stack = r.read_u16()?;
        let max_locals = r.read_u16()?;
        let code_len = r.read_u32()? as usize;
        let code = r.read_bytes(code_len)?.to_vec();
        let handlers = r.read_u16()?;
        let mut exception_table = Vec::with_capacity(handlers as usize);
        for _ in 0..handlers {
            exception_table.push(ExceptionHandler {
                start_pc: r.read_u16()?,
                end_pc: r.read_u16()?,
                handler_pc: r.read_u16()?,
                catch_type: r.read_u16()?,
            });
        }
        let attributes = parse_attributes(&mut r)?;
        if !r.is_empty() {
            return Err(anyhow!("{} trailing bytes in Code attribute", r.remaining()));
        }
        Ok(Self {
            max_stack,
            max_locals,
            code,
            exception_table,
            attributes,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.code.len() + 32);
        write_u16(&mut out, self.max_stack);
        write_u16(&mut out, self.max_locals);
        write_u32(&mut out, self.code.len() as u32);
        out.extend_from_slice(&self.code);
        write_u16(&mut out, u16_len(self.exception_table.len(), "exception handlers")?);
        for h in &self.exception_table {
            write_u16(&mut out, h.start_pc);
            write_u16(&mut out, h.end_pc);
            write_u16(&mut out, h.handler_pc);
            write_u16(&mut out, h.catch_type);
        }
        write_attributes(&mut out, &self.attributes)?;
        Ok(out)
    }

    /// Walk the bytecode and return every instruction boundary in order.
    pub fn instructions(&self) -> Result<Vec<Instruction>> {
        let mut out = Vec::new();
        let mut offset = 0;
        while offset < self.code.len() {
            let opcode = self.code[offset];
            let len = instruction_len(&self.code, offset)?;
            if offset + len > self.code.len() {
                return Err(anyhow!(
                    "instruction {:#04x} at {} runs past end of code ({} bytes)",
                    opcode,
                    offset,
                    self.code.len()
                ));
            }
            out.push(Instruction {
                offset,
                opcode,
                len,
            });
            offset += len;
        }
        Ok(out)
    }

    /// Kind and constant pool index of the invoke at `insn`, if it is one.
    pub fn invoke_operand(&self, insn: &Instruction) -> Option<(InvocationKind, u16)> {
        let kind = InvocationKind::from_opcode(insn.opcode)?;
        let hi = *self.code.get(insn.offset + 1)?;
        let lo = *self.code.get(insn.offset + 2)?;
        Some((kind, u16::from_be_bytes([hi, lo])))
    }

    /// Overwrite the invoke at `offset` with a call of `kind` through `cp_index`.
    ///
    /// `descriptor` is the callee's descriptor; `invokeinterface` encodes its
    /// argument slot count in the instruction.
    pub fn patch_invoke(
        &mut self,
        offset: usize,
        kind: InvocationKind,
        cp_index: u16,
        descriptor: &MethodDescriptor,
    ) -> Result<()> {
        let opcode = *self
            .code
            .get(offset)
            .ok_or_else(|| anyhow!("offset {} is outside the code array", offset))?;
        let current = InvocationKind::from_opcode(opcode)
            .ok_or_else(|| anyhow!("instruction {:#04x} at {} is not an invoke", opcode, offset))?;

        let old_len = current.instruction_len();
        let new_len = kind.instruction_len();
        if new_len > old_len {
            return Err(anyhow!(
                "cannot replace {} ({} bytes) with {} ({} bytes) at offset {} without moving code",
                current,
                old_len,
                kind,
                new_len,
                offset
            ));
        }

        let mut encoded = Vec::with_capacity(old_len);
        encoded.push(kind.opcode());
        encoded.extend_from_slice(&cp_index.to_be_bytes());
        match kind {
            InvocationKind::Interface => {
                let count = u8::try_from(descriptor.param_slots() + 1)
                    .map_err(|_| anyhow!("too many argument slots for invokeinterface"))?;
                encoded.push(count);
                encoded.push(0);
            }
            InvocationKind::Dynamic => encoded.extend_from_slice(&[0, 0]),
            _ => {}
        }
        encoded.resize(old_len, NOP);
        self.code[offset..offset + old_len].copy_from_slice(&encoded);
        Ok(())
    }
}

/// Encoded length of the instruction starting at `offset`.
pub fn instruction_len(code: &[u8], offset: usize) -> Result<usize> {
    let opcode = code[offset];
    let len = match opcode {
        0x10 | 0x12 | 0x15..=0x19 | 0x36..=0x3a | 0xa9 | 0xbc => 2,
        0x11 | 0x13 | 0x14 | 0x84 | 0x99..=0xa8 | 0xb2..=0xb8 | 0xbb | 0xbd | 0xc0 | 0xc1
        | 0xc6 | 0xc7 => 3,
        0xc5 => 4,
        0xb9 | 0xba | 0xc8 | 0xc9 => 5,
        WIDE => match code.get(offset + 1) {
            Some(&IINC) => 6,
            Some(_) => 4,
            None => return Err(anyhow!("truncated wide instruction at {}", offset)),
        },
        TABLESWITCH => {
            let base = offset + 1 + switch_padding(offset);
            let low = read_i32(code, base + 4)?;
            let high = read_i32(code, base + 8)?;
            if high < low {
                return Err(anyhow!("tableswitch at {} has high {} < low {}", offset, high, low));
            }
            let entries = (high as i64 - low as i64 + 1) as usize;
            base + 12 + entries * 4 - offset
        }
        LOOKUPSWITCH => {
            let base = offset + 1 + switch_padding(offset);
            let pairs = read_i32(code, base + 4)?;
            if pairs < 0 {
                return Err(anyhow!("lookupswitch at {} has negative npairs", offset));
            }
            base + 8 + pairs as usize * 8 - offset
        }
        0x00..=0x0f | 0x1a..=0x35 | 0x3b..=0x83 | 0x85..=0x98 | 0xac..=0xb1 | 0xbe | 0xbf
        | 0xc2 | 0xc3 => 1,
        other => return Err(anyhow!("invalid opcode {:#04x} at {}", other, offset)),
    };
    Ok(len)
}

fn switch_padding(offset: usize) -> usize {
    (4 - (offset + 1) % 4) % 4
}

fn read_i32(code: &[u8], at: usize) -> Result<i32> {
    code.get(at..at + 4)
        .map(|b| i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| anyhow!("switch operand at {} runs past end of code", at))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(bytes: Vec<u8>) -> CodeAttribute {
        CodeAttribute {
            max_stack: 4,
            max_locals: 4,
            code: bytes,
            exception_table: Vec::new(),
            attributes: Vec::new(),
        }
    }

    #[test]
    fn test_instruction_walk_handles_switches() {
        // nop; iconst_0; tableswitch (pad 1) default=0 low=0 high=1 [0,0]; return
        let mut bytes = vec![0x00, 0x03, TABLESWITCH, 0];
        bytes.extend_from_slice(&0i32.to_be_bytes());
        bytes.extend_from_slice(&0i32.to_be_bytes());
        bytes.extend_from_slice(&1i32.to_be_bytes());
        bytes.extend_from_slice(&0i32.to_be_bytes());
        bytes.extend_from_slice(&0i32.to_be_bytes());
        bytes.push(0xb1);

        let insns = code(bytes).instructions().unwrap();
        let offsets: Vec<_> = insns.iter().map(|i| i.offset).collect();
        assert_eq!(offsets, vec![0, 1, 2, 24]);
        assert_eq!(insns[2].len, 22);
    }

    #[test]
    fn test_wide_iinc_is_six_bytes() {
        let c = code(vec![WIDE, IINC, 0x01, 0x00, 0x00, 0x05, 0xb1]);
        let insns = c.instructions().unwrap();
        assert_eq!(insns.len(), 2);
        assert_eq!(insns[0].len, 6);
    }

    #[test]
    fn test_patch_interface_to_static_pads_with_nop() {
        // aload_1; invokeinterface #7 count=1; areturn
        let mut c = code(vec![0x2b, 0xb9, 0x00, 0x07, 0x01, 0x00, 0xb0]);
        let desc = MethodDescriptor::parse("(Ljava/util/List;)I").unwrap();
        c.patch_invoke(1, InvocationKind::Static, 0x0102, &desc).unwrap();
        assert_eq!(c.code, vec![0x2b, 0xb8, 0x01, 0x02, NOP, NOP, 0xb0]);
        assert_eq!(c.instructions().unwrap().len(), 5);
    }

    #[test]
    fn test_patch_refuses_to_grow() {
        let mut c = code(vec![0x2b, 0xb6, 0x00, 0x07, 0xb0]);
        let desc = MethodDescriptor::parse("()I").unwrap();
        let err = c
            .patch_invoke(1, InvocationKind::Interface, 9, &desc)
            .unwrap_err()
            .to_string();
        assert!(err.contains("without moving code"), "{}", err);
        assert_eq!(c.code, vec![0x2b, 0xb6, 0x00, 0x07, 0xb0], "code untouched on error");
    }

    #[test]
    fn test_parse_round_trip_preserves_bytes() {
        let mut c = code(vec![0x2a, 0xb7, 0x00, 0x01, 0xb1]);
        c.exception_table.push(ExceptionHandler {
            start_pc: 0,
            end_pc: 4,
            handler_pc: 4,
            catch_type: 0,
        });
        let bytes = c.to_bytes().unwrap();
        assert_eq!(CodeAttribute::parse(&bytes).unwrap(), c);
    }

    #[test]
    fn test_invalid_opcode_rejected() {
        assert!(code(vec![0xcb]).instructions().is_err());
    }
}
