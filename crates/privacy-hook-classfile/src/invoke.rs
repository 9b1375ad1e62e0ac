//! Invocation kinds and their opcodes.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const INVOKEVIRTUAL: u8 = 0xb6;
pub const INVOKESPECIAL: u8 = 0xb7;
pub const INVOKESTATIC: u8 = 0xb8;
pub const INVOKEINTERFACE: u8 = 0xb9;
pub const INVOKEDYNAMIC: u8 = 0xba;

/// How a call instruction dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationKind {
    Static,
    Virtual,
    Special,
    Interface,
    Dynamic,
}

impl InvocationKind {
    pub const ALL: [InvocationKind; 5] = [
        InvocationKind::Static,
        InvocationKind::Virtual,
        InvocationKind::Special,
        InvocationKind::Interface,
        InvocationKind::Dynamic,
    ];

    pub fn from_opcode(opcode: u8) -> Option<Self> {
        match opcode {
            INVOKESTATIC => Some(InvocationKind::Static),
            INVOKEVIRTUAL => Some(InvocationKind::Virtual),
            INVOKESPECIAL => Some(InvocationKind::Special),
            INVOKEINTERFACE => Some(InvocationKind::Interface),
            INVOKEDYNAMIC => Some(InvocationKind::Dynamic),
            _ => None,
        }
    }

    /// Decode the integer form used in marker metadata (the JVM opcode value).
    pub fn from_marker_value(value: i32) -> Result<Self> {
        u8::try_from(value)
            .ok()
            .and_then(Self::from_opcode)
            .ok_or_else(|| anyhow!("{} is not an invoke opcode (expected 182..=186)", value))
    }

    pub fn opcode(self) -> u8 {
        match self {
            InvocationKind::Static => INVOKESTATIC,
            InvocationKind::Virtual => INVOKEVIRTUAL,
            InvocationKind::Special => INVOKESPECIAL,
            InvocationKind::Interface => INVOKEINTERFACE,
            InvocationKind::Dynamic => INVOKEDYNAMIC,
        }
    }

    /// Encoded length of the instruction, opcode included.
    pub fn instruction_len(self) -> usize {
        match self {
            InvocationKind::Interface | InvocationKind::Dynamic => 5,
            _ => 3,
        }
    }

    /// Whether the call pops an implicit receiver below its arguments.
    pub fn has_receiver(self) -> bool {
        matches!(
            self,
            InvocationKind::Virtual | InvocationKind::Special | InvocationKind::Interface
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InvocationKind::Static => "static",
            InvocationKind::Virtual => "virtual",
            InvocationKind::Special => "special",
            InvocationKind::Interface => "interface",
            InvocationKind::Dynamic => "dynamic",
        }
    }
}

impl fmt::Display for InvocationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_round_trip() {
        for kind in InvocationKind::ALL {
            assert_eq!(InvocationKind::from_opcode(kind.opcode()), Some(kind));
        }
        assert_eq!(InvocationKind::from_opcode(0x00), None);
    }

    #[test]
    fn test_marker_values_are_opcodes() {
        assert_eq!(
            InvocationKind::from_marker_value(182).unwrap(),
            InvocationKind::Virtual
        );
        assert_eq!(
            InvocationKind::from_marker_value(184).unwrap(),
            InvocationKind::Static
        );
        assert!(InvocationKind::from_marker_value(-74).is_err());
        assert!(InvocationKind::from_marker_value(42).is_err());
    }
}
