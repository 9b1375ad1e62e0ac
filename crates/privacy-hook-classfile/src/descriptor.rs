//! Field and method descriptor parsing.

use anyhow::{anyhow, Result};
use std::fmt;

/// A single field type, e.g. `I`, `Ljava/lang/String;`, `[[B`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// One of `B C D F I J S Z`.
    Base(char),
    /// Internal class name without the `L` and `;`.
    Object(String),
    Array(Box<FieldType>),
}

impl FieldType {
    pub fn parse(descriptor: &str) -> Result<Self> {
        let (ty, rest) = parse_field_type(descriptor)?;
        if !rest.is_empty() {
            return Err(anyhow!("trailing characters in field descriptor {:?}", descriptor));
        }
        Ok(ty)
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, FieldType::Object(_) | FieldType::Array(_))
    }

    /// Operand stack slots occupied by a value of this type.
    pub fn slots(&self) -> usize {
        match self {
            FieldType::Base('J') | FieldType::Base('D') => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Base(c) => write!(f, "{}", c),
            FieldType::Object(name) => write!(f, "L{};", name),
            FieldType::Array(inner) => write!(f, "[{}", inner),
        }
    }
}

fn parse_field_type(s: &str) -> Result<(FieldType, &str)> {
    let mut chars = s.chars();
    match chars.next() {
        Some(c @ ('B' | 'C' | 'D' | 'F' | 'I' | 'J' | 'S' | 'Z')) => {
            Ok((FieldType::Base(c), chars.as_str()))
        }
        Some('L') => {
            let rest = chars.as_str();
            let end = rest
                .find(';')
                .ok_or_else(|| anyhow!("unterminated class type in {:?}", s))?;
            let name = &rest[..end];
            if name.is_empty() {
                return Err(anyhow!("empty class name in {:?}", s));
            }
            Ok((FieldType::Object(name.to_string()), &rest[end + 1..]))
        }
        Some('[') => {
            let (inner, rest) = parse_field_type(chars.as_str())?;
            Ok((FieldType::Array(Box::new(inner)), rest))
        }
        Some(other) => Err(anyhow!("unexpected {:?} in descriptor {:?}", other, s)),
        None => Err(anyhow!("empty field descriptor")),
    }
}

/// A parsed `(params)return` method descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    pub params: Vec<FieldType>,
    /// `None` for `V`.
    pub ret: Option<FieldType>,
}

impl MethodDescriptor {
    pub fn parse(descriptor: &str) -> Result<Self> {
        let body = descriptor
            .strip_prefix('(')
            .ok_or_else(|| anyhow!("method descriptor {:?} must start with '('", descriptor))?;
        let close = body
            .find(')')
            .ok_or_else(|| anyhow!("method descriptor {:?} has no ')'", descriptor))?;

        let mut params = Vec::new();
        let mut rest = &body[..close];
        while !rest.is_empty() {
            let (ty, tail) = parse_field_type(rest)
                .map_err(|e| anyhow!("bad parameter in {:?}: {}", descriptor, e))?;
            params.push(ty);
            rest = tail;
        }

        let ret = match &body[close + 1..] {
            "V" => None,
            r => Some(
                FieldType::parse(r)
                    .map_err(|e| anyhow!("bad return type in {:?}: {}", descriptor, e))?,
            ),
        };
        Ok(Self { params, ret })
    }

    /// Stack slots popped for the arguments (receiver excluded).
    pub fn param_slots(&self) -> usize {
        self.params.iter().map(FieldType::slots).sum()
    }

    /// The same descriptor with its first parameter removed.
    pub fn without_first_parameter(&self) -> Result<Self> {
        match self.params.split_first() {
            Some((_, rest)) => Ok(Self {
                params: rest.to_vec(),
                ret: self.ret.clone(),
            }),
            None => Err(anyhow!("descriptor {} has no parameter to drop", self)),
        }
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for p in &self.params {
            write!(f, "{}", p)?;
        }
        write!(f, ")")?;
        match &self.ret {
            Some(r) => write!(f, "{}", r),
            None => write!(f, "V"),
        }
    }
}
