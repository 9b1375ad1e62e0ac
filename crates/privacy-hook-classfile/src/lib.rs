//! JVM class-file codec for call-site redirection.
//!
//! This crate reads and writes the binary class-file format with enough
//! fidelity to patch call instructions in place:
//!
//! - **Constant pool**: every tag, modified UTF-8, append-only interning
//! - **Annotations**: method-level marker metadata (`Runtime*Annotations`)
//! - **Code**: instruction boundaries and same-size invoke replacement
//! - **Descriptors**: parameter/return parsing and stack slot accounting
//! - **Builder**: assemble class files programmatically
//!
//! Untouched structures are carried as raw bytes, so a class that is parsed
//! and re-encoded without modification comes back byte-identical.

pub mod annotation;
pub mod attribute;
pub mod builder;
pub mod class_file;
pub mod code;
pub mod constant_pool;
pub mod descriptor;
pub mod invoke;
pub mod mutf8;
pub mod reader;

pub use annotation::{Annotation, ElementValue};
pub use class_file::{ClassFile, InvokeSite, Member};
pub use code::CodeAttribute;
pub use constant_pool::ConstantPool;
pub use descriptor::{FieldType, MethodDescriptor};
pub use invoke::InvocationKind;
