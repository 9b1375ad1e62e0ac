//! Programmatic class assembly.
//!
//! Produces structurally valid class files with just enough surface (methods,
//! method annotations, straight-line code with call instructions) to feed
//! the collector and rewriter without a Java toolchain.
//!
//! ```ignore
//! let bytes = ClassBuilder::new("com/example/Foo")
//!     .method(
//!         MethodSpec::new("run", "(Landroid/location/LocationManager;)V").with_code(
//!             CodeBuilder::new(2, 2)
//!                 .aload(1)
//!                 .invoke(InvocationKind::Virtual, "android/location/LocationManager", "getProviders", "()Ljava/util/List;")
//!                 .pop()
//!                 .return_void(),
//!         ),
//!     )?
//!     .build()?;
//! ```

use anyhow::Result;

use crate::annotation::{write_annotations, Annotation};
use crate::attribute::{
    Attribute, CODE, RUNTIME_INVISIBLE_ANNOTATIONS, RUNTIME_VISIBLE_ANNOTATIONS,
};
use crate::class_file::{
    ClassFile, Member, ACC_ABSTRACT, ACC_INTERFACE, ACC_PUBLIC, ACC_STATIC, ACC_SUPER,
};
use crate::code::CodeAttribute;
use crate::constant_pool::ConstantPool;
use crate::descriptor::MethodDescriptor;
use crate::invoke::InvocationKind;

/// Java 8 class files; no version-specific attributes are emitted.
const DEFAULT_MAJOR_VERSION: u16 = 52;

#[derive(Debug, Clone)]
enum Op {
    Raw(Vec<u8>),
    Invoke {
        kind: InvocationKind,
        owner: String,
        name: String,
        descriptor: String,
        interface_ref: bool,
    },
}

#[derive(Debug, Clone)]
pub struct CodeBuilder {
    max_stack: u16,
    max_locals: u16,
    ops: Vec<Op>,
}

impl CodeBuilder {
    pub fn new(max_stack: u16, max_locals: u16) -> Self {
        Self {
            max_stack,
            max_locals,
            ops: Vec::new(),
        }
    }

    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.ops.push(Op::Raw(bytes.to_vec()));
        self
    }

    pub fn aload(self, slot: u8) -> Self {
        match slot {
            0..=3 => self.raw(&[0x2a + slot]),
            n => self.raw(&[0x19, n]),
        }
    }

    pub fn iconst(self, value: i8) -> Self {
        match value {
            -1..=5 => self.raw(&[(0x03 + value) as u8]),
            v => self.raw(&[0x10, v as u8]),
        }
    }

    pub fn aconst_null(self) -> Self {
        self.raw(&[0x01])
    }

    pub fn pop(self) -> Self {
        self.raw(&[0x57])
    }

    pub fn areturn(self) -> Self {
        self.raw(&[0xb0])
    }

    pub fn ireturn(self) -> Self {
        self.raw(&[0xac])
    }

    pub fn return_void(self) -> Self {
        self.raw(&[0xb1])
    }

    /// Emit a call. Interface calls go through an InterfaceMethodref.
    pub fn invoke(self, kind: InvocationKind, owner: &str, name: &str, descriptor: &str) -> Self {
        let interface_ref = kind == InvocationKind::Interface;
        self.invoke_with_ref(kind, owner, name, descriptor, interface_ref)
    }

    /// Emit a call with explicit control over the constant kind, e.g. a
    /// static call to an interface method.
    pub fn invoke_with_ref(
        mut self,
        kind: InvocationKind,
        owner: &str,
        name: &str,
        descriptor: &str,
        interface_ref: bool,
    ) -> Self {
        self.ops.push(Op::Invoke {
            kind,
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            interface_ref,
        });
        self
    }

    /// Emit an `invokedynamic` against bootstrap method 0.
    pub fn invoke_dynamic(self, name: &str, descriptor: &str) -> Self {
        self.invoke_with_ref(InvocationKind::Dynamic, "", name, descriptor, false)
    }

    fn assemble(&self, pool: &mut ConstantPool) -> Result<CodeAttribute> {
        let mut code = Vec::new();
        for op in &self.ops {
            match op {
                Op::Raw(bytes) => code.extend_from_slice(bytes),
                Op::Invoke {
                    kind,
                    owner,
                    name,
                    descriptor,
                    interface_ref,
                } => {
                    let index = if *kind == InvocationKind::Dynamic {
                        pool.intern_invoke_dynamic(0, name, descriptor)?
                    } else {
                        pool.intern_method_ref(owner, name, descriptor, *interface_ref)?
                    };
                    code.push(kind.opcode());
                    code.extend_from_slice(&index.to_be_bytes());
                    match kind {
                        InvocationKind::Interface => {
                            let slots = MethodDescriptor::parse(descriptor)?.param_slots();
                            code.push((slots + 1) as u8);
                            code.push(0);
                        }
                        InvocationKind::Dynamic => code.extend_from_slice(&[0, 0]),
                        _ => {}
                    }
                }
            }
        }
        Ok(CodeAttribute {
            max_stack: self.max_stack,
            max_locals: self.max_locals,
            code,
            exception_table: Vec::new(),
            attributes: Vec::new(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct MethodSpec {
    access_flags: u16,
    name: String,
    descriptor: String,
    code: Option<CodeBuilder>,
    invisible_annotations: Vec<Annotation>,
    visible_annotations: Vec<Annotation>,
}

impl MethodSpec {
    /// A public instance method.
    pub fn new(name: &str, descriptor: &str) -> Self {
        Self {
            access_flags: ACC_PUBLIC,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            code: None,
            invisible_annotations: Vec::new(),
            visible_annotations: Vec::new(),
        }
    }

    pub fn static_method(mut self) -> Self {
        self.access_flags |= ACC_STATIC;
        self
    }

    pub fn abstract_method(mut self) -> Self {
        self.access_flags |= ACC_ABSTRACT;
        self
    }

    pub fn with_code(mut self, code: CodeBuilder) -> Self {
        self.code = Some(code);
        self
    }

    /// Attach a class-retention (invisible) annotation.
    pub fn annotated(mut self, annotation: Annotation) -> Self {
        self.invisible_annotations.push(annotation);
        self
    }

    /// Attach a runtime-retention (visible) annotation.
    pub fn annotated_visible(mut self, annotation: Annotation) -> Self {
        self.visible_annotations.push(annotation);
        self
    }
}

#[derive(Debug, Clone)]
pub struct ClassBuilder {
    class: ClassFile,
}

impl ClassBuilder {
    pub fn new(name: &str) -> Self {
        Self::with_super(name, "java/lang/Object")
    }

    pub fn with_super(name: &str, super_name: &str) -> Self {
        let mut constant_pool = ConstantPool::new();
        // Interning into a fresh pool cannot overflow.
        let this_class = constant_pool.intern_class(name).unwrap_or_default();
        let super_class = constant_pool.intern_class(super_name).unwrap_or_default();
        Self {
            class: ClassFile {
                minor_version: 0,
                major_version: DEFAULT_MAJOR_VERSION,
                constant_pool,
                access_flags: ACC_PUBLIC | ACC_SUPER,
                this_class,
                super_class,
                interfaces: Vec::new(),
                fields: Vec::new(),
                methods: Vec::new(),
                attributes: Vec::new(),
            },
        }
    }

    pub fn interface(mut self) -> Self {
        self.class.access_flags = ACC_PUBLIC | ACC_INTERFACE | ACC_ABSTRACT;
        self
    }

    pub fn method(mut self, spec: MethodSpec) -> Result<Self> {
        let pool = &mut self.class.constant_pool;
        let name_index = pool.intern_utf8(&spec.name)?;
        let descriptor_index = pool.intern_utf8(&spec.descriptor)?;

        let mut attributes = Vec::new();
        if let Some(code) = &spec.code {
            let body = code.assemble(pool)?;
            attributes.push(Attribute {
                name_index: pool.intern_utf8(CODE)?,
                info: body.to_bytes()?,
            });
        }
        if !spec.visible_annotations.is_empty() {
            let info = write_annotations(&spec.visible_annotations, pool)?;
            attributes.push(Attribute {
                name_index: pool.intern_utf8(RUNTIME_VISIBLE_ANNOTATIONS)?,
                info,
            });
        }
        if !spec.invisible_annotations.is_empty() {
            let info = write_annotations(&spec.invisible_annotations, pool)?;
            attributes.push(Attribute {
                name_index: pool.intern_utf8(RUNTIME_INVISIBLE_ANNOTATIONS)?,
                info,
            });
        }

        self.class.methods.push(Member {
            access_flags: spec.access_flags,
            name_index,
            descriptor_index,
            attributes,
        });
        Ok(self)
    }

    pub fn into_class_file(self) -> ClassFile {
        self.class
    }

    pub fn build(self) -> Result<Vec<u8>> {
        self.class.to_bytes()
    }
}
