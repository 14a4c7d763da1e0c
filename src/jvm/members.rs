use super::{BinaryName, FieldType, MethodDescriptor, RefType, RenderDescriptor, UnqualifiedName};
use std::fmt;

/// Symbolic reference to a field, as it appears in either bytecode dialect
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct FieldRef {
    pub class: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: FieldType,
}

/// Symbolic reference to a method, as it appears in either bytecode dialect
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct MethodRef {
    pub class: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor,

    /// Is the owning class an interface? (this affects the constant pool tag on the JVM)
    pub is_interface: bool,
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}:{}", self.class, self.name, self.descriptor.render())
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.class, self.name, self.descriptor.render())
    }
}

/// Loadable constant (what `ldc` and `ldc2_w` can push)
#[derive(Clone, PartialEq, Debug)]
pub enum ConstantData {
    String(String),
    Class(RefType),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
}

impl ConstantData {
    /// Constants taking up two stack slots need `ldc2_w` instead of `ldc`
    pub fn is_wide(&self) -> bool {
        matches!(self, ConstantData::Long(_) | ConstantData::Double(_))
    }
}
