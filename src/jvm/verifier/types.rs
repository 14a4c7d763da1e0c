use crate::jvm::{BaseType, BinaryName, FieldType, RefType};
use crate::util::Width;

/// These types are from [this hierarchy][0]
///
/// Since there is no class hierarchy available while translating single methods, reference types
/// are only checked structurally (eg. an array where an array is expected) and never for
/// subclassing.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se7/html/jvms-4.html#jvms-4.10.1.2
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub enum VerificationType {
    /// Unusable slot (eg. the second half of a wide local, or a local whose type differs between
    /// two paths merging into the same label)
    Top,
    Integer,
    Float,
    Double,
    Long,
    Null,

    /// In the constructor, the `this` parameter starts with this type then turns into an object
    /// type after `<init>` is called
    UninitializedThis,

    /// Object type
    Object(RefType),

    /// State of an object after `new` has been called but `<init>` has not been called yet
    Uninitialized(UninitializedRefType),
}

/// After a `new` instruction, the top of the stack will contain an uninitialized value. We track
/// what type it will have once initialized, along with a unique site number so that two distinct
/// uninitialized objects of the same class don't get confused with each other.
#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub struct UninitializedRefType {
    /// Once the type is initialized, what will it be?
    pub class: BinaryName,

    /// Number of the `new` instruction in the method
    pub site: usize,
}

impl VerificationType {
    /// Is this type is a reference type?
    pub fn is_reference(&self) -> bool {
        match self {
            VerificationType::Top
            | VerificationType::Integer
            | VerificationType::Float
            | VerificationType::Double
            | VerificationType::Long => false,

            VerificationType::Null
            | VerificationType::UninitializedThis
            | VerificationType::Object(_)
            | VerificationType::Uninitialized(_) => true,
        }
    }

    /// Is this an initialized reference (or `null`)?
    pub fn is_initialized_reference(&self) -> bool {
        matches!(self, VerificationType::Null | VerificationType::Object(_))
    }

    /// Check if one verification type can be used where another is expected
    ///
    /// Reference types are accepted whenever both are initialized references, except that arrays
    /// must have a matching element category.
    pub fn is_assignable(sub_type: &Self, super_type: &Self) -> bool {
        use VerificationType::*;
        match (sub_type, super_type) {
            (_, Top) => true,
            (Integer, Integer) | (Float, Float) | (Long, Long) | (Double, Double) => true,
            (Null, Null) | (Null, Object(_)) => true,
            (Object(_), Object(RefType::Object(_))) => true,
            (Object(RefType::PrimitiveArray(found)), Object(RefType::PrimitiveArray(expected))) => {
                found == expected
            }
            (Object(RefType::ObjectArray(found)), Object(RefType::ObjectArray(expected))) => {
                found.additional_dimensions == expected.additional_dimensions
            }
            (Object(RefType::PrimitiveArray(found)), Object(RefType::ObjectArray(expected))) => {
                found.additional_dimensions > expected.additional_dimensions
                    && expected.element_type == BinaryName::OBJECT
            }
            (UninitializedThis, UninitializedThis) => true,
            (Uninitialized(u1), Uninitialized(u2)) => u1 == u2,
            _ => false,
        }
    }

    /// Most specific type that both types can be assigned to
    ///
    /// This is a simplified merge: any two distinct initialized references merge to
    /// `java/lang/Object`, and anything else that doesn't agree merges to `Top`.
    pub fn merge(&self, other: &Self) -> Self {
        if self == other {
            return self.clone();
        }
        match (self, other) {
            (VerificationType::Null, t @ VerificationType::Object(_))
            | (t @ VerificationType::Object(_), VerificationType::Null) => t.clone(),
            (VerificationType::Object(_), VerificationType::Object(_)) => {
                VerificationType::Object(RefType::OBJECT)
            }
            _ => VerificationType::Top,
        }
    }
}

impl From<FieldType> for VerificationType {
    fn from(field_type: FieldType) -> Self {
        match field_type {
            FieldType::Base(BaseType::Int)
            | FieldType::Base(BaseType::Char)
            | FieldType::Base(BaseType::Short)
            | FieldType::Base(BaseType::Byte)
            | FieldType::Base(BaseType::Boolean) => VerificationType::Integer,
            FieldType::Base(BaseType::Float) => VerificationType::Float,
            FieldType::Base(BaseType::Long) => VerificationType::Long,
            FieldType::Base(BaseType::Double) => VerificationType::Double,
            FieldType::Ref(ref_type) => VerificationType::Object(ref_type),
        }
    }
}

impl From<&FieldType> for VerificationType {
    fn from(field_type: &FieldType) -> Self {
        VerificationType::from(field_type.clone())
    }
}

impl Width for VerificationType {
    fn width(&self) -> usize {
        match self {
            VerificationType::Double | VerificationType::Long => 2,
            _ => 1,
        }
    }
}
