use super::{BinaryName, Name};
use crate::util::Width;
use std::io::{Error, ErrorKind, Result};
use std::iter::Peekable;
use std::str::Chars;

/// Utility trait for converting descriptors to and from string representations
///
/// Both bytecode dialects share the same field and method descriptor syntax, so the same types
/// describe register-form and stack-form members.
pub trait RenderDescriptor {
    /// Turn the descriptor into a string
    fn render(&self) -> String {
        let mut string = String::new();
        self.render_to(&mut string);
        string
    }

    /// Write the descriptor to a string
    fn render_to(&self, write_to: &mut String);
}

pub trait ParseDescriptor: Sized {
    /// Parse a descriptor from a string
    fn parse(source: &str) -> Result<Self> {
        let mut chars = source.chars().peekable();
        let ret = Self::parse_from(&mut chars)?;
        match chars.next() {
            None => Ok(ret),
            Some(c) => {
                let msg = format!("Unexpected leftover input '{}'", c);
                Err(Error::new(ErrorKind::InvalidInput, msg))
            }
        }
    }

    /// Read the descriptor from a character buffer
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self>;
}

/// Primitive value types
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BaseType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
}

impl BaseType {
    /// Size in bytes of one element of this type in a packed array payload
    pub fn byte_size(&self) -> usize {
        match self {
            BaseType::Byte | BaseType::Boolean => 1,
            BaseType::Char | BaseType::Short => 2,
            BaseType::Int | BaseType::Float => 4,
            BaseType::Long | BaseType::Double => 8,
        }
    }
}

impl Width for BaseType {
    fn width(&self) -> usize {
        match self {
            BaseType::Byte
            | BaseType::Char
            | BaseType::Float
            | BaseType::Int
            | BaseType::Short
            | BaseType::Boolean => 1,
            BaseType::Double | BaseType::Long => 2,
        }
    }
}

impl RenderDescriptor for BaseType {
    fn render_to(&self, write_to: &mut String) {
        let c = match self {
            BaseType::Byte => 'B',
            BaseType::Char => 'C',
            BaseType::Double => 'D',
            BaseType::Float => 'F',
            BaseType::Int => 'I',
            BaseType::Long => 'J',
            BaseType::Short => 'S',
            BaseType::Boolean => 'Z',
        };
        write_to.push(c);
    }
}

impl ParseDescriptor for BaseType {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        let typ = match source.next() {
            Some('B') => BaseType::Byte,
            Some('C') => BaseType::Char,
            Some('D') => BaseType::Double,
            Some('F') => BaseType::Float,
            Some('I') => BaseType::Int,
            Some('J') => BaseType::Long,
            Some('S') => BaseType::Short,
            Some('Z') => BaseType::Boolean,
            Some(c) => {
                let msg = format!("Invalid base type character '{}'", c);
                return Err(Error::new(ErrorKind::InvalidInput, msg));
            }
            None => {
                let msg = "Missing base type character";
                return Err(Error::new(ErrorKind::UnexpectedEof, msg));
            }
        };
        Ok(typ)
    }
}

/// Reference type
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum RefType {
    Object(BinaryName),
    ObjectArray(ArrayType<BinaryName>),
    PrimitiveArray(ArrayType<BaseType>),
}

/// Generic array type
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct ArrayType<T> {
    /// Additional dimensions (`A[]` has 0 additional dimensions, `A[][][][]` has 3)
    pub additional_dimensions: usize,

    /// Underlying element type (`A` is the underlying element type of `A[][]`)
    pub element_type: T,
}

impl<T: Clone> ArrayType<T> {
    /// Total number of dimensions in the array type
    pub const fn dimensions(&self) -> usize {
        self.additional_dimensions + 1
    }

    /// Array type with one fewer dimension (or `None` if this is already one-dimensional)
    fn peel(&self) -> Option<ArrayType<T>> {
        if self.additional_dimensions == 0 {
            None
        } else {
            Some(ArrayType {
                additional_dimensions: self.additional_dimensions - 1,
                element_type: self.element_type.clone(),
            })
        }
    }
}

impl<T: RenderDescriptor> RenderDescriptor for ArrayType<T> {
    fn render_to(&self, write_to: &mut String) {
        for _ in 0..=self.additional_dimensions {
            write_to.push('[');
        }
        self.element_type.render_to(write_to);
    }
}

impl RenderDescriptor for BinaryName {
    fn render_to(&self, write_to: &mut String) {
        write_to.push('L');
        write_to.push_str(self.as_str());
        write_to.push(';');
    }
}

impl ParseDescriptor for BinaryName {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        if let Some('L') = source.next() {
            let mut class_name = String::new();
            loop {
                let c: char = source.next().ok_or_else(|| {
                    let msg = format!("Missing terminator for 'L{}'", class_name);
                    Error::new(ErrorKind::UnexpectedEof, msg)
                })?;
                if c == ';' {
                    return BinaryName::from_string(class_name)
                        .map_err(|msg| Error::new(ErrorKind::InvalidInput, msg));
                } else {
                    class_name.push(c)
                }
            }
        } else {
            Err(Error::new(
                ErrorKind::InvalidInput,
                "Expected object type to start with `L`",
            ))
        }
    }
}

impl RenderDescriptor for RefType {
    fn render_to(&self, write_to: &mut String) {
        match self {
            RefType::Object(cls) => cls.render_to(write_to),
            RefType::PrimitiveArray(arr) => arr.render_to(write_to),
            RefType::ObjectArray(arr) => arr.render_to(write_to),
        }
    }
}

impl ParseDescriptor for RefType {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        Ok(match source.peek().copied() {
            Some('L') => RefType::Object(BinaryName::parse_from(source)?),
            Some('[') => {
                source.next();
                let mut additional_dimensions = 0;
                while source.next_if_eq(&'[').is_some() {
                    additional_dimensions += 1;
                }
                if let Some('L') = source.peek().copied() {
                    RefType::ObjectArray(ArrayType {
                        additional_dimensions,
                        element_type: BinaryName::parse_from(source)?,
                    })
                } else {
                    RefType::PrimitiveArray(ArrayType {
                        additional_dimensions,
                        element_type: BaseType::parse_from(source)?,
                    })
                }
            }
            Some(c) => {
                let msg = format!("Invalid reference type character '{}'", c);
                return Err(Error::new(ErrorKind::InvalidInput, msg));
            }
            None => {
                let msg = "Missing reference type";
                return Err(Error::new(ErrorKind::UnexpectedEof, msg));
            }
        })
    }
}

impl RefType {
    pub const OBJECT: RefType = RefType::Object(BinaryName::OBJECT);
    pub const STRING: RefType = RefType::Object(BinaryName::STRING);
    pub const CLASS: RefType = RefType::Object(BinaryName::CLASS);
    pub const THROWABLE: RefType = RefType::Object(BinaryName::THROWABLE);

    /// Array type whose elements have the given type
    pub fn array(field_type: FieldType) -> RefType {
        match field_type {
            FieldType::Base(element_type) => RefType::PrimitiveArray(ArrayType {
                additional_dimensions: 0,
                element_type,
            }),
            FieldType::Ref(RefType::Object(element_type)) => RefType::ObjectArray(ArrayType {
                additional_dimensions: 0,
                element_type,
            }),
            FieldType::Ref(RefType::PrimitiveArray(arr)) => RefType::PrimitiveArray(ArrayType {
                additional_dimensions: arr.additional_dimensions + 1,
                element_type: arr.element_type,
            }),
            FieldType::Ref(RefType::ObjectArray(arr)) => RefType::ObjectArray(ArrayType {
                additional_dimensions: arr.additional_dimensions + 1,
                element_type: arr.element_type,
            }),
        }
    }

    /// If this is an array type, get the type of its members
    pub fn array_member_type(&self) -> Option<FieldType> {
        match self {
            RefType::Object(_) => None,
            RefType::PrimitiveArray(arr) => Some(match arr.peel() {
                None => FieldType::Base(arr.element_type),
                Some(inner) => FieldType::Ref(RefType::PrimitiveArray(inner)),
            }),
            RefType::ObjectArray(arr) => Some(match arr.peel() {
                None => FieldType::Ref(RefType::Object(arr.element_type.clone())),
                Some(inner) => FieldType::Ref(RefType::ObjectArray(inner)),
            }),
        }
    }

    pub fn is_array(&self) -> bool {
        !matches!(self, RefType::Object(_))
    }
}

/// Type of a class, instance, or local variable
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum FieldType {
    Base(BaseType),
    Ref(RefType),
}

impl Width for FieldType {
    fn width(&self) -> usize {
        match self {
            FieldType::Base(base_type) => base_type.width(),
            FieldType::Ref(_) => 1,
        }
    }
}

impl FieldType {
    pub fn array(field_type: FieldType) -> FieldType {
        FieldType::Ref(RefType::array(field_type))
    }

    pub const fn object(class_name: BinaryName) -> FieldType {
        FieldType::Ref(RefType::Object(class_name))
    }

    pub const fn int() -> FieldType {
        FieldType::Base(BaseType::Int)
    }

    pub const fn long() -> FieldType {
        FieldType::Base(BaseType::Long)
    }

    pub const fn float() -> FieldType {
        FieldType::Base(BaseType::Float)
    }

    pub const fn double() -> FieldType {
        FieldType::Base(BaseType::Double)
    }

    pub const fn boolean() -> FieldType {
        FieldType::Base(BaseType::Boolean)
    }

    pub const fn byte() -> FieldType {
        FieldType::Base(BaseType::Byte)
    }

    pub const fn char() -> FieldType {
        FieldType::Base(BaseType::Char)
    }

    pub const fn short() -> FieldType {
        FieldType::Base(BaseType::Short)
    }
}

impl RenderDescriptor for FieldType {
    fn render_to(&self, write_to: &mut String) {
        match self {
            FieldType::Base(base_type) => base_type.render_to(write_to),
            FieldType::Ref(reference_type) => reference_type.render_to(write_to),
        }
    }
}

impl ParseDescriptor for FieldType {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        match source.peek().copied() {
            None => Err(Error::new(ErrorKind::UnexpectedEof, "Missing field type")),
            Some('B' | 'C' | 'D' | 'F' | 'I' | 'J' | 'S' | 'Z') => {
                BaseType::parse_from(source).map(FieldType::Base)
            }
            Some('L' | '[') => RefType::parse_from(source).map(FieldType::Ref),
            Some(c) => {
                let msg = format!("Invalid field type character '{}'", c);
                Err(Error::new(ErrorKind::InvalidInput, msg))
            }
        }
    }
}

/// Signature of a method
#[derive(PartialEq, Eq, Hash, Debug, Clone)]
pub struct MethodDescriptor {
    pub parameters: Vec<FieldType>,
    pub return_type: Option<FieldType>, // `None` is for `void` (ie. no return)
}

impl MethodDescriptor {
    /// Total width of parameters (not the same as the length of the vector), which must be 255 or
    /// less for it to be valid
    pub fn parameter_length(&self, has_this_param: bool) -> usize {
        let this_len = if has_this_param { 1 } else { 0 };
        this_len + self.parameters.iter().map(Width::width).sum::<usize>()
    }
}

impl RenderDescriptor for MethodDescriptor {
    fn render_to(&self, write_to: &mut String) {
        write_to.push('(');
        for parameter in &self.parameters {
            parameter.render_to(write_to);
        }
        write_to.push(')');
        match &self.return_type {
            None => write_to.push('V'),
            Some(typ) => typ.render_to(write_to),
        };
    }
}

impl ParseDescriptor for MethodDescriptor {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        if source.next_if_eq(&'(').is_none() {
            let msg = "Expected '(' for method";
            return Err(Error::new(ErrorKind::InvalidInput, msg));
        }

        let mut parameters = vec![];
        while source.peek().copied() != Some(')') {
            parameters.push(FieldType::parse_from(source)?);
        }
        let _ = source.next();

        let return_type = if source.next_if_eq(&'V').is_some() {
            None
        } else {
            Some(FieldType::parse_from(source)?)
        };

        Ok(MethodDescriptor {
            parameters,
            return_type,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fmt::Debug;

    fn round_trip<T: RenderDescriptor + ParseDescriptor + Debug + Eq>(rendered: &str, parsed: T) {
        assert_eq!(rendered, parsed.render());
        assert_eq!(T::parse(rendered).unwrap(), parsed);
    }

    const INT: FieldType = FieldType::Base(BaseType::Int);
    const DOUBLE: FieldType = FieldType::Base(BaseType::Double);
    const OBJECT: FieldType = FieldType::object(BinaryName::OBJECT);
    const STRING: FieldType = FieldType::object(BinaryName::STRING);

    #[test]
    fn field_types() {
        round_trip("I", INT);
        round_trip("Ljava/lang/Object;", OBJECT);
        round_trip(
            "[[[D",
            FieldType::array(FieldType::array(FieldType::array(DOUBLE))),
        );
        round_trip("[Ljava/lang/String;", FieldType::array(STRING));
        assert!(FieldType::parse("Q").is_err());
        assert!(FieldType::parse("Ljava/lang/Object").is_err());
        assert!(FieldType::parse("II").is_err());
    }

    #[test]
    fn method_descriptors() {
        round_trip(
            "(ID[Ljava/lang/String;)Ljava/lang/Object;",
            MethodDescriptor {
                parameters: vec![INT, DOUBLE, FieldType::array(STRING)],
                return_type: Some(OBJECT),
            },
        );
        round_trip(
            "()V",
            MethodDescriptor {
                parameters: vec![],
                return_type: None,
            },
        );
        let desc = MethodDescriptor::parse("(JIJ)V").unwrap();
        assert_eq!(desc.parameter_length(false), 5);
        assert_eq!(desc.parameter_length(true), 6);
    }

    #[test]
    fn array_members() {
        let ints = RefType::array(INT);
        assert_eq!(ints.array_member_type(), Some(INT));

        let strings_2d = RefType::array(FieldType::array(STRING));
        assert_eq!(
            strings_2d.array_member_type(),
            Some(FieldType::array(STRING))
        );
        assert_eq!(
            RefType::array(STRING).array_member_type(),
            Some(STRING)
        );
        assert_eq!(RefType::STRING.array_member_type(), None);
    }
}
