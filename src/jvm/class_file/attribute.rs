use crate::jvm::class_file::{ClassConstantIndex, Serialize, Utf8ConstantIndex};
use byteorder::WriteBytesExt;

/// Attributes (used in classes, fields, methods, and even on some attributes)
///
/// The representation is designed to be easily extended with custom attributes.
/// While some attributes aren't essential, others are really important (eg. the
/// code attribute for including the actual bytecode).
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7
#[derive(Debug)]
pub struct Attribute {
    pub name_index: Utf8ConstantIndex,
    pub info: Vec<u8>,
}

impl Serialize for Attribute {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.name_index.serialize(writer)?;

        // Attribute info length is 4 bytes
        (self.info.len() as u32).serialize(writer)?;
        writer.write_all(&self.info)?;

        Ok(())
    }
}

/// Attributes are all stored in the same way (see `Attribute`), but internally
/// they represent very different things. This trait is implemented by things
/// which can be turned into attributes.
pub trait AttributeLike: Serialize {
    /// Name of the attribute
    const NAME: &'static str;
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.3
#[derive(Debug)]
pub struct Code {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code_array: BytecodeArray,
    pub exception_table: Vec<ExceptionHandler>,
    pub attributes: Vec<Attribute>,
}

impl Serialize for Code {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.max_stack.serialize(writer)?;
        self.max_locals.serialize(writer)?;
        self.code_array.serialize(writer)?;
        self.exception_table.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

impl AttributeLike for Code {
    const NAME: &'static str = "Code";
}

/// Entry in the exception table of a `Code` attribute
#[derive(Debug, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Start of exception handler range (inclusive)
    pub start_pc: BytecodeIndex,

    /// End of exception handler range (exclusive)
    pub end_pc: BytecodeIndex,

    /// Start of the exception handler
    pub handler_pc: BytecodeIndex,

    /// Class of exceptions caught (`None` catches everything, as for `finally`)
    pub catch_type: Option<ClassConstantIndex>,
}

impl Serialize for ExceptionHandler {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.start_pc.serialize(writer)?;
        self.end_pc.serialize(writer)?;
        self.handler_pc.serialize(writer)?;
        match &self.catch_type {
            Some(catch_type) => catch_type.serialize(writer),
            None => 0u16.serialize(writer),
        }
    }
}

/// Encoded bytecode instructions
#[derive(Debug, PartialEq, Eq)]
pub struct BytecodeArray(pub Vec<u8>);

impl Serialize for BytecodeArray {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        let len = self.0.len() as u32;
        len.serialize(writer)?;
        writer.write_all(&self.0)?;
        Ok(())
    }
}

/// Index into `BytecodeArray`
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct BytecodeIndex(pub u16);

impl Serialize for BytecodeIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.10
#[derive(Debug)]
pub struct SourceFile(pub Utf8ConstantIndex);

impl Serialize for SourceFile {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl AttributeLike for SourceFile {
    const NAME: &'static str = "SourceFile";
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::ConstantsPool;

    #[test]
    fn catch_all_handlers_use_index_zero() {
        let handler = ExceptionHandler {
            start_pc: BytecodeIndex(0),
            end_pc: BytecodeIndex(4),
            handler_pc: BytecodeIndex(7),
            catch_type: None,
        };
        let mut bytes = vec![];
        handler.serialize(&mut bytes).unwrap();
        assert_eq!(bytes, vec![0, 0, 0, 4, 0, 7, 0, 0]);
    }

    #[test]
    fn attribute_length_is_four_bytes() {
        let mut pool = ConstantsPool::new();
        let name = pool.get_utf8("Foo.java").unwrap();
        let attribute = pool.get_attribute(SourceFile(name)).unwrap();
        let mut bytes = vec![];
        attribute.serialize(&mut bytes).unwrap();

        // name index (2), length (4), sourcefile index (2)
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[2..6], &[0, 0, 0, 2]);
    }
}
