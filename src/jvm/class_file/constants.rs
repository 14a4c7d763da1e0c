use crate::jvm::class_file::{Attribute, AttributeLike, Serialize};
use crate::jvm::descriptors::RenderDescriptor;
use crate::jvm::names::Name;
use crate::jvm::{BinaryName, ConstantData, Error, FieldRef, MethodRef, RefType};
use crate::util::{Offset, OffsetVec, Width};
use byteorder::WriteBytesExt;
use std::borrow::{Borrow, Cow};
use std::collections::HashMap;
use std::result::Result;

/// Class file constants pool builder
///
/// The pool is append only and only after the pool is fully built up, it can be consumed into a
/// regular [`OffsetVec`]. Every `get_*` method inserts the constant if it is not already there.
pub struct ConstantsPool {
    constants: OffsetVec<Constant>,

    classes: HashMap<RefType, ClassConstantIndex>,
    fieldrefs: HashMap<FieldRef, FieldRefConstantIndex>,
    methodrefs: HashMap<MethodRef, MethodRefConstantIndex>,
    strings: HashMap<Utf8ConstantIndex, StringConstantIndex>,
    integers: HashMap<i32, ConstantIndex>,
    floats: HashMap<u32, ConstantIndex>,
    longs: HashMap<i64, ConstantIndex>,
    doubles: HashMap<u64, ConstantIndex>,
    name_and_types: HashMap<(Utf8ConstantIndex, Utf8ConstantIndex), NameAndTypeConstantIndex>,
    utf8s: HashMap<String, Utf8ConstantIndex>,
}

impl ConstantsPool {
    /// Make a fresh empty constants pool
    pub fn new() -> ConstantsPool {
        ConstantsPool {
            constants: OffsetVec::new_starting_at(Offset(1)),
            classes: HashMap::new(),
            fieldrefs: HashMap::new(),
            methodrefs: HashMap::new(),
            strings: HashMap::new(),
            integers: HashMap::new(),
            floats: HashMap::new(),
            longs: HashMap::new(),
            doubles: HashMap::new(),
            name_and_types: HashMap::new(),
            utf8s: HashMap::new(),
        }
    }

    /// Push a constant into the constant pool, provided there is space for it
    ///
    /// Note: the largest valid index is 65535, indexing starts at 1, and some constants take two
    /// spaces.
    fn push_constant(&mut self, constant: Constant) -> Result<ConstantIndex, ConstantPoolOverflow> {
        // Compute the offset at which this constant will be inserted
        let offset: u16 = self.constants.offset_len().0 as u16;

        // Detect if the next constant would overflow the pool
        if offset.checked_add(constant.width() as u16).is_none() {
            return Err(ConstantPoolOverflow { constant, offset });
        }

        self.constants.push(constant);
        Ok(ConstantIndex(offset))
    }

    /// Consume the pool and return the final vector of constants
    pub fn into_offset_vec(self) -> OffsetVec<Constant> {
        self.constants
    }

    /// Number of slots used by the pool (what goes into `constant_pool_count`)
    pub fn count(&self) -> u16 {
        self.constants.offset_len().0 as u16
    }

    /// Get or insert a utf8 constant from the constant pool
    pub fn get_utf8<'a, S: Into<Cow<'a, str>>>(
        &mut self,
        utf8: S,
    ) -> Result<Utf8ConstantIndex, ConstantPoolOverflow> {
        let cow = utf8.into();

        if let Some(idx) = self.utf8s.get::<str>(cow.borrow()) {
            Ok(*idx)
        } else {
            let owned = cow.into_owned();
            let constant = Constant::Utf8(owned.clone());
            let idx = Utf8ConstantIndex(self.push_constant(constant)?);
            self.utf8s.insert(owned, idx);
            Ok(idx)
        }
    }

    /// Get or insert a string constant from the constant pool
    pub fn get_string(
        &mut self,
        utf8: Utf8ConstantIndex,
    ) -> Result<StringConstantIndex, ConstantPoolOverflow> {
        if let Some(idx) = self.strings.get(&utf8) {
            Ok(*idx)
        } else {
            let constant = Constant::String(utf8);
            let idx = StringConstantIndex(self.push_constant(constant)?);
            self.strings.insert(utf8, idx);
            Ok(idx)
        }
    }

    /// Get or insert a name & type constant from the constant pool
    pub fn get_name_and_type(
        &mut self,
        name: Utf8ConstantIndex,
        descriptor: Utf8ConstantIndex,
    ) -> Result<NameAndTypeConstantIndex, ConstantPoolOverflow> {
        let name_and_type_key = (name, descriptor);
        if let Some(idx) = self.name_and_types.get(&name_and_type_key) {
            Ok(*idx)
        } else {
            let constant = Constant::NameAndType { name, descriptor };
            let idx = NameAndTypeConstantIndex(self.push_constant(constant)?);
            self.name_and_types.insert(name_and_type_key, idx);
            Ok(idx)
        }
    }

    /// Get or insert a `CONSTANT_Class_info`
    ///
    /// When making a `CONSTANT_Class_info`, reference types are almost always objects. However,
    /// there are a handful of places where an array type needs to be fit in (eg. for a `checkcast`
    /// to an array type). See [this section of the JVM specification][0] for more.
    ///
    /// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.4.1
    pub fn get_class(&mut self, ref_type: &RefType) -> Result<ClassConstantIndex, ConstantPoolOverflow> {
        if let Some(idx) = self.classes.get(ref_type) {
            Ok(*idx)
        } else {
            let name = match ref_type {
                RefType::Object(class) => self.get_utf8(class.as_str())?,
                other => self.get_utf8(other.render())?,
            };
            let constant = Constant::Class(name);
            let idx = ClassConstantIndex(self.push_constant(constant)?);
            self.classes.insert(ref_type.clone(), idx);
            Ok(idx)
        }
    }

    /// Get or insert a `CONSTANT_Class_info` for a plain class
    pub fn get_class_name(
        &mut self,
        class: &BinaryName,
    ) -> Result<ClassConstantIndex, ConstantPoolOverflow> {
        self.get_class(&RefType::Object(class.clone()))
    }

    /// Get or insert a `CONSTANT_Fieldref_info`
    pub fn get_field_ref(
        &mut self,
        field: &FieldRef,
    ) -> Result<FieldRefConstantIndex, ConstantPoolOverflow> {
        if let Some(idx) = self.fieldrefs.get(field) {
            Ok(*idx)
        } else {
            let class_idx = self.get_class_name(&field.class)?;
            let field_utf8 = self.get_utf8(field.name.as_str())?;
            let desc_utf8 = self.get_utf8(field.descriptor.render())?;
            let name_and_type_idx = self.get_name_and_type(field_utf8, desc_utf8)?;
            let constant = Constant::FieldRef(class_idx, name_and_type_idx);
            let idx = FieldRefConstantIndex(self.push_constant(constant)?);
            self.fieldrefs.insert(field.clone(), idx);
            Ok(idx)
        }
    }

    /// Get or insert a `CONSTANT_Methodref_info` or `CONSTANT_InterfaceMethodref_info`
    pub fn get_method_ref(
        &mut self,
        method: &MethodRef,
    ) -> Result<MethodRefConstantIndex, ConstantPoolOverflow> {
        if let Some(idx) = self.methodrefs.get(method) {
            Ok(*idx)
        } else {
            let class_idx = self.get_class_name(&method.class)?;
            let method_utf8 = self.get_utf8(method.name.as_str())?;
            let desc_utf8 = self.get_utf8(method.descriptor.render())?;
            let name_and_type_idx = self.get_name_and_type(method_utf8, desc_utf8)?;
            let constant = Constant::MethodRef {
                class: class_idx,
                name_and_type: name_and_type_idx,
                is_interface: method.is_interface,
            };
            let idx = MethodRefConstantIndex(self.push_constant(constant)?);
            self.methodrefs.insert(method.clone(), idx);
            Ok(idx)
        }
    }

    /// Get or insert a constant which can be loaded up using `ldc`, `ldc_w`, or `ldc2_w`
    pub fn get_constant(
        &mut self,
        constant: &ConstantData,
    ) -> Result<ConstantIndex, ConstantPoolOverflow> {
        match constant {
            ConstantData::String(string) => {
                let str_utf8 = self.get_utf8(string.as_str())?;
                let str_idx = self.get_string(str_utf8)?;
                Ok(str_idx.into())
            }
            ConstantData::Class(class) => Ok(self.get_class(class)?.into()),
            ConstantData::Integer(integer) => {
                if let Some(idx) = self.integers.get(integer) {
                    Ok(*idx)
                } else {
                    let idx = self.push_constant(Constant::Integer(*integer))?;
                    self.integers.insert(*integer, idx);
                    Ok(idx)
                }
            }
            ConstantData::Long(long) => {
                if let Some(idx) = self.longs.get(long) {
                    Ok(*idx)
                } else {
                    let idx = self.push_constant(Constant::Long(*long))?;
                    self.longs.insert(*long, idx);
                    Ok(idx)
                }
            }
            ConstantData::Float(float) => {
                // Keyed on bits so that `NaN`s and signed zeros get their own entries
                let bits = float.to_bits();
                if let Some(idx) = self.floats.get(&bits) {
                    Ok(*idx)
                } else {
                    let idx = self.push_constant(Constant::Float(*float))?;
                    self.floats.insert(bits, idx);
                    Ok(idx)
                }
            }
            ConstantData::Double(double) => {
                let bits = double.to_bits();
                if let Some(idx) = self.doubles.get(&bits) {
                    Ok(*idx)
                } else {
                    let idx = self.push_constant(Constant::Double(*double))?;
                    self.doubles.insert(bits, idx);
                    Ok(idx)
                }
            }
        }
    }

    /// Add an attribute to the constant pool
    pub fn get_attribute<A: AttributeLike>(&mut self, attribute: A) -> Result<Attribute, Error> {
        let name_index = self.get_utf8(A::NAME)?;
        let mut info = vec![];

        attribute.serialize(&mut info).map_err(Error::IoError)?;

        Ok(Attribute { name_index, info })
    }
}

impl Default for ConstantsPool {
    fn default() -> Self {
        ConstantsPool::new()
    }
}

#[derive(Debug)]
pub struct ConstantPoolOverflow {
    pub constant: Constant,
    pub offset: u16,
}

/// Constants as in the constant pool
///
/// Note: only the constant types that can come out of translation are included
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.4
#[derive(Debug, Clone)]
pub enum Constant {
    /// Class or an interface
    Class(Utf8ConstantIndex),

    /// Field
    FieldRef(ClassConstantIndex, NameAndTypeConstantIndex),

    /// Method (this combines `Methodref` and `InterfaceMethodref`
    MethodRef {
        class: ClassConstantIndex,
        name_and_type: NameAndTypeConstantIndex,
        is_interface: bool,
    },

    /// Constant object of type `java.lang.String`
    String(Utf8ConstantIndex),

    /// Constant primitive of type `int`
    Integer(i32),

    /// Constant primitive of type `float`
    Float(f32),

    /// Constant primitive of type `long`
    Long(i64),

    /// Constant primitive of type `double`
    Double(f64),

    /// Name and a type (eg. for a field or a method)
    NameAndType {
        name: Utf8ConstantIndex,
        descriptor: Utf8ConstantIndex,
    },

    /// Constant UTF-8 encoded raw string value
    ///
    /// Despite the name, the encoding is not quite UTF-8 (the encoding of the
    /// null character `\u{0000}` and the encoding of supplementary characters
    /// is different).
    Utf8(String),
}

impl Serialize for Constant {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            Constant::Utf8(string) => {
                1u8.serialize(writer)?;
                let buffer: Vec<u8> = encode_modified_utf8(string);
                (buffer.len() as u16).serialize(writer)?;
                writer.write_all(&buffer)?;
            }
            Constant::Integer(integer) => {
                3u8.serialize(writer)?;
                integer.serialize(writer)?;
            }
            Constant::Float(float) => {
                4u8.serialize(writer)?;
                float.serialize(writer)?;
            }
            Constant::Long(long) => {
                5u8.serialize(writer)?;
                long.serialize(writer)?;
            }
            Constant::Double(double) => {
                6u8.serialize(writer)?;
                double.serialize(writer)?;
            }
            Constant::Class(name) => {
                7u8.serialize(writer)?;
                name.serialize(writer)?;
            }
            Constant::String(bytes) => {
                8u8.serialize(writer)?;
                bytes.serialize(writer)?;
            }
            Constant::FieldRef(class, name_and_type) => {
                9u8.serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => {
                (if !is_interface { 10u8 } else { 11u8 }).serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::NameAndType { name, descriptor } => {
                12u8.serialize(writer)?;
                name.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
        };
        Ok(())
    }
}

/// Modified UTF-8 format used in class files.
///
/// See [this `DataInput` section for details][0]. Quoting from that section:
///
/// > The differences between this format and the standard UTF-8 format are the following:
/// >
/// >  * The null byte `\u0000` is encoded in 2-byte format rather than 1-byte, so that the encoded
/// >    strings never have embedded nulls.
/// >  * Only the 1-byte, 2-byte, and 3-byte formats are used.
/// >  * Supplementary characters are represented in the form of surrogate pairs.
///
/// [0]: https://docs.oracle.com/en/java/javase/17/docs/api/java.base/java/io/DataInput.html#modified-utf-8
pub fn encode_modified_utf8(string: &str) -> Vec<u8> {
    let mut buffer: Vec<u8> = vec![];
    for c in string.chars() {
        // Handle the exception for how `\u{0000}` is represented
        let len: usize = if c == '\u{0000}' { 2 } else { c.len_utf8() };
        let code: u32 = c as u32;

        match len {
            1 => buffer.push(code as u8),
            2 => {
                buffer.push((code >> 6 & 0x1F) as u8 | 0b1100_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }
            3 => {
                buffer.push((code >> 12 & 0x0F) as u8 | 0b1110_0000);
                buffer.push((code >> 6 & 0x3F) as u8 | 0b1000_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }

            // Supplementary characters: main divergence from unicode
            _ => {
                buffer.push(0b1110_1101);
                buffer.push(((code >> 16 & 0x0F) as u8).wrapping_sub(1) & 0x0F | 0b1010_0000);
                buffer.push((code >> 10 & 0x3F) as u8 | 0b1000_0000);

                buffer.push(0b1110_1101);
                buffer.push(((code >> 6 & 0x1F) as u8) | 0b1011_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }
        }
    }
    buffer
}

/// Almost all constants have width 1, except for `Constant::Long` and `Constant::Double`:
///
/// > All 8-byte constants take up two entries in the constant_pool table of the class file. If a
/// > CONSTANT_Long_info or CONSTANT_Double_info structure is the item in the constant_pool table
/// > at index n, then the next usable item in the pool is located at index n+2.
impl Width for Constant {
    fn width(&self) -> usize {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }
}

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct ConstantIndex(pub u16);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct Utf8ConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct StringConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct NameAndTypeConstantIndex(ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct ClassConstantIndex(ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct FieldRefConstantIndex(ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct MethodRefConstantIndex(ConstantIndex);

impl From<StringConstantIndex> for ConstantIndex {
    fn from(idx: StringConstantIndex) -> ConstantIndex {
        idx.0
    }
}
impl From<ClassConstantIndex> for ConstantIndex {
    fn from(idx: ClassConstantIndex) -> ConstantIndex {
        idx.0
    }
}

impl Serialize for ConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}
impl Serialize for Utf8ConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}
impl Serialize for StringConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}
impl Serialize for NameAndTypeConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}
impl Serialize for ClassConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}
impl Serialize for FieldRefConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}
impl Serialize for MethodRefConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}
