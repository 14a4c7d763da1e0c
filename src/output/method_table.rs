//! Register-form container: every class of an application with register-form method bodies
//!
//! Everything is little-endian. Strings are a `u32` byte length followed by UTF-8. The layout:
//!
//! ```text
//! container   := "DXTB" u16:format_version u32:min_api_level u32:class_count (u32:length class)*
//! class       := name opt(super) u32:n name*n u16:access opt(source) opt(version)
//!                u32:n field*n u32:n method*n
//! field       := name descriptor u16:access
//! method      := name descriptor u16:access u8:code_tag [code]
//! code        := u16:registers u16:ins u16:outs u8:payload_encoding
//!                u32:n instruction*n u32:n try*n u32:n payload*n
//! ```
//!
//! The code tag is `0` for no code, `1` for register code and `2` for the sentinel body. Stack
//! code can't be stored in the container.

use crate::convert::{ApiLevel, ExportFault};
use crate::dex::{
    Address, BinaryOp, CatchHandler, CompareKind, ConstValue, DexCode, DexInstruction, IfTest,
    InvokeKind, MemberType, NumericType, PayloadEncoding, Register, TryItem, UnaryOp, ValueType,
};
use crate::jvm::class_file::Version;
use crate::jvm::{
    BinaryName, ClassAccessFlags, FieldAccessFlags, FieldRef, FieldType, MethodAccessFlags,
    MethodDescriptor, MethodRef, Name, ParseDescriptor, RefType, RenderDescriptor,
    UnqualifiedName,
};
use crate::model::{Application, MethodCode, ProgramClass, ProgramField, ProgramMethod};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::{self, Cursor, Read, Write};

pub const MAGIC: [u8; 4] = *b"DXTB";
pub const FORMAT_VERSION: u16 = 1;

const CODE_NONE: u8 = 0;
const CODE_REGISTER: u8 = 1;
const CODE_THROW_NULL: u8 = 2;

const VALUE_TYPES: [ValueType; 5] = [
    ValueType::Int,
    ValueType::Long,
    ValueType::Float,
    ValueType::Double,
    ValueType::Object,
];

const MEMBER_TYPES: [MemberType; 8] = [
    MemberType::Object,
    MemberType::BooleanOrByte,
    MemberType::Char,
    MemberType::Short,
    MemberType::Int,
    MemberType::Float,
    MemberType::Long,
    MemberType::Double,
];

const IF_TESTS: [IfTest; 6] = [
    IfTest::Eq,
    IfTest::Ne,
    IfTest::Lt,
    IfTest::Ge,
    IfTest::Gt,
    IfTest::Le,
];

const COMPARE_KINDS: [CompareKind; 5] = [
    CompareKind::LessFloat,
    CompareKind::GreaterFloat,
    CompareKind::LessDouble,
    CompareKind::GreaterDouble,
    CompareKind::Long,
];

const UNARY_OPS: [UnaryOp; 21] = [
    UnaryOp::NegInt,
    UnaryOp::NotInt,
    UnaryOp::NegLong,
    UnaryOp::NotLong,
    UnaryOp::NegFloat,
    UnaryOp::NegDouble,
    UnaryOp::IntToLong,
    UnaryOp::IntToFloat,
    UnaryOp::IntToDouble,
    UnaryOp::LongToInt,
    UnaryOp::LongToFloat,
    UnaryOp::LongToDouble,
    UnaryOp::FloatToInt,
    UnaryOp::FloatToLong,
    UnaryOp::FloatToDouble,
    UnaryOp::DoubleToInt,
    UnaryOp::DoubleToLong,
    UnaryOp::DoubleToFloat,
    UnaryOp::IntToByte,
    UnaryOp::IntToChar,
    UnaryOp::IntToShort,
];

const BINARY_OPS: [BinaryOp; 12] = [
    BinaryOp::Add,
    BinaryOp::Sub,
    BinaryOp::Mul,
    BinaryOp::Div,
    BinaryOp::Rem,
    BinaryOp::And,
    BinaryOp::Or,
    BinaryOp::Xor,
    BinaryOp::Shl,
    BinaryOp::Shr,
    BinaryOp::Ushr,
    BinaryOp::RSub,
];

const NUMERIC_TYPES: [NumericType; 4] = [
    NumericType::Int,
    NumericType::Long,
    NumericType::Float,
    NumericType::Double,
];

const INVOKE_KINDS: [InvokeKind; 5] = [
    InvokeKind::Virtual,
    InvokeKind::Super,
    InvokeKind::Direct,
    InvokeKind::Static,
    InvokeKind::Interface,
];

const PAYLOAD_ENCODINGS: [PayloadEncoding; 2] = [PayloadEncoding::Little, PayloadEncoding::Big];

/// Container could not be read
#[derive(Debug)]
pub enum ContainerError {
    /// Input ended early (or could not be read at all)
    Io(io::Error),

    BadMagic([u8; 4]),
    UnsupportedVersion(u16),

    /// Contents don't decode into a valid application
    Malformed(String),
}

impl fmt::Display for ContainerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerError::Io(err) => write!(f, "cannot read container: {}", err),
            ContainerError::BadMagic(magic) => write!(f, "not a container (magic {:02x?})", magic),
            ContainerError::UnsupportedVersion(version) => {
                write!(f, "unsupported container format version {}", version)
            }
            ContainerError::Malformed(message) => write!(f, "malformed container: {}", message),
        }
    }
}

impl std::error::Error for ContainerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ContainerError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for ContainerError {
    fn from(err: io::Error) -> ContainerError {
        ContainerError::Io(err)
    }
}

/// Writes register-form applications into the container format
#[derive(Copy, Clone, Debug, Default)]
pub struct MethodTableWriter {
    pub min_api_level: ApiLevel,
}

impl MethodTableWriter {
    pub fn new(min_api_level: ApiLevel) -> MethodTableWriter {
        MethodTableWriter { min_api_level }
    }

    /// Encode the entry for one class
    ///
    /// Entries don't depend on each other, so they can be encoded on different threads and
    /// assembled later with [`MethodTableWriter::assemble`].
    pub fn encode_class(class: &ProgramClass) -> Result<Vec<u8>, ExportFault> {
        let mut encoder = Encoder { bytes: vec![] };
        encoder.class(class)?;
        Ok(encoder.bytes)
    }

    /// Build the container out of class entries (in order)
    pub fn assemble(&self, entries: &[Vec<u8>]) -> Result<Vec<u8>, ExportFault> {
        let mut encoder = Encoder { bytes: vec![] };
        encoder.bytes.write_all(&MAGIC)?;
        encoder.bytes.write_u16::<LittleEndian>(FORMAT_VERSION)?;
        encoder.bytes.write_u32::<LittleEndian>(self.min_api_level.0)?;
        encoder.length(entries.len())?;
        for entry in entries {
            encoder.length(entry.len())?;
            encoder.bytes.write_all(entry)?;
        }
        Ok(encoder.bytes)
    }

    /// Encode a whole application
    pub fn write(&self, application: &Application) -> Result<Vec<u8>, ExportFault> {
        let entries = application
            .classes()
            .map(MethodTableWriter::encode_class)
            .collect::<Result<Vec<_>, _>>()?;
        self.assemble(&entries)
    }
}

/// Decoded container
#[derive(Clone, PartialEq, Debug)]
pub struct MethodTable {
    pub min_api_level: ApiLevel,
    pub application: Application,
}

/// Reads the container format (this is how register-form input gets loaded)
pub struct MethodTableReader;

impl MethodTableReader {
    pub fn read(bytes: &[u8]) -> Result<MethodTable, ContainerError> {
        let mut decoder = Decoder {
            cursor: Cursor::new(bytes),
        };

        let mut magic = [0; 4];
        decoder.cursor.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(ContainerError::BadMagic(magic));
        }
        let version = decoder.u16()?;
        if version != FORMAT_VERSION {
            return Err(ContainerError::UnsupportedVersion(version));
        }
        let min_api_level = ApiLevel(decoder.u32()?);

        let class_count = decoder.u32()?;
        let mut application = Application::new();
        for _ in 0..class_count {
            let length = decoder.length()?;
            let start = decoder.cursor.position();
            let class = decoder.class()?;
            if decoder.cursor.position() - start != length as u64 {
                return Err(ContainerError::Malformed(format!(
                    "entry for {} does not match its length",
                    class.name
                )));
            }
            if application.update_class(class).is_some() {
                return Err(ContainerError::Malformed(String::from("duplicate class")));
            }
        }
        if decoder.remaining() > 0 {
            return Err(ContainerError::Malformed(format!(
                "{} trailing bytes",
                decoder.remaining()
            )));
        }

        Ok(MethodTable {
            min_api_level,
            application,
        })
    }
}

fn tag_of<T: PartialEq + fmt::Debug>(table: &[T], value: &T) -> Result<u8, ExportFault> {
    table
        .iter()
        .position(|entry| entry == value)
        .map(|idx| idx as u8)
        .ok_or_else(|| ExportFault::Encoding(format!("no tag for {:?}", value)))
}

fn from_tag<T: Copy>(table: &[T], tag: u8, what: &str) -> Result<T, ContainerError> {
    table
        .get(tag as usize)
        .copied()
        .ok_or_else(|| ContainerError::Malformed(format!("bad {} tag {}", what, tag)))
}

struct Encoder {
    bytes: Vec<u8>,
}

impl Encoder {
    fn u8(&mut self, value: u8) -> Result<(), ExportFault> {
        Ok(self.bytes.write_u8(value)?)
    }

    fn u16(&mut self, value: u16) -> Result<(), ExportFault> {
        Ok(self.bytes.write_u16::<LittleEndian>(value)?)
    }

    fn u32(&mut self, value: u32) -> Result<(), ExportFault> {
        Ok(self.bytes.write_u32::<LittleEndian>(value)?)
    }

    fn i32(&mut self, value: i32) -> Result<(), ExportFault> {
        Ok(self.bytes.write_i32::<LittleEndian>(value)?)
    }

    fn length(&mut self, length: usize) -> Result<(), ExportFault> {
        let length = u32::try_from(length)
            .map_err(|_| ExportFault::Encoding(format!("length {} is too large", length)))?;
        self.u32(length)
    }

    fn bool(&mut self, value: bool) -> Result<(), ExportFault> {
        self.u8(value as u8)
    }

    fn string(&mut self, string: &str) -> Result<(), ExportFault> {
        self.length(string.len())?;
        Ok(self.bytes.write_all(string.as_bytes())?)
    }

    fn optional<T>(
        &mut self,
        value: Option<&T>,
        encode: impl FnOnce(&mut Encoder, &T) -> Result<(), ExportFault>,
    ) -> Result<(), ExportFault> {
        match value {
            None => self.u8(0),
            Some(value) => {
                self.u8(1)?;
                encode(self, value)
            }
        }
    }

    fn register(&mut self, register: Register) -> Result<(), ExportFault> {
        self.u16(register.0)
    }

    fn registers(&mut self, registers: &[Register]) -> Result<(), ExportFault> {
        let count = u16::try_from(registers.len())
            .map_err(|_| ExportFault::Encoding(format!("{} registers", registers.len())))?;
        self.u16(count)?;
        registers
            .iter()
            .try_for_each(|register| self.register(*register))
    }

    fn address(&mut self, address: Address) -> Result<(), ExportFault> {
        self.u32(address)
    }

    fn tag<T: PartialEq + fmt::Debug>(&mut self, table: &[T], value: &T) -> Result<(), ExportFault> {
        let tag = tag_of(table, value)?;
        self.u8(tag)
    }

    fn binary_name(&mut self, name: &BinaryName) -> Result<(), ExportFault> {
        self.string(name.as_str())
    }

    fn descriptor(&mut self, descriptor: &impl RenderDescriptor) -> Result<(), ExportFault> {
        self.string(&descriptor.render())
    }

    fn field_ref(&mut self, field: &FieldRef) -> Result<(), ExportFault> {
        self.binary_name(&field.class)?;
        self.string(field.name.as_str())?;
        self.descriptor(&field.descriptor)
    }

    fn method_ref(&mut self, method: &MethodRef) -> Result<(), ExportFault> {
        self.binary_name(&method.class)?;
        self.string(method.name.as_str())?;
        self.descriptor(&method.descriptor)?;
        self.bool(method.is_interface)
    }

    fn class(&mut self, class: &ProgramClass) -> Result<(), ExportFault> {
        self.binary_name(&class.name)?;
        self.optional(class.super_class.as_ref(), Encoder::binary_name)?;
        self.length(class.interfaces.len())?;
        for interface in &class.interfaces {
            self.binary_name(interface)?;
        }
        self.u16(class.access_flags.bits())?;
        self.optional(class.source_file.as_ref(), |encoder, source| {
            encoder.string(source)
        })?;
        self.optional(class.version.as_ref(), |encoder, version| {
            encoder.u16(version.major_version)?;
            encoder.u16(version.minor_version)
        })?;

        self.length(class.fields.len())?;
        for field in &class.fields {
            self.string(field.name.as_str())?;
            self.descriptor(&field.descriptor)?;
            self.u16(field.access_flags.bits())?;
        }

        self.length(class.methods.len())?;
        for method in &class.methods {
            self.string(method.name.as_str())?;
            self.descriptor(&method.descriptor)?;
            self.u16(method.access_flags.bits())?;
            match &method.code {
                None => self.u8(CODE_NONE)?,
                Some(MethodCode::ThrowNull) => self.u8(CODE_THROW_NULL)?,
                Some(MethodCode::Register(code)) => {
                    self.u8(CODE_REGISTER)?;
                    self.code(code)?;
                }
                Some(MethodCode::Stack(_)) => {
                    return Err(ExportFault::Encoding(format!(
                        "{} has stack code",
                        method.identity(&class.name)
                    )))
                }
            }
        }
        Ok(())
    }

    fn code(&mut self, code: &DexCode) -> Result<(), ExportFault> {
        self.u16(code.registers_size)?;
        self.u16(code.ins_size)?;
        self.u16(code.outs_size)?;
        self.tag(&PAYLOAD_ENCODINGS, &code.payload_encoding)?;

        self.length(code.instructions.len())?;
        for insn in &code.instructions {
            self.instruction(insn)?;
        }

        self.length(code.tries.len())?;
        for try_item in &code.tries {
            self.address(try_item.start)?;
            self.address(try_item.end)?;
            self.length(try_item.handlers.len())?;
            for handler in &try_item.handlers {
                self.optional(handler.catch_type.as_ref(), Encoder::binary_name)?;
                self.address(handler.target)?;
            }
        }

        self.length(code.payloads.len())?;
        for (offset, payload) in &code.payloads {
            self.u32(*offset)?;
            self.length(payload.len())?;
            self.bytes.write_all(payload)?;
        }
        Ok(())
    }

    fn constant(&mut self, value: &ConstValue) -> Result<(), ExportFault> {
        match value {
            ConstValue::Int(int) => {
                self.u8(0)?;
                self.i32(*int)
            }
            ConstValue::Long(long) => {
                self.u8(1)?;
                Ok(self.bytes.write_i64::<LittleEndian>(*long)?)
            }
            ConstValue::Float(float) => {
                self.u8(2)?;
                self.u32(float.to_bits())
            }
            ConstValue::Double(double) => {
                self.u8(3)?;
                Ok(self.bytes.write_u64::<LittleEndian>(double.to_bits())?)
            }
            ConstValue::Null => self.u8(4),
            ConstValue::String(string) => {
                self.u8(5)?;
                self.string(string)
            }
            ConstValue::Class(ref_type) => {
                self.u8(6)?;
                self.descriptor(ref_type)
            }
        }
    }

    fn instruction(&mut self, insn: &DexInstruction) -> Result<(), ExportFault> {
        use DexInstruction::*;

        match insn {
            Nop => self.u8(0)?,
            Move {
                value_type,
                dest,
                src,
            } => {
                self.u8(1)?;
                self.tag(&VALUE_TYPES, value_type)?;
                self.register(*dest)?;
                self.register(*src)?;
            }
            MoveResult { value_type, dest } => {
                self.u8(2)?;
                self.tag(&VALUE_TYPES, value_type)?;
                self.register(*dest)?;
            }
            MoveException { dest } => {
                self.u8(3)?;
                self.register(*dest)?;
            }
            ReturnVoid => self.u8(4)?,
            Return { value_type, src } => {
                self.u8(5)?;
                self.tag(&VALUE_TYPES, value_type)?;
                self.register(*src)?;
            }
            Const { dest, value } => {
                self.u8(6)?;
                self.register(*dest)?;
                self.constant(value)?;
            }
            MonitorEnter(object) => {
                self.u8(7)?;
                self.register(*object)?;
            }
            MonitorExit(object) => {
                self.u8(8)?;
                self.register(*object)?;
            }
            CheckCast { object, ref_type } => {
                self.u8(9)?;
                self.register(*object)?;
                self.descriptor(ref_type)?;
            }
            InstanceOf {
                dest,
                object,
                ref_type,
            } => {
                self.u8(10)?;
                self.register(*dest)?;
                self.register(*object)?;
                self.descriptor(ref_type)?;
            }
            ArrayLength { dest, array } => {
                self.u8(11)?;
                self.register(*dest)?;
                self.register(*array)?;
            }
            NewInstance { dest, class } => {
                self.u8(12)?;
                self.register(*dest)?;
                self.binary_name(class)?;
            }
            NewArray {
                dest,
                size,
                array_type,
            } => {
                self.u8(13)?;
                self.register(*dest)?;
                self.register(*size)?;
                self.descriptor(array_type)?;
            }
            FilledNewArray {
                array_type,
                registers,
            } => {
                self.u8(14)?;
                self.string(array_type)?;
                self.registers(registers)?;
            }
            FilledNewArrayRange {
                array_type,
                start,
                count,
            } => {
                self.u8(15)?;
                self.string(array_type)?;
                self.register(*start)?;
                self.u16(*count)?;
            }
            FillArrayData {
                array,
                payload_offset,
            } => {
                self.u8(16)?;
                self.register(*array)?;
                self.u32(*payload_offset)?;
            }
            Throw(exception) => {
                self.u8(17)?;
                self.register(*exception)?;
            }
            Goto(target) => {
                self.u8(18)?;
                self.address(*target)?;
            }
            PackedSwitch {
                value,
                first_key,
                targets,
            } => {
                self.u8(19)?;
                self.register(*value)?;
                self.i32(*first_key)?;
                self.length(targets.len())?;
                for target in targets {
                    self.address(*target)?;
                }
            }
            SparseSwitch { value, targets } => {
                self.u8(20)?;
                self.register(*value)?;
                self.length(targets.len())?;
                for (key, target) in targets {
                    self.i32(*key)?;
                    self.address(*target)?;
                }
            }
            Compare {
                kind,
                dest,
                left,
                right,
            } => {
                self.u8(21)?;
                self.tag(&COMPARE_KINDS, kind)?;
                self.register(*dest)?;
                self.register(*left)?;
                self.register(*right)?;
            }
            If {
                test,
                value_type,
                left,
                right,
                target,
            } => {
                self.u8(22)?;
                self.tag(&IF_TESTS, test)?;
                self.tag(&VALUE_TYPES, value_type)?;
                self.register(*left)?;
                self.register(*right)?;
                self.address(*target)?;
            }
            IfZero {
                test,
                value_type,
                src,
                target,
            } => {
                self.u8(23)?;
                self.tag(&IF_TESTS, test)?;
                self.tag(&VALUE_TYPES, value_type)?;
                self.register(*src)?;
                self.address(*target)?;
            }
            ArrayGet {
                member,
                dest,
                array,
                index,
            } => {
                self.u8(24)?;
                self.tag(&MEMBER_TYPES, member)?;
                self.register(*dest)?;
                self.register(*array)?;
                self.register(*index)?;
            }
            ArrayPut {
                member,
                src,
                array,
                index,
            } => {
                self.u8(25)?;
                self.tag(&MEMBER_TYPES, member)?;
                self.register(*src)?;
                self.register(*array)?;
                self.register(*index)?;
            }
            InstanceGet {
                field,
                dest,
                object,
            } => {
                self.u8(26)?;
                self.field_ref(field)?;
                self.register(*dest)?;
                self.register(*object)?;
            }
            InstancePut { field, src, object } => {
                self.u8(27)?;
                self.field_ref(field)?;
                self.register(*src)?;
                self.register(*object)?;
            }
            StaticGet { field, dest } => {
                self.u8(28)?;
                self.field_ref(field)?;
                self.register(*dest)?;
            }
            StaticPut { field, src } => {
                self.u8(29)?;
                self.field_ref(field)?;
                self.register(*src)?;
            }
            Invoke { kind, method, args } => {
                self.u8(30)?;
                self.tag(&INVOKE_KINDS, kind)?;
                self.method_ref(method)?;
                self.registers(args)?;
            }
            Unary { op, dest, src } => {
                self.u8(31)?;
                self.tag(&UNARY_OPS, op)?;
                self.register(*dest)?;
                self.register(*src)?;
            }
            Binary {
                op,
                operand_type,
                dest,
                left,
                right,
            } => {
                self.u8(32)?;
                self.tag(&BINARY_OPS, op)?;
                self.tag(&NUMERIC_TYPES, operand_type)?;
                self.register(*dest)?;
                self.register(*left)?;
                self.register(*right)?;
            }
            BinaryLiteral {
                op,
                dest,
                src,
                literal,
            } => {
                self.u8(33)?;
                self.tag(&BINARY_OPS, op)?;
                self.register(*dest)?;
                self.register(*src)?;
                self.i32(*literal)?;
            }
            InvokeCustom { call_site, args } => {
                self.u8(34)?;
                self.string(call_site)?;
                self.registers(args)?;
            }
            ConstMethodHandle { dest, handle } => {
                self.u8(35)?;
                self.register(*dest)?;
                self.string(handle)?;
            }
        }
        Ok(())
    }
}

struct Decoder<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> Decoder<'a> {
    fn remaining(&self) -> usize {
        let len = self.cursor.get_ref().len() as u64;
        len.saturating_sub(self.cursor.position()) as usize
    }

    fn u8(&mut self) -> Result<u8, ContainerError> {
        Ok(self.cursor.read_u8()?)
    }

    fn u16(&mut self) -> Result<u16, ContainerError> {
        Ok(self.cursor.read_u16::<LittleEndian>()?)
    }

    fn u32(&mut self) -> Result<u32, ContainerError> {
        Ok(self.cursor.read_u32::<LittleEndian>()?)
    }

    fn i32(&mut self) -> Result<i32, ContainerError> {
        Ok(self.cursor.read_i32::<LittleEndian>()?)
    }

    /// Length prefix, checked against what is left of the input
    fn length(&mut self) -> Result<usize, ContainerError> {
        let length = self.u32()? as usize;
        if length > self.remaining() {
            return Err(ContainerError::Malformed(format!(
                "length {} exceeds the {} remaining bytes",
                length,
                self.remaining()
            )));
        }
        Ok(length)
    }

    fn bool(&mut self) -> Result<bool, ContainerError> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(ContainerError::Malformed(format!("bad boolean {}", other))),
        }
    }

    fn bytes(&mut self) -> Result<Vec<u8>, ContainerError> {
        let length = self.length()?;
        let mut bytes = vec![0; length];
        self.cursor.read_exact(&mut bytes)?;
        Ok(bytes)
    }

    fn string(&mut self) -> Result<String, ContainerError> {
        let bytes = self.bytes()?;
        String::from_utf8(bytes).map_err(|err| ContainerError::Malformed(err.to_string()))
    }

    fn optional<T>(
        &mut self,
        decode: impl FnOnce(&mut Decoder<'a>) -> Result<T, ContainerError>,
    ) -> Result<Option<T>, ContainerError> {
        if self.bool()? {
            decode(self).map(Some)
        } else {
            Ok(None)
        }
    }

    fn register(&mut self) -> Result<Register, ContainerError> {
        self.u16().map(Register)
    }

    fn registers(&mut self) -> Result<Vec<Register>, ContainerError> {
        let count = self.u16()?;
        (0..count).map(|_| self.register()).collect()
    }

    fn address(&mut self) -> Result<Address, ContainerError> {
        self.u32()
    }

    fn tag<T: Copy>(&mut self, table: &[T], what: &str) -> Result<T, ContainerError> {
        let tag = self.u8()?;
        from_tag(table, tag, what)
    }

    fn binary_name(&mut self) -> Result<BinaryName, ContainerError> {
        BinaryName::from_string(self.string()?).map_err(ContainerError::Malformed)
    }

    fn unqualified_name(&mut self) -> Result<UnqualifiedName, ContainerError> {
        UnqualifiedName::from_string(self.string()?).map_err(ContainerError::Malformed)
    }

    fn descriptor<D: ParseDescriptor>(&mut self) -> Result<D, ContainerError> {
        let string = self.string()?;
        D::parse(&string).map_err(|err| {
            ContainerError::Malformed(format!("bad descriptor '{}': {}", string, err))
        })
    }

    fn field_ref(&mut self) -> Result<FieldRef, ContainerError> {
        Ok(FieldRef {
            class: self.binary_name()?,
            name: self.unqualified_name()?,
            descriptor: self.descriptor::<FieldType>()?,
        })
    }

    fn method_ref(&mut self) -> Result<MethodRef, ContainerError> {
        Ok(MethodRef {
            class: self.binary_name()?,
            name: self.unqualified_name()?,
            descriptor: self.descriptor::<MethodDescriptor>()?,
            is_interface: self.bool()?,
        })
    }

    fn flags<F>(&mut self, from_bits: impl FnOnce(u16) -> Option<F>) -> Result<F, ContainerError> {
        let bits = self.u16()?;
        from_bits(bits)
            .ok_or_else(|| ContainerError::Malformed(format!("bad access flags {:#06x}", bits)))
    }

    fn class(&mut self) -> Result<ProgramClass, ContainerError> {
        let name = self.binary_name()?;
        let super_class = self.optional(Decoder::binary_name)?;
        let interface_count = self.u32()?;
        let interfaces = (0..interface_count)
            .map(|_| self.binary_name())
            .collect::<Result<Vec<_>, _>>()?;
        let access_flags = self.flags(ClassAccessFlags::from_bits)?;
        let source_file = self.optional(Decoder::string)?;
        let version = self.optional(|decoder| {
            Ok(Version {
                major_version: decoder.u16()?,
                minor_version: decoder.u16()?,
            })
        })?;

        let field_count = self.u32()?;
        let mut fields = vec![];
        for _ in 0..field_count {
            fields.push(ProgramField {
                name: self.unqualified_name()?,
                descriptor: self.descriptor::<FieldType>()?,
                access_flags: self.flags(FieldAccessFlags::from_bits)?,
            });
        }

        let method_count = self.u32()?;
        let mut methods = vec![];
        for _ in 0..method_count {
            let name = self.unqualified_name()?;
            let descriptor = self.descriptor::<MethodDescriptor>()?;
            let access_flags = self.flags(MethodAccessFlags::from_bits)?;
            let code = match self.u8()? {
                CODE_NONE => None,
                CODE_REGISTER => Some(MethodCode::Register(self.code()?)),
                CODE_THROW_NULL => Some(MethodCode::ThrowNull),
                other => {
                    return Err(ContainerError::Malformed(format!("bad code tag {}", other)))
                }
            };
            methods.push(ProgramMethod {
                name,
                descriptor,
                access_flags,
                code,
            });
        }

        Ok(ProgramClass {
            name,
            super_class,
            interfaces,
            access_flags,
            source_file,
            version,
            fields,
            methods,
        })
    }

    fn code(&mut self) -> Result<DexCode, ContainerError> {
        let registers_size = self.u16()?;
        let ins_size = self.u16()?;
        let outs_size = self.u16()?;
        let payload_encoding = self.tag(&PAYLOAD_ENCODINGS, "payload encoding")?;

        let insn_count = self.u32()?;
        let instructions = (0..insn_count)
            .map(|_| self.instruction())
            .collect::<Result<Vec<_>, _>>()?;

        let mut code = DexCode::new(registers_size, ins_size, instructions);
        code.outs_size = outs_size;
        code.payload_encoding = payload_encoding;

        let try_count = self.u32()?;
        for _ in 0..try_count {
            let start = self.address()?;
            let end = self.address()?;
            let handler_count = self.u32()?;
            let mut handlers = vec![];
            for _ in 0..handler_count {
                handlers.push(CatchHandler {
                    catch_type: self.optional(Decoder::binary_name)?,
                    target: self.address()?,
                });
            }
            code.tries.push(TryItem {
                start,
                end,
                handlers,
            });
        }

        let payload_count = self.u32()?;
        for _ in 0..payload_count {
            let offset = self.u32()?;
            let payload = self.bytes()?;
            code.payloads.insert(offset, payload);
        }
        Ok(code)
    }

    fn constant(&mut self) -> Result<ConstValue, ContainerError> {
        Ok(match self.u8()? {
            0 => ConstValue::Int(self.i32()?),
            1 => ConstValue::Long(self.cursor.read_i64::<LittleEndian>()?),
            2 => ConstValue::Float(f32::from_bits(self.u32()?)),
            3 => ConstValue::Double(f64::from_bits(self.cursor.read_u64::<LittleEndian>()?)),
            4 => ConstValue::Null,
            5 => ConstValue::String(self.string()?),
            6 => ConstValue::Class(self.descriptor::<RefType>()?),
            other => {
                return Err(ContainerError::Malformed(format!(
                    "bad constant tag {}",
                    other
                )))
            }
        })
    }

    fn instruction(&mut self) -> Result<DexInstruction, ContainerError> {
        use DexInstruction::*;

        let opcode = self.u8()?;
        Ok(match opcode {
            0 => Nop,
            1 => Move {
                value_type: self.tag(&VALUE_TYPES, "value type")?,
                dest: self.register()?,
                src: self.register()?,
            },
            2 => MoveResult {
                value_type: self.tag(&VALUE_TYPES, "value type")?,
                dest: self.register()?,
            },
            3 => MoveException {
                dest: self.register()?,
            },
            4 => ReturnVoid,
            5 => Return {
                value_type: self.tag(&VALUE_TYPES, "value type")?,
                src: self.register()?,
            },
            6 => Const {
                dest: self.register()?,
                value: self.constant()?,
            },
            7 => MonitorEnter(self.register()?),
            8 => MonitorExit(self.register()?),
            9 => CheckCast {
                object: self.register()?,
                ref_type: self.descriptor::<RefType>()?,
            },
            10 => InstanceOf {
                dest: self.register()?,
                object: self.register()?,
                ref_type: self.descriptor::<RefType>()?,
            },
            11 => ArrayLength {
                dest: self.register()?,
                array: self.register()?,
            },
            12 => NewInstance {
                dest: self.register()?,
                class: self.binary_name()?,
            },
            13 => NewArray {
                dest: self.register()?,
                size: self.register()?,
                array_type: self.descriptor::<RefType>()?,
            },
            14 => FilledNewArray {
                array_type: self.string()?,
                registers: self.registers()?,
            },
            15 => FilledNewArrayRange {
                array_type: self.string()?,
                start: self.register()?,
                count: self.u16()?,
            },
            16 => FillArrayData {
                array: self.register()?,
                payload_offset: self.u32()?,
            },
            17 => Throw(self.register()?),
            18 => Goto(self.address()?),
            19 => {
                let value = self.register()?;
                let first_key = self.i32()?;
                let count = self.u32()?;
                let targets = (0..count)
                    .map(|_| self.address())
                    .collect::<Result<Vec<_>, _>>()?;
                PackedSwitch {
                    value,
                    first_key,
                    targets,
                }
            }
            20 => {
                let value = self.register()?;
                let count = self.u32()?;
                let targets = (0..count)
                    .map(|_| Ok((self.i32()?, self.address()?)))
                    .collect::<Result<Vec<_>, ContainerError>>()?;
                SparseSwitch { value, targets }
            }
            21 => Compare {
                kind: self.tag(&COMPARE_KINDS, "comparison")?,
                dest: self.register()?,
                left: self.register()?,
                right: self.register()?,
            },
            22 => If {
                test: self.tag(&IF_TESTS, "test")?,
                value_type: self.tag(&VALUE_TYPES, "value type")?,
                left: self.register()?,
                right: self.register()?,
                target: self.address()?,
            },
            23 => IfZero {
                test: self.tag(&IF_TESTS, "test")?,
                value_type: self.tag(&VALUE_TYPES, "value type")?,
                src: self.register()?,
                target: self.address()?,
            },
            24 => ArrayGet {
                member: self.tag(&MEMBER_TYPES, "member type")?,
                dest: self.register()?,
                array: self.register()?,
                index: self.register()?,
            },
            25 => ArrayPut {
                member: self.tag(&MEMBER_TYPES, "member type")?,
                src: self.register()?,
                array: self.register()?,
                index: self.register()?,
            },
            26 => InstanceGet {
                field: self.field_ref()?,
                dest: self.register()?,
                object: self.register()?,
            },
            27 => InstancePut {
                field: self.field_ref()?,
                src: self.register()?,
                object: self.register()?,
            },
            28 => StaticGet {
                field: self.field_ref()?,
                dest: self.register()?,
            },
            29 => StaticPut {
                field: self.field_ref()?,
                src: self.register()?,
            },
            30 => Invoke {
                kind: self.tag(&INVOKE_KINDS, "invoke kind")?,
                method: self.method_ref()?,
                args: self.registers()?,
            },
            31 => Unary {
                op: self.tag(&UNARY_OPS, "unary operation")?,
                dest: self.register()?,
                src: self.register()?,
            },
            32 => Binary {
                op: self.tag(&BINARY_OPS, "binary operation")?,
                operand_type: self.tag(&NUMERIC_TYPES, "numeric type")?,
                dest: self.register()?,
                left: self.register()?,
                right: self.register()?,
            },
            33 => BinaryLiteral {
                op: self.tag(&BINARY_OPS, "binary operation")?,
                dest: self.register()?,
                src: self.register()?,
                literal: self.i32()?,
            },
            34 => InvokeCustom {
                call_site: self.string()?,
                args: self.registers()?,
            },
            35 => ConstMethodHandle {
                dest: self.register()?,
                handle: self.string()?,
            },
            other => {
                return Err(ContainerError::Malformed(format!(
                    "unknown opcode {}",
                    other
                )))
            }
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dex::ArrayDataPayload;

    fn sample_class() -> ProgramClass {
        let mut class = ProgramClass::new(
            BinaryName::from_str("me/Sample").unwrap(),
            ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
        );
        class.source_file = Some(String::from("Sample.java"));
        class.interfaces.push(BinaryName::from_str("java/lang/Runnable").unwrap());
        class.fields.push(ProgramField::new(
            UnqualifiedName::from_str("values").unwrap(),
            FieldType::array(FieldType::int()),
            FieldAccessFlags::PRIVATE | FieldAccessFlags::STATIC,
        ));

        let mut code = DexCode::new(
            3,
            1,
            vec![
                DexInstruction::Const {
                    dest: Register(0),
                    value: ConstValue::Int(2),
                },
                DexInstruction::NewArray {
                    dest: Register(1),
                    size: Register(0),
                    array_type: RefType::array(FieldType::int()),
                },
                DexInstruction::FillArrayData {
                    array: Register(1),
                    payload_offset: 10,
                },
                DexInstruction::SparseSwitch {
                    value: Register(2),
                    targets: vec![(-4, 5), (7, 5)],
                },
                DexInstruction::Invoke {
                    kind: InvokeKind::Static,
                    method: MethodRef {
                        class: BinaryName::from_str("me/Sample").unwrap(),
                        name: UnqualifiedName::from_str("log").unwrap(),
                        descriptor: MethodDescriptor::parse("(D)V").unwrap(),
                        is_interface: false,
                    },
                    args: vec![Register(0), Register(1)],
                },
                DexInstruction::ReturnVoid,
                DexInstruction::MoveException { dest: Register(0) },
                DexInstruction::Throw(Register(0)),
            ],
        );
        code.payload_encoding = PayloadEncoding::Big;
        code.payloads
            .insert(10, ArrayDataPayload::encode(4, &[1, 2], PayloadEncoding::Big));
        code.tries.push(TryItem {
            start: 4,
            end: 5,
            handlers: vec![CatchHandler {
                catch_type: None,
                target: 6,
            }],
        });

        class.methods.push(
            ProgramMethod::new(
                UnqualifiedName::from_str("run").unwrap(),
                MethodDescriptor::parse("(I)V").unwrap(),
                MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            )
            .with_code(MethodCode::Register(code)),
        );
        class.methods.push(
            ProgramMethod::new(
                UnqualifiedName::from_str("broken").unwrap(),
                MethodDescriptor::parse("()Ljava/lang/String;").unwrap(),
                MethodAccessFlags::PUBLIC,
            )
            .with_code(MethodCode::ThrowNull),
        );
        class
    }

    #[test]
    fn written_containers_read_back() {
        let application: Application = std::iter::once(sample_class()).collect();
        let bytes = MethodTableWriter::new(ApiLevel(21))
            .write(&application)
            .unwrap();
        assert_eq!(&bytes[0..4], b"DXTB");
        assert_eq!(&bytes[4..6], &[1, 0]);
        assert_eq!(&bytes[6..10], &[21, 0, 0, 0]);

        let table = MethodTableReader::read(&bytes).unwrap();
        assert_eq!(table.min_api_level, ApiLevel(21));
        assert_eq!(table.application, application);
    }

    #[test]
    fn damaged_containers_are_rejected() {
        let application: Application = std::iter::once(sample_class()).collect();
        let bytes = MethodTableWriter::default().write(&application).unwrap();

        assert!(matches!(
            MethodTableReader::read(b"CAFE\x01\x00"),
            Err(ContainerError::BadMagic(_))
        ));
        assert!(matches!(
            MethodTableReader::read(&bytes[..bytes.len() - 3]),
            Err(ContainerError::Malformed(_))
        ));

        let mut trailing = bytes.clone();
        trailing.push(0);
        assert!(matches!(
            MethodTableReader::read(&trailing),
            Err(ContainerError::Malformed(_))
        ));

        let mut future = bytes;
        future[4] = 9;
        assert!(matches!(
            MethodTableReader::read(&future),
            Err(ContainerError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn stack_code_is_not_storable() {
        let mut class = sample_class();
        let body = class.methods[1].throw_null_code();
        class.methods[1].code = Some(MethodCode::Stack(body));
        assert!(matches!(
            MethodTableWriter::encode_class(&class),
            Err(ExportFault::Encoding(_))
        ));
    }
}
