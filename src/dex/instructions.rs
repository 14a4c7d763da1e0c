use crate::jvm::{BaseType, BinaryName, FieldRef, FieldType, MethodRef, RefType};
use crate::util::Width;
use std::fmt;

/// Virtual register
///
/// Wide values (`long` and `double`) live in a pair of consecutive registers and are referred to
/// by the lower of the two.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Register(pub u16);

impl Register {
    /// Register `by` registers further along
    pub fn offset(self, by: u16) -> Register {
        Register(self.0 + by)
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Position of an instruction (index into the method's instruction list)
pub type Address = u32;

/// Category of value held in a register (or register pair)
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum ValueType {
    Int,
    Long,
    Float,
    Double,
    Object,
}

impl ValueType {
    /// Category of the value described by a single descriptor character (`[` and `L` both start
    /// reference types)
    pub fn from_descriptor_char(c: char) -> Option<ValueType> {
        match c {
            'Z' | 'B' | 'C' | 'S' | 'I' => Some(ValueType::Int),
            'J' => Some(ValueType::Long),
            'F' => Some(ValueType::Float),
            'D' => Some(ValueType::Double),
            'L' | '[' => Some(ValueType::Object),
            _ => None,
        }
    }

    pub fn from_field_type(field_type: &FieldType) -> ValueType {
        match field_type {
            FieldType::Base(
                BaseType::Boolean | BaseType::Byte | BaseType::Char | BaseType::Short | BaseType::Int,
            ) => ValueType::Int,
            FieldType::Base(BaseType::Long) => ValueType::Long,
            FieldType::Base(BaseType::Float) => ValueType::Float,
            FieldType::Base(BaseType::Double) => ValueType::Double,
            FieldType::Ref(_) => ValueType::Object,
        }
    }

    /// Representative field type (references all map to `java/lang/Object`)
    pub fn as_field_type(&self) -> FieldType {
        match self {
            ValueType::Int => FieldType::int(),
            ValueType::Long => FieldType::long(),
            ValueType::Float => FieldType::float(),
            ValueType::Double => FieldType::double(),
            ValueType::Object => FieldType::object(BinaryName::OBJECT),
        }
    }
}

impl Width for ValueType {
    fn width(&self) -> usize {
        match self {
            ValueType::Long | ValueType::Double => 2,
            _ => 1,
        }
    }
}

/// Type of the elements of an array, as far as loads and stores care
///
/// `byte[]` and `boolean[]` are accessed with the same instructions in both dialects, so they
/// are not distinguished.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum MemberType {
    Object,
    BooleanOrByte,
    Char,
    Short,
    Int,
    Float,
    Long,
    Double,
}

impl MemberType {
    pub fn from_field_type(field_type: &FieldType) -> MemberType {
        match field_type {
            FieldType::Base(BaseType::Boolean | BaseType::Byte) => MemberType::BooleanOrByte,
            FieldType::Base(BaseType::Char) => MemberType::Char,
            FieldType::Base(BaseType::Short) => MemberType::Short,
            FieldType::Base(BaseType::Int) => MemberType::Int,
            FieldType::Base(BaseType::Float) => MemberType::Float,
            FieldType::Base(BaseType::Long) => MemberType::Long,
            FieldType::Base(BaseType::Double) => MemberType::Double,
            FieldType::Ref(_) => MemberType::Object,
        }
    }

    pub fn from_descriptor_char(c: char) -> Option<MemberType> {
        match c {
            'Z' | 'B' => Some(MemberType::BooleanOrByte),
            'C' => Some(MemberType::Char),
            'S' => Some(MemberType::Short),
            'I' => Some(MemberType::Int),
            'F' => Some(MemberType::Float),
            'J' => Some(MemberType::Long),
            'D' => Some(MemberType::Double),
            'L' | '[' => Some(MemberType::Object),
            _ => None,
        }
    }

    /// Category of values loaded from or stored into the array
    pub fn value_type(&self) -> ValueType {
        match self {
            MemberType::Object => ValueType::Object,
            MemberType::BooleanOrByte | MemberType::Char | MemberType::Short | MemberType::Int => {
                ValueType::Int
            }
            MemberType::Float => ValueType::Float,
            MemberType::Long => ValueType::Long,
            MemberType::Double => ValueType::Double,
        }
    }

    /// Size of one element in an array data payload (references can't be stored in payloads)
    pub fn payload_width(&self) -> Option<usize> {
        match self {
            MemberType::Object => None,
            MemberType::BooleanOrByte => Some(1),
            MemberType::Char | MemberType::Short => Some(2),
            MemberType::Int | MemberType::Float => Some(4),
            MemberType::Long | MemberType::Double => Some(8),
        }
    }
}

impl Width for MemberType {
    fn width(&self) -> usize {
        self.value_type().width()
    }
}

/// Constant loaded by one of the `const*` instructions
#[derive(Clone, PartialEq, Debug)]
pub enum ConstValue {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Null,
    String(String),
    Class(RefType),
}

impl ConstValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            ConstValue::Int(_) => ValueType::Int,
            ConstValue::Long(_) => ValueType::Long,
            ConstValue::Float(_) => ValueType::Float,
            ConstValue::Double(_) => ValueType::Double,
            ConstValue::Null | ConstValue::String(_) | ConstValue::Class(_) => ValueType::Object,
        }
    }
}

/// Condition of `if-*` and `if-*z`
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum IfTest {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

/// Flavour of `cmp*` instruction
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum CompareKind {
    /// `cmpl-float` (-1 on NaN)
    LessFloat,
    /// `cmpg-float` (1 on NaN)
    GreaterFloat,
    LessDouble,
    GreaterDouble,
    Long,
}

impl CompareKind {
    pub fn operand_type(&self) -> ValueType {
        match self {
            CompareKind::LessFloat | CompareKind::GreaterFloat => ValueType::Float,
            CompareKind::LessDouble | CompareKind::GreaterDouble => ValueType::Double,
            CompareKind::Long => ValueType::Long,
        }
    }
}

/// One-operand arithmetic and conversions
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum UnaryOp {
    NegInt,
    NotInt,
    NegLong,
    NotLong,
    NegFloat,
    NegDouble,
    IntToLong,
    IntToFloat,
    IntToDouble,
    LongToInt,
    LongToFloat,
    LongToDouble,
    FloatToInt,
    FloatToLong,
    FloatToDouble,
    DoubleToInt,
    DoubleToLong,
    DoubleToFloat,
    IntToByte,
    IntToChar,
    IntToShort,
}

impl UnaryOp {
    pub fn operand_type(&self) -> ValueType {
        use UnaryOp::*;
        match self {
            NegInt | NotInt | IntToLong | IntToFloat | IntToDouble | IntToByte | IntToChar
            | IntToShort => ValueType::Int,
            NegLong | NotLong | LongToInt | LongToFloat | LongToDouble => ValueType::Long,
            NegFloat | FloatToInt | FloatToLong | FloatToDouble => ValueType::Float,
            NegDouble | DoubleToInt | DoubleToLong | DoubleToFloat => ValueType::Double,
        }
    }

    pub fn result_type(&self) -> ValueType {
        use UnaryOp::*;
        match self {
            NegInt | NotInt | LongToInt | FloatToInt | DoubleToInt | IntToByte | IntToChar
            | IntToShort => ValueType::Int,
            NegLong | NotLong | IntToLong | FloatToLong | DoubleToLong => ValueType::Long,
            NegFloat | IntToFloat | LongToFloat | DoubleToFloat => ValueType::Float,
            NegDouble | IntToDouble | LongToDouble | FloatToDouble => ValueType::Double,
        }
    }
}

/// Two-operand arithmetic
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Ushr,

    /// Reverse subtraction (`rsub-int`), only valid with a literal operand
    RSub,
}

impl BinaryOp {
    pub fn is_shift(&self) -> bool {
        matches!(self, BinaryOp::Shl | BinaryOp::Shr | BinaryOp::Ushr)
    }
}

/// Operand type of two-operand arithmetic
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum NumericType {
    Int,
    Long,
    Float,
    Double,
}

impl NumericType {
    pub fn value_type(&self) -> ValueType {
        match self {
            NumericType::Int => ValueType::Int,
            NumericType::Long => ValueType::Long,
            NumericType::Float => ValueType::Float,
            NumericType::Double => ValueType::Double,
        }
    }
}

/// Dispatch mode of an `invoke-*` instruction
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum InvokeKind {
    Virtual,
    Super,
    Direct,
    Static,
    Interface,
}

/// Register-form instruction
///
/// Operands that span registers (invoke arguments, `filled-new-array` elements) list every
/// register, so a wide argument contributes two consecutive registers.
#[derive(Clone, PartialEq, Debug)]
pub enum DexInstruction {
    Nop,
    Move {
        value_type: ValueType,
        dest: Register,
        src: Register,
    },
    MoveResult {
        value_type: ValueType,
        dest: Register,
    },
    MoveException {
        dest: Register,
    },
    ReturnVoid,
    Return {
        value_type: ValueType,
        src: Register,
    },
    Const {
        dest: Register,
        value: ConstValue,
    },
    MonitorEnter(Register),
    MonitorExit(Register),
    CheckCast {
        object: Register,
        ref_type: RefType,
    },
    InstanceOf {
        dest: Register,
        object: Register,
        ref_type: RefType,
    },
    ArrayLength {
        dest: Register,
        array: Register,
    },
    NewInstance {
        dest: Register,
        class: BinaryName,
    },
    NewArray {
        dest: Register,
        size: Register,
        array_type: RefType,
    },

    /// Allocate an array of the given descriptor type, filled with the values in `registers`.
    /// The array is the result, picked up by a following `move-result-object`.
    FilledNewArray {
        array_type: String,
        registers: Vec<Register>,
    },

    /// Same as `FilledNewArray`, but reading `count` consecutive registers from `start`
    FilledNewArrayRange {
        array_type: String,
        start: Register,
        count: u16,
    },

    /// Fill an existing array with the values from the payload at `payload_offset`
    FillArrayData {
        array: Register,
        payload_offset: u32,
    },
    Throw(Register),
    Goto(Address),
    PackedSwitch {
        value: Register,
        first_key: i32,
        targets: Vec<Address>,
    },
    SparseSwitch {
        value: Register,
        targets: Vec<(i32, Address)>,
    },
    Compare {
        kind: CompareKind,
        dest: Register,
        left: Register,
        right: Register,
    },
    If {
        test: IfTest,
        value_type: ValueType,
        left: Register,
        right: Register,
        target: Address,
    },
    IfZero {
        test: IfTest,
        value_type: ValueType,
        src: Register,
        target: Address,
    },
    ArrayGet {
        member: MemberType,
        dest: Register,
        array: Register,
        index: Register,
    },
    ArrayPut {
        member: MemberType,
        src: Register,
        array: Register,
        index: Register,
    },
    InstanceGet {
        field: FieldRef,
        dest: Register,
        object: Register,
    },
    InstancePut {
        field: FieldRef,
        src: Register,
        object: Register,
    },
    StaticGet {
        field: FieldRef,
        dest: Register,
    },
    StaticPut {
        field: FieldRef,
        src: Register,
    },
    Invoke {
        kind: InvokeKind,
        method: MethodRef,
        args: Vec<Register>,
    },
    Unary {
        op: UnaryOp,
        dest: Register,
        src: Register,
    },
    Binary {
        op: BinaryOp,
        operand_type: NumericType,
        dest: Register,
        left: Register,
        right: Register,
    },
    BinaryLiteral {
        op: BinaryOp,
        dest: Register,
        src: Register,
        literal: i32,
    },
    InvokeCustom {
        call_site: String,
        args: Vec<Register>,
    },
    ConstMethodHandle {
        dest: Register,
        handle: String,
    },
}

impl DexInstruction {
    /// Can execution continue with the next instruction?
    pub fn falls_through(&self) -> bool {
        !matches!(
            self,
            DexInstruction::ReturnVoid
                | DexInstruction::Return { .. }
                | DexInstruction::Throw(_)
                | DexInstruction::Goto(_)
        )
    }

    /// Addresses this instruction can jump to (not counting falling through)
    pub fn branch_targets(&self) -> Vec<Address> {
        match self {
            DexInstruction::Goto(target)
            | DexInstruction::If { target, .. }
            | DexInstruction::IfZero { target, .. } => vec![*target],
            DexInstruction::PackedSwitch { targets, .. } => targets.clone(),
            DexInstruction::SparseSwitch { targets, .. } => {
                targets.iter().map(|(_, target)| *target).collect()
            }
            _ => vec![],
        }
    }

    /// Does this instruction end a basic block?
    pub fn ends_block(&self) -> bool {
        !self.falls_through() || !self.branch_targets().is_empty()
    }

    /// Does this instruction produce a value for a following `move-result`?
    pub fn has_result(&self) -> bool {
        match self {
            DexInstruction::Invoke { method, .. } => method.descriptor.return_type.is_some(),
            DexInstruction::FilledNewArray { .. } | DexInstruction::FilledNewArrayRange { .. } => {
                true
            }
            _ => false,
        }
    }

    /// Every register read or written, along with how many registers the value spans
    pub fn registers(&self) -> Vec<(Register, usize)> {
        use DexInstruction::*;
        let single = |reg: &Register| (*reg, 1);
        match self {
            Nop | ReturnVoid | Goto(_) => vec![],
            Move {
                value_type,
                dest,
                src,
            } => vec![(*dest, value_type.width()), (*src, value_type.width())],
            MoveResult { value_type, dest } => vec![(*dest, value_type.width())],
            MoveException { dest } => vec![single(dest)],
            Return { value_type, src } => vec![(*src, value_type.width())],
            Const { dest, value } => vec![(*dest, value.value_type().width())],
            MonitorEnter(reg) | MonitorExit(reg) | Throw(reg) => vec![single(reg)],
            CheckCast { object, .. } => vec![single(object)],
            InstanceOf { dest, object, .. } => vec![single(dest), single(object)],
            ArrayLength { dest, array } => vec![single(dest), single(array)],
            NewInstance { dest, .. } => vec![single(dest)],
            NewArray { dest, size, .. } => vec![single(dest), single(size)],
            FilledNewArray { registers, .. } => registers.iter().map(single).collect(),
            FilledNewArrayRange { start, count, .. } => {
                (0..*count).map(|i| (start.offset(i), 1)).collect()
            }
            FillArrayData { array, .. } => vec![single(array)],
            PackedSwitch { value, .. } | SparseSwitch { value, .. } => vec![single(value)],
            Compare {
                kind,
                dest,
                left,
                right,
            } => {
                let width = kind.operand_type().width();
                vec![single(dest), (*left, width), (*right, width)]
            }
            If {
                value_type,
                left,
                right,
                ..
            } => vec![(*left, value_type.width()), (*right, value_type.width())],
            IfZero {
                value_type, src, ..
            } => vec![(*src, value_type.width())],
            ArrayGet {
                member,
                dest,
                array,
                index,
            } => vec![(*dest, member.width()), single(array), single(index)],
            ArrayPut {
                member,
                src,
                array,
                index,
            } => vec![(*src, member.width()), single(array), single(index)],
            InstanceGet {
                field,
                dest,
                object,
            } => vec![(*dest, field.descriptor.width()), single(object)],
            InstancePut { field, src, object } => {
                vec![(*src, field.descriptor.width()), single(object)]
            }
            StaticGet { field, dest } => vec![(*dest, field.descriptor.width())],
            StaticPut { field, src } => vec![(*src, field.descriptor.width())],
            Invoke { args, .. } | InvokeCustom { args, .. } => args.iter().map(single).collect(),
            Unary { op, dest, src } => vec![
                (*dest, op.result_type().width()),
                (*src, op.operand_type().width()),
            ],
            Binary {
                op,
                operand_type,
                dest,
                left,
                right,
            } => {
                let width = operand_type.value_type().width();
                let right_width = if op.is_shift() { 1 } else { width };
                vec![(*dest, width), (*left, width), (*right, right_width)]
            }
            BinaryLiteral { dest, src, .. } => vec![single(dest), single(src)],
            ConstMethodHandle { dest, .. } => vec![single(dest)],
        }
    }
}
