//! AST of stack-form bytecode. The representation is slightly different from the usual
//! presentation to make it more convenient to construct bytecode. For instance:
//!
//!   - The "wide" instruction doesn't show up at all, but instead gets merged into the
//!     instructions it is allowed to modify
//!
//!   - Some instructions (like the branches) get abstracted into one instruction with a field.
//!     This helps with repetitive pattern matches and also simplifies tasks like inverting a
//!     branch condition.
//!
//!   - Some instructions (like `jsr`) are just omitted since they are never produced
//!
//!   - Constant and member operands are symbolic; constant pool indices are only assigned when the
//!     code gets encoded into a class file

use crate::jvm::class_file::{ConstantsPool, Serialize};
use crate::jvm::{BaseType, BinaryName, ConstantData, Error, FieldRef, MethodRef, RefType};
use byteorder::WriteBytesExt;
use std::convert::TryFrom;
use std::io;
use std::ops::Not;

/// Non-branching stack-form instruction
#[derive(Clone, PartialEq, Debug)]
pub enum Instruction {
    Nop,
    AConstNull,
    IConstM1,
    IConst0,
    IConst1,
    IConst2,
    IConst3,
    IConst4,
    IConst5,
    LConst0,
    LConst1,
    FConst0,
    FConst1,
    FConst2,
    DConst0,
    DConst1,
    BiPush(i8),
    SiPush(i16),
    Ldc(ConstantData), // covers both `ldc` and `ldc_w`
    Ldc2(ConstantData),
    ILoad(u16), // covers `iload`, `iload{0,3}`, and `wide iload`
    LLoad(u16),
    FLoad(u16),
    DLoad(u16),
    ALoad(u16),
    IALoad,
    LALoad,
    FALoad,
    DALoad,
    AALoad,
    BALoad,
    CALoad,
    SALoad,
    IStore(u16), // covers `istore`, `istore{0,3}`, and `wide istore`
    LStore(u16),
    FStore(u16),
    DStore(u16),
    AStore(u16),
    IAStore,
    LAStore,
    FAStore,
    DAStore,
    AAStore,
    BAStore, // covers both `byte[]` and `boolean[]`
    CAStore,
    SAStore,
    Pop,
    Pop2,
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Dup2X1,
    Dup2X2,
    Swap,
    IAdd,
    LAdd,
    FAdd,
    DAdd,
    ISub,
    LSub,
    FSub,
    DSub,
    IMul,
    LMul,
    FMul,
    DMul,
    IDiv,
    LDiv,
    FDiv,
    DDiv,
    IRem,
    LRem,
    FRem,
    DRem,
    INeg,
    LNeg,
    FNeg,
    DNeg,
    ISh(ShiftType), // covers `ishr`, `ishl`, and `iushr`
    LSh(ShiftType), // covers `lshr`, `lshl`, and `lushr`
    IAnd,
    LAnd,
    IOr,
    LOr,
    IXor,
    LXor,
    IInc(u16, i16), // covers `iinc` and `wide iinc`
    I2L,
    I2F,
    I2D,
    L2I,
    L2F,
    L2D,
    F2I,
    F2L,
    F2D,
    D2I,
    D2L,
    D2F,
    I2B,
    I2C,
    I2S,
    LCmp,
    FCmp(CompareMode), // covers `fcmpl` and `fcmpg`
    DCmp(CompareMode), // covers `dcmpl` and `dcmpg`
    GetStatic(FieldRef),
    PutStatic(FieldRef),
    GetField(FieldRef),
    PutField(FieldRef),
    Invoke(InvokeType, MethodRef),
    New(BinaryName),
    NewArray(BaseType),
    ANewArray(RefType),
    ArrayLength,
    CheckCast(RefType),
    InstanceOf(RefType),
    MonitorEnter,
    MonitorExit,
}

impl Instruction {
    /// Encode the instruction, adding any constants it refers to into the pool
    pub fn encode<W: WriteBytesExt>(
        &self,
        constants: &mut ConstantsPool,
        writer: &mut W,
    ) -> Result<(), Error> {
        /* The load/store instructions follow the same pattern:
         *
         *   - short form (0-3) have special bytes
         *   - normal form (0-255) use `iload` plus a byte operand
         *   - wide form (255-65535) use `wide iload` plus two byte operands
         */
        fn load_or_store<W: WriteBytesExt>(
            idx: u16,
            short_form_start: u8,
            normal_form: u8,
            writer: &mut W,
        ) -> io::Result<()> {
            match u8::try_from(idx) {
                Ok(n @ 0..=3) => (short_form_start + n).serialize(writer),
                Ok(n) => {
                    normal_form.serialize(writer)?;
                    n.serialize(writer)
                }
                Err(_) => {
                    0xC4u8.serialize(writer)?;
                    normal_form.serialize(writer)?;
                    idx.serialize(writer)
                }
            }
        }

        fn opcode<W: WriteBytesExt>(op: u8, writer: &mut W) -> Result<(), Error> {
            op.serialize(writer).map_err(Error::IoError)
        }

        use Instruction::*;
        match self {
            Nop => opcode(0x00, writer)?,
            AConstNull => opcode(0x01, writer)?,
            IConstM1 => opcode(0x02, writer)?,
            IConst0 => opcode(0x03, writer)?,
            IConst1 => opcode(0x04, writer)?,
            IConst2 => opcode(0x05, writer)?,
            IConst3 => opcode(0x06, writer)?,
            IConst4 => opcode(0x07, writer)?,
            IConst5 => opcode(0x08, writer)?,
            LConst0 => opcode(0x09, writer)?,
            LConst1 => opcode(0x0a, writer)?,
            FConst0 => opcode(0x0b, writer)?,
            FConst1 => opcode(0x0c, writer)?,
            FConst2 => opcode(0x0d, writer)?,
            DConst0 => opcode(0x0e, writer)?,
            DConst1 => opcode(0x0f, writer)?,
            BiPush(b) => {
                opcode(0x10, writer)?;
                b.serialize(writer)?;
            }
            SiPush(s) => {
                opcode(0x11, writer)?;
                s.serialize(writer)?;
            }
            Ldc(constant) => {
                let idx = constants.get_constant(constant)?.0;
                match u8::try_from(idx) {
                    Ok(b) => {
                        opcode(0x12, writer)?;
                        b.serialize(writer)?;
                    }
                    Err(_) => {
                        opcode(0x13, writer)?;
                        idx.serialize(writer)?;
                    }
                }
            }
            Ldc2(constant) => {
                let idx = constants.get_constant(constant)?;
                opcode(0x14, writer)?;
                idx.serialize(writer)?;
            }
            ILoad(idx) => load_or_store(*idx, 0x1A, 0x15, writer)?,
            LLoad(idx) => load_or_store(*idx, 0x1E, 0x16, writer)?,
            FLoad(idx) => load_or_store(*idx, 0x22, 0x17, writer)?,
            DLoad(idx) => load_or_store(*idx, 0x26, 0x18, writer)?,
            ALoad(idx) => load_or_store(*idx, 0x2A, 0x19, writer)?,
            IALoad => opcode(0x2e, writer)?,
            LALoad => opcode(0x2f, writer)?,
            FALoad => opcode(0x30, writer)?,
            DALoad => opcode(0x31, writer)?,
            AALoad => opcode(0x32, writer)?,
            BALoad => opcode(0x33, writer)?,
            CALoad => opcode(0x34, writer)?,
            SALoad => opcode(0x35, writer)?,
            IStore(idx) => load_or_store(*idx, 0x3B, 0x36, writer)?,
            LStore(idx) => load_or_store(*idx, 0x3F, 0x37, writer)?,
            FStore(idx) => load_or_store(*idx, 0x43, 0x38, writer)?,
            DStore(idx) => load_or_store(*idx, 0x47, 0x39, writer)?,
            AStore(idx) => load_or_store(*idx, 0x4B, 0x3A, writer)?,
            IAStore => opcode(0x4f, writer)?,
            LAStore => opcode(0x50, writer)?,
            FAStore => opcode(0x51, writer)?,
            DAStore => opcode(0x52, writer)?,
            AAStore => opcode(0x53, writer)?,
            BAStore => opcode(0x54, writer)?,
            CAStore => opcode(0x55, writer)?,
            SAStore => opcode(0x56, writer)?,
            Pop => opcode(0x57, writer)?,
            Pop2 => opcode(0x58, writer)?,
            Dup => opcode(0x59, writer)?,
            DupX1 => opcode(0x5a, writer)?,
            DupX2 => opcode(0x5b, writer)?,
            Dup2 => opcode(0x5c, writer)?,
            Dup2X1 => opcode(0x5d, writer)?,
            Dup2X2 => opcode(0x5e, writer)?,
            Swap => opcode(0x5f, writer)?,
            IAdd => opcode(0x60, writer)?,
            LAdd => opcode(0x61, writer)?,
            FAdd => opcode(0x62, writer)?,
            DAdd => opcode(0x63, writer)?,
            ISub => opcode(0x64, writer)?,
            LSub => opcode(0x65, writer)?,
            FSub => opcode(0x66, writer)?,
            DSub => opcode(0x67, writer)?,
            IMul => opcode(0x68, writer)?,
            LMul => opcode(0x69, writer)?,
            FMul => opcode(0x6a, writer)?,
            DMul => opcode(0x6b, writer)?,
            IDiv => opcode(0x6c, writer)?,
            LDiv => opcode(0x6d, writer)?,
            FDiv => opcode(0x6e, writer)?,
            DDiv => opcode(0x6f, writer)?,
            IRem => opcode(0x70, writer)?,
            LRem => opcode(0x71, writer)?,
            FRem => opcode(0x72, writer)?,
            DRem => opcode(0x73, writer)?,
            INeg => opcode(0x74, writer)?,
            LNeg => opcode(0x75, writer)?,
            FNeg => opcode(0x76, writer)?,
            DNeg => opcode(0x77, writer)?,
            ISh(ShiftType::Left) => opcode(0x78, writer)?,
            LSh(ShiftType::Left) => opcode(0x79, writer)?,
            ISh(ShiftType::ArithmeticRight) => opcode(0x7a, writer)?,
            LSh(ShiftType::ArithmeticRight) => opcode(0x7b, writer)?,
            ISh(ShiftType::LogicalRight) => opcode(0x7c, writer)?,
            LSh(ShiftType::LogicalRight) => opcode(0x7d, writer)?,
            IAnd => opcode(0x7e, writer)?,
            LAnd => opcode(0x7f, writer)?,
            IOr => opcode(0x80, writer)?,
            LOr => opcode(0x81, writer)?,
            IXor => opcode(0x82, writer)?,
            LXor => opcode(0x83, writer)?,
            IInc(idx, diff) => match (u8::try_from(*idx), i8::try_from(*diff)) {
                (Ok(idx), Ok(diff)) => {
                    opcode(0x84, writer)?;
                    idx.serialize(writer)?;
                    diff.serialize(writer)?;
                }
                _ => {
                    opcode(0xc4, writer)?;
                    opcode(0x84, writer)?;
                    idx.serialize(writer)?;
                    diff.serialize(writer)?;
                }
            },
            I2L => opcode(0x85, writer)?,
            I2F => opcode(0x86, writer)?,
            I2D => opcode(0x87, writer)?,
            L2I => opcode(0x88, writer)?,
            L2F => opcode(0x89, writer)?,
            L2D => opcode(0x8a, writer)?,
            F2I => opcode(0x8b, writer)?,
            F2L => opcode(0x8c, writer)?,
            F2D => opcode(0x8d, writer)?,
            D2I => opcode(0x8e, writer)?,
            D2L => opcode(0x8f, writer)?,
            D2F => opcode(0x90, writer)?,
            I2B => opcode(0x91, writer)?,
            I2C => opcode(0x92, writer)?,
            I2S => opcode(0x93, writer)?,
            LCmp => opcode(0x94, writer)?,
            FCmp(CompareMode::L) => opcode(0x95, writer)?,
            FCmp(CompareMode::G) => opcode(0x96, writer)?,
            DCmp(CompareMode::L) => opcode(0x97, writer)?,
            DCmp(CompareMode::G) => opcode(0x98, writer)?,
            GetStatic(field) => {
                let idx = constants.get_field_ref(field)?;
                opcode(0xb2, writer)?;
                idx.serialize(writer)?;
            }
            PutStatic(field) => {
                let idx = constants.get_field_ref(field)?;
                opcode(0xb3, writer)?;
                idx.serialize(writer)?;
            }
            GetField(field) => {
                let idx = constants.get_field_ref(field)?;
                opcode(0xb4, writer)?;
                idx.serialize(writer)?;
            }
            PutField(field) => {
                let idx = constants.get_field_ref(field)?;
                opcode(0xb5, writer)?;
                idx.serialize(writer)?;
            }
            Invoke(invoke_type, method) => {
                let idx = constants.get_method_ref(method)?;
                match invoke_type {
                    InvokeType::Virtual => opcode(0xb6, writer)?,
                    InvokeType::Special => opcode(0xb7, writer)?,
                    InvokeType::Static => opcode(0xb8, writer)?,
                    InvokeType::Interface => opcode(0xb9, writer)?,
                }
                idx.serialize(writer)?;
                if let InvokeType::Interface = invoke_type {
                    let count = method.descriptor.parameter_length(true) as u8;
                    count.serialize(writer)?;
                    0u8.serialize(writer)?;
                }
            }
            New(class) => {
                let idx = constants.get_class(&RefType::Object(class.clone()))?;
                opcode(0xbb, writer)?;
                idx.serialize(writer)?;
            }
            NewArray(base_type) => {
                opcode(0xbc, writer)?;
                let atype: u8 = match base_type {
                    BaseType::Boolean => 4,
                    BaseType::Char => 5,
                    BaseType::Float => 6,
                    BaseType::Double => 7,
                    BaseType::Byte => 8,
                    BaseType::Short => 9,
                    BaseType::Int => 10,
                    BaseType::Long => 11,
                };
                atype.serialize(writer)?;
            }
            ANewArray(ref_type) => {
                let idx = constants.get_class(ref_type)?;
                opcode(0xbd, writer)?;
                idx.serialize(writer)?;
            }
            ArrayLength => opcode(0xbe, writer)?,
            CheckCast(ref_type) => {
                let idx = constants.get_class(ref_type)?;
                opcode(0xc0, writer)?;
                idx.serialize(writer)?;
            }
            InstanceOf(ref_type) => {
                let idx = constants.get_class(ref_type)?;
                opcode(0xc1, writer)?;
                idx.serialize(writer)?;
            }
            MonitorEnter => opcode(0xc2, writer)?,
            MonitorExit => opcode(0xc3, writer)?,
        }
        Ok(())
    }

    /// Can this instruction throw an exception at runtime?
    ///
    /// This is conservative in the sense that it only answers `false` for instructions that are
    /// guaranteed never to throw.
    pub fn may_throw(&self) -> bool {
        use Instruction::*;
        matches!(
            self,
            IALoad
                | LALoad
                | FALoad
                | DALoad
                | AALoad
                | BALoad
                | CALoad
                | SALoad
                | IAStore
                | LAStore
                | FAStore
                | DAStore
                | AAStore
                | BAStore
                | CAStore
                | SAStore
                | IDiv
                | LDiv
                | IRem
                | LRem
                | GetStatic(_)
                | PutStatic(_)
                | GetField(_)
                | PutField(_)
                | Invoke(_, _)
                | New(_)
                | NewArray(_)
                | ANewArray(_)
                | ArrayLength
                | CheckCast(_)
                | MonitorEnter
                | MonitorExit
                | Ldc(ConstantData::Class(_))
        )
    }
}

/// Branching stack-form instruction
///
/// The type parameter abstracts over the representation of jump targets: while building code
/// these are labels, and shortly before encoding they get resolved into relative offsets.
/// Instructions that can't fall through (`goto`, switches, returns, `athrow`) end a block.
#[derive(Clone, PartialEq, Debug)]
pub enum BranchInstruction<Lbl> {
    If(OrdComparison, Lbl), // covers `ifeq`, `ifne`, `iflt`, `ifge`, `ifgt`, `ifle`
    IfICmp(OrdComparison, Lbl), // covers `if_icmpeq`, `if_icmpne`, `if_icmplt`, ... `if_icmple`
    IfACmp(EqComparison, Lbl), // covers `if_acmpeq`, `if_acmpne`
    IfNull(EqComparison, Lbl), // covers `ifnull`, `ifnonnull`
    Goto(Lbl),
    TableSwitch {
        /// Jump target if the argument is less than `low` or greater than
        /// `low + targets.len()`
        default: Lbl,

        /// Value associated with the first jump target
        low: i32,

        /// Jump targets
        targets: Vec<Lbl>,
    },
    LookupSwitch {
        /// Jump target if there is no corresponding key
        default: Lbl,

        /// Jump targets (sorted so that the keys are ascending)
        targets: Vec<(i32, Lbl)>,
    },
    IReturn,
    LReturn,
    FReturn,
    DReturn,
    AReturn,
    Return,
    AThrow,
}

impl<Lbl> BranchInstruction<Lbl> {
    /// Can execution continue with the next instruction?
    pub fn falls_through(&self) -> bool {
        matches!(
            self,
            BranchInstruction::If(_, _)
                | BranchInstruction::IfICmp(_, _)
                | BranchInstruction::IfACmp(_, _)
                | BranchInstruction::IfNull(_, _)
        )
    }

    /// Targets of any (non-fallthrough) jumps
    pub fn jump_targets(&self) -> Vec<&Lbl> {
        match self {
            BranchInstruction::If(_, lbl)
            | BranchInstruction::IfICmp(_, lbl)
            | BranchInstruction::IfACmp(_, lbl)
            | BranchInstruction::IfNull(_, lbl)
            | BranchInstruction::Goto(lbl) => vec![lbl],
            BranchInstruction::TableSwitch {
                default, targets, ..
            } => std::iter::once(default).chain(targets.iter()).collect(),
            BranchInstruction::LookupSwitch { default, targets } => std::iter::once(default)
                .chain(targets.iter().map(|(_, lbl)| lbl))
                .collect(),
            BranchInstruction::IReturn
            | BranchInstruction::LReturn
            | BranchInstruction::FReturn
            | BranchInstruction::DReturn
            | BranchInstruction::AReturn
            | BranchInstruction::Return
            | BranchInstruction::AThrow => vec![],
        }
    }

    pub fn map_labels<Lbl2, E>(
        &self,
        mut map_label: impl FnMut(&Lbl) -> Result<Lbl2, E>,
    ) -> Result<BranchInstruction<Lbl2>, E> {
        use BranchInstruction::*;

        Ok(match self {
            If(op, lbl) => If(*op, map_label(lbl)?),
            IfICmp(op, lbl) => IfICmp(*op, map_label(lbl)?),
            IfACmp(op, lbl) => IfACmp(*op, map_label(lbl)?),
            IfNull(op, lbl) => IfNull(*op, map_label(lbl)?),
            Goto(lbl) => Goto(map_label(lbl)?),
            TableSwitch {
                default,
                low,
                targets,
            } => TableSwitch {
                default: map_label(default)?,
                low: *low,
                targets: targets
                    .iter()
                    .map(&mut map_label)
                    .collect::<Result<_, _>>()?,
            },
            LookupSwitch { default, targets } => LookupSwitch {
                default: map_label(default)?,
                targets: targets
                    .iter()
                    .map(|(key, lbl)| Ok((*key, map_label(lbl)?)))
                    .collect::<Result<_, _>>()?,
            },
            IReturn => IReturn,
            LReturn => LReturn,
            FReturn => FReturn,
            DReturn => DReturn,
            AReturn => AReturn,
            Return => Return,
            AThrow => AThrow,
        })
    }

    /// Number of bytes the encoded instruction takes, given the offset at which it starts
    ///
    /// Switches need 0-3 bytes of padding so that their jump table is four-byte aligned relative
    /// to the start of the method.
    pub fn encoded_width(&self, offset: usize) -> usize {
        match self {
            BranchInstruction::IReturn
            | BranchInstruction::LReturn
            | BranchInstruction::FReturn
            | BranchInstruction::DReturn
            | BranchInstruction::AReturn
            | BranchInstruction::Return
            | BranchInstruction::AThrow => 1,

            BranchInstruction::Goto(_)
            | BranchInstruction::If(_, _)
            | BranchInstruction::IfICmp(_, _)
            | BranchInstruction::IfACmp(_, _)
            | BranchInstruction::IfNull(_, _) => 3,

            BranchInstruction::TableSwitch { targets, .. } => {
                1 + switch_padding(offset) + 4 * (3 + targets.len())
            }

            BranchInstruction::LookupSwitch { targets, .. } => {
                1 + switch_padding(offset) + 8 * (1 + targets.len())
            }
        }
    }
}

fn switch_padding(offset: usize) -> usize {
    (4 - (offset + 1) % 4) % 4
}

impl BranchInstruction<i32> {
    /// Encode the instruction (jump targets are relative offsets, and regular branches must fit
    /// in 16 bits)
    pub fn encode<W: WriteBytesExt>(&self, offset: usize, writer: &mut W) -> io::Result<()> {
        fn short<W: WriteBytesExt>(op: u8, target: i32, writer: &mut W) -> io::Result<()> {
            let target = i16::try_from(target)
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "jump out of range"))?;
            op.serialize(writer)?;
            target.serialize(writer)
        }

        match self {
            BranchInstruction::If(comp, lbl) => {
                let op: u8 = match comp {
                    OrdComparison::EQ => 0x99,
                    OrdComparison::NE => 0x9a,
                    OrdComparison::LT => 0x9b,
                    OrdComparison::GE => 0x9c,
                    OrdComparison::GT => 0x9d,
                    OrdComparison::LE => 0x9e,
                };
                short(op, *lbl, writer)?;
            }
            BranchInstruction::IfICmp(comp, lbl) => {
                let op: u8 = match comp {
                    OrdComparison::EQ => 0x9f,
                    OrdComparison::NE => 0xa0,
                    OrdComparison::LT => 0xa1,
                    OrdComparison::GE => 0xa2,
                    OrdComparison::GT => 0xa3,
                    OrdComparison::LE => 0xa4,
                };
                short(op, *lbl, writer)?;
            }
            BranchInstruction::IfACmp(comp, lbl) => {
                let op: u8 = match comp {
                    EqComparison::EQ => 0xa5,
                    EqComparison::NE => 0xa6,
                };
                short(op, *lbl, writer)?;
            }
            BranchInstruction::Goto(lbl) => short(0xa7, *lbl, writer)?,
            BranchInstruction::TableSwitch {
                default,
                low,
                targets,
            } => {
                0xaau8.serialize(writer)?;
                for _ in 0..switch_padding(offset) {
                    0x00u8.serialize(writer)?;
                }
                default.serialize(writer)?;
                low.serialize(writer)?;
                (low + targets.len() as i32 - 1).serialize(writer)?;
                for target in targets {
                    target.serialize(writer)?;
                }
            }
            BranchInstruction::LookupSwitch { default, targets } => {
                0xabu8.serialize(writer)?;
                for _ in 0..switch_padding(offset) {
                    0x00u8.serialize(writer)?;
                }
                default.serialize(writer)?;
                (targets.len() as i32).serialize(writer)?;
                for (key, target) in targets {
                    key.serialize(writer)?;
                    target.serialize(writer)?;
                }
            }
            BranchInstruction::IReturn => 0xacu8.serialize(writer)?,
            BranchInstruction::LReturn => 0xadu8.serialize(writer)?,
            BranchInstruction::FReturn => 0xaeu8.serialize(writer)?,
            BranchInstruction::DReturn => 0xafu8.serialize(writer)?,
            BranchInstruction::AReturn => 0xb0u8.serialize(writer)?,
            BranchInstruction::Return => 0xb1u8.serialize(writer)?,
            BranchInstruction::AThrow => 0xbfu8.serialize(writer)?,
            BranchInstruction::IfNull(comp, lbl) => {
                let op: u8 = match comp {
                    EqComparison::EQ => 0xc6,
                    EqComparison::NE => 0xc7,
                };
                short(op, *lbl, writer)?;
            }
        }
        Ok(())
    }
}

/// Possible bit shifts
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum ShiftType {
    Left,
    LogicalRight,
    ArithmeticRight,
}

/// Comparison modes for floating point
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum CompareMode {
    /// -1 on NaN
    L,

    /// 1 on NaN
    G,
}

/// Binary comparison operators available for `int` branches
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum OrdComparison {
    EQ,
    GE,
    GT,
    LE,
    LT,
    NE,
}

impl Not for OrdComparison {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            OrdComparison::EQ => OrdComparison::NE,
            OrdComparison::GE => OrdComparison::LT,
            OrdComparison::GT => OrdComparison::LE,
            OrdComparison::LE => OrdComparison::GT,
            OrdComparison::LT => OrdComparison::GE,
            OrdComparison::NE => OrdComparison::EQ,
        }
    }
}

/// Equality/inequality comparison operators
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum EqComparison {
    EQ,
    NE,
}

impl Not for EqComparison {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            EqComparison::EQ => EqComparison::NE,
            EqComparison::NE => EqComparison::EQ,
        }
    }
}

/// Type of method to invoke
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum InvokeType {
    Virtual,
    Special,
    Static,
    Interface,
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::{MethodDescriptor, Name, ParseDescriptor, UnqualifiedName};

    fn encode(insn: &Instruction) -> Vec<u8> {
        let mut constants = ConstantsPool::new();
        let mut bytes = vec![];
        insn.encode(&mut constants, &mut bytes).unwrap();
        bytes
    }

    #[test]
    fn local_variable_forms() {
        assert_eq!(encode(&Instruction::ILoad(2)), vec![0x1c]);
        assert_eq!(encode(&Instruction::ALoad(7)), vec![0x19, 7]);
        assert_eq!(encode(&Instruction::DStore(300)), vec![0xc4, 0x39, 0x01, 0x2c]);
        assert_eq!(encode(&Instruction::IInc(1, -1)), vec![0x84, 1, 0xff]);
        assert_eq!(
            encode(&Instruction::IInc(1, 1000)),
            vec![0xc4, 0x84, 0x00, 0x01, 0x03, 0xe8]
        );
    }

    #[test]
    fn interface_invoke_counts_arguments() {
        let method = MethodRef {
            class: BinaryName::from_str("java/util/List").unwrap(),
            name: UnqualifiedName::from_str("set").unwrap(),
            descriptor: MethodDescriptor::parse("(ILjava/lang/Object;)Ljava/lang/Object;")
                .unwrap(),
            is_interface: true,
        };
        let bytes = encode(&Instruction::Invoke(InvokeType::Interface, method));
        assert_eq!(bytes.len(), 5);
        assert_eq!(bytes[0], 0xb9);
        assert_eq!(&bytes[3..], &[3, 0]);
    }

    #[test]
    fn switch_padding_aligns_table() {
        let switch: BranchInstruction<i32> = BranchInstruction::TableSwitch {
            default: 20,
            low: 0,
            targets: vec![10, 15],
        };
        for offset in 0..8 {
            let mut bytes = vec![];
            switch.encode(offset, &mut bytes).unwrap();
            assert_eq!(bytes.len(), switch.encoded_width(offset));
            assert_eq!((offset + 1 + switch_padding(offset)) % 4, 0);
        }
    }

    #[test]
    fn branch_targets() {
        let insn = BranchInstruction::LookupSwitch {
            default: 'd',
            targets: vec![(1, 'a'), (5, 'b')],
        };
        assert_eq!(insn.jump_targets(), vec![&'d', &'a', &'b']);
        assert!(!insn.falls_through());
        assert!(BranchInstruction::If(OrdComparison::EQ, 'x').falls_through());
        assert!(BranchInstruction::<char>::AThrow.jump_targets().is_empty());
    }
}
