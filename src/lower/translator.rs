use crate::dex::{
    Address, BinaryOp, CompareKind, ConstValue, DexInstruction, IfTest, InvokeKind, MemberType,
    NumericType, UnaryOp, ValueType,
};
use crate::jvm::code::{
    int_constant, long_constant, BranchInstruction, CodeBuilderExts, CompareMode, EqComparison,
    Instruction, InvokeType, OrdComparison, ShiftType,
};
use crate::jvm::{FieldType, RenderDescriptor};
use crate::lower::{LoweringError, MethodLowering, RegisterSource};
use crate::util::Width;

/// Translation of (most) register instructions into stack instructions
///
/// The bulk array initialization instructions never reach the translator: they are expanded
/// separately by [`crate::lower::array_fill`].
pub trait InstructionTranslator {
    /// Append the stack instructions equivalent to `insn` (found at `address`)
    ///
    /// Registers are read and written through `lowering`. Instructions with a result for a
    /// following `move-result` leave it on top of the stack.
    fn translate(
        &self,
        lowering: &mut MethodLowering<'_>,
        address: Address,
        insn: &DexInstruction,
    ) -> Result<(), LoweringError>;
}

/// Straightforward one-instruction-at-a-time translation
///
/// Every instruction loads its operands from locals, operates on the stack, then stores its
/// result back to a local.
#[derive(Copy, Clone, Default, Debug)]
pub struct StandardTranslator;

impl InstructionTranslator for StandardTranslator {
    fn translate(
        &self,
        lowering: &mut MethodLowering<'_>,
        address: Address,
        insn: &DexInstruction,
    ) -> Result<(), LoweringError> {
        let unsupported = || LoweringError::UnsupportedInstruction {
            address,
            instruction: format!("{:?}", insn),
        };

        match insn {
            DexInstruction::Nop => (),

            DexInstruction::Move {
                value_type,
                dest,
                src,
            } => {
                lowering.load_register(*src, *value_type)?;
                lowering.store_register(*dest, *value_type)?;
            }

            DexInstruction::MoveResult { value_type, dest } => {
                lowering.store_register(*dest, *value_type)?;
            }

            DexInstruction::MoveException { dest } => {
                lowering.store_register(*dest, ValueType::Object)?;
            }

            DexInstruction::ReturnVoid => {
                lowering
                    .code()
                    .push_branch_instruction(BranchInstruction::Return)?;
            }

            DexInstruction::Return { value_type, src } => {
                lowering.load_register(*src, *value_type)?;
                let return_type = lowering.return_type().clone();
                lowering.code().return_(&return_type)?;
            }

            DexInstruction::Const { dest, value } => {
                let code = lowering.code();
                match value {
                    ConstValue::Int(int) => code.const_int(*int)?,
                    ConstValue::Long(long) => code.const_long(*long)?,
                    ConstValue::Float(float) => code.const_float(*float)?,
                    ConstValue::Double(double) => code.const_double(*double)?,
                    ConstValue::Null => code.push_instruction(Instruction::AConstNull)?,
                    ConstValue::String(string) => code.const_string(string.clone())?,
                    ConstValue::Class(ref_type) => code.const_class(ref_type.clone())?,
                }
                lowering.store_register(*dest, value.value_type())?;
            }

            DexInstruction::MonitorEnter(object) => {
                lowering.load_register(*object, ValueType::Object)?;
                lowering.code().push_instruction(Instruction::MonitorEnter)?;
            }

            DexInstruction::MonitorExit(object) => {
                lowering.load_register(*object, ValueType::Object)?;
                lowering.code().push_instruction(Instruction::MonitorExit)?;
            }

            DexInstruction::CheckCast { object, ref_type } => {
                lowering.load_register(*object, ValueType::Object)?;
                lowering
                    .code()
                    .push_instruction(Instruction::CheckCast(ref_type.clone()))?;
                lowering.store_register(*object, ValueType::Object)?;
            }

            DexInstruction::InstanceOf {
                dest,
                object,
                ref_type,
            } => {
                lowering.load_register(*object, ValueType::Object)?;
                lowering
                    .code()
                    .push_instruction(Instruction::InstanceOf(ref_type.clone()))?;
                lowering.store_register(*dest, ValueType::Int)?;
            }

            DexInstruction::ArrayLength { dest, array } => {
                lowering.load_register(*array, ValueType::Object)?;
                lowering.code().push_instruction(Instruction::ArrayLength)?;
                lowering.store_register(*dest, ValueType::Int)?;
            }

            DexInstruction::NewInstance { dest, class } => {
                lowering
                    .code()
                    .push_instruction(Instruction::New(class.clone()))?;
                lowering.store_register(*dest, ValueType::Object)?;
            }

            DexInstruction::NewArray {
                dest,
                size,
                array_type,
            } => {
                let new_array = match array_type.array_member_type() {
                    Some(FieldType::Base(base_type)) => Instruction::NewArray(base_type),
                    Some(FieldType::Ref(ref_type)) => Instruction::ANewArray(ref_type),
                    None => {
                        return Err(LoweringError::UnsupportedLowering {
                            descriptor: array_type.render(),
                        })
                    }
                };
                lowering.load_register(*size, ValueType::Int)?;
                lowering.code().push_instruction(new_array)?;
                lowering.store_register(*dest, ValueType::Object)?;
            }

            DexInstruction::Throw(exception) => {
                lowering.load_register(*exception, ValueType::Object)?;
                lowering
                    .code()
                    .push_branch_instruction(BranchInstruction::AThrow)?;
            }

            DexInstruction::Goto(target) => {
                let target = lowering.label(*target)?;
                lowering
                    .code()
                    .push_branch_instruction(BranchInstruction::Goto(target))?;
            }

            DexInstruction::PackedSwitch {
                value,
                first_key,
                targets,
            } => {
                lowering.load_register(*value, ValueType::Int)?;
                if targets.is_empty() {
                    lowering.code().pop()?;
                } else {
                    let default = lowering.label(address + 1)?;
                    let targets = targets
                        .iter()
                        .map(|target| lowering.label(*target))
                        .collect::<Result<Vec<_>, _>>()?;
                    lowering
                        .code()
                        .push_branch_instruction(BranchInstruction::TableSwitch {
                            default,
                            low: *first_key,
                            targets,
                        })?;
                }
            }

            DexInstruction::SparseSwitch { value, targets } => {
                lowering.load_register(*value, ValueType::Int)?;
                if targets.is_empty() {
                    lowering.code().pop()?;
                } else {
                    let default = lowering.label(address + 1)?;
                    let mut targets = targets
                        .iter()
                        .map(|(key, target)| Ok((*key, lowering.label(*target)?)))
                        .collect::<Result<Vec<_>, LoweringError>>()?;
                    targets.sort_by_key(|(key, _)| *key);
                    lowering
                        .code()
                        .push_branch_instruction(BranchInstruction::LookupSwitch {
                            default,
                            targets,
                        })?;
                }
            }

            DexInstruction::Compare {
                kind,
                dest,
                left,
                right,
            } => {
                let operand_type = kind.operand_type();
                lowering.load_register(*left, operand_type)?;
                lowering.load_register(*right, operand_type)?;
                let compare = match kind {
                    CompareKind::LessFloat => Instruction::FCmp(CompareMode::L),
                    CompareKind::GreaterFloat => Instruction::FCmp(CompareMode::G),
                    CompareKind::LessDouble => Instruction::DCmp(CompareMode::L),
                    CompareKind::GreaterDouble => Instruction::DCmp(CompareMode::G),
                    CompareKind::Long => Instruction::LCmp,
                };
                lowering.code().push_instruction(compare)?;
                lowering.store_register(*dest, ValueType::Int)?;
            }

            DexInstruction::If {
                test,
                value_type,
                left,
                right,
                target,
            } => {
                let target = lowering.label(*target)?;
                let branch = match value_type {
                    ValueType::Int => BranchInstruction::IfICmp(ord_comparison(*test), target),
                    ValueType::Object => BranchInstruction::IfACmp(
                        eq_comparison(*test).ok_or_else(unsupported)?,
                        target,
                    ),
                    _ => return Err(unsupported()),
                };
                lowering.load_register(*left, *value_type)?;
                lowering.load_register(*right, *value_type)?;
                lowering.code().push_branch_instruction(branch)?;
            }

            DexInstruction::IfZero {
                test,
                value_type,
                src,
                target,
            } => {
                let target = lowering.label(*target)?;
                let branch = match value_type {
                    ValueType::Int => BranchInstruction::If(ord_comparison(*test), target),
                    ValueType::Object => BranchInstruction::IfNull(
                        eq_comparison(*test).ok_or_else(unsupported)?,
                        target,
                    ),
                    _ => return Err(unsupported()),
                };
                lowering.load_register(*src, *value_type)?;
                lowering.code().push_branch_instruction(branch)?;
            }

            DexInstruction::ArrayGet {
                member,
                dest,
                array,
                index,
            } => {
                lowering.load_register(*array, ValueType::Object)?;
                lowering.load_register(*index, ValueType::Int)?;
                lowering
                    .code()
                    .push_instruction(array_load_instruction(*member))?;
                lowering.store_register(*dest, member.value_type())?;
            }

            DexInstruction::ArrayPut {
                member,
                src,
                array,
                index,
            } => {
                lowering.load_register(*array, ValueType::Object)?;
                lowering.load_register(*index, ValueType::Int)?;
                lowering.load_register(*src, member.value_type())?;
                lowering
                    .code()
                    .push_instruction(array_store_instruction(*member))?;
            }

            DexInstruction::InstanceGet {
                field,
                dest,
                object,
            } => {
                lowering.load_register(*object, ValueType::Object)?;
                lowering
                    .code()
                    .push_instruction(Instruction::GetField(field.clone()))?;
                lowering.store_register(*dest, ValueType::from_field_type(&field.descriptor))?;
            }

            DexInstruction::InstancePut { field, src, object } => {
                lowering.load_register(*object, ValueType::Object)?;
                lowering.load_register(*src, ValueType::from_field_type(&field.descriptor))?;
                lowering
                    .code()
                    .push_instruction(Instruction::PutField(field.clone()))?;
            }

            DexInstruction::StaticGet { field, dest } => {
                lowering
                    .code()
                    .push_instruction(Instruction::GetStatic(field.clone()))?;
                lowering.store_register(*dest, ValueType::from_field_type(&field.descriptor))?;
            }

            DexInstruction::StaticPut { field, src } => {
                lowering.load_register(*src, ValueType::from_field_type(&field.descriptor))?;
                lowering
                    .code()
                    .push_instruction(Instruction::PutStatic(field.clone()))?;
            }

            DexInstruction::Invoke { kind, method, args } => {
                let has_receiver = *kind != InvokeKind::Static;
                if method.descriptor.parameter_length(has_receiver) != args.len() {
                    return Err(unsupported());
                }

                let mut remaining = args.iter();
                if has_receiver {
                    if let Some(receiver) = remaining.next() {
                        lowering.load_register(*receiver, ValueType::Object)?;
                    }
                }
                for parameter in &method.descriptor.parameters {
                    let value_type = ValueType::from_field_type(parameter);
                    if let Some(register) = remaining.next() {
                        lowering.load_register(*register, value_type)?;
                    }
                    if value_type.width() == 2 {
                        let _ = remaining.next();
                    }
                }

                let invoke_type = match kind {
                    InvokeKind::Virtual => InvokeType::Virtual,
                    InvokeKind::Super | InvokeKind::Direct => InvokeType::Special,
                    InvokeKind::Static => InvokeType::Static,
                    InvokeKind::Interface => InvokeType::Interface,
                };
                lowering
                    .code()
                    .push_instruction(Instruction::Invoke(invoke_type, method.clone()))?;
            }

            DexInstruction::Unary { op, dest, src } => {
                lowering.load_register(*src, op.operand_type())?;
                let code = lowering.code();
                match op {
                    UnaryOp::NotInt => {
                        code.push_instruction(Instruction::IConstM1)?;
                        code.push_instruction(Instruction::IXor)?;
                    }
                    UnaryOp::NotLong => {
                        for insn in long_constant(-1) {
                            code.push_instruction(insn)?;
                        }
                        code.push_instruction(Instruction::LXor)?;
                    }
                    _ => code.push_instruction(unary_instruction(*op))?,
                }
                lowering.store_register(*dest, op.result_type())?;
            }

            DexInstruction::Binary {
                op,
                operand_type,
                dest,
                left,
                right,
            } => {
                let binary = binary_instruction(*op, *operand_type).ok_or_else(unsupported)?;
                let value_type = operand_type.value_type();
                let right_type = if op.is_shift() {
                    ValueType::Int
                } else {
                    value_type
                };
                lowering.load_register(*left, value_type)?;
                lowering.load_register(*right, right_type)?;
                lowering.code().push_instruction(binary)?;
                lowering.store_register(*dest, value_type)?;
            }

            DexInstruction::BinaryLiteral {
                op,
                dest,
                src,
                literal,
            } => {
                if *op == BinaryOp::RSub {
                    lowering.code().push_instruction(int_constant(*literal))?;
                    lowering.load_register(*src, ValueType::Int)?;
                    lowering.code().push_instruction(Instruction::ISub)?;
                } else {
                    let binary =
                        binary_instruction(*op, NumericType::Int).ok_or_else(unsupported)?;
                    lowering.load_register(*src, ValueType::Int)?;
                    lowering.code().push_instruction(int_constant(*literal))?;
                    lowering.code().push_instruction(binary)?;
                }
                lowering.store_register(*dest, ValueType::Int)?;
            }

            DexInstruction::FilledNewArray { .. }
            | DexInstruction::FilledNewArrayRange { .. }
            | DexInstruction::FillArrayData { .. }
            | DexInstruction::InvokeCustom { .. }
            | DexInstruction::ConstMethodHandle { .. } => return Err(unsupported()),
        }
        Ok(())
    }
}

/// Array load for elements of some type
pub fn array_load_instruction(member: MemberType) -> Instruction {
    match member {
        MemberType::Object => Instruction::AALoad,
        MemberType::BooleanOrByte => Instruction::BALoad,
        MemberType::Char => Instruction::CALoad,
        MemberType::Short => Instruction::SALoad,
        MemberType::Int => Instruction::IALoad,
        MemberType::Float => Instruction::FALoad,
        MemberType::Long => Instruction::LALoad,
        MemberType::Double => Instruction::DALoad,
    }
}

/// Array store for elements of some type
pub fn array_store_instruction(member: MemberType) -> Instruction {
    match member {
        MemberType::Object => Instruction::AAStore,
        MemberType::BooleanOrByte => Instruction::BAStore,
        MemberType::Char => Instruction::CAStore,
        MemberType::Short => Instruction::SAStore,
        MemberType::Int => Instruction::IAStore,
        MemberType::Float => Instruction::FAStore,
        MemberType::Long => Instruction::LAStore,
        MemberType::Double => Instruction::DAStore,
    }
}

fn ord_comparison(test: IfTest) -> OrdComparison {
    match test {
        IfTest::Eq => OrdComparison::EQ,
        IfTest::Ne => OrdComparison::NE,
        IfTest::Lt => OrdComparison::LT,
        IfTest::Ge => OrdComparison::GE,
        IfTest::Gt => OrdComparison::GT,
        IfTest::Le => OrdComparison::LE,
    }
}

fn eq_comparison(test: IfTest) -> Option<EqComparison> {
    match test {
        IfTest::Eq => Some(EqComparison::EQ),
        IfTest::Ne => Some(EqComparison::NE),
        _ => None,
    }
}

fn unary_instruction(op: UnaryOp) -> Instruction {
    match op {
        UnaryOp::NegInt => Instruction::INeg,
        UnaryOp::NegLong => Instruction::LNeg,
        UnaryOp::NegFloat => Instruction::FNeg,
        UnaryOp::NegDouble => Instruction::DNeg,
        UnaryOp::IntToLong => Instruction::I2L,
        UnaryOp::IntToFloat => Instruction::I2F,
        UnaryOp::IntToDouble => Instruction::I2D,
        UnaryOp::LongToInt => Instruction::L2I,
        UnaryOp::LongToFloat => Instruction::L2F,
        UnaryOp::LongToDouble => Instruction::L2D,
        UnaryOp::FloatToInt => Instruction::F2I,
        UnaryOp::FloatToLong => Instruction::F2L,
        UnaryOp::FloatToDouble => Instruction::F2D,
        UnaryOp::DoubleToInt => Instruction::D2I,
        UnaryOp::DoubleToLong => Instruction::D2L,
        UnaryOp::DoubleToFloat => Instruction::D2F,
        UnaryOp::IntToByte => Instruction::I2B,
        UnaryOp::IntToChar => Instruction::I2C,
        UnaryOp::IntToShort => Instruction::I2S,
        UnaryOp::NotInt | UnaryOp::NotLong => Instruction::Nop,
    }
}

fn binary_instruction(op: BinaryOp, operand_type: NumericType) -> Option<Instruction> {
    use NumericType::*;
    let insn = match (op, operand_type) {
        (BinaryOp::Add, Int) => Instruction::IAdd,
        (BinaryOp::Add, Long) => Instruction::LAdd,
        (BinaryOp::Add, Float) => Instruction::FAdd,
        (BinaryOp::Add, Double) => Instruction::DAdd,
        (BinaryOp::Sub, Int) => Instruction::ISub,
        (BinaryOp::Sub, Long) => Instruction::LSub,
        (BinaryOp::Sub, Float) => Instruction::FSub,
        (BinaryOp::Sub, Double) => Instruction::DSub,
        (BinaryOp::Mul, Int) => Instruction::IMul,
        (BinaryOp::Mul, Long) => Instruction::LMul,
        (BinaryOp::Mul, Float) => Instruction::FMul,
        (BinaryOp::Mul, Double) => Instruction::DMul,
        (BinaryOp::Div, Int) => Instruction::IDiv,
        (BinaryOp::Div, Long) => Instruction::LDiv,
        (BinaryOp::Div, Float) => Instruction::FDiv,
        (BinaryOp::Div, Double) => Instruction::DDiv,
        (BinaryOp::Rem, Int) => Instruction::IRem,
        (BinaryOp::Rem, Long) => Instruction::LRem,
        (BinaryOp::Rem, Float) => Instruction::FRem,
        (BinaryOp::Rem, Double) => Instruction::DRem,
        (BinaryOp::And, Int) => Instruction::IAnd,
        (BinaryOp::And, Long) => Instruction::LAnd,
        (BinaryOp::Or, Int) => Instruction::IOr,
        (BinaryOp::Or, Long) => Instruction::LOr,
        (BinaryOp::Xor, Int) => Instruction::IXor,
        (BinaryOp::Xor, Long) => Instruction::LXor,
        (BinaryOp::Shl, Int) => Instruction::ISh(ShiftType::Left),
        (BinaryOp::Shl, Long) => Instruction::LSh(ShiftType::Left),
        (BinaryOp::Shr, Int) => Instruction::ISh(ShiftType::ArithmeticRight),
        (BinaryOp::Shr, Long) => Instruction::LSh(ShiftType::ArithmeticRight),
        (BinaryOp::Ushr, Int) => Instruction::ISh(ShiftType::LogicalRight),
        (BinaryOp::Ushr, Long) => Instruction::LSh(ShiftType::LogicalRight),
        _ => return None,
    };
    Some(insn)
}
