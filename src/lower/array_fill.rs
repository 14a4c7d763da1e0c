//! Expansions of the bulk array initialization instructions
//!
//! The register dialect can allocate and fill an array in one instruction (`filled-new-array`,
//! `filled-new-array/range`) and fill an existing array from a data table embedded in the method
//! (`fill-array-data`). The JVM has neither, so these become one store per element.

use crate::dex::{DataIntegrityError, MemberType, Register, ValueType};
use crate::jvm::code::{double_constant, float_constant, int_constant, long_constant, Instruction};
use crate::jvm::verifier::VerificationType;
use crate::jvm::{FieldType, ParseDescriptor, RefType, RenderDescriptor};
use crate::lower::{array_store_instruction, relocate, LoweringError, LoweringSink, RegisterSource};
use crate::util::Width;

/// Element type information derived from an array type descriptor
#[derive(Clone, PartialEq, Debug)]
pub struct ArrayElement {
    pub field_type: FieldType,
    pub member: MemberType,
    pub value_type: ValueType,
}

impl ArrayElement {
    /// Parse an array type descriptor (eg. `[I` or `[[Ljava/lang/String;`)
    pub fn from_array_descriptor(descriptor: &str) -> Result<ArrayElement, LoweringError> {
        let unsupported = || LoweringError::UnsupportedLowering {
            descriptor: descriptor.to_owned(),
        };
        let element_descriptor = descriptor.strip_prefix('[').ok_or_else(unsupported)?;
        let field_type = FieldType::parse(element_descriptor).map_err(|_| unsupported())?;
        Ok(ArrayElement {
            member: MemberType::from_field_type(&field_type),
            value_type: ValueType::from_field_type(&field_type),
            field_type,
        })
    }

    /// Instruction allocating an array of these elements (length is on the stack)
    pub fn new_array_instruction(&self) -> Instruction {
        match &self.field_type {
            FieldType::Base(base_type) => Instruction::NewArray(*base_type),
            FieldType::Ref(ref_type) => Instruction::ANewArray(ref_type.clone()),
        }
    }
}

/// Expand `filled-new-array` into an allocation followed by one store per element
///
/// `registers` lists every register read, so wide elements contribute two registers each. The
/// new array is left on top of the stack.
pub fn lower_filled_new_array<S>(
    sink: &mut S,
    array_type: &str,
    registers: &[Register],
) -> Result<(), LoweringError>
where
    S: LoweringSink + RegisterSource + ?Sized,
{
    let element = ArrayElement::from_array_descriptor(array_type)?;
    let element_width = element.value_type.width();
    if registers.len() % element_width != 0 {
        return Err(LoweringError::DataIntegrity(
            DataIntegrityError::RegisterCount {
                count: registers.len(),
                element_width,
            },
        ));
    }
    let element_registers: Vec<Register> =
        registers.iter().step_by(element_width).copied().collect();

    // Last element deepest, so the first store below the array picks up the first element
    for register in element_registers.iter().rev() {
        sink.load_register(*register, element.value_type)?;
    }

    // [elements..., array]
    sink.append_instruction(int_constant(element_registers.len() as i32))?;
    sink.append_instruction(element.new_array_instruction())?;

    let store = array_store_instruction(element.member);
    for index in 0..element_registers.len() {
        sink.append_instruction(Instruction::Dup)?; // [..., element, array, array]
        sink.append_instructions(relocate(2, element_width))?; // [..., array, array, element]
        sink.append_instruction(int_constant(index as i32))?; // [..., array, array, element, index]
        sink.append_instructions(relocate(1, element_width))?; // [..., array, array, index, element]
        sink.append_instruction(store.clone())?; // [..., array]
    }
    Ok(())
}

/// Expand `filled-new-array/range`, which reads `count` consecutive registers from `start`
pub fn lower_filled_new_array_range<S>(
    sink: &mut S,
    array_type: &str,
    start: Register,
    count: u16,
) -> Result<(), LoweringError>
where
    S: LoweringSink + RegisterSource + ?Sized,
{
    let registers: Vec<Register> = (0..count).map(|i| start.offset(i)).collect();
    lower_filled_new_array(sink, array_type, &registers)
}

/// Expand `fill-array-data` into one store per payload element
///
/// The array must already exist; its element type comes from the register's static type.
/// Nothing is left on the stack.
pub fn lower_fill_array_data<S>(
    sink: &mut S,
    array: Register,
    payload_offset: u32,
) -> Result<(), LoweringError>
where
    S: LoweringSink + RegisterSource + ?Sized,
{
    let payload = sink.resolve_payload(payload_offset)?;
    let member = filled_member_type(sink.register_type(array))?;
    let member_width = member
        .payload_width()
        .ok_or(LoweringError::UnsupportedLowering {
            descriptor: String::from("[Ljava/lang/Object;"),
        })?;
    if member_width != payload.element_width() as usize {
        return Err(LoweringError::DataIntegrity(
            DataIntegrityError::ElementWidthMismatch {
                expected: member_width,
                found: payload.element_width() as usize,
            },
        ));
    }

    sink.load_register(array, ValueType::Object)?;
    let store = array_store_instruction(member);
    for (index, value) in payload.elements().enumerate() {
        sink.append_instruction(Instruction::Dup)?;
        sink.append_instruction(int_constant(index as i32))?;
        sink.append_instructions(element_constant(member, value))?;
        sink.append_instruction(store.clone())?;
    }
    sink.append_instruction(Instruction::Pop)?;
    Ok(())
}

/// Element type of the array being filled (`byte` and `boolean` are not distinguished)
fn filled_member_type(array_type: Option<VerificationType>) -> Result<MemberType, LoweringError> {
    let descriptor = match array_type {
        Some(VerificationType::Object(ref_type @ RefType::PrimitiveArray(_))) => {
            match ref_type.array_member_type() {
                Some(member @ FieldType::Base(_)) => return Ok(MemberType::from_field_type(&member)),
                _ => ref_type.render(),
            }
        }
        Some(VerificationType::Object(ref_type)) => ref_type.render(),
        Some(other) => format!("{:?}", other),
        None => String::from("unknown"),
    };
    Err(LoweringError::UnsupportedLowering { descriptor })
}

/// Instructions pushing the raw payload bits of an element
fn element_constant(member: MemberType, raw: i64) -> Vec<Instruction> {
    match member {
        MemberType::Long => long_constant(raw),
        MemberType::Double => double_constant(f64::from_bits(raw as u64)),
        MemberType::Float => float_constant(f32::from_bits(raw as u32)),
        _ => vec![int_constant(raw as i32)],
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dex::{ArrayDataPayload, PayloadEncoding};
    use crate::jvm::{BaseType, ConstantData};
    use std::collections::HashMap;

    /// Records instructions, loading registers with a marker instruction
    #[derive(Default)]
    struct RecordingSink {
        insns: Vec<Instruction>,
        payloads: HashMap<u32, Vec<u8>>,
        types: HashMap<Register, VerificationType>,
    }

    impl LoweringSink for RecordingSink {
        fn append_instruction(&mut self, insn: Instruction) -> Result<(), LoweringError> {
            self.insns.push(insn);
            Ok(())
        }

        fn resolve_payload(&self, offset: u32) -> Result<ArrayDataPayload, LoweringError> {
            let bytes = self
                .payloads
                .get(&offset)
                .ok_or(LoweringError::MissingPayload { offset })?;
            Ok(ArrayDataPayload::parse(bytes, PayloadEncoding::Big)?)
        }
    }

    impl RegisterSource for RecordingSink {
        fn load_register(
            &mut self,
            register: Register,
            value_type: ValueType,
        ) -> Result<(), LoweringError> {
            let insn = match value_type {
                ValueType::Int => Instruction::ILoad(register.0),
                ValueType::Long => Instruction::LLoad(register.0),
                ValueType::Float => Instruction::FLoad(register.0),
                ValueType::Double => Instruction::DLoad(register.0),
                ValueType::Object => Instruction::ALoad(register.0),
            };
            self.insns.push(insn);
            Ok(())
        }

        fn register_type(&self, register: Register) -> Option<VerificationType> {
            self.types.get(&register).cloned()
        }
    }

    #[test]
    fn filled_int_array() {
        let mut sink = RecordingSink::default();
        lower_filled_new_array(&mut sink, "[I", &[Register(3), Register(1)]).unwrap();

        use Instruction::*;
        assert_eq!(
            sink.insns,
            vec![
                ILoad(1),
                ILoad(3),
                IConst2,
                NewArray(BaseType::Int),
                Dup,
                Dup2X1,
                Pop2,
                IConst0,
                Swap,
                IAStore,
                Dup,
                Dup2X1,
                Pop2,
                IConst1,
                Swap,
                IAStore,
            ]
        );
    }

    #[test]
    fn filled_wide_range() {
        let mut sink = RecordingSink::default();
        lower_filled_new_array_range(&mut sink, "[J", Register(4), 4).unwrap();

        use Instruction::*;
        assert_eq!(
            sink.insns,
            vec![
                LLoad(6),
                LLoad(4),
                IConst2,
                NewArray(BaseType::Long),
                Dup,
                Dup2X2,
                Pop2,
                IConst0,
                DupX2,
                Pop,
                LAStore,
                Dup,
                Dup2X2,
                Pop2,
                IConst1,
                DupX2,
                Pop,
                LAStore,
            ]
        );
    }

    #[test]
    fn empty_range_still_allocates() {
        let mut sink = RecordingSink::default();
        lower_filled_new_array_range(&mut sink, "[Ljava/lang/String;", Register(0), 0).unwrap();
        assert_eq!(
            sink.insns,
            vec![Instruction::IConst0, Instruction::ANewArray(RefType::STRING)]
        );
    }

    #[test]
    fn bad_descriptors_and_counts() {
        let mut sink = RecordingSink::default();
        assert!(matches!(
            lower_filled_new_array(&mut sink, "[Q", &[Register(0)]),
            Err(LoweringError::UnsupportedLowering { descriptor }) if descriptor == "[Q"
        ));
        assert!(matches!(
            lower_filled_new_array(&mut sink, "I", &[Register(0)]),
            Err(LoweringError::UnsupportedLowering { .. })
        ));
        assert!(matches!(
            lower_filled_new_array(&mut sink, "[D", &[Register(0), Register(1), Register(2)]),
            Err(LoweringError::DataIntegrity(DataIntegrityError::RegisterCount {
                count: 3,
                element_width: 2
            }))
        ));
        assert!(sink.insns.is_empty());
    }

    #[test]
    fn fill_from_payload() {
        let mut sink = RecordingSink::default();
        sink.payloads.insert(
            12,
            ArrayDataPayload::encode(4, &[1, 2], PayloadEncoding::Big),
        );
        sink.types.insert(
            Register(0),
            VerificationType::Object(RefType::array(FieldType::int())),
        );
        lower_fill_array_data(&mut sink, Register(0), 12).unwrap();

        use Instruction::*;
        assert_eq!(
            sink.insns,
            vec![
                ALoad(0),
                Dup,
                IConst0,
                IConst1,
                IAStore,
                Dup,
                IConst1,
                IConst2,
                IAStore,
                Pop,
            ]
        );
    }

    #[test]
    fn fill_floats_and_booleans() {
        let mut sink = RecordingSink::default();
        let bits = 1.5f32.to_bits() as i64;
        sink.payloads.insert(
            0,
            ArrayDataPayload::encode(4, &[bits], PayloadEncoding::Big),
        );
        sink.payloads.insert(
            8,
            ArrayDataPayload::encode(1, &[1], PayloadEncoding::Big),
        );
        sink.types.insert(
            Register(0),
            VerificationType::Object(RefType::array(FieldType::float())),
        );
        sink.types.insert(
            Register(1),
            VerificationType::Object(RefType::array(FieldType::boolean())),
        );
        lower_fill_array_data(&mut sink, Register(0), 0).unwrap();
        lower_fill_array_data(&mut sink, Register(1), 8).unwrap();

        use Instruction::*;
        assert_eq!(
            sink.insns,
            vec![
                ALoad(0),
                Dup,
                IConst0,
                Ldc(ConstantData::Float(1.5)),
                FAStore,
                Pop,
                ALoad(1),
                Dup,
                IConst0,
                IConst1,
                BAStore,
                Pop,
            ]
        );
    }

    #[test]
    fn fill_errors() {
        let mut sink = RecordingSink::default();
        assert!(matches!(
            lower_fill_array_data(&mut sink, Register(0), 4),
            Err(LoweringError::MissingPayload { offset: 4 })
        ));

        sink.payloads.insert(
            4,
            ArrayDataPayload::encode(2, &[1], PayloadEncoding::Big),
        );
        assert!(matches!(
            lower_fill_array_data(&mut sink, Register(0), 4),
            Err(LoweringError::UnsupportedLowering { .. })
        ));

        sink.types.insert(
            Register(0),
            VerificationType::Object(RefType::array(FieldType::int())),
        );
        assert!(matches!(
            lower_fill_array_data(&mut sink, Register(0), 4),
            Err(LoweringError::DataIntegrity(
                DataIntegrityError::ElementWidthMismatch {
                    expected: 4,
                    found: 2
                }
            ))
        ));
        assert!(sink.insns.is_empty());
    }
}
