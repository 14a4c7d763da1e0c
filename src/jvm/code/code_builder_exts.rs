use crate::jvm::code::{BranchInstruction, CodeBuilder, Instruction};
use crate::jvm::{BaseType, ConstantData, Error, FieldType, RefType};
use crate::util::Width;

/// Shortest instruction pushing an `int` constant
pub fn int_constant(integer: i32) -> Instruction {
    match integer {
        -1 => Instruction::IConstM1,
        0 => Instruction::IConst0,
        1 => Instruction::IConst1,
        2 => Instruction::IConst2,
        3 => Instruction::IConst3,
        4 => Instruction::IConst4,
        5 => Instruction::IConst5,
        -128..=127 => Instruction::BiPush(integer as i8),
        -32768..=32767 => Instruction::SiPush(integer as i16),
        _ => Instruction::Ldc(ConstantData::Integer(integer)),
    }
}

/// Shortest instructions pushing a `long` constant
///
/// In a lot of cases, this will fallback to some `int` instructions followed by a conversion.
/// Consider the alternatives for pushing the `long` 2 onto the stack:
///
///   * `ldc2_w 2` will be 3 bytes in the method body and two slots in the constant pool
///   * `iconst2 i2l` will be 2 bytes in the method body and no slots in the constant pool
///
pub fn long_constant(long: i64) -> Vec<Instruction> {
    match long {
        0 => vec![Instruction::LConst0],
        1 => vec![Instruction::LConst1],
        -32768..=32767 => vec![int_constant(long as i32), Instruction::I2L],
        _ => vec![Instruction::Ldc2(ConstantData::Long(long))],
    }
}

/// Shortest instructions pushing a `float` constant
///
/// Constants are compared by bits, so `-0.0` and NaNs with payloads survive.
pub fn float_constant(float: f32) -> Vec<Instruction> {
    match float.to_bits() {
        0x0000_0000 => vec![Instruction::FConst0],
        0x3f80_0000 => vec![Instruction::FConst1],
        0x4000_0000 => vec![Instruction::FConst2],
        _ if float.fract() == 0.0 && (-1.0..=5.0).contains(&float) && float != 0.0 => {
            vec![int_constant(float as i32), Instruction::I2F]
        }
        _ => vec![Instruction::Ldc(ConstantData::Float(float))],
    }
}

/// Shortest instructions pushing a `double` constant
pub fn double_constant(double: f64) -> Vec<Instruction> {
    match double.to_bits() {
        0x0000_0000_0000_0000 => vec![Instruction::DConst0],
        0x3ff0_0000_0000_0000 => vec![Instruction::DConst1],
        _ if double.fract() == 0.0 && (-1.0..=5.0).contains(&double) && double != 0.0 => {
            vec![int_constant(double as i32), Instruction::I2D]
        }
        _ => vec![Instruction::Ldc2(ConstantData::Double(double))],
    }
}

pub trait CodeBuilderExts {
    /// Push a constant string to the stack
    fn const_string(&mut self, string: impl Into<String>) -> Result<(), Error>;

    /// Push a value of type `java/lang/Class` onto the stack
    fn const_class(&mut self, ref_type: RefType) -> Result<(), Error>;

    /// Get a local at a particular offset
    fn get_local(&mut self, offset: u16, field_type: &FieldType) -> Result<(), Error>;

    /// Set a local at a particular offset
    fn set_local(&mut self, offset: u16, field_type: &FieldType) -> Result<(), Error>;

    /// Return from the function
    fn return_(&mut self, field_type_opt: &Option<FieldType>) -> Result<(), Error>;

    /// Push an integer constant onto the stack
    fn const_int(&mut self, integer: i32) -> Result<(), Error>;

    /// Push a long constant onto the stack
    fn const_long(&mut self, long: i64) -> Result<(), Error>;

    /// Push a float constant onto the stack
    fn const_float(&mut self, float: f32) -> Result<(), Error>;

    /// Push a double constant onto the stack
    fn const_double(&mut self, double: f64) -> Result<(), Error>;

    /// Pop the top of the stack, accounting for the different possible type widths
    fn pop(&mut self) -> Result<(), Error>;

    /// Duplicate the top of the stack, accounting for the different possible type widths
    fn dup(&mut self) -> Result<(), Error>;
}

impl CodeBuilderExts for CodeBuilder {
    fn const_string(&mut self, string: impl Into<String>) -> Result<(), Error> {
        let constant = ConstantData::String(string.into());
        self.push_instruction(Instruction::Ldc(constant))
    }

    fn const_class(&mut self, ref_type: RefType) -> Result<(), Error> {
        self.push_instruction(Instruction::Ldc(ConstantData::Class(ref_type)))
    }

    fn get_local(&mut self, offset: u16, field_type: &FieldType) -> Result<(), Error> {
        let insn = match *field_type {
            FieldType::Base(
                BaseType::Int
                | BaseType::Char
                | BaseType::Short
                | BaseType::Byte
                | BaseType::Boolean,
            ) => Instruction::ILoad(offset),
            FieldType::Base(BaseType::Float) => Instruction::FLoad(offset),
            FieldType::Base(BaseType::Long) => Instruction::LLoad(offset),
            FieldType::Base(BaseType::Double) => Instruction::DLoad(offset),
            FieldType::Ref(_) => Instruction::ALoad(offset),
        };
        self.push_instruction(insn)
    }

    fn set_local(&mut self, offset: u16, field_type: &FieldType) -> Result<(), Error> {
        let insn = match *field_type {
            FieldType::Base(
                BaseType::Int
                | BaseType::Char
                | BaseType::Short
                | BaseType::Byte
                | BaseType::Boolean,
            ) => Instruction::IStore(offset),
            FieldType::Base(BaseType::Float) => Instruction::FStore(offset),
            FieldType::Base(BaseType::Long) => Instruction::LStore(offset),
            FieldType::Base(BaseType::Double) => Instruction::DStore(offset),
            FieldType::Ref(_) => Instruction::AStore(offset),
        };
        self.push_instruction(insn)
    }

    fn return_(&mut self, field_type_opt: &Option<FieldType>) -> Result<(), Error> {
        let insn = match field_type_opt {
            None => BranchInstruction::Return,
            Some(FieldType::Base(
                BaseType::Int
                | BaseType::Char
                | BaseType::Short
                | BaseType::Byte
                | BaseType::Boolean,
            )) => BranchInstruction::IReturn,
            Some(FieldType::Base(BaseType::Float)) => BranchInstruction::FReturn,
            Some(FieldType::Base(BaseType::Long)) => BranchInstruction::LReturn,
            Some(FieldType::Base(BaseType::Double)) => BranchInstruction::DReturn,
            Some(FieldType::Ref(_)) => BranchInstruction::AReturn,
        };
        self.push_branch_instruction(insn)
    }

    fn const_int(&mut self, integer: i32) -> Result<(), Error> {
        self.push_instruction(int_constant(integer))
    }

    fn const_long(&mut self, long: i64) -> Result<(), Error> {
        for insn in long_constant(long) {
            self.push_instruction(insn)?;
        }
        Ok(())
    }

    fn const_float(&mut self, float: f32) -> Result<(), Error> {
        for insn in float_constant(float) {
            self.push_instruction(insn)?;
        }
        Ok(())
    }

    fn const_double(&mut self, double: f64) -> Result<(), Error> {
        for insn in double_constant(double) {
            self.push_instruction(insn)?;
        }
        Ok(())
    }

    fn pop(&mut self) -> Result<(), Error> {
        if let Some(frame) = self.current_frame() {
            let wide_typ = frame.stack.last().map_or(false, |t| t.width() == 2);
            let insn = if wide_typ {
                Instruction::Pop2
            } else {
                Instruction::Pop
            };
            self.push_instruction(insn)?;
        }
        Ok(())
    }

    fn dup(&mut self) -> Result<(), Error> {
        if let Some(frame) = self.current_frame() {
            let wide_typ = frame.stack.last().map_or(false, |t| t.width() == 2);
            let insn = if wide_typ {
                Instruction::Dup2
            } else {
                Instruction::Dup
            };
            self.push_instruction(insn)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::{CodeItem, SynLabel};
    use crate::jvm::{BinaryName, MethodDescriptor, Name, ParseDescriptor, UnqualifiedName};

    fn constants_of(push: impl FnOnce(&mut CodeBuilder) -> Result<(), Error>) -> Vec<Instruction> {
        let descriptor = MethodDescriptor::parse("()V").unwrap();
        let mut code = CodeBuilder::new(
            BinaryName::from_str("me/Test").unwrap(),
            &UnqualifiedName::from_str("test").unwrap(),
            &descriptor,
            true,
            SynLabel::START,
        );
        code.start_block(SynLabel::START).unwrap();
        push(&mut code).unwrap();
        code.pop().unwrap();
        code.return_(&None).unwrap();
        code.result(&[SynLabel::START])
            .unwrap()
            .items
            .into_iter()
            .filter_map(|item| match item {
                CodeItem::Instruction(insn) => Some(insn),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn shortest_constant_forms() {
        assert_eq!(
            constants_of(|c| c.const_int(100)),
            vec![Instruction::BiPush(100), Instruction::Pop]
        );
        assert_eq!(
            constants_of(|c| c.const_int(70000)),
            vec![Instruction::Ldc(ConstantData::Integer(70000)), Instruction::Pop]
        );
        assert_eq!(
            constants_of(|c| c.const_long(3)),
            vec![Instruction::IConst3, Instruction::I2L, Instruction::Pop2]
        );
        assert_eq!(
            constants_of(|c| c.const_double(-0.0)),
            vec![Instruction::Ldc2(ConstantData::Double(-0.0)), Instruction::Pop2]
        );
        assert_eq!(
            constants_of(|c| c.const_float(3.0)),
            vec![Instruction::IConst3, Instruction::I2F, Instruction::Pop]
        );
    }

    #[test]
    fn constants_compare_bits() {
        assert_eq!(float_constant(0.0), vec![Instruction::FConst0]);
        assert_eq!(
            float_constant(-0.0),
            vec![Instruction::Ldc(ConstantData::Float(-0.0))]
        );
        assert_eq!(float_constant(-1.0), vec![Instruction::IConstM1, Instruction::I2F]);
        assert_eq!(float_constant(2.5).len(), 1);
        assert_eq!(double_constant(1.0), vec![Instruction::DConst1]);
        assert_eq!(long_constant(-1), vec![Instruction::IConstM1, Instruction::I2L]);
        assert_eq!(
            long_constant(1 << 40),
            vec![Instruction::Ldc2(ConstantData::Long(1 << 40))]
        );
    }
}
