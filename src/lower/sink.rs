use crate::dex::{ArrayDataPayload, Register, ValueType};
use crate::jvm::code::Instruction;
use crate::jvm::verifier::VerificationType;
use crate::lower::LoweringError;

/// Where expanded instructions go
///
/// This is the only access the array fill expansions get to the method being built: they can
/// append instructions and resolve payloads, nothing else.
pub trait LoweringSink {
    /// Append an instruction to the code being built
    fn append_instruction(&mut self, insn: Instruction) -> Result<(), LoweringError>;

    /// Find and decode the array data payload at some offset
    fn resolve_payload(&self, offset: u32) -> Result<ArrayDataPayload, LoweringError>;

    fn append_instructions(&mut self, insns: Vec<Instruction>) -> Result<(), LoweringError> {
        for insn in insns {
            self.append_instruction(insn)?;
        }
        Ok(())
    }
}

/// Access to the values of registers, from the stack code's point of view
pub trait RegisterSource {
    /// Push the value of a register (or register pair) onto the stack
    fn load_register(&mut self, register: Register, value_type: ValueType)
        -> Result<(), LoweringError>;

    /// Statically known type of the value currently in a register
    fn register_type(&self, register: Register) -> Option<VerificationType>;
}
