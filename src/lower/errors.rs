use crate::convert::BackendFault;
use crate::dex::{Address, DataIntegrityError, Register};
use crate::jvm;
use std::fmt;

/// Reasons one method body could not be retargeted
#[derive(Debug)]
pub enum LoweringError {
    /// Array type descriptor whose elements can't be handled
    UnsupportedLowering { descriptor: String },

    /// Embedded data is inconsistent with itself
    DataIntegrity(DataIntegrityError),

    /// Instruction with no stack-form equivalent
    UnsupportedInstruction {
        address: Address,
        instruction: String,
    },

    /// `fill-array-data` refers to an offset with no payload
    MissingPayload { offset: u32 },

    /// Register outside of the method's register frame
    InvalidRegister {
        register: Register,
        registers_size: u16,
    },

    /// Incoming argument registers don't line up with the method descriptor
    ParameterCount { ins_size: u16, expected: usize },

    /// Branch or try range pointing outside of the method (or off its end)
    InvalidAddress(Address),

    /// Generated stack code is invalid (eg. a register was read with the wrong type)
    Bytecode(jvm::Error),

    /// Backend could not produce code for the method
    Backend(BackendFault),

    /// Backend hit an internal dead end, described by where it happened
    UnsupportedConversion { message: String, fault: BackendFault },
}

impl fmt::Display for LoweringError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoweringError::UnsupportedLowering { descriptor } => {
                write!(f, "unsupported array type '{}'", descriptor)
            }
            LoweringError::DataIntegrity(err) => write!(f, "data integrity: {}", err),
            LoweringError::UnsupportedInstruction {
                address,
                instruction,
            } => write!(f, "unsupported instruction at {}: {}", address, instruction),
            LoweringError::MissingPayload { offset } => {
                write!(f, "no payload at offset {}", offset)
            }
            LoweringError::InvalidRegister {
                register,
                registers_size,
            } => write!(
                f,
                "register {} is out of range ({} registers)",
                register, registers_size
            ),
            LoweringError::ParameterCount { ins_size, expected } => write!(
                f,
                "{} argument registers, but the descriptor needs {}",
                ins_size, expected
            ),
            LoweringError::InvalidAddress(address) => {
                write!(f, "address {} is out of range", address)
            }
            LoweringError::Bytecode(err) => write!(f, "{}", err),
            LoweringError::Backend(fault) => write!(f, "{}", fault),
            LoweringError::UnsupportedConversion { message, .. } => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for LoweringError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoweringError::DataIntegrity(err) => Some(err),
            LoweringError::Bytecode(err) => Some(err),
            LoweringError::Backend(fault) | LoweringError::UnsupportedConversion { fault, .. } => {
                Some(fault)
            }
            _ => None,
        }
    }
}

impl From<jvm::Error> for LoweringError {
    fn from(err: jvm::Error) -> LoweringError {
        LoweringError::Bytecode(err)
    }
}

impl From<DataIntegrityError> for LoweringError {
    fn from(err: DataIntegrityError) -> LoweringError {
        LoweringError::DataIntegrity(err)
    }
}

impl From<BackendFault> for LoweringError {
    fn from(fault: BackendFault) -> LoweringError {
        LoweringError::Backend(fault)
    }
}
