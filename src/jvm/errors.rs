use super::class_file::{Constant, ConstantPoolOverflow};
use super::code::SynLabel;
use super::verifier::{Frame, VerificationType};
use crate::util::Offset;
use std::fmt;

#[derive(Debug)]
pub enum Error {
    ConstantPoolOverflow {
        constant: Constant,
        offset: u16,
    },
    IoError(std::io::Error),
    MethodCodeMaxStackOverflow(Offset),
    MethodCodeMaxLocalsOverflow(Offset),
    MethodCodeOverflow(Offset),

    /// Relative jump does not fit in the signed 16-bit offset of a regular branch
    JumpOffsetOverflow {
        from: Offset,
        to: SynLabel,
    },

    MethodCodeNotFinished {
        pending_block: Option<SynLabel>,
        unplaced_labels: Vec<SynLabel>,
    },

    /// Two blocks claim to have the same label (indicates a bug)
    DuplicateLabel(SynLabel),

    /// A block is started before any frame for it is known
    ///
    /// This is fixable by making sure some jump to the label (or a fallthrough into it) is
    /// processed before the block itself.
    PlacingLabelBeforeReference(SynLabel),

    /// Error trying to verify
    VerifierError {
        instruction: String,
        kind: VerifierErrorKind,
    },
    VerifierBranchingError {
        instruction: String,
        kind: VerifierErrorKind,
    },

    /// A label needs to have incompatible frames
    IncompatibleFrames(SynLabel, Frame, Frame),

    /// Method body can't go in a class file (it is still in register form)
    NotStackCode(String),
}

#[derive(Debug)]
pub enum VerifierErrorKind {
    EmptyStack,
    InvalidWidth(usize),
    NotArrayType,
    InvalidIndex,
    InvalidType,
    IncompatibleTypes(VerificationType, VerificationType),
    BadDescriptor(String),
}

impl From<ConstantPoolOverflow> for Error {
    fn from(overflow: ConstantPoolOverflow) -> Error {
        Error::ConstantPoolOverflow {
            constant: overflow.constant,
            offset: overflow.offset,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ConstantPoolOverflow { offset, .. } => {
                write!(f, "constant pool overflow at index {}", offset)
            }
            Error::IoError(err) => write!(f, "I/O error: {}", err),
            Error::MethodCodeMaxStackOverflow(Offset(n)) => {
                write!(f, "operand stack too deep ({} slots)", n)
            }
            Error::MethodCodeMaxLocalsOverflow(Offset(n)) => {
                write!(f, "too many locals ({} slots)", n)
            }
            Error::MethodCodeOverflow(Offset(n)) => write!(f, "method code too long ({} bytes)", n),
            Error::JumpOffsetOverflow { from, to } => {
                write!(f, "jump from {} to {:?} is out of range", from.0, to)
            }
            Error::MethodCodeNotFinished {
                pending_block,
                unplaced_labels,
            } => write!(
                f,
                "method code not finished (open block {:?}, unplaced labels {:?})",
                pending_block, unplaced_labels
            ),
            Error::DuplicateLabel(label) => write!(f, "duplicate label {:?}", label),
            Error::PlacingLabelBeforeReference(label) => {
                write!(f, "label {:?} placed before any reference to it", label)
            }
            Error::VerifierError { instruction, kind }
            | Error::VerifierBranchingError { instruction, kind } => {
                write!(f, "verifying `{}` failed: {:?}", instruction, kind)
            }
            Error::IncompatibleFrames(label, _, _) => {
                write!(f, "incompatible frames for label {:?}", label)
            }
            Error::NotStackCode(method) => write!(f, "{} does not have stack code", method),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(err) => Some(err),
            _ => None,
        }
    }
}
