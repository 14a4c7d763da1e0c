use crate::convert::{OutputFormat, PoolError};
use crate::jvm;
use crate::lower::LoweringError;
use crate::model::MethodIdentity;
use std::fmt;
use std::io;

/// Build the message-less [`BackendFault::Unreachable`] signal for the current source line
///
/// ```
/// use dex_translator::convert::BackendFault;
/// use dex_translator::unreachable_fault;
///
/// let fault = unreachable_fault!("SimpleBackend", "shuffle");
/// assert!(matches!(fault, BackendFault::Unreachable(location) if location.line > 0));
/// ```
#[macro_export]
macro_rules! unreachable_fault {
    ($component:expr, $operation:expr) => {
        $crate::convert::BackendFault::Unreachable($crate::convert::FaultLocation {
            component: $component,
            operation: $operation,
            line: line!(),
        })
    };
}

/// Where in a backend an internal dead end was hit
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct FaultLocation {
    pub component: &'static str,
    pub operation: &'static str,

    /// Source line (`0` if unknown)
    pub line: u32,
}

impl fmt::Display for FaultLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.component, self.operation)?;
        if self.line > 0 {
            write!(f, " @{}", self.line)?;
        }
        Ok(())
    }
}

/// Failure inside the backend
#[derive(Debug)]
pub enum BackendFault {
    /// Internal dead end with no message of its own
    Unreachable(FaultLocation),

    /// Input the backend refuses to process
    Invalid(String),

    /// Worker pool could not run the work
    Pool(PoolError),
}

impl BackendFault {
    /// Turn the message-less unreachable signal into an error with a diagnosable message
    ///
    /// Every other fault is passed along unchanged.
    pub fn into_lowering_error(self) -> LoweringError {
        if let BackendFault::Unreachable(location) = &self {
            let message = format!("Unsupported conversion in: {}", location);
            return LoweringError::UnsupportedConversion {
                message,
                fault: self,
            };
        }
        LoweringError::Backend(self)
    }
}

impl fmt::Display for BackendFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendFault::Unreachable(_) => f.write_str("unreachable"),
            BackendFault::Invalid(message) => f.write_str(message),
            BackendFault::Pool(err) => write!(f, "worker pool: {}", err),
        }
    }
}

impl std::error::Error for BackendFault {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BackendFault::Pool(err) => Some(err),
            _ => None,
        }
    }
}

impl From<PoolError> for BackendFault {
    fn from(err: PoolError) -> BackendFault {
        BackendFault::Pool(err)
    }
}

/// Failure writing out the converted application
#[derive(Debug)]
pub enum ExportFault {
    Io(io::Error),
    Bytecode(jvm::Error),
    Pool(PoolError),

    /// Something can't be represented in the output format
    Encoding(String),
}

impl fmt::Display for ExportFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFault::Io(err) => write!(f, "I/O error: {}", err),
            ExportFault::Bytecode(err) => write!(f, "{}", err),
            ExportFault::Pool(err) => write!(f, "worker pool: {}", err),
            ExportFault::Encoding(message) => f.write_str(message),
        }
    }
}

impl std::error::Error for ExportFault {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExportFault::Io(err) => Some(err),
            ExportFault::Bytecode(err) => Some(err),
            ExportFault::Pool(err) => Some(err),
            ExportFault::Encoding(_) => None,
        }
    }
}

impl From<io::Error> for ExportFault {
    fn from(err: io::Error) -> ExportFault {
        ExportFault::Io(err)
    }
}

impl From<jvm::Error> for ExportFault {
    fn from(err: jvm::Error) -> ExportFault {
        ExportFault::Bytecode(err)
    }
}

impl From<PoolError> for ExportFault {
    fn from(err: PoolError) -> ExportFault {
        ExportFault::Pool(err)
    }
}

/// Reasons a whole conversion failed
#[derive(Debug)]
pub enum ConversionError {
    /// One method could not be converted (and invalid bodies are not being replaced)
    MethodRetarget {
        method: MethodIdentity,
        target: OutputFormat,
        cause: LoweringError,
    },

    /// Backend failed on the application as a whole
    BackendProcessing {
        target: OutputFormat,
        cause: BackendFault,
    },

    /// Writing out the result failed
    Export {
        target: OutputFormat,
        cause: ExportFault,
    },
}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionError::MethodRetarget {
                method,
                target,
                cause,
            } => write!(
                f,
                "failed to convert {} to {} form: {}",
                method, target, cause
            ),
            ConversionError::BackendProcessing { target, cause } => {
                write!(f, "backend failed producing {} form: {}", target, cause)
            }
            ConversionError::Export { target, cause } => {
                write!(f, "failed to write {} form output: {}", target, cause)
            }
        }
    }
}

impl std::error::Error for ConversionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConversionError::MethodRetarget { cause, .. } => Some(cause),
            ConversionError::BackendProcessing { cause, .. } => Some(cause),
            ConversionError::Export { cause, .. } => Some(cause),
        }
    }
}
