use crate::jvm::code::SynLabel;
use crate::jvm::BinaryName;

/// Protected region of a method body
///
/// A single range can have several handlers: `guards[i]` is the exception class caught by the
/// handler at `targets[i]` (`None` catches everything). The handlers are tried in order.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TryCatch {
    /// Start of the protected range (inclusive)
    pub start: SynLabel,

    /// End of the protected range (exclusive)
    pub end: SynLabel,

    pub guards: Vec<Option<BinaryName>>,
    pub targets: Vec<SynLabel>,
}

impl TryCatch {
    pub fn new(
        start: SynLabel,
        end: SynLabel,
        guards: Vec<Option<BinaryName>>,
        targets: Vec<SynLabel>,
    ) -> TryCatch {
        assert_eq!(guards.len(), targets.len(), "each guard needs a handler");
        TryCatch {
            start,
            end,
            guards,
            targets,
        }
    }

    /// Single-handler range
    pub fn catching(
        start: SynLabel,
        end: SynLabel,
        guard: Option<BinaryName>,
        target: SynLabel,
    ) -> TryCatch {
        TryCatch::new(start, end, vec![guard], vec![target])
    }

    /// Do the two ranges dispatch exceptions identically?
    pub fn same_handlers(&self, other: &TryCatch) -> bool {
        self.guards == other.guards && self.targets == other.targets
    }

    pub fn handlers(&self) -> impl Iterator<Item = (&Option<BinaryName>, &SynLabel)> {
        self.guards.iter().zip(self.targets.iter())
    }
}
