use super::{
    Address, ArrayDataPayload, ConstValue, DataIntegrityError, DexInstruction, PayloadEncoding,
    Register,
};
use crate::jvm::BinaryName;
use std::collections::BTreeMap;

/// Handler of a try range
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct CatchHandler {
    /// Exception class caught (`None` catches everything)
    pub catch_type: Option<BinaryName>,

    /// Address of the first instruction of the handler
    pub target: Address,
}

/// Protected range of a register-form method body
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TryItem {
    /// First covered instruction
    pub start: Address,

    /// First instruction no longer covered
    pub end: Address,

    /// Handlers, tried in order
    pub handlers: Vec<CatchHandler>,
}

impl TryItem {
    pub fn covers(&self, address: Address) -> bool {
        self.start <= address && address < self.end
    }
}

/// Register-form method body
#[derive(Clone, PartialEq, Debug)]
pub struct DexCode {
    /// Number of registers used by the method
    pub registers_size: u16,

    /// Number of registers holding the incoming arguments (these are the last registers)
    pub ins_size: u16,

    /// Number of registers needed for outgoing call arguments
    pub outs_size: u16,

    pub instructions: Vec<DexInstruction>,

    /// Try ranges (they do not overlap)
    pub tries: Vec<TryItem>,

    /// Raw payloads, keyed by the offset instructions use to refer to them
    pub payloads: BTreeMap<u32, Vec<u8>>,

    /// Byte order of the payloads
    pub payload_encoding: PayloadEncoding,
}

impl DexCode {
    pub fn new(registers_size: u16, ins_size: u16, instructions: Vec<DexInstruction>) -> DexCode {
        DexCode {
            registers_size,
            ins_size,
            outs_size: 0,
            instructions,
            tries: vec![],
            payloads: BTreeMap::new(),
            payload_encoding: PayloadEncoding::Little,
        }
    }

    /// Body that unconditionally throws a `NullPointerException`
    pub fn throw_null() -> DexCode {
        DexCode::new(
            1,
            0,
            vec![
                DexInstruction::Const {
                    dest: Register(0),
                    value: ConstValue::Null,
                },
                DexInstruction::Throw(Register(0)),
            ],
        )
    }

    /// First register holding an incoming argument
    pub fn first_parameter_register(&self) -> u16 {
        self.registers_size - self.ins_size
    }

    /// Try range covering an instruction
    pub fn try_covering(&self, address: Address) -> Option<&TryItem> {
        self.tries.iter().find(|try_item| try_item.covers(address))
    }

    /// Raw payload bytes at an offset
    pub fn payload(&self, offset: u32) -> Option<&[u8]> {
        self.payloads.get(&offset).map(Vec::as_slice)
    }

    /// Decode the array data payload at an offset (`None` if there is no payload there)
    pub fn array_payload(
        &self,
        offset: u32,
    ) -> Option<Result<ArrayDataPayload, DataIntegrityError>> {
        self.payload(offset)
            .map(|bytes| ArrayDataPayload::parse(bytes, self.payload_encoding))
    }
}
