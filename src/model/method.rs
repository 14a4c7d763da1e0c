use crate::dex::DexCode;
use crate::jvm::class_file;
use crate::jvm::class_file::ConstantsPool;
use crate::jvm::code::{BranchInstruction, CfCode, CodeItem, Instruction};
use crate::jvm::{
    BinaryName, Error, MethodAccessFlags, MethodDescriptor, Name, RenderDescriptor,
    UnqualifiedName,
};
use crate::util::Offset;
use std::fmt;

/// Body of a method, in whichever dialect it currently is
#[derive(Clone, PartialEq, Debug)]
pub enum MethodCode {
    Register(DexCode),
    Stack(CfCode),

    /// Body that unconditionally throws when invoked (stands in for a method that failed to
    /// convert)
    ThrowNull,
}

impl MethodCode {
    pub fn is_register(&self) -> bool {
        matches!(self, MethodCode::Register(_))
    }

    pub fn is_stack(&self) -> bool {
        matches!(self, MethodCode::Stack(_))
    }
}

/// Semantic representation of a method
#[derive(Clone, PartialEq, Debug)]
pub struct ProgramMethod {
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor,
    pub access_flags: MethodAccessFlags,

    /// Method code implementation (`None` for abstract and native methods)
    pub code: Option<MethodCode>,
}

impl ProgramMethod {
    /// Create a new method with no code
    pub fn new(
        name: UnqualifiedName,
        descriptor: MethodDescriptor,
        access_flags: MethodAccessFlags,
    ) -> ProgramMethod {
        ProgramMethod {
            name,
            descriptor,
            access_flags,
            code: None,
        }
    }

    pub fn with_code(mut self, code: MethodCode) -> ProgramMethod {
        self.code = Some(code);
        self
    }

    pub fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::STATIC)
    }

    /// Number of slots (registers or locals) taken by the arguments, including `this`
    pub fn parameter_slots(&self) -> usize {
        self.descriptor.parameter_length(!self.is_static())
    }

    /// Fully qualified identity of the method, given the class declaring it
    pub fn identity(&self, class: &BinaryName) -> MethodIdentity {
        MethodIdentity {
            class: class.clone(),
            name: self.name.clone(),
            descriptor: self.descriptor.clone(),
        }
    }

    /// Stack code for the sentinel body (`aconst_null; athrow`)
    pub fn throw_null_code(&self) -> CfCode {
        CfCode {
            max_locals: Offset(self.parameter_slots()),
            max_stack: Offset(1),
            items: vec![
                CodeItem::Instruction(Instruction::AConstNull),
                CodeItem::Branch(BranchInstruction::AThrow),
            ],
            try_catches: vec![],
        }
    }

    /// Serialize the method
    ///
    /// Register code can't be represented in a class file, so methods still carrying it are an
    /// error.
    pub fn serialize_method(
        &self,
        owner: &BinaryName,
        constants_pool: &mut ConstantsPool,
    ) -> Result<class_file::Method, Error> {
        let name_index = constants_pool.get_utf8(self.name.as_str())?;
        let descriptor_index = constants_pool.get_utf8(self.descriptor.render())?;

        let mut attributes = vec![];

        // `Code` attribute
        let code = match &self.code {
            None => None,
            Some(MethodCode::Stack(code)) => Some(code.serialize_code(constants_pool)?),
            Some(MethodCode::ThrowNull) => {
                Some(self.throw_null_code().serialize_code(constants_pool)?)
            }
            Some(MethodCode::Register(_)) => {
                return Err(Error::NotStackCode(self.identity(owner).to_string()))
            }
        };
        if let Some(code) = code {
            attributes.push(constants_pool.get_attribute(code)?);
        }

        Ok(class_file::Method {
            access_flags: self.access_flags,
            name_index,
            descriptor_index,
            attributes,
        })
    }
}

/// Class, name, and descriptor of a method
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct MethodIdentity {
    pub class: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor,
}

impl fmt::Display for MethodIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}{}",
            self.class,
            self.name,
            self.descriptor.render()
        )
    }
}
