use crate::jvm::class_file::{ClassFile, ConstantsPool, SourceFile, Version};
use crate::jvm::{
    BinaryName, ClassAccessFlags, Error, MethodDescriptor, UnqualifiedName,
};
use crate::model::{ProgramField, ProgramMethod};

/// Semantic representation of a class
#[derive(Clone, PartialEq, Debug)]
pub struct ProgramClass {
    pub name: BinaryName,

    /// Super class (`None` only for `java/lang/Object`)
    pub super_class: Option<BinaryName>,

    pub interfaces: Vec<BinaryName>,
    pub access_flags: ClassAccessFlags,

    /// Name of the source file the class was compiled from
    pub source_file: Option<String>,

    /// Class file version the class originated from
    ///
    /// Register-form inputs don't carry this. It must be filled in before a class gets written
    /// out in stack form.
    pub version: Option<Version>,

    pub fields: Vec<ProgramField>,
    pub methods: Vec<ProgramMethod>,
}

impl ProgramClass {
    /// Create a new empty class extending `java/lang/Object`
    pub fn new(name: BinaryName, access_flags: ClassAccessFlags) -> ProgramClass {
        ProgramClass {
            name,
            super_class: Some(BinaryName::OBJECT),
            interfaces: vec![],
            access_flags,
            source_file: None,
            version: None,
            fields: vec![],
            methods: vec![],
        }
    }

    /// Find a method by name and descriptor
    pub fn method(
        &self,
        name: &UnqualifiedName,
        descriptor: &MethodDescriptor,
    ) -> Option<&ProgramMethod> {
        self.methods
            .iter()
            .find(|method| &method.name == name && &method.descriptor == descriptor)
    }

    /// Serialize the class into a class file
    ///
    /// Every method must have stack code (or the sentinel body). No `StackMapTable` gets
    /// generated, so `version` should be one where the type-inferencing verifier is still used.
    pub fn serialize(&self, version: Version) -> Result<ClassFile, Error> {
        let mut constants_pool = ConstantsPool::new();

        let this_class = constants_pool.get_class_name(&self.name)?;
        let super_class = self
            .super_class
            .as_ref()
            .map(|super_class| constants_pool.get_class_name(super_class))
            .transpose()?;
        let interfaces = self
            .interfaces
            .iter()
            .map(|interface| constants_pool.get_class_name(interface))
            .collect::<Result<Vec<_>, _>>()?;

        let fields = self
            .fields
            .iter()
            .map(|field| field.serialize_field(&mut constants_pool))
            .collect::<Result<Vec<_>, Error>>()?;
        let methods = self
            .methods
            .iter()
            .map(|method| method.serialize_method(&self.name, &mut constants_pool))
            .collect::<Result<Vec<_>, Error>>()?;

        let mut attributes = vec![];
        if let Some(source_file) = &self.source_file {
            let source_file = SourceFile(constants_pool.get_utf8(source_file.as_str())?);
            attributes.push(constants_pool.get_attribute(source_file)?);
        }

        Ok(ClassFile {
            version,
            constants: constants_pool.into_offset_vec(),
            access_flags: self.access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }
}
