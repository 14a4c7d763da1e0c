use crate::jvm::class_file;
use crate::jvm::class_file::ConstantsPool;
use crate::jvm::{Error, FieldAccessFlags, FieldType, Name, RenderDescriptor, UnqualifiedName};

/// In-memory representation of a field
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ProgramField {
    pub name: UnqualifiedName,
    pub descriptor: FieldType,
    pub access_flags: FieldAccessFlags,
}

impl ProgramField {
    pub fn new(
        name: UnqualifiedName,
        descriptor: FieldType,
        access_flags: FieldAccessFlags,
    ) -> ProgramField {
        ProgramField {
            name,
            descriptor,
            access_flags,
        }
    }

    /// Serialize the field
    pub fn serialize_field(&self, constants_pool: &mut ConstantsPool) -> Result<class_file::Field, Error> {
        let name_index = constants_pool.get_utf8(self.name.as_str())?;
        let descriptor_index = constants_pool.get_utf8(self.descriptor.render())?;
        Ok(class_file::Field {
            access_flags: self.access_flags,
            name_index,
            descriptor_index,
            attributes: vec![],
        })
    }
}
