use crate::convert::ExportFault;
use crate::jvm::class_file::Version;
use crate::model::ProgramClass;

/// Writes stack-form classes out as class files
#[derive(Copy, Clone, Debug)]
pub struct ClassWriter {
    /// Version used for classes that don't carry one
    pub default_version: Version,
}

impl ClassWriter {
    pub fn new(default_version: Version) -> ClassWriter {
        ClassWriter { default_version }
    }

    /// Class file bytes for one class
    ///
    /// Every method must have stack code or the sentinel body by now.
    pub fn write(&self, class: &ProgramClass) -> Result<Vec<u8>, ExportFault> {
        let version = class.version.unwrap_or(self.default_version);
        let class_file = class.serialize(version)?;
        Ok(class_file.to_bytes()?)
    }
}

impl Default for ClassWriter {
    fn default() -> ClassWriter {
        ClassWriter::new(Version::JAVA6)
    }
}
