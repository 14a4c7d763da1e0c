use crate::jvm::class_file::Serialize;
use byteorder::WriteBytesExt;
use std::fmt;
use std::io::Result;

/// Class file version
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.1
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major_version: u16,
    pub minor_version: u16,
}

impl Version {
    /// JVM class file version corresponding to Java SE 6
    pub const JAVA6: Version = Version {
        major_version: 50,
        minor_version: 0,
    };

    /// JVM class file version corresponding to Java SE 7
    pub const JAVA7: Version = Version {
        major_version: 51,
        minor_version: 0,
    };

    /// JVM class file version corresponding to Java SE 8 (released March 2014)
    pub const JAVA8: Version = Version {
        major_version: 52,
        minor_version: 0,
    };

    /// JVM class file version corresponding to Java SE 11
    pub const JAVA11: Version = Version {
        major_version: 55,
        minor_version: 0,
    };

    /// From this version on, the type-inferencing verifier is gone and methods with branches
    /// need a `StackMapTable`
    pub fn requires_stack_map(&self) -> bool {
        *self >= Version::JAVA7
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major_version, self.minor_version)
    }
}

impl Serialize for Version {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        self.minor_version.serialize(writer)?;
        self.major_version.serialize(writer)?;
        Ok(())
    }
}
