use crate::convert::ClassFilter;
use crate::jvm::class_file::Version;
use std::fmt;

/// Which dialect the converted application gets written out in
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum OutputFormat {
    /// Class files with stack-form method bodies
    Stack,

    /// Method table container with register-form method bodies
    Register,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Stack => f.write_str("stack"),
            OutputFormat::Register => f.write_str("register"),
        }
    }
}

/// Minimum runtime API level the register-form output targets
///
/// This only shows up in the header of the register-form container.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ApiLevel(pub u32);

impl ApiLevel {
    pub const DEFAULT: ApiLevel = ApiLevel(1);
}

impl Default for ApiLevel {
    fn default() -> ApiLevel {
        ApiLevel::DEFAULT
    }
}

#[derive(Clone, Debug)]
pub struct Options {
    /// Dialect of the output
    pub output_format: OutputFormat,

    /// Replace the body of a method that fails to convert with one that just throws (instead of
    /// aborting the whole conversion)
    pub replace_invalid_method_bodies: bool,

    /// Skip the backend's sanity checks on its input
    pub lenient: bool,

    pub min_api_level: ApiLevel,

    /// Classes to convert and write out
    pub class_filter: ClassFilter,

    /// Class file version given to classes that don't have one
    ///
    /// No `StackMapTable` is emitted, so this should stay below Java 7.
    pub default_class_version: Version,
}

impl Options {
    pub fn new(output_format: OutputFormat) -> Options {
        Options {
            output_format,
            replace_invalid_method_bodies: false,
            lenient: false,
            min_api_level: ApiLevel::DEFAULT,
            class_filter: ClassFilter::PassAll,
            default_class_version: Version::JAVA6,
        }
    }

    pub fn replace_invalid_method_bodies(mut self, replace: bool) -> Options {
        self.replace_invalid_method_bodies = replace;
        self
    }

    pub fn lenient(mut self, lenient: bool) -> Options {
        self.lenient = lenient;
        self
    }

    pub fn min_api_level(mut self, min_api_level: ApiLevel) -> Options {
        self.min_api_level = min_api_level;
        self
    }

    pub fn class_filter(mut self, class_filter: ClassFilter) -> Options {
        self.class_filter = class_filter;
        self
    }

    pub fn default_class_version(mut self, version: Version) -> Options {
        self.default_class_version = version;
        self
    }
}

impl Default for Options {
    fn default() -> Options {
        Options::new(OutputFormat::Stack)
    }
}
