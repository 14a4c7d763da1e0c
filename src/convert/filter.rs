use crate::jvm::{BinaryName, Name};
use std::collections::BTreeSet;

/// Which program classes take part in a conversion
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum ClassFilter {
    PassAll,
    PassNone,

    /// Only the classes named
    Types(BTreeSet<BinaryName>),
}

impl ClassFilter {
    /// Filter accepting exactly the named classes
    pub fn types<I: IntoIterator<Item = BinaryName>>(names: I) -> ClassFilter {
        ClassFilter::Types(names.into_iter().collect())
    }

    pub fn matches(&self, name: &BinaryName) -> bool {
        match self {
            ClassFilter::PassAll => true,
            ClassFilter::PassNone => false,
            ClassFilter::Types(names) => names.contains(name),
        }
    }

    /// Parse class names (eg. from the command line), accepting `.` as a package separator
    pub fn parse_types<'a, I: IntoIterator<Item = &'a str>>(
        names: I,
    ) -> Result<ClassFilter, String> {
        let mut parsed = BTreeSet::new();
        for name in names {
            parsed.insert(BinaryName::from_string(name.replace('.', "/"))?);
        }
        Ok(ClassFilter::Types(parsed))
    }
}

impl Default for ClassFilter {
    fn default() -> ClassFilter {
        ClassFilter::PassAll
    }
}
