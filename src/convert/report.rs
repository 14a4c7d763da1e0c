use crate::model::MethodIdentity;
use std::fmt;

/// What happened to one method
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum MethodOutcome {
    Converted,

    /// Body was swapped for one that throws, for the reason given
    Replaced(String),
}

/// Outcome of one method during one conversion
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MethodConversionRecord {
    pub method: MethodIdentity,
    pub outcome: MethodOutcome,
}

impl fmt::Display for MethodConversionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            MethodOutcome::Converted => write!(f, "{}: converted", self.method),
            MethodOutcome::Replaced(reason) => write!(f, "{}: replaced ({})", self.method, reason),
        }
    }
}

/// Methods whose bodies got replaced during a conversion
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct ConversionReport {
    replaced: Vec<MethodConversionRecord>,
    converted: usize,
}

impl ConversionReport {
    /// Assemble a report out of every record of the conversion
    pub fn from_records<I: IntoIterator<Item = MethodConversionRecord>>(
        records: I,
    ) -> ConversionReport {
        let mut report = ConversionReport::default();
        for record in records {
            match record.outcome {
                MethodOutcome::Converted => report.converted += 1,
                MethodOutcome::Replaced(_) => report.replaced.push(record),
            }
        }
        report
    }

    /// Records of the replaced methods, in the order they were processed
    pub fn replaced(&self) -> &[MethodConversionRecord] {
        &self.replaced
    }

    /// Number of method bodies that were converted successfully
    pub fn converted(&self) -> usize {
        self.converted
    }

    /// Did every method convert?
    pub fn is_clean(&self) -> bool {
        self.replaced.is_empty()
    }
}
