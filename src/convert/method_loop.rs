use crate::convert::{
    Backend, BackendFault, ConversionError, MethodConversionRecord, MethodOutcome, Options,
    OutputFormat,
};
use crate::jvm::BinaryName;
use crate::lower::{lower_method, InstructionTranslator, LoweringError};
use crate::model::{Application, MethodCode, MethodIdentity, ProgramClass, ProgramMethod};
use std::collections::HashSet;

/// Retargets every method of the application, one at a time
///
/// Each method whose code is not yet in the output dialect is converted at most once. When that
/// fails, the method either gets a body that just throws (if replacing invalid bodies is
/// enabled) or the whole run stops with the first failure.
pub struct MethodConversionLoop<'a> {
    options: &'a Options,
    backend: &'a dyn Backend,
    translator: &'a dyn InstructionTranslator,

    /// One record per retargeted method, in processing order
    records: Vec<MethodConversionRecord>,

    /// Methods that now hold converted code
    converted: HashSet<MethodIdentity>,
}

impl<'a> MethodConversionLoop<'a> {
    pub fn new(
        options: &'a Options,
        backend: &'a dyn Backend,
        translator: &'a dyn InstructionTranslator,
    ) -> MethodConversionLoop<'a> {
        MethodConversionLoop {
            options,
            backend,
            translator,
            records: vec![],
            converted: HashSet::new(),
        }
    }

    /// Convert the methods of every class accepted by the class filter
    pub fn run(&mut self, application: &mut Application) -> Result<(), ConversionError> {
        for class in application.classes_mut() {
            if self.options.class_filter.matches(&class.name) {
                self.convert_class(class)?;
            } else {
                log::debug!("skipping filtered out class {}", class.name);
            }
        }
        Ok(())
    }

    /// Convert the methods of one class
    pub fn convert_class(&mut self, class: &mut ProgramClass) -> Result<(), ConversionError> {
        match class.version {
            None => {
                log::debug!(
                    "{} has no class version, using {}",
                    class.name,
                    self.options.default_class_version
                );
                class.version = Some(self.options.default_class_version);
            }
            Some(version)
                if version.requires_stack_map()
                    && self.options.output_format == OutputFormat::Stack =>
            {
                log::warn!(
                    "{} has class version {}, which needs stack maps (none are written)",
                    class.name,
                    version
                );
            }
            Some(_) => (),
        }

        let class_name = &class.name;
        for method in &mut class.methods {
            let identity = method.identity(class_name);
            let outcome = match self.retarget(class_name, method) {
                Ok(None) => continue,
                Ok(Some(code)) => {
                    method.code = Some(code);
                    log::debug!("{}: converted", identity);
                    self.converted.insert(identity.clone());
                    MethodOutcome::Converted
                }
                Err(cause) if self.options.replace_invalid_method_bodies => {
                    log::warn!("{}: replacing body: {}", identity, cause);
                    method.code = Some(MethodCode::ThrowNull);
                    MethodOutcome::Replaced(cause.to_string())
                }
                Err(cause) => {
                    return Err(ConversionError::MethodRetarget {
                        method: identity,
                        target: self.options.output_format,
                        cause,
                    })
                }
            };
            self.records.push(MethodConversionRecord {
                method: identity,
                outcome,
            });
        }
        Ok(())
    }

    /// New code for a method (`None` if the method needs no conversion)
    fn retarget(
        &self,
        class: &BinaryName,
        method: &ProgramMethod,
    ) -> Result<Option<MethodCode>, LoweringError> {
        match (&method.code, self.options.output_format) {
            (Some(MethodCode::Register(dex)), OutputFormat::Stack) => {
                let code = lower_method(class, method, dex, self.translator)?;
                Ok(Some(MethodCode::Stack(code)))
            }
            (Some(MethodCode::Stack(code)), OutputFormat::Register) => {
                let dex = self
                    .backend
                    .build_register_code(class, method, code)
                    .map_err(BackendFault::into_lowering_error)?;
                Ok(Some(MethodCode::Register(dex)))
            }
            _ => Ok(None),
        }
    }

    pub fn records(&self) -> &[MethodConversionRecord] {
        &self.records
    }

    /// Was this method given converted code?
    pub fn was_converted(&self, method: &MethodIdentity) -> bool {
        self.converted.contains(method)
    }

    pub fn into_records(self) -> Vec<MethodConversionRecord> {
        self.records
    }
}
