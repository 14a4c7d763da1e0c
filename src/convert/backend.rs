use crate::convert::{register_builder, BackendFault, Options, WorkerPool};
use crate::dex::DexCode;
use crate::jvm::code::{CfCode, CodeItem, SynLabel};
use crate::jvm::{BinaryName, MethodAccessFlags};
use crate::lower::{validate_branch_targets, validate_registers, validate_tries};
use crate::model::{Application, MethodCode, ProgramClass, ProgramMethod};
use std::collections::HashSet;

/// Compiler backend driven by the conversion
///
/// The backend owns everything structural: checking the input before any method is touched,
/// assigning registers when producing register code, and cleaning up the application once all
/// methods have been retargeted.
pub trait Backend: Send + Sync {
    /// Check (and possibly adjust) the application before methods get converted
    fn normalize(&self, application: &mut Application, options: &Options)
        -> Result<(), BackendFault>;

    /// Produce register code equivalent to the stack code of a method
    fn build_register_code(
        &self,
        class: &BinaryName,
        method: &ProgramMethod,
        code: &CfCode,
    ) -> Result<DexCode, BackendFault>;

    /// Structural cleanup of every class, once methods have been converted
    fn finalize(
        &self,
        application: &mut Application,
        pool: &WorkerPool,
        options: &Options,
    ) -> Result<(), BackendFault>;
}

/// Reference backend: naive register assignment and light structural checks
#[derive(Copy, Clone, Default, Debug)]
pub struct SimpleBackend;

impl Backend for SimpleBackend {
    fn normalize(
        &self,
        application: &mut Application,
        options: &Options,
    ) -> Result<(), BackendFault> {
        if options.lenient {
            return Ok(());
        }
        for class in application.classes() {
            let mut signatures = HashSet::new();
            for method in &class.methods {
                if !signatures.insert((&method.name, &method.descriptor)) {
                    return Err(BackendFault::Invalid(format!(
                        "{} is declared twice",
                        method.identity(&class.name)
                    )));
                }
                let bodiless = method
                    .access_flags
                    .intersects(MethodAccessFlags::ABSTRACT | MethodAccessFlags::NATIVE);
                if method.code.is_none() && !bodiless {
                    return Err(BackendFault::Invalid(format!(
                        "{} has no code",
                        method.identity(&class.name)
                    )));
                }
            }
        }
        Ok(())
    }

    fn build_register_code(
        &self,
        class: &BinaryName,
        method: &ProgramMethod,
        code: &CfCode,
    ) -> Result<DexCode, BackendFault> {
        register_builder::build_register_code(class, method, code)
    }

    fn finalize(
        &self,
        application: &mut Application,
        pool: &WorkerPool,
        _options: &Options,
    ) -> Result<(), BackendFault> {
        let classes: Vec<ProgramClass> = application.classes().cloned().collect();
        let finalized = pool.try_map(classes, finalize_class)?;
        application.take_classes();
        application.restore_classes(finalized);
        Ok(())
    }
}

fn finalize_class(mut class: ProgramClass) -> Result<ProgramClass, BackendFault> {
    for method in &mut class.methods {
        let result = match &mut method.code {
            Some(MethodCode::Stack(code)) => finalize_stack_code(code),
            Some(MethodCode::Register(code)) => validate_register_code(code),
            Some(MethodCode::ThrowNull) | None => Ok(()),
        };
        result.map_err(|message| {
            BackendFault::Invalid(format!("{}: {}", method.identity(&class.name), message))
        })?;
    }
    Ok(class)
}

fn finalize_stack_code(code: &mut CfCode) -> Result<(), String> {
    let positions = code.label_positions();
    if let Some(label) = code
        .referenced_labels()
        .into_iter()
        .find(|label| !positions.contains_key(label))
    {
        return Err(format!("label {:?} is never placed", label));
    }

    // A range covers nothing if only labels sit between its ends
    let items = &code.items;
    code.try_catches.retain(|try_catch| {
        let start = positions[&try_catch.start];
        let end = positions[&try_catch.end];
        items
            .get(start..end)
            .map_or(false, |covered| {
                covered.iter().any(|item| !matches!(item, CodeItem::Label(_)))
            })
    });

    let referenced: HashSet<SynLabel> = code.referenced_labels();
    code.items.retain(|item| match item {
        CodeItem::Label(label) => referenced.contains(label),
        _ => true,
    });
    Ok(())
}

fn validate_register_code(code: &DexCode) -> Result<(), String> {
    validate_branch_targets(code)
        .and_then(|()| validate_registers(code))
        .and_then(|()| validate_tries(code))
        .map_err(|err| err.to_string())
}
