use crate::convert::{
    Backend, ConversionError, ConversionReport, MethodConversionLoop, Options, OutputFormat,
    PoolError, SimpleBackend, WorkerPool,
};
use crate::lower::{InstructionTranslator, StandardTranslator};
use crate::model::{Application, MethodCode, ProgramClass};
use crate::output::{ClassMapSink, ClassWriter, MethodTableWriter, OutputSink};
use crate::resugar::merge_adjacent_try_catches;
use std::collections::BTreeMap;

/// Drives whole applications through the conversion pipeline
///
/// A run goes through these steps, stopping at the first error:
///
///   1. the backend checks the application
///   2. every method not yet in the output dialect is retargeted
///   3. the backend finalizes the application
///   4. exception ranges split up by lowering are merged back together
///   5. classes are serialized into the sink
///
/// The converter owns its worker pool. The pool is reused by later runs as long as runs succeed,
/// but a failed run shuts it down right away (so later runs will fail too).
pub struct Converter {
    options: Options,
    backend: Box<dyn Backend>,
    translator: Box<dyn InstructionTranslator>,
    pool: WorkerPool,
}

impl Converter {
    pub fn new(options: Options, backend: Box<dyn Backend>, pool: WorkerPool) -> Converter {
        Converter {
            options,
            backend,
            translator: Box::new(StandardTranslator),
            pool,
        }
    }

    /// Converter using the reference backend and a pool sized for this machine
    pub fn with_defaults(options: Options) -> Result<Converter, PoolError> {
        let pool = WorkerPool::with_default_size()?;
        Ok(Converter::new(options, Box::new(SimpleBackend), pool))
    }

    /// Use a different translator for the instructions lowering doesn't handle itself
    pub fn with_translator(mut self, translator: Box<dyn InstructionTranslator>) -> Converter {
        self.translator = translator;
        self
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Convert the application in place and write the result into the sink
    pub fn convert(
        &mut self,
        application: &mut Application,
        sink: &mut dyn OutputSink,
    ) -> Result<ConversionReport, ConversionError> {
        let result = self.run(application, sink);
        if let Err(err) = &result {
            log::debug!("conversion failed, shutting down the worker pool: {}", err);
            self.pool.shutdown_now();
        }
        result
    }

    /// Convert the application and collect the output in memory
    ///
    /// Class files are keyed by class name. Register-form output is a single entry,
    /// [`crate::output::CONTAINER_ENTRY`].
    pub fn export_class_map(
        &mut self,
        application: &mut Application,
    ) -> Result<(BTreeMap<String, Vec<u8>>, ConversionReport), ConversionError> {
        let mut sink = ClassMapSink::new();
        let report = self.convert(application, &mut sink)?;
        Ok((sink.into_map(), report))
    }

    fn run(
        &mut self,
        application: &mut Application,
        sink: &mut dyn OutputSink,
    ) -> Result<ConversionReport, ConversionError> {
        let target = self.options.output_format;
        log::info!(
            "converting {} classes ({} methods) to {} form",
            application.len(),
            application.method_count(),
            target
        );

        self.backend
            .normalize(application, &self.options)
            .map_err(|cause| ConversionError::BackendProcessing { target, cause })?;

        let mut method_loop =
            MethodConversionLoop::new(&self.options, self.backend.as_ref(), self.translator.as_ref());
        method_loop.run(application)?;

        self.backend
            .finalize(application, &self.pool, &self.options)
            .map_err(|cause| ConversionError::BackendProcessing { target, cause })?;

        if target == OutputFormat::Stack {
            let mut merged = 0;
            for class in application.classes_mut() {
                let class_name = &class.name;
                for method in &mut class.methods {
                    if !method_loop.was_converted(&method.identity(class_name)) {
                        continue;
                    }
                    if let Some(MethodCode::Stack(code)) = &mut method.code {
                        merged += merge_adjacent_try_catches(code);
                    }
                }
            }
            log::debug!("merged {} exception ranges", merged);
        }

        let report = ConversionReport::from_records(method_loop.into_records());
        self.serialize(application, sink)?;
        log::info!(
            "converted {} methods, replaced {}",
            report.converted(),
            report.replaced().len()
        );
        Ok(report)
    }

    fn serialize(
        &self,
        application: &Application,
        sink: &mut dyn OutputSink,
    ) -> Result<(), ConversionError> {
        let target = self.options.output_format;
        let export = |cause| ConversionError::Export { target, cause };

        let classes: Vec<ProgramClass> = application
            .classes()
            .filter(|class| self.options.class_filter.matches(&class.name))
            .cloned()
            .collect();

        match target {
            OutputFormat::Stack => {
                let writer = ClassWriter::new(self.options.default_class_version);
                let entries = self
                    .pool
                    .try_map(classes, move |class| {
                        writer.write(&class).map(|bytes| (class.name, bytes))
                    })
                    .map_err(export)?;
                for (name, bytes) in entries {
                    sink.accept_class(&name, bytes).map_err(export)?;
                }
            }
            OutputFormat::Register => {
                let writer = MethodTableWriter::new(self.options.min_api_level);
                let entries = self
                    .pool
                    .try_map(classes, |class| MethodTableWriter::encode_class(&class))
                    .map_err(export)?;
                let container = writer.assemble(&entries).map_err(export)?;
                sink.accept_container(container).map_err(export)?;
            }
        }
        sink.finished().map_err(export)
    }
}
