mod support;

use dex_translator::convert::{
    Backend, BackendFault, ClassFilter, ConversionError, Converter, ExportFault, MethodOutcome,
    Options, OutputFormat, PoolError, SimpleBackend, WorkerPool,
};
use dex_translator::dex::{ConstValue, DexCode, DexInstruction, Register, ValueType};
use dex_translator::jvm::code::CfCode;
use dex_translator::jvm::{BinaryName, Name};
use dex_translator::model::{Application, MethodCode, ProgramClass, ProgramMethod};
use dex_translator::output::{
    ClassMapSink, DirectorySink, MethodTableReader, OutputSink, CONTAINER_ENTRY,
};
use std::fs;
use support::{class_name, class_with, interpret, static_method, Value, TEST_CLASS};

fn converter(options: Options) -> Converter {
    Converter::new(options, Box::new(SimpleBackend), WorkerPool::new(2).unwrap())
}

fn returns_int(value: i32) -> DexCode {
    DexCode::new(
        1,
        0,
        vec![
            DexInstruction::Const {
                dest: Register(0),
                value: ConstValue::Int(value),
            },
            DexInstruction::Return {
                value_type: ValueType::Int,
                src: Register(0),
            },
        ],
    )
}

/// Body the lowering has no stack equivalent for
fn unsupported() -> DexCode {
    DexCode::new(
        1,
        0,
        vec![
            DexInstruction::ConstMethodHandle {
                dest: Register(0),
                handle: String::from("Lme/Test;->f()V"),
            },
            DexInstruction::Return {
                value_type: ValueType::Object,
                src: Register(0),
            },
        ],
    )
}

/// Packs its two arguments into a fresh array
fn pair_array() -> DexCode {
    DexCode::new(
        3,
        2,
        vec![
            DexInstruction::FilledNewArray {
                array_type: String::from("[I"),
                registers: vec![Register(1), Register(2)],
            },
            DexInstruction::MoveResult {
                value_type: ValueType::Object,
                dest: Register(0),
            },
            DexInstruction::Return {
                value_type: ValueType::Object,
                src: Register(0),
            },
        ],
    )
}

/// `good0`, `bad1`, `good2`, `bad3`
fn mixed_application() -> Application {
    let methods = (0..4)
        .map(|idx| {
            if idx % 2 == 0 {
                static_method(&format!("good{}", idx), "()I", returns_int(idx))
            } else {
                static_method(&format!("bad{}", idx), "()Ljava/lang/Object;", unsupported())
            }
        })
        .collect();
    vec![class_with(TEST_CLASS, methods)].into_iter().collect()
}

fn method_code<'a>(class: &'a ProgramClass, name: &str) -> &'a MethodCode {
    class
        .methods
        .iter()
        .find(|method| method.name.as_str() == name)
        .and_then(|method| method.code.as_ref())
        .unwrap()
}

#[test]
fn failing_methods_are_replaced_when_asked() {
    let mut application = mixed_application();
    let options = Options::new(OutputFormat::Stack).replace_invalid_method_bodies(true);
    let mut converter = converter(options);

    let (classes, report) = converter.export_class_map(&mut application).unwrap();

    assert_eq!(report.converted(), 2);
    let replaced: Vec<&str> = report
        .replaced()
        .iter()
        .map(|record| record.method.name.as_str())
        .collect();
    assert_eq!(replaced, vec!["bad1", "bad3"]);
    for record in report.replaced() {
        assert!(matches!(&record.outcome, MethodOutcome::Replaced(reason) if !reason.is_empty()));
    }

    let class = application.class(&class_name(TEST_CLASS)).unwrap();
    assert_eq!(method_code(class, "bad1"), &MethodCode::ThrowNull);
    assert_eq!(method_code(class, "bad3"), &MethodCode::ThrowNull);
    match method_code(class, "good2") {
        MethodCode::Stack(code) => {
            assert_eq!(interpret(code, &[]).returned(), Value::Int(2));
        }
        other => panic!("expected stack code, got {:?}", other),
    }

    let bytes = &classes[TEST_CLASS];
    assert_eq!(&bytes[0..4], &[0xCA, 0xFE, 0xBA, 0xBE]);
    assert!(!converter.pool().is_shut_down());
}

#[test]
fn first_failure_aborts_the_run() {
    let mut application = mixed_application();
    let mut converter = converter(Options::new(OutputFormat::Stack));
    let mut sink = ClassMapSink::new();

    match converter.convert(&mut application, &mut sink) {
        Err(ConversionError::MethodRetarget { method, target, .. }) => {
            assert_eq!(method.name.as_str(), "bad1");
            assert_eq!(target, OutputFormat::Stack);
        }
        other => panic!("expected a retargeting failure, got {:?}", other),
    }
    assert!(sink.entries().is_empty());
    assert!(!sink.is_finished());
    assert!(converter.pool().is_shut_down());

    // The pool is gone, so even a clean application can't be converted any more
    let mut clean: Application = vec![class_with(
        TEST_CLASS,
        vec![static_method("good", "()I", returns_int(1))],
    )]
    .into_iter()
    .collect();
    assert!(matches!(
        converter.convert(&mut clean, &mut ClassMapSink::new()),
        Err(ConversionError::BackendProcessing {
            cause: BackendFault::Pool(PoolError::ShutDown),
            ..
        })
    ));
}

#[test]
fn single_bad_method_among_many() {
    let single_failure = || -> Application {
        let mut methods: Vec<_> = (0..4)
            .map(|idx| static_method(&format!("good{}", idx), "()I", returns_int(idx)))
            .collect();
        methods.insert(2, static_method("bad", "()Ljava/lang/Object;", unsupported()));
        vec![class_with(TEST_CLASS, methods)].into_iter().collect()
    };

    let options = Options::new(OutputFormat::Stack).replace_invalid_method_bodies(true);
    let (classes, report) = converter(options)
        .export_class_map(&mut single_failure())
        .unwrap();
    assert_eq!(report.converted(), 4);
    assert_eq!(report.replaced().len(), 1);
    assert_eq!(report.replaced()[0].method.name.as_str(), "bad");
    assert_eq!(classes.len(), 1);

    let mut sink = ClassMapSink::new();
    let result =
        converter(Options::new(OutputFormat::Stack)).convert(&mut single_failure(), &mut sink);
    assert!(matches!(result, Err(ConversionError::MethodRetarget { .. })));
    assert!(sink.entries().is_empty());
}

/// Sink whose disk fills up after the first class
#[derive(Default)]
struct FailingSink {
    accepted: Vec<String>,
    finished: bool,
}

impl OutputSink for FailingSink {
    fn accept_class(&mut self, name: &BinaryName, _bytes: Vec<u8>) -> Result<(), ExportFault> {
        if !self.accepted.is_empty() {
            return Err(ExportFault::Encoding(String::from("no space left")));
        }
        self.accepted.push(name.as_str().to_owned());
        Ok(())
    }

    fn accept_container(&mut self, _bytes: Vec<u8>) -> Result<(), ExportFault> {
        Ok(())
    }

    fn finished(&mut self) -> Result<(), ExportFault> {
        self.finished = true;
        Ok(())
    }
}

#[test]
fn export_failures_end_the_run() {
    let mut application: Application = vec![
        class_with("me/First", vec![static_method("one", "()I", returns_int(1))]),
        class_with("me/Second", vec![static_method("two", "()I", returns_int(2))]),
    ]
    .into_iter()
    .collect();
    let mut converter = converter(Options::new(OutputFormat::Stack));
    let mut sink = FailingSink::default();

    match converter.convert(&mut application, &mut sink) {
        Err(ConversionError::Export {
            target: OutputFormat::Stack,
            cause: ExportFault::Encoding(message),
        }) => assert_eq!(message, "no space left"),
        other => panic!("expected an export failure, got {:?}", other),
    }
    assert_eq!(sink.accepted, vec!["me/First"]);
    assert!(!sink.finished);
    assert!(converter.pool().is_shut_down());
}

/// Backend that converts methods normally but refuses to finish the job
struct BrokenFinalize;

impl Backend for BrokenFinalize {
    fn normalize(
        &self,
        application: &mut Application,
        options: &Options,
    ) -> Result<(), BackendFault> {
        SimpleBackend.normalize(application, options)
    }

    fn build_register_code(
        &self,
        class: &BinaryName,
        method: &ProgramMethod,
        code: &CfCode,
    ) -> Result<DexCode, BackendFault> {
        SimpleBackend.build_register_code(class, method, code)
    }

    fn finalize(
        &self,
        _application: &mut Application,
        _pool: &WorkerPool,
        _options: &Options,
    ) -> Result<(), BackendFault> {
        Err(BackendFault::Invalid(String::from("class layout is inconsistent")))
    }
}

#[test]
fn finalization_failures_are_backend_failures() {
    let mut application: Application = vec![class_with(
        TEST_CLASS,
        vec![static_method("good", "()I", returns_int(1))],
    )]
    .into_iter()
    .collect();
    let options = Options::new(OutputFormat::Stack).replace_invalid_method_bodies(true);
    let mut converter = Converter::new(
        options,
        Box::new(BrokenFinalize),
        WorkerPool::new(2).unwrap(),
    );
    let mut sink = ClassMapSink::new();

    match converter.convert(&mut application, &mut sink) {
        Err(ConversionError::BackendProcessing {
            target: OutputFormat::Stack,
            cause: BackendFault::Invalid(message),
        }) => assert_eq!(message, "class layout is inconsistent"),
        other => panic!("expected a backend failure, got {:?}", other),
    }
    assert!(sink.entries().is_empty());
    assert!(!sink.is_finished());
    assert!(converter.pool().is_shut_down());
}

#[test]
fn filtered_classes_are_neither_converted_nor_written() {
    let mut application: Application = vec![
        class_with("me/Kept", vec![static_method("one", "()I", returns_int(1))]),
        class_with("me/Skipped", vec![static_method("two", "()I", returns_int(2))]),
    ]
    .into_iter()
    .collect();
    let options = Options::new(OutputFormat::Stack)
        .class_filter(ClassFilter::types(vec![class_name("me/Kept")]));

    let (classes, report) = converter(options).export_class_map(&mut application).unwrap();

    assert_eq!(report.converted(), 1);
    assert_eq!(classes.keys().collect::<Vec<_>>(), vec!["me/Kept"]);
    let skipped = application.class(&class_name("me/Skipped")).unwrap();
    assert!(method_code(skipped, "two").is_register());
}

#[test]
fn register_output_survives_a_round_trip() {
    let mut application: Application = vec![class_with(
        TEST_CLASS,
        vec![static_method("pair", "(II)[I", pair_array())],
    )]
    .into_iter()
    .collect();

    // Register code to stack code
    let (_, report) = converter(Options::new(OutputFormat::Stack))
        .export_class_map(&mut application)
        .unwrap();
    assert_eq!(report.converted(), 1);

    // Stack code back to register code, through the container
    let (entries, report) = converter(Options::new(OutputFormat::Register))
        .export_class_map(&mut application)
        .unwrap();
    assert_eq!(report.converted(), 1);
    assert_eq!(entries.len(), 1);
    let table = MethodTableReader::read(&entries[CONTAINER_ENTRY]).unwrap();
    let mut reloaded = table.application;
    let class = reloaded.class(&class_name(TEST_CLASS)).unwrap();
    assert!(method_code(class, "pair").is_register());

    // And down to stack code once more, which must still do the same thing
    converter(Options::new(OutputFormat::Stack))
        .export_class_map(&mut reloaded)
        .unwrap();
    let class = reloaded.class(&class_name(TEST_CLASS)).unwrap();
    match method_code(class, "pair") {
        MethodCode::Stack(code) => {
            let result = interpret(code, &[Value::Int(3), Value::Int(-4)]).returned();
            assert_eq!(result.array_elements(), vec![Value::Int(3), Value::Int(-4)]);
        }
        other => panic!("expected stack code, got {:?}", other),
    }
}

#[test]
fn class_files_land_in_package_directories() {
    let root = std::env::temp_dir().join(format!("dex-translator-output-{}", std::process::id()));
    let mut application: Application = vec![class_with(
        "me/pkg/Answer",
        vec![static_method("get", "()I", returns_int(42))],
    )]
    .into_iter()
    .collect();

    let mut sink = DirectorySink::new(&root);
    converter(Options::new(OutputFormat::Stack))
        .convert(&mut application, &mut sink)
        .unwrap();

    let path = root.join("me").join("pkg").join("Answer.class");
    assert_eq!(sink.written(), &[path.clone()][..]);
    let bytes = fs::read(&path).unwrap();
    assert_eq!(&bytes[0..4], &[0xCA, 0xFE, 0xBA, 0xBE]);
    fs::remove_dir_all(&root).unwrap();
}
