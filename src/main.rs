use dex_translator::convert::{
    ClassFilter, Converter, Options, OutputFormat, SimpleBackend, WorkerPool,
};
use dex_translator::output::{DirectorySink, MethodTableReader};

use clap::{value_parser, Arg, ArgAction, Command};
use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::process;

fn main() {
    env_logger::init();

    if let Err(err) = run() {
        log::error!("{}", err);
        eprintln!("error: {}", err);
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let matches = Command::new("dex-translator")
        .version(clap::crate_version!())
        .about("Translate method bodies between register-based and stack-based bytecode")
        .arg(
            Arg::new("INPUT")
                .help("Register-form method table container to convert")
                .required(true)
                .value_parser(value_parser!(PathBuf))
                .index(1),
        )
        .arg(
            Arg::new("output-directory")
                .long("output-directory")
                .short('o')
                .value_name("DIR")
                .default_value(".")
                .value_parser(value_parser!(PathBuf))
                .help("Directory receiving the converted classes"),
        )
        .arg(
            Arg::new("output-format")
                .long("output-format")
                .value_name("FORMAT")
                .default_value("stack")
                .value_parser(["stack", "register"])
                .help("Dialect to write: class files (`stack`) or a container (`register`)"),
        )
        .arg(
            Arg::new("replace-invalid")
                .long("replace-invalid")
                .action(ArgAction::SetTrue)
                .help("Replace methods that fail to convert with a body that throws"),
        )
        .arg(
            Arg::new("lenient")
                .long("lenient")
                .action(ArgAction::SetTrue)
                .help("Skip sanity checks on the input"),
        )
        .arg(
            Arg::new("class")
                .long("class")
                .value_name("CLASS_NAME")
                .action(ArgAction::Append)
                .help("Only convert this class (eg. `foo/bar/Baz`, can be repeated)"),
        )
        .arg(
            Arg::new("threads")
                .long("threads")
                .value_name("COUNT")
                .value_parser(value_parser!(usize))
                .help("Number of worker threads (defaults to one less than the available cores)"),
        )
        .get_matches();

    let output_format = match matches.get_one::<String>("output-format").map(String::as_str) {
        Some("register") => OutputFormat::Register,
        _ => OutputFormat::Stack,
    };
    let class_filter = match matches.get_many::<String>("class") {
        Some(names) => ClassFilter::parse_types(names.map(String::as_str))?,
        None => ClassFilter::PassAll,
    };

    let input = matches.get_one::<PathBuf>("INPUT").ok_or("missing input")?;
    log::info!("Reading '{}'", input.display());
    let table = MethodTableReader::read(&fs::read(input)?)?;
    log::info!("Read {} classes", table.application.len());

    let options = Options::new(output_format)
        .replace_invalid_method_bodies(matches.get_flag("replace-invalid"))
        .lenient(matches.get_flag("lenient"))
        .min_api_level(table.min_api_level)
        .class_filter(class_filter);
    let pool = match matches.get_one::<usize>("threads") {
        Some(threads) => WorkerPool::new(*threads)?,
        None => WorkerPool::with_default_size()?,
    };
    let mut converter = Converter::new(options, Box::new(SimpleBackend), pool);

    let output_directory = matches
        .get_one::<PathBuf>("output-directory")
        .ok_or("missing output directory")?;
    let mut sink = DirectorySink::new(output_directory);
    let mut application = table.application;
    let report = converter.convert(&mut application, &mut sink)?;

    for record in report.replaced() {
        log::warn!("{}", record);
    }
    log::info!(
        "Done: {} methods converted, {} replaced",
        report.converted(),
        report.replaced().len()
    );
    Ok(())
}
