use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::Ordering;

use bytesize::ByteSize;
use clap::ValueEnum;

use ext_line_sort::{generator, AppSettings, ExternalSorterBuilder, SortError};

const DEFAULT_CONFIG: &str = "appsettings.json";

fn main() {
    let arg_parser = build_arg_parser();

    let log_level: LogLevel = arg_parser.value_of_t_or_exit("log_level");
    init_logger(log_level);

    let result = match arg_parser.subcommand() {
        Some(("sort", args)) => run_sort(args),
        Some(("generate", args)) => run_generate(args),
        _ => Err(SortError::InvalidConfig("unknown command".to_string())),
    };

    if let Err(err) = result {
        log::error!("{}", err);
        process::exit(1);
    }
}

fn run_sort(args: &clap::ArgMatches) -> Result<(), SortError> {
    let mut settings = match args.value_of("config") {
        Some(config) => AppSettings::load(config)?,
        None if Path::new(DEFAULT_CONFIG).exists() => AppSettings::load(DEFAULT_CONFIG)?,
        None => AppSettings::default(),
    };

    if let Some(input) = args.value_of("input") {
        settings.input_file = Some(PathBuf::from(input));
    }
    if let Some(buffer_size) = args.value_of("buffer_size") {
        settings.buffer_size = parse_size(buffer_size)?;
    }
    if let Some(chunk_size) = args.value_of("chunk_size") {
        settings.temp_file_size = parse_size(chunk_size)?;
    }
    let settings = settings.validate()?;

    let mut sorter_builder = ExternalSorterBuilder::new()
        .with_rw_buf_size(settings.buffer_size)
        .with_chunk_size(settings.temp_file_size);
    if args.is_present("threads") {
        sorter_builder = sorter_builder.with_threads_number(args.value_of_t_or_exit("threads"));
    }
    if let Some(tmp_dir) = args.value_of("tmp_dir") {
        sorter_builder = sorter_builder.with_tmp_dir(Path::new(tmp_dir));
    }

    let sorter = sorter_builder.build()?;

    let canceled = sorter.cancel_flag();
    if let Err(err) = ctrlc::set_handler(move || {
        log::warn!("interrupted, stopping");
        canceled.store(true, Ordering::Relaxed);
    }) {
        log::warn!("interrupt handler not installed: {}", err);
    }

    sorter.sort_file(&settings.input_file)?;

    return Ok(());
}

fn run_generate(args: &clap::ArgMatches) -> Result<(), SortError> {
    let output = args.value_of("output").unwrap_or("text.txt");
    let size = parse_size(args.value_of("size").unwrap_or("0"))?;
    let buffer_size = parse_size(args.value_of("buffer_size").unwrap_or("1MiB"))?;

    generator::generate_file(Path::new(output), size as u64, buffer_size.max(1))?;

    return Ok(());
}

fn parse_size(value: &str) -> Result<usize, SortError> {
    let size = value
        .parse::<ByteSize>()
        .map_err(|err| SortError::InvalidConfig(format!("size format incorrect: {}", err)))?;

    usize::try_from(size.as_u64()).map_err(|err| SortError::InvalidConfig(format!("size too large: {}", err)))
}

#[derive(Copy, Clone, clap::ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Self::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <LogLevel as clap::ValueEnum>::from_str(s, false)
    }
}

fn size_arg(name: &'static str) -> clap::Arg<'static> {
    clap::Arg::new(name).takes_value(true).validator(|v| match v.parse::<ByteSize>() {
        Ok(_) => Ok(()),
        Err(err) => Err(format!("size format incorrect: {}", err)),
    })
}

fn build_arg_parser() -> clap::ArgMatches {
    clap::App::new("ext-line-sort")
        .about("external sorter of numbered text lines")
        .subcommand_required(true)
        .arg(
            clap::Arg::new("log_level")
                .short('l')
                .long("loglevel")
                .help("logging level")
                .takes_value(true)
                .default_value("info")
                .possible_values(LogLevel::possible_values()),
        )
        .subcommand(
            clap::App::new("sort")
                .about("sorts a file into <name>.sorted.<ext>")
                .arg(
                    clap::Arg::new("config")
                        .short('c')
                        .long("config")
                        .help("settings file, appsettings.json is used if present")
                        .takes_value(true),
                )
                .arg(
                    clap::Arg::new("input")
                        .short('i')
                        .long("input")
                        .help("file to be sorted, overrides AppSettings:InputFile")
                        .takes_value(true),
                )
                .arg(
                    size_arg("buffer_size")
                        .short('b')
                        .long("buffer-size")
                        .help("read/write buffer size, overrides AppSettings:BufferSize"),
                )
                .arg(
                    size_arg("chunk_size")
                        .short('s')
                        .long("chunk-size")
                        .help("temporary file size, overrides AppSettings:TempFileSize"),
                )
                .arg(
                    clap::Arg::new("threads")
                        .short('t')
                        .long("threads")
                        .help("number of threads to use for parallel sorting")
                        .takes_value(true),
                )
                .arg(
                    clap::Arg::new("tmp_dir")
                        .short('d')
                        .long("tmp-dir")
                        .help("directory to be used to store temporary files")
                        .takes_value(true),
                ),
        )
        .subcommand(
            clap::App::new("generate")
                .about("generates a random test file")
                .arg(
                    clap::Arg::new("output")
                        .short('o')
                        .long("output")
                        .help("file to be generated")
                        .takes_value(true)
                        .default_value("text.txt"),
                )
                .arg(
                    size_arg("size")
                        .short('s')
                        .long("size")
                        .help("file size, e.g. 100MB")
                        .required(true),
                )
                .arg(
                    size_arg("buffer_size")
                        .short('b')
                        .long("buffer-size")
                        .help("write buffer size")
                        .default_value("1MiB"),
                ),
        )
        .get_matches()
}

fn init_logger(log_level: LogLevel) {
    env_logger::Builder::new()
        .filter_level(match log_level {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        })
        .format_timestamp_millis()
        .init();
}
