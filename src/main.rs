use std::path;
use std::process;
use std::time::Instant;

use bytesize::ByteSize;
use clap::ArgEnum;
use env_logger;
use log;

use ext_line_sort::{ExternalSorter, ExternalSorterBuilder, RandomContentGenerator, ScratchDir, TempArtifact};

fn main() {
    let arg_parser = build_arg_parser();

    let log_level: LogLevel = arg_parser.value_of_t_or_exit("log_level");
    init_logger(log_level);

    let order: Order = arg_parser.value_of_t_or_exit("sort");
    let tmp_dir: Option<&str> = arg_parser.value_of("tmp_dir");
    let threads: Option<usize> = arg_parser
        .is_present("threads")
        .then(|| arg_parser.value_of_t_or_exit("threads"));
    let chunks: Option<usize> = arg_parser
        .is_present("chunks")
        .then(|| arg_parser.value_of_t_or_exit("chunks"));
    let memory_limit: Option<ByteSize> = arg_parser
        .value_of("memory_limit")
        .map(|value| value.parse::<ByteSize>().expect("value is pre-validated"));

    let mut sorter_builder = ExternalSorterBuilder::new();
    if let Some(threads) = threads {
        sorter_builder = sorter_builder.with_threads_number(threads);
    }

    if let Some(tmp_dir) = tmp_dir {
        sorter_builder = sorter_builder.with_tmp_dir(path::Path::new(tmp_dir));
    }

    if let Some(chunks) = chunks {
        sorter_builder = sorter_builder.with_chunks_number(chunks);
    } else if let Some(memory_limit) = memory_limit {
        sorter_builder = sorter_builder.with_memory_limit(memory_limit.as_u64());
    }

    let sorter: ExternalSorter = match sorter_builder.build() {
        Ok(sorter) => sorter,
        Err(err) => {
            log::error!("sorter initialization error: {}", err);
            process::exit(1);
        }
    };

    // exiting only after `execute` returns lets every temporary file be dropped first
    if let Err(err) = execute(&arg_parser, &sorter, order, tmp_dir) {
        log::error!("{}", err);
        process::exit(1);
    }
}

fn execute(
    arg_parser: &clap::ArgMatches,
    sorter: &ExternalSorter,
    order: Order,
    tmp_dir: Option<&str>,
) -> Result<(), String> {
    // without an input file the sorter is benchmarked on generated content
    let generated: Option<TempArtifact> = match arg_parser.value_of("input") {
        Some(_) => None,
        None => {
            let lines: u64 = arg_parser.value_of_t_or_exit("lines");
            let line_length: i64 = arg_parser.value_of_t_or_exit("line_length");
            let mut generator = match tmp_dir {
                Some(tmp_dir) => RandomContentGenerator::with_scratch(ScratchDir::new(tmp_dir)),
                None => RandomContentGenerator::new(),
            };
            if arg_parser.is_present("seed") {
                generator = generator.with_seed(arg_parser.value_of_t_or_exit("seed"));
            }

            let started = Instant::now();
            let generated = generator
                .generate(lines, line_length)
                .map_err(|err| format!("content generation error: {}", err))?;
            log::info!("generation took {:.3} sec", started.elapsed().as_secs_f64());

            Some(generated)
        }
    };

    let input = match (&generated, arg_parser.value_of("input")) {
        (Some(generated), _) => generated.path(),
        (None, Some(input)) => path::Path::new(input),
        (None, None) => unreachable!("input is either given or generated"),
    };

    let started = Instant::now();
    let sorted = match order {
        Order::Asc => sorter.sort(input),
        Order::Desc => sorter.sort_by(input, |a: &str, b: &str| a.cmp(b).reverse()),
    }
    .map_err(|err| format!("data sorting error: {}", err))?;
    log::info!("sorting took {:.3} sec", started.elapsed().as_secs_f64());

    match arg_parser.value_of("output") {
        Some(output) => sorted
            .persist(output)
            .map_err(|err| format!("result saving error: {}", err))?,
        None => log::info!("no output requested, {} sorted records discarded", sorted.records()),
    }

    return Ok(());
}

#[derive(Copy, Clone, clap::ArgEnum)]
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
        <LogLevel as clap::ArgEnum>::from_str(s, false)
    }
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum Order {
    Asc,
    Desc,
}

impl Order {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Order::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for Order {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Order as clap::ArgEnum>::from_str(s, false)
    }
}

fn build_arg_parser() -> clap::ArgMatches {
    clap::App::new("ext-line-sort")
        .about("sorts line files larger than memory")
        .arg(
            clap::Arg::new("input")
                .short('i')
                .long("input")
                .help("file to be sorted, random content is generated if omitted")
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("output")
                .short('o')
                .long("output")
                .help("result file, the result is discarded if omitted")
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("lines")
                .short('n')
                .long("lines")
                .help("number of lines to generate")
                .takes_value(true)
                .default_value("10000"),
        )
        .arg(
            clap::Arg::new("line_length")
                .short('w')
                .long("line-length")
                .help("length of generated lines")
                .takes_value(true)
                .allow_hyphen_values(true)
                .default_value("150"),
        )
        .arg(
            clap::Arg::new("seed")
                .long("seed")
                .help("seed of the content generator")
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("sort")
                .short('s')
                .long("sort")
                .help("sorting order")
                .takes_value(true)
                .default_value("asc")
                .possible_values(Order::possible_values()),
        )
        .arg(
            clap::Arg::new("log_level")
                .short('l')
                .long("loglevel")
                .help("logging level")
                .takes_value(true)
                .default_value("info")
                .possible_values(LogLevel::possible_values()),
        )
        .arg(
            clap::Arg::new("threads")
                .short('t')
                .long("threads")
                .help("number of chunks to sort in parallel")
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("chunks")
                .short('c')
                .long("chunks")
                .help("number of chunks, overrides the memory based sizing")
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("tmp_dir")
                .short('d')
                .long("tmp-dir")
                .help("directory to be used to store temporary data")
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("memory_limit")
                .short('m')
                .long("memory-limit")
                .help("memory budget for chunk sizing, the available memory is used if omitted")
                .takes_value(true)
                .validator(|v| match v.parse::<ByteSize>() {
                    Ok(_) => Ok(()),
                    Err(err) => Err(format!("Memory limit format incorrect: {}", err)),
                }),
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
