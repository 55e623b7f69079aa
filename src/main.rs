//! Command-line front-end.
//!
//! `gsort FILE GENOME` sorts a tab-delimited genomic file (BED, VCF,
//! GFF or GTF) by the chromosome order given in the genome file, then
//! by start and end coordinate, spilling to compressed temp files when
//! the input exceeds the memory budget.

use std::path::PathBuf;
use std::process;

use clap::{Arg, ArgAction, Command};
use env_logger::Env;
use log::debug;

use gsort::{config::SortConfig, error::SortResult, spill, EXIT_SUCCESS};

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    match run() {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("gsort: {e}");
            process::exit(e.exit_code());
        }
    }
}

fn run() -> SortResult<i32> {
    let matches = build_cli().get_matches();
    let config = config_from_matches(&matches);
    config.validate()?;

    // From here on any signal must unlink whatever we spilled.
    spill::install_signal_cleanup(&config.temp_dir)?;
    let stale = spill::remove_stale(&config.temp_dir);
    if stale > 0 {
        debug!("removed {stale} stale spill files");
    }

    gsort::run(&config)?;
    Ok(EXIT_SUCCESS)
}

fn build_cli() -> Command {
    Command::new("gsort")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Sort genomic files by the chromosome order of a genome file")
        .override_usage("gsort [OPTIONS] <FILE> <GENOME>")
        .arg(
            Arg::new("file")
                .help("Tab-delimited file to sort (BED/VCF/GFF/GTF; .gz accepted, '-' for stdin)")
                .value_name("FILE")
                .required(true),
        )
        .arg(
            Arg::new("genome")
                .help("Genome file of chromosome names, lengths, and order")
                .value_name("GENOME")
                .required(true),
        )
        .arg(
            Arg::new("memory")
                .short('m')
                .long("memory")
                .help("Megabytes of memory to use before writing to temp files")
                .value_name("N")
                .value_parser(clap::value_parser!(usize))
                .default_value("1300"),
        )
        .arg(
            Arg::new("parent")
                .short('p')
                .long("parent")
                .help(
                    "For GFF/GTF only: among rows with the same chromosome and start, \
                     put rows declaring an ID before rows referencing it via Parent=. \
                     Deterministic only while the body fits in one chunk",
                )
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("temporary-directory")
                .short('t')
                .long("temporary-directory")
                .help("Directory for temp files, not $TMPDIR")
                .value_name("DIR"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .help("Write result to FILE instead of standard output")
                .value_name("FILE"),
        )
        .arg(
            Arg::new("rename-chroms")
                .long("rename-chroms")
                .help("Two-column file mapping chromosome names to replacements")
                .value_name("FILE"),
        )
}

fn config_from_matches(matches: &clap::ArgMatches) -> SortConfig {
    let input = PathBuf::from(matches.get_one::<String>("file").expect("required"));
    let genome = PathBuf::from(matches.get_one::<String>("genome").expect("required"));
    let mut config = SortConfig::new(input, genome);

    config.memory_mb = *matches.get_one::<usize>("memory").expect("has default");
    config.parent = matches.get_flag("parent");
    if let Some(dir) = matches.get_one::<String>("temporary-directory") {
        config.temp_dir = PathBuf::from(dir);
    }
    if let Some(path) = matches.get_one::<String>("output") {
        config.output = Some(PathBuf::from(path));
    }
    if let Some(path) = matches.get_one::<String>("rename-chroms") {
        config.rename_chroms = Some(PathBuf::from(path));
    }
    config
}
