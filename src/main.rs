extern crate log;
extern crate pretty_env_logger;

use std::path::PathBuf;
use std::process::exit;

use clap::{arg, command, value_parser, ArgMatches, Command};

use omr_scorer::{score_sheets, ScoringOptions, SheetLayout};

fn main() {
    pretty_env_logger::init_custom_env("LOG");

    let matches = cli().get_matches();
    let debug = matches.get_flag("debug");
    let pretty = matches.get_flag("pretty");
    let key_path = matches
        .get_one::<PathBuf>("key")
        .expect("answer key path is required");
    let sheet_paths = matches
        .get_many::<PathBuf>("sheets")
        .expect("at least one sheet image is required")
        .cloned()
        .collect::<Vec<PathBuf>>();

    let options = ScoringOptions {
        debug,
        layout: layout_from_matches(&matches),
    };

    let report = match score_sheets(&sheet_paths, key_path, &options) {
        Ok(report) => report,
        Err(e) => {
            match std::error::Error::source(&e) {
                Some(source) => eprintln!("Error: {}: {}", e, source),
                None => eprintln!("Error: {}", e),
            }
            exit(1);
        }
    };

    let json = if pretty {
        serde_json::to_string_pretty(&report)
    } else {
        serde_json::to_string(&report)
    };

    match json {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error writing report: {}", e);
            exit(1);
        }
    }
}

fn layout_from_matches(matches: &ArgMatches) -> SheetLayout {
    let mut layout = SheetLayout::default();
    if let Some(&question_count) = matches.get_one::<u32>("questions") {
        layout = layout.with_question_count(question_count);
    }
    if let Some(&column_count) = matches.get_one::<usize>("columns") {
        layout.column_count = column_count;
    }
    if let Some(&fill_threshold) = matches.get_one::<u32>("fill-threshold") {
        layout.fill_threshold = fill_threshold;
    }
    layout
}

#[allow(clippy::cognitive_complexity)]
fn cli() -> Command {
    command!()
        .arg(
            arg!(-k --key <PATH> "Path to answer key CSV file")
                .required(true)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(arg!(-d --debug "Write debug images next to each sheet"))
        .arg(arg!(-p --pretty "Pretty-print the JSON report"))
        .arg(
            arg!(--questions <COUNT> "Number of questions to score")
                .required(false)
                .value_parser(value_parser!(u32)),
        )
        .arg(
            arg!(--columns <COUNT> "Page columns on sheets with many bubbles")
                .required(false)
                .value_parser(value_parser!(usize)),
        )
        .arg(
            arg!(--"fill-threshold" <PIXELS> "Ink pixels a bubble needs to count as filled")
                .required(false)
                .value_parser(value_parser!(u32)),
        )
        .arg(
            arg!(sheets: <SHEET_IMAGE> ... "Paths to sheet images")
                .required(true)
                .value_parser(value_parser!(PathBuf)),
        )
}
