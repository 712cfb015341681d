extern crate log;
extern crate pretty_env_logger;

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::process::exit;

use clap::{arg, command, ArgMatches, Command};
use indicatif::{ProgressBar, ProgressStyle};

use crate::export::{results_table, scores_table, write_csv, write_json};
use crate::grading::{grade, AnswerKey, MarkWeights};
use crate::interpret::{interpret_pages, InterpretOptions};
use crate::sheet::SheetTemplate;

mod alignment;
mod classify;
mod debug;
mod export;
mod geometry;
mod grading;
mod image_utils;
mod interpret;
mod sheet;
mod types;

fn fail(context: &str, e: impl Display) -> ! {
    eprintln!("Error {}: {}", context, e);
    exit(1);
}

fn load_answer_key(matches: &ArgMatches) -> Option<AnswerKey> {
    if let Some(text) = matches.get_one::<String>("key") {
        return Some(AnswerKey::parse(text));
    }
    let path = matches.get_one::<String>("key-file")?;
    match std::fs::read_to_string(path) {
        Ok(text) => Some(AnswerKey::parse(&text)),
        Err(e) => fail(&format!("reading answer key {}", path), e),
    }
}

fn progress_bar(total: usize) -> ProgressBar {
    let bar = ProgressBar::new(total as u64);
    let style = ProgressStyle::with_template("{bar:40} {pos}/{len} pages ({elapsed})")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar
}

fn main() {
    pretty_env_logger::init_custom_env("LOG");

    let matches = cli().get_matches();
    let image_paths: Vec<PathBuf> = matches
        .get_many::<String>("pages")
        .expect("at least one page image is required")
        .map(PathBuf::from)
        .collect();
    let out_dir = matches
        .get_one::<String>("out")
        .map_or_else(|| PathBuf::from("."), PathBuf::from);

    let template = match matches.get_one::<String>("template") {
        Some(path) => match SheetTemplate::load(Path::new(path)) {
            Ok(template) => template,
            Err(e) => fail("loading template", e),
        },
        None => SheetTemplate::default(),
    };

    let weights = match matches.get_one::<String>("weights") {
        Some(path) => match MarkWeights::load(Path::new(path)) {
            Ok(weights) => weights,
            Err(e) => fail("loading weights", e),
        },
        None => MarkWeights::default(),
    };

    let answer_key = load_answer_key(&matches);
    if answer_key.as_ref().map_or(false, AnswerKey::is_empty) {
        log::warn!("answer key has no A-D letters; grading without a key");
    }

    let option_labels = template.answer_blocks.labels.clone();
    let options = InterpretOptions {
        template,
        debug: matches.get_flag("debug"),
        parallel: !matches.get_flag("sequential"),
        answer_key: answer_key.clone(),
    };

    let bar = progress_bar(image_paths.len());
    let pages = match interpret_pages(&image_paths, &options, |done, _| {
        bar.set_position(done as u64)
    }) {
        Ok(pages) => pages,
        Err(e) => {
            bar.abandon();
            fail("reading pages", e)
        }
    };
    bar.finish_and_clear();

    let report = grade(&pages, answer_key.as_ref(), &weights);

    if let Err(e) = std::fs::create_dir_all(&out_dir) {
        fail(&format!("creating {}", out_dir.display()), e);
    }
    let results_path = out_dir.join("results.csv");
    if let Err(e) = write_csv(&results_path, &results_table(&report, &option_labels)) {
        fail("exporting results", e);
    }
    let scores_path = out_dir.join("scores.csv");
    if let Err(e) = write_csv(&scores_path, &scores_table(&report)) {
        fail("exporting scores", e);
    }
    if matches.get_flag("json") {
        if let Err(e) = write_json(&out_dir.join("report.json"), &pages, &report) {
            fail("exporting report", e);
        }
    }

    for student in &report.students {
        if report.has_key {
            println!(
                "{}: {} / {} ({:.1}%)",
                student.label, student.score, student.total_possible, student.percentage
            );
        } else {
            println!("{}: {} answers read", student.label, student.answers.len());
        }
    }
}

fn cli() -> Command {
    command!()
        .arg(arg!(-t --template <PATH> "Path to a sheet template JSON file"))
        .arg(arg!(-k --key <ANSWERS> "Answer key, e.g. \"1.A 2.C 3.B\"").conflicts_with("key-file"))
        .arg(arg!(--"key-file" <PATH> "Path to a text file holding the answer key"))
        .arg(arg!(-w --weights <PATH> "Path to a JSON array of mark sections"))
        .arg(arg!(-o --out <DIR> "Directory for results.csv and scores.csv"))
        .arg(arg!(--json "Also write report.json"))
        .arg(arg!(-d --debug "Write a debug image next to each page"))
        .arg(arg!(--sequential "Read pages one at a time"))
        .arg(arg!(pages: <PAGE_IMAGE> ... "Page images, in student order").required(true))
}
