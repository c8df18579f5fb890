mod common;
mod logic;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::fs::File;
use std::io::{BufWriter, Write, stdout};
use std::path::PathBuf;
use std::time::Instant;
use trivia_engine::EngineConfig;

use common::split_csv;
use logic::{EpisodeTester, StoreSummary, get_scenario, list_scenarios, resolve_date_inputs};

#[derive(Debug, Parser)]
#[command(name = "trivia-tester", version)]
#[command(about = "Automated QA for the trivia episode engine: builds episodes from snapshot files and checks them")]
struct Args {
    /// Snapshot JSON files (comma-separated)
    #[arg(
        long,
        default_value = "assets/snapshots/aave.json,assets/snapshots/arbitrum.json"
    )]
    snapshots: String,

    /// Episode dates: YYYY-MM-DD, inclusive A..B ranges, or `latest` (comma-separated)
    #[arg(long, default_value = "latest")]
    dates: String,

    /// Scenarios to run (comma-separated, `all` for every scenario)
    #[arg(long, default_value = "smoke")]
    scenarios: String,

    /// List all available scenarios and exit
    #[arg(long)]
    list_scenarios: bool,

    /// Output report format
    #[arg(long, default_value = "console")]
    #[arg(value_parser = ["json", "markdown", "console"])]
    report: String,

    /// Optional path to write the report output instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// Persist every generated episode here and check it reproduces
    #[arg(long)]
    store_dir: Option<PathBuf>,

    /// Engine configuration override (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if maybe_list_scenarios(&args)? {
        return Ok(());
    }

    announce_banner();

    let start_time = Instant::now();
    let config = load_config(&args)?;
    let dates = resolve_date_inputs(&split_csv(&args.dates))?;
    let snapshot_paths: Vec<PathBuf> = split_csv(&args.snapshots)
        .into_iter()
        .map(PathBuf::from)
        .collect();
    let tester = EpisodeTester::new(&snapshot_paths, dates, config, args.verbose)?;

    let scenarios = expand_scenarios(&args.scenarios);
    let mut unknown = false;
    let mut results = Vec::new();
    for name in &scenarios {
        if let Some(scenario) = get_scenario(name) {
            results.push(tester.run_scenario(&scenario));
        } else {
            eprintln!("⚠️  Unknown scenario: {}", name.yellow());
            unknown = true;
        }
    }

    let store = match &args.store_dir {
        Some(dir) => Some(tester.store_episodes(dir)?),
        None => None,
    };

    write_reports(&args, &results, store.as_ref(), start_time)?;

    let store_failed = store.as_ref().is_some_and(|s| !s.failures.is_empty());
    if unknown || store_failed || results.iter().any(|r| !r.passed) {
        std::process::exit(1);
    }

    Ok(())
}

fn maybe_list_scenarios(args: &Args) -> Result<bool> {
    if !args.list_scenarios {
        return Ok(false);
    }
    let mut output_target = OutputTarget::new(args.output.clone())?;
    writeln!(output_target.writer(), "Available scenarios:")?;
    for (key, description) in list_scenarios() {
        writeln!(output_target.writer(), "  {key:18} - {description}")?;
    }
    output_target.flush_inner()?;
    Ok(true)
}

fn announce_banner() {
    println!("{}", "🧠 Trivia Episode Tester".bright_cyan().bold());
    println!("{}", "================================".cyan());
}

fn load_config(args: &Args) -> Result<EngineConfig> {
    let Some(path) = &args.config else {
        return Ok(EngineConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    EngineConfig::from_json(&text).with_context(|| format!("failed to parse {}", path.display()))
}

fn expand_scenarios(scenarios_arg: &str) -> Vec<String> {
    let mut scenarios = split_csv(scenarios_arg);
    if scenarios.iter().any(|s| s == "all") {
        scenarios.retain(|s| s != "all");
        for (key, _) in list_scenarios() {
            if !scenarios.iter().any(|s| s == key) {
                scenarios.push(key.to_string());
            }
        }
    }
    scenarios
}

fn write_reports(
    args: &Args,
    results: &[logic::ScenarioResult],
    store: Option<&StoreSummary>,
    start_time: Instant,
) -> Result<()> {
    let mut output_target = OutputTarget::new(args.output.clone())?;

    match args.report.as_str() {
        "json" => {
            logic::reports::generate_json_report(&mut output_target, results, store)?;
        }
        "markdown" => {
            if results.is_empty() && store.is_none() {
                writeln!(
                    &mut output_target,
                    "# Trivia Episode Test Results\n\n_No scenarios executed._"
                )?;
            } else {
                logic::reports::generate_markdown_report(&mut output_target, results, store)?;
            }
        }
        _ => {
            let duration = start_time.elapsed();
            if results.is_empty() && store.is_none() {
                writeln!(&mut output_target, "No scenarios executed.")?;
            } else {
                logic::reports::generate_console_report(
                    &mut output_target,
                    results,
                    store,
                    duration,
                )?;
            }
            writeln!(&mut output_target)?;
            writeln!(&mut output_target, "🏁 Total time: {:?}", start_time.elapsed())?;
        }
    }

    output_target.flush_inner()?;
    Ok(())
}

enum OutputTarget {
    Stdout(BufWriter<std::io::Stdout>),
    File(BufWriter<File>),
}

impl OutputTarget {
    fn new(path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = path {
            let file = File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(Self::File(BufWriter::new(file)))
        } else {
            Ok(Self::Stdout(BufWriter::new(stdout())))
        }
    }

    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Self::Stdout(w) => w,
            Self::File(w) => w,
        }
    }

    fn flush_inner(&mut self) -> std::io::Result<()> {
        match self {
            Self::Stdout(w) => w.flush(),
            Self::File(w) => w.flush(),
        }
    }
}

impl Write for OutputTarget {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flush_inner()
    }
}
