//! Simulator Binary
//!
//! Usage: sst-sim [OPTIONS]
//!
//! Options:
//!   -t, --trace <FILE>     Trace file to replay
//!   -s, --strategy <NAME>  sst | serial | parallel | persistent | pipelined | all
//!   -h, --help             Print help information

use std::env;
use std::time::Duration;

use sst_sim::harness::{self, Scenario, ScenarioFile, Strategy};
use sst_sim::workload::{Workload, SYNTHETIC_PAGE_COUNT, SYNTHETIC_SEED};

fn main() -> anyhow::Result<()> {
    // Initialize tracing — respects RUST_LOG env var (e.g. RUST_LOG=debug)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args: Vec<String> = env::args().collect();

    let mut scenario = Scenario::default();
    let mut trace_path: Option<String> = None;
    let mut max_pages = 0usize;
    let mut run_all = false;

    let mut idx = 1;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => {
                print_usage();
                return Ok(());
            }
            "-c" | "--config" => {
                let path = take_value(&args, &mut idx, "--config")?;
                let content = std::fs::read_to_string(&path)?;
                let file: ScenarioFile = toml::from_str(&content)?;
                scenario = file.to_scenario()?;
            }
            "-t" | "--trace" => {
                trace_path = Some(take_value(&args, &mut idx, "--trace")?);
            }
            "-s" | "--strategy" => {
                let name = take_value(&args, &mut idx, "--strategy")?;
                if name.eq_ignore_ascii_case("all") {
                    run_all = true;
                } else {
                    scenario.strategy = name.parse()?;
                }
            }
            "--bandwidth" => {
                scenario.bandwidth_bps = take_value(&args, &mut idx, "--bandwidth")?.parse()?;
            }
            "--delay-ms" => {
                let ms: u64 = take_value(&args, &mut idx, "--delay-ms")?.parse()?;
                scenario.delay = Duration::from_millis(ms);
            }
            "--loss" => {
                scenario.loss_rate = take_value(&args, &mut idx, "--loss")?.parse()?;
            }
            "--seed" => {
                scenario.seed = take_value(&args, &mut idx, "--seed")?.parse()?;
            }
            "--time" => {
                let secs: u64 = take_value(&args, &mut idx, "--time")?.parse()?;
                scenario.duration = Duration::from_secs(secs);
            }
            "--max-pages" => {
                max_pages = take_value(&args, &mut idx, "--max-pages")?.parse()?;
            }
            "--print-config" => {
                let file = ScenarioFile::from_scenario(&scenario);
                println!("{}", toml::to_string_pretty(&file)?);
                return Ok(());
            }
            other => {
                eprintln!("Unknown option: {other}");
                print_usage();
                anyhow::bail!("unknown option: {other}");
            }
        }
        idx += 1;
    }

    let mut workload = match &trace_path {
        Some(path) => Workload::from_trace_file(path)?,
        None => {
            tracing::info!("no trace file given, using the synthetic workload");
            Workload::synthetic(SYNTHETIC_SEED, SYNTHETIC_PAGE_COUNT)
        }
    };
    workload.truncate(max_pages);

    if run_all {
        for strategy in Strategy::ALL {
            let mut each = scenario.clone();
            each.strategy = strategy;
            let report = harness::run(&each, &workload)?;
            println!("{}", report.format());
        }
    } else {
        let report = harness::run(&scenario, &workload)?;
        println!("{}", report.format());
    }

    Ok(())
}

fn take_value(args: &[String], idx: &mut usize, flag: &str) -> anyhow::Result<String> {
    *idx += 1;
    args.get(*idx)
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("{flag} requires a value"))
}

fn print_usage() {
    println!(
        r#"sst-sim - HTTP transfer strategy simulator

USAGE:
    sst-sim [OPTIONS]

OPTIONS:
    -t, --trace <FILE>      Trace file to replay (default: synthetic workload)
    -s, --strategy <NAME>   sst | serial | parallel | persistent | pipelined | all
    -c, --config <FILE>     Load a scenario TOML file
    --bandwidth <BPS>       Link rate in bits per second (default: 1500000)
    --delay-ms <MS>         One-way propagation delay (default: 25)
    --loss <RATE>           Per-datagram loss probability (default: 0)
    --seed <N>              Loss model seed (default: 1)
    --time <SECS>           Simulated duration cap (default: 500)
    --max-pages <N>         Limit the number of pages (0 = all)
    --print-config          Print the effective scenario as TOML and exit
    -h, --help              Print help information

EXAMPLES:
    Replay a trace over the SST transport:
        sst-sim --trace pages.csv --strategy sst

    Compare every strategy on a lossy link:
        sst-sim --strategy all --loss 0.05 --max-pages 20
"#
    );
}
