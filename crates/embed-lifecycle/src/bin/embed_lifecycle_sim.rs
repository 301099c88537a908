use std::fs;

use anyhow::{Context, Result, anyhow, bail};

use embed_lifecycle::scenario::{Scenario, render_scenario_summary, run_scenario};

fn main() {
    if let Err(error) = run(std::env::args().skip(1).collect()) {
        eprintln!("{error:#}");
        std::process::exit(2);
    }
}

fn run(args: Vec<String>) -> Result<()> {
    if args.is_empty() {
        bail!(usage());
    }

    match args[0].as_str() {
        "run" => run_scenario_cmd(&args[1..]),
        "help" | "--help" | "-h" => {
            println!("{}", usage());
            Ok(())
        }
        other => bail!("unknown subcommand '{other}'\n\n{}", usage()),
    }
}

fn usage() -> String {
    [
        "embed_lifecycle_sim usage:",
        "  embed_lifecycle_sim run --scenario <path> [--summary]",
        "  embed_lifecycle_sim help",
    ]
    .join("\n")
}

fn run_scenario_cmd(args: &[String]) -> Result<()> {
    let mut scenario_path: Option<&str> = None;
    let mut summary = false;

    let mut index = 0usize;
    while index < args.len() {
        match args[index].as_str() {
            "--scenario" => {
                index += 1;
                let value = args
                    .get(index)
                    .ok_or_else(|| anyhow!("--scenario requires a path"))?;
                scenario_path = Some(value);
            }
            "--summary" => summary = true,
            flag => bail!("unknown flag for run: {flag}"),
        }
        index += 1;
    }

    let path = scenario_path.ok_or_else(|| anyhow!("missing required --scenario <path>"))?;
    let scenario = load_scenario(path)?;
    let report = run_scenario(&scenario)
        .with_context(|| format!("scenario '{path}' has an invalid config"))?;

    if summary {
        println!("{}", render_scenario_summary(&report));
    } else {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("failed to encode scenario report")?
        );
    }

    Ok(())
}

fn load_scenario(path: &str) -> Result<Scenario> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read scenario file '{path}'"))?;
    Scenario::from_json(&content).with_context(|| format!("failed to parse scenario file '{path}'"))
}
