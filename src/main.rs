//! rowforge — convert row-automation scripts into platform-ready workers.
//!
//! `convert` rewrites one Python automation script into the platform's
//! `run(data, token, env_config)` form and prints it to stdout. `check`
//! converts and then verifies the output against the runtime contract.

use std::fs;
use std::io::{self, Read, Write};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use regex::Regex;

use rowforge::ast::{FunctionDef, Stmt};
use rowforge::{assemble, loops, parser};
use rowforge::{convert_source, Conversion, ConvertOptions};

/// Convert row-automation scripts into platform-ready worker functions
#[derive(Parser)]
#[command(name = "rowforge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a script; the generated code goes to stdout
    Convert {
        /// Script path, or `-` to read from stdin
        script: String,

        #[command(flatten)]
        options: ConvertArgs,
    },

    /// Convert a script and verify the output against the runtime contract
    Check {
        /// Script path, or `-` to read from stdin
        script: String,

        #[command(flatten)]
        options: ConvertArgs,
    },
}

#[derive(Parser, Clone)]
struct ConvertArgs {
    /// Emit a strictly sequential per-row loop instead of the worker pool
    #[arg(long)]
    sequential: bool,

    /// Also print the conversion report to stderr
    #[arg(long, value_enum)]
    report: Option<ReportFormat>,
}

#[derive(Clone, Copy, ValueEnum)]
enum ReportFormat {
    Yaml,
    Json,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Convert { script, options } => {
            let source = read_script(&script)?;
            eprintln!("Converting {}...", display_name(&script));

            let conversion = convert_source(
                &source,
                &ConvertOptions {
                    sequential: options.sequential,
                },
            )?;

            let stdout = io::stdout();
            let mut handle = stdout.lock();
            write!(handle, "{}", conversion.code)?;
            print_report(&conversion, options.report)?;
        }
        Commands::Check { script, options } => {
            let source = read_script(&script)?;
            eprintln!("Checking {}...", display_name(&script));

            let conversion = convert_source(
                &source,
                &ConvertOptions {
                    sequential: options.sequential,
                },
            )?;

            let checks = run_checks(&conversion);
            let mut failures = 0;
            for check in &checks {
                if check.passed {
                    println!("PASS: {}", check.name);
                } else {
                    failures += 1;
                    println!("FAIL: {} ({})", check.name, check.detail);
                }
            }
            print_report(&conversion, options.report)?;
            if failures > 0 {
                anyhow::bail!("{} check(s) failed", failures);
            }
        }
    }

    Ok(())
}

fn read_script(script: &str) -> Result<String> {
    if script == "-" {
        let mut source = String::new();
        io::stdin()
            .read_to_string(&mut source)
            .context("Failed to read script from stdin")?;
        Ok(source)
    } else {
        fs::read_to_string(script).with_context(|| format!("Failed to read script: {}", script))
    }
}

fn display_name(script: &str) -> &str {
    if script == "-" {
        "stdin"
    } else {
        script
    }
}

fn print_report(conversion: &Conversion, format: Option<ReportFormat>) -> Result<()> {
    let Some(format) = format else {
        return Ok(());
    };
    let rendered = match format {
        ReportFormat::Yaml => serde_yaml::to_string(&conversion.report)?,
        ReportFormat::Json => serde_json::to_string_pretty(&conversion.report)?,
    };
    eprintln!("{}", rendered);
    Ok(())
}

struct Check {
    name: &'static str,
    passed: bool,
    detail: String,
}

fn pass(name: &'static str) -> Check {
    Check {
        name,
        passed: true,
        detail: String::new(),
    }
}

fn fail(name: &'static str, detail: String) -> Check {
    Check {
        name,
        passed: false,
        detail,
    }
}

/// Verify the generated code against the runtime contract.
fn run_checks(conversion: &Conversion) -> Vec<Check> {
    let mut checks = Vec::new();

    let parsed = match parser::parse_module(&conversion.code) {
        Ok(parsed) => {
            checks.push(pass("converted output parses"));
            parsed
        }
        Err(err) => {
            checks.push(fail("converted output parses", err.to_string()));
            return checks;
        }
    };

    let run = parsed.iter().find_map(|stmt| match stmt {
        Stmt::FunctionDef(f) if f.name == assemble::RUN_NAME => Some(f),
        _ => None,
    });
    match run {
        Some(f) if parsed.len() == 1 && param_names(f) == ["data", "token", "env_config"] => {
            checks.push(pass("single run(data, token, env_config) entry point"));
        }
        Some(f) => checks.push(fail(
            "single run(data, token, env_config) entry point",
            format!("signature is run({})", param_names(f).join(", ")),
        )),
        None => checks.push(fail(
            "single run(data, token, env_config) entry point",
            "no top-level run definition".to_string(),
        )),
    }

    if conversion.report.loop_extracted {
        let worker = run.and_then(|f| {
            f.body.iter().find_map(|stmt| match stmt {
                Stmt::FunctionDef(inner) if inner.name == loops::WORKER_NAME => Some(inner),
                _ => None,
            })
        });
        match worker {
            Some(w) if !loops::contains_raw_controls(&w.body) => {
                checks.push(pass("worker body free of raw loop controls"));
            }
            Some(_) => checks.push(fail(
                "worker body free of raw loop controls",
                "continue/break escaped the rewrite".to_string(),
            )),
            None => checks.push(fail(
                "worker body free of raw loop controls",
                "process_row definition missing".to_string(),
            )),
        }
    }

    let double_wrap = Regex::new(r"_log_(_log_)+").expect("static pattern");
    if double_wrap.is_match(&conversion.code) {
        checks.push(fail(
            "call rewriting is idempotent",
            "double-wrapped logging callee found".to_string(),
        ));
    } else {
        checks.push(pass("call rewriting is idempotent"));
    }

    checks
}

fn param_names(f: &FunctionDef) -> Vec<String> {
    f.params.args.iter().map(|p| p.name.clone()).collect()
}
