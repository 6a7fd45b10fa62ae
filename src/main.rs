//! cwlgen CLI Entry Point
//!
//! Builds a CWL workflow from a recipe and saves it.
//!
//! # Usage
//!
//! ```bash
//! # Build and save next to the recipe's name
//! cwlgen echo-wc.yaml
//!
//! # Choose the output file and link mode
//! cwlgen echo-wc.yaml --output echo-wc.cwl --mode pack
//!
//! # Copy every step into a working directory
//! cwlgen echo-wc.yaml --mode wd --working-dir /data/cwl
//!
//! # Show the steps a recipe can use
//! cwlgen echo-wc.yaml --list
//! ```

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use colored::Colorize;
use log::{info, warn};

use cwlgen::recipe::{build_graph, from_graph, load_recipe};
use cwlgen::serialize::{save, LinkMode, SaveOptions};
use cwlgen::{LoadReport, APP_NAME, STEPS_PATH, VERSION};

/// Extension of the saved workflow when no output is given.
const DEFAULT_EXTENSION: &str = "cwl";

/// Command-line configuration parsed from arguments.
#[derive(Debug)]
struct Config {
    recipe_path: Option<PathBuf>,
    output: Option<PathBuf>,
    mode: LinkMode,
    working_dir: Option<PathBuf>,
    steps: Vec<PathBuf>,
    validate: bool,
    list: bool,
    emit_recipe: bool,
    verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            recipe_path: None,
            output: None,
            mode: LinkMode::Absolute,
            working_dir: None,
            steps: Vec::new(),
            validate: true,
            list: false,
            emit_recipe: false,
            verbose: false,
        }
    }
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints the application banner with version information.
fn print_banner() {
    println!();
    println!("{} v{}", APP_NAME.bold(), VERSION);
    println!("CWL Workflow Builder");
    println!();
}

/// Prints usage information.
fn print_usage() {
    println!("Usage: cwlgen [OPTIONS] <RECIPE>");
    println!();
    println!("Arguments:");
    println!("  <RECIPE>              Path to the workflow recipe (YAML)");
    println!();
    println!("Options:");
    println!("  -o, --output PATH     Where to save the workflow (default: <RECIPE>.{})", DEFAULT_EXTENSION);
    println!("  --mode MODE           Link mode: abs, rel, wd, pack (default: abs)");
    println!("  --working-dir PATH    Working directory for the 'wd' mode");
    println!("  --steps PATH          Extra step directory or file (repeatable)");
    println!("  --no-validate         Skip validation before saving");
    println!("  --list                List the available steps and exit");
    println!("  --emit-recipe         Print the normalised recipe instead of saving");
    println!("  -v, --verbose         Enable debug logging");
    println!("  -h, --help            Show this help message");
    println!("  -V, --version         Show version information");
    println!();
    println!("Environment:");
    println!("  CWLGEN_STEPS_PATH     Extra step directories, loaded before the recipe's own");
    println!();
    println!("Examples:");
    println!("  cwlgen echo-wc.yaml");
    println!("  cwlgen echo-wc.yaml -o out/echo-wc.cwl --mode rel");
    println!("  cwlgen echo-wc.yaml --mode wd --working-dir /data/cwl");
}

/// Parses command-line arguments into a Config struct.
fn parse_arguments(args: &[String]) -> Result<Config, String> {
    let mut config = Config::default();
    let mut i = 1; // Skip program name

    while i < args.len() {
        let arg = &args[i];

        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("{} {}", APP_NAME, VERSION);
                std::process::exit(0);
            }
            "--verbose" | "-v" => {
                config.verbose = true;
            }
            "--no-validate" => {
                config.validate = false;
            }
            "--list" => {
                config.list = true;
            }
            "--emit-recipe" => {
                config.emit_recipe = true;
            }
            "--output" | "-o" => {
                config.output = Some(PathBuf::from(option_value(args, &mut i, arg)?));
            }
            "--mode" => {
                config.mode = option_value(args, &mut i, arg)?.parse()?;
            }
            "--working-dir" => {
                config.working_dir = Some(PathBuf::from(option_value(args, &mut i, arg)?));
            }
            "--steps" => {
                config.steps.push(PathBuf::from(option_value(args, &mut i, arg)?));
            }
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown option: {}", arg));
            }
            _ => {
                if config.recipe_path.is_some() {
                    return Err(format!("Unexpected argument: {}", arg));
                }
                config.recipe_path = Some(PathBuf::from(arg));
            }
        }
        i += 1;
    }

    if config.recipe_path.is_none() {
        return Err("No recipe given".to_string());
    }
    Ok(config)
}

fn option_value<'a>(args: &'a [String], i: &mut usize, option: &str) -> Result<&'a str, String> {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| format!("{} requires an argument", option))
}

/// Prints load warnings and failures; returns how many documents failed.
fn print_load_report(report: &LoadReport) -> usize {
    for warning in report.warnings() {
        eprintln!("{} {}", "warning:".yellow().bold(), warning);
    }

    let mut failed = 0;
    for failure in report.failures() {
        eprintln!("{} {} ({})", "skipped:".red().bold(), failure, failure.kind());
        failed += 1;
    }
    failed
}

/// Main application entry point.
fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    // Parse arguments
    let config = parse_arguments(&args).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;

    setup_logging(config.verbose);

    let recipe_path = config.recipe_path.clone().unwrap_or_default();
    let mut recipe = load_recipe(&recipe_path)?;
    if let Some(dir) = &config.working_dir {
        recipe.working_dir = Some(dir.clone());
    }

    let mut sources: Vec<PathBuf> = STEPS_PATH.clone();
    sources.extend(config.steps.iter().cloned());

    let (graph, report) = build_graph(&recipe, &sources)?;
    let failed = print_load_report(&report);
    if failed > 0 {
        warn!("{} step document(s) could not be loaded", failed);
    }

    if config.list {
        println!("{}", graph.list_steps()?);
        return Ok(());
    }

    if config.emit_recipe {
        print!("{}", from_graph(&graph).to_yaml()?);
        return Ok(());
    }

    print_banner();

    let output = config
        .output
        .clone()
        .unwrap_or_else(|| recipe_path.with_extension(DEFAULT_EXTENSION));
    info!("Mode: {}", config.mode);
    if !config.validate {
        info!("Validation: skipped");
    }

    save(
        &graph,
        &output,
        config.mode,
        SaveOptions {
            validate: config.validate,
        },
    )?;

    println!(
        "{} {} ({} steps, {} inputs, {} outputs)",
        "Saved".green().bold(),
        output.display(),
        graph.steps().len(),
        graph.inputs().len(),
        graph.outputs().len()
    );
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("{} {}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("cwlgen")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_parse_defaults() {
        let config = parse_arguments(&args(&["recipe.yaml"])).unwrap();
        assert_eq!(config.recipe_path, Some(PathBuf::from("recipe.yaml")));
        assert_eq!(config.mode, LinkMode::Absolute);
        assert!(config.validate);
    }

    #[test]
    fn test_parse_options() {
        let config = parse_arguments(&args(&[
            "recipe.yaml",
            "-o",
            "out.cwl",
            "--mode",
            "wd",
            "--working-dir",
            "/tmp/wd",
            "--steps",
            "a",
            "--steps",
            "b",
            "--no-validate",
        ]))
        .unwrap();

        assert_eq!(config.output, Some(PathBuf::from("out.cwl")));
        assert_eq!(config.mode, LinkMode::WorkingDirectory);
        assert_eq!(config.working_dir, Some(PathBuf::from("/tmp/wd")));
        assert_eq!(config.steps, vec![PathBuf::from("a"), PathBuf::from("b")]);
        assert!(!config.validate);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_arguments(&args(&[])).is_err());
        assert!(parse_arguments(&args(&["a.yaml", "b.yaml"])).is_err());
        assert!(parse_arguments(&args(&["a.yaml", "--mode", "zip"])).is_err());
        assert!(parse_arguments(&args(&["a.yaml", "--mode"])).is_err());
        assert!(parse_arguments(&args(&["a.yaml", "--bogus"])).is_err());
    }
}
