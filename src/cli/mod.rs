//! Command-line interface for the survey tools.

use clap::{Parser, Subcommand};
use chrono::NaiveDateTime;
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::core::loaders::parse_timestamp;
use crate::core::transforms::ResampleRule;
use crate::processors::{absolute, shift, stations};
use crate::processors::{GeoAnchor, ShiftEvent};
use crate::SurveyConfig;

#[derive(Parser)]
#[command(name = "theo-survey")]
#[command(about = "Theodolite and GPS survey post-processing", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Anchor a relative easting/northing series to an absolute lat/lon
    Absolutize {
        /// Relative coordinate CSV
        input: PathBuf,
        /// Output CSV with lon/lat/easting/northing
        output: PathBuf,
        /// Latitude and longitude of the GPS marker
        #[arg(long, num_args = 2, value_names = ["LAT", "LON"], allow_negative_numbers = true, required = true)]
        latlon: Vec<f64>,
        /// Epoch for the elapsed-hours index (defaults to the configured epoch)
        #[arg(long, value_parser = parse_time_arg)]
        epoch: Option<NaiveDateTime>,
    },

    /// Remove the re-leveling shift from a target series
    FixShift {
        /// Raw series CSV
        input: PathBuf,
        /// Corrected output CSV
        output: PathBuf,
        /// Start of the pre-shift rate window
        #[arg(long, value_parser = parse_time_arg)]
        avg_date: Option<NaiveDateTime>,
        /// Last sample before the shift
        #[arg(long, value_parser = parse_time_arg)]
        before_shift: Option<NaiveDateTime>,
        /// First sample after the shift
        #[arg(long, value_parser = parse_time_arg)]
        after_shift: Option<NaiveDateTime>,
    },

    /// Process raw theodolite files into per-station CSVs and plots
    Process {
        /// Raw theodolite CSV files, one per target
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Fixed reference target subtracted from every station
        #[arg(long)]
        reference_file: Option<PathBuf>,
        /// Resampling interval used with a reference file (e.g. 5Min, 30S, 1H)
        #[arg(long)]
        resample_rule: Option<String>,
        /// Directory for station CSVs and plots
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
        /// Skip rendering plots
        #[arg(long)]
        no_plots: bool,
    },

    /// Write the effective configuration as YAML
    DumpConfig {
        /// Output YAML file
        output: PathBuf,
    },
}

fn parse_time_arg(value: &str) -> Result<NaiveDateTime, String> {
    parse_timestamp(value).ok_or_else(|| format!("invalid timestamp '{}'", value))
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 39 {
            format!("{}...", value.chars().take(36).collect::<String>())
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<39} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

pub fn run() {
    let cli = Cli::parse();

    // Logging first so config loading can report
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    let config = match &cli.config {
        Some(path) => match SurveyConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("Failed to load config from {}: {}, using defaults", path.display(), e);
                SurveyConfig::default()
            }
        },
        None => SurveyConfig::default(),
    };

    match cli.command {
        Commands::Absolutize { input, output, latlon, epoch } => {
            cmd_absolutize(&input, &output, &latlon, epoch, &config);
        }
        Commands::FixShift { input, output, avg_date, before_shift, after_shift } => {
            cmd_fix_shift(&input, &output, avg_date, before_shift, after_shift, &config);
        }
        Commands::Process { files, reference_file, resample_rule, output_dir, no_plots } => {
            cmd_process(
                &files,
                reference_file.as_deref(),
                resample_rule.as_deref(),
                &output_dir,
                no_plots,
                &config,
            );
        }
        Commands::DumpConfig { output } => {
            cmd_dump_config(&output, &config);
        }
    }
}

fn cmd_absolutize(
    input: &Path,
    output: &Path,
    latlon: &[f64],
    epoch: Option<NaiveDateTime>,
    config: &SurveyConfig,
) {
    let start = Instant::now();

    let anchor = match GeoAnchor::new(latlon[0], latlon[1]) {
        Ok(anchor) => anchor,
        Err(e) => {
            error!("Invalid anchor: {}", e);
            std::process::exit(1);
        }
    };
    let epoch = epoch.unwrap_or(config.absolute.epoch);

    println!("Absolutizing coordinates...");
    println!("Input: {}", input.display());
    println!("Output: {}", output.display());

    let spinner = create_spinner("Projecting anchor and shifting coordinates...");

    match absolute::absolutize_file(input, output, anchor, epoch, config) {
        Ok(summary) => {
            spinner.finish_and_clear();

            print_summary(
                "Absolutize Complete",
                &[
                    ("Input file", input.display().to_string()),
                    ("Output file", output.display().to_string()),
                    ("Anchor lat/lon", format!("{}, {}", anchor.lat, anchor.lon)),
                    ("Anchor x/y [m]", format!("{:.3}, {:.3}", summary.anchor_x, summary.anchor_y)),
                    ("Rows read", summary.rows_in.to_string()),
                    ("Rows written", summary.rows_out.to_string()),
                    ("Duration", format!("{:.2?}", start.elapsed())),
                ],
            );
        }
        Err(e) => {
            spinner.finish_and_clear();
            error!("Absolutize failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn cmd_fix_shift(
    input: &Path,
    output: &Path,
    avg_date: Option<NaiveDateTime>,
    before_shift: Option<NaiveDateTime>,
    after_shift: Option<NaiveDateTime>,
    config: &SurveyConfig,
) {
    let start = Instant::now();

    // Unset dates fall back to the configured event
    let event = match ShiftEvent::new(
        avg_date.unwrap_or(config.shift.avg_date),
        before_shift.unwrap_or(config.shift.before_shift),
        after_shift.unwrap_or(config.shift.after_shift),
    ) {
        Ok(event) => event,
        Err(e) => {
            error!("Invalid shift dates: {}", e);
            std::process::exit(1);
        }
    };

    println!("Correcting re-leveling shift...");
    println!("Input: {}", input.display());
    println!("Output: {}", output.display());
    println!("  avg_date:     {}", event.avg_date);
    println!("  before_shift: {}", event.before_shift);
    println!("  after_shift:  {}", event.after_shift);

    let spinner = create_spinner("Computing shift correction...");

    match shift::fix_shift_file(input, output, &event, &config.shift.columns) {
        Ok(summary) => {
            spinner.finish_and_clear();

            let mut items = vec![
                ("Input file", input.display().to_string()),
                ("Output file", output.display().to_string()),
                ("Rows", summary.rows.to_string()),
                ("Rows corrected", summary.rows_corrected.to_string()),
            ];
            for correction in &summary.corrections {
                items.push((correction.column.as_str(), format!("{:+.4} m", correction.offset())));
            }
            items.push(("Duration", format!("{:.2?}", start.elapsed())));

            print_summary("Shift Correction Complete", &items);
        }
        Err(e) => {
            spinner.finish_and_clear();
            error!("Shift correction failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn cmd_process(
    files: &[PathBuf],
    reference_file: Option<&Path>,
    resample_rule: Option<&str>,
    output_dir: &Path,
    no_plots: bool,
    config: &SurveyConfig,
) {
    use crate::visualization;

    let start = Instant::now();

    let rule_text = resample_rule.unwrap_or(&config.stations.resample_rule);
    let rule: ResampleRule = match rule_text.parse() {
        Ok(rule) => rule,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    println!("Processing theodolite files...");
    println!("Files: {}", files.len());
    println!("Output directory: {}", output_dir.display());
    if let Some(reference) = reference_file {
        println!("Reference: {} (resampled to {})", reference.display(), rule);
    }

    let spinner = create_spinner("Reading stations...");

    let set = match stations::create_station_set(files, reference_file, rule, config, output_dir) {
        Ok(set) => set,
        Err(e) => {
            spinner.finish_and_clear();
            error!("Processing failed: {:#}", e);
            std::process::exit(1);
        }
    };

    let plots = if no_plots {
        Vec::new()
    } else {
        spinner.set_message("Rendering plots...");
        match visualization::render_all(&set, output_dir, config) {
            Ok(plots) => plots,
            Err(e) => {
                spinner.finish_and_clear();
                error!("Plotting failed: {}", e);
                std::process::exit(1);
            }
        }
    };

    spinner.finish_and_clear();

    let keys: Vec<&str> = set.keys().map(String::as_str).collect();
    print_summary(
        "Station Processing Complete",
        &[
            ("Stations", keys.join(", ")),
            ("Reference", reference_file.map_or("none".to_string(), |p| p.display().to_string())),
            ("Resample rule", rule.to_string()),
            ("Output directory", output_dir.display().to_string()),
            ("Plots written", plots.len().to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
}

fn cmd_dump_config(output: &Path, config: &SurveyConfig) {
    match config.to_yaml(output) {
        Ok(()) => println!("Wrote config to {}", output.display()),
        Err(e) => {
            error!("Failed to write config: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_absolutize() {
        let cli = Cli::try_parse_from([
            "theo-survey",
            "absolutize",
            "in.csv",
            "out.csv",
            "--latlon",
            "61.2",
            "-146.9",
        ])
        .unwrap();
        match cli.command {
            Commands::Absolutize { latlon, epoch, .. } => {
                assert_eq!(latlon, vec![61.2, -146.9]);
                assert!(epoch.is_none());
            }
            _ => panic!("Expected absolutize"),
        }
    }

    #[test]
    fn test_parse_fix_shift_dates() {
        let cli = Cli::try_parse_from([
            "theo-survey",
            "-vv",
            "fix-shift",
            "in.csv",
            "out.csv",
            "--before-shift",
            "2013-06-27 03:04:17",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::FixShift { avg_date, before_shift, .. } => {
                assert!(avg_date.is_none());
                assert_eq!(before_shift, parse_timestamp("2013-06-27 03:04:17"));
            }
            _ => panic!("Expected fix-shift"),
        }

        assert!(Cli::try_parse_from([
            "theo-survey",
            "fix-shift",
            "in.csv",
            "out.csv",
            "--avg-date",
            "yesterday",
        ])
        .is_err());
    }

    #[test]
    fn test_parse_process() {
        let cli = Cli::try_parse_from([
            "theo-survey",
            "process",
            "a.csv",
            "b.csv",
            "--reference-file",
            "rock.csv",
            "--config",
            "survey.yaml",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("survey.yaml")));
        match cli.command {
            Commands::Process { files, reference_file, resample_rule, output_dir, no_plots } => {
                assert_eq!(files.len(), 2);
                assert_eq!(reference_file, Some(PathBuf::from("rock.csv")));
                assert!(resample_rule.is_none());
                assert_eq!(output_dir, PathBuf::from("."));
                assert!(!no_plots);
            }
            _ => panic!("Expected process"),
        }

        assert!(Cli::try_parse_from(["theo-survey", "process"]).is_err());
    }
}
