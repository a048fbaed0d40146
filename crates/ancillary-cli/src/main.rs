use anyhow::Result;
use clap::{Arg, ArgAction, ArgMatches, Command, ValueHint};
use log::LevelFilter;
use std::path::PathBuf;

use ancillary_cli::input::{EvaluateConfig, RunConfig};
use ancillary_cli::run::{run_evaluation, run_pipeline};

fn main() -> Result<()> {
    env_logger::Builder::default()
        .filter_level(LevelFilter::Error)
        .parse_env(env_logger::Env::default().filter_or("ANCILLARY_LOG", "error,ancillary=info"))
        .init();

    let matches = Command::new("ancillary")
        .version(clap::crate_version!())
        .about("Ancillary preference classifier: train, evaluate and explain")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("run")
                .about("Encode bookings, train the network, evaluate it and write all artifacts")
                .arg(
                    Arg::new("config")
                        .help("Path to the JSON run configuration. Defaults are used when omitted.")
                        .required(false)
                        .value_parser(clap::value_parser!(PathBuf))
                        .value_hint(ValueHint::FilePath),
                )
                .arg(
                    Arg::new("data")
                        .short('d')
                        .long("data")
                        .value_parser(clap::builder::NonEmptyStringValueParser::new())
                        .help(
                            "Path to the booking table (*.csv or *.tsv). Overrides the data file \
                             specified in the configuration file.",
                        )
                        .value_hint(ValueHint::FilePath),
                )
                .arg(
                    Arg::new("output_dir")
                        .short('o')
                        .long("output_dir")
                        .value_parser(clap::builder::NonEmptyStringValueParser::new())
                        .help("Directory the artifacts are written to.")
                        .value_hint(ValueHint::DirPath),
                )
                .arg(
                    Arg::new("epochs")
                        .long("epochs")
                        .value_parser(clap::value_parser!(usize))
                        .help("Maximum number of training epochs."),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .value_parser(clap::value_parser!(u64))
                        .help("Seed for the train/test split and network training."),
                )
                .arg(
                    Arg::new("no_plots")
                        .long("no-plots")
                        .help("Do not write standalone plotly HTML charts.")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("no_report")
                        .long("no-report")
                        .help("Disable HTML report generation.")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("evaluate")
                .about("Re-evaluate a saved model on its saved test split")
                .arg(
                    Arg::new("artifacts_dir")
                        .help("Directory holding nn_model.json, nn_x_test.csv and nn_y_test.csv")
                        .required(true)
                        .value_parser(clap::value_parser!(PathBuf))
                        .value_hint(ValueHint::DirPath),
                )
                .arg(
                    Arg::new("output_dir")
                        .short('o')
                        .long("output_dir")
                        .help("Where to write nn_results.csv and nn_roc.json. Defaults to the artifacts directory.")
                        .value_parser(clap::value_parser!(PathBuf))
                        .value_hint(ValueHint::DirPath),
                )
                .arg(
                    Arg::new("headline_class")
                        .long("headline-class")
                        .help("Class whose precision and recall go into the results table.")
                        .value_parser(clap::value_parser!(usize)),
                ),
        )
        .help_template(
            "{usage-heading} {usage}\n\n\
             {about-with-newline}\n\
             Version {version}\n\n\
             {all-args}{after-help}",
        )
        .get_matches();

    match matches.subcommand() {
        Some(("run", sub_m)) => handle_run(sub_m),
        Some(("evaluate", sub_m)) => handle_evaluate(sub_m),
        _ => unreachable!("Subcommand is required by CLI configuration"),
    }
}

fn handle_run(matches: &ArgMatches) -> Result<()> {
    let config_path: Option<&PathBuf> = matches.get_one("config");
    log::info!("[Ancillary::Run] Using config: {:?}", config_path);
    let config = RunConfig::from_arguments(config_path, matches)?;
    match run_pipeline(&config) {
        Ok(outcome) => {
            let r = &outcome.results;
            log::info!(
                "Test accuracy {:.4}, balanced accuracy {:.4}, precision {:.4}, recall {:.4}",
                r.accuracy,
                r.balanced_accuracy,
                r.precision,
                r.recall
            );
            Ok(())
        }
        Err(e) => {
            log::error!("Run failed: {:#}", e);
            std::process::exit(1)
        }
    }
}

fn handle_evaluate(matches: &ArgMatches) -> Result<()> {
    let config = EvaluateConfig::from_arguments(matches)?;
    log::info!(
        "[Ancillary::Evaluate] Artifacts: {}",
        config.artifacts_dir.display()
    );
    match run_evaluation(&config) {
        Ok(_) => Ok(()),
        Err(e) => {
            log::error!("Evaluation failed: {:#}", e);
            std::process::exit(1)
        }
    }
}
