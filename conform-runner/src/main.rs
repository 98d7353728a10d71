//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

mod config;
mod scenarios;

use std::process::ExitCode;

use clap::{App, Arg};
use config::{Config, LoggingFileRotation, LoggingFmtStyle};
use conform_harness::TestOrchestrator;
use conform_sim::SimNetwork;
use scenarios::Scenario;
use tracing::level_filters::LevelFilter;
use tracing::{error, info, warn};
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, Layer};
use tracing_subscriber::prelude::*;

fn init_tracing(config: &config::Logging) {
    // Enable logging to a file.
    let file = config.file.enabled.then(|| {
        let file_appender = match config.file.rotation {
            LoggingFileRotation::Never => {
                rolling::never(&config.file.dir, &config.file.name)
            }
            LoggingFileRotation::Hourly => {
                rolling::hourly(&config.file.dir, &config.file.name)
            }
            LoggingFileRotation::Daily => {
                rolling::daily(&config.file.dir, &config.file.name)
            }
        };

        let log_level_filter = LevelFilter::from_level(tracing::Level::TRACE);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(false)
            .with_thread_ids(config.file.fmt.show_thread_id)
            .with_file(config.file.fmt.show_source)
            .with_line_number(config.file.fmt.show_source)
            .with_ansi(config.file.fmt.colors);
        let layer = match config.file.fmt.style {
            LoggingFmtStyle::Compact => layer.compact().boxed(),
            LoggingFmtStyle::Full => layer.boxed(),
            LoggingFmtStyle::Json => layer.json().boxed(),
            LoggingFmtStyle::Pretty => layer.pretty().boxed(),
        };
        layer.with_filter(log_level_filter)
    });

    // Enable logging to stdout.
    let stdout = config.stdout.enabled.then(|| {
        let log_level_filter = LevelFilter::from_level(tracing::Level::TRACE);
        let layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(config.stdout.fmt.show_thread_id)
            .with_file(config.stdout.fmt.show_source)
            .with_line_number(config.stdout.fmt.show_source)
            .with_ansi(config.stdout.fmt.colors);
        let layer = match config.stdout.fmt.style {
            LoggingFmtStyle::Compact => layer.compact().boxed(),
            LoggingFmtStyle::Full => layer.boxed(),
            LoggingFmtStyle::Json => layer.json().boxed(),
            LoggingFmtStyle::Pretty => layer.pretty().boxed(),
        };
        layer.with_filter(log_level_filter)
    });

    // RUST_LOG takes precedence over the default directive.
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("conform=info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(file)
        .with(stdout)
        .init();
}

// Runs the selected scenarios and returns whether all test cases passed.
async fn run(config: &Config, scenarios: &[Scenario]) -> bool {
    let network = SimNetwork::new(config.emulator.sim_config());
    let mut orchestrator = TestOrchestrator::new(
        network.device("dut"),
        network.generator("ate"),
        config.harness.clone(),
    );

    let mut passed = true;
    for scenario in scenarios {
        match scenario.run(&mut orchestrator, &config.scenario).await {
            Ok(outcomes) => {
                for outcome in outcomes {
                    let case = &outcome.name;
                    if outcome.is_pass() {
                        let duration = outcome.duration;
                        info!(%scenario, %case, ?duration, "PASS");
                    } else {
                        let failures = &outcome.failures;
                        warn!(%scenario, %case, %failures, "FAIL");
                        passed = false;
                    }
                }
            }
            Err(error) => {
                error.log();
                error!(%scenario, "scenario aborted");
                passed = false;
            }
        }
    }
    passed
}

// ===== main =====

fn main() -> ExitCode {
    // Parse command-line parameters.
    let matches = App::new("Conformance scenario runner")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("file")
                .help("Specify an alternative configuration file."),
        )
        .arg(
            Arg::with_name("scenario")
                .short("s")
                .long("scenario")
                .value_name("name")
                .multiple(true)
                .number_of_values(1)
                .possible_values(&Scenario::NAMES)
                .help("Run only the given scenario (default: all)."),
        )
        .arg(
            Arg::with_name("list")
                .short("l")
                .long("list")
                .help("List the available scenarios and exit."),
        )
        .get_matches();

    if matches.is_present("list") {
        for scenario in Scenario::ALL {
            println!("{:<20} {}", scenario.name(), scenario.description());
        }
        return ExitCode::SUCCESS;
    }

    // Read configuration file.
    let config_file = matches.value_of("config");
    let config = match Config::load(config_file) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("Failed to parse configuration file: {error}");
            return ExitCode::FAILURE;
        }
    };

    // Select scenarios. Names were validated by clap.
    let scenarios = match matches.values_of("scenario") {
        Some(names) => names.filter_map(Scenario::from_name).collect(),
        None => Scenario::ALL.to_vec(),
    };

    // Initialize tracing.
    init_tracing(&config.logging);

    info!("starting up");

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(error) => {
            error!(%error, "failed to create async runtime");
            return ExitCode::FAILURE;
        }
    };
    let passed = runtime.block_on(run(&config, &scenarios));

    info!(%passed, "exiting");
    if passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
