//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

#![allow(clippy::derivable_impls)]

use std::time::Duration;

use conform_harness::HarnessConfig;
use conform_sim::SimConfig;
use serde::Deserialize;
use serde_with::{DurationMilliSeconds, serde_as};

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub logging: Logging,
    pub harness: HarnessConfig,
    pub emulator: Emulator,
    pub scenario: Scenario,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Logging {
    pub file: LoggingFile,
    pub stdout: LoggingStdout,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingFile {
    pub enabled: bool,
    pub dir: String,
    pub name: String,
    pub rotation: LoggingFileRotation,
    #[serde(flatten)]
    pub fmt: LoggingFmt,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingStdout {
    pub enabled: bool,
    #[serde(flatten)]
    pub fmt: LoggingFmt,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingFmt {
    pub style: LoggingFmtStyle,
    pub colors: bool,
    pub show_thread_id: bool,
    pub show_source: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingFileRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingFmtStyle {
    Compact,
    Full,
    Json,
    Pretty,
}

// Emulated network the scenarios run against.
#[serde_as]
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Emulator {
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub bgp_delay: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub tick: Duration,
    pub loss_ratio: f64,
    pub subscriptions: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Scenario {
    pub packet_count: u64,
    pub rate_pps: u64,
    // Vendor CLI snippets pushed to the device before the ACL scenario.
    pub vendor_cli: Vec<String>,
}

// ===== impl Config =====

impl Config {
    const DFLT_FILEPATH: &'static str = "/etc/conform.toml";

    pub(crate) fn load(
        config_file: Option<&str>,
    ) -> Result<Config, toml::de::Error> {
        let config_file = config_file.unwrap_or(Config::DFLT_FILEPATH);

        match std::fs::read_to_string(config_file) {
            Ok(config_str) => toml::from_str(&config_str),
            Err(err) => {
                eprintln!("Failed to load configuration file: {err}");
                eprintln!("Falling back to default configuration...");
                Ok(Config::default())
            }
        }
    }
}

// ===== impl LoggingFile =====

impl Default for LoggingFile {
    fn default() -> LoggingFile {
        LoggingFile {
            enabled: false,
            dir: "/var/log".to_owned(),
            name: "conform.log".to_owned(),
            rotation: Default::default(),
            fmt: Default::default(),
        }
    }
}

// ===== impl LoggingStdout =====

impl Default for LoggingStdout {
    fn default() -> LoggingStdout {
        LoggingStdout {
            enabled: true,
            fmt: LoggingFmt {
                style: LoggingFmtStyle::Compact,
                colors: true,
                ..Default::default()
            },
        }
    }
}

// ===== impl LoggingFmt =====

impl Default for LoggingFmt {
    fn default() -> LoggingFmt {
        LoggingFmt {
            style: LoggingFmtStyle::Full,
            colors: false,
            show_thread_id: false,
            show_source: false,
        }
    }
}

// ===== impl Emulator =====

impl Emulator {
    pub(crate) fn sim_config(&self) -> SimConfig {
        SimConfig {
            bgp_delay: self.bgp_delay,
            tick: self.tick,
            loss_ratio: self.loss_ratio,
            subscriptions: self.subscriptions,
        }
    }
}

impl Default for Emulator {
    fn default() -> Emulator {
        let sim = SimConfig::default();
        Emulator {
            bgp_delay: sim.bgp_delay,
            tick: sim.tick,
            loss_ratio: sim.loss_ratio,
            subscriptions: sim.subscriptions,
        }
    }
}

// ===== impl Scenario =====

impl Default for Scenario {
    fn default() -> Scenario {
        Scenario {
            packet_count: 10000,
            rate_pps: 1000,
            vendor_cli: Default::default(),
        }
    }
}
