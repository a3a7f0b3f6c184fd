// FlowLab: Provisioning and Verifying Emulated Networks
// Copyright (C) 2021  Tibor Schneider
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

use flowlab::example_scenarios::{ExampleScenario, IpRouting, SdnForwarding};
use flowlab::transcript::SectionDiff;
use flowlab::{Scenario, Transcript};
use flowlab_runtime::orchestrator::plan_scenario;
use flowlab_runtime::{
    EmulationPlatform, InstallMode, NamespacePlatform, Orchestrator, RunConfig, RunMode,
    RunReport, SimPlatform,
};
use netemu::EmulatorConfig;

use clap::{ArgEnum, Args, Parser, Subcommand};
use log::*;
use std::error::Error;
use std::fs::write;
use std::path::PathBuf;
use std::time::Duration;

mod operator;
use operator::StdinOperator;

#[derive(Parser, Debug)]
#[clap(name = "FlowLab", author = "Tibor Schneider")]
struct CommandLineArguments {
    /// Main command
    #[clap(subcommand)]
    cmd: MainCommand,
}

#[derive(Subcommand, Debug)]
enum MainCommand {
    /// Materialize a scenario, install its policy and record the transcript
    #[clap(name = "run")]
    Run {
        #[clap(flatten)]
        args: RunArgs,
        /// Scenario to run
        #[clap(subcommand)]
        scenario: ScenarioSelection,
    },
    /// Print the topology and the rendered commands without materializing anything
    #[clap(name = "show")]
    Show {
        /// Scenario to show
        #[clap(subcommand)]
        scenario: ScenarioSelection,
    },
    /// Print the scenario as JSON, such that it can be modified and loaded with `file`
    #[clap(name = "export")]
    Export {
        /// Scenario to export
        #[clap(subcommand)]
        scenario: ScenarioSelection,
    },
    /// Compare the sections of two transcripts
    #[clap(name = "diff")]
    Diff {
        /// First transcript
        before: PathBuf,
        /// Second transcript
        after: PathBuf,
        /// Also print the unchanged sections
        #[clap(short = 'a', long)]
        all: bool,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Platform on which the network is materialized
    #[clap(arg_enum, short = 'b', long, default_value = "namespaces")]
    backend: Backend,
    /// Keep the network alive after the run, until ENTER is pressed
    #[clap(short = 'i', long)]
    interactive: bool,
    /// Only print the commands of the policy, and wait until they are applied by hand
    #[clap(short = 'm', long)]
    manual: bool,
    /// Write the transcript to this file
    #[clap(short = 'o', long)]
    transcript: Option<PathBuf>,
    /// Write the run report as JSON to this file
    #[clap(long = "json")]
    json_filename: Option<PathBuf>,
    /// Milliseconds to wait after installing the policy
    #[clap(long, default_value = "2000")]
    settle_ms: u64,
    /// Number of echo requests per probe
    #[clap(short = 'c', long, default_value = "1")]
    count: u32,
    /// Seconds to wait for a single echo reply
    #[clap(long, default_value = "1")]
    probe_timeout: u64,
    /// Seconds after which a setup command or control plane call is aborted
    #[clap(long, default_value = "10")]
    command_timeout: u64,
    /// Execute the probes of one pass in parallel
    #[clap(short = 'p', long)]
    parallel: bool,
    /// Prefix of all namespaces created by the run
    #[clap(long, default_value = "flowlab")]
    ns_prefix: String,
    /// Do not use sudo (when running as root)
    #[clap(long)]
    no_sudo: bool,
}

#[derive(ArgEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Backend {
    /// Linux network namespaces and Open vSwitch bridges
    Namespaces,
    /// In-process simulation, no privileges required
    Sim,
}

#[derive(Subcommand, Debug)]
enum ScenarioSelection {
    /// One of the built-in scenarios
    #[clap(name = "example")]
    Example {
        /// Name of the scenario
        #[clap(arg_enum)]
        name: ExampleName,
    },
    /// Scenario stored as JSON
    #[clap(name = "file")]
    File {
        /// Path to the scenario
        path: PathBuf,
    },
}

#[derive(ArgEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ExampleName {
    IpRouting,
    SdnForwarding,
}

impl ScenarioSelection {
    fn load(&self) -> Result<Scenario, Box<dyn Error>> {
        Ok(match self {
            Self::Example { name: ExampleName::IpRouting } => IpRouting::scenario(),
            Self::Example { name: ExampleName::SdnForwarding } => SdnForwarding::scenario(),
            Self::File { path } => Scenario::from_file(path)?,
        })
    }
}

impl RunArgs {
    fn run_config(&self) -> RunConfig {
        RunConfig {
            mode: if self.interactive { RunMode::Interactive } else { RunMode::Batch },
            install: if self.manual { InstallMode::Manual } else { InstallMode::Automatic },
            settle: Duration::from_millis(self.settle_ms),
            probe_count: self.count,
            probe_timeout: Duration::from_secs(self.probe_timeout),
            command_timeout: Duration::from_secs(self.command_timeout),
            parallel_probes: self.parallel,
            transcript_path: self.transcript.clone(),
        }
    }

    fn emulator_config(&self) -> EmulatorConfig {
        EmulatorConfig {
            prefix: self.ns_prefix.clone(),
            sudo: !self.no_sudo,
            timeout: Duration::from_secs(self.command_timeout),
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = CommandLineArguments::parse();

    pretty_env_logger::formatted_builder()
        .filter_level(LevelFilter::Info)
        .parse_filters(&std::env::var("RUST_LOG").unwrap_or_default())
        .init();

    match args.cmd {
        MainCommand::Run { args, scenario } => {
            let scenario = scenario.load()?;
            let config = args.run_config();
            let report = match args.backend {
                Backend::Namespaces => {
                    run_on(NamespacePlatform::new(args.emulator_config()), &scenario, config)?
                }
                Backend::Sim => run_on(SimPlatform::default(), &scenario, config)?,
            };

            println!("{}", report.transcript.render());
            info!("Summary of {}:\n{}", report.scenario, report.summary());
            if !report.all_rules_applied() {
                warn!("Not all rules could be applied!");
            }

            if let Some(filename) = args.json_filename {
                info!("Writing the report to {}", filename.display());
                write(filename, report.to_json()?)?;
            }
        }
        MainCommand::Show { scenario } => {
            let plan = plan_scenario(&scenario.load()?)?;
            println!("{}", plan.render());
        }
        MainCommand::Export { scenario } => {
            println!("{}", scenario.load()?.to_json()?);
        }
        MainCommand::Diff { before, after, all } => {
            let before = Transcript::read_from(before)?;
            let after = Transcript::read_from(after)?;
            let diff = before.compare(&after);
            let changed = diff.iter().filter(|d| !matches!(d, SectionDiff::Unchanged(_))).count();
            diff.iter().for_each(|d| print_diff(d, all));
            info!("{} of {} sections differ", changed, diff.len());
        }
    }

    Ok(())
}

fn run_on<P: EmulationPlatform>(
    platform: P,
    scenario: &Scenario,
    config: RunConfig,
) -> Result<RunReport, Box<dyn Error>> {
    let mut orchestrator =
        Orchestrator::new(platform, config).with_operator(Box::new(StdinOperator::default()));
    Ok(orchestrator.run(scenario)?)
}

fn print_diff(diff: &SectionDiff, all: bool) {
    match diff {
        SectionDiff::Unchanged(title) if all => println!("=== {} ===\nunchanged\n", title),
        SectionDiff::Unchanged(_) => {}
        SectionDiff::Changed { title, before, after } => println!(
            "=== {} ===\n--- before\n{}\n+++ after\n{}\n",
            title,
            before.trim_end(),
            after.trim_end()
        ),
        SectionDiff::Added(title) => println!("=== {} ===\nonly in the second\n", title),
        SectionDiff::Removed(title) => println!("=== {} ===\nonly in the first\n", title),
    }
}
