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

//! # Orchestrator
//!
//! Drives a complete run of a scenario, from building the topology until the network is torn
//! down again.

use crate::config::{InstallMode, RunConfig, RunMode};
use crate::harness::Harness;
use crate::installer::PolicyInstaller;
use crate::platform::{ControlQuery, EmulationPlatform, LiveNetwork, NetworkHandle};
use crate::report::RunReport;
use crate::resolver::PortResolver;
use crate::RuntimeError;
use flowlab::probe::ProbePhase;
use flowlab::scenario::Experiment;
use flowlab::{InstallOutcome, PortMapping, ProbeResult, Scenario, Transcript};

use itertools::Itertools;
use log::*;
use std::fmt;
use std::thread;
use std::time::Duration;

/// Operator sitting in front of the terminal. The orchestrator hands control to the operator when
/// the run needs manual interaction.
pub trait Operator {
    /// Show the message, and block until the operator confirms.
    fn hold(&mut self, message: &str);
}

/// Operator that confirms everything immediately
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOperator;

impl Operator for NoOperator {
    fn hold(&mut self, message: &str) {
        info!("{}", message);
    }
}

/// # Orchestrator
///
/// Owns the platform and the configuration, and performs runs on them.
pub struct Orchestrator<P: EmulationPlatform> {
    platform: P,
    config: RunConfig,
    operator: Box<dyn Operator>,
}

impl<P: EmulationPlatform + fmt::Debug> fmt::Debug for Orchestrator<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("platform", &self.platform)
            .field("config", &self.config)
            .finish()
    }
}

impl<P: EmulationPlatform> Orchestrator<P> {
    /// Create a new orchestrator, without an operator.
    pub fn new(platform: P, config: RunConfig) -> Self {
        Self { platform, config, operator: Box::new(NoOperator) }
    }

    /// Use the given operator for interactive runs and manual installation.
    pub fn with_operator(mut self, operator: Box<dyn Operator>) -> Self {
        self.operator = operator;
        self
    }

    /// The platform
    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// The configuration
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// # Run a scenario
    ///
    /// 1. Build and check the topology. Configuration errors abort the run before anything is
    ///    created on the platform.
    /// 2. Materialize the network.
    /// 3. Record the baseline: the topology, the port report and rules of every switch, and all
    ///    probes.
    /// 4. If the scenario declares any policy: document the commands, resolve the port mapping of
    ///    every switch carrying policy, install the rules, wait for the network to settle, record
    ///    the rules of these switches and execute all probes again.
    /// 5. Write the transcript. In interactive mode, hold the network until the operator confirms.
    /// 6. Tear down the network.
    ///
    /// The network is torn down on every exit path. Only configuration and platform errors make the
    /// run fail. Failed rules and probes are recorded in the report.
    pub fn run(&mut self, scenario: &Scenario) -> Result<RunReport, RuntimeError> {
        info!("Building the scenario {}", scenario.name);
        let exp = scenario.build()?;
        let config = self.config.clone();
        let harness = Harness::new(config.probe_count, config.probe_timeout)
            .parallel(config.parallel_probes);

        let mut transcript = Transcript::new(exp.name.clone());
        transcript.push_section("Topology", exp.topology.summary());

        info!("Materializing the network...");
        let live = LiveNetwork::materialize(&mut self.platform, &exp.topology)?;
        let handle = live.handle();

        info!("Recording the baseline...");
        for device in exp.topology.control_plane_devices() {
            let report = query_section(handle, &device, ControlQuery::Show, &config);
            transcript.push_section(format!("{} port report (before)", device), report);
            let rules = query_section(handle, &device, ControlQuery::DumpRules, &config);
            transcript.push_section(format!("{} rules (before)", device), rules);
        }
        let baseline = harness.run_suite(handle, &exp.probes);
        record_probes(&mut transcript, &baseline, ProbePhase::Baseline);

        let mut mappings = Vec::new();
        let mut outcomes = Vec::new();
        let mut post_policy = None;
        if exp.has_policy() {
            info!("Resolving the port mappings...");
            let resolver = PortResolver::new(config.command_timeout);
            for device in policy_switches(&exp) {
                let expected = exp.topology.declared_interfaces(&device);
                let mapping = resolver.resolve(handle, &device, &expected);
                transcript.push_section(format!("Port mapping {}", device), mapping.summary());
                mappings.push(mapping);
            }

            let installer = PolicyInstaller::new(config.command_timeout);
            let plan = plan_policy(&exp, &installer, &mappings);
            transcript.push_section("Flow rule commands", command_listing(&plan));

            match config.install {
                InstallMode::Automatic => {
                    info!("Installing the policy...");
                    for policy in exp.policies.iter().filter(|p| !p.rules.is_empty()) {
                        let role = match exp.topology.node_by_name(&policy.device) {
                            Some(node) => node.role(),
                            None => continue,
                        };
                        let mapping = mappings.iter().find(|m| m.device == policy.device);
                        let result =
                            installer.install(handle, &policy.device, role, mapping, &policy.rules);
                        transcript.push_section(
                            format!("Install {}", policy.device),
                            result.iter().join("\n"),
                        );
                        outcomes.extend(result);
                    }
                }
                InstallMode::Manual => {
                    self.operator.hold(&format!(
                        "Apply the following commands, then confirm:\n{}",
                        command_listing(&plan)
                    ));
                    for (device, result) in &plan.iter().group_by(|o| o.device.clone()) {
                        let result: Vec<&InstallOutcome> = result.collect();
                        let body = result.iter().join("\n");
                        transcript.push_section(format!("Install {}", device), body);
                    }
                    outcomes.extend(plan);
                }
            }

            let settle = config.settle_delay();
            if settle > Duration::from_secs(0) {
                info!("Waiting {:?} for the network to settle...", settle);
                thread::sleep(settle);
            }

            for device in mappings.iter().map(|m| m.device.as_str()) {
                let rules = query_section(handle, device, ControlQuery::DumpRules, &config);
                transcript.push_section(format!("{} rules (after)", device), rules);
            }

            info!("Executing the probes after installing the policy...");
            let results = harness.run_suite(handle, &exp.probes);
            record_probes(&mut transcript, &results, ProbePhase::PostPolicy);
            post_policy = Some(results);
        }

        if let Some(path) = config.transcript_path.as_ref() {
            match transcript.write_to(path) {
                Ok(()) => info!("Transcript written to {}", path.display()),
                Err(e) => warn!("Cannot write the transcript to {}: {}", path.display(), e),
            }
        }

        if config.mode == RunMode::Interactive {
            self.operator.hold("The network is still running. Confirm to tear it down.");
        }

        info!("Tearing down the network...");
        live.release()?;

        Ok(RunReport { scenario: exp.name, baseline, post_policy, mappings, outcomes, transcript })
    }
}

/// Render the plan of a scenario without a network: the topology, the port mappings in
/// declaration order and all commands.
pub fn plan_scenario(scenario: &Scenario) -> Result<Transcript, RuntimeError> {
    let exp = scenario.build()?;
    let mut transcript = Transcript::new(format!("{} (plan)", exp.name));
    transcript.push_section("Topology", exp.topology.summary());

    let mappings: Vec<PortMapping> = policy_switches(&exp)
        .into_iter()
        .map(|device| {
            let expected = exp.topology.declared_interfaces(&device);
            PortMapping::identity(device, &expected)
        })
        .collect();
    for mapping in mappings.iter() {
        transcript.push_section(format!("Port mapping {}", mapping.device), mapping.summary());
    }

    let installer = PolicyInstaller::new(RunConfig::default().command_timeout);
    let plan = plan_policy(&exp, &installer, &mappings);
    transcript.push_section("Flow rule commands", command_listing(&plan));
    let probes = exp.probes.iter().map(|p| p.to_string()).join("\n");
    transcript.push_section("Probes", probes);
    Ok(transcript)
}

/// All switches that carry rules, in declaration order
fn policy_switches(exp: &Experiment) -> Vec<String> {
    exp.topology
        .control_plane_devices()
        .into_iter()
        .filter(|d| exp.policies.iter().any(|p| &p.device == d && p.needs_port_mapping()))
        .collect()
}

fn plan_policy(
    exp: &Experiment,
    installer: &PolicyInstaller,
    mappings: &[PortMapping],
) -> Vec<InstallOutcome> {
    let mut plan = Vec::new();
    for policy in exp.policies.iter() {
        if let Some(node) = exp.topology.node_by_name(&policy.device) {
            let mapping = mappings.iter().find(|m| m.device == policy.device);
            plan.extend(installer.plan(&policy.device, node.role(), mapping, &policy.rules));
        }
    }
    plan
}

fn command_listing(plan: &[InstallOutcome]) -> String {
    plan.iter()
        .map(|o| match &o.rendered {
            Some(rendered) => rendered.operator_command(&o.device),
            None => format!("# skipped on {} ({}): {}", o.device, o.rule, o.status),
        })
        .join("\n")
}

fn query_section<H: NetworkHandle + ?Sized>(
    handle: &H,
    device: &str,
    query: ControlQuery,
    config: &RunConfig,
) -> String {
    match handle.query(device, query, config.command_timeout) {
        Ok(report) => report,
        Err(e) => {
            warn!("Cannot query {}: {}", device, e);
            format!("unavailable: {}", e)
        }
    }
}

fn record_probes(transcript: &mut Transcript, results: &[ProbeResult], phase: ProbePhase) {
    for result in results {
        info!("{} ({})", result, phase.label());
        transcript.push_section(result.title(phase), &result.output);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::platform::PlatformError;
    use crate::sim_platform::*;
    use flowlab::example_scenarios::*;
    use flowlab::{ConfigError, DevicePolicy, PolicyRule, RuleStatus};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn config() -> RunConfig {
        RunConfig { settle: Duration::from_secs(0), ..Default::default() }
    }

    fn sim(options: SimOptions) -> Orchestrator<SimPlatform> {
        Orchestrator::new(SimPlatform::new(options), config())
    }

    #[derive(Debug, Clone, Default)]
    struct Recorder(Rc<RefCell<Vec<String>>>);

    impl Operator for Recorder {
        fn hold(&mut self, message: &str) {
            self.0.borrow_mut().push(message.to_string());
        }
    }

    #[test]
    fn routing_scenario() {
        let mut orch = sim(SimOptions::default());
        let report = orch.run(&IpRouting::scenario()).unwrap();
        assert!(!report.baseline[0].success);
        assert!(report.baseline.iter().all(|r| !r.success));
        let post = report.post_policy.as_ref().unwrap();
        assert!(post[0].success);
        assert!(post.iter().all(|r| r.success));
        assert!(report.mappings.is_empty());
        assert_eq!(report.outcomes.len(), 6);
        assert!(report.all_rules_applied());

        let t = &report.transcript;
        assert!(t.section("Ping h1 -> 10.0.2.2 (before)").unwrap().body.contains("unreachable"));
        let after = &t.section("Ping h1 -> 10.0.2.2 (after)").unwrap().body;
        assert!(after.contains(", 0% packet loss"));
        let commands = &t.section("Flow rule commands").unwrap().body;
        assert!(commands.contains("r2 ip route add 10.0.3.0/24 via 10.0.1.1"));
        assert_eq!(orch.platform().live(), 0);
    }

    #[test]
    fn sdn_scenario() {
        let mut orch = sim(SimOptions::default());
        let report = orch.run(&SdnForwarding::scenario()).unwrap();
        assert!(report.baseline.iter().all(|r| r.success));
        let post = report.post_policy.as_ref().unwrap();
        assert_eq!(post[0].source, "h1");
        assert!(post[0].success);
        assert_eq!(post[1].source, "h2");
        assert!(!post[1].success);

        assert_eq!(report.mappings.len(), 1);
        assert!(!report.mappings[0].degraded);
        assert!(report.outcomes.iter().all(|o| o.status == RuleStatus::Installed));
        assert_eq!(
            report.transcript.titles(),
            vec![
                "Topology",
                "s1 port report (before)",
                "s1 rules (before)",
                "s2 port report (before)",
                "s2 rules (before)",
                "Ping h1 -> 10.0.0.3 (before)",
                "Ping h2 -> 10.0.0.3 (before)",
                "Port mapping s1",
                "Flow rule commands",
                "Install s1",
                "s1 rules (after)",
                "Ping h1 -> 10.0.0.3 (after)",
                "Ping h2 -> 10.0.0.3 (after)",
            ]
        );
        let rules = &report.transcript.section("s1 rules (after)").unwrap().body;
        assert!(rules.contains("priority=100,in_port=2 actions=drop"));
        assert_eq!(orch.platform().live(), 0);
    }

    #[test]
    fn split_device_policy() {
        let mut scenario = SdnForwarding::scenario();
        scenario.policy = vec![
            DevicePolicy::new("s1", vec![PolicyRule::drop_from(10, "s1-eth2")]),
            DevicePolicy::new("s1", vec![PolicyRule::forward(200, "s1-eth1", "s1-eth3")]),
        ];
        let report = sim(SimOptions::default()).run(&scenario).unwrap();
        let priorities: Vec<u16> = report.outcomes.iter().map(|o| o.rule.priority).collect();
        assert_eq!(priorities, vec![200, 10]);
        let titles = report.transcript.titles();
        assert_eq!(titles.iter().filter(|t| **t == "Install s1").count(), 1);
        assert_eq!(titles.iter().filter(|t| **t == "Port mapping s1").count(), 1);
        assert!(!report.post_policy.unwrap()[1].success);
    }

    #[test]
    fn baseline_only() {
        let mut scenario = SdnForwarding::scenario();
        scenario.policy.clear();
        scenario.probes.clear();
        let mut orch = sim(SimOptions::default());
        let report = orch.run(&scenario).unwrap();
        assert!(report.post_policy.is_none());
        assert!(report.outcomes.is_empty());
        assert_eq!(
            report.transcript.titles(),
            vec![
                "Topology",
                "s1 port report (before)",
                "s1 rules (before)",
                "s2 port report (before)",
                "s2 rules (before)",
            ]
        );
        assert_eq!(orch.platform().materialized(), 1);
        assert_eq!(orch.platform().torn_down(), 1);
    }

    #[test]
    fn reinstall_is_stable() {
        let exp = SdnForwarding::scenario().build().unwrap();
        let mut platform = SimPlatform::default();
        let live = LiveNetwork::materialize(&mut platform, &exp.topology).unwrap();
        let handle = live.handle();
        let t = Duration::from_secs(1);
        let expected = exp.topology.declared_interfaces("s1");
        let mapping = PortResolver::new(t).resolve(handle, "s1", &expected);
        let installer = PolicyInstaller::new(t);
        let harness = Harness::new(1, t);
        let rules = &exp.policies[0].rules;
        let switch = flowlab::NodeRole::Switch;

        let first = installer.install(handle, "s1", switch, Some(&mapping), rules);
        let probes = harness.run_suite(handle, &exp.probes);
        let second = installer.install(handle, "s1", switch, Some(&mapping), rules);
        assert_eq!(first, second);
        assert_eq!(harness.run_suite(handle, &exp.probes), probes);
        let dump = handle.query("s1", ControlQuery::DumpRules, t).unwrap();
        assert_eq!(dump.lines().count(), 4);
        live.release().unwrap();
        assert_eq!(platform.live(), 0);
    }

    #[test]
    fn shifted_ports() {
        let options =
            SimOptions { layout: ReportLayout::Tabular, port_offset: 5, ..Default::default() };
        let report = sim(options).run(&SdnForwarding::scenario()).unwrap();
        assert_eq!(report.mappings[0].port("s1-eth2"), Some(7));
        let post = report.post_policy.unwrap();
        assert!(post[0].success);
        assert!(!post[1].success);
    }

    #[test]
    fn degraded_mapping_is_not_fatal() {
        let options =
            SimOptions { layout: ReportLayout::Garbage, port_offset: 5, ..Default::default() };
        let report = sim(options).run(&SdnForwarding::scenario()).unwrap();
        assert!(report.mappings[0].degraded);
        assert!(report.summary().contains("degraded port mappings: s1"));
        // the rules use the declaration order, which does not match the real ports
        assert!(report.outcomes.iter().all(|o| o.status == RuleStatus::Installed));
        assert!(report.post_policy.unwrap().iter().all(|r| r.success));
    }

    #[test]
    fn unresponsive_control_plane() {
        let options = SimOptions { unresponsive: vec!["s1".to_string()], ..Default::default() };
        let mut orch = sim(options);
        let report = orch.run(&SdnForwarding::scenario()).unwrap();
        assert!(report.mappings[0].degraded);
        assert!(report.outcomes.iter().all(|o| matches!(o.status, RuleStatus::Failed { .. })));
        let body = &report.transcript.section("s1 port report (before)").unwrap().body;
        assert!(body.starts_with("unavailable:"));
        assert!(!report.all_rules_applied());
        assert_eq!(orch.platform().live(), 0);
    }

    #[test]
    fn fatal_errors() {
        let mut orch = sim(SimOptions { fail_materialize: true, ..Default::default() });
        let err = orch.run(&SdnForwarding::scenario()).unwrap_err();
        assert!(matches!(err, RuntimeError::Platform(PlatformError::Materialize(_))));

        let mut scenario = SdnForwarding::scenario();
        scenario.nodes[0].name = "h 1".to_string();
        let mut orch = sim(SimOptions::default());
        let err = orch.run(&scenario).unwrap_err();
        assert!(matches!(err, RuntimeError::Config(ConfigError::InvalidNodeName(_))));
        assert_eq!(orch.platform().materialized(), 0);
    }

    #[test]
    fn teardown_when_a_phase_fails() {
        fn failing_phase(platform: &mut SimPlatform) -> Result<(), PlatformError> {
            let exp = SdnForwarding::scenario().build().unwrap();
            let live = LiveNetwork::materialize(platform, &exp.topology)?;
            live.handle().query("h1", ControlQuery::Show, Duration::from_secs(1))?;
            live.release()
        }
        let mut platform = SimPlatform::default();
        assert!(matches!(failing_phase(&mut platform), Err(PlatformError::NoControlPlane(_))));
        assert_eq!(platform.materialized(), 1);
        assert_eq!(platform.live(), 0);
    }

    #[test]
    fn manual_installation() {
        let recorder = Recorder::default();
        let config = RunConfig { install: InstallMode::Manual, ..config() };
        let mut orch = Orchestrator::new(SimPlatform::default(), config)
            .with_operator(Box::new(recorder.clone()));
        let report = orch.run(&SdnForwarding::scenario()).unwrap();
        assert!(report.outcomes.iter().all(|o| o.status == RuleStatus::Delegated));
        // nobody applied the rules
        assert!(report.post_policy.unwrap().iter().all(|r| r.success));
        let messages = recorder.0.borrow();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("add-flow s1 \"priority=100,in_port=2,actions=drop\""));
    }

    #[test]
    fn interactive_hold() {
        let recorder = Recorder::default();
        let config = RunConfig { mode: RunMode::Interactive, ..config() };
        let mut orch = Orchestrator::new(SimPlatform::default(), config)
            .with_operator(Box::new(recorder.clone()));
        orch.run(&IpRouting::scenario()).unwrap();
        assert_eq!(recorder.0.borrow().len(), 1);
        assert_eq!(orch.platform().live(), 0);
    }

    #[test]
    fn transcript_file() {
        let path = std::env::temp_dir().join(format!("flowlab-test-{}.txt", std::process::id()));
        let config = RunConfig { transcript_path: Some(path.clone()), ..config() };
        let report = Orchestrator::new(SimPlatform::default(), config)
            .run(&SdnForwarding::scenario())
            .unwrap();
        let written = Transcript::read_from(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(written, report.transcript);
    }

    #[test]
    fn plan_without_network() {
        let plan = plan_scenario(&SdnForwarding::scenario()).unwrap();
        assert_eq!(
            plan.titles(),
            vec!["Topology", "Port mapping s1", "Flow rule commands", "Probes"]
        );
        assert_eq!(
            plan.section("Flow rule commands").unwrap().body,
            "ovs-ofctl -O OpenFlow13 add-flow s1 \"priority=100,in_port=2,actions=drop\"\n\
             ovs-ofctl -O OpenFlow13 add-flow s1 \"priority=100,in_port=1,actions=output:3\""
        );
    }
}
