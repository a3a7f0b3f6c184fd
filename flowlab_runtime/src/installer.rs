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

//! # Policy Installer
//!
//! Installs the rules of a single device. Every rule is attempted exactly once, in the order of
//! descending priority. A rule that cannot be rendered, is rejected or times out only affects its
//! own outcome, and the remaining rules are still submitted.

use crate::platform::NetworkHandle;
use flowlab::policy::{submission_order, RenderedRule};
use flowlab::{InstallOutcome, NodeRole, PolicyRule, PortMapping, RuleStatus};

use log::*;
use std::time::Duration;

/// Installs policy rules through the platform
#[derive(Debug, Clone, Copy)]
pub struct PolicyInstaller {
    timeout: Duration,
}

impl PolicyInstaller {
    /// Create a new installer. Every submission is bounded by `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Install all rules of a device. Flow rules are submitted through the control plane, routes
    /// are executed on the device. The outcomes are in submission order.
    pub fn install<H: NetworkHandle + ?Sized>(
        &self,
        handle: &H,
        device: &str,
        role: NodeRole,
        mapping: Option<&PortMapping>,
        rules: &[PolicyRule],
    ) -> Vec<InstallOutcome> {
        submission_order(rules)
            .into_iter()
            .map(|rule| {
                let (rendered, status) = match rule.render(role, mapping) {
                    Ok(rendered) => {
                        let status = self.submit(handle, device, &rendered);
                        (Some(rendered), status)
                    }
                    Err(e) => {
                        warn!("Skipping rule on {} ({}): {}", device, rule, e);
                        (None, RuleStatus::ConfigurationError { reason: e.to_string() })
                    }
                };
                if let RuleStatus::Failed { detail } = &status {
                    warn!("Rule on {} ({}) failed: {}", device, rule, detail);
                }
                InstallOutcome { device: device.to_string(), rule: rule.clone(), rendered, status }
            })
            .collect()
    }

    /// Render all rules of a device without submitting them. Rules that can be rendered are
    /// [`RuleStatus::Delegated`] to the operator.
    pub fn plan(
        &self,
        device: &str,
        role: NodeRole,
        mapping: Option<&PortMapping>,
        rules: &[PolicyRule],
    ) -> Vec<InstallOutcome> {
        submission_order(rules)
            .into_iter()
            .map(|rule| {
                let (rendered, status) = match rule.render(role, mapping) {
                    Ok(rendered) => (Some(rendered), RuleStatus::Delegated),
                    Err(e) => (None, RuleStatus::ConfigurationError { reason: e.to_string() }),
                };
                InstallOutcome { device: device.to_string(), rule: rule.clone(), rendered, status }
            })
            .collect()
    }

    fn submit<H: NetworkHandle + ?Sized>(
        &self,
        handle: &H,
        device: &str,
        rendered: &RenderedRule,
    ) -> RuleStatus {
        let status = RuleStatus::Pending.submit();
        debug!("submitting {}", rendered.operator_command(device));
        match rendered {
            RenderedRule::Flow(spec) => match handle.mutate(device, spec, self.timeout) {
                Ok(answer) => status.finish(answer.accepted, answer.detail),
                Err(e) => status.finish(false, e.to_string()),
            },
            RenderedRule::Route(cmd) => match handle.exec(device, cmd, self.timeout) {
                Ok(out) if out.timed_out => {
                    status.finish(false, format!("timed out after {:?}", self.timeout))
                }
                Ok(out) => status.finish(out.success(), out.combined().trim()),
                Err(e) => status.finish(false, e.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::platform::{ControlQuery, EmulationPlatform};
    use crate::sim_platform::*;
    use flowlab::example_scenarios::*;
    use std::net::Ipv4Addr;

    const T: Duration = Duration::from_secs(1);

    fn s1_mapping() -> PortMapping {
        let names: Vec<String> = (1..=3).map(|i| format!("s1-eth{}", i)).collect();
        PortMapping::identity("s1", &names)
    }

    fn sdn(options: SimOptions) -> SimNetwork {
        let exp = SdnForwarding::scenario().build().unwrap();
        SimPlatform::new(options).materialize(&exp.topology).unwrap()
    }

    fn sdn_rules() -> Vec<PolicyRule> {
        vec![PolicyRule::drop_from(100, "s1-eth2"), PolicyRule::forward(100, "s1-eth1", "s1-eth3")]
    }

    #[test]
    fn install_flow_rules() {
        let net = sdn(SimOptions::default());
        let installer = PolicyInstaller::new(T);
        let mapping = s1_mapping();
        let rules = sdn_rules();
        let outcomes = installer.install(&net, "s1", NodeRole::Switch, Some(&mapping), &rules);
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.status == RuleStatus::Installed));
        assert_eq!(
            outcomes[0].rendered,
            Some(RenderedRule::Flow("priority=100,in_port=2,actions=drop".to_string()))
        );
        let dump = net.query("s1", ControlQuery::DumpRules, T).unwrap();
        assert_eq!(dump.lines().count(), 4);
    }

    #[test]
    fn errors_are_isolated() {
        let net = sdn(SimOptions::default());
        let rules = vec![
            PolicyRule::drop_from(10, "s1-eth2"),
            PolicyRule::forward(200, "s1-eth1", "s1-eth9"),
            PolicyRule::default_route(Ipv4Addr::new(10, 0, 0, 1)),
            PolicyRule::forward(100, "s1-eth1", "s1-eth3"),
        ];
        let outcomes = PolicyInstaller::new(T).install(
            &net,
            "s1",
            NodeRole::Switch,
            Some(&s1_mapping()),
            &rules,
        );
        let priorities: Vec<u16> = outcomes.iter().map(|o| o.rule.priority).collect();
        assert_eq!(priorities, vec![200, 100, 10, 0]);
        assert!(matches!(outcomes[0].status, RuleStatus::ConfigurationError { .. }));
        assert_eq!(outcomes[1].status, RuleStatus::Installed);
        assert_eq!(outcomes[2].status, RuleStatus::Installed);
        assert!(matches!(outcomes[3].status, RuleStatus::ConfigurationError { .. }));
        assert!(outcomes[0].rendered.is_none());
    }

    #[test]
    fn rejected_and_timed_out_rules_fail() {
        let net = sdn(SimOptions { read_only: vec!["s1".to_string()], ..Default::default() });
        let outcomes = PolicyInstaller::new(T).install(
            &net,
            "s1",
            NodeRole::Switch,
            Some(&s1_mapping()),
            &sdn_rules(),
        );
        for o in outcomes.iter() {
            assert!(matches!(&o.status, RuleStatus::Failed { detail } if detail.contains("EPERM")));
        }

        let net = sdn(SimOptions { unresponsive: vec!["s1".to_string()], ..Default::default() });
        let outcomes = PolicyInstaller::new(T).install(
            &net,
            "s1",
            NodeRole::Switch,
            Some(&s1_mapping()),
            &sdn_rules(),
        );
        assert_eq!(outcomes.len(), 2);
        for o in outcomes.iter() {
            let timed_out = matches!(
                &o.status,
                RuleStatus::Failed { detail } if detail.contains("did not finish")
            );
            assert!(timed_out);
        }
    }

    #[test]
    fn install_routes() {
        let exp = IpRouting::scenario().build().unwrap();
        let net = SimPlatform::default().materialize(&exp.topology).unwrap();
        let installer = PolicyInstaller::new(T);
        let rules = vec![PolicyRule::default_route(Ipv4Addr::new(10, 0, 0, 3))];
        let outcomes = installer.install(&net, "h1", NodeRole::Host, None, &rules);
        assert_eq!(outcomes[0].status, RuleStatus::Installed);

        // the route already exists
        let outcomes = installer.install(&net, "h1", NodeRole::Host, None, &rules);
        assert_eq!(
            outcomes[0].status,
            RuleStatus::Failed { detail: "RTNETLINK answers: File exists".to_string() }
        );

        let rules = vec![PolicyRule::default_route(Ipv4Addr::new(192, 168, 0, 1))];
        let outcomes = installer.install(&net, "h2", NodeRole::Host, None, &rules);
        let status = &outcomes[0].status;
        assert!(matches!(status, RuleStatus::Failed { detail } if detail.contains("gateway")));

        let rules = vec![PolicyRule::drop_from(1, "r1-eth0")];
        let outcomes = installer.install(&net, "r1", NodeRole::Router, None, &rules);
        assert!(matches!(outcomes[0].status, RuleStatus::ConfigurationError { .. }));
    }

    #[test]
    fn plan_delegates() {
        let mut rules = sdn_rules();
        rules.push(PolicyRule::drop_from(1, "s1-eth7"));
        let mapping = s1_mapping();
        let outcomes = PolicyInstaller::new(T).plan("s1", NodeRole::Switch, Some(&mapping), &rules);
        assert_eq!(outcomes[0].status, RuleStatus::Delegated);
        assert_eq!(outcomes[1].status, RuleStatus::Delegated);
        assert!(matches!(outcomes[2].status, RuleStatus::ConfigurationError { .. }));
    }
}
