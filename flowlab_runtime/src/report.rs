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

//! Result of a single run

use flowlab::{InstallOutcome, PortMapping, ProbeResult, RuleStatus, Transcript};

use itertools::Itertools;
use serde::Serialize;

/// Everything recorded during a run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Name of the scenario
    pub scenario: String,
    /// Probes before installing the policy
    pub baseline: Vec<ProbeResult>,
    /// Probes after installing the policy. `None` if the scenario has no policy.
    pub post_policy: Option<Vec<ProbeResult>>,
    /// Port mappings of all switches that carry policy
    pub mappings: Vec<PortMapping>,
    /// Outcome of every rule, per device in submission order
    pub outcomes: Vec<InstallOutcome>,
    /// The transcript of the run
    pub transcript: Transcript,
}

impl RunReport {
    /// Serialize the report as pretty JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Returns true if every rule was installed or delegated
    pub fn all_rules_applied(&self) -> bool {
        self.outcomes
            .iter()
            .all(|o| matches!(o.status, RuleStatus::Installed | RuleStatus::Delegated))
    }

    /// Short summary, one line per aspect
    pub fn summary(&self) -> String {
        let mut lines = vec![format!("baseline: {}", probe_summary(&self.baseline))];
        if let Some(post) = self.post_policy.as_ref() {
            lines.push(format!("post-policy: {}", probe_summary(post)));
        }
        if !self.outcomes.is_empty() {
            let count = |f: fn(&RuleStatus) -> bool| {
                self.outcomes.iter().filter(|o| f(&o.status)).count()
            };
            lines.push(format!(
                "rules: {} installed, {} failed, {} configuration errors, {} delegated",
                count(|s| *s == RuleStatus::Installed),
                count(|s| matches!(s, RuleStatus::Failed { .. })),
                count(|s| matches!(s, RuleStatus::ConfigurationError { .. })),
                count(|s| *s == RuleStatus::Delegated),
            ));
        }
        let degraded = self.mappings.iter().filter(|m| m.degraded).map(|m| &m.device).join(", ");
        if !degraded.is_empty() {
            lines.push(format!("degraded port mappings: {}", degraded));
        }
        lines.join("\n")
    }
}

fn probe_summary(results: &[ProbeResult]) -> String {
    let ok = results.iter().filter(|r| r.success).count();
    format!("{} of {} probes succeeded", ok, results.len())
}
