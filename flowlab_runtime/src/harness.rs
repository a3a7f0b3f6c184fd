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

//! # Verification Harness
//!
//! Executes connectivity probes (`ping`) on the nodes and keeps their raw output. A probe is
//! successful if `ping` exits with status 0.

use crate::platform::NetworkHandle;
use flowlab::{ProbePair, ProbeResult};

use log::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

/// Executes probes on a materialized network
#[derive(Debug, Clone, Copy)]
pub struct Harness {
    count: u32,
    reply_timeout: Duration,
    parallel: bool,
}

impl Harness {
    /// Create a new harness sending `count` echo requests per probe, and waiting `reply_timeout`
    /// for every reply.
    pub fn new(count: u32, reply_timeout: Duration) -> Self {
        Self { count: count.max(1), reply_timeout, parallel: false }
    }

    /// Execute the probes of a suite in parallel
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Bound for the whole probe. `ping` sends one request per second and waits for the reply to
    /// the last one, so the bound covers the interval between the requests, the reply timeout
    /// passed to `ping`, and one second of slack.
    pub fn probe_timeout(&self) -> Duration {
        let interval = Duration::from_secs(u64::from(self.count - 1));
        interval + Duration::from_secs(self.wait_secs() + 1)
    }

    /// The command executed on the source node
    pub fn command(&self, destination: impl std::fmt::Display) -> String {
        format!("ping -c {} -W {} {}", self.count, self.wait_secs(), destination)
    }

    /// Reply timeout in whole seconds, rounded up
    fn wait_secs(&self) -> u64 {
        let millis = self.reply_timeout.as_millis() as u64;
        ((millis + 999) / 1000).max(1)
    }

    /// Execute a single probe. Errors of the platform are recorded in the output of a failed probe.
    pub fn probe<H: NetworkHandle + ?Sized>(&self, handle: &H, pair: &ProbePair) -> ProbeResult {
        let cmd = self.command(pair.destination);
        let timeout = self.probe_timeout();
        let (output, success, timed_out) = match handle.exec(&pair.source, &cmd, timeout) {
            Ok(out) => {
                let mut output = out.combined();
                if out.timed_out {
                    output.push_str(&format!("\nprobe timed out after {:?}\n", timeout));
                }
                (output, out.success(), out.timed_out)
            }
            Err(e) => {
                let timed_out = e.is_timeout();
                (format!("probe could not be executed: {}\n", e), false, timed_out)
            }
        };
        let result = ProbeResult {
            source: pair.source.clone(),
            destination: pair.destination,
            output,
            success,
            timed_out,
        };
        debug!("{}", result);
        result
    }

    /// Execute all probes. The results are in the same order as the pairs.
    pub fn run_suite<H: NetworkHandle + ?Sized>(
        &self,
        handle: &H,
        pairs: &[ProbePair],
    ) -> Vec<ProbeResult> {
        let workers = num_cpus::get().min(pairs.len());
        if !self.parallel || workers <= 1 {
            return pairs.iter().map(|p| self.probe(handle, p)).collect();
        }

        debug!("executing {} probes on {} threads", pairs.len(), workers);
        let next = AtomicUsize::new(0);
        let slots: Mutex<Vec<Option<ProbeResult>>> = Mutex::new(vec![None; pairs.len()]);
        thread::scope(|s| {
            for _ in 0..workers {
                s.spawn(|| loop {
                    let i = next.fetch_add(1, Ordering::SeqCst);
                    let pair = match pairs.get(i) {
                        Some(pair) => pair,
                        None => break,
                    };
                    let result = self.probe(handle, pair);
                    slots.lock().unwrap_or_else(|e| e.into_inner())[i] = Some(result);
                });
            }
        });

        slots
            .into_inner()
            .unwrap_or_else(|e| e.into_inner())
            .into_iter()
            .zip(pairs)
            .map(|(slot, pair)| {
                slot.unwrap_or_else(|| ProbeResult {
                    source: pair.source.clone(),
                    destination: pair.destination,
                    output: "probe was not executed\n".to_string(),
                    success: false,
                    timed_out: false,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::platform::EmulationPlatform;
    use crate::sim_platform::*;
    use flowlab::example_scenarios::*;
    use std::net::Ipv4Addr;

    fn pairs() -> Vec<ProbePair> {
        let mut pairs = Vec::new();
        for src in &["h1", "h2", "h3", "h1", "h9"] {
            for dst in 1..=3 {
                pairs.push(ProbePair::new(*src, Ipv4Addr::new(10, 0, 0, dst)));
            }
        }
        pairs.push(ProbePair::new("h1", Ipv4Addr::new(10, 9, 0, 1)));
        pairs
    }

    #[test]
    fn command() {
        let harness = Harness::new(3, Duration::from_millis(200));
        assert_eq!(harness.command(Ipv4Addr::new(10, 0, 0, 3)), "ping -c 3 -W 1 10.0.0.3");
        assert_eq!(harness.probe_timeout(), Duration::from_secs(4));

        let harness = Harness::new(1, Duration::from_millis(1500));
        assert_eq!(harness.command(Ipv4Addr::new(10, 0, 0, 3)), "ping -c 1 -W 2 10.0.0.3");
        assert_eq!(harness.probe_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn timeout_covers_the_ping_schedule() {
        for &count in &[1, 2, 5] {
            for &millis in &[1, 200, 1000, 2500] {
                let harness = Harness::new(count, Duration::from_millis(millis));
                // every request is sent, and the reply to the last one is awaited
                let wait = Duration::from_secs(((millis + 999) / 1000).max(1));
                let schedule = Duration::from_secs(u64::from(count - 1)) + wait;
                assert!(harness.probe_timeout() > schedule);
            }
        }
    }

    #[test]
    fn probes_keep_raw_output() {
        let exp = SdnForwarding::scenario().build().unwrap();
        let net = SimPlatform::default().materialize(&exp.topology).unwrap();
        let harness = Harness::new(1, Duration::from_secs(1));

        let ok = harness.probe(&net, &ProbePair::new("h1", Ipv4Addr::new(10, 0, 0, 3)));
        assert!(ok.success);
        assert!(ok.output.starts_with("PING 10.0.0.3 (10.0.0.3) 56(84) bytes of data.\n"));

        let unreachable = harness.probe(&net, &ProbePair::new("h1", Ipv4Addr::new(10, 9, 0, 1)));
        assert!(!unreachable.success);
        assert_eq!(unreachable.output, "ping: connect: Network is unreachable\n");

        let unknown = harness.probe(&net, &ProbePair::new("h9", Ipv4Addr::new(10, 0, 0, 1)));
        assert!(!unknown.success);
        assert!(!unknown.timed_out);
        assert!(unknown.output.contains("Unknown node: h9"));
    }

    #[test]
    fn parallel_suite_keeps_order() {
        let exp = SdnForwarding::scenario().build().unwrap();
        let net = SimPlatform::default().materialize(&exp.topology).unwrap();
        let harness = Harness::new(2, Duration::from_secs(1));
        let pairs = pairs();

        let sequential = harness.run_suite(&net, &pairs);
        let parallel = harness.parallel(true).run_suite(&net, &pairs);
        assert_eq!(sequential.len(), pairs.len());
        assert_eq!(sequential, parallel);
        for (result, pair) in parallel.iter().zip(pairs.iter()) {
            assert_eq!(&result.pair(), pair);
        }
        assert!(parallel[0].success);
        assert!(!parallel[12].success);
        assert!(harness.run_suite(&net, &[]).is_empty());
    }
}
