//! The target-state document the brain works from.
//!
//! State only grows: ports, vulnerabilities and findings are unioned in,
//! services are overwritten per port, and the phase only moves forward.

use super::extraction::ExtractionResult;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Findings shown to the brain when it decides the next step.
const RECENT_FINDINGS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Reconnaissance,
    Enumeration,
    Exploitation,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Reconnaissance => "RECONNAISSANCE",
            Phase::Enumeration => "ENUMERATION",
            Phase::Exploitation => "EXPLOITATION",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetState {
    pub target_id: String,
    pub goal: String,
    pub phase: Phase,
    pub iteration: u32,
    pub max_iterations: u32,
    pub open_ports: BTreeSet<u16>,
    pub services: BTreeMap<u16, String>,
    pub vulnerabilities: BTreeSet<String>,
    /// Unique, in the order they were first reported.
    pub key_findings: Vec<String>,
}

impl TargetState {
    pub fn new(target_id: impl Into<String>, goal: impl Into<String>, max_iterations: u32) -> Self {
        Self {
            target_id: target_id.into(),
            goal: goal.into(),
            phase: Phase::Reconnaissance,
            iteration: 0,
            max_iterations,
            open_ports: BTreeSet::new(),
            services: BTreeMap::new(),
            vulnerabilities: BTreeSet::new(),
            key_findings: Vec::new(),
        }
    }

    /// Union `ports` into the open ports. Returns how many were new.
    pub fn merge_open_ports(&mut self, ports: impl IntoIterator<Item = u16>) -> usize {
        let before = self.open_ports.len();
        self.open_ports.extend(ports);
        self.open_ports.len() - before
    }

    /// Insert or replace the service name for each port.
    pub fn merge_services(&mut self, services: impl IntoIterator<Item = (u16, String)>) {
        for (port, name) in services {
            let name = name.trim();
            if !name.is_empty() {
                self.services.insert(port, name.to_string());
            }
        }
    }

    pub fn merge_vulnerabilities(&mut self, vulns: impl IntoIterator<Item = String>) -> usize {
        let before = self.vulnerabilities.len();
        self.vulnerabilities
            .extend(vulns.into_iter().map(|v| v.trim().to_string()).filter(|v| !v.is_empty()));
        self.vulnerabilities.len() - before
    }

    pub fn merge_key_findings(&mut self, findings: impl IntoIterator<Item = String>) -> usize {
        let mut added = 0;
        for finding in findings {
            let finding = finding.trim();
            if !finding.is_empty() && !self.key_findings.iter().any(|f| f == finding) {
                self.key_findings.push(finding.to_string());
                added += 1;
            }
        }
        added
    }

    /// Fold an extraction into the state and advance the phase.
    pub fn merge(&mut self, extraction: &ExtractionResult) {
        self.merge_open_ports(extraction.ports());
        self.merge_services(extraction.service_map());
        self.merge_vulnerabilities(extraction.vulnerabilities.iter().cloned());
        self.merge_key_findings(extraction.key_findings.iter().cloned());
        self.advance_phase();
    }

    /// Move forward when the evidence allows it: a known port ends
    /// reconnaissance, a known vulnerability ends enumeration.
    pub fn advance_phase(&mut self) {
        if self.phase == Phase::Reconnaissance && !self.open_ports.is_empty() {
            self.phase = Phase::Enumeration;
        }
        if self.phase == Phase::Enumeration && !self.vulnerabilities.is_empty() {
            self.phase = Phase::Exploitation;
        }
    }

    pub fn recent_findings(&self, n: usize) -> &[String] {
        &self.key_findings[self.key_findings.len().saturating_sub(n)..]
    }

    /// The state as the brain sees it, one fact per line.
    pub fn context_block(&self) -> String {
        let mut lines = vec![
            format!("Target: {}", self.target_id),
            format!("Goal: {}", self.goal),
            format!("Phase: {}", self.phase),
            format!("Iteration: {}/{}", self.iteration, self.max_iterations),
        ];

        if !self.open_ports.is_empty() {
            let ports: Vec<String> = self.open_ports.iter().map(u16::to_string).collect();
            lines.push(format!("Open Ports: {}", ports.join(", ")));
        }
        if !self.services.is_empty() {
            let services: Vec<String> = self.services.iter().map(|(p, s)| format!("{p}:{s}")).collect();
            lines.push(format!("Services: {}", services.join(", ")));
        }
        if !self.vulnerabilities.is_empty() {
            let vulns: Vec<&str> = self.vulnerabilities.iter().map(String::as_str).collect();
            lines.push(format!("Vulnerabilities: {}", vulns.join(", ")));
        }
        if !self.key_findings.is_empty() {
            lines.push(format!("Recent Findings: {}", self.recent_findings(RECENT_FINDINGS).join("; ")));
        }

        lines.join("\n")
    }
}
