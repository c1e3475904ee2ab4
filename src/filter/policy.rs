//! The assembled policy handed to the installer

use super::rules::{FragmentKind, RuleFragment, SyscallRule};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// What the kernel does when a syscall is not on the allow-list
///
/// `Report` traps the offending thread with SIGSYS so the violation is
/// visible without killing the sandbox. `Kill` terminates the whole process
/// and should become the default once every supported host kernel offers
/// process-wide kill for seccomp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationMode {
    #[default]
    Report,
    Kill,
}

impl ViolationMode {
    pub fn is_kill(&self) -> bool {
        matches!(self, ViolationMode::Kill)
    }
}

/// Final ordered rule set plus the kill toggle
///
/// Built once by `SyscallFilter::assemble` and consumed by value by a
/// `PolicyInstaller`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledPolicy {
    fragments: Vec<RuleFragment>,
    kill_on_violation: bool,
}

impl AssembledPolicy {
    pub(crate) fn new(fragments: Vec<RuleFragment>, kill_on_violation: bool) -> Self {
        Self {
            fragments,
            kill_on_violation,
        }
    }

    pub fn fragments(&self) -> &[RuleFragment] {
        &self.fragments
    }

    /// Fragment kinds in the order they were appended
    pub fn fragment_kinds(&self) -> Vec<FragmentKind> {
        self.fragments.iter().map(|f| f.kind).collect()
    }

    /// Every rule, fragment after fragment
    pub fn rules(&self) -> impl Iterator<Item = &SyscallRule> {
        self.fragments.iter().flat_map(|f| f.rules.iter())
    }

    pub fn rule_count(&self) -> usize {
        self.fragments.iter().map(|f| f.rules.len()).sum()
    }

    pub fn kill_on_violation(&self) -> bool {
        self.kill_on_violation
    }

    pub fn summary(&self) -> PolicySummary {
        let syscalls: BTreeSet<i64> = self.rules().map(|r| r.sysno).collect();
        PolicySummary {
            fragments: self
                .fragments
                .iter()
                .map(|f| FragmentSummary {
                    kind: f.kind,
                    rules: f.rules.len(),
                })
                .collect(),
            total_rules: self.rule_count(),
            distinct_syscalls: syscalls.len(),
            on_violation: if self.kill_on_violation {
                ViolationMode::Kill
            } else {
                ViolationMode::Report
            },
        }
    }
}

/// Per-fragment line of a `PolicySummary`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FragmentSummary {
    pub kind: FragmentKind,
    pub rules: usize,
}

/// Serializable overview of a policy, printed by the CLI dry run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicySummary {
    pub fragments: Vec<FragmentSummary>,
    pub total_rules: usize,
    pub distinct_syscalls: usize,
    pub on_violation: ViolationMode,
}
