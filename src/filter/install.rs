//! Compile an assembled policy to seccomp BPF and load it into the kernel
//!
//! # How BPF Filters Work
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │  ┌──────────┐     ┌─────────────┐     ┌──────────────────┐     │
//! │  │ Syscall  │────►│ BPF Program │────►│ Decision         │     │
//! │  │ (read,   │     │ (tiny code  │     │ ALLOW, or TRAP / │     │
//! │  │  ioctl)  │     │  in kernel) │     │ KILL on mismatch │     │
//! │  └──────────┘     └─────────────┘     └──────────────────┘     │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Loading is irreversible: once applied, the filter stays for the life of
//! the process and is inherited by every thread and child.

use super::policy::AssembledPolicy;
use super::rules::{ArgCondition, ArgOp, SyscallRule};
use seccompiler::{
    BackendError,     // Invalid rule, condition or architecture
    BpfProgram,       // Vec<sock_filter> - the compiled bytecode
    SeccompAction,    // What to do: Allow, Trap, KillProcess, ...
    SeccompCmpArgLen, // Width of the compared argument
    SeccompCmpOp,     // Comparison operator
    SeccompCondition, // One argument check
    SeccompFilter,    // The filter with rules
    SeccompRule,      // Conditions for a syscall (ANDed)
    TargetArch,       // CPU architecture (x86_64, aarch64)
};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Error type for policy installation
#[derive(Debug)]
pub enum InstallError {
    /// Architecture, rule or compilation rejected by seccompiler
    Backend(BackendError),
    /// Kernel refused the filter (no seccomp, no TSYNC, ...)
    Apply(seccompiler::Error),
    /// Failure reported by an installer other than `SeccompInstaller`
    Other(String),
}

impl fmt::Display for InstallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallError::Backend(e) => write!(f, "Seccomp compile error: {}", e),
            InstallError::Apply(e) => write!(f, "Seccomp install error: {}", e),
            InstallError::Other(msg) => write!(f, "Policy install error: {}", msg),
        }
    }
}

impl std::error::Error for InstallError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InstallError::Backend(e) => Some(e),
            InstallError::Apply(e) => Some(e),
            InstallError::Other(_) => None,
        }
    }
}

impl From<BackendError> for InstallError {
    fn from(e: BackendError) -> Self {
        InstallError::Backend(e)
    }
}

impl From<seccompiler::Error> for InstallError {
    fn from(e: seccompiler::Error) -> Self {
        InstallError::Apply(e)
    }
}

/// Commits an assembled policy as the process's enforcement boundary
pub trait PolicyInstaller {
    fn install(&self, policy: AssembledPolicy) -> Result<(), InstallError>;
}

// ═══════════════════════════════════════════════════════════════════════════
// SeccompInstaller
// ═══════════════════════════════════════════════════════════════════════════
// WHAT IT IS:
//   The default installer: turns the ordered rule list into a seccompiler
//   filter, compiles it for the running architecture and applies it.
//
// THREADS:
//   By default the filter is synchronized to every thread already running
//   in the process (SECCOMP_FILTER_FLAG_TSYNC). With `all_threads = false`
//   only the calling thread (and threads it spawns later) is covered.
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct SeccompInstaller {
    all_threads: bool,
}

impl SeccompInstaller {
    pub fn new() -> Self {
        Self { all_threads: true }
    }

    /// Restrict installation to the calling thread
    pub fn current_thread_only(mut self) -> Self {
        self.all_threads = false;
        self
    }

    // ═══════════════════════════════════════════════════════════════════════
    // compile() - Build BPF bytecode without loading it
    // ═══════════════════════════════════════════════════════════════════════
    // HOW IT WORKS:
    //   1. Merge rules per syscall (see merge_rules)
    //   2. mismatch_action = KillProcess or Trap, match_action = Allow
    //   3. Compile for std::env::consts::ARCH
    // ═══════════════════════════════════════════════════════════════════════
    pub fn compile(&self, policy: &AssembledPolicy) -> Result<BpfProgram, InstallError> {
        let rules = merge_rules(policy.rules())?;

        let arch: TargetArch = std::env::consts::ARCH.try_into()?;

        let mismatch_action = if policy.kill_on_violation() {
            SeccompAction::KillProcess
        } else {
            SeccompAction::Trap
        };

        let filter = SeccompFilter::new(rules, mismatch_action, SeccompAction::Allow, arch)?;
        let bpf_prog: BpfProgram = filter.try_into()?;

        Ok(bpf_prog)
    }
}

impl Default for SeccompInstaller {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyInstaller for SeccompInstaller {
    fn install(&self, policy: AssembledPolicy) -> Result<(), InstallError> {
        let bpf_prog = self.compile(&policy)?;

        tracing::debug!(
            rules = policy.rule_count(),
            instructions = bpf_prog.len(),
            kill = policy.kill_on_violation(),
            all_threads = self.all_threads,
            "Applying seccomp filter"
        );

        // prctl(PR_SET_NO_NEW_PRIVS) + seccomp(SECCOMP_SET_MODE_FILTER, ...)
        if self.all_threads {
            seccompiler::apply_filter_all_threads(&bpf_prog)?;
        } else {
            seccompiler::apply_filter(&bpf_prog)?;
        }

        Ok(())
    }
}

/// Fold the ordered rule list into seccompiler's per-syscall map
///
/// A syscall allowed unconditionally by any rule is unconditional (empty
/// rule vector). Otherwise its conditional rules are kept in order and ORed.
pub(crate) fn merge_rules<'a>(
    rules: impl Iterator<Item = &'a SyscallRule>,
) -> Result<BTreeMap<i64, Vec<SeccompRule>>, BackendError> {
    let mut unconditional = BTreeSet::new();
    let mut merged: BTreeMap<i64, Vec<SeccompRule>> = BTreeMap::new();

    for rule in rules {
        if rule.is_unconditional() {
            unconditional.insert(rule.sysno);
            merged.insert(rule.sysno, Vec::new());
            continue;
        }
        if unconditional.contains(&rule.sysno) {
            continue;
        }
        let conditions = rule
            .conditions
            .iter()
            .map(to_condition)
            .collect::<Result<Vec<_>, _>>()?;
        merged
            .entry(rule.sysno)
            .or_default()
            .push(SeccompRule::new(conditions)?);
    }

    Ok(merged)
}

fn to_condition(cond: &ArgCondition) -> Result<SeccompCondition, BackendError> {
    let op = match cond.op {
        ArgOp::Eq => SeccompCmpOp::Eq,
        ArgOp::MaskedEq(mask) => SeccompCmpOp::MaskedEq(mask),
    };
    SeccompCondition::new(cond.index, SeccompCmpArgLen::Qword, op, cond.value)
}
