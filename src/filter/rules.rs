//! Rule and fragment types
//!
//! A `SyscallRule` names one syscall plus the argument conditions under which
//! it is allowed. A `RuleFragment` is the ordered list of rules one concern
//! contributes to the final policy.

use serde::Serialize;
use std::fmt;

/// How an argument is compared against a rule's value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgOp {
    /// `arg == value`
    Eq,
    /// `arg & mask == value`
    MaskedEq(u64),
}

/// One condition on a syscall argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ArgCondition {
    /// Argument position, 0 through 5
    pub index: u8,
    pub op: ArgOp,
    pub value: u64,
}

impl ArgCondition {
    pub fn eq(index: u8, value: u64) -> Self {
        Self {
            index,
            op: ArgOp::Eq,
            value,
        }
    }

    pub fn masked_eq(index: u8, mask: u64, value: u64) -> Self {
        Self {
            index,
            op: ArgOp::MaskedEq(mask),
            value,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// SyscallRule
// ═══════════════════════════════════════════════════════════════════════════
// An empty condition list means "always allow this syscall".
// Several conditions in one rule must ALL hold (AND). Several rules for the
// same syscall are alternatives (OR); that merge happens in the installer.
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyscallRule {
    pub sysno: i64,
    pub conditions: Vec<ArgCondition>,
}

impl SyscallRule {
    /// Allow `sysno` with any arguments
    pub fn allow(sysno: i64) -> Self {
        Self {
            sysno,
            conditions: Vec::new(),
        }
    }

    /// Allow `sysno` only when every condition matches
    pub fn allow_if(sysno: i64, conditions: Vec<ArgCondition>) -> Self {
        Self { sysno, conditions }
    }

    pub fn is_unconditional(&self) -> bool {
        self.conditions.is_empty()
    }
}

/// Which concern a fragment was contributed by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentKind {
    Base,
    Instrumentation,
    UnrestrictedFs,
    Console,
    HostNetwork,
    Ptrace,
    Kvm,
}

impl FragmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FragmentKind::Base => "base",
            FragmentKind::Instrumentation => "instrumentation",
            FragmentKind::UnrestrictedFs => "unrestricted_fs",
            FragmentKind::Console => "console",
            FragmentKind::HostNetwork => "host_network",
            FragmentKind::Ptrace => "ptrace",
            FragmentKind::Kvm => "kvm",
        }
    }
}

impl fmt::Display for FragmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered rules contributed by one concern
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleFragment {
    pub kind: FragmentKind,
    pub rules: Vec<SyscallRule>,
}

impl RuleFragment {
    pub fn new(kind: FragmentKind, rules: Vec<SyscallRule>) -> Self {
        Self { kind, rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_is_unconditional() {
        let rule = SyscallRule::allow(libc::SYS_read);
        assert!(rule.is_unconditional());
        assert_eq!(rule.sysno, libc::SYS_read);
    }

    #[test]
    fn test_allow_if_keeps_conditions_in_order() {
        let rule = SyscallRule::allow_if(
            libc::SYS_socket,
            vec![ArgCondition::eq(0, 2), ArgCondition::masked_eq(1, 0xf, 1)],
        );
        assert!(!rule.is_unconditional());
        assert_eq!(rule.conditions[0].index, 0);
        assert_eq!(rule.conditions[1].op, ArgOp::MaskedEq(0xf));
    }

    #[test]
    fn test_fragment_kind_names() {
        assert_eq!(FragmentKind::UnrestrictedFs.to_string(), "unrestricted_fs");
        assert_eq!(FragmentKind::HostNetwork.as_str(), "host_network");
    }
}
