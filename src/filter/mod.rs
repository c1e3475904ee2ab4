//! Syscall filter policy assembly
//!
//! Decides which host syscalls the sandbox monitor may issue and commits that
//! decision as a seccomp filter. Everything not on the list becomes
//! unreachable for the rest of the process's life.
//!
//! # Assembly Order
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  1. base                     always                             │
//! │  2. instrumentation          sanitizer builds only              │
//! │  3. unrestricted_fs          ─┐                                 │
//! │     console                   ├─ one per granted trust flag,    │
//! │     host_network             ─┘  each with a posture warning    │
//! │  4. ptrace | kvm             exactly one, from the backend      │
//! │                                                                 │
//! │  unrecognized backend ──► error, nothing installed              │
//! └─────────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//!                 PolicyInstaller::install (once)
//! ```
//!
//! Fragments are concatenated, never deduplicated. How overlapping rules
//! combine is up to the installer.

pub mod backend;
pub mod fragments;
pub mod install;
pub mod policy;
pub mod report;
pub mod rules;

pub use backend::BackendKind;
pub use fragments::{FragmentProvider, HostFragments};
pub use install::{InstallError, PolicyInstaller, SeccompInstaller};
pub use policy::{AssembledPolicy, PolicySummary, ViolationMode};
pub use report::{report, MemoryReporter, Reporter, TracingReporter};
pub use rules::{ArgCondition, ArgOp, FragmentKind, RuleFragment, SyscallRule};

use crate::config::FilterConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

const UNRESTRICTED_FS_WARNING: &str = "direct file access allows unrestricted file access!";
const CONSOLE_WARNING: &str = "console is enabled: syscall filters less restrictive!";
const HOST_NETWORK_WARNING: &str = "host networking enabled: syscall filters less restrictive!";

/// Relaxations of the default-deny posture; all off by default
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrustFlags {
    /// Sandbox reads and writes host files directly
    pub unrestricted_fs: bool,
    /// Interactive terminal attached to the sandbox
    pub console: bool,
    /// Sandbox uses the host network stack
    pub host_network: bool,
}

/// Error type for filter assembly and installation
#[derive(Debug)]
pub enum FilterError {
    /// Backend name matched no known backend; nothing was installed
    UnknownPlatform(String),
    /// Installer failed; passed through untouched
    Install(InstallError),
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterError::UnknownPlatform(name) => write!(f, "unknown platform type {:?}", name),
            FilterError::Install(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for FilterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FilterError::UnknownPlatform(_) => None,
            FilterError::Install(e) => Some(e),
        }
    }
}

impl From<InstallError> for FilterError {
    fn from(e: InstallError) -> Self {
        FilterError::Install(e)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// SyscallFilter
// ═══════════════════════════════════════════════════════════════════════════
// WHAT IT IS:
//   The assembler. Owns where fragments come from (FragmentProvider), where
//   posture warnings go (Reporter), and what a violation does
//   (ViolationMode). Holds no other state, so assembling twice with the same
//   inputs gives the same policy.
//
// USAGE:
//   Call install() once on the initializing thread, before any thread that
//   runs untrusted code starts.
// ═══════════════════════════════════════════════════════════════════════════

pub struct SyscallFilter<P = HostFragments, R = TracingReporter> {
    provider: P,
    reporter: R,
    violation: ViolationMode,
}

impl SyscallFilter {
    /// Built-in fragments, warnings through `tracing`, report on violation
    pub fn new() -> Self {
        Self {
            provider: HostFragments,
            reporter: TracingReporter,
            violation: ViolationMode::default(),
        }
    }
}

impl Default for SyscallFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: FragmentProvider, R: Reporter> SyscallFilter<P, R> {
    pub fn with_provider<P2: FragmentProvider>(self, provider: P2) -> SyscallFilter<P2, R> {
        SyscallFilter {
            provider,
            reporter: self.reporter,
            violation: self.violation,
        }
    }

    pub fn with_reporter<R2: Reporter>(self, reporter: R2) -> SyscallFilter<P, R2> {
        SyscallFilter {
            provider: self.provider,
            reporter,
            violation: self.violation,
        }
    }

    pub fn with_violation_mode(mut self, violation: ViolationMode) -> Self {
        self.violation = violation;
        self
    }

    pub fn violation_mode(&self) -> ViolationMode {
        self.violation
    }

    // ═══════════════════════════════════════════════════════════════════════
    // assemble() - Build the ordered rule set
    // ═══════════════════════════════════════════════════════════════════════
    // Warnings for granted flags are reported as their fragments are added,
    // so they are already out by the time an unrecognized backend fails.
    // ═══════════════════════════════════════════════════════════════════════
    pub fn assemble(
        &self,
        backend: &BackendKind,
        flags: TrustFlags,
    ) -> Result<AssembledPolicy, FilterError> {
        let mut fragments = vec![RuleFragment::new(FragmentKind::Base, self.provider.base())];

        let instrumentation =
            RuleFragment::new(FragmentKind::Instrumentation, self.provider.instrumentation());
        if !instrumentation.is_empty() {
            fragments.push(instrumentation);
        }

        if flags.unrestricted_fs {
            self.reporter.report(UNRESTRICTED_FS_WARNING);
            fragments.push(RuleFragment::new(
                FragmentKind::UnrestrictedFs,
                self.provider.unrestricted_fs(),
            ));
        }
        if flags.console {
            self.reporter.report(CONSOLE_WARNING);
            fragments.push(RuleFragment::new(FragmentKind::Console, self.provider.console()));
        }
        if flags.host_network {
            self.reporter.report(HOST_NETWORK_WARNING);
            fragments.push(RuleFragment::new(
                FragmentKind::HostNetwork,
                self.provider.host_network(),
            ));
        }

        let backend_fragment = match backend {
            BackendKind::Ptrace => RuleFragment::new(FragmentKind::Ptrace, self.provider.ptrace()),
            BackendKind::Kvm => RuleFragment::new(FragmentKind::Kvm, self.provider.kvm()),
            BackendKind::Unrecognized(name) => {
                return Err(FilterError::UnknownPlatform(name.clone()));
            }
        };
        fragments.push(backend_fragment);

        Ok(AssembledPolicy::new(fragments, self.violation.is_kill()))
    }

    /// Assemble and hand the policy to `installer`
    ///
    /// The installer is not called when assembly fails; its own error is
    /// returned as `FilterError::Install` without retry.
    pub fn install<I: PolicyInstaller + ?Sized>(
        &self,
        backend: &BackendKind,
        flags: TrustFlags,
        installer: &I,
    ) -> Result<(), FilterError> {
        let policy = self.assemble(backend, flags)?;

        tracing::info!(
            backend = %backend,
            fragments = ?policy.fragment_kinds(),
            rules = policy.rule_count(),
            kill = policy.kill_on_violation(),
            "Installing syscall filters"
        );

        installer.install(policy)?;
        Ok(())
    }
}

/// Install the built-in policy described by `config` with seccompiler
pub fn install(config: &FilterConfig) -> Result<(), FilterError> {
    SyscallFilter::new()
        .with_violation_mode(config.violation)
        .install(&config.backend(), config.trust_flags(), &SeccompInstaller::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    /// One marker rule per fragment so order is visible in the flat list
    struct MarkerFragments {
        instrumented: bool,
    }

    impl FragmentProvider for MarkerFragments {
        fn base(&self) -> Vec<SyscallRule> {
            vec![SyscallRule::allow(1)]
        }
        fn instrumentation(&self) -> Vec<SyscallRule> {
            if self.instrumented {
                vec![SyscallRule::allow(2)]
            } else {
                Vec::new()
            }
        }
        fn unrestricted_fs(&self) -> Vec<SyscallRule> {
            vec![SyscallRule::allow(3)]
        }
        fn console(&self) -> Vec<SyscallRule> {
            vec![SyscallRule::allow(4)]
        }
        fn host_network(&self) -> Vec<SyscallRule> {
            vec![SyscallRule::allow(5)]
        }
        fn ptrace(&self) -> Vec<SyscallRule> {
            vec![SyscallRule::allow(6)]
        }
        fn kvm(&self) -> Vec<SyscallRule> {
            vec![SyscallRule::allow(7)]
        }
    }

    #[derive(Default)]
    struct RecordingInstaller {
        calls: Cell<usize>,
        last: RefCell<Option<AssembledPolicy>>,
    }

    impl PolicyInstaller for RecordingInstaller {
        fn install(&self, policy: AssembledPolicy) -> Result<(), InstallError> {
            self.calls.set(self.calls.get() + 1);
            *self.last.borrow_mut() = Some(policy);
            Ok(())
        }
    }

    fn marker_filter(
        reporter: &MemoryReporter,
    ) -> SyscallFilter<MarkerFragments, MemoryReporter> {
        SyscallFilter::new()
            .with_provider(MarkerFragments {
                instrumented: false,
            })
            .with_reporter(reporter.clone())
    }

    fn sysnos(policy: &AssembledPolicy) -> Vec<i64> {
        policy.rules().map(|r| r.sysno).collect()
    }

    #[test]
    fn test_no_flags_is_base_plus_backend() {
        let reporter = MemoryReporter::new();
        let filter = marker_filter(&reporter);

        let policy = filter.assemble(&BackendKind::Kvm, TrustFlags::default()).unwrap();

        assert_eq!(policy.fragment_kinds(), vec![FragmentKind::Base, FragmentKind::Kvm]);
        assert_eq!(sysnos(&policy), vec![1, 7]);
        assert!(reporter.is_empty());
    }

    #[test]
    fn test_every_flag_subset_in_fixed_order() {
        for bits in 0u8..8 {
            let flags = TrustFlags {
                unrestricted_fs: bits & 1 != 0,
                console: bits & 2 != 0,
                host_network: bits & 4 != 0,
            };
            let reporter = MemoryReporter::new();
            let policy = marker_filter(&reporter)
                .assemble(&BackendKind::Ptrace, flags)
                .unwrap();

            let mut expected = vec![FragmentKind::Base];
            let mut warnings = Vec::new();
            if flags.unrestricted_fs {
                expected.push(FragmentKind::UnrestrictedFs);
                warnings.push("unrestricted file access");
            }
            if flags.console {
                expected.push(FragmentKind::Console);
                warnings.push("console is enabled");
            }
            if flags.host_network {
                expected.push(FragmentKind::HostNetwork);
                warnings.push("host networking enabled");
            }
            expected.push(FragmentKind::Ptrace);

            assert_eq!(policy.fragment_kinds(), expected, "flags {:?}", flags);

            let lines = reporter.lines();
            assert_eq!(lines.len(), warnings.len(), "flags {:?}", flags);
            for (line, needle) in lines.iter().zip(warnings) {
                assert!(line.starts_with(report::WARNING_PREFIX));
                assert!(line.contains(needle), "{} should mention {}", line, needle);
            }
        }
    }

    #[test]
    fn test_instrumentation_follows_base() {
        let reporter = MemoryReporter::new();
        let filter = SyscallFilter::new()
            .with_provider(MarkerFragments { instrumented: true })
            .with_reporter(reporter.clone());

        let flags = TrustFlags {
            console: true,
            ..TrustFlags::default()
        };
        let policy = filter.assemble(&BackendKind::Kvm, flags).unwrap();

        assert_eq!(sysnos(&policy), vec![1, 2, 4, 7]);
        assert_eq!(reporter.len(), 1);
    }

    #[test]
    fn test_unknown_backend_fails_without_install() {
        let reporter = MemoryReporter::new();
        let installer = RecordingInstaller::default();
        let flags = TrustFlags {
            host_network: true,
            ..TrustFlags::default()
        };

        let err = marker_filter(&reporter)
            .install(
                &BackendKind::Unrecognized("unknown-kind".to_string()),
                flags,
                &installer,
            )
            .unwrap_err();

        assert!(matches!(&err, FilterError::UnknownPlatform(name) if name == "unknown-kind"));
        assert!(err.to_string().contains("unknown-kind"));
        assert_eq!(installer.calls.get(), 0);
        // Only the flag warning, emitted before dispatch
        assert_eq!(reporter.len(), 1);
    }

    #[test]
    fn test_assemble_is_deterministic() {
        let flags = TrustFlags {
            unrestricted_fs: true,
            console: false,
            host_network: true,
        };
        let first = SyscallFilter::new()
            .with_reporter(MemoryReporter::new())
            .assemble(&BackendKind::Ptrace, flags)
            .unwrap();
        let second = SyscallFilter::new()
            .with_reporter(MemoryReporter::new())
            .assemble(&BackendKind::Ptrace, flags)
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_install_passes_policy_once_with_report_mode() {
        let reporter = MemoryReporter::new();
        let installer = RecordingInstaller::default();

        marker_filter(&reporter)
            .install(&BackendKind::Ptrace, TrustFlags::default(), &installer)
            .unwrap();

        assert_eq!(installer.calls.get(), 1);
        let policy = installer.last.borrow_mut().take().unwrap();
        assert!(!policy.kill_on_violation());
        assert_eq!(sysnos(&policy), vec![1, 6]);
    }

    #[test]
    fn test_borrowed_reporter_and_fragment_contents() {
        let reporter = MemoryReporter::new();
        let filter = SyscallFilter::new()
            .with_provider(MarkerFragments {
                instrumented: false,
            })
            .with_reporter(&reporter);
        assert_eq!(filter.violation_mode(), ViolationMode::Report);

        let flags = TrustFlags {
            unrestricted_fs: true,
            ..TrustFlags::default()
        };
        let policy = filter.assemble(&BackendKind::Ptrace, flags).unwrap();

        let fragments = policy.fragments();
        assert_eq!(fragments.len(), 3);
        assert_eq!(fragments[1].kind, FragmentKind::UnrestrictedFs);
        assert_eq!(fragments[1].rules, vec![SyscallRule::allow(3)]);
        assert!(fragments.iter().all(|f| !f.is_empty()));
        assert_eq!(reporter.len(), 1);
    }

    #[test]
    fn test_kill_mode_reaches_installer() {
        let installer = RecordingInstaller::default();

        let filter = SyscallFilter::new()
            .with_provider(MarkerFragments {
                instrumented: false,
            })
            .with_reporter(MemoryReporter::new())
            .with_violation_mode(ViolationMode::Kill);
        assert_eq!(filter.violation_mode(), ViolationMode::Kill);
        filter
            .install(&BackendKind::Kvm, TrustFlags::default(), &installer)
            .unwrap();

        let policy = installer.last.borrow_mut().take().unwrap();
        assert!(policy.kill_on_violation());
    }

    #[test]
    fn test_installer_error_is_passed_through() {
        struct Refusing;
        impl PolicyInstaller for Refusing {
            fn install(&self, _policy: AssembledPolicy) -> Result<(), InstallError> {
                Err(InstallError::Other("seccomp not supported".to_string()))
            }
        }

        let err = marker_filter(&MemoryReporter::new())
            .install(&BackendKind::Kvm, TrustFlags::default(), &Refusing)
            .unwrap_err();

        match err {
            FilterError::Install(InstallError::Other(msg)) => {
                assert_eq!(msg, "seccomp not supported")
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_builtin_policy_compiles_for_every_combination() {
        let installer = SeccompInstaller::new();
        for backend in [BackendKind::Ptrace, BackendKind::Kvm] {
            for bits in 0u8..8 {
                let flags = TrustFlags {
                    unrestricted_fs: bits & 1 != 0,
                    console: bits & 2 != 0,
                    host_network: bits & 4 != 0,
                };
                let policy = SyscallFilter::new()
                    .with_reporter(MemoryReporter::new())
                    .assemble(&backend, flags)
                    .unwrap();
                let prog = installer.compile(&policy);
                assert!(prog.is_ok(), "{} {:?}: {:?}", backend, flags, prog.err());
            }
        }
    }
}
