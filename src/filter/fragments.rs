//! Built-in syscall fragments
//!
//! Each function returns the rules one concern needs. The assembler decides
//! which of them end up in the policy; nothing here looks at configuration.
//!
//! ```text
//! ┌──────────────────┬────────────────────────────────────────────────┐
//! │ Fragment         │ Included when                                  │
//! ├──────────────────┼────────────────────────────────────────────────┤
//! │ base             │ always                                         │
//! │ instrumentation  │ built with the `sanitizers` feature            │
//! │ unrestricted_fs  │ direct host file access granted                │
//! │ console          │ interactive console granted                    │
//! │ host_network     │ host network stack granted                     │
//! │ ptrace / kvm     │ exactly one, matching the active backend       │
//! └──────────────────┴────────────────────────────────────────────────┘
//! ```
//!
//! Syscalls that only exist on x86_64 (legacy non-`at` variants,
//! `arch_prctl`) are gated on the target architecture.

use super::rules::{ArgCondition, SyscallRule};

/// arch_prctl(2) codes the monitor uses to manage TLS
#[cfg(target_arch = "x86_64")]
const ARCH_SET_FS: u64 = 0x1002;
#[cfg(target_arch = "x86_64")]
const ARCH_GET_FS: u64 = 0x1003;

/// Low bits of socket(2)'s `type` argument; the rest are NONBLOCK/CLOEXEC
const SOCK_TYPE_MASK: u64 = 0xf;

/// Source of the rule list for every concern the assembler knows about
///
/// Every method defaults to the built-in list, so `HostFragments` is an empty
/// impl. Tests (and embedders with their own lists) override what they need.
pub trait FragmentProvider {
    fn base(&self) -> Vec<SyscallRule> {
        base_rules()
    }

    /// Empty unless the build carries sanitizer instrumentation
    fn instrumentation(&self) -> Vec<SyscallRule> {
        instrumentation_rules()
    }

    fn unrestricted_fs(&self) -> Vec<SyscallRule> {
        unrestricted_fs_rules()
    }

    fn console(&self) -> Vec<SyscallRule> {
        console_rules()
    }

    fn host_network(&self) -> Vec<SyscallRule> {
        host_network_rules()
    }

    fn ptrace(&self) -> Vec<SyscallRule> {
        ptrace_rules()
    }

    fn kvm(&self) -> Vec<SyscallRule> {
        kvm_rules()
    }
}

/// The crate's built-in lists
#[derive(Debug, Clone, Copy, Default)]
pub struct HostFragments;

impl FragmentProvider for HostFragments {}

// ═══════════════════════════════════════════════════════════════════════════
// base_rules() - What the monitor needs with every relaxation off
// ═══════════════════════════════════════════════════════════════════════════
// SYSCALL CATEGORIES:
//   1. Basic I/O on already-open fds
//   2. Memory management
//   3. Event loop (epoll, eventfd)
//   4. Signals
//   5. Threads (clone restricted to threads, clone3, rseq, futex)
//   6. Time and exit
// ═══════════════════════════════════════════════════════════════════════════
pub fn base_rules() -> Vec<SyscallRule> {
    let mut rules = vec![
        // ─────────────────────────────────────────────────────────────────
        // Basic I/O
        // ─────────────────────────────────────────────────────────────────
        SyscallRule::allow(libc::SYS_read),
        SyscallRule::allow(libc::SYS_write),
        SyscallRule::allow(libc::SYS_close),
        SyscallRule::allow(libc::SYS_lseek),
        SyscallRule::allow(libc::SYS_pread64),
        SyscallRule::allow(libc::SYS_pwrite64),
        SyscallRule::allow(libc::SYS_readv),
        SyscallRule::allow(libc::SYS_writev),
        SyscallRule::allow(libc::SYS_preadv),
        SyscallRule::allow(libc::SYS_pwritev),
        SyscallRule::allow(libc::SYS_recvmsg),
        SyscallRule::allow(libc::SYS_sendmsg),
        SyscallRule::allow(libc::SYS_shutdown),
        SyscallRule::allow(libc::SYS_dup),
        SyscallRule::allow(libc::SYS_fstat),
        SyscallRule::allow(libc::SYS_newfstatat),
        SyscallRule::allow(libc::SYS_fallocate),
        SyscallRule::allow(libc::SYS_fsync),
        SyscallRule::allow(libc::SYS_ftruncate),
        // fcntl: only flag queries/updates, no locks or fd passing tricks
        SyscallRule::allow_if(libc::SYS_fcntl, vec![ArgCondition::eq(1, libc::F_GETFL as u64)]),
        SyscallRule::allow_if(libc::SYS_fcntl, vec![ArgCondition::eq(1, libc::F_SETFL as u64)]),
        SyscallRule::allow_if(libc::SYS_fcntl, vec![ArgCondition::eq(1, libc::F_GETFD as u64)]),
        // ─────────────────────────────────────────────────────────────────
        // Memory
        // ─────────────────────────────────────────────────────────────────
        SyscallRule::allow(libc::SYS_mmap),
        SyscallRule::allow(libc::SYS_munmap),
        SyscallRule::allow(libc::SYS_mprotect),
        SyscallRule::allow(libc::SYS_madvise),
        SyscallRule::allow(libc::SYS_brk),
        SyscallRule::allow(libc::SYS_mincore),
        // ─────────────────────────────────────────────────────────────────
        // Event loop
        // ─────────────────────────────────────────────────────────────────
        SyscallRule::allow(libc::SYS_epoll_create1),
        SyscallRule::allow(libc::SYS_epoll_ctl),
        SyscallRule::allow(libc::SYS_epoll_pwait),
        SyscallRule::allow(libc::SYS_eventfd2),
        SyscallRule::allow(libc::SYS_ppoll),
        // ─────────────────────────────────────────────────────────────────
        // Signals
        // ─────────────────────────────────────────────────────────────────
        SyscallRule::allow(libc::SYS_rt_sigaction),
        SyscallRule::allow(libc::SYS_rt_sigprocmask),
        SyscallRule::allow(libc::SYS_rt_sigreturn),
        SyscallRule::allow(libc::SYS_sigaltstack),
        SyscallRule::allow(libc::SYS_restart_syscall),
        SyscallRule::allow(libc::SYS_setitimer),
        // ─────────────────────────────────────────────────────────────────
        // Threads - clone must share VM and be a thread, never a new process
        // ─────────────────────────────────────────────────────────────────
        SyscallRule::allow_if(
            libc::SYS_clone,
            vec![ArgCondition::masked_eq(
                0,
                (libc::CLONE_VM | libc::CLONE_THREAD) as u64,
                (libc::CLONE_VM | libc::CLONE_THREAD) as u64,
            )],
        ),
        // clone3 passes its flags in a struct behind a pointer, which seccomp
        // cannot inspect, so it is allowed unconditionally. glibc creates
        // every pthread with it and falls back to clone only on ENOSYS.
        SyscallRule::allow(libc::SYS_clone3),
        SyscallRule::allow(libc::SYS_rseq),
        SyscallRule::allow(libc::SYS_sched_getaffinity),
        SyscallRule::allow(libc::SYS_futex),
        SyscallRule::allow(libc::SYS_set_robust_list),
        SyscallRule::allow(libc::SYS_sched_yield),
        SyscallRule::allow(libc::SYS_getpid),
        SyscallRule::allow(libc::SYS_gettid),
        // ─────────────────────────────────────────────────────────────────
        // Time, randomness, exit
        // ─────────────────────────────────────────────────────────────────
        SyscallRule::allow(libc::SYS_clock_gettime),
        SyscallRule::allow(libc::SYS_gettimeofday),
        SyscallRule::allow(libc::SYS_nanosleep),
        SyscallRule::allow(libc::SYS_getrandom),
        SyscallRule::allow(libc::SYS_exit),
        SyscallRule::allow(libc::SYS_exit_group),
    ];

    #[cfg(target_arch = "x86_64")]
    {
        rules.push(SyscallRule::allow_if(
            libc::SYS_arch_prctl,
            vec![ArgCondition::eq(0, ARCH_GET_FS)],
        ));
        rules.push(SyscallRule::allow_if(
            libc::SYS_arch_prctl,
            vec![ArgCondition::eq(0, ARCH_SET_FS)],
        ));
        rules.push(SyscallRule::allow(libc::SYS_poll));
        rules.push(SyscallRule::allow(libc::SYS_epoll_wait));
    }

    rules
}

/// Extra syscalls the sanitizer runtimes make on their own
#[cfg(feature = "sanitizers")]
pub fn instrumentation_rules() -> Vec<SyscallRule> {
    let mut rules = vec![
        SyscallRule::allow(libc::SYS_brk),
        SyscallRule::allow(libc::SYS_munmap),
        SyscallRule::allow(libc::SYS_nanosleep),
        SyscallRule::allow(libc::SYS_openat),
        SyscallRule::allow(libc::SYS_readlinkat),
        SyscallRule::allow(libc::SYS_sched_getaffinity),
        SyscallRule::allow(libc::SYS_set_robust_list),
        SyscallRule::allow(libc::SYS_mincore),
    ];

    #[cfg(target_arch = "x86_64")]
    {
        rules.push(SyscallRule::allow(libc::SYS_open));
        rules.push(SyscallRule::allow(libc::SYS_readlink));
    }

    rules
}

/// Extra syscalls the sanitizer runtimes make on their own
#[cfg(not(feature = "sanitizers"))]
pub fn instrumentation_rules() -> Vec<SyscallRule> {
    Vec::new()
}

/// Direct access to host files: path-based `*at` calls, metadata, xattrs
pub fn unrestricted_fs_rules() -> Vec<SyscallRule> {
    let mut rules = vec![
        SyscallRule::allow(libc::SYS_openat),
        SyscallRule::allow(libc::SYS_fchmod),
        SyscallRule::allow(libc::SYS_fchmodat),
        SyscallRule::allow(libc::SYS_fchown),
        SyscallRule::allow(libc::SYS_fchownat),
        SyscallRule::allow(libc::SYS_fgetxattr),
        SyscallRule::allow(libc::SYS_fsetxattr),
        SyscallRule::allow(libc::SYS_flistxattr),
        SyscallRule::allow(libc::SYS_fstatfs),
        SyscallRule::allow(libc::SYS_fdatasync),
        SyscallRule::allow(libc::SYS_getdents64),
        SyscallRule::allow(libc::SYS_linkat),
        SyscallRule::allow(libc::SYS_mkdirat),
        SyscallRule::allow(libc::SYS_mknodat),
        SyscallRule::allow(libc::SYS_readlinkat),
        SyscallRule::allow(libc::SYS_renameat2),
        SyscallRule::allow(libc::SYS_symlinkat),
        SyscallRule::allow(libc::SYS_unlinkat),
        SyscallRule::allow(libc::SYS_utimensat),
    ];

    #[cfg(target_arch = "x86_64")]
    {
        rules.push(SyscallRule::allow(libc::SYS_renameat));
        rules.push(SyscallRule::allow(libc::SYS_getdents));
    }

    rules
}

/// Terminal control on the console fd, nothing else through ioctl
pub fn console_rules() -> Vec<SyscallRule> {
    [
        libc::TCGETS as u64,
        libc::TCSETS as u64,
        libc::TCSETSF as u64,
        libc::TCSETSW as u64,
        libc::TIOCGWINSZ as u64,
        libc::TIOCSWINSZ as u64,
        libc::TIOCGPGRP as u64,
        libc::TIOCSPGRP as u64,
    ]
    .into_iter()
    .map(|request| SyscallRule::allow_if(libc::SYS_ioctl, vec![ArgCondition::eq(1, request)]))
    .collect()
}

/// Host network stack: INET sockets plus the calls to drive them
pub fn host_network_rules() -> Vec<SyscallRule> {
    let mut rules = Vec::new();

    // socket(domain, type, ...) for TCP/UDP over v4 and v6 only
    for domain in [libc::AF_INET, libc::AF_INET6] {
        for sock_type in [libc::SOCK_STREAM, libc::SOCK_DGRAM] {
            rules.push(SyscallRule::allow_if(
                libc::SYS_socket,
                vec![
                    ArgCondition::eq(0, domain as u64),
                    ArgCondition::masked_eq(1, SOCK_TYPE_MASK, sock_type as u64),
                ],
            ));
        }
    }

    rules.extend([
        SyscallRule::allow(libc::SYS_accept4),
        SyscallRule::allow(libc::SYS_bind),
        SyscallRule::allow(libc::SYS_connect),
        SyscallRule::allow(libc::SYS_listen),
        SyscallRule::allow(libc::SYS_getpeername),
        SyscallRule::allow(libc::SYS_getsockname),
        SyscallRule::allow(libc::SYS_getsockopt),
        SyscallRule::allow(libc::SYS_setsockopt),
        SyscallRule::allow(libc::SYS_recvfrom),
        SyscallRule::allow(libc::SYS_sendto),
        SyscallRule::allow(libc::SYS_recvmmsg),
        SyscallRule::allow(libc::SYS_sendmmsg),
    ]);

    // Interface queries and queue sizes
    for request in [
        libc::SIOCGIFFLAGS as u64,
        libc::SIOCGIFCONF as u64,
        libc::TIOCOUTQ as u64,
        libc::FIONREAD as u64,
    ] {
        rules.push(SyscallRule::allow_if(
            libc::SYS_ioctl,
            vec![ArgCondition::eq(1, request)],
        ));
    }

    rules
}

/// ptrace backend: drive stub processes through ptrace and wait4
pub fn ptrace_rules() -> Vec<SyscallRule> {
    vec![
        SyscallRule::allow(libc::SYS_ptrace),
        SyscallRule::allow(libc::SYS_wait4),
        SyscallRule::allow(libc::SYS_tgkill),
        SyscallRule::allow(libc::SYS_getcpu),
        SyscallRule::allow(libc::SYS_sched_setaffinity),
    ]
}

/// KVM backend: vCPU control through /dev/kvm ioctls and signal waits
pub fn kvm_rules() -> Vec<SyscallRule> {
    let mut rules = vec![
        SyscallRule::allow(libc::SYS_ioctl),
        SyscallRule::allow(libc::SYS_mmap),
        SyscallRule::allow(libc::SYS_futex),
        SyscallRule::allow(libc::SYS_rt_sigsuspend),
        SyscallRule::allow(libc::SYS_rt_sigtimedwait),
    ];

    #[cfg(target_arch = "x86_64")]
    rules.push(SyscallRule::allow(libc::SYS_arch_prctl));

    rules
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_has_syscalls() {
        assert!(base_rules().len() > 40);
    }

    #[test]
    fn test_base_never_allows_exec() {
        let rules = base_rules();
        assert!(rules.iter().all(|r| r.sysno != libc::SYS_execve));
        assert!(rules.iter().all(|r| r.sysno != libc::SYS_ptrace));
    }

    #[test]
    fn test_base_clone_is_restricted_to_threads() {
        let clone = base_rules()
            .into_iter()
            .find(|r| r.sysno == libc::SYS_clone)
            .expect("clone rule");
        assert!(!clone.is_unconditional());
    }

    #[test]
    fn test_base_allows_pthread_creation() {
        let rules = base_rules();
        for sysno in [libc::SYS_clone3, libc::SYS_rseq, libc::SYS_sched_getaffinity] {
            assert!(
                rules.iter().any(|r| r.sysno == sysno && r.is_unconditional()),
                "syscall {} missing from base",
                sysno
            );
        }
    }

    #[test]
    fn test_console_only_touches_ioctl() {
        let rules = console_rules();
        assert!(!rules.is_empty());
        assert!(rules.iter().all(|r| r.sysno == libc::SYS_ioctl && !r.is_unconditional()));
    }

    #[test]
    fn test_host_network_socket_rules_are_conditional() {
        let sockets: Vec<_> = host_network_rules()
            .into_iter()
            .filter(|r| r.sysno == libc::SYS_socket)
            .collect();
        assert_eq!(sockets.len(), 4);
        assert!(sockets.iter().all(|r| r.conditions.len() == 2));
    }

    #[test]
    fn test_backend_fragments_differ() {
        assert!(ptrace_rules().iter().any(|r| r.sysno == libc::SYS_ptrace));
        assert!(kvm_rules().iter().all(|r| r.sysno != libc::SYS_ptrace));
    }

    #[cfg(not(feature = "sanitizers"))]
    #[test]
    fn test_instrumentation_empty_without_sanitizers() {
        assert!(instrumentation_rules().is_empty());
    }

    #[cfg(feature = "sanitizers")]
    #[test]
    fn test_instrumentation_present_with_sanitizers() {
        assert!(!instrumentation_rules().is_empty());
    }

    #[test]
    fn test_host_fragments_uses_builtin_lists() {
        let provider = HostFragments;
        assert_eq!(provider.base(), base_rules());
        assert_eq!(provider.kvm(), kvm_rules());
    }
}
