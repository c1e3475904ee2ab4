//! sandbox-filter - seccomp policy assembly for a sandbox monitor
//!
//! Builds the complete allow-list of host syscalls the monitor process may
//! issue, from the execution backend in effect and a few trust-relaxation
//! flags, then installs it as a fail-closed seccomp filter.
//!
//! # Modules
//!
//! - `filter` - policy assembly, fragments, reporting and installation
//! - `config` - startup configuration loaded from JSON
//! - `logging` - tracing-subscriber setup
//!
//! # Quick Start
//!
//! ```ignore
//! use sandbox_filter::{BackendKind, SyscallFilter, TrustFlags};
//! use sandbox_filter::filter::SeccompInstaller;
//!
//! let filter = SyscallFilter::new();
//! filter.install(&BackendKind::Kvm, TrustFlags::default(), &SeccompInstaller::new())?;
//! ```

pub mod config;
pub mod filter;
pub mod logging;

// Re-export commonly used types at crate root for convenience
pub use config::{ConfigError, FilterConfig};
pub use filter::{
    AssembledPolicy, BackendKind, FilterError, FragmentKind, SyscallFilter, TrustFlags,
    ViolationMode,
};
