//! Execution backend selection
//!
//! The backend decides which extra syscalls the monitor needs: the ptrace
//! backend drives stub processes with ptrace(2), the KVM backend runs guest
//! code on vCPUs through /dev/kvm. Exactly one is active per process.

use std::fmt;
use std::fs::OpenOptions;
use std::path::Path;

const KVM_DEVICE: &str = "/dev/kvm";

/// Backend in effect for this process
///
/// `Unrecognized` holds a configured name that matched no known backend.
/// It exists so the mistake reaches the assembler, which refuses to build a
/// policy for it, instead of being replaced by some default.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Ptrace,
    Kvm,
    Unrecognized(String),
}

impl BackendKind {
    /// Resolve a configured backend name
    ///
    /// `"auto"` runs `detect()`. Names must match exactly; anything else,
    /// including case or whitespace variants, becomes `Unrecognized`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "ptrace" => BackendKind::Ptrace,
            "kvm" => BackendKind::Kvm,
            "auto" => Self::detect(),
            _ => BackendKind::Unrecognized(name.to_string()),
        }
    }

    /// Pick KVM when /dev/kvm is usable, ptrace otherwise
    pub fn detect() -> Self {
        Self::detect_with(Path::new(KVM_DEVICE))
    }

    fn detect_with(kvm_device: &Path) -> Self {
        match OpenOptions::new().read(true).write(true).open(kvm_device) {
            Ok(_) => {
                tracing::debug!(device = %kvm_device.display(), "KVM available, using kvm backend");
                BackendKind::Kvm
            }
            Err(e) => {
                tracing::debug!(
                    device = %kvm_device.display(),
                    error = %e,
                    "KVM unavailable, falling back to ptrace backend"
                );
                BackendKind::Ptrace
            }
        }
    }

    pub fn name(&self) -> &str {
        match self {
            BackendKind::Ptrace => "ptrace",
            BackendKind::Kvm => "kvm",
            BackendKind::Unrecognized(name) => name,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
