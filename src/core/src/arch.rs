//! Package architectures.
//!
//! Repositories are laid out per APK architecture name (`x86_64`,
//! `aarch64`, ...). Users frequently pass OCI/Go names instead
//! (`amd64`, `arm64`), so parsing accepts both.

use serde::{Deserialize, Serialize};

use crate::error::{ChartError, Result};

/// Fallback architecture when neither the request nor the provider sets one.
pub const DEFAULT_ARCH: Arch = Arch::Aarch64;

/// APK package architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Arch {
    X86_64,
    Aarch64,
    Armv7,
    Armhf,
    X86,
    Ppc64le,
    S390x,
    Riscv64,
}

impl Arch {
    /// Name used in repository paths and APKINDEX `A:` fields.
    pub fn apk_name(&self) -> &'static str {
        match self {
            Arch::X86_64 => "x86_64",
            Arch::Aarch64 => "aarch64",
            Arch::Armv7 => "armv7",
            Arch::Armhf => "armhf",
            Arch::X86 => "x86",
            Arch::Ppc64le => "ppc64le",
            Arch::S390x => "s390x",
            Arch::Riscv64 => "riscv64",
        }
    }

    /// Name used by OCI platforms.
    pub fn oci_name(&self) -> &'static str {
        match self {
            Arch::X86_64 => "amd64",
            Arch::Aarch64 => "arm64",
            Arch::Armv7 | Arch::Armhf => "arm",
            Arch::X86 => "386",
            Arch::Ppc64le => "ppc64le",
            Arch::S390x => "s390x",
            Arch::Riscv64 => "riscv64",
        }
    }

    /// Pick the architecture for one build: request override, then the
    /// provider default, then [`DEFAULT_ARCH`].
    pub fn resolve(request: Option<Arch>, provider_default: Option<Arch>) -> Arch {
        request.or(provider_default).unwrap_or(DEFAULT_ARCH)
    }
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.apk_name())
    }
}

impl std::str::FromStr for Arch {
    type Err = ChartError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "x86_64" | "amd64" => Ok(Arch::X86_64),
            "aarch64" | "arm64" => Ok(Arch::Aarch64),
            "armv7" | "arm/v7" => Ok(Arch::Armv7),
            "armhf" | "arm" | "arm/v6" => Ok(Arch::Armhf),
            "x86" | "386" | "i386" => Ok(Arch::X86),
            "ppc64le" => Ok(Arch::Ppc64le),
            "s390x" => Ok(Arch::S390x),
            "riscv64" => Ok(Arch::Riscv64),
            other => Err(ChartError::ConfigError(format!(
                "unknown architecture '{}'",
                other
            ))),
        }
    }
}

impl TryFrom<String> for Arch {
    type Error = ChartError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Arch> for String {
    fn from(arch: Arch) -> Self {
        arch.apk_name().to_string()
    }
}
