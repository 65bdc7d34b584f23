//! Purpose: Static identity and version values the plugin reports to dnf5.
//! Exports: `PLUGIN_NAME`, `REQUIRED_API_VERSION`, version structs, `Revision`.
//! Role: Single source for the values returned by every metadata query.
//! Invariants: Version structs are `#[repr(C)]` with `u16` fields to match the host layout.
//! Invariants: All values are fixed at build time and never mutated.
use std::ffi::CStr;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::core::error::{Error, ErrorKind};

/// Name the host uses as the lookup key for this plugin.
pub const PLUGIN_NAME: &CStr = c"prez_pkglog";

/// Host capability interface this plugin was built against.
pub const REQUIRED_API_VERSION: PluginApiVersion = PluginApiVersion { major: 2, minor: 0 };

#[repr(C)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct PluginApiVersion {
    pub major: u16,
    pub minor: u16,
}

impl PluginApiVersion {
    /// Advisory check mirroring the host policy: same major, host minor not older.
    pub fn is_compatible_with(&self, host: PluginApiVersion) -> bool {
        self.major == host.major && host.minor >= self.minor
    }
}

impl fmt::Display for PluginApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for PluginApiVersion {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            Error::new(ErrorKind::Usage)
                .with_message(format!("invalid api version '{input}' (expected MAJOR.MINOR)"))
        };
        let (major, minor) = input.trim().split_once('.').ok_or_else(invalid)?;
        let major = major.parse().map_err(|_| invalid())?;
        let minor = minor.parse().map_err(|_| invalid())?;
        Ok(Self { major, minor })
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct PluginVersion {
    pub major: u16,
    pub minor: u16,
    pub micro: u16,
}

impl fmt::Display for PluginVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)
    }
}

/// Version of the dnf5 application loading the plugin.
#[repr(C)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct ApplicationVersion {
    pub major: u16,
    pub minor: u16,
    pub micro: u16,
}

impl fmt::Display for ApplicationVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)
    }
}

/// Released builds of the plugin. They differ only in version and status text.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Revision {
    Scaffold,
    ActionsBridge,
}

impl Revision {
    /// Revision exported through the `dnf5_plugin_*` symbols.
    pub const fn active() -> Self {
        if cfg!(feature = "scaffold-revision") {
            Revision::Scaffold
        } else {
            Revision::ActionsBridge
        }
    }

    pub const fn version(self) -> PluginVersion {
        match self {
            Revision::Scaffold => PluginVersion {
                major: 0,
                minor: 1,
                micro: 0,
            },
            Revision::ActionsBridge => PluginVersion {
                major: 0,
                minor: 6,
                micro: 3,
            },
        }
    }

    pub const fn version_str(self) -> &'static str {
        match self {
            Revision::Scaffold => "0.1.0",
            Revision::ActionsBridge => "0.6.3",
        }
    }

    pub const fn api_version(self) -> PluginApiVersion {
        REQUIRED_API_VERSION
    }

    pub const fn status_message(self) -> &'static str {
        match self {
            Revision::Scaffold => "libdnf5 plugin initialised (no-op scaffold)",
            Revision::ActionsBridge => {
                "DNF5 plugin initialized (transaction logging via Actions Plugin)"
            }
        }
    }
}
