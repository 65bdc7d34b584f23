//! Purpose: Locate and parse the plugin's `prez_pkglog.conf` file.
//! Exports: `PluginConfig`, `Scope`, `default_config_path`, `effective_uid`.
//! Role: Decides whether the shell reports itself enabled and which scope it runs in.
//! Invariants: A missing config file yields defaults, never an error.
//! Invariants: `scope=system` is only honored for effective uid 0.
//! Notes: The format is the flat `key = value` dialect dnf plugin configs use.
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;

use crate::core::error::{Error, ErrorKind};

pub const ENV_CONFIG_PATH: &str = "PREZ_PKGLOG_CONFIG";
const SYSTEM_PLUGIN_DIR: &str = "/etc/dnf/plugins";
const CONFIG_FILE_NAME: &str = "prez_pkglog.conf";

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    #[default]
    User,
    System,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::User => f.write_str("user"),
            Scope::System => f.write_str("system"),
        }
    }
}

impl FromStr for Scope {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.to_ascii_lowercase().as_str() {
            "user" => Ok(Scope::User),
            "system" => Ok(Scope::System),
            _ => Err(Error::new(ErrorKind::Config)
                .with_message(format!("invalid scope '{input}' (expected user or system)"))),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct PluginConfig {
    pub enabled: bool,
    pub scope: Scope,
    pub source: Option<PathBuf>,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            scope: Scope::User,
            source: None,
        }
    }
}

impl PluginConfig {
    /// Loads the config from the default location, falling back to defaults on
    /// any fault, and applies scope validation for the current process.
    pub fn resolve() -> Self {
        let Some(path) = default_config_path() else {
            tracing::debug!("no usable config location, using defaults");
            return Self::default();
        };
        let config = match Self::load(&path) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(error = %err, "ignoring unreadable plugin config");
                Self::default()
            }
        };
        config.validate_scope(effective_uid())
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no plugin config, using defaults");
                return Ok(Self::default());
            }
            Err(err) => {
                let kind = if err.kind() == io::ErrorKind::PermissionDenied {
                    ErrorKind::Permission
                } else {
                    ErrorKind::Io
                };
                return Err(Error::new(kind)
                    .with_message("failed to read plugin config")
                    .with_path(path)
                    .with_source(err));
            }
        };
        let config = Self::parse(&text).map_err(|err| err.with_path(path))?;
        tracing::info!(path = %path.display(), "loaded plugin config");
        Ok(Self {
            source: Some(path.to_path_buf()),
            ..config
        })
    }

    pub fn parse(text: &str) -> Result<Self, Error> {
        let mut config = Self::default();
        for (index, raw) in text.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if line.starts_with('[') && line.ends_with(']') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(Error::new(ErrorKind::Config)
                    .with_message(format!("expected 'key = value', got '{line}'"))
                    .with_line(line_no));
            };
            let key = key.trim();
            let value = value.trim();
            match key {
                "enabled" => {
                    config.enabled = parse_bool(value).ok_or_else(|| {
                        Error::new(ErrorKind::Config)
                            .with_message(format!("invalid value for enabled: '{value}'"))
                            .with_line(line_no)
                    })?;
                }
                "scope" => {
                    config.scope = value
                        .parse::<Scope>()
                        .map_err(|err| err.with_line(line_no))?;
                }
                _ => tracing::debug!(key, line = line_no, "ignoring unknown config key"),
            }
        }
        Ok(config)
    }

    pub fn validate_scope(mut self, euid: u32) -> Self {
        if self.scope == Scope::System && euid != 0 {
            tracing::warn!(euid, "system scope requires root, falling back to user scope");
            self.scope = Scope::User;
        }
        self
    }
}

/// `None` when neither an override, the system directory, nor an absolute `HOME` is available.
pub fn default_config_path() -> Option<PathBuf> {
    resolve_config_path(
        std::env::var_os(ENV_CONFIG_PATH),
        Path::new(SYSTEM_PLUGIN_DIR),
        std::env::var_os("HOME"),
    )
}

fn resolve_config_path(
    env_override: Option<OsString>,
    system_dir: &Path,
    home: Option<OsString>,
) -> Option<PathBuf> {
    if let Some(path) = env_override.filter(|path| !path.is_empty()) {
        return Some(PathBuf::from(path));
    }
    if system_dir.is_dir() {
        return Some(system_dir.join(CONFIG_FILE_NAME));
    }
    // A relative HOME would resolve against the host's working directory.
    let home = PathBuf::from(home?);
    if !home.is_absolute() {
        return None;
    }
    Some(
        home.join(".config")
            .join("dnf")
            .join("plugins")
            .join(CONFIG_FILE_NAME),
    )
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn effective_uid() -> u32 {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() }
}

#[cfg(test)]
mod tests {
    use super::{PluginConfig, Scope, resolve_config_path};
    use crate::core::error::ErrorKind;
    use std::ffi::OsString;
    use std::path::PathBuf;

    #[test]
    fn empty_text_yields_defaults() {
        let config = PluginConfig::parse("").expect("parse");
        assert_eq!(config, PluginConfig::default());
        assert!(config.enabled);
        assert_eq!(config.scope, Scope::User);
    }

    #[test]
    fn parses_dnf_style_main_section() {
        let text = "[main]\n# comment\n; other comment\nenabled = 0\nscope=system\nname = prez\n";
        let config = PluginConfig::parse(text).expect("parse");
        assert!(!config.enabled);
        assert_eq!(config.scope, Scope::System);
    }

    #[test]
    fn boolean_spellings_are_case_insensitive() {
        for (value, expected) in [("True", true), ("NO", false), ("on", true), ("1", true)] {
            let config = PluginConfig::parse(&format!("enabled={value}")).expect("parse");
            assert_eq!(config.enabled, expected, "value {value}");
        }
    }

    #[test]
    fn malformed_line_reports_line_number() {
        let err = PluginConfig::parse("[main]\nenabled\n").expect_err("should fail");
        assert_eq!(err.kind(), ErrorKind::Config);
        assert_eq!(err.line(), Some(2));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = PluginConfig::parse("enabled = maybe").expect_err("bool");
        assert_eq!(err.line(), Some(1));

        let err = PluginConfig::parse("\n\nscope = global").expect_err("scope");
        assert_eq!(err.kind(), ErrorKind::Config);
        assert_eq!(err.line(), Some(3));
    }

    #[test]
    fn system_scope_downgrades_without_root() {
        let config = PluginConfig {
            scope: Scope::System,
            ..PluginConfig::default()
        };
        assert_eq!(config.clone().validate_scope(1000).scope, Scope::User);
        assert_eq!(config.validate_scope(0).scope, Scope::System);
    }

    #[test]
    fn load_missing_file_is_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = PluginConfig::load(&temp.path().join("absent.conf")).expect("load");
        assert_eq!(config, PluginConfig::default());
    }

    #[test]
    fn load_records_source_and_path_on_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let good = temp.path().join("good.conf");
        std::fs::write(&good, "enabled=0\n").expect("write");
        let config = PluginConfig::load(&good).expect("load");
        assert!(!config.enabled);
        assert_eq!(config.source.as_deref(), Some(good.as_path()));

        let bad = temp.path().join("bad.conf");
        std::fs::write(&bad, "scope = nowhere\n").expect("write");
        let err = PluginConfig::load(&bad).expect_err("should fail");
        assert_eq!(err.path(), Some(bad.as_path()));
    }

    #[test]
    fn config_path_prefers_override_then_system_dir() {
        let temp = tempfile::tempdir().expect("tempdir");
        let missing = temp.path().join("missing");

        let path = resolve_config_path(
            Some(OsString::from("/tmp/custom.conf")),
            temp.path(),
            Some(OsString::from("/home/u")),
        );
        assert_eq!(path, Some(PathBuf::from("/tmp/custom.conf")));

        let path = resolve_config_path(None, temp.path(), Some(OsString::from("/home/u")));
        assert_eq!(path, Some(temp.path().join("prez_pkglog.conf")));

        let path = resolve_config_path(Some(OsString::new()), &missing, Some("/home/u".into()));
        assert_eq!(
            path,
            Some(PathBuf::from("/home/u/.config/dnf/plugins/prez_pkglog.conf"))
        );
    }

    #[test]
    fn config_path_skips_missing_or_relative_home() {
        let temp = tempfile::tempdir().expect("tempdir");
        let missing = temp.path().join("missing");

        assert_eq!(resolve_config_path(None, &missing, None), None);
        assert_eq!(resolve_config_path(None, &missing, Some(OsString::new())), None);
        assert_eq!(
            resolve_config_path(None, &missing, Some(OsString::from("relative/home"))),
            None
        );
    }
}
