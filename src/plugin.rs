//! Purpose: Capability interface the dnf5 host drives, and the prez_pkglog shell implementing it.
//! Exports: `Plugin`, `Command`, `Lifecycle`, `PrezPkglogPlugin`.
//! Role: Rust-side half of the plugin ABI; `abi` adapts these calls to C linkage.
//! Invariants: Metadata queries are pure and infallible.
//! Invariants: `init` writes exactly one diagnostic line per instance; `finish` is terminal.
//! Notes: No transaction data is observed; the shell only reports that it loaded.
use std::ffi::CStr;
use std::fmt;
use std::io::{self, Write};
use std::ptr::NonNull;

use crate::abi::dnf5_context;
use crate::core::config::PluginConfig;
use crate::core::metadata::{
    ApplicationVersion, PLUGIN_NAME, PluginApiVersion, PluginVersion, Revision,
};

/// A CLI sub-command a plugin contributes to the host.
pub trait Command {
    fn name(&self) -> &str;
}

/// Operations the host calls on a live plugin instance.
pub trait Plugin {
    fn api_version(&self) -> PluginApiVersion;

    fn name(&self) -> &'static CStr;

    fn version(&self) -> PluginVersion;

    /// Extension attribute keys. Empty when the plugin declares none.
    fn attributes(&self) -> &[&'static CStr] {
        &[]
    }

    fn attribute(&self, _name: &str) -> Option<&'static CStr> {
        None
    }

    fn create_commands(&mut self) -> Vec<Box<dyn Command>> {
        Vec::new()
    }

    /// Called once after construction, with the host context already bound.
    fn init(&mut self);

    /// Called once before the host destroys the instance.
    fn finish(&mut self);
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Lifecycle {
    Constructed,
    Finished,
}

pub struct PrezPkglogPlugin {
    context: NonNull<dnf5_context>,
    application_version: ApplicationVersion,
    revision: Revision,
    config: PluginConfig,
    lifecycle: Lifecycle,
    initialized: bool,
    diagnostics: Box<dyn Write>,
}

impl PrezPkglogPlugin {
    pub fn new(
        context: NonNull<dnf5_context>,
        application_version: ApplicationVersion,
        config: PluginConfig,
    ) -> Self {
        Self {
            context,
            application_version,
            revision: Revision::active(),
            config,
            lifecycle: Lifecycle::Constructed,
            initialized: false,
            diagnostics: Box::new(io::stderr()),
        }
    }

    pub fn with_revision(mut self, revision: Revision) -> Self {
        self.revision = revision;
        self
    }

    pub fn with_diagnostics(mut self, sink: impl Write + 'static) -> Self {
        self.diagnostics = Box::new(sink);
        self
    }

    pub fn context(&self) -> NonNull<dnf5_context> {
        self.context
    }

    pub fn application_version(&self) -> ApplicationVersion {
        self.application_version
    }

    pub fn revision(&self) -> Revision {
        self.revision
    }

    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    fn status_line(&self) -> String {
        let name = PLUGIN_NAME.to_string_lossy();
        if self.config.enabled {
            return format!("[{name}] {}", self.revision.status_message());
        }
        let source = self
            .config
            .source
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "defaults".to_string());
        format!("[{name}] DNF5 plugin disabled by configuration ({source})")
    }
}

impl fmt::Debug for PrezPkglogPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrezPkglogPlugin")
            .field("context", &self.context)
            .field("application_version", &self.application_version)
            .field("revision", &self.revision)
            .field("config", &self.config)
            .field("lifecycle", &self.lifecycle)
            .field("initialized", &self.initialized)
            .finish_non_exhaustive()
    }
}

impl Plugin for PrezPkglogPlugin {
    fn api_version(&self) -> PluginApiVersion {
        self.revision.api_version()
    }

    fn name(&self) -> &'static CStr {
        PLUGIN_NAME
    }

    fn version(&self) -> PluginVersion {
        self.revision.version()
    }

    fn init(&mut self) {
        if self.lifecycle == Lifecycle::Finished {
            tracing::warn!("init called after finish, ignoring");
            return;
        }
        if self.initialized {
            tracing::warn!("init called twice, ignoring");
            return;
        }
        self.initialized = true;
        tracing::debug!(
            application_version = %self.application_version,
            revision = ?self.revision,
            enabled = self.config.enabled,
            scope = %self.config.scope,
            "plugin init"
        );
        let line = self.status_line();
        // The host owns stderr; a failed diagnostic write is not a plugin fault.
        let _ = writeln!(self.diagnostics, "{line}");
        let _ = self.diagnostics.flush();
    }

    fn finish(&mut self) {
        if self.lifecycle == Lifecycle::Finished {
            tracing::warn!("finish called twice, ignoring");
            return;
        }
        self.lifecycle = Lifecycle::Finished;
        tracing::debug!("plugin finish");
    }
}

#[cfg(test)]
mod tests {
    use super::{Lifecycle, Plugin, PrezPkglogPlugin};
    use crate::abi::dnf5_context;
    use crate::core::config::PluginConfig;
    use crate::core::metadata::{ApplicationVersion, PluginApiVersion, PluginVersion, Revision};
    use std::io::{self, Write};
    use std::path::PathBuf;
    use std::ptr::NonNull;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl SharedSink {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct BrokenSink;

    impl Write for BrokenSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }
    }

    const APP: ApplicationVersion = ApplicationVersion {
        major: 5,
        minor: 2,
        micro: 0,
    };

    fn shell(config: PluginConfig, sink: SharedSink) -> PrezPkglogPlugin {
        PrezPkglogPlugin::new(NonNull::<dnf5_context>::dangling(), APP, config)
            .with_diagnostics(sink)
    }

    #[test]
    fn metadata_matches_revision() {
        let plugin = shell(PluginConfig::default(), SharedSink::default())
            .with_revision(Revision::Scaffold);
        assert_eq!(plugin.name().to_str().unwrap(), "prez_pkglog");
        assert_eq!(plugin.api_version(), PluginApiVersion { major: 2, minor: 0 });
        assert_eq!(
            plugin.version(),
            PluginVersion {
                major: 0,
                minor: 1,
                micro: 0
            }
        );
        assert_eq!(plugin.application_version(), APP);
    }

    #[test]
    fn no_attributes_or_commands() {
        let mut plugin = shell(PluginConfig::default(), SharedSink::default());
        assert!(plugin.attributes().is_empty());
        assert!(plugin.attribute("anything").is_none());
        assert!(plugin.attribute("").is_none());
        assert!(plugin.create_commands().is_empty());
    }

    #[test]
    fn init_writes_one_line_per_instance() {
        let sink = SharedSink::default();
        let mut plugin =
            shell(PluginConfig::default(), sink.clone()).with_revision(Revision::ActionsBridge);
        plugin.init();
        plugin.init();
        let text = sink.text();
        assert_eq!(text.lines().count(), 1);
        assert_eq!(
            text,
            "[prez_pkglog] DNF5 plugin initialized (transaction logging via Actions Plugin)\n"
        );
    }

    #[test]
    fn scaffold_revision_init_line() {
        let sink = SharedSink::default();
        let mut plugin =
            shell(PluginConfig::default(), sink.clone()).with_revision(Revision::Scaffold);
        plugin.init();
        assert_eq!(
            sink.text(),
            "[prez_pkglog] libdnf5 plugin initialised (no-op scaffold)\n"
        );
    }

    #[test]
    fn disabled_config_changes_status_line() {
        let sink = SharedSink::default();
        let config = PluginConfig {
            enabled: false,
            source: Some(PathBuf::from("/etc/dnf/plugins/prez_pkglog.conf")),
            ..PluginConfig::default()
        };
        let mut plugin = shell(config, sink.clone());
        plugin.init();
        assert_eq!(
            sink.text(),
            "[prez_pkglog] DNF5 plugin disabled by configuration (/etc/dnf/plugins/prez_pkglog.conf)\n"
        );
    }

    #[test]
    fn finish_is_terminal() {
        let sink = SharedSink::default();
        let mut plugin = shell(PluginConfig::default(), sink.clone());
        assert_eq!(plugin.lifecycle(), Lifecycle::Constructed);
        plugin.finish();
        assert_eq!(plugin.lifecycle(), Lifecycle::Finished);
        plugin.finish();
        plugin.init();
        assert_eq!(plugin.lifecycle(), Lifecycle::Finished);
        assert!(sink.text().is_empty());
    }

    #[test]
    fn broken_sink_does_not_fault() {
        let mut plugin = PrezPkglogPlugin::new(
            NonNull::<dnf5_context>::dangling(),
            APP,
            PluginConfig::default(),
        )
        .with_diagnostics(BrokenSink);
        plugin.init();
        plugin.finish();
    }
}
