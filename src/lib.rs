//! Purpose: prez_pkglog plugin for the dnf5 package manager.
//! Exports: `core` (identity, config, errors), `plugin` (capability trait + shell), `abi` (C symbols).
//! Role: Built as a `cdylib` that dnf5 loads; the `rlib` backs the inspection binary and tests.
//! Invariants: The exported `dnf5_plugin_*` symbols never unwind into the host.
//! Invariants: The plugin observes no transaction data.
pub mod abi;
pub mod core;
pub mod logging;
pub mod plugin;
