// Core modules for plugin identity, configuration, and error modeling.
pub mod config;
pub mod error;
pub mod metadata;
