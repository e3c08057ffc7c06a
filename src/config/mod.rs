//! Configuration management for Lookout.
//!
//! Provides XDG-compliant settings storage for the store, retry policy and
//! logging.

mod settings;

pub use settings::{
    AppSettings, JournalMode, LogFormat, LogLevel, Paths, RetrySettings, StoreSettings,
};
