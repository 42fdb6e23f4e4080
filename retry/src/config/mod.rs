/// Layered retry settings
///
/// 1. Defaults (from code)
/// 2. Config file (retry.toml)
/// 3. Environment variables (RETRY_* prefix)
///
/// # Example
///
/// ```no_run
/// use codex_retry::config::ConfigLoader;
///
/// let settings = ConfigLoader::load_default().expect("Failed to load retry settings");
/// let policy = settings.to_policy();
/// ```
pub mod error;
pub mod loader;

pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, RetrySettings};
