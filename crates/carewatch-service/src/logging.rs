use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Initialize process-wide structured logging.
///
/// Respects `RUST_LOG`; `default_directive` (e.g. `"carewatch=info"`)
/// applies when the environment does not override it.
pub fn init(default_directive: &str) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(default_directive.parse()?))
        .init();
    Ok(())
}
