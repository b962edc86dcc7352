use tracing_subscriber::EnvFilter;

/// Log to stderr, filtered by `RUST_LOG` plus `default_directive`.
///
/// stdout is reserved for frames (editor stdio mode) and JSON results.
pub fn init(default_directive: &str) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive(default_directive.parse()?))
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
}
