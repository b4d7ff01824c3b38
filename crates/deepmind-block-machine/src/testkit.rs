use tracing_subscriber::{
    EnvFilter,
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
};

/// Installs a trace-level subscriber for this crate's own modules. Safe to
/// call from every test; the second and later calls are no-ops.
pub fn setup_tracing_test() {
    let _ = setup_tracing_test_for("deepmind_block_machine");
}

pub fn setup_tracing_test_for(module: &str) -> Result<(), TryInitError> {
    let io_layer = tracing_subscriber::fmt::layer()
        .with_ansi(true)
        .with_line_number(true);

    let level_layer = EnvFilter::builder()
        .with_default_directive(format!("{module}=trace").parse().expect("invalid module"))
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(io_layer)
        .with(level_layer)
        .try_init()?;
    Ok(())
}
