//! Test support for rps-steer: packet builders, instrumented handlers and
//! tracing setup shared by the integration tests and the bench binary.

pub mod handlers;
pub mod packets;

pub mod util {
    use tracing_subscriber::EnvFilter;

    /// Install a fmt subscriber once per process. Respects RUST_LOG and
    /// defaults to `warn` so test output stays quiet.
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    }
}
