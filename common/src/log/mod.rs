pub mod tracing_factory;

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Minimal stdout-only initializer for unit/integration tests; production
/// startup goes through `TracingFactory` instead (§13).
pub fn init_test_log() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::TRACE).finish();

    // Ignore the error if a global subscriber has already been set.
    let _ = tracing::subscriber::set_global_default(subscriber);
}
