//! Test infrastructure for Cadence.
//!
//! Wires the scheduling engine to in-memory collaborators so scenarios can
//! be driven end to end without pollers or a database.
//!
//! # Usage
//!
//! ```ignore
//! use cadence_tests::TestContext;
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let ctx = TestContext::loaded(configuration).await.unwrap();
//!     // Use ctx.engine, ctx.poller, ctx.queue, etc.
//! }
//! ```

pub mod context;
pub mod fixtures;
pub mod helpers;

pub use context::TestContext;
pub use fixtures::*;
pub use helpers::*;

/// Initialize test logging (safe to call from every test).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,cadence_scheduler=debug")),
        )
        .with_test_writer()
        .try_init();
}
