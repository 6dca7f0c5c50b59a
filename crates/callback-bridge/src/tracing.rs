//! # Observability & Tracing
//!
//! [`setup_tracing`] installs a compact `tracing-subscriber` formatter filtered by
//! `RUST_LOG`. Every log line from a bridge carries a `resource` field, and lines about an
//! operation also carry `op`, so one key or one operation can be followed end to end.
//!
//! ## Levels
//!
//! - `info`: lifecycle (bridge start/stop, `Loading`, `Ready`, operation in flight/finished)
//! - `debug`: payloads (translated events, rewards, revenue amounts, ignored messages)
//! - `warn`: load failures, SDK rejections, timeouts, dropped events and duplicate
//!   settlements
//!
//! ```bash
//! RUST_LOG=info cargo run --bin sdk-demo
//! RUST_LOG=callback_bridge=debug cargo run --bin sdk-demo
//! ```
//!
//! With `RUST_LOG=info` a rewarded show reads:
//!
//! ```text
//! INFO Loading resource=rewarded_main attempt=0
//! INFO Ready resource=rewarded_main
//! INFO show: Operation in flight resource=rewarded_main op=op_1 kind=Show
//! INFO Operation finished resource=rewarded_main op=op_1 status=Success
//! INFO Loading resource=rewarded_main attempt=0
//! ```

/// Installs the global subscriber. Call once, at program start.
pub fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();
}
