//! Tracing setup for the `runtest` driver.

use tracing_subscriber::{Layer, filter::Targets, layer::SubscriberExt, util::SubscriberInitExt};

/// Targets used by the harness library for its diagnostic events.
const HARNESS_TARGETS: &[&str] = &["directives", "pipeline", "suite"];

/// Installs a stderr subscriber. Harness events are shown at WARN and above,
/// or at DEBUG and above when `verbose` is set.
pub(crate) fn init(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };

    let filter = Targets::new()
        .with_default(tracing_subscriber::filter::LevelFilter::WARN)
        .with_targets(HARNESS_TARGETS.iter().map(|target| (*target, level)));

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .with_filter(filter);

    if tracing_subscriber::registry().with(layer).try_init().is_err() {
        // Something went wrong; proceed on anyway but complain audibly.
        eprintln!("warning: failed to initialize tracing.");
    }
}
