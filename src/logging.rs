// src/logging.rs
//
// tracing-subscriber setup for the binary. RUST_LOG wins over the defaults.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Default filter directives: our crate at `level`, codecs kept quiet.
pub fn default_directives(verbose: bool) -> String {
    let level = if verbose { "debug" } else { "info" };
    format!("{level},clipshrink={level},oxipng=warn")
}

fn build_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)))
}

/// Install the global subscriber. Calling it twice is harmless; the second
/// call keeps the first subscriber.
pub fn init(verbose: bool) {
    let registry = tracing_subscriber::registry()
        .with(build_filter(verbose))
        .with(fmt::layer().with_target(verbose).with_writer(std::io::stderr));
    if registry.try_init().is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
