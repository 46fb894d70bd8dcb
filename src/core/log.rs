//! Tracing setup. Logs go to stderr so tables on stdout stay clean.
//!
//! With `--verbose` the crate logs at debug level and every `Aggregate` span
//! reports its duration when it closes. `RUST_LOG` overrides both.
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    prelude::__tracing_subscriber_SubscriberExt,
    util::SubscriberInitExt,
};

/// Directives used when `RUST_LOG` is unset.
fn default_directives(verbose: bool) -> &'static str {
    if verbose {
        "warn,keyledger=debug"
    } else {
        "off"
    }
}

fn span_events(verbose: bool) -> FmtSpan {
    if verbose { FmtSpan::CLOSE } else { FmtSpan::NONE }
}

pub fn init_logging(verbose: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .compact()
                .without_time()
                .with_span_events(span_events(verbose))
                .with_writer(std::io::stderr),
        )
        .with(env_filter)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_enables_crate_debug_and_span_timing() {
        let verbose = EnvFilter::new(default_directives(true)).to_string();
        assert!(verbose.contains("keyledger=debug"));
        assert_eq!(span_events(true), FmtSpan::CLOSE);

        assert_eq!(default_directives(false), "off");
        assert_eq!(span_events(false), FmtSpan::NONE);
    }
}
