use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Filter directive used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_DIRECTIVE: &str = "info";

/// Install the global subscriber.
///
/// `RUST_LOG` wins; otherwise `default_directive` applies.
pub fn init_tracing(default_directive: &str) -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(filter(default_directive))
        .with(fmt::layer().with_target(true))
        .try_init()?;
    Ok(())
}

fn filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_default_falls_back() {
        // SAFETY: single-threaded test touching only RUST_LOG
        unsafe { std::env::remove_var("RUST_LOG") };
        assert_eq!(filter("tentacle_hub=debug").to_string(), "tentacle_hub=debug");
        assert_eq!(filter("=[").to_string(), DEFAULT_DIRECTIVE);
    }
}
