//! Log setup for the `swm` binary.
//!
//! Logs go to stderr; stdout carries only protocol JSON.

use tracing_subscriber::EnvFilter;

/// Filter directive for a `-v` count.
pub fn directive(verbose: u8) -> &'static str {
	match verbose {
		0 => "warn",
		1 => "info,swm=info",
		2 => "debug",
		_ => "trace",
	}
}

/// Installs the global subscriber. `RUST_LOG` wins when no `-v` is given.
pub fn init_logging(verbose: u8) {
	let filter = if verbose == 0 {
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive(0)))
	} else {
		EnvFilter::new(directive(verbose))
	};

	let _ = tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.with_target(true)
		.try_init();
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn verbosity_raises_level() {
		assert_eq!(directive(0), "warn");
		assert_eq!(directive(2), "debug");
		assert_eq!(directive(7), "trace");
	}
}
