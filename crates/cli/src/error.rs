use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
	#[error(transparent)]
	Engine(#[from] swm::Error),

	#[error("invalid JSON in {what}: {source}")]
	Json {
		what: String,
		#[source]
		source: serde_json::Error,
	},

	#[error("invalid launch context '{0}', expected NAME=REFERENCE")]
	LaunchContextArg(String),

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Anyhow(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CliError>;
