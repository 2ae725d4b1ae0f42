use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "swm")]
#[command(about = "SMART Web Messaging host engine from the command line")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug, -vvv trace)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Feed newline-delimited document messages through the engine and print replies
	Handle {
		/// Input file (defaults to stdin)
		file: Option<PathBuf>,
	},

	/// Print the envelope the host would send for a request
	Encode {
		#[command(subcommand)]
		kind: EncodeKind,
	},

	/// Render the default host page and print its file:// URL
	Page {
		/// SDC endpoint the form filler talks to
		#[arg(long, value_name = "URL")]
		sdc_endpoint: String,
		/// Optional data endpoint
		#[arg(long, value_name = "URL")]
		data_endpoint: Option<String>,
		/// Form filler SDK script
		#[arg(long, value_name = "URL", default_value = swm::DEFAULT_SDK_URL)]
		sdk_url: String,
	},
}

#[derive(Subcommand, Debug)]
pub enum EncodeKind {
	/// ui.form.requestSubmit
	RequestSubmit,

	/// ui.form.persist
	Persist,

	/// sdc.configure
	Configure {
		#[arg(long, value_name = "URL")]
		terminology_server: Option<String>,
		#[arg(long, value_name = "URL")]
		data_server: Option<String>,
		/// Opaque configuration object, as JSON
		#[arg(long, value_name = "JSON")]
		configuration: Option<String>,
	},

	/// sdc.displayQuestionnaire
	#[command(alias = "display")]
	DisplayQuestionnaire {
		/// Questionnaire canonical URL
		#[arg(long, conflicts_with = "questionnaire_file", required_unless_present = "questionnaire_file")]
		canonical: Option<String>,
		/// Questionnaire resource as a JSON file
		#[arg(long, value_name = "FILE")]
		questionnaire_file: Option<PathBuf>,
		/// QuestionnaireResponse resource as a JSON file
		#[arg(long, value_name = "FILE")]
		response_file: Option<PathBuf>,
		/// Subject reference, e.g. Patient/123
		#[arg(long)]
		subject: Option<String>,
		/// Author reference
		#[arg(long)]
		author: Option<String>,
		/// Encounter reference
		#[arg(long)]
		encounter: Option<String>,
		/// Launch context entry as NAME=REFERENCE (repeatable)
		#[arg(long = "launch-context", value_name = "NAME=REFERENCE")]
		launch_context: Vec<String>,
	},
}
