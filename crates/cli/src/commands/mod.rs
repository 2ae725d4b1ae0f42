mod encode;
mod handle;
mod page;

use crate::cli::Commands;
use crate::error::Result;

pub async fn dispatch(command: Commands) -> Result<()> {
	match command {
		Commands::Handle { file } => handle::execute(file.as_deref()).await,
		Commands::Encode { kind } => encode::execute(kind).await,
		Commands::Page {
			sdc_endpoint,
			data_endpoint,
			sdk_url,
		} => page::execute(&sdc_endpoint, data_endpoint.as_deref(), &sdk_url),
	}
}
