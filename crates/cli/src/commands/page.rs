use tracing::info;

use crate::error::Result;

pub fn execute(sdc_endpoint: &str, data_endpoint: Option<&str>, sdk_url: &str) -> Result<()> {
	let url = swm::page::create_page(sdc_endpoint, data_endpoint, sdk_url)?;
	info!(target = "swm", %url, sdc_endpoint, "host page written");
	println!("{url}");
	Ok(())
}
