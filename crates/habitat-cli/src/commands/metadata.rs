//! Client metadata command.

use super::Context;
use crate::output;
use anyhow::Result;
use habitat_auth::ClientMetadata;

/// Print the metadata document for the configured client domain. Always JSON.
pub fn client_metadata(ctx: &Context) -> Result<()> {
    let metadata = ClientMetadata::for_domain(&ctx.config.app_domain);
    output::print_json(&metadata)
}
