//! Authentication commands.

use super::Context;
use crate::output::{self, OutputFormat};
use anyhow::{Context as _, Result};
use habitat_auth::{ClientMetadata, SessionState};
use tracing::debug;
use url::Url;

/// Start a login for `handle` and print the authorization URL.
pub async fn login(
    ctx: &Context,
    handle: &str,
    redirect_uri: Option<&str>,
    open_browser: bool,
) -> Result<()> {
    let handle = handle.trim();
    if handle.is_empty() {
        anyhow::bail!("Handle is required");
    }

    let redirect_uri = match redirect_uri {
        Some(uri) => Url::parse(uri).context("Invalid redirect URI")?,
        None => {
            let metadata = ClientMetadata::for_domain(&ctx.config.app_domain);
            let uri = metadata
                .redirect_uri()
                .context("Client metadata has no redirect URI")?;
            Url::parse(uri)?
        }
    };

    let manager = ctx.session_manager()?;
    let url = manager.login_url(handle, &redirect_uri)?;

    match ctx.format {
        OutputFormat::Text => {
            println!("Open this URL to sign in as {}:", handle);
            println!();
            println!("  {}", url);
            println!();
            println!("Then run 'habitat callback <redirected-url>'.");
        }
        OutputFormat::Json => output::print_json(&serde_json::json!({
            "handle": handle,
            "login_url": url.as_str(),
            "redirect_uri": redirect_uri.as_str(),
        }))?,
    }

    if open_browser {
        if let Err(e) = open::that(url.as_str()) {
            debug!(error = %e, "Failed to open browser");
            output::print_error("Could not open a browser, copy the URL instead", &ctx.format);
        }
    }

    Ok(())
}

/// Finish the login with the URL the authorization server redirected to.
pub async fn callback(ctx: &Context, url: &str) -> Result<()> {
    let manager = ctx.session_manager()?;
    manager.exchange_code(url).await?;

    let handle = manager.handle().unwrap_or_default();
    output::print_success(&format!("Logged in as {}", handle), &ctx.format);
    Ok(())
}

/// Show the session state.
pub async fn status(ctx: &Context) -> Result<()> {
    let manager = ctx.session_manager()?;
    let state = manager.state();

    match ctx.format {
        OutputFormat::Text => {
            output::print_row("Node", manager.config().server_origin().as_str());
            match &state {
                SessionState::Authenticated { handle } => {
                    output::print_row("Auth", "logged in");
                    output::print_row("Handle", handle);
                }
                SessionState::LoginPending { handle } => {
                    output::print_row("Auth", "login pending");
                    output::print_row("Handle", handle.as_deref().unwrap_or("unknown"));
                }
                SessionState::Unauthenticated { .. } => {
                    output::print_row("Auth", "not logged in");
                }
            }
        }
        OutputFormat::Json => output::print_json(&serde_json::json!({
            "node": manager.config().server_origin().as_str(),
            "session": state,
        }))?,
    }

    Ok(())
}

/// Logout and clear session.
pub async fn logout(ctx: &Context) -> Result<()> {
    let manager = ctx.session_manager()?;
    manager.logout()?;
    output::print_success("Logged out successfully", &ctx.format);
    Ok(())
}
