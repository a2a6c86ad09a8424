//! Habitat CLI - sign in to a Habitat node and make authenticated requests.

mod commands;
mod output;

use clap::{Parser, Subcommand};
use commands::Context;
use habitat_config_and_utils::{init_logging, Config, Paths};
use tracing::debug;

/// Habitat CLI - Manage your Habitat session.
#[derive(Parser)]
#[command(name = "habitat")]
#[command(about = "Habitat CLI for OAuth login and authenticated node requests")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", global = true)]
    format: output::OutputFormat,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Domain of the Habitat node
    #[arg(long, global = true, env = "HABITAT_SERVER_DOMAIN")]
    server_domain: Option<String>,

    /// Domain this client is deployed under
    #[arg(long, global = true, env = "HABITAT_DOMAIN")]
    domain: Option<String>,

    /// Keep the session in memory only
    #[arg(long, global = true)]
    ephemeral: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a login and print the authorization URL
    Login {
        /// Account handle, e.g. alice.example
        handle: String,
        /// Redirect URI registered for this client
        #[arg(long)]
        redirect_uri: Option<String>,
        /// Open the authorization URL in the default browser
        #[arg(long)]
        open: bool,
    },

    /// Complete a login with the URL the browser was redirected to
    Callback {
        /// Full callback URL including `code` and `state`
        url: String,
    },

    /// Show the current session
    Status,

    /// Logout and clear session
    Logout,

    /// Make an authenticated request against the node
    Fetch {
        /// Path or absolute URL
        target: String,
        /// HTTP method
        #[arg(short = 'X', long, default_value = "GET")]
        method: String,
        /// Request body
        #[arg(short, long)]
        body: Option<String>,
        /// Extra header as `Name: value`, may be repeated
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
    },

    /// Print the OAuth client metadata document
    ClientMetadata,
}

fn load_config(cli: &Cli) -> anyhow::Result<(Config, Paths)> {
    let paths = Paths::new()?;
    let mut config = Config::load(&paths)?;

    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    if let Some(domain) = &cli.server_domain {
        config.server_domain = domain.clone();
    }
    if let Some(domain) = &cli.domain {
        config.app_domain = domain.clone();
    }
    config.validate()?;

    Ok((config, paths))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let (config, paths) = match load_config(&cli) {
        Ok(loaded) => loaded,
        Err(e) => {
            output::print_error(&e.to_string(), &cli.format);
            std::process::exit(1);
        }
    };

    init_logging(&config.log_level);
    debug!(
        server_domain = %config.server_domain,
        app_domain = %config.app_domain,
        ephemeral = cli.ephemeral,
        "Configuration loaded"
    );

    let ctx = Context {
        config,
        paths,
        format: cli.format,
        ephemeral: cli.ephemeral,
    };

    let result = match cli.command {
        Commands::Login {
            handle,
            redirect_uri,
            open,
        } => commands::login(&ctx, &handle, redirect_uri.as_deref(), open).await,
        Commands::Callback { url } => commands::callback(&ctx, &url).await,
        Commands::Status => commands::status(&ctx).await,
        Commands::Logout => commands::logout(&ctx).await,
        Commands::Fetch {
            target,
            method,
            body,
            headers,
        } => commands::fetch(&ctx, &target, &method, body, &headers).await,
        Commands::ClientMetadata => commands::client_metadata(&ctx),
    };

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e), &ctx.format);
        std::process::exit(1);
    }
}
