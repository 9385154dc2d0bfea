//! Smart condominium command line client

use std::io::read_to_string;

use clap::Parser;
use color_eyre::eyre::{Report, bail};
use color_eyre::{Result, Section};
use reqwest::Method;
use tracing::info;

use condo_client::api_error;
use condo_client::auth::AuthService;
use condo_client::config::{self, Config, LogFormat};
use condo_client::gateway::{self, ApiRequest, DEFAULT_PAGE, DEFAULT_PAGE_SIZE, Gateway};
use condo_client::session::{FileStore, MemoryStore, Session, SessionStore};

use crate::opt::{Command, Opt};

mod opt;

/// Initializes tracing collection
fn setup_tracing(config: config::Logging) {
    use tracing_error::ErrorLayer;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, fmt};

    let fmt_layer = match config.format {
        LogFormat::Pretty => fmt::layer().pretty().with_writer(std::io::stderr).boxed(),
        LogFormat::Compact => fmt::layer().compact().with_writer(std::io::stderr).boxed(),
    };

    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let filter_layer = config
        .filters
        .into_iter()
        .fold(filter_layer, |layer, filter| layer.add_directive(filter));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .init();
}

/// Attaches a hint to log in again when the session expired
fn session_hint(err: gateway::Error) -> Report {
    let expired = matches!(err, gateway::Error::SessionExpired);
    let report = Report::new(err);
    if expired {
        report.suggestion("Log in again with `condo login <email> <password>`")
    } else {
        report
    }
}

async fn run<S: SessionStore>(api: config::Api, store: S, command: Command) -> Result<()> {
    let gateway = Gateway::new(&api, Session::new(store))?;
    let auth = AuthService::new(gateway.clone(), api.auth);

    match command {
        Command::Login { email, password } => {
            let user = auth.login(&email, &password).await?;
            let role = user
                .role
                .map(|role| format!("{role:?}"))
                .unwrap_or_else(|| "-".to_owned());
            println!("Logged in as {} <{}> ({role})", user.full_name, user.email);
        }

        Command::Logout => {
            auth.logout().await?;
            println!("Logged out");
        }

        Command::Whoami => match gateway.session().identity().await? {
            Some(identity) => println!("{}", serde_json::to_string_pretty(&identity)?),
            None => println!("Not logged in"),
        },

        Command::Refresh => {
            gateway.refresh().await.map_err(session_hint)?;
            println!("Access token refreshed");
        }

        Command::Request {
            method,
            path,
            body,
            page,
            page_size,
        } => {
            let method = Method::from_bytes(method.to_uppercase().as_bytes())?;
            let mut request = ApiRequest::new(method, path);
            if let Some(body) = body {
                request = request.body(serde_json::from_str(&body)?);
            }
            if page.is_some() || page_size.is_some() {
                request = request.paginated(
                    page.unwrap_or(DEFAULT_PAGE),
                    page_size.unwrap_or(DEFAULT_PAGE_SIZE),
                );
            }

            let response = gateway.send(&request).await.map_err(session_hint)?;
            let status = response.status();
            if !status.is_success() {
                bail!("{status}: {}", api_error::message(response).await);
            }

            println!("{}", response.text().await?);
        }

        Command::Upload { path, file } => {
            let content = tokio::fs::read(&file).await?;
            let file_name = file
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "file".to_owned());

            let response = gateway
                .upload(path, file_name, content)
                .await
                .map_err(session_hint)?;
            let status = response.status();
            if !status.is_success() {
                bail!("{status}: {}", api_error::message(response).await);
            }

            println!("{}", response.text().await?);
        }

        Command::Download { path, output } => {
            let response = gateway.get(path).await.map_err(session_hint)?;
            let status = response.status();
            if !status.is_success() {
                bail!("{status}: {}", api_error::message(response).await);
            }

            let content = response.bytes().await?;
            tokio::fs::write(&output, &content).await?;
            info!(output = %output.display(), size = content.len(), "File downloaded");
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let Opt {
        config: mut config_file,
        command,
    } = Opt::parse();

    let config = read_to_string(&mut config_file)?;
    let config: Config = toml::from_str(&config)?;

    setup_tracing(config.logging);
    color_eyre::install()?;

    info!(
        config = ?config_file.path().path(),
        "Tracing initialized"
    );

    match config.session {
        config::Session::Memory => run(config.api, MemoryStore::new(), command).await,
        config::Session::File { path } => run(config.api, FileStore::new(path), command).await,
    }
}
