use anyhow::Context;
use clap::{Parser, Subcommand};
use credential_broker::api::{self, AppState};
use credential_broker::config::DirectoryMode;
use credential_broker::directory::{DirectoryLookup, LdapDirectory, StaticDirectory};
use credential_broker::service::{Collaborators, Registration, Removal, SecretLifecycle};
use credential_broker::store::{RedisSecretStore, RedisSessionStore, RedisStore};
use credential_broker::token::{JwtCodec, TokenCipher};
use credential_broker::{observability, shutdown, tls, Config};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "credential-broker", version, about = "Directory-backed token broker")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Register or remove a service secret
    Register {
        /// Service name
        #[arg(long)]
        service: String,
        /// Remove the secret instead of creating it
        #[arg(long)]
        remove: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("[ERROR] invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            if let Err(e) = observability::init_tracing(config.log_format) {
                eprintln!("[ERROR] failed to initialise logging: {e}");
                return ExitCode::FAILURE;
            }
            match serve(config).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    error!(error = %e, "server failed");
                    ExitCode::FAILURE
                }
            }
        }
        Command::Register { service, remove } => match register(&config, &service, remove).await {
            Ok(message) => {
                println!("[RESULT] {message}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                println!("[ERROR] {e:#}");
                ExitCode::FAILURE
            }
        },
    }
}

fn collaborators(config: &Config) -> anyhow::Result<Collaborators> {
    let redis = RedisStore::new(&config.redis.url).context("invalid REDIS_URL")?;

    let mut codec = JwtCodec::new();
    if let Some(ref key) = config.token_cipher_key {
        codec = codec.with_cipher(TokenCipher::new(key));
    }

    let directory: Arc<dyn DirectoryLookup> = match config.directory_mode {
        DirectoryMode::Ldap => Arc::new(LdapDirectory::new(
            config.ldap.clone(),
            config.collaborator_timeout,
        )),
        DirectoryMode::Static => {
            warn!("Static directory enabled, any non-empty credentials are accepted");
            Arc::new(StaticDirectory::development())
        }
    };

    Ok(Collaborators {
        directory,
        secrets: Arc::new(RedisSecretStore::new(redis.clone(), &config.redis)),
        sessions: Arc::new(RedisSessionStore::new(redis, &config.redis)),
        codec: Arc::new(codec),
    })
}

async fn serve(config: Config) -> anyhow::Result<()> {
    info!(
        addr = %config.listen_addr(),
        directory = ?config.directory_mode,
        https = config.tls.is_some(),
        encrypted_tokens = config.token_cipher_key.is_some(),
        "Starting credential broker"
    );

    let state = Arc::new(AppState::new(collaborators(&config)?, &config));
    let app = api::router(state);

    let listener = TcpListener::bind(config.listen_addr())
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr()))?;
    info!("Credential broker listening on {}", config.listen_addr());

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let mut server = match config.tls {
        Some(ref pair) => {
            let rustls = tls::load(pair).await?;
            let handle = axum_server::Handle::new();
            let drain = handle.clone();
            tokio::spawn(async move {
                stop_rx.await.ok();
                drain.graceful_shutdown(None);
            });

            let listener = listener.into_std().context("failed to hand over listener")?;
            tokio::spawn(
                axum_server::from_tcp_rustls(listener, rustls)
                    .handle(handle)
                    .serve(app.into_make_service()),
            )
        }
        None => tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    stop_rx.await.ok();
                })
                .await
        }),
    };

    tokio::select! {
        result = &mut server => {
            result.context("server task panicked")??;
            return Ok(());
        }
        _ = shutdown::wait_for_signal() => {}
    }

    let _ = stop_tx.send(());
    match tokio::time::timeout(config.shutdown_timeout, server).await {
        Ok(result) => result.context("server task panicked")??,
        Err(_) => warn!("Shutdown timeout reached, dropping open connections"),
    }

    info!("Shutdown complete");
    Ok(())
}

async fn register(config: &Config, service: &str, remove: bool) -> anyhow::Result<String> {
    let redis = RedisStore::new(&config.redis.url).context("invalid REDIS_URL")?;
    let secrets = Arc::new(RedisSecretStore::new(redis, &config.redis));
    let lifecycle = SecretLifecycle::new(secrets, config.collaborator_timeout);

    let message = if remove {
        match lifecycle.remove(service).await? {
            Removal::Deleted(_) => format!("Secret for service {service} removed"),
            Removal::NotFound => format!("No secret registered for service {service}"),
        }
    } else {
        match lifecycle.register(service).await? {
            Registration::Created(secret) => {
                format!("Secret for service {service}: {}", secret.expose())
            }
            Registration::Existing(_) => format!("A secret already exists for service {service}"),
        }
    };

    Ok(message)
}
