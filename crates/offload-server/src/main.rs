use std::net::IpAddr;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod server;
use server::utils::{self, parse_port};
use server::{init_router, DispatcherArgs, ServerState};

#[derive(Debug, Parser)]
#[command(version, about = "HTTP front end that offloads CPU-bound work to a bounded thread pool")]
pub struct App {
    #[clap(flatten)]
    pub dispatcher_args: DispatcherArgs,

    #[arg(value_parser = parse_port)]
    #[clap(short, long, default_value = "3000", env = "OFFLOAD_PORT")]
    pub port: u16,

    #[clap(long, default_value = "127.0.0.1", env = "OFFLOAD_HOST")]
    pub host: IpAddr,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<ExitCode> {
    let args = App::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                eprintln!("No environment variables found that can initialize tracing_subscriber::EnvFilter. Using defaults.");

                // axum logs rejections from built-in extractors with the `axum::rejection`
                // target, at `TRACE` level. `axum::rejection=trace` enables showing those events
                "offload=debug,offload_server=debug,tower_http=debug,axum::rejection=trace".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = args.dispatcher_args.to_config()?;
    let state = Arc::new(ServerState::new(config)?);
    let router = init_router(state.clone());

    let listener = TcpListener::bind((args.host, args.port)).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, router)
        .with_graceful_shutdown(utils::shutdown_signal())
        .await?;

    state.dispatcher.shutdown().await;

    Ok(ExitCode::SUCCESS)
}
