mod api;
mod capture;
mod models;
mod utils;

use actix_web::middleware::DefaultHeaders;
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use clap::Parser;
use log::info;
use std::sync::Arc;

use crate::api::{routes, AppState};
use crate::capture::pcap_source::PcapSource;
use crate::models::config::AppConfig;
use crate::utils::logging;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Stream live TCP/UDP captures to the browser")]
struct Args {
    /// Address for the HTTP server
    #[clap(long, default_value = "0.0.0.0")]
    host: String,

    /// Port for the HTTP server
    #[clap(short, long, default_value = "8080")]
    port: u16,

    /// Enable promiscuous mode
    #[clap(short = 'P', long)]
    promiscuous: bool,

    /// Maximum bytes captured per frame
    #[clap(long, default_value = "65536")]
    snaplen: i32,

    /// Capture read timeout in milliseconds
    #[clap(long, default_value = "250")]
    read_timeout_ms: i32,

    /// Records buffered per client before capture waits on the client
    #[clap(long, default_value = "1024")]
    channel_capacity: usize,

    /// Seconds between keep-alive comments on idle streams, 0 to disable
    #[clap(long, default_value = "15")]
    heartbeat_secs: u64,

    /// Log level (trace, debug, info, warn, error, off)
    #[clap(long, default_value = "info")]
    log_level: String,
}

#[actix_web::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    logging::init_logger(logging::get_log_level(&args.log_level));

    info!("Starting wirestream v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig {
        host: args.host,
        port: args.port,
        promiscuous: args.promiscuous,
        snaplen: args.snaplen,
        read_timeout_ms: args.read_timeout_ms,
        channel_capacity: args.channel_capacity,
        heartbeat_secs: args.heartbeat_secs,
    };

    let source = Arc::new(PcapSource::new(&config));
    let app_state = web::Data::new(AppState::new(config.clone(), source));

    info!("Starting API server on {}:{}", config.host, config.port);

    HttpServer::new(move || {
        App::new()
            .wrap(
                DefaultHeaders::new()
                    .add(("Access-Control-Allow-Origin", "*"))
                    .add(("Access-Control-Allow-Methods", "GET, OPTIONS"))
                    .add(("Access-Control-Allow-Headers", "Content-Type")),
            )
            .app_data(app_state.clone())
            .configure(routes::configure)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await?;

    Ok(())
}
