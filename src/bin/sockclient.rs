//! SOCKS5 client utility: CONNECT through a proxy and pump stdin/stdout
//! through the tunnel.

use anyhow::{Context, Result};
use clap::Parser;
use soxide::client::Client;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

/// SOCKS5 client: open a CONNECT tunnel and bridge it to stdin/stdout
#[derive(Parser, Debug)]
#[command(name = "sockclient")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Proxy server address
    #[arg(short, long, default_value = "127.0.0.1:1080")]
    proxy: String,

    /// Target host (IP literal or domain)
    host: String,

    /// Target port
    port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(&args.log_level)?;

    let transport = TcpStream::connect(&args.proxy)
        .await
        .with_context(|| format!("cannot connect to proxy {}", args.proxy))?;

    let tunnel = Client::new(transport)
        .connect(&args.host, args.port)
        .await
        .with_context(|| format!("connect {}:{} via proxy failed", args.host, args.port))?;
    info!(
        "tunnel established, bind {}:{}",
        tunnel.bind_addr, tunnel.bind_port
    );

    let (mut tunnel_read, mut tunnel_write) = tokio::io::split(tunnel);
    let mut stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();

    let upstream = async {
        let copied = tokio::io::copy(&mut stdin, &mut tunnel_write).await?;
        tunnel_write.shutdown().await?;
        Ok::<u64, std::io::Error>(copied)
    };
    let downstream = tokio::io::copy(&mut tunnel_read, &mut stdout);

    tokio::select! {
        res = upstream => debug!("stdin closed after {} bytes", res?),
        res = downstream => debug!("tunnel closed after {} bytes", res?),
    }

    Ok(())
}

fn setup_logging(level: &str) -> Result<()> {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
