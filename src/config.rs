use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use tracing::Level;

/// Shared turn timer for table games over websockets
#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
pub struct Config {
    /// Address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    pub host: IpAddr,
    /// Port to listen on
    #[arg(short, long, default_value_t = 5001)]
    pub port: u16,
    /// Directory for the daily rolling log file
    #[arg(long, default_value = "./logs")]
    pub log_dir: PathBuf,
    /// Log to stdout instead of a file
    #[arg(long)]
    pub log_stdout: bool,
    /// Most verbose level that gets logged
    #[arg(long, default_value = "info")]
    pub log_level: Level,
}

impl Config {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}
