use clap::Parser;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Command line options for the Breakthrough server
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Play Breakthrough hot-seat through a local JSON API", long_about = None)]
pub struct Config {
    /// Loopback address to bind to
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST), value_parser = parse_loopback)]
    pub host: IpAddr,

    /// Port to listen on
    #[arg(long, default_value_t = 3000)]
    pub port: u16,

    /// Default log filter, overridden by RUST_LOG
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

fn parse_loopback(s: &str) -> Result<IpAddr, String> {
    let addr: IpAddr = s.parse().map_err(|e| format!("{}", e))?;
    if addr.is_loopback() {
        Ok(addr)
    } else {
        Err(format!("{} is not a loopback address", addr))
    }
}

impl Config {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 3000,
            log_level: "info".to_string(),
        }
    }
}
