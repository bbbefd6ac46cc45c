use std::env::Args;
use tracing_subscriber::EnvFilter;

use config::{ClientConfig, Config, ServerConfig};

mod capture;
mod client;
mod config;
mod error;
mod pages;
mod request;
mod response;
mod server;
mod state;
mod store;

#[derive(Debug, PartialEq, Eq)]
enum Mode {
    Server,
    Client,
}

/// Load the mode and config from command line arguments
fn parse_args(args: Args) -> anyhow::Result<(Mode, Config)> {
    split_mode(args.skip(1).collect())
}

fn split_mode(mut args: Vec<String>) -> anyhow::Result<(Mode, Config)> {
    let mode = match args.first().map(String::as_str) {
        Some("server") => Mode::Server,
        Some("client") => Mode::Client,
        Some(arg) if !arg.starts_with("--") => anyhow::bail!("unknown mode {:?}", arg),
        _ => return Ok((Mode::Server, Config::parse(args)?)),
    };
    args.remove(0);
    Ok((mode, Config::parse(args)?))
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let (mode, config) = parse_args(std::env::args())?;
    match mode {
        Mode::Server => server::serve(ServerConfig::try_from(&config)?).await,
        Mode::Client => {
            let config = ClientConfig::try_from(&config)?;
            let source = capture::source_for(&config)?;
            client::Uploader::new(config, source)?.run().await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{split_mode, Mode};
    use crate::config::Parameter;

    fn args(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn mode_selection() {
        let (mode, config) = split_mode(args("")).unwrap();
        assert_eq!(mode, Mode::Server);
        assert!(config.0.is_empty());

        let (mode, config) = split_mode(args("--port 80")).unwrap();
        assert_eq!(mode, Mode::Server);
        assert_eq!(config.0.get(&Parameter::Port).unwrap(), "80");

        let (mode, config) = split_mode(args("client --user-id bob")).unwrap();
        assert_eq!(mode, Mode::Client);
        assert_eq!(config.0.get(&Parameter::UserId).unwrap(), "bob");

        assert!(split_mode(args("viewer")).is_err());
    }
}
