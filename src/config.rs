use anyhow::Context;
use std::{
    collections::HashMap,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use crate::{
    request::check_user_id,
    store::{DEFAULT_MAX_USERS, DEFAULT_TTL},
};

const DEFAULT_ADDRESS: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
const DEFAULT_PORT: u16 = 9160;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 8 * 1024 * 1024;

const DEFAULT_SERVER_URL: &str = "http://localhost:9160";
const DEFAULT_USER_ID: &str = "user01";
const DEFAULT_INTERVAL: Duration = Duration::from_secs(3);
const DEFAULT_WIDTH: u32 = 630;
const DEFAULT_HEIGHT: u32 = 390;
const DEFAULT_QUALITY: u8 = 20;

#[derive(Debug, Default)]
pub struct Config(pub HashMap<Parameter, String>);

#[derive(Debug, Hash, PartialEq, Eq, Clone, Copy)]
pub enum Parameter {
    Address,
    Port,
    MaxUsers,
    Ttl,
    MaxUploadBytes,
    Server,
    UserId,
    Interval,
    Width,
    Height,
    Quality,
    Image,
    Once,
    Unknown,
}

impl Parameter {
    pub fn deserialize(s: &str) -> anyhow::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "address" => Ok(Parameter::Address),
            "port" => Ok(Parameter::Port),
            "max-users" => Ok(Parameter::MaxUsers),
            "ttl" => Ok(Parameter::Ttl),
            "max-upload-bytes" => Ok(Parameter::MaxUploadBytes),
            "server" => Ok(Parameter::Server),
            "user-id" => Ok(Parameter::UserId),
            "interval" => Ok(Parameter::Interval),
            "width" => Ok(Parameter::Width),
            "height" => Ok(Parameter::Height),
            "quality" => Ok(Parameter::Quality),
            "image" => Ok(Parameter::Image),
            "once" => Ok(Parameter::Once),
            "" => Err(anyhow::format_err!("empty parameter name")),
            _ => Ok(Parameter::Unknown),
        }
    }

    pub fn serialize(&self) -> &'static str {
        match self {
            Parameter::Address => "address",
            Parameter::Port => "port",
            Parameter::MaxUsers => "max-users",
            Parameter::Ttl => "ttl",
            Parameter::MaxUploadBytes => "max-upload-bytes",
            Parameter::Server => "server",
            Parameter::UserId => "user-id",
            Parameter::Interval => "interval",
            Parameter::Width => "width",
            Parameter::Height => "height",
            Parameter::Quality => "quality",
            Parameter::Image => "image",
            Parameter::Once => "once",
            Parameter::Unknown => unreachable!(),
        }
    }

    /// Flags are given without a value.
    pub fn is_flag(&self) -> bool {
        matches!(self, Parameter::Once)
    }
}

impl Config {
    /// Build a config from `--key value` pairs. Unknown keys are ignored.
    pub fn parse<I>(args: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut config = Config::default();
        let mut current_key = None;
        for arg in args {
            if let Some((parameter, _)) = current_key.take() {
                config.insert(parameter, arg);
            } else if let Some(name) = arg.strip_prefix("--") {
                let parameter = Parameter::deserialize(name)?;
                if parameter.is_flag() {
                    config.insert(parameter, "true".to_string());
                } else {
                    current_key = Some((parameter, arg));
                }
            } else {
                anyhow::bail!("invalid argument {:?}", arg)
            }
        }
        if let Some((_, arg)) = current_key {
            anyhow::bail!("missing value for {}", arg)
        }
        Ok(config)
    }

    fn insert(&mut self, parameter: Parameter, value: String) {
        if parameter != Parameter::Unknown {
            self.0.insert(parameter, value);
        }
    }

    fn get_or<T>(&self, parameter: Parameter, default: T) -> anyhow::Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match self.0.get(&parameter) {
            Some(value) => value
                .parse()
                .with_context(|| format!("invalid value {:?} for --{}", value, parameter.serialize())),
            None => Ok(default),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub address: SocketAddr,
    pub max_users: usize,
    pub ttl: Duration,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            address: SocketAddr::new(DEFAULT_ADDRESS, DEFAULT_PORT),
            max_users: DEFAULT_MAX_USERS,
            ttl: DEFAULT_TTL,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl TryFrom<&Config> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(config: &Config) -> Result<Self, Self::Error> {
        let ip = config.get_or(Parameter::Address, DEFAULT_ADDRESS)?;
        let port = config.get_or(Parameter::Port, DEFAULT_PORT)?;
        let max_users = config.get_or(Parameter::MaxUsers, DEFAULT_MAX_USERS)?;
        if max_users == 0 {
            anyhow::bail!("--max-users must be at least 1");
        }
        let ttl = config.get_or(Parameter::Ttl, DEFAULT_TTL.as_secs())?;
        let max_upload_bytes = config.get_or(Parameter::MaxUploadBytes, DEFAULT_MAX_UPLOAD_BYTES)?;

        Ok(ServerConfig {
            address: SocketAddr::new(ip, port),
            max_users,
            ttl: Duration::from_secs(ttl),
            max_upload_bytes,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server: String,
    pub user_id: String,
    pub interval: Duration,
    pub width: u32,
    pub height: u32,
    pub quality: u8,
    pub image: Option<PathBuf>,
    pub once: bool,
}

impl ClientConfig {
    pub fn upload_url(&self) -> String {
        format!("{}/upload", self.server.trim_end_matches('/'))
    }
}

impl TryFrom<&Config> for ClientConfig {
    type Error = anyhow::Error;

    fn try_from(config: &Config) -> Result<Self, Self::Error> {
        let server = config.get_or(Parameter::Server, DEFAULT_SERVER_URL.to_string())?;
        let user_id = config.get_or(Parameter::UserId, DEFAULT_USER_ID.to_string())?;
        check_user_id(&user_id).map_err(|e| anyhow::format_err!("invalid --user-id: {}", e))?;
        let interval = config.get_or(Parameter::Interval, DEFAULT_INTERVAL.as_secs())?;
        if interval == 0 {
            anyhow::bail!("--interval must be at least 1 second");
        }
        let width = config.get_or(Parameter::Width, DEFAULT_WIDTH)?;
        let height = config.get_or(Parameter::Height, DEFAULT_HEIGHT)?;
        if width == 0 || height == 0 {
            anyhow::bail!("--width and --height must be non-zero");
        }
        let quality = config.get_or(Parameter::Quality, DEFAULT_QUALITY)?;
        if !(1..=100).contains(&quality) {
            anyhow::bail!("--quality must be between 1 and 100");
        }

        Ok(ClientConfig {
            server,
            user_id,
            interval: Duration::from_secs(interval),
            width,
            height,
            quality,
            image: config.0.get(&Parameter::Image).map(PathBuf::from),
            once: config.0.contains_key(&Parameter::Once),
        })
    }
}
