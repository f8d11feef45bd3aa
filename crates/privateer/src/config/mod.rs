use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

mod validate;

fn default_key_volume() -> String {
    "privateer_keys".into()
}

fn default_data_volume() -> String {
    "privateer_data".into()
}

fn default_server_container() -> String {
    "privateer_server".into()
}

fn default_schedule_container() -> String {
    "privateer_scheduler".into()
}

fn default_tag() -> String {
    "docker".into()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Server {
    pub name: String,
    pub hostname: String,
    pub port: u16,
    #[serde(default = "default_key_volume")]
    pub key_volume: String,
    #[serde(default = "default_data_volume")]
    pub data_volume: String,
    #[serde(default = "default_server_container")]
    pub container: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Client {
    pub name: String,
    #[serde(default)]
    pub backup: Vec<String>,
    #[serde(default)]
    pub restore: Vec<String>,
    #[serde(default = "default_key_volume")]
    pub key_volume: String,
    #[serde(default)]
    pub schedule: Option<Schedule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Schedule {
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default = "default_schedule_container")]
    pub container: String,
    #[serde(default)]
    pub jobs: Vec<ScheduleJob>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScheduleJob {
    pub server: String,
    pub volume: String,
    pub schedule: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Volume {
    pub name: String,
    #[serde(default)]
    pub local: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VaultConfig {
    pub url: String,
    pub prefix: String,
    /// Literal token or `$ENVVAR` reference; resolution falls back to the
    /// environment and then to a prompt when absent.
    #[serde(default)]
    pub token: Option<String>,
}

impl VaultConfig {
    pub fn key_path(&self, name: &str) -> String {
        format!("{}/{}", self.prefix.trim_end_matches('/'), name)
    }
}

/// Fleet topology. Every deserialize path runs the fleet invariants, so a
/// `FleetConfig` read from JSON is always valid.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawFleetConfig")]
pub struct FleetConfig {
    pub servers: Vec<Server>,
    pub clients: Vec<Client>,
    pub volumes: Vec<Volume>,
    pub vault: VaultConfig,
    pub tag: String,
}

#[derive(Deserialize)]
struct RawFleetConfig {
    servers: Vec<Server>,
    clients: Vec<Client>,
    volumes: Vec<Volume>,
    vault: VaultConfig,
    #[serde(default = "default_tag")]
    tag: String,
}

impl TryFrom<RawFleetConfig> for FleetConfig {
    type Error = Error;

    fn try_from(raw: RawFleetConfig) -> Result<Self> {
        let cfg = FleetConfig {
            servers: raw.servers,
            clients: raw.clients,
            volumes: raw.volumes,
            vault: raw.vault,
            tag: raw.tag,
        };
        validate::validate(&cfg)?;
        Ok(cfg)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Machine<'a> {
    Server(&'a Server),
    Client(&'a Client),
}

impl<'a> Machine<'a> {
    pub fn name(&self) -> &'a str {
        match self {
            Machine::Server(s) => &s.name,
            Machine::Client(c) => &c.name,
        }
    }

    pub fn key_volume(&self) -> &'a str {
        match self {
            Machine::Server(s) => &s.key_volume,
            Machine::Client(c) => &c.key_volume,
        }
    }

    pub fn role(&self) -> &'static str {
        match self {
            Machine::Server(_) => "server",
            Machine::Client(_) => "client",
        }
    }
}

impl FleetConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let raw: RawFleetConfig = serde_json::from_str(text.trim())
            .map_err(|e| Error::Config(format!("failed to parse configuration: {e}")))?;
        FleetConfig::try_from(raw)
    }

    pub fn list_servers(&self) -> Vec<String> {
        self.servers.iter().map(|s| s.name.clone()).collect()
    }

    pub fn list_clients(&self) -> Vec<String> {
        self.clients.iter().map(|c| c.name.clone()).collect()
    }

    pub fn machine_config(&self, name: &str) -> Result<Machine<'_>> {
        if let Some(s) = self.servers.iter().find(|s| s.name == name) {
            return Ok(Machine::Server(s));
        }
        if let Some(c) = self.clients.iter().find(|c| c.name == name) {
            return Ok(Machine::Client(c));
        }
        let mut valid = self.list_servers();
        valid.extend(self.list_clients());
        Err(Error::UnknownMachine {
            name: name.to_string(),
            valid,
        })
    }

    pub fn server(&self, name: &str) -> Option<&Server> {
        self.servers.iter().find(|s| s.name == name)
    }

    pub fn volume(&self, name: &str) -> Result<&Volume> {
        self.volumes
            .iter()
            .find(|v| v.name == name)
            .ok_or_else(|| Error::UnknownVolume {
                name: name.to_string(),
                valid: self.volumes.iter().map(|v| v.name.clone()).collect(),
            })
    }

    pub fn local_volumes(&self) -> impl Iterator<Item = &Volume> {
        self.volumes.iter().filter(|v| v.local)
    }

    pub fn client_image(&self) -> String {
        format!("mrcide/privateer-client:{}", self.tag)
    }

    pub fn server_image(&self) -> String {
        format!("mrcide/privateer-server:{}", self.tag)
    }
}

pub fn load(path: &Path) -> Result<FleetConfig> {
    let data = fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("failed to read config {}: {e}", path.display()))
    })?;
    FleetConfig::from_json(&data)
}
