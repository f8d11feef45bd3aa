use tracing::{debug, warn};

use crate::config::{FleetConfig, Machine, Server};
use crate::error::{Error, Result};
use crate::executor::ExecCtx;
use crate::plan::KEYS_PATH;
use crate::runtime::{ContainerSpec, Mount};

/// Marker file inside every credential volume.
pub const MARKER_FILE: &str = "name";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Ok,
    Error(String),
    /// Dry run; the probe command was printed instead.
    Skipped,
}

#[derive(Debug, Clone)]
pub struct CheckReport<'a> {
    pub machine: Machine<'a>,
    pub connections: Vec<(String, ConnectionStatus)>,
}

/// Confirm `name`'s credential volume exists and carries its marker.
pub fn verify<'a>(cfg: &'a FleetConfig, ctx: &ExecCtx, name: &str) -> Result<Machine<'a>> {
    let machine = cfg.machine_config(name)?;
    let vol = machine.key_volume();
    if !ctx.runtime.volume_exists(vol)? {
        return Err(Error::NotConfigured {
            name: name.to_string(),
        });
    }
    let raw = ctx.runtime.read_file(vol, MARKER_FILE)?;
    let found = String::from_utf8_lossy(&raw).trim_end().to_string();
    if found != name {
        return Err(Error::IdentityMismatch {
            name: name.to_string(),
            found,
        });
    }
    debug!(machine = name, volume = vol, "credential volume verified");
    Ok(machine)
}

pub fn check<'a>(
    cfg: &'a FleetConfig,
    ctx: &ExecCtx,
    name: &str,
    connection: bool,
) -> Result<CheckReport<'a>> {
    let machine = verify(cfg, ctx, name)?;
    ctx.say(format!(
        "Volume '{}' looks configured as '{name}'",
        machine.key_volume()
    ));
    let mut connections = Vec::new();
    if connection && matches!(machine, Machine::Client(_)) {
        for server in &cfg.servers {
            let status = probe(cfg, ctx, machine, server)?;
            connections.push((server.name.clone(), status));
        }
    }
    Ok(CheckReport {
        machine,
        connections,
    })
}

fn probe_spec(cfg: &FleetConfig, machine: Machine<'_>, server: &Server) -> ContainerSpec {
    ContainerSpec {
        image: cfg.client_image(),
        mounts: vec![Mount::volume(machine.key_volume(), KEYS_PATH).read_only()],
        command: vec![
            "ssh".into(),
            server.name.clone(),
            "cat".into(),
            format!("{KEYS_PATH}/{MARKER_FILE}"),
        ],
        auto_remove: true,
        ..Default::default()
    }
}

fn probe(
    cfg: &FleetConfig,
    ctx: &ExecCtx,
    machine: Machine<'_>,
    server: &Server,
) -> Result<ConnectionStatus> {
    let spec = probe_spec(cfg, machine, server);
    let prefix = format!(
        "checking connection to '{}' ({})...",
        server.name, server.hostname
    );
    if ctx.dry_run {
        ctx.say(format!("{prefix}skipped (dry run); would run:"));
        ctx.command(spec.render());
        return Ok(ConnectionStatus::Skipped);
    }
    let out = ctx
        .ensure_image(&spec.image)
        .and_then(|()| ctx.runtime.run_to_exit(&spec));
    let stderr = match out {
        Ok(out) if out.success() => {
            ctx.say(format!("{prefix}OK"));
            return Ok(ConnectionStatus::Ok);
        }
        Ok(out) => {
            warn!(server = %server.name, code = out.code, "connection check failed");
            out.stderr.trim().to_string()
        }
        Err(e) => {
            warn!(server = %server.name, error = %e, "connection check could not run");
            e.to_string()
        }
    };
    ctx.say(format!("{prefix}ERROR"));
    if !stderr.is_empty() {
        ctx.say(stderr.clone());
    }
    Ok(ConnectionStatus::Error(stderr))
}
