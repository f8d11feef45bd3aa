//! Long-running containers: the server's sshd and the client scheduler.

use std::collections::BTreeSet;

use tracing::debug;

use crate::check::verify;
use crate::config::{Client, FleetConfig, Machine, Schedule, Server};
use crate::error::{Error, Result};
use crate::executor::ExecCtx;
use crate::plan::{KEYS_PATH, VOLUMES_PATH, volume_path};
use crate::runtime::{ContainerSpec, Mount, PortMap};

pub const SCHEDULE_COMMAND: [&str; 3] = ["yacron", "-c", "/privateer/keys/yacron.yml"];

/// A named container kept running in the background.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    /// "server" or "scheduler", used in operator messages.
    pub kind: &'static str,
    /// Machine the service belongs to.
    pub name: String,
    pub container: String,
    pub image: String,
    pub mounts: Vec<Mount>,
    pub ports: Vec<PortMap>,
    pub command: Vec<String>,
}

impl Service {
    pub fn spec(&self) -> ContainerSpec {
        ContainerSpec {
            image: self.image.clone(),
            name: Some(self.container.clone()),
            mounts: self.mounts.clone(),
            ports: self.ports.clone(),
            command: self.command.clone(),
            working_dir: None,
            auto_remove: true,
            detach: true,
        }
    }
}

pub fn service_start(ctx: &ExecCtx, svc: &Service) -> Result<()> {
    if ctx.dry_run {
        ctx.say(format!("Command to manually launch {}:", svc.kind));
        ctx.blank();
        ctx.command(svc.spec().render());
        ctx.blank();
        ctx.say("(remove the '-d' flag to run in blocking mode)");
        return Ok(());
    }
    if ctx.runtime.container_state(&svc.container)?.is_some() {
        return Err(Error::AlreadyRunning {
            name: svc.name.clone(),
            container: svc.container.clone(),
        });
    }
    ctx.ensure_image(&svc.image)?;
    ctx.say(format!(
        "Starting {} '{}' as container '{}'",
        svc.kind, svc.name, svc.container
    ));
    ctx.runtime.start(&svc.spec())?;
    Ok(())
}

pub fn service_stop(ctx: &ExecCtx, name: &str, container: &str) -> Result<()> {
    match ctx.runtime.container_state(container)? {
        None => ctx.say(format!("Container '{container}' for '{name}' does not exist")),
        Some(state) if state == "running" => {
            if ctx.dry_run {
                ctx.say(format!("Would stop container '{container}' for '{name}'"));
            } else {
                ctx.runtime.stop(container)?;
                ctx.say(format!("Stopped container '{container}' for '{name}'"));
            }
        }
        Some(_) => {}
    }
    Ok(())
}

pub fn service_status(ctx: &ExecCtx, name: &str, container: &str) -> Result<String> {
    let state = ctx
        .runtime
        .container_state(container)?
        .unwrap_or_else(|| "not running".to_string());
    debug!(machine = name, container, state = %state, "service status");
    ctx.say(state.clone());
    Ok(state)
}

fn as_server<'a>(cfg: &'a FleetConfig, machine: Machine<'a>) -> Result<&'a Server> {
    match machine {
        Machine::Server(s) => Ok(s),
        Machine::Client(c) => Err(Error::InvalidChoice {
            what: "server",
            given: c.name.clone(),
            valid: cfg.list_servers(),
        }),
    }
}

fn scheduled_client<'a>(machine: Machine<'a>) -> Result<(&'a Client, &'a Schedule)> {
    match machine {
        Machine::Client(c) => match &c.schedule {
            Some(s) => Ok((c, s)),
            None => Err(Error::msg(format!(
                "A schedule is not defined in the configuration for '{}'",
                c.name
            ))),
        },
        Machine::Server(s) => Err(Error::msg(format!(
            "'{}' is a server; only clients run a schedule",
            s.name
        ))),
    }
}

pub fn server_service(cfg: &FleetConfig, server: &Server) -> Service {
    let mut mounts = vec![
        Mount::volume(&server.key_volume, KEYS_PATH).read_only(),
        Mount::volume(&server.data_volume, VOLUMES_PATH),
    ];
    for v in cfg.local_volumes() {
        mounts.push(Mount::volume(&v.name, format!("{VOLUMES_PATH}/local/{}", v.name)).read_only());
    }
    Service {
        kind: "server",
        name: server.name.clone(),
        container: server.container.clone(),
        image: cfg.server_image(),
        mounts,
        ports: vec![PortMap {
            host: server.port,
            container: 22,
        }],
        command: Vec::new(),
    }
}

pub fn schedule_service(cfg: &FleetConfig, client: &Client, schedule: &Schedule) -> Service {
    let mut mounts = vec![Mount::volume(&client.key_volume, KEYS_PATH).read_only()];
    let mut seen = BTreeSet::new();
    for job in &schedule.jobs {
        if seen.insert(job.volume.as_str()) {
            mounts.push(Mount::volume(&job.volume, volume_path(&job.volume)).read_only());
        }
    }
    let ports = schedule
        .port
        .map(|p| PortMap {
            host: p,
            container: p,
        })
        .into_iter()
        .collect();
    Service {
        kind: "scheduler",
        name: client.name.clone(),
        container: schedule.container.clone(),
        image: cfg.client_image(),
        mounts,
        ports,
        command: SCHEDULE_COMMAND.iter().map(|s| s.to_string()).collect(),
    }
}

pub fn server_start(cfg: &FleetConfig, ctx: &ExecCtx, name: &str) -> Result<()> {
    let server = as_server(cfg, verify(cfg, ctx, name)?)?;
    service_start(ctx, &server_service(cfg, server))?;
    if !ctx.dry_run {
        ctx.say(format!("Server {name} now running on port {}", server.port));
    }
    Ok(())
}

pub fn server_stop(cfg: &FleetConfig, ctx: &ExecCtx, name: &str) -> Result<()> {
    let server = as_server(cfg, verify(cfg, ctx, name)?)?;
    service_stop(ctx, name, &server.container)
}

pub fn server_status(cfg: &FleetConfig, ctx: &ExecCtx, name: &str) -> Result<String> {
    let server = as_server(cfg, verify(cfg, ctx, name)?)?;
    service_status(ctx, name, &server.container)
}

pub fn schedule_start(cfg: &FleetConfig, ctx: &ExecCtx, name: &str) -> Result<()> {
    let (client, schedule) = scheduled_client(verify(cfg, ctx, name)?)?;
    service_start(ctx, &schedule_service(cfg, client, schedule))
}

pub fn schedule_stop(cfg: &FleetConfig, ctx: &ExecCtx, name: &str) -> Result<()> {
    let (_, schedule) = scheduled_client(verify(cfg, ctx, name)?)?;
    service_stop(ctx, name, &schedule.container)
}

pub fn schedule_status(cfg: &FleetConfig, ctx: &ExecCtx, name: &str) -> Result<String> {
    let (_, schedule) = scheduled_client(verify(cfg, ctx, name)?)?;
    service_status(ctx, name, &schedule.container)
}
