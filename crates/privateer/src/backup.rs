use crate::check::verify;
use crate::config::{Client, FleetConfig, Machine};
use crate::error::{Error, Result};
use crate::executor::{ExecCtx, RunOutcome, run_plan};
use crate::plan::{ExecPlan, KEYS_PATH, VOLUMES_PATH, volume_path};
use crate::runtime::Mount;
use crate::source::match_value;

pub(crate) fn as_client<'a>(cfg: &'a FleetConfig, machine: Machine<'a>) -> Result<&'a Client> {
    match machine {
        Machine::Client(c) => Ok(c),
        Machine::Server(s) => Err(Error::InvalidChoice {
            what: "client",
            given: s.name.clone(),
            valid: cfg.list_clients(),
        }),
    }
}

pub(crate) fn ssh_note() -> [String; 3] {
    [
        "Note that this uses hostname/port information for the server".into(),
        format!("contained within {KEYS_PATH}/config, along with our identity"),
        format!("in {KEYS_PATH}/id_rsa"),
    ]
}

/// Copy a client volume to a server with `rsync`.
pub fn backup_plan(cfg: &FleetConfig, client: &Client, volume: &str, server: &str) -> ExecPlan {
    let src = volume_path(volume);
    ExecPlan::new(
        cfg.client_image(),
        vec![
            Mount::volume(&client.key_volume, KEYS_PATH).read_only(),
            Mount::volume(volume, &src).read_only(),
        ],
        [
            "rsync".to_string(),
            "-av".into(),
            "--delete".into(),
            src,
            format!("{server}:{VOLUMES_PATH}/{}", client.name),
        ],
    )
}

pub fn backup(
    cfg: &FleetConfig,
    ctx: &ExecCtx,
    name: &str,
    volume: &str,
    server: Option<&str>,
) -> Result<RunOutcome> {
    let client = as_client(cfg, verify(cfg, ctx, name)?)?;
    let volume = match_value(Some(volume), &client.backup, "volume")?;
    let server = match_value(server, &cfg.list_servers(), "server")?;
    let plan = backup_plan(cfg, client, &volume, &server);

    let mut explain = vec![
        format!("This will copy the volume '{volume}' from '{name}' to the server '{server}'"),
        String::new(),
    ];
    explain.extend(ssh_note());

    if !ctx.dry_run {
        ctx.say(format!("Backing up '{volume}' to '{server}'"));
    }
    run_plan(ctx, "Backup", &plan, &explain)
}
