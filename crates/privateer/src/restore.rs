use crate::backup::{as_client, ssh_note};
use crate::check::verify;
use crate::config::{Client, FleetConfig};
use crate::error::Result;
use crate::executor::{ExecCtx, RunOutcome, run_plan};
use crate::plan::{ExecPlan, KEYS_PATH, VOLUMES_PATH, volume_path};
use crate::runtime::Mount;
use crate::source::{find_source, match_value};

/// Pull `<source>/<volume>` from a server into the client's volume.
/// Trailing slashes make rsync sync directory contents.
pub fn restore_plan(
    cfg: &FleetConfig,
    client: &Client,
    volume: &str,
    server: &str,
    source: &str,
) -> ExecPlan {
    let dest = volume_path(volume);
    ExecPlan::new(
        cfg.client_image(),
        vec![
            Mount::volume(&client.key_volume, KEYS_PATH).read_only(),
            Mount::volume(volume, &dest),
        ],
        [
            "rsync".to_string(),
            "-av".into(),
            "--delete".into(),
            format!("{server}:{VOLUMES_PATH}/{source}/{volume}/"),
            format!("{dest}/"),
        ],
    )
}

pub fn restore(
    cfg: &FleetConfig,
    ctx: &ExecCtx,
    name: &str,
    volume: &str,
    server: Option<&str>,
    source: Option<&str>,
) -> Result<RunOutcome> {
    let client = as_client(cfg, verify(cfg, ctx, name)?)?;
    let volume = match_value(Some(volume), &client.restore, "volume")?;
    let server = match_value(server, &cfg.list_servers(), "server")?;
    let source = find_source(cfg, &volume, source)?;
    let plan = restore_plan(cfg, client, &volume, &server, &source);

    let mut explain = vec![
        format!("This will restore data from the server '{server}' into our"),
        format!("local volume '{volume}'; data originally from '{source}'"),
        String::new(),
    ];
    explain.extend(ssh_note());

    if !ctx.dry_run {
        ctx.say(format!("Restoring '{volume}' from '{server}'"));
    }
    run_plan(ctx, "Restore", &plan, &explain)
}
