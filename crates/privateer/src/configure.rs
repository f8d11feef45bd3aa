use tracing::info;

use crate::config::FleetConfig;
use crate::error::Result;
use crate::executor::ExecCtx;
use crate::keys::{KeyFile, build_credential_bundle};
use crate::runtime::FileMeta;
use crate::vault::SecretStore;

fn notice_for(file: &str) -> Option<&'static str> {
    match file {
        "authorized_keys" => Some("Authorising public keys"),
        "known_hosts" => Some("Recognising servers"),
        "config" => Some("Adding ssh config"),
        _ => None,
    }
}

/// Materialise `name`'s credentials into its key volume, creating the
/// volume when needed. Returns the files written (or that would be).
pub fn configure(
    cfg: &FleetConfig,
    store: &dyn SecretStore,
    ctx: &ExecCtx,
    name: &str,
) -> Result<Vec<KeyFile>> {
    let machine = cfg.machine_config(name)?;
    let vol = machine.key_volume();
    let bundle = build_credential_bundle(cfg, store, name)?;
    let files = bundle.files();

    if ctx.dry_run {
        ctx.say(format!("Would copy keypair for '{name}' to volume '{vol}':"));
        for f in &files {
            ctx.command(format!("{} (mode {:04o}, owner 0:0)", f.name, f.mode));
        }
        return Ok(files);
    }

    if !ctx.runtime.volume_exists(vol)? {
        info!(volume = vol, "creating key volume");
        ctx.runtime.create_volume(vol)?;
    }
    ctx.say(format!("Copying keypair for '{name}' to volume '{vol}'"));
    for f in &files {
        if let Some(msg) = notice_for(f.name) {
            ctx.say(msg);
        }
        ctx.runtime
            .write_file(vol, f.name, f.contents.as_bytes(), FileMeta::root(f.mode))?;
    }
    Ok(files)
}
