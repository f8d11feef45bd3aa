use std::collections::BTreeSet;

use super::FleetConfig;
use crate::error::{Error, Result};

const RESERVED_NAME: &str = "local";

fn first_duplicate<'a>(names: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
    let mut seen = BTreeSet::new();
    names.into_iter().find(|n| !seen.insert(*n))
}

pub(super) fn validate(cfg: &FleetConfig) -> Result<()> {
    if let Some(dup) = first_duplicate(cfg.servers.iter().map(|s| s.name.as_str())) {
        return Err(Error::Config(format!("duplicated server name '{dup}'")));
    }
    if let Some(dup) = first_duplicate(cfg.clients.iter().map(|c| c.name.as_str())) {
        return Err(Error::Config(format!("duplicated client name '{dup}'")));
    }
    if let Some(both) = cfg
        .clients
        .iter()
        .find(|c| cfg.servers.iter().any(|s| s.name == c.name))
    {
        return Err(Error::Config(format!(
            "machine '{}' is listed as both a client and a server",
            both.name
        )));
    }
    if let Some(dup) = first_duplicate(cfg.volumes.iter().map(|v| v.name.as_str())) {
        return Err(Error::Config(format!("duplicated volume name '{dup}'")));
    }

    let reserved = cfg
        .servers
        .iter()
        .map(|s| s.name.as_str())
        .chain(cfg.clients.iter().map(|c| c.name.as_str()))
        .any(|n| n == RESERVED_NAME);
    if reserved {
        return Err(Error::Config(format!(
            "machines can't be called '{RESERVED_NAME}', which is reserved"
        )));
    }

    for client in &cfg.clients {
        for (verb, list) in [("backs up", &client.backup), ("restores", &client.restore)] {
            for v in list {
                let Some(vol) = cfg.volumes.iter().find(|x| &x.name == v) else {
                    return Err(Error::Config(format!(
                        "client '{}' {verb} unknown volume '{v}'",
                        client.name
                    )));
                };
                if vol.local && verb == "backs up" {
                    return Err(Error::Config(format!(
                        "client '{}' backs up local volume '{v}'",
                        client.name
                    )));
                }
            }
        }

        let Some(schedule) = client.schedule.as_ref() else {
            continue;
        };
        for job in &schedule.jobs {
            if !cfg.servers.iter().any(|s| s.name == job.server) {
                return Err(Error::Config(format!(
                    "schedule for client '{}' uses unknown server '{}'",
                    client.name, job.server
                )));
            }
            if !client.backup.contains(&job.volume) {
                return Err(Error::Config(format!(
                    "schedule for client '{}' uses volume '{}', which it does not back up",
                    client.name, job.volume
                )));
            }
        }
    }

    Ok(())
}
