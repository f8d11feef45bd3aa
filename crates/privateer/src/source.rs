use crate::config::FleetConfig;
use crate::error::{Error, Result};

/// Sentinel source for volumes that live only at servers.
pub const LOCAL_SOURCE: &str = "local";

/// Pick `given` from `valid`, or the single valid option when nothing was
/// given.
pub fn match_value(given: Option<&str>, valid: &[String], what: &'static str) -> Result<String> {
    match given {
        None if valid.len() == 1 => Ok(valid[0].clone()),
        None => Err(Error::MissingChoice {
            what,
            valid: valid.to_vec(),
        }),
        Some(g) if valid.iter().any(|v| v == g) => Ok(g.to_string()),
        Some(g) => Err(Error::InvalidChoice {
            what,
            given: g.to_string(),
            valid: valid.to_vec(),
        }),
    }
}

/// Clients whose backup list carries `volume`, in declaration order.
pub fn candidates(cfg: &FleetConfig, volume: &str) -> Vec<String> {
    cfg.clients
        .iter()
        .filter(|c| c.backup.iter().any(|v| v == volume))
        .map(|c| c.name.clone())
        .collect()
}

pub fn find_source(cfg: &FleetConfig, volume: &str, source: Option<&str>) -> Result<String> {
    let vol = cfg.volume(volume)?;
    if vol.local {
        if source.is_some() {
            return Err(Error::Conflict {
                volume: volume.to_string(),
            });
        }
        return Ok(LOCAL_SOURCE.to_string());
    }
    let valid = candidates(cfg, volume);
    match match_value(source, &valid, "source") {
        Err(Error::InvalidChoice { given, valid, .. }) => Err(Error::InvalidSource { given, valid }),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::fixtures::SIMPLE;

    fn two_backers() -> FleetConfig {
        FleetConfig::from_json(
            r#"{
                "servers": [{"name": "alice", "hostname": "a", "port": 22}],
                "clients": [
                    {"name": "bob", "backup": ["data"]},
                    {"name": "carol", "backup": ["data", "logs"]}
                ],
                "volumes": [{"name": "data"}, {"name": "logs"}, {"name": "idle"}],
                "vault": {"url": "http://localhost:8200", "prefix": "/secret/privateer"}
            }"#,
        )
        .expect("config")
    }

    #[test]
    fn sole_backer_is_selected() {
        let cfg = FleetConfig::from_json(SIMPLE).expect("config");
        assert_eq!(find_source(&cfg, "data", None).expect("source"), "bob");
        assert_eq!(find_source(&cfg, "data", Some("bob")).expect("source"), "bob");
    }

    #[test]
    fn explicit_source_must_back_up_volume() {
        let cfg = FleetConfig::from_json(SIMPLE).expect("config");
        let err = find_source(&cfg, "data", Some("carol")).unwrap_err();
        match err {
            Error::InvalidSource { given, valid } => {
                assert_eq!(given, "carol");
                assert_eq!(valid, vec!["bob"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn local_volume_resolves_to_sentinel() {
        let cfg = FleetConfig::from_json(SIMPLE).expect("config");
        assert_eq!(find_source(&cfg, "other", None).expect("source"), LOCAL_SOURCE);
        assert!(matches!(
            find_source(&cfg, "other", Some("bob")),
            Err(Error::Conflict { .. })
        ));
    }

    #[test]
    fn ambiguous_or_orphan_volume_needs_explicit_source() {
        let cfg = two_backers();
        assert!(matches!(
            find_source(&cfg, "data", None),
            Err(Error::MissingChoice { what: "source", .. })
        ));
        assert_eq!(find_source(&cfg, "data", Some("carol")).expect("s"), "carol");
        assert_eq!(find_source(&cfg, "logs", None).expect("s"), "carol");
        assert!(matches!(
            find_source(&cfg, "idle", None),
            Err(Error::MissingChoice { .. })
        ));
    }

    #[test]
    fn unknown_volume_is_reported() {
        let cfg = FleetConfig::from_json(SIMPLE).expect("config");
        let err = find_source(&cfg, "unknown", None).unwrap_err();
        assert!(err.to_string().starts_with("Unknown volume 'unknown'"));
    }

    #[test]
    fn match_value_rules() {
        let valid = vec!["alice".to_string()];
        assert_eq!(match_value(None, &valid, "server").expect("single"), "alice");
        assert!(matches!(
            match_value(Some("eve"), &valid, "server"),
            Err(Error::InvalidChoice { what: "server", .. })
        ));
        assert!(matches!(
            match_value(None, &[], "server"),
            Err(Error::MissingChoice { .. })
        ));
    }
}
