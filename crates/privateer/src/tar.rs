//! Moving volume contents to and from tar files on the host.

use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::check::verify;
use crate::config::{FleetConfig, Machine};
use crate::error::{Error, Result};
use crate::executor::{ExecCtx, preview, run_to_completion};
use crate::plan::{CHOWN_IMAGE, EXPORT_PATH, ExecPlan, TAR_IMAGE};
use crate::runtime::{ContainerSpec, Mount};
use crate::source::{LOCAL_SOURCE, find_source};

pub const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

pub fn timestamp() -> String {
    Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

fn absolute(path: Option<&Path>) -> Result<PathBuf> {
    match path {
        Some(p) => Ok(std::path::absolute(p)?),
        None => Ok(std::env::current_dir()?),
    }
}

fn invoking_user() -> (u32, u32) {
    unsafe { (libc::geteuid(), libc::getegid()) }
}

/// The archive an export will produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPlan {
    pub plan: ExecPlan,
    pub export_dir: PathBuf,
    pub tarfile: String,
    pub source: String,
}

impl ExportPlan {
    pub fn tar_path(&self) -> PathBuf {
        self.export_dir.join(&self.tarfile)
    }
}

/// Hand the freshly written (root-owned) archive to `uid:gid`.
pub fn chown_spec(export_dir: &Path, tarfile: &str, uid: u32, gid: u32) -> ContainerSpec {
    ContainerSpec {
        image: CHOWN_IMAGE.into(),
        mounts: vec![Mount::bind(export_dir.display().to_string(), "/src")],
        working_dir: Some("/src".into()),
        command: vec!["chown".into(), format!("{uid}:{gid}"), tarfile.into()],
        auto_remove: true,
        ..Default::default()
    }
}

fn tar_create(tarfile: &str) -> [String; 4] {
    [
        "tar".into(),
        "-cpvf".into(),
        format!("{EXPORT_PATH}/{tarfile}"),
        ".".into(),
    ]
}

/// Server-side archive of data a client backed up (or a local volume).
pub fn export_plan(
    cfg: &FleetConfig,
    machine: Machine<'_>,
    volume: &str,
    source: &str,
    export_dir: &Path,
    stamp: &str,
) -> Result<ExportPlan> {
    let bind = Mount::bind(export_dir.display().to_string(), EXPORT_PATH);
    if source == LOCAL_SOURCE {
        let tarfile = format!("{volume}-{stamp}.tar");
        let plan = ExecPlan::new(
            TAR_IMAGE,
            vec![bind, Mount::volume(volume, "/privateer").read_only()],
            tar_create(&tarfile),
        )
        .working_dir("/privateer");
        return Ok(ExportPlan {
            plan,
            export_dir: export_dir.to_path_buf(),
            tarfile,
            source: source.to_string(),
        });
    }
    let server = match machine {
        Machine::Server(s) => s,
        Machine::Client(c) => {
            return Err(Error::InvalidChoice {
                what: "server",
                given: c.name.clone(),
                valid: cfg.list_servers(),
            });
        }
    };
    let tarfile = format!("{source}-{volume}-{stamp}.tar");
    let plan = ExecPlan::new(
        TAR_IMAGE,
        vec![bind, Mount::volume(&server.data_volume, "/privateer").read_only()],
        tar_create(&tarfile),
    )
    .working_dir(format!("/privateer/{source}/{volume}"));
    Ok(ExportPlan {
        plan,
        export_dir: export_dir.to_path_buf(),
        tarfile,
        source: source.to_string(),
    })
}

pub fn export_tar(
    cfg: &FleetConfig,
    ctx: &ExecCtx,
    name: &str,
    volume: &str,
    to: Option<&Path>,
    source: Option<&str>,
) -> Result<PathBuf> {
    let machine = verify(cfg, ctx, name)?;
    let source = find_source(cfg, volume, source)?;
    if source == LOCAL_SOURCE && !ctx.runtime.volume_exists(volume)? {
        return Err(Error::msg(format!("Volume '{volume}' does not exist")));
    }
    let export_dir = absolute(to)?;
    let export = export_plan(cfg, machine, volume, &source, &export_dir, &timestamp())?;
    let (uid, gid) = invoking_user();
    let chown = chown_spec(&export_dir, &export.tarfile, uid, gid);

    if ctx.dry_run {
        let mut explain = vec![
            "(pay attention to the final '.' in the above command!)".to_string(),
            String::new(),
        ];
        if source == LOCAL_SOURCE {
            explain.push(format!("This will copy the local volume '{volume}' onto the host"));
        } else {
            explain.push(format!("This will copy data from the server '{name}' onto the host"));
        }
        explain.push(format!(
            "machine at '{}' as '{}'.",
            export_dir.display(),
            export.tarfile
        ));
        if source != LOCAL_SOURCE {
            explain.push(format!("Data originally from '{source}'"));
        }
        explain.extend([
            String::new(),
            "Note that this file will have root ownership after creation".into(),
            format!("You can fix that with 'sudo chown $(whoami) {}'", export.tarfile),
            "or".into(),
            String::new(),
            format!("  {}", chown.render()),
        ]);
        preview(ctx, "Export", &export.plan, &explain);
        return Ok(export.tar_path());
    }

    run_to_completion(ctx, "Export", &export.plan)?;
    ctx.say("Taking ownership of file");
    ctx.ensure_image(CHOWN_IMAGE)?;
    let out = ctx.runtime.run_to_exit(&chown)?;
    if !out.success() {
        return Err(Error::runtime(format!(
            "failed to take ownership of '{}': {}",
            export.tarfile,
            out.stderr.trim()
        )));
    }
    let path = export.tar_path();
    ctx.say(format!("Tar file ready at '{}'", path.display()));
    Ok(path)
}

pub fn import_plan(volume: &str, tarfile: &Path) -> ExecPlan {
    ExecPlan::new(
        TAR_IMAGE,
        vec![
            Mount::bind(tarfile.display().to_string(), "/src.tar").read_only(),
            Mount::volume(volume, "/privateer"),
        ],
        ["tar", "-xvpf", "/src.tar"],
    )
    .working_dir("/privateer")
}

/// Unpack `tarfile` into a brand-new volume. Never touches an existing one.
pub fn import_tar(ctx: &ExecCtx, volume: &str, tarfile: &Path) -> Result<()> {
    if ctx.runtime.volume_exists(volume)? {
        return Err(Error::VolumeExists(volume.to_string()));
    }
    let tarfile = std::path::absolute(tarfile)?;
    if !tarfile.is_file() {
        return Err(Error::MissingInput(tarfile.display().to_string()));
    }
    let plan = import_plan(volume, &tarfile);

    if ctx.dry_run {
        ctx.say("Command to manually run import:");
        ctx.blank();
        ctx.command(format!("docker volume create {volume}"));
        ctx.command(plan.render());
        ctx.blank();
        ctx.say(format!(
            "This will create the volume '{volume}' and unpack '{}' into it",
            tarfile.display()
        ));
        return Ok(());
    }

    ctx.runtime.create_volume(volume)?;
    if let Err(e) = run_to_completion(ctx, "Import", &plan) {
        if let Error::Execution { container, .. } = &e {
            ctx.say(format!(
                "Volume '{volume}' was left partially filled; remove it before retrying with"
            ));
            ctx.command(format!("docker rm {container} && docker volume rm {volume}"));
        }
        return Err(e);
    }
    Ok(())
}
