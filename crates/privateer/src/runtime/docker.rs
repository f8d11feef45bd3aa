use std::io::Write;
use std::process::{Command, Output, Stdio};

use tracing::debug;

use super::{ContainerRuntime, ContainerSpec, FileMeta, RunOutput};
use crate::error::{Error, Result};

/// Image used for the small file helpers (`write_file` / `read_file`).
pub const HELPER_IMAGE: &str = "alpine";

pub const ENGINE_ENV: &str = "PRIVATEER_CONTAINER_ENGINE";

/// [`ContainerRuntime`] over the `docker`-compatible command line.
#[derive(Debug, Clone)]
pub struct DockerCli {
    engine: String,
}

impl DockerCli {
    pub fn new(engine: impl Into<String>) -> Self {
        Self {
            engine: engine.into(),
        }
    }

    /// Honour `PRIVATEER_CONTAINER_ENGINE`, else the first working engine of
    /// `docker`, `podman`.
    pub fn detect() -> Result<Self> {
        if let Ok(pref) = std::env::var(ENGINE_ENV) {
            let pref = pref.trim();
            if pref.is_empty() {
                return Err(Error::runtime(format!("{ENGINE_ENV} is set but empty")));
            }
            if command_works(pref, &["--version"]) {
                return Ok(Self::new(pref));
            }
            return Err(Error::runtime(format!(
                "container engine '{pref}' from {ENGINE_ENV} is not available"
            )));
        }
        for candidate in ["docker", "podman"] {
            if command_works(candidate, &["--version"]) {
                return Ok(Self::new(candidate));
            }
        }
        Err(Error::runtime(format!(
            "no container engine found (tried docker, podman); set {ENGINE_ENV}"
        )))
    }

    pub fn engine(&self) -> &str {
        &self.engine
    }

    fn cmd<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let mut cmd = Command::new(&self.engine);
        cmd.args(args);
        cmd
    }

    fn output(&self, mut cmd: Command) -> Result<Output> {
        debug!(command = ?cmd, "invoking container engine");
        let res = cmd.stdin(Stdio::null()).output();
        res.map_err(|e| Error::runtime(format!("failed to run {:?}: {e}", cmd)))
    }

    fn succeeds(&self, cmd: Command) -> Result<bool> {
        Ok(self.output(cmd)?.status.success())
    }

    fn capture(&self, cmd: Command) -> Result<String> {
        let out = self.output(cmd)?;
        if out.status.success() {
            return Ok(String::from_utf8_lossy(&out.stdout).trim().to_string());
        }
        Err(Error::runtime(command_summary(&out)))
    }

    fn ensure_helper_image(&self) -> Result<()> {
        if !self.image_exists(HELPER_IMAGE)? {
            self.pull_image(HELPER_IMAGE)?;
        }
        Ok(())
    }
}

impl ContainerRuntime for DockerCli {
    fn image_exists(&self, image: &str) -> Result<bool> {
        self.succeeds(self.cmd(["image", "inspect", image]))
    }

    fn pull_image(&self, image: &str) -> Result<()> {
        self.capture(self.cmd(["pull", image])).map(|_| ())
    }

    fn volume_exists(&self, name: &str) -> Result<bool> {
        self.succeeds(self.cmd(["volume", "inspect", name]))
    }

    fn create_volume(&self, name: &str) -> Result<()> {
        self.capture(self.cmd(["volume", "create", name])).map(|_| ())
    }

    fn remove_volume(&self, name: &str) -> Result<()> {
        self.capture(self.cmd(["volume", "rm", name])).map(|_| ())
    }

    fn container_state(&self, name: &str) -> Result<Option<String>> {
        let out = self.output(self.cmd([
            "container",
            "inspect",
            "--format",
            "{{.State.Status}}",
            name,
        ]))?;
        if out.status.success() {
            return Ok(Some(String::from_utf8_lossy(&out.stdout).trim().to_string()));
        }
        let msg = command_summary(&out);
        if is_not_found_text(&msg) {
            return Ok(None);
        }
        Err(Error::runtime(msg))
    }

    fn start(&self, spec: &ContainerSpec) -> Result<String> {
        let mut spec = spec.clone();
        spec.detach = true;
        let id = self.capture(self.cmd(spec.run_args()))?;
        Ok(spec
            .name
            .unwrap_or_else(|| id.chars().take(12).collect()))
    }

    fn wait(&self, container: &str) -> Result<i64> {
        let out = self.capture(self.cmd(["wait", container]))?;
        out.lines()
            .last()
            .unwrap_or_default()
            .trim()
            .parse()
            .map_err(|e| Error::runtime(format!("unexpected exit status '{out}': {e}")))
    }

    fn logs(&self, container: &str) -> Result<String> {
        let out = self.output(self.cmd(["logs", container]))?;
        if !out.status.success() {
            return Err(Error::runtime(command_summary(&out)));
        }
        let mut text = String::from_utf8_lossy(&out.stdout).to_string();
        text.push_str(&String::from_utf8_lossy(&out.stderr));
        Ok(text)
    }

    fn stop(&self, container: &str) -> Result<()> {
        self.capture(self.cmd(["stop", container])).map(|_| ())
    }

    fn remove_container(&self, container: &str) -> Result<()> {
        self.capture(self.cmd(["rm", container])).map(|_| ())
    }

    fn run_to_exit(&self, spec: &ContainerSpec) -> Result<RunOutput> {
        if !self.image_exists(&spec.image)? {
            self.pull_image(&spec.image)?;
        }
        let mut spec = spec.clone();
        spec.detach = false;
        let out = self.output(self.cmd(spec.run_args()))?;
        Ok(RunOutput {
            code: out.status.code().map(i64::from).unwrap_or(-1),
            stdout: String::from_utf8_lossy(&out.stdout).to_string(),
            stderr: String::from_utf8_lossy(&out.stderr).to_string(),
        })
    }

    fn write_file(&self, volume: &str, path: &str, contents: &[u8], meta: FileMeta) -> Result<()> {
        self.ensure_helper_image()?;
        let mut cmd = self.cmd([
            "run".to_string(),
            "--rm".into(),
            "-i".into(),
            "-v".into(),
            format!("{volume}:/dest"),
            HELPER_IMAGE.into(),
            "sh".into(),
            "-c".into(),
            r#"cat > "/dest/$1" && chown "$2" "/dest/$1" && chmod "$3" "/dest/$1""#.into(),
            "sh".into(),
            path.to_string(),
            format!("{}:{}", meta.uid, meta.gid),
            format!("{:o}", meta.mode),
        ]);
        debug!(command = ?cmd, volume, path, "writing file into volume");
        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::runtime(format!("spawn failed: {e}")))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(contents)
                .map_err(|e| Error::runtime(format!("failed to stream '{path}': {e}")))?;
        }
        let out = child
            .wait_with_output()
            .map_err(|e| Error::runtime(format!("wait failed: {e}")))?;
        if !out.status.success() {
            return Err(Error::runtime(format!(
                "failed to write '{path}' into volume '{volume}': {}",
                command_summary(&out)
            )));
        }
        Ok(())
    }

    fn read_file(&self, volume: &str, path: &str) -> Result<Vec<u8>> {
        self.ensure_helper_image()?;
        let out = self.output(self.cmd([
            "run".to_string(),
            "--rm".into(),
            "-v".into(),
            format!("{volume}:/src:ro"),
            HELPER_IMAGE.into(),
            "cat".into(),
            format!("/src/{path}"),
        ]))?;
        if !out.status.success() {
            return Err(Error::runtime(format!(
                "failed to read '{path}' from volume '{volume}': {}",
                command_summary(&out)
            )));
        }
        Ok(out.stdout)
    }
}

fn command_works(bin: &str, args: &[&str]) -> bool {
    Command::new(bin)
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

fn command_summary(out: &Output) -> String {
    let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
    let stdout = String::from_utf8_lossy(&out.stdout).trim().to_string();
    if !stderr.is_empty() {
        return stderr;
    }
    if !stdout.is_empty() {
        return stdout;
    }
    format!("status {}", out.status)
}

fn is_not_found_text(msg: &str) -> bool {
    let m = msg.to_ascii_lowercase();
    m.contains("no such") || m.contains("not found") || m.contains("does not exist")
}
