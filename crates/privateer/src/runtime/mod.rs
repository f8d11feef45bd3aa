//! Container runtime seam.
//!
//! Everything that touches containers, images, or volumes goes through
//! [`ContainerRuntime`]. The production implementation drives the `docker`
//! (or `podman`) CLI; tests substitute an in-memory fake.

use crate::error::Result;

pub mod docker;

pub use docker::DockerCli;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountKind {
    Volume,
    Bind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub source: String,
    pub target: String,
    pub kind: MountKind,
    pub read_only: bool,
}

impl Mount {
    pub fn volume(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            kind: MountKind::Volume,
            read_only: false,
        }
    }

    pub fn bind(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            kind: MountKind::Bind,
            read_only: false,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// `<source>:<target>[:ro]`, the `-v` form.
    pub fn spec(&self) -> String {
        let mut out = format!("{}:{}", self.source, self.target);
        if self.read_only {
            out.push_str(":ro");
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMap {
    pub host: u16,
    pub container: u16,
}

/// Everything needed for one `run` of a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerSpec {
    pub image: String,
    pub name: Option<String>,
    pub mounts: Vec<Mount>,
    pub ports: Vec<PortMap>,
    pub command: Vec<String>,
    pub working_dir: Option<String>,
    pub auto_remove: bool,
    pub detach: bool,
}

impl ContainerSpec {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Default::default()
        }
    }

    /// Arguments following the engine binary, in a fixed order: flags,
    /// mounts, ports, working dir, image, command.
    pub fn run_args(&self) -> Vec<String> {
        let mut args = vec!["run".to_string()];
        if self.auto_remove {
            args.push("--rm".into());
        }
        if self.detach {
            args.push("-d".into());
        }
        if let Some(name) = &self.name {
            args.push("--name".into());
            args.push(name.clone());
        }
        for m in &self.mounts {
            args.push("-v".into());
            args.push(m.spec());
        }
        for p in &self.ports {
            args.push("-p".into());
            args.push(format!("{}:{}", p.host, p.container));
        }
        if let Some(wd) = &self.working_dir {
            args.push("-w".into());
            args.push(wd.clone());
        }
        args.push(self.image.clone());
        args.extend(self.command.iter().cloned());
        args
    }

    /// The manual `docker run ...` invocation equivalent to this spec.
    pub fn render(&self) -> String {
        format!("docker {}", self.run_args().join(" "))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutput {
    pub code: i64,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMeta {
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
}

impl FileMeta {
    pub fn root(mode: u32) -> Self {
        Self { mode, uid: 0, gid: 0 }
    }
}

pub trait ContainerRuntime: Send + Sync {
    fn image_exists(&self, image: &str) -> Result<bool>;
    fn pull_image(&self, image: &str) -> Result<()>;

    fn volume_exists(&self, name: &str) -> Result<bool>;
    fn create_volume(&self, name: &str) -> Result<()>;
    fn remove_volume(&self, name: &str) -> Result<()>;

    /// Runtime-reported state (`running`, `exited`, ...) or `None` when no
    /// container of that name exists.
    fn container_state(&self, name: &str) -> Result<Option<String>>;

    /// Launch `spec` detached; returns the container name.
    fn start(&self, spec: &ContainerSpec) -> Result<String>;
    fn wait(&self, container: &str) -> Result<i64>;
    fn logs(&self, container: &str) -> Result<String>;
    fn stop(&self, container: &str) -> Result<()>;
    fn remove_container(&self, container: &str) -> Result<()>;

    /// Run `spec` in the foreground to exit and capture its output. A
    /// nonzero exit is reported in [`RunOutput::code`], not as an error.
    fn run_to_exit(&self, spec: &ContainerSpec) -> Result<RunOutput>;

    fn write_file(&self, volume: &str, path: &str, contents: &[u8], meta: FileMeta) -> Result<()>;
    fn read_file(&self, volume: &str, path: &str) -> Result<Vec<u8>>;
}
