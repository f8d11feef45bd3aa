use crate::runtime::{ContainerSpec, Mount};

/// Where a machine's credential volume is mounted inside every privateer
/// container.
pub const KEYS_PATH: &str = "/privateer/keys";
/// Root of volume data, both on clients (per volume) and on servers
/// (per source machine).
pub const VOLUMES_PATH: &str = "/privateer/volumes";
pub const EXPORT_PATH: &str = "/export";
pub const TAR_IMAGE: &str = "ubuntu";
pub const CHOWN_IMAGE: &str = "alpine";

pub fn volume_path(volume: &str) -> String {
    format!("{VOLUMES_PATH}/{volume}")
}

/// The fully resolved container invocation for one data movement operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecPlan {
    pub image: String,
    pub mounts: Vec<Mount>,
    pub command: Vec<String>,
    pub working_dir: Option<String>,
}

impl ExecPlan {
    pub fn new<I, S>(image: impl Into<String>, mounts: Vec<Mount>, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            image: image.into(),
            mounts,
            command: command.into_iter().map(Into::into).collect(),
            working_dir: None,
        }
    }

    pub fn working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Self-cleaning foreground form, as an operator would type it.
    pub fn manual_spec(&self) -> ContainerSpec {
        ContainerSpec {
            image: self.image.clone(),
            mounts: self.mounts.clone(),
            command: self.command.clone(),
            working_dir: self.working_dir.clone(),
            auto_remove: true,
            ..Default::default()
        }
    }

    /// Detached and retained after exit, so a failed run can be inspected.
    pub fn detached_spec(&self, name: impl Into<String>) -> ContainerSpec {
        ContainerSpec {
            image: self.image.clone(),
            name: Some(name.into()),
            mounts: self.mounts.clone(),
            command: self.command.clone(),
            working_dir: self.working_dir.clone(),
            auto_remove: false,
            detach: true,
            ..Default::default()
        }
    }

    pub fn render(&self) -> String {
        self.manual_spec().render()
    }
}
