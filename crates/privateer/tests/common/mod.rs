#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex};

use privateer::config::FleetConfig;
use privateer::executor::{ExecCtx, MemorySink};
use privateer::runtime::{ContainerRuntime, ContainerSpec, FileMeta, RunOutput};
use privateer::{Error, Result};

pub const FLEET: &str = r#"{
    "servers": [
        {"name": "alice", "hostname": "alice.example.com", "port": 10022}
    ],
    "clients": [
        {"name": "bob", "backup": ["data"], "restore": ["data", "other"],
         "schedule": {"jobs": [{"server": "alice", "volume": "data", "schedule": "@daily"}]}}
    ],
    "volumes": [
        {"name": "data"},
        {"name": "other", "local": true}
    ],
    "vault": {"url": "http://localhost:8200", "prefix": "/secret/privateer"}
}"#;

const MUTATING: [&str; 8] = [
    "pull_image",
    "create_volume",
    "remove_volume",
    "start",
    "stop",
    "remove_container",
    "run_to_exit",
    "write_file",
];

#[derive(Debug, Clone)]
pub struct FakeContainer {
    pub spec: ContainerSpec,
    pub state: String,
    pub exit: i64,
    pub logs: String,
}

#[derive(Debug, Default)]
struct State {
    images: BTreeSet<String>,
    volumes: BTreeMap<String, BTreeMap<String, (Vec<u8>, FileMeta)>>,
    containers: BTreeMap<String, FakeContainer>,
    exits: VecDeque<(i64, String)>,
    runs: VecDeque<std::result::Result<RunOutput, String>>,
    calls: Vec<String>,
    counter: usize,
}

/// In-memory container runtime. Detached runs exit with the next queued
/// `(code, logs)` (default success); foreground runs return the next queued
/// [`RunOutput`].
#[derive(Debug, Default)]
pub struct FakeRuntime {
    state: Mutex<State>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        let mut guard = self.state.lock().expect("fake runtime lock");
        f(&mut guard)
    }

    fn record(&self, call: String) {
        self.with(|s| s.calls.push(call));
    }

    pub fn add_image(&self, image: &str) {
        self.with(|s| s.images.insert(image.to_string()));
    }

    pub fn add_volume(&self, volume: &str) {
        self.with(|s| {
            s.volumes.entry(volume.to_string()).or_default();
        });
    }

    pub fn put_file(&self, volume: &str, path: &str, contents: &str) {
        self.with(|s| {
            s.volumes
                .entry(volume.to_string())
                .or_default()
                .insert(path.to_string(), (contents.as_bytes().to_vec(), FileMeta::root(0o644)));
        });
    }

    pub fn file(&self, volume: &str, path: &str) -> Option<(String, FileMeta)> {
        self.with(|s| {
            s.volumes
                .get(volume)
                .and_then(|v| v.get(path))
                .map(|(b, m)| (String::from_utf8_lossy(b).to_string(), *m))
        })
    }

    pub fn has_volume(&self, volume: &str) -> bool {
        self.with(|s| s.volumes.contains_key(volume))
    }

    pub fn queue_exit(&self, code: i64, logs: &str) {
        self.with(|s| s.exits.push_back((code, logs.to_string())));
    }

    pub fn queue_run(&self, out: RunOutput) {
        self.with(|s| s.runs.push_back(Ok(out)));
    }

    /// Make the next foreground run fail inside the runtime itself.
    pub fn queue_run_error(&self, message: &str) {
        self.with(|s| s.runs.push_back(Err(message.to_string())));
    }

    pub fn put_container(&self, name: &str, state: &str) {
        self.with(|s| {
            s.containers.insert(
                name.to_string(),
                FakeContainer {
                    spec: ContainerSpec::new("unknown"),
                    state: state.to_string(),
                    exit: 0,
                    logs: String::new(),
                },
            );
        });
    }

    pub fn container(&self, name: &str) -> Option<FakeContainer> {
        self.with(|s| s.containers.get(name).cloned())
    }

    pub fn containers(&self) -> Vec<String> {
        self.with(|s| s.containers.keys().cloned().collect())
    }

    pub fn calls(&self) -> Vec<String> {
        self.with(|s| s.calls.clone())
    }

    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| {
                let op = c.split_whitespace().next().unwrap_or_default();
                MUTATING.contains(&op)
            })
            .collect()
    }
}

impl ContainerRuntime for FakeRuntime {
    fn image_exists(&self, image: &str) -> Result<bool> {
        self.record(format!("image_exists {image}"));
        Ok(self.with(|s| s.images.contains(image)))
    }

    fn pull_image(&self, image: &str) -> Result<()> {
        self.record(format!("pull_image {image}"));
        self.add_image(image);
        Ok(())
    }

    fn volume_exists(&self, name: &str) -> Result<bool> {
        self.record(format!("volume_exists {name}"));
        Ok(self.has_volume(name))
    }

    fn create_volume(&self, name: &str) -> Result<()> {
        self.record(format!("create_volume {name}"));
        self.add_volume(name);
        Ok(())
    }

    fn remove_volume(&self, name: &str) -> Result<()> {
        self.record(format!("remove_volume {name}"));
        self.with(|s| s.volumes.remove(name));
        Ok(())
    }

    fn container_state(&self, name: &str) -> Result<Option<String>> {
        self.record(format!("container_state {name}"));
        Ok(self.container(name).map(|c| c.state))
    }

    fn start(&self, spec: &ContainerSpec) -> Result<String> {
        self.record(format!("start {}", spec.render()));
        self.with(|s| {
            s.counter += 1;
            let name = spec.name.clone().unwrap_or_else(|| format!("fake_{}", s.counter));
            if s.containers.contains_key(&name) {
                return Err(Error::runtime(format!("container name '{name}' in use")));
            }
            let (exit, logs) = s.exits.pop_front().unwrap_or((0, String::new()));
            s.containers.insert(
                name.clone(),
                FakeContainer {
                    spec: spec.clone(),
                    state: "running".into(),
                    exit,
                    logs,
                },
            );
            Ok(name)
        })
    }

    fn wait(&self, container: &str) -> Result<i64> {
        self.record(format!("wait {container}"));
        self.with(|s| {
            let c = s
                .containers
                .get_mut(container)
                .ok_or_else(|| Error::runtime(format!("no such container: {container}")))?;
            c.state = "exited".into();
            Ok(c.exit)
        })
    }

    fn logs(&self, container: &str) -> Result<String> {
        self.record(format!("logs {container}"));
        self.container(container)
            .map(|c| c.logs)
            .ok_or_else(|| Error::runtime(format!("no such container: {container}")))
    }

    fn stop(&self, container: &str) -> Result<()> {
        self.record(format!("stop {container}"));
        self.with(|s| {
            let auto_remove = match s.containers.get_mut(container) {
                Some(c) => {
                    c.state = "exited".into();
                    c.spec.auto_remove
                }
                None => return Err(Error::runtime(format!("no such container: {container}"))),
            };
            if auto_remove {
                s.containers.remove(container);
            }
            Ok(())
        })
    }

    fn remove_container(&self, container: &str) -> Result<()> {
        self.record(format!("remove_container {container}"));
        self.with(|s| s.containers.remove(container));
        Ok(())
    }

    fn run_to_exit(&self, spec: &ContainerSpec) -> Result<RunOutput> {
        self.record(format!("run_to_exit {}", spec.render()));
        match self.with(|s| s.runs.pop_front()) {
            Some(Ok(out)) => Ok(out),
            Some(Err(message)) => Err(Error::runtime(message)),
            None => Ok(RunOutput::default()),
        }
    }

    fn write_file(&self, volume: &str, path: &str, contents: &[u8], meta: FileMeta) -> Result<()> {
        self.record(format!("write_file {volume} {path}"));
        self.with(|s| match s.volumes.get_mut(volume) {
            Some(v) => {
                v.insert(path.to_string(), (contents.to_vec(), meta));
                Ok(())
            }
            None => Err(Error::runtime(format!("no such volume: {volume}"))),
        })
    }

    fn read_file(&self, volume: &str, path: &str) -> Result<Vec<u8>> {
        self.record(format!("read_file {volume} {path}"));
        self.with(|s| {
            s.volumes
                .get(volume)
                .and_then(|v| v.get(path))
                .map(|(b, _)| b.clone())
                .ok_or_else(|| Error::runtime(format!("cat: /src/{path}: No such file")))
        })
    }
}

pub struct Harness {
    pub cfg: FleetConfig,
    pub runtime: Arc<FakeRuntime>,
    pub sink: Arc<MemorySink>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(FLEET)
    }

    pub fn with_config(json: &str) -> Self {
        Self {
            cfg: FleetConfig::from_json(json).expect("fleet config"),
            runtime: Arc::new(FakeRuntime::new()),
            sink: Arc::new(MemorySink::default()),
        }
    }

    pub fn ctx(&self, dry_run: bool) -> ExecCtx {
        ExecCtx::new(dry_run, self.runtime.clone(), self.sink.clone())
    }

    /// A key volume that `check` accepts for `name`.
    pub fn configured_as(&self, name: &str) -> &Self {
        let machine = self.cfg.machine_config(name).expect("machine");
        self.runtime.put_file(machine.key_volume(), "name", name);
        self
    }

    pub fn output(&self) -> Vec<String> {
        self.sink.lines()
    }
}
