use std::sync::{Arc, Mutex, OnceLock};

use rand::Rng;
use rand::distributions::Alphanumeric;
use regex::Regex;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::plan::ExecPlan;
use crate::runtime::ContainerRuntime;

const SUCCESS_TAIL: usize = 10;
const FAILURE_TAIL: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecEvent {
    /// Free-form progress or explanation for the operator.
    Notice(String),
    /// A command line the operator could run by hand.
    Command(String),
    ContainerLog { container: String, line: String },
}

impl ExecEvent {
    pub fn render(&self) -> String {
        match self {
            ExecEvent::Notice(msg) => msg.clone(),
            ExecEvent::Command(cmd) => format!("  {cmd}"),
            ExecEvent::ContainerLog { line, .. } => line.clone(),
        }
    }
}

pub trait ExecSink: Send + Sync {
    fn emit(&self, ev: ExecEvent);
}

#[derive(Debug, Default)]
pub struct StdoutSink;

impl ExecSink for StdoutSink {
    fn emit(&self, ev: ExecEvent) {
        println!("{}", ev.render());
    }
}

/// Collects rendered output; used by tests and by callers that want the
/// transcript rather than a terminal.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|g| g.clone()).unwrap_or_default()
    }

    pub fn text(&self) -> String {
        self.lines().join("\n")
    }

    pub fn clear(&self) {
        if let Ok(mut g) = self.lines.lock() {
            g.clear();
        }
    }
}

impl ExecSink for MemorySink {
    fn emit(&self, ev: ExecEvent) {
        if let Ok(mut g) = self.lines.lock() {
            g.push(ev.render());
        }
    }
}

/// Collaborators for one invocation.
#[derive(Clone)]
pub struct ExecCtx {
    pub dry_run: bool,
    pub runtime: Arc<dyn ContainerRuntime>,
    pub sink: Arc<dyn ExecSink>,
}

impl ExecCtx {
    pub fn new(dry_run: bool, runtime: Arc<dyn ContainerRuntime>, sink: Arc<dyn ExecSink>) -> Self {
        Self {
            dry_run,
            runtime,
            sink,
        }
    }

    pub fn say(&self, msg: impl Into<String>) {
        self.sink.emit(ExecEvent::Notice(msg.into()));
    }

    pub fn blank(&self) {
        self.say("");
    }

    pub fn command(&self, cmd: impl Into<String>) {
        self.sink.emit(ExecEvent::Command(cmd.into()));
    }

    pub fn ensure_image(&self, image: &str) -> Result<()> {
        if self.runtime.image_exists(image)? {
            return Ok(());
        }
        self.say(format!("Pulling {image}"));
        self.runtime.pull_image(image)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Previewed,
    Completed { container: String },
}

/// Print `plan` as a manual command (dry run) or run it to completion.
///
/// `display` names the operation ("Backup", "Export", ...). `explain` lines
/// are only shown in dry-run mode, after the command.
pub fn run_plan(
    ctx: &ExecCtx,
    display: &str,
    plan: &ExecPlan,
    explain: &[String],
) -> Result<RunOutcome> {
    if ctx.dry_run {
        preview(ctx, display, plan, explain);
        return Ok(RunOutcome::Previewed);
    }
    let container = run_to_completion(ctx, display, plan)?;
    Ok(RunOutcome::Completed { container })
}

pub fn preview(ctx: &ExecCtx, display: &str, plan: &ExecPlan, explain: &[String]) {
    ctx.say(format!(
        "Command to manually run {}:",
        display.to_ascii_lowercase()
    ));
    ctx.blank();
    ctx.command(plan.render());
    if !explain.is_empty() {
        ctx.blank();
        for line in explain {
            ctx.say(line.clone());
        }
    }
}

/// Launch detached, wait, then tail logs and remove the container on
/// success. Failed containers are left in place for inspection.
pub fn run_to_completion(ctx: &ExecCtx, display: &str, plan: &ExecPlan) -> Result<String> {
    ctx.ensure_image(&plan.image)?;
    let spec = plan.detached_spec(container_name(display));
    let container = ctx.runtime.start(&spec)?;
    let op = display;
    debug!(container = %container, image = %plan.image, op, "started container");
    ctx.say(format!("{display} command started. To stream progress, run:"));
    ctx.command(format!("docker logs -f {container}"));

    let code = ctx.runtime.wait(&container)?;
    let logs = ctx.runtime.logs(&container).unwrap_or_else(|e| {
        warn!(container = %container, error = %e, "could not read container logs");
        String::new()
    });

    if code == 0 {
        ctx.say(format!("{display} completed successfully! Container logs:"));
        emit_tail(ctx, &container, &logs, SUCCESS_TAIL);
        ctx.runtime.remove_container(&container)?;
        return Ok(container);
    }

    ctx.say("An error occurred! Container logs:");
    emit_tail(ctx, &container, &logs, FAILURE_TAIL);
    Err(Error::Execution {
        display: display.to_string(),
        container,
        code,
    })
}

fn emit_tail(ctx: &ExecCtx, container: &str, logs: &str, n: usize) {
    for line in log_tail(logs, n) {
        ctx.sink.emit(ExecEvent::ContainerLog {
            container: container.to_string(),
            line,
        });
    }
}

fn ansi_escape() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(\x07|\x1b\\)")
            .expect("static regex")
    })
}

/// Last `n` lines of `logs` with terminal escapes removed, preceded by a
/// note when lines were dropped.
pub fn log_tail(logs: &str, n: usize) -> Vec<String> {
    let lines: Vec<String> = logs
        .trim()
        .lines()
        .map(|l| ansi_escape().replace_all(l.trim_end_matches('\r'), "").to_string())
        .collect();
    if lines.len() <= n {
        return lines;
    }
    let skipped = lines.len() - n;
    let mut out = vec![format!("(omitting {skipped} lines of logs)")];
    out.extend(lines.into_iter().skip(skipped));
    out
}

/// A fresh, recognisable container name for one run.
pub fn container_name(display: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("privateer_{}_{suffix}", display.to_ascii_lowercase())
}
