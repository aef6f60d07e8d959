//! In-process container engine with scripted behavior

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use fnbox::engine::{ContainerEngine, EngineError, EngineOutput, EphemeralRun};

/// What a program run does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Interpret a tiny subset of Python (`print('...')`, `raise ...`)
    Interpret,
    /// Never return
    Hang,
    /// Report the daemon as unreachable
    Unavailable,
}

#[derive(Debug)]
pub struct StubEngine {
    behavior: Behavior,
    fail_start: bool,
    known_runtimes: Mutex<HashSet<String>>,
    state_query_delay: Duration,
    vanish_on_exec: AtomicBool,

    running: Mutex<HashSet<String>>,
    calls: AtomicUsize,
    starts: AtomicUsize,
    execs: AtomicUsize,
    runs: Mutex<Vec<RunRecord>>,
}

/// What the stub saw for one ephemeral run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub name: String,
    pub runtime: Option<String>,
    pub workspace: PathBuf,
    pub workspace_existed: bool,
    pub command: Vec<String>,
}

impl StubEngine {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            fail_start: false,
            known_runtimes: Mutex::new(["runc", "runsc"].into_iter().map(String::from).collect()),
            state_query_delay: Duration::from_millis(20),
            vanish_on_exec: AtomicBool::new(false),
            running: Mutex::new(HashSet::new()),
            calls: AtomicUsize::new(0),
            starts: AtomicUsize::new(0),
            execs: AtomicUsize::new(0),
            runs: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn with_runtimes(mut self, runtimes: &[&str]) -> Self {
        self.known_runtimes = Mutex::new(runtimes.iter().map(|r| r.to_string()).collect());
        self
    }

    /// Make a runtime known to the engine from now on
    pub fn install_runtime(&self, runtime: &str) {
        self.known_runtimes.lock().unwrap().insert(runtime.to_owned());
    }

    /// Every call through the engine boundary
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn execs(&self) -> usize {
        self.execs.load(Ordering::SeqCst)
    }

    pub fn runs(&self) -> Vec<RunRecord> {
        self.runs.lock().unwrap().clone()
    }

    /// Simulate a warm container dying
    pub fn kill(&self, name: &str) {
        self.running.lock().unwrap().remove(name);
    }

    /// Let the next exec find its container gone after the state query passed
    pub fn vanish_on_next_exec(&self) {
        self.vanish_on_exec.store(true, Ordering::SeqCst);
    }

    fn enter(&self) -> Result<(), EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            Behavior::Unavailable => Err(EngineError::Unavailable(
                "Cannot connect to the Docker daemon".to_owned(),
            )),
            _ => Ok(()),
        }
    }

    async fn program(&self, code: &str) -> EngineOutput {
        if self.behavior == Behavior::Hang {
            std::future::pending::<()>().await;
        }
        interpret(code)
    }
}

/// Output of `code` under the toy interpreter
pub fn interpret(code: &str) -> EngineOutput {
    let code = code.trim();
    if let Some(message) = code
        .strip_prefix("print('")
        .and_then(|rest| rest.strip_suffix("')"))
    {
        return EngineOutput {
            stdout: format!("{message}\n"),
            stderr: String::new(),
            exit_code: 0,
        };
    }
    if let Some(error) = code.strip_prefix("raise ") {
        return EngineOutput {
            stdout: String::new(),
            stderr: format!("Traceback (most recent call last):\n{error}\n"),
            exit_code: 1,
        };
    }
    EngineOutput::default()
}

fn read_staged(workspace: &Path, command: &[String]) -> Option<String> {
    let source = command.last()?;
    std::fs::read_to_string(workspace.join(source)).ok()
}

#[async_trait]
impl ContainerEngine for StubEngine {
    async fn is_running(&self, name: &str) -> Result<bool, EngineError> {
        self.enter()?;
        let running = self.running.lock().unwrap().contains(name);
        // Widen the window between query and start
        tokio::time::sleep(self.state_query_delay).await;
        Ok(running)
    }

    async fn start_detached(
        &self,
        name: &str,
        _image: &str,
        _keep_alive: &[String],
    ) -> Result<(), EngineError> {
        self.enter()?;
        self.starts.fetch_add(1, Ordering::SeqCst);
        if self.fail_start {
            return Err(EngineError::CommandFailed {
                code: 125,
                stderr: "Unable to find image 'python:3.12-slim' locally".to_owned(),
            });
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.running.lock().unwrap().insert(name.to_owned());
        Ok(())
    }

    async fn exec_in(
        &self,
        name: &str,
        command: &[String],
        _timeout: Duration,
    ) -> Result<EngineOutput, EngineError> {
        self.enter()?;
        self.execs.fetch_add(1, Ordering::SeqCst);
        if self.vanish_on_exec.swap(false, Ordering::SeqCst) {
            self.kill(name);
        }
        if !self.running.lock().unwrap().contains(name) {
            return Err(EngineError::NotRunning(name.to_owned()));
        }
        let code = command.last().cloned().unwrap_or_default();
        Ok(self.program(&code).await)
    }

    async fn run_ephemeral(
        &self,
        run: &EphemeralRun,
        _timeout: Duration,
    ) -> Result<EngineOutput, EngineError> {
        self.enter()?;
        let workspace = PathBuf::from(&run.mount.source);
        let code = read_staged(&workspace, &run.command);
        self.runs.lock().unwrap().push(RunRecord {
            name: run.name.clone(),
            runtime: run.runtime.clone(),
            workspace_existed: workspace.is_dir(),
            workspace,
            command: run.command.clone(),
        });
        Ok(self.program(&code.unwrap_or_default()).await)
    }

    async fn runtime_available(&self, runtime: &str) -> Result<bool, EngineError> {
        self.enter()?;
        Ok(self.known_runtimes.lock().unwrap().contains(runtime))
    }

    async fn reap_orphans(&self) -> Result<usize, EngineError> {
        self.enter()?;
        Ok(0)
    }
}
