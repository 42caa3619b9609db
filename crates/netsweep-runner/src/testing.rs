//! In-process sandbox for tests.
//!
//! [`ScriptedSandbox`] never starts a process. It reads the job config
//! the runner wrote, records the invocation, and answers with a canned
//! outcome per module id.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use netsweep_protocols::{ProcessSandbox, SandboxError, SpawnOutcome, SpawnRequest};
use parking_lot::Mutex;
use serde_json::Value;

/// What a scripted module does when invoked.
#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    /// Exit 0 printing `stdout`.
    Print(String),
    /// Exit with `code`, writing `stderr`.
    Fail { code: i32, stderr: String },
    /// Fail to start at all.
    SpawnError(String),
    /// Panic inside the sandbox call.
    Panic(String),
}

/// A canned response with an optional run time.
#[derive(Debug, Clone)]
pub struct Script {
    pub delay: Duration,
    pub outcome: ScriptedOutcome,
}

impl Script {
    pub fn json(value: Value) -> Self {
        Self::print(value.to_string())
    }

    pub fn print(stdout: impl Into<String>) -> Self {
        Self {
            delay: Duration::ZERO,
            outcome: ScriptedOutcome::Print(stdout.into()),
        }
    }

    pub fn fail(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            delay: Duration::ZERO,
            outcome: ScriptedOutcome::Fail {
                code,
                stderr: stderr.into(),
            },
        }
    }

    pub fn spawn_error(reason: impl Into<String>) -> Self {
        Self {
            delay: Duration::ZERO,
            outcome: ScriptedOutcome::SpawnError(reason.into()),
        }
    }

    pub fn panic(message: impl Into<String>) -> Self {
        Self {
            delay: Duration::ZERO,
            outcome: ScriptedOutcome::Panic(message.into()),
        }
    }

    /// Run for `delay` before answering. A delay at or past the request
    /// timeout produces a timeout.
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// One recorded invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub module_id: String,
    /// Contents of the job config file at spawn time.
    pub config: Value,
    pub request: SpawnRequest,
}

impl Invocation {
    pub fn site(&self) -> Option<&str> {
        self.config.get("site_name").and_then(Value::as_str)
    }

    pub fn parameters(&self) -> Option<&serde_json::Map<String, Value>> {
        self.config.get("parameters").and_then(Value::as_object)
    }
}

#[derive(Debug, Default)]
struct Gauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

struct GaugeGuard<'a>(&'a Gauge);

impl<'a> GaugeGuard<'a> {
    fn enter(gauge: &'a Gauge) -> Self {
        let now = gauge.current.fetch_add(1, Ordering::SeqCst) + 1;
        gauge.peak.fetch_max(now, Ordering::SeqCst);
        Self(gauge)
    }
}

impl Drop for GaugeGuard<'_> {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Sandbox answering from a script table keyed by module id.
#[derive(Debug, Default)]
pub struct ScriptedSandbox {
    scripts: Mutex<HashMap<String, Script>>,
    fallback: Mutex<Option<Script>>,
    invocations: Mutex<Vec<Invocation>>,
    gauge: Gauge,
}

impl ScriptedSandbox {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Set the script for a module.
    pub fn script(&self, module_id: impl Into<String>, script: Script) {
        self.scripts.lock().insert(module_id.into(), script);
    }

    /// Script used for modules without their own entry.
    pub fn fallback(&self, script: Script) {
        *self.fallback.lock() = Some(script);
    }

    /// Every invocation so far, in start order.
    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().clone()
    }

    pub fn invocation_count(&self) -> usize {
        self.invocations.lock().len()
    }

    /// Highest number of invocations that were in flight at once.
    pub fn peak_concurrency(&self) -> usize {
        self.gauge.peak.load(Ordering::SeqCst)
    }

    fn script_for(&self, module_id: &str) -> Script {
        self.scripts
            .lock()
            .get(module_id)
            .cloned()
            .or_else(|| self.fallback.lock().clone())
            .unwrap_or_else(|| Script::json(serde_json::json!({ "status": "ok" })))
    }
}

#[async_trait]
impl ProcessSandbox for ScriptedSandbox {
    async fn spawn(&self, request: SpawnRequest) -> Result<SpawnOutcome, SandboxError> {
        let module_id = request
            .env
            .iter()
            .find(|(k, _)| k == "NETSWEEP_MODULE_ID")
            .map(|(_, v)| v.clone())
            .unwrap_or_default();
        let config = match request.args.last() {
            Some(path) => std::fs::read(path)
                .ok()
                .and_then(|bytes| serde_json::from_slice(&bytes).ok())
                .unwrap_or(Value::Null),
            None => Value::Null,
        };

        let script = self.script_for(&module_id);
        let timeout = request.timeout;
        self.invocations.lock().push(Invocation {
            module_id,
            config,
            request,
        });

        let _guard = GaugeGuard::enter(&self.gauge);
        if script.delay >= timeout {
            tokio::time::sleep(timeout).await;
            return Ok(SpawnOutcome::TimedOut {
                killed: true,
                stderr: String::new(),
            });
        }
        if !script.delay.is_zero() {
            tokio::time::sleep(script.delay).await;
        }

        match script.outcome {
            ScriptedOutcome::Print(stdout) => Ok(SpawnOutcome::Exited {
                code: 0,
                stdout,
                stderr: String::new(),
            }),
            ScriptedOutcome::Fail { code, stderr } => Ok(SpawnOutcome::Exited {
                code,
                stdout: String::new(),
                stderr,
            }),
            ScriptedOutcome::SpawnError(reason) => Err(SandboxError::Spawn {
                program: "scripted".to_string(),
                reason,
            }),
            ScriptedOutcome::Panic(message) => panic!("{}", message),
        }
    }
}
