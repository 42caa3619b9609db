use super::*;
use crate::testing::{Script, ScriptedSandbox};
use netsweep_config::PathsConfig;
use netsweep_protocols::ModuleDescriptor;
use netsweep_store::MemoryCatalog;
use tempfile::TempDir;

struct Fixture {
    runner: JobRunner,
    sandbox: Arc<ScriptedSandbox>,
    dir: TempDir,
}

fn fixture_with(tweak: impl FnOnce(&mut RunnerConfig)) -> Fixture {
    let dir = TempDir::new().unwrap();
    let paths = PathsConfig::default().resolve(dir.path());
    let mut config = RunnerConfig::default();
    tweak(&mut config);

    let catalog = MemoryCatalog::new()
        .with_module(ModuleDescriptor::new("cdp_discovery"))
        .with_module(ModuleDescriptor::new("ping_monitor"));
    let sandbox = ScriptedSandbox::new();
    let runner = JobRunner::new(config, paths, Arc::new(catalog), sandbox.clone());

    Fixture {
        runner,
        sandbox,
        dir,
    }
}

fn fixture() -> Fixture {
    fixture_with(|_| {})
}

fn site_config(site: &str) -> Map<String, Value> {
    let mut config = Map::new();
    config.insert("site_name".to_string(), Value::String(site.to_string()));
    config.insert(
        "parameters".to_string(),
        serde_json::json!({ "root_ip": "10.0.0.1", "password": "hunter2" }),
    );
    config
}

#[tokio::test]
async fn test_unknown_module_creates_no_record() {
    let f = fixture();

    let err = f
        .runner
        .submit("does-not-exist", Map::new())
        .await
        .unwrap_err();

    assert!(matches!(err, RunnerError::ModuleNotFound(_)));
    assert_eq!(f.runner.list_jobs(), JobListing::default());
    assert_eq!(f.sandbox.invocation_count(), 0);
}

#[tokio::test]
async fn test_json_stdout_becomes_output() {
    let f = fixture();
    f.sandbox
        .script("cdp_discovery", Script::json(serde_json::json!({ "status": "ok" })));

    let handle = f
        .runner
        .submit_watched("cdp_discovery", site_config("SiteA"))
        .await
        .unwrap();
    let record = handle.wait().await;

    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(record.progress, progress::DONE);
    assert_eq!(record.output, Some(serde_json::json!({ "status": "ok" })));
    assert!(record.completed_time.is_some());
    assert!(record.error.is_none());
}

#[tokio::test]
async fn test_plain_stdout_is_wrapped() {
    let f = fixture();
    f.sandbox.script("cdp_discovery", Script::print("found 3 devices\n"));

    let id = f.runner.submit("cdp_discovery", Map::new()).await.unwrap();
    let record = f.runner.wait(&id).await.unwrap();

    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(
        record.output,
        Some(serde_json::json!({ "message": "found 3 devices\n" }))
    );
}

#[tokio::test]
async fn test_nonzero_exit_fails_with_stderr() {
    let f = fixture();
    f.sandbox
        .script("cdp_discovery", Script::fail(2, "ssh: connection refused"));

    let id = f.runner.submit("cdp_discovery", Map::new()).await.unwrap();
    let record = f.runner.wait(&id).await.unwrap();

    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.error.as_deref(), Some("ssh: connection refused"));
    assert!(record.output.is_none());
}

#[tokio::test]
async fn test_timeout_sets_no_output() {
    let f = fixture_with(|c| c.timeout_secs = 1);
    f.sandbox.script(
        "cdp_discovery",
        Script::print("too late").after(Duration::from_secs(30)),
    );

    let handle = f
        .runner
        .submit_watched("cdp_discovery", Map::new())
        .await
        .unwrap();
    assert_eq!(handle.current().status, JobStatus::Running);

    let record = handle.wait().await;
    assert_eq!(record.status, JobStatus::Timeout);
    assert!(record.output.is_none());
    assert_eq!(record.progress, progress::DONE);
}

#[tokio::test]
async fn test_sandbox_error_is_engine_error() {
    let f = fixture();
    f.sandbox
        .script("cdp_discovery", Script::spawn_error("permission denied"));

    let id = f.runner.submit("cdp_discovery", Map::new()).await.unwrap();
    let record = f.runner.wait(&id).await.unwrap();

    assert_eq!(record.status, JobStatus::Error);
    assert!(record.error.unwrap().contains("permission denied"));
}

#[tokio::test]
async fn test_supervisor_panic_is_recorded_and_runner_survives() {
    let f = fixture();
    f.sandbox.script("cdp_discovery", Script::panic("unexpected state"));

    let id = f.runner.submit("cdp_discovery", Map::new()).await.unwrap();
    let record = f.runner.wait(&id).await.unwrap();
    assert_eq!(record.status, JobStatus::Error);
    assert_eq!(record.error.as_deref(), Some("unexpected state"));
    assert_eq!(record.progress, progress::DONE);

    // Config file is gone even though the supervisor unwound.
    let config = f
        .dir
        .path()
        .join("run")
        .join(ConfigArtifact::file_name(&id));
    assert!(!config.exists());

    let next = f.runner.submit("ping_monitor", Map::new()).await.unwrap();
    assert_eq!(
        f.runner.wait(&next).await.unwrap().status,
        JobStatus::Completed
    );
}

#[tokio::test]
async fn test_progress_is_monotonic() {
    let f = fixture();
    f.sandbox.script(
        "cdp_discovery",
        Script::print("{}").after(Duration::from_millis(100)),
    );

    let handle = f
        .runner
        .submit_watched("cdp_discovery", Map::new())
        .await
        .unwrap();
    let mut rx = handle.rx.clone();

    let mut seen = vec![rx.borrow_and_update().progress];
    while !rx.borrow().status.is_terminal() {
        if rx.changed().await.is_err() {
            break;
        }
        let record = rx.borrow_and_update().clone();
        seen.push(record.progress);
        if record.status.is_terminal() {
            assert_eq!(record.progress, progress::DONE);
        }
    }

    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    assert!(seen.iter().all(|p| [0, 25, 75, 100].contains(p)));
    assert_eq!(seen.last(), Some(&progress::DONE));
}

#[tokio::test]
async fn test_config_file_contents_and_cleanup() {
    let f = fixture();

    let id = f
        .runner
        .submit("cdp_discovery", site_config("SiteA"))
        .await
        .unwrap();
    f.runner.wait(&id).await.unwrap();

    let invocation = &f.sandbox.invocations()[0];
    assert_eq!(invocation.module_id, "cdp_discovery");
    assert_eq!(invocation.site(), Some("SiteA"));
    assert_eq!(invocation.config["job_id"], id.as_str());
    assert_eq!(invocation.config["module_id"], "cdp_discovery");
    assert_eq!(invocation.parameters().unwrap()["root_ip"], "10.0.0.1");

    let database_path = invocation.config["database_path"].as_str().unwrap();
    assert!(Path::new(database_path).is_absolute());
    assert!(database_path.ends_with("database.json"));

    let config_path = PathBuf::from(invocation.request.args.last().unwrap());
    assert!(config_path.ends_with(ConfigArtifact::file_name(&id)));
    assert!(!config_path.exists());
}

#[tokio::test]
async fn test_request_env_and_cwd() {
    let f = fixture();

    let id = f.runner.submit("cdp_discovery", Map::new()).await.unwrap();
    f.runner.wait(&id).await.unwrap();

    let request = &f.sandbox.invocations()[0].request;
    assert!(request.env.contains(&("NETSWEEP_JOB_ID".to_string(), id.clone())));
    assert_eq!(request.cwd.as_deref(), Some(f.dir.path()));
    assert!(request.kill_on_timeout);
}

#[tokio::test]
async fn test_status_is_masked() {
    let f = fixture();
    f.sandbox.script(
        "cdp_discovery",
        Script::json(serde_json::json!({ "device": { "ip": "10.0.0.2", "password": "hunter2" } })),
    );

    let id = f.runner.submit("cdp_discovery", Map::new()).await.unwrap();
    f.runner.wait(&id).await.unwrap();

    let record = f.runner.status(&id).unwrap();
    let json = serde_json::to_string(&record).unwrap();
    assert!(!json.contains("hunter2"));
    assert_eq!(record.output.unwrap()["device"]["ip"], "10.0.0.2");
}

#[tokio::test]
async fn test_log_is_masked_and_deletable() {
    let f = fixture();

    let id = f
        .runner
        .submit("cdp_discovery", site_config("SiteA"))
        .await
        .unwrap();
    f.runner.wait(&id).await.unwrap();

    let log = f.runner.log(&id, false, None).await.unwrap();
    assert!(log.contains("Job submitted"));
    assert!(log.contains("Job finished: completed"));
    assert!(!log.contains("hunter2"));

    let last = f.runner.log(&id, true, Some(1)).await.unwrap();
    assert_eq!(last.lines().count(), 1);

    let err = f.runner.log(&id, false, None).await.unwrap_err();
    assert!(matches!(err, RunnerError::LogNotFound(_)));
}

#[tokio::test]
async fn test_log_rejects_path_like_ids() {
    let f = fixture();
    let err = f.runner.log("../secrets", false, None).await.unwrap_err();
    assert!(matches!(err, RunnerError::JobNotFound(_)));
}

#[tokio::test]
async fn test_status_unknown_job() {
    let f = fixture();
    assert!(matches!(
        f.runner.status("nope"),
        Err(RunnerError::JobNotFound(_))
    ));
    assert!(matches!(
        f.runner.wait("nope").await,
        Err(RunnerError::JobNotFound(_))
    ));
}

#[tokio::test]
async fn test_list_jobs_splits_running_and_finished() {
    let f = fixture();
    f.sandbox.script(
        "ping_monitor",
        Script::print("{}").after(Duration::from_secs(5)),
    );

    let done = f.runner.submit("cdp_discovery", Map::new()).await.unwrap();
    f.runner.wait(&done).await.unwrap();
    let running = f.runner.submit("ping_monitor", Map::new()).await.unwrap();

    let listing = f.runner.list_jobs();
    assert_eq!(listing.finished, vec![done]);
    assert_eq!(listing.running, vec![running]);
}

#[tokio::test]
async fn test_concurrency_cap() {
    let f = fixture_with(|c| c.max_concurrent_jobs = 2);
    f.sandbox
        .fallback(Script::print("{}").after(Duration::from_millis(150)));

    let mut handles = Vec::new();
    for _ in 0..5 {
        handles.push(
            f.runner
                .submit_watched("cdp_discovery", Map::new())
                .await
                .unwrap(),
        );
    }
    for handle in handles {
        assert_eq!(handle.wait().await.status, JobStatus::Completed);
    }

    assert_eq!(f.sandbox.invocation_count(), 5);
    assert!(f.sandbox.peak_concurrency() <= 2);
}

#[tokio::test]
async fn test_reaper_evicts_records_then_logs() {
    let f = fixture_with(|c| {
        c.retention_secs = 0;
        c.log_retention_secs = 1;
    });
    let shutdown = CancellationToken::new();
    let reaper = f.runner.start(shutdown.clone());

    let id = f.runner.submit("cdp_discovery", Map::new()).await.unwrap();
    f.runner.wait(&id).await.unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(matches!(
        f.runner.status(&id),
        Err(RunnerError::JobNotFound(_))
    ));
    // Log outlives the record.
    assert!(f.runner.log(&id, false, None).await.is_ok());

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(matches!(
        f.runner.log(&id, false, None).await,
        Err(RunnerError::LogNotFound(_))
    ));

    shutdown.cancel();
    reaper.await.unwrap();
}

#[test]
fn test_verdict_mapping() {
    let timeout = Duration::from_secs(300);

    let (status, output, _) = verdict(
        SpawnOutcome::Exited {
            code: 0,
            stdout: "  {\"n\": 1}\n".to_string(),
            stderr: String::new(),
        },
        timeout,
    );
    assert_eq!(status, JobStatus::Completed);
    assert_eq!(output, Some(serde_json::json!({ "n": 1 })));

    let (status, _, error) = verdict(
        SpawnOutcome::Exited {
            code: 1,
            stdout: String::new(),
            stderr: String::new(),
        },
        timeout,
    );
    assert_eq!(status, JobStatus::Failed);
    assert_eq!(error.as_deref(), Some("module exited with code 1"));

    let (status, output, error) = verdict(
        SpawnOutcome::TimedOut {
            killed: false,
            stderr: String::new(),
        },
        timeout,
    );
    assert_eq!(status, JobStatus::Timeout);
    assert!(output.is_none());
    assert!(error.unwrap().contains("left running"));
}

#[cfg(unix)]
mod process {
    use super::*;
    use crate::sandbox::TokioSandbox;

    fn module(dir: &Path, id: &str, body: &str) -> ModuleDescriptor {
        let module_dir = dir.join("modules").join(id);
        std::fs::create_dir_all(&module_dir).unwrap();
        let entry = module_dir.join("run.sh");
        std::fs::write(&entry, body).unwrap();
        ModuleDescriptor::new(id).with_entrypoint(entry)
    }

    fn process_runner(dir: &TempDir, timeout_secs: u64, modules: Vec<ModuleDescriptor>) -> JobRunner {
        let paths = PathsConfig::default().resolve(dir.path());
        let config = RunnerConfig {
            timeout_secs,
            ..Default::default()
        };
        let mut catalog = MemoryCatalog::new();
        for m in modules {
            catalog = catalog.with_module(m);
        }
        JobRunner::new(config, paths, Arc::new(catalog), Arc::new(TokioSandbox::new()))
    }

    #[tokio::test]
    async fn test_real_module_reads_config_and_prints_json() {
        let dir = TempDir::new().unwrap();
        let echo = module(
            dir.path(),
            "echo_site",
            r#"site=$(sed -n 's/.*"site_name": *"\([^"]*\)".*/\1/p' "$1")
echo "{\"status\":\"ok\",\"site\":\"$site\"}""#,
        );
        let runner = process_runner(&dir, 10, vec![echo]);

        let id = runner.submit("echo_site", site_config("SiteA")).await.unwrap();
        let record = runner.wait(&id).await.unwrap();

        assert_eq!(record.status, JobStatus::Completed);
        assert_eq!(
            record.output,
            Some(serde_json::json!({ "status": "ok", "site": "SiteA" }))
        );
    }

    #[tokio::test]
    async fn test_real_module_timeout() {
        let dir = TempDir::new().unwrap();
        let sleeper = module(dir.path(), "sleeper", "sleep 30\necho '{}'");
        let runner = process_runner(&dir, 1, vec![sleeper]);

        let started = std::time::Instant::now();
        let id = runner.submit("sleeper", Map::new()).await.unwrap();
        let record = runner.wait(&id).await.unwrap();

        assert_eq!(record.status, JobStatus::Timeout);
        assert!(record.output.is_none());
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
