use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

use verifier_config::{RepositorySource, VerifierConfig};
use verifier_service::{PluginClassesReport, PluginClassesTask, ServiceContext, ServiceError};
use verifier_tasks::{EnqueueOptions, TaskCallbacks, TaskState};
use verifier_test_utils::{write_distribution_ide, write_jmod_jdk, ClassBuilder, JarBuilder};

const WAIT: Duration = Duration::from_secs(30);

struct Fixture {
    _tmp: tempfile::TempDir,
    root: PathBuf,
}

impl Fixture {
    /// A plugin source directory, two IDE builds and a modular JDK.
    fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().to_path_buf();

        let source = root.join("source");
        std::fs::create_dir_all(&source).unwrap();
        JarBuilder::new()
            .class_file(
                "com/plugin/Action",
                ClassBuilder::new("com/plugin/Action").super_class("com/intellij/AnAction").build(),
            )
            .class("com/plugin/Util")
            .class_file(
                "com/plugin/Broken",
                ClassBuilder::new("com/plugin/Broken").super_class("com/missing/Base").build(),
            )
            .write(&source.join("plugin.jar"));

        write_distribution_ide(&root.join("ides/172"), "IU-172.3317.76", &[("platform", &["com/intellij/AnAction"])]);
        write_distribution_ide(&root.join("ides/181"), "IU-181.2", &[("platform", &["com/intellij/AnAction"])]);
        write_jmod_jdk(&root.join("jdk"), &[("java.base", &["java/lang/Object"])]);

        Fixture { _tmp: tmp, root }
    }

    fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    fn config(&self) -> VerifierConfig {
        let mut config = VerifierConfig::default();
        config.repository.directory = self.path("repository");
        config.repository.source = Some(RepositorySource::Directory(self.path("source")));
        config.paths.ides_dir = Some(self.path("ides"));
        config.tasks.concurrency = 2;
        config.tasks.shutdown_timeout = 5;
        config
    }
}

fn run_plugin_classes(
    context: &ServiceContext,
    plugin: &str,
    ide: &Path,
    jdk: &Path,
) -> (TaskState, Result<PluginClassesReport, String>) {
    let task = PluginClassesTask::new(context, plugin, ide, jdk).unwrap();
    let (tx, rx) = mpsc::channel();
    let error_tx = tx.clone();
    let descriptor = context
        .task_manager()
        .enqueue_with_options(
            task,
            EnqueueOptions::default(),
            TaskCallbacks::new()
                .on_success(move |report, _| {
                    let _ = tx.send(Ok(report));
                })
                .on_error(move |err, _| {
                    let _ = error_tx.send(Err(err.to_string()));
                }),
        )
        .unwrap();
    assert!(descriptor.wait_for_completion(WAIT));
    (descriptor.state(), rx.recv_timeout(WAIT).unwrap())
}

#[test]
fn plugin_classes_resolve_against_ide_and_jdk() {
    let fixture = Fixture::new();
    let context = ServiceContext::start(fixture.config()).unwrap();

    let (state, report) = run_plugin_classes(&context, "plugin.jar", &fixture.path("ides/172"), &fixture.path("jdk"));
    assert_eq!(state, TaskState::Success);
    let report = report.unwrap();
    assert_eq!(report.classes, 3);
    assert_eq!(report.packages, vec!["com", "com/plugin"]);

    let location = |class: &str| {
        report
            .parents
            .iter()
            .find(|p| p.class == class)
            .and_then(|p| p.location.clone())
    };
    let action = location("com/plugin/Action").unwrap();
    assert!(action.starts_with("jar ") && action.ends_with("platform.jar"), "{action}");
    let util = location("com/plugin/Util").unwrap();
    assert!(util.starts_with("jmod ") && util.ends_with("java.base.jmod"), "{util}");
    assert_eq!(location("com/plugin/Broken"), None);
    assert_eq!(report.unresolved_parents().count(), 1);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["plugin"], "plugin.jar");
    assert_eq!(json["classes"], 3);

    // Every handle the task took has been released.
    assert_eq!(context.ide_descriptors().stats().pinned, 0);
    assert_eq!(context.jdk_descriptors().stats().pinned, 0);
    assert_eq!(context.plugin_repository().unwrap().stats().pinned, 0);
    assert!(fixture.path("repository/plugin.jar").is_file());

    context.shutdown().unwrap();
}

#[test]
fn failure_midway_releases_acquired_handles() {
    let fixture = Fixture::new();
    let context = ServiceContext::start(fixture.config()).unwrap();

    let (state, report) = run_plugin_classes(
        &context,
        "plugin.jar",
        &fixture.path("ides/172"),
        &fixture.path("no-such-jdk"),
    );
    assert_eq!(state, TaskState::Error);
    assert!(report.unwrap_err().contains("JDK not found"));

    assert_eq!(context.ide_descriptors().stats().pinned, 0);
    assert_eq!(context.plugin_repository().unwrap().stats().pinned, 0);
    context.shutdown().unwrap();
}

#[test]
fn missing_plugin_is_reported_as_error() {
    let fixture = Fixture::new();
    let context = ServiceContext::start(fixture.config()).unwrap();

    let (state, report) = run_plugin_classes(&context, "absent.jar", &fixture.path("ides/172"), &fixture.path("jdk"));
    assert_eq!(state, TaskState::Error);
    assert!(report.unwrap_err().contains("absent.jar is not available"));
    assert_eq!(context.ide_descriptors().stats().resident, 0);
    context.shutdown().unwrap();
}

#[test]
fn lock_ides_in_range_pins_matching_builds() {
    let fixture = Fixture::new();
    let context = ServiceContext::start(fixture.config()).unwrap();

    let handles = context
        .lock_ides_in_range(&"172.0".parse().unwrap(), &"172.*".parse().unwrap())
        .unwrap();
    assert_eq!(handles.len(), 1);
    assert_eq!(handles[0].path, fixture.path("ides/172"));
    assert_eq!(context.ide_descriptors().stats().pinned, 1);

    let all = context
        .lock_ides_in_range(&"100.0".parse().unwrap(), &"999.0".parse().unwrap())
        .unwrap();
    assert_eq!(all.len(), 2);

    drop(handles);
    drop(all);
    assert_eq!(context.ide_descriptors().stats().pinned, 0);
    context.shutdown().unwrap();
}

#[test]
fn unconfigured_components_are_reported() {
    let context = ServiceContext::start(VerifierConfig::default()).unwrap();
    assert!(matches!(
        context.plugin_repository(),
        Err(ServiceError::NotConfigured("repository.source"))
    ));
    assert!(matches!(
        context.lock_ides_in_range(&"1.0".parse().unwrap(), &"2.0".parse().unwrap()),
        Err(ServiceError::NotConfigured("paths.ides_dir"))
    ));
    context.shutdown().unwrap();
}

#[test]
fn shutdown_twice_is_an_error() {
    let fixture = Fixture::new();
    let context = ServiceContext::start(fixture.config()).unwrap();
    context.shutdown().unwrap();
    assert!(context.is_shut_down());
    assert!(matches!(context.shutdown(), Err(ServiceError::AlreadyClosed)));
    assert!(context.jdk_descriptors().get(&fixture.path("jdk")).is_err());
}

#[test]
fn invalid_config_is_rejected_at_start() {
    let mut config = VerifierConfig::default();
    config.cache.ide_cache_size = 0;
    assert!(matches!(ServiceContext::start(config), Err(ServiceError::Config(_))));
}
