mod common;

use cloudfs_fs::KernelBinding;
use cloudfs_profile::{
    ConfigSchema, HookError, Profile, ProfileContext, ProfileError, Service, ServiceRegistry,
    StartPlan, ValueKind, Worker,
};
use common::{EmptyFs, FakeBinding};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Configurable service for exercising the lifecycle.
#[derive(Default)]
struct TestService {
    mount_point: PathBuf,
    fail_create: bool,
    fail_remove: bool,
    stamp_created: bool,
    events: Option<Arc<Mutex<Vec<String>>>>,
}

impl Service for TestService {
    fn name(&self) -> &str {
        "test"
    }

    fn label(&self) -> &str {
        "Test Service"
    }

    fn version(&self) -> &str {
        "9.9.9"
    }

    fn default_config(&self) -> Value {
        json!({ "limit": 3 })
    }

    fn schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .required("limit", ValueKind::Integer)
            .optional("token", ValueKind::String)
    }

    fn create(&self, _ctx: &ProfileContext, mut config: Value) -> Result<Value, HookError> {
        if self.fail_create {
            return Err(HookError::msg("authentication declined"));
        }
        if self.stamp_created {
            config["token"] = json!("secret");
        }
        Ok(config)
    }

    fn remove(&self, _ctx: &ProfileContext) -> Result<(), HookError> {
        if self.fail_remove {
            return Err(HookError::msg("credential store unavailable"));
        }
        Ok(())
    }

    fn start(&self, _ctx: &ProfileContext, _config: &Value) -> Result<StartPlan, HookError> {
        let mut plan = StartPlan::new(Arc::new(EmptyFs), &self.mount_point);
        if let Some(events) = &self.events {
            plan = plan
                .worker(background("A", events))
                .worker(barrier_worker(events))
                .worker(background("C", events));
        }
        Ok(plan)
    }
}

fn push(events: &Arc<Mutex<Vec<String>>>, event: &str) {
    events.lock().push(event.to_string());
}

fn background(name: &'static str, events: &Arc<Mutex<Vec<String>>>) -> Worker {
    let events = Arc::clone(events);
    Worker::detached(name, move |ctx| {
        push(&events, &format!("{} started", name));
        while !ctx.shutdown().wait_timeout(Duration::from_secs(30)) {}
        push(&events, &format!("{} stopped", name));
        Ok(())
    })
}

/// Must-join worker that only finishes once both detached workers run.
fn barrier_worker(events: &Arc<Mutex<Vec<String>>>) -> Worker {
    let events = Arc::clone(events);
    Worker::joined("B", move |_| {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            {
                let seen = events.lock();
                if seen.iter().any(|e| e == "A started") && seen.iter().any(|e| e == "C started")
                {
                    break;
                }
            }
            if Instant::now() > deadline {
                return Err("detached workers never started".into());
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        std::thread::sleep(Duration::from_millis(50));
        push(&events, "B done");
        Ok(())
    })
}

fn profile(app_root: &Path, service: TestService, name: &str) -> Profile {
    Profile::new(app_root, Arc::new(service), name).unwrap()
}

fn position(events: &[String], event: &str) -> usize {
    events
        .iter()
        .position(|e| e == event)
        .unwrap_or_else(|| panic!("missing event '{}' in {:?}", event, events))
}

// =============================================================================
// Naming
// =============================================================================

#[test]
fn invalid_names_fail_initialization() {
    let temp_dir = TempDir::new().unwrap();
    for name in ["a/b", "/", "None", "", "..", "."] {
        let result = Profile::new(temp_dir.path(), Arc::new(TestService::default()), name);
        assert!(
            matches!(result, Err(ProfileError::Initialization(_))),
            "{:?} should be rejected",
            name
        );
    }
}

#[test]
fn ordinary_names_are_accepted() {
    let temp_dir = TempDir::new().unwrap();
    for name in ["alice", "none", "NONE", "my drive", "a.b", "None2"] {
        let p = Profile::new(temp_dir.path(), Arc::new(TestService::default()), name).unwrap();
        assert_eq!(p.profile_name(), name);
        assert_eq!(p.profile_path(), temp_dir.path().join("test").join(name));
        assert_eq!(p.cache_path(), p.profile_path().join("cache"));
        assert!(!p.exists());
    }
}

// =============================================================================
// Create / remove
// =============================================================================

#[test]
fn create_persists_default_config_and_version() {
    let temp_dir = TempDir::new().unwrap();
    let p = profile(temp_dir.path(), TestService::default(), "alice");

    p.create().unwrap();

    assert_eq!(p.load_config().unwrap(), json!({ "limit": 3 }));
    assert_eq!(p.version().as_deref(), Some("9.9.9"));
    assert!(p.cache_path().is_dir());

    let raw = fs::read_to_string(p.config_path()).unwrap();
    assert!(raw.contains("\n    \"limit\": 3"), "{}", raw);
}

#[test]
fn create_persists_hook_output() {
    let temp_dir = TempDir::new().unwrap();
    let service = TestService {
        stamp_created: true,
        ..TestService::default()
    };
    let p = profile(temp_dir.path(), service, "alice");

    p.create().unwrap();

    assert_eq!(
        p.load_config().unwrap(),
        json!({ "limit": 3, "token": "secret" })
    );
}

#[test]
fn create_twice_fails() {
    let temp_dir = TempDir::new().unwrap();
    let p = profile(temp_dir.path(), TestService::default(), "alice");
    p.create().unwrap();

    let err = p.create().unwrap_err();

    assert!(matches!(err, ProfileError::Creation(_)));
    assert!(err.to_string().contains("already exists"));
    assert_eq!(p.load_config().unwrap(), json!({ "limit": 3 }));
}

#[test]
fn failed_create_hook_leaves_nothing_behind() {
    let temp_dir = TempDir::new().unwrap();
    let service = TestService {
        fail_create: true,
        ..TestService::default()
    };
    let p = profile(temp_dir.path(), service, "alice");

    let err = p.create().unwrap_err();

    assert!(matches!(err, ProfileError::Creation(_)));
    assert!(err.to_string().contains("authentication declined"));
    assert!(!p.exists());
}

#[test]
fn remove_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let p = profile(temp_dir.path(), TestService::default(), "alice");

    p.remove().unwrap();
    p.create().unwrap();
    p.remove().unwrap();
    assert!(!p.exists());
    p.remove().unwrap();
    assert!(!p.exists());
}

#[test]
fn remove_deletes_even_when_hook_fails() {
    let temp_dir = TempDir::new().unwrap();
    let service = TestService {
        fail_remove: true,
        ..TestService::default()
    };
    let p = profile(temp_dir.path(), service, "alice");
    p.create().unwrap();

    let err = p.remove().unwrap_err();

    assert!(matches!(err, ProfileError::Removal(_)));
    assert!(!p.exists());
    p.remove().unwrap();
}

// =============================================================================
// Start
// =============================================================================

#[test]
fn start_requires_existing_profile() {
    let temp_dir = TempDir::new().unwrap();
    let p = profile(temp_dir.path(), TestService::default(), "ghost");

    let err = p.start_with(&FakeBinding::default(), false, false).unwrap_err();

    assert!(matches!(err, ProfileError::Starting(_)));
    assert!(err.to_string().contains("does not exist"));
}

#[test]
fn start_rejects_invalid_config() {
    let temp_dir = TempDir::new().unwrap();
    let service = TestService {
        mount_point: temp_dir.path().join("mnt"),
        ..TestService::default()
    };
    let p = profile(temp_dir.path(), service, "alice");
    p.create().unwrap();
    let binding = FakeBinding::default();

    fs::write(p.config_path(), "{ not json").unwrap();
    let err = p.start_with(&binding, false, false).unwrap_err();
    assert!(matches!(err, ProfileError::Starting(_)));

    fs::write(p.config_path(), r#"{"limit": "many"}"#).unwrap();
    let err = p.start_with(&binding, false, false).unwrap_err();
    assert!(matches!(err, ProfileError::Starting(_)));
    assert!(err.to_string().contains("limit"));

    assert!(binding.sessions.lock().is_empty());
}

#[test]
fn start_rejects_occupied_mount_point() {
    let temp_dir = TempDir::new().unwrap();
    let mount_point = temp_dir.path().join("mnt");
    fs::create_dir(&mount_point).unwrap();
    fs::write(mount_point.join("x"), "").unwrap();
    let service = TestService {
        mount_point,
        ..TestService::default()
    };
    let p = profile(temp_dir.path(), service, "alice");
    p.create().unwrap();
    let binding = FakeBinding::default();

    let err = p.start_with(&binding, false, false).unwrap_err();

    assert!(matches!(err, ProfileError::Starting(_)));
    assert!(binding.sessions.lock().is_empty());
}

#[test]
fn must_join_workers_finish_before_mount() {
    let temp_dir = TempDir::new().unwrap();
    let events = Arc::new(Mutex::new(Vec::new()));
    let service = TestService {
        mount_point: temp_dir.path().join("mnt"),
        events: Some(Arc::clone(&events)),
        ..TestService::default()
    };
    let p = profile(temp_dir.path(), service, "alice");
    p.create().unwrap();

    p.start_with(&FakeBinding::with_events(Arc::clone(&events)), true, false)
        .unwrap();

    let events = events.lock().clone();
    let mount = position(&events, "mount");
    assert!(position(&events, "A started") < mount);
    assert!(position(&events, "C started") < mount);
    assert!(position(&events, "B done") < mount);
    assert!(position(&events, "A stopped") > mount);
    assert!(position(&events, "C stopped") > mount);
}

#[test]
fn failed_session_is_unmounted_and_reported() {
    let temp_dir = TempDir::new().unwrap();
    let mount_point = temp_dir.path().join("mnt");
    let events = Arc::new(Mutex::new(Vec::new()));
    let service = TestService {
        mount_point: mount_point.clone(),
        events: Some(Arc::clone(&events)),
        ..TestService::default()
    };
    let p = profile(temp_dir.path(), service, "alice");
    p.create().unwrap();
    let binding = FakeBinding::failing(io::ErrorKind::BrokenPipe);

    let err = p.start_with(&binding, false, false).unwrap_err();

    assert!(matches!(err, ProfileError::Starting(_)));
    assert!(err.to_string().contains("session crashed"));
    assert_eq!(*binding.unmounts.lock(), vec![mount_point.clone()]);
    assert!(!binding.is_mount_point(&mount_point).unwrap());
    let events = events.lock();
    assert!(events.iter().any(|e| e == "A stopped"));
    assert!(events.iter().any(|e| e == "C stopped"));
}

#[test]
fn demo_profile_end_to_end() {
    let temp_dir = TempDir::new().unwrap();
    let app_root = temp_dir.path().join("app");
    let mount_root = temp_dir.path().join("mnt");
    let registry = ServiceRegistry::builtin(&mount_root);

    let p = registry.profile(&app_root, "demo", "alice").unwrap();
    p.create().unwrap();

    let raw = fs::read_to_string(app_root.join("demo/alice/config.json")).unwrap();
    let config: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(config, json!({ "limit": 10 }));
    let version = fs::read_to_string(app_root.join("demo/alice/VERSION")).unwrap();
    assert_eq!(version.trim(), env!("CARGO_PKG_VERSION"));

    let mount_point = mount_root.join("alice");
    fs::create_dir_all(&mount_point).unwrap();
    let binding = FakeBinding::default();

    p.start_with(&binding, false, true).unwrap();

    let sessions = binding.sessions.lock();
    assert_eq!(sessions.len(), 1);
    let session = &sessions[0];
    assert_eq!(session.mount_point, mount_point);
    assert!(session.options.read_only);
    assert!(session.was_mount_point);
    assert_eq!(session.root_listing, vec![".", ".."]);
    assert!(p.cache_path().join("metadata.db").is_file());

    let listed = registry.profiles(&app_root).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].profile_name, "alice");
    assert_eq!(listed[0].version.as_deref(), Some(env!("CARGO_PKG_VERSION")));
}
