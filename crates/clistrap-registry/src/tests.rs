use super::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use clistrap_core::{Variant, VersionHash};

static TEST_STORE_COUNTER: AtomicU64 = AtomicU64::new(0);

fn test_store_path() -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let sequence = TEST_STORE_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut path = std::env::temp_dir();
    path.push(format!(
        "clistrap-registry-tests-{}-{}-{}",
        std::process::id(),
        nanos,
        sequence
    ));
    path.push("registry.json");
    path
}

fn key(raw: &str) -> KeyPath {
    KeyPath::parse(raw).expect("valid key path")
}

fn sample_tree() -> DesiredConfigTree {
    let mut tree = DesiredConfigTree::new();
    tree.insert(
        key(r"HKCU\Software\Classes\roblox"),
        KeyNode::new()
            .value(ConfigValue::default_value("URL:Roblox Protocol"))
            .value(ConfigValue::string("URL Protocol", ""))
            .subkey(
                "shell",
                KeyNode::new().subkey(
                    "open",
                    KeyNode::new().subkey(
                        "command",
                        KeyNode::new().value(ConfigValue::default_value("\"app.exe\" \"%1\"")),
                    ),
                ),
            ),
    );
    tree
}

fn studio_context_paths() -> (VersionHash, PathBuf, PathBuf, PathBuf) {
    let version = VersionHash::parse("version-abc123").expect("valid version hash");
    let version_dir = PathBuf::from(r"C:\clistrap\Versions\version-abc123");
    let executable = version_dir.join("RobloxStudioBeta.exe");
    let launcher = PathBuf::from(r"C:\clistrap\clistrap.exe");
    (version, version_dir, executable, launcher)
}

/// Delegates to a [`MemoryStore`] but refuses to create one key path.
struct FailingStore {
    inner: MemoryStore,
    refuse: KeyPath,
}

impl ConfigStore for FailingStore {
    fn list_key(&self, path: &KeyPath) -> Result<KeyState> {
        self.inner.list_key(path)
    }

    fn create_key(&mut self, path: &KeyPath) -> Result<()> {
        if path.is_same(&self.refuse) {
            return Err(anyhow!("access denied: {path}"));
        }
        self.inner.create_key(path)
    }

    fn put_values(&mut self, path: &KeyPath, values: &[ConfigValue]) -> Result<()> {
        self.inner.put_values(path, values)
    }

    fn delete_key(&mut self, path: &KeyPath) -> Result<()> {
        self.inner.delete_key(path)
    }

    fn delete_value(&mut self, path: &KeyPath, name: &ValueName) -> Result<()> {
        self.inner.delete_value(path, name)
    }
}

fn command_args(command: &Command) -> Vec<String> {
    command
        .get_args()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect()
}

#[test]
fn key_path_parse_normalizes_separators_and_rejects_empty() {
    let path = key(r" HKCU\\Software\Classes\roblox\ ");
    assert_eq!(path.as_str(), r"HKCU\Software\Classes\roblox");
    assert_eq!(
        path.parent().expect("parent").as_str(),
        r"HKCU\Software\Classes"
    );
    assert!(path.is_same(&key(r"hkcu\software\classes\ROBLOX")));

    let err = KeyPath::parse(r" \\ ").expect_err("empty path should fail");
    assert!(err.to_string().contains("empty"), "unexpected error: {err}");
}

#[test]
fn key_path_keeps_forward_slashes_inside_key_names() {
    let path = key(r"HKCU\Software\Classes\MIME\Database\Content Type\text/plain");
    assert_eq!(
        path.parent().expect("parent").as_str(),
        r"HKCU\Software\Classes\MIME\Database\Content Type"
    );
    assert!(path.as_str().ends_with("text/plain"));
}

#[test]
fn empty_value_name_is_the_default_value() {
    let value = ConfigValue::named("", "X", ValueType::Sz);
    assert_eq!(value.name, ValueName::Default);
    assert_eq!(value.value_type, ValueType::Default);
    assert_eq!(value.name.to_string(), "(Default)");
    assert_eq!(ValueType::Default.native_tag(), "REG_SZ");
}

#[test]
fn value_matching_ignores_data_case_but_not_type() {
    let wanted = ConfigValue::string("version", "Version-ABC");
    assert!(wanted.matches(&ConfigValue::string("VERSION", "version-abc")));
    assert!(!wanted.matches(&ConfigValue::named(
        "version",
        "version-abc",
        ValueType::ExpandSz
    )));
}

#[test]
fn numeric_values_match_by_value_whatever_the_notation() {
    let wanted = ConfigValue::named("Enabled", "1", ValueType::Dword);
    assert!(wanted.matches(&ConfigValue::named("enabled", "0x1", ValueType::Dword)));
    assert!(wanted.matches(&ConfigValue::named("Enabled", "0x00000001", ValueType::Dword)));
    assert!(!wanted.matches(&ConfigValue::named("Enabled", "0x0", ValueType::Dword)));
    assert!(!wanted.matches(&ConfigValue::named("Enabled", "0x1", ValueType::Qword)));
    assert_eq!(parse_numeric_data("0xFF"), Some(255));
    assert_eq!(parse_numeric_data("not a number"), None);
}

#[test]
fn reconcile_creates_missing_keys_and_writes_values() {
    let mut store = MemoryStore::new();
    let report = ConfigReconciler::new(&mut store)
        .reconcile(&sample_tree())
        .expect("reconcile should succeed");

    assert_eq!(report.created_keys.len(), 4);
    assert_eq!(report.value_writes(), 3);
    assert!(report.failures.is_empty());
    assert!(store.contains_key(&key(r"HKCU\Software\Classes\roblox\shell\open\command")));

    let command = store
        .list_key(&key(r"HKCU\Software\Classes\roblox\shell\open\command"))
        .expect("list command key");
    assert_eq!(
        command
            .value(&ValueName::Default)
            .expect("default value")
            .data,
        "\"app.exe\" \"%1\""
    );
}

#[test]
fn reconcile_twice_writes_nothing_the_second_time() {
    let mut store = MemoryStore::new();
    let tree = sample_tree();
    ConfigReconciler::new(&mut store)
        .reconcile(&tree)
        .expect("first reconcile");
    store.reset_counters();

    let report = ConfigReconciler::new(&mut store)
        .reconcile(&tree)
        .expect("second reconcile");
    assert!(report.is_noop(), "unexpected changes: {report:?}");
    assert_eq!(report.unchanged_values, 3);
    assert_eq!(store.value_writes(), 0);
    assert_eq!(store.key_creations(), 0);
}

#[test]
fn default_value_round_trips_through_native_form() {
    let mut store = MemoryStore::new();
    let path = key(r"HKCU\Software\Classes\roblox-player");
    store.create_key(&path).expect("create key");
    store
        .put_values(&path, &[ConfigValue::default_value("X")])
        .expect("write default value");

    let stored = to_stored_value(&ConfigValue::default_value("X"));
    assert_eq!(stored.name, "");
    assert_eq!(stored.value_type, "REG_SZ");

    let mut tree = DesiredConfigTree::new();
    tree.insert(
        path.clone(),
        KeyNode::new().value(ConfigValue::named("", "X", ValueType::Sz)),
    );
    store.reset_counters();
    let report = ConfigReconciler::new(&mut store)
        .reconcile(&tree)
        .expect("reconcile");
    assert_eq!(report.value_writes(), 0);
    assert_eq!(report.unchanged_values, 1);
}

#[test]
fn reconcile_only_writes_values_that_differ() {
    let mut store = MemoryStore::new();
    let path = key(r"HKCU\Software\Classes\roblox");
    store.create_key(&path).expect("create key");
    store
        .put_values(
            &path,
            &[
                ConfigValue::default_value("URL:Roblox Protocol"),
                ConfigValue::string("URL Protocol", "stale"),
                ConfigValue::string("Extra", "kept"),
            ],
        )
        .expect("seed values");

    let mut tree = DesiredConfigTree::new();
    tree.insert(
        path.clone(),
        KeyNode::new()
            .value(ConfigValue::default_value("url:roblox protocol"))
            .value(ConfigValue::string("URL Protocol", "")),
    );
    let report = ConfigReconciler::new(&mut store)
        .reconcile(&tree)
        .expect("reconcile");

    assert_eq!(report.written.len(), 1);
    assert_eq!(
        report.written[0].1,
        vec![ConfigValue::string("URL Protocol", "")]
    );
    let state = store.list_key(&path).expect("list key");
    assert_eq!(
        state
            .value(&ValueName::new("Extra"))
            .expect("unmentioned value is never pruned")
            .data,
        "kept"
    );
}

#[test]
fn diff_values_returns_everything_for_a_key_without_values() {
    let state = KeyState {
        path: key(r"HKCU\Software\Classes\roblox"),
        exists: true,
        values: Vec::new(),
    };
    let desired = vec![
        ConfigValue::default_value("a"),
        ConfigValue::string("b", "c"),
    ];
    assert_eq!(diff_values(&state, &desired), desired);
}

#[test]
fn reconcile_continues_past_a_key_that_cannot_be_created() {
    let mut store = FailingStore {
        inner: MemoryStore::new(),
        refuse: key(r"HKCU\Software\Classes\roblox\shell"),
    };
    let mut tree = sample_tree();
    tree.insert(
        key(r"HKCU\Software\Classes\roblox-player"),
        KeyNode::new().value(ConfigValue::default_value("URL:Roblox Protocol")),
    );

    let report = ConfigReconciler::new(&mut store)
        .reconcile(&tree)
        .expect("reconcile should report failures, not abort");

    assert!(report
        .failures
        .iter()
        .any(|failure| failure.operation == "create key"
            && failure.path.is_same(&key(r"HKCU\Software\Classes\roblox\shell"))));
    assert!(store
        .inner
        .contains_key(&key(r"HKCU\Software\Classes\roblox-player")));
    let player = store
        .inner
        .list_key(&key(r"HKCU\Software\Classes\roblox-player"))
        .expect("list player key");
    assert_eq!(player.values.len(), 1);
}

#[test]
fn desired_tree_merges_roots_case_insensitively() {
    let mut tree = DesiredConfigTree::new();
    tree.insert(
        key(r"HKCU\Software\Classes\roblox"),
        KeyNode::new().value(ConfigValue::string("a", "1")),
    );
    tree.insert(
        key(r"hkcu\software\classes\ROBLOX"),
        KeyNode::new().value(ConfigValue::string("a", "2")),
    );

    let values = tree.desired_values().expect("desired values");
    assert_eq!(values.len(), 1);
    assert_eq!(values[0].1, vec![ConfigValue::string("a", "2")]);
}

#[test]
fn file_store_persists_between_opens() {
    let path = test_store_path();
    let key_path = key(r"HKCU\Software\Classes\roblox");
    {
        let mut store = FileStore::open(&path).expect("open empty store");
        ConfigReconciler::new(&mut store)
            .reconcile(&sample_tree())
            .expect("reconcile");
    }

    let mut reopened = FileStore::open(&path).expect("reopen store");
    let state = reopened.list_key(&key_path).expect("list key");
    assert!(state.exists);
    assert_eq!(
        state
            .value(&ValueName::Default)
            .expect("default value")
            .data,
        "URL:Roblox Protocol"
    );
    let report = ConfigReconciler::new(&mut reopened)
        .reconcile(&sample_tree())
        .expect("second reconcile");
    assert!(report.is_noop());

    let _ = fs::remove_dir_all(path.parent().unwrap_or(Path::new(".")));
}

#[test]
fn file_store_rejects_corrupt_json() {
    let path = test_store_path();
    fs::create_dir_all(path.parent().expect("parent")).expect("must create dir");
    fs::write(&path, "not json").expect("must write file");

    let err = FileStore::open(&path).expect_err("corrupt store should fail");
    assert!(
        err.to_string().contains("invalid configuration store"),
        "unexpected error: {err}"
    );

    let _ = fs::remove_dir_all(path.parent().expect("parent"));
}

#[test]
fn put_value_command_addresses_default_value_with_ve() {
    let path = key(r"HKCU\Software\Classes\roblox");
    let default_args = command_args(&build_put_value_command(
        &path,
        &ConfigValue::default_value("URL:Roblox Protocol"),
    ));
    assert_eq!(
        default_args,
        vec![
            "add",
            r"HKCU\Software\Classes\roblox",
            "/ve",
            "/t",
            "REG_SZ",
            "/d",
            "URL:Roblox Protocol",
            "/f"
        ]
    );

    let named_args = command_args(&build_put_value_command(
        &path,
        &ConfigValue::string("URL Protocol", ""),
    ));
    assert_eq!(
        named_args,
        vec![
            "add",
            r"HKCU\Software\Classes\roblox",
            "/v",
            "URL Protocol",
            "/t",
            "REG_SZ",
            "/d",
            "",
            "/f"
        ]
    );

    let delete_args = command_args(&build_delete_value_command(&path, &ValueName::Default));
    assert_eq!(
        delete_args,
        vec!["delete", r"HKCU\Software\Classes\roblox", "/ve", "/f"]
    );
}

#[test]
fn parse_query_output_reads_first_block_only() {
    let output = "\r\nHKEY_CURRENT_USER\\Software\\Classes\\roblox\r\n    (Default)    REG_SZ    URL:Roblox Protocol\r\n    URL Protocol    REG_SZ    \r\n    Count    REG_DWORD    0x1\r\n\r\nHKEY_CURRENT_USER\\Software\\Classes\\roblox\\shell\r\n    Other    REG_SZ    ignored\r\n";
    let values = parse_query_output(output).expect("parse listing");

    assert_eq!(
        values,
        vec![
            ConfigValue::default_value("URL:Roblox Protocol"),
            ConfigValue::string("URL Protocol", ""),
            ConfigValue::named("Count", "1", ValueType::Dword),
        ]
    );
}

#[test]
fn parse_query_output_skips_unset_default_value() {
    let output = "HKEY_CURRENT_USER\\Software\\Classes\\roblox\\shell\n    (Default)    REG_SZ    (value not set)\n";
    let values = parse_query_output(output).expect("parse listing");
    assert!(values.is_empty());
}

#[test]
fn reg_command_store_reports_missing_key_from_stderr() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&calls);
    let store = RegCommandStore::with_executor(Box::new(move |command: &mut Command| {
        recorded
            .lock()
            .expect("calls lock")
            .push(command_args(command));
        Ok(CommandOutput {
            success: false,
            stdout: String::new(),
            stderr: "ERROR: The system was unable to find the specified registry key or value."
                .to_string(),
        })
    }));

    let state = store
        .list_key(&key(r"HKCU\Software\Classes\roblox"))
        .expect("missing key is not an error");
    assert!(!state.exists);
    assert_eq!(
        calls.lock().expect("calls lock")[0],
        vec!["query", r"HKCU\Software\Classes\roblox"]
    );
}

#[test]
fn reg_command_store_reconciles_numeric_values_idempotently() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&calls);
    let mut store = RegCommandStore::with_executor(Box::new(move |command: &mut Command| {
        let args = command_args(command);
        let stdout = if args.first().map(String::as_str) == Some("query") {
            concat!(
                "\r\nHKEY_CURRENT_USER\\Software\\clistrap\r\n",
                "    Enabled    REG_QWORD    0x1\r\n",
                "    Limit    REG_DWORD    0x200\r\n\r\n",
            )
            .to_string()
        } else {
            String::new()
        };
        recorded.lock().expect("calls lock").push(args);
        Ok(CommandOutput {
            success: true,
            stdout,
            stderr: String::new(),
        })
    }));
    let mut tree = DesiredConfigTree::new();
    tree.insert(
        key(r"HKCU\Software\clistrap"),
        KeyNode::new()
            .value(ConfigValue::named("Enabled", "1", ValueType::Qword))
            .value(ConfigValue::named("Limit", "512", ValueType::Dword)),
    );

    for _ in 0..2 {
        let report = ConfigReconciler::new(&mut store)
            .reconcile(&tree)
            .expect("reconcile");
        assert!(report.is_noop(), "unexpected changes: {report:?}");
        assert_eq!(report.unchanged_values, 2);
    }
    let calls = calls.lock().expect("calls lock");
    assert!(calls.iter().all(|args| args[0] == "query"), "unexpected writes: {calls:?}");
}

#[test]
fn reg_command_store_surfaces_write_failures() {
    let mut store = RegCommandStore::with_executor(Box::new(|_command: &mut Command| {
        Ok(CommandOutput {
            success: false,
            stdout: String::new(),
            stderr: "ERROR: Access is denied.".to_string(),
        })
    }));

    let err = store
        .put_values(
            &key(r"HKCU\Software\Classes\roblox"),
            &[ConfigValue::default_value("x")],
        )
        .expect_err("write should fail");
    let message = err.to_string();
    assert!(
        message.contains("failed to write registry value (Default)"),
        "unexpected error: {message}"
    );
    assert!(message.contains("Access is denied"), "unexpected error: {message}");
}

#[test]
fn player_association_tree_covers_protocols_and_environment() {
    let version = VersionHash::parse("version-abc123").expect("valid version hash");
    let version_dir = PathBuf::from(r"C:\clistrap\Versions\version-abc123");
    let executable = version_dir.join("RobloxPlayerBeta.exe");
    let launcher = PathBuf::from(r"C:\clistrap\clistrap.exe");
    let ctx = TemplateContext {
        variant: Variant::Player,
        version: &version,
        version_dir: &version_dir,
        executable: &executable,
        launcher: &launcher,
    };
    let tree = association_tree(&ctx).expect("build tree");
    let paths: Vec<String> = tree
        .key_paths()
        .expect("key paths")
        .iter()
        .map(|path| path.as_str().to_string())
        .collect();

    for expected in [
        r"HKCU\Software\Classes\roblox",
        r"HKCU\Software\Classes\roblox\shell\open\command",
        r"HKCU\Software\Classes\roblox-player\DefaultIcon",
        r"HKCU\Software\ROBLOX Corporation\Environments\roblox-player\Capabilities\UrlAssociations",
    ] {
        assert!(paths.iter().any(|path| path == expected), "missing {expected}");
    }
    assert!(!paths.iter().any(|path| path.contains("Roblox.Place")));

    let values = tree.desired_values().expect("desired values");
    let (_, command_values) = values
        .iter()
        .find(|(path, _)| path.as_str() == r"HKCU\Software\Classes\roblox\shell\open\command")
        .expect("command key values");
    assert_eq!(
        command_values[0],
        ConfigValue::default_value(format!(
            "\"{}\" launch player \"%1\"",
            launcher.display()
        ))
    );
}

#[test]
fn studio_association_tree_includes_place_files() {
    let (version, version_dir, executable, launcher) = studio_context_paths();
    let ctx = TemplateContext {
        variant: Variant::Studio,
        version: &version,
        version_dir: &version_dir,
        executable: &executable,
        launcher: &launcher,
    };
    let paths: Vec<String> = association_tree(&ctx)
        .expect("build tree")
        .key_paths()
        .expect("key paths")
        .iter()
        .map(|path| path.as_str().to_string())
        .collect();

    for expected in [
        r"HKCU\Software\Classes\roblox-studio-auth\shell\open\command",
        r"HKCU\Software\Classes\Roblox.Place\shell\Open\command",
        r"HKCU\Software\Classes\.rbxl\Roblox.Place\ShellNew",
        r"HKCU\Software\Classes\.rbxlx",
    ] {
        assert!(paths.iter().any(|path| path == expected), "missing {expected}");
    }
}

#[test]
fn unregister_removes_owned_keys_and_values_only() {
    let (version, version_dir, executable, launcher) = studio_context_paths();
    let mut store = MemoryStore::new();
    for variant in [Variant::Player, Variant::Studio] {
        let ctx = TemplateContext {
            variant,
            version: &version,
            version_dir: &version_dir,
            executable: &executable,
            launcher: &launcher,
        };
        ConfigReconciler::new(&mut store)
            .reconcile(&association_tree(&ctx).expect("build tree"))
            .expect("reconcile");
    }

    let report = unregister(&mut store, Variant::Studio).expect("unregister studio");
    assert!(report.failures.is_empty());
    assert_eq!(report.deleted_values.len(), 1);
    assert!(!store.contains_key(&key(r"HKCU\Software\Classes\roblox-studio")));
    assert!(!store.contains_key(&key(r"HKCU\Software\Classes\.rbxl")));
    assert!(store.contains_key(&key(r"HKCU\Software\Classes\roblox-player")));

    let environments = store
        .list_key(&key(ENVIRONMENTS_KEY))
        .expect("list environments");
    assert!(environments.value(&ValueName::new("roblox-studio")).is_none());
    assert!(environments.value(&ValueName::new("roblox-player")).is_some());

    let again = unregister(&mut store, Variant::Studio).expect("second unregister");
    assert!(again.deleted_keys.is_empty());
    assert!(again.deleted_values.is_empty());
}

#[test]
fn prune_values_ignores_absent_values() {
    let mut store = MemoryStore::new();
    let path = key(r"HKCU\Software\Classes\roblox");
    store.create_key(&path).expect("create key");
    store
        .put_values(&path, &[ConfigValue::string("stale", "x")])
        .expect("seed value");

    let report = prune_values(
        &mut store,
        &[
            (path.clone(), ValueName::new("stale")),
            (path.clone(), ValueName::new("never-there")),
            (key(r"HKCU\Software\Missing"), ValueName::Default),
        ],
    )
    .expect("prune");
    assert_eq!(report.deleted_values, vec![(path.clone(), ValueName::new("stale"))]);
    assert!(store.list_key(&path).expect("list").values.is_empty());
}

#[test]
fn webview_runtime_is_detected_from_either_client_key() {
    let mut store = MemoryStore::new();
    assert!(!webview_runtime_installed(&store).expect("check runtime"));

    store
        .create_key(&key(WEBVIEW_CLIENT_KEYS[1]))
        .expect("create per-user client key");
    assert!(webview_runtime_installed(&store).expect("check runtime"));
}
