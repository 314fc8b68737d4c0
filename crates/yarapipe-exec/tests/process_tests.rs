#![cfg(unix)]

use std::collections::BTreeMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;
use yarapipe_exec::{
    DEFAULT_NAMESPACE, Executable, OutputError, TimedOut, YaraExecutable, YaracExecutable,
};
use yarapipe_syntax::{CompileDiagnostic, MetaValue, Rule, Severity};

// Writing a script while another test forks can leave it "text file busy".
static SPAWN_LOCK: Mutex<()> = Mutex::new(());

fn fake_tool(dir: &Path, name: &str, body: &str) -> Executable {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();
    Executable::at(&path).unwrap()
}

fn rule_file(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("rules.yar");
    fs::write(&path, "rule HelloWorld { condition: true }").unwrap();
    path
}

#[test]
fn test_scan_streams_rules() {
    let _guard = SPAWN_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let dir = TempDir::new().unwrap();
    let yara = fake_tool(
        dir.path(),
        "yara",
        r#"cat <<'OUT'
HelloWorld [greeting] [author="me",score=5,active=true] /tmp/sample
0xf:$a: Hello World
0x59:$a: Hello World
Other [] [] /tmp/sample
OUT"#,
    );

    let scanner = YaraExecutable::new(yara).add_rule(rule_file(dir.path())).unwrap();
    let mut rules = Vec::new();
    let summary = scanner
        .scan_file(&rule_file(dir.path()), &BTreeMap::new(), |r: Rule| rules.push(r))
        .unwrap();

    assert_eq!(summary.rules, 2);
    assert_eq!(summary.skipped_entries, 0);
    assert!(summary.warnings.is_empty());

    assert_eq!(rules[0].identifier, "HelloWorld");
    assert_eq!(rules[0].tags, vec!["greeting"]);
    assert_eq!(rules[0].meta("score").unwrap().value, MetaValue::Integer(5));
    assert_eq!(rules[0].strings[0].matches[1].offset, 0x59);
    assert_eq!(rules[1].identifier, "Other");
}

#[test]
fn test_scan_bytes() {
    let _guard = SPAWN_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let dir = TempDir::new().unwrap();
    // Echo the last argument, the temporary target, back as the match value.
    let yara = fake_tool(
        dir.path(),
        "yara",
        r#"for last; do :; done
echo "Found [] [] $last"
echo "0x0:\$a: $(cat "$last")""#,
    );

    let scanner = YaraExecutable::new(yara).add_rule(rule_file(dir.path())).unwrap();
    let mut rules = Vec::new();
    scanner
        .scan_bytes(b"payload", &BTreeMap::new(), |r: Rule| rules.push(r))
        .unwrap();

    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].strings[0].matches[0].value, "payload");
}

#[test]
fn test_protocol_violation_reports_line() {
    let _guard = SPAWN_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let dir = TempDir::new().unwrap();
    let yara = fake_tool(
        dir.path(),
        "yara",
        r#"echo 'Good [] [] x'
echo 'Bad [unterminated'"#,
    );

    let scanner = YaraExecutable::new(yara).add_rule(rule_file(dir.path())).unwrap();
    let mut rules = Vec::new();
    let err = scanner
        .scan_file(&rule_file(dir.path()), &BTreeMap::new(), |r: Rule| rules.push(r))
        .unwrap_err();

    let output = err.downcast_ref::<OutputError>().unwrap();
    assert_eq!(output.line_number, 2);
    assert_eq!(output.line, "Bad [unterminated");
    // The rule completed by the second header is still delivered.
    assert_eq!(rules.len(), 1);
}

#[test]
fn test_failed_scan_carries_stderr() {
    let _guard = SPAWN_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let dir = TempDir::new().unwrap();
    let yara = fake_tool(dir.path(), "yara", "echo 'error: could not open file' >&2\nexit 1");

    let scanner = YaraExecutable::new(yara).add_rule(rule_file(dir.path())).unwrap();
    let err = scanner
        .scan_file(&rule_file(dir.path()), &BTreeMap::new(), |_: Rule| {})
        .unwrap_err();

    assert!(err.to_string().contains("could not open file"));
}

#[test]
fn test_stderr_on_success_becomes_warnings() {
    let _guard = SPAWN_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let dir = TempDir::new().unwrap();
    let yara = fake_tool(dir.path(), "yara", "echo 'warning: slow rule' >&2");

    let scanner = YaraExecutable::new(yara).add_rule(rule_file(dir.path())).unwrap();
    let summary = scanner
        .scan_file(&rule_file(dir.path()), &BTreeMap::new(), |_: Rule| {})
        .unwrap();

    assert_eq!(summary.rules, 0);
    assert_eq!(summary.warnings, vec!["warning: slow rule"]);
}

#[test]
fn test_scan_timeout_kills_process() {
    let _guard = SPAWN_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let dir = TempDir::new().unwrap();
    let yara = fake_tool(dir.path(), "yara", "exec sleep 5");

    let scanner = YaraExecutable::new(yara)
        .add_rule(rule_file(dir.path()))
        .unwrap()
        .with_timeout(Duration::from_millis(200));
    let err = scanner
        .scan_file(&rule_file(dir.path()), &BTreeMap::new(), |_: Rule| {})
        .unwrap_err();

    assert!(err.downcast_ref::<TimedOut>().is_some());
}

#[test]
fn test_compile_reports_diagnostics() {
    let _guard = SPAWN_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let dir = TempDir::new().unwrap();
    let yarac = fake_tool(
        dir.path(),
        "yarac",
        r#"echo 'rules.yar(3): warning: string "$a" slows down scanning' >&2"#,
    );

    let compiler = YaracExecutable::new(yarac)
        .add_rule(DEFAULT_NAMESPACE, rule_file(dir.path()))
        .unwrap();
    let mut diagnostics = Vec::new();
    let compiled = compiler
        .compile(|d: CompileDiagnostic| diagnostics.push(d))
        .unwrap();

    assert_eq!(compiled.warnings(), 1);
    assert!(compiled.path().exists());
    assert_eq!(diagnostics[0].line, Some(3));
    assert_eq!(diagnostics[0].severity, Severity::Warning);

    let kept = compiled.persist(dir.path().join("kept.yaracc")).unwrap();
    assert!(kept.exists());
}

#[test]
fn test_compile_failure_counts_errors() {
    let _guard = SPAWN_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let dir = TempDir::new().unwrap();
    let yarac = fake_tool(
        dir.path(),
        "yarac",
        r#"echo 'foo.yara(13): error: syntax error, unexpected identifier' >&2
echo 'foo.yara(20): error: undefined string "$b"' >&2
exit 1"#,
    );

    let compiler = YaracExecutable::new(yarac)
        .add_rule("ns", rule_file(dir.path()))
        .unwrap();
    let mut diagnostics = Vec::new();
    let err = compiler
        .compile(|d: CompileDiagnostic| diagnostics.push(d))
        .unwrap_err();

    assert!(err.to_string().contains("2 error(s)"));
    assert_eq!(diagnostics.len(), 2);
    assert_eq!(diagnostics[0].file_name.as_deref(), Some("foo.yara"));
    assert_eq!(diagnostics[0].message, "syntax error, unexpected identifier");
}

#[test]
fn test_compiled_rules_are_removed_on_drop() {
    let _guard = SPAWN_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let dir = TempDir::new().unwrap();
    let yarac = fake_tool(dir.path(), "yarac", "true");

    let compiler = YaracExecutable::new(yarac)
        .add_rules_content(DEFAULT_NAMESPACE, "rule a { condition: true }")
        .unwrap();
    let compiled = compiler.compile(|_: CompileDiagnostic| {}).unwrap();
    let path = compiled.path().to_path_buf();

    assert!(path.exists());
    drop(compiled);
    assert!(!path.exists());
}
