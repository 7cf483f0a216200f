use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use tempfile::TempDir;

fn loctree_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("loctree"));
    cmd.current_dir(dir);
    cmd
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn fixture() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("Guns");
    write(
        &root,
        "Languages/English/Keyed/UI.xml",
        "<LanguageData>\n  <Hello>Hello</Hello>\n  <Shots>{0} shots</Shots>\n</LanguageData>\n",
    );
    write(
        &root,
        "Defs/Weapons.xml",
        "<Defs>\n  <ThingDef>\n    <defName>Gun</defName>\n    <label>rifle</label>\n  </ThingDef>\n</Defs>\n",
    );
    dir
}

fn stdout_json(output: &std::process::Output) -> serde_json::Value {
    assert!(
        output.status.success(),
        "CLI failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn test_scan_json() {
    let dir = fixture();
    let output = loctree_cmd(dir.path())
        .args(["scan", "-r", "Guns", "--format", "json"])
        .output()
        .unwrap();
    let v = stdout_json(&output);
    assert_eq!(v["command"], "scan");
    assert_eq!(v["counts"]["total"], 3);
    assert_eq!(v["counts"]["def_injected"], 1);
    assert_eq!(v["units"][0]["key"], "ThingDef/Gun.label");
}

#[test]
fn test_scan_csv() {
    let dir = fixture();
    let output = loctree_cmd(dir.path())
        .args(["scan", "-r", "Guns", "--csv"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut lines = stdout.lines();
    assert_eq!(lines.next(), Some("key,kind,source_text,path,line"));
    assert!(stdout.contains("Hello,keyed,Hello,Languages/English/Keyed/UI.xml,2"));
}

#[test]
fn test_export_and_import() {
    let dir = fixture();
    let output = loctree_cmd(dir.path())
        .args(["export", "-r", "Guns", "-o", "ru.po", "--target-lang", "ru"])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "export failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let po = fs::read_to_string(dir.path().join("ru.po")).unwrap();
    assert!(po.contains("msgctxt \"Hello\""));

    let translated = po.replacen("msgid \"Hello\"\nmsgstr \"\"", "msgid \"Hello\"\nmsgstr \"Привет\"", 1);
    fs::write(dir.path().join("ru.po"), translated).unwrap();

    let dry = loctree_cmd(dir.path())
        .args(["import", "-r", "Guns", "-c", "ru.po", "-l", "Russian", "--dry-run", "--format", "json"])
        .output()
        .unwrap();
    let plan = stdout_json(&dry);
    assert_eq!(plan["command"], "import_dry");
    assert_eq!(plan["files"][0]["path"], "Languages/Russian/Keyed/UI.xml");
    assert_eq!(plan["files"][0]["action"], "create");
    assert!(!dir.path().join("Guns/Languages/Russian").exists());

    let applied = loctree_cmd(dir.path())
        .args(["import", "-r", "Guns", "-c", "ru.po", "-l", "Russian", "--incremental"])
        .output()
        .unwrap();
    assert!(applied.status.success());
    let written = fs::read_to_string(dir.path().join("Guns/Languages/Russian/Keyed/UI.xml")).unwrap();
    assert!(written.contains("<Hello>Привет</Hello>"));
}

#[test]
fn test_validate_fail_on_issues() {
    let dir = fixture();
    write(
        &dir.path().join("Guns"),
        "Languages/English/Keyed/Extra.xml",
        "<LanguageData>\n  <Blank></Blank>\n</LanguageData>\n",
    );
    let output = loctree_cmd(dir.path())
        .args(["validate", "-r", "Guns"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("1 warning(s)"));

    let output = loctree_cmd(dir.path())
        .args(["validate", "-r", "Guns", "--fail-on-issues"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_health_reports_tag_mismatch() {
    let dir = fixture();
    write(
        &dir.path().join("Guns"),
        "Languages/Russian/Keyed/UI.xml",
        "<LanguageData>\n  <Hello>Привет</Hallo>\n</LanguageData>\n",
    );
    let output = loctree_cmd(dir.path())
        .args(["health", "-r", "Guns", "-l", "ru", "--format", "json", "--fail-on-issues"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let v: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(v["checked"], 1);
    assert_eq!(v["issues"][0]["category"], "tag-mismatch");
}

#[test]
fn test_exec_from_stdin() {
    let dir = fixture();
    let mut child = loctree_cmd(dir.path())
        .args(["exec", "-"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(br#"{"command": "scan", "root": "Guns"}"#)
        .unwrap();
    let output = child.wait_with_output().unwrap();
    let v = stdout_json(&output);
    assert_eq!(v["command"], "scan");
    assert_eq!(v["counts"]["keyed"], 2);
}

#[test]
fn test_exec_rejects_unknown_fields() {
    let dir = fixture();
    fs::write(
        dir.path().join("request.json"),
        r#"{"command": "scan", "root": "Guns", "recursive": true}"#,
    )
    .unwrap();
    let output = loctree_cmd(dir.path())
        .args(["exec", "request.json"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Invalid request"));
}

#[test]
fn test_build_uses_config_metadata() {
    let dir = fixture();
    let missing = loctree_cmd(dir.path())
        .args(["build", "--from-root", "Guns", "-o", "pkg", "-l", "English"])
        .output()
        .unwrap();
    assert_eq!(missing.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&missing.stderr).contains("--name"));

    fs::write(
        dir.path().join("loctree.toml"),
        "[build]\nname = \"Guns (EN)\"\npackage_id = \"me.guns.en\"\nsupported_version = \"1.5\"\n",
    )
    .unwrap();
    let output = loctree_cmd(dir.path())
        .args(["build", "--from-root", "Guns", "-o", "pkg", "-l", "English"])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "build failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let about = fs::read_to_string(dir.path().join("pkg/About/About.xml")).unwrap();
    assert!(about.contains("<packageId>me.guns.en</packageId>"));
    assert!(dir.path().join("pkg/Languages/English/Keyed/UI.xml").is_file());
}

#[test]
fn test_scan_reports_resolver_defaults() {
    let dir = fixture();
    let output = loctree_cmd(dir.path())
        .args(["scan", "-r", "Guns", "--format", "json"])
        .output()
        .unwrap();
    let v = stdout_json(&output);
    assert_eq!(v["resolver"]["inheritance"], "synthesize");

    let output = loctree_cmd(dir.path())
        .args(["scan", "-r", "Guns"])
        .output()
        .unwrap();
    assert!(String::from_utf8_lossy(&output.stdout).contains("Resolver: inherit=synthesize"));
}

#[test]
fn test_export_pot_template() {
    let dir = fixture();
    fs::write(
        dir.path().join("en.pot"),
        "msgctxt \"Gone\"\nmsgid \"gone\"\nmsgstr \"ушло\"\n",
    )
    .unwrap();
    let output = loctree_cmd(dir.path())
        .args(["export", "-r", "Guns", "-o", "en.pot", "--pot", "--format", "json"])
        .output()
        .unwrap();
    let v = stdout_json(&output);
    assert_eq!(v["template"], true);
    assert_eq!(v["stats"]["total"], 3);
    assert_eq!(v["stats"]["obsolete"], 0);
    let pot = fs::read_to_string(dir.path().join("en.pot")).unwrap();
    assert!(pot.contains("msgctxt \"Hello\""));
    assert!(!pot.contains("Gone"));
    assert!(!pot.contains("Language: ru"));

    let conflict = loctree_cmd(dir.path())
        .args(["export", "-r", "Guns", "-o", "en.pot", "--pot", "--target-lang", "ru"])
        .output()
        .unwrap();
    assert!(!conflict.status.success());
}

#[test]
fn test_validate_po_fail_on_issues() {
    let dir = fixture();
    let export = loctree_cmd(dir.path())
        .args(["export", "-r", "Guns", "-o", "ru.po", "--target-lang", "ru"])
        .output()
        .unwrap();
    assert!(export.status.success());
    let po = fs::read_to_string(dir.path().join("ru.po")).unwrap();
    let broken = po.replacen(
        "msgid \"{0} shots\"\nmsgstr \"\"",
        "msgid \"{0} shots\"\nmsgstr \"выстрелы\"",
        1,
    );
    assert_ne!(po, broken);
    fs::write(dir.path().join("ru.po"), broken).unwrap();

    let output = loctree_cmd(dir.path())
        .args(["validate-po", "-c", "ru.po", "--fail-on-issues", "--format", "json"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let v: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(v["command"], "validate_catalog");
    assert_eq!(v["errors"], 1);
    assert_eq!(v["diagnostics"][0]["key"], "Shots");
}

#[test]
fn test_init_then_annotate() {
    let dir = fixture();
    let dry = loctree_cmd(dir.path())
        .args(["init", "-r", "Guns", "-l", "ru", "--dry-run", "--format", "json"])
        .output()
        .unwrap();
    let plan = stdout_json(&dry);
    assert_eq!(plan["command"], "init_dry");
    assert!(!dir.path().join("Guns/Languages/Russian").exists());

    let init = loctree_cmd(dir.path())
        .args(["init", "-r", "Guns", "-l", "ru"])
        .output()
        .unwrap();
    assert!(init.status.success(), "{}", String::from_utf8_lossy(&init.stderr));
    let keyed = dir.path().join("Guns/Languages/Russian/Keyed/UI.xml");
    let scaffold = fs::read_to_string(&keyed).unwrap();
    assert!(scaffold.contains("<Hello>"));
    assert!(scaffold.contains("<Shots>"));
    assert!(
        dir.path()
            .join("Guns/Languages/Russian/DefInjected/ThingDef/Weapons.xml")
            .is_file()
    );

    let annotate = loctree_cmd(dir.path())
        .args(["annotate", "-r", "Guns", "-l", "ru"])
        .output()
        .unwrap();
    assert!(annotate.status.success(), "{}", String::from_utf8_lossy(&annotate.stderr));
    let annotated = fs::read_to_string(&keyed).unwrap();
    assert!(annotated.contains("<!-- EN: Hello -->"));
    assert!(annotated.contains("<!-- EN: {0} shots -->"));

    let strip = loctree_cmd(dir.path())
        .args(["annotate", "-r", "Guns", "-l", "ru", "--strip"])
        .output()
        .unwrap();
    assert!(strip.status.success());
    assert_eq!(fs::read_to_string(&keyed).unwrap(), scaffold);
}

#[test]
fn test_completions() {
    let dir = TempDir::new().unwrap();
    let output = loctree_cmd(dir.path())
        .args(["completions", "bash"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("loctree"));
}
