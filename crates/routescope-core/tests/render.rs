//! Assembling a configuration directory and routing against the result

use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use routescope::assemble::Assembler;
use routescope::config::RenderConfig;
use routescope::models::{parse_alert, Document};
use routescope::routing::{evaluate, RouteTree};
use routescope::Finding;

fn write(dir: &TempDir, name: &str, contents: &str) {
    let path = dir.path().join(name);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

fn team_directory() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    write(
        &dir,
        "base.yaml",
        r#"
global:
  resolve_timeout: 5m
route:
  receiver: fallback
  group_by: [alertname]
  routes:
    - receiver: watchdog
      match: {alertname: Watchdog}
receivers:
  - name: fallback
  - name: watchdog
"#,
    );
    write(
        &dir,
        "teams/payments.yaml",
        r#"
receivers:
  - name: payments-pager
    webhook_configs:
      - url: $payments_hook
routes:
  receiver: payments-pager
  matchers: ['team="payments"', 'severity=~"critical|page"']
"#,
    );
    write(
        &dir,
        "teams/search.yml",
        r#"
receivers:
  - name: search
routes:
  - receiver: search
    match: {team: search}
    mute_time_intervals: [weekends]
time_intervals:
  - name: weekends
    time_intervals:
      - weekdays: [saturday, sunday]
"#,
    );
    dir
}

#[test]
fn test_assembled_configuration_routes_alerts() {
    let dir = team_directory();
    std::env::set_var("PAYMENTS_HOOK", "http://hooks.internal/payments");

    let output = Assembler::default().render(dir.path()).unwrap();
    assert_eq!(output, dir.path().join("alertmanager.yaml"));

    let document = Document::from_path(&output).unwrap();
    assert!(document.extra.contains_key("global"));
    let tree = RouteTree::build(&document).unwrap();
    assert_eq!(tree.len(), 4);

    let saturday = Utc.with_ymd_and_hms(2024, 3, 9, 10, 0, 0).unwrap();
    let payments = parse_alert(r#"{"team": "payments", "severity": "page"}"#).unwrap();
    assert_eq!(
        evaluate(&tree, &payments, saturday).receivers(),
        vec!["payments-pager"]
    );

    let search = evaluate(&tree, &parse_alert(r#"{"team": "search"}"#).unwrap(), saturday);
    assert_eq!(search.receivers(), vec!["search"]);
    assert!(search.notified_receivers().is_empty());

    let yaml = std::fs::read_to_string(&output).unwrap();
    assert!(yaml.contains("http://hooks.internal/payments"));
}

#[test]
fn test_render_reports_all_problems_and_writes_nothing() {
    let dir = team_directory();
    write(
        &dir,
        "teams/zz-broken.yaml",
        r#"
receivers:
  - name: search
routes:
  - receiver: storage
    group_wait: whenever
"#,
    );

    let assembler = Assembler::from_settings(&RenderConfig {
        base_file: "base.yaml".to_string(),
        output_file: "merged.yaml".to_string(),
    });
    let assembly = assembler
        .assemble_with(dir.path(), |name| {
            (name == "PAYMENTS_HOOK").then(|| "http://hooks.internal/payments".to_string())
        })
        .unwrap();

    let kinds: Vec<&str> = assembly.findings.iter().map(Finding::kind).collect();
    assert_eq!(
        kinds,
        vec!["duplicate_receiver", "invalid_duration", "config_reference"]
    );

    assert!(assembler.render(dir.path()).is_err());
    assert!(!dir.path().join("merged.yaml").exists());
}
