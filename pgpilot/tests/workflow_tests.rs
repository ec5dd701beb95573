use pgpilot::config::RunnerConfig;
use pgpilot::{AnsibleRunner, FailurePolicy, PilotConfig, Stage, Workflow, WorkflowStatus};
use pgpilot_devkit::{AnsibleOutputBuilder, LogCapture, TestHarness};

const FULL_RUN: [&str; 4] = [
    "load_check.yml",
    "install_postgres.yml",
    "config_postgres.yml",
    "check_postgres.yml",
];

fn load_report(debian: &[f64], almalinux: &[f64]) -> String {
    AnsibleOutputBuilder::new("Check load")
        .host_loads("Debian", debian)
        .host_loads("Almalinux", almalinux)
        .build()
}

#[tokio::test]
async fn debian_with_lower_load_becomes_storage_host() {
    let harness = TestHarness::new().unwrap();
    harness
        .runner
        .succeed_with("load_check.yml", load_report(&[0.10, 0.20], &[0.50, 0.60]));

    let report = harness.run("1.2.3.4", "5.6.7.8").await.unwrap();

    assert_eq!(report.status, WorkflowStatus::Done);
    harness.assert_played(&FULL_RUN).unwrap();

    let selection = report.selection.as_ref().unwrap();
    assert_eq!(selection.chosen.name, "Debian");
    assert_eq!(selection.other.name, "Almalinux");
    assert!((selection.comparison.first_score - 0.11).abs() < 1e-9);
    assert!((selection.comparison.second_score - 0.43).abs() < 1e-9);

    let sections = harness.read_config_inventory().unwrap();
    assert_eq!(sections.len(), 2);
    assert_eq!(sections[0].name, "postgres_servers");
    assert_eq!(sections[0].hosts[0].name, "Debian");
    assert_eq!(sections[0].hosts[0].address, "1.2.3.4");
    assert_eq!(sections[1].name, "app_servers");
    assert_eq!(sections[1].hosts[0].name, "Almalinux");
    assert_eq!(sections[1].hosts[0].address, "5.6.7.8");
}

#[tokio::test]
async fn each_stage_sees_its_own_inventory() {
    let harness = TestHarness::new().unwrap();
    harness
        .runner
        .succeed_with("load_check.yml", load_report(&[3.0, 2.5], &[0.2, 0.1]));

    harness.run("db1.local:2222", "db2.local:2200").await.unwrap();

    let load_check = harness.runner.find_invocation("load_check.yml").unwrap();
    let listed = pgpilot_devkit::read_flat_inventory(&load_check.inventory_content.unwrap()).unwrap();
    let names: Vec<&str> = listed.iter().map(|h| h.name.as_str()).collect();
    assert_eq!(names, vec!["Debian", "Almalinux"]);
    assert_eq!(listed[0].port.as_deref(), Some("2222"));
    assert_eq!(listed[0].user, "root");

    let install = harness.runner.find_invocation("install_postgres.yml").unwrap();
    let chosen = pgpilot_devkit::read_flat_inventory(&install.inventory_content.unwrap()).unwrap();
    assert_eq!(chosen.len(), 1);
    assert_eq!(chosen[0].name, "Almalinux");
    assert_eq!(chosen[0].address, "db2.local");
    assert_eq!(chosen[0].port.as_deref(), Some("2200"));

    let verify = harness.runner.find_invocation("check_postgres.yml").unwrap();
    assert_eq!(verify.inventory, harness.config().inventories.chosen);

    let configure = harness.runner.find_invocation("config_postgres.yml").unwrap();
    assert_eq!(configure.inventory, harness.config().inventories.config);
    assert!(configure
        .inventory_content
        .unwrap()
        .starts_with("[postgres_servers]\nAlmalinux ansible_host=db2.local ansible_user=root ansible_port=2200\n"));
}

#[tokio::test]
async fn load_check_failure_stops_before_selection() {
    let harness = TestHarness::new().unwrap();
    harness
        .runner
        .fail_with("load_check.yml", 4, "fatal: [Debian]: UNREACHABLE!");

    let capture = LogCapture::new();
    let report = {
        let _guard = capture.install();
        harness.run("1.2.3.4", "5.6.7.8").await.unwrap()
    };

    assert_eq!(report.status, WorkflowStatus::Aborted { stage: Stage::LoadCheck });
    assert!(report.selection.is_none());
    harness.assert_played(&["load_check.yml"]).unwrap();
    assert!(!harness.config().inventories.chosen.exists());
    assert!(!harness.config().inventories.config.exists());

    let errors = capture.lines_at("ERROR");
    assert_eq!(errors.len(), 1, "{:?}", errors);
    assert!(errors[0].contains("UNREACHABLE"));

    let warnings = capture.lines_at("WARN");
    assert_eq!(warnings.len(), 1, "{:?}", warnings);
    assert!(warnings[0].contains("aborting"));
}

#[cfg(unix)]
#[tokio::test]
async fn failing_runner_process_logs_one_error() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = PilotConfig::default().with_inventory_dir(dir.path());
    let runner = AnsibleRunner::from_config(&RunnerConfig {
        program: "sh".to_string(),
        extra_args: vec![
            "-c".to_string(),
            "echo 'fatal: [Debian]: UNREACHABLE!' >&2; exit 4".to_string(),
            "fake-ansible".to_string(),
        ],
    });
    let workflow = Workflow::new(config, runner).quiet();

    let capture = LogCapture::new();
    let report = {
        let _guard = capture.install();
        workflow.run("1.2.3.4", "5.6.7.8").await.unwrap()
    };

    assert_eq!(report.status, WorkflowStatus::Aborted { stage: Stage::LoadCheck });
    let errors = capture.lines_at("ERROR");
    assert_eq!(errors.len(), 1, "{:?}", errors);
    assert!(errors[0].contains("load_check.yml"));
}

#[tokio::test]
async fn equal_scores_pick_the_second_host() {
    let harness = TestHarness::new().unwrap();
    harness
        .runner
        .succeed_with("load_check.yml", load_report(&[0.40, 0.40], &[0.40, 0.40]));

    let report = harness.run("1.2.3.4", "5.6.7.8").await.unwrap();

    assert_eq!(report.selection.unwrap().chosen.name, "Almalinux");
    assert_eq!(harness.read_chosen_inventory().unwrap()[0].name, "Almalinux");
}

#[tokio::test]
async fn silent_host_is_picked_over_loaded_one() {
    // a host missing from the report scores 0.0 and wins
    let harness = TestHarness::new().unwrap();
    harness.runner.succeed_with(
        "load_check.yml",
        AnsibleOutputBuilder::new("Check load")
            .host_loads("Debian", &[0.05, 0.05])
            .unreachable_host("Almalinux", "Connection timed out")
            .build(),
    );

    let report = harness.run("1.2.3.4", "5.6.7.8").await.unwrap();

    let selection = report.selection.unwrap();
    assert_eq!(selection.chosen.name, "Almalinux");
    assert!(selection.chosen_load.is_empty());
    assert_eq!(selection.comparison.second_score, 0.0);
}

#[tokio::test]
async fn fail_fast_stops_at_configure() {
    let harness = TestHarness::new().unwrap();
    harness
        .runner
        .succeed_with("load_check.yml", load_report(&[0.10, 0.20], &[0.50, 0.60]))
        .fail_with("config_postgres.yml", 2, "role not found");

    let report = harness.run("1.2.3.4", "5.6.7.8").await.unwrap();

    assert_eq!(report.status, WorkflowStatus::Aborted { stage: Stage::Configure });
    harness
        .assert_played(&["load_check.yml", "install_postgres.yml", "config_postgres.yml"])
        .unwrap();
    let configure = report.stage(Stage::Configure).unwrap();
    assert_eq!(configure.result.error.as_deref(), Some("role not found"));
}

#[tokio::test]
async fn fail_fast_abort_is_a_warning_after_the_runner_error() {
    let harness = TestHarness::new().unwrap();
    harness
        .runner
        .succeed_with("load_check.yml", load_report(&[0.10, 0.20], &[0.50, 0.60]))
        .fail_with("install_postgres.yml", 2, "apt lock held");

    let capture = LogCapture::new();
    let report = {
        let _guard = capture.install();
        harness.run("1.2.3.4", "5.6.7.8").await.unwrap()
    };

    assert_eq!(report.status, WorkflowStatus::Aborted { stage: Stage::Install });
    let errors = capture.lines_at("ERROR");
    assert_eq!(errors.len(), 1, "{:?}", errors);
    assert!(errors[0].contains("apt lock held"));
    assert!(capture.lines_at("WARN").iter().any(|l| l.contains("fail_fast")));
}

#[tokio::test]
async fn best_effort_finishes_despite_failures() {
    let harness = TestHarness::new().unwrap().with_policy(FailurePolicy::BestEffort);
    harness
        .runner
        .succeed_with("load_check.yml", load_report(&[0.10, 0.20], &[0.50, 0.60]))
        .fail_with("install_postgres.yml", 2, "apt lock held")
        .fail_with("check_postgres.yml", 1, "psql: connection refused");

    let report = harness.run("1.2.3.4", "5.6.7.8").await.unwrap();

    assert!(report.is_done());
    harness.assert_played(&FULL_RUN).unwrap();
    assert_eq!(report.failed_stages(), vec![Stage::Install, Stage::Verify]);
    assert!(report.verify_output().is_none());
}

#[tokio::test]
async fn verify_output_is_reported() {
    let harness = TestHarness::new().unwrap();
    harness
        .runner
        .succeed_with("load_check.yml", load_report(&[0.10, 0.20], &[0.50, 0.60]))
        .succeed_with("check_postgres.yml", "PostgreSQL 15.4 accepting connections\n");

    let report = harness.run("1.2.3.4", "5.6.7.8").await.unwrap();

    assert_eq!(
        report.verify_output(),
        Some("PostgreSQL 15.4 accepting connections\n")
    );
}

#[tokio::test]
async fn custom_names_and_weights_are_honoured() {
    let harness = TestHarness::new().unwrap().with_config(|config| {
        config.candidates.first = "primary".into();
        config.candidates.second = "replica".into();
        config.groups.storage = "db".into();
        config.groups.app = "web".into();
        config.default_user = "deploy".into();
        config.load_weights = [0.0, 1.0];
    });
    harness.runner.succeed_with(
        "load_check.yml",
        AnsibleOutputBuilder::new("Check load")
            .host_loads("primary", &[9.0, 0.1])
            .host_loads("replica", &[0.1, 0.5])
            .build(),
    );

    let report = harness.run("10.0.0.1", "10.0.0.2").await.unwrap();

    assert_eq!(report.selection.unwrap().chosen.name, "primary");
    let sections = harness.read_config_inventory().unwrap();
    assert_eq!(sections[0].name, "db");
    assert_eq!(sections[0].hosts[0].user, "deploy");
    assert_eq!(sections[1].name, "web");
    assert_eq!(sections[1].hosts[0].name, "replica");
}
