//! Design file on disk → compiled plan → dry run.

use std::fs;

use planner::{PlanError, PlannerConfig, Stage, TransferPlanner};
use tokio_util::sync::CancellationToken;
use transfect_runner::{
    load_design, AutoAcknowledge, DesignTableError, LoggingActuator, PlanExecutor, RunnerConfig,
};

const SINGLE_RACK: &str = "\
DNA source,DNA destination,Plate destination,Transfection type,Contents,Concentration (ng/uL),DNA wanted (ng)
A1,B1,A1,Single,mNG,124.2,500
A2,B2,A2,Single,mKO2,179.9,500
A1,B3,A3,Co,mNG,124.2,250
A2,B3,A3,Co,mKO2,179.9,250
";

/// Test: single-rack file compiles without a second reagent pause and simulates
#[tokio::test]
async fn test_single_rack_file_simulates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("design.csv");
    fs::write(&path, SINGLE_RACK).unwrap();

    let config = PlannerConfig::single_rack();
    let rows = load_design(&path, &config).unwrap();
    assert_eq!(rows[2].mix_destination, rows[3].mix_destination);

    let plan = TransferPlanner::new(config).unwrap().compile(&rows).unwrap();
    assert_eq!(plan.checkpoints().count(), 2);
    assert!(plan.operations_in(Stage::Delivery).count() >= 3);

    let mut actuator = LoggingActuator::default();
    let report = PlanExecutor::new()
        .run(
            &plan,
            &mut actuator,
            &mut AutoAcknowledge,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(actuator.transfers, plan.operations().count());
    assert_eq!(report.operations_executed, actuator.transfers);
    assert_eq!(report.checkpoints.len(), 2);
}

/// Test: config file overrides reach the compiled plan
#[test]
fn test_config_file_changes_incubation_text() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("bench.toml");
    fs::write(&config_path, "[protocol]\nincubation_minutes = 20\n").unwrap();
    let design_path = dir.path().join("design.csv");
    fs::write(&design_path, SINGLE_RACK).unwrap();

    let config = RunnerConfig::load(Some(&config_path)).unwrap();
    let rows = load_design(&design_path, &config.protocol).unwrap();
    let plan = TransferPlanner::new(config.protocol)
        .unwrap()
        .compile(&rows)
        .unwrap();

    let (_, last) = plan.checkpoints().last().unwrap();
    assert!(last.contains("for 20 mins"));
}

/// Test: missing design file is an I/O error with a recovery hint
#[test]
fn test_missing_design_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_design(&dir.path().join("absent.csv"), &PlannerConfig::default())
        .unwrap_err();
    assert!(matches!(err, DesignTableError::Io { .. }));
    assert!(err.with_suggestion().contains("Recovery"));
}

/// Test: sub-microlitre DNA volumes are caught before any plan exists
#[test]
fn test_check_rejects_dilute_volume_in_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tiny.csv");
    fs::write(
        &path,
        "\
DNA source,DNA destination,Plate destination,Transfection type,Contents,Concentration (ng/uL),DNA wanted (ng)
A1,B1,A1,Single,concentrated,2000,500
",
    )
    .unwrap();

    let config = PlannerConfig::default();
    let rows = load_design(&path, &config).unwrap();
    let err = TransferPlanner::new(config)
        .unwrap()
        .preflight(&rows)
        .unwrap_err();
    assert!(matches!(err, PlanError::VolumeTooLow { .. }));
}
