use std::path::Path;
use std::process::{Command, Output};

use policy_export::checkpoint::NamedTensor;
use policy_export::testing::{mlp_state_dict, CheckpointBuilder, RootLayout};
use tempfile::TempDir;

fn run(bin: &str, args: &[&str], cwd: &Path) -> Output {
    Command::new(bin)
        .args(args)
        .current_dir(cwd)
        .env("RUST_LOG", "warn")
        .output()
        .expect("binary runs")
}

fn export(args: &[&str], cwd: &Path) -> Output {
    run(env!("CARGO_BIN_EXE_policy_export"), args, cwd)
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_missing_checkpoint_exits_nonzero_with_path() {
    let dir = TempDir::new().unwrap();
    let output = export(&["does/not/exist.pt"], dir.path());
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("does/not/exist.pt"), "stderr: {}", stderr(&output));
}

#[test]
fn test_unrecognized_checkpoint_lists_keys() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("odd.pt");
    CheckpointBuilder::new()
        .layout(RootLayout::Nested("network"))
        .tensor("actor.0.weight", vec![2, 3], vec![0.1; 6])
        .iteration(5)
        .write(&path)
        .unwrap();

    let output = export(&["odd.pt"], dir.path());
    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.contains("\"network\""), "stderr: {err}");
    assert!(err.contains("\"iter\""), "stderr: {err}");
}

#[test]
fn test_declared_hidden_dims_mismatch_still_exports() {
    let dir = TempDir::new().unwrap();
    let mut dict = mlp_state_dict("actor.", &[8, 16, 16, 16]);
    dict.insert("std", NamedTensor::new(vec![16], vec![1.0; 16]));
    CheckpointBuilder::new()
        .state_dict(&dict)
        .iteration(1500)
        .write(&dir.path().join("model_1500.pt"))
        .unwrap();

    let output = export(
        &["model_1500.pt", "--hidden-dims", "16", "--seed", "3", "-o", "exported/policy.onnx"],
        dir.path(),
    );
    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("2 unexpected"), "stdout: {out}");
    assert!(out.trim_end().ends_with("MB"), "stdout: {out}");
    assert!(dir.path().join("exported/policy.onnx").exists());
    assert!(dir.path().join("exported/policy.json").exists());
}

#[test]
fn test_hidden_dims_accepts_space_separated_widths() {
    let dir = TempDir::new().unwrap();
    CheckpointBuilder::new()
        .state_dict(&mlp_state_dict("actor.", &[6, 16, 16, 4]))
        .iteration(200)
        .infos("rough terrain")
        .write(&dir.path().join("model_200.pt"))
        .unwrap();

    let output = export(&["model_200.pt", "--hidden-dims", "16", "16", "--seed", "1"], dir.path());
    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("6 -> [16, 16] -> 4"), "stdout: {out}");
    assert!(out.contains("infos:         'rough terrain'"), "stdout: {out}");
    assert!(out.contains("0 unexpected"), "stdout: {out}");
}

#[test]
fn test_pickled_module_checkpoint_fails_with_guidance() {
    let dir = TempDir::new().unwrap();
    CheckpointBuilder::new()
        .layout(RootLayout::Module("__main__", "ActorNetwork"))
        .state_dict(&mlp_state_dict("actor.", &[4, 8, 2]))
        .write(&dir.path().join("model_full.pt"))
        .unwrap();

    let output = export(&["model_full.pt"], dir.path());
    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.contains("pickled module (__main__.ActorNetwork)"), "stderr: {err}");
    assert!(err.contains("torch.jit.script"), "stderr: {err}");
}

#[test]
fn test_default_output_lands_beside_checkpoint() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("run")).unwrap();
    CheckpointBuilder::new()
        .layout(RootLayout::Nested("actor_critic"))
        .state_dict(&mlp_state_dict("actor.", &[4, 8, 2]))
        .write(&dir.path().join("run/model.pt"))
        .unwrap();

    let output = export(&["run/model.pt", "--seed", "1"], dir.path());
    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    assert!(dir.path().join("run/policy.onnx").exists());
}

#[test]
fn test_inspect_lists_tensors() {
    let dir = TempDir::new().unwrap();
    CheckpointBuilder::new()
        .state_dict(&mlp_state_dict("actor.", &[4, 8, 2]))
        .iteration(42)
        .write(&dir.path().join("model.pt"))
        .unwrap();

    let output = run(env!("CARGO_BIN_EXE_inspect"), &["model.pt"], dir.path());
    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("iteration: 42"));
    assert!(out.contains("actor.0.weight"));
    assert!(out.contains("4 -> [8] -> 2"));
}

#[test]
fn test_diagnose_is_deterministic_and_clean() {
    let dir = TempDir::new().unwrap();
    let bin = env!("CARGO_BIN_EXE_diagnose");
    let first = run(bin, &[], dir.path());
    assert_eq!(first.status.code(), Some(0));
    assert!(stdout(&first).contains("all configuration matches"));
    for _ in 0..3 {
        assert_eq!(run(bin, &[], dir.path()).stdout, first.stdout);
    }
}

#[test]
fn test_diagnose_flags_bad_config() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("deploy.toml"),
        "[deploy]
action_scale = [
  0.25, 0.25, 0.25, 0.125, 0.25, 0.25,
  0.125, 0.25, 0.25, 0.125, 0.25, 0.25,
]
",
    )
    .unwrap();
    let output = run(env!("CARGO_BIN_EXE_diagnose"), &["--config", "deploy.toml"], dir.path());
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).contains("action scale of FR_hip_joint: expected 0.125, found 0.25"));
}
