use std::fs;
use std::time::Duration;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use np_harvest::config::{ConfigLoader, ConfigOverrides};
use np_harvest::error::HarvestError;

fn write_config(content: &str) -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let path = root.join("np-harvest.json");
    fs::write(path.as_std_path(), content).unwrap();
    (temp, path)
}

#[test]
fn file_values_override_defaults() {
    let (_temp, path) = write_config(
        r#"{
            "schema_version": 1,
            "genera_file": "input/leaves.txt",
            "output_file": "out/nps.csv",
            "log_dir": "run-logs",
            "concurrency": 8,
            "max_attempts": 4,
            "timeout_secs": 30,
            "clean_columns": {"structure": "isomeric_smiles"}
        }"#,
    );

    let resolved = ConfigLoader::resolve(Some(path.as_str())).unwrap();
    assert_eq!(resolved.genera_file, Utf8PathBuf::from("input/leaves.txt"));
    assert_eq!(resolved.output_file, Utf8PathBuf::from("out/nps.csv"));
    assert_eq!(resolved.failure_dir, Utf8PathBuf::from("run-logs"));
    assert_eq!(resolved.concurrency, 8);
    assert_eq!(resolved.max_attempts, 4);
    assert_eq!(resolved.timeout, Duration::from_secs(30));
    assert_eq!(resolved.clean_columns.structure, "isomeric_smiles");
    assert_eq!(resolved.clean_columns.genus, "genus_name");
    assert_eq!(resolved.query_template, Utf8PathBuf::from("queries/nps_in_genera.rq"));
}

#[test]
fn overrides_win_over_file_values() {
    let (_temp, path) = write_config(r#"{"concurrency": 8, "output_file": "out/nps.csv"}"#);

    let resolved = ConfigLoader::resolve(Some(path.as_str()))
        .unwrap()
        .apply(ConfigOverrides {
            concurrency: Some(2),
            output_file: Some(Utf8PathBuf::from("elsewhere.csv")),
            ..ConfigOverrides::default()
        })
        .unwrap();
    assert_eq!(resolved.concurrency, 2);
    assert_eq!(resolved.output_file, Utf8PathBuf::from("elsewhere.csv"));
}

#[test]
fn zero_attempt_override_is_rejected() {
    let (_temp, path) = write_config("{}");
    let err = ConfigLoader::resolve(Some(path.as_str()))
        .unwrap()
        .apply(ConfigOverrides {
            max_attempts: Some(0),
            ..ConfigOverrides::default()
        })
        .unwrap_err();
    assert_matches!(err, HarvestError::InvalidConfig(_));
}

#[test]
fn explicit_missing_config_is_an_error() {
    let err = ConfigLoader::resolve(Some("/nonexistent/np-harvest.json")).unwrap_err();
    assert_matches!(err, HarvestError::ConfigRead(_));
}

#[test]
fn invalid_json_is_a_parse_error() {
    let (_temp, path) = write_config(r#"{"concurrency": "many"}"#);
    let err = ConfigLoader::resolve(Some(path.as_str())).unwrap_err();
    assert_matches!(err, HarvestError::ConfigParse(_));
}
