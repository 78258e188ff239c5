use super::*;
use pretty_assertions::assert_eq;
use std::io::Write;

#[test]
fn test_defaults() {
    let config = Config::default();

    assert_eq!(config.output.format, OutputFormat::Json);
    assert_eq!(config.output.top_nodes, 10);
    assert!(!config.output.pretty);
    assert!(!config.logging.json_file);
    assert!(config.logging.filter.contains("pgexplain_analyzer=info"));
}

#[test]
fn test_partial_file_keeps_defaults() {
    let config = Config::from_toml(
        r#"
        [output]
        format = "table"
        top_nodes = 5
        "#,
    )
    .unwrap();

    assert_eq!(config.output.format, OutputFormat::Table);
    assert_eq!(config.output.top_nodes, 5);
    assert!(!config.output.pretty);
    assert_eq!(config.logging, LoggingSection::default());
}

#[test]
fn test_unknown_format_is_rejected() {
    assert!(Config::from_toml("[output]\nformat = \"yaml\"\n").is_err());
}

#[test]
fn test_load_explicit_path() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "[logging]\nfilter = \"debug\"\njson_file = true\nlog_dir = \"/tmp/pgexplain-logs\""
    )
    .unwrap();

    let config = Config::load(Some(file.path())).unwrap();
    assert_eq!(config.logging.filter, "debug");
    assert!(config.logging.json_file);
    assert_eq!(
        config.logging.log_dir,
        Some(PathBuf::from("/tmp/pgexplain-logs"))
    );
}

#[test]
fn test_load_missing_explicit_path_fails() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.toml");

    let err = Config::load(Some(&missing)).unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}

#[test]
fn test_config_file_location() {
    if let Ok(path) = config_file() {
        assert!(path.ends_with("pgexplain/config.toml"));
    }
}
