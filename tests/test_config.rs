use shelfscan::config::{Config, GroupingMode};

fn write_config(dir: &tempfile::TempDir, text: &str) -> anyhow::Result<std::path::PathBuf> {
    let path = dir.path().join("shelfscan.toml");
    std::fs::write(&path, text)?;
    Ok(path)
}

#[test]
fn test_partial_file_keeps_other_defaults() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let path = write_config(&dir, "[grouping]\neps = 0.7\n")?;

    let config = Config::load(&path)?;
    let defaults = Config::default();

    assert_eq!(config.grouping.eps, 0.7);
    assert_eq!(config.grouping.min_samples, defaults.grouping.min_samples);
    assert_eq!(config.grouping.mode, GroupingMode::Full);
    assert_eq!(
        config.detection.primary_confidence,
        defaults.detection.primary_confidence
    );
    assert_eq!(config.fallback.templates.len(), 3);
    assert_eq!(config.services.detect_url, defaults.services.detect_url);
    assert_eq!(config.output.results_dir, defaults.output.results_dir);
    Ok(())
}

#[test]
fn test_nested_sections_and_fast_mode() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let path = write_config(
        &dir,
        r#"
[grouping]
mode = "fast"
max_color_groups = 3

[services]
group_url = "http://grouping:5002"

[services.timeouts.group]
connect_secs = 1.0
total_secs = 2.5
"#,
    )?;

    let config = Config::load(&path)?;

    assert_eq!(config.grouping.mode, GroupingMode::Fast);
    assert_eq!(config.grouping.max_color_groups, 3);
    assert_eq!(config.services.group_url, "http://grouping:5002");
    assert_eq!(config.services.timeouts.group.total_secs, 2.5);
    assert_eq!(config.services.timeouts.detect.total_secs, 60.0);
    Ok(())
}

#[test]
fn test_bad_files_are_reported() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;

    let missing = Config::load(&dir.path().join("absent.toml")).unwrap_err();
    assert!(missing.to_string().starts_with("failed to read config"));

    let path = write_config(&dir, "[grouping]\nmode = \"sideways\"\n")?;
    let invalid = Config::load(&path).unwrap_err();
    assert!(invalid.to_string().starts_with("invalid config"));
    Ok(())
}
