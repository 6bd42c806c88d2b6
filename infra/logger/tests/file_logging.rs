use plm_logger::{LevelFilter, Logger, Rotation};
use std::fs;
use std::time::Duration;
use tempfile::tempdir;

#[test]
fn json_file_logging_writes_structured_lines() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempdir()?;
    let log_dir = tmp.path().join("logs");

    let logger = Logger::builder()
        .name("plm-file-test")
        .console(false)
        .level(LevelFilter::INFO)
        .path(&log_dir)
        .rotation(Rotation::NEVER)
        .json(true)
        .init()?;
    assert!(logger.has_file_output());

    tracing::info!(workspace = "acme", key = "SPEC-001-A", "master checked out");

    std::thread::sleep(Duration::from_millis(50));
    drop(logger);

    let log_file = fs::read_dir(&log_dir)?
        .flatten()
        .map(|entry| entry.path())
        .find(|path| path.extension().and_then(|ext| ext.to_str()) == Some("log"))
        .expect("log file should exist");

    let content = fs::read_to_string(log_file)?;
    let line = content.lines().find(|l| l.contains("master checked out")).expect("event logged");
    assert!(line.trim_start().starts_with('{'), "expected a JSON line: {line}");
    assert!(line.contains("\"workspace\":\"acme\""));
    Ok(())
}
