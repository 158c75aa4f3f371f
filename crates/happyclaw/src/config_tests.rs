use super::*;

fn base() -> Config {
    Config {
        data_dir: None,
        allowed_cwds: Vec::new(),
        health_interval_secs: 30,
        drain_timeout_secs: 5,
        event_debounce_ms: 500,
        event_max_batch: 20,
        log_level: "info".to_string(),
        log_format: "json".to_string(),
        mcp_timeout_secs: 30,
        pty_cols: 200,
        pty_rows: 50,
        provider: "pty".to_string(),
        cwd: None,
        resume: None,
        command: vec!["echo".to_string()],
    }
}

#[test]
fn valid_config_passes() {
    assert!(base().validate().is_ok());
}

#[test]
fn rejects_unknown_provider() {
    let mut c = base();
    c.provider = "bogus".to_string();
    assert!(c.validate().is_err());
}

#[test]
fn rejects_resume_with_cwd() {
    let mut c = base();
    c.resume = Some("happyclaw-abc".to_string());
    c.cwd = Some(PathBuf::from("/tmp"));
    assert!(c.validate().is_err());
}

#[test]
fn resume_without_command_is_allowed() {
    let mut c = base();
    c.resume = Some("happyclaw-abc".to_string());
    c.command = Vec::new();
    assert!(c.validate().is_ok());
}

#[test]
fn rejects_no_command_no_resume() {
    let mut c = base();
    c.command = Vec::new();
    assert!(c.validate().is_err());
}

#[test]
fn rejects_bad_log_format() {
    let mut c = base();
    c.log_format = "xml".to_string();
    assert!(c.validate().is_err());
}

#[test]
fn default_data_dir_uses_home() {
    let dir = default_data_dir();
    assert!(dir.ends_with(".happyclaw") || dir == PathBuf::from(".happyclaw"));
}

#[test]
fn resolved_data_dir_honors_override() {
    let mut c = base();
    c.data_dir = Some(PathBuf::from("/custom/dir"));
    assert_eq!(c.resolved_data_dir(), PathBuf::from("/custom/dir"));
}
