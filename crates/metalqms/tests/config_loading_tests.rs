//! Table-driven tests for configuration loading and validation.

use metalqms::config::load_config_from_str;
use metalqms::pipeline::PipelineConfig;

struct ConfigTestCase {
    name: &'static str,
    config_json: &'static str,
    should_succeed: bool,
    /// Substring of the error message when loading fails.
    expected_error: Option<&'static str>,
}

const CONFIG_TESTS: &[ConfigTestCase] = &[
    ConfigTestCase {
        name: "minimal",
        config_json: r#"{ "version": "1.0", "storage_directory": "/srv/qms" }"#,
        should_succeed: true,
        expected_error: None,
    },
    ConfigTestCase {
        name: "quiet_pipeline_with_notifications",
        config_json: r#"{
            "version": "1.0",
            "storage_directory": "/srv/qms",
            "worker_count": 2,
            "stale_processing_minutes": 10,
            "preview": { "required": true, "dpi": 100 },
            "search": { "max_results": 20, "min_query_chars": 2 },
            "notifications": {
                "enabled": true,
                "api_base_url": "http://127.0.0.1:8081",
                "rate_limit_per_second": 5,
                "admin_user_ids": [1]
            }
        }"#,
        should_succeed: true,
        expected_error: None,
    },
    ConfigTestCase {
        name: "unsupported_version",
        config_json: r#"{ "version": "0.9", "storage_directory": "/srv/qms" }"#,
        should_succeed: false,
        expected_error: Some("Unsupported config version"),
    },
    ConfigTestCase {
        name: "missing_storage_directory",
        config_json: r#"{ "version": "1.0" }"#,
        should_succeed: false,
        expected_error: Some("storage_directory"),
    },
    ConfigTestCase {
        name: "suggestions_exceed_total",
        config_json: r#"{
            "version": "1.0",
            "storage_directory": "/srv/qms",
            "search": { "suggestions_per_field": 30, "max_suggestions": 20 }
        }"#,
        should_succeed: false,
        expected_error: Some("suggestions_per_field"),
    },
    ConfigTestCase {
        name: "non_http_bot_api",
        config_json: r#"{
            "version": "1.0",
            "storage_directory": "/srv/qms",
            "notifications": { "enabled": true, "api_base_url": "ftp://telegram" }
        }"#,
        should_succeed: false,
        expected_error: Some("api_base_url"),
    },
    ConfigTestCase {
        name: "not_json",
        config_json: "version = 1.0",
        should_succeed: false,
        expected_error: None,
    },
];

#[test]
fn test_config_loading_table() {
    for case in CONFIG_TESTS {
        let result = load_config_from_str(case.config_json);
        match (case.should_succeed, result) {
            (true, Ok(_)) => {}
            (true, Err(e)) => panic!("[{}] expected success, got: {}", case.name, e),
            (false, Ok(_)) => panic!("[{}] expected failure, config loaded", case.name),
            (false, Err(e)) => {
                if let Some(expected) = case.expected_error {
                    assert!(
                        e.to_string().contains(expected),
                        "[{}] error '{}' does not mention '{}'",
                        case.name,
                        e,
                        expected
                    );
                }
            }
        }
    }
}

#[test]
fn test_loaded_config_drives_the_pipeline() {
    let config = load_config_from_str(
        r#"{
            "version": "1.0",
            "storage_directory": "/srv/qms",
            "stale_processing_minutes": 10,
            "extraction": { "timeout_secs": 30 },
            "retry": { "extraction": { "max_attempts": 5, "base_delay_secs": 2, "max_delay_secs": 20 } }
        }"#,
    )
    .unwrap();

    let pipeline = PipelineConfig::from_config(&config);
    assert_eq!(pipeline.stale_after.as_secs(), 600);
    assert_eq!(pipeline.extraction_timeout.as_secs(), 30);
    assert_eq!(pipeline.extraction_retry.max_attempts, 5);
    assert_eq!(pipeline.extraction_retry.delay_for(3).as_secs(), 8);
    assert_eq!(pipeline.preview_directory, std::path::PathBuf::from("/srv/qms/previews"));
}
