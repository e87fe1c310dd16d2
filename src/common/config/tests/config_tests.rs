//! Unit tests for common-config crate

use common_config::{
    AggregationConfig, DEFAULT_EXPECTED_GROUPS, DEFAULT_PAGE_MAX_BYTES, DEFAULT_PAGE_MAX_ROWS,
    ExecutionConfig, PageConfig, QuarryConfig,
};

#[test]
fn test_quarry_config_default() {
    let config = QuarryConfig::default();

    assert_eq!(config.execution.memory_limit, None);
    assert_eq!(config.execution.page.max_rows, DEFAULT_PAGE_MAX_ROWS);
    assert_eq!(config.execution.page.max_bytes, DEFAULT_PAGE_MAX_BYTES);
    assert_eq!(config.execution.aggregation.max_memory_bytes, None);
    assert_eq!(
        config.execution.aggregation.expected_groups,
        DEFAULT_EXPECTED_GROUPS
    );
}

#[test]
fn test_quarry_config_serialization() {
    let mut config = QuarryConfig::default();
    config.execution.memory_limit = Some(1024 * 1024 * 1024); // 1GB
    config.execution.page.max_rows = 1024;
    config.execution.aggregation.max_memory_bytes = Some(64 * 1024);

    let json = serde_json::to_string(&config).unwrap();
    let deserialized: QuarryConfig = serde_json::from_str(&json).unwrap();

    assert_eq!(deserialized, config);
}

#[test]
fn test_json_helpers_roundtrip() {
    let mut config = QuarryConfig::default();
    config.execution.page = PageConfig {
        max_rows: 7,
        max_bytes: 512,
    };

    let json = config.to_json().unwrap();
    assert!(json.contains("\"max_rows\": 7"));

    let parsed = QuarryConfig::from_json(&json).unwrap();
    assert_eq!(parsed.execution.page.max_rows, 7);
    assert_eq!(parsed.execution.page.max_bytes, 512);
}

#[test]
fn test_config_partial_json() {
    // Only override one nested field; everything else takes defaults.
    let config =
        QuarryConfig::from_json(r#"{"execution": {"aggregation": {"max_memory_bytes": 4096}}}"#)
            .unwrap();

    assert_eq!(config.execution.aggregation.max_memory_bytes, Some(4096));
    assert_eq!(
        config.execution.aggregation.expected_groups,
        DEFAULT_EXPECTED_GROUPS
    );
    assert_eq!(config.execution.page, PageConfig::default());
    assert_eq!(config.execution.memory_limit, None);
}

#[test]
fn test_config_empty_json() {
    let config = QuarryConfig::from_json("{}").unwrap();
    assert_eq!(config, QuarryConfig::default());
}

#[test]
fn test_config_invalid_json() {
    let err = QuarryConfig::from_json("{not json").unwrap_err();
    assert!(err.to_string().starts_with("SerdeJsonError"));
}

#[test]
fn test_execution_config_debug_format() {
    let config = ExecutionConfig {
        memory_limit: Some(4096),
        page: PageConfig::default(),
        aggregation: AggregationConfig::default(),
    };
    let debug_str = format!("{config:?}");
    assert!(debug_str.contains("4096"));
    assert!(debug_str.contains("PageConfig"));
    assert!(debug_str.contains("AggregationConfig"));
}
