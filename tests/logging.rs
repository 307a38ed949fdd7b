// tests/logging.rs

use tracing_subscriber::filter::LevelFilter;

use podflow::cli::LogLevel;
use podflow::logging::build_filter;

#[test]
fn cli_level_wins_over_environment() {
    let filter = build_filter(Some(LogLevel::Debug), Some("error"));
    assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));
}

#[test]
fn environment_directives_are_used_without_cli_level() {
    let filter = build_filter(None, Some("warn"));
    assert_eq!(filter.max_level_hint(), Some(LevelFilter::WARN));

    let filter = build_filter(None, Some("info,podflow::run=trace"));
    assert_eq!(filter.max_level_hint(), Some(LevelFilter::TRACE));
}

#[test]
fn missing_or_blank_environment_defaults_to_info() {
    assert_eq!(build_filter(None, None).max_level_hint(), Some(LevelFilter::INFO));
    assert_eq!(
        build_filter(None, Some("   ")).max_level_hint(),
        Some(LevelFilter::INFO)
    );
}
