//! Logging setup using `log` + `log4rs`.
//!
//! Filtering is whitelist-based: external crates default to OFF, the pop
//! crates run at the requested level, and individual modules can be opted in
//! with `<module>=<level>` entries.

use log::LevelFilter;
use log4rs::{
    append::{
        console::{ConsoleAppender, Target},
        file::FileAppender,
    },
    config::{Appender, Logger, Root},
    encode::pattern::PatternEncoder,
    Config,
};
use std::path::PathBuf;

const CONSOLE_APPENDER: &str = "stderr";
const FILE_APPENDER: &str = "log_file";
const LOG_FILE_NAME: &str = "pop.log";
const LOG_LINE_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {m}{n}";

const WHITELISTED_CRATES: &[&str] = &["pop_core", "pop_service"];

/// Initialize the global logger. Repeated calls are ignored, which keeps the
/// function safe to use from parallel test binaries.
///
/// `filters` examples: `"info"`, `"debug,pop_service=trace"`.
pub fn init_logger(log_dir: Option<&str>, filters: &str) {
    let app_level = parse_app_level(filters);
    let module_levels = parse_module_levels(filters);

    let console = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(LOG_LINE_PATTERN)))
        .build();
    let mut config_builder = Config::builder().appender(Appender::builder().build(CONSOLE_APPENDER, Box::new(console)));
    let mut root_appenders = vec![CONSOLE_APPENDER];

    if let Some(dir) = log_dir.filter(|s| !s.trim().is_empty()) {
        let log_path = PathBuf::from(dir.trim()).join(LOG_FILE_NAME);
        if let Ok(file_appender) = FileAppender::builder().encoder(Box::new(PatternEncoder::new(LOG_LINE_PATTERN))).build(log_path) {
            config_builder = config_builder.appender(Appender::builder().build(FILE_APPENDER, Box::new(file_appender)));
            root_appenders.push(FILE_APPENDER);
        }
    }

    let appender_names: Vec<String> = root_appenders.iter().map(|name| (*name).to_string()).collect();

    for crate_name in WHITELISTED_CRATES {
        if !module_levels.iter().any(|(module, _)| module == crate_name) {
            config_builder = config_builder.logger(
                Logger::builder()
                    .appenders(appender_names.clone())
                    .additive(false)
                    .build(*crate_name, app_level),
            );
        }
    }
    for (module, level) in &module_levels {
        config_builder = config_builder.logger(
            Logger::builder()
                .appenders(appender_names.clone())
                .additive(false)
                .build(module, *level),
        );
    }

    if let Ok(config) = config_builder.build(Root::builder().appenders(root_appenders).build(LevelFilter::Off)) {
        let _ = log4rs::init_config(config);
    }
}

fn parse_app_level(filters: &str) -> LevelFilter {
    filters
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty() && !part.contains('='))
        .find_map(|part| part.parse().ok())
        .unwrap_or(LevelFilter::Info)
}

fn parse_module_levels(filters: &str) -> Vec<(String, LevelFilter)> {
    filters
        .split(',')
        .filter_map(|part| {
            let (module, level) = part.split_once('=')?;
            let module = module.trim();
            let level = level.trim().parse().ok()?;
            if module.is_empty() {
                return None;
            }
            Some((module.to_string(), level))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_level_defaults_to_info() {
        assert_eq!(parse_app_level(""), LevelFilter::Info);
        assert_eq!(parse_app_level("pop_core=debug"), LevelFilter::Info);
        assert_eq!(parse_app_level("warn"), LevelFilter::Warn);
        assert_eq!(parse_app_level("debug,pop_core=trace"), LevelFilter::Debug);
    }

    #[test]
    fn module_levels_are_parsed_in_order() {
        let levels = parse_module_levels("info,pop_core=debug,pop_service=trace");
        assert_eq!(levels, vec![("pop_core".to_string(), LevelFilter::Debug), ("pop_service".to_string(), LevelFilter::Trace)]);
    }
}
