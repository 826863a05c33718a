//! Telemetry configuration from environment variables.

use std::env;

/// Configuration for structured logging.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to every log line
    pub service_name: String,

    /// Component tag (selector, miner, service)
    pub component: String,

    /// Log level filter (trace, debug, info, warn, error)
    pub log_level: String,

    /// Whether to enable console output
    pub console_output: bool,

    /// Whether to emit JSON formatted logs
    pub json_logs: bool,

    /// Include thread ids in log lines (useful with parallel mining workers)
    pub thread_ids: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "block-assembly".to_string(),
            component: "core".to_string(),
            log_level: "info".to_string(),
            console_output: true,
            json_logs: false,
            thread_ids: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `ASSEMBLY_SERVICE_NAME`: Service name (default: block-assembly)
    /// - `ASSEMBLY_LOG_LEVEL` or `RUST_LOG`: Log level (default: info)
    /// - `ASSEMBLY_CONSOLE_OUTPUT`: Enable console output (default: true)
    /// - `ASSEMBLY_JSON_LOGS`: JSON logs (default: false, true in containers)
    /// - `ASSEMBLY_THREAD_IDS`: Include thread ids (default: false)
    pub fn from_env() -> Self {
        let is_container =
            env::var("KUBERNETES_SERVICE_HOST").is_ok() || env::var("DOCKER_CONTAINER").is_ok();

        Self {
            service_name: env::var("ASSEMBLY_SERVICE_NAME")
                .unwrap_or_else(|_| "block-assembly".to_string()),

            component: "core".to_string(),

            log_level: env::var("ASSEMBLY_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),

            console_output: env::var("ASSEMBLY_CONSOLE_OUTPUT")
                .map(|v| parse_flag(&v, true))
                .unwrap_or(true),

            json_logs: env::var("ASSEMBLY_JSON_LOGS")
                .map(|v| parse_flag(&v, false))
                .unwrap_or(is_container),

            thread_ids: env::var("ASSEMBLY_THREAD_IDS")
                .map(|v| parse_flag(&v, false))
                .unwrap_or(false),
        }
    }

    /// Create configuration for a named component.
    pub fn for_component(component: &str) -> Self {
        let mut config = Self::from_env();
        config.component = component.to_string();
        config
    }

    /// Service name including the component tag.
    pub fn full_service_name(&self) -> String {
        if self.component == "core" {
            self.service_name.clone()
        } else {
            format!("{}-{}", self.service_name, self.component)
        }
    }
}

fn parse_flag(value: &str, default: bool) -> bool {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}
