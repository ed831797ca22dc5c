//! Device and application context collector
//!
//! Gathers non-identifying system information attached to every report.
//! Never includes hostname or username.

use serde::{Deserialize, Serialize};

/// Name reported as the capturing SDK
pub const SDK_NAME: &str = "crashgate.rust";

/// Non-identifying device and application information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceContext {
    pub os: String,
    pub kernel: String,
    pub arch: String,
    pub app_name: String,
    pub app_version: String,
    pub sdk_name: String,
    pub sdk_version: String,
}

impl DeviceContext {
    /// Collect device information for the given application.
    pub fn collect(app_name: &str, app_version: &str) -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            kernel: read_kernel_version(),
            arch: std::env::consts::ARCH.to_string(),
            app_name: app_name.to_string(),
            app_version: app_version.to_string(),
            sdk_name: SDK_NAME.to_string(),
            sdk_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

fn read_kernel_version() -> String {
    std::fs::read_to_string("/proc/version")
        .ok()
        .and_then(|v| v.split_whitespace().nth(2).map(String::from))
        .unwrap_or_default()
}
