// Author: Eshan Roy
// SPDX-License-Identifier: MIT

//! Default configuration values.

use super::schema::HostConfig;

/// Get the default configuration.
pub fn default_config() -> HostConfig {
    HostConfig::default()
}

/// Generate an example configuration file.
pub fn example_config() -> &'static str {
    r#"# modhost Configuration File

[host]
# Root directory scanned recursively for modules (created if absent)
directory = "modules"
# Module file extension; defaults to the platform's (dll, so, dylib)
# extension = "so"
# Initializer and shutdown timeouts in milliseconds (0 disables)
init_timeout_ms = 30000
shutdown_timeout_ms = 10000
# Number of module files loaded at once
max_concurrent_loads = 1
# "replace" shuts down the earlier module, "reject" keeps it
on_name_collision = "replace"

[isolation]
# Dependency identifiers left to the host's default resolution
shared = []
"#
}
