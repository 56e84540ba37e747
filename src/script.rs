//! Injects and strips the worker-side integration shim in user scripts.
//!
//! Users author plain Locust scripts; the control plane inserts the plugin
//! import before a revision is stored and removes it again before script
//! content is returned, so the shim is never user-visible.

use base64::engine::general_purpose::STANDARD as Base64;
use base64::Engine;

use crate::error::{ControlPlaneError, Result};

/// Token that marks a script as already integrated.
const PLUGIN_MARKER: &str = "locust_harness_plugin";

/// Banner comment that anchors the strip pass.
const INJECTED_MARKER: &str = "Harness Control Plane Plugin - AUTO-INJECTED";

const PLUGIN_SHIM: &str = "
# ============================================================================
# Harness Control Plane Plugin - AUTO-INJECTED
# This code is automatically added by the Harness platform.
# Users should NOT include this in their test files.
# ============================================================================
import sys
import os

# Import the Harness plugin for control plane integration
try:
    import locust_harness_plugin
except ImportError:
    # Plugin will be injected inline if not available as a separate file
    pass

";

/// Insert the integration shim after the leading import block.
///
/// No-op when the script already references the plugin. Scripts with no
/// imports get the shim prepended.
pub fn inject(user_script: &str) -> String {
    if user_script.contains(PLUGIN_MARKER) {
        return user_script.to_string();
    }

    let lines: Vec<&str> = user_script.split('\n').collect();
    let mut injection_point = 0;

    for (i, line) in lines.iter().enumerate() {
        let trimmed = line.trim();
        if trimmed.starts_with("import ") || trimmed.starts_with("from ") {
            injection_point = i + 1;
        }
        // The import block ends at the first non-import, non-comment,
        // non-empty line.
        if injection_point > 0
            && !trimmed.is_empty()
            && !trimmed.starts_with('#')
            && !trimmed.starts_with("import ")
            && !trimmed.starts_with("from ")
        {
            break;
        }
    }

    if injection_point == 0 {
        return format!("{PLUGIN_SHIM}\n{user_script}");
    }

    format!(
        "{}\n{}\n{}",
        lines[..injection_point].join("\n"),
        PLUGIN_SHIM,
        lines[injection_point..].join("\n")
    )
}

/// Remove the injected shim, returning the user's original script.
///
/// The shim is located by the banner marker and consumed line-by-line against
/// a whitelist of known shim lines; the opening banner immediately before the
/// marker is dropped as well. Leading blank lines are trimmed from the result.
pub fn strip(script: &str) -> String {
    let mut cleaned: Vec<&str> = Vec::new();
    let mut in_plugin_section = false;

    for line in script.split('\n') {
        let trimmed = line.trim();

        if trimmed.contains(INJECTED_MARKER) {
            in_plugin_section = true;
            // Drop the banner line and blank padding preceding the marker.
            while let Some(last) = cleaned.last() {
                let t = last.trim();
                if t.is_empty() || t.contains("============") {
                    cleaned.pop();
                } else {
                    break;
                }
            }
            continue;
        }

        if in_plugin_section {
            if is_shim_line(trimmed) {
                continue;
            }
            in_plugin_section = false;
            cleaned.push(line);
            continue;
        }

        if trimmed.contains("import locust_harness_plugin") {
            continue;
        }

        cleaned.push(line);
    }

    while cleaned.first().is_some_and(|l| l.trim().is_empty()) {
        cleaned.remove(0);
    }

    cleaned.join("\n")
}

fn is_shim_line(trimmed: &str) -> bool {
    trimmed.is_empty()
        || trimmed.starts_with('#')
        || trimmed.starts_with("import sys")
        || trimmed.starts_with("import os")
        || trimmed.starts_with("sys.path.insert")
        || trimmed.starts_with("import locust_harness_plugin")
        || trimmed.starts_with("try:")
        || trimmed.starts_with("except ImportError:")
        || trimmed.starts_with("pass")
        || trimmed.contains("============")
}

/// Decode a base64 script, inject the shim, re-encode.
pub fn inject_base64(encoded: &str) -> Result<String> {
    let decoded = decode_script(encoded)?;
    Ok(Base64.encode(inject(&decoded)))
}

/// Decode a base64 script, strip the shim, re-encode.
pub fn strip_base64(encoded: &str) -> Result<String> {
    let decoded = decode_script(encoded)?;
    Ok(Base64.encode(strip(&decoded)))
}

fn decode_script(encoded: &str) -> Result<String> {
    let bytes = Base64
        .decode(encoded.trim())
        .map_err(|e| ControlPlaneError::Validation(format!("failed to decode script: {e}")))?;
    String::from_utf8(bytes)
        .map_err(|e| ControlPlaneError::Validation(format!("script is not valid UTF-8: {e}")))
}
