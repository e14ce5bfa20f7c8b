//! Pure path and header rewriting. Framework-agnostic: headers
//! are represented as an ordered `Vec<(String, String)>` so this module has
//! no dependency on any particular HTTP server or client crate.

use crate::models::config::{HeaderRewriting, HostnameHandling, PathRewriting};

/// Rewrites `path` per `rule`: strips `strip_base_path` when it is a prefix
/// of `path`, then prepends `base_path_rewrite`. Both steps are no-ops when
/// their field is unset.
pub fn rewrite_path(rule: &PathRewriting, path: &str) -> String {
    let mut rewritten = path.to_string();

    if let Some(strip) = &rule.strip_base_path {
        if !strip.is_empty() {
            if let Some(remainder) = rewritten.strip_prefix(strip.as_str()) {
                rewritten = remainder.to_string();
                if !rewritten.starts_with('/') && !rewritten.is_empty() {
                    rewritten = format!("/{rewritten}");
                }
            }
        }
    }

    if let Some(prefix) = &rule.base_path_rewrite {
        if !prefix.is_empty() {
            rewritten = format!("{}{}", prefix.trim_end_matches('/'), rewritten);
        }
    }

    if rewritten.is_empty() {
        rewritten.push('/');
    }

    rewritten
}

/// Rewrites a header list per `rule`: `set_headers` entries are applied
/// first (inserted or overwritten), then `remove_headers` names are deleted.
/// A header named in both is therefore absent from the result.
/// Comparisons for both hostname handling and removal are case-insensitive.
pub fn rewrite_headers(
    rule: &HeaderRewriting,
    headers: &mut Vec<(String, String)>,
    original_host: &str,
    backend_host: &str,
) {
    for (name, value) in &rule.set_headers {
        upsert_header(headers, name, value);
    }

    for name in &rule.remove_headers {
        headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
    }

    let host_value = match rule.hostname_handling {
        HostnameHandling::PreserveOriginal => original_host.to_string(),
        HostnameHandling::UseBackend => backend_host.to_string(),
        HostnameHandling::UseCustom => match &rule.custom_hostname {
            Some(custom) if !custom.is_empty() => custom.clone(),
            _ => original_host.to_string(),
        },
    };
    upsert_header(headers, "Host", &host_value);
}

fn upsert_header(headers: &mut Vec<(String, String)>, name: &str, value: &str) {
    if let Some(entry) = headers.iter_mut().find(|(existing, _)| existing.eq_ignore_ascii_case(name)) {
        entry.1 = value.to_string();
    } else {
        headers.push((name.to_string(), value.to_string()));
    }
}
