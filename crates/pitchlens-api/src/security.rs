//! Security utilities for input validation.
//!
//! This module provides:
//! - Object key validation (path traversal protection)
//! - Preset URL validation (SSRF protection for the server-side fetch)

use std::net::IpAddr;

use url::{Host, Url};

/// Maximum object key length.
const MAX_KEY_LENGTH: usize = 1024;

/// Maximum URL length.
const MAX_URL_LENGTH: usize = 2048;

/// Validate a storage object key supplied by a client.
///
/// Keys are used verbatim against the bucket, so they must not traverse
/// paths or smuggle control characters.
pub fn validate_object_key(key: &str) -> Result<(), String> {
    if key.is_empty() {
        return Err("Filename is required".to_string());
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(format!(
            "Filename exceeds maximum length of {} characters",
            MAX_KEY_LENGTH
        ));
    }
    if key.starts_with('/') || key.contains("..") || key.contains('\\') {
        return Err("Filename must be a plain object key".to_string());
    }
    if key.chars().any(|c| c.is_control()) {
        return Err("Filename contains invalid characters".to_string());
    }
    Ok(())
}

/// Validate a preset clip URL before the server fetches it.
///
/// The fetch runs server-side, so loopback, private and link-local targets
/// are refused unless `allow_private_hosts` is set (local development
/// against a bucket emulator or fixture server).
pub fn validate_preset_url(raw: &str, allow_private_hosts: bool) -> Result<String, String> {
    if raw.len() > MAX_URL_LENGTH {
        return Err(format!(
            "URL exceeds maximum length of {} characters",
            MAX_URL_LENGTH
        ));
    }

    let url = Url::parse(raw).map_err(|e| format!("Invalid URL: {}", e))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err("URL must use http or https".to_string());
    }

    if allow_private_hosts {
        return if url.host().is_some() {
            Ok(url.to_string())
        } else {
            Err("URL has no host".to_string())
        };
    }

    match url.host() {
        None => Err("URL has no host".to_string()),
        Some(Host::Domain(domain)) => {
            let lowered = domain.to_lowercase();
            if lowered == "localhost"
                || lowered.ends_with(".localhost")
                || lowered.ends_with(".internal")
                || lowered.starts_with("metadata.")
            {
                return Err(format!("Host '{}' is not allowed", domain));
            }
            Ok(url.to_string())
        }
        Some(Host::Ipv4(addr)) => check_ip(IpAddr::V4(addr)).map(|_| url.to_string()),
        Some(Host::Ipv6(addr)) => check_ip(IpAddr::V6(addr)).map(|_| url.to_string()),
    }
}

fn check_ip(addr: IpAddr) -> Result<(), String> {
    let blocked = match addr {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                // Unique-local fc00::/7 and link-local fe80::/10
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                || (v6.segments()[0] & 0xffc0) == 0xfe80
        }
    };

    if blocked {
        Err(format!("IP address '{}' is not allowed", addr))
    } else {
        Ok(())
    }
}
