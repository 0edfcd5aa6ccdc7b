//! Environment variable utilities
//!
//! Every runtime knob of the server can be overridden from the
//! environment with an `HTTPD_` prefixed variable. These helpers parse
//! the value into the target type and fall back to the compiled-in
//! default when the variable is unset or unparsable.
//!
//! # Usage
//!
//! ```ignore
//! use httpd_core::env::{env_get, env_get_str};
//!
//! let port: u16 = env_get("HTTPD_PORT", 8080);
//! let filter = env_get_str("HTTPD_LOG", "info");
//! ```

use std::str::FromStr;

/// Get environment variable parsed as type T, or return default
///
/// Works with any type that implements `FromStr`: integers, `IpAddr`,
/// `PathBuf`, `String`.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Get environment variable as string, or return default
///
/// Convenience wrapper that doesn't require `FromStr`. An empty value
/// counts as unset.
#[inline]
pub fn env_get_str(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(v) if !v.is_empty() => v,
        _ => default.to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use std::path::PathBuf;

    #[test]
    fn test_env_get_default() {
        let val: usize = env_get("__HTTPD_TEST_UNSET_1__", 42);
        assert_eq!(val, 42);
    }

    #[test]
    fn test_env_get_port() {
        std::env::set_var("__HTTPD_TEST_PORT__", " 9090 ");
        let val: u16 = env_get("__HTTPD_TEST_PORT__", 0);
        assert_eq!(val, 9090);
        std::env::remove_var("__HTTPD_TEST_PORT__");
    }

    #[test]
    fn test_env_get_out_of_range_falls_back() {
        std::env::set_var("__HTTPD_TEST_BIGPORT__", "70000");
        let val: u16 = env_get("__HTTPD_TEST_BIGPORT__", 8080);
        assert_eq!(val, 8080);
        std::env::remove_var("__HTTPD_TEST_BIGPORT__");
    }

    #[test]
    fn test_env_get_ip_and_path() {
        std::env::set_var("__HTTPD_TEST_HOST__", "127.0.0.1");
        std::env::set_var("__HTTPD_TEST_ROOT__", "/srv/www");
        let host: IpAddr = env_get("__HTTPD_TEST_HOST__", IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        let root: PathBuf = env_get("__HTTPD_TEST_ROOT__", PathBuf::from("."));
        assert_eq!(host, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(root, PathBuf::from("/srv/www"));
        std::env::remove_var("__HTTPD_TEST_HOST__");
        std::env::remove_var("__HTTPD_TEST_ROOT__");
    }

    #[test]
    fn test_env_get_invalid_parse() {
        std::env::set_var("__HTTPD_TEST_INVALID__", "eight");
        let val: usize = env_get("__HTTPD_TEST_INVALID__", 8);
        assert_eq!(val, 8);
        std::env::remove_var("__HTTPD_TEST_INVALID__");
    }

    #[test]
    fn test_env_get_str() {
        assert_eq!(env_get_str("__HTTPD_TEST_UNSET_2__", "info"), "info");

        std::env::set_var("__HTTPD_TEST_FILTER__", "");
        assert_eq!(env_get_str("__HTTPD_TEST_FILTER__", "info"), "info");

        std::env::set_var("__HTTPD_TEST_FILTER__", "httpd_runtime=debug");
        assert_eq!(env_get_str("__HTTPD_TEST_FILTER__", "info"), "httpd_runtime=debug");
        std::env::remove_var("__HTTPD_TEST_FILTER__");
    }
}
