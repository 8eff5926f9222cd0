//! `host:port` splitting
//!
//! Accepts `host:port` and `[ipv6]:port`. Anything else (no port, an empty
//! host, unbracketed IPv6, stray brackets) yields `None` so callers fail closed.

/// Split a destination into its host and port parts.
///
/// # Examples
/// ```
/// use egress_policy::split_host_port;
///
/// assert_eq!(split_host_port("example.com:443"), Some(("example.com", "443")));
/// assert_eq!(split_host_port("[::1]:8080"), Some(("::1", "8080")));
/// assert_eq!(split_host_port("example.com"), None);
/// ```
pub fn split_host_port(destination: &str) -> Option<(&str, &str)> {
    let (host, port) = if let Some(rest) = destination.strip_prefix('[') {
        let (host, after) = rest.split_once(']')?;
        let port = after.strip_prefix(':')?;
        (host, port)
    } else {
        let (host, port) = destination.rsplit_once(':')?;
        // Unbracketed IPv6 literal, e.g. "::1:443"
        if host.contains(':') {
            return None;
        }
        (host, port)
    };

    if host.is_empty() || port.is_empty() {
        return None;
    }
    if host.contains(['[', ']']) || port.contains(['[', ']', ':']) {
        return None;
    }

    Some((host, port))
}
