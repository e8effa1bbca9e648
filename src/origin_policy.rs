use std::net::IpAddr;
use url::Url;

/// What the window does with a top-level navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationDecision {
    StayInWindow,
    OpenExternally,
    Deny,
}

fn same_origin(left: &Url, right: &Url) -> bool {
    left.scheme() == right.scheme()
        && left.host_str() == right.host_str()
        && left.port_or_known_default() == right.port_or_known_default()
}

fn is_loopback_host(host: Option<&str>) -> bool {
    match host {
        Some("localhost") => true,
        Some(raw) => raw
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<IpAddr>()
            .is_ok_and(|ip| ip.is_loopback()),
        None => false,
    }
}

fn is_web_url(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

/// True when `target` is served by the backend, including the
/// `localhost` / `127.0.0.1` aliases of the same port.
pub fn is_backend_origin(backend_url: &Url, target: &Url) -> bool {
    if same_origin(backend_url, target) {
        return true;
    }
    if !is_web_url(backend_url) || !is_web_url(target) {
        return false;
    }

    let loopback_http =
        is_loopback_host(backend_url.host_str()) && is_loopback_host(target.host_str());
    loopback_http && backend_url.port_or_known_default() == target.port_or_known_default()
}

pub fn navigation_decision(backend_url: &Url, target: &Url) -> NavigationDecision {
    if is_backend_origin(backend_url, target) {
        NavigationDecision::StayInWindow
    } else if is_web_url(target) {
        NavigationDecision::OpenExternally
    } else {
        NavigationDecision::Deny
    }
}

/// URLs the page may hand to the platform browser.
pub fn parse_external_url(raw: &str) -> Option<Url> {
    Url::parse(raw.trim()).ok().filter(is_web_url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(raw: &str) -> Url {
        Url::parse(raw).expect("parse test url")
    }

    #[test]
    fn backend_pages_stay_in_window() {
        let backend = url("http://localhost:5000/");
        assert_eq!(
            navigation_decision(&backend, &url("http://localhost:5000/chat?id=3")),
            NavigationDecision::StayInWindow
        );
        assert_eq!(
            navigation_decision(&backend, &url("http://127.0.0.1:5000/documents")),
            NavigationDecision::StayInWindow
        );
        assert_eq!(
            navigation_decision(&backend, &url("http://[::1]:5000/")),
            NavigationDecision::StayInWindow
        );
    }

    #[test]
    fn other_web_origins_open_externally() {
        let backend = url("http://localhost:5000/");
        assert_eq!(
            navigation_decision(&backend, &url("https://docs.python.org/3/")),
            NavigationDecision::OpenExternally
        );
        assert_eq!(
            navigation_decision(&backend, &url("http://localhost:3000/")),
            NavigationDecision::OpenExternally
        );
    }

    #[test]
    fn non_web_schemes_are_denied() {
        let backend = url("http://localhost:5000/");
        for raw in ["file:///etc/passwd", "javascript:alert(1)", "mailto:a@b.c", "agentpro://x"] {
            assert_eq!(
                navigation_decision(&backend, &url(raw)),
                NavigationDecision::Deny,
                "{raw}"
            );
        }
    }

    #[test]
    fn external_urls_must_be_http_or_https() {
        assert!(parse_external_url(" https://example.com/a ").is_some());
        assert!(parse_external_url("http://example.com").is_some());
        assert!(parse_external_url("file:///tmp/x").is_none());
        assert!(parse_external_url("httpfoo").is_none());
    }
}
