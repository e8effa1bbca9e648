use std::borrow::Cow;

/// Statuses that count as "the backend is serving pages". Redirects are
/// included because the backend's root may forward to a landing page.
pub fn is_ready_status(status_code: u16) -> bool {
    (200..400).contains(&status_code)
}

pub fn parse_http_status_code(raw: &[u8]) -> Option<u16> {
    let (header_text, _) = parse_http_response_parts(raw)?;
    parse_http_status_code_from_headers(&header_text)
}

/// True once `raw` holds the full header block and, when announced, the
/// whole body.
pub fn is_complete_http_response(raw: &[u8]) -> bool {
    let Some((header_text, body)) = parse_http_response_parts(raw) else {
        return false;
    };
    let header_text = header_text.to_ascii_lowercase();

    if header_text.contains("transfer-encoding: chunked") {
        return body.windows(5).any(|window| window == b"0\r\n\r\n");
    }

    if let Some(content_length) = header_text
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|value| value.trim().parse::<usize>().ok())
    {
        return body.len() >= content_length;
    }

    false
}

fn parse_http_response_parts(raw: &[u8]) -> Option<(Cow<'_, str>, &[u8])> {
    let header_end = raw.windows(4).position(|window| window == b"\r\n\r\n")?;
    let (header_bytes, body_bytes) = raw.split_at(header_end + 4);
    Some((String::from_utf8_lossy(header_bytes), body_bytes))
}

fn parse_http_status_code_from_headers(header_text: &str) -> Option<u16> {
    let status_line = header_text.lines().next()?;
    if !status_line.starts_with("HTTP/") {
        return None;
    }
    status_line
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse::<u16>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_http_status_code_extracts_status_line() {
        let raw = b"HTTP/1.1 204 No Content\r\nConnection: close\r\n\r\n";
        assert_eq!(parse_http_status_code(raw), Some(204));
    }

    #[test]
    fn parse_http_status_code_ignores_non_http_banners() {
        let raw = b"SSH-2.0-OpenSSH_9.6\r\n\r\n";
        assert_eq!(parse_http_status_code(raw), None);
        assert_eq!(parse_http_status_code(b"HTTP/1.1 200 OK\r\n"), None);
    }

    #[test]
    fn is_complete_http_response_respects_content_length() {
        let full = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nOK";
        assert!(is_complete_http_response(full));

        let partial = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nO";
        assert!(!is_complete_http_response(partial));
    }

    #[test]
    fn is_complete_http_response_waits_for_final_chunk() {
        let open = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n2\r\nOK\r\n";
        assert!(!is_complete_http_response(open));
        let closed = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n2\r\nOK\r\n0\r\n\r\n";
        assert!(is_complete_http_response(closed));
    }

    #[test]
    fn ready_status_accepts_success_and_redirects_only() {
        assert!(is_ready_status(200));
        assert!(is_ready_status(302));
        assert!(!is_ready_status(404));
        assert!(!is_ready_status(503));
    }
}
