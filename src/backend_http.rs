use std::{
    io::{ErrorKind, Read, Write},
    net::{SocketAddr, TcpStream, ToSocketAddrs},
    time::Duration,
};

use url::Url;

use crate::http_response;

const MIN_SOCKET_TIMEOUT_MS: u64 = 50;

fn socket_addrs(url: &Url) -> Option<(String, Vec<SocketAddr>)> {
    let host = url.host_str()?.to_string();
    let port = url.port_or_known_default().unwrap_or(80);
    let addrs = (host.as_str(), port).to_socket_addrs().ok()?.collect();
    Some((host, addrs))
}

/// Plain TCP reachability of the backend's host and port.
pub fn ping_backend(backend_url: &Url, timeout: Duration) -> bool {
    let timeout = timeout.max(Duration::from_millis(MIN_SOCKET_TIMEOUT_MS));
    let Some((_, addrs)) = socket_addrs(backend_url) else {
        return false;
    };
    addrs
        .iter()
        .any(|address| TcpStream::connect_timeout(address, timeout).is_ok())
}

/// Issues `GET <path>` against the backend and returns the status code.
///
/// Only plain `http` is spoken; the backend is a loopback dev server.
pub fn request_status_code(backend_url: &Url, path: &str, timeout: Duration) -> Option<u16> {
    let request_url = backend_url.join(path).ok()?;
    if request_url.scheme() != "http" {
        return None;
    }

    let timeout = timeout.max(Duration::from_millis(MIN_SOCKET_TIMEOUT_MS));
    let (host, addrs) = socket_addrs(&request_url)?;
    let mut stream = addrs
        .into_iter()
        .find_map(|address| TcpStream::connect_timeout(&address, timeout).ok())?;
    let _ = stream.set_read_timeout(Some(timeout));
    let _ = stream.set_write_timeout(Some(timeout));

    let mut request_target = request_url.path().to_string();
    if let Some(query) = request_url.query() {
        request_target.push('?');
        request_target.push_str(query);
    }
    if request_target.is_empty() {
        request_target = "/".to_string();
    }

    let host_header = match request_url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host,
    };
    let request = format!(
        "GET {request_target} HTTP/1.1\r\n\
Host: {host_header}\r\n\
Accept: */*\r\n\
Accept-Encoding: identity\r\n\
Connection: close\r\n\
\r\n"
    );
    if stream.write_all(request.as_bytes()).is_err() {
        return None;
    }

    let response = read_http_response_bytes(&mut stream)?;
    http_response::parse_http_status_code(&response)
}

fn read_http_response_bytes<R: Read>(reader: &mut R) -> Option<Vec<u8>> {
    let mut response = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(read) => {
                response.extend_from_slice(&chunk[..read]);
                if http_response::is_complete_http_response(&response) {
                    break;
                }
            }
            Err(error) if matches!(error.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                if response.is_empty() {
                    return None;
                }
                break;
            }
            Err(_) => return None,
        }
    }

    if response.is_empty() {
        None
    } else {
        Some(response)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::{Cursor, Error, ErrorKind, Read, Write},
        net::TcpListener,
        thread,
    };

    use super::*;

    #[test]
    fn read_http_response_bytes_keeps_partial_data_on_timeout() {
        let mut reader = TimeoutAfterPayloadReader {
            payload: Cursor::new(b"HTTP/1.1 200 OK\r\nConnection: keep-alive\r\n\r\n".to_vec()),
            timed_out: false,
        };

        let raw = read_http_response_bytes(&mut reader).expect("response should be preserved");
        assert!(raw.starts_with(b"HTTP/1.1 200 OK\r\n"));
    }

    #[test]
    fn request_status_code_reads_status_from_local_server() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test listener");
        let port = listener.local_addr().expect("listener addr").port();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept probe");
            let mut buffer = [0u8; 1024];
            let read = stream.read(&mut buffer).expect("read request");
            let request = String::from_utf8_lossy(&buffer[..read]).to_string();
            stream
                .write_all(b"HTTP/1.1 302 FOUND\r\nLocation: /home\r\nContent-Length: 0\r\n\r\n")
                .expect("write response");
            request
        });

        let url = Url::parse(&format!("http://127.0.0.1:{port}/")).expect("parse url");
        assert_eq!(
            request_status_code(&url, "/", Duration::from_millis(2_000)),
            Some(302)
        );
        let request = server.join().expect("server thread");
        assert!(request.starts_with("GET / HTTP/1.1\r\n"));
        assert!(request.contains(&format!("Host: 127.0.0.1:{port}\r\n")));
    }

    #[test]
    fn ping_backend_fails_for_closed_port() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test listener");
        let port = listener.local_addr().expect("listener addr").port();
        drop(listener);

        let url = Url::parse(&format!("http://127.0.0.1:{port}/")).expect("parse url");
        assert!(!ping_backend(&url, Duration::from_millis(200)));
        assert_eq!(request_status_code(&url, "/", Duration::from_millis(200)), None);
    }

    struct TimeoutAfterPayloadReader {
        payload: Cursor<Vec<u8>>,
        timed_out: bool,
    }

    impl Read for TimeoutAfterPayloadReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let bytes = self.payload.read(buf)?;
            if bytes > 0 {
                return Ok(bytes);
            }
            if self.timed_out {
                return Ok(0);
            }
            self.timed_out = true;
            Err(Error::new(ErrorKind::TimedOut, "simulated read timeout"))
        }
    }
}
