//! Remote URL retrieval.

use std::time::Duration;

use tracing::{debug, warn};

use super::FileApi;
use crate::error::{FileApiError, Result};
use crate::messages::{escape, MessageKey};

/// User agent sent with every fetch.
pub const USER_AGENT: &str = "Mozilla/5.0 (X11; U; Linux x86_64; en-US; rv:1.9.1)";

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

impl FileApi {
    /// Fetch the body of a URL.
    ///
    /// A 4xx or 5xx status fails with [`FileApiError::RemoteTransport`] and
    /// records "HTTP error: N".
    pub fn fetch_url(&mut self, url: &str) -> Result<Vec<u8>> {
        let client = match reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(FETCH_TIMEOUT)
            .build()
        {
            Ok(client) => client,
            Err(e) => return Err(FileApiError::Configuration(e.to_string())),
        };

        let response = match client.get(url).send() {
            Ok(response) => response,
            Err(e) => {
                warn!(url, error = %e, "Fetch failed");
                let message = self.messages.render(MessageKey::GeneralError, &escape(url), None);
                return Err(self.fail(FileApiError::General(message)));
            }
        };

        let status = response.status();
        debug!(url, status = status.as_u16(), "Fetched URL");
        if status.is_client_error() || status.is_server_error() {
            let code = status.as_u16();
            let message = self.messages.render_code(MessageKey::HttpError, "", i64::from(code), None);
            return Err(self.fail(FileApiError::RemoteTransport { code, message }));
        }

        match response.bytes() {
            Ok(body) => Ok(body.to_vec()),
            Err(e) => {
                warn!(url, error = %e, "Reading fetched body failed");
                let message = self.messages.render(MessageKey::GeneralError, &escape(url), None);
                Err(self.fail(FileApiError::General(message)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;
    use tempfile::TempDir;

    /// Serve one canned HTTP response on a loopback port.
    fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut request = [0u8; 4096];
                let read = stream.read(&mut request).unwrap_or(0);
                let request = String::from_utf8_lossy(&request[..read]).to_lowercase();
                assert!(request.contains(&USER_AGENT.to_lowercase()));
                let reply = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_line,
                    body.len(),
                    body
                );
                let _ = stream.write_all(reply.as_bytes());
            }
        });
        format!("http://{}/data", addr)
    }

    #[test]
    fn test_fetch_url_ok() {
        let temp_dir = TempDir::new().unwrap();
        let mut api = FileApi::new(temp_dir.path()).unwrap();
        let url = serve_once("200 OK", "hello");

        assert_eq!(api.fetch_url(&url).unwrap(), b"hello");
        assert_eq!(api.last_error(), "");
    }

    #[test]
    fn test_fetch_url_error_status() {
        let temp_dir = TempDir::new().unwrap();
        let mut api = FileApi::new(temp_dir.path()).unwrap();
        let url = serve_once("404 Not Found", "missing");

        match api.fetch_url(&url) {
            Err(FileApiError::RemoteTransport { code, .. }) => assert_eq!(code, 404),
            other => panic!("unexpected result: {:?}", other.map(|b| b.len())),
        }
        assert_eq!(api.last_error(), "HTTP error: 404");
    }

    #[test]
    fn test_fetch_url_unreachable() {
        let temp_dir = TempDir::new().unwrap();
        let mut api = FileApi::new(temp_dir.path()).unwrap();

        assert!(matches!(api.fetch_url("http://127.0.0.1:1/"), Err(FileApiError::General(_))));
        assert_eq!(api.last_error(), "General error: &#039;http://127.0.0.1:1/&#039;");
    }
}
