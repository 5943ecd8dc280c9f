/**
 * One-shot HTTP collector for network tests
 *
 * Accepts a single connection on 127.0.0.1, answers with a canned
 * response and hands back the raw request text.
 */

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub(crate) struct CapturedRequest {
    pub head: String,
    pub body: String,
}

impl CapturedRequest {
    pub fn request_line(&self) -> &str {
        self.head.lines().next().unwrap_or_default()
    }

    /// Header value by case-insensitive name
    pub fn header(&self, name: &str) -> Option<String> {
        let prefix = format!("{}:", name.to_ascii_lowercase());
        self.head.lines().find_map(|line| {
            let lower = line.to_ascii_lowercase();
            lower.strip_prefix(&prefix).map(|value| value.trim().to_string())
        })
    }
}

/**
 * Bind a listener and serve one request
 * Returns the base url (`http://127.0.0.1:<port>`) and the capture task
 */
pub(crate) async fn serve_once(status_line: &str, response_body: &str) -> (String, JoinHandle<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let response = format!(
        "{}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status_line,
        response_body.len(),
        response_body
    );

    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buffer = Vec::new();
        let mut chunk = [0u8; 1024];

        let (head_end, body_len) = loop {
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed before the request was complete");
            buffer.extend_from_slice(&chunk[..n]);

            if let Some(pos) = buffer.windows(4).position(|window| window == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buffer[..pos]).to_ascii_lowercase();
                let body_len = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|value| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buffer.len() >= pos + 4 + body_len {
                    break (pos, body_len);
                }
            }
        };

        stream.write_all(response.as_bytes()).await.unwrap();
        let _ = stream.shutdown().await;

        CapturedRequest {
            head: String::from_utf8_lossy(&buffer[..head_end]).to_string(),
            body: String::from_utf8_lossy(&buffer[head_end + 4..head_end + 4 + body_len]).to_string(),
        }
    });

    (base_url, handle)
}
