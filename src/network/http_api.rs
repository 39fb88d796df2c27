use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::grading::{EvaluationRequest, RubricScorer};

const MAX_HEAD_BYTES: usize = 16 * 1024;
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

const CORS_HEADERS: &str = "Access-Control-Allow-Origin: *\r\n\
    Access-Control-Allow-Methods: POST, OPTIONS\r\n\
    Access-Control-Allow-Headers: authorization, x-client-info, apikey, content-type\r\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub body: Vec<u8>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ReadError {
    /// Connection closed before a full request arrived, or the head is garbled.
    Malformed,
    TooLarge,
    /// Body framed by `Transfer-Encoding` instead of `Content-Length`.
    LengthRequired,
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Reads one request. Bodies are framed only by `Content-Length`; a
/// `Transfer-Encoding` body is refused with `LengthRequired`. Clients sending
/// `Expect: 100-continue` get an interim `100 Continue` before the body is read.
pub async fn read_request<S>(stream: &mut S) -> Result<HttpRequest, ReadError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf: Vec<u8> = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];

    let head_end = loop {
        if let Some(pos) = find_head_end(&buf) {
            break pos;
        }
        if buf.len() > MAX_HEAD_BYTES {
            return Err(ReadError::TooLarge);
        }
        let n = stream.read(&mut chunk).await.map_err(|_| ReadError::Malformed)?;
        if n == 0 {
            return Err(ReadError::Malformed);
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let method = request_line.next().ok_or(ReadError::Malformed)?.to_string();
    let path = request_line.next().unwrap_or("/").to_string();

    let mut content_length = 0usize;
    let mut expects_continue = false;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim();
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().map_err(|_| ReadError::Malformed)?;
            } else if name.eq_ignore_ascii_case("transfer-encoding") {
                return Err(ReadError::LengthRequired);
            } else if name.eq_ignore_ascii_case("expect") {
                expects_continue = value.trim().eq_ignore_ascii_case("100-continue");
            }
        }
    }
    if content_length > MAX_BODY_BYTES {
        return Err(ReadError::TooLarge);
    }

    let mut body = buf.split_off(head_end + 4);
    if expects_continue && body.len() < content_length {
        stream
            .write_all(b"HTTP/1.1 100 Continue\r\n\r\n")
            .await
            .map_err(|_| ReadError::Malformed)?;
        stream.flush().await.map_err(|_| ReadError::Malformed)?;
    }
    while body.len() < content_length {
        let n = stream.read(&mut chunk).await.map_err(|_| ReadError::Malformed)?;
        if n == 0 {
            return Err(ReadError::Malformed);
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);

    Ok(HttpRequest { method, path, body })
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        402 => "Payment Required",
        405 => "Method Not Allowed",
        411 => "Length Required",
        413 => "Payload Too Large",
        429 => "Too Many Requests",
        _ => "Internal Server Error",
    }
}

pub fn render_response(status: u16, body: &str) -> String {
    if status == 204 {
        return format!("HTTP/1.1 204 No Content\r\n{}Connection: close\r\n\r\n", CORS_HEADERS);
    }
    format!(
        "HTTP/1.1 {} {}\r\n\
        Content-Type: application/json\r\n\
        {}\
        Content-Length: {}\r\n\
        Connection: close\r\n\
        \r\n\
        {}",
        status,
        reason_phrase(status),
        CORS_HEADERS,
        body.len(),
        body,
    )
}

fn error_body(message: &str) -> String {
    serde_json::json!({ "error": message }).to_string()
}

/// Routes one request to the scorer. Returns status and JSON body.
pub async fn handle_request(scorer: &RubricScorer, request: &HttpRequest) -> (u16, String) {
    match request.method.as_str() {
        "OPTIONS" => (204, String::new()),
        "POST" => {
            let eval_request: EvaluationRequest = match serde_json::from_slice(&request.body) {
                Ok(r) => r,
                Err(e) => {
                    warn!("Rejecting unreadable score request on {}: {}", request.path, e);
                    return (400, error_body("Request body must be JSON with a \"prompt\" string"));
                }
            };
            if eval_request.is_blank() {
                return (400, error_body("Prompt must not be empty"));
            }

            match scorer.score(&eval_request).await {
                Ok(result) => match serde_json::to_string(&result) {
                    Ok(body) => (200, body),
                    Err(e) => (500, error_body(&e.to_string())),
                },
                Err(e) => {
                    error!("Scoring failed: {}", e);
                    (e.status_code(), error_body(&e.user_message()))
                }
            }
        }
        _ => (405, error_body("Method not allowed")),
    }
}

async fn serve_connection<S>(mut stream: S, scorer: Arc<RubricScorer>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (status, body) = match read_request(&mut stream).await {
        Ok(request) => handle_request(&scorer, &request).await,
        Err(ReadError::TooLarge) => (413, error_body("Request too large")),
        Err(ReadError::Malformed) => (400, error_body("Malformed HTTP request")),
        Err(ReadError::LengthRequired) => {
            warn!("Refusing request body without Content-Length");
            (411, error_body("Content-Length required"))
        }
    };

    let response = render_response(status, &body);
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        warn!("Failed to write HTTP response: {}", e);
    }
    let _ = stream.shutdown().await;
}

/// Accepts connections forever, one task per connection.
pub async fn serve(listener: TcpListener, scorer: Arc<RubricScorer>) {
    if let Ok(addr) = listener.local_addr() {
        info!("Prompt scoring API listening on http://{}", addr);
    }

    loop {
        let (stream, _) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                error!("HTTP API accept error: {}", e);
                continue;
            }
        };

        let scorer = scorer.clone();
        tokio::spawn(serve_connection(stream, scorer));
    }
}

pub async fn start(bind_addr: &str, scorer: Arc<RubricScorer>) -> std::io::Result<()> {
    let listener = TcpListener::bind(bind_addr).await?;
    serve(listener, scorer).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    /// Feeds `raw` to the server half and closes the client half.
    async fn read_from(raw: &[u8]) -> Result<HttpRequest, ReadError> {
        let (mut client, mut server) = duplex(64 * 1024);
        client.write_all(raw).await.unwrap();
        drop(client);
        read_request(&mut server).await
    }

    #[tokio::test]
    async fn reads_body_by_content_length() {
        let raw = b"POST /score-prompt HTTP/1.1\r\nHost: x\r\nContent-Length: 5\r\n\r\nhello extra";
        let req = read_from(raw).await.unwrap();
        assert_eq!(req.method, "POST");
        assert_eq!(req.path, "/score-prompt");
        assert_eq!(req.body, b"hello");
    }

    #[tokio::test]
    async fn truncated_body_is_malformed() {
        let result = read_from(b"POST / HTTP/1.1\r\ncontent-length: 10\r\n\r\nabc").await;
        assert_eq!(result, Err(ReadError::Malformed));
    }

    #[tokio::test]
    async fn oversized_body_is_refused() {
        let raw = format!("POST / HTTP/1.1\r\nContent-Length: {}\r\n\r\n", MAX_BODY_BYTES + 1);
        assert_eq!(read_from(raw.as_bytes()).await, Err(ReadError::TooLarge));
    }

    #[tokio::test]
    async fn chunked_body_needs_a_length() {
        let raw = b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n0\r\n\r\n";
        assert_eq!(read_from(raw).await, Err(ReadError::LengthRequired));
    }

    #[tokio::test]
    async fn expect_continue_gets_interim_response() {
        let (mut client, mut server) = duplex(64 * 1024);
        let reader = tokio::spawn(async move { read_request(&mut server).await });

        client
            .write_all(b"POST / HTTP/1.1\r\nExpect: 100-continue\r\nContent-Length: 2\r\n\r\n")
            .await
            .unwrap();
        let interim = b"HTTP/1.1 100 Continue\r\n\r\n";
        let mut seen = vec![0u8; interim.len()];
        client.read_exact(&mut seen).await.unwrap();
        assert_eq!(seen, interim);

        client.write_all(b"{}").await.unwrap();
        let req = reader.await.unwrap().unwrap();
        assert_eq!(req.body, b"{}");
    }

    #[tokio::test]
    async fn expect_continue_is_skipped_when_body_already_sent() {
        let (mut client, mut server) = duplex(64 * 1024);
        client
            .write_all(b"POST / HTTP/1.1\r\nExpect: 100-continue\r\nContent-Length: 2\r\n\r\n{}")
            .await
            .unwrap();
        let req = read_request(&mut server).await.unwrap();
        assert_eq!(req.body, b"{}");

        drop(server);
        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[test]
    fn responses_carry_cors_and_length() {
        let resp = render_response(429, "{}");
        assert!(resp.starts_with("HTTP/1.1 429 Too Many Requests\r\n"));
        assert!(resp.contains("Access-Control-Allow-Origin: *"));
        assert!(resp.contains("Content-Length: 2\r\n"));
        assert!(resp.ends_with("\r\n\r\n{}"));
    }

    #[test]
    fn length_required_has_its_reason() {
        assert!(render_response(411, "{}").starts_with("HTTP/1.1 411 Length Required\r\n"));
    }

    #[test]
    fn preflight_has_no_body() {
        let resp = render_response(204, "");
        assert!(resp.starts_with("HTTP/1.1 204 No Content\r\n"));
        assert!(!resp.contains("Content-Type"));
    }
}
