use super::{ColorExtractor, ExtractionOptions};
use crate::error::{AdapterError, AdapterErrorKind};
use crate::pipeline::types::{ExtractedColorToken, ExtractionResult};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Wire shape returned by the inference service.
#[derive(Debug, Deserialize)]
pub struct RemoteColorResponse {
    pub colors: Vec<RemoteColor>,
}

#[derive(Debug, Deserialize)]
pub struct RemoteColor {
    pub hex: String,
    pub confidence: f32,
}

/// Model-based extractor backed by an HTTP inference endpoint.
///
/// The raw image bytes are POSTed to `endpoint`; the service answers with
/// `{"colors": [{"hex": "#RRGGBB", "confidence": 0.9}, ...]}`.
pub struct RemoteModelExtractor {
    name: String,
    endpoint: String,
    model: Option<String>,
    client: reqwest::Client,
}

impl RemoteModelExtractor {
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self::with_client(name, endpoint, client))
    }

    pub fn with_client(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            model: None,
            client,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    async fn request(
        &self,
        image: &[u8],
        options: &ExtractionOptions,
    ) -> Result<RemoteColorResponse, AdapterErrorKind> {
        let mut query = vec![("max_colors", options.max_colors.to_string())];
        if let Some(model) = &self.model {
            query.push(("model", model.clone()));
        }

        let response = self
            .client
            .post(&self.endpoint)
            .query(&query)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(image.to_vec())
            .send()
            .await
            .map_err(|e| AdapterErrorKind::Remote(e.to_string()))?
            .error_for_status()
            .map_err(|e| AdapterErrorKind::Remote(e.to_string()))?;

        response
            .json::<RemoteColorResponse>()
            .await
            .map_err(|e| AdapterErrorKind::InvalidResponse(e.to_string()))
    }

    /// Turns a service response into tokens, skipping unparsable colors.
    pub fn tokens_from_response(
        &self,
        response: RemoteColorResponse,
        max_colors: usize,
    ) -> Vec<ExtractedColorToken> {
        response
            .colors
            .into_iter()
            .filter_map(|color| {
                match ExtractedColorToken::from_hex(&color.hex, color.confidence, &self.name) {
                    Ok(token) => Some(token),
                    Err(e) => {
                        warn!("{} skipped color from service: {}", self.name, e);
                        None
                    }
                }
            })
            .take(max_colors)
            .collect()
    }
}

#[async_trait]
impl ColorExtractor for RemoteModelExtractor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn extract(
        &self,
        image: &[u8],
        options: &ExtractionOptions,
    ) -> Result<ExtractionResult, AdapterError> {
        let started = Instant::now();
        debug!("{} calling {}", self.name, self.endpoint);

        let response = tokio::select! {
            biased;
            _ = options.cancellation.cancelled() => Err(AdapterErrorKind::Cancelled),
            response = self.request(image, options) => response,
        }
        .map_err(|kind| AdapterError::new(&self.name, kind))?;

        let tokens = self.tokens_from_response(response, options.max_colors);
        Ok(ExtractionResult::finish(&self.name, tokens, started))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::oneshot;

    struct ReceivedRequest {
        head: String,
        body: Vec<u8>,
    }

    async fn read_request(stream: &mut TcpStream) -> ReceivedRequest {
        let mut buffer = Vec::new();
        let mut chunk = [0u8; 1024];
        let header_end = loop {
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed before headers");
            buffer.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };
        let head = String::from_utf8_lossy(&buffer[..header_end]).into_owned();
        let length = head
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        while buffer.len() < header_end + length {
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed before body");
            buffer.extend_from_slice(&chunk[..n]);
        }
        ReceivedRequest {
            head,
            body: buffer[header_end..header_end + length].to_vec(),
        }
    }

    /// Answers one request with `response`, or holds the connection open
    /// without answering when `None`.
    async fn serve_once(
        response: Option<String>,
    ) -> (String, oneshot::Receiver<ReceivedRequest>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}/extract", listener.local_addr().unwrap());
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request = read_request(&mut stream).await;
            let _ = tx.send(request);
            match response {
                Some(response) => {
                    stream.write_all(response.as_bytes()).await.unwrap();
                    let _ = stream.shutdown().await;
                }
                None => tokio::time::sleep(Duration::from_secs(30)).await,
            }
        });

        (endpoint, rx)
    }

    fn http_response(status: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    fn remote_at(endpoint: String) -> RemoteModelExtractor {
        RemoteModelExtractor::with_client("remote", endpoint, reqwest::Client::new())
    }

    fn extractor() -> RemoteModelExtractor {
        RemoteModelExtractor::with_client(
            "remote",
            "http://127.0.0.1:9/extract",
            reqwest::Client::new(),
        )
    }

    #[test]
    fn parses_service_payload() {
        let payload = r##"{"colors":[{"hex":"#FF0000","confidence":0.9},{"hex":"00ff00","confidence":0.4}]}"##;
        let response: RemoteColorResponse = serde_json::from_str(payload).unwrap();
        let tokens = extractor().tokens_from_response(response, 8);

        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].hex, "#FF0000");
        assert_eq!(tokens[1].hex, "#00FF00");
        assert_eq!(tokens[1].source, "remote");
    }

    #[test]
    fn skips_unparsable_colors_and_truncates() {
        let payload = r##"{"colors":[{"hex":"nope","confidence":0.9},{"hex":"#010203","confidence":0.5},{"hex":"#040506","confidence":0.3}]}"##;
        let response: RemoteColorResponse = serde_json::from_str(payload).unwrap();
        let tokens = extractor().tokens_from_response(response, 1);

        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].hex, "#010203");
    }

    #[tokio::test]
    async fn cancelled_request_reports_cancellation() {
        let options = ExtractionOptions::default();
        options.cancellation.cancel();
        let err = extractor()
            .extract(b"bytes", &options)
            .await
            .unwrap_err();
        assert_eq!(err.adapter, "remote");
        assert_eq!(err.kind, AdapterErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn posts_image_and_returns_palette() {
        let body = r##"{"colors":[{"hex":"#FF0000","confidence":0.9},{"hex":"#0000FF","confidence":0.5}]}"##;
        let (endpoint, received) = serve_once(Some(http_response("200 OK", body))).await;

        let result = remote_at(endpoint)
            .with_model("palette-v2")
            .extract(b"png-bytes", &ExtractionOptions::default())
            .await
            .unwrap();

        assert_eq!(result.adapter, "remote");
        let hexes: Vec<_> = result.tokens.iter().map(|t| t.hex.as_str()).collect();
        assert_eq!(hexes, vec!["#FF0000", "#0000FF"]);

        let request = received.await.unwrap();
        assert!(
            request
                .head
                .starts_with("POST /extract?max_colors=8&model=palette-v2 HTTP/1.1"),
            "{}",
            request.head
        );
        assert!(request
            .head
            .to_ascii_lowercase()
            .contains("content-type: application/octet-stream"));
        assert_eq!(request.body, b"png-bytes");
    }

    #[tokio::test]
    async fn server_error_maps_to_remote() {
        let (endpoint, _received) =
            serve_once(Some(http_response("500 Internal Server Error", ""))).await;

        let err = remote_at(endpoint)
            .extract(b"bytes", &ExtractionOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.adapter, "remote");
        assert!(matches!(err.kind, AdapterErrorKind::Remote(ref msg) if msg.contains("500")));
    }

    #[tokio::test]
    async fn unreachable_endpoint_maps_to_remote() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}/extract", listener.local_addr().unwrap());
        drop(listener);

        let err = remote_at(endpoint)
            .extract(b"bytes", &ExtractionOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err.kind, AdapterErrorKind::Remote(_)));
    }

    #[tokio::test]
    async fn garbage_body_maps_to_invalid_response() {
        let (endpoint, _received) =
            serve_once(Some(http_response("200 OK", "certainly not json"))).await;

        let err = remote_at(endpoint)
            .extract(b"bytes", &ExtractionOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err.kind, AdapterErrorKind::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn cancellation_interrupts_request_in_flight() {
        let (endpoint, received) = serve_once(None).await;
        let options = ExtractionOptions::default();
        let cancellation = options.cancellation.clone();
        tokio::spawn(async move {
            // Fire only once the server holds the request.
            if received.await.is_ok() {
                cancellation.cancel();
            }
        });

        let started = Instant::now();
        let err = remote_at(endpoint)
            .extract(b"bytes", &options)
            .await
            .unwrap_err();

        assert_eq!(err.kind, AdapterErrorKind::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
