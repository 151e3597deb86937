//! Single-page web form for interactive predictions, used by `emotive serve`.
//!
//! Every connection is read in its own task, bounded by [`READ_TIMEOUT`] and
//! the size limits below. Parsed requests are answered one at a time by a
//! single scoring worker.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

use crate::inference::InferenceContext;
use crate::labels::{EmotionResult, SelectionPolicy};

pub const DEFAULT_ADDR: &str = "127.0.0.1:8501";
/// Largest accepted form body.
pub const MAX_BODY_BYTES: usize = 64 * 1024;
/// Largest accepted request or header line.
pub const MAX_LINE_BYTES: usize = 8 * 1024;
/// Largest accepted header block, request line included.
pub const MAX_HEADER_BYTES: usize = 64 * 1024;
/// Time a client has to deliver a complete request.
pub const READ_TIMEOUT: Duration = Duration::from_secs(10);

const JOB_QUEUE_DEPTH: usize = 32;

const BIAS_CAPTION: &str = "⚠️ This model is trained on the GoEmotions dataset and may reflect dataset biases. \
Predictions represent statistical associations, not absolute emotional truth.";
const EMPTY_WARNING: &str = "Please enter some text.";

/// A parsed HTTP request line plus body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub reason: &'static str,
    pub body: String,
}

impl Response {
    fn html(body: String) -> Self {
        Self {
            status: 200,
            reason: "OK",
            body,
        }
    }

    fn status(status: u16, reason: &'static str) -> Self {
        Self {
            status,
            reason,
            body: format!("<h1>{} {}</h1>", status, reason),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let head = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            self.status,
            self.reason,
            self.body.len()
        );
        let mut bytes = head.into_bytes();
        bytes.extend_from_slice(self.body.as_bytes());
        bytes
    }
}

/// What the page shows below the form.
#[derive(Debug, Clone, PartialEq)]
pub enum PageState {
    Blank,
    /// Submitted text was empty
    Warning,
    Result {
        text: String,
        result: EmotionResult,
    },
    Error {
        text: String,
        message: String,
    },
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn capitalize(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn result_heading(policy: SelectionPolicy) -> String {
    match policy {
        SelectionPolicy::TopK(k) => format!("Top {} Predicted Emotions", k),
        SelectionPolicy::Threshold(t) => format!("Predicted Emotions (score &ge; {:.2})", t),
    }
}

fn policy_summary(policy: SelectionPolicy) -> String {
    match policy {
        SelectionPolicy::TopK(1) => "the <strong>strongest emotion</strong>".to_string(),
        SelectionPolicy::TopK(k) => format!("the <strong>top {} emotions</strong>", k),
        SelectionPolicy::Threshold(t) => format!("<strong>every emotion scoring at least {:.2}</strong>", t),
    }
}

fn render_result(result: &EmotionResult) -> String {
    if result.is_empty() {
        return r#"<div class="info">No strong emotions detected</div>"#.to_string();
    }

    let mut html = format!("<h3>{}</h3>\n", result_heading(result.policy));
    for emotion in result.iter() {
        html.push_str(&format!(
            "<p><strong>{}</strong> — {:.2}</p>\n",
            escape_html(&capitalize(&emotion.label)),
            emotion.score
        ));
    }

    html.push_str("<div class=\"chart\">\n");
    for emotion in result.iter() {
        let width = (emotion.score.clamp(0.0, 1.0) * 100.0).round();
        html.push_str(&format!(
            "<div class=\"row\"><span class=\"name\">{}</span><span class=\"bar\" style=\"width: {}%\"></span></div>\n",
            escape_html(&capitalize(&emotion.label)),
            width
        ));
    }
    html.push_str("</div>\n");
    html
}

/// Full HTML page for `state`, describing the selection `policy` in force.
pub fn render_page(state: &PageState, policy: SelectionPolicy) -> String {
    let (text, section) = match state {
        PageState::Blank => (String::new(), String::new()),
        PageState::Warning => (
            String::new(),
            format!(r#"<div class="warning">{}</div>"#, EMPTY_WARNING),
        ),
        PageState::Result { text, result } => (escape_html(text), render_result(result)),
        PageState::Error { text, message } => (
            escape_html(text),
            format!(r#"<div class="error">Error during prediction: {}</div>"#, escape_html(message)),
        ),
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Emotion Classifier</title>
<style>
body {{ font-family: sans-serif; max-width: 720px; margin: 2rem auto; padding: 0 1rem; }}
textarea {{ width: 100%; min-height: 8rem; }}
.warning {{ background: #fff3cd; padding: .75rem; }}
.error {{ background: #f8d7da; padding: .75rem; }}
.info {{ background: #d1ecf1; padding: .75rem; }}
.row {{ display: flex; align-items: center; margin: .25rem 0; }}
.name {{ width: 9rem; }}
.bar {{ display: inline-block; height: 1rem; background: #ff4b4b; }}
#spinner {{ display: none; }}
form.busy #spinner {{ display: inline; }}
footer {{ color: #666; font-size: .85rem; margin-top: 2rem; border-top: 1px solid #ddd; padding-top: .5rem; }}
</style>
</head>
<body>
<h1>🧠 Emotion Classifier</h1>
<p>This model predicts {summary} present in a piece of text. Multiple emotions can coexist because human feelings are complex.</p>
<form method="post" action="/" onsubmit="this.classList.add('busy')">
<label for="text">Enter text</label>
<textarea id="text" name="text" placeholder="Type something emotional...">{text}</textarea>
<button type="submit">Analyze Emotion</button> <span id="spinner">Analyzing...</span>
</form>
{section}
<footer>{caption}</footer>
</body>
</html>
"#,
        summary = policy_summary(policy),
        text = text,
        section = section,
        caption = BIAS_CAPTION
    )
}

/// Answers one request.
pub fn respond(ctx: &InferenceContext, request: &Request) -> Response {
    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/") => Response::html(render_page(&PageState::Blank, ctx.policy())),
        ("POST", "/") => {
            let text = url::form_urlencoded::parse(&request.body)
                .find(|(key, _)| key == "text")
                .map(|(_, value)| value.into_owned())
                .unwrap_or_default();

            let state = if text.trim().is_empty() {
                PageState::Warning
            } else {
                match ctx.predict(&text) {
                    Ok(result) => PageState::Result { text, result },
                    Err(e) => {
                        warn!("Prediction failed: {}", e);
                        PageState::Error {
                            text,
                            message: e.to_string(),
                        }
                    }
                }
            };
            Response::html(render_page(&state, ctx.policy()))
        }
        (_, "/") => Response::status(405, "Method Not Allowed"),
        _ => Response::status(404, "Not Found"),
    }
}

fn bad_request(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.into())
}

/// Reads one line of at most `limit` bytes, terminator included.
async fn read_bounded_line<R: AsyncBufRead + Unpin>(reader: &mut R, limit: usize) -> io::Result<String> {
    let mut line = String::new();
    (&mut *reader).take(limit as u64 + 1).read_line(&mut line).await?;
    if line.len() > limit {
        return Err(bad_request(format!("Request line exceeds {} bytes", limit)));
    }
    Ok(line)
}

/// Reads one HTTP/1.1 request. Returns `None` if the peer closed before sending anything.
///
/// Lines longer than [`MAX_LINE_BYTES`], header blocks larger than
/// [`MAX_HEADER_BYTES`] and bodies larger than [`MAX_BODY_BYTES`] are rejected.
pub async fn read_request<R: AsyncBufRead + Unpin>(reader: &mut R) -> io::Result<Option<Request>> {
    let request_line = read_bounded_line(reader, MAX_LINE_BYTES).await?;
    if request_line.is_empty() {
        return Ok(None);
    }
    let mut header_bytes = request_line.len();

    let mut parts = request_line.split_whitespace();
    let (method, target) = match (parts.next(), parts.next()) {
        (Some(method), Some(target)) => (method.to_string(), target),
        _ => return Err(bad_request(format!("Malformed request line: {:?}", request_line.trim_end()))),
    };
    let path = target.split('?').next().unwrap_or(target).to_string();

    let mut content_length = 0usize;
    loop {
        let header = read_bounded_line(reader, MAX_LINE_BYTES).await?;
        if header.is_empty() {
            break;
        }
        header_bytes += header.len();
        if header_bytes > MAX_HEADER_BYTES {
            return Err(bad_request(format!("Headers exceed {} bytes", MAX_HEADER_BYTES)));
        }
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                content_length = value
                    .trim()
                    .parse()
                    .map_err(|_| bad_request(format!("Invalid Content-Length: {}", value.trim())))?;
            }
        }
    }

    if content_length > MAX_BODY_BYTES {
        return Err(bad_request(format!("Request body of {} bytes is too large", content_length)));
    }
    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).await?;

    Ok(Some(Request { method, path, body }))
}

type Job = (Request, oneshot::Sender<Response>);

/// Serves the form on `addr` until the listener fails.
pub async fn serve(addr: &str, ctx: Arc<InferenceContext>) -> io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve_listener(listener, ctx, READ_TIMEOUT).await
}

/// Serves the form on an already bound listener.
///
/// A client that has not delivered a complete request within `read_timeout`
/// is answered with `408 Request Timeout` and disconnected.
pub async fn serve_listener(listener: TcpListener, ctx: Arc<InferenceContext>, read_timeout: Duration) -> io::Result<()> {
    info!("Emotion classifier listening on http://{}", listener.local_addr()?);

    let (jobs, mut queue) = mpsc::channel::<Job>(JOB_QUEUE_DEPTH);
    tokio::task::spawn_blocking(move || {
        while let Some((request, reply)) = queue.blocking_recv() {
            let _ = reply.send(respond(&ctx, &request));
        }
    });

    loop {
        let (stream, peer) = listener.accept().await?;
        tokio::spawn(handle_connection(stream, peer, jobs.clone(), read_timeout));
    }
}

async fn dispatch(jobs: &mpsc::Sender<Job>, request: Request) -> Response {
    let (reply, answer) = oneshot::channel();
    if jobs.send((request, reply)).await.is_err() {
        return Response::status(503, "Service Unavailable");
    }
    answer
        .await
        .unwrap_or_else(|_| Response::status(500, "Internal Server Error"))
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, jobs: mpsc::Sender<Job>, read_timeout: Duration) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let response = match timeout(read_timeout, read_request(&mut reader)).await {
        Ok(Ok(Some(request))) => {
            info!("{} {} from {}", request.method, request.path, peer);
            dispatch(&jobs, request).await
        }
        Ok(Ok(None)) => return,
        Ok(Err(e)) => {
            warn!("Bad request from {}: {}", peer, e);
            Response::status(400, "Bad Request")
        }
        Err(_) => {
            warn!("Timed out waiting for a request from {}", peer);
            Response::status(408, "Request Timeout")
        }
    };

    if let Err(e) = write_half.write_all(&response.to_bytes()).await {
        warn!("Failed to answer {}: {}", peer, e);
    }
    let _ = write_half.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Scorer;
    use crate::error::{ClassifierError, Stage};
    use crate::labels::{EmotionScore, LabelSchema};
    use crate::tokenizer::Vocabulary;
    use ndarray::Array2;
    use tokio::io::AsyncWriteExt;

    struct Fixed;

    impl Scorer for Fixed {
        fn score(&self, batch: &Array2<u32>) -> Result<Array2<f32>, ClassifierError> {
            Ok(Array2::from_shape_fn((batch.nrows(), 2), |(_, j)| if j == 0 { 0.9 } else { 0.2 }))
        }

        fn num_classes(&self) -> usize {
            2
        }
    }

    struct Broken;

    impl Scorer for Broken {
        fn score(&self, _batch: &Array2<u32>) -> Result<Array2<f32>, ClassifierError> {
            Err(ClassifierError::new(Stage::ModelBuild, "weights missing"))
        }

        fn num_classes(&self) -> usize {
            2
        }
    }

    fn context(scorer: Box<dyn Scorer>, policy: SelectionPolicy) -> InferenceContext {
        InferenceContext::new(
            Vocabulary::fit(["so happy today"], 100, "<OOV>").unwrap(),
            scorer,
            LabelSchema::new(["joy", "anger"]).unwrap(),
            8,
            policy,
        )
        .unwrap()
    }

    fn request(method: &str, path: &str, body: &str) -> Request {
        Request {
            method: method.to_string(),
            path: path.to_string(),
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<b>\"hi\" & 'bye'</b>"), "&lt;b&gt;&quot;hi&quot; &amp; &#39;bye&#39;&lt;/b&gt;");
    }

    #[test]
    fn test_render_result_lines_and_chart() {
        let state = PageState::Result {
            text: "thank you <3".into(),
            result: EmotionResult {
                policy: SelectionPolicy::TopK(2),
                emotions: vec![
                    EmotionScore { label: "gratitude".into(), score: 0.87 },
                    EmotionScore { label: "love".into(), score: 0.4 },
                ],
            },
        };
        let page = render_page(&state, SelectionPolicy::TopK(2));
        assert!(page.contains("<h3>Top 2 Predicted Emotions</h3>"));
        assert!(page.contains("the <strong>top 2 emotions</strong>"));
        assert!(page.contains("<strong>Gratitude</strong> — 0.87"));
        assert!(page.contains("width: 87%"));
        assert!(page.contains("thank you &lt;3"));
        assert!(page.contains("GoEmotions dataset"));
    }

    #[test]
    fn test_threshold_wording() {
        let state = PageState::Result {
            text: "so happy".into(),
            result: EmotionResult {
                policy: SelectionPolicy::Threshold(0.5),
                emotions: vec![EmotionScore { label: "joy".into(), score: 0.9 }],
            },
        };
        let page = render_page(&state, SelectionPolicy::Threshold(0.5));
        assert!(page.contains("Predicted Emotions (score &ge; 0.50)"));
        assert!(page.contains("every emotion scoring at least 0.50"));
        assert!(!page.contains("top 3"));
    }

    #[test]
    fn test_empty_threshold_result_is_informational() {
        let state = PageState::Result {
            text: "ok".into(),
            result: EmotionResult {
                policy: SelectionPolicy::Threshold(0.5),
                emotions: vec![],
            },
        };
        assert!(render_page(&state, SelectionPolicy::Threshold(0.5)).contains("No strong emotions detected"));
    }

    #[test]
    fn test_warning_page() {
        let policy = SelectionPolicy::default();
        assert!(render_page(&PageState::Warning, policy).contains("Please enter some text."));
        assert!(!render_page(&PageState::Blank, policy).contains("Please enter some text."));
    }

    #[test]
    fn test_respond_get_renders_form() {
        let ctx = context(Box::new(Fixed), SelectionPolicy::TopK(3));
        let response = respond(&ctx, &request("GET", "/", ""));
        assert_eq!(response.status, 200);
        assert!(response.body.contains("<form method=\"post\""));
        assert!(response.body.contains("top 3 emotions"));
    }

    #[test]
    fn test_respond_post_scores_text() {
        let ctx = context(Box::new(Fixed), SelectionPolicy::TopK(1));
        let response = respond(&ctx, &request("POST", "/", "text=so+happy+today"));
        assert_eq!(response.status, 200);
        assert!(response.body.contains("<strong>Joy</strong> — 0.90"));
        assert!(!response.body.contains("<strong>Anger</strong>"));
        assert!(response.body.contains(">so happy today</textarea>"));
    }

    #[test]
    fn test_respond_empty_post_warns() {
        let ctx = context(Box::new(Fixed), SelectionPolicy::default());
        for body in ["text=", "text=+++", ""] {
            let response = respond(&ctx, &request("POST", "/", body));
            assert_eq!(response.status, 200);
            assert!(response.body.contains("Please enter some text."));
        }
    }

    #[test]
    fn test_respond_shows_prediction_error() {
        let ctx = context(Box::new(Broken), SelectionPolicy::default());
        let response = respond(&ctx, &request("POST", "/", "text=hello"));
        assert_eq!(response.status, 200);
        assert!(response.body.contains("Error during prediction:"));

        // the same context keeps answering afterwards
        assert_eq!(respond(&ctx, &request("GET", "/", "")).status, 200);
    }

    #[test]
    fn test_respond_unknown_routes() {
        let ctx = context(Box::new(Fixed), SelectionPolicy::default());
        assert_eq!(respond(&ctx, &request("PUT", "/", "")).status, 405);
        assert_eq!(respond(&ctx, &request("DELETE", "/", "")).status, 405);
        assert_eq!(respond(&ctx, &request("GET", "/favicon.ico", "")).status, 404);
    }

    #[tokio::test]
    async fn test_read_post_request() {
        let raw = b"POST /?x=1 HTTP/1.1\r\nHost: localhost\r\nContent-Length: 16\r\n\r\ntext=so+happy%21";
        let mut reader = BufReader::new(&raw[..]);
        let request = read_request(&mut reader).await.unwrap().unwrap();
        assert_eq!(request.method, "POST");
        assert_eq!(request.path, "/");
        assert_eq!(request.body, b"text=so+happy%21".to_vec());

        let text: Vec<_> = url::form_urlencoded::parse(&request.body).collect();
        assert_eq!(text[0].1, "so happy!");
    }

    #[tokio::test]
    async fn test_read_request_eof() {
        let mut reader = BufReader::new(&b""[..]);
        assert!(read_request(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let raw = format!("POST / HTTP/1.1\r\nContent-Length: {}\r\n\r\n", MAX_BODY_BYTES + 1);
        let mut reader = BufReader::new(raw.as_bytes());
        assert!(read_request(&mut reader).await.is_err());
    }

    #[tokio::test]
    async fn test_oversized_header_line_rejected() {
        let raw = format!("GET / HTTP/1.1\r\nX-Big: {}\r\n\r\n", "a".repeat(MAX_LINE_BYTES));
        let mut reader = BufReader::new(raw.as_bytes());
        let err = read_request(&mut reader).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);

        let raw = format!("GET /{} HTTP/1.1\r\n\r\n", "a".repeat(MAX_LINE_BYTES));
        let mut reader = BufReader::new(raw.as_bytes());
        assert!(read_request(&mut reader).await.is_err());
    }

    #[tokio::test]
    async fn test_oversized_header_block_rejected() {
        let mut raw = String::from("GET / HTTP/1.1\r\n");
        let header = format!("X-Pad: {}\r\n", "a".repeat(1000));
        while raw.len() <= MAX_HEADER_BYTES {
            raw.push_str(&header);
        }
        raw.push_str("\r\n");
        let mut reader = BufReader::new(raw.as_bytes());
        assert!(read_request(&mut reader).await.is_err());
    }

    async fn start_server(read_timeout: Duration) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let ctx = Arc::new(context(Box::new(Fixed), SelectionPolicy::default()));
        tokio::spawn(serve_listener(listener, ctx, read_timeout));
        addr
    }

    async fn fetch(addr: SocketAddr, raw: &[u8]) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(raw).await.unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        String::from_utf8(response).unwrap()
    }

    #[tokio::test]
    async fn test_idle_client_does_not_block_others() {
        let addr = start_server(Duration::from_secs(30)).await;

        let mut idle = TcpStream::connect(addr).await.unwrap();
        idle.write_all(b"GET / HT").await.unwrap();

        let response = timeout(Duration::from_secs(3), fetch(addr, b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n"))
            .await
            .expect("second client was not answered");
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        drop(idle);
    }

    #[tokio::test]
    async fn test_incomplete_request_times_out() {
        let addr = start_server(Duration::from_millis(100)).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"GET / HT").await.unwrap();
        let mut response = Vec::new();
        timeout(Duration::from_secs(3), stream.read_to_end(&mut response))
            .await
            .unwrap()
            .unwrap();
        assert!(String::from_utf8(response).unwrap().starts_with("HTTP/1.1 408 Request Timeout"));
    }

    #[tokio::test]
    async fn test_server_answers_post() {
        let addr = start_server(READ_TIMEOUT).await;
        let response = fetch(
            addr,
            b"POST / HTTP/1.1\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: 14\r\n\r\ntext=so+happy!",
        )
        .await;
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains("<strong>Joy</strong>"));
    }
}
