//! Remote backend against a minimal local HTTP server.

use parlance::stt::remote::{RemoteApiBackend, RemoteApiConfig};
use parlance::{AudioAsset, BackendInput, ParlanceError, TranscriptionBackend};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

const VERBOSE_JSON: &str = r#"{
    "task": "transcribe",
    "language": "english",
    "duration": 2.0,
    "text": " Tell me about yourself.",
    "segments": [
        {"id": 0, "start": 0.0, "end": 1.2, "text": " Tell me"},
        {"id": 1, "start": 1.0, "end": 2.0, "text": " about yourself."}
    ]
}"#;

struct CapturedRequest {
    head: String,
    body: Vec<u8>,
}

enum Reply {
    Respond { status: &'static str, body: &'static str },
    Hang,
}

/// Serve one request per connection with a canned reply.
async fn spawn_stub(reply: Reply) -> (String, mpsc::UnboundedReceiver<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    let reply = std::sync::Arc::new(reply);

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let tx = tx.clone();
            let reply = reply.clone();
            tokio::spawn(async move {
                handle(stream, &reply, tx).await;
            });
        }
    });

    (
        format!("http://{addr}/v1/audio/transcriptions"),
        rx,
    )
}

async fn handle(mut stream: TcpStream, reply: &Reply, tx: mpsc::UnboundedSender<CapturedRequest>) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];

    let head_end = loop {
        if let Some(pos) = find(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_lowercase();
    let content_length = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok());
    let chunked = head.contains("transfer-encoding: chunked");

    loop {
        let body_len = buf.len() - head_end;
        let complete = match content_length {
            Some(len) => body_len >= len,
            None if chunked => buf.ends_with(b"0\r\n\r\n"),
            None => true,
        };
        if complete {
            break;
        }
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }

    let _ = tx.send(CapturedRequest {
        head,
        body: buf[head_end..].to_vec(),
    });

    match reply {
        Reply::Respond { status, body } => {
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
        Reply::Hang => {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn backend(endpoint: String, timeout: Duration) -> RemoteApiBackend {
    RemoteApiBackend::new(RemoteApiConfig {
        endpoint,
        api_key: Some("sk-test".to_string()),
        model: "whisper-1".to_string(),
        language: Some("en".to_string()),
        timeout,
    })
    .unwrap()
}

fn upload() -> BackendInput {
    let asset = AudioAsset::new(b"RIFF-not-really-audio".to_vec(), "audio/webm", 1024)
        .unwrap()
        .with_file_name("answer.webm");
    BackendInput::Raw(asset)
}

#[tokio::test]
async fn verbose_json_response_is_canonicalized() {
    let (endpoint, mut requests) = spawn_stub(Reply::Respond {
        status: "200 OK",
        body: VERBOSE_JSON,
    })
    .await;

    let transcript = backend(endpoint, Duration::from_secs(5))
        .transcribe(upload())
        .await
        .unwrap();

    assert_eq!(transcript.text, "Tell me about yourself.");
    assert_eq!(transcript.segments.len(), 2);
    assert_eq!(transcript.segments[0].text, "Tell me");
    assert_eq!(transcript.segments[1].text, "about yourself.");
    // Overlapping start clipped to the previous end.
    assert_eq!(transcript.segments[1].start, 1.2);
    assert_eq!(transcript.segments[1].end, 2.0);

    let request = requests.recv().await.unwrap();
    assert!(request.head.starts_with("post /v1/audio/transcriptions"));
    assert!(request.head.contains("authorization: bearer sk-test"));
    assert!(request.head.contains("multipart/form-data"));

    let body = String::from_utf8_lossy(&request.body);
    assert!(body.contains("name=\"model\""));
    assert!(body.contains("whisper-1"));
    assert!(body.contains("name=\"response_format\""));
    assert!(body.contains("verbose_json"));
    assert!(body.contains("name=\"language\""));
    assert!(body.contains("filename=\"answer.webm\""));
    assert!(body.contains("RIFF-not-really-audio"));
}

#[tokio::test]
async fn error_status_is_bad_output_with_body() {
    let (endpoint, _requests) = spawn_stub(Reply::Respond {
        status: "429 Too Many Requests",
        body: r#"{"error":{"message":"Rate limit reached"}}"#,
    })
    .await;

    let err = backend(endpoint, Duration::from_secs(5))
        .transcribe(upload())
        .await
        .unwrap_err();

    match err {
        ParlanceError::BadOutput { backend, message } => {
            assert_eq!(backend, "remote");
            assert!(message.contains("429"), "{message}");
            assert!(message.contains("Rate limit reached"), "{message}");
        }
        other => panic!("expected BadOutput, got {other:?}"),
    }
}

#[tokio::test]
async fn response_without_text_is_bad_output() {
    let (endpoint, _requests) = spawn_stub(Reply::Respond {
        status: "200 OK",
        body: r#"{"task":"transcribe","duration":1.0}"#,
    })
    .await;

    let err = backend(endpoint, Duration::from_secs(5))
        .transcribe(upload())
        .await
        .unwrap_err();
    assert!(matches!(err, ParlanceError::BadOutput { .. }), "{err:?}");
}

#[tokio::test]
async fn refused_connection_is_unavailable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = backend(
        format!("http://{addr}/v1/audio/transcriptions"),
        Duration::from_secs(5),
    )
    .transcribe(upload())
    .await
    .unwrap_err();

    assert!(matches!(err, ParlanceError::Unavailable { .. }), "{err:?}");
}

#[tokio::test]
async fn hung_server_times_out() {
    let (endpoint, _requests) = spawn_stub(Reply::Hang).await;

    let started = std::time::Instant::now();
    let err = backend(endpoint, Duration::from_millis(500))
        .transcribe(upload())
        .await
        .unwrap_err();

    assert!(matches!(err, ParlanceError::Timeout { .. }), "{err:?}");
    assert!(started.elapsed() < Duration::from_secs(10));
}
