use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use anyhow::Context as _;
use serde_json::Value;

pub const STUB_API_KEY: &str = "sk-stub";

#[allow(dead_code)]
#[derive(Debug, Clone, Copy)]
pub enum StubBehavior {
    /// One segment per requested line, speaker taken from a leading `Name:`.
    Segment,
    /// Returns text that is not JSON.
    Malformed,
    /// Responds 500 with an OpenAI-style error body.
    ServerError,
}

pub struct OpenAiStub {
    pub base_url: String,
    requests: Arc<AtomicUsize>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl OpenAiStub {
    pub fn spawn(behavior: StubBehavior) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start openai stub server");
        let addr = server.server_addr();
        let base_url = format!("http://{addr}/v1");

        let requests = Arc::new(AtomicUsize::new(0));
        let counter = requests.clone();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let mut request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let path = request.url().to_string();
                if request.method() != &tiny_http::Method::Post || path != "/v1/chat/completions" {
                    let _ = request.respond(
                        tiny_http::Response::from_string("not found").with_status_code(404),
                    );
                    continue;
                }
                counter.fetch_add(1, Ordering::SeqCst);

                let authorized = request.headers().iter().any(|header| {
                    header.field.equiv("Authorization")
                        && header.value.as_str() == format!("Bearer {STUB_API_KEY}")
                });
                if !authorized {
                    let _ = request.respond(json_response(
                        401,
                        &serde_json::json!({ "error": { "message": "Invalid API key" } }),
                    ));
                    continue;
                }

                let mut body = String::new();
                if request.as_reader().read_to_string(&mut body).is_err() {
                    let _ = request.respond(
                        tiny_http::Response::from_string("invalid request body")
                            .with_status_code(400),
                    );
                    continue;
                }

                let parsed: Value = match serde_json::from_str(&body) {
                    Ok(value) => value,
                    Err(_) => {
                        let _ = request.respond(
                            tiny_http::Response::from_string("invalid json").with_status_code(400),
                        );
                        continue;
                    }
                };

                if matches!(behavior, StubBehavior::ServerError) {
                    let _ = request.respond(json_response(
                        500,
                        &serde_json::json!({ "error": { "message": "stub overloaded" } }),
                    ));
                    continue;
                }

                let content = match completion_text(&parsed, behavior) {
                    Ok(text) => text,
                    Err(err) => {
                        let _ = request.respond(
                            tiny_http::Response::from_string(format!("{err:#}"))
                                .with_status_code(400),
                        );
                        continue;
                    }
                };

                let response_body = serde_json::json!({
                    "id": "chatcmpl_stub",
                    "object": "chat.completion",
                    "model": parsed.get("model").cloned().unwrap_or(Value::String("stub-model".to_owned())),
                    "choices": [
                        {
                            "index": 0,
                            "message": { "role": "assistant", "content": content },
                            "finish_reason": "stop"
                        }
                    ],
                    "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 }
                });
                let _ = request.respond(json_response(200, &response_body));
            }
        });

        Self {
            base_url,
            requests,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Chat completion requests received so far.
    #[allow(dead_code)]
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl Drop for OpenAiStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn json_response(status: u16, body: &Value) -> tiny_http::Response<std::io::Cursor<Vec<u8>>> {
    let header = tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
        .expect("build header");
    tiny_http::Response::from_string(body.to_string())
        .with_status_code(status)
        .with_header(header)
}

fn completion_text(request: &Value, behavior: StubBehavior) -> anyhow::Result<String> {
    if matches!(behavior, StubBehavior::Malformed) {
        return Ok("{not valid json".to_owned());
    }

    let messages = request
        .get("messages")
        .and_then(|v| v.as_array())
        .context("missing messages")?;
    let system = messages
        .first()
        .and_then(|m| m.get("content"))
        .and_then(|v| v.as_str())
        .context("missing system message")?;
    let user = messages
        .get(1)
        .and_then(|m| m.get("content"))
        .and_then(|v| v.as_str())
        .context("missing user message")?;

    if system.contains("\"segments\"") {
        segments_response(user)
    } else if system.contains("\"scenarios\"") {
        Ok(serde_json::json!({
            "scenarios": [{
                "index": 0,
                "text": format!("Cenário com {} linhas de narração.", user.lines().count()),
                "location": "Sala de Aula",
                "characters": ["Ye Hong"]
            }]
        })
        .to_string())
    } else {
        anyhow::bail!("unknown prompt mode")
    }
}

fn segments_response(user: &str) -> anyhow::Result<String> {
    let payload: Value = serde_json::from_str(user).context("parse pipeline payload")?;
    let lines = payload
        .get("lines")
        .and_then(|v| v.as_array())
        .context("missing lines array")?;

    let segments = lines
        .iter()
        .map(|line| {
            let text = line.get("text").and_then(|v| v.as_str()).unwrap_or("");
            let (speaker, segment_type, emotion) = match text.split_once(':') {
                Some((name, _)) => (name.trim(), "dialogue", "joy"),
                None => ("Narrador", "narration", "neutral"),
            };
            serde_json::json!({
                "line_number": line.get("line_number").cloned().unwrap_or(Value::Null),
                "segment_index": 0,
                "original_text": text,
                "translated_text": format!("[pt] {text}"),
                "segment_type": segment_type,
                "speaker": speaker,
                "character_type": if speaker == "Narrador" { "narrator" } else { "protagonist" },
                "gender": "unknown",
                "emotion": emotion,
            })
        })
        .collect::<Vec<_>>();

    Ok(serde_json::json!({ "segments": segments }).to_string())
}
