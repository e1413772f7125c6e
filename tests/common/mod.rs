//! Shared fixtures for integration tests: a one-shot mock chat-completion
//! server and small fakes for the pipeline collaborators.

#![allow(dead_code)]

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::sync::mpsc::{self, Receiver};
use std::sync::Mutex;
use std::thread;

use testsmith::config::LlmSettings;

/// What the mock server saw.
#[derive(Debug)]
pub struct CapturedRequest {
    pub headers: Vec<String>,
    pub body: String,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find_map(|h| {
            let (k, v) = h.split_once(':')?;
            k.trim().eq_ignore_ascii_case(name).then(|| v.trim())
        })
    }
}

/// Serves exactly one request with `status` and `body`, then closes.
///
/// Returns the endpoint URL and a receiver for the captured request.
pub fn serve_once(status: u16, body: impl Into<String>) -> (String, Receiver<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let body = body.into();
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        let Ok((stream, _)) = listener.accept() else {
            return;
        };
        let mut reader = BufReader::new(stream.try_clone().unwrap());

        let mut headers = Vec::new();
        let mut content_length = 0usize;
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).unwrap_or(0) == 0 {
                break;
            }
            let line = line.trim_end().to_string();
            if line.is_empty() {
                break;
            }
            if let Some((k, v)) = line.split_once(':') {
                if k.trim().eq_ignore_ascii_case("content-length") {
                    content_length = v.trim().parse().unwrap_or(0);
                }
            }
            headers.push(line);
        }

        let mut buf = vec![0u8; content_length];
        let _ = reader.read_exact(&mut buf);
        let _ = tx.send(CapturedRequest {
            headers,
            body: String::from_utf8_lossy(&buf).into_owned(),
        });

        let reason = match status {
            200 => "OK",
            400 => "Bad Request",
            401 => "Unauthorized",
            500 => "Internal Server Error",
            503 => "Service Unavailable",
            _ => "Unknown",
        };
        let response = format!(
            "HTTP/1.1 {status} {reason}\r\nContent-Type: text/event-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );

        let mut stream = stream;
        let _ = stream.write_all(response.as_bytes());
        let _ = stream.flush();
    });

    (format!("http://{addr}/v1/chat/completions"), rx)
}

pub fn settings_for(endpoint: &str) -> LlmSettings {
    LlmSettings {
        model: "test-model".into(),
        token: "sk-test".into(),
        base_url: Some(endpoint.to_string()),
        timeout_secs: 5,
    }
}

/// Encodes text fragments as a chat-completion event stream ending with a
/// `stop` record.
pub fn sse_body(fragments: &[&str]) -> String {
    let mut out = String::new();
    for fragment in fragments {
        let record = serde_json::json!({
            "choices": [{ "delta": { "content": fragment }, "finish_reason": null }]
        });
        out.push_str(&format!("data: {record}\n\n"));
    }
    let stop = serde_json::json!({
        "choices": [{ "delta": {}, "finish_reason": "stop" }]
    });
    out.push_str(&format!("data: {stop}\n\n"));
    out
}

/// A model reply with two JUnit tests.
pub const TWO_TESTS_REPLY: &str = "```java
package com.acme;

import org.junit.Test;
import static org.junit.Assert.assertEquals;

public class CalcTest {
    @Test
    public void addsNumbers() {
        assertEquals(3, new Calc().add(1, 2));
    }

    @Test
    public void subtractsNumbers() {
        assertEquals(-1, new Calc().sub(1, 2));
    }
}
```";

/// Collects everything sent to it; used as a `ResultStore` spy.
pub struct Recorder<T> {
    pub items: Mutex<Vec<T>>,
}

impl<T> Default for Recorder<T> {
    fn default() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
        }
    }
}

impl<T: Clone> Recorder<T> {
    pub fn push(&self, item: T) {
        self.items.lock().unwrap().push(item);
    }

    pub fn snapshot(&self) -> Vec<T> {
        self.items.lock().unwrap().clone()
    }
}
