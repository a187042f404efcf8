use log::warn;
use serde::Deserialize;

#[derive(Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    error: Option<StreamError>,
}

/// In-band failure some providers send as a data frame after a 200 status.
#[derive(Deserialize)]
#[serde(untagged)]
enum StreamError {
    Detailed { message: String },
    Plain(String),
    Other(serde_json::Value),
}

impl StreamError {
    fn into_message(self) -> String {
        match self {
            StreamError::Detailed { message } | StreamError::Plain(message) => message,
            StreamError::Other(value) => value.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
    #[serde(rename = "finish_reason")]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct Delta {
    content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Delta(String),
    Done,
    /// The upstream reported a failure or sent a frame that cannot be decoded.
    /// Nothing after it is decoded.
    Error(String),
}

/// Turns raw body bytes of a chat-completions stream into content deltas.
/// Lines may be split across network reads; partial lines wait for the rest.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        let mut events = Vec::new();
        if self.done {
            return events;
        }
        self.pending.extend_from_slice(bytes);

        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            self.decode_line(line.trim_end_matches(&['\r', '\n'][..]), &mut events);
            if self.done {
                self.pending.clear();
                break;
            }
        }
        events
    }

    /// Flushes a trailing line the upstream sent without a newline.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let mut events = Vec::new();
        if self.done || self.pending.is_empty() {
            return events;
        }
        let rest = std::mem::take(&mut self.pending);
        let line = String::from_utf8_lossy(&rest);
        self.decode_line(line.trim_end_matches('\r'), &mut events);
        events
    }

    fn decode_line(&mut self, line: &str, events: &mut Vec<SseEvent>) {
        let data = match line.strip_prefix("data:") {
            Some(data) => data.trim_start(),
            None => return,
        };
        if data.is_empty() {
            return;
        }
        if data == "[DONE]" {
            self.done = true;
            events.push(SseEvent::Done);
            return;
        }

        match serde_json::from_str::<StreamResponse>(data) {
            Ok(StreamResponse { error: Some(err), .. }) => {
                let message = err.into_message();
                warn!("Upstream reported an error mid-stream: {}", message);
                self.fail(message, events);
            }
            Ok(resp) => {
                for choice in resp.choices {
                    if let Some(content) = choice.delta.content {
                        if !content.is_empty() {
                            events.push(SseEvent::Delta(content));
                        }
                    }
                    if choice.finish_reason.as_deref() == Some("stop") {
                        self.done = true;
                        events.push(SseEvent::Done);
                        return;
                    }
                }
            }
            Err(e) => {
                warn!("Failed to parse stream chunk: {}, error: {}", data, e);
                self.fail(format!("undecodable stream frame: {}", e), events);
            }
        }
    }

    fn fail(&mut self, message: String, events: &mut Vec<SseEvent>) {
        self.done = true;
        events.push(SseEvent::Error(message));
    }
}
