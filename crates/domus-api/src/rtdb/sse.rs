//! Server-sent event decoding and the client-side mirror of a watched subtree.
//!
//! The database streams `put` and `patch` events whose payload is
//! `{"path": "/relative/path", "data": <json>}`. [`SseDecoder`] turns raw
//! body chunks into events; [`apply_put`] and [`apply_patch`] fold them
//! into a local JSON tree so the watcher can emit the full value at the
//! watched path after every change.

use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::Error;

// ── Events ───────────────────────────────────────────────────────────

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseEvent {
    pub event: String,
    pub data: String,
}

/// Body of `put` / `patch` events.
#[derive(Debug, Deserialize)]
pub(crate) struct StreamPayload {
    pub path: String,
    #[serde(default)]
    pub data: Value,
}

// ── Decoder ──────────────────────────────────────────────────────────

/// Incremental line decoder.
///
/// Buffers bytes, not strings, so a multi-byte character split across
/// two chunks is reassembled before decoding.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buf: Vec<u8>,
    event: Option<String>,
    data: Option<String>,
}

impl SseDecoder {
    /// Feed one body chunk, returning every event it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();

        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = self.process_line(&line) {
                out.push(event);
            }
        }

        out
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_owned()),
            "data" => match &mut self.data {
                Some(data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => self.data = Some(value.to_owned()),
            },
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        let data = self.data.take();
        if event.is_none() && data.is_none() {
            return None;
        }
        Some(SseEvent {
            event: event.unwrap_or_else(|| "message".to_owned()),
            data: data.unwrap_or_default(),
        })
    }
}

/// Adapt a body byte stream into a stream of decoded events.
pub(crate) fn events<S, B>(body: S) -> impl Stream<Item = Result<SseEvent, Error>>
where
    S: Stream<Item = Result<B, reqwest::Error>>,
    B: AsRef<[u8]>,
{
    async_stream::try_stream! {
        let mut decoder = SseDecoder::default();
        futures_util::pin_mut!(body);
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            for event in decoder.push(chunk.as_ref()) {
                yield event;
            }
        }
    }
}

// ── Tree mirror ──────────────────────────────────────────────────────

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Replace the value at `path` (relative to `root`). `null` deletes, and
/// objects left empty by a delete are pruned, matching how the database
/// never stores empty containers.
pub(crate) fn apply_put(root: &mut Value, path: &str, data: Value) {
    put_at(root, &segments(path), data);
}

/// Merge each child of `data` under `path`.
pub(crate) fn apply_patch(root: &mut Value, path: &str, data: Value) -> Result<(), Error> {
    let Value::Object(children) = data else {
        return Err(Error::Stream(format!("patch at {path} is not an object")));
    };
    let base = segments(path);
    for (key, value) in children {
        let mut segs = base.clone();
        segs.extend(key.split('/').filter(|s| !s.is_empty()));
        put_at(root, &segs, value);
    }
    Ok(())
}

fn put_at(node: &mut Value, segs: &[&str], data: Value) {
    let Some((head, rest)) = segs.split_first() else {
        *node = data;
        return;
    };

    if !node.is_object() {
        if data.is_null() {
            return;
        }
        *node = Value::Object(Map::new());
    }
    let Value::Object(map) = node else {
        return;
    };

    let child = map.entry((*head).to_owned()).or_insert(Value::Null);
    put_at(child, rest, data);
    if child.is_null() || child.as_object().is_some_and(Map::is_empty) {
        map.remove(*head);
    }
    if map.is_empty() {
        *node = Value::Null;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn decodes_a_put_event() {
        let mut dec = SseDecoder::default();
        let events = dec.push(b"event: put\ndata: {\"path\":\"/\",\"data\":1}\n\n");
        assert_eq!(
            events,
            vec![SseEvent {
                event: "put".into(),
                data: r#"{"path":"/","data":1}"#.into(),
            }]
        );
    }

    #[test]
    fn reassembles_events_split_across_chunks() {
        let mut dec = SseDecoder::default();
        assert!(dec.push(b"event: pa").is_empty());
        assert!(dec.push(b"tch\r\ndata: {}\r").is_empty());
        let events = dec.push(b"\n\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "patch");
        assert_eq!(events[0].data, "{}");
    }

    #[test]
    fn multibyte_character_split_between_chunks() {
        let mut dec = SseDecoder::default();
        let payload = "data: caf\u{e9}\n\n".as_bytes();
        let split = payload.len() - 3;
        assert!(dec.push(&payload[..split]).is_empty());
        let events = dec.push(&payload[split..]);
        assert_eq!(events[0].data, "caf\u{e9}");
        assert_eq!(events[0].event, "message");
    }

    #[test]
    fn comments_and_keep_alives_are_handled() {
        let mut dec = SseDecoder::default();
        let events = dec.push(b": ping\n\nevent: keep-alive\ndata: null\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "keep-alive");
    }

    #[test]
    fn put_at_root_replaces_everything() {
        let mut root = json!({"a": 1});
        apply_put(&mut root, "/", json!({"b": 2}));
        assert_eq!(root, json!({"b": 2}));
    }

    #[test]
    fn nested_put_creates_parents() {
        let mut root = Value::Null;
        apply_put(&mut root, "/x/y", json!(true));
        assert_eq!(root, json!({"x": {"y": true}}));
    }

    #[test]
    fn null_put_prunes_empty_parents() {
        let mut root = json!({"x": {"y": 1}, "z": 2});
        apply_put(&mut root, "/x/y", Value::Null);
        assert_eq!(root, json!({"z": 2}));
        apply_put(&mut root, "/z", Value::Null);
        assert_eq!(root, Value::Null);
    }

    #[test]
    fn patch_merges_children() {
        let mut root = json!({"cmdId": "a", "value": 0});
        apply_patch(&mut root, "/", json!({"value": 1, "extra/deep": "x"})).unwrap();
        assert_eq!(
            root,
            json!({"cmdId": "a", "value": 1, "extra": {"deep": "x"}})
        );
    }

    #[test]
    fn patch_rejects_non_objects() {
        let mut root = Value::Null;
        assert!(apply_patch(&mut root, "/", json!(3)).is_err());
    }
}
