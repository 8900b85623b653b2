//! Streaming question answering (`GenerateFreeFormStreamed`).
//!
//! The stream interleaves "reasoning" fragments with the answer itself. Each
//! `wrb.fr` envelope carries a nested JSON result whose first element is
//! `[text, _, _, _, [.., kind]]`; `kind == 1` (or no kind) marks answer text.
//! The longest answer fragment is the final answer.

use super::codec;
use super::rpc::{RequestIds, post_form};
use crate::auth::TokenAuthority;
use crate::error::Result;
use crate::security::sanitize;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

/// Returned when the stream contained no text at all.
pub const NO_RESPONSE_PLACEHOLDER: &str = "No response received.";

const ANSWER_KIND: i64 = 1;

// Positions inside the nested result.
const IDX_FRAGMENT: usize = 0;
const IDX_FRAGMENT_TEXT: usize = 0;
const IDX_FRAGMENT_KIND: usize = 4;

/// Nesting limit for source and context searches.
const MAX_WALK_DEPTH: usize = 12;

#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub notebook_id: String,
    pub question: String,
    pub source_ids: Vec<String>,
    /// Send the notebook's cached conversation context as history.
    pub follow_up: bool,
    pub conversation_id: Option<String>,
}

impl QueryRequest {
    pub fn new(notebook_id: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            notebook_id: notebook_id.into(),
            question: question.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_sources<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.source_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn follow_up(mut self, follow_up: bool) -> Self {
        self.follow_up = follow_up;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryResult {
    pub answer: String,
    pub sources: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentKind {
    Answer,
    Reasoning,
}

/// Everything pulled out of one streamed response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedStream {
    pub fragments: Vec<(FragmentKind, String)>,
    pub sources: Vec<String>,
    pub context: Option<Value>,
}

impl ParsedStream {
    /// Longest answer fragment, else the longest fragment, else the placeholder.
    pub fn best_answer(&self) -> String {
        let longest = |kind: Option<FragmentKind>| {
            self.fragments
                .iter()
                .filter(|(k, _)| kind.is_none_or(|want| *k == want))
                .map(|(_, text)| text)
                .fold(None::<&String>, |best, text| match best {
                    Some(b) if b.chars().count() >= text.chars().count() => Some(b),
                    _ => Some(text),
                })
        };
        longest(Some(FragmentKind::Answer))
            .or_else(|| longest(None))
            .cloned()
            .unwrap_or_else(|| NO_RESPONSE_PLACEHOLDER.to_string())
    }
}

/// `[sources, question, history, flags, conversationId]`, source ids as `[[id]]`.
pub fn query_params(request: &QueryRequest, history: Option<&Value>) -> Value {
    let sources: Vec<Value> = request
        .source_ids
        .iter()
        .map(|id| json!([[id]]))
        .collect();
    json!([
        sources,
        request.question,
        history.cloned().unwrap_or(Value::Null),
        [2, null, [1]],
        request.conversation_id,
    ])
}

/// `[null, JSON(params)]`.
pub fn query_envelope(params: &Value) -> String {
    json!([null, params.to_string()]).to_string()
}

fn fragment_of(result: &Value) -> Option<(FragmentKind, String)> {
    let fragment = result.get(IDX_FRAGMENT)?;
    let text = fragment.get(IDX_FRAGMENT_TEXT)?.as_str()?;
    if text.is_empty() {
        return None;
    }
    let kind = fragment
        .get(IDX_FRAGMENT_KIND)
        .and_then(Value::as_array)
        .and_then(|meta| meta.last())
        .and_then(Value::as_i64);
    let kind = match kind {
        None | Some(ANSWER_KIND) => FragmentKind::Answer,
        Some(_) => FragmentKind::Reasoning,
    };
    Some((kind, text.to_string()))
}

fn is_source_pair(arr: &[Value]) -> Option<&str> {
    let id = arr.first()?.as_str()?;
    let title = arr.get(1)?.as_str()?;
    if id.is_empty() || id.chars().any(char::is_whitespace) || title.is_empty() {
        return None;
    }
    Some(title)
}

fn collect_sources(value: &Value, depth: usize, out: &mut Vec<String>) {
    let Some(arr) = value.as_array() else {
        return;
    };
    if depth > MAX_WALK_DEPTH {
        return;
    }
    if let Some(title) = is_source_pair(arr) {
        if !out.iter().any(|t| t == title) {
            out.push(title.to_string());
        }
    }
    for child in arr {
        collect_sources(child, depth + 1, out);
    }
}

/// Longest descendant array with more than three elements whose first element
/// is an array. Later candidates win ties.
fn find_context(value: &Value, depth: usize, best: &mut Option<Value>) {
    let Some(arr) = value.as_array() else {
        return;
    };
    if depth > MAX_WALK_DEPTH {
        return;
    }
    for child in arr {
        if let Some(candidate) = child.as_array() {
            let qualifies = candidate.len() > 3 && candidate.first().is_some_and(Value::is_array);
            let longer = best
                .as_ref()
                .and_then(Value::as_array)
                .is_none_or(|b| candidate.len() >= b.len());
            if qualifies && longer {
                *best = Some(child.clone());
            }
        }
        find_context(child, depth + 1, best);
    }
}

/// Decode a streamed query response.
pub fn parse_stream(text: &str) -> ParsedStream {
    let mut parsed = ParsedStream::default();
    let chunks = codec::decode_chunks(text);

    for envelope in codec::envelopes(&chunks) {
        let result = codec::decode_result_field(envelope.get(2));
        if !result.is_array() {
            continue;
        }
        if let Some(fragment) = fragment_of(&result) {
            parsed.fragments.push(fragment);
        }
        collect_sources(&result, 0, &mut parsed.sources);
        find_context(&result, 0, &mut parsed.context);
    }

    if parsed.context.is_none() {
        tracing::debug!(
            chunks = chunks.len(),
            "No conversation context found in query response"
        );
    }
    parsed
}

pub struct QueryClient {
    authority: Arc<TokenAuthority>,
    timeout: Duration,
    reqids: RequestIds,
    /// Last context per notebook, in first-seen order.
    conversations: Mutex<IndexMap<String, Value>>,
}

impl QueryClient {
    pub fn new(authority: Arc<TokenAuthority>, timeout: Duration) -> Self {
        Self {
            authority,
            timeout,
            reqids: RequestIds::new(),
            conversations: Mutex::new(IndexMap::new()),
        }
    }

    pub async fn query(&self, request: &QueryRequest) -> Result<QueryResult> {
        let history = if request.follow_up {
            self.conversations.lock().get(&request.notebook_id).cloned()
        } else {
            None
        };
        let params = query_params(request, history.as_ref());
        let envelope = query_envelope(&params);

        let endpoints = self.authority.endpoints();
        let query = [
            ("bl", endpoints.stream_build_label.clone()),
            ("hl", endpoints.locale.clone()),
            ("_reqid", self.reqids.next().to_string()),
            ("rt", "c".to_string()),
        ];

        tracing::info!(
            notebook_id = %request.notebook_id,
            sources = request.source_ids.len(),
            follow_up = history.is_some(),
            "Sending query"
        );
        let text = post_form(
            &self.authority,
            &endpoints.query_stream_url(),
            &query,
            &envelope,
            self.timeout,
            "Query",
        )
        .await?;

        let parsed = parse_stream(&text);
        let answer = parsed.best_answer();
        if let Some(context) = parsed.context {
            self.conversations
                .lock()
                .insert(request.notebook_id.clone(), context);
        }

        let sanitized = sanitize(&answer);
        Ok(QueryResult {
            answer: sanitized.clean,
            sources: parsed.sources,
            warnings: sanitized.warnings,
        })
    }

    /// Cached context for `notebook_id`, if any.
    pub fn conversation(&self, notebook_id: &str) -> Option<Value> {
        self.conversations.lock().get(notebook_id).cloned()
    }

    pub fn clear_conversation(&self, notebook_id: &str) {
        self.conversations.lock().shift_remove(notebook_id);
    }

    /// Notebooks with a cached context, oldest first.
    pub fn conversation_ids(&self) -> Vec<String> {
        self.conversations.lock().keys().cloned().collect()
    }

    pub fn clear_all(&self) {
        self.conversations.lock().clear();
    }
}
