//! Grounded answer assembly.
//!
//! Retrieve evidence, render it as numbered context, ask the generator, and
//! make sure the reply cites at least one source when evidence was given.

use anyhow::Result;
use serde::Serialize;

use crate::embedding::Embedder;
use crate::generate::{GenerationParams, Generator};
use crate::models::{RetrievedChunk, SearchRequest};
use crate::search::retrieve;
use crate::store::CorpusStore;

/// Reply used when retrieval finds nothing.
pub const NO_EVIDENCE_ANSWER: &str =
    "I don't have enough information in the indexed documents to answer that.";

/// Maximum characters of a single chunk rendered into the prompt.
const MAX_CONTEXT_CHARS: usize = 2000;

const SYSTEM_PREAMBLE: &str = "Answer the question using only the numbered context below. \
Cite the passages you rely on with their number in square brackets, e.g. [1]. \
If the context does not contain the answer, say so.";

/// A generated answer and the evidence it was grounded on.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<RetrievedChunk>,
}

/// Render the prompt for `query` with numbered evidence.
///
/// Each entry reads `[i] (score=0.873) path#page=P :: content`, with content
/// collapsed to one line and capped at a fixed length.
pub fn build_prompt(query: &str, evidence: &[RetrievedChunk]) -> String {
    let mut prompt = String::new();
    prompt.push_str(SYSTEM_PREAMBLE);
    prompt.push_str("\n\nContext:\n");
    for (i, chunk) in evidence.iter().enumerate() {
        prompt.push_str(&format!(
            "[{}] (score={:.3}) {}#page={} :: {}\n",
            i + 1,
            chunk.score,
            chunk.path,
            chunk.page,
            sanitize(&chunk.content)
        ));
    }
    prompt.push_str("\nQuestion: ");
    prompt.push_str(query.trim());
    prompt.push_str("\nAnswer:");
    prompt
}

fn sanitize(content: &str) -> String {
    let flat = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= MAX_CONTEXT_CHARS {
        flat
    } else {
        let mut cut: String = flat.chars().take(MAX_CONTEXT_CHARS).collect();
        cut.push('…');
        cut
    }
}

/// Append a `[1]` citation if evidence exists and the text cites nothing.
pub fn ensure_citations(text: &str, has_evidence: bool) -> String {
    let text = text.trim_end();
    if !has_evidence || has_citation(text) {
        return text.to_string();
    }
    format!("{} [1]", text)
}

fn has_citation(text: &str) -> bool {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'[' {
            let digits = bytes[i + 1..].iter().take_while(|b| b.is_ascii_digit()).count();
            if digits > 0 && bytes.get(i + 1 + digits) == Some(&b']') {
                return true;
            }
        }
        i += 1;
    }
    false
}

/// Answer `query` from the corpus.
///
/// With no retrieved evidence the generator is never called and
/// [`NO_EVIDENCE_ANSWER`] is returned.
pub async fn answer(
    store: &dyn CorpusStore,
    embedder: &dyn Embedder,
    generator: &dyn Generator,
    query: &str,
    request: &SearchRequest,
    params: &GenerationParams,
) -> Result<Answer> {
    let sources = retrieve(store, embedder, query, request).await?;
    if sources.is_empty() {
        return Ok(Answer {
            text: NO_EVIDENCE_ANSWER.to_string(),
            sources,
        });
    }

    let prompt = build_prompt(query, &sources);
    let raw = generator.generate(&prompt, params).await?;
    Ok(Answer {
        text: ensure_citations(&raw, true),
        sources,
    })
}
