pub const MODERATION: &str = "\
You screen questions sent to a document assistant. Reply with one JSON object \
and nothing else: {\"verdict\": \"allow\" | \"warn\" | \"reject\", \"reason\": \"...\"}. \
Use \"reject\" only for abusive, harmful or clearly malicious requests. Use \"warn\" \
when the question is acceptable but sensitive, and explain why in the reason.";

pub const CLASSIFICATION: &str = "\
Route the user's question. Reply with one JSON object and nothing else: \
{\"mode\": \"rag\" | \"summary\" | \"general\"}. \
\"rag\": a specific question answerable from the project's documents. \
\"summary\": a request to summarize or give an overview of the documents. \
\"general\": small talk or a question unrelated to the documents.";

pub const GENERATION_RAG: &str = "\
Answer the question using only the numbered context passages. If the context \
does not contain the answer, say so. Reply with one JSON object and nothing \
else: {\"answer\": \"...\"}.";

pub const GENERATION_SUMMARY: &str = "\
Write a concise synthesis of the numbered context passages that addresses the \
user's request. Reply with one JSON object and nothing else: {\"answer\": \"...\"}.";

pub const GENERAL: &str = "\
You are a friendly assistant for a document workspace. Answer conversationally \
and briefly.";

pub const FOLLOWUP: &str = "\
Suggest up to three short follow-up questions the user might ask next. \
Reply with a JSON array of strings and nothing else.";

/// Last-resort answer when every parsing strategy fails.
pub const APOLOGY: &str =
    "Sorry, I could not produce an answer to that question. Please try rephrasing it.";

/// Answer shown when moderation fails and policy rejects by default.
pub const GUARD_UNAVAILABLE: &str =
    "This question could not be screened right now. Please try again later.";

pub const NO_CONTEXT: &str = "(no matching passages were found)";

#[must_use]
pub fn generation_input(question: &str, context: &str) -> String {
    let context = if context.is_empty() { NO_CONTEXT } else { context };
    format!("Context:\n{context}\n\nQuestion: {question}")
}

#[must_use]
pub fn followup_input(question: &str, answer: &str) -> String {
    format!("Question: {question}\n\nAnswer: {answer}")
}
