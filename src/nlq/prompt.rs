//! Prompt templates for Cypher generation and answer composition

use crate::nlq::{NLQError, NLQResult};

/// Instruction used to turn a question into a Cypher statement.
///
/// Fields: `schema`, `question`, `embedding_property`.
pub const CYPHER_GENERATION_TEMPLATE: &str = "Task: Generate a Cypher statement to query a graph database.
Instructions:
Use only the node labels, relationship types and properties listed in the schema.
Do not use any label, relationship type or property that is not listed.
Never return, filter on or otherwise reference the `{embedding_property}` property; it holds embedding vectors.
Schema:
{schema}
Do not include any explanations or apologies in your response.
Do not answer any request other than constructing a Cypher statement.
Respond with the Cypher statement only.

The question is:
{question}";

/// Instruction used to phrase an answer from query results.
///
/// Fields: `context`, `question`.
pub const ANSWER_TEMPLATE: &str = "You are an assistant that turns graph query results into clear, human-readable answers.
The context below holds the records returned for the question. It is authoritative: never doubt it and never correct it with your own knowledge.
Answer directly and confidently, using only the context.
Never mention that the answer comes from provided information, records or context.
If the context is empty, say that you don't know the answer.

Example:
Question: Which state has the maximum number of returns?
Context: [{\"STATE\":\"CA\"},{\"No_of_return\":\"5506120\"}]
Helpful Answer: CA has the maximum number of returns, with 5506120 returns.

Follow this example when writing answers.

Context:
{context}

Question: {question}
Helpful Answer:";

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Text(String),
    Field(String),
}

/// A template with `{name}` placeholders.
///
/// Rendering is a single pass: substituted text is never scanned again, so
/// placeholder-looking text inside a field value stays literal. Braces that do
/// not enclose an identifier (JSON in examples) are plain text.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
}

impl PromptTemplate {
    pub fn parse(template: &str) -> Self {
        let mut segments = Vec::new();
        let mut text = String::new();
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            text.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            match placeholder_name(after) {
                Some(name) => {
                    if !text.is_empty() {
                        segments.push(Segment::Text(std::mem::take(&mut text)));
                    }
                    segments.push(Segment::Field(name.to_string()));
                    rest = &after[name.len() + 1..];
                }
                None => {
                    text.push('{');
                    rest = after;
                }
            }
        }
        text.push_str(rest);
        if !text.is_empty() {
            segments.push(Segment::Text(text));
        }

        Self { segments }
    }

    /// Placeholder names in order of first appearance
    pub fn fields(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for segment in &self.segments {
            if let Segment::Field(name) = segment {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Substitute every placeholder from `values`.
    ///
    /// Fails when a placeholder has no value. Extra values are ignored.
    pub fn render(&self, values: &[(&str, &str)]) -> NLQResult<String> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Field(name) => {
                    let value = values
                        .iter()
                        .find(|(key, _)| *key == name.as_str())
                        .map(|(_, value)| *value)
                        .ok_or_else(|| NLQError::Template(format!("missing value for {{{}}}", name)))?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}

/// Identifier immediately followed by `}` at the start of `s`
fn placeholder_name(s: &str) -> Option<&str> {
    let end = s.find('}')?;
    let name = &s[..end];
    let mut chars = name.chars();
    let first = chars.next()?;
    if (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        Some(name)
    } else {
        None
    }
}
