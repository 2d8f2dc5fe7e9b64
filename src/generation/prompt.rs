//! Prompt wording, kept apart from the stages that fill it in.
//!
//! Templates use `{name}` placeholders. Unknown placeholders are left untouched so a custom
//! template can contain literal braces.

/// Prompt templates used by the classifier, summarizer, and QA service.
#[derive(Debug, Clone)]
pub struct PromptTemplates {
    /// Placeholders: `{categories}`, `{file_name}`, `{context}`.
    pub classify: String,
    /// Placeholders: `{category}`, `{file_name}`, `{context}`.
    pub summary: String,
    /// Placeholders: `{category}`, `{max_highlights}`, `{context}`.
    pub highlights: String,
    /// Placeholders: `{context}`, `{question}`, `{no_answer}`.
    pub answer: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            classify: "You are a document classifier. Choose exactly one category for the \
document below from this list:\n{categories}\n\nReply with the category name only.\n\n\
File name: {file_name}\n\nDocument excerpt:\n{context}\n\nCategory:"
                .into(),
            summary: "You are summarizing a {category} named {file_name}. Write a summary of \
exactly three paragraphs, each three to four sentences long. Use plain prose, no headings \
and no bullet points.\n\nDocument excerpt:\n{context}\n\nSummary:"
                .into(),
            highlights: "List up to {max_highlights} key highlights of the following {category}. \
Put each highlight on its own line, keep each under twenty words, and do not add any \
introduction.\n\nDocument excerpt:\n{context}\n\nHighlights:"
                .into(),
            answer: "Answer the question using only the context below. The question may use \
different words than the context; treat synonyms and paraphrases as matches. If the context \
does not contain the answer, reply with exactly: {no_answer}\n\nContext:\n{context}\n\n\
Question: {question}\n\nAnswer:"
                .into(),
        }
    }
}

/// Substitute `{name}` placeholders in `template` with the provided values.
pub fn render_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut rendered = template.to_string();
    for (name, value) in values {
        rendered = rendered.replace(&format!("{{{name}}}"), value);
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_replaces_known_placeholders_only() {
        let rendered = render_template(
            "Q: {question} / {unknown}",
            &[("question", "what is beta")],
        );
        assert_eq!(rendered, "Q: what is beta / {unknown}");
    }

    #[test]
    fn default_answer_template_mentions_every_placeholder() {
        let templates = PromptTemplates::default();
        for placeholder in ["{context}", "{question}", "{no_answer}"] {
            assert!(templates.answer.contains(placeholder), "{placeholder}");
        }
    }
}
