//! README parsing
//!
//! An article README is rendered to HTML with pulldown-cmark, then scanned in
//! document order for `<span id="...">` anchors. Anchors whose id starts with
//! `question` become questions; anchors starting with `example` become
//! examples paired with the next `<code>` element. Raw HTML comments are
//! dropped before the scan.
//!
//! # Example
//!
//! ```
//! use askci::services::readme::ReadmeParser;
//!
//! let parser = ReadmeParser::new().unwrap();
//! let parsed = parser.parse_readme("<span id=\"question-what-is-mpi\"></span>\n\nMPI is...");
//! assert_eq!(parsed.questions, vec!["question-what-is-mpi".to_string()]);
//! ```

use pulldown_cmark::{html, Options, Parser};
use regex::Regex;
use std::collections::HashSet;

/// Span id prefixes that carry structured content
pub const SUPPORTED_PREFIXES: &[&str] = &["question", "example"];

/// A parsed example: the span id and the code that follows it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedExample {
    pub text: String,
    pub code: String,
}

/// Result of parsing a README
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedReadme {
    /// Rendered README
    pub html: String,
    /// Question span ids, first-seen order, without duplicates
    pub questions: Vec<String>,
    /// Examples, first-seen order, without duplicates
    pub examples: Vec<ParsedExample>,
}

/// A `<span>` or `<code>` element of the rendered README, in document order
#[derive(Debug)]
enum Element {
    Span { id: Option<String> },
    Code { code: String, has_language: bool },
}

/// Why a span id is not used
#[derive(Debug, PartialEq, Eq)]
enum SpanId {
    /// Unsupported prefix; skipped silently
    Ignored,
    /// Supported prefix but characters outside `[A-Za-z0-9-]`
    Invalid,
    Question,
    Example,
}

/// README parser holding its compiled patterns
pub struct ReadmeParser {
    comment: Regex,
    element: Regex,
    id_attr: Regex,
    prefix: Regex,
    invalid: Regex,
    tag: Regex,
}

impl ReadmeParser {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            comment: Regex::new(r"(?s)<!--.*?-->")?,
            element: Regex::new(
                r"(?is)<span\b(?P<span>[^>]*)>|(?P<pre><pre>\s*)?<code\b(?P<attrs>[^>]*)>(?P<body>.*?)</code>",
            )?,
            id_attr: Regex::new(r#"(?i)(?:^|\s)id\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#)?,
            prefix: Regex::new(&format!("^({})", SUPPORTED_PREFIXES.join("|")))?,
            invalid: Regex::new(r"[^A-Za-z0-9-]+")?,
            tag: Regex::new(r"<[^>]+>")?,
        })
    }

    /// Render markdown to HTML
    pub fn render(&self, markdown: &str) -> String {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);

        let parser = Parser::new_ext(markdown, options);
        let mut html_output = String::with_capacity(markdown.len() * 3 / 2);
        html::push_html(&mut html_output, parser);
        html_output
    }

    /// Render a README and extract its questions and examples
    pub fn parse_readme(&self, markdown: &str) -> ParsedReadme {
        let html = self.render(markdown);
        let elements = self.elements(&html);

        let mut questions = Vec::new();
        let mut examples: Vec<ParsedExample> = Vec::new();
        let mut seen_questions = HashSet::new();
        let mut waiting: Vec<String> = Vec::new();

        for element in elements {
            match element {
                Element::Span { id: Some(id) } => match self.classify(&id) {
                    SpanId::Question => {
                        if seen_questions.insert(id.clone()) {
                            questions.push(id);
                        }
                    }
                    SpanId::Example => waiting.push(id),
                    SpanId::Ignored | SpanId::Invalid => {}
                },
                Element::Span { id: None } => {}
                Element::Code { code, has_language } => {
                    let code = if has_language { code } else { remove_language(&code) };
                    for text in waiting.drain(..) {
                        let example = ParsedExample {
                            text,
                            code: code.clone(),
                        };
                        if !examples.contains(&example) {
                            examples.push(example);
                        }
                    }
                }
            }
        }

        if !waiting.is_empty() {
            tracing::debug!("Examples without a following code block: {:?}", waiting);
        }

        ParsedReadme {
            html,
            questions,
            examples,
        }
    }

    /// Check user-submitted README content, returning the problem as a
    /// user-facing message
    pub fn test_markdown(&self, markdown: &str) -> Result<(), String> {
        if markdown.trim().is_empty() {
            return Err("The markdown content is empty.".to_string());
        }

        let html = self.render(markdown);
        let mut seen = HashSet::new();
        let mut waiting: Vec<String> = Vec::new();

        for element in self.elements(&html) {
            match element {
                Element::Span { id: Some(id) } => {
                    match self.classify(&id) {
                        SpanId::Ignored => continue,
                        SpanId::Invalid => {
                            return Err(format!(
                                "{} is not a valid identifier: use only letters, numbers and dashes.",
                                id
                            ))
                        }
                        SpanId::Question => {}
                        SpanId::Example => waiting.push(id.clone()),
                    }
                    if !seen.insert(id.clone()) {
                        return Err(format!("{} is used more than once.", id));
                    }
                }
                Element::Span { id: None } => {}
                Element::Code { .. } => waiting.clear(),
            }
        }

        match waiting.first() {
            Some(id) => Err(format!("{} must be followed by a code block.", id)),
            None => Ok(()),
        }
    }

    fn classify(&self, id: &str) -> SpanId {
        if !self.prefix.is_match(id) {
            SpanId::Ignored
        } else if self.invalid.is_match(id) {
            SpanId::Invalid
        } else if id.contains("question") {
            SpanId::Question
        } else {
            SpanId::Example
        }
    }

    fn elements(&self, html: &str) -> Vec<Element> {
        let html = self.comment.replace_all(html, "");
        self.element
            .captures_iter(&html)
            .map(|caps| {
                if let Some(attrs) = caps.name("span") {
                    return Element::Span {
                        id: self.attribute_id(attrs.as_str()),
                    };
                }
                let attrs = caps.name("attrs").map_or("", |m| m.as_str());
                let body = caps.name("body").map_or("", |m| m.as_str());
                let mut code = unescape_html(&self.tag.replace_all(body, ""));
                // block code always ends with the newline closing its last line
                if caps.name("pre").is_some() && code.ends_with('\n') {
                    code.pop();
                }
                Element::Code {
                    code,
                    has_language: attrs.contains("language-"),
                }
            })
            .collect()
    }

    fn attribute_id(&self, attrs: &str) -> Option<String> {
        let caps = self.id_attr.captures(attrs)?;
        let id = caps
            .get(1)
            .or_else(|| caps.get(2))
            .or_else(|| caps.get(3))?
            .as_str();
        if id.is_empty() {
            None
        } else {
            Some(unescape_html(id))
        }
    }
}

/// Drop the first line of multi-line code when it is a single word, which is
/// taken as a language hint
pub fn remove_language(code: &str) -> String {
    let lines: Vec<&str> = code.split('\n').collect();
    if lines.len() > 1 && lines[0].split(' ').count() == 1 {
        return lines[1..].join("\n");
    }
    code.to_string()
}

fn unescape_html(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}
