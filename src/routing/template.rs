//! URL path template parsing.
//!
//! # Responsibilities
//! - Parse `/v1/{name=shelves/*}/books/**:verb` style templates
//! - Record the segment span captured by each variable
//! - Render a canonical form and a route regex for the data plane
//!
//! # Design Decisions
//! - `{x}` is stored exactly like `{x=*}`
//! - Only literal segments may follow `**`; variables spanning `**` are
//!   measured from the end of the request path
//! - Hand-written recursive descent, no regex

use std::fmt;

use thiserror::Error;

/// One path segment of a template.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Literal(String),
    /// `*`: exactly one segment.
    Single,
    /// `**`: zero or more segments.
    Multi,
}

impl Segment {
    pub fn as_str(&self) -> &str {
        match self {
            Segment::Literal(s) => s,
            Segment::Single => "*",
            Segment::Multi => "**",
        }
    }
}

/// A named capture over a span of template segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    /// Dotted field path split into components, e.g. `["book", "name"]`.
    pub field_path: Vec<String>,
    pub start_segment: usize,
    /// Exclusive end index within the template's segments.
    pub end_segment: usize,
    /// The capture contains `**` and therefore ends relative to the path end.
    pub spans_multi: bool,
}

impl Variable {
    pub fn name(&self) -> String {
        self.field_path.join(".")
    }

    /// Exclusive end index into request parts of length `parts_len`.
    pub(crate) fn request_end(&self, template: &UriTemplate, parts_len: usize) -> usize {
        if self.spans_multi {
            let trailing = template.segments.len() - self.end_segment
                + usize::from(template.verb.is_some());
            parts_len.saturating_sub(trailing)
        } else {
            self.end_segment
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("template must start with '/'")]
    MissingLeadingSlash,

    #[error("unexpected end of template")]
    UnexpectedEnd,

    #[error("unexpected '{found}' at position {position}")]
    UnexpectedChar { found: char, position: usize },

    #[error("empty literal at position {position}")]
    EmptyLiteral { position: usize },

    #[error("empty field name at position {position}")]
    EmptyIdentifier { position: usize },

    #[error("nested variable at position {position}")]
    NestedVariable { position: usize },

    #[error("only literal segments may follow '**'")]
    SegmentAfterMultiWildcard,

    #[error("variable '{0}' is bound more than once")]
    DuplicateVariable(String),
}

/// A parsed path template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriTemplate {
    segments: Vec<Segment>,
    verb: Option<String>,
    variables: Vec<Variable>,
}

impl UriTemplate {
    pub fn parse(input: &str) -> Result<Self, TemplateError> {
        Parser::new(input).parse()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn verb(&self) -> Option<&str> {
        self.verb.as_deref()
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn has_variables(&self) -> bool {
        !self.variables.is_empty()
    }

    /// Canonical form, e.g. `/v1/shelves/{shelf=*}:verb`.
    pub fn normalized(&self) -> String {
        self.to_string()
    }

    /// Shape of the template with variable names erased, e.g. `/v1/*:verb`.
    /// Two templates with the same shape match exactly the same paths.
    pub fn match_key(&self) -> String {
        let mut key = String::from("/");
        let parts: Vec<&str> = self.segments.iter().map(Segment::as_str).collect();
        key.push_str(&parts.join("/"));
        if let Some(verb) = &self.verb {
            key.push(':');
            key.push_str(verb);
        }
        key
    }

    /// Anchored regex matching the same request paths.
    pub fn to_regex(&self) -> String {
        if self.segments.is_empty() {
            return "^/$".to_string();
        }
        let mut out = String::from("^");
        for segment in &self.segments {
            match segment {
                Segment::Literal(lit) => {
                    out.push_str("\\/");
                    out.push_str(&escape_regex(lit));
                }
                Segment::Single => out.push_str("\\/[^\\/]+"),
                Segment::Multi => out.push_str("(\\/.*)?"),
            }
        }
        if let Some(verb) = &self.verb {
            out.push(':');
            out.push_str(&escape_regex(verb));
        }
        out.push_str("\\/?$");
        out
    }
}

impl fmt::Display for UriTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        let mut i = 0;
        while i < self.segments.len() {
            f.write_str("/")?;
            match self.variables.iter().find(|v| v.start_segment == i) {
                Some(var) => {
                    let inner: Vec<&str> = self.segments[var.start_segment..var.end_segment]
                        .iter()
                        .map(Segment::as_str)
                        .collect();
                    write!(f, "{{{}={}}}", var.name(), inner.join("/"))?;
                    i = var.end_segment.max(i + 1);
                }
                None => {
                    f.write_str(self.segments[i].as_str())?;
                    i += 1;
                }
            }
        }
        if let Some(verb) = &self.verb {
            write!(f, ":{}", verb)?;
        }
        Ok(())
    }
}

fn escape_regex(literal: &str) -> String {
    let mut out = String::with_capacity(literal.len());
    for c in literal.chars() {
        if "\\.+*?()|[]{}^$/".contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    segments: Vec<Segment>,
    variables: Vec<Variable>,
    in_variable: bool,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            segments: Vec::new(),
            variables: Vec::new(),
            in_variable: false,
        }
    }

    fn parse(mut self) -> Result<UriTemplate, TemplateError> {
        if self.input == "/" {
            return Ok(UriTemplate { segments: Vec::new(), verb: None, variables: Vec::new() });
        }
        if !self.input.starts_with('/') {
            return Err(TemplateError::MissingLeadingSlash);
        }
        self.pos = 1;
        self.parse_segments()?;

        let mut verb = None;
        if self.peek() == Some(':') {
            self.pos += 1;
            verb = Some(self.parse_literal()?);
        }
        if let Some(found) = self.peek() {
            return Err(TemplateError::UnexpectedChar { found, position: self.pos });
        }

        if let Some(multi) = self.segments.iter().position(|s| *s == Segment::Multi) {
            let tail_is_literal = self.segments[multi + 1..]
                .iter()
                .all(|s| matches!(s, Segment::Literal(_)));
            if !tail_is_literal {
                return Err(TemplateError::SegmentAfterMultiWildcard);
            }
        }

        Ok(UriTemplate { segments: self.segments, verb, variables: self.variables })
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn expect(&mut self, expected: char) -> Result<(), TemplateError> {
        match self.peek() {
            Some(c) if c == expected => {
                self.pos += c.len_utf8();
                Ok(())
            }
            Some(found) => Err(TemplateError::UnexpectedChar { found, position: self.pos }),
            None => Err(TemplateError::UnexpectedEnd),
        }
    }

    fn parse_segments(&mut self) -> Result<(), TemplateError> {
        self.parse_segment()?;
        while self.peek() == Some('/') {
            self.pos += 1;
            self.parse_segment()?;
        }
        Ok(())
    }

    fn parse_segment(&mut self) -> Result<(), TemplateError> {
        match self.peek() {
            Some('*') => {
                self.pos += 1;
                if self.peek() == Some('*') {
                    self.pos += 1;
                    self.segments.push(Segment::Multi);
                } else {
                    self.segments.push(Segment::Single);
                }
                Ok(())
            }
            Some('{') => self.parse_variable(),
            Some(_) => {
                let literal = self.parse_literal()?;
                self.segments.push(Segment::Literal(literal));
                Ok(())
            }
            None => Err(TemplateError::UnexpectedEnd),
        }
    }

    fn parse_variable(&mut self) -> Result<(), TemplateError> {
        if self.in_variable {
            return Err(TemplateError::NestedVariable { position: self.pos });
        }
        self.expect('{')?;
        let field_path = self.parse_field_path()?;
        let start_segment = self.segments.len();

        self.in_variable = true;
        if self.peek() == Some('=') {
            self.pos += 1;
            self.parse_segments()?;
        } else {
            self.segments.push(Segment::Single);
        }
        self.in_variable = false;
        self.expect('}')?;

        let end_segment = self.segments.len();
        let var = Variable {
            spans_multi: self.segments[start_segment..].contains(&Segment::Multi),
            field_path,
            start_segment,
            end_segment,
        };
        if self.variables.iter().any(|v| v.field_path == var.field_path) {
            return Err(TemplateError::DuplicateVariable(var.name()));
        }
        self.variables.push(var);
        Ok(())
    }

    fn parse_field_path(&mut self) -> Result<Vec<String>, TemplateError> {
        let mut path = vec![self.parse_identifier()?];
        while self.peek() == Some('.') {
            self.pos += 1;
            path.push(self.parse_identifier()?);
        }
        Ok(path)
    }

    fn parse_identifier(&mut self) -> Result<String, TemplateError> {
        self.take_until(|c| matches!(c, '.' | '=' | '}' | '{' | '/' | ':' | '*'))
            .map_err(|position| TemplateError::EmptyIdentifier { position })
    }

    fn parse_literal(&mut self) -> Result<String, TemplateError> {
        self.take_until(|c| matches!(c, '/' | ':' | '{' | '}' | '*'))
            .map_err(|position| TemplateError::EmptyLiteral { position })
    }

    /// Consumes a non-empty run of characters; returns the start position on empty.
    fn take_until(&mut self, stop: impl Fn(char) -> bool) -> Result<String, usize> {
        let start = self.pos;
        let rest = &self.input[start..];
        let len = rest.find(|c: char| stop(c)).unwrap_or(rest.len());
        if len == 0 {
            return Err(start);
        }
        self.pos += len;
        Ok(rest[..len].to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(s: &str) -> Segment {
        Segment::Literal(s.to_string())
    }

    #[test]
    fn test_parse_root() {
        let t = UriTemplate::parse("/").unwrap();
        assert!(t.segments().is_empty());
        assert_eq!(t.normalized(), "/");
    }

    #[test]
    fn test_parse_literals_and_variable() {
        let t = UriTemplate::parse("/v1/shelves/{shelf}").unwrap();
        assert_eq!(t.segments(), &[lit("v1"), lit("shelves"), Segment::Single]);
        assert_eq!(t.variables().len(), 1);
        let v = &t.variables()[0];
        assert_eq!(v.field_path, vec!["shelf"]);
        assert_eq!((v.start_segment, v.end_segment), (2, 3));
        assert_eq!(t.normalized(), "/v1/shelves/{shelf=*}");
    }

    #[test]
    fn test_parse_nested_field_path_and_span() {
        let t = UriTemplate::parse("/v1/{book.name=shelves/*/books/*}").unwrap();
        let v = &t.variables()[0];
        assert_eq!(v.field_path, vec!["book", "name"]);
        assert_eq!((v.start_segment, v.end_segment), (1, 5));
        assert!(!v.spans_multi);
    }

    #[test]
    fn test_parse_custom_verb() {
        let t = UriTemplate::parse("/v1/shelves/{shelf}:registeredCustomVerb").unwrap();
        assert_eq!(t.verb(), Some("registeredCustomVerb"));
        assert_eq!(t.normalized(), "/v1/shelves/{shelf=*}:registeredCustomVerb");
    }

    #[test]
    fn test_multi_wildcard_variable_counts_from_end() {
        let t = UriTemplate::parse("/v1/{name=**}/edit:run").unwrap();
        let v = &t.variables()[0];
        assert!(v.spans_multi);
        // parts: v1 a b c edit run
        assert_eq!(v.request_end(&t, 6), 4);
    }

    #[test]
    fn test_only_literals_after_multi() {
        assert_eq!(
            UriTemplate::parse("/a/**/*").unwrap_err(),
            TemplateError::SegmentAfterMultiWildcard
        );
        assert!(UriTemplate::parse("/a/**/b/c").is_ok());
    }

    #[test]
    fn test_rejects_malformed_templates() {
        assert_eq!(UriTemplate::parse("v1").unwrap_err(), TemplateError::MissingLeadingSlash);
        assert!(matches!(
            UriTemplate::parse("/v1/{a={b}}").unwrap_err(),
            TemplateError::NestedVariable { .. }
        ));
        assert!(matches!(
            UriTemplate::parse("/v1//x").unwrap_err(),
            TemplateError::EmptyLiteral { .. }
        ));
        assert!(matches!(
            UriTemplate::parse("/v1/{}").unwrap_err(),
            TemplateError::EmptyIdentifier { .. }
        ));
        assert_eq!(UriTemplate::parse("/v1/{a").unwrap_err(), TemplateError::UnexpectedEnd);
        assert!(matches!(
            UriTemplate::parse("/v1:a:b").unwrap_err(),
            TemplateError::UnexpectedChar { found: ':', .. }
        ));
    }

    #[test]
    fn test_duplicate_variable_names() {
        assert_eq!(
            UriTemplate::parse("/v1/{id}/x/{id}").unwrap_err(),
            TemplateError::DuplicateVariable("id".into())
        );
    }

    #[test]
    fn test_regex_rendering() {
        let t = UriTemplate::parse("/v1.0/{id}/**").unwrap();
        assert_eq!(t.to_regex(), "^\\/v1\\.0\\/[^\\/]+(\\/.*)?\\/?$");
        assert_eq!(UriTemplate::parse("/").unwrap().to_regex(), "^/$");
    }
}
