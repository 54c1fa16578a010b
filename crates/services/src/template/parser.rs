//! Single-pass compiler from tag body text to [`Template`].
//!
//! Directives are delimited by `{` and `}`. `\{`, `\}` and `\\` produce the
//! literal character; any other backslash is kept as is, and a stray `}` in
//! literal text is literal. Conditionals are tracked on an explicit stack, so
//! deeply nested input cannot exhaust the call stack here.

use domains::{ParseError, ParseErrorKind};

use super::ast::{ArgRef, LookupKind, ModLookup, Node, Predicate, Subject, Template};

struct OpenConditional {
    open_at: usize,
    predicate: Predicate,
    then_branch: Vec<Node>,
    else_branch: Option<Vec<Node>>,
}

impl OpenConditional {
    fn target(&mut self) -> &mut Vec<Node> {
        match self.else_branch {
            Some(ref mut branch) => branch,
            None => &mut self.then_branch,
        }
    }

    fn close(self) -> Node {
        Node::Conditional {
            predicate: self.predicate,
            then_branch: self.then_branch,
            else_branch: self.else_branch,
        }
    }
}

struct Builder {
    root: Vec<Node>,
    open: Vec<OpenConditional>,
    literal: String,
}

impl Builder {
    fn target(&mut self) -> &mut Vec<Node> {
        match self.open.last_mut() {
            Some(frame) => frame.target(),
            None => &mut self.root,
        }
    }

    fn flush_literal(&mut self) {
        if !self.literal.is_empty() {
            let text = std::mem::take(&mut self.literal);
            self.target().push(Node::Literal(text));
        }
    }

    fn push(&mut self, node: Node) {
        self.flush_literal();
        self.target().push(node);
    }
}

enum Directive {
    Node(Node),
    If(Predicate),
    Else,
    EndIf,
}

/// Compiles `source`. Pure; the same input always yields the same result.
pub fn parse(source: &str) -> Result<Template, ParseError> {
    let mut builder = Builder { root: Vec::new(), open: Vec::new(), literal: String::new() };
    let mut chars = source.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            '\\' => match chars.peek() {
                Some(&(_, next @ ('{' | '}' | '\\'))) => {
                    builder.literal.push(next);
                    chars.next();
                }
                _ => builder.literal.push('\\'),
            },
            '{' => {
                let rest = &source[pos + 1..];
                let close = match rest.find(['{', '}']) {
                    Some(idx) if rest.as_bytes()[idx] == b'}' => pos + 1 + idx,
                    _ => return Err(ParseError::new(ParseErrorKind::Unterminated, pos)),
                };
                let body = &source[pos + 1..close];

                match parse_directive(body.trim()).map_err(|kind| ParseError::new(kind, pos))? {
                    Directive::Node(node) => builder.push(node),
                    Directive::If(predicate) => {
                        builder.flush_literal();
                        builder.open.push(OpenConditional {
                            open_at: pos,
                            predicate,
                            then_branch: Vec::new(),
                            else_branch: None,
                        });
                    }
                    Directive::Else => {
                        builder.flush_literal();
                        match builder.open.last_mut() {
                            Some(frame) if frame.else_branch.is_none() => {
                                frame.else_branch = Some(Vec::new());
                            }
                            _ => return Err(ParseError::new(ParseErrorKind::UnexpectedElse, pos)),
                        }
                    }
                    Directive::EndIf => {
                        builder.flush_literal();
                        let frame = builder
                            .open
                            .pop()
                            .ok_or(ParseError::new(ParseErrorKind::UnexpectedEndif, pos))?;
                        builder.target().push(frame.close());
                    }
                }

                while chars.peek().is_some_and(|&(idx, _)| idx <= close) {
                    chars.next();
                }
            }
            _ => builder.literal.push(c),
        }
    }

    if let Some(frame) = builder.open.last() {
        return Err(ParseError::new(ParseErrorKind::Unterminated, frame.open_at));
    }

    builder.flush_literal();
    Ok(Template::new(builder.root))
}

fn parse_directive(body: &str) -> Result<Directive, ParseErrorKind> {
    if body.is_empty() {
        return Err(ParseErrorKind::EmptyDirective);
    }

    match body {
        "else" => return Ok(Directive::Else),
        "endif" => return Ok(Directive::EndIf),
        _ => {}
    }

    if let Some(rest) = body.strip_prefix("if") {
        if rest.is_empty() || rest.starts_with(char::is_whitespace) {
            return parse_predicate(rest.trim()).map(Directive::If);
        }
    }

    if body.starts_with("mod:") {
        return parse_lookup(body).map(|lookup| Directive::Node(Node::Moderation(lookup)));
    }

    if body.starts_with("arg") {
        return parse_arg(body).map(|arg| Directive::Node(Node::Arg(arg)));
    }

    Err(ParseErrorKind::UnknownDirective)
}

fn parse_predicate(text: &str) -> Result<Predicate, ParseErrorKind> {
    if text.starts_with("mod:") {
        return parse_lookup(text)
            .map(Predicate::Moderation)
            .map_err(|_| ParseErrorKind::InvalidPredicate);
    }
    if text.starts_with("arg") {
        return parse_arg(text)
            .map(Predicate::ArgPresent)
            .map_err(|_| ParseErrorKind::InvalidPredicate);
    }
    Err(ParseErrorKind::InvalidPredicate)
}

fn parse_arg(text: &str) -> Result<ArgRef, ParseErrorKind> {
    let rest = text.strip_prefix("arg").ok_or(ParseErrorKind::UnknownDirective)?;

    if let Some(name) = rest.strip_prefix(':') {
        let valid = !name.is_empty()
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        return if valid {
            Ok(ArgRef::Named(name.to_string()))
        } else {
            Err(ParseErrorKind::InvalidArgument)
        };
    }

    if rest.chars().all(|c| c.is_ascii_digit()) {
        return match rest.parse::<usize>() {
            Ok(n) if n >= 1 => Ok(ArgRef::Positional(n)),
            _ => Err(ParseErrorKind::InvalidArgument),
        };
    }

    Err(ParseErrorKind::UnknownDirective)
}

fn parse_lookup(text: &str) -> Result<ModLookup, ParseErrorKind> {
    let rest = text.strip_prefix("mod:").ok_or(ParseErrorKind::UnknownDirective)?;
    let mut parts = rest.split_whitespace();

    let kind = parts
        .next()
        .and_then(LookupKind::from_name)
        .ok_or(ParseErrorKind::UnknownDirective)?;

    let subject = match parts.next() {
        None => Subject::Invoker,
        Some(arg) => match parse_arg(arg) {
            Ok(ArgRef::Positional(n)) => Subject::Arg(n),
            _ => return Err(ParseErrorKind::InvalidArgument),
        },
    };

    if parts.next().is_some() {
        return Err(ParseErrorKind::InvalidArgument);
    }

    Ok(ModLookup { kind, subject })
}
