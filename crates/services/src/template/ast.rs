//! Template syntax tree.
//!
//! A [`Template`] is immutable once parsed. `Display` renders the canonical
//! source form, which parses back to an equal tree.

use std::fmt;

/// Reference to one of the invocation arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArgRef {
    /// 1-based position.
    Positional(usize),
    /// Parsed for forward compatibility; renders as empty text.
    Named(String),
}

impl fmt::Display for ArgRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgRef::Positional(n) => write!(f, "arg{n}"),
            ArgRef::Named(name) => write!(f, "arg:{name}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookupKind {
    /// Active warning count.
    Warnings,
    Muted,
    Banned,
    /// Active warn/mute/ban count.
    Active,
}

impl LookupKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LookupKind::Warnings => "warnings",
            LookupKind::Muted => "muted",
            LookupKind::Banned => "banned",
            LookupKind::Active => "active",
        }
    }

    pub(crate) fn from_name(name: &str) -> Option<Self> {
        match name {
            "warnings" => Some(LookupKind::Warnings),
            "muted" => Some(LookupKind::Muted),
            "banned" => Some(LookupKind::Banned),
            "active" => Some(LookupKind::Active),
            _ => None,
        }
    }
}

/// Whose moderation record a lookup reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subject {
    Invoker,
    /// The user named by positional argument N.
    Arg(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModLookup {
    pub kind: LookupKind,
    pub subject: Subject,
}

impl fmt::Display for ModLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mod:{}", self.kind.as_str())?;
        if let Subject::Arg(n) = self.subject {
            write!(f, " arg{n}")?;
        }
        Ok(())
    }
}

/// Condition of an `{if}`. Deliberately a single reference, no operators.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Predicate {
    ArgPresent(ArgRef),
    Moderation(ModLookup),
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::ArgPresent(arg) => arg.fmt(f),
            Predicate::Moderation(lookup) => lookup.fmt(f),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Node {
    Literal(String),
    Arg(ArgRef),
    Conditional {
        predicate: Predicate,
        then_branch: Vec<Node>,
        else_branch: Option<Vec<Node>>,
    },
    Moderation(ModLookup),
}

/// A compiled tag body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Template {
    pub(crate) nodes: Vec<Node>,
}

/// Structural size of a template, checked before evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TemplateStats {
    pub depth: usize,
    pub nodes: usize,
}

impl Template {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn stats(&self) -> TemplateStats {
        let mut stats = TemplateStats::default();
        collect_stats(&self.nodes, 1, &mut stats);
        stats
    }

    /// Every moderation lookup in the tree, including those in predicates.
    pub fn lookups(&self) -> Vec<ModLookup> {
        let mut out = Vec::new();
        collect_lookups(&self.nodes, &mut out);
        out
    }

    /// Highest positional argument referenced anywhere.
    pub fn arity(&self) -> usize {
        fn walk(nodes: &[Node]) -> usize {
            nodes
                .iter()
                .map(|node| match node {
                    Node::Arg(ArgRef::Positional(n)) => *n,
                    Node::Moderation(ModLookup { subject: Subject::Arg(n), .. }) => *n,
                    Node::Conditional { predicate, then_branch, else_branch } => {
                        let own = match predicate {
                            Predicate::ArgPresent(ArgRef::Positional(n)) => *n,
                            Predicate::Moderation(ModLookup { subject: Subject::Arg(n), .. }) => *n,
                            _ => 0,
                        };
                        own.max(walk(then_branch))
                            .max(else_branch.as_deref().map(walk).unwrap_or(0))
                    }
                    _ => 0,
                })
                .max()
                .unwrap_or(0)
        }
        walk(&self.nodes)
    }
}

fn collect_stats(nodes: &[Node], depth: usize, stats: &mut TemplateStats) {
    if nodes.is_empty() {
        return;
    }
    stats.depth = stats.depth.max(depth);
    for node in nodes {
        stats.nodes += 1;
        if let Node::Conditional { then_branch, else_branch, .. } = node {
            collect_stats(then_branch, depth + 1, stats);
            if let Some(branch) = else_branch {
                collect_stats(branch, depth + 1, stats);
            }
        }
    }
}

fn collect_lookups(nodes: &[Node], out: &mut Vec<ModLookup>) {
    for node in nodes {
        match node {
            Node::Moderation(lookup) => out.push(*lookup),
            Node::Conditional { predicate, then_branch, else_branch } => {
                if let Predicate::Moderation(lookup) = predicate {
                    out.push(*lookup);
                }
                collect_lookups(then_branch, out);
                if let Some(branch) = else_branch {
                    collect_lookups(branch, out);
                }
            }
            Node::Literal(_) | Node::Arg(_) => {}
        }
    }
}

fn write_escaped(f: &mut fmt::Formatter<'_>, text: &str) -> fmt::Result {
    for c in text.chars() {
        match c {
            '{' | '}' | '\\' => write!(f, "\\{c}")?,
            _ => write!(f, "{c}")?,
        }
    }
    Ok(())
}

fn write_nodes(f: &mut fmt::Formatter<'_>, nodes: &[Node]) -> fmt::Result {
    for node in nodes {
        match node {
            Node::Literal(text) => write_escaped(f, text)?,
            Node::Arg(arg) => write!(f, "{{{arg}}}")?,
            Node::Moderation(lookup) => write!(f, "{{{lookup}}}")?,
            Node::Conditional { predicate, then_branch, else_branch } => {
                write!(f, "{{if {predicate}}}")?;
                write_nodes(f, then_branch)?;
                if let Some(branch) = else_branch {
                    f.write_str("{else}")?;
                    write_nodes(f, branch)?;
                }
                f.write_str("{endif}")?;
            }
        }
    }
    Ok(())
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_nodes(f, &self.nodes)
    }
}
