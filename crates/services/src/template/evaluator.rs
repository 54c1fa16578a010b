//! Interprets a [`Template`] against invocation arguments and a read-only view
//! of moderation state.

use std::collections::HashMap;

use domains::{DomainError, DomainResult, LimitKind};

use super::ast::{ArgRef, LookupKind, ModLookup, Node, Predicate, Template};

/// Bounds on a single evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalLimits {
    /// In characters.
    pub max_output_len: usize,
    pub max_depth: usize,
    pub max_nodes: usize,
}

impl Default for EvalLimits {
    fn default() -> Self {
        Self { max_output_len: 2000, max_depth: 16, max_nodes: 512 }
    }
}

/// Result of a moderation lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupValue {
    Count(usize),
    Flag(bool),
}

impl LookupValue {
    pub fn is_truthy(self) -> bool {
        match self {
            LookupValue::Count(n) => n > 0,
            LookupValue::Flag(flag) => flag,
        }
    }

    pub fn render(self) -> String {
        match self {
            LookupValue::Count(n) => n.to_string(),
            LookupValue::Flag(true) => "yes".to_string(),
            LookupValue::Flag(false) => "no".to_string(),
        }
    }
}

/// Answers moderation lookups during evaluation. Implementations must not
/// mutate anything; the evaluator may ask the same question repeatedly.
pub trait ModerationView {
    fn lookup(&self, lookup: &ModLookup) -> LookupValue;
}

/// Precomputed answers, keyed by lookup. Missing entries read as zero/no.
#[derive(Debug, Clone, Default)]
pub struct LookupTable {
    values: HashMap<ModLookup, LookupValue>,
}

impl LookupTable {
    pub fn insert(&mut self, lookup: ModLookup, value: LookupValue) {
        self.values.insert(lookup, value);
    }
}

impl ModerationView for LookupTable {
    fn lookup(&self, lookup: &ModLookup) -> LookupValue {
        self.values.get(lookup).copied().unwrap_or_else(|| empty_value(lookup.kind))
    }
}

fn empty_value(kind: LookupKind) -> LookupValue {
    match kind {
        LookupKind::Muted | LookupKind::Banned => LookupValue::Flag(false),
        LookupKind::Warnings | LookupKind::Active => LookupValue::Count(0),
    }
}

pub struct EvalContext<'a> {
    pub arguments: &'a [String],
    pub moderation: &'a dyn ModerationView,
}

impl EvalContext<'_> {
    fn argument(&self, arg: &ArgRef) -> Option<&str> {
        match arg {
            ArgRef::Positional(n) => self.arguments.get(n - 1).map(String::as_str),
            ArgRef::Named(_) => None,
        }
    }

    fn holds(&self, predicate: &Predicate) -> bool {
        match predicate {
            Predicate::ArgPresent(arg) => self.argument(arg).is_some_and(|a| !a.is_empty()),
            Predicate::Moderation(lookup) => self.moderation.lookup(lookup).is_truthy(),
        }
    }
}

struct Output {
    text: String,
    chars: usize,
    max: usize,
}

impl Output {
    fn push(&mut self, text: &str) -> DomainResult<()> {
        self.chars += text.chars().count();
        if self.chars > self.max {
            return Err(DomainError::EvaluationLimitExceeded(LimitKind::OutputLength));
        }
        self.text.push_str(text);
        Ok(())
    }
}

/// Renders `template`. Missing arguments render as empty text.
pub fn evaluate(
    template: &Template,
    context: &EvalContext<'_>,
    limits: &EvalLimits,
) -> DomainResult<String> {
    let stats = template.stats();
    if stats.depth > limits.max_depth {
        return Err(DomainError::EvaluationLimitExceeded(LimitKind::Depth));
    }
    if stats.nodes > limits.max_nodes {
        return Err(DomainError::EvaluationLimitExceeded(LimitKind::NodeCount));
    }

    let mut out = Output { text: String::new(), chars: 0, max: limits.max_output_len };
    emit(template.nodes(), context, &mut out)?;
    Ok(out.text)
}

fn emit(nodes: &[Node], context: &EvalContext<'_>, out: &mut Output) -> DomainResult<()> {
    for node in nodes {
        match node {
            Node::Literal(text) => out.push(text)?,
            Node::Arg(arg) => out.push(context.argument(arg).unwrap_or_default())?,
            Node::Moderation(lookup) => out.push(&context.moderation.lookup(lookup).render())?,
            Node::Conditional { predicate, then_branch, else_branch } => {
                if context.holds(predicate) {
                    emit(then_branch, context, out)?;
                } else if let Some(branch) = else_branch {
                    emit(branch, context, out)?;
                }
            }
        }
    }
    Ok(())
}
