//! Non-fatal errors collected while resolving
//!
//! A [Diagnostics] tree mirrors the block tree: the project at the root, one node per block,
//! instance, nested block and attribute below it. Every pass builds a fresh tree, so only the
//! one returned with the final resolution describes the result.
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// A reference the context could not satisfy. The value is absent.
    UnresolvedReference,
    /// An attribute failed to evaluate or decode. The value is absent.
    AttributeEvaluation,
    /// `for_each` or `count` failed to evaluate. The block produced no instances.
    ForEachEvaluation,
}

impl Display for DiagnosticKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DiagnosticKind::UnresolvedReference => f.write_str("unresolved reference"),
            DiagnosticKind::AttributeEvaluation => f.write_str("attribute evaluation error"),
            DiagnosticKind::ForEachEvaluation => f.write_str("for_each evaluation error"),
        }
    }
}

#[derive(derive_new::new, Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostics {
    pub name: String,
    pub category: &'static str,
    pub errors: Vec<Diagnostic>,
    pub children: Vec<Diagnostics>,
}

impl Diagnostics {
    pub fn new(name: impl Into<String>, category: &'static str) -> Self {
        Self {
            name: name.into(),
            category,
            errors: vec![],
            children: vec![],
        }
    }

    pub fn project() -> Self {
        Self::new("project", "project")
    }

    /// Returns the child with the given name and category, creating it if needed
    pub fn child(&mut self, name: &str, category: &'static str) -> &mut Diagnostics {
        let position = self
            .children
            .iter()
            .position(|child| child.name == name && child.category == category);

        let index = match position {
            Some(index) => index,
            None => {
                self.children.push(Diagnostics::new(name, category));
                self.children.len() - 1
            }
        };

        &mut self.children[index]
    }

    pub fn record(&mut self, kind: DiagnosticKind, message: impl Into<String>) {
        let diagnostic = Diagnostic::new(kind, message.into());
        tracing::trace!(node = %self.name, ?diagnostic, "diagnostic recorded");
        self.errors.push(diagnostic);
    }

    /// Number of diagnostics in this node and all nodes below it
    pub fn count(&self) -> usize {
        self.errors.len() + self.children.iter().map(Diagnostics::count).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Depth-first iteration over `(node path, diagnostic)`
    pub fn iter(&self) -> impl Iterator<Item = (Vec<&str>, &Diagnostic)> {
        let mut collected = vec![];
        self.collect(&mut vec![], &mut collected);
        collected.into_iter()
    }

    fn collect<'a>(
        &'a self,
        path: &mut Vec<&'a str>,
        collected: &mut Vec<(Vec<&'a str>, &'a Diagnostic)>,
    ) {
        path.push(&self.name);
        for error in &self.errors {
            collected.push((path.clone(), error));
        }
        for child in &self.children {
            child.collect(path, collected);
        }
        path.pop();
    }

    fn render(&self, f: &mut Formatter<'_>, depth: usize) -> std::fmt::Result {
        if self.is_empty() {
            return Ok(());
        }

        let indent = "  ".repeat(depth);
        writeln!(f, "{indent}{} {}", self.category, self.name)?;
        for error in &self.errors {
            writeln!(f, "{indent}  - {}: {}", error.kind, error.message)?;
        }
        for child in &self.children {
            child.render(f, depth + 1)?;
        }
        Ok(())
    }
}

/// Renders every node that holds a diagnostic, or has one below it
impl Display for Diagnostics {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.render(f, 0)
    }
}
