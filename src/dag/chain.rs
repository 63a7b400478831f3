// src/dag/chain.rs

use std::fmt;
use std::sync::Arc;

use crate::dag::TaskName;
use crate::errors::{ParabuildError, Result};

#[derive(Debug)]
struct Link {
    name: TaskName,
    parent: Option<Arc<Link>>,
}

/// Path of tasks currently being invoked, outermost first.
///
/// Cheap to clone and share with jobs running on other threads: each job
/// extends its own copy.
#[derive(Debug, Clone, Default)]
pub struct InvocationChain {
    head: Option<Arc<Link>>,
}

impl InvocationChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.links().any(|link| link.name == name)
    }

    /// Extend the chain with `name`, failing if that closes a cycle.
    pub fn append(&self, name: &str) -> Result<Self> {
        if self.contains(name) {
            return Err(ParabuildError::CircularDependency(format!(
                "{self} => {name}"
            )));
        }
        Ok(Self {
            head: Some(Arc::new(Link {
                name: name.to_string(),
                parent: self.head.clone(),
            })),
        })
    }

    pub fn depth(&self) -> usize {
        self.links().count()
    }

    fn links(&self) -> impl Iterator<Item = &Link> {
        std::iter::successors(self.head.as_deref(), |link| link.parent.as_deref())
    }
}

impl fmt::Display for InvocationChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.links().map(|link| link.name.as_str()).collect();
        names.reverse();
        f.write_str(&names.join(" => "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_outermost_first() {
        let chain = InvocationChain::new()
            .append("a")
            .and_then(|c| c.append("b"))
            .and_then(|c| c.append("c"))
            .unwrap();
        assert_eq!(chain.to_string(), "a => b => c");
        assert_eq!(chain.depth(), 3);
    }

    #[test]
    fn detects_cycles() {
        let chain = InvocationChain::new()
            .append("a")
            .and_then(|c| c.append("b"))
            .unwrap();

        match chain.append("a") {
            Err(ParabuildError::CircularDependency(msg)) => assert_eq!(msg, "a => b => a"),
            other => panic!("expected CircularDependency, got {other:?}"),
        }
    }

    #[test]
    fn siblings_do_not_see_each_other() {
        let root = InvocationChain::new().append("root").unwrap();
        let left = root.append("x").unwrap();
        let right = root.append("y").unwrap();
        assert!(left.contains("x"));
        assert!(!right.contains("x"));
        assert!(right.append("x").is_ok());
    }
}
