//! Error bookkeeping shared by the format walkers.
//!
//! A structure that fails to decode gets an `error` entry on its own node and
//! the walk carries on with its siblings. The first recorded message is also
//! copied to the root so callers see it without searching the tree; any
//! later ones land under `warnings`.

use tracing::{debug, warn};

use crate::error::ProbeError;
use crate::value::Node;

#[derive(Debug, Default)]
pub(crate) struct Diagnostics {
    messages: Vec<String>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error on `node`.
    ///
    /// Truncation and structural failures stop a walk and are logged at
    /// `warn`; anything else only degraded a single node.
    pub fn record(&mut self, node: &mut Node, context: &str, err: &ProbeError) {
        let message = format!("{}: {}", context, err);
        match err {
            ProbeError::Truncated { .. } | ProbeError::MalformedStructure(_) => {
                warn!("{}", message)
            }
            _ => debug!("{}", message),
        }
        node.set("error", message.clone());
        self.messages.push(message);
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Copy the collected messages onto the root node.
    pub fn finish(self, root: &mut Node) {
        let mut messages = self.messages.into_iter();
        if let Some(first) = messages.next() {
            root.set("error", first);
            let rest: Vec<String> = messages.collect();
            if !rest.is_empty() {
                root.set("warnings", rest);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_error_reaches_root() {
        let mut diagnostics = Diagnostics::new();
        let mut child = Node::new();
        diagnostics.record(&mut child, "stsd", &ProbeError::unsupported("v3"));
        diagnostics.record(&mut child, "moov", &ProbeError::malformed("depth"));

        let mut root = Node::new();
        root.insert("width", 1u32);
        diagnostics.finish(&mut root);

        assert_eq!(
            root.get("error").and_then(|v| v.as_str()),
            Some("stsd: Unsupported variant: v3")
        );
        assert_eq!(root.get("warnings").and_then(|v| v.as_list()).map(|l| l.len()), Some(1));
        assert_eq!(root.leaf_count(), 1);
        assert!(child.contains_key("error"));
    }
}
