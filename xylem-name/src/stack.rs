use crate::namespaces::{XMLNS_NAMESPACE, XML_NAMESPACE};

/// One scope's worth of prefix declarations, in declaration order.
type Scope = Vec<(String, String)>;

/// A stack of namespace scopes, one per open element.
///
/// Resolution walks from the innermost scope outward. The `xml` and
/// `xmlns` prefixes are implicitly bound in the outermost scope and may
/// not be rebound.
#[derive(Debug, Clone, Default)]
pub struct NamespaceStack {
    scopes: Vec<Scope>,
}

impl NamespaceStack {
    /// An empty stack with no open scopes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a scope for an element about to be processed.
    pub fn push_scope(&mut self) {
        self.scopes.push(Vec::new());
    }

    /// Close the innermost scope, returning its declarations so the
    /// caller can emit matching end-prefix-mapping events in reverse
    /// declaration order.
    pub fn pop_scope(&mut self) -> Scope {
        self.scopes.pop().unwrap_or_default()
    }

    /// Declare a prefix in the innermost scope. Returns `false` when the
    /// same prefix was already declared in this scope.
    pub fn declare(&mut self, prefix: &str, uri: &str) -> bool {
        let scope = match self.scopes.last_mut() {
            Some(scope) => scope,
            None => {
                self.scopes.push(Vec::new());
                self.scopes.last_mut().unwrap()
            }
        };
        if scope.iter().any(|(p, _)| p == prefix) {
            return false;
        }
        scope.push((prefix.to_string(), uri.to_string()));
        true
    }

    /// Resolve a prefix to its URI. An empty prefix resolves the default
    /// namespace; `None` means undeclared.
    pub fn resolve(&self, prefix: &str) -> Option<&str> {
        match prefix {
            "xml" => return Some(XML_NAMESPACE),
            "xmlns" => return Some(XMLNS_NAMESPACE),
            _ => {}
        }
        for scope in self.scopes.iter().rev() {
            for (p, uri) in scope.iter().rev() {
                if p == prefix {
                    if uri.is_empty() && !prefix.is_empty() {
                        // undeclared via xmlns:p="" (XML Namespaces 1.1)
                        return None;
                    }
                    return Some(uri);
                }
            }
        }
        if prefix.is_empty() {
            // no declaration at all: no default namespace
            Some("")
        } else {
            None
        }
    }

    /// All bindings currently in scope, innermost declaration winning,
    /// including the implicit `xml` binding. The default namespace is
    /// reported under the empty prefix only when non-empty.
    pub fn in_scope(&self) -> Vec<(String, String)> {
        let mut seen: Vec<(String, String)> = Vec::new();
        for scope in self.scopes.iter().rev() {
            for (p, uri) in scope.iter().rev() {
                if !seen.iter().any(|(q, _)| q == p) {
                    seen.push((p.clone(), uri.clone()));
                }
            }
        }
        if !seen.iter().any(|(p, _)| p == "xml") {
            seen.push(("xml".to_string(), XML_NAMESPACE.to_string()));
        }
        seen.retain(|(p, uri)| !uri.is_empty() || p.is_empty());
        seen.retain(|(p, uri)| !(p.is_empty() && uri.is_empty()));
        seen
    }

    /// Declarations of the innermost scope, in declaration order.
    pub fn current_scope(&self) -> &[(String, String)] {
        self.scopes.last().map(|s| s.as_slice()).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_innermost_binding() {
        let mut stack = NamespaceStack::new();
        stack.push_scope();
        stack.declare("p", "outer");
        stack.push_scope();
        stack.declare("p", "inner");
        assert_eq!(stack.resolve("p"), Some("inner"));
        stack.pop_scope();
        assert_eq!(stack.resolve("p"), Some("outer"));
    }

    #[test]
    fn default_namespace_undeclaration() {
        let mut stack = NamespaceStack::new();
        stack.push_scope();
        stack.declare("", "u");
        assert_eq!(stack.resolve(""), Some("u"));
        stack.push_scope();
        stack.declare("", "");
        assert_eq!(stack.resolve(""), Some(""));
    }

    #[test]
    fn duplicate_declaration_in_scope_rejected() {
        let mut stack = NamespaceStack::new();
        stack.push_scope();
        assert!(stack.declare("p", "u"));
        assert!(!stack.declare("p", "v"));
    }

    #[test]
    fn xml_prefix_is_implicit() {
        let stack = NamespaceStack::new();
        assert_eq!(stack.resolve("xml"), Some(XML_NAMESPACE));
    }
}
