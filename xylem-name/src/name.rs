use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// A qualified XML name.
///
/// Holds a namespace URI (empty for no namespace), a local name, and the
/// prefix the name was written with. Equality and hashing use the
/// *expanded name* only: two names are equal iff their namespace URI and
/// local name are equal, whatever their prefixes.
#[derive(Debug, Clone, Eq)]
pub struct Name {
    namespace: Rc<str>,
    local: Rc<str>,
    prefix: Rc<str>,
}

impl Name {
    /// Create a name in a namespace, without a prefix.
    pub fn new(namespace: &str, local: &str) -> Self {
        Self {
            namespace: namespace.into(),
            local: local.into(),
            prefix: "".into(),
        }
    }

    /// Create a name carrying the prefix it was written with.
    pub fn prefixed(namespace: &str, local: &str, prefix: &str) -> Self {
        Self {
            namespace: namespace.into(),
            local: local.into(),
            prefix: prefix.into(),
        }
    }

    /// Create a name in no namespace.
    pub fn local(local: &str) -> Self {
        Self::new("", local)
    }

    /// The namespace URI; empty string for no namespace.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The local part of the name.
    pub fn local_name(&self) -> &str {
        &self.local
    }

    /// The prefix the name was written with; empty for none.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The lexical qualified form, `prefix:local` or `local`.
    pub fn qualified(&self) -> String {
        if self.prefix.is_empty() {
            self.local.to_string()
        } else {
            format!("{}:{}", self.prefix, self.local)
        }
    }

    /// Render as a Clark name, `{uri}local`, or just `local` outside any
    /// namespace. Used in diagnostics.
    pub fn clark(&self) -> String {
        if self.namespace.is_empty() {
            self.local.to_string()
        } else {
            format!("{{{}}}{}", self.namespace, self.local)
        }
    }

    /// Same expanded name with a different prefix.
    pub fn with_prefix(&self, prefix: &str) -> Self {
        Self {
            namespace: self.namespace.clone(),
            local: self.local.clone(),
            prefix: prefix.into(),
        }
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.namespace == other.namespace && self.local == other.local
    }
}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.namespace.hash(state);
        self.local.hash(state);
    }
}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Name {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (&*self.namespace, &*self.local).cmp(&(&*other.namespace, &*other.local))
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expanded_name_equality_ignores_prefix() {
        let a = Name::prefixed("http://example.com", "doc", "e");
        let b = Name::prefixed("http://example.com", "doc", "ex");
        assert_eq!(a, b);
        assert_ne!(a, Name::local("doc"));
    }

    #[test]
    fn qualified_and_clark_forms() {
        let name = Name::prefixed("http://example.com", "doc", "e");
        assert_eq!(name.qualified(), "e:doc");
        assert_eq!(name.clark(), "{http://example.com}doc");
        assert_eq!(Name::local("doc").clark(), "doc");
    }
}
