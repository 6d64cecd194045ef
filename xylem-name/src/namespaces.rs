use ahash::{HashMap, HashMapExt};

/// The XPath functions namespace, the default function namespace.
pub const FN_NAMESPACE: &str = "http://www.w3.org/2005/xpath-functions";
/// The XML Schema namespace.
pub const XS_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";
/// The reserved `xml` prefix namespace.
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";
/// The reserved `xmlns` namespace.
pub const XMLNS_NAMESPACE: &str = "http://www.w3.org/2000/xmlns/";
/// The XSLT namespace.
pub const XSLT_NAMESPACE: &str = "http://www.w3.org/1999/XSL/Transform";
/// The map function namespace.
pub const MAP_NAMESPACE: &str = "http://www.w3.org/2005/xpath-functions/map";
/// The array function namespace.
pub const ARRAY_NAMESPACE: &str = "http://www.w3.org/2005/xpath-functions/array";
/// The math function namespace.
pub const MATH_NAMESPACE: &str = "http://www.w3.org/2005/xpath-functions/math";

const STATIC_NAMESPACES: [(&str, &str); 6] = [
    ("xs", XS_NAMESPACE),
    ("fn", FN_NAMESPACE),
    ("math", MATH_NAMESPACE),
    ("map", MAP_NAMESPACE),
    ("array", ARRAY_NAMESPACE),
    ("err", "http://www.w3.org/2005/xqt-errors"),
];

/// Statically known namespaces for expression compilation.
///
/// Carries prefix bindings plus the default element and function
/// namespaces. This is the owned counterpart of the in-scope namespaces
/// of the element an expression appears on.
#[derive(Debug, Clone)]
pub struct Namespaces {
    namespaces: HashMap<String, String>,
    default_element_namespace: String,
    default_function_namespace: String,
}

impl Namespaces {
    /// Construct from explicit bindings and defaults.
    pub fn new(
        namespaces: HashMap<String, String>,
        default_element_namespace: &str,
        default_function_namespace: &str,
    ) -> Self {
        Self {
            namespaces,
            default_element_namespace: default_element_namespace.to_string(),
            default_function_namespace: default_function_namespace.to_string(),
        }
    }

    /// The bindings every expression context starts with: `xml` plus the
    /// `xs`/`fn`/`math`/`map`/`array`/`err` prefixes.
    pub fn default_namespaces() -> HashMap<String, String> {
        let mut namespaces = HashMap::new();
        namespaces.insert("xml".to_string(), XML_NAMESPACE.to_string());
        for (prefix, uri) in STATIC_NAMESPACES.into_iter() {
            namespaces.insert(prefix.to_string(), uri.to_string());
        }
        namespaces
    }

    /// Add bindings; an empty prefix sets the default element namespace.
    pub fn add(&mut self, namespace_pairs: &[(&str, &str)]) {
        for (prefix, namespace) in namespace_pairs {
            if prefix.is_empty() {
                self.default_element_namespace = namespace.to_string();
            } else {
                self.namespaces
                    .insert(prefix.to_string(), namespace.to_string());
            }
        }
    }

    /// Look up a prefix.
    #[inline]
    pub fn by_prefix(&self, prefix: &str) -> Option<&str> {
        self.namespaces.get(prefix).map(|s| s.as_str())
    }

    /// The namespace unprefixed element names resolve into.
    #[inline]
    pub fn default_element_namespace(&self) -> &str {
        &self.default_element_namespace
    }

    /// The namespace unprefixed function names resolve into.
    #[inline]
    pub fn default_function_namespace(&self) -> &str {
        &self.default_function_namespace
    }
}

impl Default for Namespaces {
    fn default() -> Self {
        Self::new(Self::default_namespaces(), "", FN_NAMESPACE)
    }
}
