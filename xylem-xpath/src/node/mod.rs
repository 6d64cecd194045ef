//! The buffered node tree.
//!
//! Nodes live in per-document arenas and reference each other by
//! index, so parent links cost nothing to own. A [`NodeId`] is a cheap
//! copyable handle; all navigation goes through [`Documents`], which
//! owns every document built during a run. Document order is a
//! `(major, minor)` key assigned at build time: the major counter
//! follows the pre-order walk and the minor slot orders the namespace
//! and attribute nodes that hang off an element.

mod build;

pub use build::{parse_bytes_into, DocumentBuilder};

use ahash::{HashMap, HashMapExt};
use xylem_name::{Name, XML_NAMESPACE};
use xylem_schema_type::Xs;

use crate::atomic::Atomic;
use crate::error::{Error, Result};

// minor-slot bases: namespaces sort before attributes
const NS_MINOR_BASE: u32 = 1;
const ATTR_MINOR_BASE: u32 = 1 << 16;

/// Identity of a node: document slot plus arena index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    pub(crate) doc: u32,
    pub(crate) index: u32,
}

/// The node kinds of the XPath data model.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// The document root.
    Document,
    /// An element.
    Element {
        /// The element name.
        name: Name,
        /// Arena indexes of the attribute nodes.
        attributes: Vec<u32>,
        /// Prefix declarations written on this element.
        declarations: Vec<(String, String)>,
    },
    /// An attribute.
    Attribute {
        /// The attribute name.
        name: Name,
        /// The attribute value.
        value: String,
    },
    /// A text node.
    Text(String),
    /// A comment.
    Comment(String),
    /// A processing instruction.
    Pi {
        /// The target.
        target: String,
        /// The data.
        data: String,
    },
    /// A namespace node, synthesized from the in-scope bindings.
    Namespace {
        /// The declared prefix (empty for the default namespace).
        prefix: String,
        /// The bound URI.
        uri: String,
    },
}

#[derive(Debug, Clone)]
struct NodeRecord {
    parent: Option<u32>,
    prev_sibling: Option<u32>,
    next_sibling: Option<u32>,
    first_child: Option<u32>,
    last_child: Option<u32>,
    order: (u32, u32),
    kind: NodeKind,
    annotation: Option<Xs>,
}

/// One document's arena.
#[derive(Debug, Default)]
pub struct Document {
    nodes: Vec<NodeRecord>,
    document_uri: Option<String>,
    base_uri: Option<String>,
    ids: HashMap<String, u32>,
    unparsed_entities: HashMap<String, String>,
    namespace_nodes: HashMap<u32, Vec<u32>>,
    order_counter: u32,
}

impl Document {
    fn new() -> Self {
        let mut doc = Document::default();
        doc.nodes.push(NodeRecord {
            parent: None,
            prev_sibling: None,
            next_sibling: None,
            first_child: None,
            last_child: None,
            order: (0, 0),
            kind: NodeKind::Document,
            annotation: None,
        });
        doc.order_counter = 1;
        doc
    }

    fn push_node(&mut self, parent: u32, kind: NodeKind) -> u32 {
        let order = (self.order_counter, 0);
        self.order_counter += 1;
        let index = self.nodes.len() as u32;
        let prev = self.nodes[parent as usize].last_child;
        self.nodes.push(NodeRecord {
            parent: Some(parent),
            prev_sibling: prev,
            next_sibling: None,
            first_child: None,
            last_child: None,
            order,
            kind,
            annotation: None,
        });
        if let Some(prev) = prev {
            self.nodes[prev as usize].next_sibling = Some(index);
        }
        let parent_record = &mut self.nodes[parent as usize];
        if parent_record.first_child.is_none() {
            parent_record.first_child = Some(index);
        }
        parent_record.last_child = Some(index);
        index
    }

    fn push_attribute(&mut self, element: u32, slot: u32, name: Name, value: String) -> u32 {
        let order = (self.nodes[element as usize].order.0, ATTR_MINOR_BASE + slot);
        let index = self.nodes.len() as u32;
        self.nodes.push(NodeRecord {
            parent: Some(element),
            prev_sibling: None,
            next_sibling: None,
            first_child: None,
            last_child: None,
            order,
            kind: NodeKind::Attribute { name, value },
            annotation: None,
        });
        index
    }
}

/// Every document alive in a run.
#[derive(Debug, Default)]
pub struct Documents {
    docs: Vec<Document>,
    by_uri: HashMap<String, u32>,
}

impl Documents {
    /// An empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_document(&mut self, document: Document) -> NodeId {
        let doc = self.docs.len() as u32;
        if let Some(uri) = &document.document_uri {
            self.by_uri.insert(uri.clone(), doc);
        }
        self.docs.push(document);
        NodeId { doc, index: 0 }
    }

    /// The document previously loaded under `uri`, if any.
    pub fn document_by_uri(&self, uri: &str) -> Option<NodeId> {
        self.by_uri.get(uri).map(|doc| NodeId {
            doc: *doc,
            index: 0,
        })
    }

    fn record(&self, id: NodeId) -> &NodeRecord {
        &self.docs[id.doc as usize].nodes[id.index as usize]
    }

    /// The kind of a node.
    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.record(id).kind
    }

    /// The node's name, for the kinds that have one.
    pub fn name(&self, id: NodeId) -> Option<Name> {
        match &self.record(id).kind {
            NodeKind::Element { name, .. } | NodeKind::Attribute { name, .. } => {
                Some(name.clone())
            }
            NodeKind::Pi { target, .. } => Some(Name::local(target)),
            NodeKind::Namespace { prefix, .. } if !prefix.is_empty() => {
                Some(Name::local(prefix))
            }
            _ => None,
        }
    }

    /// Parent node; `None` only for a document root (and detached
    /// namespace nodes' owners are their elements).
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.record(id).parent.map(|index| NodeId {
            doc: id.doc,
            index,
        })
    }

    /// The root of the tree containing this node.
    pub fn root(&self, id: NodeId) -> NodeId {
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            current = parent;
        }
        current
    }

    /// Children in document order.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut next = self.record(id).first_child;
        while let Some(index) = next {
            out.push(NodeId { doc: id.doc, index });
            next = self.docs[id.doc as usize].nodes[index as usize].next_sibling;
        }
        out
    }

    /// Attribute nodes of an element.
    pub fn attributes(&self, id: NodeId) -> Vec<NodeId> {
        match &self.record(id).kind {
            NodeKind::Element { attributes, .. } => attributes
                .iter()
                .map(|index| NodeId {
                    doc: id.doc,
                    index: *index,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Attribute value lookup by expanded name.
    pub fn attribute_value(&self, id: NodeId, name: &Name) -> Option<String> {
        self.attributes(id).into_iter().find_map(|a| {
            match &self.record(a).kind {
                NodeKind::Attribute { name: n, value } if n == name => Some(value.clone()),
                _ => None,
            }
        })
    }

    /// Following sibling nodes in document order.
    pub fn following_siblings(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut next = self.record(id).next_sibling;
        while let Some(index) = next {
            out.push(NodeId { doc: id.doc, index });
            next = self.docs[id.doc as usize].nodes[index as usize].next_sibling;
        }
        out
    }

    /// Preceding sibling nodes, nearest first.
    pub fn preceding_siblings(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut prev = self.record(id).prev_sibling;
        while let Some(index) = prev {
            out.push(NodeId { doc: id.doc, index });
            prev = self.docs[id.doc as usize].nodes[index as usize].prev_sibling;
        }
        out
    }

    /// Descendants in document order, excluding attributes and
    /// namespaces.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id);
        stack.reverse();
        while let Some(node) = stack.pop() {
            out.push(node);
            let mut children = self.children(node);
            children.reverse();
            stack.extend(children);
        }
        out
    }

    /// Ancestors, nearest first.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = self.parent(id);
        while let Some(node) = current {
            out.push(node);
            current = self.parent(node);
        }
        out
    }

    /// The namespace nodes in scope on an element, synthesized on
    /// first use and cached for identity.
    pub fn namespace_nodes(&mut self, id: NodeId) -> Vec<NodeId> {
        if !matches!(self.record(id).kind, NodeKind::Element { .. }) {
            return Vec::new();
        }
        if let Some(cached) = self.docs[id.doc as usize].namespace_nodes.get(&id.index) {
            return cached
                .iter()
                .map(|index| NodeId {
                    doc: id.doc,
                    index: *index,
                })
                .collect();
        }
        let mut bindings: Vec<(String, String)> = vec![("xml".to_string(), XML_NAMESPACE.to_string())];
        let mut chain = vec![id];
        chain.extend(self.ancestors(id));
        // outermost declarations first so inner ones override
        for node in chain.iter().rev() {
            if let NodeKind::Element { declarations, .. } = &self.record(*node).kind {
                for (prefix, uri) in declarations {
                    bindings.retain(|(p, _)| p != prefix);
                    if !uri.is_empty() || prefix.is_empty() {
                        bindings.push((prefix.clone(), uri.clone()));
                    }
                }
            }
        }
        bindings.retain(|(_, uri)| !uri.is_empty());
        let element_order = self.record(id).order.0;
        let doc = &mut self.docs[id.doc as usize];
        let mut indexes = Vec::with_capacity(bindings.len());
        for (slot, (prefix, uri)) in bindings.into_iter().enumerate() {
            let index = doc.nodes.len() as u32;
            doc.nodes.push(NodeRecord {
                parent: Some(id.index),
                prev_sibling: None,
                next_sibling: None,
                first_child: None,
                last_child: None,
                order: (element_order, NS_MINOR_BASE + slot as u32),
                kind: NodeKind::Namespace { prefix, uri },
                annotation: None,
            });
            indexes.push(index);
        }
        doc.namespace_nodes.insert(id.index, indexes.clone());
        indexes
            .into_iter()
            .map(|index| NodeId { doc: id.doc, index })
            .collect()
    }

    /// Compare two nodes in document order. Nodes in different
    /// documents order by document slot (stable within a run).
    pub fn compare_order(&self, a: NodeId, b: NodeId) -> std::cmp::Ordering {
        a.doc
            .cmp(&b.doc)
            .then_with(|| self.record(a).order.cmp(&self.record(b).order))
    }

    /// The string value per XPath §5.
    pub fn string_value(&self, id: NodeId) -> String {
        match &self.record(id).kind {
            NodeKind::Attribute { value, .. } => value.clone(),
            NodeKind::Text(text) => text.clone(),
            NodeKind::Comment(text) => text.clone(),
            NodeKind::Pi { data, .. } => data.clone(),
            NodeKind::Namespace { uri, .. } => uri.clone(),
            NodeKind::Document | NodeKind::Element { .. } => {
                let mut out = String::new();
                let mut stack: Vec<NodeId> = self.children(id);
                stack.reverse();
                while let Some(node) = stack.pop() {
                    match &self.record(node).kind {
                        NodeKind::Text(text) => out.push_str(text),
                        NodeKind::Element { .. } => {
                            let mut children = self.children(node);
                            children.reverse();
                            stack.extend(children);
                        }
                        _ => {}
                    }
                }
                // a typed element's string value is the canonical
                // lexical form of its annotation
                if let Some(annotation) = self.record(id).annotation {
                    if !matches!(
                        annotation,
                        Xs::Untyped | Xs::UntypedAtomic | Xs::AnyType | Xs::AnySimpleType
                    ) {
                        if let Ok(atomic) = Atomic::parse_as(&out, annotation) {
                            return atomic.string_value();
                        }
                    }
                }
                out
            }
        }
    }

    /// The node's type annotation; untyped unless a validator set one.
    pub fn annotation(&self, id: NodeId) -> Option<Xs> {
        self.record(id).annotation
    }

    /// Set the type annotation, as a validating collaborator would.
    pub fn set_annotation(&mut self, id: NodeId, annotation: Xs) {
        self.docs[id.doc as usize].nodes[id.index as usize].annotation = Some(annotation);
    }

    /// The typed value used by atomization: the canonical typed atomic
    /// for annotated nodes, an untyped atomic otherwise.
    pub fn typed_value(&self, id: NodeId) -> Result<Vec<Atomic>> {
        let string_value = self.string_value(id);
        match self.record(id).annotation {
            None | Some(Xs::Untyped) | Some(Xs::UntypedAtomic) | Some(Xs::AnyType) => {
                Ok(vec![Atomic::untyped(string_value.as_str())])
            }
            Some(annotation) => {
                let atomic =
                    Atomic::parse_as(&string_value, annotation).map_err(|_| Error::FORG0001)?;
                Ok(vec![atomic])
            }
        }
    }

    /// The element with the given ID attribute value.
    pub fn element_by_id(&self, doc: NodeId, id_value: &str) -> Option<NodeId> {
        self.docs[doc.doc as usize].ids.get(id_value).map(|index| NodeId {
            doc: doc.doc,
            index: *index,
        })
    }

    /// The system identifier of an unparsed entity declared in this
    /// document's DTD.
    pub fn unparsed_entity_uri(&self, doc: NodeId, name: &str) -> Option<String> {
        self.docs[doc.doc as usize]
            .unparsed_entities
            .get(name)
            .cloned()
    }

    /// The document URI; non-null only on document roots.
    pub fn document_uri(&self, id: NodeId) -> Option<String> {
        if id.index != 0 {
            return None;
        }
        self.docs[id.doc as usize].document_uri.clone()
    }

    /// The base URI of the node (xml:base aware).
    pub fn base_uri(&self, id: NodeId) -> Option<String> {
        let xml_base = Name::new(XML_NAMESPACE, "base");
        let mut chain = vec![id];
        chain.extend(self.ancestors(id));
        let mut segments: Vec<String> = Vec::new();
        for node in &chain {
            if let NodeKind::Element { .. } = self.record(*node).kind {
                if let Some(base) = self.attribute_value(*node, &xml_base) {
                    segments.push(base);
                }
            }
        }
        let document_base = self.docs[id.doc as usize].base_uri.clone();
        let mut result: Option<String> = document_base;
        for base in segments.into_iter().rev() {
            result = Some(match &result {
                Some(current) => resolve_uri(current, &base),
                None => base,
            });
        }
        result
    }

    /// A per-run unique identifier for the node.
    pub fn generate_id(&self, id: NodeId) -> String {
        format!("d{}n{}", id.doc, id.index)
    }

    /// Whether the node is an element.
    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.record(id).kind, NodeKind::Element { .. })
    }

    // ---- incremental building, for streaming skeletons ---------------------

    /// Start a fresh, empty document and return its root.
    pub fn new_document(&mut self) -> NodeId {
        self.add_document(Document::new())
    }

    /// Append an element with its attributes under `parent`.
    pub fn append_element(
        &mut self,
        parent: NodeId,
        name: Name,
        attributes: Vec<(Name, String)>,
        declarations: Vec<(String, String)>,
    ) -> NodeId {
        let doc = &mut self.docs[parent.doc as usize];
        let element = doc.push_node(
            parent.index,
            NodeKind::Element {
                name,
                attributes: Vec::new(),
                declarations,
            },
        );
        let mut attr_indexes = Vec::with_capacity(attributes.len());
        for (slot, (attr_name, value)) in attributes.into_iter().enumerate() {
            attr_indexes.push(doc.push_attribute(element, slot as u32, attr_name, value));
        }
        if let NodeKind::Element { attributes, .. } = &mut doc.nodes[element as usize].kind {
            *attributes = attr_indexes;
        }
        NodeId {
            doc: parent.doc,
            index: element,
        }
    }

    /// Append a text node under `parent`.
    pub fn append_text(&mut self, parent: NodeId, text: String) -> NodeId {
        let doc = &mut self.docs[parent.doc as usize];
        let index = doc.push_node(parent.index, NodeKind::Text(text));
        NodeId {
            doc: parent.doc,
            index,
        }
    }

    /// Append a comment node under `parent`.
    pub fn append_comment(&mut self, parent: NodeId, text: String) -> NodeId {
        let doc = &mut self.docs[parent.doc as usize];
        let index = doc.push_node(parent.index, NodeKind::Comment(text));
        NodeId {
            doc: parent.doc,
            index,
        }
    }

    /// Append a processing instruction under `parent`.
    pub fn append_pi(&mut self, parent: NodeId, target: String, data: String) -> NodeId {
        let doc = &mut self.docs[parent.doc as usize];
        let index = doc.push_node(parent.index, NodeKind::Pi { target, data });
        NodeId {
            doc: parent.doc,
            index,
        }
    }
}

/// Minimal RFC 3986 resolution: absolute references win, otherwise the
/// reference replaces the base's last path segment.
pub(crate) fn resolve_uri(base: &str, reference: &str) -> String {
    use iri_string::types::{IriAbsoluteStr, IriReferenceStr};
    if let (Ok(base_iri), Ok(reference_iri)) = (
        IriAbsoluteStr::new(base),
        IriReferenceStr::new(reference),
    ) {
        return reference_iri.resolve_against(base_iri).to_string();
    }
    if reference.contains("://") || reference.is_empty() {
        return reference.to_string();
    }
    match base.rfind('/') {
        Some(pos) => format!("{}{}", &base[..pos + 1], reference),
        None => reference.to_string(),
    }
}
