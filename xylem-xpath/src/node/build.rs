//! Building arena documents from the event stream.

use xylem_name::Name;
use xylem_sax::{
    Attributes, ContentHandler, DeclHandler, DtdHandler, LexicalHandler, Result as SaxResult,
};
use xylem_schema_type::Xs;

use super::{Document, Documents, NodeId, NodeKind};

/// A content/lexical/DTD handler that assembles a [`Document`].
///
/// Feed it to a parser (or replay a recorded event buffer into it) and
/// call [`DocumentBuilder::finish`] to move the result into a
/// [`Documents`] pool.
pub struct DocumentBuilder {
    document: Document,
    stack: Vec<u32>,
    text: String,
    dtd_id_attributes: Vec<(String, String)>,
    pending_mappings: Vec<(String, String)>,
}

impl Default for DocumentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentBuilder {
    /// An empty builder.
    pub fn new() -> Self {
        Self {
            document: Document::new(),
            stack: vec![0],
            text: String::new(),
            dtd_id_attributes: Vec::new(),
            pending_mappings: Vec::new(),
        }
    }

    /// Set the document and base URI of the document being built.
    pub fn set_uri(&mut self, uri: &str) {
        self.document.document_uri = Some(uri.to_string());
        self.document.base_uri = Some(uri.to_string());
    }

    /// Move the finished document into the pool, returning its root.
    pub fn finish(mut self, documents: &mut Documents) -> NodeId {
        self.flush_text();
        documents.add_document(self.document)
    }

    fn parent(&self) -> u32 {
        *self.stack.last().expect("builder stack is never empty")
    }

    fn flush_text(&mut self) {
        if self.text.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.text);
        let parent = self.parent();
        self.document.push_node(parent, NodeKind::Text(text));
    }
}

impl ContentHandler for DocumentBuilder {
    fn start_prefix_mapping(&mut self, prefix: &str, uri: &str) -> SaxResult<()> {
        self.pending_mappings
            .push((prefix.to_string(), uri.to_string()));
        Ok(())
    }

    fn start_element(&mut self, name: &Name, attributes: &Attributes) -> SaxResult<()> {
        self.flush_text();
        let parent = self.parent();
        // declarations come from the prefix-mapping events just
        // delivered, supplemented from the names in play for event
        // sources that skip the mapping calls
        let mut declarations: Vec<(String, String)> = std::mem::take(&mut self.pending_mappings);
        let mut note = |n: &Name| {
            if !n.namespace().is_empty()
                && !declarations.iter().any(|(p, _)| p == n.prefix())
            {
                declarations.push((n.prefix().to_string(), n.namespace().to_string()));
            }
        };
        note(name);
        for attribute in attributes.iter() {
            if !attribute.name.namespace().is_empty() {
                note(&attribute.name);
            }
        }
        let element = self.document.push_node(
            parent,
            NodeKind::Element {
                name: name.clone(),
                attributes: Vec::new(),
                declarations,
            },
        );
        let mut attr_indexes = Vec::with_capacity(attributes.len());
        for (slot, attribute) in attributes.iter().enumerate() {
            let index = self.document.push_attribute(
                element,
                slot as u32,
                attribute.name.clone(),
                attribute.value.clone(),
            );
            let is_dtd_id = attribute.dtd_type == xylem_sax::AttributeType::Id
                || self.dtd_id_attributes.iter().any(|(e, a)| {
                    *e == name.qualified() && *a == attribute.name.qualified()
                });
            if is_dtd_id {
                self.document.nodes[index as usize].annotation = Some(Xs::ID);
                self.document
                    .ids
                    .entry(attribute.value.clone())
                    .or_insert(element);
            }
            attr_indexes.push(index);
        }
        if let NodeKind::Element { attributes, .. } =
            &mut self.document.nodes[element as usize].kind
        {
            *attributes = attr_indexes;
        }
        self.stack.push(element);
        Ok(())
    }

    fn end_element(&mut self, _name: &Name) -> SaxResult<()> {
        self.flush_text();
        self.stack.pop();
        Ok(())
    }

    fn characters(&mut self, text: &str) -> SaxResult<()> {
        self.text.push_str(text);
        Ok(())
    }

    fn processing_instruction(&mut self, target: &str, data: &str) -> SaxResult<()> {
        self.flush_text();
        let parent = self.parent();
        self.document.push_node(
            parent,
            NodeKind::Pi {
                target: target.to_string(),
                data: data.to_string(),
            },
        );
        Ok(())
    }
}

impl LexicalHandler for DocumentBuilder {
    fn comment(&mut self, text: &str) -> SaxResult<()> {
        self.flush_text();
        let parent = self.parent();
        self.document
            .push_node(parent, NodeKind::Comment(text.to_string()));
        Ok(())
    }
}

impl DtdHandler for DocumentBuilder {
    fn unparsed_entity_decl(
        &mut self,
        name: &str,
        _public_id: Option<&str>,
        system_id: &str,
        _notation_name: &str,
    ) -> SaxResult<()> {
        self.document
            .unparsed_entities
            .insert(name.to_string(), system_id.to_string());
        Ok(())
    }
}

impl DeclHandler for DocumentBuilder {
    fn attribute_decl(
        &mut self,
        element_name: &str,
        attribute_name: &str,
        attribute_type: &xylem_sax::AttributeType,
        _mode: &str,
        _value: Option<&str>,
    ) -> SaxResult<()> {
        if *attribute_type == xylem_sax::AttributeType::Id {
            self.dtd_id_attributes
                .push((element_name.to_string(), attribute_name.to_string()));
        }
        Ok(())
    }
}

/// Parse bytes into a document in one call.
pub fn parse_bytes_into(
    documents: &mut Documents,
    bytes: &[u8],
    uri: Option<&str>,
) -> SaxResult<NodeId> {
    use std::cell::RefCell;
    use std::rc::Rc;

    let builder = Rc::new(RefCell::new(DocumentBuilder::new()));
    if let Some(uri) = uri {
        builder.borrow_mut().set_uri(uri);
    }
    let mut parser = xylem_sax::PushParser::new();
    parser.set_content_handler(builder.clone());
    parser.set_lexical_handler(builder.clone());
    parser.set_dtd_handler(builder.clone());
    parser.set_declaration_handler(builder.clone());
    if let Some(uri) = uri {
        parser.set_system_id(uri);
    }
    parser.feed(bytes)?;
    parser.close()?;
    drop(parser);
    let builder = Rc::try_unwrap(builder)
        .map_err(|_| xylem_sax::SaxError::Handler("builder still shared".to_string()))?
        .into_inner();
    Ok(builder.finish(documents))
}
