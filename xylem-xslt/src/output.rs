//! Result-event emission.
//!
//! Instructions write through the [`Emitter`] trait. The event emitter
//! performs the namespace fixup the spec asks of the output layer -
//! declaring what a subtree needs, undeclaring an inherited default
//! namespace with `xmlns=""`, and dropping redundant re-declarations -
//! then forwards SAX events to any content/lexical handler pair (the
//! serializer, or a downstream transformer). The fragment emitter
//! builds an arena document instead, for variable content and grounded
//! buffers.

use std::cell::RefCell;
use std::rc::Rc;

use xylem_name::{Name, NamespaceStack};
use xylem_sax::{Attributes, ContentHandlerRef, LexicalHandlerRef};

use xylem_xpath::{Error, Result};
use xylem_xpath::node::{DocumentBuilder, Documents, NodeId};

/// Receiver of constructed result content.
pub trait Emitter {
    /// Open an element; explicit namespace declarations accompany it.
    fn start_element(&mut self, name: &Name, namespaces: &[(String, String)]) -> Result<()>;
    /// Add an attribute to the open start tag.
    fn attribute(&mut self, name: &Name, value: &str) -> Result<()>;
    /// Close the innermost element.
    fn end_element(&mut self) -> Result<()>;
    /// Character data.
    fn text(&mut self, text: &str) -> Result<()>;
    /// A comment.
    fn comment(&mut self, text: &str) -> Result<()>;
    /// A processing instruction.
    fn pi(&mut self, target: &str, data: &str) -> Result<()>;
}

struct PendingTag {
    name: Name,
    namespaces: Vec<(String, String)>,
    attributes: Attributes,
}

/// Emits SAX events into handler sinks, with namespace fixup.
pub struct EventEmitter {
    content: ContentHandlerRef,
    lexical: Option<LexicalHandlerRef>,
    pending: Option<PendingTag>,
    stack: Vec<(Name, Vec<String>)>,
    ns: NamespaceStack,
    depth_guard: usize,
}

impl EventEmitter {
    /// Wrap handler sinks.
    pub fn new(content: ContentHandlerRef, lexical: Option<LexicalHandlerRef>) -> Self {
        Self {
            content,
            lexical,
            pending: None,
            stack: Vec::new(),
            ns: NamespaceStack::new(),
            depth_guard: 0,
        }
    }

    /// Flush any open start tag; every non-attribute output goes
    /// through here first.
    pub fn flush(&mut self) -> Result<()> {
        let pending = match self.pending.take() {
            Some(pending) => pending,
            None => return Ok(()),
        };
        self.ns.push_scope();
        let mut declared: Vec<String> = Vec::new();
        let mut declare = |ns: &mut NamespaceStack,
                           content: &ContentHandlerRef,
                           declared: &mut Vec<String>,
                           prefix: &str,
                           uri: &str|
         -> Result<()> {
            let current = ns.resolve(prefix);
            let redundant = match current {
                Some(existing) => existing == uri,
                None => uri.is_empty(),
            };
            if redundant {
                return Ok(());
            }
            ns.declare(prefix, uri);
            declared.push(prefix.to_string());
            content
                .borrow_mut()
                .start_prefix_mapping(prefix, uri)
                .map_err(|_| Error::FOER0000)?;
            Ok(())
        };
        // explicit declarations carried by the instruction
        for (prefix, uri) in &pending.namespaces {
            declare(&mut self.ns, &self.content, &mut declared, prefix, uri)?;
        }
        // the element's own namespace, or an undeclaration when it has
        // none but a default is inherited
        if pending.name.namespace().is_empty() {
            if self
                .ns
                .resolve("")
                .map(|uri| !uri.is_empty())
                .unwrap_or(false)
            {
                declare(&mut self.ns, &self.content, &mut declared, "", "")?;
            }
        } else {
            declare(
                &mut self.ns,
                &self.content,
                &mut declared,
                pending.name.prefix(),
                pending.name.namespace(),
            )?;
        }
        for attribute in pending.attributes.iter() {
            if !attribute.name.namespace().is_empty() {
                declare(
                    &mut self.ns,
                    &self.content,
                    &mut declared,
                    attribute.name.prefix(),
                    attribute.name.namespace(),
                )?;
            }
        }
        self.content
            .borrow_mut()
            .start_element(&pending.name, &pending.attributes)
            .map_err(|_| Error::FOER0000)?;
        self.stack.push((pending.name, declared));
        Ok(())
    }

    /// Finish the document: flush and sanity-check balance.
    pub fn finish(&mut self) -> Result<()> {
        self.flush()?;
        if !self.stack.is_empty() {
            return Err(Error::FOER0000);
        }
        Ok(())
    }
}

impl Emitter for EventEmitter {
    fn start_element(&mut self, name: &Name, namespaces: &[(String, String)]) -> Result<()> {
        self.flush()?;
        self.depth_guard += 1;
        if self.depth_guard > 65536 {
            return Err(Error::FOER0000);
        }
        self.pending = Some(PendingTag {
            name: name.clone(),
            namespaces: namespaces.to_vec(),
            attributes: Attributes::new(),
        });
        Ok(())
    }

    fn attribute(&mut self, name: &Name, value: &str) -> Result<()> {
        match &mut self.pending {
            // creating an attribute after children have been written
            // is an error per XTDE0410
            None => Err(Error::XTSE0010),
            Some(pending) => {
                pending.attributes.push(name.clone(), value);
                Ok(())
            }
        }
    }

    fn end_element(&mut self) -> Result<()> {
        self.flush()?;
        self.depth_guard = self.depth_guard.saturating_sub(1);
        let (name, declared) = self.stack.pop().ok_or(Error::FOER0000)?;
        self.content
            .borrow_mut()
            .end_element(&name)
            .map_err(|_| Error::FOER0000)?;
        self.ns.pop_scope();
        for prefix in declared.iter().rev() {
            self.content
                .borrow_mut()
                .end_prefix_mapping(prefix)
                .map_err(|_| Error::FOER0000)?;
        }
        Ok(())
    }

    fn text(&mut self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        self.flush()?;
        self.content
            .borrow_mut()
            .characters(text)
            .map_err(|_| Error::FOER0000)
    }

    fn comment(&mut self, text: &str) -> Result<()> {
        self.flush()?;
        if let Some(lexical) = &self.lexical {
            lexical
                .borrow_mut()
                .comment(text)
                .map_err(|_| Error::FOER0000)?;
        }
        Ok(())
    }

    fn pi(&mut self, target: &str, data: &str) -> Result<()> {
        self.flush()?;
        self.content
            .borrow_mut()
            .processing_instruction(target, data)
            .map_err(|_| Error::FOER0000)
    }
}

/// Builds an arena document from emitted content; used for variable
/// tree fragments and grounded subtree capture.
pub struct FragmentEmitter {
    builder: DocumentBuilder,
    pending: Option<PendingTag>,
    stack: Vec<Name>,
}

impl Default for FragmentEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl FragmentEmitter {
    /// An empty fragment.
    pub fn new() -> Self {
        Self {
            builder: DocumentBuilder::new(),
            pending: None,
            stack: Vec::new(),
        }
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(pending) = self.pending.take() {
            use xylem_sax::ContentHandler;
            self.builder
                .start_element(&pending.name, &pending.attributes)
                .map_err(|_| Error::FOER0000)?;
            self.stack.push(pending.name);
        }
        Ok(())
    }

    /// Finish and move the fragment into the pool, returning its root.
    pub fn finish(mut self, documents: &Rc<RefCell<Documents>>) -> Result<NodeId> {
        self.flush()?;
        if !self.stack.is_empty() {
            return Err(Error::FOER0000);
        }
        Ok(self.builder.finish(&mut documents.borrow_mut()))
    }
}

impl Emitter for FragmentEmitter {
    fn start_element(&mut self, name: &Name, namespaces: &[(String, String)]) -> Result<()> {
        self.flush()?;
        self.pending = Some(PendingTag {
            name: name.clone(),
            namespaces: namespaces.to_vec(),
            attributes: Attributes::new(),
        });
        Ok(())
    }

    fn attribute(&mut self, name: &Name, value: &str) -> Result<()> {
        match &mut self.pending {
            None => Err(Error::XTSE0010),
            Some(pending) => {
                pending.attributes.push(name.clone(), value);
                Ok(())
            }
        }
    }

    fn end_element(&mut self) -> Result<()> {
        use xylem_sax::ContentHandler;
        self.flush()?;
        let name = self.stack.pop().ok_or(Error::FOER0000)?;
        self.builder.end_element(&name).map_err(|_| Error::FOER0000)
    }

    fn text(&mut self, text: &str) -> Result<()> {
        use xylem_sax::ContentHandler;
        self.flush()?;
        self.builder.characters(text).map_err(|_| Error::FOER0000)
    }

    fn comment(&mut self, text: &str) -> Result<()> {
        use xylem_sax::LexicalHandler;
        self.flush()?;
        self.builder.comment(text).map_err(|_| Error::FOER0000)
    }

    fn pi(&mut self, target: &str, data: &str) -> Result<()> {
        use xylem_sax::ContentHandler;
        self.flush()?;
        self.builder
            .processing_instruction(target, data)
            .map_err(|_| Error::FOER0000)
    }
}
