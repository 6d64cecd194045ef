//! Owned document events, for buffering and replay.
//!
//! The live handler interfaces hand out transient slices; when a
//! consumer needs to retain a stretch of the stream (the transform
//! engine's grounded buffering, test capture) it records these owned
//! events instead.

use xylem_name::Name;

use crate::error::Result;
use crate::handler::{Attributes, ContentHandler, LexicalHandler};

/// One owned document event.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Beginning of a document.
    StartDocument,
    /// End of a document.
    EndDocument,
    /// A prefix coming into scope.
    StartPrefixMapping(String, String),
    /// A prefix going out of scope.
    EndPrefixMapping(String),
    /// Start of an element with its attributes.
    StartElement(Name, Attributes),
    /// End of an element.
    EndElement(Name),
    /// Character data.
    Characters(String),
    /// A comment.
    Comment(String),
    /// A processing instruction.
    ProcessingInstruction(String, String),
    /// Start of a CDATA section.
    StartCdata,
    /// End of a CDATA section.
    EndCdata,
    /// Start of a general entity expansion.
    StartEntity(String),
    /// End of a general entity expansion.
    EndEntity(String),
    /// An entity that was skipped.
    SkippedEntity(String),
}

/// A recorded stretch of the event stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventBuffer {
    events: Vec<Event>,
}

impl EventBuffer {
    /// An empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event.
    pub fn push(&mut self, event: Event) {
        self.events.push(event);
    }

    /// The recorded events.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Discard the recording.
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Replay content events into a content handler and lexical events
    /// into an optional lexical handler.
    pub fn replay(
        &self,
        content: &mut dyn ContentHandler,
        mut lexical: Option<&mut dyn LexicalHandler>,
    ) -> Result<()> {
        for event in &self.events {
            match event {
                Event::StartDocument => content.start_document()?,
                Event::EndDocument => content.end_document()?,
                Event::StartPrefixMapping(prefix, uri) => {
                    content.start_prefix_mapping(prefix, uri)?;
                }
                Event::EndPrefixMapping(prefix) => content.end_prefix_mapping(prefix)?,
                Event::StartElement(name, attributes) => {
                    content.start_element(name, attributes)?;
                }
                Event::EndElement(name) => content.end_element(name)?,
                Event::Characters(text) => content.characters(text)?,
                Event::ProcessingInstruction(target, data) => {
                    content.processing_instruction(target, data)?;
                }
                Event::SkippedEntity(name) => content.skipped_entity(name)?,
                Event::Comment(text) => {
                    if let Some(lexical) = lexical.as_deref_mut() {
                        lexical.comment(text)?;
                    }
                }
                Event::StartCdata => {
                    if let Some(lexical) = lexical.as_deref_mut() {
                        lexical.start_cdata()?;
                    }
                }
                Event::EndCdata => {
                    if let Some(lexical) = lexical.as_deref_mut() {
                        lexical.end_cdata()?;
                    }
                }
                Event::StartEntity(name) => {
                    if let Some(lexical) = lexical.as_deref_mut() {
                        lexical.start_entity(name)?;
                    }
                }
                Event::EndEntity(name) => {
                    if let Some(lexical) = lexical.as_deref_mut() {
                        lexical.end_entity(name)?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// A content + lexical handler that records everything it receives.
#[derive(Debug, Default)]
pub struct EventRecorder {
    /// The recording; publicly readable so owners can inspect or drain.
    pub buffer: EventBuffer,
}

impl EventRecorder {
    /// A recorder with an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ContentHandler for EventRecorder {
    fn start_document(&mut self) -> Result<()> {
        self.buffer.push(Event::StartDocument);
        Ok(())
    }
    fn end_document(&mut self) -> Result<()> {
        self.buffer.push(Event::EndDocument);
        Ok(())
    }
    fn start_prefix_mapping(&mut self, prefix: &str, uri: &str) -> Result<()> {
        self.buffer
            .push(Event::StartPrefixMapping(prefix.to_string(), uri.to_string()));
        Ok(())
    }
    fn end_prefix_mapping(&mut self, prefix: &str) -> Result<()> {
        self.buffer.push(Event::EndPrefixMapping(prefix.to_string()));
        Ok(())
    }
    fn start_element(&mut self, name: &Name, attributes: &Attributes) -> Result<()> {
        self.buffer
            .push(Event::StartElement(name.clone(), attributes.clone()));
        Ok(())
    }
    fn end_element(&mut self, name: &Name) -> Result<()> {
        self.buffer.push(Event::EndElement(name.clone()));
        Ok(())
    }
    fn characters(&mut self, text: &str) -> Result<()> {
        // coalesce adjacent runs so chunking is invisible to consumers
        if let Some(Event::Characters(existing)) = self.buffer.events.last_mut() {
            existing.push_str(text);
        } else {
            self.buffer.push(Event::Characters(text.to_string()));
        }
        Ok(())
    }
    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<()> {
        self.buffer.push(Event::ProcessingInstruction(
            target.to_string(),
            data.to_string(),
        ));
        Ok(())
    }
    fn skipped_entity(&mut self, name: &str) -> Result<()> {
        self.buffer.push(Event::SkippedEntity(name.to_string()));
        Ok(())
    }
}

impl LexicalHandler for EventRecorder {
    fn start_cdata(&mut self) -> Result<()> {
        self.buffer.push(Event::StartCdata);
        Ok(())
    }
    fn end_cdata(&mut self) -> Result<()> {
        self.buffer.push(Event::EndCdata);
        Ok(())
    }
    fn comment(&mut self, text: &str) -> Result<()> {
        self.buffer.push(Event::Comment(text.to_string()));
        Ok(())
    }
    fn start_entity(&mut self, name: &str) -> Result<()> {
        self.buffer.push(Event::StartEntity(name.to_string()));
        Ok(())
    }
    fn end_entity(&mut self, name: &str) -> Result<()> {
        self.buffer.push(Event::EndEntity(name.to_string()));
        Ok(())
    }
}
