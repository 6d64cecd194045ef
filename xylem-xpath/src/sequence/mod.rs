//! Items and sequences.

mod json;

pub use json::{json_string, serialize_json};

use std::rc::Rc;

use crate::atomic::Atomic;
use crate::error::{Error, Result};
use crate::function::Function;
use crate::node::{Documents, NodeId, NodeKind};

/// An XPath item: what a sequence is made of.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    /// An atomic value.
    Atomic(Atomic),
    /// A node handle into the document pool.
    Node(NodeId),
    /// A function item, including maps and arrays.
    Function(Function),
}

impl Item {
    /// Get the atomic value, or a type error.
    pub fn to_atomic(&self) -> Result<Atomic> {
        match self {
            Item::Atomic(a) => Ok(a.clone()),
            _ => Err(Error::XPTY0004),
        }
    }

    /// Get the node, or a type error.
    pub fn to_node(&self) -> Result<NodeId> {
        match self {
            Item::Node(n) => Ok(*n),
            _ => Err(Error::XPTY0004),
        }
    }

    /// Get the function item, or a type error.
    pub fn to_function(&self) -> Result<Function> {
        match self {
            Item::Function(f) => Ok(f.clone()),
            _ => Err(Error::XPTY0004),
        }
    }

    /// The string value of the item; functions have none.
    pub fn string_value(&self, documents: &Documents) -> Result<String> {
        match self {
            Item::Atomic(a) => Ok(a.string_value()),
            Item::Node(n) => Ok(documents.string_value(*n)),
            Item::Function(_) => Err(Error::FOTY0014),
        }
    }

    /// Atomize one item into zero or more atomics.
    pub fn atomized(&self, documents: &Documents) -> Result<Vec<Atomic>> {
        match self {
            Item::Atomic(a) => Ok(vec![a.clone()]),
            Item::Node(n) => documents.typed_value(*n),
            Item::Function(Function::Array(array)) => {
                let mut out = Vec::new();
                for member in array.iter() {
                    for item in member.iter() {
                        out.extend(item.atomized(documents)?);
                    }
                }
                Ok(out)
            }
            Item::Function(_) => Err(Error::FOTY0013),
        }
    }

    /// Effective boolean value of a singleton.
    pub fn effective_boolean_value(&self) -> Result<bool> {
        match self {
            Item::Atomic(a) => a.effective_boolean_value(),
            Item::Node(_) => Ok(true),
            Item::Function(_) => Err(Error::FORG0006),
        }
    }
}

impl From<Atomic> for Item {
    fn from(a: Atomic) -> Self {
        Item::Atomic(a)
    }
}

impl From<NodeId> for Item {
    fn from(n: NodeId) -> Self {
        Item::Node(n)
    }
}

impl From<Function> for Item {
    fn from(f: Function) -> Self {
        Item::Function(f)
    }
}

/// A sequence of zero or more items.
///
/// A singleton is indistinguishable from a length-one sequence; the
/// three-way representation just avoids allocation for the common
/// cases.
#[derive(Debug, Clone, PartialEq)]
pub enum Sequence {
    /// The empty sequence.
    Empty,
    /// Exactly one item.
    One(Item),
    /// Two or more items, shared.
    Many(Rc<Vec<Item>>),
}

impl Sequence {
    /// The empty sequence.
    pub fn empty() -> Self {
        Sequence::Empty
    }

    /// Build from a vector, collapsing to the cheap representations.
    pub fn from_vec(mut items: Vec<Item>) -> Self {
        match items.len() {
            0 => Sequence::Empty,
            1 => Sequence::One(items.pop().unwrap()),
            _ => Sequence::Many(Rc::new(items)),
        }
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        match self {
            Sequence::Empty => 0,
            Sequence::One(_) => 1,
            Sequence::Many(items) => items.len(),
        }
    }

    /// Whether the sequence is empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, Sequence::Empty)
    }

    /// Iterate over the items.
    pub fn iter(&self) -> SequenceIter<'_> {
        SequenceIter {
            sequence: self,
            position: 0,
        }
    }

    /// The items as a fresh vector.
    pub fn to_vec(&self) -> Vec<Item> {
        self.iter().cloned().collect()
    }

    /// Index access, 0-based.
    pub fn get(&self, index: usize) -> Option<&Item> {
        match self {
            Sequence::Empty => None,
            Sequence::One(item) => (index == 0).then_some(item),
            Sequence::Many(items) => items.get(index),
        }
    }

    /// The single item of a singleton, or a type error.
    pub fn exactly_one(&self) -> Result<&Item> {
        match self {
            Sequence::One(item) => Ok(item),
            _ => Err(Error::XPTY0004),
        }
    }

    /// Zero or one items.
    pub fn zero_or_one(&self) -> Result<Option<&Item>> {
        match self {
            Sequence::Empty => Ok(None),
            Sequence::One(item) => Ok(Some(item)),
            Sequence::Many(_) => Err(Error::XPTY0004),
        }
    }

    /// Atomize the whole sequence.
    pub fn atomized(&self, documents: &Documents) -> Result<Vec<Atomic>> {
        let mut out = Vec::with_capacity(self.len());
        for item in self.iter() {
            out.extend(item.atomized(documents)?);
        }
        Ok(out)
    }

    /// Atomize, requiring exactly one atomic.
    pub fn atomized_one(&self, documents: &Documents) -> Result<Atomic> {
        let atoms = self.atomized(documents)?;
        if atoms.len() != 1 {
            return Err(Error::XPTY0004);
        }
        Ok(atoms.into_iter().next().unwrap())
    }

    /// Atomize, requiring zero or one atomics.
    pub fn atomized_option(&self, documents: &Documents) -> Result<Option<Atomic>> {
        let atoms = self.atomized(documents)?;
        match atoms.len() {
            0 => Ok(None),
            1 => Ok(atoms.into_iter().next()),
            _ => Err(Error::XPTY0004),
        }
    }

    /// The effective boolean value of the sequence.
    pub fn effective_boolean_value(&self) -> Result<bool> {
        match self {
            Sequence::Empty => Ok(false),
            Sequence::One(item) => item.effective_boolean_value(),
            Sequence::Many(items) => {
                // true if the first item is a node; an error otherwise
                match items.first() {
                    Some(Item::Node(_)) => Ok(true),
                    _ => Err(Error::FORG0006),
                }
            }
        }
    }

    /// The string value of a sequence used where a string is needed:
    /// empty is "", singleton is its string value.
    pub fn string_value(&self, documents: &Documents) -> Result<String> {
        match self.zero_or_one()? {
            None => Ok(String::new()),
            Some(item) => item.string_value(documents),
        }
    }

    /// Concatenate sequences.
    pub fn concat(parts: Vec<Sequence>) -> Sequence {
        let mut items = Vec::new();
        for part in parts {
            match part {
                Sequence::Empty => {}
                Sequence::One(item) => items.push(item),
                Sequence::Many(shared) => items.extend(shared.iter().cloned()),
            }
        }
        Sequence::from_vec(items)
    }
}

impl From<Item> for Sequence {
    fn from(item: Item) -> Self {
        Sequence::One(item)
    }
}

impl From<Atomic> for Sequence {
    fn from(a: Atomic) -> Self {
        Sequence::One(Item::Atomic(a))
    }
}

impl From<NodeId> for Sequence {
    fn from(n: NodeId) -> Self {
        Sequence::One(Item::Node(n))
    }
}

impl From<Vec<Item>> for Sequence {
    fn from(items: Vec<Item>) -> Self {
        Sequence::from_vec(items)
    }
}

impl From<bool> for Sequence {
    fn from(b: bool) -> Self {
        Sequence::One(Item::Atomic(Atomic::Boolean(b)))
    }
}

impl From<String> for Sequence {
    fn from(s: String) -> Self {
        Sequence::One(Item::Atomic(Atomic::string(s.as_str())))
    }
}

/// Iterator over a sequence's items.
pub struct SequenceIter<'a> {
    sequence: &'a Sequence,
    position: usize,
}

impl<'a> Iterator for SequenceIter<'a> {
    type Item = &'a Item;

    fn next(&mut self) -> Option<&'a Item> {
        let item = self.sequence.get(self.position);
        if item.is_some() {
            self.position += 1;
        }
        item
    }
}

/// Helper for node-sequence results: sort by document order and drop
/// duplicates by identity.
pub fn sort_document_order(items: &mut Vec<Item>, documents: &Documents) -> Result<()> {
    for item in items.iter() {
        if !matches!(item, Item::Node(_)) {
            return Err(Error::XPTY0018);
        }
    }
    items.sort_by(|a, b| match (a, b) {
        (Item::Node(x), Item::Node(y)) => documents.compare_order(*x, *y),
        _ => std::cmp::Ordering::Equal,
    });
    items.dedup_by(|a, b| match (a, b) {
        (Item::Node(x), Item::Node(y)) => x == y,
        _ => false,
    });
    Ok(())
}

/// Whether `kind` is usable as a node-set member (everything except
/// namespace nodes counts for most operations).
pub fn is_node_kind(kind: &NodeKind) -> bool {
    !matches!(kind, NodeKind::Namespace { .. })
}
