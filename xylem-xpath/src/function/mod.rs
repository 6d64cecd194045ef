//! Function items: static references, inline closures, partial
//! applications, maps and arrays.

use std::rc::Rc;

use ahash::{HashMap, HashMapExt};
use xylem_name::Name;
use xylem_xpath_ast::ast;

use crate::atomic::{Atomic, MapKey};
use crate::context::Variables;
use crate::error::{Error, Result};
use crate::sequence::Sequence;

/// A function item.
#[derive(Debug, Clone)]
pub enum Function {
    /// A reference to a registered static function.
    Static {
        /// Index into the function library.
        id: usize,
        /// The function's name.
        name: Name,
        /// Its arity.
        arity: usize,
    },
    /// An inline function with its captured environment.
    Inline(Rc<InlineFunction>),
    /// A partial application with some arguments bound.
    Partial(Rc<PartialApplication>),
    /// An XPath map, which is a function of its keys.
    Map(Map),
    /// An XPath array, which is a function of its indexes.
    Array(Array),
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Function::Static { id: a, .. },
                Function::Static { id: b, .. },
            ) => a == b,
            (Function::Inline(a), Function::Inline(b)) => Rc::ptr_eq(a, b),
            (Function::Partial(a), Function::Partial(b)) => Rc::ptr_eq(a, b),
            (Function::Map(a), Function::Map(b)) => a == b,
            (Function::Array(a), Function::Array(b)) => a == b,
            _ => false,
        }
    }
}

impl Function {
    /// The arity of the function item.
    pub fn arity(&self) -> usize {
        match self {
            Function::Static { arity, .. } => *arity,
            Function::Inline(inline) => inline.params.len(),
            Function::Partial(partial) => {
                partial.bound.iter().filter(|slot| slot.is_none()).count()
            }
            Function::Map(_) | Function::Array(_) => 1,
        }
    }

    /// The name, for named function items.
    pub fn name(&self) -> Option<&Name> {
        match self {
            Function::Static { name, .. } => Some(name),
            _ => None,
        }
    }
}

/// An inline function value.
#[derive(Debug)]
pub struct InlineFunction {
    /// Parameter names in order.
    pub params: Vec<Name>,
    /// The body expression.
    pub body: ast::Expr,
    /// Variables captured at creation.
    pub closure: Variables,
}

/// A partial application produced by `?` placeholders.
#[derive(Debug)]
pub struct PartialApplication {
    /// The function being applied.
    pub base: Function,
    /// One slot per original parameter; `None` is a placeholder.
    pub bound: Vec<Option<Sequence>>,
}

/// Duplicate-key handling for [`Map::merge`], selected by the
/// `duplicates` entry of the `map:merge` options map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeDuplicates {
    /// Keep the value from the first map containing the key.
    #[default]
    UseFirst,
    /// Keep the value from the last map containing the key.
    UseLast,
    /// Any value may be kept; this implementation keeps the first.
    UseAny,
    /// Duplicate keys raise FOJS0003.
    Reject,
    /// Concatenate the values of duplicate keys.
    Combine,
}

impl MergeDuplicates {
    /// Parse the `duplicates` option value; unknown values are
    /// FOJS0005.
    pub fn by_name(name: &str) -> Result<MergeDuplicates> {
        Ok(match name {
            "use-first" => MergeDuplicates::UseFirst,
            "use-last" => MergeDuplicates::UseLast,
            "use-any" => MergeDuplicates::UseAny,
            "reject" => MergeDuplicates::Reject,
            "combine" => MergeDuplicates::Combine,
            _ => return Err(Error::FOJS0005),
        })
    }
}

/// An immutable XPath map preserving insertion order.
#[derive(Debug, Clone)]
pub struct Map(Rc<MapInner>);

#[derive(Debug)]
struct MapInner {
    entries: Vec<(Atomic, Sequence)>,
    index: HashMap<MapKey, usize>,
}

impl PartialEq for Map {
    fn eq(&self, other: &Self) -> bool {
        if Rc::ptr_eq(&self.0, &other.0) {
            return true;
        }
        if self.0.entries.len() != other.0.entries.len() {
            return false;
        }
        self.0.index.keys().all(|key| {
            let a = self.0.index.get(key).map(|i| &self.0.entries[*i].1);
            let b = other.0.index.get(key).map(|i| &other.0.entries[*i].1);
            a == b
        })
    }
}

impl Map {
    /// Build a map; duplicate keys are an error.
    pub fn new(entries: Vec<(Atomic, Sequence)>) -> Result<Self> {
        let mut index = HashMap::with_capacity(entries.len());
        for (i, (key, _)) in entries.iter().enumerate() {
            let map_key = MapKey::new(key)?;
            if index.insert(map_key, i).is_some() {
                return Err(Error::XQDY0137);
            }
        }
        Ok(Map(Rc::new(MapInner { entries, index })))
    }

    /// The empty map.
    pub fn empty() -> Self {
        Map::new(Vec::new()).unwrap()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.entries.len()
    }

    /// Whether the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.0.entries.is_empty()
    }

    /// Value lookup.
    pub fn get(&self, key: &Atomic) -> Result<Option<&Sequence>> {
        let map_key = MapKey::new(key)?;
        Ok(self
            .0
            .index
            .get(&map_key)
            .map(|i| &self.0.entries[*i].1))
    }

    /// Whether the key is present.
    pub fn contains(&self, key: &Atomic) -> Result<bool> {
        Ok(self.0.index.contains_key(&MapKey::new(key)?))
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = &(Atomic, Sequence)> {
        self.0.entries.iter()
    }

    /// A new map with `key` set to `value`; the original is unchanged.
    pub fn put(&self, key: Atomic, value: Sequence) -> Result<Map> {
        let map_key = MapKey::new(&key)?;
        let mut entries = self.0.entries.clone();
        match self.0.index.get(&map_key) {
            Some(i) => entries[*i] = (key, value),
            None => entries.push((key, value)),
        }
        let mut index = HashMap::with_capacity(entries.len());
        for (i, (k, _)) in entries.iter().enumerate() {
            index.insert(MapKey::new(k)?, i);
        }
        Ok(Map(Rc::new(MapInner { entries, index })))
    }

    /// A new map without `key`.
    pub fn remove(&self, key: &Atomic) -> Result<Map> {
        let map_key = MapKey::new(key)?;
        let entries: Vec<_> = self
            .0
            .entries
            .iter()
            .enumerate()
            .filter(|(i, _)| self.0.index.get(&map_key) != Some(i))
            .map(|(_, e)| e.clone())
            .collect();
        Map::new(entries)
    }

    /// Merge maps under a duplicate-key policy. Entries keep the
    /// position of the key's first appearance.
    pub fn merge(maps: &[Map], duplicates: MergeDuplicates) -> Result<Map> {
        let mut entries: Vec<(Atomic, Sequence)> = Vec::new();
        let mut index: HashMap<MapKey, usize> = HashMap::new();
        for map in maps {
            for (key, value) in map.entries() {
                let map_key = MapKey::new(key)?;
                match index.get(&map_key) {
                    None => {
                        index.insert(map_key, entries.len());
                        entries.push((key.clone(), value.clone()));
                    }
                    Some(slot) => match duplicates {
                        MergeDuplicates::UseFirst | MergeDuplicates::UseAny => {}
                        MergeDuplicates::UseLast => {
                            entries[*slot] = (key.clone(), value.clone());
                        }
                        MergeDuplicates::Reject => return Err(Error::FOJS0003),
                        MergeDuplicates::Combine => {
                            let combined = Sequence::concat(vec![
                                entries[*slot].1.clone(),
                                value.clone(),
                            ]);
                            entries[*slot].1 = combined;
                        }
                    },
                }
            }
        }
        Map::new(entries)
    }
}

/// An immutable XPath array: ordered, 1-indexed, members unflattened.
#[derive(Debug, Clone, PartialEq)]
pub struct Array(Rc<Vec<Sequence>>);

impl Array {
    /// Build from members.
    pub fn new(members: Vec<Sequence>) -> Self {
        Array(Rc::new(members))
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the array has no members.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Member access, 0-based internally.
    pub fn get(&self, index: usize) -> Option<&Sequence> {
        self.0.get(index)
    }

    /// Iterate over members.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Sequence> {
        self.0.iter()
    }

    /// A new array with the member at 0-based `index` replaced.
    pub fn put(&self, index: usize, member: Sequence) -> Result<Array> {
        if index >= self.0.len() {
            return Err(Error::FOAY0001);
        }
        let mut members = self.0.as_ref().clone();
        members[index] = member;
        Ok(Array::new(members))
    }

    /// A new array with a member appended.
    pub fn append(&self, member: Sequence) -> Array {
        let mut members = self.0.as_ref().clone();
        members.push(member);
        Array::new(members)
    }

    /// A new array with the member at 0-based `index` removed.
    pub fn remove(&self, index: usize) -> Result<Array> {
        if index >= self.0.len() {
            return Err(Error::FOAY0001);
        }
        let mut members = self.0.as_ref().clone();
        members.remove(index);
        Ok(Array::new(members))
    }

    /// A new array with a member inserted before 0-based `index`.
    pub fn insert_before(&self, index: usize, member: Sequence) -> Result<Array> {
        if index > self.0.len() {
            return Err(Error::FOAY0001);
        }
        let mut members = self.0.as_ref().clone();
        members.insert(index, member);
        Ok(Array::new(members))
    }

    /// Concatenate arrays.
    pub fn join(arrays: &[Array]) -> Array {
        let mut members = Vec::new();
        for array in arrays {
            members.extend(array.iter().cloned());
        }
        Array::new(members)
    }

    /// A contiguous slice of members.
    pub fn subarray(&self, start: usize, length: usize) -> Result<Array> {
        if start > self.0.len() || start + length > self.0.len() {
            return Err(Error::FOAY0001);
        }
        Ok(Array::new(self.0[start..start + length].to_vec()))
    }

    /// Members in reverse order.
    pub fn reversed(&self) -> Array {
        let mut members = self.0.as_ref().clone();
        members.reverse();
        Array::new(members)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_put_leaves_original_unchanged() {
        let m = Map::new(vec![(Atomic::string("a"), Sequence::from(Atomic::integer(1)))]).unwrap();
        let m2 = m.put(Atomic::string("b"), Sequence::from(Atomic::integer(2))).unwrap();
        assert_eq!(m.len(), 1);
        assert_eq!(m2.len(), 2);
        assert!(m.get(&Atomic::string("b")).unwrap().is_none());
        assert!(m2.get(&Atomic::string("b")).unwrap().is_some());
    }

    #[test]
    fn map_duplicate_keys_rejected() {
        let result = Map::new(vec![
            (Atomic::integer(1), Sequence::empty()),
            (Atomic::Double(1.0), Sequence::empty()),
        ]);
        assert_eq!(result.unwrap_err(), Error::XQDY0137);
    }

    #[test]
    fn map_preserves_insertion_order() {
        let m = Map::new(vec![
            (Atomic::string("z"), Sequence::empty()),
            (Atomic::string("a"), Sequence::empty()),
        ])
        .unwrap();
        let keys: Vec<String> = m.entries().map(|(k, _)| k.string_value()).collect();
        assert_eq!(keys, vec!["z", "a"]);
    }

    #[test]
    fn merge_honors_the_duplicates_policy() {
        let first = Map::new(vec![(Atomic::string("k"), Sequence::from(Atomic::integer(1)))])
            .unwrap();
        let second = Map::new(vec![(Atomic::string("k"), Sequence::from(Atomic::integer(2)))])
            .unwrap();
        let maps = [first, second];

        let merged = Map::merge(&maps, MergeDuplicates::UseFirst).unwrap();
        assert_eq!(
            merged.get(&Atomic::string("k")).unwrap().unwrap(),
            &Sequence::from(Atomic::integer(1))
        );
        let merged = Map::merge(&maps, MergeDuplicates::UseLast).unwrap();
        assert_eq!(
            merged.get(&Atomic::string("k")).unwrap().unwrap(),
            &Sequence::from(Atomic::integer(2))
        );
        let merged = Map::merge(&maps, MergeDuplicates::Combine).unwrap();
        assert_eq!(merged.get(&Atomic::string("k")).unwrap().unwrap().len(), 2);
        assert_eq!(
            Map::merge(&maps, MergeDuplicates::Reject).unwrap_err(),
            Error::FOJS0003
        );
        assert_eq!(MergeDuplicates::by_name("nope").unwrap_err(), Error::FOJS0005);
    }

    #[test]
    fn array_put_is_persistent() {
        let a = Array::new(vec![
            Sequence::from(Atomic::integer(1)),
            Sequence::from(Atomic::integer(2)),
        ]);
        let b = a.put(0, Sequence::from(Atomic::integer(9))).unwrap();
        assert_eq!(a.get(0).unwrap().atomized_one(&crate::node::Documents::new()).unwrap(), Atomic::integer(1));
        assert_eq!(b.get(0).unwrap().atomized_one(&crate::node::Documents::new()).unwrap(), Atomic::integer(9));
    }
}
