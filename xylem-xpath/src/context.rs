//! Static and dynamic evaluation contexts.

use std::cell::RefCell;
use std::rc::Rc;

use ahash::HashMap;
use xylem_name::{Name, Namespaces};

use crate::error::{Error, Result};
use crate::node::Documents;
use crate::sequence::{Item, Sequence};

/// A persistent, lexically scoped variable environment.
///
/// Binding returns a new environment sharing its tail with the old
/// one, so closures capture their scope by cloning a handle.
#[derive(Debug, Clone, Default)]
pub struct Variables(Option<Rc<VarNode>>);

#[derive(Debug)]
struct VarNode {
    name: Name,
    value: Sequence,
    parent: Variables,
}

impl Variables {
    /// The empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// A new environment with one more binding.
    pub fn bind(&self, name: Name, value: Sequence) -> Variables {
        Variables(Some(Rc::new(VarNode {
            name,
            value,
            parent: self.clone(),
        })))
    }

    /// Innermost binding for `name`.
    pub fn get(&self, name: &Name) -> Option<&Sequence> {
        let mut current = self;
        while let Some(node) = &current.0 {
            if &node.name == name {
                return Some(&node.value);
            }
            current = &node.parent;
        }
        None
    }
}

/// The moving parts of evaluation: the focus and the variable scope.
#[derive(Debug, Clone)]
pub struct EvalContext {
    /// The context item, absent until a focus is established.
    pub item: Option<Item>,
    /// 1-based context position.
    pub position: usize,
    /// Context size.
    pub size: usize,
    /// In-scope variable bindings.
    pub variables: Variables,
}

impl Default for EvalContext {
    fn default() -> Self {
        Self {
            item: None,
            position: 1,
            size: 1,
            variables: Variables::new(),
        }
    }
}

impl EvalContext {
    /// A context with no focus.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context focused on one item.
    pub fn with_item(item: Item) -> Self {
        Self {
            item: Some(item),
            position: 1,
            size: 1,
            variables: Variables::new(),
        }
    }

    /// The context item or XPDY0002.
    pub fn item(&self) -> Result<&Item> {
        self.item.as_ref().ok_or(Error::XPDY0002)
    }

    /// This context with a different focus.
    pub fn focused(&self, item: Item, position: usize, size: usize) -> EvalContext {
        EvalContext {
            item: Some(item),
            position,
            size,
            variables: self.variables.clone(),
        }
    }

    /// This context with one more variable bound.
    pub fn bound(&self, name: Name, value: Sequence) -> EvalContext {
        EvalContext {
            item: self.item.clone(),
            position: self.position,
            size: self.size,
            variables: self.variables.bind(name, value),
        }
    }
}

/// The signature of a native library function.
pub type NativeFn = dyn Fn(
    &crate::interpreter::Interpreter,
    &EvalContext,
    &[Sequence],
) -> Result<Sequence>;

/// One registered static function.
pub struct StaticFunctionDescription {
    /// The function's expanded name.
    pub name: Name,
    /// Its arity; a function registered for several arities appears
    /// once per arity.
    pub arity: usize,
    /// The implementation.
    pub func: Box<NativeFn>,
}

/// The flat function registry, keyed by (namespace, local name,
/// arity).
#[derive(Default)]
pub struct FunctionLibrary {
    descriptions: Vec<StaticFunctionDescription>,
    by_key: HashMap<(String, String, usize), usize>,
}

impl FunctionLibrary {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function; later registrations win, so extension
    /// functions can shadow.
    pub fn register(&mut self, description: StaticFunctionDescription) {
        let key = (
            description.name.namespace().to_string(),
            description.name.local_name().to_string(),
            description.arity,
        );
        let id = self.descriptions.len();
        self.descriptions.push(description);
        self.by_key.insert(key, id);
    }

    /// Register many.
    pub fn register_all(&mut self, descriptions: Vec<StaticFunctionDescription>) {
        for description in descriptions {
            self.register(description);
        }
    }

    /// Look a function up by expanded name and arity.
    pub fn lookup(&self, name: &Name, arity: usize) -> Option<usize> {
        self.by_key
            .get(&(
                name.namespace().to_string(),
                name.local_name().to_string(),
                arity,
            ))
            .copied()
    }

    /// Whether any arity of this name is registered.
    pub fn is_available(&self, name: &Name) -> bool {
        self.by_key
            .keys()
            .any(|(ns, local, _)| ns == name.namespace() && local == name.local_name())
    }

    /// The description registered under `id`.
    pub fn get(&self, id: usize) -> &StaticFunctionDescription {
        &self.descriptions[id]
    }
}

/// Loads external resources for `doc()` / `document()`.
pub trait ResourceLoader {
    /// Fetch the bytes behind a URI; `None` means unavailable.
    fn load(&mut self, uri: &str) -> Option<Vec<u8>>;
}

/// Host hooks the transform engine supplies so the XSLT-specific
/// functions can see its state.
#[allow(unused_variables)]
pub trait XsltHooks {
    /// The item `current()` returns.
    fn current(&self) -> Option<Item> {
        None
    }
    /// Look up a key index.
    fn key(&self, name: &Name, values: &[crate::atomic::Atomic]) -> Result<Sequence> {
        Err(Error::XTDE1260)
    }
    /// The current group of `xsl:for-each-group`.
    fn current_group(&self) -> Sequence {
        Sequence::empty()
    }
    /// The current grouping key.
    fn current_grouping_key(&self) -> Sequence {
        Sequence::empty()
    }
    /// A captured group of the active `xsl:analyze-string` match.
    fn regex_group(&self, number: usize) -> String {
        String::new()
    }
    /// Accumulator value before processing the context node.
    fn accumulator_before(&self, name: &Name) -> Result<Sequence> {
        Err(Error::XTDE3340)
    }
    /// Accumulator value after processing the context node.
    fn accumulator_after(&self, name: &Name) -> Result<Sequence> {
        Err(Error::XTDE3340)
    }
    /// `system-property()`.
    fn system_property(&self, name: &Name) -> String {
        String::new()
    }
    /// `element-available()`.
    fn element_available(&self, name: &Name) -> bool {
        false
    }
    /// `format-number()` against a named or the default decimal
    /// format.
    fn format_number(
        &self,
        value: f64,
        picture: &str,
        format_name: Option<&Name>,
    ) -> Result<String> {
        Err(Error::XTDE1280)
    }
}

/// Everything fixed for the duration of one evaluation run.
pub struct DynamicContext {
    /// The document pool; interior-mutable because `doc()` loads into
    /// it mid-evaluation.
    pub documents: Rc<RefCell<Documents>>,
    /// The function registry.
    pub library: Rc<FunctionLibrary>,
    /// Statically known namespaces (for QName casts).
    pub namespaces: Namespaces,
    /// Transform-engine hooks, when evaluating inside XSLT.
    pub xslt: Option<Rc<dyn XsltHooks>>,
    /// External resource loader for `doc()`/`document()`.
    pub loader: Option<Rc<RefCell<dyn ResourceLoader>>>,
    /// Base URI used to resolve relative document references.
    pub base_uri: Option<String>,
}

impl DynamicContext {
    /// A context over a fresh document pool and the core library.
    pub fn new(library: Rc<FunctionLibrary>) -> Self {
        Self {
            documents: Rc::new(RefCell::new(Documents::new())),
            library,
            namespaces: Namespaces::default(),
            xslt: None,
            loader: None,
            base_uri: None,
        }
    }
}
