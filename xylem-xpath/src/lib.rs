#![warn(missing_docs)]

//! The Xylem XPath 3.1 engine.
//!
//! Values, atomics, maps and arrays, the buffered node tree, the
//! tree-walking evaluator and the standard function library. The
//! transform engine builds on this crate; plain XPath callers can use
//! [`Query`] directly.

pub mod atomic;
pub mod context;
mod error;
pub mod function;
pub mod interpreter;
pub mod library;
pub mod node;
pub mod sequence;

pub use error::{Error, Result};

use std::cell::RefCell;
use std::rc::Rc;

use xylem_name::Namespaces;
use xylem_xpath_ast::{ast, parse_xpath};

use context::{DynamicContext, EvalContext, FunctionLibrary};
use interpreter::Interpreter;
use node::{Documents, NodeId};
use sequence::{Item, Sequence};

/// A compiled XPath expression.
pub struct Query {
    expr: ast::Expr,
    namespaces: Namespaces,
}

impl Query {
    /// Compile an expression against the default static context.
    pub fn new(expression: &str) -> Result<Query> {
        Query::with_namespaces(expression, Namespaces::default())
    }

    /// Compile with explicit namespaces.
    pub fn with_namespaces(expression: &str, namespaces: Namespaces) -> Result<Query> {
        let expr = parse_xpath(expression, &namespaces).map_err(|_| Error::XPST0003)?;
        Ok(Query { expr, namespaces })
    }

    /// The parsed AST.
    pub fn ast(&self) -> &ast::Expr {
        &self.expr
    }

    /// Evaluate against a prepared dynamic context and focus.
    pub fn evaluate(&self, dynamic: &DynamicContext, ctx: &EvalContext) -> Result<Sequence> {
        Interpreter::new(dynamic).evaluate(&self.expr, ctx)
    }

    /// Parse a document from bytes and evaluate this expression with
    /// its root as the context item. Convenience for tests and simple
    /// callers.
    pub fn evaluate_against_bytes(&self, bytes: &[u8]) -> Result<Sequence> {
        let documents = Rc::new(RefCell::new(Documents::new()));
        let root = {
            let mut pool = documents.borrow_mut();
            node::parse_bytes_into(&mut pool, bytes, None).map_err(|_| Error::FODC0002)?
        };
        let dynamic = DynamicContext {
            documents,
            library: library::core_library(),
            namespaces: self.namespaces.clone(),
            xslt: None,
            loader: None,
            base_uri: None,
        };
        let ctx = EvalContext::with_item(Item::Node(root));
        Interpreter::new(&dynamic).evaluate(&self.expr, &ctx)
    }
}

/// Build a dynamic context around an existing document pool.
pub fn dynamic_context(
    documents: Rc<RefCell<Documents>>,
    library: Rc<FunctionLibrary>,
    namespaces: Namespaces,
) -> DynamicContext {
    DynamicContext {
        documents,
        library,
        namespaces,
        xslt: None,
        loader: None,
        base_uri: None,
    }
}

/// Focus helper: a context focused on a node.
pub fn node_focus(node: NodeId) -> EvalContext {
    EvalContext::with_item(Item::Node(node))
}
