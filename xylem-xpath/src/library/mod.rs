//! The standard function library.
//!
//! Each module contributes `descriptions()`; everything lands in one
//! flat registry keyed by (namespace, local name, arity). Extension
//! and user functions register into the same table.

mod accessor;
mod array;
mod boolean;
mod helpers;
mod hof;
mod map;
mod numeric;
mod sequence;
mod string;
mod xs;
mod xslt;

use std::rc::Rc;

use crate::context::{FunctionLibrary, StaticFunctionDescription};

/// All core function descriptions.
pub fn static_function_descriptions() -> Vec<StaticFunctionDescription> {
    let mut descriptions = Vec::new();
    descriptions.extend(accessor::descriptions());
    descriptions.extend(boolean::descriptions());
    descriptions.extend(numeric::descriptions());
    descriptions.extend(string::descriptions());
    descriptions.extend(sequence::descriptions());
    descriptions.extend(hof::descriptions());
    descriptions.extend(map::descriptions());
    descriptions.extend(array::descriptions());
    descriptions.extend(xs::descriptions());
    descriptions.extend(xslt::descriptions());
    descriptions
}

/// A registry preloaded with the core library.
pub fn core_library() -> Rc<FunctionLibrary> {
    let mut library = FunctionLibrary::new();
    library.register_all(static_function_descriptions());
    Rc::new(library)
}
