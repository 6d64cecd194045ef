// https://www.w3.org/TR/xpath-functions-31/#boolean-functions

use crate::context::StaticFunctionDescription;

use super::helpers::fn_desc;

pub(crate) fn descriptions() -> Vec<StaticFunctionDescription> {
    vec![
        fn_desc("boolean", 1, |_interp, _ctx, args| {
            Ok(args[0].effective_boolean_value()?.into())
        }),
        fn_desc("not", 1, |_interp, _ctx, args| {
            Ok((!args[0].effective_boolean_value()?).into())
        }),
        fn_desc("true", 0, |_interp, _ctx, _args| Ok(true.into())),
        fn_desc("false", 0, |_interp, _ctx, _args| Ok(false.into())),
    ]
}
