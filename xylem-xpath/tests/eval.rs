//! Evaluator behavior against small documents.

use xylem_schema_type::Xs;
use xylem_xpath::atomic::Atomic;
use xylem_xpath::sequence::{Item, Sequence};
use xylem_xpath::Query;

const DOC: &[u8] = br#"<root><item n="1">alpha</item><item n="2">beta</item><item n="3">gamma</item><misc><item n="4">delta</item></misc></root>"#;

fn eval(expression: &str) -> Sequence {
    Query::new(expression)
        .unwrap()
        .evaluate_against_bytes(DOC)
        .unwrap()
}

fn strings(sequence: &Sequence) -> Vec<String> {
    // atomic items only; node results go through eval_strings
    sequence
        .iter()
        .map(|item| match item {
            Item::Atomic(a) => a.string_value(),
            other => panic!("expected atomic, got {other:?}"),
        })
        .collect()
}

fn eval_number(expression: &str) -> f64 {
    let sequence = eval(expression);
    match sequence.exactly_one().unwrap() {
        Item::Atomic(a) => a.to_double().unwrap(),
        other => panic!("expected number, got {other:?}"),
    }
}

fn eval_bool(expression: &str) -> bool {
    eval(expression).effective_boolean_value().unwrap()
}

fn eval_string(expression: &str) -> String {
    strings(&eval(expression)).join("|")
}

#[test]
fn arithmetic_and_precedence() {
    assert_eq!(eval_number("2 + 3 * 4"), 14.0);
    assert_eq!(eval_number("(2 + 3) * 4"), 20.0);
    assert_eq!(eval_number("7 idiv 2"), 3.0);
    assert_eq!(eval_number("7 mod 2"), 1.0);
    assert_eq!(eval_number("1 div 2"), 0.5);
}

#[test]
fn paths_in_document_order_without_duplicates() {
    let result = eval("//item/@n");
    let query = Query::new("//item/@n/string()").unwrap();
    let values = query.evaluate_against_bytes(DOC).unwrap();
    assert_eq!(result.len(), 4);
    assert_eq!(strings(&values), vec!["1", "2", "3", "4"]);
}

#[test]
fn predicates_and_positions() {
    assert_eq!(eval_string("string(/root/item[2])"), "beta");
    assert_eq!(eval_string("string(/root/item[last()])"), "gamma");
    assert_eq!(eval_string("string(/root/item[@n = '2'])"), "beta");
    assert_eq!(eval_number("count(/root/item[position() > 1])"), 2.0);
}

#[test]
fn reverse_axes() {
    assert_eq!(
        eval_string("string(/root/misc/preceding-sibling::item[1]/@n)"),
        "3"
    );
    assert_eq!(eval_number("count(//item[@n='4']/ancestor::*)"), 2.0);
}

#[test]
fn string_functions() {
    assert_eq!(eval_string("upper-case('abc')"), "ABC");
    assert_eq!(eval_string("substring('12345', 2, 3)"), "234");
    assert_eq!(eval_string("normalize-space('  a   b ')"), "a b");
    assert_eq!(eval_string("translate('bar', 'abc', 'ABC')"), "BAr");
    assert_eq!(eval_string("string-join(('a', 'b', 'c'), '-')"), "a-b-c");
    assert_eq!(eval_string("replace('banana', 'a', 'o')"), "bonono");
    assert_eq!(
        eval_string("string-join(tokenize('a,b,,c', ','), '|')"),
        "a|b||c"
    );
    assert!(eval_bool("matches('abracadabra', 'bra')"));
}

#[test]
fn sequence_functions() {
    assert_eq!(eval_number("count((1, 2, 3))"), 3.0);
    assert_eq!(eval_number("count(1 to 10)"), 10.0);
    assert_eq!(eval_string("string-join(reverse(('a','b')), '')"), "ba");
    assert_eq!(eval_number("count(distinct-values((1, 1.0, 2)))"), 2.0);
    assert_eq!(eval_number("sum((1, 2, 3))"), 6.0);
    assert_eq!(eval_number("avg((2, 4))"), 3.0);
    assert_eq!(eval_number("min((5, 2, 8))"), 2.0);
    assert_eq!(eval_number("max((5, 2, 8))"), 8.0);
    assert!(eval_bool("empty(())"));
    assert!(eval_bool("exists(//item)"));
}

#[test]
fn general_vs_value_comparison() {
    assert!(eval_bool("(1, 2, 3) = 2"));
    assert!(!eval_bool("(1, 2, 3) = 9"));
    assert!(eval_bool("//item/@n = '2'"));
    assert!(eval_bool("2 eq 2"));
}

#[test]
fn conditional_and_bindings() {
    assert_eq!(eval_number("if (1 < 2) then 10 else 20"), 10.0);
    assert_eq!(
        eval_number("sum(for $i in 1 to 4 return $i * $i)"),
        30.0
    );
    assert_eq!(eval_number("let $x := 6 return $x * 7"), 42.0);
    assert!(eval_bool("some $x in (1, 2, 3) satisfies $x = 2"));
    assert!(!eval_bool("every $x in (1, 2, 3) satisfies $x < 3"));
}

#[test]
fn higher_order_functions() {
    // the spec's own example: fold-left over addition is 10
    assert_eq!(
        eval_number("fold-left((1, 2, 3, 4), 0, function($a, $b) { $a + $b })"),
        10.0
    );
    assert_eq!(
        eval_string(
            "string-join(for-each(('a', 'b'), function($s) { upper-case($s) }), '')"
        ),
        "AB"
    );
    assert_eq!(
        eval_number("count(filter(1 to 10, function($n) { $n mod 2 = 0 }))"),
        5.0
    );
    assert_eq!(
        eval_number("fold-right((1, 2, 3), 0, function($a, $b) { $a - $b })"),
        2.0
    );
}

#[test]
fn array_for_each_squares() {
    // array:for-each([1,2,3], square) is [1,4,9]
    assert_eq!(
        eval_number(
            "array:get(array:for-each([1, 2, 3], function($x) { $x * $x }), 3)"
        ),
        9.0
    );
    assert_eq!(eval_number("array:size([1, 2, 3])"), 3.0);
    assert_eq!(eval_number("array:flatten([[1, 2], [3]]) => count()"), 3.0);
}

#[test]
fn maps_are_immutable() {
    assert_eq!(
        eval_number("map:size(map:put(map { 'a' : 1 }, 'b', 2))"),
        2.0
    );
    assert_eq!(
        eval_number("let $m := map { 'a' : 1 } return (map:put($m, 'b', 2), map:size($m))[2]"),
        1.0
    );
    assert_eq!(eval_number("map { 'a' : 41 }?a + 1"), 42.0);
}

#[test]
fn map_merge_duplicate_policies() {
    // the default and explicit use-first keep the first value
    assert_eq!(
        eval_number("map:get(map:merge((map { 'k' : 1 }, map { 'k' : 2 })), 'k')"),
        1.0
    );
    assert_eq!(
        eval_number(
            "map:get(map:merge((map { 'k' : 1 }, map { 'k' : 2 }), \
             map { 'duplicates' : 'use-last' }), 'k')"
        ),
        2.0
    );
    assert_eq!(
        eval_number(
            "count(map:get(map:merge((map { 'k' : 1 }, map { 'k' : 2 }), \
             map { 'duplicates' : 'combine' }), 'k'))"
        ),
        2.0
    );
    let rejected = Query::new(
        "map:merge((map { 'k' : 1 }, map { 'k' : 2 }), map { 'duplicates' : 'reject' })",
    )
    .unwrap()
    .evaluate_against_bytes(DOC);
    assert!(rejected.is_err());
    let invalid = Query::new(
        "map:merge((map { 'k' : 1 }), map { 'duplicates' : 'sideways' })",
    )
    .unwrap()
    .evaluate_against_bytes(DOC);
    assert!(invalid.is_err());
}

#[test]
fn json_value_serialization() {
    use xylem_xpath::sequence::serialize_json;
    let value = eval("map { 'xs' : [1, 2] }");
    let documents = xylem_xpath::node::Documents::new();
    assert_eq!(
        serialize_json(&value, &documents).unwrap(),
        r#"{"xs":[1,2]}"#
    );
}

#[test]
fn typed_atomization_canonicalizes() {
    // '007' as xs:integer has string form '7' and is an xs:integer
    let value = eval("xs:integer('007')");
    match value.exactly_one().unwrap() {
        Item::Atomic(atomic) => {
            assert_eq!(atomic.string_value(), "7");
            assert_eq!(atomic.schema_type(), Xs::Integer);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(eval_bool("xs:integer('007') instance of xs:integer"));
    assert!(eval_bool("xs:byte('5') instance of xs:decimal"));
    assert!(!eval_bool("'x' instance of xs:integer"));
}

#[test]
fn cast_and_castable() {
    assert!(eval_bool("'7' castable as xs:integer"));
    assert!(!eval_bool("'x' castable as xs:integer"));
    assert_eq!(eval_string("string(xs:date('2023-04-05') + xs:dayTimeDuration('P1D'))"), "2023-04-06");
}

#[test]
fn node_identity_and_order_operators() {
    assert!(eval_bool("(//item)[1] is /root/item[1]"));
    assert!(eval_bool("/root/item[1] << /root/item[2]"));
    assert!(eval_bool("/root/misc >> /root/item[3]"));
}

#[test]
fn union_intersect_except() {
    assert_eq!(eval_number("count(//item | //misc)"), 5.0);
    assert_eq!(eval_number("count(//item intersect /root/item)"), 3.0);
    assert_eq!(eval_number("count(//item except /root/item)"), 1.0);
}

#[test]
fn simple_map_and_concat() {
    assert_eq!(eval_string("string-join((1 to 3) ! string(. * 2), ',')"), "2,4,6");
    assert_eq!(eval_string("'a' || 'b' || 'c'"), "abc");
}

#[test]
fn deep_equal_and_data() {
    assert!(eval_bool("deep-equal((1, 2), (1, 2))"));
    assert!(!eval_bool("deep-equal((1, 2), (2, 1))"));
    assert!(eval_bool("deep-equal(/root/item[1], /root/item[1])"));
    let data = eval("data(/root/item[1])");
    assert_eq!(
        data.exactly_one().unwrap(),
        &Item::Atomic(Atomic::untyped("alpha"))
    );
}

#[test]
fn dynamic_function_calls_and_partial_application() {
    assert_eq!(eval_number("function($x) { $x + 1 }(41)"), 42.0);
    assert_eq!(eval_number("let $f := fn:count#1 return $f((1, 2))"), 2.0);
    assert_eq!(
        eval_string("let $up := upper-case(?) return $up('abc')"),
        "ABC"
    );
}
