//! Parser → engine → serializer pipeline behavior.

use std::cell::RefCell;
use std::rc::Rc;

use xylem::sax::{Event, EventRecorder, XmlWriter};
use xylem::xpath::context::EvalContext;
use xylem::xpath::interpreter::Interpreter;
use xylem::xpath::node::{parse_bytes_into, Documents, NodeKind};
use xylem::xpath::sequence::Item;
use xylem::{PushParser, Query};
use xylem_schema_type::Xs;

fn events_of(chunks: &[&[u8]]) -> Vec<Event> {
    let recorder = Rc::new(RefCell::new(EventRecorder::new()));
    let mut parser = PushParser::new();
    parser.set_content_handler(recorder.clone());
    parser.set_lexical_handler(recorder.clone());
    for chunk in chunks {
        parser.feed(chunk).unwrap();
    }
    parser.close().unwrap();
    let events = recorder.borrow().buffer.events().to_vec();
    events
}

#[test]
fn chunk_boundary_invariance_through_the_whole_pipeline() {
    let doc: &[u8] =
        br#"<?xml version="1.0"?><doc a="1"><x xmlns:p="u"><p:y>text &#65; more</p:y></x><!--c--></doc>"#;
    let reference = events_of(&[doc]);
    for split in 1..doc.len() {
        assert_eq!(
            events_of(&[&doc[..split], &doc[split..]]),
            reference,
            "split at {split}"
        );
    }
}

#[test]
fn round_trip_preserves_the_event_stream() {
    let doc: &[u8] = br#"<r a="1"><b>text</b><c/><d>mixed <e/> tail</d></r>"#;
    let writer = Rc::new(RefCell::new(XmlWriter::new(Vec::new())));
    writer.borrow_mut().set_omit_xml_declaration(true);
    let mut parser = PushParser::new();
    parser.set_content_handler(writer.clone());
    parser.feed(doc).unwrap();
    parser.close().unwrap();
    let bytes = {
        let mut w = writer.borrow_mut();
        w.end_document().unwrap();
        std::mem::replace(&mut *w, XmlWriter::new(Vec::new()))
            .into_inner()
            .unwrap()
    };
    assert_eq!(events_of(&[&bytes]), events_of(&[doc]));
}

#[test]
fn typed_atomization_follows_the_annotation() {
    // an element annotated xs:integer with lexical value "007":
    // data(.) is the typed integer 7, string(.) is the canonical "7"
    let documents = Rc::new(RefCell::new(Documents::new()));
    let root = {
        let mut pool = documents.borrow_mut();
        parse_bytes_into(&mut pool, b"<n>007</n>", None).unwrap()
    };
    let element = {
        let pool = documents.borrow();
        pool.children(root)
            .into_iter()
            .find(|n| matches!(pool.kind(*n), NodeKind::Element { .. }))
            .unwrap()
    };
    documents.borrow_mut().set_annotation(element, Xs::Integer);

    let dynamic = xylem::xpath::dynamic_context(
        documents,
        xylem::xpath::library::core_library(),
        xylem::name::Namespaces::default(),
    );
    let interp = Interpreter::new(&dynamic);
    let ctx = EvalContext::with_item(Item::Node(element));

    let data_query = Query::new("data(.)").unwrap();
    let data = data_query.evaluate(&dynamic, &ctx).unwrap();
    let atomic = match data.exactly_one().unwrap() {
        Item::Atomic(atomic) => atomic.clone(),
        other => panic!("unexpected {other:?}"),
    };
    assert_eq!(atomic.schema_type(), Xs::Integer);
    assert_eq!(atomic.string_value(), "7");

    let instance = Query::new(". instance of element()").unwrap();
    assert!(instance
        .evaluate(&dynamic, &ctx)
        .unwrap()
        .effective_boolean_value()
        .unwrap());

    let string_query = Query::new("string(.)").unwrap();
    let s = string_query.evaluate(&dynamic, &ctx).unwrap();
    assert_eq!(
        s.exactly_one().unwrap(),
        &Item::Atomic(xylem::xpath::atomic::Atomic::string("7"))
    );
    let _ = interp;
}

#[test]
fn higher_order_functions_from_the_spec() {
    // fold-left over addition is the number 10
    let fold = Query::new("fn:fold-left((1, 2, 3, 4), 0, function($a, $b) { $a + $b })")
        .unwrap()
        .evaluate_against_bytes(b"<r/>")
        .unwrap();
    let value = match fold.exactly_one().unwrap() {
        Item::Atomic(atomic) => atomic.to_double().unwrap(),
        other => panic!("unexpected {other:?}"),
    };
    assert_eq!(value, 10.0);

    // array:for-each squares into [1, 4, 9]
    let squares = Query::new(
        "let $a := array:for-each([1, 2, 3], function($x) { $x * $x }) \
         return string-join(array:flatten($a) ! string(.), ',')",
    )
    .unwrap()
    .evaluate_against_bytes(b"<r/>")
    .unwrap();
    assert_eq!(
        squares.exactly_one().unwrap(),
        &Item::Atomic(xylem::xpath::atomic::Atomic::string("1,4,9"))
    );
}

#[test]
fn serializer_composes_with_transform_handler() {
    // SAX pipeline composition: parser → transformer handler → writer
    let stylesheet = r#"<xsl:stylesheet version="3.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
             <xsl:template match="i"><o><xsl:value-of select="."/></o></xsl:template>
           </xsl:stylesheet>"#;
    let compiled = xylem::compile_stylesheet(stylesheet.as_bytes()).unwrap();
    let transformer = xylem::Transformer::new(compiled);

    let writer = Rc::new(RefCell::new(XmlWriter::new(Vec::new())));
    writer.borrow_mut().set_omit_xml_declaration(true);
    let handler = transformer
        .handler(writer.clone(), Some(writer.clone()))
        .unwrap();
    let handler = Rc::new(RefCell::new(handler));

    let mut parser = PushParser::new();
    parser.set_content_handler(handler.clone());
    parser.feed(b"<r><i>a</i><i>b</i></r>").unwrap();
    parser.close().unwrap();

    drop(parser);
    drop(handler);
    let bytes = Rc::try_unwrap(writer)
        .ok()
        .expect("writer still shared")
        .into_inner()
        .into_inner()
        .unwrap();
    assert_eq!(String::from_utf8(bytes).unwrap(), "<o>a</o><o>b</o>");
}
