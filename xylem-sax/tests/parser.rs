//! End-to-end parser tests driving the push API.

use std::cell::RefCell;
use std::rc::Rc;

use xylem_name::Name;
use xylem_sax::{
    Attributes, Event, EventRecorder, PushParser, SaxError,
};

fn recorder_parser() -> (PushParser, Rc<RefCell<EventRecorder>>) {
    let recorder = Rc::new(RefCell::new(EventRecorder::new()));
    let mut parser = PushParser::new();
    parser.set_content_handler(recorder.clone());
    parser.set_lexical_handler(recorder.clone());
    (parser, recorder)
}

fn parse_events(chunks: &[&[u8]]) -> Vec<Event> {
    let (mut parser, recorder) = recorder_parser();
    for chunk in chunks {
        parser.feed(chunk).unwrap();
    }
    parser.close().unwrap();
    let events = recorder.borrow().buffer.events().to_vec();
    events
}

fn start(name: &str) -> Event {
    Event::StartElement(Name::local(name), Attributes::new())
}

fn end(name: &str) -> Event {
    Event::EndElement(Name::local(name))
}

#[test]
fn minimal_document() {
    let events = parse_events(&[b"<a/>"]);
    assert_eq!(
        events,
        vec![
            Event::StartDocument,
            start("a"),
            end("a"),
            Event::EndDocument,
        ]
    );
}

#[test]
fn split_xml_declaration() {
    // the declaration split across four chunks must produce the same
    // events as a single feed
    let events = parse_events(&[
        b"<?xml ver",
        b"sion=\"1.0\" enc",
        b"oding=\"UTF-8\"?><a/",
        b">",
    ]);
    assert_eq!(
        events,
        vec![
            Event::StartDocument,
            start("a"),
            end("a"),
            Event::EndDocument,
        ]
    );
}

#[test]
fn locator_reports_encoding_and_version() {
    let (mut parser, _recorder) = recorder_parser();
    parser
        .feed(b"<?xml version=\"1.0\" encoding=\"UTF-8\"?><a/>")
        .unwrap();
    parser.close().unwrap();
    let locator = parser.locator();
    assert_eq!(locator.encoding().as_deref(), Some("UTF-8"));
    assert_eq!(locator.xml_version().as_deref(), Some("1.0"));
}

#[test]
fn crlf_across_chunks_yields_single_lf() {
    let events = parse_events(&[b"<a>x\r", b"\ny</a>"]);
    assert_eq!(
        events,
        vec![
            Event::StartDocument,
            start("a"),
            Event::Characters("x\ny".to_string()),
            end("a"),
            Event::EndDocument,
        ]
    );
}

#[test]
fn chunk_boundary_invariance() {
    // every split point of this document must produce identical events
    let doc: &[u8] = b"<?xml version=\"1.0\"?><r a=\"1\"><b>text &amp; more</b><!--c--><c/></r>";
    let reference = parse_events(&[doc]);
    for split in 1..doc.len() {
        let events = parse_events(&[&doc[..split], &doc[split..]]);
        assert_eq!(events, reference, "split at byte {split}");
    }
}

#[test]
fn default_namespace_and_redeclaration() {
    let events = parse_events(&[b"<a xmlns=\"u\"><b xmlns=\"\"/></a>"]);
    assert_eq!(
        events,
        vec![
            Event::StartDocument,
            Event::StartPrefixMapping("".to_string(), "u".to_string()),
            Event::StartElement(Name::new("u", "a"), Attributes::new()),
            Event::StartPrefixMapping("".to_string(), "".to_string()),
            Event::StartElement(Name::new("", "b"), Attributes::new()),
            Event::EndElement(Name::new("", "b")),
            Event::EndPrefixMapping("".to_string()),
            Event::EndElement(Name::new("u", "a")),
            Event::EndPrefixMapping("".to_string()),
            Event::EndDocument,
        ]
    );
}

#[test]
fn prefixed_namespaces_scope_correctly() {
    let events = parse_events(&[b"<p:a xmlns:p=\"u\" p:x=\"1\"/>"]);
    let mut attrs = Attributes::new();
    attrs.push(Name::prefixed("u", "x", "p"), "1");
    assert_eq!(
        events,
        vec![
            Event::StartDocument,
            Event::StartPrefixMapping("p".to_string(), "u".to_string()),
            Event::StartElement(Name::prefixed("u", "a", "p"), attrs),
            Event::EndElement(Name::prefixed("u", "a", "p")),
            Event::EndPrefixMapping("p".to_string()),
            Event::EndDocument,
        ]
    );
}

#[test]
fn undeclared_prefix_is_fatal() {
    let (mut parser, _recorder) = recorder_parser();
    let result = parser.feed(b"<p:a/>");
    assert!(matches!(result, Err(SaxError::Namespace(_))));
}

#[test]
fn mismatched_end_tag_is_fatal() {
    let (mut parser, _recorder) = recorder_parser();
    let result = parser.feed(b"<a></b>");
    assert!(matches!(result, Err(SaxError::WellFormedness(_))));
}

#[test]
fn attribute_value_normalization() {
    let events = parse_events(&[b"<a x=\"one\ntwo\tthree\"/>"]);
    match &events[1] {
        Event::StartElement(_, attrs) => {
            // literal whitespace becomes spaces
            assert_eq!(attrs.value("", "x"), Some("one two three"));
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[test]
fn character_references_resolve() {
    let events = parse_events(&[b"<a>&#65;&#x42;&lt;</a>"]);
    assert_eq!(
        events[2],
        Event::Characters("AB<".to_string())
    );
}

#[test]
fn cdata_sections_bracketed_and_unescaped() {
    let events = parse_events(&[b"<a><![CDATA[x<&y]]></a>"]);
    assert_eq!(
        events,
        vec![
            Event::StartDocument,
            start("a"),
            Event::StartCdata,
            Event::Characters("x<&y".to_string()),
            Event::EndCdata,
            end("a"),
            Event::EndDocument,
        ]
    );
}

#[test]
fn internal_entity_expansion_with_boundaries() {
    let doc = b"<!DOCTYPE a [<!ENTITY greet \"hi <b>there</b>\">]><a>&greet;</a>";
    let events = parse_events(&[doc]);
    assert_eq!(
        events,
        vec![
            Event::StartDocument,
            start("a"),
            Event::StartEntity("greet".to_string()),
            Event::Characters("hi ".to_string()),
            start("b"),
            Event::Characters("there".to_string()),
            end("b"),
            Event::EndEntity("greet".to_string()),
            end("a"),
            Event::EndDocument,
        ]
    );
}

#[test]
fn recursive_entity_is_fatal() {
    let doc = b"<!DOCTYPE a [<!ENTITY x \"&y;\"><!ENTITY y \"&x;\">]><a>&x;</a>";
    let (mut parser, _recorder) = recorder_parser();
    let result = parser.feed(doc);
    assert!(matches!(result, Err(SaxError::WellFormedness(_))));
}

#[test]
fn dtd_attribute_defaulting() {
    let doc = b"<!DOCTYPE a [<!ATTLIST a kind CDATA \"plain\">]><a/>";
    let events = parse_events(&[doc]);
    match &events[1] {
        Event::StartElement(_, attrs) => {
            assert_eq!(attrs.value("", "kind"), Some("plain"));
            assert!(!attrs.get(0).unwrap().specified);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[test]
fn entity_in_attribute_value() {
    let doc = b"<!DOCTYPE a [<!ENTITY who \"world\">]><a greeting=\"hello &who;\"/>";
    let events = parse_events(&[doc]);
    match &events[1] {
        Event::StartElement(_, attrs) => {
            assert_eq!(attrs.value("", "greeting"), Some("hello world"));
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[test]
fn doctype_with_skipped_external_subset() {
    // no resolver installed: the external subset is skipped
    let doc = b"<!DOCTYPE a SYSTEM \"a.dtd\"><a>&undeclared;</a>";
    let events = parse_events(&[doc]);
    assert!(events.contains(&Event::SkippedEntity("[dtd]".to_string())));
    assert!(events.contains(&Event::SkippedEntity("undeclared".to_string())));
}

#[test]
fn comments_and_pis() {
    let events = parse_events(&[b"<?go now?><a><!-- note --></a>"]);
    assert_eq!(
        events,
        vec![
            Event::StartDocument,
            Event::ProcessingInstruction("go".to_string(), "now".to_string()),
            start("a"),
            Event::Comment(" note ".to_string()),
            end("a"),
            Event::EndDocument,
        ]
    );
}

#[test]
fn unbalanced_document_fails_on_close() {
    let (mut parser, _recorder) = recorder_parser();
    parser.feed(b"<a><b>").unwrap();
    assert!(matches!(
        parser.close(),
        Err(SaxError::WellFormedness(_))
    ));
}

#[test]
fn content_after_root_is_fatal() {
    let (mut parser, _recorder) = recorder_parser();
    let result = parser.feed(b"<a/><b/>");
    assert!(matches!(result, Err(SaxError::WellFormedness(_))));
}

#[test]
fn reset_allows_reuse() {
    let (mut parser, recorder) = recorder_parser();
    parser.feed(b"<a/>").unwrap();
    parser.close().unwrap();
    parser.reset();
    recorder.borrow_mut().buffer.clear();
    parser.feed(b"<b/>").unwrap();
    parser.close().unwrap();
    let events = recorder.borrow().buffer.events().to_vec();
    assert_eq!(
        events,
        vec![
            Event::StartDocument,
            start("b"),
            end("b"),
            Event::EndDocument,
        ]
    );
}

#[test]
fn round_trip_through_writer() {
    use xylem_sax::XmlWriter;

    let doc: &[u8] = b"<r a=\"1\"><b>text &amp; more</b><c/></r>";
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
    // reparse: same event stream
    assert_eq!(parse_events(&[&bytes]), parse_events(&[doc]));
}
