//! End-to-end transformation tests.

use xylem::{compile_stylesheet, ErrorMode, Name, Transformer};

fn transform(stylesheet: &str, input: &str) -> String {
    let compiled = compile_stylesheet(stylesheet.as_bytes()).unwrap();
    let mut transformer = Transformer::new(compiled);
    transformer.set_output_property("omit-xml-declaration", "yes");
    let output = transformer
        .transform_bytes(input.as_bytes(), Vec::new())
        .unwrap();
    String::from_utf8(output).unwrap()
}

const XSL_OPEN: &str =
    r#"<xsl:stylesheet version="3.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">"#;

fn sheet(body: &str) -> String {
    format!("{XSL_OPEN}{body}</xsl:stylesheet>")
}

#[test]
fn streamed_position_counter_without_buffering() {
    // a position() in a streamable template runs on a synthesized
    // counter with no grounded buffering at all
    let stylesheet = sheet(r#"<xsl:template match="item"><x p="{position()}"/></xsl:template>"#);
    let compiled = compile_stylesheet(stylesheet.as_bytes()).unwrap();
    let mut transformer = Transformer::new(compiled);
    transformer.set_output_property("omit-xml-declaration", "yes");
    assert!(transformer.is_streaming());
    let output = transformer
        .transform_bytes(b"<r><item/><item/><item/></r>", Vec::new())
        .unwrap();
    assert_eq!(
        String::from_utf8(output).unwrap(),
        r#"<x p="1"/><x p="2"/><x p="3"/>"#
    );
    assert_eq!(transformer.buffered_subtree_count(), 0);
}

#[test]
fn count_preceding_sibling_rewrites_and_streams() {
    let stylesheet = sheet(
        r#"<xsl:template match="item"><n c="{count(preceding-sibling::item)}"/></xsl:template>"#,
    );
    let compiled = compile_stylesheet(stylesheet.as_bytes()).unwrap();
    let mut transformer = Transformer::new(compiled);
    transformer.set_output_property("omit-xml-declaration", "yes");
    assert!(transformer.is_streaming());
    let output = transformer
        .transform_bytes(b"<r><item/><item/><item/></r>", Vec::new())
        .unwrap();
    assert_eq!(
        String::from_utf8(output).unwrap(),
        r#"<n c="0"/><n c="1"/><n c="2"/>"#
    );
    assert_eq!(transformer.buffered_subtree_count(), 0);
}

#[test]
fn running_sum_of_preceding_attributes_streams() {
    let stylesheet = sheet(
        r#"<xsl:template match="item"><n s="{sum(preceding-sibling::item/@qty)}"/></xsl:template>"#,
    );
    let compiled = compile_stylesheet(stylesheet.as_bytes()).unwrap();
    let mut transformer = Transformer::new(compiled);
    transformer.set_output_property("omit-xml-declaration", "yes");
    let output = transformer
        .transform_bytes(
            br#"<r><item qty="2"/><item qty="3"/><item qty="5"/></r>"#,
            Vec::new(),
        )
        .unwrap();
    assert_eq!(
        String::from_utf8(output).unwrap(),
        r#"<n s="0"/><n s="2"/><n s="5"/>"#
    );
    assert_eq!(transformer.buffered_subtree_count(), 0);
}

#[test]
fn grounded_template_buffers_exactly_its_subtrees() {
    // last() forces the template off the streamable classes, but the
    // stylesheet still streams: the item subtrees ground, nothing else
    let stylesheet = sheet(
        r#"<xsl:template match="item"><x><xsl:value-of select="b[2]"/></x></xsl:template>"#,
    );
    let compiled = compile_stylesheet(stylesheet.as_bytes()).unwrap();
    let mut transformer = Transformer::new(compiled);
    transformer.set_output_property("omit-xml-declaration", "yes");
    assert!(transformer.is_streaming());
    let output = transformer
        .transform_bytes(
            b"<r><item><b>one</b><b>two</b></item><item><b>x</b><b>y</b></item></r>",
            Vec::new(),
        )
        .unwrap();
    assert_eq!(String::from_utf8(output).unwrap(), "<x>two</x><x>y</x>");
    assert_eq!(transformer.buffered_subtree_count(), 2);
}

#[test]
fn value_of_dot_streams_text() {
    let stylesheet =
        sheet(r#"<xsl:template match="item"><t><xsl:value-of select="."/></t></xsl:template>"#);
    let compiled = compile_stylesheet(stylesheet.as_bytes()).unwrap();
    let mut transformer = Transformer::new(compiled);
    transformer.set_output_property("omit-xml-declaration", "yes");
    let output = transformer
        .transform_bytes(b"<r><item>al<b>ph</b>a</item><item>beta</item></r>", Vec::new())
        .unwrap();
    assert_eq!(
        String::from_utf8(output).unwrap(),
        "<t>alpha</t><t>beta</t>"
    );
    assert_eq!(transformer.buffered_subtree_count(), 0);
}

#[test]
fn full_document_mode_for_reverse_axes() {
    // preceding-sibling in a select is FREE_RANGING, so the document
    // buffers and the ordinary evaluator answers it
    let stylesheet = sheet(
        r#"<xsl:template match="/"><xsl:apply-templates select="//b"/></xsl:template>
           <xsl:template match="b"><p><xsl:value-of select="preceding-sibling::a"/></p></xsl:template>"#,
    );
    let compiled = compile_stylesheet(stylesheet.as_bytes()).unwrap();
    let mut transformer = Transformer::new(compiled);
    transformer.set_output_property("omit-xml-declaration", "yes");
    assert!(!transformer.is_streaming());
    let output = transformer
        .transform_bytes(b"<r><a>first</a><b/></r>", Vec::new())
        .unwrap();
    assert_eq!(String::from_utf8(output).unwrap(), "<p>first</p>");
}

#[test]
fn choose_for_each_and_sort() {
    let stylesheet = sheet(
        r#"<xsl:template match="/">
             <out><xsl:for-each select="//w"><xsl:sort select="." data-type="number"/>
               <v><xsl:value-of select="."/></v>
             </xsl:for-each></out>
           </xsl:template>"#,
    );
    let output = transform(&stylesheet, "<r><w>30</w><w>4</w><w>100</w></r>");
    assert_eq!(output, "<out><v>4</v><v>30</v><v>100</v></out>");
}

#[test]
fn call_template_with_params() {
    let stylesheet = sheet(
        r#"<xsl:template match="/">
             <xsl:call-template name="greet">
               <xsl:with-param name="who" select="'world'"/>
             </xsl:call-template>
           </xsl:template>
           <xsl:template name="greet">
             <xsl:param name="who"/>
             <g><xsl:value-of select="concat('hello ', $who)"/></g>
           </xsl:template>"#,
    );
    assert_eq!(transform(&stylesheet, "<r/>"), "<g>hello world</g>");
}

#[test]
fn variables_and_copy_of() {
    let stylesheet = sheet(
        r#"<xsl:template match="/">
             <xsl:variable name="v"><k><inner>x</inner></k></xsl:variable>
             <out><xsl:copy-of select="$v"/></out>
           </xsl:template>"#,
    );
    assert_eq!(
        transform(&stylesheet, "<r/>"),
        "<out><k><inner>x</inner></k></out>"
    );
}

#[test]
fn modes_dispatch_separately() {
    let stylesheet = sheet(
        r#"<xsl:template match="/"><o>
             <xsl:apply-templates select="//i"/>
             <xsl:apply-templates select="//i" mode="loud"/>
           </o></xsl:template>
           <xsl:template match="i"><xsl:value-of select="."/></xsl:template>
           <xsl:template match="i" mode="loud"><xsl:value-of select="upper-case(.)"/></xsl:template>"#,
    );
    assert_eq!(transform(&stylesheet, "<r><i>ab</i></r>"), "<o>abAB</o>");
}

#[test]
fn template_priority_and_strict_conflicts() {
    let stylesheet = sheet(
        r#"<xsl:template match="/"><xsl:apply-templates select="//x"/></xsl:template>
           <xsl:template match="*"><lo/></xsl:template>
           <xsl:template match="x"><hi/></xsl:template>"#,
    );
    assert_eq!(transform(&stylesheet, "<r><x/></r>"), "<hi/>");

    // two equal-priority rules: STRICT errors, RECOVER picks the later
    let conflicted = sheet(
        r#"<xsl:template match="/"><xsl:apply-templates select="//x"/></xsl:template>
           <xsl:template match="x"><first/></xsl:template>
           <xsl:template match="x"><second/></xsl:template>"#,
    );
    let compiled = compile_stylesheet(conflicted.as_bytes()).unwrap();
    let mut strict = Transformer::new(compiled.clone());
    strict.set_output_property("omit-xml-declaration", "yes");
    assert!(strict.transform_bytes(b"<r><x/></r>", Vec::new()).is_err());
    let mut recovering = Transformer::new(compiled);
    recovering.set_output_property("omit-xml-declaration", "yes");
    recovering.set_error_mode(ErrorMode::Recover);
    let output = recovering.transform_bytes(b"<r><x/></r>", Vec::new()).unwrap();
    assert_eq!(String::from_utf8(output).unwrap(), "<second/>");
}

#[test]
fn keys_index_the_document() {
    let stylesheet = sheet(
        r#"<xsl:key name="by-id" match="p" use="@id"/>
           <xsl:template match="/"><hit><xsl:value-of select="key('by-id', 'two')"/></hit></xsl:template>"#,
    );
    assert_eq!(
        transform(
            &stylesheet,
            r#"<d><p id="one">1</p><p id="two">2</p></d>"#
        ),
        "<hit>2</hit>"
    );
}

#[test]
fn format_number_with_decimal_format() {
    let stylesheet = sheet(
        r#"<xsl:decimal-format name="eu" decimal-separator="," grouping-separator="."/>
           <xsl:template match="/"><n>
             <xsl:value-of select="format-number(12345.6, '#.##0,0', 'eu')"/>
           </n></xsl:template>"#,
    );
    assert_eq!(transform(&stylesheet, "<r/>"), "<n>12.345,6</n>");
}

#[test]
fn xsl_number_single_level() {
    let stylesheet = sheet(
        r#"<xsl:template match="/"><xsl:apply-templates select="//item"/></xsl:template>
           <xsl:template match="item"><i n="{.}"><xsl:number format="(1)"/></i></xsl:template>"#,
    );
    assert_eq!(
        transform(&stylesheet, "<r><item>a</item><item>b</item></r>"),
        r#"<i n="a">(1)</i><i n="b">(2)</i>"#
    );
}

#[test]
fn analyze_string_with_regex_groups() {
    let stylesheet = sheet(
        r#"<xsl:template match="/">
             <out><xsl:analyze-string select="string(r)" regex="([a-z]+)([0-9]+)">
               <xsl:matching-substring><m a="{regex-group(1)}" b="{regex-group(2)}"/></xsl:matching-substring>
               <xsl:non-matching-substring><t><xsl:value-of select="."/></t></xsl:non-matching-substring>
             </xsl:analyze-string></out>
           </xsl:template>"#,
    );
    assert_eq!(
        transform(&stylesheet, "<r>ab12-cd34</r>"),
        r#"<out><m a="ab" b="12"/><t>-</t><m a="cd" b="34"/></out>"#
    );
}

#[test]
fn for_each_group_by() {
    let stylesheet = sheet(
        r#"<xsl:template match="/">
             <out><xsl:for-each-group select="//c" group-by="@k">
               <g k="{current-grouping-key()}" n="{count(current-group())}"/>
             </xsl:for-each-group></out>
           </xsl:template>"#,
    );
    assert_eq!(
        transform(
            &stylesheet,
            r#"<r><c k="a"/><c k="b"/><c k="a"/></r>"#
        ),
        r#"<out><g k="a" n="2"/><g k="b" n="1"/></out>"#
    );
}

#[test]
fn iterate_with_break_and_completion() {
    let stylesheet = sheet(
        r#"<xsl:template match="/">
             <out><xsl:iterate select="//n">
               <xsl:param name="total" select="0"/>
               <xsl:choose>
                 <xsl:when test="number(.) ge 10"><xsl:break><big/></xsl:break></xsl:when>
                 <xsl:otherwise>
                   <xsl:next-iteration>
                     <xsl:with-param name="total" select="$total + number(.)"/>
                   </xsl:next-iteration>
                 </xsl:otherwise>
               </xsl:choose>
               <xsl:on-completion><sum><xsl:value-of select="$total"/></sum></xsl:on-completion>
             </xsl:iterate></out>
           </xsl:template>"#,
    );
    assert_eq!(
        transform(&stylesheet, "<r><n>1</n><n>2</n><n>3</n></r>"),
        "<out><sum>6</sum></out>"
    );
    assert_eq!(
        transform(&stylesheet, "<r><n>1</n><n>20</n><n>3</n></r>"),
        "<out><big/></out>"
    );
}

#[test]
fn accumulators_track_counts() {
    let stylesheet = sheet(
        r#"<xsl:accumulator name="items" initial-value="0">
             <xsl:accumulator-rule match="item" select="$value + 1"/>
           </xsl:accumulator>
           <xsl:template match="/"><xsl:apply-templates select="//item"/></xsl:template>
           <xsl:template match="item"><i n="{accumulator-before('items')}"/></xsl:template>"#,
    );
    assert_eq!(
        transform(&stylesheet, "<r><item/><item/><item/></r>"),
        r#"<i n="1"/><i n="2"/><i n="3"/>"#
    );
}

#[test]
fn global_params_can_be_supplied() {
    let stylesheet = sheet(
        r#"<xsl:param name="greeting" select="'hi'"/>
           <xsl:template match="/"><g><xsl:value-of select="$greeting"/></g></xsl:template>"#,
    );
    assert_eq!(transform(&stylesheet, "<r/>"), "<g>hi</g>");

    let compiled = compile_stylesheet(stylesheet.as_bytes()).unwrap();
    let mut transformer = Transformer::new(compiled);
    transformer.set_output_property("omit-xml-declaration", "yes");
    transformer.set_parameter(
        Name::local("greeting"),
        xylem::xpath::sequence::Sequence::from("hello".to_string()),
    );
    let output = transformer.transform_bytes(b"<r/>", Vec::new()).unwrap();
    assert_eq!(String::from_utf8(output).unwrap(), "<g>hello</g>");
}

#[test]
fn include_via_resolver() {
    struct Fixed;
    impl xylem::xslt::StylesheetResolver for Fixed {
        fn resolve(&mut self, href: &str) -> Option<Vec<u8>> {
            (href == "lib.xsl").then(|| {
                format!(
                    "{XSL_OPEN}<xsl:template match=\"x\"><from-lib/></xsl:template></xsl:stylesheet>"
                )
                .into_bytes()
            })
        }
    }
    let main = sheet(
        r#"<xsl:include href="lib.xsl"/>
           <xsl:template match="/"><xsl:apply-templates select="//x"/></xsl:template>"#,
    );
    let mut resolver = Fixed;
    let compiled =
        xylem::compile_stylesheet_with_resolver(main.as_bytes(), &mut resolver).unwrap();
    let mut transformer = Transformer::new(compiled);
    transformer.set_output_property("omit-xml-declaration", "yes");
    let output = transformer.transform_bytes(b"<r><x/></r>", Vec::new()).unwrap();
    assert_eq!(String::from_utf8(output).unwrap(), "<from-lib/>");
}

#[test]
fn messages_are_collected_and_terminate_fails() {
    let stylesheet = sheet(
        r#"<xsl:template match="/"><xsl:message select="'note'"/><ok/></xsl:template>"#,
    );
    let compiled = compile_stylesheet(stylesheet.as_bytes()).unwrap();
    let mut transformer = Transformer::new(compiled);
    transformer.set_output_property("omit-xml-declaration", "yes");
    let output = transformer.transform_bytes(b"<r/>", Vec::new()).unwrap();
    assert_eq!(String::from_utf8(output).unwrap(), "<ok/>");
    assert_eq!(transformer.messages(), vec!["note".to_string()]);

    let fatal = sheet(
        r#"<xsl:template match="/"><xsl:message terminate="yes" select="'stop'"/></xsl:template>"#,
    );
    let compiled = compile_stylesheet(fatal.as_bytes()).unwrap();
    let transformer = Transformer::new(compiled);
    assert!(transformer.transform_bytes(b"<r/>", Vec::new()).is_err());
}

#[test]
fn json_output_method_renders_a_json_string() {
    let stylesheet = sheet(
        r#"<xsl:output method="json"/>
           <xsl:template match="/"><xsl:value-of select="string(r)"/></xsl:template>"#,
    );
    let compiled = compile_stylesheet(stylesheet.as_bytes()).unwrap();
    let transformer = Transformer::new(compiled);
    let output = transformer
        .transform_bytes(br#"<r>say "hi"</r>"#, Vec::new())
        .unwrap();
    assert_eq!(String::from_utf8(output).unwrap(), "\"say \\\"hi\\\"\"");
}

#[test]
fn adaptive_output_method_skips_the_declaration() {
    let stylesheet = sheet(
        r#"<xsl:output method="adaptive"/>
           <xsl:template match="/"><o a="1"/></xsl:template>"#,
    );
    let compiled = compile_stylesheet(stylesheet.as_bytes()).unwrap();
    let transformer = Transformer::new(compiled);
    let output = transformer.transform_bytes(b"<r/>", Vec::new()).unwrap();
    assert_eq!(String::from_utf8(output).unwrap(), r#"<o a="1"/>"#);
}

#[test]
fn literal_namespaces_carry_to_output() {
    let stylesheet = format!(
        r#"{XSL_OPEN}<xsl:template match="/"><a:doc xmlns:a="urn:a"><a:item/></a:doc></xsl:template></xsl:stylesheet>"#
    );
    assert_eq!(
        transform(&stylesheet, "<r/>"),
        r#"<a:doc xmlns:a="urn:a"><a:item/></a:doc>"#
    );
}

#[test]
fn default_namespace_undeclared_for_no_namespace_child() {
    // a child in no namespace under a default-namespace parent gets
    // xmlns=""
    let stylesheet = format!(
        r#"{XSL_OPEN}<xsl:template match="/"><doc xmlns="urn:d"><xsl:element name="bare" namespace=""/></doc></xsl:template></xsl:stylesheet>"#
    );
    assert_eq!(
        transform(&stylesheet, "<r/>"),
        r#"<doc xmlns="urn:d"><bare xmlns=""/></doc>"#
    );
}
