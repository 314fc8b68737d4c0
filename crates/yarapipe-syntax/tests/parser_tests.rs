use yarapipe_syntax::{
    MetaKind, MetaValue, ParseError, Rule, ScanOutputParser, parse_scan_output,
};

fn feed(lines: &[&str]) -> Result<Vec<Rule>, ParseError> {
    let mut rules = Vec::new();
    let mut parser = ScanOutputParser::new(|rule: Rule| rules.push(rule));
    for line in lines {
        parser.on_line(line)?;
    }
    parser.finish()?;
    Ok(rules)
}

#[test]
fn test_rule_without_tags_or_meta() {
    let rules = feed(&["HelloWorld [] []"]).unwrap();

    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].identifier, "HelloWorld");
    assert!(rules[0].tags.is_empty());
    assert!(rules[0].metadata.is_empty());
    assert!(rules[0].strings.is_empty());
}

#[test]
fn test_rule_tags_in_order() {
    let rules = feed(&["H [a,b,c] []"]).unwrap();

    assert_eq!(rules[0].tags, vec!["a", "b", "c"]);
}

#[test]
fn test_meta_kinds() {
    let rules = feed(&[r#"H [] [s="x",n=1,b=true]"#]).unwrap();
    let metadata = &rules[0].metadata;

    assert_eq!(metadata.len(), 3);
    assert_eq!(metadata[0].identifier, "s");
    assert_eq!(metadata[0].kind(), MetaKind::String);
    assert_eq!(metadata[0].as_str(), Some("x"));
    assert_eq!(metadata[1].kind(), MetaKind::Integer);
    assert_eq!(metadata[1].as_integer(), Some(1));
    assert_eq!(metadata[2].kind(), MetaKind::Boolean);
    assert_eq!(metadata[2].as_integer(), Some(1));
}

#[test]
fn test_meta_values_with_hex_negative_and_false() {
    let rules = feed(&["H [] [h=0x1F,neg=-3,off=FALSE]"]).unwrap();
    let metadata = &rules[0].metadata;

    assert_eq!(metadata[0].value, MetaValue::Integer(31));
    assert_eq!(metadata[1].value, MetaValue::Integer(-3));
    assert_eq!(metadata[2].value, MetaValue::Boolean(false));
    assert_eq!(metadata[2].as_integer(), Some(0));
}

#[test]
fn test_ugly_metadata() {
    let line = concat!(
        r#"HelloWorld [One] [name="InstallsDriver","#,
        r#"description="The file attempted to install a driver","#,
        r#"categories="Process \",= Creation","#,
        r#"type="external","#,
        r#"behaviors="InstallsDriver","#,
        r#"output="([^\"]*)$","#,
        r#"template="%s"] test.bla"#,
    );
    let rules = feed(&[line]).unwrap();
    let rule = &rules[0];

    assert_eq!(rule.tags, vec!["One"]);

    let values: Vec<_> = rule
        .metadata
        .iter()
        .map(|m| (m.identifier.as_str(), m.as_str().unwrap()))
        .collect();

    assert_eq!(
        values,
        vec![
            ("name", "InstallsDriver"),
            ("description", "The file attempted to install a driver"),
            ("categories", r#"Process ",= Creation"#),
            ("type", "external"),
            ("behaviors", "InstallsDriver"),
            ("output", r#"([^"]*)$"#),
            ("template", "%s"),
        ]
    );
}

#[test]
fn test_matches_group_under_one_string() {
    let rules = feed(&["H [] []", "0xf:$a: Hello World", "0x59:$a: Hello World"]).unwrap();
    let strings = &rules[0].strings;

    assert_eq!(strings.len(), 1);
    assert_eq!(strings[0].identifier, "$a");
    assert_eq!(strings[0].matches.len(), 2);
    assert_eq!(strings[0].matches[0].offset, 15);
    assert_eq!(strings[0].matches[1].offset, 89);
    assert!(strings[0].matches.iter().all(|m| m.value == "Hello World"));
}

#[test]
fn test_non_contiguous_identifiers_are_not_merged() {
    let rules = feed(&["H [] []", "0x0:$a:x", "0x1:$b:y", "0x2:$a:x"]).unwrap();
    let ids: Vec<_> = rules[0].strings.iter().map(|s| s.identifier.as_str()).collect();

    assert_eq!(ids, vec!["$a", "$b", "$a"]);
}

#[test]
fn test_match_value_keeps_colons() {
    let rules = feed(&["H [] []", "0x10:$url: http://example.com:8080/"]).unwrap();

    assert_eq!(rules[0].strings[0].matches[0].value, "http://example.com:8080/");
}

#[test]
fn test_match_value_keeps_leading_whitespace() {
    let rules = feed(&["H [] []", "0x0:$a:    padded", "0x8:$b: \tindented"]).unwrap();

    assert_eq!(rules[0].strings[0].matches[0].value, "   padded");
    assert_eq!(rules[0].strings[1].matches[0].value, "\tindented");
}

#[test]
fn test_multiple_rules_in_order() {
    let lines = [
        r#"HelloWorld [] [name="InstallsDriver",description="The file attempted to install a driver"] test.bla"#,
        "0xf:$a: Hello World",
        "0x59:$a: Hello World",
        "HereIsATest [] [internal=true,value=123] test.bla",
        "0x20:$a: here",
        "0x52:$a: here",
    ];
    let rules = feed(&lines).unwrap();

    assert_eq!(rules.len(), 2);

    assert_eq!(rules[0].identifier, "HelloWorld");
    assert_eq!(rules[0].metadata.len(), 2);
    assert_eq!(rules[0].strings[0].matches.len(), 2);

    assert_eq!(rules[1].identifier, "HereIsATest");
    assert_eq!(rules[1].metadata[0].as_integer(), Some(1));
    assert_eq!(rules[1].metadata[1].as_integer(), Some(123));
    let offsets: Vec<_> = rules[1].strings[0].matches.iter().map(|m| m.offset).collect();
    assert_eq!(offsets, vec![0x20, 0x52]);
    assert_eq!(rules[1].strings[0].matches[0].value, "here");
}

#[test]
fn test_rule_is_delivered_when_next_header_arrives() {
    let mut delivered = Vec::new();
    {
        let mut parser = ScanOutputParser::new(|rule: Rule| delivered.push(rule.identifier));
        parser.on_line("H1 [] []").unwrap();
        parser.on_line("0x0:$a:x").unwrap();
        parser.on_line("H2 [] []").unwrap();
        assert!(parser.in_rule());
        parser.finish().unwrap();
    }

    assert_eq!(delivered, vec!["H1", "H2"]);
}

#[test]
fn test_violation_stops_callbacks() {
    let mut delivered = Vec::new();
    let mut parser = ScanOutputParser::new(|rule: Rule| delivered.push(rule.identifier));

    parser.on_line("H1 [] []").unwrap();
    parser.on_line("0x0:$a:x").unwrap();
    let err = parser.on_line("H2 [unterminated").unwrap_err();
    assert!(matches!(err, ParseError::UnexpectedEnd { .. }));
    assert_eq!(err.line(), Some(3));

    assert_eq!(parser.on_line("H3 [] []"), Err(ParseError::Aborted));
    assert!(parser.finish().is_err());

    // H1 was closed by the H2 header before H2 failed.
    assert_eq!(delivered, vec!["H1"]);
}

#[test]
fn test_orphan_match_is_a_violation() {
    let err = feed(&["0x0:$a: x"]).unwrap_err();

    assert_eq!(err, ParseError::OrphanMatch { line: 1 });
}

#[test]
fn test_bad_match_shape_is_a_violation() {
    assert!(feed(&["H [] []", "0x0 $a x"]).is_err());
    assert!(feed(&["H [] []", "0x0:a"]).is_err());
}

#[test]
fn test_malformed_meta_entry_is_skipped() {
    let rules = feed(&[r#"H [] ["stray",ok=1]"#]).unwrap();

    assert_eq!(rules[0].metadata.len(), 1);
    assert_eq!(rules[0].metadata[0].identifier, "ok");
}

#[test]
fn test_malformed_last_meta_entry_ends_list() {
    let rules = feed(&[r#"H [] [ok=1,"stray"] trailing [junk"#]).unwrap();

    assert_eq!(rules[0].metadata.len(), 1);
}

#[test]
fn test_meta_without_equals_is_a_violation() {
    assert!(matches!(
        feed(&["H [] [name]"]),
        Err(ParseError::UnexpectedEnd { .. })
    ));
    assert!(matches!(
        feed(&["H [] [name x]"]),
        Err(ParseError::UnexpectedToken { .. })
    ));
}

#[test]
fn test_meta_with_non_boolean_identifier_is_a_violation() {
    assert!(matches!(
        feed(&["H [] [flag=maybe]"]),
        Err(ParseError::InvalidBoolean { .. })
    ));
}

#[test]
fn test_meta_overflow_is_numeric_decode_error() {
    assert!(matches!(
        feed(&["H [] [big=99999999999999999999999]"]),
        Err(ParseError::NumericDecode { .. })
    ));
}

#[test]
fn test_missing_metadata_list_is_a_violation() {
    assert!(feed(&["H []"]).is_err());
    assert!(feed(&["H"]).is_err());
}

#[test]
fn test_blank_lines_are_ignored() {
    let rules = parse_scan_output("\nH [] []\n\n0x1:$a:x\n").unwrap();

    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].strings[0].matches[0].offset, 1);
}

#[test]
fn test_parsing_is_repeatable() {
    let output = "A [t] [k=\"v\"] f\n0x1:$a:x\n0x2:$b:y\nB [] [] f\n0x3:$c:z";

    let first = parse_scan_output(output).unwrap();
    let second = parse_scan_output(output).unwrap();

    assert_eq!(first, second);
}

#[test]
fn test_rules_serialize_to_json() {
    let rules = parse_scan_output("H [t] [s=\"x\",n=2,b=false]\n0x10:$a: hi").unwrap();
    let json = serde_json::to_value(&rules).unwrap();

    assert_eq!(json[0]["identifier"], "H");
    assert_eq!(json[0]["tags"][0], "t");
    assert_eq!(json[0]["metadata"][0]["value"], "x");
    assert_eq!(json[0]["metadata"][1]["value"], 2);
    assert_eq!(json[0]["metadata"][2]["value"], false);
    assert_eq!(json[0]["strings"][0]["matches"][0]["offset"], 16);
}
