use yarapipe_syntax::{CompileDiagnostic, DiagnosticParser, Severity, parse_diagnostic};

#[test]
fn test_syntax_error_line() {
    let diagnostic =
        parse_diagnostic(r#"foo.yara(13): error: syntax error, unexpected $end, expecting $b""#);

    assert_eq!(diagnostic.file_name.as_deref(), Some("foo.yara"));
    assert_eq!(diagnostic.line, Some(13));
    assert_eq!(diagnostic.severity, Severity::Error);
    assert!(diagnostic.message.ends_with(r#"$b""#));
    assert!(diagnostic.message.starts_with("syntax error"));
}

#[test]
fn test_fields_are_trimmed() {
    let diagnostic = parse_diagnostic("  /tmp/rules dir/a.yar ( 42 ) :  warning  :  slow string  ");

    assert_eq!(diagnostic.file_name.as_deref(), Some("/tmp/rules dir/a.yar"));
    assert_eq!(diagnostic.line, Some(42));
    assert_eq!(diagnostic.severity, Severity::Warning);
    assert_eq!(diagnostic.message, "slow string");
}

#[test]
fn test_diagnostics_delivered_in_order() {
    let lines = [
        "a.yar(1): warning: first",
        "a.yar(9): error: second",
        "b.yar(2): error: third",
    ];

    let mut seen: Vec<CompileDiagnostic> = Vec::new();
    let mut parser = DiagnosticParser::new(|d: CompileDiagnostic| seen.push(d));
    for line in lines {
        parser.on_line(line);
    }
    assert_eq!(parser.errors(), 2);
    parser.finish();

    let messages: Vec<_> = seen.iter().map(|d| d.message.as_str()).collect();
    assert_eq!(messages, vec!["first", "second", "third"]);
    assert_eq!(seen[2].file_name.as_deref(), Some("b.yar"));
}
