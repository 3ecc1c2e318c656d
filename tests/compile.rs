//! End-to-end pipeline tests: source text through lexing, parsing,
//! simplification, and class-file emission.

use cesium::{compile, Error};
use indoc::indoc;

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[test]
fn arithmetic_program_compiles() {
    let bytes = compile("int a = 2 + 3 * 4; print(a);", "Scenario1").unwrap();
    assert_eq!(&[0xCA, 0xFE, 0xBA, 0xBE], &bytes[..4]);
    // Version 52.0 = Java 8.
    assert_eq!(&[0x00, 0x00, 0x00, 52], &bytes[4..8]);
    assert!(contains(&bytes, b"Scenario1"));
    assert!(contains(&bytes, b"main"));
    assert!(contains(&bytes, b"([Ljava/lang/String;)V"));
}

#[test]
fn fibonacci_with_string_concatenation_is_a_codegen_error() {
    let source = indoc! {r#"
        function fib(int n) {
            int a = 0;
            int b = 1;
            for (int i = 0; i < n; i = i + 1) {
                int t = a + b;
                a = b;
                b = t;
            }
            return a;
        }
        for (int i = 0; i < 10; i = i + 1) {
            print("Fibonacci(" + i + ") = " + fib(i));
        }
    "#};
    let err = compile(source, "Fib").unwrap_err();
    assert!(matches!(err, Error::Codegen(_)));
    assert!(err
        .to_string()
        .contains("arithmetic on non-numeric operand of type string"));
}

#[test]
fn reactive_program_compiles_and_references_the_library() {
    let source = indoc! {"
        Stream s = 5;
        Reactive r = s * 2;
        print(r);
        setValue(s, 7);
        print(r);
    "};
    let bytes = compile(source, "Scenario3").unwrap();
    assert!(contains(&bytes, b"org/cesium/Stream"));
    assert!(contains(&bytes, b"org/cesium/Reactive"));
    assert!(contains(&bytes, b"org/cesium/ReactiveOps"));
    assert!(contains(&bytes, b"org/cesium/Util"));
    assert!(contains(&bytes, b"setValue"));
    assert!(contains(&bytes, b"printReactiveValue"));
}

#[test]
fn constant_if_keeps_only_the_taken_branch() {
    let source = indoc! {r#"
        if (1 < 2) {
            print("one");
        } else {
            print("zero");
        }
    "#};
    let bytes = compile(source, "Scenario4").unwrap();
    assert!(contains(&bytes, b"one"));
    assert!(!contains(&bytes, b"zero"));
}

#[test]
fn counting_for_loop_compiles() {
    let source = "for (int i = 0; i < 3; i = i + 1) { print(i); }";
    assert!(compile(source, "Scenario5").is_ok());
}

#[test]
fn while_false_is_dropped_before_emission() {
    let source = indoc! {r#"
        while (0) { print("unreachable"); }
        print(1);
    "#};
    let bytes = compile(source, "Scenario6").unwrap();
    assert!(!contains(&bytes, b"unreachable"));
}

#[test]
fn trailing_dot_literal_is_a_lexical_error() {
    let err = compile("int x = 1.;", "Bad").unwrap_err();
    assert!(matches!(err, Error::Lexical { line: 1, .. }));
}

#[test]
fn unterminated_string_is_a_lexical_error() {
    let err = compile("string s = \"abc", "Bad").unwrap_err();
    assert!(matches!(err, Error::Lexical { .. }));
}

#[test]
fn missing_expression_is_a_parse_error() {
    let err = compile("a = ;", "Bad").unwrap_err();
    assert!(matches!(err, Error::Parse(_)));
}

#[test]
fn unclosed_parenthesis_is_a_parse_error() {
    let err = compile("int x = (1 + 2;", "Bad").unwrap_err();
    assert!(matches!(err, Error::Parse(_)));
}

#[test]
fn empty_function_body_is_valid() {
    let bytes = compile("function f() {}", "Empty").unwrap();
    assert!(contains(&bytes, b"()I"));
}

#[test]
fn default_initialized_int_can_be_printed() {
    assert!(compile("int x; print(x);", "Defaults").is_ok());
}

#[test]
fn compilation_is_deterministic() {
    let source = indoc! {"
        Stream s = 5;
        Reactive r = s * 2;
        function twice(int n) { return n * 2; }
        for (int i = 0; i < 3; i = i + 1) { print(twice(i)); }
        setValue(s, 7);
        print(r);
    "};
    let first = compile(source, "Same").unwrap();
    let second = compile(source, "Same").unwrap();
    assert_eq!(first, second);
}

#[test]
fn errors_render_as_single_lines() {
    let err = compile("int x = 1.;", "Bad").unwrap_err();
    let rendered = err.to_string();
    assert!(!rendered.contains('\n'));
    assert!(rendered.starts_with("Lexical error:"));

    let err = compile("print(undefined);", "Bad").unwrap_err();
    let rendered = err.to_string();
    assert!(!rendered.contains('\n'));
    assert!(rendered.starts_with("Code generation error:"));
}
