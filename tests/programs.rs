//! Whole programs run through the public API, with `print` output captured.

#![cfg(feature = "reader")]
#![expect(clippy::unwrap_used)] // test code OK

use glisp::{Environment, Error, Value, eval_source, new_global_environment_with_output};
use std::cell::RefCell;
use std::rc::Rc;

struct Session {
    env: Environment,
    output: Rc<RefCell<Vec<u8>>>,
}

impl Session {
    fn new() -> Self {
        let output = Rc::new(RefCell::new(Vec::new()));
        let env = new_global_environment_with_output(output.clone());
        Session { env, output }
    }

    /// Run `source`, returning the rendered result of every form
    fn run(&self, source: &str) -> Vec<String> {
        eval_source(source, &self.env)
            .unwrap()
            .into_iter()
            .map(|result| match result {
                Ok(value) => value.to_string(),
                Err(e) => format!("error: {e}"),
            })
            .collect()
    }

    fn last(&self, source: &str) -> String {
        self.run(source).pop().unwrap()
    }

    fn printed(&self) -> String {
        String::from_utf8(self.output.borrow().clone()).unwrap()
    }
}

#[test]
fn test_language_properties() {
    let test_cases = vec![
        // Lexical scoping survives a later global redefinition
        (
            "(def make-adder (fn (x) (fn (y) (+ x y)))) (def add5 (make-adder 5)) (def x 100) (add5 3)",
            "8",
        ),
        // Parameters do not leak outward
        ("(def x 1) ((fn (x) x) 2) x", "1"),
        ("(def m (macro (a) (quote ok))) (m (undefined-identifier))", "ok"),
        ("(if 0 \"t\" \"f\")", "\"t\""),
        ("(if nil 1 2)", "2"),
        ("(if false 1)", "nil"),
        ("(+)", "0"),
        ("(* 7)", "7"),
        ("(- 10 3 2)", "5"),
        ("(/ 8 2 2)", "2"),
        ("(/ 1 0)", "inf"),
        ("(def l '(1 \"two\" (3))) (= (cons (first l) (rest l)) l)", "true"),
        ("(first (list))", "nil"),
        ("(rest (list))", "()"),
        ("(= 1 1 1)", "true"),
        ("(= 1 1 2)", "false"),
        ("(= (list) (list))", "true"),
        ("(not nil)", "true"),
        ("(empty? '())", "true"),
    ];

    for (i, (source, expected)) in test_cases.iter().enumerate() {
        let session = Session::new();
        assert_eq!(session.last(source), *expected, "Program #{} ({source})", i + 1);
    }
}

#[test]
fn test_recursive_programs() {
    let session = Session::new();
    let results = session.run(
        r#"
        ; classic recursion, not in tail position
        (def fact (fn (n) (if (= n 0) 1 (* n (fact (- n 1))))))
        (fact 10)

        ; accumulator loop in tail position
        (def count-up (fn (n acc) (if (= n 0) acc (count-up (- n 1) (cons n acc)))))
        (count-up 5 '())

        (def even? (fn (n) (if (= n 0) true (odd? (- n 1)))))
        (def odd? (fn (n) (if (= n 0) false (even? (- n 1)))))
        (even? 1000000)
        "#,
    );
    assert_eq!(results[1], "3628800");
    assert_eq!(results[3], "(1 2 3 4 5)");
    assert_eq!(results[6], "true");
}

#[test]
fn test_print_output() {
    let session = Session::new();
    let results = session.run(
        r#"
        (print "a" 1)
        (println "" (list 1 2) true)
        (def greet (fn (name) (println "hello" name) name))
        (greet "world")
        (println)
        "#,
    );
    assert_eq!(results, vec!["nil", "nil", "#<fn>", "\"world\"", "nil"]);
    assert_eq!(
        session.printed(),
        "\"a\" 1\"\" (1 2) true\n\"hello\" \"world\"\n\n"
    );
}

#[test]
fn test_errors_are_isolated_per_form() {
    let session = Session::new();
    let results = session.run("(def a 1) (+ a undefined) (+ a \"1\") ((list)) (+ a 1)");
    assert_eq!(results[0], "1");
    assert_eq!(results[1], "error: Unbound identifier: undefined");
    assert!(results[2].starts_with("error: InvalidArgument: +"));
    assert!(results[3].starts_with("error: NotApplicable"));
    assert_eq!(results[4], "2");

    // A side effect that ran before the error is not rolled back
    let results = session.run("(println 1) (println 2 missing)");
    assert_eq!(results[1], "error: Unbound identifier: missing");
    assert_eq!(session.printed(), "1\n");
}

#[test]
fn test_sessions_are_independent() {
    let first = Session::new();
    let second = Session::new();
    first.run("(def shared 1)");
    assert_eq!(second.last("shared"), "error: Unbound identifier: shared");
    assert_eq!(first.last("shared"), "1");

    // The global frame persists across batches
    first.run("(def inc (fn (n) (+ n shared)))");
    assert_eq!(first.last("(inc 41)"), "42");
}

#[test]
fn test_parse_errors_reject_the_batch() {
    let session = Session::new();
    match eval_source("(def a 1) (+ a", &session.env) {
        Err(Error::Parse(_)) => {}
        other => panic!("expected parse error, got {other:?}"),
    }
    assert_eq!(session.env.get("a"), None::<Value>);
}
