use glisp::ast::Value;
use glisp::evaluator::{self, Environment};
use glisp::reader::parse_program;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::{env, fs, panic, process};

fn main() {
    env_logger::init();

    let result = panic::catch_unwind(|| {
        let global = evaluator::new_global_environment();
        match env::args().nth(1) {
            Some(path) => load_file(&path, &global),
            None => run_repl(&global),
        }
    });

    if let Err(panic_info) = result {
        eprintln!("The REPL encountered an unexpected error and must exit.");

        if let Some(msg) = panic_info.downcast_ref::<&str>() {
            eprintln!("Error: {msg}");
        } else if let Some(msg) = panic_info.downcast_ref::<String>() {
            eprintln!("Error: {msg}");
        } else {
            eprintln!("Error: Unknown panic occurred");
        }

        process::exit(1);
    }
}

/// Evaluate every form in a source file, reporting failures without stopping
fn load_file(path: &str, env: &Environment) {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Could not read {path}: {e}");
            return;
        }
    };

    match parse_program(&source) {
        Ok(forms) => {
            for (form, result) in forms.iter().zip(evaluator::evaluate_program(&forms, env)) {
                if let Err(e) = result {
                    eprintln!("Error in {form}: {e}");
                }
            }
        }
        Err(e) => eprintln!("{path}: {e}"),
    }
}

fn run_repl(env: &Environment) {
    println!("glisp - a small Lisp");
    println!("Enter expressions like: (+ 1 2)");
    println!("Type :help for more commands, or Ctrl+C to exit.");
    println!();

    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("Could not initialize REPL: {e}");
            return;
        }
    };

    loop {
        match rl.readline("glisp> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                match line {
                    ":help" => {
                        print_help();
                        continue;
                    }
                    ":env" => {
                        print_environment(env);
                        continue;
                    }
                    ":quit" | ":exit" => {
                        println!("Goodbye!");
                        break;
                    }
                    _ => {}
                }

                let forms = match parse_program(line) {
                    Ok(forms) => forms,
                    Err(e) => {
                        println!("Error: {e}");
                        continue;
                    }
                };

                for result in evaluator::evaluate_program(&forms, env) {
                    match result {
                        // nil results (print, one-armed if) are not echoed
                        Ok(Value::Nil) => {}
                        Ok(value) => println!("{value}"),
                        Err(e) => println!("Error: {e}"),
                    }
                }
            }

            Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                println!("Error: {err:?}");
                break;
            }
        }
    }
}

fn print_help() {
    println!("glisp REPL commands:");
    println!("  :help      - Show this help message");
    println!("  :env       - Show current environment bindings");
    println!("  :quit      - Exit the interpreter");
    println!("  :exit      - Exit the interpreter");
    println!("  Ctrl+C     - Exit the interpreter");
    println!();
    println!("Special forms: def, fn, macro, if, quote ('x)");
    println!("Primitives:    + - * / = not cons first rest empty? list print println");
    println!("Falsy values:  false and nil; everything else is truthy");
    println!();
    println!("Examples:");
    println!("  (def square (fn (x) (* x x)))");
    println!("  (square 12)");
    println!("  (def unless (macro (c body) (list 'if c nil body)))");
    println!("  (unless false (println \"ran\"))");
    println!();
}

fn print_environment(env: &Environment) {
    let bindings = env.get_all_bindings();

    if bindings.is_empty() {
        println!("Environment is empty.");
        return;
    }

    println!("Environment bindings ({} total):", bindings.len());
    println!();

    let mut special_forms = Vec::new();
    let mut primitives = Vec::new();
    let mut user_defined = Vec::new();

    for (name, value) in bindings {
        match &value {
            Value::Builtin(op) if op.is_special_form() => special_forms.push(name),
            Value::Builtin(_) => primitives.push(name),
            _ => user_defined.push((name, value)),
        }
    }

    print_columns("Special forms", &special_forms);
    print_columns("Primitives", &primitives);

    if !user_defined.is_empty() {
        println!("User-defined values ({}):", user_defined.len());
        for (name, value) in user_defined {
            println!("  {name} = {value}");
        }
    }
}

fn print_columns(title: &str, names: &[String]) {
    if names.is_empty() {
        return;
    }
    println!("{title} ({}):", names.len());
    for row in names.chunks(4) {
        for name in row {
            print!("  {name:<15}");
        }
        println!();
    }
    println!();
}
