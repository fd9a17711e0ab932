//! Printed form of an execution outcome, as shown under a notebook cell.
//!
//! Rendering never fails: every outcome, including launch errors, becomes text.

use crate::{
    error::Error,
    types::{CompileMode, ExecutionResult, ExecutionStatus},
};

/// Render the outcome of a cell the way the matching magic prints it
pub fn render(mode: CompileMode, outcome: &Result<ExecutionResult, Error>) -> String {
    match outcome {
        Ok(result) => match mode {
            CompileMode::Stdin => render_stdin(result),
            CompileMode::SourceFile => render_source_file(result),
        },
        Err(e) => render_error(e),
    }
}

/// Text for a cell that could not be attempted
pub fn render_error(error: &Error) -> String {
    format!("Running the program failed with error: {}\n", error)
}

fn render_stdin(result: &ExecutionResult) -> String {
    let mut out = String::new();

    match result.status {
        ExecutionStatus::CompilationError => {
            push_line(
                &mut out,
                &format!("Compilation errors: {}", result.compiler.diagnostic()),
            );
        }
        ExecutionStatus::Success => {
            push_compiler_messages(&mut out, result);
            push_line(&mut out, &result.stdout);
        }
        ExecutionStatus::Error | ExecutionStatus::Timeout => {
            push_compiler_messages(&mut out, result);
            // A killed program still shows what it wrote before the kill
            if result.status == ExecutionStatus::Timeout && !result.stdout.is_empty() {
                push_line(&mut out, &result.stdout);
            }
            push_line(
                &mut out,
                &format!("Execution Error: {}\n{}", result.failure_reason(), result.stderr),
            );
        }
    }

    out
}

fn render_source_file(result: &ExecutionResult) -> String {
    let mut out = String::new();

    match result.status {
        ExecutionStatus::CompilationError => {
            push_line(
                &mut out,
                &format!(
                    "Compilation failed with error: {}",
                    result.compiler.diagnostic()
                ),
            );
        }
        ExecutionStatus::Timeout => {
            push_line(
                &mut out,
                &format!(
                    "Running the program failed with error: {}",
                    result.failure_reason()
                ),
            );
            push_line(&mut out, &result.stdout);
        }
        // The plain path shows whatever the program wrote, exit status aside
        ExecutionStatus::Success | ExecutionStatus::Error => {
            push_line(&mut out, &result.stdout);
        }
    }

    out
}

fn push_compiler_messages(out: &mut String, result: &ExecutionResult) {
    if !result.compiler.stdout.is_empty() {
        push_line(
            out,
            &format!("Compilation output: {}", result.compiler.stdout),
        );
    }
    if !result.compiler.stderr.is_empty() {
        push_line(
            out,
            &format!("Compilation errors: {}", result.compiler.stderr),
        );
    }
}

fn push_line(out: &mut String, text: &str) {
    out.push_str(text);
    out.push('\n');
}
