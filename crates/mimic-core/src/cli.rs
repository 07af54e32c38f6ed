use crate::backend::Backend;
use crate::interpreter::{CommandInterpreter, ExecutionReport, StepOutcome};
use mimic_common::parser::command_lines;
use std::error::Error;
use std::io::{self, Write};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Clone, Copy)]
pub struct OutputHandlers {
    pub out: fn(&str),
    pub err: fn(&str),
}

pub struct ReplOptions<'a> {
    pub banner_lines: &'a [&'a str],
    pub prompt: &'a str,
    pub exit_commands: &'a [&'a str],
    pub handle_ctrl_c: bool,
}

/// Command lines of a plan file; blank lines and `#` comments are dropped.
pub fn parse_command_file(content: &str) -> Vec<String> {
    command_lines(content).map(String::from).collect()
}

pub async fn run_file<B: Backend + ?Sized>(
    backend: &mut B,
    interpreter: &mut CommandInterpreter,
    output: OutputHandlers,
    path: &Path,
) -> Result<ExecutionReport, Box<dyn Error>> {
    let content = tokio::fs::read_to_string(path).await?;
    let commands = parse_command_file(&content);
    let report = interpreter.execute(backend, &commands).await;
    print_report(&report, output);
    Ok(report)
}

pub fn print_report(report: &ExecutionReport, output: OutputHandlers) {
    for skipped in &report.skipped {
        (output.err)(&format!(
            "Skipped #{} '{}': {}",
            skipped.index + 1,
            skipped.command,
            skipped.reason
        ));
    }
    let status = if report.cancelled {
        "cancelled"
    } else if report.success() {
        "ok"
    } else {
        "partial"
    };
    (output.out)(&format!(
        "{}: {} executed, {} skipped, {} via fallback ({}ms)",
        status,
        report.executed,
        report.skipped.len(),
        report.fallbacks_used,
        report.duration_ms
    ));
}

enum ReadLineResult {
    Input(String),
    Skip,
    Exit,
    Error(io::Error),
}

fn classify_line(
    result: Result<Option<String>, io::Error>,
    exit_commands: &[&str],
) -> ReadLineResult {
    match result {
        Ok(Some(input)) => {
            let line = input.trim_start();
            let trimmed = line.trim_end();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                ReadLineResult::Skip
            } else if exit_commands
                .iter()
                .any(|c| c.eq_ignore_ascii_case(trimmed))
            {
                ReadLineResult::Exit
            } else {
                // Trailing spaces may be part of a TYPE argument.
                ReadLineResult::Input(line.to_string())
            }
        }
        Ok(None) => ReadLineResult::Exit,
        Err(e) => ReadLineResult::Error(e),
    }
}

/// Interactive loop: one command per line, run as soon as it is entered.
pub async fn run_repl<B: Backend + ?Sized>(
    backend: &mut B,
    interpreter: &mut CommandInterpreter,
    output: OutputHandlers,
    options: ReplOptions<'_>,
) -> Result<(), Box<dyn Error>> {
    for line in options.banner_lines {
        (output.out)(line);
    }

    let mut reader = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = io::stdout();

    loop {
        print!("{}", options.prompt);
        stdout.flush()?;

        let next = if options.handle_ctrl_c {
            tokio::select! {
                line = reader.next_line() => classify_line(line, options.exit_commands),
                _ = tokio::signal::ctrl_c() => ReadLineResult::Exit,
            }
        } else {
            classify_line(reader.next_line().await, options.exit_commands)
        };

        match next {
            ReadLineResult::Input(line) => match interpreter.execute_line(backend, &line).await {
                Ok(StepOutcome::Done) => (output.out)("ok"),
                Ok(StepOutcome::Finished) => {
                    (output.out)("finished");
                    break;
                }
                Err(e) => (output.err)(&format!("Error: {}", e)),
            },
            ReadLineResult::Skip => continue,
            ReadLineResult::Exit => break,
            ReadLineResult::Error(e) => return Err(e.into()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_file_drops_comments_and_blanks() {
        let content = "# rename\nCLICK:text=Rename\n\n  TYPE:notes: draft  \nFINISHED\n";
        assert_eq!(
            parse_command_file(content),
            vec!["CLICK:text=Rename", "TYPE:notes: draft  ", "FINISHED"]
        );
    }

    #[test]
    fn test_exit_commands_ignore_case() {
        let exits = ["exit", "quit"];
        assert!(matches!(
            classify_line(Ok(Some("QUIT".into())), &exits),
            ReadLineResult::Exit
        ));
        assert!(matches!(
            classify_line(Ok(Some("# note".into())), &exits),
            ReadLineResult::Skip
        ));
        assert!(matches!(
            classify_line(Ok(Some(" WAIT:10".into())), &exits),
            ReadLineResult::Input(l) if l == "WAIT:10"
        ));
        assert!(matches!(
            classify_line(Ok(Some("TYPE: ".into())), &exits),
            ReadLineResult::Input(l) if l == "TYPE: "
        ));
    }
}
