//! Commands accepted on stdin while the workflow loop is running.

/// A parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Run(String),
    List,
    Help,
    Quit,
    Empty,
}

pub const HELP: &str = "commands:\n  <task> | run <task>  dispatch a task\n  tasks               list tasks and triggers\n  help                show this message\n  quit                leave the workflow loop\n";

pub fn parse_command(line: &str) -> ConsoleCommand {
    let mut words = line.split_whitespace();
    let Some(first) = words.next() else {
        return ConsoleCommand::Empty;
    };
    let rest: Vec<&str> = words.collect();
    match (first, rest.as_slice()) {
        ("quit" | "exit" | "q", []) => ConsoleCommand::Quit,
        ("help" | "?", []) => ConsoleCommand::Help,
        ("tasks" | "list", []) => ConsoleCommand::List,
        ("run", []) => ConsoleCommand::Help,
        ("run", names) => ConsoleCommand::Run(names.join(" ")),
        _ => ConsoleCommand::Run(line.trim().to_string()),
    }
}
