//! Interactive REPL against a local store
//!
//! Grammar, one command per line:
//!
//! ```text
//! SET <key> "<value>"     value is quoted and may contain spaces
//! GET <key>
//! DEL <key>
//! exit
//! ```

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use bincask_core::BincaskEngine;

/// One parsed REPL line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Set(String, String),
    Get(String),
    Del(String),
    Exit,
    Empty,
    Invalid(&'static str),
}

/// Parse a single REPL input line.
pub fn parse_line(line: &str) -> ReplCommand {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return ReplCommand::Empty;
    }
    if trimmed == "exit" {
        return ReplCommand::Exit;
    }

    let mut words = trimmed.splitn(2, char::is_whitespace);
    let verb = words.next().unwrap_or("");
    let rest = words.next().unwrap_or("").trim_start();

    match verb {
        "SET" => {
            let mut rest = rest.splitn(2, char::is_whitespace);
            let key = rest.next().unwrap_or("");
            let value = rest.next().unwrap_or("").trim_start();
            if key.is_empty() || value.len() < 2 || !value.starts_with('"') || !value.ends_with('"') {
                return ReplCommand::Invalid("Invalid SET command. Format: SET <key> \"<value>\"");
            }
            ReplCommand::Set(key.to_string(), value[1..value.len() - 1].to_string())
        }
        "GET" => {
            if rest.is_empty() || rest.contains(char::is_whitespace) {
                return ReplCommand::Invalid("Invalid GET command. Format: GET <key>");
            }
            ReplCommand::Get(rest.to_string())
        }
        "DEL" => {
            if rest.is_empty() || rest.contains(char::is_whitespace) {
                return ReplCommand::Invalid("Invalid DEL command. Format: DEL <key>");
            }
            ReplCommand::Del(rest.to_string())
        }
        _ => ReplCommand::Invalid("Unknown command. Supported commands: SET, GET, DEL."),
    }
}

/// Run the REPL loop over stdin until `exit` or end-of-input.
pub fn run(engine: Arc<BincaskEngine>) -> anyhow::Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    println!("bincask REPL. Type 'exit' to quit.");
    print!("> ");
    stdout.flush()?;

    for line in stdin.lock().lines() {
        let line = line?;
        match parse_line(&line) {
            ReplCommand::Set(key, value) => {
                engine.insert(key.as_bytes(), value.as_bytes())?;
            }
            ReplCommand::Get(key) => match engine.get(key.as_bytes())? {
                Some(value) => println!("Value: \"{}\"", String::from_utf8_lossy(&value)),
                None => println!("Key not found."),
            },
            ReplCommand::Del(key) => {
                if engine.erase(key.as_bytes())? {
                    println!("Key deleted.");
                } else {
                    println!("Key not found.");
                }
            }
            ReplCommand::Exit => break,
            ReplCommand::Empty => {}
            ReplCommand::Invalid(message) => println!("{}", message),
        }
        print!("> ");
        stdout.flush()?;
    }

    Ok(())
}
