use std::{path::PathBuf, str::FromStr};

use thiserror::Error;

use super::state::DataSource;

pub const HELP: &str = "\
Commands:
  refresh                 re-read the current page
  next | prev             move through pages
  filter <category>       show one category only
  clear                   clear the category filter
  source [remote|local|bulk]
                          switch data source (toggles remote/local without argument)
  load <path>             load a local .json result file
  process [total] [batch] submit the next batch for classification
  bulk [batch]            stream-classify the whole mailbox
  tasks                   list active tasks
  cancel <task-id|all>    stop polling a task
  help                    show this help
  quit                    exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Refresh,
    Next,
    Prev,
    Filter(String),
    ClearFilter,
    Source(Option<DataSource>),
    Load(PathBuf),
    Process {
        total_emails: Option<u64>,
        batch_size: Option<u64>,
    },
    Bulk {
        batch_size: Option<u64>,
    },
    Tasks,
    Cancel(Option<String>),
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command '{0}' (type 'help')")]
    Unknown(String),
    #[error("'{command}' needs {what}")]
    MissingArgument {
        command: &'static str,
        what: &'static str,
    },
    #[error("'{0}' is not a positive number")]
    InvalidNumber(String),
    #[error("{0}")]
    InvalidSource(String),
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (name, rest) = match line.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (line, ""),
        };

        match name.to_ascii_lowercase().as_str() {
            "help" | "?" => Ok(Command::Help),
            "refresh" | "r" => Ok(Command::Refresh),
            "next" | "n" => Ok(Command::Next),
            "prev" | "p" => Ok(Command::Prev),
            "filter" | "f" => {
                if rest.is_empty() {
                    return Err(CommandError::MissingArgument {
                        command: "filter",
                        what: "a category",
                    });
                }
                Ok(Command::Filter(rest.to_string()))
            }
            "clear" => Ok(Command::ClearFilter),
            "source" | "s" => {
                if rest.is_empty() {
                    Ok(Command::Source(None))
                } else {
                    rest.parse()
                        .map(|source| Command::Source(Some(source)))
                        .map_err(CommandError::InvalidSource)
                }
            }
            "load" | "l" => {
                if rest.is_empty() {
                    return Err(CommandError::MissingArgument {
                        command: "load",
                        what: "a file path",
                    });
                }
                Ok(Command::Load(PathBuf::from(rest)))
            }
            "process" => {
                let mut args = rest.split_whitespace();
                let total_emails = args.next().map(parse_count).transpose()?;
                let batch_size = args.next().map(parse_count).transpose()?;
                Ok(Command::Process {
                    total_emails,
                    batch_size,
                })
            }
            "bulk" => {
                let batch_size = rest
                    .split_whitespace()
                    .next()
                    .map(parse_count)
                    .transpose()?;
                Ok(Command::Bulk { batch_size })
            }
            "tasks" => Ok(Command::Tasks),
            "cancel" => match rest {
                "" => Err(CommandError::MissingArgument {
                    command: "cancel",
                    what: "a task id or 'all'",
                }),
                "all" => Ok(Command::Cancel(None)),
                id => Ok(Command::Cancel(Some(id.to_string()))),
            },
            "quit" | "exit" | "q" => Ok(Command::Quit),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

fn parse_count(raw: &str) -> Result<u64, CommandError> {
    raw.parse::<u64>()
        .ok()
        .filter(|value| *value > 0)
        .ok_or_else(|| CommandError::InvalidNumber(raw.to_string()))
}
