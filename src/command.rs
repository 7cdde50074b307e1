//! Client command grammar
//!
//! Keywords are case-sensitive. A keyword must either stand alone or be
//! followed by a single space and its argument, so `tasks` or `added` are
//! invalid rather than prefixed commands.

use crate::error::CommandError;
use crate::worker::WorkerId;

const CMD_QUIT: &str = "quit";
const CMD_TASK: &str = "task";
const CMD_ADD: &str = "add";
const CMD_DEL: &str = "del";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    /// Ends the session; handled by the dispatcher itself
    Quit,
    Pool(PoolCommand<'a>),
}

/// Commands that act on the worker pool and produce one reply line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolCommand<'a> {
    SubmitTask(&'a str),
    AddWorker,
    DeleteAnyWorker,
    DeleteWorker(WorkerId),
}

/// Splits `line` into (keyword match, argument).
///
/// `None` means the line does not start with `keyword` at all,
/// `Some(None)` is the bare keyword and `Some(Some(arg))` has an argument.
/// `Err` is a keyword immediately followed by something other than a space.
fn split_keyword<'a>(line: &'a str, keyword: &str) -> Option<Result<Option<&'a str>, CommandError>> {
    let rest = line.strip_prefix(keyword)?;
    if rest.is_empty() {
        return Some(Ok(None));
    }
    Some(
        rest.strip_prefix(' ')
            .map(Some)
            .ok_or(CommandError::Invalid),
    )
}

impl<'a> Command<'a> {
    /// Parse an already-trimmed, non-empty command line.
    pub fn parse(line: &'a str) -> Result<Self, CommandError> {
        if line == CMD_QUIT {
            return Ok(Command::Quit);
        }

        if let Some(split) = split_keyword(line, CMD_TASK) {
            return match split? {
                None => Err(CommandError::BlankTask),
                Some(task) => Ok(Command::Pool(PoolCommand::SubmitTask(task))),
            };
        }

        if let Some(split) = split_keyword(line, CMD_ADD) {
            return match split? {
                None => Ok(Command::Pool(PoolCommand::AddWorker)),
                Some(_) => Err(CommandError::NoParameters),
            };
        }

        if let Some(split) = split_keyword(line, CMD_DEL) {
            return match split? {
                None => Ok(Command::Pool(PoolCommand::DeleteAnyWorker)),
                Some(raw) => raw
                    .parse::<i64>()
                    .map(|id| Command::Pool(PoolCommand::DeleteWorker(WorkerId(id))))
                    .map_err(|_| CommandError::NotNumericId(raw.to_string())),
            };
        }

        Err(CommandError::Invalid)
    }
}
