use std::collections::BTreeMap;

use js8_protocol::directed;

use crate::error::{Error, Result};

/// One control request: an uppercase verb and its named arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Command {
    pub verb: String,
    pub args: BTreeMap<String, String>,
}

impl Command {
    pub fn new(verb: &str) -> Self {
        Self {
            verb: verb.to_string(),
            args: BTreeMap::new(),
        }
    }

    fn arg(mut self, key: &str, value: &str) -> Self {
        self.args.insert(key.to_string(), value.to_string());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.args.get(key).map(String::as_str)
    }
}

/// Parse `VERB` or `VERB:args`.
///
/// Each verb has its own argument grammar:
///
/// - `SEND:<to> <text>` when the first word is a callsign, else
///   `SEND:<text>` as a broadcast.
/// - `MESSAGES`, `MESSAGES:<limit>` or `MESSAGES:since:<ts>`.
/// - `FREQUENCY` (query) or `FREQUENCY:<hz>`.
/// - `CONFIG:<action>[:<key>[:<value>]]`.
///
/// Unknown verbs parse with no arguments; rejecting them is up to the
/// dispatcher.
pub fn parse_command(line: &str) -> Result<Command> {
    let line = line.trim();
    if line.is_empty() {
        return Err(Error::InvalidCommand("empty command".into()));
    }
    let (verb, rest) = match line.split_once(':') {
        Some((verb, rest)) => (verb.trim().to_ascii_uppercase(), Some(rest.trim())),
        None => (line.to_ascii_uppercase(), None),
    };
    let command = Command::new(&verb);

    match (verb.as_str(), rest) {
        ("SEND", Some(rest)) if !rest.is_empty() => {
            let to = rest.split_once(' ').filter(|(first, text)| {
                let first = first.to_ascii_uppercase();
                !text.trim().is_empty() && (directed::is_callsign(&first) || directed::is_group(&first))
            });
            Ok(match to {
                Some((to, text)) => command.arg("to", &to.to_ascii_uppercase()).arg("message", text.trim()),
                None => command.arg("message", rest),
            })
        }
        ("SEND", _) => Err(Error::InvalidCommand("SEND needs a message".into())),

        ("MESSAGES", None) => Ok(command),
        ("MESSAGES", Some(rest)) => match rest.split_once(':') {
            Some((key, ts)) if key.eq_ignore_ascii_case("since") && !ts.trim().is_empty() => {
                Ok(command.arg("since", ts.trim()))
            }
            Some(_) => Err(Error::InvalidCommand(format!("bad MESSAGES argument {rest:?}"))),
            None if rest.is_empty() => Ok(command),
            None => Ok(command.arg("limit", rest)),
        },

        ("FREQUENCY", Some(rest)) if !rest.is_empty() => Ok(command.arg("frequency", rest)),

        ("CONFIG", Some(rest)) if !rest.is_empty() => {
            let mut parts = rest.splitn(3, ':');
            let mut command = command;
            for key in ["action", "key", "value"] {
                if let Some(part) = parts.next() {
                    command = command.arg(key, part.trim());
                }
            }
            Ok(command)
        }
        ("CONFIG", _) => Err(Error::InvalidCommand("CONFIG needs an action".into())),

        _ => Ok(command),
    }
}
