use log::debug;
use serde_json::json;

use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::message::unix_now;
use crate::store::MessageFilter;

use super::command::Command;
use super::response::Response;

/// Run one parsed command against the engine.
pub fn handle(engine: &Engine, command: &Command) -> Response {
    debug!("control: {} {:?}", command.verb, command.args);
    let result = match command.verb.as_str() {
        "STATUS" => Ok(Response::with(&engine.status())),
        "MESSAGES" => messages(engine, command),
        "SEND" => send(engine, command),
        "FREQUENCY" => frequency(engine, command),
        "RADIO" => engine.radio().map(|report| Response::with(&report)),
        "PING" => Ok(Response::with(&json!({ "pong": true, "timestamp": unix_now() }))),
        "QUIT" => Ok(Response::with(&json!({ "message": "bye" }))),
        "CONFIG" => config(engine, command),
        "RELOAD" => engine.reload().map(|summary| Response::with(&summary)),
        other => Ok(Response::error(format!("unknown command: {other}"))),
    };
    result.unwrap_or_else(|e| Response::error(e.to_string()))
}

fn number<T: std::str::FromStr>(command: &Command, key: &str) -> Result<Option<T>> {
    command
        .get(key)
        .map(|raw| {
            raw.parse()
                .map_err(|_| Error::InvalidCommand(format!("invalid {key} {raw:?}")))
        })
        .transpose()
}

fn messages(engine: &Engine, command: &Command) -> Result<Response> {
    let filter = MessageFilter {
        limit: number(command, "limit")?,
        since: number(command, "since")?,
        ..MessageFilter::default()
    };
    let messages = engine.messages(&filter)?;
    Ok(Response::with(&json!({
        "count": messages.len(),
        "messages": messages,
    })))
}

fn send(engine: &Engine, command: &Command) -> Result<Response> {
    let text = command
        .get("message")
        .ok_or_else(|| Error::InvalidCommand("SEND needs a message".into()))?;
    let message = engine.send(command.get("to").unwrap_or(""), text)?;
    Ok(Response::with(&json!({
        "id": message.id,
        "to": message.to,
        "text": message.text,
        "queued": true,
    })))
}

fn frequency(engine: &Engine, command: &Command) -> Result<Response> {
    if let Some(hz) = number::<u64>(command, "frequency")? {
        engine.set_frequency(hz)?;
    }
    Ok(Response::with(&json!({ "frequency": engine.frequency() })))
}

fn config(engine: &Engine, command: &Command) -> Result<Response> {
    let action = command.get("action").unwrap_or("").to_ascii_lowercase();
    let key = || {
        command
            .get("key")
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::InvalidCommand(format!("CONFIG:{action} needs a key")))
    };
    match action.as_str() {
        "get" => {
            let key = key()?;
            let value = engine.config_get(key)?;
            Ok(Response::with(&json!({ "key": key, "value": value })))
        }
        "set" => {
            let key = key()?;
            let value = command
                .get("value")
                .ok_or_else(|| Error::InvalidCommand(format!("CONFIG:set:{key} needs a value")))?;
            engine.config_set(key, value)?;
            Ok(Response::with(&json!({ "key": key, "value": engine.config_get(key)? })))
        }
        "list" => Ok(Response::with(&engine.config_list())),
        other => Err(Error::InvalidCommand(format!("unknown CONFIG action {other:?}"))),
    }
}
