//! Proxy-join descriptor passed to the server binary through `--join`.
//!
//! ```json
//! {"host": "proxy.local", "port": 7859,
//!  "servers": [{"address": "gpu1.local", "port": 7859, "priority": 1}]}
//! ```
//!
//! `host` and `port` are required; `servers` is optional and each entry needs
//! `address` and `port`. The descriptor is validated here and then handed to
//! the binary as the exact text the user supplied.

use serde_json::{Map, Value};

use crate::error::JoinError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinServer {
    pub address: String,
    pub port: u16,
    /// 1 = high, 2 = low.
    pub priority: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinConfig {
    pub host: String,
    pub port: u16,
    pub servers: Vec<JoinServer>,
    raw: String,
}

impl JoinConfig {
    pub fn parse(text: &str) -> Result<Self, JoinError> {
        let value: Value = serde_json::from_str(text)?;
        let object = value.as_object().ok_or(JoinError::NotAnObject)?;

        let host = match object.get("host") {
            None => return Err(JoinError::MissingField("host")),
            Some(Value::String(host)) if !host.is_empty() => host.clone(),
            Some(_) => return Err(JoinError::EmptyHost),
        };
        let port = match object.get("port") {
            None => return Err(JoinError::MissingField("port")),
            Some(port) => {
                valid_port(port).ok_or_else(|| JoinError::InvalidPort(port.to_string()))?
            }
        };
        let servers = match object.get("servers") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(entries)) => entries
                .iter()
                .enumerate()
                .map(|(index, entry)| parse_server(index, entry))
                .collect::<Result<_, _>>()?,
            Some(_) => return Err(JoinError::ServersNotAList),
        };

        Ok(Self {
            host,
            port,
            servers,
            raw: text.to_string(),
        })
    }

    /// The descriptor exactly as supplied.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

fn parse_server(index: usize, entry: &Value) -> Result<JoinServer, JoinError> {
    let fields: &Map<String, Value> = entry
        .as_object()
        .filter(|f| f.contains_key("address") && f.contains_key("port"))
        .ok_or(JoinError::InvalidServer { index })?;

    let address = match &fields["address"] {
        Value::String(address) if !address.is_empty() => address.clone(),
        _ => return Err(JoinError::EmptyServerAddress { index }),
    };
    let port = valid_port(&fields["port"]).ok_or_else(|| JoinError::InvalidServerPort {
        index,
        value: fields["port"].to_string(),
    })?;
    let priority = match fields.get("priority") {
        None | Some(Value::Null) => None,
        Some(value) => Some(valid_priority(value).ok_or_else(|| {
            JoinError::InvalidServerPriority {
                index,
                value: value.to_string(),
            }
        })?),
    };

    Ok(JoinServer {
        address,
        port,
        priority,
    })
}

fn valid_port(value: &Value) -> Option<u16> {
    value
        .as_u64()
        .and_then(|p| u16::try_from(p).ok())
        .filter(|p| *p >= 1)
}

/// 1 is high priority, 2 is low.
fn valid_priority(value: &Value) -> Option<u8> {
    match value.as_u64() {
        Some(1) => Some(1),
        Some(2) => Some(2),
        _ => None,
    }
}
