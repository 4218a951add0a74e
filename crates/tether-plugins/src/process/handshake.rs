//! Parsing of the single line a plugin prints once it is ready to serve.
//!
//! The line has five `|`-separated fields:
//!
//! ```text
//! CORE|APP|NETWORK|ADDRESS|PROTOCOL
//! 1|1|tcp|127.0.0.1:4000|netrpc
//! ```

use std::net::SocketAddr;

use crate::config::{PluginConfig, Protocol};
use crate::error::PluginError;

/// Version of the line format itself.
pub(crate) const CORE_PROTOCOL_VERSION: u32 = 1;

/// Terms advertised by a plugin that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Handshake {
    pub(crate) app_version: u32,
    pub(crate) address: SocketAddr,
    pub(crate) protocol: Protocol,
}

/// Parses `line` and checks it against what `config` accepts.
pub(crate) fn parse(config: &PluginConfig, line: &str) -> Result<Handshake, PluginError> {
    let reject = |message: String| PluginError::Handshake {
        name: config.name().to_owned(),
        message,
    };

    let fields: Vec<&str> = line.trim().split('|').collect();
    let [core, app, network, address, protocol] = fields.as_slice() else {
        return Err(reject(format!(
            "expected 5 fields, got {}: '{}'",
            fields.len(),
            line.trim()
        )));
    };

    let core_version = parse_version(core).map_err(&reject)?;
    if core_version != CORE_PROTOCOL_VERSION {
        return Err(reject(format!(
            "core protocol version {core_version} is not supported, expected {CORE_PROTOCOL_VERSION}"
        )));
    }

    let app_version = parse_version(app).map_err(&reject)?;
    if !config.supports_protocol_version(app_version) {
        return Err(reject(format!(
            "plugin protocol version {app_version} is not supported"
        )));
    }

    if *network != "tcp" {
        return Err(reject(format!("unsupported network type '{network}'")));
    }
    let socket: SocketAddr = address
        .parse()
        .map_err(|error| reject(format!("invalid address '{address}': {error}")))?;

    let negotiated: Protocol = protocol.parse().map_err(|_| {
        reject(format!("unknown protocol '{protocol}'"))
    })?;
    if !config.allowed_protocols().contains(&negotiated) {
        return Err(reject(format!("protocol '{negotiated}' is not allowed")));
    }

    Ok(Handshake {
        app_version,
        address: socket,
        protocol: negotiated,
    })
}

fn parse_version(field: &str) -> Result<u32, String> {
    field
        .parse()
        .map_err(|error| format!("invalid version '{field}': {error}"))
}
