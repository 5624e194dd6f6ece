//! Connection phase: initial handshake decoding, capability negotiation and
//! the `HandshakeResponse41` the proxy sends to its backend.

use zerocopy::byteorder::little_endian::{U16 as U16LE, U32 as U32LE};
use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::constant::{
    CAPABILITIES_ALWAYS_ENABLED, CAPABILITIES_CONFIGURABLE, CapabilityFlags, ServerStatusFlags,
};
use crate::error::{Error, Result};
use crate::opts::Opts;
use crate::protocol::packet::{ErrPayloadBytes, header_byte};
use crate::protocol::primitive::*;

const MYSQL_NATIVE_PASSWORD: &str = "mysql_native_password";

#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
struct HandshakeFixedFields {
    connection_id: U32LE,
    auth_data_part1: [u8; 8],
    _filler: u8,
    capability_flags_lower: U16LE,
    charset: u8,
    status_flags: U16LE,
    capability_flags_upper: U16LE,
    auth_data_len: u8,
}

#[derive(Debug, Clone)]
pub struct InitialHandshake {
    pub protocol_version: u8,
    pub server_version: String,
    pub connection_id: u32,
    pub auth_plugin_data: Vec<u8>,
    pub capability_flags: CapabilityFlags,
    pub charset: u8,
    pub status_flags: ServerStatusFlags,
    pub auth_plugin_name: String,
}

/// Read initial handshake packet (protocol version 10) from server
pub fn read_initial_handshake(payload: &[u8]) -> Result<InitialHandshake> {
    let (protocol_version, data) = read_int_1(payload)?;
    if protocol_version == 0xFF {
        return Err(ErrPayloadBytes(payload).into());
    }
    if protocol_version != 10 {
        return Err(Error::UnexpectedPacket(format!(
            "unsupported handshake protocol version {}",
            protocol_version
        )));
    }

    let (server_version, data) = read_string_null(data)?;

    let (fixed, rest) = HandshakeFixedFields::ref_from_prefix(data)
        .map_err(|_| Error::malformed("initial handshake shorter than its fixed fields"))?;

    // lower half sits before the charset, upper half after the status flags
    let capability_flags = CapabilityFlags::from_halves(
        fixed.capability_flags_lower.get(),
        fixed.capability_flags_upper.get(),
    );

    let (_reserved, data) = read_string_fix(rest, 10)?;

    let mut auth_plugin_data = fixed.auth_data_part1.to_vec();
    let mut auth_plugin_name = String::new();
    if capability_flags.is_secure_connection() {
        let part2_len = usize::from(fixed.auth_data_len).saturating_sub(9).max(12);
        let (part2, rest) = read_string_fix(data, part2_len)?;
        auth_plugin_data.extend_from_slice(part2);
        let (_filler, rest) = read_int_1(rest)?;
        if capability_flags.is_plugin_auth() {
            // some servers omit the terminating NUL
            let name = match read_string_null(rest) {
                Ok((name, _)) => name,
                Err(_) => rest,
            };
            auth_plugin_name = String::from_utf8_lossy(name).into_owned();
        }
    }

    Ok(InitialHandshake {
        protocol_version,
        server_version: String::from_utf8_lossy(server_version).into_owned(),
        connection_id: fixed.connection_id.get(),
        auth_plugin_data,
        capability_flags,
        charset: fixed.charset,
        status_flags: ServerStatusFlags::from_bits_retain(fixed.status_flags.get()),
        auth_plugin_name,
    })
}

/// Build the capability set of a backend connection.
///
/// Works on a local copy: the requested features are set one by one and the
/// result is intersected with what the server offers. Once returned, the
/// value is final for the lifetime of the connection.
pub fn negotiate_capabilities(opts: &Opts, server: CapabilityFlags) -> CapabilityFlags {
    let mut client = CAPABILITIES_ALWAYS_ENABLED | (opts.capabilities & CAPABILITIES_CONFIGURABLE);
    if opts.db.is_some() {
        client.set_connect_with_db();
    }
    client & server
}

/// Handshake response packet sent by client (HandshakeResponse41)
#[derive(Debug, Clone)]
pub struct HandshakeResponse41<'a> {
    pub capability_flags: CapabilityFlags,
    pub max_packet_size: u32,
    pub charset: u8,
    pub username: &'a str,
    pub auth_response: &'a [u8],
    pub database: Option<&'a str>,
    pub auth_plugin_name: Option<&'a str>,
}

/// Write handshake response packet (HandshakeResponse41)
pub fn write_handshake_response(out: &mut Vec<u8>, response: &HandshakeResponse41) {
    let caps = response.capability_flags;

    write_int_4(out, caps.bits());
    write_int_4(out, response.max_packet_size);
    write_int_1(out, response.charset);
    out.extend_from_slice(&[0u8; 23]);
    write_string_null(out, response.username);

    if caps.is_plugin_auth_lenenc_client_data() {
        write_bytes_lenenc(out, response.auth_response);
    } else {
        write_int_1(out, response.auth_response.len() as u8);
        out.extend_from_slice(response.auth_response);
    }

    if let Some(db) = response.database
        && caps.is_connect_with_db()
    {
        write_string_null(out, db);
    }

    if let Some(plugin) = response.auth_plugin_name
        && caps.is_plugin_auth()
    {
        write_string_null(out, plugin);
    }

    if caps.is_connect_attrs() {
        // no attributes
        write_int_lenenc(out, 0);
    }
}

/// mysql_native_password authentication
///
/// SHA1(password) XOR SHA1(challenge + SHA1(SHA1(password)))
pub fn auth_mysql_native_password(password: &str, challenge: &[u8]) -> [u8; 20] {
    use sha1::{Digest, Sha1};

    if password.is_empty() {
        return [0u8; 20];
    }

    let stage1 = Sha1::digest(password.as_bytes());
    let stage2 = Sha1::digest(stage1);

    let mut hasher = Sha1::new();
    hasher.update(challenge);
    hasher.update(stage2);
    let token = hasher.finalize();

    let mut result = [0u8; 20];
    for (out, (a, b)) in result.iter_mut().zip(stage1.iter().zip(token.iter())) {
        *out = a ^ b;
    }
    result
}

/// Result of driving the handshake state machine
#[derive(Debug)]
pub enum HandshakeResult {
    /// Write this payload to the server, then feed the next packet
    Write(Vec<u8>),
    /// Authentication finished; the flags are final for this connection
    Connected {
        capability_flags: CapabilityFlags,
        connection_id: u32,
    },
}

/// Sans-io state machine for the backend connection phase.
///
/// Only `mysql_native_password` is spoken; other plugins are answered by
/// requesting it, and an auth switch to anything else fails.
pub enum Handshake {
    Start { opts: Opts },
    WaitingAuthResult {
        opts: Opts,
        capability_flags: CapabilityFlags,
        connection_id: u32,
    },
    Connected,
}

impl Handshake {
    pub fn new(opts: Opts) -> Self {
        Self::Start { opts }
    }

    #[tracing::instrument(skip_all)]
    pub fn drive(&mut self, payload: &[u8]) -> Result<HandshakeResult> {
        match std::mem::replace(self, Self::Connected) {
            Self::Start { opts } => {
                let handshake = read_initial_handshake(payload)?;
                let capability_flags = negotiate_capabilities(&opts, handshake.capability_flags);
                if !capability_flags.is_protocol_41() {
                    return Err(Error::UnexpectedPacket(
                        "server does not support protocol 4.1".to_string(),
                    ));
                }
                tracing::debug!(
                    connection_id = handshake.connection_id,
                    server_version = %handshake.server_version,
                    %capability_flags,
                    "negotiated backend capabilities"
                );

                let password = opts.password.as_deref().unwrap_or("");
                let scramble = auth_mysql_native_password(password, &handshake.auth_plugin_data);
                let auth_response: &[u8] = if password.is_empty() { &[] } else { &scramble };

                let mut out = Vec::new();
                write_handshake_response(
                    &mut out,
                    &HandshakeResponse41 {
                        capability_flags,
                        max_packet_size: opts.max_packet_size,
                        charset: opts.charset,
                        username: &opts.user,
                        auth_response,
                        database: opts.db.as_deref(),
                        auth_plugin_name: Some(MYSQL_NATIVE_PASSWORD),
                    },
                );

                *self = Self::WaitingAuthResult {
                    opts,
                    capability_flags,
                    connection_id: handshake.connection_id,
                };
                Ok(HandshakeResult::Write(out))
            }

            Self::WaitingAuthResult {
                opts,
                capability_flags,
                connection_id,
            } => match header_byte(payload)? {
                0x00 => Ok(HandshakeResult::Connected {
                    capability_flags,
                    connection_id,
                }),
                0xFF => Err(ErrPayloadBytes(payload).into()),
                0xFE => {
                    let (plugin, data) = read_string_null(&payload[1..])?;
                    if plugin != MYSQL_NATIVE_PASSWORD.as_bytes() {
                        return Err(Error::BadConfigError(format!(
                            "Unsupported authentication plugin: {}",
                            String::from_utf8_lossy(plugin)
                        )));
                    }
                    let challenge = data.strip_suffix(&[0]).unwrap_or(data);
                    let password = opts.password.as_deref().unwrap_or("");
                    let scramble = auth_mysql_native_password(password, challenge);
                    let out = if password.is_empty() {
                        Vec::new()
                    } else {
                        scramble.to_vec()
                    };
                    *self = Self::WaitingAuthResult {
                        opts,
                        capability_flags,
                        connection_id,
                    };
                    Ok(HandshakeResult::Write(out))
                }
                header => Err(Error::UnexpectedPacket(format!(
                    "auth result header 0x{:02X}",
                    header
                ))),
            },

            Self::Connected => Err(Error::UnexpectedPacket(
                "handshake already finished".to_string(),
            )),
        }
    }
}
