//! Message header and per-message payload codecs

use std::fmt;
use std::net::Ipv4Addr;

use super::cursor::{ByteReader, ByteWriter};
use super::{descriptions, frame};
use crate::types::{DataDescription, MoCapFrame, ProtocolVersion, ServerConnectionInfo, ServerInfo};
use crate::{NatNetError, Result};

/// Message id plus payload size, both `u16`.
pub const HEADER_LEN: usize = 4;

const PING_NAME_LEN: usize = 265;
const SERVER_NAME_LEN: usize = 256;
const CONNECTION_INFO_LEN: usize = 15;

/// Message identifiers used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum MessageId {
    Ping = 0,
    ServerInfo = 1,
    Request = 2,
    Response = 3,
    RequestModelDef = 4,
    ModelDef = 5,
    RequestFrameOfData = 6,
    FrameOfData = 7,
    MessageString = 8,
    Disconnect = 9,
    KeepAlive = 10,
    UnrecognizedRequest = 100,
}

impl MessageId {
    pub fn from_u16(id: u16) -> Option<Self> {
        Some(match id {
            0 => Self::Ping,
            1 => Self::ServerInfo,
            2 => Self::Request,
            3 => Self::Response,
            4 => Self::RequestModelDef,
            5 => Self::ModelDef,
            6 => Self::RequestFrameOfData,
            7 => Self::FrameOfData,
            8 => Self::MessageString,
            9 => Self::Disconnect,
            10 => Self::KeepAlive,
            100 => Self::UnrecognizedRequest,
            _ => return None,
        })
    }

    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

/// Reply to a [`Message::Request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Four-byte payloads carry a result code.
    Code(i32),
    Text(String),
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Code(code) => write!(f, "code {code}"),
            Response::Text(text) => f.write_str(text),
        }
    }
}

/// A decoded NatNet message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Client discovery/connect request.
    Ping { client_name: String, natnet_version: [u8; 4] },
    /// Ping response describing the server.
    ServerInfo(ServerInfo),
    Request(String),
    Response(Response),
    RequestModelDef,
    ModelDef(Vec<DataDescription>),
    RequestFrameOfData,
    FrameOfData(MoCapFrame),
    MessageString(String),
    Disconnect,
    KeepAlive,
    /// The server did not understand a request we sent.
    UnrecognizedRequest,
    /// A message id this client does not know; the payload is skipped.
    Unrecognized { message_id: u16 },
}

impl Message {
    pub fn message_id(&self) -> u16 {
        match self {
            Message::Ping { .. } => MessageId::Ping.as_u16(),
            Message::ServerInfo(_) => MessageId::ServerInfo.as_u16(),
            Message::Request(_) => MessageId::Request.as_u16(),
            Message::Response(_) => MessageId::Response.as_u16(),
            Message::RequestModelDef => MessageId::RequestModelDef.as_u16(),
            Message::ModelDef(_) => MessageId::ModelDef.as_u16(),
            Message::RequestFrameOfData => MessageId::RequestFrameOfData.as_u16(),
            Message::FrameOfData(_) => MessageId::FrameOfData.as_u16(),
            Message::MessageString(_) => MessageId::MessageString.as_u16(),
            Message::Disconnect => MessageId::Disconnect.as_u16(),
            Message::KeepAlive => MessageId::KeepAlive.as_u16(),
            Message::UnrecognizedRequest => MessageId::UnrecognizedRequest.as_u16(),
            Message::Unrecognized { message_id } => *message_id,
        }
    }
}

/// Message id of a datagram without decoding its payload.
pub fn peek_message_id(datagram: &[u8]) -> Option<u16> {
    datagram.get(..2).map(|id| u16::from_le_bytes([id[0], id[1]]))
}

/// Decodes one datagram.
///
/// The header's payload size must match the datagram exactly. Version gating only
/// applies to FrameOfData and ModelDef payloads; every other message decodes the same
/// way regardless of `version`.
pub fn decode(datagram: &[u8], version: ProtocolVersion) -> Result<Message> {
    if datagram.len() < HEADER_LEN {
        return Err(NatNetError::malformed(format!(
            "datagram of {} bytes is shorter than the message header",
            datagram.len()
        )));
    }
    let mut header = ByteReader::new(&datagram[..HEADER_LEN]);
    let message_id = header.u16()?;
    let declared = usize::from(header.u16()?);
    let payload = &datagram[HEADER_LEN..];
    if payload.len() != declared {
        return Err(NatNetError::malformed(format!(
            "message {message_id} declares {declared} payload bytes but carries {}",
            payload.len()
        )));
    }

    let mut reader = ByteReader::new(payload);
    let Some(id) = MessageId::from_u16(message_id) else {
        return Ok(Message::Unrecognized { message_id });
    };

    Ok(match id {
        MessageId::Ping => {
            reader.section("ping");
            Message::Ping {
                client_name: reader.fixed_string(PING_NAME_LEN)?,
                natnet_version: version_bytes(&mut reader)?,
            }
        }
        MessageId::ServerInfo => Message::ServerInfo(read_server_info(&mut reader)?),
        MessageId::Request => {
            reader.section("request");
            Message::Request(reader.cstring()?)
        }
        MessageId::Response => {
            reader.section("response");
            if reader.remaining() == 4 {
                Message::Response(Response::Code(reader.i32()?))
            } else {
                Message::Response(Response::Text(reader.cstring()?))
            }
        }
        MessageId::RequestModelDef => Message::RequestModelDef,
        MessageId::ModelDef => {
            require_decodable(version)?;
            Message::ModelDef(descriptions::decode_descriptions(&mut reader, version)?)
        }
        MessageId::RequestFrameOfData => Message::RequestFrameOfData,
        MessageId::FrameOfData => {
            require_decodable(version)?;
            Message::FrameOfData(frame::decode_frame(&mut reader, version)?)
        }
        MessageId::MessageString => {
            reader.section("message string");
            Message::MessageString(reader.cstring()?)
        }
        MessageId::Disconnect => Message::Disconnect,
        MessageId::KeepAlive => Message::KeepAlive,
        MessageId::UnrecognizedRequest => Message::UnrecognizedRequest,
    })
}

fn require_decodable(version: ProtocolVersion) -> Result<()> {
    if version < ProtocolVersion::MINIMUM {
        return Err(NatNetError::unsupported_version(
            version,
            format!("oldest decodable layout is {}", ProtocolVersion::MINIMUM),
        ));
    }
    Ok(())
}

fn version_bytes(reader: &mut ByteReader<'_>) -> Result<[u8; 4]> {
    let bytes = reader.take(4)?;
    Ok([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn read_server_info(reader: &mut ByteReader<'_>) -> Result<ServerInfo> {
    reader.section("server info");
    let application_name = reader.fixed_string(SERVER_NAME_LEN)?;
    let server_version = version_bytes(reader)?;
    let natnet_version = version_bytes(reader)?;

    let connection = if reader.remaining() >= CONNECTION_INFO_LEN {
        Some(ServerConnectionInfo {
            high_res_clock_frequency: reader.u64()?,
            data_port: reader.u16()?,
            multicast: reader.u8()? != 0,
            multicast_address: Ipv4Addr::from(version_bytes(reader)?),
        })
    } else {
        None
    };

    Ok(ServerInfo { application_name, server_version, natnet_version, connection })
}

/// Encodes one datagram, header included.
pub fn encode(message: &Message, version: ProtocolVersion) -> Result<Vec<u8>> {
    let mut writer = ByteWriter::new();
    match message {
        Message::Ping { client_name, natnet_version } => {
            writer.fixed_string(client_name, PING_NAME_LEN)?;
            writer.bytes(natnet_version);
            writer.bytes(&[0, 0]);
        }
        Message::ServerInfo(info) => {
            writer.fixed_string(&info.application_name, SERVER_NAME_LEN)?;
            writer.bytes(&info.server_version);
            writer.bytes(&info.natnet_version);
            if let Some(connection) = info.connection {
                writer.u64(connection.high_res_clock_frequency);
                writer.u16(connection.data_port);
                writer.u8(u8::from(connection.multicast));
                writer.bytes(&connection.multicast_address.octets());
            }
        }
        Message::Request(text) | Message::MessageString(text) => writer.cstring(text)?,
        Message::Response(Response::Code(code)) => writer.i32(*code),
        Message::Response(Response::Text(text)) => writer.cstring(text)?,
        Message::ModelDef(list) => descriptions::encode_descriptions(&mut writer, list, version)?,
        Message::FrameOfData(data) => frame::encode_frame(&mut writer, data, version)?,
        Message::RequestModelDef
        | Message::RequestFrameOfData
        | Message::Disconnect
        | Message::KeepAlive
        | Message::UnrecognizedRequest
        | Message::Unrecognized { .. } => {}
    }

    let payload = writer.into_inner();
    let size = u16::try_from(payload.len()).map_err(|_| {
        NatNetError::malformed(format!("payload of {} bytes exceeds a datagram", payload.len()))
    })?;

    let mut datagram = Vec::with_capacity(HEADER_LEN + payload.len());
    datagram.extend_from_slice(&message.message_id().to_le_bytes());
    datagram.extend_from_slice(&size.to_le_bytes());
    datagram.extend_from_slice(&payload);
    Ok(datagram)
}
