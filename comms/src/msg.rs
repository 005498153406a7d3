use std::{borrow::Cow, io};

use crate::{
    Deserialize, Serialize,
    protocol::{self, CONTROL, ERR, FIELD, HEADER_SIZE, HeaderType, PARAMS},
};

/// The payload data for the `Data` variant of the `Msg` enum.
#[derive(Debug)]
pub enum Payload<'a> {
    /// The flattened policy parameters, in parameter-name order.
    Params(&'a [f32]),
    /// One field of a batch, flattened row-major.
    Field(&'a [f32]),
}

/// The command for the `Control` variant of the `Msg` enum.
#[derive(Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// Sent by a worker right after connecting to the coordinator.
    Join { rank: usize },
    /// Sent by the coordinator once every rank joined the group.
    Start { world_size: usize },
    /// Sent by the coordinator to end collection early.
    Stop,
}

/// The application layer message for the entire system.
#[derive(Debug)]
pub enum Msg<'a> {
    Control(Command),
    Data(Payload<'a>),
    Err(Cow<'a, str>),
}

impl Msg<'_> {
    /// A short name of this message's kind, for logs and protocol errors.
    pub fn kind(&self) -> &'static str {
        let header = match self {
            Msg::Err(_) => ERR,
            Msg::Control(_) => CONTROL,
            Msg::Data(Payload::Params(_)) => PARAMS,
            Msg::Data(Payload::Field(_)) => FIELD,
        };

        protocol::kind_name(header)
    }

    fn buf_is_too_small<T>(size: usize) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("The given buffer is too small {size}, must at least be {HEADER_SIZE} bytes"),
        ))
    }

    fn invalid_kind<T>(kind: HeaderType) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Received an invalid kind header {kind}"),
        ))
    }
}

impl<'a> Serialize<'a> for Msg<'a> {
    fn serialize(&'a self, buf: &mut Vec<u8>) -> Option<&'a [u8]> {
        match self {
            Msg::Err(e) => {
                buf.extend_from_slice(&ERR.to_be_bytes());
                Some(e.as_bytes())
            }
            Msg::Control(cmd) => {
                buf.extend_from_slice(&CONTROL.to_be_bytes());

                // SAFETY: Serialize impl for `Command` is derived and not implemented
                //         by hand. Nor has a non string-key map inside.
                serde_json::to_writer(buf, cmd).unwrap();
                None
            }
            Msg::Data(payload) => {
                let (kind, nums) = match payload {
                    Payload::Params(params) => (PARAMS, *params),
                    Payload::Field(field) => (FIELD, *field),
                };

                buf.extend_from_slice(&kind.to_be_bytes());
                Some(bytemuck::cast_slice(nums))
            }
        }
    }
}

impl<'a> Deserialize<'a> for Msg<'a> {
    fn deserialize(buf: &'a mut [u8]) -> io::Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Self::buf_is_too_small(buf.len());
        }

        let (kind_buf, rest) = buf.split_at_mut(HEADER_SIZE);

        // SAFETY: We splitted the buffer to be of size `HEADER_SIZE` just above.
        let kind = HeaderType::from_be_bytes(kind_buf.try_into().unwrap());

        match kind {
            ERR => {
                let string = str::from_utf8(rest)
                    .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

                Ok(Self::Err(Cow::Borrowed(string)))
            }
            CONTROL => {
                let cmd = serde_json::from_slice(rest)?;
                Ok(Self::Control(cmd))
            }
            PARAMS | FIELD => {
                let nums: &'a [f32] = bytemuck::try_cast_slice(&*rest).map_err(|e| {
                    io::Error::new(io::ErrorKind::InvalidData, format!("{e:?}"))
                })?;

                let payload = match kind {
                    PARAMS => Payload::Params(nums),
                    _ => Payload::Field(nums),
                };

                Ok(Self::Data(payload))
            }
            other => Self::invalid_kind(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip_bytes(msg: &Msg) -> Vec<u32> {
        let mut head = Vec::new();
        let tail = msg.serialize(&mut head).unwrap_or_default();
        let bytes: Vec<u8> = head.iter().chain(tail).copied().collect();

        let mut aligned = vec![0u32; bytes.len().div_ceil(4)];
        bytemuck::cast_slice_mut::<u32, u8>(&mut aligned)[..bytes.len()].copy_from_slice(&bytes);
        aligned
    }

    #[test]
    fn control_message_survives_serialization() {
        let msg = Msg::Control(Command::Join { rank: 3 });
        let mut head = Vec::new();
        assert!(msg.serialize(&mut head).is_none());

        let parsed = Msg::deserialize(&mut head).unwrap();
        assert!(matches!(parsed, Msg::Control(Command::Join { rank: 3 })));
    }

    #[test]
    fn field_payload_is_zero_copy() {
        let field = [1.0_f32, -2.5, 3.25];
        let msg = Msg::Data(Payload::Field(&field));
        let mut head = Vec::new();
        let tail = msg.serialize(&mut head).unwrap();

        assert_eq!(head.len(), HEADER_SIZE);
        assert_eq!(tail, bytemuck::cast_slice::<f32, u8>(&field));

        let mut aligned = roundtrip_bytes(&msg);
        let bytes = &mut bytemuck::cast_slice_mut::<u32, u8>(&mut aligned)[..HEADER_SIZE + 12];
        let Msg::Data(Payload::Field(parsed)) = Msg::deserialize(bytes).unwrap() else {
            panic!("expected a field payload");
        };
        assert_eq!(parsed, field);
    }

    #[test]
    fn short_or_unknown_headers_are_rejected() {
        let mut short = [0u8; 2];
        assert!(Msg::deserialize(&mut short).is_err());

        let mut unknown = 99u32.to_be_bytes();
        let err = Msg::deserialize(&mut unknown).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn error_text_is_borrowed_back() {
        let msg = Msg::Err(Cow::Borrowed("env exploded"));
        let mut aligned = roundtrip_bytes(&msg);
        let bytes = &mut bytemuck::cast_slice_mut::<u32, u8>(&mut aligned)[..HEADER_SIZE + 12];
        let Msg::Err(text) = Msg::deserialize(bytes).unwrap() else {
            panic!("expected an error message");
        };
        assert_eq!(text, "env exploded");
    }
}
