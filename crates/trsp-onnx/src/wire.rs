//! Field-level protobuf codec.
//!
//! Messages decode into their raw fields in wire order and encode back
//! unchanged, so only the fields that are actually edited get rewritten. Large
//! payloads such as initializers stay shared [`Bytes`] slices of the input.

use crate::error::{OnnxError, Result};
use bytes::{Buf, Bytes};
use prost::encoding::{decode_key, decode_varint, encode_key, encode_varint, WireType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Payload {
    Varint(u64),
    Fixed64(u64),
    Bytes(Bytes),
    Fixed32(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Field {
    pub number: u32,
    pub payload: Payload,
}

impl Field {
    fn encode(&self, out: &mut Vec<u8>) {
        match &self.payload {
            Payload::Varint(value) => {
                encode_key(self.number, WireType::Varint, out);
                encode_varint(*value, out);
            }
            Payload::Fixed64(value) => {
                encode_key(self.number, WireType::SixtyFourBit, out);
                out.extend_from_slice(&value.to_le_bytes());
            }
            Payload::Bytes(bytes) => {
                encode_bytes(self.number, bytes, out);
            }
            Payload::Fixed32(value) => {
                encode_key(self.number, WireType::ThirtyTwoBit, out);
                out.extend_from_slice(&value.to_le_bytes());
            }
        }
    }
}

fn encode_bytes(number: u32, bytes: &[u8], out: &mut Vec<u8>) {
    encode_key(number, WireType::LengthDelimited, out);
    encode_varint(bytes.len() as u64, out);
    out.extend_from_slice(bytes);
}

fn ensure(buf: &Bytes, len: usize, number: u32) -> Result<()> {
    if buf.remaining() < len {
        return Err(OnnxError::Truncated { number });
    }
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Message {
    fields: Vec<Field>,
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(mut buf: Bytes) -> Result<Self> {
        let mut fields = Vec::new();
        while buf.has_remaining() {
            let (number, wire_type) = decode_key(&mut buf)?;
            let payload = match wire_type {
                WireType::Varint => Payload::Varint(decode_varint(&mut buf)?),
                WireType::SixtyFourBit => {
                    ensure(&buf, 8, number)?;
                    Payload::Fixed64(buf.get_u64_le())
                }
                WireType::ThirtyTwoBit => {
                    ensure(&buf, 4, number)?;
                    Payload::Fixed32(buf.get_u32_le())
                }
                WireType::LengthDelimited => {
                    let len = usize::try_from(decode_varint(&mut buf)?)
                        .map_err(|_| OnnxError::Truncated { number })?;
                    ensure(&buf, len, number)?;
                    Payload::Bytes(buf.split_to(len))
                }
                WireType::StartGroup | WireType::EndGroup => {
                    return Err(OnnxError::UnsupportedWireType { number });
                }
            };
            fields.push(Field { number, payload });
        }
        Ok(Self { fields })
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        for field in &self.fields {
            field.encode(out);
        }
    }

    /// Encodes the message with every occurrence of field `number` collapsed
    /// into a single `replacement`, written where the first occurrence was.
    pub fn encode_replacing(&self, number: u32, replacement: &Message, out: &mut Vec<u8>) {
        let mut written = false;
        for field in &self.fields {
            if field.number != number {
                field.encode(out);
            } else if !written {
                encode_bytes(number, &replacement.to_bytes(), out);
                written = true;
            }
        }
        if !written {
            encode_bytes(number, &replacement.to_bytes(), out);
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut out = Vec::new();
        self.encode(&mut out);
        Bytes::from(out)
    }

    pub fn count(&self, number: u32) -> usize {
        self.fields.iter().filter(|f| f.number == number).count()
    }

    /// Last occurrence wins, as for singular protobuf fields.
    fn last(&self, number: u32) -> Option<&Payload> {
        self.fields
            .iter()
            .rev()
            .find(|f| f.number == number)
            .map(|f| &f.payload)
    }

    /// The number of whichever of `numbers` occurs last; resolves `oneof` members.
    pub fn last_of(&self, numbers: &[u32]) -> Option<u32> {
        self.fields
            .iter()
            .rev()
            .find(|f| numbers.contains(&f.number))
            .map(|f| f.number)
    }

    pub fn varint(&self, number: u32) -> Option<u64> {
        match self.last(number) {
            Some(Payload::Varint(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn bytes(&self, number: u32) -> Option<&Bytes> {
        match self.last(number) {
            Some(Payload::Bytes(bytes)) => Some(bytes),
            _ => None,
        }
    }

    pub fn string(&self, number: u32) -> Result<Option<String>> {
        self.bytes(number)
            .map(|bytes| {
                String::from_utf8(bytes.to_vec()).map_err(|_| OnnxError::InvalidUtf8 { number })
            })
            .transpose()
    }

    pub fn message(&self, number: u32) -> Result<Option<Message>> {
        self.bytes(number).cloned().map(Message::decode).transpose()
    }

    pub fn repeated(&self, number: u32) -> impl Iterator<Item = &Bytes> {
        self.fields.iter().filter_map(move |f| match &f.payload {
            Payload::Bytes(bytes) if f.number == number => Some(bytes),
            _ => None,
        })
    }

    pub fn remove(&mut self, number: u32) {
        self.fields.retain(|f| f.number != number);
    }

    pub fn push_varint(&mut self, number: u32, value: u64) -> &mut Self {
        self.fields.push(Field {
            number,
            payload: Payload::Varint(value),
        });
        self
    }

    pub fn push_bytes(&mut self, number: u32, bytes: impl Into<Bytes>) -> &mut Self {
        self.fields.push(Field {
            number,
            payload: Payload::Bytes(bytes.into()),
        });
        self
    }

    pub fn push_string(&mut self, number: u32, value: &str) -> &mut Self {
        self.push_bytes(number, Bytes::copy_from_slice(value.as_bytes()))
    }

    pub fn push_message(&mut self, number: u32, message: &Message) -> &mut Self {
        self.push_bytes(number, message.to_bytes())
    }

    /// Decodes the singular message field `number`, applies `edit` and stores
    /// the result back in place of all previous occurrences.
    pub fn edit_message<T>(
        &mut self,
        number: u32,
        edit: impl FnOnce(&mut Message) -> Result<T>,
    ) -> Result<T> {
        let mut inner = self.message(number)?.unwrap_or_default();
        let out = edit(&mut inner)?;
        let encoded = inner.to_bytes();

        let mut replaced = false;
        self.fields.retain_mut(|f| {
            if f.number != number {
                return true;
            }
            if replaced {
                return false;
            }
            f.payload = Payload::Bytes(encoded.clone());
            replaced = true;
            true
        });
        if !replaced {
            self.push_bytes(number, encoded);
        }
        Ok(out)
    }

    /// Applies `edit` to the `index`-th occurrence of the repeated message
    /// field `number`. Returns `None` when there is no such occurrence.
    pub fn edit_repeated<T>(
        &mut self,
        number: u32,
        index: usize,
        edit: impl FnOnce(&mut Message) -> Result<T>,
    ) -> Result<Option<T>> {
        let Some(field) = self
            .fields
            .iter_mut()
            .filter(|f| f.number == number)
            .nth(index)
        else {
            return Ok(None);
        };
        let Payload::Bytes(bytes) = &field.payload else {
            return Ok(None);
        };

        let mut inner = Message::decode(bytes.clone())?;
        let out = edit(&mut inner)?;
        field.payload = Payload::Bytes(inner.to_bytes());
        Ok(Some(out))
    }
}
