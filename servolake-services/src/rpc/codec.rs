use std::io;

use bytes::{Buf, BytesMut};
use monoio_codec::{Decoded, Decoder, Encoder};
use servolake_core::{
    wire::{MessageHeader, HEADER_SIZE},
    DispatchContext,
};

/// A complete message: its validated header and the bytes following it.
#[derive(Debug)]
pub struct Message {
    pub header: MessageHeader,
    pub body: BytesMut,
}

/// Frames the connection byte stream.
///
/// Decoding yields whole [`Message`]s, rejecting bad headers and messages larger than
/// `max_message_size` before their body is buffered. Encoding writes header-only
/// messages and sealed replies.
#[derive(Debug, Clone, Copy)]
pub struct MessageCodec {
    max_message_size: usize,
}

impl MessageCodec {
    pub fn new(max_message_size: usize) -> Self {
        MessageCodec { max_message_size }
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Decoded<Self::Item>, Self::Error> {
        if src.len() < HEADER_SIZE {
            return Ok(Decoded::Insufficient);
        }
        let header = MessageHeader::read(&src[..HEADER_SIZE], self.max_message_size)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        if src.len() < header.size {
            return Ok(Decoded::Insufficient);
        }
        let mut body = src.split_to(header.size);
        body.advance(HEADER_SIZE);
        Ok(Decoded::Sufficient(Message { header, body }))
    }
}

impl Encoder<MessageHeader> for MessageCodec {
    type Error = io::Error;

    fn encode(&mut self, header: MessageHeader, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let header = MessageHeader {
            size: HEADER_SIZE,
            ..header
        };
        dst.extend_from_slice(&header.encode());
        Ok(())
    }
}

impl Encoder<&DispatchContext> for MessageCodec {
    type Error = io::Error;

    fn encode(&mut self, ctx: &DispatchContext, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(ctx.reply());
        Ok(())
    }
}
