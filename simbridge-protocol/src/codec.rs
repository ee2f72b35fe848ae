//! `tokio-util` codecs for async peers of the bridge.
//!
//! [`BitbangCodec`] is the debugger side of a JTAG/SWD session: it encodes commands and
//! decodes query responses. [`GpioCodec`] is the client side of a GPIO session: it sends
//! delimited batches and decodes the undelimited event stream coming back.
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::{
    bitbang::{Command, Sample},
    error::ReadError,
    gpio::{FLUSH, GpioEvent},
};

#[derive(Copy, Clone, Debug, Default)]
pub struct BitbangCodec;

impl Encoder<Command> for BitbangCodec {
    type Error = ReadError;

    fn encode(&mut self, item: Command, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.put_u8(item.to_byte());
        Ok(())
    }
}

impl Decoder for BitbangCodec {
    type Item = Sample;
    type Error = ReadError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        Sample::from_byte(src.get_u8()).map(Some)
    }
}

#[derive(Copy, Clone, Debug, Default)]
pub struct GpioCodec;

/// A batch of events sent in the command direction. The codec appends the delimiter.
impl Encoder<Vec<GpioEvent>> for GpioCodec {
    type Error = ReadError;

    fn encode(&mut self, item: Vec<GpioEvent>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.len() + 1);
        for event in item {
            dst.put_u8(event.to_byte());
        }
        dst.put_u8(FLUSH);
        Ok(())
    }
}

impl Decoder for GpioCodec {
    type Item = GpioEvent;
    type Error = ReadError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        Ok(Some(GpioEvent::from_byte(src.get_u8())))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bitbang_encode_and_decode() {
        let mut codec = BitbangCodec;
        let mut buf = BytesMut::new();
        codec.encode(Command::signals(true, false, true), &mut buf).unwrap();
        codec.encode(Command::ReadSwd, &mut buf).unwrap();
        assert_eq!(&buf[..], b"5S");

        let mut input = BytesMut::from(&b"21"[..]);
        assert_eq!(
            codec.decode(&mut input).unwrap(),
            Some(Sample {
                tdo: false,
                swdio: true
            })
        );
        assert_eq!(
            codec.decode(&mut input).unwrap(),
            Some(Sample {
                tdo: true,
                swdio: false
            })
        );
        assert_eq!(codec.decode(&mut input).unwrap(), None);
    }

    #[test]
    fn bitbang_rejects_garbage_response() {
        let mut input = BytesMut::from(&b"x"[..]);
        assert!(matches!(
            BitbangCodec.decode(&mut input),
            Err(ReadError::InvalidResponse(b'x'))
        ));
    }

    #[test]
    fn gpio_batches_are_delimited() {
        let mut buf = BytesMut::new();
        GpioCodec
            .encode(
                vec![
                    GpioEvent {
                        index: 0,
                        level: true,
                    },
                    GpioEvent {
                        index: 5,
                        level: false,
                    },
                ],
                &mut buf,
            )
            .unwrap();
        GpioCodec.encode(Vec::new(), &mut buf).unwrap();
        assert_eq!(&buf[..], &[0x80, 0x05, FLUSH, FLUSH]);
    }

    #[test]
    fn gpio_responses_are_undelimited() {
        let mut input = BytesMut::from(&[0x82_u8, 0x02][..]);
        assert_eq!(
            GpioCodec.decode(&mut input).unwrap(),
            Some(GpioEvent {
                index: 2,
                level: true
            })
        );
        assert_eq!(
            GpioCodec.decode(&mut input).unwrap(),
            Some(GpioEvent {
                index: 2,
                level: false
            })
        );
        assert_eq!(GpioCodec.decode(&mut input).unwrap(), None);
    }
}
