use crate::config::MAX_SEG_LEN;
use argon::shared::{FatalKind, NetError, NetResult};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::{Cursor, Write};

/// Fixed segment header size on the wire:
/// `src_port | dest_port | length | type` (u16 each), `seq_num | ack_num`
/// (u32 each), `checksum` (u16).
pub const SEG_HEADER_LEN: usize = 18;

/// Largest wire size of a segment body (header plus data).
pub const MAX_SEG_WIRE_LEN: usize = SEG_HEADER_LEN + MAX_SEG_LEN;

const CHECKSUM_OFFSET: usize = 16;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SegType {
    Syn = 0,
    SynAck = 1,
    Fin = 2,
    FinAck = 3,
    Data = 4,
    DataAck = 5,
}

impl SegType {
    #[inline]
    fn from_wire(value: u16) -> NetResult<SegType> {
        Ok(match value {
            0 => SegType::Syn,
            1 => SegType::SynAck,
            2 => SegType::Fin,
            3 => SegType::FinAck,
            4 => SegType::Data,
            5 => SegType::DataAck,
            _ => return Err(NetError::Fatal(FatalKind::BadSegType)),
        })
    }
}

/// A transport segment. The wire rendering is the explicit byte layout
/// above — big-endian fields, no struct-layout assumptions.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Segment {
    pub src_port: u16,
    pub dest_port: u16,
    pub kind: SegType,
    pub seq_num: u32,
    pub ack_num: u32,
    pub data: Vec<u8>,
}

impl Segment {
    /// A dataless control segment (SYN, FIN and the ACK flavors).
    #[inline]
    pub fn control(kind: SegType, src_port: u16, dest_port: u16, seq_num: u32, ack_num: u32) -> Segment {
        Segment {
            src_port,
            dest_port,
            kind,
            seq_num,
            ack_num,
            data: Vec::new(),
        }
    }

    /// A data segment carrying `data`, which must fit `MAX_SEG_LEN`.
    #[inline]
    pub fn data(src_port: u16, dest_port: u16, seq_num: u32, data: Vec<u8>) -> Segment {
        if data.len() > MAX_SEG_LEN {
            panic!("Segment data exceeds MAX_SEG_LEN: {}", data.len());
        }

        Segment {
            src_port,
            dest_port,
            kind: SegType::Data,
            seq_num,
            ack_num: 0,
            data,
        }
    }

    #[inline]
    pub fn wire_len(&self) -> usize {
        SEG_HEADER_LEN + self.data.len()
    }

    /// Serializes the segment with its checksum filled in.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut wire = Vec::with_capacity(self.wire_len());

        wire.write_u16::<BigEndian>(self.src_port).unwrap();
        wire.write_u16::<BigEndian>(self.dest_port).unwrap();
        wire.write_u16::<BigEndian>(self.data.len() as u16).unwrap();
        wire.write_u16::<BigEndian>(self.kind as u16).unwrap();
        wire.write_u32::<BigEndian>(self.seq_num).unwrap();
        wire.write_u32::<BigEndian>(self.ack_num).unwrap();
        wire.write_u16::<BigEndian>(0).unwrap();
        wire.write_all(&self.data).unwrap();

        let sum = checksum(&wire);
        wire[CHECKSUM_OFFSET] = (sum >> 8) as u8;
        wire[CHECKSUM_OFFSET + 1] = (sum & 0xFF) as u8;

        wire
    }

    /// Parses a wire body. Checksum verification is the caller's step; see
    /// `verify`.
    pub fn from_wire(body: &[u8]) -> NetResult<Segment> {
        if body.len() < SEG_HEADER_LEN {
            return Err(NetError::Fatal(FatalKind::TruncatedRecord));
        }

        let mut header = Cursor::new(&body[..SEG_HEADER_LEN]);
        let src_port = header.read_u16::<BigEndian>()?;
        let dest_port = header.read_u16::<BigEndian>()?;
        let length = header.read_u16::<BigEndian>()? as usize;
        let kind = SegType::from_wire(header.read_u16::<BigEndian>()?)?;
        let seq_num = header.read_u32::<BigEndian>()?;
        let ack_num = header.read_u32::<BigEndian>()?;

        if length > MAX_SEG_LEN || body.len() != SEG_HEADER_LEN + length {
            return Err(NetError::Fatal(FatalKind::TruncatedRecord));
        }

        Ok(Segment {
            src_port,
            dest_port,
            kind,
            seq_num,
            ack_num,
            data: body[SEG_HEADER_LEN..].to_vec(),
        })
    }
}

/// One's-complement fold over 16-bit big-endian words with end-around
/// carry; an odd trailing byte is padded with zero.
fn fold(bytes: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut words = bytes.chunks_exact(2);

    for word in &mut words {
        sum += u32::from(u16::from_be_bytes([word[0], word[1]]));
        if sum & 0x1_0000 != 0 {
            sum = (sum & 0xFFFF) + 1;
        }
    }

    if let [last] = words.remainder() {
        sum += u32::from(u16::from_be_bytes([*last, 0]));
        if sum & 0x1_0000 != 0 {
            sum = (sum & 0xFFFF) + 1;
        }
    }

    sum as u16
}

/// Checksum of a serialized segment whose checksum field holds zero.
#[inline]
pub fn checksum(bytes: &[u8]) -> u16 {
    !fold(bytes)
}

/// Verifies a serialized segment with its checksum field in place: the
/// fold over everything must come out all-ones.
#[inline]
pub fn verify(bytes: &[u8]) -> bool {
    fold(bytes) == 0xFFFF
}

/// Configurable loss/corruption injection applied to received segment
/// bytes, exercising the retransmission path. With probability `rate` a
/// segment is affected: half the time dropped outright, half the time one
/// random bit is flipped for the checksum to catch.
pub struct LossProfile {
    rate: f64,
    rng: StdRng,
}

impl LossProfile {
    /// No loss, no corruption.
    #[inline]
    pub fn disabled() -> LossProfile {
        LossProfile {
            rate: 0.0,
            rng: StdRng::from_entropy(),
        }
    }

    #[inline]
    pub fn new(rate: f64) -> LossProfile {
        LossProfile {
            rate,
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic profile for tests.
    #[inline]
    pub fn seeded(rate: f64, seed: u64) -> LossProfile {
        LossProfile {
            rate,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Returns true when the segment must be treated as lost; otherwise the
    /// bytes may have had a single bit flipped in place.
    pub fn mangle(&mut self, bytes: &mut [u8]) -> bool {
        if bytes.is_empty() || self.rate <= 0.0 || !self.rng.gen_bool(self.rate) {
            return false;
        }

        if self.rng.gen_bool(0.5) {
            return true;
        }

        let bit = self.rng.gen_range(0..bytes.len() * 8);
        bytes[bit / 8] ^= 1 << (bit % 8);
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_data_segment() -> Segment {
        Segment::data(87, 88, 1000, b"payload bytes".to_vec())
    }

    #[test]
    fn test_wire_roundtrip() {
        let seg = sample_data_segment();
        let wire = seg.to_wire();

        assert_eq!(wire.len(), SEG_HEADER_LEN + 13);
        assert!(verify(&wire));
        assert_eq!(Segment::from_wire(&wire).unwrap(), seg);
    }

    #[test]
    fn test_control_roundtrip() {
        let seg = Segment::control(SegType::SynAck, 88, 87, 0, 42);
        let wire = seg.to_wire();

        assert!(verify(&wire));
        assert_eq!(Segment::from_wire(&wire).unwrap(), seg);
    }

    #[test]
    fn test_odd_length_data_is_padded() {
        let seg = Segment::data(1, 2, 0, vec![0xAB; 7]);
        let wire = seg.to_wire();

        assert_eq!(wire.len() % 2, 1);
        assert!(verify(&wire));
    }

    #[test]
    fn test_any_single_bit_flip_invalidates() {
        let wire = sample_data_segment().to_wire();

        for bit in 0..wire.len() * 8 {
            let mut corrupt = wire.clone();
            corrupt[bit / 8] ^= 1 << (bit % 8);
            assert!(!verify(&corrupt), "flip of bit {} went undetected", bit);
        }
    }

    #[test]
    fn test_delimiter_bytes_in_data_survive_framing() {
        let seg = Segment::data(1, 2, 0, b"\x21\x26 inline start delimiter".to_vec());
        let mut wire = Vec::new();
        crate::frame::write_frame(&mut wire, &seg.to_wire()).unwrap();

        let body =
            crate::frame::read_frame(&mut std::io::Cursor::new(wire), MAX_SEG_WIRE_LEN).unwrap();

        assert!(verify(&body));
        assert_eq!(Segment::from_wire(&body).unwrap(), seg);
    }

    #[test]
    fn test_from_wire_rejects_truncation() {
        let mut wire = sample_data_segment().to_wire();
        wire.truncate(wire.len() - 1);

        assert_eq!(
            Segment::from_wire(&wire).unwrap_err(),
            NetError::Fatal(FatalKind::TruncatedRecord)
        );
    }

    #[test]
    fn test_from_wire_rejects_unknown_type() {
        let mut wire = Segment::control(SegType::Syn, 1, 2, 0, 0).to_wire();
        wire[7] = 99;

        assert_eq!(
            Segment::from_wire(&wire).unwrap_err(),
            NetError::Fatal(FatalKind::BadSegType)
        );
    }

    #[test]
    #[should_panic(expected = "Segment data exceeds MAX_SEG_LEN")]
    fn test_oversized_data_panics() {
        let _ = Segment::data(1, 2, 0, vec![0; MAX_SEG_LEN + 1]);
    }

    #[test]
    fn test_loss_profile_disabled_is_inert() {
        let mut profile = LossProfile::disabled();
        let wire = sample_data_segment().to_wire();
        let mut bytes = wire.clone();

        for _ in 0..100 {
            assert!(!profile.mangle(&mut bytes));
            assert_eq!(bytes, wire);
        }
    }

    #[test]
    fn test_loss_profile_mangles_eventually() {
        let mut profile = LossProfile::seeded(0.5, 7);
        let wire = sample_data_segment().to_wire();

        let mut dropped = 0;
        let mut corrupted = 0;

        for _ in 0..200 {
            let mut bytes = wire.clone();
            if profile.mangle(&mut bytes) {
                dropped += 1;
            } else if !verify(&bytes) {
                corrupted += 1;
            }
        }

        assert!(dropped > 0);
        assert!(corrupted > 0);
    }
}
