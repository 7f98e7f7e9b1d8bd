//! Telemetry wire format.
//!
//! ```text
//! 0xAA 0x55 | payload (46 bytes, packed, little-endian) | XOR(payload)
//! ```
//! 49 bytes per frame, no escaping. Receivers resync on the header and a
//! matching checksum, see [`FrameReader`].

use bytemuck::{Pod, Zeroable};
use embedded_hal::blocking::serial::Write;
use heapless::Vec;

use crate::drivers::encoder::TickSnapshot;
use crate::drivers::imu::{ImuSample, Vector3};

#[cfg(target_endian = "big")]
compile_error!("payload is serialised from its in-memory layout and must be little-endian");

pub const SYNC: [u8; 2] = [0xAA, 0x55];
pub const PAYLOAD_LEN: usize = core::mem::size_of::<Payload>();
pub const FRAME_LEN: usize = SYNC.len() + PAYLOAD_LEN + 1;

/// flags bit 0: the IMU read failed this cycle, IMU fields are zero
pub const FLAG_IMU_FAIL: u16 = 1 << 0;

/// Wire-format payload: exactly the bytes between header and checksum.
#[repr(C, packed)]
#[derive(Clone, Copy, Default, Zeroable, Pod)]
pub struct Payload {
    pub t_ms: u32,
    pub ticks_fl: i32,
    pub ticks_fr: i32,
    pub ticks_bl: i32,
    pub ticks_br: i32,
    pub ax: f32,
    pub ay: f32,
    pub az: f32,
    pub gx: f32,
    pub gy: f32,
    pub gz: f32,
    pub flags: u16,
}

const _: () = assert!(PAYLOAD_LEN == 46);
const _: () = assert!(FRAME_LEN == 49);

impl Payload {
    pub fn new(t_ms: u32, ticks: &TickSnapshot, imu: &ImuSample) -> Self {
        // An invalid sample is already zeroed; keep the zeros explicit anyway
        let (accel, gyro) = if imu.valid {
            (imu.accel, imu.gyro)
        } else {
            (Vector3::default(), Vector3::default())
        };
        Self {
            t_ms,
            ticks_fl: ticks.ticks[0],
            ticks_fr: ticks.ticks[1],
            ticks_bl: ticks.ticks[2],
            ticks_br: ticks.ticks[3],
            ax: accel.x,
            ay: accel.y,
            az: accel.z,
            gx: gyro.x,
            gy: gyro.y,
            gz: gyro.z,
            flags: if imu.valid { 0 } else { FLAG_IMU_FAIL },
        }
    }

    pub fn imu_failed(&self) -> bool {
        let flags = self.flags;
        flags & FLAG_IMU_FAIL != 0
    }

    pub fn ticks(&self) -> [i32; 4] {
        [self.ticks_fl, self.ticks_fr, self.ticks_bl, self.ticks_br]
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

impl core::fmt::Debug for Payload {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        // copy out of the packed struct before borrowing
        let Payload {
            t_ms,
            ticks_fl,
            ticks_fr,
            ticks_bl,
            ticks_br,
            ax,
            ay,
            az,
            gx,
            gy,
            gz,
            flags,
        } = *self;
        f.debug_struct("Payload")
            .field("t_ms", &t_ms)
            .field("ticks", &[ticks_fl, ticks_fr, ticks_bl, ticks_br])
            .field("accel", &[ax, ay, az])
            .field("gyro", &[gx, gy, gz])
            .field("flags", &flags)
            .finish()
    }
}

impl PartialEq for Payload {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

#[inline]
pub fn checksum(payload: &[u8]) -> u8 {
    payload.iter().fold(0u8, |acc, &b| acc ^ b)
}

/// Complete frame image: header, payload bytes, checksum.
pub fn encode(payload: &Payload) -> [u8; FRAME_LEN] {
    let mut frame = [0u8; FRAME_LEN];
    let body = payload.as_bytes();
    frame[..2].copy_from_slice(&SYNC);
    frame[2..2 + PAYLOAD_LEN].copy_from_slice(body);
    frame[FRAME_LEN - 1] = checksum(body);
    frame
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "stm32", derive(defmt::Format))]
pub enum LinkError {
    /// Transmit primitive rejected a byte
    Write,
}

/// Streams frames one byte at a time onto a blocking serial link.
pub struct FrameEncoder<W> {
    link: W,
    frames_sent: u32,
}

impl<W: Write<u8>> FrameEncoder<W> {
    pub fn new(link: W) -> Self {
        Self {
            link,
            frames_sent: 0,
        }
    }

    pub fn send(&mut self, payload: &Payload) -> Result<(), LinkError> {
        for byte in encode(payload) {
            self.link
                .bwrite_all(&[byte])
                .map_err(|_| LinkError::Write)?;
        }
        self.frames_sent = self.frames_sent.wrapping_add(1);
        Ok(())
    }

    pub fn frames_sent(&self) -> u32 {
        self.frames_sent
    }

    pub fn link(&self) -> &W {
        &self.link
    }
}

/// Receiver-side decoder that resynchronises on `SYNC` + checksum.
///
/// Header bytes may legitimately appear inside payload data, so a checksum
/// mismatch restarts the search one byte after the rejected header instead of
/// discarding the whole candidate.
pub struct FrameReader {
    buf: Vec<u8, FRAME_LEN>,
    rejected: u32,
}

impl FrameReader {
    pub const fn new() -> Self {
        Self {
            buf: Vec::new(),
            rejected: 0,
        }
    }

    /// Frames dropped for a bad checksum.
    pub fn rejected(&self) -> u32 {
        self.rejected
    }

    pub fn push(&mut self, byte: u8) -> Option<Payload> {
        // buf never exceeds FRAME_LEN - 1 between calls
        let _ = self.buf.push(byte);
        self.align();
        if self.buf.len() < FRAME_LEN {
            return None;
        }

        let body = &self.buf[2..2 + PAYLOAD_LEN];
        if checksum(body) == self.buf[FRAME_LEN - 1] {
            let payload = bytemuck::pod_read_unaligned(body);
            self.buf.clear();
            return Some(payload);
        }

        self.rejected = self.rejected.wrapping_add(1);
        self.buf.remove(0);
        self.align();
        None
    }

    /// Drop leading bytes until the buffer starts with (a prefix of) `SYNC`.
    fn align(&mut self) {
        loop {
            let aligned = match self.buf.len() {
                0 => true,
                1 => self.buf[0] == SYNC[0],
                _ => self.buf[..2] == SYNC,
            };
            if aligned {
                return;
            }
            self.buf.remove(0);
        }
    }
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::mock::MockSerial;

    fn sample_payload() -> Payload {
        let ticks = TickSnapshot {
            ticks: [4, -4, 1_000_000, i32::MIN],
        };
        let imu = ImuSample {
            accel: Vector3 {
                x: 0.5,
                y: -0.25,
                z: 9.80665,
            },
            gyro: Vector3 {
                x: 0.01,
                y: -0.02,
                z: 0.0,
            },
            valid: true,
        };
        Payload::new(123_456, &ticks, &imu)
    }

    #[test]
    fn test_field_offsets_match_wire_table() {
        let p = sample_payload();
        let frame = encode(&p);
        assert_eq!(&frame[0..2], &[0xAA, 0x55]);
        assert_eq!(&frame[2..6], &123_456u32.to_le_bytes());
        assert_eq!(&frame[6..10], &4i32.to_le_bytes());
        assert_eq!(&frame[10..14], &(-4i32).to_le_bytes());
        assert_eq!(&frame[14..18], &1_000_000i32.to_le_bytes());
        assert_eq!(&frame[18..22], &i32::MIN.to_le_bytes());
        assert_eq!(&frame[22..26], &0.5f32.to_le_bytes());
        assert_eq!(&frame[30..34], &9.80665f32.to_le_bytes());
        assert_eq!(&frame[34..38], &0.01f32.to_le_bytes());
        assert_eq!(&frame[42..46], &0.0f32.to_le_bytes());
        assert_eq!(&frame[46..48], &0u16.to_le_bytes());
    }

    #[test]
    fn test_checksum_covers_payload_only() {
        let frame = encode(&sample_payload());
        let expected = frame[2..48].iter().fold(0u8, |a, b| a ^ b);
        assert_eq!(frame[48], expected);
        assert_eq!(frame[48], checksum(sample_payload().as_bytes()));
    }

    #[test]
    fn test_frame_size_is_fixed() {
        let zero = Payload::zeroed();
        let maxed = Payload {
            t_ms: u32::MAX,
            ticks_fl: i32::MAX,
            ticks_fr: i32::MIN,
            ticks_bl: -1,
            ticks_br: 0,
            ax: f32::MAX,
            ay: f32::MIN,
            az: f32::NAN,
            gx: f32::INFINITY,
            gy: -0.0,
            gz: 1e-30,
            flags: u16::MAX,
        };
        for p in [zero, maxed, sample_payload()] {
            let mut enc = FrameEncoder::new(MockSerial::default());
            enc.send(&p).unwrap();
            assert_eq!(enc.link().bytes.len(), 49);
        }
    }

    #[test]
    fn test_encoder_emits_one_byte_per_write() {
        let mut enc = FrameEncoder::new(MockSerial::default());
        enc.send(&sample_payload()).unwrap();
        enc.send(&sample_payload()).unwrap();
        assert_eq!(enc.frames_sent(), 2);
        assert_eq!(enc.link().writes, 2 * FRAME_LEN);
        assert_eq!(&enc.link().bytes[..FRAME_LEN], &encode(&sample_payload()));
    }

    #[test]
    fn test_invalid_sample_zeroes_imu_and_sets_flag() {
        let ticks = TickSnapshot { ticks: [1, 2, 3, 4] };
        let p = Payload::new(10, &ticks, &ImuSample::invalid());
        assert!(p.imu_failed());
        assert_eq!(p.ticks(), [1, 2, 3, 4]);
        let frame = encode(&p);
        assert!(frame[22..46].iter().all(|&b| b == 0));
        assert_eq!(&frame[46..48], &[0x01, 0x00]);
    }

    #[test]
    fn test_reader_recovers_frames_from_noise() {
        let a = sample_payload();
        let mut b = sample_payload();
        b.t_ms = 123_466;

        let mut stream = std::vec::Vec::new();
        stream.extend_from_slice(&[0x00, 0xAA, 0x13, 0x55]);
        stream.extend_from_slice(&encode(&a));
        stream.extend_from_slice(&encode(&b)[..20]); // truncated frame
        stream.extend_from_slice(&encode(&b));

        let mut reader = FrameReader::new();
        let got: std::vec::Vec<Payload> = stream.iter().filter_map(|&x| reader.push(x)).collect();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0], a);
        assert_eq!(got[1], b);
        assert!(reader.rejected() >= 1);
    }

    #[test]
    fn test_reader_tolerates_sync_bytes_inside_payload() {
        let mut p = Payload::zeroed();
        // t_ms little-endian bytes are AA 55 AA 55
        p.t_ms = u32::from_le_bytes([0xAA, 0x55, 0xAA, 0x55]);
        p.flags = 0x55AA;

        let mut stream = std::vec::Vec::new();
        stream.extend_from_slice(&[0xAA, 0x55, 0x01]); // false start
        stream.extend_from_slice(&encode(&p));

        let mut reader = FrameReader::new();
        let got: std::vec::Vec<Payload> = stream.iter().filter_map(|&x| reader.push(x)).collect();
        assert_eq!(got, [p]);
    }

    #[test]
    fn test_reader_rejects_corrupted_checksum() {
        let mut frame = encode(&sample_payload());
        frame[10] ^= 0x01;
        let mut reader = FrameReader::new();
        assert!(frame.iter().all(|&x| reader.push(x).is_none()));
        assert_eq!(reader.rejected(), 1);
    }
}
