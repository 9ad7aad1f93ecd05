// Implements the background write pipeline: drains raw sample frames,
// renders them in the configured output representation, and hands
// fixed-size blocks to the storage layer.

// Key Features:
// - Runs only in the background context; never called from an interrupt.
// - Short or empty raw reads are the normal end-of-data signal for one
//   drain pass, not an error.
// - Readable records are scaled entirely in fixed point and rendered in
//   scientific notation; hex and binary modes copy codes untouched.
// - Blocks are written at exactly BLOCK_SIZE bytes; only the final flush
//   writes a shorter tail, at its exact remaining length.

// Licensed under the Apache License, Version 2.0

use crate::config::{ChannelConfig, DataMode, SessionConfig, MAX_CHANNELS};
use crate::error::DaqError;
use crate::math_fixed::{text, DecFloat, Fix64};
use crate::ring_buffer::{BufferMemory, Consumer, RingBuffer, SramMemory};

/// Storage write granularity.
pub const BLOCK_SIZE: usize = 512;

/// Upper bound of one rendered record (readable mode, all channels).
pub const MAX_RECORD_LEN: usize = 64;

/// Significant fractional digits of a rendered sample value.
const SAMPLE_PRECISION: usize = 4;

/// Capacity of the formatted ring: one block plus one whole record, plus
/// the slot the ring keeps empty.
const FMT_CAPACITY: usize = BLOCK_SIZE + MAX_RECORD_LEN + 1;

/// Boundary to the storage layer. Any error is fatal to the session.
pub trait BlockStorage {
    type Handle;
    type Error;

    fn open(&mut self, name: &str) -> Result<Self::Handle, Self::Error>;
    fn write(&mut self, handle: &mut Self::Handle, bytes: &[u8]) -> Result<usize, Self::Error>;
    fn close(&mut self, handle: Self::Handle) -> Result<(), Self::Error>;
}

/// Applies calibration and user scaling to one raw code:
/// `(((raw - zero_offset_lsb) * uv_per_lsb) - offset_uv) * scale`, with
/// the decimal exponent adjusted from microvolts back to volts.
pub fn scale_sample(code: u16, ch: &ChannelConfig) -> DecFloat {
    let cal = ch.cal();
    let mut uv = Fix64::from_int(code as i32);
    uv = uv - cal.zero_offset_lsb;
    uv = uv * cal.uv_per_lsb;
    uv = uv - ch.offset_uv;
    uv = uv * ch.scale.fix;
    DecFloat::new(uv, ch.scale.exp - 6)
}

/// Renders one frame as a readable record:
/// `<time>[,<value>]*\n`. Returns the length written.
pub fn render_readable(
    out: &mut [u8],
    frame: &[u8],
    config: &SessionConfig,
    frame_index: u32,
) -> usize {
    let us = frame_index as u64 * 1_000_000 / config.sample_rate_hz as u64;
    let mut n = text::write_timestamp(out, us, config.time_res);

    let mut slot = 0;
    for ch in config.channels.iter().filter(|ch| ch.enabled) {
        let code = u16::from_le_bytes([frame[slot * 2], frame[slot * 2 + 1]]);
        out[n] = b',';
        n += 1;
        n += scale_sample(code, ch).write_scientific(&mut out[n..], SAMPLE_PRECISION);
        slot += 1;
    }
    out[n] = b'\n';
    n + 1
}

/// Renders one frame as concatenated 4-digit hex codes, newline
/// terminated. Returns the length written.
pub fn render_hex(out: &mut [u8], frame: &[u8]) -> usize {
    let mut n = 0;
    for pair in frame.chunks_exact(2) {
        let code = u16::from_le_bytes([pair[0], pair[1]]);
        n += text::write_hex_u16(&mut out[n..], code);
    }
    out[n] = b'\n';
    n + 1
}

/// Background formatter and block writer. Owns the formatted ring and the
/// open storage object for the current session.
pub struct WritePipeline<S: BlockStorage> {
    storage: S,
    file: Option<S::Handle>,
    formatted: RingBuffer<SramMemory<FMT_CAPACITY>>,
    frames_formatted: u32,
}

impl<S: BlockStorage> WritePipeline<S> {
    pub fn new(storage: S) -> Self {
        WritePipeline {
            storage,
            file: None,
            formatted: RingBuffer::new(SramMemory::new()),
            frames_formatted: 0,
        }
    }

    /// Opens the session's storage object and buffers the file header.
    pub fn start(&mut self, config: &SessionConfig, name: &str) -> Result<(), DaqError> {
        let handle = self
            .storage
            .open(name)
            .map_err(|_| DaqError::StorageWrite)?;
        self.file = Some(handle);
        self.frames_formatted = 0;
        self.formatted.clear();
        self.write_header(config)
    }

    /// One drain pass: formats raw frames until either the raw ring has
    /// no complete frame left (normal return) or a full block is
    /// buffered, which is then written before formatting continues.
    pub fn drain<M: BufferMemory>(
        &mut self,
        raw: &mut Consumer<'_, M>,
        config: &SessionConfig,
    ) -> Result<(), DaqError> {
        let frame_len = config.frame_len();
        if frame_len == 0 {
            return Ok(());
        }
        loop {
            while self.formatted.len() < BLOCK_SIZE {
                let mut frame = [0u8; MAX_CHANNELS * 2];
                let got = raw.read(&mut frame[..frame_len]);
                if got < frame_len {
                    // No more complete frames buffered right now
                    return Ok(());
                }
                self.format_frame(&frame[..frame_len], config)?;
            }
            self.write_block(BLOCK_SIZE)?;
        }
    }

    /// Session-end drain: formats everything left in the raw ring, writes
    /// the final partial block at its exact length, and closes the file.
    pub fn flush<M: BufferMemory>(
        &mut self,
        raw: &mut Consumer<'_, M>,
        config: &SessionConfig,
    ) -> Result<(), DaqError> {
        self.drain(raw, config)?;
        while !self.formatted.is_empty() {
            let len = self.formatted.len().min(BLOCK_SIZE);
            self.write_block(len)?;
        }
        if let Some(handle) = self.file.take() {
            self.storage
                .close(handle)
                .map_err(|_| DaqError::StorageWrite)?;
        }
        Ok(())
    }

    /// Frames rendered so far this session.
    pub fn frames_formatted(&self) -> u32 {
        self.frames_formatted
    }

    fn format_frame(&mut self, frame: &[u8], config: &SessionConfig) -> Result<(), DaqError> {
        match config.data_mode {
            DataMode::Binary => self.append(frame)?,
            DataMode::Hex => {
                let mut out = [0u8; MAX_CHANNELS * 4 + 1];
                let n = render_hex(&mut out, frame);
                self.append(&out[..n])?;
            }
            DataMode::Readable => {
                let mut out = [0u8; MAX_RECORD_LEN];
                let n = render_readable(&mut out, frame, config, self.frames_formatted);
                self.append(&out[..n])?;
            }
        }
        self.frames_formatted += 1;
        Ok(())
    }

    fn write_block(&mut self, len: usize) -> Result<(), DaqError> {
        let mut block = [0u8; BLOCK_SIZE];
        let got = self.formatted.read(&mut block[..len]);
        let handle = self.file.as_mut().ok_or(DaqError::StorageWrite)?;
        let written = self
            .storage
            .write(handle, &block[..got])
            .map_err(|_| DaqError::StorageWrite)?;
        if written < got {
            return Err(DaqError::StorageWrite);
        }
        Ok(())
    }

    fn append(&mut self, bytes: &[u8]) -> Result<(), DaqError> {
        self.formatted
            .write(bytes)
            .map_err(|_| DaqError::BufferOverflow)
    }

    /// Buffers the data file header: user comment, per-channel scaling,
    /// sample rate and period, and the column labels.
    fn write_header(&mut self, config: &SessionConfig) -> Result<(), DaqError> {
        let mut line = [0u8; 96];

        self.append(config.comment.as_bytes())?;
        self.append(b"\n*\n")?;

        // e.g. `ch1: Scale = 1.0000e+00 V/V, Offset = 0.0000V`
        for (idx, ch) in config.channels.iter().enumerate() {
            if !ch.enabled {
                continue;
            }
            let mut n = put(&mut line, 0, b"ch");
            line[n] = b'1' + idx as u8;
            n += 1;
            n = put(&mut line, n, b": Scale = ");
            n += ch.scale.write_scientific(&mut line[n..], SAMPLE_PRECISION);
            line[n] = b' ';
            n += 1;
            n = put(&mut line, n, ch.unit_label.as_bytes());
            n = put(&mut line, n, b"/V, Offset = ");
            n += write_offset_volts(&mut line[n..], ch.offset_uv);
            n = put(&mut line, n, b"V\n");
            self.append(&line[..n])?;
        }

        let mut n = put(&mut line, 0, b"*\nSample rate = ");
        n += text::write_uint(&mut line[n..], config.sample_rate_hz as u64);
        n = put(&mut line, n, b"Hz\nSample period = ");
        let period_us = DecFloat::new(
            Fix64::from_int((1_000_000 / config.sample_rate_hz) as i32),
            -6,
        );
        n += period_us.write_scientific(&mut line[n..], SAMPLE_PRECISION);
        n = put(&mut line, n, b"s\n");
        self.append(&line[..n])?;

        let mut n = put(&mut line, 0, b"*\ntime[s]");
        for (idx, ch) in config.channels.iter().enumerate() {
            if !ch.enabled {
                continue;
            }
            n = put(&mut line, n, b", ch");
            line[n] = b'1' + idx as u8;
            n += 1;
            line[n] = b'[';
            n += 1;
            n = put(&mut line, n, ch.unit_label.as_bytes());
            line[n] = b']';
            n += 1;
        }
        line[n] = b'\n';
        n += 1;
        self.append(&line[..n])
    }
}

fn put(buf: &mut [u8], at: usize, s: &[u8]) -> usize {
    buf[at..at + s.len()].copy_from_slice(s);
    at + s.len()
}

/// Renders a microvolt offset as volts with four fractional digits.
fn write_offset_volts(buf: &mut [u8], offset_uv: Fix64) -> usize {
    let mut n = 0;
    if offset_uv.is_negative() {
        buf[n] = b'-';
        n += 1;
    }
    let uv = (offset_uv.to_bits().unsigned_abs() >> 32) as u64;
    n += text::write_uint(&mut buf[n..], uv / 1_000_000);
    buf[n] = b'.';
    n += 1;
    n + text::write_uint_padded(&mut buf[n..], (uv % 1_000_000) / 100, 4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::Acquisition;
    use crate::config::RangeCal;
    use crate::frontend::AdcExchange;
    use crate::ring_buffer::{RingBuffer, SramMemory};
    use std::string::String;
    use std::vec::Vec;

    #[derive(Default)]
    struct VecStorage {
        writes: Vec<Vec<u8>>,
        closed: bool,
    }

    impl VecStorage {
        fn contents(&self) -> Vec<u8> {
            self.writes.concat()
        }
    }

    impl BlockStorage for VecStorage {
        type Handle = ();
        type Error = ();

        fn open(&mut self, _name: &str) -> Result<(), ()> {
            Ok(())
        }

        fn write(&mut self, _handle: &mut (), bytes: &[u8]) -> Result<usize, ()> {
            self.writes.push(bytes.to_vec());
            Ok(bytes.len())
        }

        fn close(&mut self, _handle: ()) -> Result<(), ()> {
            self.closed = true;
            Ok(())
        }
    }

    struct FailingStorage;

    impl BlockStorage for FailingStorage {
        type Handle = ();
        type Error = ();

        fn open(&mut self, _name: &str) -> Result<(), ()> {
            Ok(())
        }

        fn write(&mut self, _handle: &mut (), _bytes: &[u8]) -> Result<usize, ()> {
            Err(())
        }

        fn close(&mut self, _handle: ()) -> Result<(), ()> {
            Ok(())
        }
    }

    struct ConstAdc(u16);

    impl AdcExchange for ConstAdc {
        fn exchange(&mut self, _cfg: u16) -> u16 {
            self.0
        }
    }

    /// Two enabled channels with pass-through calibration: one LSB is one
    /// microvolt, no offsets, unity user scale.
    fn two_channel_unity_config(rate: u32, mode: DataMode) -> SessionConfig {
        let mut config = SessionConfig::default();
        config.channels[2].enabled = false;
        for ch in config.channels.iter_mut() {
            ch.range = crate::config::InputRange::Low;
            ch.cal_low = RangeCal::UNITY;
            ch.offset_uv = Fix64::ZERO;
            ch.scale = DecFloat::from_int(1);
        }
        config.sample_rate_hz = rate;
        config.data_mode = mode;
        config.apply_limits();
        config
    }

    fn header_len(config: &SessionConfig) -> usize {
        let mut pipeline = WritePipeline::new(VecStorage::default());
        pipeline.start(config, "data.txt").unwrap();
        let raw = RingBuffer::new(SramMemory::<8>::new());
        let (_prod, mut cons) = raw.try_split().unwrap();
        pipeline.flush(&mut cons, config).unwrap();
        pipeline.storage.contents().len()
    }

    #[test]
    fn binary_mode_passes_frames_through() {
        let config = two_channel_unity_config(1_000, DataMode::Binary);
        let frame = [0x34u8, 0x12, 0xCD, 0xAB];

        let mut pipeline = WritePipeline::new(VecStorage::default());
        pipeline.start(&config, "data.txt").unwrap();
        let raw = RingBuffer::new(SramMemory::<64>::new());
        let (mut prod, mut cons) = raw.try_split().unwrap();
        prod.write(&frame).unwrap();
        pipeline.flush(&mut cons, &config).unwrap();

        let contents = pipeline.storage.contents();
        assert!(contents.ends_with(&frame), "raw frame bytes unchanged");
        assert!(pipeline.storage.closed);
    }

    #[test]
    fn hex_mode_renders_big_endian_digits() {
        let mut out = [0u8; 16];
        // codes 0x18B3, 0x9CE2 stored little-endian in the frame
        let frame = [0xB3, 0x18, 0xE2, 0x9C];
        let n = render_hex(&mut out, &frame);
        assert_eq!(&out[..n], b"18B39CE2\n");
    }

    #[test]
    fn readable_mode_scales_and_renders() {
        let config = two_channel_unity_config(100, DataMode::Readable);
        let mut out = [0u8; MAX_RECORD_LEN];
        let frame = [0x00u8, 0x80, 0x00, 0x80]; // 32768, 32768
        let n = render_readable(&mut out, &frame, &config, 0);
        let line = core::str::from_utf8(&out[..n]).unwrap();
        // 32768 uV at unity scale is 3.2768e-02 user units
        assert_eq!(line, "0.00,3.2768e-02,3.2768e-02\n");
    }

    #[test]
    fn readable_round_trip_within_precision() {
        let config = two_channel_unity_config(1_000, DataMode::Readable);
        let mut out = [0u8; MAX_RECORD_LEN];
        for code in [1u16, 777, 12_345, 65_535] {
            let frame = [
                code.to_le_bytes()[0],
                code.to_le_bytes()[1],
                code.to_le_bytes()[0],
                code.to_le_bytes()[1],
            ];
            let n = render_readable(&mut out, &frame, &config, 0);
            let line = core::str::from_utf8(&out[..n]).unwrap();
            let value: f64 = line.trim_end().split(',').nth(1).unwrap().parse().unwrap();
            let expect = code as f64 * 1e-6;
            let err = (value - expect).abs() / expect;
            assert!(err < 1e-4, "code {}: {} vs {}", code, value, expect);
        }
    }

    #[test]
    fn timestamps_advance_with_frame_index() {
        let config = two_channel_unity_config(1_000, DataMode::Readable);
        let mut out = [0u8; MAX_RECORD_LEN];
        let frame = [0u8; 4];
        let n = render_readable(&mut out, &frame, &config, 1_500);
        let line = core::str::from_utf8(&out[..n]).unwrap();
        assert!(line.starts_with("1.500,"), "line {}", line);
    }

    #[test]
    fn drain_returns_cleanly_on_empty_raw_ring() {
        let config = two_channel_unity_config(1_000, DataMode::Binary);
        let mut pipeline = WritePipeline::new(VecStorage::default());
        pipeline.start(&config, "data.txt").unwrap();

        let raw = RingBuffer::new(SramMemory::<64>::new());
        let (_prod, mut cons) = raw.try_split().unwrap();
        pipeline.drain(&mut cons, &config).unwrap();
        assert_eq!(pipeline.frames_formatted(), 0);
        assert!(pipeline.storage.writes.is_empty(), "nothing durable yet");
    }

    #[test]
    fn blocks_are_written_at_exactly_block_size() {
        let config = two_channel_unity_config(1_000, DataMode::Binary);
        let header = header_len(&config);

        let mut pipeline = WritePipeline::new(VecStorage::default());
        pipeline.start(&config, "data.txt").unwrap();

        let raw = RingBuffer::new(SramMemory::<4096>::new());
        let (mut prod, mut cons) = raw.try_split().unwrap();
        // enough 4-byte frames to cross one block boundary
        let frames = (BLOCK_SIZE - header) / 4 + 4;
        for i in 0..frames {
            let code = i as u16;
            let [lo, hi] = code.to_le_bytes();
            prod.write(&[lo, hi, lo, hi]).unwrap();
        }

        pipeline.drain(&mut cons, &config).unwrap();
        assert_eq!(pipeline.storage.writes.len(), 1);
        assert_eq!(pipeline.storage.writes[0].len(), BLOCK_SIZE);

        pipeline.flush(&mut cons, &config).unwrap();
        let total: usize = pipeline.storage.contents().len();
        assert_eq!(total, header + frames * 4);
        let tail = pipeline.storage.writes.last().unwrap().len();
        assert!(tail < BLOCK_SIZE, "final block is the exact remainder");
    }

    #[test]
    fn header_describes_the_session() {
        let config = two_channel_unity_config(1_000, DataMode::Readable);
        let mut pipeline = WritePipeline::new(VecStorage::default());
        pipeline.start(&config, "data.txt").unwrap();
        let raw = RingBuffer::new(SramMemory::<8>::new());
        let (_prod, mut cons) = raw.try_split().unwrap();
        pipeline.flush(&mut cons, &config).unwrap();

        let contents = String::from_utf8(pipeline.storage.contents()).unwrap();
        assert!(contents.starts_with("User header comment\n"));
        assert!(contents.contains("ch1: Scale = 1.0000e+00 V/V, Offset = 0.0000V"));
        assert!(contents.contains("Sample rate = 1000Hz"));
        assert!(contents.contains("Sample period = 1.0000e-03s"));
        assert!(contents.contains("time[s], ch1[V], ch2[V]"));
        assert!(!contents.contains("ch3"), "disabled channel not listed");
    }

    #[test]
    fn storage_errors_are_fatal() {
        let config = two_channel_unity_config(1_000, DataMode::Binary);
        let mut pipeline = WritePipeline::new(FailingStorage);
        pipeline.start(&config, "data.txt").unwrap();
        let raw = RingBuffer::new(SramMemory::<8>::new());
        let (_prod, mut cons) = raw.try_split().unwrap();
        assert_eq!(
            pipeline.flush(&mut cons, &config),
            Err(DaqError::StorageWrite)
        );
    }

    /// End-to-end: 2 channels at 100 Hz from the 10 kHz base rate, 100
    /// ticks of constant code 32768 with pass-through calibration produce
    /// exactly one frame and one readable record.
    #[test]
    fn end_to_end_oversampled_readable_record() {
        let config = two_channel_unity_config(100, DataMode::Readable);
        assert_eq!(config.oversamples, 100);

        let mut adc = ConstAdc(32_768);
        let raw = RingBuffer::new(SramMemory::<1024>::new());
        let (mut prod, mut cons) = raw.try_split().unwrap();

        let sysclk = 72_000_000;
        let cycles_per_tick = sysclk / 10_000;
        let mut daq = Acquisition::new();
        daq.start(&config, sysclk, 0).unwrap();
        for tick in 1..=100u32 {
            daq.on_tick(&mut adc, tick * cycles_per_tick, &mut prod)
                .unwrap();
        }
        assert_eq!(cons.len(), 4, "exactly one 2-channel frame");

        let mut pipeline = WritePipeline::new(VecStorage::default());
        pipeline.start(&config, "data.txt").unwrap();
        pipeline.flush(&mut cons, &config).unwrap();
        assert_eq!(pipeline.frames_formatted(), 1);

        let contents = String::from_utf8(pipeline.storage.contents()).unwrap();
        let record = contents.lines().last().unwrap();
        assert_eq!(record, "0.00,3.2768e-02,3.2768e-02");
    }
}
