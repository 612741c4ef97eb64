use crate::model::{EventKind, Recording, TypedEvent, DEFAULT_TEMPO_BPM};
use std::path::Path;
use tracing::{debug, trace};

pub const DEFAULT_PPQ: u16 = 480;
/// Largest value a four-byte variable-length quantity can carry.
pub const MAX_VAR_LEN: u32 = 0x0FFF_FFFF;

const HEADER_MAGIC: [u8; 4] = *b"MThd";
const TRACK_MAGIC: [u8; 4] = *b"MTrk";
const END_OF_TRACK: [u8; 4] = [0x00, 0xFF, 0x2F, 0x00];

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum InterchangeError {
    #[error("io error: {0}")]
    Io(String),
    #[error("value out of range for a variable-length quantity: {0}")]
    VarLenOutOfRange(u64),
    #[error("variable-length quantity longer than four bytes")]
    InvalidVarLen,
    #[error("truncated {0}")]
    Truncated(&'static str),
    #[error("unexpected chunk id {0:?}")]
    BadMagic([u8; 4]),
    #[error("header chunk length {0} is shorter than 6")]
    BadHeaderLength(u32),
    #[error("unsupported timing division {0:#06x}")]
    UnsupportedTiming(u16),
    #[error("unexpected status byte {0:#04x}")]
    UnexpectedStatus(u8),
    #[error("track too long: {0} bytes")]
    TrackTooLong(usize),
}

/// Appends `value` as a variable-length quantity: 7 bits per byte, most
/// significant group first, continuation bit on every byte but the last.
pub fn write_var_len(value: u32, out: &mut Vec<u8>) -> Result<(), InterchangeError> {
    if value > MAX_VAR_LEN {
        return Err(InterchangeError::VarLenOutOfRange(value as u64));
    }

    let mut groups = [0u8; 4];
    let mut len = 0;
    let mut rest = value;
    loop {
        groups[len] = (rest & 0x7F) as u8;
        len += 1;
        rest >>= 7;
        if rest == 0 {
            break;
        }
    }

    for idx in (0..len).rev() {
        let continuation = if idx == 0 { 0x00 } else { 0x80 };
        out.push(groups[idx] | continuation);
    }
    Ok(())
}

pub fn encode_var_len(value: u32) -> Result<Vec<u8>, InterchangeError> {
    let mut out = Vec::with_capacity(4);
    write_var_len(value, &mut out)?;
    Ok(out)
}

/// Reads one variable-length quantity from the front of `bytes`.
/// Returns the value and the number of bytes consumed.
pub fn read_var_len(bytes: &[u8]) -> Result<(u32, usize), InterchangeError> {
    let mut value: u32 = 0;
    for (idx, &byte) in bytes.iter().take(4).enumerate() {
        value = (value << 7) | (byte & 0x7F) as u32;
        if byte & 0x80 == 0 {
            return Ok((value, idx + 1));
        }
    }

    if bytes.len() < 4 {
        Err(InterchangeError::Truncated("variable-length quantity"))
    } else {
        Err(InterchangeError::InvalidVarLen)
    }
}

/// Encodes a recording as a format-1, single-track file.
///
/// Only NoteOn, NoteOff and ControlChange events are written; every other
/// kind is left out of the stream.
pub fn encode_recording(recording: &Recording, ppq: u16) -> Result<Vec<u8>, InterchangeError> {
    if ppq == 0 || ppq & 0x8000 != 0 {
        return Err(InterchangeError::UnsupportedTiming(ppq));
    }

    let ticks_per_second = recording.tempo_or_default() as f64 / 60.0 * ppq as f64;
    let mut track = Vec::with_capacity(recording.events.len() * 4 + END_OF_TRACK.len());
    let mut last_tick: i64 = 0;

    for event in &recording.events {
        let Some(message) = event.channel_message() else {
            trace!(kind = ?event.kind, "event kind not exported");
            continue;
        };

        let ticks = (event.delta_time / 1000.0 * ticks_per_second).round() as i64;
        let delta = (ticks - last_tick).max(0);
        let delta =
            u32::try_from(delta).map_err(|_| InterchangeError::VarLenOutOfRange(delta as u64))?;
        write_var_len(delta, &mut track)?;
        track.extend_from_slice(&message);
        last_tick = ticks;
    }
    track.extend_from_slice(&END_OF_TRACK);

    let track_len =
        u32::try_from(track.len()).map_err(|_| InterchangeError::TrackTooLong(track.len()))?;

    let mut out = Vec::with_capacity(22 + track.len());
    out.extend_from_slice(&HEADER_MAGIC);
    out.extend_from_slice(&6u32.to_be_bytes());
    out.extend_from_slice(&1u16.to_be_bytes()); // format 1
    out.extend_from_slice(&1u16.to_be_bytes()); // one track
    out.extend_from_slice(&ppq.to_be_bytes());
    out.extend_from_slice(&TRACK_MAGIC);
    out.extend_from_slice(&track_len.to_be_bytes());
    out.extend_from_slice(&track);

    debug!(
        events = recording.events.len(),
        bytes = out.len(),
        "encoded recording"
    );
    Ok(out)
}

pub fn export_recording_path(
    recording: &Recording,
    ppq: u16,
    path: &Path,
) -> Result<(), InterchangeError> {
    let data = encode_recording(recording, ppq)?;
    std::fs::write(path, data).map_err(|e| InterchangeError::Io(e.to_string()))
}

pub fn import_recording_path(
    path: &Path,
    fallback_tempo_bpm: u32,
) -> Result<Recording, InterchangeError> {
    let data = std::fs::read(path).map_err(|e| InterchangeError::Io(e.to_string()))?;
    decode_recording(&data, fallback_tempo_bpm)
}

/// Parses a Standard MIDI File back into a recording.
///
/// The first Set Tempo event fixes the tempo for the whole file; without one,
/// `fallback_tempo_bpm` is used. Events of all tracks are merged by tick.
pub fn decode_recording(data: &[u8], fallback_tempo_bpm: u32) -> Result<Recording, InterchangeError> {
    let mut reader = Reader::new(data);

    let magic = reader.read_magic()?;
    if magic != HEADER_MAGIC {
        return Err(InterchangeError::BadMagic(magic));
    }
    let header_len = reader.read_u32("header length")?;
    if header_len < 6 {
        return Err(InterchangeError::BadHeaderLength(header_len));
    }
    let header = reader.take(header_len as usize, "header chunk")?;
    let division = u16::from_be_bytes([header[4], header[5]]);
    if division == 0 || division & 0x8000 != 0 {
        return Err(InterchangeError::UnsupportedTiming(division));
    }

    let mut raw = Vec::new();
    let mut first_tempo: Option<u32> = None;
    let mut end_tick: u64 = 0;
    while !reader.is_empty() {
        let magic = reader.read_magic()?;
        let len = reader.read_u32("chunk length")?;
        let body = reader.take(len as usize, "chunk body")?;
        if magic != TRACK_MAGIC {
            debug!(?magic, "skipping unknown chunk");
            continue;
        }
        end_tick = end_tick.max(decode_track(body, &mut raw, &mut first_tempo)?);
    }
    raw.sort_by_key(|event| event.tick);

    // ms = tick * per_tick_num / per_tick_den, kept as one division to stay exact on the grid
    let (tempo, per_tick_num, per_tick_den) = match first_tempo {
        Some(us_per_quarter) => (
            bpm_from_us_per_quarter(us_per_quarter),
            us_per_quarter as f64,
            1000.0 * division as f64,
        ),
        None => {
            let bpm = if fallback_tempo_bpm == 0 {
                DEFAULT_TEMPO_BPM
            } else {
                fallback_tempo_bpm
            };
            (bpm, 60_000.0, bpm as f64 * division as f64)
        }
    };
    let tick_to_ms = |tick: u64| tick as f64 * per_tick_num / per_tick_den;

    let events = raw
        .into_iter()
        .map(|event| {
            let ms = tick_to_ms(event.tick);
            TypedEvent {
                kind: EventKind::from_status(event.status, event.data2),
                channel: event.status & 0x0F,
                note: event.data1,
                velocity: event.data2,
                timestamp: ms,
                delta_time: ms,
            }
        })
        .collect();

    Ok(Recording {
        events,
        duration: tick_to_ms(end_tick),
        tempo,
        recorded_at: None,
    })
}

fn bpm_from_us_per_quarter(us_per_quarter: u32) -> u32 {
    let bpm = (60_000_000.0 / us_per_quarter.max(1) as f64).round() as u32;
    bpm.max(1)
}

struct RawChannelEvent {
    tick: u64,
    status: u8,
    data1: u8,
    data2: u8,
}

/// Returns the tick at which the track ends.
fn decode_track(
    body: &[u8],
    out: &mut Vec<RawChannelEvent>,
    first_tempo: &mut Option<u32>,
) -> Result<u64, InterchangeError> {
    let mut reader = Reader::new(body);
    let mut tick: u64 = 0;
    let mut running_status: Option<u8> = None;

    while !reader.is_empty() {
        tick += reader.read_var_len()? as u64;
        let lead = reader.read_u8("event")?;
        match lead {
            0xFF => {
                running_status = None;
                let meta_type = reader.read_u8("meta type")?;
                let len = reader.read_var_len()? as usize;
                let payload = reader.take(len, "meta payload")?;
                match meta_type {
                    0x2F => return Ok(tick),
                    0x51 if payload.len() == 3 => {
                        let us = u32::from_be_bytes([0, payload[0], payload[1], payload[2]]);
                        if first_tempo.is_none() {
                            *first_tempo = Some(us);
                        } else {
                            debug!(tick, us_per_quarter = us, "ignoring mid-stream tempo change");
                        }
                    }
                    _ => {}
                }
            }
            0xF0 | 0xF7 => {
                running_status = None;
                let len = reader.read_var_len()? as usize;
                reader.take(len, "sysex payload")?;
            }
            0x80..=0xEF => {
                running_status = Some(lead);
                let data1 = reader.read_u8("channel data")?;
                let data2 = read_second_data_byte(&mut reader, lead)?;
                out.push(RawChannelEvent {
                    tick,
                    status: lead,
                    data1,
                    data2,
                });
            }
            0x00..=0x7F => {
                let status = running_status.ok_or(InterchangeError::UnexpectedStatus(lead))?;
                let data2 = read_second_data_byte(&mut reader, status)?;
                out.push(RawChannelEvent {
                    tick,
                    status,
                    data1: lead,
                    data2,
                });
            }
            other => return Err(InterchangeError::UnexpectedStatus(other)),
        }
    }

    Ok(tick)
}

fn read_second_data_byte(reader: &mut Reader<'_>, status: u8) -> Result<u8, InterchangeError> {
    match status & 0xF0 {
        0xC0 | 0xD0 => Ok(0),
        _ => reader.read_u8("channel data"),
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn take(&mut self, len: usize, what: &'static str) -> Result<&'a [u8], InterchangeError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or(InterchangeError::Truncated(what))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u8(&mut self, what: &'static str) -> Result<u8, InterchangeError> {
        Ok(self.take(1, what)?[0])
    }

    fn read_u32(&mut self, what: &'static str) -> Result<u32, InterchangeError> {
        let b = self.take(4, what)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_magic(&mut self) -> Result<[u8; 4], InterchangeError> {
        let b = self.take(4, "chunk id")?;
        Ok([b[0], b[1], b[2], b[3]])
    }

    fn read_var_len(&mut self) -> Result<u32, InterchangeError> {
        let (value, used) = read_var_len(&self.data[self.pos..])?;
        self.pos += used;
        Ok(value)
    }
}
