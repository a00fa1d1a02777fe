//! Binary state codec — the on-disk record.
//!
//! LAYOUT (little-endian, fixed order on both sides):
//!   header    7 bytes   magic u32, major u8, minor u8, patch u8
//!   state     42 bytes  ten i32 counters, render_mode u8, color_mode u8
//!   subject   67 bytes  age, species, patience, tolerance, mood, level, 4 slots
//!   manifest  1 byte    which text fields follow (bit0 player, bit1 subject)
//!   text      N bytes   each present field as UTF-8 + NUL, in bit order
//!
//! RULES:
//!   - Decoding never trusts a stored length; every text field is found by
//!     scanning for its terminator inside the supplied buffer.
//!   - The manifest says exactly which text fields follow. Decode never guesses.
//!   - Slot color is written as a cache byte and ignored on decode; it is
//!     always re-derived from health.

use crate::{
    catalog::{Catalog, Species},
    error::CodecError,
    reaction::{Mood, PatienceLevel},
    state::{SimulationState, Slot, Subject},
    types::{MAX_HEALTH, SLOT_COUNT},
};

/// "btfd": buffy the fluoride dispenser.
pub const GAMECODE: u32 = 0x6274_6664;
pub const VERSION_MAJOR: u8 = 2;
pub const VERSION_MINOR: u8 = 0;
pub const VERSION_PATCH: u8 = 0;

pub const HEADER_LEN: usize = 7;
pub const STATE_LEN: usize = 10 * 4 + 2;
pub const SLOT_LEN: usize = 3 * 4 + 1;
pub const SUBJECT_LEN: usize = 4 + 1 + 4 + 4 + 1 + 1 + SLOT_COUNT * SLOT_LEN;
/// Everything up to and including the manifest byte.
pub const FIXED_LEN: usize = HEADER_LEN + STATE_LEN + SUBJECT_LEN + 1;

const FIELD_PLAYER_NAME: u8 = 0b0000_0001;
const FIELD_SUBJECT_NAME: u8 = 0b0000_0010;
const KNOWN_FIELDS: u8 = FIELD_PLAYER_NAME | FIELD_SUBJECT_NAME;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub magic: u32,
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl Header {
    pub const CURRENT: Header = Header {
        magic: GAMECODE,
        major: VERSION_MAJOR,
        minor: VERSION_MINOR,
        patch: VERSION_PATCH,
    };
}

pub fn encode_header() -> [u8; HEADER_LEN] {
    let mut out = [0u8; HEADER_LEN];
    out[..4].copy_from_slice(&GAMECODE.to_le_bytes());
    out[4] = VERSION_MAJOR;
    out[5] = VERSION_MINOR;
    out[6] = VERSION_PATCH;
    out
}

/// Serialize a full record. Identical inputs always give identical bytes.
pub fn encode_record(state: &SimulationState, subject: &Subject) -> Vec<u8> {
    let mut w = ByteWriter::with_capacity(FIXED_LEN + 64);
    w.bytes(&encode_header());

    // state
    for (_, value) in state.integer_fields() {
        w.i32(value);
    }
    w.u8(u8::from(state.render_mode));
    w.u8(u8::from(state.color_mode));

    // subject
    w.i32(subject.age);
    w.u8(subject.species.tag());
    w.i32(subject.patience);
    w.i32(subject.pain_tolerance);
    w.u8(subject.mood.tag());
    w.u8(subject.patience_level.tag());
    for slot in &subject.slots {
        w.i32(slot.length());
        w.i32(slot.sharpness());
        w.i32(slot.health());
        w.u8(slot.color().tag());
    }

    // manifest + text
    let mut manifest = FIELD_SUBJECT_NAME;
    if state.player_name.is_some() {
        manifest |= FIELD_PLAYER_NAME;
    }
    w.u8(manifest);
    if let Some(name) = &state.player_name {
        w.text(name);
    }
    w.text(&subject.name);

    w.finish()
}

/// Check the 7-byte header. Any difference from the running build is a mismatch.
pub fn decode_header(bytes: &[u8]) -> Result<Header, CodecError> {
    let mut r = ByteReader::new(bytes);
    read_header(&mut r)
}

pub fn decode_record(bytes: &[u8]) -> Result<(SimulationState, Subject), CodecError> {
    let mut r = ByteReader::new(bytes);
    read_header(&mut r)?;

    let fluoride = r.i32()?;
    let last_dip = r.i32()?;
    let last_effort = r.i32()?;
    let dip = r.i32()?;
    let effort = r.i32()?;
    let subject_idx = r.i32()?;
    let tool_idx = r.i32()?;
    let score = r.i32()?;
    let turns = r.i32()?;
    let fluoride_used = r.i32()?;
    let render_mode = r.flag("render_mode")?;
    let color_mode = r.flag("color_mode")?;

    let age = r.i32()?;
    let species_tag = r.u8()?;
    let patience = r.i32()?;
    let pain_tolerance = r.i32()?;
    let mood_tag = r.u8()?;
    let level_tag = r.u8()?;
    let mut slots = [Slot::from_wire(0, 0, 0); SLOT_COUNT];
    for slot in &mut slots {
        let length = r.i32()?;
        let sharpness = r.i32()?;
        let health = r.i32()?;
        let _color_cache = r.u8()?;
        *slot = Slot::from_wire(length, sharpness, health);
    }

    let manifest = r.u8()?;

    // Tags are checked only after the fixed blocks are known to be complete,
    // so every short buffer reports Truncated.
    let species = Species::from_tag(species_tag)
        .ok_or_else(|| CodecError::Malformed(format!("unknown species tag {species_tag}")))?;
    let mood = Mood::from_tag(mood_tag)
        .ok_or_else(|| CodecError::Malformed(format!("unknown mood tag {mood_tag}")))?;
    let patience_level = PatienceLevel::from_tag(level_tag)
        .ok_or_else(|| CodecError::Malformed(format!("unknown patience level tag {level_tag}")))?;
    if manifest & !KNOWN_FIELDS != 0 {
        return Err(CodecError::Malformed(format!("unknown text fields {manifest:#04x}")));
    }

    let player_name = if manifest & FIELD_PLAYER_NAME != 0 {
        Some(r.text("player name")?)
    } else {
        None
    };
    let name = if manifest & FIELD_SUBJECT_NAME != 0 {
        r.text("subject name")?
    } else {
        String::new()
    };

    if r.remaining() != 0 {
        return Err(CodecError::Malformed(format!("{} trailing bytes", r.remaining())));
    }

    let state = SimulationState {
        fluoride,
        last_dip,
        last_effort,
        dip,
        effort,
        subject_idx,
        tool_idx,
        score,
        turns,
        fluoride_used,
        render_mode,
        color_mode,
        player_name,
    };
    let subject = Subject {
        age,
        name,
        species,
        patience,
        pain_tolerance,
        mood,
        patience_level,
        slots,
    };
    Ok((state, subject))
}

/// Semantic checks on a structurally valid record. With a catalog, the
/// subject and tool selectors must also point at real entries.
pub fn check_ranges(
    state: &SimulationState,
    subject: &Subject,
    catalog: Option<&Catalog>,
) -> Result<(), String> {
    for (field, value) in state.integer_fields() {
        if value < 0 {
            return Err(format!("{field} is negative ({value})"));
        }
    }
    if subject.patience < 0 {
        return Err(format!("patience is negative ({})", subject.patience));
    }
    for (i, slot) in subject.slots.iter().enumerate() {
        if !(0..=MAX_HEALTH).contains(&slot.health()) {
            return Err(format!("slot {i} health {} outside 0..={MAX_HEALTH}", slot.health()));
        }
    }
    if let Some(catalog) = catalog {
        if catalog.tool(state.tool_idx as usize).is_none() {
            return Err(format!("tool index {} not in catalog", state.tool_idx));
        }
        if catalog.creature(state.subject_idx as usize).is_none() {
            return Err(format!("subject index {} not in catalog", state.subject_idx));
        }
    }
    Ok(())
}

fn read_header(r: &mut ByteReader<'_>) -> Result<Header, CodecError> {
    let found = Header {
        magic: r.u32()?,
        major: r.u8()?,
        minor: r.u8()?,
        patch: r.u8()?,
    };
    if found != Header::CURRENT {
        return Err(CodecError::VersionMismatch { found });
    }
    Ok(found)
}

struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    fn with_capacity(capacity: usize) -> Self {
        Self { buf: Vec::with_capacity(capacity) }
    }

    fn bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    fn i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Text stops at its first NUL; the terminator is always written.
    fn text(&mut self, value: &str) {
        let bytes = value.as_bytes();
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        self.buf.extend_from_slice(&bytes[..end]);
        self.buf.push(0);
    }

    fn finish(self) -> Vec<u8> {
        self.buf
    }
}

struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let end = self.pos.checked_add(N).ok_or(CodecError::Truncated)?;
        let chunk = self.buf.get(self.pos..end).ok_or(CodecError::Truncated)?;
        self.pos = end;
        let mut out = [0u8; N];
        out.copy_from_slice(chunk);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take::<1>()?[0])
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.take::<4>()?))
    }

    fn i32(&mut self) -> Result<i32, CodecError> {
        Ok(i32::from_le_bytes(self.take::<4>()?))
    }

    fn flag(&mut self, field: &str) -> Result<bool, CodecError> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CodecError::Malformed(format!("{field} flag is {other}"))),
        }
    }

    fn text(&mut self, field: &str) -> Result<String, CodecError> {
        let rest = &self.buf[self.pos..];
        let len = rest.iter().position(|&b| b == 0).ok_or(CodecError::Truncated)?;
        let text = std::str::from_utf8(&rest[..len])
            .map_err(|e| CodecError::Malformed(format!("{field} is not UTF-8: {e}")))?
            .to_string();
        self.pos += len + 1;
        Ok(text)
    }
}
