//! Machine state model.
//!
//! A machine lives in two interchangeable shapes: the nested [`Frame`] the
//! interpreter works on, and the flat word sequence used for storage,
//! hashing and transport. [`Frame::flatten`] and [`Frame::unflatten`] are
//! exact inverses on well-formed values; `unflatten` is partial on
//! arbitrary input and reports malformed encodings as [`VmError`]s instead
//! of truncating silently.
//!
//! # Flat layout
//!
//! ```text
//! [status, rec, gas, mem, ip,
//!  lenCode, lenStack, lenMap, lenMemory,
//!  code…, stack…, (key, value)…, {lenArea, area…} per area]
//! ```
//!
//! `lenMap` counts words, two per map entry.

use crate::types::word::{word_to_index, Word};
use crate::vm::errors::VmError;
use std::fmt;

/// Words in the fixed state header: status, rec, gas, mem, ip.
pub const STATE_HEADER_LEN: usize = 5;

/// Words before the variable content of a flat state: the state header
/// plus the four length fields. Producer and consumer must agree on this.
pub const FLAT_HEADER_LEN: usize = STATE_HEADER_LEN + 4;

/// An area must be longer than this to be invoked as a nested machine.
pub const AREA_HEADER_LEN: usize = 4;

// Flat header word offsets.
pub(crate) const F_STATUS: usize = 0;
pub(crate) const F_REC: usize = 1;
pub(crate) const F_GAS: usize = 2;
pub(crate) const F_MEM: usize = 3;
pub(crate) const F_IP: usize = 4;
const F_LEN_CODE: usize = 5;
const F_LEN_STACK: usize = 6;
const F_LEN_MAP: usize = 7;
const F_LEN_MEMORY: usize = 8;

/// Machine status word. Numeric values are part of the wire format.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum Status {
    /// Runnable.
    Normal = 0,
    /// Externally paused child; never set by the interpreter.
    Frozen = 1,
    /// Explicit halt.
    VolHalt = 2,
    /// Explicit return or yield.
    VolReturn = 3,
    /// Gas budget exhausted.
    OutOfGas = 4,
    /// Instruction pointer or operand past the end of code.
    OutOfCode = 5,
    /// Operand stack shallower than the instruction requires.
    OutOfStack = 6,
    /// Mem budget insufficient.
    OutOfMemory = 7,
    /// Invalid area index or address.
    OutOfBounds = 8,
    /// Unrecognized opcode.
    UnknownCode = 9,
    /// Reserved in-flight recursion marker.
    Recurse = 10,
}

impl Status {
    /// Display names, matching the serialized status table.
    pub const fn as_str(self) -> &'static str {
        match self {
            Status::Normal => "NORMAL",
            Status::Frozen => "FROZEN",
            Status::VolHalt => "VOLHALT",
            Status::VolReturn => "VOLRETURN",
            Status::OutOfGas => "OUTOFGAS",
            Status::OutOfCode => "OUTOFCODE",
            Status::OutOfStack => "OUTOFSTACK",
            Status::OutOfMemory => "OUTOFMEMORY",
            Status::OutOfBounds => "OUTOFBOUNDS",
            Status::UnknownCode => "UNKNOWNCODE",
            Status::Recurse => "RUN",
        }
    }

    /// Whether `step` dispatches an instruction for this status.
    pub const fn is_runnable(self) -> bool {
        matches!(self, Status::Normal | Status::Recurse)
    }

    /// The status as its wire word.
    pub fn word(self) -> Word {
        Word::from(self as u64)
    }

    pub(crate) fn from_word(w: Word) -> Result<Status, VmError> {
        if w > Word::from(u8::MAX) {
            return Err(VmError::UnknownStatus(w));
        }
        match w.low_u64() as u8 {
            0 => Ok(Status::Normal),
            1 => Ok(Status::Frozen),
            2 => Ok(Status::VolHalt),
            3 => Ok(Status::VolReturn),
            4 => Ok(Status::OutOfGas),
            5 => Ok(Status::OutOfCode),
            6 => Ok(Status::OutOfStack),
            7 => Ok(Status::OutOfMemory),
            8 => Ok(Status::OutOfBounds),
            9 => Ok(Status::UnknownCode),
            10 => Ok(Status::Recurse),
            _ => Err(VmError::UnknownStatus(w)),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One machine's complete state.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Frame {
    /// Current machine status.
    pub status: Status,
    /// Recursion marker: 0 outside a child call, else child area + 1.
    pub rec: Word,
    /// Remaining step budget, shared downward through `RUN`.
    pub gas: Word,
    /// Remaining allocation-unit budget, shared downward through `RUN`.
    pub mem: Word,
    /// Instruction pointer into `code`.
    pub ip: Word,
    /// Program words; immutable while the frame runs.
    pub code: Vec<Word>,
    /// Operand stack.
    pub stack: Vec<Word>,
    /// Key/value entries; first match wins on lookup and update.
    pub map: Vec<(Word, Word)>,
    /// Growable memory areas. Area 0 conventionally holds host input.
    pub memory: Vec<Vec<Word>>,
}

impl Frame {
    /// A fresh machine around a code image: empty stack, map and memory,
    /// zeroed budgets. The driver sets budgets before the first step.
    pub fn new(code: Vec<Word>) -> Frame {
        Frame {
            status: Status::Normal,
            rec: Word::zero(),
            gas: Word::zero(),
            mem: Word::zero(),
            ip: Word::zero(),
            code,
            stack: Vec::new(),
            map: Vec::new(),
            memory: Vec::new(),
        }
    }

    /// Serializes the frame into its flat word sequence.
    pub fn flatten(&self) -> Vec<Word> {
        let area_words: usize = self.memory.iter().map(|area| area.len() + 1).sum();
        let mut flat = Vec::with_capacity(
            FLAT_HEADER_LEN + self.code.len() + self.stack.len() + self.map.len() * 2 + area_words,
        );
        flat.push(self.status.word());
        flat.push(self.rec);
        flat.push(self.gas);
        flat.push(self.mem);
        flat.push(self.ip);
        flat.push(Word::from(self.code.len() as u64));
        flat.push(Word::from(self.stack.len() as u64));
        flat.push(Word::from((self.map.len() * 2) as u64));
        flat.push(Word::from(self.memory.len() as u64));
        flat.extend_from_slice(&self.code);
        flat.extend_from_slice(&self.stack);
        for (key, value) in &self.map {
            flat.push(*key);
            flat.push(*value);
        }
        for area in &self.memory {
            flat.push(Word::from(area.len() as u64));
            flat.extend_from_slice(area);
        }
        flat
    }

    /// Rebuilds a frame from its flat word sequence.
    ///
    /// Fails on truncated input, unrepresentable length fields, an odd map
    /// length, an unknown status word, and trailing words.
    pub fn unflatten(words: &[Word]) -> Result<Frame, VmError> {
        if words.len() < FLAT_HEADER_LEN {
            return Err(VmError::Truncated {
                offset: words.len(),
                needed: FLAT_HEADER_LEN - words.len(),
            });
        }
        let status = Status::from_word(words[F_STATUS])?;
        let len_code = length_field(words, F_LEN_CODE)?;
        let len_stack = length_field(words, F_LEN_STACK)?;
        let len_map = length_field(words, F_LEN_MAP)?;
        let len_memory = length_field(words, F_LEN_MEMORY)?;
        if len_map % 2 != 0 {
            return Err(VmError::OddMapLength(len_map));
        }

        let mut cursor = FLAT_HEADER_LEN;
        let code = take(words, &mut cursor, len_code)?;
        let stack = take(words, &mut cursor, len_stack)?;
        let pairs = take(words, &mut cursor, len_map)?;
        let map = pairs.chunks(2).map(|pair| (pair[0], pair[1])).collect();

        let mut memory = Vec::with_capacity(len_memory.min(words.len()));
        for _ in 0..len_memory {
            let len_area = length_field(words, cursor)?;
            cursor += 1;
            memory.push(take(words, &mut cursor, len_area)?);
        }
        if cursor != words.len() {
            return Err(VmError::TrailingWords(words.len() - cursor));
        }

        Ok(Frame {
            status,
            rec: words[F_REC],
            gas: words[F_GAS],
            mem: words[F_MEM],
            ip: words[F_IP],
            code,
            stack,
            map,
            memory,
        })
    }

    /// Index of the first map entry with a matching key.
    pub(crate) fn map_lookup(&self, key: Word) -> Option<usize> {
        self.map.iter().position(|entry| entry.0 == key)
    }
}

/// Reads a length word, requiring it to be representable on this host.
fn length_field(words: &[Word], offset: usize) -> Result<usize, VmError> {
    let word = words
        .get(offset)
        .ok_or(VmError::Truncated { offset, needed: 1 })?;
    word_to_index(*word).ok_or(VmError::LengthOverflow { offset })
}

/// Slices `len` words off the input, advancing the cursor.
fn take(words: &[Word], cursor: &mut usize, len: usize) -> Result<Vec<Word>, VmError> {
    let end = cursor
        .checked_add(len)
        .ok_or(VmError::LengthOverflow { offset: *cursor })?;
    let slice = words.get(*cursor..end).ok_or_else(|| VmError::Truncated {
        offset: *cursor,
        needed: end - words.len(),
    })?;
    *cursor = end;
    Ok(slice.to_vec())
}
