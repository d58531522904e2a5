//! Interpreter core.
//!
//! [`step`] maps one flat machine state to the next: it decodes the
//! instruction under the instruction pointer, validates every precondition,
//! charges the gas/mem budgets of every live frame, applies the effect and
//! reflattens. At most one non-`RUN` instruction executes per step; `RUN`
//! only deepens the explicit frame stack, so recursion depth is bounded by
//! the mem budget rather than the host call stack.
//!
//! Failure discipline: every fault (`OUTOFGAS`, `OUTOFCODE`, `OUTOFSTACK`,
//! `OUTOFMEMORY`, `OUTOFBOUNDS`, `UNKNOWNCODE`) is checked before any
//! mutation, so a failed instruction returns a state identical to its input
//! except for the status word. Re-stepping after an external repair
//! re-attempts the same instruction.

use crate::crypto;
use crate::types::word::{word_to_index, Word};
use crate::vm::errors::VmError;
use crate::vm::frame::{Frame, Status, AREA_HEADER_LEN, F_STATUS};
use crate::vm::isa::Opcode;

/// One live frame on the explicit call stack. `owner` is the parent memory
/// area the frame was unflattened from; the root has none.
struct ActiveFrame {
    frame: Frame,
    owner: Option<usize>,
}

/// Net metered effect of one dispatch, in allocation units.
#[derive(Copy, Clone)]
enum MemCharge {
    Debit(Word),
    Credit(Word),
}

/// Executes at most one instruction of the machine encoded in `flat`.
///
/// A non-runnable input is returned unchanged. `Err` is reserved for a
/// malformed input encoding; every runtime fault comes back as a status
/// word in a well-formed state.
pub fn step(flat: &[Word]) -> Result<Vec<Word>, VmError> {
    let root = Frame::unflatten(flat)?;
    if !root.status.is_runnable() {
        return Ok(flat.to_vec());
    }

    let mut frames = vec![ActiveFrame {
        frame: root,
        owner: None,
    }];

    loop {
        let depth = frames.len() - 1;

        // Dispatch checks fail closed: the status word is the only mutation.
        let op = {
            let frame = &mut frames[depth].frame;
            if frame.gas.is_zero() {
                frame.status = Status::OutOfGas;
                break;
            }
            let ip = match word_to_index(frame.ip) {
                Some(ip) if ip < frame.code.len() => ip,
                _ => {
                    frame.status = Status::OutOfCode;
                    break;
                }
            };
            let op = match Opcode::decode(frame.code[ip]) {
                Some(op) => op,
                None => {
                    frame.status = Status::UnknownCode;
                    break;
                }
            };
            if ip + op.size() > frame.code.len() {
                frame.status = Status::OutOfCode;
                break;
            }
            if frame.stack.len() < op.min_stack() {
                frame.status = Status::OutOfStack;
                break;
            }
            op
        };

        // RUN never stops the loop itself: it descends, completes or skips,
        // and the loop runs until a plain instruction executes or faults.
        if op == Opcode::Run {
            run_call(&mut frames);
            continue;
        }

        if let Err(fault) = validate(op, &frames[depth].frame) {
            frames[depth].frame.status = fault;
            break;
        }
        if !charge(&mut frames, op) {
            break;
        }
        apply(op, &mut frames[depth].frame);
        break;
    }

    Ok(unwind(frames))
}

/// Drives a machine to its next stop: overwrites the root's budgets, then
/// steps until the status is no longer runnable.
pub fn run(flat: &[Word], gas: Word, mem: Word) -> Result<Vec<Word>, VmError> {
    let mut frame = Frame::unflatten(flat)?;
    frame.status = Status::Normal;
    frame.gas = gas;
    frame.mem = mem;

    let mut state = frame.flatten();
    loop {
        if !Status::from_word(state[F_STATUS])?.is_runnable() {
            return Ok(state);
        }
        state = step(&state)?;
    }
}

/// Handles one `RUN` dispatch on the deepest frame.
///
/// Descends into the child when it is runnable. A terminal child completes
/// the call; an uninvokable area (bad index, too short, not decodable as a
/// machine) skips it. Neither case is a fault.
fn run_call(frames: &mut Vec<ActiveFrame>) {
    let depth = frames.len() - 1;
    let frame = &mut frames[depth].frame;
    let top = frame.stack.len();
    let gas = frame.stack[top - 2];
    let mem = frame.stack[top - 1];

    let area = match word_to_index(frame.stack[top - 3]) {
        Some(area) if area < frame.memory.len() && frame.memory[area].len() > AREA_HEADER_LEN => {
            area
        }
        _ => {
            finish_run(frame);
            return;
        }
    };
    let mut child = match Frame::unflatten(&frame.memory[area]) {
        Ok(child) => child,
        Err(_) => {
            finish_run(frame);
            return;
        }
    };

    // First encounter: the call arguments become the child's budgets and
    // the child is revived whatever its previous status was.
    if frame.rec.is_zero() {
        child.status = Status::Normal;
        child.gas = gas;
        child.mem = mem;
        frame.memory[area] = child.flatten();
        frame.rec = Word::from(area as u64 + 1);
    }

    if child.status != Status::Normal {
        frame.rec = Word::zero();
        finish_run(frame);
        return;
    }
    frames.push(ActiveFrame {
        frame: child,
        owner: Some(area),
    });
}

/// Completes or skips a `RUN`: pops the three call operands, refunds their
/// stack units to this frame and advances past the instruction.
fn finish_run(frame: &mut Frame) {
    let top = frame.stack.len();
    frame.stack.truncate(top - 3);
    frame.mem = frame.mem.saturating_add(Word::from(3u64));
    advance(frame, Opcode::Run);
}

/// Opcode-specific precondition checks. Read-only: a returned fault becomes
/// the frame's status and nothing else changes.
fn validate(op: Opcode, frame: &Frame) -> Result<(), Status> {
    let top = frame.stack.len();
    match op {
        Opcode::AreaLen | Opcode::Dearea => {
            area_index(frame, frame.stack[top - 1]).map(|_| ())
        }
        Opcode::Read => {
            let area = area_index(frame, frame.stack[top - 2])?;
            word_offset(frame, area, frame.stack[top - 1]).map(|_| ())
        }
        Opcode::Write => {
            let area = area_index(frame, frame.stack[top - 3])?;
            word_offset(frame, area, frame.stack[top - 2]).map(|_| ())
        }
        Opcode::Alloc => {
            area_index(frame, frame.stack[top - 2])?;
            // a growth the host cannot address can never be satisfied
            match word_to_index(frame.stack[top - 1]) {
                Some(_) => Ok(()),
                None => Err(Status::OutOfMemory),
            }
        }
        Opcode::Dealloc => {
            let area = area_index(frame, frame.stack[top - 2])?;
            if frame.stack[top - 1] > Word::from(frame.memory[area].len() as u64) {
                Err(Status::OutOfBounds)
            } else {
                Ok(())
            }
        }
        Opcode::Div | Opcode::Mod => {
            if frame.stack[top - 1].is_zero() {
                Err(Status::OutOfBounds)
            } else {
                Ok(())
            }
        }
        _ => Ok(()),
    }
}

/// Net metered effect of `op` against the deepest frame, computed before
/// any mutation: the static table effect plus the data-dependent terms.
fn mem_charge(op: Opcode, frame: &Frame) -> MemCharge {
    let top = frame.stack.len();
    match op {
        Opcode::Pop => {
            if frame.stack.is_empty() {
                charge_of(0)
            } else {
                charge_of(-1)
            }
        }
        Opcode::KeySet => {
            // an update reuses the entry, an insert grows the map by a pair
            if frame.map_lookup(frame.stack[top - 2]).is_some() {
                charge_of(op.effect() as i64)
            } else {
                charge_of(op.effect() as i64 + 2)
            }
        }
        Opcode::KeyGet => {
            if frame.map_lookup(frame.stack[top - 1]).is_some() {
                charge_of(0)
            } else {
                charge_of(-1)
            }
        }
        Opcode::KeyDel => {
            if frame.map_lookup(frame.stack[top - 1]).is_some() {
                charge_of(-3)
            } else {
                charge_of(-1)
            }
        }
        Opcode::Dearea => {
            // the freed words plus the area record plus the popped index
            let len = word_to_index(frame.stack[top - 1])
                .map(|area| frame.memory[area].len())
                .unwrap_or(0);
            MemCharge::Credit(Word::from(len as u64).saturating_add(Word::from(2u64)))
        }
        Opcode::Alloc => {
            // requested growth against the two-operand refund
            let size = frame.stack[top - 1];
            if size >= Word::from(2u64) {
                MemCharge::Debit(size - Word::from(2u64))
            } else {
                MemCharge::Credit(Word::from(2u64) - size)
            }
        }
        Opcode::Dealloc => {
            MemCharge::Credit(frame.stack[top - 1].saturating_add(Word::from(2u64)))
        }
        _ => charge_of(op.effect() as i64),
    }
}

fn charge_of(units: i64) -> MemCharge {
    if units >= 0 {
        MemCharge::Debit(Word::from(units as u64))
    } else {
        MemCharge::Credit(Word::from(units.unsigned_abs()))
    }
}

/// Debits every live frame for one dispatch: gas by the table cost, mem by
/// the net effect, so every ancestor pays for work done in its subtree.
///
/// An unpayable debit flags the failing frame `OUTOFMEMORY` and charges
/// nothing anywhere, keeping failed instructions pure status transitions.
fn charge(frames: &mut [ActiveFrame], op: Opcode) -> bool {
    let deepest = frames.len() - 1;
    let effect = mem_charge(op, &frames[deepest].frame);

    if let MemCharge::Debit(debit) = effect {
        if let Some(broke) = frames.iter().position(|active| active.frame.mem < debit) {
            frames[broke].frame.status = Status::OutOfMemory;
            return false;
        }
    }

    let cost = Word::from(op.gas());
    for active in frames.iter_mut() {
        active.frame.gas = active.frame.gas.saturating_sub(cost);
        active.frame.mem = match effect {
            MemCharge::Debit(debit) => active.frame.mem - debit,
            MemCharge::Credit(credit) => active.frame.mem.saturating_add(credit),
        };
    }
    true
}

/// Applies the opcode's structural effect to the deepest frame and advances
/// control flow. Preconditions and resource charges have already passed.
fn apply(op: Opcode, frame: &mut Frame) {
    match op {
        Opcode::Halt => {
            frame.status = Status::VolHalt;
            advance(frame, op);
        }
        Opcode::Return => {
            frame.status = Status::VolReturn;
            frame.ip = Word::zero();
        }
        Opcode::Yield => {
            frame.status = Status::VolReturn;
            advance(frame, op);
        }
        // routed through run_call, never applied here
        Opcode::Run => {}
        Opcode::Jump => {
            frame.ip = pop(frame);
        }
        Opcode::Jz => {
            let target = pop(frame);
            let condition = pop(frame);
            if condition.is_zero() {
                frame.ip = target;
            } else {
                advance(frame, op);
            }
        }
        Opcode::Push => {
            let value = frame.code[index(frame.ip) + 1];
            frame.stack.push(value);
            advance(frame, op);
        }
        Opcode::Pop => {
            frame.stack.pop();
            advance(frame, op);
        }
        Opcode::Dup => {
            let top = frame.stack[frame.stack.len() - 1];
            frame.stack.push(top);
            advance(frame, op);
        }
        Opcode::Flip => {
            let top = frame.stack.len();
            frame.stack.swap(top - 1, top - 2);
            advance(frame, op);
        }
        Opcode::KeySet => {
            let value = pop(frame);
            let key = pop(frame);
            match frame.map_lookup(key) {
                Some(entry) => frame.map[entry].1 = value,
                None => frame.map.push((key, value)),
            }
            advance(frame, op);
        }
        Opcode::KeyHas => {
            let top = frame.stack.len();
            let present = frame.map_lookup(frame.stack[top - 1]).is_some();
            frame.stack[top - 1] = if present { Word::one() } else { Word::zero() };
            advance(frame, op);
        }
        Opcode::KeyGet => {
            let top = frame.stack.len();
            match frame.map_lookup(frame.stack[top - 1]) {
                Some(entry) => frame.stack[top - 1] = frame.map[entry].1,
                None => {
                    frame.stack.pop();
                }
            }
            advance(frame, op);
        }
        Opcode::KeyDel => {
            let key = pop(frame);
            if let Some(entry) = frame.map_lookup(key) {
                frame.map.remove(entry);
            }
            advance(frame, op);
        }
        Opcode::StackLen => {
            let depth = frame.stack.len();
            frame.stack.push(Word::from(depth as u64));
            advance(frame, op);
        }
        Opcode::MemoryLen => {
            frame.stack.push(Word::from(frame.memory.len() as u64));
            advance(frame, op);
        }
        Opcode::AreaLen => {
            let top = frame.stack.len();
            let area = index(frame.stack[top - 1]);
            frame.stack[top - 1] = Word::from(frame.memory[area].len() as u64);
            advance(frame, op);
        }
        Opcode::Read => {
            let addr = index(pop(frame));
            let top = frame.stack.len();
            let area = index(frame.stack[top - 1]);
            frame.stack[top - 1] = frame.memory[area][addr];
            advance(frame, op);
        }
        Opcode::Write => {
            let value = pop(frame);
            let addr = index(pop(frame));
            let area = index(pop(frame));
            frame.memory[area][addr] = value;
            advance(frame, op);
        }
        Opcode::Area => {
            frame.memory.push(Vec::new());
            advance(frame, op);
        }
        Opcode::Dearea => {
            // dangling indices into the areas after this one are the
            // program's own problem
            let area = index(pop(frame));
            frame.memory.remove(area);
            advance(frame, op);
        }
        Opcode::Alloc => {
            let size = index(pop(frame));
            let area = index(pop(frame));
            let grown = frame.memory[area].len() + size;
            frame.memory[area].resize(grown, Word::zero());
            advance(frame, op);
        }
        Opcode::Dealloc => {
            let size = index(pop(frame));
            let area = index(pop(frame));
            let kept = frame.memory[area].len() - size;
            frame.memory[area].truncate(kept);
            advance(frame, op);
        }
        Opcode::Add => binary(frame, op, |a, b| a.overflowing_add(b).0),
        Opcode::Sub => binary(frame, op, |a, b| a.overflowing_sub(b).0),
        Opcode::Mul => binary(frame, op, |a, b| a.overflowing_mul(b).0),
        Opcode::Div => binary(frame, op, |a, b| a.checked_div(b).unwrap_or_default()),
        Opcode::Mod => binary(frame, op, |a, b| a.checked_rem(b).unwrap_or_default()),
        Opcode::Not => {
            let top = frame.stack.len();
            frame.stack[top - 1] = !frame.stack[top - 1];
            advance(frame, op);
        }
        Opcode::Sha256 => {
            let top = frame.stack.len();
            frame.stack[top - 1] = crypto::word_hash(frame.stack[top - 1]);
            advance(frame, op);
        }
    }
}

/// Pops the right operand, combines it into the new top, advances.
fn binary(frame: &mut Frame, op: Opcode, f: impl Fn(Word, Word) -> Word) {
    let right = pop(frame);
    let top = frame.stack.len();
    frame.stack[top - 1] = f(frame.stack[top - 1], right);
    advance(frame, op);
}

/// Advances the instruction pointer past the instruction.
fn advance(frame: &mut Frame, op: Opcode) {
    frame.ip = frame.ip.overflowing_add(Word::from(op.size() as u64)).0;
}

// Stack depth is pre-checked against the table minimum.
fn pop(frame: &mut Frame) -> Word {
    frame.stack.pop().unwrap_or_default()
}

// Converts a word already validated as an in-range index.
fn index(w: Word) -> usize {
    word_to_index(w).unwrap_or_default()
}

fn area_index(frame: &Frame, w: Word) -> Result<usize, Status> {
    match word_to_index(w) {
        Some(area) if area < frame.memory.len() => Ok(area),
        _ => Err(Status::OutOfBounds),
    }
}

fn word_offset(frame: &Frame, area: usize, w: Word) -> Result<usize, Status> {
    match word_to_index(w) {
        Some(addr) if addr < frame.memory[area].len() => Ok(addr),
        _ => Err(Status::OutOfBounds),
    }
}

/// Writes every child frame back into its owner area, deepest first, and
/// returns the root's flat image.
fn unwind(mut frames: Vec<ActiveFrame>) -> Vec<Word> {
    while frames.len() > 1 {
        let child = match frames.pop() {
            Some(child) => child,
            None => break,
        };
        let flat = child.frame.flatten();
        if let (Some(area), Some(parent)) = (child.owner, frames.last_mut()) {
            parent.frame.memory[area] = flat;
        }
    }
    match frames.pop() {
        Some(root) => root.frame.flatten(),
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests;
