use crate::crypto;
use crate::types::word::Word;
use crate::vm::assembler::assemble;
use crate::vm::errors::VmError;
use crate::vm::frame::{Frame, Status};
use crate::vm::step::{run, step};

/// 2^256 - 1 as a decimal literal for assembly source.
const MAX_WORD: &str =
    "115792089237316195423570985008687907853269984665640564039457584007913129639935";

fn w(v: u64) -> Word {
    Word::from(v)
}

fn machine(source: &str) -> Frame {
    Frame::new(assemble(source).expect("assembly failed"))
}

fn run_machine(frame: &Frame, gas: u64, mem: u64) -> Frame {
    let flat = run(&frame.flatten(), w(gas), w(mem)).expect("run failed");
    Frame::unflatten(&flat).expect("returned state must decode")
}

fn run_source(source: &str, gas: u64, mem: u64) -> Frame {
    run_machine(&machine(source), gas, mem)
}

// ==================== Arithmetic ====================

#[test]
fn sub_leaves_difference() {
    let out = run_source("PUSH 5\nPUSH 3\nSUB\nHALT", 100, 100);
    assert_eq!(out.status, Status::VolHalt);
    assert_eq!(out.stack, vec![w(2)]);
}

#[test]
fn sub_wraps_below_zero() {
    let out = run_source("PUSH 0\nPUSH 3\nSUB\nHALT", 100, 100);
    assert_eq!(out.status, Status::VolHalt);
    assert_eq!(out.stack, vec![Word::MAX - w(2)]);
}

#[test]
fn add_wraps_past_word_width() {
    let out = run_source(&format!("PUSH {MAX_WORD}\nPUSH 1\nADD\nHALT"), 100, 100);
    assert_eq!(out.stack, vec![Word::zero()]);
}

#[test]
fn mul_wraps_past_word_width() {
    let out = run_source(&format!("PUSH {MAX_WORD}\nPUSH 2\nMUL\nHALT"), 100, 100);
    assert_eq!(out.stack, vec![Word::MAX - w(1)]);
}

#[test]
fn not_is_width_masked_complement() {
    let out = run_source("PUSH 5\nNOT\nHALT", 100, 100);
    assert_eq!(out.stack, vec![Word::MAX - w(5)]);
}

#[test]
fn div_and_mod() {
    assert_eq!(
        run_source("PUSH 84\nPUSH 2\nDIV\nHALT", 100, 100).stack,
        vec![w(42)]
    );
    assert_eq!(
        run_source("PUSH 47\nPUSH 5\nMOD\nHALT", 100, 100).stack,
        vec![w(2)]
    );
}

#[test]
fn division_by_zero_faults_out_of_bounds() {
    let out = run_source("PUSH 4\nPUSH 0\nDIV\nHALT", 100, 100);
    assert_eq!(out.status, Status::OutOfBounds);
    // operands untouched, instruction not skipped
    assert_eq!(out.stack, vec![w(4), w(0)]);
    assert_eq!(out.ip, w(4));
}

// ==================== Stack ====================

#[test]
fn pop_on_empty_stack_advances() {
    let out = run_source("POP\nHALT", 100, 10);
    assert_eq!(out.status, Status::VolHalt);
    assert!(out.stack.is_empty());
    assert_eq!(out.mem, w(10));
}

#[test]
fn dup_copies_top() {
    assert_eq!(
        run_source("PUSH 3\nDUP\nHALT", 100, 100).stack,
        vec![w(3), w(3)]
    );
}

#[test]
fn dup_on_empty_stack_is_out_of_stack() {
    assert_eq!(run_source("DUP", 100, 100).status, Status::OutOfStack);
}

#[test]
fn flip_swaps_top_two() {
    assert_eq!(
        run_source("PUSH 1\nPUSH 2\nFLIP\nHALT", 100, 100).stack,
        vec![w(2), w(1)]
    );
}

#[test]
fn stacklen_pushes_prior_depth() {
    assert_eq!(
        run_source("PUSH 9\nSTACKLEN\nHALT", 100, 100).stack,
        vec![w(9), w(1)]
    );
}

#[test]
fn stacklen_without_mem_is_out_of_memory() {
    let out = run_source("STACKLEN", 100, 0);
    assert_eq!(out.status, Status::OutOfMemory);
    assert!(out.stack.is_empty());
}

// ==================== Control flow ====================

#[test]
fn jump_takes_label_target() {
    let out = run_source("PUSH over\nJUMP\nHALT\nover:\nYIELD", 100, 100);
    assert_eq!(out.status, Status::VolReturn);
    assert_eq!(out.ip, w(5));
    assert!(out.stack.is_empty());
}

#[test]
fn jz_jumps_on_zero() {
    let out = run_source("PUSH 0\nPUSH dest\nJZ\nHALT\ndest:\nYIELD", 100, 100);
    assert_eq!(out.status, Status::VolReturn);
    assert_eq!(out.ip, w(7));
}

#[test]
fn jz_falls_through_on_nonzero() {
    let out = run_source("PUSH 1\nPUSH dest\nJZ\nHALT\ndest:\nYIELD", 100, 100);
    assert_eq!(out.status, Status::VolHalt);
    assert_eq!(out.ip, w(6));
    assert!(out.stack.is_empty());
}

#[test]
fn return_resets_entry_point() {
    let out = run_source("RETURN", 100, 100);
    assert_eq!(out.status, Status::VolReturn);
    assert_eq!(out.ip, w(0));
}

#[test]
fn yield_preserves_resume_point() {
    let out = run_source("YIELD", 100, 100);
    assert_eq!(out.status, Status::VolReturn);
    assert_eq!(out.ip, w(1));
}

// ==================== Map ====================

#[test]
fn keyset_then_keyget() {
    let out = run_source("PUSH 7\nPUSH 42\nKEYSET\nPUSH 7\nKEYGET\nHALT", 100, 100);
    assert_eq!(out.stack, vec![w(42)]);
    assert_eq!(out.map, vec![(w(7), w(42))]);
}

#[test]
fn keyset_updates_existing_entry() {
    let out = run_source(
        "PUSH 7\nPUSH 1\nKEYSET\nPUSH 7\nPUSH 2\nKEYSET\nPUSH 7\nKEYGET\nHALT",
        200,
        100,
    );
    assert_eq!(out.stack, vec![w(2)]);
    assert_eq!(out.map, vec![(w(7), w(2))]);
}

#[test]
fn keyget_miss_shrinks_stack() {
    let out = run_source("PUSH 9\nKEYGET\nHALT", 100, 10);
    assert_eq!(out.status, Status::VolHalt);
    assert!(out.stack.is_empty());
    assert_eq!(out.mem, w(10));
}

#[test]
fn keyget_takes_first_match() {
    let mut frame = machine("PUSH 1\nKEYGET\nHALT");
    frame.map = vec![(w(1), w(10)), (w(1), w(20))];
    assert_eq!(run_machine(&frame, 100, 100).stack, vec![w(10)]);
}

#[test]
fn keyhas_reports_presence() {
    let out = run_source(
        "PUSH 7\nPUSH 1\nKEYSET\nPUSH 7\nKEYHAS\nPUSH 8\nKEYHAS\nHALT",
        200,
        100,
    );
    assert_eq!(out.stack, vec![w(1), w(0)]);
}

#[test]
fn keydel_frees_entry_mem() {
    let out = run_source("PUSH 7\nPUSH 1\nKEYSET\nPUSH 7\nKEYDEL\nHALT", 100, 10);
    assert!(out.map.is_empty());
    assert!(out.stack.is_empty());
    assert_eq!(out.mem, w(10));
}

// ==================== Memory areas ====================

#[test]
fn area_alloc_accounting() {
    // AREA costs one unit, ALLOC the requested four
    let out = run_source("AREA\nPUSH 0\nPUSH 4\nALLOC\nHALT", 100, 10);
    assert_eq!(out.status, Status::VolHalt);
    assert_eq!(out.memory, vec![vec![Word::zero(); 4]]);
    assert_eq!(out.mem, w(5));
}

#[test]
fn area_lifecycle_conserves_mem() {
    let out = run_source(
        "AREA\nPUSH 0\nPUSH 4\nALLOC\nPUSH 0\nPUSH 4\nDEALLOC\nPUSH 0\nDEAREA\nHALT",
        200,
        20,
    );
    assert_eq!(out.status, Status::VolHalt);
    assert!(out.memory.is_empty());
    assert_eq!(out.mem, w(20));
}

#[test]
fn area_without_mem_is_out_of_memory() {
    assert_eq!(run_source("AREA", 100, 0).status, Status::OutOfMemory);
}

#[test]
fn arealen_replaces_index() {
    let mut frame = machine("PUSH 0\nAREALEN\nHALT");
    frame.memory = vec![vec![w(0); 3]];
    assert_eq!(run_machine(&frame, 100, 100).stack, vec![w(3)]);
}

#[test]
fn arealen_on_missing_area_is_atomic() {
    let out = run_source("PUSH 3\nAREALEN\nHALT", 100, 100);
    assert_eq!(out.status, Status::OutOfBounds);
    assert_eq!(out.stack, vec![w(3)]);
    assert_eq!(out.ip, w(2));
    // the failed instruction charged nothing
    assert_eq!(out.gas, w(98));
    assert_eq!(out.mem, w(99));
}

#[test]
fn write_then_read() {
    let mut frame = machine("PUSH 0\nPUSH 1\nPUSH 99\nWRITE\nPUSH 0\nPUSH 1\nREAD\nHALT");
    frame.memory = vec![vec![w(0); 3]];
    let out = run_machine(&frame, 100, 100);
    assert_eq!(out.stack, vec![w(99)]);
    assert_eq!(out.memory[0][1], w(99));
}

#[test]
fn write_past_area_end_is_out_of_bounds() {
    let mut frame = machine("PUSH 0\nPUSH 9\nPUSH 1\nWRITE\nHALT");
    frame.memory = vec![vec![w(0); 3]];
    let out = run_machine(&frame, 100, 100);
    assert_eq!(out.status, Status::OutOfBounds);
    assert_eq!(out.stack, vec![w(0), w(9), w(1)]);
}

#[test]
fn dealloc_beyond_length_is_out_of_bounds() {
    let mut frame = machine("PUSH 0\nPUSH 5\nDEALLOC\nHALT");
    frame.memory = vec![vec![w(0); 2]];
    assert_eq!(run_machine(&frame, 100, 100).status, Status::OutOfBounds);
}

// ==================== Hashing ====================

#[test]
fn sha256_replaces_top_with_word_hash() {
    let out = run_source("PUSH 1\nSHA256\nHALT", 200, 100);
    assert_eq!(out.stack, vec![crypto::word_hash(w(1))]);
}

// ==================== Resources ====================

#[test]
fn gas_follows_the_table() {
    // PUSH (2) + HALT (1)
    assert_eq!(run_source("PUSH 1\nHALT", 100, 100).gas, w(97));
}

#[test]
fn out_of_gas_preserves_progress() {
    let out = run_source("PUSH 1\nPUSH 2\nHALT", 1, 100);
    assert_eq!(out.status, Status::OutOfGas);
    assert_eq!(out.stack, vec![w(1)]);
    assert_eq!(out.ip, w(2));
    assert_eq!(out.gas, w(0));
}

#[test]
fn out_of_stack_is_a_pure_status_change() {
    let mut frame = machine("ADD");
    frame.gas = w(50);
    frame.mem = w(50);
    let before = frame.flatten();
    let after = step(&before).expect("step");
    assert_eq!(after[0], Status::OutOfStack.word());
    assert_eq!(after[1..], before[1..]);
}

#[test]
fn out_of_memory_is_resumable() {
    let mut frame = machine("PUSH 1\nHALT");
    frame.gas = w(50);
    let before = frame.flatten();
    let after = step(&before).expect("step");
    assert_eq!(after[0], Status::OutOfMemory.word());
    assert_eq!(after[1..], before[1..]);

    // top up the budget and the same instruction succeeds
    let out = run_machine(&Frame::unflatten(&after).expect("decode"), 50, 5);
    assert_eq!(out.status, Status::VolHalt);
    assert_eq!(out.stack, vec![w(1)]);
    assert_eq!(out.mem, w(4));
}

#[test]
fn unknown_opcode_fails_closed() {
    let out = run_machine(&Frame::new(vec![w(77)]), 10, 10);
    assert_eq!(out.status, Status::UnknownCode);
    assert_eq!(out.ip, w(0));

    let wide = run_machine(&Frame::new(vec![Word::MAX]), 10, 10);
    assert_eq!(wide.status, Status::UnknownCode);
}

#[test]
fn trailing_push_operand_is_out_of_code() {
    // PUSH as the final code word has no room for its immediate
    let out = run_machine(&Frame::new(vec![w(6)]), 10, 10);
    assert_eq!(out.status, Status::OutOfCode);
}

#[test]
fn running_off_the_code_end_is_out_of_code() {
    let out = run_source("PUSH 1\nPOP", 100, 100);
    assert_eq!(out.status, Status::OutOfCode);
    assert_eq!(out.ip, w(3));
}

// ==================== Nested invocation ====================

#[test]
fn run_skips_short_area() {
    let mut frame = machine("PUSH 0\nPUSH 10\nPUSH 10\nRUN\nHALT");
    frame.memory = vec![vec![w(1), w(2), w(3)]];
    let out = run_machine(&frame, 100, 100);
    assert_eq!(out.status, Status::VolHalt);
    assert!(out.stack.is_empty());
    assert_eq!(out.ip, w(8));
    assert_eq!(out.memory, vec![vec![w(1), w(2), w(3)]]);
}

#[test]
fn run_skips_missing_area() {
    let out = run_source("PUSH 5\nPUSH 1\nPUSH 1\nRUN\nHALT", 100, 100);
    assert_eq!(out.status, Status::VolHalt);
    assert!(out.stack.is_empty());
}

#[test]
fn run_skips_undecodable_area() {
    let mut frame = machine("PUSH 0\nPUSH 10\nPUSH 10\nRUN\nHALT");
    // long enough to pass the header gate, but not a machine
    frame.memory = vec![vec![w(99); 6]];
    let out = run_machine(&frame, 100, 100);
    assert_eq!(out.status, Status::VolHalt);
    assert_eq!(out.memory, vec![vec![w(99); 6]]);
}

#[test]
fn nested_run_shares_budgets() {
    let child = machine("PUSH 5\nPUSH 6\nADD\nYIELD");
    let mut parent = machine("PUSH 0\nPUSH 50\nPUSH 40\nRUN\nHALT");
    parent.memory = vec![child.flatten()];

    let out = run_machine(&parent, 1000, 1000);
    assert_eq!(out.status, Status::VolHalt);
    assert!(out.stack.is_empty());
    assert_eq!(out.rec, w(0));

    let child_after = Frame::unflatten(&out.memory[0]).expect("child decodes");
    assert_eq!(child_after.status, Status::VolReturn);
    assert_eq!(child_after.stack, vec![w(11)]);
    // child paid PUSH + PUSH + ADD + YIELD out of its own budgets
    assert_eq!(child_after.gas, w(50 - 11));
    assert_eq!(child_after.mem, w(40 - 1));

    // the parent paid for its three pushes, the child's work, and HALT
    assert_eq!(out.gas, w(1000 - (2 + 2 + 2) - 11 - 1));
    assert_eq!(out.mem, w(1000 - 1));
}

#[test]
fn three_level_chain_writes_back_through_every_level() {
    let grandchild = machine("PUSH 1\nYIELD");
    let mut child = machine("PUSH 0\nPUSH 20\nPUSH 20\nRUN\nYIELD");
    child.memory = vec![grandchild.flatten()];
    let mut parent = machine("PUSH 0\nPUSH 100\nPUSH 100\nRUN\nHALT");
    parent.memory = vec![child.flatten()];

    let out = run_machine(&parent, 1000, 1000);
    assert_eq!(out.status, Status::VolHalt);

    let child_after = Frame::unflatten(&out.memory[0]).expect("child decodes");
    assert_eq!(child_after.status, Status::VolReturn);
    let grandchild_after =
        Frame::unflatten(&child_after.memory[0]).expect("grandchild decodes");
    assert_eq!(grandchild_after.status, Status::VolReturn);
    assert_eq!(grandchild_after.stack, vec![w(1)]);
}

#[test]
fn second_run_revives_a_returned_child() {
    let child = machine("start:\nPUSH 1\nYIELD\nPUSH start\nJUMP");
    let mut parent = machine(
        "PUSH 0\nPUSH 50\nPUSH 50\nRUN\nPUSH 0\nPUSH 50\nPUSH 50\nRUN\nHALT",
    );
    parent.memory = vec![child.flatten()];

    let out = run_machine(&parent, 1000, 1000);
    assert_eq!(out.status, Status::VolHalt);

    let child_after = Frame::unflatten(&out.memory[0]).expect("child decodes");
    assert_eq!(child_after.status, Status::VolReturn);
    // one word per activation; the second resumed past the first YIELD
    assert_eq!(child_after.stack, vec![w(1), w(1)]);
    // budgets were re-armed by the second call
    assert_eq!(child_after.gas, w(50 - 6));
}

#[test]
fn ancestor_pays_for_child_and_can_break() {
    let child = machine("PUSH 1\nYIELD");
    let mut parent = machine("PUSH 0\nPUSH 10\nPUSH 5\nRUN\nHALT");
    parent.memory = vec![child.flatten()];

    // exactly enough for the parent's own pushes, nothing for the child's
    let out = run_machine(&parent, 1000, 3);
    assert_eq!(out.status, Status::OutOfMemory);
    assert_eq!(out.rec, w(1));

    let child_after = Frame::unflatten(&out.memory[0]).expect("child decodes");
    assert_eq!(child_after.status, Status::Normal);
    assert!(child_after.stack.is_empty());
    assert_eq!(child_after.gas, w(10));
    assert_eq!(child_after.mem, w(5));
}

// ==================== Step contract ====================

#[test]
fn terminal_states_are_left_untouched() {
    let mut frame = machine("HALT");
    frame.status = Status::VolHalt;
    frame.gas = w(9);
    frame.mem = w(9);
    let flat = frame.flatten();
    assert_eq!(step(&flat).expect("step"), flat);
}

#[test]
fn malformed_input_is_a_hard_error() {
    assert!(matches!(
        step(&[Word::zero(); 5]),
        Err(VmError::Truncated { .. })
    ));
}
