//! Assembly language parser and code-word compiler.
//!
//! Converts line-oriented assembly text into the word sequence the machine
//! loads as `code`.
//!
//! # Syntax
//!
//! ```text
//! start:            ; a label line defines an absolute code offset
//! PUSH start        ; only PUSH takes an operand: a decimal word or label
//! JUMP              ; everything else is a bare mnemonic
//! ```
//!
//! - Mnemonics are case-insensitive
//! - Comments start with `;`
//! - Blank lines are ignored
//! - Labels resolve to absolute offsets computed with true encoded lengths
//!   (`PUSH` occupies two words)
//!
//! Two passes: the first collects label offsets, the second emits words
//! with label resolution. Errors carry the source location and render as
//! compiler-style diagnostics.

use crate::types::word::Word;
use crate::vm::errors::VmError;
use crate::vm::isa::Opcode;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

const COMMENT_CHAR: char = ';';
const LABEL_SUFFIX: char = ':';

/// One significant source line after lexing.
#[derive(Clone, Debug)]
enum Line<'a> {
    Label(&'a str),
    Instr {
        opcode: Opcode,
        operand: Option<&'a str>,
    },
}

#[derive(Clone, Debug)]
struct SourceLine<'a> {
    number: usize,
    column: usize,
    line: Line<'a>,
}

/// Assembles source text into a code-word sequence.
pub fn assemble(source: &str) -> Result<Vec<Word>, VmError> {
    emit(lex(source)?)
}

/// Assembles with the peephole shrink pass applied first.
pub fn assemble_optimized(source: &str) -> Result<Vec<Word>, VmError> {
    emit(peephole(lex(source)?))
}

/// Assembles a source file, logging a located diagnostic on failure.
pub fn assemble_file(path: impl AsRef<Path>) -> Result<Vec<Word>, VmError> {
    let path = path.as_ref();
    let source = fs::read_to_string(path).map_err(|e| VmError::Io(e.to_string()))?;
    assemble(&source).map_err(|err| {
        crate::error!(
            "{}",
            render_diagnostic(&path.display().to_string(), &source, &err)
        );
        err
    })
}

/// Formats a compiler-style diagnostic for an assembly failure.
pub fn render_diagnostic(file: &str, source: &str, err: &VmError) -> String {
    let VmError::Assembly {
        line,
        column,
        message,
    } = err
    else {
        return format!("error: {err}");
    };

    let mut diag = String::new();
    let _ = writeln!(diag, "error: {message}");
    let _ = writeln!(diag, " --> {file}:{line}:{column}");
    if let Some(text) = source.lines().nth(line.saturating_sub(1)) {
        let text = text.trim_end_matches('\r');
        let _ = writeln!(diag, "  |");
        let _ = writeln!(diag, "{line:>4} | {text}");
        let _ = writeln!(diag, "  | {}^", " ".repeat(column.saturating_sub(1)));
    }
    diag
}

/// Strips comments and whitespace, classifying every remaining line.
fn lex(source: &str) -> Result<Vec<SourceLine<'_>>, VmError> {
    let mut out = Vec::new();
    for (idx, raw) in source.lines().enumerate() {
        let number = idx + 1;
        let text = raw.split(COMMENT_CHAR).next().unwrap_or("").trim();
        if text.is_empty() {
            continue;
        }
        let column = raw.len() - raw.trim_start().len() + 1;

        if let Some(name) = text.strip_suffix(LABEL_SUFFIX) {
            let name = name.trim();
            if name.is_empty() || name.split_whitespace().count() != 1 {
                return Err(asm_error(
                    number,
                    column,
                    format!("invalid label definition: {text}"),
                ));
            }
            out.push(SourceLine {
                number,
                column,
                line: Line::Label(name),
            });
            continue;
        }

        let mut tokens = text.split_whitespace();
        let mnemonic = tokens.next().unwrap_or("");
        let operand = tokens.next();
        if tokens.next().is_some() {
            return Err(asm_error(number, column, "too many operands"));
        }
        let opcode = Opcode::from_mnemonic(&mnemonic.to_ascii_uppercase()).ok_or_else(|| {
            asm_error(number, column, format!("unknown mnemonic: {mnemonic}"))
        })?;
        match (opcode, operand) {
            (Opcode::Push, None) => {
                return Err(asm_error(number, column, "PUSH requires an operand"));
            }
            (other, Some(_)) if other != Opcode::Push => {
                return Err(asm_error(
                    number,
                    column,
                    format!("{} takes no operand", other.mnemonic()),
                ));
            }
            _ => {}
        }
        out.push(SourceLine {
            number,
            column,
            line: Line::Instr { opcode, operand },
        });
    }
    Ok(out)
}

/// Two-pass emission: label offsets first, then words.
fn emit(lines: Vec<SourceLine<'_>>) -> Result<Vec<Word>, VmError> {
    let mut labels: HashMap<&str, usize> = HashMap::new();
    let mut offset = 0usize;
    for source_line in &lines {
        match &source_line.line {
            Line::Label(name) => {
                if labels.insert(*name, offset).is_some() {
                    return Err(asm_error(
                        source_line.number,
                        source_line.column,
                        format!("duplicate label: {name}"),
                    ));
                }
            }
            Line::Instr { opcode, .. } => offset += opcode.size(),
        }
    }

    let mut code = Vec::with_capacity(offset);
    for source_line in &lines {
        if let Line::Instr { opcode, operand } = &source_line.line {
            code.push(Word::from(*opcode as u64));
            if let Some(token) = operand {
                code.push(resolve_operand(
                    token,
                    &labels,
                    source_line.number,
                    source_line.column,
                )?);
            }
        }
    }
    Ok(code)
}

/// A decimal word literal, or a label resolved to its absolute offset.
fn resolve_operand(
    token: &str,
    labels: &HashMap<&str, usize>,
    line: usize,
    column: usize,
) -> Result<Word, VmError> {
    if token.chars().all(|c| c.is_ascii_digit()) {
        return Word::from_dec_str(token)
            .map_err(|_| asm_error(line, column, format!("numeric operand out of range: {token}")));
    }
    labels
        .get(token)
        .map(|offset| Word::from(*offset as u64))
        .ok_or_else(|| asm_error(line, column, format!("undefined label: {token}")))
}

/// Peephole shrink pass from the reference toolchain, applied before
/// offsets are computed so label targets stay consistent.
///
/// - `PUSH 0` followed by `ADD`/`SUB`, and `PUSH 1` followed by
///   `MUL`/`DIV`, drop as a pair (only valid when the stack is known to be
///   non-empty there, which is why the pass is opt-in)
/// - a `PUSH` repeating the immediately preceding `PUSH` becomes `DUP`
/// - `NOT NOT` cancels
fn peephole(lines: Vec<SourceLine<'_>>) -> Vec<SourceLine<'_>> {
    let mut out: Vec<SourceLine> = Vec::with_capacity(lines.len());
    let mut skip_next = false;
    for i in 0..lines.len() {
        if skip_next {
            skip_next = false;
            continue;
        }
        let next_opcode = lines.get(i + 1).and_then(|next| match &next.line {
            Line::Instr { opcode, .. } => Some(*opcode),
            _ => None,
        });
        match &lines[i].line {
            Line::Instr {
                opcode: Opcode::Push,
                operand: Some(token),
            } => {
                if *token == "0" && matches!(next_opcode, Some(Opcode::Add | Opcode::Sub)) {
                    skip_next = true;
                    continue;
                }
                if *token == "1" && matches!(next_opcode, Some(Opcode::Mul | Opcode::Div)) {
                    skip_next = true;
                    continue;
                }
                let repeats_previous_push = matches!(
                    out.last(),
                    Some(SourceLine {
                        line: Line::Instr {
                            opcode: Opcode::Push,
                            operand: Some(previous),
                        },
                        ..
                    }) if previous == token
                );
                if repeats_previous_push {
                    out.push(SourceLine {
                        number: lines[i].number,
                        column: lines[i].column,
                        line: Line::Instr {
                            opcode: Opcode::Dup,
                            operand: None,
                        },
                    });
                    continue;
                }
                out.push(lines[i].clone());
            }
            Line::Instr {
                opcode: Opcode::Not,
                ..
            } if next_opcode == Some(Opcode::Not) => {
                skip_next = true;
            }
            _ => out.push(lines[i].clone()),
        }
    }
    out
}

fn asm_error(line: usize, column: usize, message: impl Into<String>) -> VmError {
    VmError::Assembly {
        line,
        column,
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn w(v: u64) -> Word {
        Word::from(v)
    }

    #[test]
    fn assembles_bare_program() {
        let code = assemble("PUSH 5\nPUSH 3\nSUB\nHALT").expect("assembles");
        assert_eq!(code, vec![w(6), w(5), w(6), w(3), w(24), w(0)]);
    }

    #[test]
    fn mnemonics_are_case_insensitive() {
        assert_eq!(
            assemble("push 1\nhalt").expect("assembles"),
            assemble("PUSH 1\nHALT").expect("assembles")
        );
    }

    #[test]
    fn comments_and_blanks_are_ignored() {
        let code = assemble("; header\n\nPUSH 1   ; immediate\n\nHALT").expect("assembles");
        assert_eq!(code, vec![w(6), w(1), w(0)]);
    }

    #[test]
    fn forward_label_accounts_for_push_width() {
        let code = assemble("PUSH end\nJUMP\nend:\nHALT").expect("assembles");
        // PUSH is two words, JUMP one: `end` sits at offset 3
        assert_eq!(code, vec![w(6), w(3), w(4), w(0)]);
    }

    #[test]
    fn backward_label_resolves() {
        let code = assemble("start:\nPUSH start\nJUMP").expect("assembles");
        assert_eq!(code, vec![w(6), w(0), w(4)]);
    }

    #[test]
    fn full_width_literals_assemble() {
        let max =
            "115792089237316195423570985008687907853269984665640564039457584007913129639935";
        let code = assemble(&format!("PUSH {max}")).expect("assembles");
        assert_eq!(code, vec![w(6), Word::MAX]);
    }

    #[test]
    fn oversized_literal_is_rejected() {
        let too_big =
            "115792089237316195423570985008687907853269984665640564039457584007913129639936";
        assert!(matches!(
            assemble(&format!("PUSH {too_big}")),
            Err(VmError::Assembly { line: 1, .. })
        ));
    }

    #[test]
    fn unknown_mnemonic_is_located() {
        assert!(matches!(
            assemble("HALT\nFROB"),
            Err(VmError::Assembly { line: 2, .. })
        ));
    }

    #[test]
    fn duplicate_label_is_rejected() {
        assert!(matches!(
            assemble("a:\nHALT\na:\nHALT"),
            Err(VmError::Assembly { line: 3, .. })
        ));
    }

    #[test]
    fn undefined_label_is_rejected() {
        assert!(matches!(
            assemble("PUSH nowhere\nJUMP"),
            Err(VmError::Assembly { line: 1, .. })
        ));
    }

    #[test]
    fn operand_arity_is_enforced() {
        assert!(matches!(assemble("PUSH"), Err(VmError::Assembly { .. })));
        assert!(matches!(assemble("HALT 3"), Err(VmError::Assembly { .. })));
        assert!(matches!(
            assemble("PUSH 1 2"),
            Err(VmError::Assembly { .. })
        ));
    }

    #[test]
    fn diagnostic_points_at_the_line() {
        let source = "HALT\nFROB";
        let err = assemble(source).expect_err("must fail");
        let diag = render_diagnostic("prog.asm", source, &err);
        assert!(diag.contains("prog.asm:2:1"));
        assert!(diag.contains("FROB"));
        assert!(diag.contains('^'));
    }

    // ==================== Peephole ====================

    #[test]
    fn peephole_drops_additive_identity() {
        let code = assemble_optimized("PUSH 7\nPUSH 0\nADD\nHALT").expect("assembles");
        assert_eq!(code, vec![w(6), w(7), w(0)]);
    }

    #[test]
    fn peephole_drops_multiplicative_identity() {
        let code = assemble_optimized("PUSH 7\nPUSH 1\nMUL\nHALT").expect("assembles");
        assert_eq!(code, vec![w(6), w(7), w(0)]);
    }

    #[test]
    fn peephole_folds_repeated_push_into_dup() {
        let code = assemble_optimized("PUSH 7\nPUSH 7\nADD\nHALT").expect("assembles");
        assert_eq!(code, vec![w(6), w(7), w(8), w(23), w(0)]);
    }

    #[test]
    fn peephole_cancels_double_not() {
        let code = assemble_optimized("PUSH 1\nNOT\nNOT\nHALT").expect("assembles");
        assert_eq!(code, vec![w(6), w(1), w(0)]);
    }

    #[test]
    fn peephole_respects_label_boundaries() {
        // the label between the pushes blocks the DUP fold
        let code = assemble_optimized("PUSH 7\nhere:\nPUSH 7\nPUSH here\nJUMP").expect("assembles");
        assert_eq!(code, vec![w(6), w(7), w(6), w(7), w(6), w(2), w(4)]);
    }

    #[test]
    fn plain_assemble_leaves_code_alone() {
        let code = assemble("PUSH 7\nPUSH 0\nADD\nHALT").expect("assembles");
        assert_eq!(code, vec![w(6), w(7), w(6), w(0), w(23), w(0)]);
    }
}
