//! Instruction set definition.
//!
//! The [`for_each_opcode!`](crate::for_each_opcode) macro holds the
//! canonical instruction table and invokes a callback macro for code
//! generation, so several modules can generate instruction-related code
//! without duplicating the table.
//!
//! Each row carries the static metadata the interpreter consults before
//! every dispatch: wire opcode, mnemonic, encoded length in words, minimum
//! operand-stack depth, net metered effect, and gas cost.
//!
//! This module generates the [`Opcode`] enum with decoding and metadata
//! accessors; see [`isa_static_check`](super::isa_static_check) for the
//! test-only table invariants.

use crate::types::word::Word;

/// Invokes a callback macro with the complete instruction table.
///
/// Row shape: `Name = opcode, "MNEMONIC", length, min_stack, effect, gas`.
/// `effect` is the net change in metered units: operand-stack growth plus
/// allocation bookkeeping (the `AREA` record), before any data-dependent
/// adjustment the interpreter applies.
#[macro_export]
macro_rules! for_each_opcode {
    ($callback:ident) => {
        $callback! {
            /// HALT ; status <- VOLHALT, the machine is done for good
            Halt = 0, "HALT", 1, 0, 0, 1,
            /// RETURN ; status <- VOLRETURN, entry point reset to 0
            Return = 1, "RETURN", 1, 0, 0, 1,
            /// YIELD ; status <- VOLRETURN, ip preserved so a resume continues here
            Yield = 2, "YIELD", 1, 0, 0, 1,
            /// RUN ; invoke area (third from top) as a nested machine with gas, mem
            Run = 3, "RUN", 1, 3, -3, 0,
            /// JUMP ; ip <- pop()
            Jump = 4, "JUMP", 1, 1, -1, 1,
            /// JZ ; pop target and condition, jump to target when condition == 0
            Jz = 5, "JZ", 1, 2, -2, 1,
            /// PUSH v ; push the immediate operand
            Push = 6, "PUSH", 2, 0, 1, 2,
            /// POP ; drop the top of the stack if present
            Pop = 7, "POP", 1, 0, 0, 2,
            /// DUP ; push a copy of the top of the stack
            Dup = 8, "DUP", 1, 1, 1, 4,
            /// FLIP ; swap the two top stack entries
            Flip = 9, "FLIP", 1, 2, 0, 4,
            /// KEYSET ; consume key and value, update the first match or insert
            KeySet = 10, "KEYSET", 1, 2, -2, 10,
            /// KEYHAS ; replace the top key with a 0/1 presence flag
            KeyHas = 11, "KEYHAS", 1, 1, 0, 4,
            /// KEYGET ; replace the top key with its value, or pop on a miss
            KeyGet = 12, "KEYGET", 1, 1, 0, 6,
            /// KEYDEL ; remove the entry matching the popped key
            KeyDel = 13, "KEYDEL", 1, 1, -1, 4,
            /// STACKLEN ; push the operand-stack depth
            StackLen = 14, "STACKLEN", 1, 0, 1, 2,
            /// MEMORYLEN ; push the number of memory areas
            MemoryLen = 15, "MEMORYLEN", 1, 0, 1, 2,
            /// AREALEN ; replace the top area index with that area's length
            AreaLen = 16, "AREALEN", 1, 1, 0, 2,
            /// READ ; consume area and address, push the word stored there
            Read = 17, "READ", 1, 2, -1, 2,
            /// WRITE ; consume area, address and value, store the value
            Write = 18, "WRITE", 1, 3, -3, 2,
            /// AREA ; append a new empty memory area
            Area = 19, "AREA", 1, 0, 1, 10,
            /// DEAREA ; remove the area indexed by the top of the stack
            Dearea = 20, "DEAREA", 1, 1, -1, 10,
            /// ALLOC ; consume area and size, grow the area by size zero words
            Alloc = 21, "ALLOC", 1, 2, -2, 10,
            /// DEALLOC ; consume area and size, shrink the area from its end
            Dealloc = 22, "DEALLOC", 1, 2, -2, 10,
            /// ADD ; wrapping addition
            Add = 23, "ADD", 1, 2, -1, 6,
            /// SUB ; wrapping subtraction
            Sub = 24, "SUB", 1, 2, -1, 6,
            /// NOT ; bitwise complement of the top of the stack
            Not = 25, "NOT", 1, 1, 0, 4,
            /// MUL ; wrapping multiplication
            Mul = 26, "MUL", 1, 2, -1, 8,
            /// DIV ; integer division, zero divisor faults OUTOFBOUNDS
            Div = 27, "DIV", 1, 2, -1, 10,
            /// MOD ; integer remainder, zero divisor faults OUTOFBOUNDS
            Mod = 28, "MOD", 1, 2, -1, 10,
            /// SHA256 ; replace the top with its word-wrapped hash
            Sha256 = 29, "SHA256", 1, 1, 0, 100,
        }
    };
}

#[macro_export]
macro_rules! define_opcodes {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $code:expr, $mnemonic:literal, $len:expr, $min:expr, $effect:expr, $gas:expr
        ),* $(,)?
    ) => {
        /// One dispatchable instruction.
        #[derive(Copy, Clone, Debug, Eq, PartialEq)]
        #[repr(u8)]
        pub enum Opcode {
            $(
                $(#[$doc])*
                $name = $code,
            )*
        }

        impl Opcode {
            /// Decodes an opcode from a code word. Anything the table does
            /// not name decodes to `None` (status `UNKNOWNCODE`).
            pub fn decode(word: Word) -> Option<Opcode> {
                if word > Word::from(u8::MAX) {
                    return None;
                }
                match word.low_u64() as u8 {
                    $( $code => Some(Opcode::$name), )*
                    _ => None,
                }
            }

            /// Looks up an opcode by its assembly mnemonic.
            pub fn from_mnemonic(name: &str) -> Option<Opcode> {
                match name {
                    $( $mnemonic => Some(Opcode::$name), )*
                    _ => None,
                }
            }

            /// Returns the assembly mnemonic for this instruction.
            pub const fn mnemonic(self) -> &'static str {
                match self {
                    $( Opcode::$name => $mnemonic, )*
                }
            }

            /// Encoded size in words; `PUSH` carries an immediate word.
            pub const fn size(self) -> usize {
                match self {
                    $( Opcode::$name => $len, )*
                }
            }

            /// Operand-stack depth required before dispatch.
            pub const fn min_stack(self) -> usize {
                match self {
                    $( Opcode::$name => $min, )*
                }
            }

            /// Net metered effect before data-dependent adjustments.
            pub const fn effect(self) -> i32 {
                match self {
                    $( Opcode::$name => $effect, )*
                }
            }

            /// Gas debited from every live frame on dispatch.
            pub const fn gas(self) -> u64 {
                match self {
                    $( Opcode::$name => $gas, )*
                }
            }
        }
    };
}

for_each_opcode!(define_opcodes);
