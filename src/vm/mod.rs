//! Stack-based word virtual machine.
//!
//! The machine executes a fixed instruction set over a structured state:
//! code, operand stack, key-value map, and growable memory areas. An area
//! holding another machine's flat image can be invoked as a nested
//! sub-machine with `RUN`; total work is bounded by paired gas (step-count)
//! and mem (allocation-unit) budgets that every ancestor frame shares.
//!
//! # Execution model
//!
//! - [`step::step`] is a pure function from one flat state to the next;
//!   drivers loop it until the status stops being runnable
//! - Recursion uses an explicit frame stack, not host recursion
//! - Faults are status words in well-formed states, never panics
//!
//! # Modules
//!
//! - [`assembler`]: assembly parsing, diagnostics, and code generation
//! - [`codec`]: packed transport form for machine images
//! - [`errors`]: wire and toolchain error types
//! - [`frame`]: machine state, statuses, and the flat encoding
//! - [`isa`]: instruction table and opcode metadata
//! - [`step`]: interpreter core and the driver loop helper

pub mod assembler;
pub mod codec;
pub mod errors;
pub mod frame;
pub mod isa;
#[cfg(test)]
mod isa_static_check;
pub mod step;
