//! Stack map construction and NASM text emission (spec §4.9, component C9).

pub mod asm_printer;
pub mod stack_map;

pub use asm_printer::print_program;
