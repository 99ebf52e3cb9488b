//! Abstract x86-64 machine IR and instruction selection (spec §4.7,
//! component C7).

pub mod inst;
pub mod opcode;
pub mod operand;
pub mod select;

pub use inst::{CallTarget, Mem, MachineBlock, MachineFunction, MachineInst};
pub use opcode::{jump_opcode, Opcode};
pub use operand::{HardReg, Operand, OperandClass, StackSlot, VReg, ALLOCATABLE, ARG_REGS};
pub use select::select_function;
