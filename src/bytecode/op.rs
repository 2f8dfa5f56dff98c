use serde::{Deserialize, Serialize};

// =============================================================================
// OPCODE - one byte per instruction, operands follow inline
// =============================================================================

/// Instruction set of the Decaf stack machine.
///
/// Operands are stored big-endian directly after the opcode byte:
/// - slot, constant and jump operands are a `u16`
/// - `Call` carries a `u16` function index followed by a `u8` argument count
///
/// Jump targets are absolute byte offsets within the function's chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    // literals
    PushConst = 0,

    // storage
    LoadLocal = 1,
    StoreLocal = 2,
    LoadGlobal = 3,
    StoreGlobal = 4,

    // arithmetic
    Add = 5,
    Sub = 6,
    Mul = 7,
    Div = 8,

    // ==========================================================================
    // Control flow
    // ==========================================================================
    /// Unconditional jump to an absolute offset.
    Jmp = 9,

    /// Pop a value; jump when it is zero.
    JmpIfFalse = 10,

    /// `( args... -- result )`, frame pushed for the callee.
    Call = 11,

    /// `( value -- )` in the callee, value handed to the caller.
    Ret = 12,

    // I/O
    Print = 13,

    // stack ops
    Pop = 14,

    Halt = 15,
}

impl Opcode {
    pub const ALL: [Opcode; 16] = [
        Opcode::PushConst,
        Opcode::LoadLocal,
        Opcode::StoreLocal,
        Opcode::LoadGlobal,
        Opcode::StoreGlobal,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Div,
        Opcode::Jmp,
        Opcode::JmpIfFalse,
        Opcode::Call,
        Opcode::Ret,
        Opcode::Print,
        Opcode::Pop,
        Opcode::Halt,
    ];

    /// Mnemonic used by the disassembler and VM traces.
    pub fn name(self) -> &'static str {
        match self {
            Opcode::PushConst => "PUSH_CONST",
            Opcode::LoadLocal => "LOAD_LOCAL",
            Opcode::StoreLocal => "STORE_LOCAL",
            Opcode::LoadGlobal => "LOAD_GLOBAL",
            Opcode::StoreGlobal => "STORE_GLOBAL",
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::Mul => "MUL",
            Opcode::Div => "DIV",
            Opcode::Jmp => "JMP",
            Opcode::JmpIfFalse => "JMP_IF_FALSE",
            Opcode::Call => "CALL",
            Opcode::Ret => "RET",
            Opcode::Print => "PRINT",
            Opcode::Pop => "POP",
            Opcode::Halt => "HALT",
        }
    }

    /// Number of operand bytes following the opcode.
    pub fn operand_width(self) -> usize {
        match self {
            Opcode::PushConst
            | Opcode::LoadLocal
            | Opcode::StoreLocal
            | Opcode::LoadGlobal
            | Opcode::StoreGlobal
            | Opcode::Jmp
            | Opcode::JmpIfFalse => 2,
            Opcode::Call => 3,
            Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Div
            | Opcode::Ret
            | Opcode::Print
            | Opcode::Pop
            | Opcode::Halt => 0,
        }
    }

    /// Whether execution can continue at the next instruction.
    pub fn falls_through(self) -> bool {
        !matches!(self, Opcode::Jmp | Opcode::Ret | Opcode::Halt)
    }
}

impl TryFrom<u8> for Opcode {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Opcode::ALL.get(byte as usize).copied().ok_or(byte)
    }
}

impl From<Opcode> for u8 {
    fn from(op: Opcode) -> u8 {
        op as u8
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Net change in operand-stack depth caused by one instruction.
///
/// `operand` is only consulted for `Call`, where it is the argument count:
/// the arguments are consumed and the result is pushed.
pub fn stack_effect(opcode: Opcode, operand: u8) -> i32 {
    match opcode {
        Opcode::PushConst | Opcode::LoadLocal | Opcode::LoadGlobal => 1,
        Opcode::StoreLocal | Opcode::StoreGlobal => -1,
        Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div => -1,
        Opcode::Jmp => 0,
        Opcode::JmpIfFalse => -1,
        Opcode::Call => 1 - operand as i32,
        Opcode::Ret => -1,
        Opcode::Print | Opcode::Pop => -1,
        Opcode::Halt => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_values_are_stable() {
        for (byte, op) in Opcode::ALL.iter().enumerate() {
            assert_eq!(*op as u8 as usize, byte);
            assert_eq!(Opcode::try_from(byte as u8), Ok(*op));
        }
        assert_eq!(Opcode::try_from(16), Err(16));
        assert_eq!(Opcode::try_from(0xFF), Err(0xFF));
    }

    #[test]
    fn test_names() {
        assert_eq!(Opcode::JmpIfFalse.name(), "JMP_IF_FALSE");
        assert_eq!(Opcode::PushConst.to_string(), "PUSH_CONST");
    }

    #[test]
    fn test_call_effect_depends_on_argc() {
        assert_eq!(stack_effect(Opcode::Call, 0), 1);
        assert_eq!(stack_effect(Opcode::Call, 1), 0);
        assert_eq!(stack_effect(Opcode::Call, 3), -2);
    }

    #[test]
    fn test_fixed_effects() {
        assert_eq!(stack_effect(Opcode::PushConst, 0), 1);
        assert_eq!(stack_effect(Opcode::StoreGlobal, 0), -1);
        assert_eq!(stack_effect(Opcode::Div, 0), -1);
        assert_eq!(stack_effect(Opcode::Jmp, 0), 0);
        assert_eq!(stack_effect(Opcode::JmpIfFalse, 0), -1);
        assert_eq!(stack_effect(Opcode::Halt, 0), 0);
    }

    #[test]
    fn test_operand_widths() {
        assert_eq!(Opcode::Call.operand_width(), 3);
        assert_eq!(Opcode::Jmp.operand_width(), 2);
        assert_eq!(Opcode::Print.operand_width(), 0);
    }
}
