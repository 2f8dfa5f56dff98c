use serde::{Deserialize, Serialize};

use crate::bytecode::Opcode;

/// Name of the synthesized function that initializes globals and calls `main`.
pub const ENTRY_NAME: &str = "<entry>";

/// Frame slots a 16-bit local operand can address.
pub const MAX_FRAME_SLOTS: usize = u16::MAX as usize + 1;

/// Arguments an 8-bit `CALL` argc operand can pass.
pub const MAX_ARITY: usize = u8::MAX as usize;

/// One function's instruction stream.
///
/// `lines` runs parallel to `code`: every byte, operands included, records the
/// source line it was emitted for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub code: Vec<u8>,
    pub lines: Vec<u32>,
    /// Append-only; equal values may appear more than once.
    pub constants: Vec<i64>,
}

impl Chunk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn write(&mut self, byte: u8, line: u32) {
        self.code.push(byte);
        self.lines.push(line);
    }

    pub fn write_op(&mut self, op: Opcode, line: u32) {
        self.write(op as u8, line);
    }

    /// Big-endian, like every multi-byte operand.
    pub fn write_u16(&mut self, value: u16, line: u32) {
        let [hi, lo] = value.to_be_bytes();
        self.write(hi, line);
        self.write(lo, line);
    }

    /// Overwrites the two operand bytes at `offset`. Returns `false` if they
    /// are not inside the chunk.
    pub fn patch_u16(&mut self, offset: usize, value: u16) -> bool {
        match self.code.get_mut(offset..offset + 2) {
            Some(bytes) => {
                bytes.copy_from_slice(&value.to_be_bytes());
                true
            }
            None => false,
        }
    }

    pub fn read_u8(&self, offset: usize) -> Option<u8> {
        self.code.get(offset).copied()
    }

    pub fn read_u16(&self, offset: usize) -> Option<u16> {
        let bytes = self.code.get(offset..offset + 2)?;
        Some(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// Source line of the byte at `offset`.
    pub fn line_at(&self, offset: usize) -> Option<u32> {
        self.lines.get(offset).copied()
    }

    /// Appends to the pool and returns the new index.
    pub fn add_constant(&mut self, value: i64) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }

    /// Decodes the instruction starting at `offset`.
    pub fn decode(&self, offset: usize) -> Result<Instruction, DecodeError> {
        let byte = self.read_u8(offset).ok_or(DecodeError::OutOfBounds { offset })?;
        let opcode =
            Opcode::try_from(byte).map_err(|byte| DecodeError::UnknownOpcode { offset, byte })?;
        let truncated = DecodeError::Truncated { offset, opcode };

        let operand = match opcode.operand_width() {
            0 => Operand::None,
            2 => Operand::U16(self.read_u16(offset + 1).ok_or(truncated)?),
            _ => Operand::Call {
                function: self.read_u16(offset + 1).ok_or(truncated)?,
                argc: self.read_u8(offset + 3).ok_or(truncated)?,
            },
        };

        Ok(Instruction {
            offset,
            opcode,
            operand,
        })
    }
}

/// Inline operand of a decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    None,
    /// Slot, constant index or jump target.
    U16(u16),
    Call { function: u16, argc: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub offset: usize,
    pub opcode: Opcode,
    pub operand: Operand,
}

impl Instruction {
    /// Offset of the following instruction.
    pub fn next_offset(&self) -> usize {
        self.offset + 1 + self.opcode.operand_width()
    }

    /// Argument count for `Call`, zero otherwise.
    pub fn argc(&self) -> u8 {
        match self.operand {
            Operand::Call { argc, .. } => argc,
            _ => 0,
        }
    }

    /// Target offset for `Jmp` and `JmpIfFalse`.
    pub fn jump_target(&self) -> Option<usize> {
        match (self.opcode, self.operand) {
            (Opcode::Jmp | Opcode::JmpIfFalse, Operand::U16(target)) => Some(target as usize),
            _ => None,
        }
    }
}

/// Why a byte sequence is not a valid instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    OutOfBounds { offset: usize },
    UnknownOpcode { offset: usize, byte: u8 },
    Truncated { offset: usize, opcode: Opcode },
}

/// An executable unit: a chunk plus the frame layout it expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BytecodeFunction {
    pub name: String,
    pub chunk: Chunk,
    pub arity: usize,
    /// Frame slots, parameters included. Always `>= arity`.
    pub num_locals: usize,
}

impl BytecodeFunction {
    /// Whether `arity` and `num_locals` describe a frame the operand widths
    /// can express. Only hand-made or corrupted artifacts fail this.
    pub fn has_valid_frame(&self) -> bool {
        self.arity <= MAX_ARITY
            && self.arity <= self.num_locals
            && self.num_locals <= MAX_FRAME_SLOTS
    }
}

/// A compiled program.
///
/// User functions come first in declaration order; the entry function is
/// appended last and `entry_index` points at it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BytecodeProgram {
    pub functions: Vec<BytecodeFunction>,
    /// Initial global values. The compiler leaves them all zero; the entry
    /// function stores the real initial values at run time.
    pub globals: Vec<i64>,
    pub entry_index: usize,
}

impl BytecodeProgram {
    pub fn function(&self, index: usize) -> Option<&BytecodeFunction> {
        self.functions.get(index)
    }

    pub fn entry(&self) -> Option<&BytecodeFunction> {
        self.function(self.entry_index)
    }

    pub fn code_size(&self) -> usize {
        self.functions.iter().map(|f| f.chunk.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_tracks_lines_per_byte() {
        let mut chunk = Chunk::new();
        chunk.write_op(Opcode::PushConst, 3);
        chunk.write_u16(0x0102, 3);
        chunk.write_op(Opcode::Print, 4);

        assert_eq!(chunk.code, vec![0, 0x01, 0x02, 13]);
        assert_eq!(chunk.lines, vec![3, 3, 3, 4]);
        assert_eq!(chunk.read_u16(1), Some(0x0102));
        assert_eq!(chunk.line_at(3), Some(4));
    }

    #[test]
    fn test_frame_shape() {
        let function = |arity, num_locals| BytecodeFunction {
            name: "f".to_string(),
            chunk: Chunk::new(),
            arity,
            num_locals,
        };

        assert!(function(0, 0).has_valid_frame());
        assert!(function(2, 5).has_valid_frame());
        assert!(function(MAX_ARITY, MAX_FRAME_SLOTS).has_valid_frame());
        assert!(!function(3, 2).has_valid_frame());
        assert!(!function(0, MAX_FRAME_SLOTS + 1).has_valid_frame());
        assert!(!function(0, usize::MAX).has_valid_frame());
        assert!(!function(MAX_ARITY + 1, MAX_FRAME_SLOTS).has_valid_frame());
    }

    #[test]
    fn test_patch_u16() {
        let mut chunk = Chunk::new();
        chunk.write_op(Opcode::Jmp, 1);
        chunk.write_u16(0xFFFF, 1);

        assert!(chunk.patch_u16(1, 0x0203));
        assert_eq!(chunk.code, vec![9, 0x02, 0x03]);
        assert!(!chunk.patch_u16(2, 0));
    }

    #[test]
    fn test_read_past_end() {
        let mut chunk = Chunk::new();
        chunk.write(7, 1);
        assert_eq!(chunk.read_u16(0), None);
        assert_eq!(chunk.read_u8(1), None);
    }

    #[test]
    fn test_decode_call_and_errors() {
        let mut chunk = Chunk::new();
        chunk.write_op(Opcode::Call, 1);
        chunk.write_u16(2, 1);
        chunk.write(1, 1);
        chunk.write(0xAB, 1);
        chunk.write_op(Opcode::LoadLocal, 1);
        chunk.write(0, 1);

        let call = chunk.decode(0).unwrap();
        assert_eq!(
            call.operand,
            Operand::Call {
                function: 2,
                argc: 1
            }
        );
        assert_eq!(call.next_offset(), 4);
        assert_eq!(
            chunk.decode(4),
            Err(DecodeError::UnknownOpcode {
                offset: 4,
                byte: 0xAB
            })
        );
        assert_eq!(
            chunk.decode(5),
            Err(DecodeError::Truncated {
                offset: 5,
                opcode: Opcode::LoadLocal
            })
        );
        assert_eq!(chunk.decode(7), Err(DecodeError::OutOfBounds { offset: 7 }));
    }

    #[test]
    fn test_constants_keep_duplicates() {
        let mut chunk = Chunk::new();
        assert_eq!(chunk.add_constant(5), 0);
        assert_eq!(chunk.add_constant(5), 1);
        assert_eq!(chunk.constants, vec![5, 5]);
    }
}
