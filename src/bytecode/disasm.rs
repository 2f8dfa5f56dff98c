use std::collections::BTreeMap;
use std::fmt;

use crate::bytecode::{BytecodeFunction, BytecodeProgram, DecodeError, Opcode, Operand};

/// Renders a program as a listing, one function after another.
///
/// ```text
/// == fn 0 main ==
/// 0000 line   2 PUSH_CONST    #0 (14)
/// 0003 line   2 PRINT
/// ```
///
/// The listing only reads the program. Malformed code is rendered rather than
/// rejected: unknown bytes show as `UNKNOWN(0x..)`, a cut-off operand as
/// `<truncated>` (which ends that function's listing) and a constant index
/// outside the pool as `(<invalid>)`.
pub fn disassemble(program: &BytecodeProgram) -> String {
    let mut lines = Vec::new();
    for (index, function) in program.functions.iter().enumerate() {
        lines.push(format!("== fn {} {} ==", index, function.name));
        lines.extend(disassemble_function(function, program));
    }
    lines.join("\n")
}

/// Listing lines for one function, without its header.
pub fn disassemble_function(function: &BytecodeFunction, program: &BytecodeProgram) -> Vec<String> {
    let chunk = &function.chunk;
    let mut lines = Vec::new();
    let mut offset = 0;

    while offset < chunk.len() {
        let line = chunk.line_at(offset).unwrap_or(0);
        let prefix = format!("{:04} line {:>3}", offset, line);

        let instruction = match chunk.decode(offset) {
            Ok(instruction) => instruction,
            Err(DecodeError::UnknownOpcode { byte, .. }) => {
                lines.push(format!("{} UNKNOWN(0x{:02x})", prefix, byte));
                offset += 1;
                continue;
            }
            Err(DecodeError::Truncated { opcode, .. }) => {
                lines.push(format!("{} {:<13} <truncated>", prefix, opcode.name()));
                break;
            }
            Err(DecodeError::OutOfBounds { .. }) => break,
        };

        let name = instruction.opcode.name();
        let text = match (instruction.opcode, instruction.operand) {
            (Opcode::PushConst, Operand::U16(index)) => {
                let value = chunk
                    .constants
                    .get(index as usize)
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "<invalid>".to_string());
                format!("{} {:<13} #{} ({})", prefix, name, index, value)
            }
            (Opcode::Jmp | Opcode::JmpIfFalse, Operand::U16(target)) => {
                format!("{} {:<13} -> {:04}", prefix, name, target)
            }
            (_, Operand::U16(slot)) => format!("{} {:<13} {}", prefix, name, slot),
            (_, Operand::Call { function, argc }) => {
                let callee = program
                    .function(function as usize)
                    .map(|f| f.name.as_str())
                    .unwrap_or("<invalid>");
                format!(
                    "{} CALL           {} {} argc={}",
                    prefix, function, callee, argc
                )
            }
            (_, Operand::None) => format!("{} {}", prefix, name),
        };

        lines.push(text);
        offset = instruction.next_offset();
    }

    lines
}

// =============================================================================
// Statistics
// =============================================================================

/// Size summary of a program, printed by `decaf disasm --stats`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgramStats {
    pub functions: usize,
    pub code_bytes: usize,
    pub constants: usize,
    pub instructions: usize,
    pub op_counts: BTreeMap<Opcode, usize>,
}

impl ProgramStats {
    /// Walks every function's code. Decoding stops at the first bad byte of a
    /// function, so counts cover only well-formed prefixes.
    pub fn collect(program: &BytecodeProgram) -> Self {
        let mut stats = ProgramStats {
            functions: program.functions.len(),
            ..Default::default()
        };

        for function in &program.functions {
            let chunk = &function.chunk;
            stats.code_bytes += chunk.len();
            stats.constants += chunk.constants.len();

            let mut offset = 0;
            while let Ok(instruction) = chunk.decode(offset) {
                stats.instructions += 1;
                *stats.op_counts.entry(instruction.opcode).or_insert(0) += 1;
                offset = instruction.next_offset();
            }
        }

        stats
    }

    pub fn count(&self, opcode: Opcode) -> usize {
        self.op_counts.get(&opcode).copied().unwrap_or(0)
    }
}

impl fmt::Display for ProgramStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== BYTECODE STATISTICS ===")?;
        writeln!(f, "Functions:    {}", self.functions)?;
        writeln!(f, "Code bytes:   {}", self.code_bytes)?;
        writeln!(f, "Constants:    {}", self.constants)?;
        writeln!(f, "Instructions: {}", self.instructions)?;
        write!(f, "Op frequency:")?;

        let mut counts: Vec<_> = self.op_counts.iter().collect();
        counts.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));

        for (op, count) in counts {
            let pct = (*count as f64 / self.instructions as f64) * 100.0;
            write!(f, "\n  {:<14} {:>4} ({:>5.1}%)", op.name(), count, pct)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::Chunk;
    use pretty_assertions::assert_eq;

    fn program_with(chunks: Vec<(&str, Chunk)>) -> BytecodeProgram {
        let functions: Vec<_> = chunks
            .into_iter()
            .map(|(name, chunk)| BytecodeFunction {
                name: name.to_string(),
                chunk,
                arity: 0,
                num_locals: 0,
            })
            .collect();
        let entry_index = functions.len() - 1;
        BytecodeProgram {
            functions,
            globals: vec![],
            entry_index,
        }
    }

    #[test]
    fn test_listing_format() {
        let mut main = Chunk::new();
        let idx = main.add_constant(14);
        main.write_op(Opcode::PushConst, 2);
        main.write_u16(idx as u16, 2);
        main.write_op(Opcode::StoreLocal, 2);
        main.write_u16(0, 2);
        main.write_op(Opcode::JmpIfFalse, 3);
        main.write_u16(12, 3);
        main.write_op(Opcode::Ret, 12);

        let mut entry = Chunk::new();
        entry.write_op(Opcode::Call, 1);
        entry.write_u16(0, 1);
        entry.write(0, 1);
        entry.write_op(Opcode::Pop, 1);
        entry.write_op(Opcode::Halt, 1);

        let program = program_with(vec![("main", main), ("<entry>", entry)]);
        assert_eq!(
            disassemble(&program),
            [
                "== fn 0 main ==",
                "0000 line   2 PUSH_CONST    #0 (14)",
                "0003 line   2 STORE_LOCAL   0",
                "0006 line   3 JMP_IF_FALSE  -> 0012",
                "0009 line  12 RET",
                "== fn 1 <entry> ==",
                "0000 line   1 CALL           0 main argc=0",
                "0004 line   1 POP",
                "0005 line   1 HALT",
            ]
            .join("\n")
        );
    }

    #[test]
    fn test_invalid_references_are_rendered() {
        let mut chunk = Chunk::new();
        chunk.write_op(Opcode::PushConst, 1);
        chunk.write_u16(5, 1);
        chunk.write_op(Opcode::Call, 1);
        chunk.write_u16(9, 1);
        chunk.write(2, 1);

        let program = program_with(vec![("f", chunk)]);
        let listing = disassemble(&program);
        assert!(listing.contains("PUSH_CONST    #5 (<invalid>)"));
        assert!(listing.contains("CALL           9 <invalid> argc=2"));
    }

    #[test]
    fn test_unknown_and_truncated_bytes() {
        let mut chunk = Chunk::new();
        chunk.write(0xEE, 1);
        chunk.write_op(Opcode::Print, 1);
        chunk.write_op(Opcode::LoadGlobal, 2);
        chunk.write(0, 2);

        let program = program_with(vec![("f", chunk)]);
        assert_eq!(
            disassemble(&program),
            [
                "== fn 0 f ==",
                "0000 line   1 UNKNOWN(0xee)",
                "0001 line   1 PRINT",
                "0002 line   2 LOAD_GLOBAL   <truncated>",
            ]
            .join("\n")
        );
    }

    #[test]
    fn test_empty_program() {
        let program = BytecodeProgram {
            functions: vec![],
            globals: vec![],
            entry_index: 0,
        };
        assert_eq!(disassemble(&program), "");
    }

    #[test]
    fn test_stats_counts_ops() {
        let mut chunk = Chunk::new();
        for value in [1, 2] {
            let idx = chunk.add_constant(value);
            chunk.write_op(Opcode::PushConst, 1);
            chunk.write_u16(idx as u16, 1);
        }
        chunk.write_op(Opcode::Add, 1);
        chunk.write_op(Opcode::Ret, 1);

        let stats = ProgramStats::collect(&program_with(vec![("main", chunk)]));
        assert_eq!(stats.functions, 1);
        assert_eq!(stats.code_bytes, 8);
        assert_eq!(stats.constants, 2);
        assert_eq!(stats.instructions, 4);
        assert_eq!(stats.count(Opcode::PushConst), 2);
        assert_eq!(stats.count(Opcode::Add), 1);
        assert_eq!(stats.count(Opcode::Call), 0);

        let text = stats.to_string();
        assert!(text.contains("Instructions: 4"));
        assert!(text.contains("PUSH_CONST"));
    }
}
