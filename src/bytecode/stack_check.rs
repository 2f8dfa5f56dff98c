use thiserror::Error;

use crate::bytecode::{
    BytecodeFunction, BytecodeProgram, DecodeError, Instruction, Opcode, Operand, stack_effect,
};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StackCheckError {
    #[error("stack-check error in '{function}': stack underflow at {offset:04} ({opcode})")]
    Underflow {
        function: String,
        offset: usize,
        opcode: Opcode,
    },

    #[error(
        "stack-check error in '{function}': stack height at {offset:04} is {first} on one path and {second} on another"
    )]
    InconsistentHeight {
        function: String,
        offset: usize,
        first: i32,
        second: i32,
    },

    #[error("stack-check error in '{function}': execution can run past the end of the code")]
    FallsOffEnd { function: String },

    #[error("stack-check error in '{function}': jump at {offset:04} targets {target:04}, outside the code")]
    JumpOutOfRange {
        function: String,
        offset: usize,
        target: usize,
    },

    #[error("stack-check error in '{function}': bad instruction at {offset:04}: {reason}")]
    BadInstruction {
        function: String,
        offset: usize,
        reason: String,
    },
}

/// Values an instruction needs on the stack before it runs.
fn pops(opcode: Opcode, argc: u8) -> i32 {
    match opcode {
        Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div => 2,
        Opcode::StoreLocal
        | Opcode::StoreGlobal
        | Opcode::JmpIfFalse
        | Opcode::Ret
        | Opcode::Print
        | Opcode::Pop => 1,
        Opcode::Call => argc as i32,
        Opcode::PushConst | Opcode::LoadLocal | Opcode::LoadGlobal | Opcode::Jmp | Opcode::Halt => 0,
    }
}

/// Checks every function of `program`.
pub fn check_program(program: &BytecodeProgram) -> Result<(), StackCheckError> {
    for function in &program.functions {
        check_function(function, program)?;
    }
    Ok(())
}

/// Follows every path through one function's code, starting at offset 0 with
/// an empty operand stack, and returns the deepest operand stack reached.
///
/// Heights are measured above the frame's locals. Every reachable offset must
/// be reached with the same height on all paths, no path may pop more than it
/// pushed, and every path must end in `RET` or `HALT`.
pub fn check_function(
    function: &BytecodeFunction,
    program: &BytecodeProgram,
) -> Result<usize, StackCheckError> {
    let chunk = &function.chunk;
    let name = || function.name.clone();

    let mut heights: Vec<Option<i32>> = vec![None; chunk.len()];
    let mut worklist = vec![(0usize, 0i32)];
    let mut max_depth = 0i32;

    while let Some((offset, height)) = worklist.pop() {
        if offset >= chunk.len() {
            return Err(StackCheckError::FallsOffEnd { function: name() });
        }

        match heights[offset] {
            Some(seen) if seen == height => continue,
            Some(seen) => {
                return Err(StackCheckError::InconsistentHeight {
                    function: name(),
                    offset,
                    first: seen,
                    second: height,
                });
            }
            None => heights[offset] = Some(height),
        }

        let instruction = chunk.decode(offset).map_err(|err| {
            let reason = match err {
                DecodeError::UnknownOpcode { byte, .. } => format!("unknown opcode 0x{:02x}", byte),
                DecodeError::Truncated { opcode, .. } => format!("truncated {} operand", opcode),
                DecodeError::OutOfBounds { .. } => "offset outside the code".to_string(),
            };
            StackCheckError::BadInstruction {
                function: name(),
                offset,
                reason,
            }
        })?;

        check_operand(&instruction, function, program).map_err(|reason| {
            StackCheckError::BadInstruction {
                function: name(),
                offset,
                reason,
            }
        })?;

        let opcode = instruction.opcode;
        let argc = instruction.argc();
        if height < pops(opcode, argc) {
            return Err(StackCheckError::Underflow {
                function: name(),
                offset,
                opcode,
            });
        }

        let next_height = height + stack_effect(opcode, argc);
        max_depth = max_depth.max(next_height);

        if let Some(target) = instruction.jump_target() {
            if target >= chunk.len() {
                return Err(StackCheckError::JumpOutOfRange {
                    function: name(),
                    offset,
                    target,
                });
            }
            worklist.push((target, next_height));
        }
        if opcode.falls_through() {
            worklist.push((instruction.next_offset(), next_height));
        }
    }

    Ok(max_depth as usize)
}

fn check_operand(
    instruction: &Instruction,
    function: &BytecodeFunction,
    program: &BytecodeProgram,
) -> Result<(), String> {
    match (instruction.opcode, instruction.operand) {
        (Opcode::PushConst, Operand::U16(index))
            if index as usize >= function.chunk.constants.len() =>
        {
            Err(format!("constant #{} is not in the pool", index))
        }
        (Opcode::LoadLocal | Opcode::StoreLocal, Operand::U16(slot))
            if slot as usize >= function.num_locals =>
        {
            Err(format!(
                "local slot {} exceeds frame size {}",
                slot, function.num_locals
            ))
        }
        (Opcode::LoadGlobal | Opcode::StoreGlobal, Operand::U16(slot))
            if slot as usize >= program.globals.len() =>
        {
            Err(format!("global slot {} does not exist", slot))
        }
        (Opcode::Call, Operand::Call { function: target, .. })
            if target as usize >= program.functions.len() =>
        {
            Err(format!("call target {} does not exist", target))
        }
        _ => Ok(()),
    }
}
