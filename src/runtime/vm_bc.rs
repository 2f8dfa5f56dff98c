use tracing::trace;

use crate::bytecode::stack_check::check_program;
use crate::bytecode::{BytecodeProgram, Chunk, Opcode};
use crate::runtime::config::VmConfig;
use crate::runtime::runtime_error::{RuntimeError, RuntimeErrorKind};

/// `tracing` target of per-instruction trace events.
pub const TRACE_TARGET: &str = "decaf::trace";

/// Values shown at the top of the stack in a trace line.
const TRACE_STACK_TAIL: usize = 5;

/// One active invocation.
#[derive(Debug, Clone, Copy)]
struct CallFrame {
    function: usize,
    ip: usize,
    /// Stack offset of the frame's first slot (its first argument).
    base: usize,
}

/// Stack machine executing a [`BytecodeProgram`].
///
/// All frames share one operand stack. A frame's slots live at
/// `base..base + num_locals`; temporaries are pushed above them.
pub struct Vm<'p> {
    program: &'p BytecodeProgram,
    stack: Vec<i64>,
    frames: Vec<CallFrame>,
    globals: Vec<i64>,
    output: Vec<String>,
    config: VmConfig,
    steps: u64,
}

impl<'p> Vm<'p> {
    pub fn new(program: &'p BytecodeProgram) -> Self {
        Self::with_config(program, VmConfig::default())
    }

    pub fn with_config(program: &'p BytecodeProgram, config: VmConfig) -> Self {
        Self {
            program,
            stack: Vec::new(),
            frames: Vec::new(),
            globals: program.globals.clone(),
            output: Vec::new(),
            config,
            steps: 0,
        }
    }

    /// Lines printed so far. Still available after a failed run.
    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn into_output(self) -> Vec<String> {
        self.output
    }

    pub fn stack(&self) -> &[i64] {
        &self.stack
    }

    pub fn globals(&self) -> &[i64] {
        &self.globals
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    fn reset_execution_state(&mut self) {
        self.stack.clear();
        self.frames.clear();
        self.globals = self.program.globals.clone();
        self.output.clear();
        self.steps = 0;
    }

    /// Runs the entry function until `HALT` or until the last frame returns.
    pub fn run(&mut self) -> Result<(), RuntimeError> {
        self.reset_execution_state();

        if self.config.verify {
            check_program(self.program)
                .map_err(|e| RuntimeError::new(RuntimeErrorKind::Verification(e)))?;
        }

        let result = self
            .call(self.program.entry_index, 0)
            .and_then(|()| self.execute());

        result.map_err(|kind| {
            RuntimeError::new(kind)
                .with_call_stack(self.call_stack())
                .with_output(self.output.clone())
        })
    }

    /// Function names of the active frames, innermost last.
    fn call_stack(&self) -> Vec<String> {
        self.frames
            .iter()
            .map(|frame| match self.program.function(frame.function) {
                Some(function) => function.name.clone(),
                None => format!("<fn {}>", frame.function),
            })
            .collect()
    }

    // =========================================================================
    // Dispatch loop
    // =========================================================================

    fn execute(&mut self) -> Result<(), RuntimeErrorKind> {
        let program = self.program;

        while let Some(frame) = self.frames.last() {
            let ip = frame.ip;
            let function = program
                .function(frame.function)
                .ok_or(RuntimeErrorKind::CallTargetOutOfRange {
                    index: frame.function,
                })?;
            let chunk = &function.chunk;

            let byte = chunk
                .read_u8(ip)
                .ok_or(RuntimeErrorKind::IpOutOfBounds { ip })?;
            self.count_step()?;
            let opcode = Opcode::try_from(byte)
                .map_err(|byte| RuntimeErrorKind::UnknownOpcode { byte, offset: ip })?;

            if self.config.trace {
                trace!(
                    target: TRACE_TARGET,
                    "{}",
                    trace_line(ip, &function.name, opcode, &self.stack)
                );
            }
            self.set_ip(ip + 1);

            match opcode {
                Opcode::PushConst => {
                    let index = self.read_u16(chunk)? as usize;
                    let value = chunk
                        .constants
                        .get(index)
                        .copied()
                        .ok_or(RuntimeErrorKind::ConstantOutOfRange { index })?;
                    self.stack.push(value);
                }
                Opcode::LoadLocal => {
                    let slot = self.read_u16(chunk)? as usize;
                    let value = self.load_local(slot)?;
                    self.stack.push(value);
                }
                Opcode::StoreLocal => {
                    let slot = self.read_u16(chunk)? as usize;
                    let value = self.pop()?;
                    self.store_local(slot, value)?;
                }
                Opcode::LoadGlobal => {
                    let slot = self.read_u16(chunk)? as usize;
                    let value = self
                        .globals
                        .get(slot)
                        .copied()
                        .ok_or(RuntimeErrorKind::GlobalOutOfRange { slot })?;
                    self.stack.push(value);
                }
                Opcode::StoreGlobal => {
                    let slot = self.read_u16(chunk)? as usize;
                    let value = self.pop()?;
                    let target = self
                        .globals
                        .get_mut(slot)
                        .ok_or(RuntimeErrorKind::GlobalOutOfRange { slot })?;
                    *target = value;
                }

                Opcode::Add => self.binary(|a, b| Ok(a.wrapping_add(b)))?,
                Opcode::Sub => self.binary(|a, b| Ok(a.wrapping_sub(b)))?,
                Opcode::Mul => self.binary(|a, b| Ok(a.wrapping_mul(b)))?,
                Opcode::Div => {
                    self.binary(|a, b| floor_div(a, b).ok_or(RuntimeErrorKind::DivisionByZero))?
                }

                Opcode::Jmp => {
                    let target = self.read_u16(chunk)? as usize;
                    self.set_ip(target);
                }
                Opcode::JmpIfFalse => {
                    let target = self.read_u16(chunk)? as usize;
                    if self.pop()? == 0 {
                        self.set_ip(target);
                    }
                }
                Opcode::Call => {
                    let index = self.read_u16(chunk)? as usize;
                    let argc = self.read_u8(chunk)? as usize;
                    self.call(index, argc)?;
                }
                Opcode::Ret => self.ret()?,

                Opcode::Print => {
                    let value = self.pop()?;
                    self.output.push(value.to_string());
                }
                Opcode::Pop => {
                    self.pop()?;
                }
                Opcode::Halt => {
                    if self.config.trace {
                        trace!(target: TRACE_TARGET, "halt");
                    }
                    self.frames.clear();
                    break;
                }
            }
        }

        Ok(())
    }

    fn count_step(&mut self) -> Result<(), RuntimeErrorKind> {
        self.steps += 1;

        if let Some(limit) = self.config.max_steps {
            if self.steps > limit {
                return Err(RuntimeErrorKind::StepLimitExceeded { limit });
            }
        }
        Ok(())
    }

    // =========================================================================
    // Frames and operands
    // =========================================================================

    fn set_ip(&mut self, ip: usize) {
        if let Some(frame) = self.frames.last_mut() {
            frame.ip = ip;
        }
    }

    fn current_ip(&self) -> usize {
        self.frames.last().map_or(0, |frame| frame.ip)
    }

    fn base(&self) -> usize {
        self.frames.last().map_or(0, |frame| frame.base)
    }

    fn read_u8(&mut self, chunk: &Chunk) -> Result<u8, RuntimeErrorKind> {
        let ip = self.current_ip();
        let value = chunk
            .read_u8(ip)
            .ok_or(RuntimeErrorKind::IpOutOfBounds { ip })?;
        self.set_ip(ip + 1);
        Ok(value)
    }

    fn read_u16(&mut self, chunk: &Chunk) -> Result<u16, RuntimeErrorKind> {
        let ip = self.current_ip();
        let value = chunk
            .read_u16(ip)
            .ok_or(RuntimeErrorKind::IpOutOfBounds { ip })?;
        self.set_ip(ip + 2);
        Ok(value)
    }

    fn pop(&mut self) -> Result<i64, RuntimeErrorKind> {
        self.stack.pop().ok_or(RuntimeErrorKind::StackUnderflow)
    }

    /// Pops `b`, then `a`, and pushes `op(a, b)`.
    fn binary<F>(&mut self, op: F) -> Result<(), RuntimeErrorKind>
    where
        F: FnOnce(i64, i64) -> Result<i64, RuntimeErrorKind>,
    {
        let b = self.pop()?;
        let a = self.pop()?;
        self.stack.push(op(a, b)?);
        Ok(())
    }

    fn load_local(&self, slot: usize) -> Result<i64, RuntimeErrorKind> {
        self.stack
            .get(self.base() + slot)
            .copied()
            .ok_or(RuntimeErrorKind::LocalOutOfRange { slot })
    }

    fn store_local(&mut self, slot: usize, value: i64) -> Result<(), RuntimeErrorKind> {
        let index = self.base() + slot;
        let target = self
            .stack
            .get_mut(index)
            .ok_or(RuntimeErrorKind::LocalOutOfRange { slot })?;
        *target = value;
        Ok(())
    }

    /// Pushes a frame for `index`. The top `argc` values become its first
    /// slots; the remaining locals start at zero.
    fn call(&mut self, index: usize, argc: usize) -> Result<(), RuntimeErrorKind> {
        let function = self
            .program
            .function(index)
            .ok_or(RuntimeErrorKind::CallTargetOutOfRange { index })?;

        if argc != function.arity {
            return Err(RuntimeErrorKind::ArityMismatch {
                name: function.name.clone(),
                expected: function.arity,
                actual: argc,
            });
        }

        if !function.has_valid_frame() {
            return Err(RuntimeErrorKind::InvalidFrame {
                name: function.name.clone(),
                arity: function.arity,
                num_locals: function.num_locals,
            });
        }

        let base = self
            .stack
            .len()
            .checked_sub(argc)
            .ok_or(RuntimeErrorKind::StackUnderflow)?;
        let needed = base
            .checked_add(function.num_locals)
            .ok_or_else(|| RuntimeErrorKind::InvalidFrame {
                name: function.name.clone(),
                arity: function.arity,
                num_locals: function.num_locals,
            })?;
        if self.stack.len() < needed {
            self.stack.resize(needed, 0);
        }

        self.frames.push(CallFrame {
            function: index,
            ip: 0,
            base,
        });
        Ok(())
    }

    /// Drops the current frame's slots and temporaries, leaving only the
    /// returned value for the caller.
    fn ret(&mut self) -> Result<(), RuntimeErrorKind> {
        if self.frames.is_empty() {
            return Err(RuntimeErrorKind::ReturnWithoutFrame);
        }
        let value = self.pop()?;
        if let Some(frame) = self.frames.pop() {
            self.stack.truncate(frame.base);
        }
        self.stack.push(value);

        if self.frames.is_empty() {
            self.stack.clear();
        }
        Ok(())
    }
}

/// Integer division rounding toward negative infinity. `None` for a zero
/// divisor; `i64::MIN / -1` wraps.
pub fn floor_div(a: i64, b: i64) -> Option<i64> {
    if b == 0 {
        return None;
    }
    let quotient = a.wrapping_div(b);
    let remainder = a.wrapping_rem(b);
    if remainder != 0 && ((remainder < 0) != (b < 0)) {
        Some(quotient - 1)
    } else {
        Some(quotient)
    }
}

/// Formats one trace event: the instruction about to run and the top of the
/// operand stack.
pub fn trace_line(ip: usize, function: &str, opcode: Opcode, stack: &[i64]) -> String {
    let preview = if stack.is_empty() {
        "<empty>".to_string()
    } else {
        let tail = &stack[stack.len().saturating_sub(TRACE_STACK_TAIL)..];
        let prefix = if stack.len() > TRACE_STACK_TAIL { "..." } else { "" };
        let values: Vec<String> = tail.iter().map(|v| v.to_string()).collect();
        format!("{}{}", prefix, values.join(","))
    };
    format!(
        "ip={} fn={} op={} stack=[{}]",
        ip,
        function,
        opcode.name(),
        preview
    )
}
