//! On-disk framing for compiled programs.
//!
//! ```text
//! +--------+-------------+---------------------------------+
//! | "DCFB" | version u16 | postcard(BytecodeProgram)       |
//! | 4 B    | 2 B, LE     | rest of file                    |
//! +--------+-------------+---------------------------------+
//! ```

use thiserror::Error;
use tracing::debug;

use crate::bytecode::BytecodeProgram;

pub const MAGIC: &[u8; 4] = b"DCFB";
pub const FORMAT_VERSION: u16 = 1;

const HEADER_LEN: usize = MAGIC.len() + 2;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodecError {
    #[error("not a decaf bytecode file (bad magic header)")]
    BadMagic,

    #[error("unsupported bytecode format version {found} (expected {expected})")]
    UnsupportedVersion { found: u16, expected: u16 },

    #[error("malformed bytecode file: {0}")]
    Malformed(String),

    #[error("failed to encode bytecode: {0}")]
    Encode(String),
}

/// Serializes `program` with the artifact header.
pub fn encode(program: &BytecodeProgram) -> Result<Vec<u8>, CodecError> {
    let payload = postcard::to_allocvec(program).map_err(|e| CodecError::Encode(e.to_string()))?;

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&payload);

    debug!(
        bytes = out.len(),
        functions = program.functions.len(),
        "encoded bytecode"
    );
    Ok(out)
}

/// Parses an artifact produced by [`encode`].
pub fn decode(bytes: &[u8]) -> Result<BytecodeProgram, CodecError> {
    if bytes.len() < MAGIC.len() || &bytes[..MAGIC.len()] != MAGIC {
        return Err(CodecError::BadMagic);
    }
    if bytes.len() < HEADER_LEN {
        return Err(CodecError::Malformed("truncated header".to_string()));
    }

    let found = u16::from_le_bytes([bytes[4], bytes[5]]);
    if found != FORMAT_VERSION {
        return Err(CodecError::UnsupportedVersion {
            found,
            expected: FORMAT_VERSION,
        });
    }

    let (program, rest): (BytecodeProgram, _) = postcard::take_from_bytes(&bytes[HEADER_LEN..])
        .map_err(|e| CodecError::Malformed(e.to_string()))?;
    if !rest.is_empty() {
        return Err(CodecError::Malformed(format!(
            "{} trailing byte(s) after program",
            rest.len()
        )));
    }
    if let Some(function) = program.functions.iter().find(|f| !f.has_valid_frame()) {
        return Err(CodecError::Malformed(format!(
            "function '{}' has an impossible frame (arity {}, {} locals)",
            function.name, function.arity, function.num_locals
        )));
    }

    debug!(
        bytes = bytes.len(),
        functions = program.functions.len(),
        "decoded bytecode"
    );
    Ok(program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::compile::compile;
    use crate::bytecode::disasm::disassemble;
    use crate::frontend::lexer::Lexer;
    use crate::frontend::parser::Parser;
    use crate::sema::resolve;
    use pretty_assertions::assert_eq;

    fn compile_source(source: &str) -> BytecodeProgram {
        let tokens = Lexer::new(source).tokenize().unwrap();
        let program = Parser::new(tokens).parse().unwrap();
        let resolved = resolve(&program).unwrap();
        compile(&resolved).unwrap()
    }

    #[test]
    fn test_round_trip_preserves_everything() {
        let program = compile_source(
            r#"
            var g = 7;
            let h = g * 2;
            fn twice(n) { return n + n; }
            fn main() {
                var i = 3;
                while (i) { g = twice(g) - 1; i = i - 1; }
                print 7; print 7;
                return g / h;
            }
            "#,
        );

        let bytes = encode(&program).unwrap();
        let decoded = decode(&bytes).unwrap();

        assert_eq!(decoded, program);
        assert_eq!(disassemble(&decoded), disassemble(&program));
    }

    #[test]
    fn test_header_layout() {
        let bytes = encode(&compile_source("fn main() { return 0; }")).unwrap();
        assert_eq!(&bytes[..4], b"DCFB");
        assert_eq!(&bytes[4..6], &[1u8, 0]);
    }

    #[test]
    fn test_impossible_frames_are_rejected() {
        let program = compile_source("fn f(a, b) { return a; } fn main() { return f(1, 2); }");

        let mut huge = program.clone();
        huge.functions[0].num_locals = usize::MAX;
        let err = decode(&encode(&huge).unwrap()).unwrap_err();
        assert!(matches!(err, CodecError::Malformed(msg) if msg.contains("impossible frame")));

        let mut short = program.clone();
        short.functions[0].num_locals = 1;
        assert!(matches!(
            decode(&encode(&short).unwrap()),
            Err(CodecError::Malformed(_))
        ));
    }

    #[test]
    fn test_bad_magic() {
        assert_eq!(decode(b"NOPE\x01\x00"), Err(CodecError::BadMagic));
        assert_eq!(decode(b"DC"), Err(CodecError::BadMagic));
    }

    #[test]
    fn test_unsupported_version() {
        let mut bytes = encode(&compile_source("fn main() { return 0; }")).unwrap();
        bytes[4] = 9;
        assert_eq!(
            decode(&bytes),
            Err(CodecError::UnsupportedVersion {
                found: 9,
                expected: 1
            })
        );
    }

    #[test]
    fn test_malformed_payload() {
        let bytes = encode(&compile_source("fn main() { return 0; }")).unwrap();

        let truncated = &bytes[..bytes.len() - 3];
        assert!(matches!(decode(truncated), Err(CodecError::Malformed(_))));

        assert!(matches!(decode(b"DCFB\x01"), Err(CodecError::Malformed(_))));

        let mut padded = bytes.clone();
        padded.push(0);
        assert!(matches!(decode(&padded), Err(CodecError::Malformed(msg)) if msg.contains("trailing")));
    }
}
