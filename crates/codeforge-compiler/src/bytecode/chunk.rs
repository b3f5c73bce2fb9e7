//! Compiled bytecode storage.
//!
//! A [`Chunk`] is the body of one compiled method: a flat byte buffer of
//! opcodes and big-endian inline operands, plus a parallel statement-index
//! table for diagnostics. Jumps are emitted with a placeholder offset and
//! patched once the jump target is known.

use codeforge_core::BuildError;

use super::opcode::OpCode;

/// Placeholder written for a forward jump before its target is known.
const JUMP_PLACEHOLDER: u16 = 0xFFFF;

/// A chunk of compiled bytecode.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Chunk {
    /// Raw bytecode: opcodes and inline operands.
    code: Vec<u8>,
    /// Statement index for each byte, for diagnostics.
    stmts: Vec<u32>,
}

impl Chunk {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current write position (offset of the next byte).
    #[inline]
    pub fn len(&self) -> usize {
        self.code.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Raw code bytes.
    #[inline]
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    /// Statement index recorded for a byte offset.
    pub fn stmt_at(&self, offset: usize) -> Option<u32> {
        self.stmts.get(offset).copied()
    }

    // =========================================================================
    // Writing
    // =========================================================================

    /// Append an opcode byte.
    pub fn write_op(&mut self, op: OpCode, stmt: u32) {
        self.code.push(op as u8);
        self.stmts.push(stmt);
    }

    /// Append a raw operand byte.
    pub fn write_byte(&mut self, byte: u8, stmt: u32) {
        self.code.push(byte);
        self.stmts.push(stmt);
    }

    /// Append a 16-bit operand, big-endian.
    pub fn write_u16(&mut self, value: u16, stmt: u32) {
        self.code.extend_from_slice(&value.to_be_bytes());
        self.stmts.push(stmt);
        self.stmts.push(stmt);
    }

    /// Emit a forward jump with a placeholder offset.
    ///
    /// Returns the offset of the operand bytes, to hand to
    /// [`Chunk::patch_jump`] once the target is known.
    pub fn emit_jump(&mut self, op: OpCode, stmt: u32) -> usize {
        self.write_op(op, stmt);
        let operand_at = self.code.len();
        self.write_u16(JUMP_PLACEHOLDER, stmt);
        operand_at
    }

    /// Patch a forward jump to land at the current write position.
    pub fn patch_jump(&mut self, operand_at: usize) -> Result<(), BuildError> {
        // Offset is measured from the byte after the operand.
        let distance = self.code.len() - (operand_at + 2);
        let distance = u16::try_from(distance).map_err(|_| BuildError::InvalidContext {
            message: "jump distance exceeds 16 bits".into(),
        })?;
        let bytes = distance.to_be_bytes();
        self.code[operand_at] = bytes[0];
        self.code[operand_at + 1] = bytes[1];
        Ok(())
    }

    /// Emit a backward jump to `target` (an earlier write position).
    pub fn emit_loop(&mut self, target: usize, stmt: u32) -> Result<(), BuildError> {
        self.write_op(OpCode::Loop, stmt);
        // Offset is measured from the byte after the operand.
        let distance = self.code.len() + 2 - target;
        let distance = u16::try_from(distance).map_err(|_| BuildError::InvalidContext {
            message: "loop distance exceeds 16 bits".into(),
        })?;
        self.write_u16(distance, stmt);
        Ok(())
    }

    // =========================================================================
    // Reading
    // =========================================================================

    /// Read the byte at `offset`.
    #[inline]
    pub fn read_byte(&self, offset: usize) -> Option<u8> {
        self.code.get(offset).copied()
    }

    /// Read a big-endian u16 at `offset`.
    pub fn read_u16(&self, offset: usize) -> Option<u16> {
        let hi = *self.code.get(offset)?;
        let lo = *self.code.get(offset + 1)?;
        Some(u16::from_be_bytes([hi, lo]))
    }

    /// Decode the opcode sequence, skipping inline operands.
    ///
    /// Stops at the first invalid byte; tests use this to assert on emitted
    /// code without caring about operand values.
    pub fn opcodes(&self) -> Vec<OpCode> {
        let mut ops = Vec::new();
        let mut offset = 0;
        while offset < self.code.len() {
            let Some(op) = OpCode::from_u8(self.code[offset]) else {
                break;
            };
            ops.push(op);
            offset += 1 + op.operand_size();
        }
        ops
    }

    /// Assert the chunk decodes to exactly this opcode sequence.
    #[track_caller]
    pub fn assert_opcodes(&self, expected: &[OpCode]) {
        let actual = self.opcodes();
        assert_eq!(
            actual,
            expected,
            "opcode mismatch\n  actual:   {:?}\n  expected: {:?}",
            actual.iter().map(|o| o.name()).collect::<Vec<_>>(),
            expected.iter().map(|o| o.name()).collect::<Vec<_>>(),
        );
    }

    /// Assert the chunk contains this contiguous opcode subsequence.
    #[track_caller]
    pub fn assert_contains_opcodes(&self, expected: &[OpCode]) {
        let actual = self.opcodes();
        let found = actual
            .windows(expected.len())
            .any(|window| window == expected);
        assert!(
            found,
            "opcode subsequence not found\n  actual:   {:?}\n  expected: {:?}",
            actual.iter().map(|o| o.name()).collect::<Vec<_>>(),
            expected.iter().map(|o| o.name()).collect::<Vec<_>>(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_opcodes_and_operands() {
        let mut chunk = Chunk::new();
        chunk.write_op(OpCode::Constant, 0);
        chunk.write_byte(3, 0);
        chunk.write_op(OpCode::Return, 1);

        assert_eq!(chunk.code(), &[OpCode::Constant as u8, 3, OpCode::Return as u8]);
        assert_eq!(chunk.stmt_at(0), Some(0));
        assert_eq!(chunk.stmt_at(2), Some(1));
        chunk.assert_opcodes(&[OpCode::Constant, OpCode::Return]);
    }

    #[test]
    fn patch_jump_lands_after_skipped_code() {
        let mut chunk = Chunk::new();
        chunk.write_op(OpCode::PushTrue, 0);
        let jump = chunk.emit_jump(OpCode::JumpIfFalse, 0);
        chunk.write_op(OpCode::PushZero, 1);
        chunk.write_op(OpCode::Pop, 1);
        chunk.patch_jump(jump).unwrap();

        // Two skipped single-byte instructions.
        assert_eq!(chunk.read_u16(jump), Some(2));
    }

    #[test]
    fn loop_offset_reaches_back_to_target() {
        let mut chunk = Chunk::new();
        chunk.write_op(OpCode::PushZero, 0);
        let start = chunk.len();
        chunk.write_op(OpCode::Dup, 1);
        chunk.write_op(OpCode::Pop, 1);
        chunk.emit_loop(start, 2).unwrap();

        // ip after reading the operand = start + 2 (Dup, Pop) + 3 (Loop + u16);
        // subtracting the stored distance must land on `start`.
        let operand_at = chunk.len() - 2;
        let distance = chunk.read_u16(operand_at).unwrap() as usize;
        assert_eq!(chunk.len() - distance, start);
    }

    #[test]
    fn opcode_extraction_skips_operands() {
        let mut chunk = Chunk::new();
        chunk.write_op(OpCode::ConstantWide, 0);
        chunk.write_u16(260, 0);
        chunk.write_op(OpCode::CallMethod, 0);
        chunk.write_u16(1, 0);
        chunk.write_byte(2, 0);
        chunk.write_op(OpCode::ReturnVoid, 1);

        chunk.assert_opcodes(&[OpCode::ConstantWide, OpCode::CallMethod, OpCode::ReturnVoid]);
        chunk.assert_contains_opcodes(&[OpCode::CallMethod, OpCode::ReturnVoid]);
    }
}
