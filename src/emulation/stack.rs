//! CIL evaluation stack.
//!
//! Each invocation of an emitted body owns one [`EvaluationStack`], bounded by the
//! body's declared `max_stack`. Errors report the offset of the instruction being
//! executed, which the interpreter keeps current.

use crate::{
    emulation::{EmValue, ObjectRef},
    Error, Result,
};

/// Bounded LIFO stack of [`EmValue`]s.
#[derive(Clone, Debug)]
pub struct EvaluationStack {
    /// The stack storage
    values: Vec<EmValue>,
    /// Maximum allowed stack depth
    max_depth: usize,
    /// Offset of the executing instruction, for error reports
    offset: usize,
}

impl EvaluationStack {
    /// Creates a new evaluation stack with the given maximum depth.
    #[must_use]
    pub fn new(max_depth: usize) -> Self {
        EvaluationStack {
            values: Vec::with_capacity(max_depth.min(256)),
            max_depth,
            offset: 0,
        }
    }

    /// Record the offset of the instruction about to execute
    pub fn set_offset(&mut self, offset: usize) {
        self.offset = offset;
    }

    /// Pushes a value onto the stack.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] if the declared maximum depth would be exceeded.
    pub fn push(&mut self, value: EmValue) -> Result<()> {
        if self.values.len() >= self.max_depth {
            return Err(malformed_error!(
                "Evaluation stack overflow at 0x{:04x}, max depth {}",
                self.offset,
                self.max_depth
            ));
        }
        self.values.push(value);
        Ok(())
    }

    /// Pops a value from the stack.
    ///
    /// # Errors
    /// Returns [`Error::StackUnderflow`] if the stack is empty.
    pub fn pop(&mut self) -> Result<EmValue> {
        self.values.pop().ok_or(Error::StackUnderflow {
            offset: self.offset,
            needed: 1,
            available: 0,
        })
    }

    /// Pops `count` values, returned in push order.
    ///
    /// # Errors
    /// Returns [`Error::StackUnderflow`] if fewer values are available.
    pub fn pop_n(&mut self, count: usize) -> Result<Vec<EmValue>> {
        if count > self.values.len() {
            return Err(Error::StackUnderflow {
                offset: self.offset,
                needed: count,
                available: self.values.len(),
            });
        }

        Ok(self.values.split_off(self.values.len() - count))
    }

    /// Pops an `int32`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidCast`] if the top value is not an `int32`.
    pub fn pop_i32(&mut self) -> Result<i32> {
        let value = self.pop()?;
        value.as_i32().ok_or_else(|| Error::InvalidCast {
            from: value.type_name(),
            to: "int32".to_string(),
        })
    }

    /// Pops a non-null object reference.
    ///
    /// # Errors
    /// Returns [`Error::NullReference`] for null, [`Error::InvalidCast`] for non-references.
    pub fn pop_object_ref(&mut self) -> Result<ObjectRef> {
        let value = self.pop()?;
        value.object().cloned()
    }

    /// Peeks at the top value without removing it.
    ///
    /// # Errors
    /// Returns [`Error::StackUnderflow`] if the stack is empty.
    pub fn peek(&self) -> Result<&EmValue> {
        self.values.last().ok_or(Error::StackUnderflow {
            offset: self.offset,
            needed: 1,
            available: 0,
        })
    }

    /// Duplicates the top value.
    ///
    /// # Errors
    /// Returns an error if the stack is empty or would overflow.
    pub fn dup(&mut self) -> Result<()> {
        let value = self.peek()?.clone();
        self.push(value)
    }

    /// Returns the current depth of the stack.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.values.len()
    }

    /// Returns the maximum depth of the stack.
    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Returns true if the stack is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
