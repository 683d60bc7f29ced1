//! High-level emission primitives for synthesized method bodies.
//!
//! [`ILEmitter`] wraps an [`InstructionEncoder`] with operations phrased in terms of
//! the object model: arguments, fields, locals, methods and types. Every body the
//! proxy synthesizer produces is a straight-line composition of these primitives, and
//! the stack effect of calls is derived from the callee signature.
//!
//! # Examples
//!
//! ```rust
//! use cilproxy::assembly::ILEmitter;
//!
//! let mut emitter = ILEmitter::new();
//! emitter.push_arg(1)?;
//! emitter.push_int(2)?;
//! emitter.pop()?;
//! emitter.ret()?;
//!
//! let body = emitter.finish()?;
//! assert_eq!(body.code, vec![0x03, 0x18, 0x26, 0x2A]);
//! assert_eq!(body.max_stack, 2);
//! # Ok::<(), cilproxy::Error>(())
//! ```

use crate::{
    assembly::{InstructionEncoder, Operand},
    metadata::{
        method::{Method, MethodBody, MethodRc},
        tables::{FieldRc, MethodSpecRc},
        token::Token,
        typesystem::{CilTypeRc, CilTypeRef},
    },
    Result,
};

/// A local variable slot declared with [`ILEmitter::declare_local`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Local {
    index: u16,
}

impl Local {
    /// Slot index
    #[must_use]
    pub fn index(&self) -> u16 {
        self.index
    }
}

/// Builds one method body from stack-machine primitives.
#[derive(Default)]
pub struct ILEmitter {
    encoder: InstructionEncoder,
    locals: Vec<CilTypeRef>,
}

impl ILEmitter {
    /// Create an emitter for an empty body
    #[must_use]
    pub fn new() -> Self {
        ILEmitter {
            encoder: InstructionEncoder::new(),
            locals: Vec::new(),
        }
    }

    /// Load the receiver, `ldarg.0`
    ///
    /// # Errors
    /// Propagates encoder errors.
    pub fn push_this(&mut self) -> Result<()> {
        self.encoder.emit_ldarg(0)
    }

    /// Load argument `index`, 0 being the receiver of instance methods
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for a negative or too large index.
    pub fn push_arg(&mut self, index: i32) -> Result<()> {
        let index = u16::try_from(index)
            .map_err(|_| malformed_error!("Argument index {} is out of range", index))?;
        self.encoder.emit_ldarg(index)
    }

    /// Load an instance field of the receiver, `ldarg.0; ldfld`
    ///
    /// # Errors
    /// Propagates encoder errors.
    pub fn push_field(&mut self, field: &FieldRc) -> Result<()> {
        self.push_this()?;
        self.encoder
            .emit_instruction("ldfld", Some(Operand::Token(field.token)))
    }

    /// Store into an instance field, expecting the object and the value on the stack
    ///
    /// # Errors
    /// Returns [`crate::Error::StackUnderflow`] if either is missing.
    pub fn store_field(&mut self, field: &FieldRc) -> Result<()> {
        self.encoder
            .emit_instruction("stfld", Some(Operand::Token(field.token)))
    }

    /// Declare a local variable of type `ty`
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the local slots are exhausted.
    pub fn declare_local(&mut self, ty: &CilTypeRc) -> Result<Local> {
        let index = u16::try_from(self.locals.len())
            .map_err(|_| malformed_error!("Too many locals in method body"))?;
        self.locals.push(CilTypeRef::new(ty));
        Ok(Local { index })
    }

    /// Load a local
    ///
    /// # Errors
    /// Propagates encoder errors.
    pub fn push_local(&mut self, local: Local) -> Result<()> {
        self.encoder.emit_ldloc(local.index)
    }

    /// Store the top of the stack into a local
    ///
    /// # Errors
    /// Returns [`crate::Error::StackUnderflow`] on an empty stack.
    pub fn store_local(&mut self, local: Local) -> Result<()> {
        self.encoder.emit_stloc(local.index)
    }

    /// Load a 32-bit integer constant in its shortest encoding
    ///
    /// # Errors
    /// Propagates encoder errors.
    pub fn push_int(&mut self, value: i32) -> Result<()> {
        self.encoder.emit_ldc_i4(value)
    }

    /// Allocate a zero-based array of `element` with `len` elements
    ///
    /// # Errors
    /// Propagates encoder errors.
    pub fn new_array(&mut self, element: &CilTypeRc, len: i32) -> Result<()> {
        self.push_int(len)?;
        self.encoder
            .emit_instruction("newarr", Some(Operand::Token(element.token)))
    }

    /// Duplicate the top of the stack
    ///
    /// # Errors
    /// Returns [`crate::Error::StackUnderflow`] on an empty stack.
    pub fn dup(&mut self) -> Result<()> {
        self.encoder.emit_instruction("dup", None)
    }

    /// Discard the top of the stack
    ///
    /// # Errors
    /// Returns [`crate::Error::StackUnderflow`] on an empty stack.
    pub fn pop(&mut self) -> Result<()> {
        self.encoder.emit_instruction("pop", None)
    }

    /// Box the top of the stack if `ty` is a value type or a generic parameter.
    /// Reference types are left as they are.
    ///
    /// # Errors
    /// Returns [`crate::Error::StackUnderflow`] on an empty stack.
    pub fn box_if_needed(&mut self, ty: &CilTypeRc) -> Result<()> {
        if ty.is_value_type() || ty.is_generic_parameter() {
            self.encoder
                .emit_instruction("box", Some(Operand::Token(ty.token)))?;
        }
        Ok(())
    }

    /// Convert the object on the stack to `ty`, unboxing value types
    ///
    /// # Errors
    /// Returns [`crate::Error::StackUnderflow`] on an empty stack.
    pub fn unbox_any(&mut self, ty: &CilTypeRc) -> Result<()> {
        self.encoder
            .emit_instruction("unbox.any", Some(Operand::Token(ty.token)))
    }

    /// Cast the reference on the stack to `ty`
    ///
    /// # Errors
    /// Returns [`crate::Error::StackUnderflow`] on an empty stack.
    pub fn castclass(&mut self, ty: &CilTypeRc) -> Result<()> {
        self.encoder
            .emit_instruction("castclass", Some(Operand::Token(ty.token)))
    }

    /// Store a reference into an array element, expecting array, index and value
    ///
    /// # Errors
    /// Returns [`crate::Error::StackUnderflow`] if the three operands are missing.
    pub fn stelem_ref(&mut self) -> Result<()> {
        self.encoder.emit_instruction("stelem.ref", None)
    }

    /// Non-virtual call
    ///
    /// # Errors
    /// Returns [`crate::Error::StackUnderflow`] if the arguments are missing.
    pub fn call(&mut self, method: &MethodRc) -> Result<()> {
        self.emit_call("call", method.token, method)
    }

    /// Virtual or interface call
    ///
    /// # Errors
    /// Returns [`crate::Error::StackUnderflow`] if the receiver or arguments are missing.
    pub fn callvirt(&mut self, method: &MethodRc) -> Result<()> {
        self.emit_call("callvirt", method.token, method)
    }

    /// Non-virtual call of a generic method instantiation
    ///
    /// # Errors
    /// Returns [`crate::Error::StackUnderflow`] if the arguments are missing.
    pub fn call_spec(&mut self, spec: &MethodSpecRc) -> Result<()> {
        self.emit_call("call", spec.token, &spec.method)
    }

    /// Virtual call of a generic method instantiation
    ///
    /// # Errors
    /// Returns [`crate::Error::StackUnderflow`] if the receiver or arguments are missing.
    pub fn callvirt_spec(&mut self, spec: &MethodSpecRc) -> Result<()> {
        self.emit_call("callvirt", spec.token, &spec.method)
    }

    /// Allocate an object and run `constructor` on it
    ///
    /// # Errors
    /// Returns [`crate::Error::StackUnderflow`] if the constructor arguments are missing.
    pub fn new_object(&mut self, constructor: &MethodRc) -> Result<()> {
        let args = Self::arg_count(constructor.param_count())?;
        self.encoder.emit_call(
            "newobj",
            Some(Operand::Token(constructor.token)),
            args,
            true,
        )
    }

    /// Load the runtime handle of a method
    ///
    /// # Errors
    /// Propagates encoder errors.
    pub fn ldtoken(&mut self, method: &MethodRc) -> Result<()> {
        self.encoder
            .emit_instruction("ldtoken", Some(Operand::Token(method.token)))
    }

    /// Load the runtime handle of a generic method instantiation
    ///
    /// # Errors
    /// Propagates encoder errors.
    pub fn ldtoken_spec(&mut self, spec: &MethodSpecRc) -> Result<()> {
        self.encoder
            .emit_instruction("ldtoken", Some(Operand::Token(spec.token)))
    }

    /// Return, with the value on the stack if there is one
    ///
    /// # Errors
    /// Propagates encoder errors.
    pub fn ret(&mut self) -> Result<()> {
        let has_result = self.encoder.current_stack_depth() > 0;
        self.encoder.emit_ret(has_result)
    }

    /// Current evaluation stack depth
    #[must_use]
    pub fn stack_depth(&self) -> usize {
        self.encoder.current_stack_depth()
    }

    /// Finish the body
    ///
    /// # Errors
    /// Returns an error if a label is unresolved.
    pub fn finish(self) -> Result<MethodBody> {
        let (code, max_stack) = self.encoder.finalize()?;
        Ok(MethodBody::new(code, max_stack, self.locals))
    }

    fn emit_call(&mut self, mnemonic: &str, token: Token, method: &Method) -> Result<()> {
        let receiver = usize::from(!method.is_static());
        let args = Self::arg_count(method.param_count() + receiver)?;
        self.encoder.emit_call(
            mnemonic,
            Some(Operand::Token(token)),
            args,
            !method.returns_void(),
        )
    }

    fn arg_count(count: usize) -> Result<u8> {
        u8::try_from(count).map_err(|_| malformed_error!("Call with {} arguments", count))
    }
}
