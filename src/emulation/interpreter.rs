//! Interpreter for emitted CIL bodies.
//!
//! Executes one method body per [`Interpreter::execute`] call. Calls, object creation
//! and reflection helpers go back through the [`Runtime`], so emitted code and host
//! closures can call each other freely.
//!
//! Each instruction produces a [`StepResult`] that the execution loop applies to the
//! instruction pointer. Branch targets are byte offsets and are mapped to instruction
//! indices before execution starts.

use std::{collections::HashMap, sync::RwLock};

use crate::{
    assembly::{opcodes, Immediate, Instruction, Operand},
    emulation::{
        runtime::type_args_for, EmValue, EvaluationStack, HeapObject, HeapObjectKind,
        Invocation, Runtime, RuntimeMethod,
    },
    metadata::{
        method::MethodBody,
        token::{TableId, Token},
        typesystem::CilTypeRc,
    },
    Error, Result,
};

/// Outcome of a single instruction.
#[derive(Debug)]
pub enum StepResult {
    /// Continue execution at the next sequential instruction.
    Continue,

    /// Branch to a specific byte offset within the current method.
    Branch {
        /// Target byte offset.
        target: u64,
    },

    /// Return from the current method.
    Return {
        /// Return value, if any.
        value: Option<EmValue>,
    },
}

/// Execution state of one body
struct Frame<'a> {
    invocation: &'a Invocation,
    /// Receiver (for instance methods) followed by the declared arguments
    args: Vec<EmValue>,
    locals: Vec<EmValue>,
    stack: EvaluationStack,
}

impl Frame<'_> {
    fn type_args(&self) -> &[CilTypeRc] {
        &self.invocation.method.type_args
    }

    fn method_args(&self) -> &[CilTypeRc] {
        &self.invocation.method.method_args
    }

    fn arg(&self, index: usize) -> Result<EmValue> {
        self.args.get(index).cloned().ok_or(Error::OutOfBounds)
    }

    fn set_arg(&mut self, index: usize, value: EmValue) -> Result<()> {
        let slot = self.args.get_mut(index).ok_or(Error::OutOfBounds)?;
        *slot = value;
        Ok(())
    }

    fn local(&self, index: usize) -> Result<EmValue> {
        self.locals.get(index).cloned().ok_or(Error::OutOfBounds)
    }

    fn set_local(&mut self, index: usize, value: EmValue) -> Result<()> {
        let slot = self.locals.get_mut(index).ok_or(Error::OutOfBounds)?;
        *slot = value;
        Ok(())
    }
}

/// Executes method bodies on behalf of a [`Runtime`].
pub struct Interpreter<'r> {
    runtime: &'r Runtime,
}

impl<'r> Interpreter<'r> {
    /// An interpreter that dispatches calls through `runtime`
    #[must_use]
    pub fn new(runtime: &'r Runtime) -> Self {
        Interpreter { runtime }
    }

    /// Execute `body` for `invocation` and return its result, [`EmValue::Void`] for
    /// void methods.
    ///
    /// # Errors
    /// - decoding errors of the body, [`Error::InvalidOpcode`] for unsupported opcodes
    /// - [`Error::StackUnderflow`] and stack overflow for invalid stack use
    /// - anything raised by called methods
    pub fn execute(&self, invocation: &Invocation, body: &MethodBody) -> Result<EmValue> {
        let instructions = body.instructions()?;
        let by_offset: HashMap<u64, usize> = instructions
            .iter()
            .enumerate()
            .map(|(index, instruction)| (instruction.offset, index))
            .collect();

        let mut frame = self.frame(invocation, body)?;
        let mut ip = 0;
        loop {
            let instruction = instructions.get(ip).ok_or_else(|| {
                malformed_error!(
                    "Execution of '{}' ran past the end of its body",
                    invocation.method.method.fullname()
                )
            })?;
            #[allow(clippy::cast_possible_truncation)]
            frame.stack.set_offset(instruction.offset as usize);

            match self.step(&mut frame, instruction)? {
                StepResult::Continue => ip += 1,
                StepResult::Branch { target } => {
                    ip = *by_offset.get(&target).ok_or_else(|| {
                        malformed_error!("Branch target 0x{:04x} is not an instruction", target)
                    })?;
                }
                StepResult::Return { value } => return Ok(value.unwrap_or(EmValue::Void)),
            }
        }
    }

    fn frame<'a>(&self, invocation: &'a Invocation, body: &MethodBody) -> Result<Frame<'a>> {
        let mut args = Vec::with_capacity(invocation.args.len() + 1);
        if let Some(this) = &invocation.this {
            args.push(this.clone());
        }
        args.extend(invocation.args.iter().cloned());

        let registry = self.runtime.registry();
        let mut locals = Vec::with_capacity(body.locals.len());
        for local in &body.locals {
            let ty = local.resolve()?;
            let ty = registry.substitute(
                &ty,
                &invocation.method.type_args,
                &invocation.method.method_args,
            )?;
            locals.push(EmValue::default_for(&ty));
        }

        Ok(Frame {
            invocation,
            args,
            locals,
            stack: EvaluationStack::new(body.max_stack),
        })
    }

    #[allow(clippy::too_many_lines)]
    fn step(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<StepResult> {
        if instruction.prefix == opcodes::FE_PREFIX {
            let index = immediate_index(instruction)?;
            match instruction.opcode {
                opcodes::FE_LDARG => frame.stack.push(frame.arg(index)?)?,
                opcodes::FE_STARG => {
                    let value = frame.stack.pop()?;
                    frame.set_arg(index, value)?;
                }
                opcodes::FE_LDLOC => frame.stack.push(frame.local(index)?)?,
                opcodes::FE_STLOC => {
                    let value = frame.stack.pop()?;
                    frame.set_local(index, value)?;
                }
                other => return Err(Error::InvalidOpcode(0xFE00 | u16::from(other))),
            }
            return Ok(StepResult::Continue);
        }

        match instruction.opcode {
            opcodes::NOP => {}
            opcodes::LDARG_0 | opcodes::LDARG_1 | opcodes::LDARG_2 | opcodes::LDARG_3 => {
                let index = usize::from(instruction.opcode - opcodes::LDARG_0);
                frame.stack.push(frame.arg(index)?)?;
            }
            opcodes::LDLOC_0 | opcodes::LDLOC_1 | opcodes::LDLOC_2 | opcodes::LDLOC_3 => {
                let index = usize::from(instruction.opcode - opcodes::LDLOC_0);
                frame.stack.push(frame.local(index)?)?;
            }
            opcodes::STLOC_0 | opcodes::STLOC_1 | opcodes::STLOC_2 | opcodes::STLOC_3 => {
                let index = usize::from(instruction.opcode - opcodes::STLOC_0);
                let value = frame.stack.pop()?;
                frame.set_local(index, value)?;
            }
            opcodes::LDARG_S => {
                let index = immediate_index(instruction)?;
                frame.stack.push(frame.arg(index)?)?;
            }
            opcodes::STARG_S => {
                let index = immediate_index(instruction)?;
                let value = frame.stack.pop()?;
                frame.set_arg(index, value)?;
            }
            opcodes::LDLOC_S => {
                let index = immediate_index(instruction)?;
                frame.stack.push(frame.local(index)?)?;
            }
            opcodes::STLOC_S => {
                let index = immediate_index(instruction)?;
                let value = frame.stack.pop()?;
                frame.set_local(index, value)?;
            }
            opcodes::LDNULL => frame.stack.push(EmValue::Null)?,
            opcodes::LDC_I4_M1..=opcodes::LDC_I4_8 => {
                let value = i32::from(instruction.opcode) - i32::from(opcodes::LDC_I4_0);
                frame.stack.push(EmValue::I32(value))?;
            }
            opcodes::LDC_I4_S | opcodes::LDC_I4 => {
                let value = immediate(instruction)?;
                let value = i32::try_from(value)
                    .map_err(|_| malformed_error!("ldc.i4 operand {} out of range", value))?;
                frame.stack.push(EmValue::I32(value))?;
            }
            opcodes::LDC_I8 => frame.stack.push(EmValue::I64(immediate(instruction)?))?,
            opcodes::LDC_R8 => match instruction.operand {
                Operand::Immediate(Immediate::Float64(value)) => {
                    frame.stack.push(EmValue::F64(value))?;
                }
                _ => return Err(malformed_error!("ldc.r8 without float operand")),
            },
            opcodes::DUP => frame.stack.dup()?,
            opcodes::POP => {
                frame.stack.pop()?;
            }
            opcodes::CALL => return self.call(frame, token(instruction)?, false),
            opcodes::CALLVIRT => return self.call(frame, token(instruction)?, true),
            opcodes::RET => {
                let method = &frame.invocation.method.method;
                let value = if method.returns_void() {
                    None
                } else {
                    Some(frame.stack.pop()?)
                };
                return Ok(StepResult::Return { value });
            }
            opcodes::BR_S | opcodes::BR => {
                return Ok(StepResult::Branch {
                    target: branch_target(instruction)?,
                });
            }
            opcodes::BRFALSE_S | opcodes::BRFALSE | opcodes::BRTRUE_S | opcodes::BRTRUE => {
                let condition = frame.stack.pop()?.is_true();
                let on_true = matches!(instruction.opcode, opcodes::BRTRUE_S | opcodes::BRTRUE);
                if condition == on_true {
                    return Ok(StepResult::Branch {
                        target: branch_target(instruction)?,
                    });
                }
            }
            opcodes::NEWOBJ => {
                let ctor = self.runtime.registry().get_method(&token(instruction)?)?;
                let declaring = ctor.declaring_type().ok_or_else(|| {
                    malformed_error!("Constructor {} has no declaring type", ctor.token)
                })?;
                let args = frame.stack.pop_n(ctor.param_count())?;
                let object = self.runtime.new_object_with(
                    &declaring,
                    &RuntimeMethod::new(ctor).with_type_args(declaring.generic_arguments()),
                    args,
                )?;
                frame.stack.push(object)?;
            }
            opcodes::CASTCLASS => {
                let ty = self.resolve_type(frame, token(instruction)?)?;
                let value = frame.stack.pop()?;
                frame.stack.push(self.runtime.cast(&value, &ty)?)?;
            }
            opcodes::ISINST => {
                let ty = self.resolve_type(frame, token(instruction)?)?;
                let value = frame.stack.pop()?;
                let result = if value.is_instance_of(&ty) {
                    value
                } else {
                    EmValue::Null
                };
                frame.stack.push(result)?;
            }
            opcodes::LDFLD => {
                let field = self.runtime.registry().get_field(&token(instruction)?)?;
                let object = frame.stack.pop_object_ref()?;
                frame.stack.push(object.get_field(field.token)?)?;
            }
            opcodes::STFLD => {
                let field = self.runtime.registry().get_field(&token(instruction)?)?;
                let value = frame.stack.pop()?;
                let object = frame.stack.pop_object_ref()?;
                object.set_field(field.token, value)?;
            }
            opcodes::BOX => {
                let ty = self.resolve_type(frame, token(instruction)?)?;
                let value = frame.stack.pop()?;
                frame.stack.push(self.runtime.box_value(value, &ty)?)?;
            }
            opcodes::UNBOX_ANY => {
                let ty = self.resolve_type(frame, token(instruction)?)?;
                let value = frame.stack.pop()?;
                frame.stack.push(self.runtime.unbox(&value, &ty)?)?;
            }
            opcodes::NEWARR => {
                let element = self.resolve_type(frame, token(instruction)?)?;
                let length =
                    usize::try_from(frame.stack.pop_i32()?).map_err(|_| Error::OutOfBounds)?;
                let array = HeapObject::new(
                    self.runtime.registry().make_array(&element)?,
                    HeapObjectKind::Array {
                        items: RwLock::new(vec![EmValue::default_for(&element); length]),
                        element,
                    },
                );
                frame.stack.push(EmValue::ObjectRef(array))?;
            }
            opcodes::LDLEN => {
                let array = frame.stack.pop_object_ref()?;
                let length = i32::try_from(array.array_len()?).map_err(|_| Error::OutOfBounds)?;
                frame.stack.push(EmValue::I32(length))?;
            }
            opcodes::LDELEM_REF => {
                let index = array_index(frame.stack.pop_i32()?)?;
                let array = frame.stack.pop_object_ref()?;
                frame.stack.push(array.array_get(index)?)?;
            }
            opcodes::STELEM_REF => {
                let value = frame.stack.pop()?;
                let index = array_index(frame.stack.pop_i32()?)?;
                let array = frame.stack.pop_object_ref()?;
                array.array_set(index, value)?;
            }
            opcodes::LDTOKEN => {
                let token = token(instruction)?;
                let handle = if token.is_table(TableId::MethodDef)
                    || token.is_table(TableId::MethodSpec)
                {
                    let receiver = frame
                        .invocation
                        .this
                        .as_ref()
                        .and_then(EmValue::as_object)
                        .map(|object| object.ty.clone());
                    EmValue::MethodHandle(self.runtime.resolve_method_handle(
                        token,
                        receiver.as_ref(),
                        frame.type_args(),
                        frame.method_args(),
                    )?)
                } else {
                    EmValue::TypeHandle(self.resolve_type(frame, token)?)
                };
                frame.stack.push(handle)?;
            }
            other => return Err(Error::InvalidOpcode(u16::from(other))),
        }

        Ok(StepResult::Continue)
    }

    /// `call` and `callvirt` against a `MethodDef` or `MethodSpec` token
    fn call(&self, frame: &mut Frame<'_>, token: Token, is_virtual: bool) -> Result<StepResult> {
        let registry = self.runtime.registry();
        let (method, method_args) = if token.is_table(TableId::MethodSpec) {
            let spec = registry.get_method_spec(&token)?;
            let mut closed = Vec::new();
            for arg in spec.arguments() {
                closed.push(registry.substitute(&arg, frame.type_args(), frame.method_args())?);
            }
            (spec.method.clone(), closed)
        } else {
            (registry.get_method(&token)?, Vec::new())
        };

        let args = frame.stack.pop_n(method.param_count())?;
        let result = if method.is_static() {
            self.runtime.invoke_method(
                &RuntimeMethod::new(method.clone()).with_method_args(method_args),
                None,
                args,
            )?
        } else {
            let this = frame.stack.pop()?;
            if is_virtual {
                self.runtime
                    .invoke_generic_virtual(&this, &method, &method_args, args)?
            } else {
                let type_args = match (this.as_object(), method.declaring_type()) {
                    (Some(object), Some(declaring)) => type_args_for(&object.ty, &declaring),
                    _ => Vec::new(),
                };
                self.runtime.invoke_method(
                    &RuntimeMethod::new(method.clone())
                        .with_type_args(type_args)
                        .with_method_args(method_args),
                    Some(this),
                    args,
                )?
            }
        };

        if !method.returns_void() {
            frame.stack.push(result)?;
        }
        Ok(StepResult::Continue)
    }

    /// Resolve a type token, substituting the frame's generic context
    fn resolve_type(&self, frame: &Frame<'_>, token: Token) -> Result<CilTypeRc> {
        let registry = self.runtime.registry();
        let ty = registry.resolve_type(&token)?;
        registry.substitute(&ty, frame.type_args(), frame.method_args())
    }
}

fn token(instruction: &Instruction) -> Result<Token> {
    instruction
        .get_token_operand()
        .ok_or_else(|| malformed_error!("'{}' without token operand", instruction.mnemonic))
}

fn immediate(instruction: &Instruction) -> Result<i64> {
    instruction
        .operand
        .immediate()
        .ok_or_else(|| malformed_error!("'{}' without immediate operand", instruction.mnemonic))
}

fn immediate_index(instruction: &Instruction) -> Result<usize> {
    usize::try_from(immediate(instruction)?).map_err(|_| Error::OutOfBounds)
}

fn array_index(index: i32) -> Result<usize> {
    usize::try_from(index).map_err(|_| Error::OutOfBounds)
}

fn branch_target(instruction: &Instruction) -> Result<u64> {
    instruction
        .branch_targets
        .first()
        .copied()
        .ok_or_else(|| malformed_error!("Branch at 0x{:04x} has no target", instruction.offset))
}
