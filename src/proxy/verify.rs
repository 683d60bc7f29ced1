//! Loadability checks run on a type before it is registered.
//!
//! A type that passes these checks can be instantiated and every member reachable
//! through its interfaces can be executed by [`crate::emulation::Runtime`]. The
//! checks are structural (member coverage, overrides, generic arity) plus an
//! optional abstract interpretation of every body that tracks the evaluation
//! stack depth along all control flow paths.

use std::collections::HashMap;

use crate::{
    assembly::{FlowType, Instruction},
    metadata::{
        method::{MethodBody, MethodRc},
        tables::FieldRc,
        token::{TableId, Token},
        typesystem::{CilTypeRc, TypeRegistry},
    },
    Result,
};

/// Run every check on `ty`.
///
/// `backing_field` may only be written by constructors. With `verify_bodies` unset,
/// bodies are still decoded and scanned for backing-field writes but the stack is
/// not simulated.
pub(crate) fn verify_type(
    registry: &TypeRegistry,
    ty: &CilTypeRc,
    backing_field: Option<&FieldRc>,
    verify_bodies: bool,
) -> Result<()> {
    let name = ty.fullname();

    check_interface_coverage(ty, &name)?;
    if ty.is_sealed() {
        check_no_abstract_left(ty, &name)?;
    }
    check_overrides(ty, &name)?;

    for (_, method) in ty.methods.iter() {
        if method.is_abstract() {
            continue;
        }
        if method.implementation().is_none() {
            return Err(finalization_error!(
                name,
                "method '{}' has no implementation",
                method.name
            ));
        }

        let Some(body) = method.body() else {
            continue;
        };
        let instructions = body.instructions().map_err(|error| {
            finalization_error!(name, "body of '{}' does not decode: {}", method.name, error)
        })?;

        if let Some(field) = backing_field {
            if !method.is_constructor() && writes_field(instructions, field.token) {
                return Err(finalization_error!(
                    name,
                    "method '{}' writes the backing field '{}' outside a constructor",
                    method.name,
                    field.name
                ));
            }
        }

        let verifier = BodyVerifier {
            registry,
            ty,
            method,
            name: &name,
        };
        verifier.check_method_specs(instructions)?;
        if verify_bodies {
            verifier.simulate(&body, instructions)?;
        }
    }

    Ok(())
}

fn check_interface_coverage(ty: &CilTypeRc, name: &str) -> Result<()> {
    let mut seen = Vec::new();
    for iface in ty.all_interfaces() {
        if seen.contains(&iface.token) {
            continue;
        }
        seen.push(iface.token);

        if !iface.is_interface() {
            return Err(finalization_error!(
                name,
                "'{}' is declared as an interface but is not one",
                iface.fullname()
            ));
        }

        for (_, declaration) in iface.member_owner().methods.iter() {
            if declaration.is_static() {
                continue;
            }
            if ty.resolve_method(declaration).is_none() {
                return Err(finalization_error!(
                    name,
                    "interface member '{}::{}' is not implemented",
                    iface.fullname(),
                    declaration.name
                ));
            }
        }
    }

    Ok(())
}

fn check_no_abstract_left(ty: &CilTypeRc, name: &str) -> Result<()> {
    if let Some((_, method)) = ty.methods.iter().find(|(_, m)| m.is_abstract()) {
        return Err(finalization_error!(
            name,
            "sealed type declares abstract method '{}'",
            method.name
        ));
    }

    let mut current = ty.base();
    while let Some(base) = current {
        let owner = base.member_owner();
        for (_, method) in owner.methods.iter() {
            if method.is_abstract() && ty.resolve_method(method).is_none() {
                return Err(finalization_error!(
                    name,
                    "abstract method '{}' of '{}' is not overridden",
                    method.name,
                    base.fullname()
                ));
            }
        }
        current = base.base();
    }

    Ok(())
}

fn check_overrides(ty: &CilTypeRc, name: &str) -> Result<()> {
    for (_, entry) in ty.method_impls.iter() {
        let declared_here = entry
            .body
            .declaring_type()
            .is_some_and(|declaring| declaring.token == ty.token);
        if !declared_here {
            return Err(finalization_error!(
                name,
                "override body '{}' is not declared on the type",
                entry.body.name
            ));
        }

        let (body_arity, declaration_arity) = (
            entry.body.generic_params.count(),
            entry.declaration.generic_params.count(),
        );
        if body_arity != declaration_arity {
            return Err(finalization_error!(
                name,
                "'{}' declares {} generic parameter(s) but overrides '{}' with {}",
                entry.body.name,
                body_arity,
                entry.declaration.fullname(),
                declaration_arity
            ));
        }

        if entry.body.param_count() != entry.declaration.param_count() {
            return Err(finalization_error!(
                name,
                "'{}' takes {} parameter(s) but overrides '{}' with {}",
                entry.body.name,
                entry.body.param_count(),
                entry.declaration.fullname(),
                entry.declaration.param_count()
            ));
        }
    }

    Ok(())
}

fn writes_field(instructions: &[Instruction], field: Token) -> bool {
    instructions
        .iter()
        .any(|instr| instr.mnemonic == "stfld" && instr.get_token_operand() == Some(field))
}

struct BodyVerifier<'a> {
    registry: &'a TypeRegistry,
    ty: &'a CilTypeRc,
    method: &'a MethodRc,
    name: &'a str,
}

impl BodyVerifier<'_> {
    fn check_method_specs(&self, instructions: &[Instruction]) -> Result<()> {
        for instr in instructions {
            let Some(token) = instr.get_token_operand() else {
                continue;
            };
            if !token.is_table(TableId::MethodSpec) {
                continue;
            }

            let spec = self.registry.get_method_spec(&token).map_err(|_| {
                self.error(instr, format!("unknown method instantiation {token}"))
            })?;
            let (arity, supplied) = (spec.method.generic_params.count(), spec.arguments().len());
            if arity != supplied {
                return Err(self.error(
                    instr,
                    format!(
                        "'{}' expects {} generic argument(s), {} supplied",
                        spec.method.name, arity, supplied
                    ),
                ));
            }
        }

        Ok(())
    }

    /// Worklist simulation of the stack depth at every reachable instruction.
    fn simulate(&self, body: &MethodBody, instructions: &[Instruction]) -> Result<()> {
        if instructions.is_empty() {
            return Err(finalization_error!(
                self.name,
                "body of '{}' is empty",
                self.method.name
            ));
        }

        let by_offset: HashMap<u64, usize> = instructions
            .iter()
            .enumerate()
            .map(|(index, instr)| (instr.offset, index))
            .collect();
        let mut depth_at: Vec<Option<usize>> = vec![None; instructions.len()];
        let mut worklist = vec![(0usize, 0usize)];

        while let Some((index, depth)) = worklist.pop() {
            match depth_at[index] {
                Some(known) if known == depth => continue,
                Some(known) => {
                    return Err(self.error(
                        &instructions[index],
                        format!("stack depth {depth} does not match {known} on another path"),
                    ))
                }
                None => depth_at[index] = Some(depth),
            }

            let instr = &instructions[index];
            let (pops, pushes) = self.stack_effect(instr)?;
            let after = depth.checked_sub(pops).ok_or_else(|| {
                self.error(instr, format!("pops {pops} value(s) from a stack of {depth}"))
            })? + pushes;
            if after > body.max_stack {
                return Err(self.error(
                    instr,
                    format!("stack depth {after} exceeds max stack {}", body.max_stack),
                ));
            }

            if instr.flow_type == FlowType::Return {
                if after != 0 {
                    return Err(self.error(instr, format!("returns with {after} value(s) left")));
                }
                continue;
            }

            for target in &instr.branch_targets {
                let target = by_offset.get(target).copied().ok_or_else(|| {
                    self.error(instr, format!("branches to IL_{target:04x}, not an instruction"))
                })?;
                worklist.push((target, after));
            }

            if instr.flow_type != FlowType::UnconditionalBranch {
                if index + 1 >= instructions.len() {
                    return Err(self.error(instr, "falls off the end of the body".to_string()));
                }
                worklist.push((index + 1, after));
            }
        }

        Ok(())
    }

    fn stack_effect(&self, instr: &Instruction) -> Result<(usize, usize)> {
        let fixed = (
            usize::from(instr.stack_behavior.pops),
            usize::from(instr.stack_behavior.pushes),
        );

        match instr.mnemonic {
            "call" | "callvirt" => {
                let callee = self.callee(instr)?;
                let receiver = usize::from(!callee.is_static());
                Ok((
                    callee.param_count() + receiver,
                    usize::from(!callee.returns_void()),
                ))
            }
            "newobj" => {
                let ctor = self.callee(instr)?;
                if !ctor.is_constructor() {
                    return Err(self.error(instr, format!("'{}' is not a constructor", ctor.name)));
                }
                Ok((ctor.param_count(), 1))
            }
            "ret" => Ok((usize::from(!self.method.returns_void()), 0)),
            "ldfld" | "stfld" => {
                self.field(instr)?;
                Ok(fixed)
            }
            "ldtoken" => {
                let token = self.token(instr)?;
                if token.is_table(TableId::MethodDef) || token.is_table(TableId::MethodSpec) {
                    self.callee(instr)?;
                } else {
                    self.type_token(instr, token)?;
                }
                Ok(fixed)
            }
            "newarr" | "box" | "unbox.any" | "castclass" | "isinst" => {
                self.type_token(instr, self.token(instr)?)?;
                Ok(fixed)
            }
            _ => Ok(fixed),
        }
    }

    fn token(&self, instr: &Instruction) -> Result<Token> {
        instr
            .get_token_operand()
            .ok_or_else(|| self.error(instr, "missing token operand".to_string()))
    }

    fn callee(&self, instr: &Instruction) -> Result<MethodRc> {
        let token = self.token(instr)?;
        if token.is_table(TableId::MethodSpec) {
            return self
                .registry
                .get_method_spec(&token)
                .map(|spec| spec.method.clone())
                .map_err(|_| self.error(instr, format!("unresolved method {token}")));
        }

        self.ty
            .methods
            .iter()
            .map(|(_, method)| method)
            .find(|method| method.token == token)
            .cloned()
            .map_or_else(|| self.registry.get_method(&token), Ok)
            .map_err(|_| self.error(instr, format!("unresolved method {token}")))
    }

    fn field(&self, instr: &Instruction) -> Result<FieldRc> {
        let token = self.token(instr)?;
        self.ty
            .fields
            .iter()
            .map(|(_, field)| field)
            .find(|field| field.token == token)
            .cloned()
            .map_or_else(|| self.registry.get_field(&token), Ok)
            .map_err(|_| self.error(instr, format!("unresolved field {token}")))
    }

    fn type_token(&self, instr: &Instruction, token: Token) -> Result<()> {
        if token == self.ty.token || self.registry.get(&token).is_some() {
            Ok(())
        } else {
            Err(self.error(instr, format!("unresolved type {token}")))
        }
    }

    fn error(&self, instr: &Instruction, reason: String) -> crate::Error {
        finalization_error!(
            self.name,
            "'{}' at IL_{:04x} ({}): {}",
            self.method.name,
            instr.offset,
            instr.mnemonic,
            reason
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        assembly::{ILEmitter, InstructionEncoder, Operand},
        metadata::{
            builders::{ClassBuilder, InterfaceBuilder, MethodBuilder},
            method::{Method, MethodImplementation},
            typesystem::{CilFlavor, CilType, TypeAttributes},
        },
        Error,
    };

    fn sealed(registry: &TypeRegistry, name: &str) -> Result<CilTypeRc> {
        let ty = Arc::new(CilType::new(
            registry.alloc_token(TableId::TypeDef),
            CilFlavor::Class,
            "Verify".to_string(),
            name.to_string(),
            TypeAttributes::PUBLIC | TypeAttributes::SEALED,
        ));
        ty.set_base(&registry.wellknown("System.Object")?)?;
        Ok(ty)
    }

    fn add_method(registry: &TypeRegistry, ty: &CilTypeRc, name: &str, ret: &CilTypeRc, body: MethodBody) -> Result<MethodRc> {
        let method = Arc::new(Method::new(
            registry.alloc_token(TableId::MethodDef),
            name,
            0x0006 | 0x0040 | 0x0100,
            ret,
        ));
        method.set_declaring_type(ty)?;
        method.set_implementation(MethodImplementation::Il(Arc::new(body)))?;
        ty.methods.push(method.clone());
        Ok(method)
    }

    #[test]
    fn test_valid_body_passes() -> Result<()> {
        let registry = TypeRegistry::new()?;
        let int32 = registry.wellknown("System.Int32")?;
        let ty = sealed(&registry, "Answer")?;

        let mut il = ILEmitter::new();
        il.push_int(42)?;
        il.ret()?;
        add_method(&registry, &ty, "Get", &int32, il.finish()?)?;

        verify_type(&registry, &ty, None, true)
    }

    #[test]
    fn test_ret_with_leftover_value_fails() -> Result<()> {
        let registry = TypeRegistry::new()?;
        let void = registry.wellknown("System.Void")?;
        let ty = sealed(&registry, "Leftover")?;

        let mut il = ILEmitter::new();
        il.push_int(1)?;
        il.push_int(2)?;
        il.pop()?;
        il.ret()?;
        add_method(&registry, &ty, "Run", &void, il.finish()?)?;

        let error = verify_type(&registry, &ty, None, true).unwrap_err();
        assert!(error.to_string().contains("left"));

        // without body verification only the structural checks run
        verify_type(&registry, &ty, None, false)
    }

    #[test]
    fn test_fall_off_end_fails() -> Result<()> {
        let registry = TypeRegistry::new()?;
        let void = registry.wellknown("System.Void")?;
        let ty = sealed(&registry, "Runaway")?;

        let mut encoder = InstructionEncoder::new();
        encoder.emit_instruction("nop", None)?;
        let (code, max_stack) = encoder.finalize()?;
        add_method(&registry, &ty, "Run", &void, MethodBody::new(code, max_stack, Vec::new()))?;

        let error = verify_type(&registry, &ty, None, true).unwrap_err();
        assert!(error.to_string().contains("falls off"));
        Ok(())
    }

    #[test]
    fn test_unresolved_call_fails() -> Result<()> {
        let registry = TypeRegistry::new()?;
        let void = registry.wellknown("System.Void")?;
        let ty = sealed(&registry, "Dangling")?;

        let mut encoder = InstructionEncoder::new();
        encoder.emit_call("call", Some(Operand::Token(Token::new(0x0600_ffff))), 0, false)?;
        encoder.emit_ret(false)?;
        let (code, max_stack) = encoder.finalize()?;
        add_method(&registry, &ty, "Run", &void, MethodBody::new(code, max_stack, Vec::new()))?;

        assert!(matches!(
            verify_type(&registry, &ty, None, true),
            Err(Error::Finalization { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_sealed_subclass_must_override_abstract() -> Result<()> {
        let registry = TypeRegistry::new()?;
        let int32 = registry.wellknown("System.Int32")?;
        let base = ClassBuilder::new("Verify", "Shape")
            .abstract_type()
            .method(MethodBuilder::new("Area").returns(&int32).make_abstract())
            .build(&registry)?;

        let ty = Arc::new(CilType::new(
            registry.alloc_token(TableId::TypeDef),
            CilFlavor::Class,
            "Verify".to_string(),
            "Square".to_string(),
            TypeAttributes::PUBLIC | TypeAttributes::SEALED,
        ));
        ty.set_base(&base)?;

        let error = verify_type(&registry, &ty, None, true).unwrap_err();
        assert!(error.to_string().contains("Area"));

        let mut il = ILEmitter::new();
        il.push_int(4)?;
        il.ret()?;
        add_method(&registry, &ty, "Area", &int32, il.finish()?)?;
        verify_type(&registry, &ty, None, true)
    }

    #[test]
    fn test_non_interface_in_interface_list_fails() -> Result<()> {
        let registry = TypeRegistry::new()?;
        let class = ClassBuilder::new("Verify", "NotAnInterface").build(&registry)?;
        let ty = sealed(&registry, "Confused")?;
        ty.interfaces.push(crate::metadata::typesystem::CilTypeRef::new(&class));

        assert!(verify_type(&registry, &ty, None, false).is_err());

        let empty = InterfaceBuilder::new("Verify", "IEmpty").build(&registry)?;
        let ok = sealed(&registry, "Fine")?;
        ok.interfaces.push(crate::metadata::typesystem::CilTypeRef::new(&empty));
        verify_type(&registry, &ok, None, true)
    }
}
