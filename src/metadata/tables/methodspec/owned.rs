use std::sync::Arc;

use crate::metadata::{
    method::MethodRc,
    token::Token,
    typesystem::{CilTypeRc, CilTypeRef, CilTypeRefList},
};

/// An instantiation of a generic method, §II.22.29.
///
/// Created and interned by
/// [`crate::metadata::typesystem::TypeRegistry::make_method_spec`], which checks
/// arity and constraints.
pub struct MethodSpec {
    /// Token
    pub token: Token,
    /// The generic method being instantiated
    pub method: MethodRc,
    /// The generic arguments, in parameter order
    pub instantiation: CilTypeRefList,
}

impl MethodSpec {
    pub(crate) fn new(token: Token, method: MethodRc, args: &[CilTypeRc]) -> Self {
        let instantiation = Arc::new(boxcar::Vec::new());
        for arg in args {
            instantiation.push(CilTypeRef::new(arg));
        }

        MethodSpec {
            token,
            method,
            instantiation,
        }
    }

    /// The generic arguments as strong handles
    #[must_use]
    pub fn arguments(&self) -> Vec<CilTypeRc> {
        self.instantiation
            .iter()
            .filter_map(|(_, arg)| arg.upgrade())
            .collect()
    }

    /// True if any argument is still an unbound generic parameter
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.arguments()
            .iter()
            .any(|arg| arg.contains_generic_parameters())
    }
}

impl std::fmt::Debug for MethodSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let args: Vec<String> = self.arguments().iter().map(|arg| arg.fullname()).collect();
        f.debug_struct("MethodSpec")
            .field("token", &self.token)
            .field("method", &self.method.fullname())
            .field("instantiation", &args)
            .finish()
    }
}
