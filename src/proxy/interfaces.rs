//! Interface closure resolution.
//!
//! A proxy implements its primary interface plus every other interface the backing
//! type exposes. [`interfaces`] walks those lazily, in the order the runtime reports
//! them: the declared interfaces of the root and then of each base type, each followed
//! depth-first by the interfaces it inherits. Excluded, invisible and already reported
//! interfaces are skipped.
//!
//! # Examples
//!
//! ```rust
//! use cilproxy::{
//!     metadata::{builders::{ClassBuilder, InterfaceBuilder}, typesystem::TypeRegistry},
//!     proxy::interfaces::interfaces,
//! };
//!
//! let registry = TypeRegistry::new()?;
//! let a = InterfaceBuilder::new("Demo", "IA").build(&registry)?;
//! let b = InterfaceBuilder::new("Demo", "IB").extends(&a).build(&registry)?;
//! let host = ClassBuilder::new("Demo", "Host").implements(&b).build(&registry)?;
//!
//! let names: Vec<String> = interfaces(&host, &[b.clone()]).map(|i| i.fullname()).collect();
//! assert_eq!(names, vec!["Demo.IA"]);
//! # Ok::<(), cilproxy::Error>(())
//! ```

use std::collections::HashSet;

use crate::metadata::{token::Token, typesystem::CilTypeRc};

/// Lazy, order-preserving iterator over the interfaces of a type.
///
/// Created by [`interfaces`].
pub struct InterfaceClosure {
    /// Candidates still to visit, next on top
    pending: Vec<CilTypeRc>,
    /// Next base type whose declared interfaces are visited once `pending` drains
    next_base: Option<CilTypeRc>,
    visited: HashSet<Token>,
    except: HashSet<Token>,
    root_is_open: bool,
}

impl InterfaceClosure {
    fn push_all(&mut self, interfaces: Vec<CilTypeRc>) {
        self.pending.extend(interfaces.into_iter().rev());
    }

    fn is_excluded(&self, candidate: &CilTypeRc) -> bool {
        if self.except.contains(&candidate.token) || !candidate.is_visible() {
            return true;
        }

        // An open instantiation stands for its definition when the root is open too
        self.root_is_open
            && candidate.contains_generic_parameters()
            && candidate
                .generic_definition()
                .is_some_and(|definition| self.except.contains(&definition.token))
    }
}

impl Iterator for InterfaceClosure {
    type Item = CilTypeRc;

    fn next(&mut self) -> Option<CilTypeRc> {
        loop {
            let Some(candidate) = self.pending.pop() else {
                let base = self.next_base.take()?;
                self.next_base = base.base();
                self.push_all(base.declared_interfaces());
                continue;
            };

            if !self.visited.insert(candidate.token) {
                continue;
            }

            self.push_all(candidate.declared_interfaces());
            if !self.is_excluded(&candidate) {
                return Some(candidate);
            }
        }
    }
}

/// The interfaces implemented by `root`, except those in `except`.
///
/// Interfaces that are not [visible](is_visible) are silently skipped, and each
/// interface is reported once. When `root` [contains generic
/// parameters](contains_generic_parameters), an open instantiation whose generic
/// definition is in `except` is skipped as well.
#[must_use]
pub fn interfaces(root: &CilTypeRc, except: &[CilTypeRc]) -> InterfaceClosure {
    let mut closure = InterfaceClosure {
        pending: Vec::new(),
        next_base: root.base(),
        visited: HashSet::new(),
        except: except.iter().map(|iface| iface.token).collect(),
        root_is_open: root.contains_generic_parameters(),
    };
    closure.push_all(root.declared_interfaces());
    closure
}

/// True if `ty` is reachable from outside its defining module, see
/// [`crate::metadata::typesystem::CilType::is_visible`]
#[must_use]
pub fn is_visible(ty: &CilTypeRc) -> bool {
    ty.is_visible()
}

/// True if `ty` is, or is constructed from, an unbound generic parameter
#[must_use]
pub fn contains_generic_parameters(ty: &CilTypeRc) -> bool {
    ty.contains_generic_parameters()
}

/// The interface set of a proxy: `primary` first, then every other interface of
/// `implementation`, without duplicates
#[must_use]
pub fn proxy_interface_set(primary: &CilTypeRc, implementation: &CilTypeRc) -> Vec<CilTypeRc> {
    let mut except = vec![primary.clone()];
    if let Some(definition) = primary.generic_definition() {
        except.push(definition);
    }

    let mut set = vec![primary.clone()];
    set.extend(interfaces(implementation, &except));
    set
}
