//! Member extraction and naming.
//!
//! [`extract`] lists, per interface of a proxy's interface set, the properties and the
//! remaining methods that need a body. Property accessors are claimed by their
//! property, so they are emitted once, as part of the property. Members of additional
//! interfaces whose name is already taken by another interface are qualified with the
//! owning interface's full name and emitted as private explicit implementations.

use std::collections::{HashMap, HashSet};

use crate::metadata::{
    method::MethodRc,
    tables::{ParamRc, PropertyRc},
    token::Token,
    typesystem::CilTypeRc,
};

/// The name a member is emitted under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmissionName {
    /// Emitted name
    pub name: String,
    /// True for qualified, private explicit implementations
    pub explicit: bool,
}

impl EmissionName {
    fn plain(name: &str) -> Self {
        EmissionName {
            name: name.to_string(),
            explicit: false,
        }
    }

    fn qualified(interface: &CilTypeRc, name: &str) -> Self {
        EmissionName {
            name: format!("{}.{}", interface.fullname(), name),
            explicit: true,
        }
    }
}

/// A method to implement
#[derive(Debug, Clone)]
pub struct MethodDescriptor {
    /// The interface method
    pub method: MethodRc,
    /// Emission name
    pub name: EmissionName,
}

/// A property to implement, with the accessors it claims
#[derive(Debug, Clone)]
pub struct PropertyDescriptor {
    /// The interface property
    pub property: PropertyRc,
    /// The getter, if declared
    pub getter: Option<MethodRc>,
    /// The setter, if declared
    pub setter: Option<MethodRc>,
    /// Emission name of the property, which its accessors follow
    pub name: EmissionName,
}

impl PropertyDescriptor {
    /// True if the property has at least one accessor
    #[must_use]
    pub fn is_fully_defined(&self) -> bool {
        self.getter.is_some() || self.setter.is_some()
    }

    /// Emission name of one of this property's accessors
    #[must_use]
    pub fn accessor_name(&self, interface: &CilTypeRc, accessor: &MethodRc) -> EmissionName {
        if self.name.explicit {
            EmissionName::qualified(interface, &accessor.name)
        } else {
            EmissionName::plain(&accessor.name)
        }
    }
}

/// The members of one interface of the proxy's interface set
#[derive(Debug, Clone)]
pub struct InterfaceMembers {
    /// The interface, as implemented by the proxy
    pub interface: CilTypeRc,
    /// True for the primary interface
    pub is_primary: bool,
    /// Properties with at least one accessor
    pub properties: Vec<PropertyDescriptor>,
    /// Methods that are not property accessors
    pub methods: Vec<MethodDescriptor>,
}

impl InterfaceMembers {
    /// Number of bodies this interface contributes
    #[must_use]
    pub fn body_count(&self) -> usize {
        self.methods.len()
            + self
                .properties
                .iter()
                .map(|p| usize::from(p.getter.is_some()) + usize::from(p.setter.is_some()))
                .sum::<usize>()
    }
}

/// Tracks emitted names and the interface that emitted them first
#[derive(Default)]
struct NameTable {
    owners: HashMap<String, Token>,
}

impl NameTable {
    fn assign(&mut self, interface: &CilTypeRc, is_primary: bool, name: &str) -> EmissionName {
        let collides = self
            .owners
            .get(name)
            .is_some_and(|owner| *owner != interface.token);

        if collides && !is_primary {
            return EmissionName::qualified(interface, name);
        }

        self.owners.entry(name.to_string()).or_insert(interface.token);
        EmissionName::plain(name)
    }

    fn reserve(&mut self, interface: &CilTypeRc, name: &str) {
        self.owners.entry(name.to_string()).or_insert(interface.token);
    }
}

/// Extract the members of `primary` and `additional`, the primary interface first.
///
/// Interfaces sharing a generic definition with an interface already extracted share
/// its member rows and are not extracted again.
#[must_use]
pub fn extract(primary: &CilTypeRc, additional: &[CilTypeRc]) -> Vec<InterfaceMembers> {
    let mut names = NameTable::default();
    let mut claimed: HashSet<Token> = HashSet::new();
    let mut owners: HashSet<Token> = HashSet::new();
    let mut extracted = Vec::with_capacity(additional.len() + 1);

    let all = std::iter::once((primary, true)).chain(additional.iter().map(|i| (i, false)));
    for (interface, is_primary) in all {
        let owner = interface.member_owner();
        if !owners.insert(owner.token) {
            continue;
        }

        let mut properties = Vec::new();
        for (_, property) in owner.properties.iter() {
            let getter = property.getter();
            let setter = property.setter();
            if getter.is_none() && setter.is_none() {
                continue;
            }

            let name = names.assign(interface, is_primary, &property.name);
            for accessor in getter.iter().chain(setter.iter()) {
                claimed.insert(accessor.token);
                if !name.explicit {
                    names.reserve(interface, &accessor.name);
                }
            }

            properties.push(PropertyDescriptor {
                property: property.clone(),
                getter,
                setter,
                name,
            });
        }

        let mut methods = Vec::new();
        for (_, method) in owner.methods.iter() {
            if method.is_static() || claimed.contains(&method.token) {
                continue;
            }

            let name = names.assign(interface, is_primary, &method.name);
            methods.push(MethodDescriptor {
                method: method.clone(),
                name,
            });
        }

        extracted.push(InterfaceMembers {
            interface: interface.clone(),
            is_primary,
            properties,
            methods,
        });
    }

    extracted
}

/// The constructor of `ty` whose parameter types are exactly `signature`
#[must_use]
pub fn find_constructor(ty: &CilTypeRc, signature: &[CilTypeRc]) -> Option<MethodRc> {
    ty.member_owner().constructors().into_iter().find(|ctor| {
        let types = ctor.param_types();
        types.len() == signature.len()
            && types
                .iter()
                .zip(signature)
                .all(|(declared, wanted)| declared.as_ref().is_some_and(|d| d.token == wanted.token))
    })
}

/// Parameter descriptors of the constructor of `implementation` matching `signature`,
/// used as replication source for constructor parameters
#[must_use]
pub fn constructor_parameters(
    implementation: &CilTypeRc,
    signature: &[CilTypeRc],
) -> Option<Vec<ParamRc>> {
    find_constructor(implementation, signature).map(|ctor| ctor.parameters())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::{
            builders::{ClassBuilder, InterfaceBuilder, MethodBuilder},
            typesystem::TypeRegistry,
        },
        Result,
    };

    #[test]
    fn test_primary_members_are_plain() -> Result<()> {
        let registry = TypeRegistry::new()?;
        let string = registry.wellknown("System.String")?;
        let named = InterfaceBuilder::new("Demo", "INamed")
            .property("Name", &string, true, true)
            .method(MethodBuilder::new("Rename").param("name", &string))
            .build(&registry)?;

        let members = extract(&named, &[]);
        assert_eq!(members.len(), 1);
        let primary = &members[0];
        assert!(primary.is_primary);
        assert_eq!(primary.properties.len(), 1);
        assert_eq!(primary.methods.len(), 1);
        assert_eq!(primary.methods[0].name, EmissionName::plain("Rename"));
        assert_eq!(primary.body_count(), 3);

        let property = &primary.properties[0];
        assert!(property.is_fully_defined());
        let getter = property.getter.as_ref().unwrap();
        assert_eq!(
            property.accessor_name(&named, getter),
            EmissionName::plain("get_Name")
        );
        Ok(())
    }

    #[test]
    fn test_collisions_are_qualified() -> Result<()> {
        let registry = TypeRegistry::new()?;
        let int32 = registry.wellknown("System.Int32")?;
        let a = InterfaceBuilder::new("Demo", "IA")
            .method(MethodBuilder::new("Run").returns(&int32))
            .property("Size", &int32, true, false)
            .build(&registry)?;
        let b = InterfaceBuilder::new("Demo", "IB")
            .method(MethodBuilder::new("Run").returns(&int32))
            .method(MethodBuilder::new("Stop"))
            .property("Size", &int32, true, false)
            .build(&registry)?;

        let members = extract(&a, &[b.clone()]);
        let additional = &members[1];
        assert!(!additional.is_primary);

        let run = additional.methods.iter().find(|m| m.method.name == "Run").unwrap();
        assert_eq!(run.name.name, "Demo.IB.Run");
        assert!(run.name.explicit);
        let stop = additional.methods.iter().find(|m| m.method.name == "Stop").unwrap();
        assert!(!stop.name.explicit);

        let size = &additional.properties[0];
        assert!(size.name.explicit);
        let getter = size.getter.as_ref().unwrap();
        assert_eq!(size.accessor_name(&b, getter).name, "Demo.IB.get_Size");
        Ok(())
    }

    #[test]
    fn test_overloads_in_one_interface_stay_plain() -> Result<()> {
        let registry = TypeRegistry::new()?;
        let int32 = registry.wellknown("System.Int32")?;
        let string = registry.wellknown("System.String")?;
        let primary = InterfaceBuilder::new("Demo", "IPrimary").build(&registry)?;
        let writer = InterfaceBuilder::new("Demo", "IWriter")
            .method(MethodBuilder::new("Write").param("value", &int32))
            .method(MethodBuilder::new("Write").param("value", &string))
            .build(&registry)?;

        let members = extract(&primary, &[writer]);
        assert!(members[1].methods.iter().all(|m| !m.name.explicit));
        Ok(())
    }

    #[test]
    fn test_shared_interface_extracted_once() -> Result<()> {
        let registry = TypeRegistry::new()?;
        let base = InterfaceBuilder::new("Demo", "IBase")
            .method(MethodBuilder::new("Ping"))
            .build(&registry)?;
        let left = InterfaceBuilder::new("Demo", "ILeft").extends(&base).build(&registry)?;

        let members = extract(&left, &[base.clone(), base.clone()]);
        assert_eq!(members.len(), 2);
        let total: usize = members.iter().map(InterfaceMembers::body_count).sum();
        assert_eq!(total, 1);
        Ok(())
    }

    #[test]
    fn test_constructor_parameters() -> Result<()> {
        let registry = TypeRegistry::new()?;
        let string = registry.wellknown("System.String")?;
        let int32 = registry.wellknown("System.Int32")?;
        let host = ClassBuilder::new("Demo", "Host")
            .constructor(MethodBuilder::constructor())
            .constructor(
                MethodBuilder::constructor()
                    .param("name", &string)
                    .param("size", &int32),
            )
            .build(&registry)?;

        let params = constructor_parameters(&host, &[string.clone(), int32.clone()]).unwrap();
        let names: Vec<_> = params.iter().map(|p| p.name.clone().unwrap()).collect();
        assert_eq!(names, vec!["name", "size"]);
        assert_eq!(constructor_parameters(&host, &[]).unwrap().len(), 0);
        assert!(constructor_parameters(&host, &[int32]).is_none());
        Ok(())
    }
}
