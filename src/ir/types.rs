//! Type system for the IR: nominal types, protocols and existentials.
//!
//! Types are interned in a [`TypeTable`] and referenced everywhere else by a
//! lightweight [`TypeId`]. The table is append-only and thread-safe so that
//! passes running in parallel can intern new types (e.g. the generic
//! parameters of a specialized clone) through a shared reference.
//!
//! # Existential Types
//!
//! An existential type names a [`CapabilitySet`] (a set of protocols) without
//! fixing the implementing type. Two compositions are special:
//!
//! | Composition | Meaning |
//! |-------------|---------|
//! | empty set, no class constraint | `Any` - every value |
//! | empty set, class constraint | `AnyObject` - every reference |
//!
//! The runtime layout of an existential value is summarized by its
//! [`ExistentialRepresentation`]; see
//! [`TypeTable::preferred_existential_representation`].

use std::fmt;

use dashmap::DashMap;
use strum::{Display, EnumIter};

/// Identifier of an interned [`Type`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct TypeId(u32);

impl TypeId {
    /// Creates a type id from a raw index.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw index into the type table.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Identifier of a declared [`Protocol`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct ProtocolId(u32);

impl ProtocolId {
    /// Returns the raw index into the protocol table.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identifier of a declared nominal type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct NominalId(u32);

impl NominalId {
    /// Returns the raw index into the nominal table.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// A protocol declaration: a named set of requirements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Protocol {
    /// Protocol name.
    pub name: String,
    /// Only reference types may conform.
    pub class_bound: bool,
    /// This is the error protocol, whose existentials use a dedicated box.
    pub is_error: bool,
    /// Names of the methods a conforming type must provide.
    pub requirements: Vec<String>,
}

impl Protocol {
    /// Creates an unconstrained protocol without requirements.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            class_bound: false,
            is_error: false,
            requirements: Vec::new(),
        }
    }

    /// Marks the protocol as class-bound.
    #[must_use]
    pub fn class_bound(mut self) -> Self {
        self.class_bound = true;
        self
    }

    /// Marks the protocol as the error protocol.
    #[must_use]
    pub fn error(mut self) -> Self {
        self.is_error = true;
        self
    }

    /// Adds a method requirement.
    #[must_use]
    pub fn requirement(mut self, name: impl Into<String>) -> Self {
        self.requirements.push(name.into());
        self
    }
}

/// The flavor of a nominal type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum NominalKind {
    /// Value type with inline storage.
    #[strum(serialize = "struct")]
    Struct,
    /// Value type with cases.
    #[strum(serialize = "enum")]
    Enum,
    /// Reference type.
    #[strum(serialize = "class")]
    Class,
}

/// A nominal type declaration together with its conformances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NominalDecl {
    /// Type name.
    pub name: String,
    /// Struct, enum or class.
    pub kind: NominalKind,
    /// Protocols this type conforms to.
    pub conformances: CapabilitySet,
}

impl NominalDecl {
    /// Creates a declaration without conformances.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: NominalKind) -> Self {
        Self {
            name: name.into(),
            kind,
            conformances: CapabilitySet::empty(),
        }
    }

    /// Adds a conformance.
    #[must_use]
    pub fn conforms(mut self, protocol: ProtocolId) -> Self {
        self.conformances.insert(protocol);
        self
    }
}

/// A sorted, duplicate-free set of protocols.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CapabilitySet(Vec<ProtocolId>);

impl CapabilitySet {
    /// The empty capability set.
    #[must_use]
    pub const fn empty() -> Self {
        Self(Vec::new())
    }

    /// Inserts a protocol, keeping the set sorted.
    pub fn insert(&mut self, protocol: ProtocolId) {
        if let Err(pos) = self.0.binary_search(&protocol) {
            self.0.insert(pos, protocol);
        }
    }

    /// Returns `true` if the protocol is part of the set.
    #[must_use]
    pub fn contains(&self, protocol: ProtocolId) -> bool {
        self.0.binary_search(&protocol).is_ok()
    }

    /// Returns `true` if every protocol of `other` is also in `self`.
    #[must_use]
    pub fn is_superset(&self, other: &CapabilitySet) -> bool {
        other.0.iter().all(|p| self.contains(*p))
    }

    /// Returns `true` if the set has no protocols.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of protocols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates over the protocols in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = ProtocolId> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<ProtocolId> for CapabilitySet {
    fn from_iter<T: IntoIterator<Item = ProtocolId>>(iter: T) -> Self {
        let mut set = Self::empty();
        for protocol in iter {
            set.insert(protocol);
        }
        set
    }
}

/// An interned type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// A concrete struct, enum or class.
    Nominal(NominalId),
    /// A value of some type conforming to `capabilities`.
    Existential {
        /// Required protocols.
        capabilities: CapabilitySet,
        /// The hidden type must be a reference type.
        any_object: bool,
    },
    /// The metatype of some type conforming to the capabilities.
    ExistentialMetatype(CapabilitySet),
    /// A generic parameter of a function, `τ_index`.
    GenericParam {
        /// Position in the function's generic signature.
        index: u32,
        /// Protocols the substituted type must conform to.
        requirements: CapabilitySet,
    },
}

/// How a value of an existential type is laid out at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum ExistentialRepresentation {
    /// The type is not existential.
    None,
    /// Value stored in type-dependent indirect storage (a container buffer).
    Opaque,
    /// The value is a single reference to a class instance.
    Class,
    /// The value lives in a heap box (error existentials).
    Boxed,
    /// The value is a metatype.
    Metatype,
}

/// Thread-safe interner for all types of a module.
///
/// Declarations and types are stored in append-only vectors, so references
/// handed out by the accessors stay valid while other threads keep interning.
#[derive(Debug, Default)]
pub struct TypeTable {
    protocols: boxcar::Vec<Protocol>,
    nominals: boxcar::Vec<NominalDecl>,
    types: boxcar::Vec<Type>,
    interned: DashMap<Type, TypeId>,
}

impl TypeTable {
    /// Creates an empty type table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a protocol and returns its id.
    pub fn declare_protocol(&self, protocol: Protocol) -> ProtocolId {
        // Declaration counts are bounded far below u32::MAX
        #[allow(clippy::cast_possible_truncation)]
        ProtocolId(self.protocols.push(protocol) as u32)
    }

    /// Declares a nominal type and returns the interned type for it.
    pub fn declare_nominal(&self, decl: NominalDecl) -> TypeId {
        #[allow(clippy::cast_possible_truncation)]
        let id = NominalId(self.nominals.push(decl) as u32);
        self.intern(Type::Nominal(id))
    }

    /// Returns a protocol declaration.
    #[must_use]
    pub fn protocol(&self, id: ProtocolId) -> Option<&Protocol> {
        self.protocols.get(id.index())
    }

    /// Returns a nominal declaration.
    #[must_use]
    pub fn nominal(&self, id: NominalId) -> Option<&NominalDecl> {
        self.nominals.get(id.index())
    }

    /// Returns the type behind an id.
    #[must_use]
    pub fn get(&self, id: TypeId) -> Option<&Type> {
        self.types.get(id.index())
    }

    /// Interns a type, returning the existing id if it was seen before.
    pub fn intern(&self, ty: Type) -> TypeId {
        if let Some(id) = self.interned.get(&ty) {
            return *id;
        }

        let types = &self.types;
        *self.interned.entry(ty.clone()).or_insert_with(|| {
            #[allow(clippy::cast_possible_truncation)]
            TypeId(types.push(ty) as u32)
        })
    }

    /// Interns the existential type for a set of protocols.
    pub fn existential(&self, protocols: impl IntoIterator<Item = ProtocolId>) -> TypeId {
        self.intern(Type::Existential {
            capabilities: protocols.into_iter().collect(),
            any_object: false,
        })
    }

    /// Interns `Any`.
    pub fn any(&self) -> TypeId {
        self.intern(Type::Existential {
            capabilities: CapabilitySet::empty(),
            any_object: false,
        })
    }

    /// Interns `AnyObject`.
    pub fn any_object(&self) -> TypeId {
        self.intern(Type::Existential {
            capabilities: CapabilitySet::empty(),
            any_object: true,
        })
    }

    /// Interns the existential metatype for a set of protocols.
    pub fn existential_metatype(&self, protocols: impl IntoIterator<Item = ProtocolId>) -> TypeId {
        self.intern(Type::ExistentialMetatype(protocols.into_iter().collect()))
    }

    /// Interns the generic parameter `τ_index` constrained by `requirements`.
    pub fn generic_param(&self, index: u32, requirements: CapabilitySet) -> TypeId {
        self.intern(Type::GenericParam {
            index,
            requirements,
        })
    }

    /// Returns `true` for existential values and existential metatypes.
    #[must_use]
    pub fn is_existential(&self, id: TypeId) -> bool {
        matches!(
            self.get(id),
            Some(Type::Existential { .. } | Type::ExistentialMetatype(_))
        )
    }

    /// Returns `true` if the type is exactly `Any`.
    #[must_use]
    pub fn is_any(&self, id: TypeId) -> bool {
        matches!(
            self.get(id),
            Some(Type::Existential { capabilities, any_object: false }) if capabilities.is_empty()
        )
    }

    /// Returns `true` if the type is exactly `AnyObject`.
    #[must_use]
    pub fn is_any_object(&self, id: TypeId) -> bool {
        matches!(
            self.get(id),
            Some(Type::Existential { capabilities, any_object: true }) if capabilities.is_empty()
        )
    }

    /// Returns the protocols required by an existential or generic parameter.
    #[must_use]
    pub fn capabilities(&self, id: TypeId) -> Option<&CapabilitySet> {
        match self.get(id)? {
            Type::Existential { capabilities, .. } | Type::ExistentialMetatype(capabilities) => {
                Some(capabilities)
            }
            Type::GenericParam { requirements, .. } => Some(requirements),
            Type::Nominal(_) => None,
        }
    }

    /// Computes the preferred runtime representation of an existential type.
    ///
    /// - metatypes use [`ExistentialRepresentation::Metatype`]
    /// - the error protocol on its own uses [`ExistentialRepresentation::Boxed`]
    /// - an explicit class constraint or any class-bound protocol yields
    ///   [`ExistentialRepresentation::Class`]
    /// - everything else is [`ExistentialRepresentation::Opaque`]
    #[must_use]
    pub fn preferred_existential_representation(&self, id: TypeId) -> ExistentialRepresentation {
        match self.get(id) {
            Some(Type::ExistentialMetatype(_)) => ExistentialRepresentation::Metatype,
            Some(Type::Existential {
                capabilities,
                any_object,
            }) => {
                let protocols: Vec<&Protocol> =
                    capabilities.iter().filter_map(|p| self.protocol(p)).collect();

                if protocols.len() == 1 && protocols[0].is_error && !any_object {
                    ExistentialRepresentation::Boxed
                } else if *any_object || protocols.iter().any(|p| p.class_bound) {
                    ExistentialRepresentation::Class
                } else {
                    ExistentialRepresentation::Opaque
                }
            }
            _ => ExistentialRepresentation::None,
        }
    }

    /// Returns `true` if a concrete type can be wrapped into the existential `existential`.
    ///
    /// The concrete type must conform to every protocol of the existential,
    /// and must be a class when the existential carries a class constraint.
    #[must_use]
    pub fn satisfies(&self, concrete: TypeId, existential: TypeId) -> bool {
        let Some(Type::Existential {
            capabilities,
            any_object,
        }) = self.get(existential)
        else {
            return false;
        };

        match self.get(concrete) {
            Some(Type::Nominal(id)) => self.nominal(*id).is_some_and(|decl| {
                decl.conformances.is_superset(capabilities)
                    && (!any_object || decl.kind == NominalKind::Class)
            }),
            Some(Type::GenericParam { requirements, .. }) => {
                requirements.is_superset(capabilities) && !any_object
            }
            _ => false,
        }
    }

    /// Returns a human-readable name for a type.
    #[must_use]
    pub fn display_name(&self, id: TypeId) -> String {
        match self.get(id) {
            Some(Type::Nominal(n)) => self
                .nominal(*n)
                .map_or_else(|| id.to_string(), |decl| decl.name.clone()),
            Some(Type::Existential {
                capabilities,
                any_object,
            }) => {
                let mut parts: Vec<String> = Vec::new();
                if *any_object {
                    parts.push("AnyObject".to_string());
                }
                parts.extend(self.protocol_names(capabilities));
                if parts.is_empty() {
                    "Any".to_string()
                } else {
                    format!("any {}", parts.join(" & "))
                }
            }
            Some(Type::ExistentialMetatype(capabilities)) => {
                format!("any ({}).Type", self.protocol_names(capabilities).join(" & "))
            }
            Some(Type::GenericParam { index, .. }) => format!("τ_0_{index}"),
            None => id.to_string(),
        }
    }

    fn protocol_names(&self, capabilities: &CapabilitySet) -> Vec<String> {
        capabilities
            .iter()
            .filter_map(|p| self.protocol(p).map(|decl| decl.name.clone()))
            .collect()
    }

    /// Returns the number of interned types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.count()
    }

    /// Returns `true` if no type was interned yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.count() == 0
    }
}
