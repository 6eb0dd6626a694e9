use alloc::{
    collections::BTreeMap,
    string::{String, ToString as _},
    vec::Vec,
};
use tracing::{debug, error};

use crate::{
    any::TypeInfo,
    descriptor::Descriptor,
    errors::{DefinitionErrorKind, ResolveErrorKind},
};

/// Arena of descriptors.
///
/// Descriptors are stored in registration order and refer to each other only by name,
/// so the container can mutate instance slots without shared ownership.
#[derive(Default)]
pub struct Registry {
    descriptors: Vec<Descriptor>,
    names: BTreeMap<String, usize>,
}

impl Registry {
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            descriptors: Vec::new(),
            names: BTreeMap::new(),
        }
    }

    /// # Errors
    /// Returns [`DefinitionErrorKind::DuplicateDefinition`] if a descriptor with the same name is already registered
    pub fn register(&mut self, descriptor: Descriptor) -> Result<(), DefinitionErrorKind> {
        if self.names.contains_key(descriptor.name()) {
            let err = DefinitionErrorKind::DuplicateDefinition {
                name: descriptor.name().to_owned(),
            };
            error!("{}", err);
            return Err(err);
        }

        debug!(name = descriptor.name(), declared_type = descriptor.declared_type().name, "Definition registered");

        self.names.insert(descriptor.name().to_owned(), self.descriptors.len());
        self.descriptors.push(descriptor);
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Descriptor> {
        self.index_of(name).map(|index| &self.descriptors[index])
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Descriptors in registration order
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Descriptor> + '_ {
        self.descriptors.iter()
    }

    /// Descriptors assignable to the type, ordered by their order and then by registration
    #[must_use]
    pub fn find_by_type(&self, type_info: &TypeInfo) -> Vec<&Descriptor> {
        self.sorted_indices(|descriptor| descriptor.is_assignable_to(type_info))
            .into_iter()
            .map(|index| &self.descriptors[index])
            .collect()
    }

    /// Finds the only descriptor assignable to the type.
    /// If several are found, the single one marked as primary wins.
    ///
    /// # Errors
    /// Returns [`ResolveErrorKind::AmbiguousDependency`] if several descriptors match
    /// and not exactly one of them is primary
    pub fn resolve_unique(&self, type_info: &TypeInfo) -> Result<Option<&Descriptor>, ResolveErrorKind> {
        self.resolve_unique_index(type_info)
            .map(|index| index.map(|index| &self.descriptors[index]))
    }

    /// Finds the descriptor by name and checks it's assignable to the type.
    ///
    /// # Errors
    /// Returns [`ResolveErrorKind::TypeMismatch`] if the descriptor isn't assignable to the type
    pub fn resolve_named(&self, name: &str, type_info: &TypeInfo) -> Result<Option<&Descriptor>, ResolveErrorKind> {
        self.resolve_named_index(name, type_info)
            .map(|index| index.map(|index| &self.descriptors[index]))
    }

    /// Checks cross references between descriptors
    ///
    /// # Errors
    /// Returns [`DefinitionErrorKind::MissingFactoryOwner`] if a factory refers to an unknown owner
    pub fn validate(&self) -> Result<(), DefinitionErrorKind> {
        for descriptor in &self.descriptors {
            let Some(owner) = descriptor.strategy().owner() else {
                continue;
            };

            if !self.names.contains_key(owner) {
                let err = DefinitionErrorKind::MissingFactoryOwner {
                    name: descriptor.name().to_owned(),
                    owner: owner.to_owned(),
                };
                error!("{}", err);
                return Err(err);
            }
        }
        Ok(())
    }

    #[inline]
    pub(crate) fn index_of(&self, name: &str) -> Option<usize> {
        self.names.get(name).copied()
    }

    #[inline]
    pub(crate) fn at(&self, index: usize) -> &Descriptor {
        &self.descriptors[index]
    }

    #[inline]
    pub(crate) fn at_mut(&mut self, index: usize) -> &mut Descriptor {
        &mut self.descriptors[index]
    }

    pub(crate) fn resolve_unique_index(&self, type_info: &TypeInfo) -> Result<Option<usize>, ResolveErrorKind> {
        let candidates = self.sorted_indices(|descriptor| descriptor.is_assignable_to(type_info));
        if candidates.len() <= 1 {
            return Ok(candidates.first().copied());
        }

        let primaries = candidates
            .iter()
            .copied()
            .filter(|index| self.descriptors[*index].is_primary())
            .collect::<Vec<_>>();
        if let [primary] = primaries[..] {
            return Ok(Some(primary));
        }

        let err = ResolveErrorKind::AmbiguousDependency {
            type_name: type_info.name,
            candidates: candidates
                .iter()
                .map(|index| self.descriptors[*index].name().to_string())
                .collect(),
            primaries: primaries.len(),
        };
        error!("{}", err);
        Err(err)
    }

    pub(crate) fn resolve_named_index(&self, name: &str, type_info: &TypeInfo) -> Result<Option<usize>, ResolveErrorKind> {
        let Some(index) = self.index_of(name) else {
            return Ok(None);
        };

        let descriptor = &self.descriptors[index];
        if !descriptor.is_assignable_to(type_info) {
            let err = ResolveErrorKind::TypeMismatch {
                name: name.to_owned(),
                expected: type_info.name,
                actual: descriptor.declared_type().name,
            };
            error!("{}", err);
            return Err(err);
        }
        Ok(Some(index))
    }

    /// Indices of matching descriptors, ordered by their order and then by registration
    pub(crate) fn sorted_indices(&self, filter: impl Fn(&Descriptor) -> bool) -> Vec<usize> {
        let mut indices = self
            .descriptors
            .iter()
            .enumerate()
            .filter(|(_, descriptor)| filter(descriptor))
            .map(|(index, _)| index)
            .collect::<Vec<_>>();
        indices.sort_by_key(|index| (self.descriptors[*index].order(), *index));
        indices
    }

    pub(crate) fn clear(&mut self) {
        self.descriptors.clear();
        self.names.clear();
    }
}
