use std::collections::HashMap;

use crate::common::PrincipalId;

/// The authenticated caller of a request.
///
/// Roles are not carried here; the grant repository resolves them from the id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Principal {
    pub id: PrincipalId,
}

impl Principal {
    pub fn new(id: PrincipalId) -> Self {
        Self { id }
    }
}

/// Child field name -> allowed, for one permission scope.
///
/// Absence means not allowed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldPermissionMap(HashMap<String, bool>);

impl FieldPermissionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, field: impl Into<String>, allowed: bool) {
        self.0.insert(field.into(), allowed);
    }

    /// Union with another role's grants: a field allowed by either stays allowed.
    pub fn merge(&mut self, field: impl Into<String>, allowed: bool) {
        let entry = self.0.entry(field.into()).or_insert(false);
        *entry |= allowed;
    }

    pub fn is_allowed(&self, field: &str) -> bool {
        self.0.get(field).copied().unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl<K: Into<String>> FromIterator<(K, bool)> for FieldPermissionMap {
    fn from_iter<I: IntoIterator<Item = (K, bool)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (field, allowed) in iter {
            map.merge(field, allowed);
        }
        map
    }
}
