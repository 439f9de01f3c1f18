//! Field-level authorization: rewrites a selection tree so that only fields the
//! caller may see are ever resolved.

use futures::future::BoxFuture;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

use super::SelectionNode;
use crate::common::{AuthError, FieldPermissionMap, Principal, PrincipalId};
use crate::kernel::BaseGrantRepository;

/// How the permission scope of a nested selection is named.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FieldScope {
    /// Scope is the bare name of the field whose children are filtered, so
    /// `client` at any depth shares one set of permissions.
    #[default]
    FieldName,
    /// Scope is the dotted path from the top-level field, e.g. `client.address`.
    Path,
}

impl FieldScope {
    fn key(&self, path: &str, name: &str) -> String {
        match self {
            Self::FieldName => name.to_string(),
            Self::Path => path.to_string(),
        }
    }
}

impl fmt::Display for FieldScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::FieldName => "field",
            Self::Path => "path",
        })
    }
}

impl FromStr for FieldScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "field" | "name" => Ok(Self::FieldName),
            "path" => Ok(Self::Path),
            other => Err(format!(
                "unknown field permission scope '{}', expected 'field' or 'path'",
                other
            )),
        }
    }
}

fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", parent, name)
    }
}

type PermissionCache = HashMap<String, FieldPermissionMap>;

/// Recursive selection filter.
///
/// Returns a new tree and never touches its input. A failed permission lookup
/// anywhere fails the whole pass.
#[derive(Clone)]
pub struct SelectionFilter {
    grants: Arc<dyn BaseGrantRepository>,
    scope: FieldScope,
}

impl SelectionFilter {
    pub fn new(grants: Arc<dyn BaseGrantRepository>, scope: FieldScope) -> Self {
        Self { grants, scope }
    }

    /// Filter the tree rooted at a top-level field for `principal`.
    pub async fn filter(
        &self,
        principal: &Principal,
        field: &SelectionNode,
    ) -> Result<SelectionNode, AuthError> {
        let mut cache = PermissionCache::new();
        self.filter_node(principal.id, field, "", &mut cache).await
    }

    fn filter_node<'a>(
        &'a self,
        principal: PrincipalId,
        node: &'a SelectionNode,
        parent_path: &'a str,
        cache: &'a mut PermissionCache,
    ) -> BoxFuture<'a, Result<SelectionNode, AuthError>> {
        Box::pin(async move {
            let Some(children) = &node.selections else {
                return Ok(node.clone());
            };

            let path = join_path(parent_path, &node.name);

            // Innermost selections first.
            let mut rewritten = Vec::with_capacity(children.len());
            for child in children {
                if child.is_leaf() {
                    rewritten.push(child.clone());
                } else {
                    rewritten.push(self.filter_node(principal, child, &path, cache).await?);
                }
            }

            let key = self.scope.key(&path, &node.name);
            if !cache.contains_key(&key) {
                let permissions = self.grants.field_permissions(principal, &key).await?;
                cache.insert(key.clone(), permissions);
            }
            let allowed = &cache[&key];

            let before = rewritten.len();
            let surviving: Vec<SelectionNode> = rewritten
                .into_iter()
                .filter(|child| allowed.is_allowed(&child.name))
                .collect();

            if surviving.len() < before {
                debug!(
                    principal_id = %principal,
                    scope = %key,
                    kept = surviving.len(),
                    dropped = before - surviving.len(),
                    "Dropped unauthorized fields"
                );
            }

            Ok(SelectionNode {
                name: node.name.clone(),
                alias: node.alias.clone(),
                arguments: node.arguments.clone(),
                selections: Some(surviving),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::test_dependencies::MockGrantRepository;
    use crate::server::graphql::parse_operation;
    use serde_json::Map;

    fn top_field(query: &str) -> SelectionNode {
        parse_operation(query, None, &Map::new())
            .unwrap()
            .fields
            .remove(0)
    }

    fn filter_with(grants: MockGrantRepository) -> (SelectionFilter, Arc<MockGrantRepository>) {
        let grants = Arc::new(grants);
        (
            SelectionFilter::new(grants.clone(), FieldScope::FieldName),
            grants,
        )
    }

    fn principal(id: i32) -> Principal {
        Principal::new(PrincipalId::new(id))
    }

    #[tokio::test]
    async fn test_no_field_permissions_leaves_empty_selection() {
        let (filter, _) = filter_with(MockGrantRepository::new());
        let field = top_field("{ client(id: 1) { id name } }");

        let filtered = filter.filter(&principal(7), &field).await.unwrap();

        assert_eq!(filtered.name, "client");
        assert_eq!(filtered.selections, Some(vec![]));
        assert!(!filtered.is_leaf());
    }

    #[tokio::test]
    async fn test_only_permitted_fields_survive() {
        let (filter, _) = filter_with(
            MockGrantRepository::new()
                .with_field_rule(7, "client", "name", true)
                .with_field_rule(7, "client", "id", false),
        );
        let field = top_field("{ client(id: 1) { id name } }");

        let filtered = filter.filter(&principal(7), &field).await.unwrap();

        assert_eq!(filtered.child_names(), vec!["name"]);
        assert_eq!(filtered.arguments, field.arguments);
    }

    #[tokio::test]
    async fn test_leaf_is_returned_unchanged_without_lookup() {
        let (filter, grants) = filter_with(MockGrantRepository::new());
        let field = top_field("mutation { delete(id: 3) }");

        let filtered = filter.filter(&principal(1), &field).await.unwrap();

        assert_eq!(filtered, field);
        assert!(grants.field_calls().is_empty());
    }

    #[tokio::test]
    async fn test_filtering_is_idempotent() {
        let (filter, _) = filter_with(
            MockGrantRepository::new()
                .with_fields(7, "clients", &["name", "address"])
                .with_fields(7, "address", &["city"]),
        );
        let field = top_field("{ clients { id name address { street city } } }");

        let once = filter.filter(&principal(7), &field).await.unwrap();
        let twice = filter.filter(&principal(7), &once).await.unwrap();

        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn test_order_is_preserved_and_nothing_is_added() {
        let (filter, _) = filter_with(
            MockGrantRepository::new().with_fields(7, "clients", &["e", "c", "a", "z"]),
        );
        let field = top_field("{ clients { a b c d e } }");

        let filtered = filter.filter(&principal(7), &field).await.unwrap();

        assert_eq!(filtered.child_names(), vec!["a", "c", "e"]);
        for name in filtered.child_names() {
            assert!(field.child_names().contains(&name));
        }
    }

    #[tokio::test]
    async fn test_nested_levels_are_filtered_depth_first() {
        let (filter, grants) = filter_with(
            MockGrantRepository::new()
                .with_fields(7, "clients", &["name", "address"])
                .with_fields(7, "address", &["city"]),
        );
        let field = top_field("{ clients { id name address { street city } } }");

        let filtered = filter.filter(&principal(7), &field).await.unwrap();

        assert_eq!(filtered.child_names(), vec!["name", "address"]);
        assert_eq!(filtered.children()[1].child_names(), vec!["city"]);
        assert_eq!(grants.field_calls(), vec!["address", "clients"]);
    }

    #[tokio::test]
    async fn test_aliases_and_arguments_survive() {
        let (filter, _) = filter_with(MockGrantRepository::new().with_fields(7, "client", &["name"]));
        let field = top_field("{ c: client(id: 5) { label: name id } }");

        let filtered = filter.filter(&principal(7), &field).await.unwrap();

        assert_eq!(filtered.response_key(), "c");
        assert_eq!(filtered.children()[0].response_key(), "label");
        assert_eq!(filtered.arguments.get("id"), Some(&serde_json::json!(5)));
    }

    #[tokio::test]
    async fn test_lookup_failure_aborts_the_whole_pass() {
        let (filter, _) = filter_with(
            MockGrantRepository::new()
                .with_fields(7, "clients", &["address"])
                .with_failing_scope("address"),
        );
        let field = top_field("{ clients { address { city } } }");

        let err = filter.filter(&principal(7), &field).await.unwrap_err();
        assert!(matches!(err, AuthError::Repository(_)));
    }

    #[tokio::test]
    async fn test_same_name_scope_is_fetched_once_per_pass() {
        let (filter, grants) = filter_with(
            MockGrantRepository::new()
                .with_fields(7, "clients", &["parent", "name"])
                .with_fields(7, "parent", &["parent", "name"]),
        );
        let field = top_field("{ clients { parent { parent { name } name } } }");

        let filtered = filter.filter(&principal(7), &field).await.unwrap();

        assert_eq!(filtered.children()[0].child_names(), vec!["parent", "name"]);
        assert_eq!(grants.field_calls(), vec!["parent", "clients"]);
    }

    #[tokio::test]
    async fn test_path_scope_distinguishes_depths() {
        let grants = Arc::new(
            MockGrantRepository::new()
                .with_fields(7, "clients", &["parent"])
                .with_fields(7, "clients.parent", &["parent", "name"])
                .with_fields(7, "clients.parent.parent", &["id"]),
        );
        let filter = SelectionFilter::new(grants.clone(), FieldScope::Path);
        let field = top_field("{ clients { parent { parent { id name } name } } }");

        let filtered = filter.filter(&principal(7), &field).await.unwrap();

        let parent = &filtered.children()[0];
        assert_eq!(parent.child_names(), vec!["parent", "name"]);
        assert_eq!(parent.children()[0].child_names(), vec!["id"]);
        assert_eq!(
            grants.field_calls(),
            vec!["clients.parent.parent", "clients.parent", "clients"]
        );
    }

    #[test]
    fn test_scope_parsing() {
        assert_eq!("field".parse::<FieldScope>().unwrap(), FieldScope::FieldName);
        assert_eq!(" PATH ".parse::<FieldScope>().unwrap(), FieldScope::Path);
        assert!("dotted".parse::<FieldScope>().is_err());
        assert_eq!(FieldScope::default(), FieldScope::FieldName);
    }
}
