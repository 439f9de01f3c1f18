//! Owned selection trees built from a parsed GraphQL document.
//!
//! The parser output borrows the request body and carries positions, fragments
//! and variables. Everything downstream (field filtering, resolvers, result
//! projection) works on plain [`SelectionNode`] trees instead: fragments are
//! inlined, variables substituted and `@skip`/`@include` applied here.

use graphql_parser::query::{
    Definition, Directive, FragmentDefinition, OperationDefinition, Selection, SelectionSet,
    Value as AstValue, VariableDefinition,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::HashMap;

use crate::common::AuthError;

type Doc<'a> = graphql_parser::query::Document<'a, String>;

// =============================================================================
// Request body
// =============================================================================

/// Body of `POST /graphql`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default, rename = "operationName")]
    pub operation_name: Option<String>,
    #[serde(default)]
    pub variables: Option<Map<String, Value>>,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            operation_name: None,
            variables: None,
        }
    }

    pub fn with_variables(mut self, variables: Value) -> Self {
        if let Value::Object(map) = variables {
            self.variables = Some(map);
        }
        self
    }
}

// =============================================================================
// Selection tree
// =============================================================================

/// Argument bag of one field, with variables already substituted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Arguments(Map<String, Value>);

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decode into a typed argument struct. Missing or mistyped arguments are
    /// a `MalformedRequest`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, AuthError> {
        serde_json::from_value(Value::Object(self.0.clone()))
            .map_err(|e| AuthError::malformed(format!("invalid arguments: {}", e)))
    }
}

impl From<Map<String, Value>> for Arguments {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// One requested field.
///
/// `selections` is `None` for a leaf and `Some(..)` for a field that asked for
/// sub-fields. A parent whose children were all filtered away is
/// `Some(vec![])`, which is not the same thing as a leaf.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionNode {
    pub name: String,
    pub alias: Option<String>,
    pub arguments: Arguments,
    pub selections: Option<Vec<SelectionNode>>,
}

impl SelectionNode {
    pub fn leaf(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
            arguments: Arguments::new(),
            selections: None,
        }
    }

    pub fn parent(name: impl Into<String>, children: Vec<SelectionNode>) -> Self {
        Self {
            selections: Some(children),
            ..Self::leaf(name)
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_argument(mut self, name: impl Into<String>, value: Value) -> Self {
        self.arguments.insert(name, value);
        self
    }

    /// Key under which this field appears in the response.
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    pub fn is_leaf(&self) -> bool {
        self.selections.is_none()
    }

    pub fn children(&self) -> &[SelectionNode] {
        self.selections.as_deref().unwrap_or(&[])
    }

    pub fn child_names(&self) -> Vec<&str> {
        self.children().iter().map(|c| c.name.as_str()).collect()
    }
}

// =============================================================================
// Parsing
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Query,
    Mutation,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
        }
    }
}

/// The executable operation of a request, reduced to its top-level fields.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedOperation {
    pub kind: OperationKind,
    pub name: Option<String>,
    pub fields: Vec<SelectionNode>,
}

/// Parse a request into its top-level selection trees.
pub fn parse_request(request: &QueryRequest) -> Result<ParsedOperation, AuthError> {
    let empty = Map::new();
    parse_operation(
        &request.query,
        request.operation_name.as_deref(),
        request.variables.as_ref().unwrap_or(&empty),
    )
}

pub fn parse_operation(
    query: &str,
    operation_name: Option<&str>,
    variables: &Map<String, Value>,
) -> Result<ParsedOperation, AuthError> {
    let document: Doc<'_> = graphql_parser::parse_query::<String>(query)
        .map_err(|e| AuthError::malformed(e.to_string()))?;

    let mut fragments = HashMap::new();
    let mut operations = Vec::new();
    for definition in &document.definitions {
        match definition {
            Definition::Fragment(fragment) => {
                if fragments.insert(fragment.name.as_str(), fragment).is_some() {
                    return Err(AuthError::malformed(format!(
                        "fragment '{}' is defined more than once",
                        fragment.name
                    )));
                }
            }
            Definition::Operation(operation) => operations.push(operation),
        }
    }

    let operation = select_operation(&operations, operation_name)?;
    let (kind, name, variable_definitions, selection_set) = match operation {
        OperationDefinition::SelectionSet(set) => (OperationKind::Query, None, &[][..], set),
        OperationDefinition::Query(q) => (
            OperationKind::Query,
            q.name.clone(),
            &q.variable_definitions[..],
            &q.selection_set,
        ),
        OperationDefinition::Mutation(m) => (
            OperationKind::Mutation,
            m.name.clone(),
            &m.variable_definitions[..],
            &m.selection_set,
        ),
        OperationDefinition::Subscription(_) => {
            return Err(AuthError::malformed("subscriptions are not supported"));
        }
    };

    let builder = TreeBuilder {
        fragments,
        variables: bind_variables(variable_definitions, variables)?,
    };
    let fields = builder.selection_set(selection_set, &mut Vec::new())?;

    Ok(ParsedOperation { kind, name, fields })
}

fn operation_name<'d>(operation: &'d OperationDefinition<'_, String>) -> Option<&'d str> {
    match operation {
        OperationDefinition::SelectionSet(_) => None,
        OperationDefinition::Query(q) => q.name.as_deref(),
        OperationDefinition::Mutation(m) => m.name.as_deref(),
        OperationDefinition::Subscription(s) => s.name.as_deref(),
    }
}

fn select_operation<'d, 'a>(
    operations: &[&'d OperationDefinition<'a, String>],
    wanted: Option<&str>,
) -> Result<&'d OperationDefinition<'a, String>, AuthError> {
    match wanted {
        Some(wanted) => operations
            .iter()
            .copied()
            .find(|op| operation_name(op) == Some(wanted))
            .ok_or_else(|| AuthError::malformed(format!("unknown operation '{}'", wanted))),
        None => match operations {
            [only] => Ok(*only),
            [] => Err(AuthError::malformed("document contains no operation")),
            _ => Err(AuthError::malformed(
                "operationName is required when the document has several operations",
            )),
        },
    }
}

/// Declared variables with their provided or default values. A declared but
/// unset variable without default is absent and reads as null.
fn bind_variables(
    definitions: &[VariableDefinition<'_, String>],
    provided: &Map<String, Value>,
) -> Result<HashMap<String, Option<Value>>, AuthError> {
    let mut bound = HashMap::new();
    for definition in definitions {
        let value = match provided.get(&definition.name) {
            Some(value) => Some(value.clone()),
            None => match &definition.default_value {
                Some(default) => Some(literal_to_json(default)?),
                None => None,
            },
        };
        bound.insert(definition.name.clone(), value);
    }
    Ok(bound)
}

fn literal_to_json(value: &AstValue<'_, String>) -> Result<Value, AuthError> {
    convert_value(value, &|name: &str| {
        Err(AuthError::malformed(format!(
            "variable ${} is not allowed in a default value",
            name
        )))
    })
}

fn convert_value(
    value: &AstValue<'_, String>,
    variable: &dyn Fn(&str) -> Result<Value, AuthError>,
) -> Result<Value, AuthError> {
    Ok(match value {
        AstValue::Variable(name) => variable(name)?,
        AstValue::Int(n) => n
            .as_i64()
            .map(Value::from)
            .ok_or_else(|| AuthError::malformed("integer out of range"))?,
        AstValue::Float(f) => Number::from_f64(*f)
            .map(Value::Number)
            .ok_or_else(|| AuthError::malformed("float is not finite"))?,
        AstValue::String(s) => Value::String(s.clone()),
        AstValue::Boolean(b) => Value::Bool(*b),
        AstValue::Null => Value::Null,
        AstValue::Enum(e) => Value::String(e.clone()),
        AstValue::List(items) => Value::Array(
            items
                .iter()
                .map(|item| convert_value(item, variable))
                .collect::<Result<_, _>>()?,
        ),
        AstValue::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(k, v)| Ok((k.clone(), convert_value(v, variable)?)))
                .collect::<Result<_, AuthError>>()?,
        ),
    })
}

struct TreeBuilder<'d, 'a> {
    fragments: HashMap<&'d str, &'d FragmentDefinition<'a, String>>,
    variables: HashMap<String, Option<Value>>,
}

impl<'d, 'a> TreeBuilder<'d, 'a> {
    fn value(&self, value: &AstValue<'_, String>) -> Result<Value, AuthError> {
        convert_value(value, &|name: &str| match self.variables.get(name) {
            Some(bound) => Ok(bound.clone().unwrap_or(Value::Null)),
            None => Err(AuthError::malformed(format!(
                "variable ${} is not defined",
                name
            ))),
        })
    }

    /// Evaluate `@skip(if:)` and `@include(if:)`.
    fn is_selected(&self, directives: &[Directive<'_, String>]) -> Result<bool, AuthError> {
        for directive in directives {
            let skip_when = match directive.name.as_str() {
                "skip" => true,
                "include" => false,
                _ => continue,
            };
            let condition = directive
                .arguments
                .iter()
                .find(|(name, _)| name == "if")
                .map(|(_, value)| self.value(value))
                .transpose()?;
            match condition {
                Some(Value::Bool(b)) if b == skip_when => return Ok(false),
                Some(Value::Bool(_)) => {}
                _ => {
                    return Err(AuthError::malformed(format!(
                        "@{} requires a boolean 'if' argument",
                        directive.name
                    )))
                }
            }
        }
        Ok(true)
    }

    fn selection_set(
        &self,
        set: &SelectionSet<'_, String>,
        expanding: &mut Vec<String>,
    ) -> Result<Vec<SelectionNode>, AuthError> {
        let mut nodes = Vec::new();
        for item in &set.items {
            match item {
                Selection::Field(field) => {
                    if !self.is_selected(&field.directives)? {
                        continue;
                    }
                    let mut arguments = Arguments::new();
                    for (name, value) in &field.arguments {
                        arguments.insert(name.clone(), self.value(value)?);
                    }
                    let selections = if field.selection_set.items.is_empty() {
                        None
                    } else {
                        Some(self.selection_set(&field.selection_set, expanding)?)
                    };
                    merge_into(
                        &mut nodes,
                        SelectionNode {
                            name: field.name.clone(),
                            alias: field.alias.clone(),
                            arguments,
                            selections,
                        },
                    )?;
                }
                Selection::FragmentSpread(spread) => {
                    if !self.is_selected(&spread.directives)? {
                        continue;
                    }
                    let name = spread.fragment_name.as_str();
                    let fragment = self.fragments.get(name).ok_or_else(|| {
                        AuthError::malformed(format!("unknown fragment '{}'", name))
                    })?;
                    if expanding.iter().any(|f| f == name) {
                        return Err(AuthError::malformed(format!(
                            "fragment '{}' spreads itself",
                            name
                        )));
                    }
                    expanding.push(name.to_string());
                    let inlined = self.selection_set(&fragment.selection_set, expanding)?;
                    expanding.pop();
                    for node in inlined {
                        merge_into(&mut nodes, node)?;
                    }
                }
                Selection::InlineFragment(inline) => {
                    // Type conditions are not checked: every field belongs to one
                    // object type per level.
                    if !self.is_selected(&inline.directives)? {
                        continue;
                    }
                    for node in self.selection_set(&inline.selection_set, expanding)? {
                        merge_into(&mut nodes, node)?;
                    }
                }
            }
        }
        Ok(nodes)
    }
}

/// Append `node`, merging it into an earlier sibling with the same response
/// key the way GraphQL field merging does.
///
/// Two fields under one response key must name the same field with the same
/// arguments, and either both or neither have a selection set.
fn merge_into(nodes: &mut Vec<SelectionNode>, node: SelectionNode) -> Result<(), AuthError> {
    let Some(existing) = nodes
        .iter_mut()
        .find(|n| n.response_key() == node.response_key())
    else {
        nodes.push(node);
        return Ok(());
    };

    let key = node.response_key().to_string();
    if existing.name != node.name {
        return Err(AuthError::malformed(format!(
            "fields '{}' and '{}' conflict under response key '{}'",
            existing.name, node.name, key
        )));
    }
    if existing.arguments != node.arguments {
        return Err(AuthError::malformed(format!(
            "field '{}' is requested with different arguments",
            key
        )));
    }

    match (existing.selections.as_mut(), node.selections) {
        (Some(into), Some(from)) => {
            for child in from {
                merge_into(into, child)?;
            }
            Ok(())
        }
        (None, None) => Ok(()),
        _ => Err(AuthError::malformed(format!(
            "field '{}' is requested both with and without a selection",
            key
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(query: &str) -> Result<ParsedOperation, AuthError> {
        parse_operation(query, None, &Map::new())
    }

    #[test]
    fn test_builds_nested_tree_with_arguments() {
        let op = parse("{ client(id: 1) { id name } }").unwrap();
        assert_eq!(op.kind, OperationKind::Query);
        assert_eq!(op.fields.len(), 1);

        let client = &op.fields[0];
        assert_eq!(client.name, "client");
        assert_eq!(client.arguments.get("id"), Some(&json!(1)));
        assert_eq!(client.child_names(), vec!["id", "name"]);
        assert!(client.children()[0].is_leaf());
    }

    #[test]
    fn test_mutation_with_variables_and_defaults() {
        let mut vars = Map::new();
        vars.insert("name".to_string(), json!("Acme"));
        let op = parse_operation(
            "mutation Rename($id: Int = 4, $name: String!) { update(id: $id, name: $name) }",
            None,
            &vars,
        )
        .unwrap();

        assert_eq!(op.kind, OperationKind::Mutation);
        assert_eq!(op.name.as_deref(), Some("Rename"));
        let update = &op.fields[0];
        assert!(update.is_leaf());
        assert_eq!(update.arguments.get("id"), Some(&json!(4)));
        assert_eq!(update.arguments.get("name"), Some(&json!("Acme")));
    }

    #[test]
    fn test_undefined_variable_is_malformed() {
        let err = parse("{ client(id: $id) { id } }").unwrap_err();
        assert!(matches!(err, AuthError::MalformedRequest(_)));
    }

    #[test]
    fn test_fragments_are_inlined_in_place() {
        let op = parse(
            "{ client(id: 1) { id ...Details } } fragment Details on Client { name id }",
        )
        .unwrap();
        assert_eq!(op.fields[0].child_names(), vec!["id", "name"]);

        let op = parse("{ client(id: 1) { ... on Client { name } id } }").unwrap();
        assert_eq!(op.fields[0].child_names(), vec!["name", "id"]);
    }

    #[test]
    fn test_fragment_cycles_and_unknown_fragments_are_rejected() {
        let err = parse("{ client(id: 1) { ...A } } fragment A on Client { ...A }").unwrap_err();
        assert!(matches!(err, AuthError::MalformedRequest(_)));

        let err = parse("{ client(id: 1) { ...Missing } }").unwrap_err();
        assert!(matches!(err, AuthError::MalformedRequest(_)));
    }

    #[test]
    fn test_aliases_and_skip_include() {
        let op = parse(
            "{ first: client(id: 1) { label: name id @skip(if: true) } clients @include(if: false) }",
        )
        .unwrap();
        assert_eq!(op.fields.len(), 1);
        let first = &op.fields[0];
        assert_eq!(first.response_key(), "first");
        assert_eq!(first.name, "client");
        assert_eq!(first.children()[0].response_key(), "label");
        assert_eq!(first.child_names(), vec!["name"]);
    }

    #[test]
    fn test_operation_selection() {
        let doc = "query A { clients { id } } query B { client(id: 2) { name } }";
        assert!(matches!(
            parse(doc),
            Err(AuthError::MalformedRequest(_))
        ));

        let op = parse_operation(doc, Some("B"), &Map::new()).unwrap();
        assert_eq!(op.fields[0].name, "client");

        assert!(parse_operation(doc, Some("C"), &Map::new()).is_err());
    }

    #[test]
    fn test_subscriptions_and_syntax_errors_are_malformed() {
        assert!(matches!(
            parse("subscription { clients { id } }"),
            Err(AuthError::MalformedRequest(_))
        ));
        assert!(matches!(
            parse("{ client(id: 1) { id "),
            Err(AuthError::MalformedRequest(_))
        ));
    }

    #[test]
    fn test_repeated_fields_merge_their_selections() {
        let op = parse("{ client(id: 1) { id } client(id: 1) { name id } }").unwrap();
        assert_eq!(op.fields.len(), 1);
        assert_eq!(op.fields[0].child_names(), vec!["id", "name"]);

        let op = parse("{ client(id: 1) { id } ... on Query { client(id: 1) { name } } }").unwrap();
        assert_eq!(op.fields[0].child_names(), vec!["id", "name"]);
    }

    #[test]
    fn test_conflicting_arguments_under_one_key_are_malformed() {
        let err = parse("{ client(id: 1) { name } client(id: 2) { name } }").unwrap_err();
        assert!(matches!(err, AuthError::MalformedRequest(_)));

        let err = parse("{ client(id: 1) { name } ...Other } fragment Other on Query { client { name } }")
            .unwrap_err();
        assert!(matches!(err, AuthError::MalformedRequest(_)));
    }

    #[test]
    fn test_different_fields_under_one_alias_are_malformed() {
        let err = parse("{ client(id: 1) { x: id x: name } }").unwrap_err();
        assert_eq!(
            err.public_message(),
            "Malformed request: fields 'id' and 'name' conflict under response key 'x'"
        );

        let err = parse("{ a: client(id: 1) { id } a: clients { id } }").unwrap_err();
        assert!(matches!(err, AuthError::MalformedRequest(_)));
    }

    #[test]
    fn test_leaf_and_parent_under_one_key_are_malformed() {
        for query in [
            "{ client(id: 1) client(id: 1) { id } }",
            "{ client(id: 1) { id } client(id: 1) }",
            "{ client(id: 1) { address address { city } } }",
        ] {
            assert!(
                matches!(parse(query), Err(AuthError::MalformedRequest(_))),
                "{}",
                query
            );
        }
    }

    #[test]
    fn test_decode_typed_arguments() {
        #[derive(Deserialize)]
        struct ById {
            id: i32,
        }

        let node = SelectionNode::leaf("client").with_argument("id", json!(9));
        assert_eq!(node.arguments.decode::<ById>().unwrap().id, 9);

        let node = SelectionNode::leaf("client").with_argument("id", json!("nine"));
        assert!(matches!(
            node.arguments.decode::<ById>(),
            Err(AuthError::MalformedRequest(_))
        ));
        assert!(SelectionNode::leaf("client")
            .arguments
            .decode::<ById>()
            .is_err());
    }

    #[test]
    fn test_query_request_body_shape() {
        let body = json!({
            "query": "query Q($id: Int!) { client(id: $id) { id } }",
            "operationName": "Q",
            "variables": { "id": 3 }
        });
        let request: QueryRequest = serde_json::from_value(body).unwrap();
        let op = parse_request(&request).unwrap();
        assert_eq!(op.fields[0].arguments.get("id"), Some(&json!(3)));
    }
}
