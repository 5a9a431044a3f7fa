//! MCP catalog derived from the REST API's OpenAPI document

use axum::http::Method;
use serde_json::{Map, Value};

use super::route_map::{classify, McpType, RouteMap};

const MAX_REF_DEPTH: usize = 8;
const METHODS: [(&str, Method); 5] = [
    ("get", Method::GET),
    ("post", Method::POST),
    ("put", Method::PUT),
    ("patch", Method::PATCH),
    ("delete", Method::DELETE),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamLocation {
    Path,
    Query,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub location: ParamLocation,
    pub required: bool,
    pub schema: Value,
}

/// One REST operation as described by OpenAPI
#[derive(Debug, Clone)]
pub struct Operation {
    pub method: Method,
    pub path: String,
    pub operation_id: String,
    pub tags: Vec<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub params: Vec<Param>,
    /// JSON request body schema with `$ref`s resolved
    pub body_schema: Option<Value>,
}

impl Operation {
    /// Whether body properties are merged into the top level of the input
    /// schema (object bodies) or passed under a single `body` argument.
    pub fn body_is_flattened(&self) -> bool {
        self.body_schema
            .as_ref()
            .is_some_and(|s| s.get("properties").is_some_and(Value::is_object))
    }

    /// Text shown to MCP clients
    pub fn describe(&self) -> String {
        let mut text = match (&self.summary, &self.description) {
            (Some(summary), Some(desc)) if summary != desc => format!("{}\n\n{}", summary, desc),
            (Some(summary), _) => summary.clone(),
            (None, Some(desc)) => desc.clone(),
            (None, None) => self.operation_id.clone(),
        };
        text.push_str(&format!("\n\nHTTP: {} {}", self.method, self.path));
        text
    }

    /// JSON schema for the arguments: path and query parameters plus body fields
    pub fn input_schema(&self) -> Map<String, Value> {
        let mut properties = Map::new();
        let mut required: Vec<Value> = Vec::new();

        for param in &self.params {
            properties.insert(param.name.clone(), param.schema.clone());
            if param.required {
                required.push(Value::String(param.name.clone()));
            }
        }

        if let Some(body) = &self.body_schema {
            if self.body_is_flattened() {
                if let Some(Value::Object(fields)) = body.get("properties") {
                    for (name, schema) in fields {
                        properties.insert(name.clone(), schema.clone());
                    }
                }
                if let Some(Value::Array(names)) = body.get("required") {
                    required.extend(names.iter().cloned());
                }
            } else {
                properties.insert("body".into(), body.clone());
                required.push(Value::String("body".into()));
            }
        }

        let mut schema = Map::new();
        schema.insert("type".into(), Value::String("object".into()));
        schema.insert("properties".into(), Value::Object(properties));
        if !required.is_empty() {
            schema.insert("required".into(), Value::Array(required));
        }
        schema
    }
}

/// Every operation in an OpenAPI document, ordered by path then method
pub fn operations(doc: &Value) -> Vec<Operation> {
    let Some(paths) = doc.get("paths").and_then(Value::as_object) else {
        return Vec::new();
    };

    let mut ops = Vec::new();
    for (path, item) in paths {
        for (key, method) in &METHODS {
            let Some(op) = item.get(*key) else {
                continue;
            };
            ops.push(parse_operation(doc, path, method.clone(), op));
        }
    }
    ops
}

fn parse_operation(doc: &Value, path: &str, method: Method, op: &Value) -> Operation {
    let text = |key: &str| op.get(key).and_then(Value::as_str).map(String::from);

    let tags = op
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    let params = op
        .get("parameters")
        .and_then(Value::as_array)
        .map(|list| list.iter().filter_map(|p| parse_param(doc, p)).collect())
        .unwrap_or_default();

    let body_schema = op
        .pointer("/requestBody/content/application~1json/schema")
        .map(|schema| resolve_refs(doc, schema, 0));

    Operation {
        operation_id: text("operationId").unwrap_or_else(|| fallback_operation_id(&method, path)),
        method,
        path: path.to_string(),
        tags,
        summary: text("summary"),
        description: text("description"),
        params,
        body_schema,
    }
}

fn parse_param(doc: &Value, param: &Value) -> Option<Param> {
    let param = resolve_refs(doc, param, 0);
    let location = match param.get("in")?.as_str()? {
        "path" => ParamLocation::Path,
        "query" => ParamLocation::Query,
        _ => return None,
    };
    let name = param.get("name")?.as_str()?.to_string();

    let mut schema = param
        .get("schema")
        .cloned()
        .unwrap_or_else(|| serde_json::json!({ "type": "string" }));
    if let (Some(desc), Value::Object(fields)) = (param.get("description"), &mut schema) {
        fields
            .entry("description")
            .or_insert_with(|| desc.clone());
    }

    Some(Param {
        required: location == ParamLocation::Path
            || param.get("required").and_then(Value::as_bool).unwrap_or(false),
        name,
        location,
        schema,
    })
}

/// Inline `#/components/...` references, up to a fixed depth
fn resolve_refs(doc: &Value, value: &Value, depth: usize) -> Value {
    match value {
        Value::Object(fields) => {
            if let Some(Value::String(reference)) = fields.get("$ref") {
                if depth < MAX_REF_DEPTH {
                    if let Some(target) = reference
                        .strip_prefix('#')
                        .and_then(|pointer| doc.pointer(pointer))
                    {
                        return resolve_refs(doc, target, depth + 1);
                    }
                }
                return value.clone();
            }
            Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), resolve_refs(doc, v, depth)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve_refs(doc, v, depth)).collect()),
        other => other.clone(),
    }
}

fn fallback_operation_id(method: &Method, path: &str) -> String {
    let slug: Vec<&str> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| s.trim_matches(|c| c == '{' || c == '}'))
        .collect();
    format!("{}_{}", method.as_str().to_lowercase(), slug.join("_"))
}

/// Operations split by the capability they map to
#[derive(Debug, Clone, Default)]
pub struct McpCatalog {
    pub tools: Vec<Operation>,
    pub resources: Vec<Operation>,
    pub excluded: Vec<Operation>,
}

impl McpCatalog {
    pub fn build(doc: &Value, maps: &[RouteMap]) -> Self {
        let mut catalog = Self::default();
        for op in operations(doc) {
            match classify(maps, &op.method, &op.tags) {
                McpType::Tool => catalog.tools.push(op),
                McpType::Resource => catalog.resources.push(op),
                McpType::Exclude => catalog.excluded.push(op),
            }
        }
        tracing::debug!(
            "MCP catalog: {} tools, {} resources, {} excluded",
            catalog.tools.len(),
            catalog.resources.len(),
            catalog.excluded.len()
        );
        catalog
    }

    pub fn tool(&self, name: &str) -> Option<&Operation> {
        self.tools.iter().find(|op| op.operation_id == name)
    }

    pub fn resource(&self, name: &str) -> Option<&Operation> {
        self.resources.iter().find(|op| op.operation_id == name)
    }
}
