use crate::error::TemplateError;
use crate::validation::{Diagnostic, ValidationContext};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateInfo {
    #[serde(default, deserialize_with = "scalar_string")]
    pub title: String,
    #[serde(default, deserialize_with = "scalar_string")]
    pub author: String,
    #[serde(default, deserialize_with = "scalar_string")]
    pub description: String,
    #[serde(default, deserialize_with = "scalar_string")]
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PropertyType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
    Other(String),
}

pub const PROPERTY_TYPES: &[&str] = &["string", "integer", "number", "boolean", "array", "object"];

impl PropertyType {
    pub fn as_str(&self) -> &str {
        match self {
            PropertyType::String => "string",
            PropertyType::Integer => "integer",
            PropertyType::Number => "number",
            PropertyType::Boolean => "boolean",
            PropertyType::Array => "array",
            PropertyType::Object => "object",
            PropertyType::Other(raw) => raw.as_str(),
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, PropertyType::Other(_))
    }

    // Unknown types accept anything.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            PropertyType::String => value.is_string(),
            PropertyType::Integer => value.is_i64() || value.is_u64(),
            PropertyType::Number => value.is_number(),
            PropertyType::Boolean => value.is_boolean(),
            PropertyType::Array => value.is_array(),
            PropertyType::Object => value.is_object(),
            PropertyType::Other(_) => true,
        }
    }
}

impl From<String> for PropertyType {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "string" => PropertyType::String,
            "integer" => PropertyType::Integer,
            "number" => PropertyType::Number,
            "boolean" => PropertyType::Boolean,
            "array" => PropertyType::Array,
            "object" => PropertyType::Object,
            _ => PropertyType::Other(raw),
        }
    }
}

impl From<PropertyType> for String {
    fn from(value: PropertyType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(rename = "type", default)]
    pub kind: Option<PropertyType>,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateSchema {
    #[serde(default)]
    pub info: TemplateInfo,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertySchema>,
}

impl TemplateSchema {
    pub fn is_required(&self, name: &str) -> bool {
        self.required.iter().any(|candidate| candidate == name)
    }

    pub fn optional(&self) -> impl Iterator<Item = &str> {
        self.properties
            .keys()
            .filter(|name| !self.is_required(name))
            .map(String::as_str)
    }

    /// Reads a raw `KEY=VALUE` value according to the declared type of `name`.
    pub fn parse_parameter(&self, name: &str, raw: &str) -> Value {
        let kind = self
            .properties
            .get(name)
            .and_then(|property| property.kind.as_ref());
        match kind {
            Some(PropertyType::String) => Value::String(raw.to_string()),
            _ => parse_parameter_value(raw),
        }
    }
}

pub fn parse_template_schema(source: &str) -> Result<TemplateSchema, TemplateError> {
    let document: serde_yaml::Value = serde_yaml::from_str(source)?;
    match document {
        serde_yaml::Value::Mapping(_) => Ok(serde_yaml::from_value(document)?),
        // An empty document parses to null; treat it as an empty schema.
        serde_yaml::Value::Null => Ok(TemplateSchema::default()),
        _ => Err(TemplateError::NotAMapping),
    }
}

pub fn lint_template_schema(schema: &TemplateSchema) -> Vec<Diagnostic> {
    let mut ctx = ValidationContext::new();

    ctx.push("info".to_string());
    if schema.info.title.trim().is_empty() {
        ctx.warning("template title is empty");
    }
    if schema.info.version.trim().is_empty() {
        ctx.warning("template version is empty");
    }
    ctx.pop();

    ctx.push("required".to_string());
    let mut seen = HashSet::new();
    for name in &schema.required {
        if !seen.insert(name.as_str()) {
            ctx.warning(format!("parameter '{}' is listed as required more than once", name));
            continue;
        }
        if !schema.properties.contains_key(name) {
            ctx.error(format!(
                "required parameter '{}' has no entry in properties",
                name
            ));
        }
    }
    ctx.pop();

    ctx.push("properties".to_string());
    for (name, property) in &schema.properties {
        ctx.push(name.clone());
        lint_property(name, property, schema.is_required(name), &mut ctx);
        ctx.pop();
    }
    ctx.pop();

    ctx.finish()
}

fn lint_property(
    name: &str,
    property: &PropertySchema,
    required: bool,
    ctx: &mut ValidationContext,
) {
    match &property.kind {
        None => ctx.error(format!("parameter '{}' does not declare a type", name)),
        Some(kind) if !kind.is_known() => ctx.error(format!(
            "parameter '{}' has unsupported type '{}' (expected one of {})",
            name,
            kind,
            PROPERTY_TYPES.join(", ")
        )),
        Some(_) => {}
    }

    if let Some(default) = &property.default {
        if let Some(kind) = &property.kind {
            if !kind.accepts(default) {
                ctx.warning(format!(
                    "default for '{}' is {} but the declared type is {}",
                    name,
                    value_kind(default),
                    kind
                ));
            }
        }
        if required {
            ctx.warning(format!(
                "parameter '{}' is required, so its default is never used",
                name
            ));
        }
    }

    let described = property
        .description
        .as_deref()
        .map(|text| !text.trim().is_empty())
        .unwrap_or(false);
    if !described {
        ctx.warning(format!("parameter '{}' has no description", name));
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParameterResolution {
    pub values: BTreeMap<String, Value>,
    pub diagnostics: Vec<Diagnostic>,
}

pub fn resolve_parameters(
    schema: &TemplateSchema,
    supplied: &BTreeMap<String, Value>,
) -> ParameterResolution {
    let mut ctx = ValidationContext::new();
    let mut values = BTreeMap::new();

    for name in &schema.required {
        if !supplied.contains_key(name) {
            ctx.error(format!("missing required parameter '{}'", name));
        }
    }

    for (name, value) in supplied {
        let Some(property) = schema.properties.get(name) else {
            ctx.warning(format!(
                "unknown parameter '{}'; it will be ignored",
                name
            ));
            continue;
        };
        if let Some(kind) = &property.kind {
            if !kind.accepts(value) {
                ctx.error(format!(
                    "parameter '{}' expects {} but got {}",
                    name,
                    kind,
                    value_kind(value)
                ));
                continue;
            }
        }
        values.insert(name.clone(), value.clone());
    }

    for (name, property) in &schema.properties {
        if values.contains_key(name) || supplied.contains_key(name) {
            continue;
        }
        if let Some(default) = &property.default {
            tracing::debug!(parameter = %name, "using template default");
            values.insert(name.clone(), default.clone());
        }
    }

    ParameterResolution {
        values,
        diagnostics: ctx.finish(),
    }
}

/// `8` is an integer, `true` a boolean, `[a, b]` an array; anything else stays a string.
pub fn parse_parameter_value(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::String(raw.to_string());
    }
    match serde_yaml::from_str::<Value>(raw) {
        Ok(Value::Null) | Err(_) => Value::String(raw.to_string()),
        Ok(value) => value,
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(n) if n.is_f64() => "a number",
        Value::Number(_) => "an integer",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn scalar_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    // `version: 1.0` is common in schema files and arrives as a float.
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::has_errors;
    use serde_json::json;

    const VM_SCHEMA: &str = r#"
info:
  title: Security scanner VM
  author: Platform Security
  description: Creates a GCE instance that runs the inventory and scanner jobs.
  version: 1.0

required:
  - zone
  - machineType
  - network
  - serviceAccount

properties:
  zone:
    type: string
    description: Zone to deploy the instance into.
  machineType:
    type: string
    default: n1-standard-2
    description: Machine type of the instance.
  network:
    type: string
    description: Network the instance attaches to.
  serviceAccount:
    type: string
    description: Service account the instance runs as.
  scopes:
    type: array
    default:
      - https://www.googleapis.com/auth/cloud-platform
    description: OAuth scopes granted to the instance.
  diskSizeGb:
    type: integer
    default: 50
    description: Size of the boot disk.
  enableScanner:
    type: boolean
    default: true
    description: Run the scanner after each inventory.
"#;

    fn messages(diagnostics: &[Diagnostic]) -> Vec<&str> {
        diagnostics.iter().map(|d| d.message.as_str()).collect()
    }

    #[test]
    fn parses_vm_schema() {
        let schema = parse_template_schema(VM_SCHEMA).expect("failed to parse schema");
        assert_eq!(schema.info.title, "Security scanner VM");
        assert_eq!(schema.info.version, "1.0");
        assert_eq!(schema.required.len(), 4);
        assert_eq!(
            schema.properties["diskSizeGb"].kind,
            Some(PropertyType::Integer)
        );
        assert_eq!(schema.properties["diskSizeGb"].default, Some(json!(50)));
        let optional: Vec<&str> = schema.optional().collect();
        assert_eq!(optional, vec!["diskSizeGb", "enableScanner", "scopes"]);
    }

    #[test]
    fn well_formed_schema_has_no_errors() {
        let schema = parse_template_schema(VM_SCHEMA).expect("failed to parse schema");
        let diagnostics = lint_template_schema(&schema);
        assert!(!has_errors(&diagnostics), "{:?}", diagnostics);
        // machineType is required but carries a default.
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message.contains("machineType"));
    }

    #[test]
    fn required_name_must_exist_in_properties() {
        let source = r#"
info: { title: t, version: "1" }
required: [zone, region]
properties:
  zone: { type: string, description: Zone. }
"#;
        let schema = parse_template_schema(source).expect("failed to parse schema");
        let diagnostics = lint_template_schema(&schema);
        assert!(has_errors(&diagnostics));
        let error = diagnostics.iter().find(|d| d.is_error()).expect("error present");
        assert_eq!(error.location.as_deref(), Some("required"));
        assert!(error.message.contains("'region'"));
    }

    #[test]
    fn property_types_are_checked() {
        let source = r#"
info: { title: t, version: "1" }
properties:
  untyped: { description: No type here. }
  odd: { type: map, description: Not a known type. }
  count: { type: integer, default: "three", description: Count. }
"#;
        let schema = parse_template_schema(source).expect("failed to parse schema");
        let diagnostics = lint_template_schema(&schema);
        let errors: Vec<&Diagnostic> = diagnostics.iter().filter(|d| d.is_error()).collect();
        assert_eq!(errors.len(), 2);
        assert!(messages(&diagnostics)
            .iter()
            .any(|m| m.contains("unsupported type 'map'")));
        assert!(messages(&diagnostics)
            .iter()
            .any(|m| m.contains("default for 'count' is a string")));
        assert_eq!(
            schema.properties["odd"].kind,
            Some(PropertyType::Other("map".to_string()))
        );
    }

    #[test]
    fn duplicate_required_and_missing_description_warn() {
        let source = r#"
info: { title: t, version: "1" }
required: [zone, zone]
properties:
  zone: { type: string }
"#;
        let schema = parse_template_schema(source).expect("failed to parse schema");
        let diagnostics = lint_template_schema(&schema);
        assert!(!has_errors(&diagnostics));
        assert_eq!(diagnostics.len(), 2);
    }

    #[test]
    fn rejects_non_mapping_documents() {
        let err = parse_template_schema("- just\n- a list\n").expect_err("list must fail");
        assert!(matches!(err, TemplateError::NotAMapping));
        let empty = parse_template_schema("").expect("empty document is an empty schema");
        assert!(empty.properties.is_empty());
    }

    #[test]
    fn resolves_parameters_with_defaults() {
        let schema = parse_template_schema(VM_SCHEMA).expect("failed to parse schema");
        let mut supplied = BTreeMap::new();
        supplied.insert("zone".to_string(), json!("us-central1-c"));
        supplied.insert("machineType".to_string(), json!("n1-standard-4"));
        supplied.insert("network".to_string(), json!("default"));
        supplied.insert("serviceAccount".to_string(), json!("scanner@p.iam.gserviceaccount.com"));
        supplied.insert("diskSizeGb".to_string(), json!(100));

        let resolution = resolve_parameters(&schema, &supplied);
        assert!(resolution.diagnostics.is_empty(), "{:?}", resolution.diagnostics);
        assert_eq!(resolution.values["diskSizeGb"], json!(100));
        assert_eq!(resolution.values["enableScanner"], json!(true));
        assert_eq!(resolution.values["machineType"], json!("n1-standard-4"));
        assert_eq!(resolution.values.len(), 7);
    }

    #[test]
    fn reports_missing_unknown_and_mistyped_parameters() {
        let schema = parse_template_schema(VM_SCHEMA).expect("failed to parse schema");
        let mut supplied = BTreeMap::new();
        supplied.insert("zone".to_string(), json!("us-central1-c"));
        supplied.insert("diskSizeGb".to_string(), json!("big"));
        supplied.insert("colour".to_string(), json!("blue"));

        let resolution = resolve_parameters(&schema, &supplied);
        let errors = resolution
            .diagnostics
            .iter()
            .filter(|d| d.is_error())
            .count();
        // machineType, network and serviceAccount missing, plus diskSizeGb mistyped.
        assert_eq!(errors, 4);
        assert!(messages(&resolution.diagnostics)
            .iter()
            .any(|m| m.contains("unknown parameter 'colour'")));
        assert!(!resolution.values.contains_key("diskSizeGb"));
        assert!(!resolution.values.contains_key("colour"));
    }

    #[test]
    fn empty_info_fields_warn() {
        let source = r#"
properties:
  zone: { type: string, description: Zone. }
"#;
        let schema = parse_template_schema(source).expect("failed to parse schema");
        let diagnostics = lint_template_schema(&schema);
        assert_eq!(diagnostics.len(), 2);
        assert!(diagnostics
            .iter()
            .all(|d| !d.is_error() && d.location.as_deref() == Some("info")));
        assert!(messages(&diagnostics).contains(&"template title is empty"));
        assert!(messages(&diagnostics).contains(&"template version is empty"));
    }

    #[test]
    fn number_accepts_integer_default_and_untyped_skips_default_check() {
        let source = r#"
info: { title: t, version: "1" }
properties:
  ratio: { type: number, default: 2, description: Ratio. }
  loose: { default: "anything", description: No declared type. }
"#;
        let schema = parse_template_schema(source).expect("failed to parse schema");
        let diagnostics = lint_template_schema(&schema);
        assert_eq!(diagnostics.len(), 1, "{:?}", diagnostics);
        assert!(diagnostics[0].is_error());
        assert_eq!(diagnostics[0].location.as_deref(), Some("properties > loose"));
        assert!(diagnostics[0].message.contains("does not declare a type"));
    }

    #[test]
    fn string_parameters_keep_raw_text() {
        let schema = parse_template_schema(VM_SCHEMA).expect("failed to parse schema");
        assert_eq!(schema.parse_parameter("serviceAccount", "1234"), json!("1234"));
        assert_eq!(schema.parse_parameter("zone", "1.0"), json!("1.0"));
        assert_eq!(schema.parse_parameter("diskSizeGb", "100"), json!(100));
        assert_eq!(schema.parse_parameter("enableScanner", "false"), json!(false));
        assert_eq!(schema.parse_parameter("undeclared", "7"), json!(7));

        let supplied: BTreeMap<String, Value> = [
            ("zone", "us-central1-c"),
            ("machineType", "n1-standard-4"),
            ("network", "123"),
            ("serviceAccount", "1234"),
        ]
        .into_iter()
        .map(|(key, raw)| (key.to_string(), schema.parse_parameter(key, raw)))
        .collect();
        let resolution = resolve_parameters(&schema, &supplied);
        assert!(resolution.diagnostics.is_empty(), "{:?}", resolution.diagnostics);
        assert_eq!(resolution.values["serviceAccount"], json!("1234"));
    }

    #[test]
    fn parameter_values_follow_yaml_scalars() {
        assert_eq!(parse_parameter_value("8"), json!(8));
        assert_eq!(parse_parameter_value("false"), json!(false));
        assert_eq!(parse_parameter_value("[a, b]"), json!(["a", "b"]));
        assert_eq!(parse_parameter_value("us-east1-b"), json!("us-east1-b"));
        assert_eq!(parse_parameter_value(""), json!(""));
        assert_eq!(parse_parameter_value("~"), json!("~"));
    }
}
