use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Checks that go beyond what serde can express on its own.
pub trait Validate {
    fn validate(&self) -> Result<(), String>;
}

// =============================================================================
// Search
// =============================================================================

/// Inbound search request.
///
/// Deserialized from the caller's snake_case JSON and serialized in the
/// camelCase form the Retail REST API expects.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct SearchRequest {
    pub placement: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub branch: String,
    #[serde(default)]
    pub query: String,
    pub visitor_id: String,
    pub page_size: i32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub page_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<i32>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub filter: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub canonical_filter: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub order_by: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub facet_specs: Vec<FacetSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub page_categories: Vec<String>,
}

impl Validate for SearchRequest {
    fn validate(&self) -> Result<(), String> {
        if self.placement.trim().is_empty() {
            return Err("placement must not be empty".to_string());
        }
        if self.visitor_id.trim().is_empty() {
            return Err("visitor_id must not be empty".to_string());
        }
        if self.page_size < 0 {
            return Err(format!("page_size must not be negative, got {}", self.page_size));
        }
        if let Some(offset) = self.offset {
            if offset < 0 {
                return Err(format!("offset must not be negative, got {offset}"));
            }
        }
        for (i, spec) in self.facet_specs.iter().enumerate() {
            if spec.facet_key.key.trim().is_empty() {
                return Err(format!("facet_specs[{i}]: key must not be empty"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct FacetKey {
    pub key: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub intervals: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub restricted_values: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prefixes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contains: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub order_by: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub query: String,
}

/// Accepts both `{"facet_key": {"key": ..}, "limit": ..}` and the shorthand
/// `{"key": .., "limit": ..}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "FacetSpecInput", rename_all(serialize = "camelCase"))]
pub struct FacetSpec {
    pub facet_key: FacetKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub excluded_filter_keys: Vec<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub enable_dynamic_position: bool,
}

// Both forms share one struct so a bad field is reported by name instead of
// as an untagged-enum mismatch.
#[derive(Deserialize)]
struct FacetSpecInput {
    #[serde(default)]
    facet_key: Option<FacetKey>,
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    intervals: Vec<Value>,
    #[serde(default)]
    restricted_values: Vec<String>,
    #[serde(default)]
    prefixes: Vec<String>,
    #[serde(default)]
    contains: Vec<String>,
    #[serde(default)]
    order_by: String,
    #[serde(default)]
    query: String,
    #[serde(default)]
    limit: Option<i32>,
    #[serde(default)]
    excluded_filter_keys: Vec<String>,
    #[serde(default)]
    enable_dynamic_position: bool,
}

impl TryFrom<FacetSpecInput> for FacetSpec {
    type Error = String;

    fn try_from(input: FacetSpecInput) -> Result<Self, Self::Error> {
        let facet_key = match (input.facet_key, input.key) {
            (Some(_), Some(_)) => {
                return Err("facet spec sets both `facet_key` and `key`".to_string());
            }
            (Some(facet_key), None) => facet_key,
            (None, Some(key)) => FacetKey {
                key,
                intervals: input.intervals,
                restricted_values: input.restricted_values,
                prefixes: input.prefixes,
                contains: input.contains,
                order_by: input.order_by,
                query: input.query,
            },
            (None, None) => {
                return Err("facet spec needs either `facet_key` or `key`".to_string());
            }
        };
        Ok(FacetSpec {
            facet_key,
            limit: input.limit,
            excluded_filter_keys: input.excluded_filter_keys,
            enable_dynamic_position: input.enable_dynamic_position,
        })
    }
}

/// Aggregate search response.
///
/// Read from the camelCase Retail API payload, written back out in snake_case.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all(deserialize = "camelCase"))]
pub struct SearchResponse {
    #[serde(default)]
    pub results: Vec<SearchResult>,
    #[serde(default)]
    pub facets: Vec<Facet>,
    #[serde(default)]
    pub total_size: i32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub corrected_query: String,
    #[serde(default)]
    pub attribution_token: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub next_page_token: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub applied_controls: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub redirect_uri: String,
    /// Everything else the service sent, e.g. `query_expansion_info`.
    #[serde(flatten)]
    pub extra: Passthrough,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all(deserialize = "camelCase"))]
pub struct SearchResult {
    pub id: String,
    /// Product payload as the catalog returned it, re-keyed to snake_case.
    #[serde(
        default,
        deserialize_with = "snake_case_product",
        skip_serializing_if = "Option::is_none"
    )]
    pub product: Option<Value>,
    #[serde(default)]
    pub matching_variant_count: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_rollup_values: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub personal_labels: Vec<String>,
    #[serde(flatten)]
    pub extra: Passthrough,
}

/// Response fields without a typed counterpart, carried through with their
/// keys rewritten to snake_case.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Passthrough(Map<String, Value>);

impl Passthrough {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for Passthrough {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let map = Map::<String, Value>::deserialize(deserializer)?;
        Ok(Passthrough(snake_case_map(map)))
    }
}

fn snake_case_product<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?.map(snake_case_keys))
}

/// Fields whose object keys are data (attribute names, rollup keys), not
/// field names. Their keys are kept, their values still converted.
const KEYED_BY_DATA: &[&str] = &["attributes", "variant_rollup_values", "model_scores"];

/// Rewrite the camelCase field names of a Retail API payload to snake_case,
/// the way the protobuf JSON tags spell them.
pub fn snake_case_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(snake_case_map(map)),
        Value::Array(items) => Value::Array(items.into_iter().map(snake_case_keys).collect()),
        other => other,
    }
}

fn snake_case_map(map: Map<String, Value>) -> Map<String, Value> {
    map.into_iter()
        .map(|(key, value)| {
            let key = snake_case(&key);
            let value = match value {
                Value::Object(inner) if KEYED_BY_DATA.contains(&key.as_str()) => Value::Object(
                    inner
                        .into_iter()
                        .map(|(k, v)| (k, snake_case_keys(v)))
                        .collect(),
                ),
                other => snake_case_keys(other),
            };
            (key, value)
        })
        .collect()
}

fn snake_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for c in key.chars() {
        if c.is_ascii_uppercase() {
            if !out.is_empty() {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all(deserialize = "camelCase"))]
pub struct Facet {
    pub key: String,
    #[serde(default)]
    pub values: Vec<FacetValue>,
    #[serde(default)]
    pub dynamic_facet: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all(deserialize = "camelCase"))]
pub struct FacetValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<Value>,
    // int64 fields arrive as JSON strings
    #[serde(default, deserialize_with = "lenient_i64")]
    pub count: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| D::Error::custom(format!("expected integer, got {n}"))),
        Value::String(s) => s
            .parse()
            .map_err(|_| D::Error::custom(format!("expected integer string, got {s:?}"))),
        Value::Null => Ok(0),
        other => Err(D::Error::custom(format!("expected integer, got {other}"))),
    }
}

// =============================================================================
// Completion
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CompletionRequest {
    pub query: String,
    pub catalog: String,
    #[serde(default)]
    pub visitor_id: Option<String>,
    #[serde(default)]
    pub language_codes: Vec<String>,
    #[serde(default)]
    pub device_type: Option<String>,
    #[serde(default)]
    pub dataset: Option<String>,
    #[serde(default)]
    pub max_suggestions: Option<i32>,
}

impl CompletionRequest {
    /// Query-string parameters for `completeQuery`.
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("query", self.query.clone())];
        if let Some(visitor_id) = &self.visitor_id {
            params.push(("visitorId", visitor_id.clone()));
        }
        for code in &self.language_codes {
            params.push(("languageCodes", code.clone()));
        }
        if let Some(device_type) = &self.device_type {
            params.push(("deviceType", device_type.clone()));
        }
        if let Some(dataset) = &self.dataset {
            params.push(("dataset", dataset.clone()));
        }
        if let Some(max) = self.max_suggestions {
            params.push(("maxSuggestions", max.to_string()));
        }
        params
    }
}

impl Validate for CompletionRequest {
    fn validate(&self) -> Result<(), String> {
        if self.catalog.trim().is_empty() {
            return Err("catalog must not be empty".to_string());
        }
        if let Some(max) = self.max_suggestions {
            if max < 0 {
                return Err(format!("max_suggestions must not be negative, got {max}"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteQueryResponse {
    #[serde(default)]
    pub completion_results: Vec<CompletionResult>,
    #[serde(default)]
    pub attribution_token: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CompletionResult {
    pub suggestion: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
}
