use base64::Engine;
use serde_json::Value;
use std::collections::BTreeMap;

/// Well-known resource attribute naming the host that produced the spans.
pub const HOST_NAME_KEY: &str = "host.name";
/// Well-known resource attribute naming the logical service.
pub const SERVICE_NAME_KEY: &str = "service.name";

pub type Attributes = BTreeMap<String, AttributeValue>;

/// One delivery unit handed over by the host.
pub type TraceBatch = Vec<ResourceSpans>;

#[derive(Debug, Clone, Default)]
pub struct ResourceSpans {
    pub resource: Resource,
    pub scope_spans: Vec<ScopeSpans>,
}

#[derive(Debug, Clone, Default)]
pub struct Resource {
    pub attributes: Attributes,
}

#[derive(Debug, Clone, Default)]
pub struct ScopeSpans {
    pub scope: InstrumentationScope,
    pub spans: Vec<Span>,
}

#[derive(Debug, Clone, Default)]
pub struct InstrumentationScope {
    pub name: String,
    pub version: String,
}

/// A finished span. Timestamps are unix nanoseconds, `0` meaning unset.
#[derive(Debug, Clone, Default)]
pub struct Span {
    pub name: String,
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub parent_span_id: SpanId,
    pub trace_state: String,
    pub kind: SpanKind,
    pub start_time_unix_nano: u64,
    pub end_time_unix_nano: u64,
    pub attributes: Attributes,
    pub events: Vec<Event>,
    pub links: Vec<Link>,
    pub status: Status,
}

#[derive(Debug, Clone, Default)]
pub struct Event {
    pub name: String,
    pub time_unix_nano: u64,
    pub attributes: Attributes,
}

#[derive(Debug, Clone, Default)]
pub struct Link {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub trace_state: String,
    pub attributes: Attributes,
}

#[derive(Debug, Clone, Default)]
pub struct Status {
    pub code: StatusCode,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TraceId(pub [u8; 16]);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SpanId(pub [u8; 8]);

impl TraceId {
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// Lower-case hex, or an empty string for the all-zero id.
    pub fn to_hex_or_empty(&self) -> String {
        if self.is_empty() {
            String::new()
        } else {
            hex::encode(self.0)
        }
    }
}

impl SpanId {
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// Lower-case hex, or an empty string for the all-zero id.
    pub fn to_hex_or_empty(&self) -> String {
        if self.is_empty() {
            String::new()
        } else {
            hex::encode(self.0)
        }
    }
}

impl From<[u8; 16]> for TraceId {
    fn from(bytes: [u8; 16]) -> Self {
        TraceId(bytes)
    }
}

impl From<[u8; 8]> for SpanId {
    fn from(bytes: [u8; 8]) -> Self {
        SpanId(bytes)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SpanKind {
    #[default]
    Unspecified,
    Internal,
    Server,
    Client,
    Producer,
    Consumer,
}

impl SpanKind {
    pub fn as_short_str(&self) -> &'static str {
        match self {
            SpanKind::Internal => "internal",
            SpanKind::Client => "client",
            SpanKind::Server => "server",
            SpanKind::Producer => "producer",
            SpanKind::Consumer => "consumer",
            SpanKind::Unspecified => "unspecified",
        }
    }
}

/// Maps the OTLP wire values; anything out of range is `Unspecified`.
impl From<i32> for SpanKind {
    fn from(value: i32) -> Self {
        match value {
            1 => SpanKind::Internal,
            2 => SpanKind::Server,
            3 => SpanKind::Client,
            4 => SpanKind::Producer,
            5 => SpanKind::Consumer,
            _ => SpanKind::Unspecified,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusCode {
    #[default]
    Unset,
    Ok,
    Error,
}

impl StatusCode {
    pub fn as_short_str(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::Error => "ERROR",
            StatusCode::Unset => "UNSET",
        }
    }
}

impl From<i32> for StatusCode {
    fn from(value: i32) -> Self {
        match value {
            1 => StatusCode::Ok,
            2 => StatusCode::Error,
            _ => StatusCode::Unset,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum AttributeValue {
    #[default]
    Empty,
    Str(String),
    Bool(bool),
    Int(i64),
    Double(f64),
    Bytes(Vec<u8>),
    Array(Vec<AttributeValue>),
    Map(Attributes),
}

impl AttributeValue {
    /// String coercion used for the flattened `resource` entry.
    pub fn as_string(&self) -> String {
        match self {
            AttributeValue::Empty => String::new(),
            AttributeValue::Str(s) => s.clone(),
            AttributeValue::Bool(b) => b.to_string(),
            AttributeValue::Int(i) => i.to_string(),
            AttributeValue::Double(d) => d.to_string(),
            AttributeValue::Bytes(b) => base64::engine::general_purpose::STANDARD.encode(b),
            AttributeValue::Array(_) | AttributeValue::Map(_) => self.to_json().to_string(),
        }
    }

    /// Native JSON rendering. Non-finite doubles become `null`.
    pub fn to_json(&self) -> Value {
        match self {
            AttributeValue::Empty => Value::Null,
            AttributeValue::Str(s) => Value::String(s.clone()),
            AttributeValue::Bool(b) => Value::Bool(*b),
            AttributeValue::Int(i) => Value::from(*i),
            AttributeValue::Double(d) => Value::from(*d),
            AttributeValue::Bytes(b) => {
                Value::String(base64::engine::general_purpose::STANDARD.encode(b))
            }
            AttributeValue::Array(values) => {
                Value::Array(values.iter().map(AttributeValue::to_json).collect())
            }
            AttributeValue::Map(map) => attributes_to_json(map),
        }
    }
}

pub fn attributes_to_json(attributes: &Attributes) -> Value {
    Value::Object(
        attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    )
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Str(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Str(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Double(value)
    }
}

impl From<Vec<AttributeValue>> for AttributeValue {
    fn from(value: Vec<AttributeValue>) -> Self {
        AttributeValue::Array(value)
    }
}

impl From<Attributes> for AttributeValue {
    fn from(value: Attributes) -> Self {
        AttributeValue::Map(value)
    }
}
