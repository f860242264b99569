use crate::model::{
    attributes_to_json, Event, InstrumentationScope, Link, Resource, ResourceSpans, Span,
    TraceBatch, HOST_NAME_KEY, SERVICE_NAME_KEY,
};
use chrono::Utc;
use log::warn;
use serde::Serialize;
use serde_json::{Map, Value};

pub const HOST_FIELD: &str = "host";
pub const SERVICE_NAME_FIELD: &str = "service_name";
pub const RESOURCE_FIELD: &str = "resource";
// shortcut for the instrumentation scope name and version
pub const OTLP_NAME_FIELD: &str = "OTLPName";
pub const OTLP_VERSION_FIELD: &str = "OTLPVersion";

pub const NAME_FIELD: &str = "Name";
pub const TRACE_ID_FIELD: &str = "TraceID";
pub const SPAN_ID_FIELD: &str = "SpanID";
pub const TRACE_STATE_FIELD: &str = "TraceState";
pub const PARENT_SPAN_ID_FIELD: &str = "ParentSpanID";
pub const KIND_FIELD: &str = "Kind";
pub const START_TIME_FIELD: &str = "Start";
pub const END_TIME_FIELD: &str = "End";
pub const DURATION_FIELD: &str = "Duration";
pub const ATTRIBUTES_FIELD: &str = "Attributes";
pub const EVENTS_FIELD: &str = "Events";
pub const LINKS_FIELD: &str = "Links";
pub const STATUS_CODE_FIELD: &str = "StatusCode";
pub const STATUS_DESCRIPTION_FIELD: &str = "StatusDescription";

const NANOS_PER_MICRO: u64 = 1_000;
const NANOS_PER_MILLI: u64 = 1_000_000;
// the fixed per-span entries appended after the resource and scope ones
const SPAN_FIELD_COUNT: usize = 14;

#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct LogContent {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(string, tag = "2")]
    pub value: String,
}

impl LogContent {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        LogContent {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// One span flattened into TLS key/value contents.
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct LogRecord {
    /// Unix milliseconds.
    #[prost(int64, tag = "1")]
    pub time: i64,
    #[prost(message, repeated, tag = "2")]
    pub contents: Vec<LogContent>,
}

impl LogRecord {
    /// Value of the first content with `key`, if any.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.contents
            .iter()
            .find(|c| c.key == key)
            .map(|c| c.value.as_str())
    }

    /// Flattens `span`, prefixing the already derived resource and scope
    /// contents. Fails when the events or links cannot be encoded.
    pub fn from_span(
        span: &Span,
        resource_contents: &[LogContent],
        scope_contents: &[LogContent],
    ) -> Result<LogRecord, serde_json::Error> {
        let time_nanos = match span.end_time_unix_nano {
            0 => now_unix_nanos(),
            end => end,
        };

        let start = span.start_time_unix_nano / NANOS_PER_MICRO;
        let end = span.end_time_unix_nano / NANOS_PER_MICRO;
        // clock skew or an unset end time must not wrap around
        let duration = end.saturating_sub(start);

        let events = serde_json::to_string(&events_to_entries(&span.events))?;
        let links = serde_json::to_string(&links_to_entries(&span.links))?;

        let mut contents = Vec::with_capacity(
            resource_contents.len() + scope_contents.len() + SPAN_FIELD_COUNT,
        );
        contents.extend_from_slice(resource_contents);
        contents.extend_from_slice(scope_contents);
        contents.push(LogContent::new(NAME_FIELD, span.name.as_str()));
        contents.push(LogContent::new(TRACE_ID_FIELD, span.trace_id.to_hex_or_empty()));
        contents.push(LogContent::new(SPAN_ID_FIELD, span.span_id.to_hex_or_empty()));
        contents.push(LogContent::new(TRACE_STATE_FIELD, span.trace_state.as_str()));
        contents.push(LogContent::new(
            PARENT_SPAN_ID_FIELD,
            span.parent_span_id.to_hex_or_empty(),
        ));
        contents.push(LogContent::new(KIND_FIELD, span.kind.as_short_str()));
        contents.push(LogContent::new(START_TIME_FIELD, start.to_string()));
        contents.push(LogContent::new(END_TIME_FIELD, end.to_string()));
        contents.push(LogContent::new(DURATION_FIELD, duration.to_string()));
        contents.push(LogContent::new(
            ATTRIBUTES_FIELD,
            attributes_to_json(&span.attributes).to_string(),
        ));
        contents.push(LogContent::new(EVENTS_FIELD, events));
        contents.push(LogContent::new(LINKS_FIELD, links));
        contents.push(LogContent::new(
            STATUS_CODE_FIELD,
            span.status.code.as_short_str(),
        ));
        contents.push(LogContent::new(
            STATUS_DESCRIPTION_FIELD,
            span.status.message.as_str(),
        ));

        Ok(LogRecord {
            time: (time_nanos / NANOS_PER_MILLI) as i64,
            contents,
        })
    }
}

#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct LogTag {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(string, tag = "2")]
    pub value: String,
}

#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct LogGroup {
    #[prost(message, repeated, tag = "1")]
    pub logs: Vec<LogRecord>,
    #[prost(string, tag = "2")]
    pub source: String,
    #[prost(message, repeated, tag = "3")]
    pub log_tags: Vec<LogTag>,
    #[prost(string, tag = "4")]
    pub file_name: String,
}

/// The delivery unit of one `PutLogs` call, protobuf-encoded on the wire.
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct LogGroupList {
    #[prost(message, repeated, tag = "1")]
    pub log_groups: Vec<LogGroup>,
}

impl LogGroupList {
    /// Puts every record into a single group. There is no splitting by size
    /// or count.
    pub fn single(logs: Vec<LogRecord>) -> Self {
        LogGroupList {
            log_groups: vec![LogGroup {
                logs,
                ..Default::default()
            }],
        }
    }

    pub fn record_count(&self) -> usize {
        self.log_groups.iter().map(|g| g.logs.len()).sum()
    }
}

/// Flattens a whole batch, one record per span, in batch order.
pub fn translate(batch: &TraceBatch) -> Vec<LogRecord> {
    batch.iter().flat_map(resource_spans_to_records).collect()
}

pub fn translate_to_group_list(batch: &TraceBatch) -> LogGroupList {
    LogGroupList::single(translate(batch))
}

fn resource_spans_to_records(resource_spans: &ResourceSpans) -> Vec<LogRecord> {
    let resource_contents = resource_to_contents(&resource_spans.resource);
    let mut records = Vec::new();
    for scope_spans in &resource_spans.scope_spans {
        let scope_contents = scope_to_contents(&scope_spans.scope);
        for span in &scope_spans.spans {
            match LogRecord::from_span(span, &resource_contents, &scope_contents) {
                Ok(record) => records.push(record),
                Err(err) => warn!(
                    "Skipping span {:?} ({}): could not encode its contents: {}",
                    span.name,
                    span.span_id.to_hex_or_empty(),
                    err
                ),
            }
        }
    }
    records
}

fn resource_to_contents(resource: &Resource) -> Vec<LogContent> {
    let attributes = &resource.attributes;
    let lookup = |key: &str| {
        attributes
            .get(key)
            .map(|v| v.as_string())
            .unwrap_or_default()
    };

    let others: Map<String, Value> = attributes
        .iter()
        .filter(|(k, _)| k.as_str() != HOST_NAME_KEY && k.as_str() != SERVICE_NAME_KEY)
        .map(|(k, v)| (k.clone(), Value::String(v.as_string())))
        .collect();

    vec![
        LogContent::new(HOST_FIELD, lookup(HOST_NAME_KEY)),
        LogContent::new(SERVICE_NAME_FIELD, lookup(SERVICE_NAME_KEY)),
        LogContent::new(RESOURCE_FIELD, Value::Object(others).to_string()),
    ]
}

fn scope_to_contents(scope: &InstrumentationScope) -> Vec<LogContent> {
    vec![
        LogContent::new(OTLP_NAME_FIELD, scope.name.as_str()),
        LogContent::new(OTLP_VERSION_FIELD, scope.version.as_str()),
    ]
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct EventEntry<'a> {
    attributes: Value,
    name: &'a str,
    time: u64,
}

#[derive(Serialize)]
struct LinkEntry {
    #[serde(rename = "Attributes")]
    attributes: Value,
    #[serde(rename = "SpanID")]
    span_id: String,
    #[serde(rename = "TraceID")]
    trace_id: String,
}

fn events_to_entries(events: &[Event]) -> Vec<EventEntry<'_>> {
    events
        .iter()
        .map(|e| EventEntry {
            attributes: attributes_to_json(&e.attributes),
            name: &e.name,
            time: e.time_unix_nano,
        })
        .collect()
}

fn links_to_entries(links: &[Link]) -> Vec<LinkEntry> {
    links
        .iter()
        .map(|l| LinkEntry {
            attributes: attributes_to_json(&l.attributes),
            span_id: l.span_id.to_hex_or_empty(),
            trace_id: l.trace_id.to_hex_or_empty(),
        })
        .collect()
}

fn now_unix_nanos() -> u64 {
    Utc::now()
        .timestamp_nanos_opt()
        .map(|n| n.max(0) as u64)
        .unwrap_or_default()
}
