//! Turns OpenTelemetry trace batches into Volcengine TLS log records and
//! uploads them with `PutLogs`.

pub mod api;
pub mod client;
pub mod error;
pub mod ingest;
pub mod model;
pub mod sign;

pub use crate::{
    api::{translate, LogContent, LogGroup, LogGroupList, LogRecord, LogTag},
    client::{Config, Credentials, Destination, DestinationOverride, SecretKey, Uploader},
    error::{Error, IngestionError},
    ingest::{HttpIngestion, LogIngestion},
    model::{
        AttributeValue, Attributes, Event, InstrumentationScope, Link, Resource, ResourceSpans,
        ScopeSpans, Span, SpanId, SpanKind, Status, StatusCode, TraceBatch, TraceId,
    },
};
