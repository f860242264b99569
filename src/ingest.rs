use crate::{
    api::LogGroupList,
    client::Destination,
    error::IngestionError,
    sign::{sign, RequestToSign, SignedHeaders},
};
use chrono::{DateTime, Utc};
use log::trace;
use prost::Message;
use std::{sync::Arc, time::Duration};
use url::Url;

pub const PUT_LOGS_PATH: &str = "/PutLogs";
pub const API_VERSION: &str = "0.3.0";
const CONTENT_TYPE_PROTOBUF: &str = "application/x-protobuf";
const COMPRESS_TYPE_LZ4: &str = "lz4";

/// The remote "put records to a topic" capability.
///
/// Implementations receive the fully resolved destination for every call, so
/// no connection state needs to be shared between calls.
pub trait LogIngestion: Send + Sync {
    fn put_logs(&self, destination: &Destination, logs: &LogGroupList)
        -> Result<(), IngestionError>;
}

impl<T: LogIngestion + ?Sized> LogIngestion for Box<T> {
    fn put_logs(
        &self,
        destination: &Destination,
        logs: &LogGroupList,
    ) -> Result<(), IngestionError> {
        (**self).put_logs(destination, logs)
    }
}

impl<T: LogIngestion + ?Sized> LogIngestion for Arc<T> {
    fn put_logs(
        &self,
        destination: &Destination,
        logs: &LogGroupList,
    ) -> Result<(), IngestionError> {
        (**self).put_logs(destination, logs)
    }
}

/// Blocking HTTP client for the TLS `PutLogs` API.
///
/// The body is the protobuf `LogGroupList`, lz4 block-compressed, with its
/// uncompressed size in `x-tls-bodyrawsize`.
#[derive(Debug, Clone, Default)]
pub struct HttpIngestion {
    timeout: Option<Duration>,
}

impl HttpIngestion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bounds the whole request, connect included.
    pub fn with_timeout(timeout: Duration) -> Self {
        HttpIngestion {
            timeout: Some(timeout),
        }
    }
}

/// A signed `PutLogs` request, ready to send.
#[derive(Debug)]
struct PutLogsRequest {
    url: Url,
    body: Vec<u8>,
    raw_size: usize,
    signed: SignedHeaders,
}

/// Protobuf-encodes `logs` and lz4-compresses the result. Returns the
/// compressed body and the uncompressed size.
fn encode_body(logs: &LogGroupList) -> (Vec<u8>, usize) {
    let raw = logs.encode_to_vec();
    (lz4_flex::block::compress(&raw), raw.len())
}

fn put_logs_url(endpoint: &str, topic_id: &str) -> Result<Url, IngestionError> {
    let mut url = Url::parse(&format!(
        "{}{}",
        endpoint.trim_end_matches('/'),
        PUT_LOGS_PATH
    ))?;
    url.query_pairs_mut().append_pair("TopicId", topic_id);
    Ok(url)
}

/// Authority as sent in the `Host` header; default ports are left out.
fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

fn build_request(
    destination: &Destination,
    logs: &LogGroupList,
    timestamp: DateTime<Utc>,
) -> Result<PutLogsRequest, IngestionError> {
    let credentials = &destination.credentials;
    let url = put_logs_url(&destination.endpoint, &credentials.topic_id)?;
    let (body, raw_size) = encode_body(logs);

    // sign exactly the encoded query that goes on the wire
    let signed = sign(
        &credentials.access_key,
        credentials.secret_key.expose(),
        &credentials.region,
        timestamp,
        &RequestToSign {
            method: "POST",
            host: &host_header(&url),
            path: url.path(),
            query: url.query().unwrap_or_default(),
            content_type: CONTENT_TYPE_PROTOBUF,
            body: &body,
        },
    )
    .map_err(|err| IngestionError::Signing(err.to_string()))?;

    Ok(PutLogsRequest {
        url,
        body,
        raw_size,
        signed,
    })
}

impl LogIngestion for HttpIngestion {
    fn put_logs(
        &self,
        destination: &Destination,
        logs: &LogGroupList,
    ) -> Result<(), IngestionError> {
        let request = build_request(destination, logs, Utc::now())?;

        trace!(
            "Sending {} bytes ({} uncompressed) to {} for topic {}",
            request.body.len(),
            request.raw_size,
            request.url.path(),
            destination.credentials.topic_id
        );

        let mut req = attohttpc::post(request.url.as_str())
            .try_header("Content-Type", CONTENT_TYPE_PROTOBUF)?
            .try_header("X-Tls-Apiversion", API_VERSION)?
            .try_header("X-Tls-Compresstype", COMPRESS_TYPE_LZ4)?
            .try_header("X-Tls-Bodyrawsize", request.raw_size.to_string())?
            .try_header("X-Date", request.signed.date)?
            .try_header("X-Content-Sha256", request.signed.content_sha256)?
            .try_header("Authorization", request.signed.authorization)?;
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }

        let resp = req.bytes(request.body).send()?;
        if resp.is_success() {
            trace!("Sent to volcengine tls: {:?}", resp.status());
            Ok(())
        } else {
            let status = resp.status().as_u16();
            let body = resp.text().unwrap_or_default();
            Err(IngestionError::RequestFailed { status, body })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::{LogContent, LogRecord},
        client::{Credentials, SecretKey},
    };
    use chrono::TimeZone;

    fn destination(endpoint: &str, topic_id: &str) -> Destination {
        Destination {
            endpoint: endpoint.to_string(),
            credentials: Credentials {
                topic_id: topic_id.to_string(),
                access_key: "AKTEST".to_string(),
                secret_key: SecretKey::new("secret"),
                region: "cn-beijing".to_string(),
            },
        }
    }

    fn logs() -> LogGroupList {
        LogGroupList::single(vec![LogRecord {
            time: 1_700_000_000_000,
            contents: vec![LogContent::new("Name", "op")],
        }])
    }

    #[test]
    fn test_body_is_lz4_compressed_protobuf() {
        let (body, raw_size) = encode_body(&logs());
        let raw = lz4_flex::block::decompress(&body, raw_size).unwrap();
        assert_eq!(raw.len(), raw_size);
        assert_eq!(LogGroupList::decode(raw.as_slice()).unwrap(), logs());
    }

    #[test]
    fn test_signed_query_matches_sent_query() {
        let timestamp = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 45).unwrap();
        let request = build_request(
            &destination("https://tls-cn-beijing.volces.com/", "t&x=1 y"),
            &logs(),
            timestamp,
        )
        .unwrap();

        let sent_query = request.url.query().unwrap();
        assert_eq!(sent_query, "TopicId=t%26x%3D1+y");
        assert_eq!(request.url.path(), PUT_LOGS_PATH);

        let expected = sign(
            "AKTEST",
            "secret",
            "cn-beijing",
            timestamp,
            &RequestToSign {
                method: "POST",
                host: "tls-cn-beijing.volces.com",
                path: PUT_LOGS_PATH,
                query: sent_query,
                content_type: CONTENT_TYPE_PROTOBUF,
                body: &request.body,
            },
        )
        .unwrap();
        assert_eq!(request.signed, expected);
    }

    #[test]
    fn test_host_header_keeps_explicit_port() {
        let url = put_logs_url("http://127.0.0.1:8080", "t").unwrap();
        assert_eq!(host_header(&url), "127.0.0.1:8080");
        let url = put_logs_url("https://tls-cn-beijing.volces.com:443", "t").unwrap();
        assert_eq!(host_header(&url), "tls-cn-beijing.volces.com");
    }

    #[test]
    fn test_endpoint_without_scheme_is_rejected() {
        match build_request(&destination("tls-cn-beijing.volces.com", "t"), &logs(), Utc::now()) {
            Err(IngestionError::InvalidEndpoint(_)) => {}
            other => panic!("expected invalid endpoint, got {:?}", other),
        }
    }
}
