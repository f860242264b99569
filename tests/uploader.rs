use std::sync::{Arc, Mutex};
use volcengine_tls_traces::{
    api::{NAME_FIELD, SPAN_ID_FIELD},
    Config, Destination, DestinationOverride, Error, IngestionError, LogGroupList, LogIngestion,
    LogRecord, ResourceSpans, ScopeSpans, SecretKey, Span, SpanId, Uploader,
};

#[derive(Default)]
struct Recording {
    calls: Mutex<Vec<(Destination, LogGroupList)>>,
    fail_with: Option<u16>,
}

impl LogIngestion for Recording {
    fn put_logs(&self, destination: &Destination, logs: &LogGroupList) -> Result<(), IngestionError> {
        self.calls
            .lock()
            .unwrap()
            .push((destination.clone(), logs.clone()));
        match self.fail_with {
            Some(status) => Err(IngestionError::RequestFailed {
                status,
                body: "QuotaExceed".to_string(),
            }),
            None => Ok(()),
        }
    }
}

fn config() -> Config {
    Config {
        endpoint: "https://tls-cn-beijing.volces.com".to_string(),
        topic_id: "default-topic".to_string(),
        access_key: "default-ak".to_string(),
        secret_key: SecretKey::new("default-sk"),
        region: "cn-beijing".to_string(),
    }
}

fn recording_uploader() -> (Uploader, Arc<Recording>) {
    let recording = Arc::new(Recording::default());
    let uploader = Uploader::new(config(), recording.clone()).unwrap();
    (uploader, recording)
}

fn records(n: i64) -> Vec<LogRecord> {
    (0..n)
        .map(|i| LogRecord {
            time: i,
            contents: vec![],
        })
        .collect()
}

#[test]
fn test_construction_requires_every_field() {
    assert!(Uploader::new(config(), Recording::default()).is_ok());

    let blanked: Vec<Config> = vec![
        Config {
            endpoint: String::new(),
            ..config()
        },
        Config {
            topic_id: String::new(),
            ..config()
        },
        Config {
            access_key: String::new(),
            ..config()
        },
        Config {
            secret_key: SecretKey::default(),
            ..config()
        },
        Config {
            region: String::new(),
            ..config()
        },
    ];
    for config in blanked {
        match Uploader::new(config, Recording::default()) {
            Err(Error::Configuration(_)) => {}
            other => panic!("expected configuration error, got {:?}", other),
        }
    }
}

#[test]
fn test_submit_without_override_uses_defaults() {
    let (uploader, recording) = recording_uploader();
    uploader.submit(records(3), None).unwrap();

    let calls = recording.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    let (destination, logs) = &calls[0];
    assert_eq!(destination.endpoint, "https://tls-cn-beijing.volces.com");
    assert_eq!(&destination.credentials, uploader.default_credentials());
    assert_eq!(logs.log_groups.len(), 1);
    assert_eq!(logs.record_count(), 3);
}

#[test]
fn test_submit_with_full_override() {
    let (uploader, recording) = recording_uploader();
    let destination_override = DestinationOverride::new("t2", "ak2", "sk2", "cn-shanghai");
    uploader
        .submit(records(1), Some(&destination_override))
        .unwrap();

    let calls = recording.calls.lock().unwrap();
    let credentials = &calls[0].0.credentials;
    assert_eq!(calls[0].0.endpoint, "https://tls-cn-beijing.volces.com");
    assert_eq!(credentials.topic_id, "t2");
    assert_eq!(credentials.access_key, "ak2");
    assert_eq!(credentials.secret_key.expose(), "sk2");
    assert_eq!(credentials.region, "cn-shanghai");
}

#[test]
fn test_submit_with_partial_override_uses_defaults() {
    let full = DestinationOverride::new("t2", "ak2", "sk2", "cn-shanghai");
    let partials = vec![
        DestinationOverride {
            topic_id: None,
            ..full.clone()
        },
        DestinationOverride {
            access_key: None,
            ..full.clone()
        },
        DestinationOverride {
            secret_key: None,
            ..full.clone()
        },
        DestinationOverride {
            region: None,
            ..full.clone()
        },
        DestinationOverride::default(),
    ];

    let (uploader, recording) = recording_uploader();
    for partial in &partials {
        uploader.submit(records(1), Some(partial)).unwrap();
    }

    let calls = recording.calls.lock().unwrap();
    assert_eq!(calls.len(), partials.len());
    for (destination, _) in calls.iter() {
        assert_eq!(&destination.credentials, uploader.default_credentials());
    }
}

#[test]
fn test_submit_surfaces_transport_error_without_retry() {
    let recording = Arc::new(Recording {
        fail_with: Some(429),
        ..Default::default()
    });
    let uploader = Uploader::new(config(), recording.clone()).unwrap();

    let err = uploader.submit(records(2), None).unwrap_err();
    match &err {
        Error::Transmission(IngestionError::RequestFailed { status, body }) => {
            assert_eq!(*status, 429);
            assert_eq!(body, "QuotaExceed");
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(err.to_string(), "put logs failed with status 429: QuotaExceed");
    assert_eq!(recording.calls.lock().unwrap().len(), 1);
}

#[test]
fn test_export_translates_then_submits() {
    let (uploader, recording) = recording_uploader();
    let batch = vec![ResourceSpans {
        scope_spans: vec![ScopeSpans {
            spans: vec![
                Span {
                    name: "first".to_string(),
                    span_id: SpanId([0, 0, 0, 0, 0, 0, 0, 9]),
                    end_time_unix_nano: 3_000_000,
                    ..Default::default()
                },
                Span {
                    name: "second".to_string(),
                    end_time_unix_nano: 4_000_000,
                    ..Default::default()
                },
            ],
            ..Default::default()
        }],
        ..Default::default()
    }];

    uploader.export(&batch, None).unwrap();

    let calls = recording.calls.lock().unwrap();
    let logs = &calls[0].1.log_groups[0].logs;
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].time, 3);
    assert_eq!(logs[0].get(NAME_FIELD), Some("first"));
    assert_eq!(logs[0].get(SPAN_ID_FIELD), Some("0000000000000009"));
    assert_eq!(logs[1].get(NAME_FIELD), Some("second"));
}
