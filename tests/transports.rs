//! Backend tests against a raw TCP mock server. Each scenario runs on both
//! the hyper and the reqwest transport.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use futures_util::{stream, TryStreamExt};

use relay_client::config::{ClientConfig, TransportKind};
use relay_client::{Error, HyperTransport, ReqwestTransport, Sender, Transport, TransportCallback};

mod common;

use common::{closed_port, keep_alive_response, response, start_backend, transport_config, Reply};

const KINDS: [TransportKind; 2] = [TransportKind::Hyper, TransportKind::Reqwest];

fn transport(kind: TransportKind, base_url: &str) -> Arc<dyn Transport> {
    let config = transport_config(base_url);
    match kind {
        TransportKind::Hyper => Arc::new(HyperTransport::new(&config).unwrap()),
        TransportKind::Reqwest => Arc::new(ReqwestTransport::new(&config).unwrap()),
    }
}

fn sender(kind: TransportKind, base_url: &str) -> Sender {
    Sender::builder(transport(kind, base_url)).build()
}

#[tokio::test]
async fn get_reaches_backend_with_resolved_path() {
    for kind in KINDS {
        let backend = start_backend(|_| {
            Reply::Raw(response(200, "OK", &[("Content-Type", "text/plain; charset=utf-8")], b"hi there"))
        })
        .await;
        let sender = sender(kind, &backend.base_url());

        let request = sender
            .get("/users/{id}")
            .param("{id}", "a b")
            .param(";v", "2")
            .param("page", "3")
            .header("X-Trace", "t-1")
            .build()
            .unwrap();
        let mut resp = sender.execute(&request).await.unwrap();

        assert_eq!(resp.status(), 200, "{kind:?}");
        assert_eq!(resp.message(), "OK");
        assert_eq!(resp.charset(), "utf-8");
        assert_eq!(resp.text().await.unwrap(), "hi there");

        let seen = backend.requests();
        assert_eq!(seen[0].method, "GET");
        assert_eq!(seen[0].target, "/users/a%20b;v=2?page=3", "{kind:?}");
        assert_eq!(seen[0].header("x-trace"), Some("t-1"));
    }
}

#[tokio::test]
async fn post_body_and_content_type_are_sent() {
    for kind in KINDS {
        let backend = start_backend(|_| Reply::Raw(response(201, "Created", &[], b""))).await;
        let sender = sender(kind, &backend.base_url());

        let request = sender
            .post("/items")
            .json(&serde_json::json!({"n": 1}))
            .build()
            .unwrap();
        let resp = sender.execute(&request).await.unwrap();
        assert_eq!(resp.status(), 201);

        let seen = backend.requests();
        assert_eq!(seen[0].method, "POST");
        assert_eq!(seen[0].body, br#"{"n":1}"#, "{kind:?}");
        assert_eq!(seen[0].header("content-type"), Some("application/json; charset=utf-8"));
    }
}

#[tokio::test]
async fn gzip_body_is_decoded_transparently() {
    let gzipped = gzip(br#"{"compressed":true}"#);

    for kind in KINDS {
        let body = gzipped.clone();
        let backend = start_backend(move |_| {
            Reply::Raw(response(
                200,
                "OK",
                &[("Content-Type", "application/json"), ("Content-Encoding", "gzip")],
                &body,
            ))
        })
        .await;
        let sender = sender(kind, &backend.base_url());

        let value = sender
            .extract::<serde_json::Value>(&sender.get("/z").build().unwrap())
            .await
            .unwrap();
        assert_eq!(value.value["compressed"], true, "{kind:?}");
    }
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

#[tokio::test]
async fn encoded_response_without_body_is_empty() {
    for kind in KINDS {
        let backend = start_backend(|request| {
            if request.method == "HEAD" {
                Reply::Raw(
                    b"HTTP/1.1 200 OK\r\nContent-Encoding: gzip\r\nContent-Length: 25\r\nConnection: close\r\n\r\n".to_vec(),
                )
            } else {
                Reply::Raw(response(200, "OK", &[("Content-Encoding", "gzip")], b""))
            }
        })
        .await;
        let sender = sender(kind, &backend.base_url());

        let mut resp = sender.execute(&sender.head("/h").build().unwrap()).await.unwrap();
        assert!(resp.bytes().await.unwrap().is_empty(), "{kind:?}");

        let mut resp = sender.execute(&sender.get("/g").build().unwrap()).await.unwrap();
        assert_eq!(resp.text().await.unwrap(), "", "{kind:?}");
    }
}

#[tokio::test]
async fn streamed_gzip_body_is_decoded() {
    let gzipped = gzip(b"hello, streamed world");
    for kind in KINDS {
        let body = gzipped.clone();
        let backend = start_backend(move |_| Reply::Raw(response(200, "OK", &[("Content-Encoding", "gzip")], &body))).await;
        let sender = sender(kind, &backend.base_url());

        let mut resp = sender.execute(&sender.get("/s").build().unwrap()).await.unwrap();
        let chunks: Vec<Bytes> = resp.take_body().unwrap().into_chunks().try_collect().await.unwrap();
        assert_eq!(chunks.concat(), b"hello, streamed world", "{kind:?}");
    }
}

#[tokio::test]
async fn wire_reason_phrase_is_kept() {
    for kind in KINDS {
        let backend = start_backend(|_| Reply::Raw(response(200, "Fine", &[], b""))).await;
        let sender = sender(kind, &backend.base_url());

        let resp = sender.execute(&sender.get("/").build().unwrap()).await.unwrap();
        assert_eq!(resp.message(), "Fine", "{kind:?}");
    }
}

#[tokio::test]
async fn slow_upload_is_not_a_read_timeout() {
    for kind in KINDS {
        let backend =
            start_backend(|_| Reply::Delayed(Duration::from_millis(100), response(200, "OK", &[], b"stored"))).await;
        let sender = sender(kind, &backend.base_url());

        let late = stream::once(async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            Ok::<_, std::io::Error>(Bytes::from_static(b"late chunk"))
        });
        let request = sender
            .put("/upload")
            .content_type("application/octet-stream")
            .stream(late)
            .read_timeout(Duration::from_millis(200))
            .build()
            .unwrap();
        let mut resp = sender.execute(&request).await.unwrap();
        assert_eq!(resp.text().await.unwrap(), "stored", "{kind:?}");
        assert_eq!(backend.requests()[0].body, b"late chunk", "{kind:?}");
    }
}

#[tokio::test]
async fn unreachable_host_is_a_connect_error() {
    for kind in KINDS {
        let mut config = transport_config("http://10.255.255.1:81");
        config.connect_timeout_ms = 300;
        config.read_timeout_ms = 100;
        let transport: Arc<dyn Transport> = match kind {
            TransportKind::Hyper => Arc::new(HyperTransport::new(&config).unwrap()),
            TransportKind::Reqwest => Arc::new(ReqwestTransport::new(&config).unwrap()),
        };
        let sender = Sender::builder(transport).build();

        let err = sender.execute(&sender.get("/").build().unwrap()).await.unwrap_err();
        assert!(matches!(err, Error::Connect(_)), "{kind:?}: {err}");
    }
}

#[tokio::test]
async fn hyper_transport_rejects_https() {
    let config = transport_config("https://example.com");
    assert!(HyperTransport::new(&config).is_err());
    assert!(ReqwestTransport::new(&config).is_ok());
}

#[tokio::test]
async fn close_drops_pooled_connections() {
    for kind in KINDS {
        let backend = start_backend(|_| Reply::KeepAlive(keep_alive_response(200, "OK", b"pooled"))).await;
        let sender = sender(kind, &backend.base_url());

        let mut resp = sender.execute(&sender.get("/").build().unwrap()).await.unwrap();
        assert_eq!(resp.text().await.unwrap(), "pooled");
        drop(resp);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(backend.disconnects(), 0, "{kind:?}");

        sender.close().await;
        let closed = async {
            while backend.disconnects() == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(2), closed).await.unwrap();

        let err = sender.execute(&sender.get("/").build().unwrap()).await.unwrap_err();
        assert!(matches!(err, Error::Connect(_)), "{kind:?}");
        assert_eq!(backend.hits(), 1);
    }
}

#[tokio::test]
async fn connect_failure_is_normalized() {
    let addr = closed_port().await;
    for kind in KINDS {
        let sender = sender(kind, &format!("http://{addr}"));
        let err = sender.execute(&sender.get("/").build().unwrap()).await.unwrap_err();
        assert!(matches!(err, Error::Connect(_)), "{kind:?}: {err}");
    }
}

#[tokio::test]
async fn slow_headers_time_out() {
    for kind in KINDS {
        let backend = start_backend(|_| Reply::Delayed(Duration::from_millis(500), response(200, "OK", &[], b"late")))
            .await;
        let sender = sender(kind, &backend.base_url());

        let request = sender
            .get("/slow")
            .read_timeout(Duration::from_millis(100))
            .build()
            .unwrap();
        let err = sender.execute(&request).await.unwrap_err();
        assert!(matches!(err, Error::ReadTimeout(_)), "{kind:?}: {err}");
    }
}

#[tokio::test]
async fn stalled_body_times_out_between_chunks() {
    for kind in KINDS {
        let backend = start_backend(|_| {
            Reply::Stall(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\npartial".to_vec())
        })
        .await;
        let sender = sender(kind, &backend.base_url());

        let request = sender
            .get("/stall")
            .read_timeout(Duration::from_millis(150))
            .build()
            .unwrap();
        let mut resp = sender.execute(&request).await.unwrap();
        let err = resp.bytes().await.unwrap_err();
        assert!(matches!(err, Error::ReadTimeout(_)), "{kind:?}: {err}");
    }
}

#[tokio::test]
async fn closed_transport_refuses_calls() {
    for kind in KINDS {
        let backend = start_backend(|_| Reply::Raw(response(200, "OK", &[], b""))).await;
        let sender = sender(kind, &backend.base_url());

        sender.close().await;
        let err = sender.execute(&sender.get("/").build().unwrap()).await.unwrap_err();
        assert!(matches!(err, Error::Connect(_)), "{kind:?}");
        assert_eq!(backend.hits(), 0);
    }
}

#[derive(Default)]
struct Events(Mutex<Vec<String>>);

impl Events {
    fn push(&self, event: String) {
        self.0.lock().unwrap().push(event);
    }

    fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

impl TransportCallback for Events {
    fn on_request_completed(&self) {
        self.push("completed".into());
    }

    fn on_request_failure(&self, error: &Error) {
        self.push(format!("request_failure:{}", error.class()));
    }

    fn on_response_status(&self, status: u16, _message: &str) {
        self.push(format!("status:{status}"));
    }

    fn on_response_headers(&self, _headers: &relay_client::ParamContainer) {
        self.push("headers".into());
    }

    fn on_response_payload(&self, payload: bytes::Bytes) {
        self.push(format!("payload:{}", String::from_utf8_lossy(&payload)));
    }

    fn on_response_failure(&self, error: &Error) {
        self.push(format!("response_failure:{}", error.class()));
    }
}

#[tokio::test]
async fn callback_protocol_on_real_backends() {
    let refused = closed_port().await;
    for kind in KINDS {
        let backend = start_backend(|_| Reply::Raw(response(404, "Not Found", &[], b"nope"))).await;
        let events = Arc::new(Events::default());

        let sender = sender(kind, &backend.base_url());
        sender
            .start_with_callback(sender.get("/missing").build().unwrap(), events.clone())
            .await
            .unwrap();
        assert_eq!(
            events.take(),
            ["completed", "status:404", "headers", "payload:nope"],
            "{kind:?}"
        );

        let sender = self::sender(kind, &format!("http://{refused}"));
        sender
            .start_with_callback(sender.get("/").build().unwrap(), events.clone())
            .await
            .unwrap();
        assert_eq!(events.take(), ["request_failure:connect"], "{kind:?}");
    }
}

#[tokio::test]
async fn configured_sender_round_trips() {
    let backend = start_backend(|request| {
        let body = format!(r#"{{"agent":"{}"}}"#, request.header("user-agent").unwrap_or(""));
        Reply::Raw(response(200, "OK", &[("Content-Type", "application/json")], body.as_bytes()))
    })
    .await;

    let mut config = ClientConfig::default();
    config.transport.base_urls = vec![backend.base_url()];
    config.retries.enabled = false;
    let sender = Sender::from_config(&config).unwrap();

    let value = sender
        .extract::<serde_json::Value>(&sender.get("/whoami").build().unwrap())
        .await
        .unwrap();
    assert!(value.value["agent"].as_str().unwrap().starts_with("relay-client/"));

    let seen = backend.requests();
    assert!(seen[0].header("x-request-id").is_some());
    assert_eq!(seen[0].header("accept-encoding"), Some("gzip, deflate"));
}
