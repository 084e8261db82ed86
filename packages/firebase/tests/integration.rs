use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use firebase_rest::{AuthToken, ClientConfig, Error, Reference};

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
struct Dinosaur {
    name: String,
    height: f64,
}

fn stego() -> Dinosaur {
    Dinosaur {
        name: "stegosaurus".to_string(),
        height: 4.0,
    }
}

#[tokio::test]
async fn test_value_reads_and_decodes() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/dinosaurs/stego/.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(stego()))
        .mount(&server)
        .await;

    let uri = server.uri();

    let result = tokio::task::spawn_blocking(move || {
        let root = Reference::new(&uri).unwrap();
        root.child("dinosaurs")
            .child("stego")
            .value::<Dinosaur>()
            .unwrap()
    })
    .await
    .unwrap();

    assert_eq!(result, stego());
}

#[tokio::test]
async fn test_shared_auth_sent_as_query_param() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/private/.json"))
        .and(query_param("auth", "rotated"))
        .and(query_param("shallow", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"a": true})))
        .mount(&server)
        .await;

    let uri = server.uri();

    let result = tokio::task::spawn_blocking(move || {
        let root = Reference::new(&uri).unwrap();
        let token = Arc::new(AuthToken::new("initial"));
        root.auth("local");
        root.set_shared_auth(&token);
        let private = root.child("private").shallow(true);

        token.set("rotated");
        private.value::<serde_json::Value>().unwrap()
    })
    .await
    .unwrap();

    assert_eq!(result, serde_json::json!({"a": true}));
}

#[tokio::test]
async fn test_push_returns_generated_child() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/dinosaurs/.json"))
        .and(body_json(stego()))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"name": "-Nabc123"})),
        )
        .mount(&server)
        .await;

    let uri = server.uri();
    let expected = format!("{}/dinosaurs/-Nabc123", uri);

    let pushed_url = tokio::task::spawn_blocking(move || {
        let root = Reference::new(&uri).unwrap();
        root.child("dinosaurs").push(&stego()).unwrap().url()
    })
    .await
    .unwrap();

    assert_eq!(pushed_url, expected);
}

#[tokio::test]
async fn test_set_update_remove() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/dinosaurs/stego/.json"))
        .and(body_json(stego()))
        .respond_with(ResponseTemplate::new(200).set_body_json(stego()))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/dinosaurs/stego/.json"))
        .and(body_json(serde_json::json!({"height": 9.0})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"height": 9.0})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/dinosaurs/stego/.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("null"))
        .expect(1)
        .mount(&server)
        .await;

    let uri = server.uri();

    let result = tokio::task::spawn_blocking(move || -> Result<(), Error> {
        let stego_ref = Reference::new(&uri).unwrap().child("dinosaurs/stego");
        stego_ref.set(&stego())?;
        stego_ref.update(&serde_json::json!({"height": 9.0}))?;
        stego_ref.remove()
    })
    .await
    .unwrap();

    assert!(result.is_ok());
}

#[tokio::test]
async fn test_error_status_is_remote_error_with_body() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/locked/.json"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Permission denied"))
        .mount(&server)
        .await;

    let uri = server.uri();

    let result = tokio::task::spawn_blocking(move || {
        Reference::new(&uri).unwrap().child("locked").read()
    })
    .await
    .unwrap();

    match result {
        Err(Error::Remote { status, message }) => {
            assert_eq!(status, 401);
            assert_eq!(message, "Permission denied");
        }
        other => panic!("expected remote error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_slow_headers_are_timeout_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow/.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("1")
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let uri = server.uri();

    let result = tokio::task::spawn_blocking(move || {
        let config = ClientConfig::builder()
            .timeout(Duration::from_millis(100))
            .build();
        Reference::with_config(&uri, &config)
            .unwrap()
            .child("slow")
            .read()
    })
    .await
    .unwrap();

    let err = result.unwrap_err();
    assert!(err.is_timeout(), "expected timeout, got {:?}", err);
}

#[tokio::test]
async fn test_refused_connection_is_transport_error() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let result = tokio::task::spawn_blocking(move || {
        Reference::new(&format!("http://127.0.0.1:{}", port))
            .unwrap()
            .read()
    })
    .await
    .unwrap();

    assert!(matches!(result, Err(Error::Transport { .. })));
}

async fn mount_redirect_chain(server: &MockServer, hops: usize) {
    let uri = server.uri();
    for hop in 0..hops {
        Mock::given(method("GET"))
            .and(path(format!("/hop/{}/.json", hop)))
            .and(header("x-firebase-etag", "true"))
            .respond_with(
                ResponseTemplate::new(307)
                    .insert_header("Location", format!("{}/hop/{}/.json", uri, hop + 1).as_str()),
            )
            .mount(server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path(format!("/hop/{}/.json", hops)))
        .and(header("x-firebase-etag", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_string("\"arrived\""))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_thirty_redirects_keep_headers() {
    let server = MockServer::start().await;
    mount_redirect_chain(&server, 30).await;

    let uri = server.uri();

    let result = tokio::task::spawn_blocking(move || {
        let start = Reference::new(&uri).unwrap().child("hop/0");
        start.set_header("X-Firebase-ETag", "true").unwrap();
        start.value::<String>()
    })
    .await
    .unwrap();

    assert_eq!(result.unwrap(), "arrived");
}

#[tokio::test]
async fn test_thirty_one_redirects_fail() {
    let server = MockServer::start().await;
    mount_redirect_chain(&server, 31).await;

    let uri = server.uri();

    let result = tokio::task::spawn_blocking(move || {
        let start = Reference::new(&uri).unwrap().child("hop/0");
        start.set_header("X-Firebase-ETag", "true").unwrap();
        start.read()
    })
    .await
    .unwrap();

    assert!(
        matches!(result, Err(Error::TooManyRedirects { hops: 31 })),
        "got {:?}",
        result
    );
}

#[tokio::test]
async fn test_cross_origin_redirect_keeps_method_body_and_headers() {
    let origin = MockServer::start().await;
    let replica = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/dinosaurs/.json"))
        .respond_with(ResponseTemplate::new(307).insert_header(
            "Location",
            format!("{}/dinosaurs/.json", replica.uri()).as_str(),
        ))
        .mount(&origin)
        .await;

    Mock::given(method("PUT"))
        .and(path("/dinosaurs/.json"))
        .and(header("authorization", "Bearer oauth-token"))
        .and(body_json(stego()))
        .respond_with(ResponseTemplate::new(200).set_body_json(stego()))
        .expect(1)
        .mount(&replica)
        .await;

    let uri = origin.uri();

    let result = tokio::task::spawn_blocking(move || {
        let dinosaurs = Reference::new(&uri).unwrap().child("dinosaurs");
        dinosaurs
            .set_header("Authorization", "Bearer oauth-token")
            .unwrap();
        dinosaurs.set(&stego())
    })
    .await
    .unwrap();

    assert!(result.is_ok(), "got {:?}", result);
}

#[tokio::test]
async fn test_see_other_redirect_switches_to_get() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/queue/.json"))
        .respond_with(ResponseTemplate::new(303).insert_header("Location", "/done/.json"))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/done/.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"name": "k1"})))
        .mount(&server)
        .await;

    let uri = server.uri();
    let expected = format!("{}/queue/k1", uri);

    let pushed = tokio::task::spawn_blocking(move || {
        Reference::new(&uri)
            .unwrap()
            .child("queue")
            .push(&stego())
            .map(|r| r.url())
    })
    .await
    .unwrap();

    assert_eq!(pushed.unwrap(), expected);
}

/// Serves one response whose headers go out at once and whose body trickles
/// in after `body_delay`.
fn serve_slow_body(body_delay: Duration) -> (String, std::thread::JoinHandle<()>) {
    use std::io::{Read, Write};

    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let uri = format!("http://{}", listener.local_addr().unwrap());

    let handle = std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();

        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = stream.read(&mut buf).unwrap();
            if n == 0 {
                return;
            }
            request.extend_from_slice(&buf[..n]);
        }

        stream
            .write_all(
                b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 9\r\nConnection: close\r\n\r\n\"abc",
            )
            .unwrap();
        stream.flush().unwrap();
        std::thread::sleep(body_delay);
        stream.write_all(b"defg\"").unwrap();
        stream.flush().unwrap();
    });

    (uri, handle)
}

#[test]
fn test_slow_body_after_prompt_headers_is_not_a_timeout() {
    let (uri, server) = serve_slow_body(Duration::from_millis(600));

    let config = ClientConfig::builder()
        .timeout(Duration::from_millis(300))
        .build();
    let result = Reference::with_config(&uri, &config)
        .unwrap()
        .value::<String>();

    server.join().unwrap();
    assert_eq!(result.unwrap(), "abcdefg");
}
