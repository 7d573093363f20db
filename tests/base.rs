use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use fluxline::{BuildError, Client, PointFactory, Registry, Transport, WriteError};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

#[derive(Debug, Clone)]
struct StubRequest {
    method: String,
    target: String,
    body: String,
}

/// Minimal HTTP/1.1 stub standing in for the destination store. Records
/// every request and answers them all with a fixed status.
#[derive(Clone)]
struct Stub {
    requests: Arc<Mutex<Vec<StubRequest>>>,
    status: u16,
}

impl Stub {
    async fn start(status: u16) -> (Self, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let stub = Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            status,
        };

        let accept = stub.clone();
        tokio::spawn(async move {
            while let Ok((stream, _addr)) = listener.accept().await {
                tokio::spawn(handle(stream, accept.clone()));
            }
        });

        (stub, port)
    }

    fn writes(&self) -> Vec<StubRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.target.starts_with("/write"))
            .cloned()
            .collect()
    }

    fn queries(&self) -> Vec<StubRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.target.starts_with("/query"))
            .cloned()
            .collect()
    }
}

async fn handle(mut stream: TcpStream, stub: Stub) {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 1024];

    let header_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        match stream.read(&mut tmp).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&tmp[..n]),
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.lines();
    let request_line = lines.next().unwrap_or_default().to_owned();
    let content_length = lines
        .filter_map(|l| l.split_once(':'))
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = buf[header_end + 4..].to_vec();
    while body.len() < content_length {
        match stream.read(&mut tmp).await {
            Ok(0) | Err(_) => return,
            Ok(n) => body.extend_from_slice(&tmp[..n]),
        }
    }

    let mut parts = request_line.split(' ');
    let method = parts.next().unwrap_or_default().to_owned();
    let target = parts.next().unwrap_or_default().to_owned();
    stub.requests.lock().unwrap().push(StubRequest {
        method,
        target,
        body: String::from_utf8_lossy(&body).to_string(),
    });

    let response = format!(
        "HTTP/1.1 {} Stub\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        stub.status
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

fn builder(port: u16) -> fluxline::ClientBuilder {
    Client::builder()
        .connection("127.0.0.1", port, Transport::Http)
        .database("metrics")
        .username("ingest")
        .password("secret")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn capacity_is_bounded_and_fail_fast() {
    let (_stub, port) = Stub::start(204).await;
    let registry = Registry::new();

    let client = builder(port)
        .queue_capacity(4)
        // Park the flush loop far in the future so nothing drains while the
        // queue fills.
        .auto_flush_period(Duration::from_secs(30))
        .build(&registry)
        .await
        .unwrap();

    // Let the first (empty) flush cycle park.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let factory = PointFactory::builder().size(8).build();
    for seq in 0..4 {
        let mut point = factory.create_point("m").await;
        point.field_i64("seq", seq);
        client.write(point).unwrap();
    }

    let mut point = factory.create_point("m").await;
    point.field_i64("seq", 4);
    assert_eq!(client.write(point).unwrap_err(), WriteError::QueueFull { capacity: 4 });

    client.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn rejected_credentials_abort_the_build() {
    let (stub, port) = Stub::start(401).await;
    let registry = Registry::new();

    let err = builder(port).build(&registry).await.unwrap_err();
    assert!(matches!(
        err,
        BuildError::AccessDenied { ref database, ref username }
            if database == "metrics" && username == "ingest"
    ));

    // Only the validation query reached the stub; no pipeline or flush task
    // was created.
    assert!(registry.is_empty());
    let queries = stub.queries();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].method, "GET");
    assert!(queries[0].target.contains("q=SHOW%20DATABASES"));
    assert!(stub.writes().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn single_point_flushes_within_one_period() {
    let (stub, port) = Stub::start(204).await;
    let registry = Registry::new();

    let client = builder(port)
        .auto_flush_period(Duration::from_millis(100))
        .build(&registry)
        .await
        .unwrap();

    let factory = PointFactory::builder().size(4).build();
    let mut point = factory.create_point("temperature").await;
    point.tag("host", "h1").field_f64("value", 21.5).timestamp(42);
    client.write(point).unwrap();

    tokio::time::sleep(Duration::from_millis(400)).await;

    let writes = stub.writes();
    assert_eq!(writes.len(), 1, "expected exactly one transmitted batch");
    assert_eq!(writes[0].method, "POST");
    assert_eq!(writes[0].body, "temperature,host=h1 value=21.5 42\n");
    assert!(writes[0].target.contains("db=metrics"));
    assert!(writes[0].target.contains("u=ingest"));
    assert!(writes[0].target.contains("p=secret"));
    assert!(writes[0].target.contains("consistency=one"));
    assert!(writes[0].target.contains("precision=n"));
    assert!(writes[0].target.contains("rp=autogen"));

    client.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn identical_destinations_share_one_pipeline() {
    let (stub, port) = Stub::start(204).await;
    let registry = Registry::new();

    let first = builder(port)
        .auto_flush_period(Duration::from_millis(300))
        .build(&registry)
        .await
        .unwrap();
    let second = builder(port)
        .auto_flush_period(Duration::from_millis(300))
        .build(&registry)
        .await
        .unwrap();

    // Each build validates credentials, but both handles share one
    // pipeline.
    assert_eq!(stub.queries().len(), 2);
    assert_eq!(registry.len(), 1);

    let factory = PointFactory::builder().size(4).build();
    let mut a = factory.create_point("m").await;
    a.field_i64("handle", 1).timestamp(1);
    first.write(a).unwrap();
    let mut b = factory.create_point("m").await;
    b.field_i64("handle", 2).timestamp(2);
    second.write(b).unwrap();

    tokio::time::sleep(Duration::from_millis(600)).await;

    // One flush task, one batch carrying both handles' points in
    // submission order.
    let writes = stub.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].body, "m handle=1i 1\nm handle=2i 2\n");

    // Closing through either handle tears the shared pipeline down for
    // both.
    first.close().await;
    assert!(second.is_closed());
    let mut late = factory.create_point("m").await;
    late.field_i64("handle", 2);
    assert_eq!(second.write(late).unwrap_err(), WriteError::Closed);
    assert!(registry.is_empty());

    second.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn close_waits_for_the_loop_and_stops_transmissions() {
    let (stub, port) = Stub::start(204).await;
    let registry = Registry::new();

    let client = builder(port)
        .auto_flush_period(Duration::from_secs(30))
        .build(&registry)
        .await
        .unwrap();

    // Let the first (empty) flush cycle park, then queue points that will
    // never be drained before the shutdown signal.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let factory = PointFactory::builder().size(4).build();
    for seq in 0..3 {
        let mut point = factory.create_point("m").await;
        point.field_i64("seq", seq);
        client.write(point).unwrap();
    }

    client.close().await;
    assert!(registry.is_empty());

    // Shutdown does not drain: the queued points were discarded, their
    // storage released, and no transmission happened after close returned.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(stub.writes().is_empty());

    let mut held = Vec::new();
    for _ in 0..4 {
        held.push(
            factory
                .create_point_timeout("m", Duration::from_millis(100))
                .await
                .unwrap(),
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn create_database_issues_the_admin_query() {
    let (stub, port) = Stub::start(200).await;
    let registry = Registry::new();

    let client = builder(port).build(&registry).await.unwrap();
    client.create_database("retro metrics").await.unwrap();

    let queries = stub.queries();
    let create = queries.last().unwrap();
    assert_eq!(create.method, "POST");
    assert!(create.target.contains("q=create+database+retro%20metrics"));

    client.close().await;
}
