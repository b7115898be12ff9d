use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use pulsekit_core::{CncModule, CncValue};
use pulsekit_mtconnect::{shdr_timestamp, Adapter, MtConnectModule, ShdrServer};
use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::thread;
use std::time::{Duration, Instant};

fn at(seconds: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, seconds).unwrap()
}

/// Poll `f` until it returns true or a few seconds elapsed
fn eventually(mut f: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if f() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}

fn connect(port: u16) -> BufReader<TcpStream> {
    let stream = TcpStream::connect(("127.0.0.1", port)).expect("Failed to connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    BufReader::new(stream)
}

fn read_line(reader: &mut BufReader<TcpStream>) -> String {
    let mut line = String::new();
    reader.read_line(&mut line).expect("Failed to read line");
    line
}

#[test]
fn test_ping_answered_with_heartbeat() {
    let mut server = ShdrServer::bind("127.0.0.1:0", Duration::from_millis(2500)).unwrap();
    let port = server.local_addr().unwrap().port();
    let mut agent = connect(port);

    assert!(eventually(|| {
        server.accept_new();
        server.client_count() == 1
    }));

    agent.get_mut().write_all(b"* PING\r\n").unwrap();
    assert!(eventually(|| {
        server.read_from_clients();
        agent.get_ref().set_nonblocking(true).unwrap();
        let mut peeked = [0u8; 1];
        let ready = agent.get_ref().peek(&mut peeked).map(|n| n > 0).unwrap_or(false);
        agent.get_ref().set_nonblocking(false).unwrap();
        ready
    }));
    assert_eq!(read_line(&mut agent), "* PONG 2500\n");
}

#[test]
fn test_closed_agent_dropped() {
    let mut server = ShdrServer::bind("127.0.0.1:0", Duration::from_secs(10)).unwrap();
    let port = server.local_addr().unwrap().port();
    let agent = connect(port);
    assert!(eventually(|| {
        server.accept_new();
        server.client_count() == 1
    }));

    drop(agent);
    assert!(eventually(|| {
        server.read_from_clients();
        server.client_count() == 0
    }));
}

#[test]
fn test_slow_agent_kept_with_backlog() {
    let mut server = ShdrServer::bind("127.0.0.1:0", Duration::from_secs(10)).unwrap();
    let port = server.local_addr().unwrap().port();
    let mut agent = connect(port);
    assert!(eventually(|| {
        server.accept_new();
        server.client_count() == 1
    }));

    // 2 MiB while the agent reads nothing, more than the socket buffers hold
    let line = format!("{}\n", "x".repeat(1023));
    for _ in 0..2048 {
        server.send(&line);
    }
    assert_eq!(server.client_count(), 1);

    let mut received = String::new();
    for _ in 0..2048 {
        server.read_from_clients();
        received.clear();
        agent.read_line(&mut received).expect("Failed to read line");
        assert_eq!(received, line);
    }
    assert_eq!(server.client_count(), 1);
    assert_eq!(server.backlog_len(), 0);
}

#[test]
fn test_module_publishes_initial_and_changed_data() {
    let adapter = Adapter::new().with_host("127.0.0.1").with_port(0);
    let mut module = MtConnectModule::new(1, adapter);

    module.start(at(0)).unwrap();
    module.set("ProgramName", CncValue::from("O1000")).unwrap();
    module.set("Running", CncValue::Bool(true)).unwrap();
    module.finish().unwrap();

    let port = module.get("Port").unwrap().as_i64().unwrap() as u16;
    let mut agent = connect(port);

    assert!(eventually(|| {
        module.start(at(1)).unwrap();
        let connected = module.adapter().client_count() == 1;
        if connected {
            module.set("Running", CncValue::Bool(false)).unwrap();
            module.set("ProgramName", CncValue::from("O1000")).unwrap();
        }
        module.finish().unwrap();
        connected
    }));

    let initial = read_line(&mut agent);
    assert!(initial.starts_with("2024-06-01T12:00:01.0000Z"));
    assert!(initial.ends_with("|program|O1000|avail|AVAILABLE|execution|ACTIVE\n"));

    let changed = read_line(&mut agent);
    assert!(changed.starts_with(&shdr_timestamp(at(1))));
    assert!(changed.ends_with("Z|execution|INTERRUPTED\n"));
    assert_eq!(module.get("ClientCount").unwrap(), CncValue::Int(1));
}

#[test]
fn test_error_flushes_unavailable_immediately() {
    let adapter = Adapter::new().with_host("127.0.0.1").with_port(0);
    let mut module = MtConnectModule::new(2, adapter);
    module.start(at(0)).unwrap();
    module.set("X", CncValue::Double(1.25)).unwrap();
    module.finish().unwrap();

    let port = module.get("Port").unwrap().as_i64().unwrap() as u16;
    let mut agent = connect(port);
    assert!(eventually(|| {
        module.start(at(1)).unwrap();
        let connected = module.adapter().client_count() == 1;
        if connected {
            module.set("Error", CncValue::Bool(true)).unwrap();
        }
        module.finish().unwrap();
        connected
    }));

    assert!(read_line(&mut agent).ends_with("|Xact|1.25|avail|AVAILABLE\n"));
    assert_eq!(
        read_line(&mut agent),
        format!("{}|Xact|UNAVAILABLE|avail|UNAVAILABLE\n", shdr_timestamp(at(1)))
    );
}

proptest! {
    #[test]
    fn prop_timestamp_has_fixed_shape(millis in 0i64..4_000_000_000_000i64) {
        let at = DateTime::from_timestamp_millis(millis).unwrap();
        let text = shdr_timestamp(at);
        prop_assert_eq!(text.len(), 25);
        prop_assert!(text.ends_with('Z'));
        prop_assert_eq!(&text[19..20], ".");
    }
}
