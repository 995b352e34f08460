//! End-to-end tests over loopback TCP: a real `Server` and `Client` (or a
//! raw socket playing one side) on separate threads.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use wsengine::protocol::HandshakeRequest;
use wsengine::{
    Client, CloseCode, Config, Error, ErrorKind, FrameConnection, Message, OpCode, Server,
    compute_accept_key,
};

fn server() -> (Server, String) {
    let server = Server::bind("127.0.0.1:0", Config::server()).unwrap();
    let url = format!("ws://127.0.0.1:{}/echo", server.port());
    (server, url)
}

/// Echo text and binary messages until the peer closes.
fn echo(conn: &mut FrameConnection<TcpStream>) {
    while let Ok(Some(payload)) = conn.receive(false) {
        if !conn.is_connected() {
            break;
        }
        if let Some(opcode @ (OpCode::Text | OpCode::Binary)) = conn.last_opcode() {
            conn.send(&payload, opcode, false).unwrap();
        }
    }
}

/// Read an HTTP head from a raw socket, one line at a time.
fn read_head(stream: &TcpStream) -> Vec<u8> {
    let mut reader = BufReader::new(stream);
    let mut head = Vec::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).unwrap() == 0 || line == "\r\n" {
            head.extend_from_slice(b"\r\n");
            return head;
        }
        head.extend_from_slice(line.as_bytes());
    }
}

#[test]
fn test_echo() {
    let (mut server, url) = server();
    let handle = thread::spawn(move || {
        let mut conn = server.accept().unwrap();
        echo(&mut conn);
        conn.close_status()
    });

    let mut client = Client::new(&url).unwrap();
    client.set_fragment_size(1000);

    client.send(b"Hello", OpCode::Text, true).unwrap();
    assert_eq!(client.receive(false).unwrap(), Some(b"Hello".to_vec()));
    assert_eq!(client.last_opcode(), Some(OpCode::Text));

    let big: Vec<u8> = (0..70_000u32).map(|i| (i % 251) as u8).collect();
    client.send_binary(&big).unwrap();
    assert_eq!(client.receive(false).unwrap(), Some(big));
    assert_eq!(client.last_opcode(), Some(OpCode::Binary));

    client.send(b"", OpCode::Text, true).unwrap();
    assert_eq!(
        client.receive_message(false).unwrap(),
        Some(Message::Text(String::new()))
    );

    client.ping(b"hb").unwrap();
    assert_eq!(client.receive(false).unwrap(), Some(b"hb".to_vec()));
    assert_eq!(client.last_opcode(), Some(OpCode::Pong));

    client.close(CloseCode::GoingAway, "done").unwrap();
    assert!(!client.is_connected());
    assert_eq!(handle.join().unwrap(), Some(1001));
}

#[test]
fn test_close_handshake() {
    let (mut server, url) = server();
    let handle = thread::spawn(move || {
        let mut conn = server.accept().unwrap();
        let reason = conn.receive(false).unwrap();
        (
            reason,
            conn.last_opcode(),
            conn.close_status(),
            conn.is_connected(),
            conn.receive(false),
        )
    });

    let mut client = Client::new(&url).unwrap();
    client.connect().unwrap();
    let answer = client.close(1000u16, "bye").unwrap();
    assert_eq!(answer, Some(b"Close acknowledged: 1000".to_vec()));

    assert!(!client.is_connected());
    assert_eq!(client.close_status(), Some(1000));
    assert_eq!(
        client.send(b"late", OpCode::Text, true),
        Err(Error::ConnectionClosed(Some(1000)))
    );

    let (reason, opcode, status, connected, after) = handle.join().unwrap();
    assert_eq!(reason, Some(b"bye".to_vec()));
    assert_eq!(opcode, Some(OpCode::Close));
    assert_eq!(status, Some(1000));
    assert!(!connected);
    assert_eq!(after, Err(Error::ConnectionClosed(Some(1000))));
}

#[test]
fn test_server_initiated_close() {
    let (mut server, url) = server();
    let handle = thread::spawn(move || {
        let mut conn = server.accept().unwrap();
        conn.close(CloseCode::PolicyViolation, "policy").unwrap();
        (conn.is_connected(), conn.close_status())
    });

    let mut client = Client::new(&url).unwrap();
    let message = client.receive_message(false).unwrap();
    assert_eq!(
        message,
        Some(Message::Close(Some(wsengine::CloseFrame::new(
            CloseCode::PolicyViolation,
            "policy"
        ))))
    );
    assert!(!client.is_connected());

    let (connected, status) = handle.join().unwrap();
    assert!(!connected);
    assert_eq!(status, Some(1008));
}

#[test]
fn test_server_headers_and_timeout() {
    let (mut server, url) = server();
    let (done_tx, done_rx) = mpsc::channel::<()>();
    let handle = thread::spawn(move || {
        let conn = server.accept().unwrap();
        let room = server.header("X-Room").map(str::to_string);
        let path = server.request().map(|r| r.path.clone());
        // Stay silent until the client has timed out.
        done_rx.recv().unwrap();
        drop(conn);
        (room, path)
    });

    let config = Config::client()
        .with_header("X-Room", "blue")
        .with_timeout(Some(Duration::from_millis(100)));
    let mut client = Client::with_config(&url, config).unwrap();

    assert_eq!(client.receive(true).unwrap(), None);
    assert_eq!(client.receive(false), Err(Error::Timeout));
    assert!(client.is_connected());

    done_tx.send(()).unwrap();
    let (room, path) = handle.join().unwrap();
    assert_eq!(room.as_deref(), Some("blue"));
    assert_eq!(path.as_deref(), Some("/echo"));
}

#[test]
fn test_server_rejects_missing_key() {
    let (mut server, _) = server();
    let addr = server.local_addr().unwrap();
    let handle = thread::spawn(move || {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream
            .write_all(b"GET /chat HTTP/1.1\r\nHost: localhost\r\nUpgrade: websocket\r\n\r\n")
            .unwrap();
        let mut rest = Vec::new();
        let _ = stream.read_to_end(&mut rest);
        rest
    });

    let err = server.accept().unwrap_err();
    assert_eq!(err, Error::BadRequest("No key found in upgrade request".into()));
    assert_eq!(err.kind(), ErrorKind::BadRequest);
    assert!(handle.join().unwrap().is_empty());
}

#[test]
fn test_server_rejects_missing_get_line() {
    let (mut server, _) = server();
    let addr = server.local_addr().unwrap();
    let handle = thread::spawn(move || {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream
            .write_all(b"HELLO\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n")
            .unwrap();
    });

    let err = server.accept().unwrap_err();
    assert_eq!(err, Error::BadRequest("Invalid Request headers.".into()));
    handle.join().unwrap();
}

#[test]
fn test_server_answers_fixture_key() {
    let (mut server, _) = server();
    let addr = server.local_addr().unwrap();
    let handle = thread::spawn(move || {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream
            .write_all(
                b"GET /chat HTTP/1.1\r\nHost: localhost\r\nUpgrade: websocket\r\n\
                  Connection: Upgrade\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
                  Sec-WebSocket-Version: 13\r\n\r\n",
            )
            .unwrap();
        String::from_utf8(read_head(&stream)).unwrap()
    });

    let _conn = server.accept().unwrap();
    let response = handle.join().unwrap();
    assert!(response.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
    assert!(response.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
}

/// A raw server that answers the upgrade with `accept(key)`.
fn fake_server<F>(accept: F) -> (String, thread::JoinHandle<HandshakeRequest>)
where
    F: FnOnce(&str) -> String + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let url = format!("ws://user:secret@127.0.0.1:{port}/path?q=1");
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let request = HandshakeRequest::parse(&read_head(&stream)).unwrap();
        let response = format!(
            "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\
             Sec-WebSocket-Accept: {}\r\n\r\n",
            accept(request.key())
        );
        stream.write_all(response.as_bytes()).unwrap();
        request
    });
    (url, handle)
}

#[test]
fn test_client_accepts_valid_response() {
    let (url, handle) = fake_server(compute_accept_key);

    let mut client = Client::new(&url).unwrap();
    client.connect().unwrap();
    assert!(client.is_connected());

    let request = handle.join().unwrap();
    assert_eq!(request.path, "/path?q=1");
    assert_eq!(request.header("sec-websocket-version"), Some("13"));
    assert_eq!(request.header("authorization"), Some("Basic dXNlcjpzZWNyZXQ="));
    assert!(request.header("host").unwrap().starts_with("127.0.0.1:"));
}

#[test]
fn test_client_rejects_wrong_accept() {
    let (url, handle) = fake_server(|_| "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=".to_string());

    let mut client = Client::new(&url).unwrap();
    let err = client.connect().unwrap_err();
    assert!(matches!(err, Error::InvalidHandshake(_)));
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert!(!client.is_connected());
    handle.join().unwrap();
}

#[test]
fn test_client_connect_refused() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let mut client = Client::new(&format!("127.0.0.1:{port}")).unwrap();
    let err = client.send_text("hello").unwrap_err();
    assert!(matches!(err, Error::Connection(ref msg) if msg.starts_with("Unable to connect")));
}
