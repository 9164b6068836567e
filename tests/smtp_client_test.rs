//! Client tests against a scripted fake server: each step pairs an expected
//! command prefix with the canned reply to send back.

use std::net::SocketAddr;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

use meiru::smtp::SmtpClient;
use meiru::ErrorKind;

struct Step {
    expect: &'static str,
    reply: &'static str,
}

const GREETING: &str = "220 fake.test ESMTP ready\r\n";

/// Binds a one-shot server that sends the greeting, then walks the script:
/// read a command, check its prefix, send the canned reply. A `DATA` step
/// additionally swallows payload lines up to the dot terminator.
async fn fake_server(script: Vec<Step>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut stream = BufReader::new(stream);
        stream.write_all(GREETING.as_bytes()).await.unwrap();

        for step in script {
            let mut line = String::new();
            if stream.read_line(&mut line).await.unwrap() == 0 {
                return;
            }
            assert!(
                line.starts_with(step.expect),
                "fake server expected '{}', got '{}'",
                step.expect,
                line.trim_end()
            );

            if step.expect == "DATA" {
                stream.write_all(b"354 go ahead\r\n").await.unwrap();
                loop {
                    let mut payload = String::new();
                    if stream.read_line(&mut payload).await.unwrap() == 0 {
                        return;
                    }
                    if payload == ".\r\n" {
                        break;
                    }
                }
            }
            stream.write_all(step.reply.as_bytes()).await.unwrap();
        }
    });

    addr
}

#[tokio::test]
async fn full_round_trip() {
    let addr = fake_server(vec![
        Step {
            expect: "EHLO me.test",
            reply: "250-fake.test at your service\r\n250-PIPELINING\r\n250 SIZE 1048576\r\n",
        },
        Step {
            expect: "MAIL FROM: <a@mx.test>",
            reply: "250 sender ok\r\n",
        },
        Step {
            expect: "RCPT TO: <b@remote.test>",
            reply: "250 recipient ok\r\n",
        },
        Step {
            expect: "DATA",
            reply: "250 queued\r\n",
        },
        Step {
            expect: "QUIT",
            reply: "221 bye\r\n",
        },
    ])
    .await;

    let mut client = SmtpClient::connect(&addr.to_string()).await.unwrap();
    client.greet("me.test").await.unwrap();

    // Both continuation lines were recorded as extensions.
    assert_eq!(client.server_ext.len(), 2);
    assert_eq!(client.server_ext[0].name, "PIPELINING");
    assert!(client.server_ext[0].params.is_empty());
    assert_eq!(client.server_ext[1].name, "SIZE");
    assert_eq!(client.server_ext[1].params, vec!["1048576".to_string()]);

    client.set_sender("a@mx.test").await.unwrap();
    client.add_recipient("b@remote.test").await.unwrap();
    client
        .send_data("Subject: hi\r\n\r\na modest payload")
        .await
        .unwrap();
    client.close().await;
}

#[tokio::test]
async fn greet_falls_back_to_helo() {
    let addr = fake_server(vec![
        Step {
            expect: "EHLO me.test",
            reply: "502 no ESMTP here\r\n",
        },
        Step {
            expect: "HELO me.test",
            reply: "250 fake.test hello\r\n",
        },
    ])
    .await;

    let mut client = SmtpClient::connect(&addr.to_string()).await.unwrap();
    client.greet("me.test").await.unwrap();
    assert!(client.server_ext.is_empty());
}

#[tokio::test]
async fn greet_fails_when_helo_is_refused_too() {
    let addr = fake_server(vec![
        Step {
            expect: "EHLO me.test",
            reply: "502 no\r\n",
        },
        Step {
            expect: "HELO me.test",
            reply: "550 go away\r\n",
        },
    ])
    .await;

    let mut client = SmtpClient::connect(&addr.to_string()).await.unwrap();
    let err = client.greet("me.test").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ReceivedServerError);
    assert!(err.info()[0].contains("550 go away"));
}

#[tokio::test]
async fn server_error_text_is_preserved() {
    let addr = fake_server(vec![
        Step {
            expect: "EHLO me.test",
            reply: "250 fake.test hello\r\n",
        },
        Step {
            expect: "MAIL FROM: <a@mx.test>",
            reply: "250 ok\r\n",
        },
        Step {
            expect: "RCPT TO: <b@remote.test>",
            reply: "550 mailbox unavailable\r\n",
        },
    ])
    .await;

    let mut client = SmtpClient::connect(&addr.to_string()).await.unwrap();
    client.greet("me.test").await.unwrap();
    client.set_sender("a@mx.test").await.unwrap();

    let err = client.add_recipient("b@remote.test").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ReceivedServerError);
    assert!(err.info()[0].contains("550 mailbox unavailable"));
}

#[tokio::test]
async fn malformed_reply_is_rejected() {
    let addr = fake_server(vec![
        Step {
            expect: "EHLO me.test",
            reply: "250 fake.test hello\r\n",
        },
        Step {
            expect: "MAIL FROM: <a@mx.test>",
            reply: "this is not smtp\r\n",
        },
    ])
    .await;

    let mut client = SmtpClient::connect(&addr.to_string()).await.unwrap();
    client.greet("me.test").await.unwrap();

    let err = client.set_sender("a@mx.test").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidServerResponse);
}

#[tokio::test]
async fn connect_failure_is_an_error() {
    // Port 1 on localhost is essentially never listening.
    let err = SmtpClient::connect("127.0.0.1:1").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
}
