//! A relay that accepts every message, for end to end tests
#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc};

use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::{Mutex, Notify},
    task::JoinHandle,
};

pub struct Relay {
    addr: SocketAddr,
    messages: Arc<Mutex<Vec<String>>>,
    received: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl Relay {
    pub async fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let messages = Arc::new(Mutex::new(Vec::new()));
        let received = Arc::new(Notify::new());

        let handle = {
            let messages = Arc::clone(&messages);
            let received = Arc::clone(&received);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let messages = Arc::clone(&messages);
                    let received = Arc::clone(&received);
                    tokio::spawn(async move {
                        let _ = session(stream, messages, received).await;
                    });
                }
            })
        };

        Ok(Self {
            addr,
            messages,
            received,
            handle,
        })
    }

    pub const fn port(&self) -> u16 {
        self.addr.port()
    }

    pub async fn messages(&self) -> Vec<String> {
        self.messages.lock().await.clone()
    }

    /// Wait until `count` messages have been accepted.
    pub async fn wait_for(&self, count: usize) -> Vec<String> {
        loop {
            let notified = self.received.notified();
            {
                let messages = self.messages.lock().await;
                if messages.len() >= count {
                    return messages.clone();
                }
            }
            notified.await;
        }
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// A port nothing is listening on
pub async fn closed_port() -> std::io::Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    Ok(listener.local_addr()?.port())
}

async fn session(
    stream: TcpStream,
    messages: Arc<Mutex<Vec<String>>>,
    received: Arc<Notify>,
) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    writer.write_all(b"220 relay.test ESMTP\r\n").await?;

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(());
        }

        let verb = line
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_uppercase();

        match verb.as_str() {
            "QUIT" => {
                writer.write_all(b"221 Bye\r\n").await?;
                return Ok(());
            }
            "DATA" => {
                writer.write_all(b"354 Go ahead\r\n").await?;

                let mut content = String::new();
                loop {
                    line.clear();
                    if reader.read_line(&mut line).await? == 0 {
                        return Ok(());
                    }
                    if line == ".\r\n" {
                        break;
                    }
                    content.push_str(&line);
                }

                messages.lock().await.push(content);
                received.notify_waiters();
                writer.write_all(b"250 Queued\r\n").await?;
            }
            _ => writer.write_all(b"250 OK\r\n").await?,
        }
    }
}
