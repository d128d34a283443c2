//! Feeds events into the bus from a line-oriented reader.
//!
//! Each line is `<topic> <payload>`; blank lines and lines starting with
//! `#` are skipped.

use herald_common::{Signal, inbound, internal};
use herald_consumer::InMemoryBus;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt},
    sync::broadcast,
};

/// Publish every line of `reader` until it ends or shutdown is signalled.
/// Returns the number of events published.
///
/// Payloads are forwarded as raw bytes; a line that is not valid UTF-8 is
/// left for the consumer to reject rather than ending the stream.
pub async fn forward<R>(
    mut reader: R,
    bus: &InMemoryBus,
    mut shutdown: broadcast::Receiver<Signal>,
) -> anyhow::Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let mut published = 0;

    loop {
        line.clear();
        let read = tokio::select! {
            read = reader.read_until(b'\n', &mut line) => read?,
            _ = shutdown.recv() => break,
        };

        if read == 0 {
            internal!(level = INFO, published, "Input closed");
            break;
        }

        match parse_line(&line) {
            Some((topic, payload)) => {
                let id = bus.publish(topic, payload)?;
                inbound!(level = DEBUG, id = %id, topic = %topic, "Forwarded event");
                published += 1;
            }
            None if is_ignorable(&line) => {}
            None => inbound!(
                level = WARN,
                line = %String::from_utf8_lossy(&line).trim_end(),
                "Expected `<topic> <payload>`, skipping"
            ),
        }
    }

    Ok(published)
}

fn is_ignorable(line: &[u8]) -> bool {
    let line = line.trim_ascii();
    line.is_empty() || line.starts_with(b"#")
}

fn parse_line(line: &[u8]) -> Option<(&str, &[u8])> {
    if is_ignorable(line) {
        return None;
    }

    let line = line.trim_ascii();
    let split = line.iter().position(u8::is_ascii_whitespace)?;
    let topic = std::str::from_utf8(&line[..split]).ok()?;
    let payload = line[split..].trim_ascii();

    (!payload.is_empty()).then_some((topic, payload))
}
