use {std::io::BufRead, tokio::sync::mpsc};

/// Marker prefixing every trace line the node emits; everything else on the
/// stream is ordinary process output and is dropped.
pub const LINE_MARKER: &str = "DMLOG ";

///
/// Splits a blocking byte stream into marker-stripped trace lines and feeds
/// them into a bounded channel from a dedicated thread.
///
/// The channel bound is the backpressure knob: a slow parser fills it and the
/// scanner blocks on the source until space frees up. Closing the source ends
/// the thread and closes the channel, which the parser side observes as
/// end-of-stream. Read failures are forwarded as the final item.
///
pub fn spawn_scanner(
    source: impl BufRead + Send + 'static,
    buffer: usize,
) -> std::io::Result<mpsc::Receiver<std::io::Result<String>>> {
    let (tx, rx) = mpsc::channel(buffer);
    std::thread::Builder::new()
        .name("dmlog-scanner".to_owned())
        .spawn(move || scan(source, tx))?;
    Ok(rx)
}

fn scan(source: impl BufRead, tx: mpsc::Sender<std::io::Result<String>>) {
    let mut scanned = 0u64;
    let mut kept = 0u64;
    for line in source.lines() {
        scanned += 1;
        match line {
            Ok(line) => {
                let Some(stripped) = line.strip_prefix(LINE_MARKER) else {
                    continue;
                };
                kept += 1;
                if tx.blocking_send(Ok(stripped.to_owned())).is_err() {
                    // Parser went away; nothing left to feed.
                    return;
                }
            }
            Err(error) => {
                let _ = tx.blocking_send(Err(error));
                return;
            }
        }
    }
    tracing::debug!(scanned, kept, "trace stream drained");
}
