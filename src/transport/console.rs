//! Interactive line transport.
//!
//! Commands arrive as newline terminated lines; replies and notices go back as
//! lines. The binary reads stdin, or a serial device when built with the
//! `serial` feature, and prints to stdout.
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

/// Writer half handed to services that surface text to the user.
#[derive(Clone, Debug)]
pub struct ConsoleOutput {
    tx: mpsc::UnboundedSender<String>,
}

impl ConsoleOutput {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a line. Returns false once the reader is gone.
    pub fn write_line(&self, line: impl Into<String>) -> bool {
        self.tx.send(line.into()).is_ok()
    }
}

/// Forward stdin lines to `lines` until EOF.
pub async fn pump_stdin(lines: mpsc::UnboundedSender<String>) {
    let mut reader = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match reader.next_line().await {
            Ok(Some(line)) => {
                if lines.send(line).is_err() {
                    break;
                }
            }
            Ok(None) => {
                log::debug!("stdin closed");
                break;
            }
            Err(e) => {
                log::warn!("stdin read error: {}", e);
                break;
            }
        }
    }
}

/// Print every queued line to stdout.
pub async fn drain_to_stdout(mut output: mpsc::UnboundedReceiver<String>) {
    let mut stdout = tokio::io::stdout();
    while let Some(line) = output.recv().await {
        let mut text = line;
        if !text.ends_with('\n') {
            text.push('\n');
        }
        if stdout.write_all(text.as_bytes()).await.is_err() {
            break;
        }
        let _ = stdout.flush().await;
    }
}

/// Longest console line kept; longer input is discarded up to its newline.
pub const MAX_LINE: usize = 1024;

/// Accumulates raw console bytes and hands back complete lines without their
/// `\r\n`. Bytes after the last newline are kept for the next chunk.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
    overflowed: bool,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &b in chunk {
            if b == b'\n' {
                if self.overflowed {
                    log::warn!("console line longer than {} bytes dropped", MAX_LINE);
                    self.overflowed = false;
                } else {
                    let text = String::from_utf8_lossy(&self.buf);
                    lines.push(text.trim_end_matches('\r').to_string());
                }
                self.buf.clear();
            } else if self.buf.len() < MAX_LINE {
                self.buf.push(b);
            } else {
                self.overflowed = true;
            }
        }
        lines
    }

    /// Bytes received since the last newline.
    pub fn pending(&self) -> &[u8] {
        &self.buf
    }
}

/// Serial console: a blocking reader thread feeds `lines`, queued output is
/// written back to the port. Line endings on the wire are `\r\n`.
#[cfg(feature = "serial")]
pub fn spawn_serial_console(
    port_name: &str,
    baud_rate: u32,
    lines: mpsc::UnboundedSender<String>,
    mut output: mpsc::UnboundedReceiver<String>,
) -> anyhow::Result<()> {
    use anyhow::anyhow;
    use std::io::{Read, Write};
    use std::time::Duration;

    let mut builder = serialport::new(port_name, baud_rate).timeout(Duration::from_millis(500));
    #[cfg(unix)]
    {
        builder = builder
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None);
    }
    let port = builder
        .open()
        .map_err(|e| anyhow!("Failed to open serial port {}: {}", port_name, e))?;
    let mut writer = port
        .try_clone()
        .map_err(|e| anyhow!("Failed to clone serial port {}: {}", port_name, e))?;

    std::thread::spawn(move || {
        let mut port = port;
        let mut buffer = [0u8; 256];
        let mut pending = LineBuffer::new();
        loop {
            match port.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => {
                    for line in pending.push(&buffer[..n]) {
                        if lines.send(line).is_err() {
                            return;
                        }
                    }
                }
                // Partial input stays in `pending` until its newline arrives.
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                Err(e) => {
                    log::warn!("serial console read error: {}", e);
                    break;
                }
            }
        }
    });

    tokio::spawn(async move {
        while let Some(text) = output.recv().await {
            let framed = format!("{}\r\n", text.trim_end_matches('\n'));
            if let Err(e) = writer.write_all(framed.as_bytes()) {
                log::warn!("serial console write error: {}", e);
                break;
            }
        }
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_line_reports_closed_reader() {
        let (out, mut rx) = ConsoleOutput::channel();
        assert!(out.write_line("hello"));
        assert_eq!(rx.try_recv().unwrap(), "hello");
        drop(rx);
        assert!(!out.write_line("gone"));
    }

    #[test]
    fn partial_lines_survive_between_reads() {
        let mut buf = LineBuffer::new();
        assert!(buf.push(b"/led").is_empty());
        // a read timeout in between delivers nothing
        assert!(buf.push(b"").is_empty());
        assert_eq!(buf.pending(), b"/led");
        assert_eq!(buf.push(b"On\r\n/help\n/get"), vec!["/ledOn", "/help"]);
        assert_eq!(buf.pending(), b"/get");
        assert_eq!(buf.push(b"GPS\n"), vec!["/getGPS"]);
        assert!(buf.pending().is_empty());
    }

    #[test]
    fn overlong_line_is_dropped_whole() {
        let mut buf = LineBuffer::new();
        let long = vec![b'x'; MAX_LINE + 10];
        assert!(buf.push(&long).is_empty());
        assert_eq!(buf.push(b"tail\n/help\n"), vec!["/help"]);
        assert!(buf.pending().is_empty());
    }
}
