//! Named output sinks which collect command output for display as tabs.

use std::{
    collections::BTreeMap,
    io::{BufRead, BufReader, Read},
    sync::{Arc, Mutex, MutexGuard},
};

use crossbeam_channel::{Receiver, Sender};

use crate::filter::{OutputFilter, escape_markup};

/// Where a line of output came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
    /// Lines written by the runner itself, e.g. the terminal status line
    Status,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: Stream,
    pub text: String,
    pub markup: String,
}

/// Notification for the UI thread that a sink changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Line { sink: String, line: OutputLine },
    Cleared { sink: String },
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// An append-only stream of lines with an associated tab name.
///
/// Every append is a whole line taken under the sink lock, so output of
/// concurrent writers interleaves line by line.
#[derive(Debug)]
pub struct OutputSink {
    name: String,
    lines: Mutex<Vec<OutputLine>>,
    tx: Sender<SinkEvent>,
}

impl OutputSink {
    fn new(name: String, tx: Sender<SinkEvent>) -> Self {
        Self {
            name,
            lines: Mutex::new(Vec::new()),
            tx,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append one line; a trailing newline is stripped
    pub fn append(&self, stream: Stream, text: &str, filter: Option<&dyn OutputFilter>) {
        let text = text.trim_end_matches(['\n', '\r']).to_string();
        let markup = match (stream, filter) {
            (Stream::Stderr, _) => {
                format!(r#"<span class="stderr">{}</span>"#, escape_markup(&text))
            }
            (Stream::Status, _) => format!("<b>{}</b>", escape_markup(&text)),
            (Stream::Stdout, Some(filter)) => filter.markup(&text),
            (Stream::Stdout, None) => escape_markup(&text),
        };
        let line = OutputLine {
            stream,
            text,
            markup,
        };

        let mut lines = lock(&self.lines);
        lines.push(line.clone());
        let _ = self.tx.send(SinkEvent::Line {
            sink: self.name.clone(),
            line,
        });
    }

    /// Copy every line of `reader` into this sink until it is closed
    pub fn pump(&self, stream: Stream, reader: impl Read, filter: Option<&dyn OutputFilter>) {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => self.append(stream, &String::from_utf8_lossy(&buf), filter),
                Err(e) => {
                    tracing::debug!(sink = %self.name, error = %e, "error reading command output");
                    break;
                }
            }
        }
    }

    pub fn clear(&self) {
        lock(&self.lines).clear();
        let _ = self.tx.send(SinkEvent::Cleared {
            sink: self.name.clone(),
        });
    }

    pub fn lines(&self) -> Vec<OutputLine> {
        lock(&self.lines).clone()
    }

    /// Plain text of every line, newline terminated
    pub fn text(&self) -> String {
        lock(&self.lines)
            .iter()
            .map(|l| format!("{}\n", l.text))
            .collect()
    }

    pub fn markup(&self) -> String {
        lock(&self.lines)
            .iter()
            .map(|l| format!("{}\n", l.markup))
            .collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.lines).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// All sinks of a project, by name
#[derive(Debug)]
pub struct OutputSinks {
    sinks: Mutex<BTreeMap<String, Arc<OutputSink>>>,
    tx: Sender<SinkEvent>,
    rx: Receiver<SinkEvent>,
}

impl Default for OutputSinks {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputSinks {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            sinks: Mutex::new(BTreeMap::new()),
            tx,
            rx,
        }
    }

    /// Fetch the sink called `name`, creating it if needed.
    ///
    /// An existing sink is cleared when `clear` is set.
    pub fn get_or_create(&self, name: &str, clear: bool) -> Arc<OutputSink> {
        let mut sinks = lock(&self.sinks);
        if let Some(sink) = sinks.get(name) {
            let sink = Arc::clone(sink);
            drop(sinks);
            if clear {
                sink.clear();
            }
            return sink;
        }
        tracing::debug!(%name, "creating output sink");
        let sink = Arc::new(OutputSink::new(name.to_string(), self.tx.clone()));
        sinks.insert(name.to_string(), Arc::clone(&sink));
        sink
    }

    pub fn get(&self, name: &str) -> Option<Arc<OutputSink>> {
        lock(&self.sinks).get(name).cloned()
    }

    pub fn remove(&self, name: &str) -> Option<Arc<OutputSink>> {
        lock(&self.sinks).remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        lock(&self.sinks).keys().cloned().collect()
    }

    /// Receiver of change notifications for every sink
    pub fn events(&self) -> Receiver<SinkEvent> {
        self.rx.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::{io::Cursor, thread};

    use super::*;
    use crate::filter::LinkFilter;

    #[test]
    fn markup_by_stream() {
        let sinks = OutputSinks::new();
        let sink = sinks.get_or_create("Build: Make", false);
        sink.append(Stream::Stdout, "a < b\n", None);
        sink.append(Stream::Stderr, "oops\n", None);
        sink.append(Stream::Status, "done", None);

        assert_eq!(sink.text(), "a < b\noops\ndone\n");
        assert_eq!(
            sink.markup(),
            "a &lt; b\n<span class=\"stderr\">oops</span>\n<b>done</b>\n"
        );
    }

    #[test]
    fn stdout_filter_applies() {
        let sink = OutputSinks::new().get_or_create("x", false);
        let filter = LinkFilter::new("/p");
        sink.append(Stream::Stdout, "f.go:1:2: bad", Some(&filter));
        assert!(sink.lines()[0].markup.starts_with("<a href=\"file:///p/f.go#L1C2\">"));
    }

    #[test]
    fn get_or_create_reuses_and_clears() {
        let sinks = OutputSinks::new();
        let sink = sinks.get_or_create("x", false);
        sink.append(Stream::Stdout, "one", None);

        let again = sinks.get_or_create("x", false);
        assert!(Arc::ptr_eq(&sink, &again));
        assert_eq!(again.len(), 1);

        let cleared = sinks.get_or_create("x", true);
        assert!(cleared.is_empty());
        assert_eq!(sinks.names(), vec!["x".to_string()]);
    }

    #[test]
    fn pump_splits_lines_and_flushes_remainder() {
        let sink = OutputSinks::new().get_or_create("x", false);
        sink.pump(Stream::Stdout, Cursor::new("one\ntwo\nthree"), None);
        assert_eq!(sink.text(), "one\ntwo\nthree\n");
    }

    #[test]
    fn concurrent_writers_interleave_whole_lines() {
        let sink = OutputSinks::new().get_or_create("x", false);
        let a: String = (0..200).map(|i| format!("aaaa{i}aaaa\n")).collect();
        let b: String = (0..200).map(|i| format!("bbbb{i}bbbb\n")).collect();

        thread::scope(|s| {
            s.spawn(|| sink.pump(Stream::Stdout, Cursor::new(a.as_bytes()), None));
            s.spawn(|| sink.pump(Stream::Stderr, Cursor::new(b.as_bytes()), None));
        });

        let lines = sink.lines();
        assert_eq!(lines.len(), 400);
        for line in lines {
            let expected = match line.stream {
                Stream::Stdout => 'a',
                _ => 'b',
            };
            assert!(line.text.starts_with(expected) && line.text.ends_with(expected));
        }
    }

    #[test]
    fn events_are_published() {
        let sinks = OutputSinks::new();
        let events = sinks.events();
        let sink = sinks.get_or_create("x", false);
        sink.append(Stream::Stdout, "hello", None);
        sink.clear();

        let received: Vec<_> = events.try_iter().collect();
        assert_eq!(received.len(), 2);
        assert!(matches!(&received[0], SinkEvent::Line { sink, line } if sink == "x" && line.text == "hello"));
        assert_eq!(
            received[1],
            SinkEvent::Cleared {
                sink: "x".to_string()
            }
        );
    }
}
