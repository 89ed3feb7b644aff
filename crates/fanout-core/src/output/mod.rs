//! Line-atomic, id-tagged output shared by concurrent workers.
//!
//! Bytes are buffered per id until a newline arrives, then the completed line is written to
//! the sink as `"[id] line\n"` in a single `write_all` under the sink lock. Two writers can
//! therefore never interleave inside one line. Lines are decoded only once complete, so a
//! multi-byte character split across writes survives intact.
use std::{
    collections::HashMap,
    io::{self, Write},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use fanout_model::ItemId;

pub struct OutputMultiplexer {
    inner: Mutex<MuxInner>,
}

struct MuxInner {
    sink: Box<dyn Write + Send>,
    partial: HashMap<String, Vec<u8>>,
}

impl OutputMultiplexer {
    pub fn new<W>(sink: W) -> Self
    where
        W: Write + Send + 'static,
    {
        Self {
            inner: Mutex::new(MuxInner {
                sink: Box::new(sink),
                partial: HashMap::new(),
            }),
        }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    /// Buffer `text` under `id`, emitting every line it completes.
    pub fn write(&self, id: &str, text: &str) -> io::Result<()> {
        self.write_bytes(id, text.as_bytes())
    }

    /// Byte-level [`write`](Self::write); invalid UTF-8 is replaced when the line is emitted.
    pub fn write_bytes(&self, id: &str, bytes: &[u8]) -> io::Result<()> {
        let mut inner = self.lock();
        let MuxInner { sink, partial } = &mut *inner;

        let mut rest = bytes;
        while let Some(pos) = rest.iter().position(|b| *b == b'\n') {
            let (head, tail) = rest.split_at(pos);
            match partial.remove(id) {
                Some(mut pending) => {
                    pending.extend_from_slice(head);
                    emit(sink.as_mut(), id, &pending)?;
                }
                None => emit(sink.as_mut(), id, head)?,
            }
            rest = &tail[1..];
        }
        if !rest.is_empty() {
            partial.entry(id.to_string()).or_default().extend_from_slice(rest);
        }
        Ok(())
    }

    /// Emit whatever is buffered for `id` as a final line.
    pub fn flush(&self, id: &str) -> io::Result<()> {
        let mut inner = self.lock();
        let MuxInner { sink, partial } = &mut *inner;
        if let Some(pending) = partial.remove(id) {
            emit(sink.as_mut(), id, &pending)?;
        }
        sink.flush()
    }

    /// Flush every id that still has buffered text, in id order.
    pub fn flush_all(&self) -> io::Result<()> {
        let mut inner = self.lock();
        let MuxInner { sink, partial } = &mut *inner;
        let mut ids: Vec<String> = partial.keys().cloned().collect();
        ids.sort();
        for id in ids {
            if let Some(pending) = partial.remove(&id) {
                emit(sink.as_mut(), &id, &pending)?;
            }
        }
        sink.flush()
    }

    /// Writer bound to a single item id.
    pub fn handle(self: &Arc<Self>, id: &ItemId) -> ItemOutput {
        ItemOutput {
            id: id.clone(),
            mux: Arc::clone(self),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MuxInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn emit(sink: &mut (dyn Write + Send), id: &str, line: &[u8]) -> io::Result<()> {
    if line.is_empty() {
        return sink.write_all(b"\n");
    }
    let framed = format!("[{id}] {}\n", String::from_utf8_lossy(line));
    sink.write_all(framed.as_bytes())
}

/// `io::Write` adapter that tags everything with one item id.
///
/// Bytes that are not valid UTF-8 are replaced rather than rejected, once the line is complete.
#[derive(Clone)]
pub struct ItemOutput {
    id: ItemId,
    mux: Arc<OutputMultiplexer>,
}

impl ItemOutput {
    pub fn id(&self) -> &ItemId {
        &self.id
    }

    /// Write `text` followed by a newline.
    pub fn line(&self, text: impl AsRef<str>) -> io::Result<()> {
        let mut text = text.as_ref().to_string();
        text.push('\n');
        self.mux.write(self.id.as_str(), &text)
    }
}

impl Write for ItemOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.mux.write_bytes(self.id.as_str(), buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.mux.flush(self.id.as_str())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Cloneable in-memory sink for inspecting multiplexed output.
    #[derive(Clone, Default)]
    pub struct SharedBuf(pub Arc<Mutex<Vec<u8>>>);

    impl SharedBuf {
        pub fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}
