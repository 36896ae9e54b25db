use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Sink that accepts and drops everything written to it.
#[derive(Debug, Default, Clone, Copy)]
pub struct Discard;

impl Write for Discard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

type Reader = Box<dyn Read + Send>;
type Writer = Box<dyn Write + Send>;

/// Engine-wide I/O: the `STDIN` table source and the notice/error sinks.
///
/// Output sinks start out as [`Discard`].
pub struct Session {
    stdin: Mutex<Option<Reader>>,
    stdin_text: Mutex<Option<Arc<String>>>,
    stdout: Mutex<Writer>,
    stderr: Mutex<Writer>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("stdin", &"<reader>")
            .field("stdout", &"<writer>")
            .field("stderr", &"<writer>")
            .finish()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self {
            stdin: Mutex::new(None),
            stdin_text: Mutex::new(None),
            stdout: Mutex::new(Box::new(Discard)),
            stderr: Mutex::new(Box::new(Discard)),
        }
    }

    /// Replace the `STDIN` table source. Any previously read input is forgotten.
    pub fn set_stdin(&self, reader: impl Read + Send + 'static) {
        *guard(&self.stdin) = Some(Box::new(reader));
        *guard(&self.stdin_text) = None;
    }

    pub fn set_stdout(&self, writer: impl Write + Send + 'static) {
        *guard(&self.stdout) = Box::new(writer);
    }

    pub fn set_stderr(&self, writer: impl Write + Send + 'static) {
        *guard(&self.stderr) = Box::new(writer);
    }

    /// Write a notice line to the stdout sink. Sink failures are ignored.
    pub fn log(&self, message: &str) {
        let mut out = guard(&self.stdout);
        let _ = writeln!(out, "{message}");
        let _ = out.flush();
    }

    /// Write a warning line to the stderr sink. Sink failures are ignored.
    pub fn log_error(&self, message: &str) {
        let mut out = guard(&self.stderr);
        let _ = writeln!(out, "{message}");
        let _ = out.flush();
    }

    /// Read the whole `STDIN` source once; later calls return the same text.
    ///
    /// Returns `Ok(None)` when no source has been set.
    pub(crate) fn read_stdin(&self) -> io::Result<Option<Arc<String>>> {
        let mut cached = guard(&self.stdin_text);
        if let Some(text) = cached.as_ref() {
            return Ok(Some(Arc::clone(text)));
        }
        let Some(mut reader) = guard(&self.stdin).take() else {
            return Ok(None);
        };
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        let text = Arc::new(text);
        *cached = Some(Arc::clone(&text));
        Ok(Some(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct Shared(Arc<Mutex<Vec<u8>>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn notices_go_to_the_configured_stdout() {
        let session = Session::new();
        session.log("dropped");
        let buf = Shared::default();
        session.set_stdout(buf.clone());
        session.log("kept");
        assert_eq!(String::from_utf8(buf.0.lock().unwrap().clone()).unwrap(), "kept\n");
    }

    #[test]
    fn stdin_is_read_once_and_cached() {
        let session = Session::new();
        assert!(session.read_stdin().unwrap().is_none());
        session.set_stdin(io::Cursor::new(b"a,b\n1,2\n".to_vec()));
        let first = session.read_stdin().unwrap().unwrap();
        let second = session.read_stdin().unwrap().unwrap();
        assert_eq!(first.as_str(), "a,b\n1,2\n");
        assert!(Arc::ptr_eq(&first, &second));
    }
}
