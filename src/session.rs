//! Process-wide engine session.
//!
//! Connections that are not given their own [`Session`] share this one. It is created on
//! first use and lives for the rest of the process; notice and warning output is discarded
//! until a sink is installed.

use std::io::{Read, Write};
use std::sync::{Arc, OnceLock};

use crate::engine::Session;

static SESSION: OnceLock<Arc<Session>> = OnceLock::new();

/// The shared session, created on first call.
pub fn shared_session() -> Arc<Session> {
    Arc::clone(SESSION.get_or_init(|| {
        tracing::debug!("creating shared csv engine session");
        Arc::new(Session::new())
    }))
}

/// Source read when a query selects from `STDIN`.
pub fn set_stdin(reader: impl Read + Send + 'static) {
    shared_session().set_stdin(reader);
}

/// Sink for engine notices such as "1 record(s) updated".
pub fn set_stdout(writer: impl Write + Send + 'static) {
    shared_session().set_stdout(writer);
}

/// Sink for engine warnings.
pub fn set_stderr(writer: impl Write + Send + 'static) {
    shared_session().set_stderr(writer);
}
