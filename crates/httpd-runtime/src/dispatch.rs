//! Worker-side request processing.

use httpd_core::ParseResult;
use tracing::warn;

use crate::conn::Connection;
use crate::context::ServerContext;
use crate::poller::Interest;

/// One parse-then-build pass for a connection the reactor just read.
///
/// Runs on a pool worker. The connection goes back to the table
/// armed for read (need more bytes) or write (response queued), or is
/// torn down if the response cannot be built.
pub fn process(ctx: &ServerContext, mut conn: Box<Connection>) {
    let outcome = conn.process_read(ctx.docroot());
    if outcome == ParseResult::Incomplete {
        ctx.rearm(conn, Interest::Read);
        return;
    }

    if let Err(e) = conn.process_write(outcome) {
        warn!(peer = %conn.peer(), ?outcome, error = %e, "cannot build response");
        ctx.close(conn);
        return;
    }
    ctx.rearm(conn, Interest::Write);
}
