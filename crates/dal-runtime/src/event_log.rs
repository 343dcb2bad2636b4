//! JSON-lines event log.
//!
//! One line per session event:
//!
//! ```text
//! {"ts":"2026-10-16T09:12:44.120Z","run":"…","session":"p1/0xcoord","seq":3,"type":"state-changed","event":{…}}
//! ```

use chrono::{SecondsFormat, Utc};
use dal_bus::SessionEvent;
use serde_json::json;
use std::io::{self, Write};
use uuid::Uuid;

pub struct EventLog<W> {
    out: W,
    run_id: Uuid,
}

impl<W: Write> EventLog<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            run_id: Uuid::new_v4(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Append one event and flush.
    pub fn record(&mut self, event: &SessionEvent) -> io::Result<()> {
        let line = json!({
            "ts": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            "run": self.run_id,
            "session": event.session.to_string(),
            "seq": event.seq,
            "type": event.event.name(),
            "event": &event.event,
        });
        serde_json::to_writer(&mut self.out, &line)?;
        self.out.write_all(b"\n")?;
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
