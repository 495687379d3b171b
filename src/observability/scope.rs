//! Begin/complete logging around a unit of work
//!
//! - Logs the begin event on creation
//! - Logs the complete event with `took_ms` when `complete()` is called
//! - Logs the failed event on `fail()`, or on drop if never completed

use std::time::Instant;

use super::events::Event;
use super::logger::log_event;

/// A scope that logs its own outcome
pub struct ObservationScope {
    complete: Event,
    failed: Event,
    fields: Vec<(&'static str, String)>,
    started: Instant,
    finished: bool,
}

impl ObservationScope {
    pub fn new(
        begin: Event,
        complete: Event,
        failed: Event,
        fields: Vec<(&'static str, String)>,
    ) -> Self {
        log_event(begin, &borrowed(&fields));
        Self {
            complete,
            failed,
            fields,
            started: Instant::now(),
            finished: false,
        }
    }

    /// Milliseconds since the scope was opened
    pub fn elapsed_ms(&self) -> u128 {
        self.started.elapsed().as_millis()
    }

    pub fn complete(self, extra: &[(&str, &str)]) {
        let event = self.complete;
        self.end(event, extra);
    }

    pub fn fail(self, reason: &str) {
        let event = self.failed;
        self.end(event, &[("reason", reason)]);
    }

    /// Close the scope with an event other than complete or failed
    pub fn end(mut self, event: Event, extra: &[(&str, &str)]) {
        self.finished = true;
        let took = self.elapsed_ms().to_string();
        let mut fields = borrowed(&self.fields);
        fields.extend(extra.iter().copied());
        fields.push(("took_ms", took.as_str()));
        log_event(event, &fields);
    }
}

impl Drop for ObservationScope {
    fn drop(&mut self) {
        if !self.finished {
            let mut fields = borrowed(&self.fields);
            fields.push(("reason", "scope dropped without completion"));
            log_event(self.failed, &fields);
        }
    }
}

fn borrowed<'a>(fields: &'a [(&'static str, String)]) -> Vec<(&'a str, &'a str)> {
    fields.iter().map(|(k, v)| (*k, v.as_str())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> ObservationScope {
        ObservationScope::new(
            Event::ResyncStart,
            Event::ResyncComplete,
            Event::ResyncFailed,
            vec![("shard", "[idx][0]".to_string())],
        )
    }

    #[test]
    fn test_scope_complete() {
        scope().complete(&[("resynced", "5")]);
    }

    #[test]
    fn test_scope_fail() {
        scope().fail("replica rejected batch");
    }

    #[test]
    fn test_scope_drop_without_complete() {
        let s = scope();
        drop(s);
    }
}
