use fanout_model::{CheckpointState, RunReport};
use tracing::{debug, info, warn};

/// One-line human summary of a finished run.
pub fn summary_line(r: &RunReport) -> String {
    let s = &r.stats;
    let mut line = format!(
        "{}/{} completed: {} succeeded, {} failed",
        s.completed, s.total, s.succeeded, s.failed
    );
    if s.checkpointed > 0 {
        line.push_str(&format!(", {} checkpointed", s.checkpointed));
    }
    if r.interrupted {
        line.push_str(" (interrupted)");
    }
    line
}

#[inline]
fn state_label(state: CheckpointState) -> &'static str {
    match state {
        CheckpointState::Pending => "pending",
        CheckpointState::AwaitingCredential => "awaiting-credential",
    }
}

/// Emit the final summary of a run, then one line per failed or checkpointed item.
pub fn log_report(r: &RunReport) {
    let msg = summary_line(r);
    let s = &r.stats;

    if r.is_clean() {
        info!(
            run_id = %r.run_id,
            total = s.total,
            succeeded = s.succeeded,
            "{msg}"
        );
    } else {
        warn!(
            run_id = %r.run_id,
            total = s.total,
            succeeded = s.succeeded,
            failed = s.failed,
            checkpointed = s.checkpointed,
            interrupted = r.interrupted,
            "{msg}"
        );
    }

    for f in r.failures() {
        warn!(
            run_id = %r.run_id,
            id = %f.id,
            error = f.error.as_deref().unwrap_or("unknown"),
            duration_ms = f.duration.as_millis() as u64,
            "item failed"
        );
    }
    for cp in &r.checkpoints {
        debug!(
            run_id = %r.run_id,
            id = %cp.id,
            state = state_label(cp.state),
            "item checkpointed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fanout_model::{Checkpoint, ItemId, ProgressStats, WorkItemResult};
    use std::{
        io,
        sync::{Arc, Mutex},
        time::Duration,
    };

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn captured(r: &RunReport) -> String {
        let cap = Capture::default();
        let writer = cap.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .without_time()
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        tracing::subscriber::with_default(subscriber, || log_report(r));
        let bytes = cap.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    fn id(s: &str) -> ItemId {
        ItemId::new(s).unwrap()
    }

    #[test]
    fn clean_run_is_one_info_line() {
        let mut stats = ProgressStats::new(2);
        stats.record(true);
        stats.record(true);
        let report = RunReport {
            run_id: "r1".into(),
            stats,
            results: vec![
                WorkItemResult::succeeded(id("a"), Duration::from_millis(3), Duration::ZERO),
                WorkItemResult::succeeded(id("b"), Duration::from_millis(4), Duration::ZERO),
            ],
            ..Default::default()
        };

        assert_eq!(summary_line(&report), "2/2 completed: 2 succeeded, 0 failed");
        let out = captured(&report);
        assert_eq!(out.lines().count(), 1);
        assert!(out.contains("INFO"));
        assert!(out.contains("2/2 completed"));
    }

    #[test]
    fn failures_and_checkpoints_are_listed() {
        let mut stats = ProgressStats::new(3);
        stats.record(false);
        stats.record_checkpoint();
        stats.record_checkpoint();
        let report = RunReport {
            run_id: "r2".into(),
            stats,
            results: vec![WorkItemResult::failed(
                id("bad"),
                "exit 2",
                Duration::from_millis(10),
                Duration::ZERO,
            )],
            checkpoints: vec![
                Checkpoint::new(id("c1"), CheckpointState::Pending),
                Checkpoint::new(id("c2"), CheckpointState::AwaitingCredential),
            ],
            interrupted: true,
        };

        assert_eq!(
            summary_line(&report),
            "1/3 completed: 0 succeeded, 1 failed, 2 checkpointed (interrupted)"
        );
        let out = captured(&report);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("WARN"));
        assert!(lines[1].contains("item failed") && lines[1].contains("exit 2"));
        assert!(lines[3].contains("awaiting-credential"));
    }
}
