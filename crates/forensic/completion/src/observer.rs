use std::io::Write;

/// Live view of a completion stream. Purely informational.
pub trait FragmentObserver: Send + Sync {
    fn on_start(&self, _label: &str, _model: &str) {}

    fn on_fragment(&self, label: &str, fragment: &str);

    fn on_complete(&self, _label: &str, _chars: usize) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl FragmentObserver for NoopObserver {
    fn on_fragment(&self, _label: &str, _fragment: &str) {}
}

/// Echoes fragments to stdout as they arrive.
///
/// Concurrent silo streams interleave on the terminal; each banner names the
/// stream so the output stays attributable.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutObserver;

impl FragmentObserver for StdoutObserver {
    fn on_start(&self, label: &str, model: &str) {
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "\n>>> [{}] started ({}) <<<", label, model);
    }

    fn on_fragment(&self, _label: &str, fragment: &str) {
        let mut out = std::io::stdout().lock();
        let _ = out.write_all(fragment.as_bytes());
        let _ = out.flush();
    }

    fn on_complete(&self, label: &str, chars: usize) {
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "\n>>> [{}] complete ({} chars) <<<", label, chars);
    }
}
