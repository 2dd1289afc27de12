use std::sync::Arc;

/// Receives `(stage, percent)` updates from long running stages.
pub type ProgressCallback = Arc<dyn Fn(&str, u8) + Send + Sync>;

/// Tracks how much of a stage is done and reports each new whole percentage once.
pub struct Progress {
    stage: &'static str,
    total: u64,
    done: u64,
    last_percent: Option<u8>,
    callback: Option<ProgressCallback>,
}

impl Progress {
    pub fn new(stage: &'static str, total: u64, callback: Option<ProgressCallback>) -> Self {
        Self {
            stage,
            total,
            done: 0,
            last_percent: None,
            callback,
        }
    }

    /// A tracker that only logs.
    pub fn silent(stage: &'static str, total: u64) -> Self {
        Self::new(stage, total, None)
    }

    pub fn advance(&mut self, amount: u64) {
        self.done = (self.done + amount).min(self.total);
        let percent = if self.total == 0 {
            100
        } else {
            (self.done * 100 / self.total) as u8
        };
        if self.last_percent.map_or(true, |last| percent > last) {
            self.last_percent = Some(percent);
            tracing::debug!("{}: {}%", self.stage, percent);
            if let Some(callback) = &self.callback {
                callback(self.stage, percent);
            }
        }
    }

    pub fn finish(&mut self) {
        let remaining = self.total - self.done;
        self.advance(remaining);
    }

    pub fn percent(&self) -> u8 {
        self.last_percent.unwrap_or(0)
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn reports_monotonic_percentages() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: ProgressCallback = Arc::new(move |_stage, p| sink.lock().unwrap().push(p));

        let mut progress = Progress::new("scan", 4, Some(callback));
        progress.advance(1);
        progress.advance(0);
        progress.advance(2);
        progress.finish();

        assert_eq!(*seen.lock().unwrap(), vec![25, 75, 100]);
    }
}
