use crate::controller::{RunEvent, RunEventKind, RunOutcome};

pub const PLACEHOLDER_BITS: &str = "Speed In Bps:";
pub const PLACEHOLDER_KBITS: &str = "Speed In Kbs:";
pub const PLACEHOLDER_MBITS: &str = "Speed In Mbs:";

pub const STATUS_IDLE: &str = "Press r to run a test.";
pub const STATUS_COMPLETED: &str = "Test Completed!";
pub const STATUS_ABORTED: &str = "Test aborted.";
pub const STATUS_ERROR: &str = "Error running test. Check logs.";

const MAX_LOGS: usize = 100;

/// What the dashboard shows. Updated only from run events and the trigger.
#[derive(Clone, Debug)]
pub struct DisplayState {
    pub bits: String,
    pub kbits: String,
    pub mbits: String,
    pub status: String,
    pub logs: Vec<String>,
    running: bool,
    current_run: Option<u64>,
}

impl DisplayState {
    pub fn new() -> Self {
        Self {
            bits: PLACEHOLDER_BITS.into(),
            kbits: PLACEHOLDER_KBITS.into(),
            mbits: PLACEHOLDER_MBITS.into(),
            status: STATUS_IDLE.into(),
            logs: Vec::new(),
            running: false,
            current_run: None,
        }
    }

    pub fn trigger_enabled(&self) -> bool {
        !self.running
    }

    /// Called when the user fires the trigger, before the run is requested.
    pub fn on_trigger(&mut self) {
        self.reset_values();
        self.running = true;
        self.status = "Starting...".into();
    }

    fn reset_values(&mut self) {
        self.bits = PLACEHOLDER_BITS.into();
        self.kbits = PLACEHOLDER_KBITS.into();
        self.mbits = PLACEHOLDER_MBITS.into();
    }

    fn log(&mut self, line: String) {
        self.logs.push(line);
        if self.logs.len() > MAX_LOGS {
            self.logs.remove(0);
        }
    }

    pub fn apply(&mut self, event: RunEvent) {
        let run = event.run;
        match event.kind {
            RunEventKind::Started { total } => {
                self.current_run = Some(run);
                self.running = true;
                self.reset_values();
                self.log(format!("run {run}: started ({total} samples)"));
            }
            RunEventKind::Progress { index, total } => {
                if self.current_run == Some(run) {
                    self.status = format!("Testing... ({index}/{total})");
                }
            }
            RunEventKind::Finished(outcome) => {
                let line = match &outcome {
                    RunOutcome::Completed(s) => format!("run {run}: {} / {} / {}", s.bits_label(), s.kb_label(), s.mb_label()),
                    RunOutcome::Cancelled => format!("run {run}: aborted"),
                    RunOutcome::Failed(e) => format!("run {run}: {e}"),
                };
                self.log(line);
                if self.current_run != Some(run) {
                    return;
                }
                self.running = false;
                match outcome {
                    RunOutcome::Completed(s) => {
                        self.bits = s.bits_label();
                        self.kbits = s.kb_label();
                        self.mbits = s.mb_label();
                        self.status = STATUS_COMPLETED.into();
                    }
                    RunOutcome::Cancelled => self.status = STATUS_ABORTED.into(),
                    RunOutcome::Failed(_) => self.status = STATUS_ERROR.into(),
                }
            }
        }
    }
}
