/// Weight of the newest sample in the latency average.
const EMA_ALPHA: f64 = 0.1;

#[derive(Clone, Debug)]
pub struct LatencyMonitor {
    budget_ms: f64,
    sustain_frames: u32,
    smoothed_ms: Option<f64>,
    streak: u32,
    overloaded: bool,
}

impl LatencyMonitor {
    pub fn new(budget_ms: f64, sustain_frames: u32) -> Self {
        Self {
            budget_ms,
            sustain_frames: sustain_frames.max(1),
            smoothed_ms: None,
            streak: 0,
            overloaded: false,
        }
    }

    /// Feeds one frame's latency. Returns `Some(new_flag)` when the
    /// overload flag flips.
    pub fn record(&mut self, latency_ms: f64) -> Option<bool> {
        if !latency_ms.is_finite() || latency_ms < 0.0 {
            return None;
        }
        let smoothed = match self.smoothed_ms {
            Some(prev) => prev + EMA_ALPHA * (latency_ms - prev),
            None => latency_ms,
        };
        self.smoothed_ms = Some(smoothed);

        // Count frames that disagree with the current flag.
        let over = smoothed > self.budget_ms;
        if over != self.overloaded {
            self.streak += 1;
        } else {
            self.streak = 0;
        }
        if self.streak < self.sustain_frames {
            return None;
        }
        self.streak = 0;
        self.overloaded = over;
        if over {
            log::warn!("Frame processing at {smoothed:.1}ms exceeds {}ms budget", self.budget_ms);
        } else {
            log::info!("Frame processing back within budget ({smoothed:.1}ms)");
        }
        Some(over)
    }

    pub fn is_overloaded(&self) -> bool {
        self.overloaded
    }

    pub fn smoothed_ms(&self) -> Option<f64> {
        self.smoothed_ms
    }

    pub fn reset(&mut self) {
        self.smoothed_ms = None;
        self.streak = 0;
        self.overloaded = false;
    }
}
