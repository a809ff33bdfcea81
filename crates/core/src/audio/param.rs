/// Automatable scalar parameter with `setTargetAtTime` semantics.
///
/// Only one pending exponential approach is tracked. Scheduling a new target
/// starts from whatever value the parameter has at that moment, so repeated
/// updates never jump.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioParam {
    value: f32,
    ramp: Option<TargetRamp>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct TargetRamp {
    start_time: f64,
    from: f32,
    target: f32,
    time_constant: f64,
}

impl AudioParam {
    pub fn new(value: f32) -> Self {
        Self { value, ramp: None }
    }

    /// Pins the parameter to `value`, dropping any scheduled approach.
    pub fn set_value(&mut self, value: f32) {
        self.value = value;
        self.ramp = None;
    }

    /// Freezes the parameter at its value at `at` and drops the approach.
    pub fn cancel_scheduled_values(&mut self, at: f64) {
        self.value = self.value_at(at);
        self.ramp = None;
    }

    pub fn set_target_at_time(&mut self, target: f32, at: f64, time_constant: f64) {
        if time_constant <= 0.0 {
            self.set_value(target);
            return;
        }

        let from = self.value_at(at);
        self.value = from;
        self.ramp = Some(TargetRamp {
            start_time: at,
            from,
            target,
            time_constant,
        });
    }

    pub fn value_at(&self, time: f64) -> f32 {
        match self.ramp {
            None => self.value,
            Some(ramp) if time <= ramp.start_time => ramp.from,
            Some(ramp) => {
                let elapsed = (time - ramp.start_time) / ramp.time_constant;
                let decay = (-elapsed).exp() as f32;
                ramp.target + (ramp.from - ramp.target) * decay
            }
        }
    }

    /// The value the parameter is heading towards.
    pub fn target(&self) -> f32 {
        self.ramp.map(|ramp| ramp.target).unwrap_or(self.value)
    }
}
