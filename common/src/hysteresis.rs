/// Schmitt trigger around a moving target.
///
/// The output reports whether the measured value is "satisfied": it flips to
/// `true` once the measurement reaches `target + band` and back to `false`
/// once it falls to `target - band`. Anywhere strictly between the two edges
/// the previous output is kept. The output starts as `false`.
#[derive(Debug, Clone, PartialEq)]
pub struct HysteresisSwitch {
    band: f32,
    output: bool,
}

impl HysteresisSwitch {
    pub fn new(band: f32) -> Self {
        Self {
            band: band.abs(),
            output: false,
        }
    }

    pub fn band(&self) -> f32 {
        self.band
    }

    pub fn output(&self) -> bool {
        self.output
    }

    pub fn evaluate(&mut self, measurement: f32, target: f32) -> bool {
        let lower_bound = target - self.band;
        let upper_bound = target + self.band;

        if measurement >= upper_bound {
            self.output = true;
        } else if measurement <= lower_bound {
            self.output = false;
        }

        self.output
    }
}
