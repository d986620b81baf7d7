use super::effect::{Effect, ProcessSpec};

/// Level-compensated tanh saturation.
pub struct Overdrive {
    drive: f32,
    norm: f32,
}

impl Overdrive {
    pub fn new() -> Self {
        let mut o = Self { drive: 1.0, norm: 1.0 };
        o.set_saturation(1.0);
        o
    }

    /// `percent` in 1..=100; 1 is nearly clean.
    pub fn set_saturation(&mut self, percent: f32) {
        self.drive = 1.0 + (percent.clamp(1.0, 100.0) - 1.0) * 0.2;
        self.norm = 1.0 / self.drive.tanh();
    }
}

impl Default for Overdrive {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for Overdrive {
    fn prepare(&mut self, _spec: &ProcessSpec) {}

    fn reset(&mut self) {}

    fn render(&mut self, block: &mut [f32]) {
        let (g, norm) = (self.drive, self.norm);
        for s in block.iter_mut() {
            *s = (g * *s).tanh() * norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_scale_maps_to_full_scale() {
        let mut o = Overdrive::new();
        for sat in [1.0, 30.0, 100.0] {
            o.set_saturation(sat);
            let mut block = [1.0f32, -1.0, 0.0];
            o.render(&mut block);
            assert!((block[0] - 1.0).abs() < 1e-5);
            assert!((block[1] + 1.0).abs() < 1e-5);
            assert_eq!(block[2], 0.0);
        }
    }

    #[test]
    fn more_saturation_lifts_quiet_samples() {
        let mut o = Overdrive::new();
        let mut soft = [0.1f32];
        o.render(&mut soft);
        o.set_saturation(100.0);
        let mut hard = [0.1f32];
        o.render(&mut hard);
        assert!(hard[0] > soft[0]);
    }
}
