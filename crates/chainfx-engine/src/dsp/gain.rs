/// Linear gain with dB control, used for the input and output stages.
pub struct Gain {
    db: f32,
    lin: f32,
}

impl Gain {
    pub fn new(db: f32) -> Self {
        let mut g = Self { db, lin: 1.0 };
        g.recompute();
        g
    }

    pub fn set_db(&mut self, db: f32) {
        if db != self.db {
            self.db = db;
            self.recompute();
        }
    }

    pub fn linear(&self) -> f32 {
        self.lin
    }

    fn recompute(&mut self) {
        self.lin = db_to_linear(self.db);
    }

    pub fn process(&self, block: &mut [f32]) {
        if self.lin == 1.0 { return; }
        let g = self.lin;
        for s in block.iter_mut() {
            *s *= g;
        }
    }
}

#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}
