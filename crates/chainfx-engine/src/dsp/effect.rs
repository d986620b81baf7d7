/// Processing configuration handed to `prepare`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessSpec {
    pub sample_rate: f64,
    pub max_block_size: usize,
    pub num_channels: usize,
}

/// One channel's sub-block plus its bypass mark.
pub struct ProcessContext<'a> {
    block: &'a mut [f32],
    bypassed: bool,
}

impl<'a> ProcessContext<'a> {
    pub fn new(block: &'a mut [f32]) -> Self {
        Self { block, bypassed: false }
    }

    pub fn set_bypassed(&mut self, bypassed: bool) {
        self.bypassed = bypassed;
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypassed
    }

    pub fn block_mut(&mut self) -> &mut [f32] {
        &mut *self.block
    }
}

/// Real-time safe mono effect.
/// - `render()` must not allocate or lock; buffers are sized in `prepare()`.
/// - `block` holds contiguous f32 samples of one channel.
pub trait Effect: Send {
    fn prepare(&mut self, spec: &ProcessSpec);
    fn reset(&mut self);
    fn render(&mut self, block: &mut [f32]);

    /// A bypassed effect is skipped outright: the block passes through and
    /// the effect's internal state stays frozen until it is re-enabled.
    fn process(&mut self, ctx: &mut ProcessContext<'_>) {
        if ctx.is_bypassed() {
            return;
        }
        self.render(ctx.block_mut());
    }
}
