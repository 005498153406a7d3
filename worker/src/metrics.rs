/// What a worker did over its whole run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub frames: usize,
    pub batches: usize,
    pub weight_updates: usize,
}

impl WorkerReport {
    #[inline]
    pub fn add_batch(&mut self, frames: usize) {
        self.batches += 1;
        self.frames += frames;
    }

    #[inline]
    pub fn bump_weight_updates(&mut self) {
        self.weight_updates += 1;
    }
}
