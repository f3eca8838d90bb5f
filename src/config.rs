/// Interpreter limits and collector tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Nested calls beyond this raise "Stack overflow.".
    pub max_call_depth: usize,
    /// Allocations since the last collection that trigger the next one.
    pub gc_threshold: usize,
    /// After a collection the threshold becomes `max(gc_threshold, live * factor)`.
    pub gc_growth_factor: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_call_depth: 1024,
            gc_threshold: 1024,
            gc_growth_factor: 2,
        }
    }
}

impl Config {
    pub fn max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }
    pub fn gc_threshold(mut self, threshold: usize) -> Self {
        self.gc_threshold = threshold.max(1);
        self
    }
    pub fn gc_growth_factor(mut self, factor: usize) -> Self {
        self.gc_growth_factor = factor.max(1);
        self
    }
}
