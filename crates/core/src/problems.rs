mod optimization;

pub use optimization::OptimizationProblem;
