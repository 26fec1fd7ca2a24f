//! Seed prompt geometry derived from detection output.

use rand::Rng;

use vtrack_models::{BoundingBox, Mask, Point, PromptType};

/// Default number of positive clicks per object in point mode.
pub const DEFAULT_POINTS_PER_OBJECT: usize = 10;

/// Sample up to `k` distinct set pixels uniformly at random.
///
/// Returns every set pixel when fewer than `k` exist and nothing for an
/// empty mask.
pub fn sample_points<R: Rng + ?Sized>(mask: &Mask, k: usize, rng: &mut R) -> Vec<Point> {
    let candidates = mask.set_points();
    if candidates.len() <= k {
        return candidates;
    }
    rand::seq::index::sample(rng, candidates.len(), k)
        .into_iter()
        .map(|i| candidates[i])
        .collect()
}

/// Initial geometry registered with the tracker for one object.
#[derive(Debug, Clone, PartialEq)]
pub enum SeedPrompt {
    Points(Vec<Point>),
    Box(BoundingBox),
    Mask(Mask),
}

impl SeedPrompt {
    /// A point prompt with no points cannot seed anything.
    pub fn is_empty(&self) -> bool {
        matches!(self, SeedPrompt::Points(points) if points.is_empty())
    }

    pub fn kind(&self) -> PromptType {
        match self {
            SeedPrompt::Points(_) => PromptType::Point,
            SeedPrompt::Box(_) => PromptType::Box,
            SeedPrompt::Mask(_) => PromptType::Mask,
        }
    }
}

/// Turns one detection (box plus mask) into a seed prompt for the run's mode.
#[derive(Debug, Clone, Copy)]
pub struct PromptSampler {
    mode: PromptType,
    points_per_object: usize,
}

impl PromptSampler {
    pub fn new(mode: PromptType, points_per_object: usize) -> Self {
        Self {
            mode,
            points_per_object,
        }
    }

    pub fn prompt_for<R: Rng + ?Sized>(&self, bbox: &BoundingBox, mask: &Mask, rng: &mut R) -> SeedPrompt {
        match self.mode {
            PromptType::Point => SeedPrompt::Points(sample_points(mask, self.points_per_object, rng)),
            PromptType::Box => SeedPrompt::Box(*bbox),
            PromptType::Mask => SeedPrompt::Mask(mask.clone()),
        }
    }
}

impl Default for PromptSampler {
    fn default() -> Self {
        Self::new(PromptType::default(), DEFAULT_POINTS_PER_OBJECT)
    }
}
