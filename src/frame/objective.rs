//! The target a measured frame's execution time is steered toward.

use crate::{Arbitrary, FrameId, Seconds};

/// Either an absolute mean, or a fraction of another frame's resolved mean.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ObjectiveKind {
    Absolute(Seconds),
    Relative { reference: FrameId, fraction: f64 },
}

/// A measured frame's declared target, per `spec.md` §3.
#[derive(Debug, Clone, Copy)]
pub struct Objective {
    pub kind: ObjectiveKind,
    /// Fraction of mean giving the acceptable band's lower edge.
    pub window_frac_lower: f64,
    /// Fraction of mean giving the acceptable band's upper edge.
    pub window_frac_upper: f64,
    /// Recorded but not enforced as a hard constraint by the core.
    pub satisfaction_probability: f64,
    pub window_len: usize,
    /// A pure, non-negative rescaling of a measured sample (e.g. for
    /// frame-rate objectives). Identity when absent.
    pub impact_rescaler: fn(Seconds) -> Seconds,
}

fn identity(t: Seconds) -> Seconds {
    t
}

impl Objective {
    pub fn absolute(mean: Seconds, window_frac_lower: f64, window_frac_upper: f64, window_len: usize) -> Self {
        Self {
            kind: ObjectiveKind::Absolute(mean),
            window_frac_lower,
            window_frac_upper,
            satisfaction_probability: 0.0,
            window_len: window_len.max(1),
            impact_rescaler: identity,
        }
    }

    pub fn relative(reference: FrameId, fraction: f64, window_frac_lower: f64, window_frac_upper: f64, window_len: usize) -> Self {
        Self {
            kind: ObjectiveKind::Relative { reference, fraction },
            window_frac_lower,
            window_frac_upper,
            satisfaction_probability: 0.0,
            window_len: window_len.max(1),
            impact_rescaler: identity,
        }
    }

    pub fn with_impact_rescaler(mut self, f: fn(Seconds) -> Seconds) -> Self {
        self.impact_rescaler = f;
        self
    }

    pub fn with_satisfaction_probability(mut self, p: f64) -> Self {
        self.satisfaction_probability = p;
        self
    }
}

/// Resolve an objective to an absolute mean. A relative objective reads the
/// reference frame's already-resolved mean; if that frame has not yet been
/// activated the fraction is applied to zero (documented in DESIGN.md as an
/// implementation choice — the spec does not name an error kind for this
/// ordering violation).
pub fn resolve_mean<I>(obj: &Objective, registry: &crate::frame::registry::FrameRegistry<I>) -> Seconds {
    match obj.kind {
        ObjectiveKind::Absolute(mean) => mean,
        ObjectiveKind::Relative { reference, fraction } => {
            registry.get(reference).ok().and_then(|r| r.state.resolved_mean).unwrap_or(0.0) * fraction
        }
    }
}

impl Arbitrary for Objective {
    fn random() -> Self {
        let mean = 0.001 + rand::random::<f64>() * 0.2;
        Self::absolute(mean, 0.05 + rand::random::<f64>() * 0.2, 0.05 + rand::random::<f64>() * 0.2, 1 + (rand::random::<f64>() * 20.0) as usize)
    }
}
