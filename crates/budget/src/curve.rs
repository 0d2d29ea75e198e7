//! Marginal ROAS curves: projected return of the next dollar at a spend level.

use std::fmt;
use std::sync::Arc;

use attribution_core::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};

/// Marginal return per dollar at `spend`. Expected to be non-increasing.
pub trait RoasCurve: Send + Sync {
    fn marginal_roas(&self, spend: f64) -> f64;
}

impl<F> RoasCurve for F
where
    F: Fn(f64) -> f64 + Send + Sync,
{
    fn marginal_roas(&self, spend: f64) -> f64 {
        self(spend)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoasBreakpoint {
    pub spend_from: f64,
    pub marginal_roas: f64,
}

/// Step function: each breakpoint's ROAS holds until the next breakpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PiecewiseRoasCurve {
    pub breakpoints: Vec<RoasBreakpoint>,
}

impl PiecewiseRoasCurve {
    pub fn new(points: &[(f64, f64)]) -> EngineResult<Self> {
        let curve = Self {
            breakpoints: points
                .iter()
                .map(|&(spend_from, marginal_roas)| RoasBreakpoint {
                    spend_from,
                    marginal_roas,
                })
                .collect(),
        };
        curve.validate()?;
        Ok(curve)
    }

    pub fn constant(marginal_roas: f64) -> Self {
        Self {
            breakpoints: vec![RoasBreakpoint {
                spend_from: 0.0,
                marginal_roas,
            }],
        }
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.breakpoints.is_empty() {
            return Err(EngineError::validation("piecewise ROAS curve has no breakpoints"));
        }
        let finite = self
            .breakpoints
            .iter()
            .all(|b| b.spend_from.is_finite() && b.marginal_roas.is_finite());
        let ordered = self
            .breakpoints
            .windows(2)
            .all(|w| w[0].spend_from < w[1].spend_from);
        if !finite || !ordered {
            return Err(EngineError::validation(
                "piecewise ROAS curve breakpoints must be finite with increasing spend",
            ));
        }
        Ok(())
    }
}

impl RoasCurve for PiecewiseRoasCurve {
    fn marginal_roas(&self, spend: f64) -> f64 {
        self.breakpoints
            .iter()
            .take_while(|b| b.spend_from <= spend)
            .last()
            .or_else(|| self.breakpoints.first())
            .map(|b| b.marginal_roas)
            .unwrap_or(0.0)
    }
}

/// `base_roas * decay^(spend / scale)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiminishingReturnsCurve {
    pub base_roas: f64,
    pub decay: f64,
    pub scale: f64,
}

impl DiminishingReturnsCurve {
    pub const DEFAULT_DECAY: f64 = 0.95;

    pub fn new(base_roas: f64, decay: f64, scale: f64) -> EngineResult<Self> {
        let curve = Self {
            base_roas,
            decay,
            scale,
        };
        curve.validate()?;
        Ok(curve)
    }

    /// Anchored so the marginal ROAS at the current budget equals `current_roas`,
    /// losing 5% efficiency for every further multiple of that budget.
    pub fn anchored(current_roas: f64, current_budget: f64) -> EngineResult<Self> {
        Self::new(
            current_roas / Self::DEFAULT_DECAY,
            Self::DEFAULT_DECAY,
            current_budget,
        )
    }

    pub fn validate(&self) -> EngineResult<()> {
        let valid = self.base_roas.is_finite()
            && self.base_roas >= 0.0
            && self.decay > 0.0
            && self.decay <= 1.0
            && self.scale.is_finite()
            && self.scale > 0.0;
        if !valid {
            return Err(EngineError::validation(format!(
                "invalid diminishing returns curve {self:?}"
            )));
        }
        Ok(())
    }
}

impl RoasCurve for DiminishingReturnsCurve {
    fn marginal_roas(&self, spend: f64) -> f64 {
        self.base_roas * self.decay.powf(spend / self.scale)
    }
}

/// Curve attached to a campaign. `Custom` curves come from an external model
/// and are not serializable.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoasCurveSpec {
    Piecewise(PiecewiseRoasCurve),
    Diminishing(DiminishingReturnsCurve),
    #[serde(skip)]
    Custom(Arc<dyn RoasCurve>),
}

impl RoasCurveSpec {
    pub fn custom<C: RoasCurve + 'static>(curve: C) -> Self {
        Self::Custom(Arc::new(curve))
    }

    pub fn validate(&self) -> EngineResult<()> {
        match self {
            Self::Piecewise(c) => c.validate(),
            Self::Diminishing(c) => c.validate(),
            Self::Custom(_) => Ok(()),
        }
    }
}

impl RoasCurve for RoasCurveSpec {
    fn marginal_roas(&self, spend: f64) -> f64 {
        match self {
            Self::Piecewise(c) => c.marginal_roas(spend),
            Self::Diminishing(c) => c.marginal_roas(spend),
            Self::Custom(c) => c.marginal_roas(spend),
        }
    }
}

impl fmt::Debug for RoasCurveSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Piecewise(c) => f.debug_tuple("Piecewise").field(c).finish(),
            Self::Diminishing(c) => f.debug_tuple("Diminishing").field(c).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Running-minimum view of a curve probed at increasing spend levels.
/// Any rise in marginal ROAS is clamped and counted as a violation.
pub(crate) struct FlattenedCurve<'a> {
    curve: &'a RoasCurveSpec,
    running_min: f64,
    pub samples: u64,
    pub violations: u64,
}

impl<'a> FlattenedCurve<'a> {
    pub fn new(curve: &'a RoasCurveSpec) -> Self {
        Self {
            curve,
            running_min: f64::INFINITY,
            samples: 0,
            violations: 0,
        }
    }

    pub fn probe(&mut self, spend: f64) -> EngineResult<f64> {
        let raw = self.curve.marginal_roas(spend);
        if !raw.is_finite() {
            return Err(EngineError::validation(format!(
                "ROAS curve returned {raw} at spend {spend}"
            )));
        }
        self.samples += 1;
        if raw > self.running_min {
            self.violations += 1;
            Ok(self.running_min)
        } else {
            self.running_min = raw;
            Ok(raw)
        }
    }

    /// Revenue over `[from, to)` by the left-point rule in `chunk`-sized pieces.
    pub fn integrate(&mut self, from: f64, to: f64, chunk: f64) -> EngineResult<f64> {
        if to <= from || chunk <= 0.0 {
            return Ok(0.0);
        }
        let mut spend = from;
        let mut revenue = 0.0;
        while spend < to {
            let amount = chunk.min(to - spend);
            revenue += self.probe(spend)? * amount;
            spend += amount;
        }
        Ok(revenue)
    }

    pub fn reliability(&self) -> f64 {
        if self.samples == 0 {
            1.0
        } else {
            1.0 - self.violations as f64 / self.samples as f64
        }
    }
}
