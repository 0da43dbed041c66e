use irlp_core::options::RatioTesterKind;
use ordered_float::OrderedFloat;

/// Primal ratio test input. Basic variable `i` moves as `x_i - step * direction * column[i]`.
pub struct PrimalRatioInput<'a> {
    pub column: &'a [f64],
    /// `+1` when the entering variable increases, `-1` when it decreases.
    pub direction: f64,
    pub values: &'a [f64],
    pub lower: &'a [f64],
    pub upper: &'a [f64],
    /// `upper - lower` of the entering variable.
    pub entering_range: f64,
    pub feastol: f64,
    pub epsilon: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PrimalStep {
    Leave {
        position: usize,
        step: f64,
        to_upper: bool,
    },
    /// The entering variable reaches its opposite bound first.
    Flip { step: f64 },
    Unbounded,
}

/// Nonbasic variable on the pivot row of a dual iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DualCandidate {
    pub slot: usize,
    pub alpha: f64,
    pub reduced_cost: f64,
    /// `upper - lower`, infinite unless boxed.
    pub range: f64,
    pub can_increase: bool,
    pub can_decrease: bool,
}

pub struct DualRatioInput<'a> {
    pub candidates: &'a [DualCandidate],
    /// Whether the leaving variable must increase to reach its violated bound.
    pub leaving_increases: bool,
    /// Distance of the leaving variable to that bound.
    pub infeasibility: f64,
    pub opttol: f64,
    pub epsilon: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DualStep {
    /// `flips` move to their opposite bound before `slot` enters.
    Enter { slot: usize, flips: Vec<usize> },
    /// No nonbasic variable can repair the leaving row.
    Infeasible,
}

pub trait RatioTester {
    fn name(&self) -> &'static str;

    fn primal(&self, input: &PrimalRatioInput<'_>) -> PrimalStep;

    fn dual(&self, input: &DualRatioInput<'_>) -> DualStep;
}

/// A blocking candidate: `step = distance / rate`.
#[derive(Debug, Clone, Copy)]
struct Blocking {
    index: usize,
    distance: f64,
    rate: f64,
    to_upper: bool,
}

impl Blocking {
    fn step(&self) -> f64 {
        self.distance / self.rate
    }
}

fn primal_blocking(input: &PrimalRatioInput<'_>) -> Vec<Blocking> {
    let mut out = Vec::new();
    for (pos, &alpha) in input.column.iter().enumerate() {
        let rate = -input.direction * alpha;
        if rate.abs() < input.epsilon {
            continue;
        }
        let value = input.values[pos];
        let blocking = if rate < 0.0 && input.lower[pos].is_finite() {
            Some(((value - input.lower[pos]).max(0.0), false))
        } else if rate > 0.0 && input.upper[pos].is_finite() {
            Some(((input.upper[pos] - value).max(0.0), true))
        } else {
            None
        };
        if let Some((distance, to_upper)) = blocking {
            out.push(Blocking {
                index: pos,
                distance,
                rate: rate.abs(),
                to_upper,
            });
        }
    }
    out
}

fn dual_blocking(input: &DualRatioInput<'_>) -> Vec<Blocking> {
    input
        .candidates
        .iter()
        .enumerate()
        .filter_map(|(k, c)| {
            if c.alpha.abs() < input.epsilon {
                return None;
            }
            let increase = (c.alpha > 0.0) != input.leaving_increases;
            let (allowed, distance) = if increase {
                (c.can_increase, c.reduced_cost.max(0.0))
            } else {
                (c.can_decrease, (-c.reduced_cost).max(0.0))
            };
            allowed.then_some(Blocking {
                index: k,
                distance,
                rate: c.alpha.abs(),
                to_upper: increase,
            })
        })
        .collect()
}

/// Smallest step, ties broken by the largest rate.
fn textbook(blocking: &[Blocking]) -> Option<Blocking> {
    blocking
        .iter()
        .min_by_key(|b| (OrderedFloat(b.step()), OrderedFloat(-b.rate)))
        .copied()
}

/// Two passes: bound the step with relaxed distances, then take the largest rate
/// among candidates whose exact step fits.
fn harris(blocking: &[Blocking], tol: f64) -> Option<Blocking> {
    let max_step = blocking
        .iter()
        .map(|b| (b.distance + tol) / b.rate)
        .fold(f64::INFINITY, f64::min);
    blocking
        .iter()
        .filter(|b| b.step() <= max_step)
        .max_by_key(|b| (OrderedFloat(b.rate), OrderedFloat(-b.step())))
        .copied()
}

/// Harris restricted to rates of at least `stability` times the largest blocking rate.
fn stable_harris(blocking: &[Blocking], tol: f64, stability: f64) -> Option<Blocking> {
    let max_rate = blocking.iter().map(|b| b.rate).fold(0.0, f64::max);
    let chosen = harris(blocking, tol)?;
    if chosen.rate >= stability * max_rate {
        Some(chosen)
    } else {
        let stable: Vec<Blocking> = blocking
            .iter()
            .filter(|b| b.rate >= stability * max_rate)
            .copied()
            .collect();
        textbook(&stable).or(Some(chosen))
    }
}

fn primal_step(chosen: Option<Blocking>, entering_range: f64) -> PrimalStep {
    match chosen {
        Some(b) if b.step() < entering_range => PrimalStep::Leave {
            position: b.index,
            step: b.step(),
            to_upper: b.to_upper,
        },
        _ if entering_range.is_finite() => PrimalStep::Flip {
            step: entering_range,
        },
        _ => PrimalStep::Unbounded,
    }
}

fn dual_enter(input: &DualRatioInput<'_>, chosen: Option<Blocking>) -> DualStep {
    match chosen {
        Some(b) => DualStep::Enter {
            slot: input.candidates[b.index].slot,
            flips: Vec::new(),
        },
        None => DualStep::Infeasible,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TextbookRatio;

impl RatioTester for TextbookRatio {
    fn name(&self) -> &'static str {
        "textbook"
    }

    fn primal(&self, input: &PrimalRatioInput<'_>) -> PrimalStep {
        primal_step(textbook(&primal_blocking(input)), input.entering_range)
    }

    fn dual(&self, input: &DualRatioInput<'_>) -> DualStep {
        dual_enter(input, textbook(&dual_blocking(input)))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HarrisRatio;

impl RatioTester for HarrisRatio {
    fn name(&self) -> &'static str {
        "harris"
    }

    fn primal(&self, input: &PrimalRatioInput<'_>) -> PrimalStep {
        primal_step(
            harris(&primal_blocking(input), input.feastol),
            input.entering_range,
        )
    }

    fn dual(&self, input: &DualRatioInput<'_>) -> DualStep {
        dual_enter(input, harris(&dual_blocking(input), input.opttol))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FastRatio {
    pub stability: f64,
}

impl Default for FastRatio {
    fn default() -> Self {
        Self { stability: 1e-2 }
    }
}

impl RatioTester for FastRatio {
    fn name(&self) -> &'static str {
        "fast"
    }

    fn primal(&self, input: &PrimalRatioInput<'_>) -> PrimalStep {
        let chosen = stable_harris(&primal_blocking(input), input.feastol, self.stability);
        primal_step(chosen, input.entering_range)
    }

    fn dual(&self, input: &DualRatioInput<'_>) -> DualStep {
        let chosen = stable_harris(&dual_blocking(input), input.opttol, self.stability);
        dual_enter(input, chosen)
    }
}

/// Long-step dual ratio test. Boxed candidates are passed over, and flipped, for as long
/// as the leaving row still gains from a longer step. The primal side is Harris.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoundFlippingRatio;

impl RatioTester for BoundFlippingRatio {
    fn name(&self) -> &'static str {
        "bound-flipping"
    }

    fn primal(&self, input: &PrimalRatioInput<'_>) -> PrimalStep {
        HarrisRatio.primal(input)
    }

    fn dual(&self, input: &DualRatioInput<'_>) -> DualStep {
        let mut blocking = dual_blocking(input);
        blocking.sort_by_key(|b| (OrderedFloat(b.step()), OrderedFloat(-b.rate)));
        let mut slope = input.infeasibility;
        let mut flips = Vec::new();
        for (k, b) in blocking.iter().enumerate() {
            let range = input.candidates[b.index].range;
            let after = slope - b.rate * range;
            if range.is_finite() && after > 0.0 {
                slope = after;
                flips.push(input.candidates[b.index].slot);
                continue;
            }
            return match harris(&blocking[k..], input.opttol) {
                Some(chosen) => DualStep::Enter {
                    slot: input.candidates[chosen.index].slot,
                    flips,
                },
                None => DualStep::Infeasible,
            };
        }
        DualStep::Infeasible
    }
}

/// The configured ratio tester, dispatched without boxing.
#[derive(Debug, Clone, Copy)]
pub enum AnyRatioTester {
    Textbook(TextbookRatio),
    Harris(HarrisRatio),
    Fast(FastRatio),
    BoundFlipping(BoundFlippingRatio),
}

impl AnyRatioTester {
    pub fn from_kind(kind: RatioTesterKind) -> Self {
        match kind {
            RatioTesterKind::Textbook => AnyRatioTester::Textbook(TextbookRatio),
            RatioTesterKind::Harris => AnyRatioTester::Harris(HarrisRatio),
            RatioTesterKind::Fast => AnyRatioTester::Fast(FastRatio::default()),
            RatioTesterKind::BoundFlipping => AnyRatioTester::BoundFlipping(BoundFlippingRatio),
        }
    }

    fn inner(&self) -> &dyn RatioTester {
        match self {
            AnyRatioTester::Textbook(t) => t,
            AnyRatioTester::Harris(t) => t,
            AnyRatioTester::Fast(t) => t,
            AnyRatioTester::BoundFlipping(t) => t,
        }
    }
}

impl RatioTester for AnyRatioTester {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn primal(&self, input: &PrimalRatioInput<'_>) -> PrimalStep {
        self.inner().primal(input)
    }

    fn dual(&self, input: &DualRatioInput<'_>) -> DualStep {
        self.inner().dual(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn primal_input<'a>(
        column: &'a [f64],
        values: &'a [f64],
        lower: &'a [f64],
        upper: &'a [f64],
        range: f64,
    ) -> PrimalRatioInput<'a> {
        PrimalRatioInput {
            column,
            direction: 1.0,
            values,
            lower,
            upper,
            entering_range: range,
            feastol: 1e-6,
            epsilon: 1e-12,
        }
    }

    fn candidate(slot: usize, alpha: f64, d: f64, range: f64) -> DualCandidate {
        DualCandidate {
            slot,
            alpha,
            reduced_cost: d,
            range,
            can_increase: true,
            can_decrease: false,
        }
    }

    #[test]
    fn textbook_primal_takes_min_ratio() {
        // x_B decreases at rates 1 and 2 towards lower bounds 0
        let column = [1.0, 2.0];
        let values = [3.0, 4.0];
        let lower = [0.0, 0.0];
        let upper = [f64::INFINITY; 2];
        let input = primal_input(&column, &values, &lower, &upper, f64::INFINITY);
        assert_eq!(
            TextbookRatio.primal(&input),
            PrimalStep::Leave {
                position: 1,
                step: 2.0,
                to_upper: false
            }
        );
    }

    #[test]
    fn harris_prefers_larger_pivot_within_tolerance() {
        let column = [1e-3, 1.0];
        let values = [2e-3 - 1e-10, 2.0];
        let lower = [0.0, 0.0];
        let upper = [f64::INFINITY; 2];
        let input = primal_input(&column, &values, &lower, &upper, f64::INFINITY);
        assert!(matches!(
            TextbookRatio.primal(&input),
            PrimalStep::Leave { position: 0, .. }
        ));
        assert!(matches!(
            HarrisRatio.primal(&input),
            PrimalStep::Leave { position: 1, .. }
        ));
    }

    #[test]
    fn primal_flip_and_unbounded() {
        let column = [-1.0];
        let values = [0.0];
        let lower = [0.0];
        let upper = [f64::INFINITY];
        let boxed = primal_input(&column, &values, &lower, &upper, 5.0);
        assert_eq!(HarrisRatio.primal(&boxed), PrimalStep::Flip { step: 5.0 });
        let free = primal_input(&column, &values, &lower, &upper, f64::INFINITY);
        assert_eq!(HarrisRatio.primal(&free), PrimalStep::Unbounded);
    }

    #[test]
    fn dual_without_eligible_candidates_is_infeasible() {
        // leaving must increase; alpha > 0 requires the entering variable to decrease
        let candidates = [candidate(0, 1.0, 0.5, f64::INFINITY)];
        let input = DualRatioInput {
            candidates: &candidates,
            leaving_increases: true,
            infeasibility: 1.0,
            opttol: 1e-9,
            epsilon: 1e-12,
        };
        assert_eq!(HarrisRatio.dual(&input), DualStep::Infeasible);
        assert_eq!(BoundFlippingRatio.dual(&input), DualStep::Infeasible);
    }

    #[test]
    fn bound_flipping_passes_cheap_breakpoints() {
        // alpha < 0 with leaving increasing lets the candidates increase
        let candidates = [
            candidate(3, -1.0, 0.1, 0.5),
            candidate(7, -1.0, 0.2, f64::INFINITY),
        ];
        let input = DualRatioInput {
            candidates: &candidates,
            leaving_increases: true,
            infeasibility: 2.0,
            opttol: 1e-9,
            epsilon: 1e-12,
        };
        assert_eq!(
            BoundFlippingRatio.dual(&input),
            DualStep::Enter {
                slot: 7,
                flips: vec![3]
            }
        );
        assert_eq!(
            TextbookRatio.dual(&input),
            DualStep::Enter {
                slot: 3,
                flips: Vec::new()
            }
        );
    }

    #[test]
    fn fast_rejects_unstable_harris_choice() {
        let blocking = [
            Blocking {
                index: 0,
                distance: 0.0,
                rate: 1e-4,
                to_upper: false,
            },
            Blocking {
                index: 1,
                distance: 1e-3,
                rate: 1.0,
                to_upper: false,
            },
        ];
        assert_eq!(harris(&blocking, 1e-9).map(|b| b.index), Some(0));
        assert_eq!(stable_harris(&blocking, 1e-9, 1e-2).map(|b| b.index), Some(1));
    }
}
