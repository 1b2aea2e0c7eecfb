//! Per-segment, per-timestep solve primitive.
//!
//! The executor only depends on the `RoutingKernel` contract. `MuskingumKernel`
//! is a self-contained implementation of that contract (Muskingum routing with
//! a Manning-derived celerity); it is not meant to match any reference model
//! to the last bit.

use crate::store::ChannelParams;
use serde::{Serialize, Deserialize};
use thiserror::Error;

/// Inputs of one kernel call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KernelInput {
    /// Upstream inflow, previous timestep (m^3/s).
    pub qup: f64,
    /// Upstream inflow, current timestep (m^3/s).
    pub quc: f64,
    /// This segment's outflow, previous timestep (m^3/s).
    pub qdp: f64,
    /// Lateral inflow over the segment (m^3/s).
    pub ql: f64,
    /// Timestep (s).
    pub dt: f64,
    /// Depth at the previous timestep (m).
    pub depth_p: f64,
    pub params: ChannelParams,
}

/// Result of one kernel call.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct KernelOutput {
    pub qdc: f64,
    pub velc: f64,
    pub depthc: f64,
    /// Kinematic celerity (m/s).
    pub ck: f64,
    /// Courant number.
    pub cn: f64,
    /// Muskingum weighting factor.
    pub x: f64,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum KernelFault {
    #[error("invalid channel geometry: {0}")]
    InvalidGeometry(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("depth did not converge after {iterations} iterations")]
    NonConvergence { iterations: u32 },
}

pub trait RoutingKernel: Send + Sync {
    fn step(&self, input: &KernelInput) -> Result<KernelOutput, KernelFault>;
}

impl<F> RoutingKernel for F
where
    F: Fn(&KernelInput) -> Result<KernelOutput, KernelFault> + Send + Sync,
{
    fn step(&self, input: &KernelInput) -> Result<KernelOutput, KernelFault> {
        self(input)
    }
}

const MIN_DEPTH: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MuskingumKernel {
    pub max_iterations: u32,
    /// Bisection stops once the depth bracket is narrower than this (m).
    pub depth_tolerance: f64,
}

impl Default for MuskingumKernel {
    fn default() -> Self {
        Self { max_iterations: 100, depth_tolerance: 1e-4 }
    }
}

/// Trapezoidal main channel with an optional rectangular compound section above bankfull.
struct Section<'a> {
    p: &'a ChannelParams,
    z: f64,
    bankfull: f64,
}

impl<'a> Section<'a> {
    fn new(p: &'a ChannelParams) -> Self {
        let z = if p.cs == 0.0 { 1.0 } else { 1.0 / p.cs };
        let bankfull = if p.bw > p.tw {
            // Degenerate top width: never spill into the compound channel.
            f64::INFINITY
        } else if p.bw == p.tw {
            p.bw / (2.0 * z)
        } else {
            (p.tw - p.bw) / (2.0 * z)
        };
        Self { p, z, bankfull }
    }

    fn compound(&self, h: f64) -> bool {
        h > self.bankfull && self.p.twcc > 0.0 && self.p.ncc > 0.0
    }

    /// (flow area, Manning discharge) at depth `h`.
    fn area_and_discharge(&self, h: f64) -> (f64, f64) {
        let p = self.p;
        let side = (1.0 + self.z * self.z).sqrt();
        let (area, wp, n_eff) = if self.compound(h) {
            let area = (p.bw + self.bankfull * self.z) * self.bankfull;
            let area_c = p.twcc * (h - self.bankfull);
            let wp = p.bw + 2.0 * self.bankfull * side;
            let wp_c = p.twcc + 2.0 * (h - self.bankfull);
            let n_eff = (wp * p.n + wp_c * p.ncc) / (wp + wp_c);
            (area + area_c, wp + wp_c, n_eff)
        } else {
            ((p.bw + h * self.z) * h, p.bw + 2.0 * h * side, p.n)
        };
        if area <= 0.0 || wp <= 0.0 {
            return (0.0, 0.0);
        }
        let r = area / wp;
        (area, area * r.powf(2.0 / 3.0) * p.s0.sqrt() / n_eff)
    }

    /// Depth carrying `q` under uniform flow, by bracketing then bisection.
    fn normal_depth(&self, q: f64, max_iterations: u32, tolerance: f64) -> Result<f64, KernelFault> {
        if q <= 0.0 {
            return Ok(0.0);
        }
        let mut lo = 0.0;
        let mut hi = MIN_DEPTH.max(1.0);
        let mut expansions = 0;
        while self.area_and_discharge(hi).1 < q {
            lo = hi;
            hi *= 2.0;
            expansions += 1;
            if expansions > 64 {
                return Err(KernelFault::NonConvergence { iterations: expansions });
            }
        }
        for _ in 0..max_iterations {
            if hi - lo < tolerance {
                return Ok(0.5 * (lo + hi));
            }
            let mid = 0.5 * (lo + hi);
            if self.area_and_discharge(mid).1 < q {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        Err(KernelFault::NonConvergence { iterations: max_iterations })
    }
}

fn check_finite(input: &KernelInput) -> Result<(), KernelFault> {
    let fields = [
        ("qup", input.qup),
        ("quc", input.quc),
        ("qdp", input.qdp),
        ("ql", input.ql),
        ("depth_p", input.depth_p),
    ];
    for (name, v) in fields {
        if !v.is_finite() {
            return Err(KernelFault::InvalidInput(format!("{} = {}", name, v)));
        }
    }
    if !(input.dt.is_finite() && input.dt > 0.0) {
        return Err(KernelFault::InvalidInput(format!("dt = {}", input.dt)));
    }
    Ok(())
}

impl RoutingKernel for MuskingumKernel {
    fn step(&self, input: &KernelInput) -> Result<KernelOutput, KernelFault> {
        check_finite(input)?;
        let p = &input.params;
        if p.n <= 0.0 || p.s0 <= 0.0 || p.bw <= 0.0 || p.dx <= 0.0 {
            return Err(KernelFault::InvalidGeometry(format!(
                "n={}, s0={}, bw={}, dx={}",
                p.n, p.s0, p.bw, p.dx
            )));
        }

        // Dry cell: nothing to route.
        if input.ql <= 0.0 && input.qup <= 0.0 && input.quc <= 0.0 && input.qdp <= 0.0 {
            return Ok(KernelOutput::default());
        }

        let section = Section::new(p);
        let dt = input.dt;

        // 1. Celerity at the previous depth: ck = 5/3 * v (wide-channel kinematic wave)
        let h = input.depth_p.max(MIN_DEPTH);
        let (area, q_h) = section.area_and_discharge(h);
        let ck = if area > 0.0 { (5.0 / 3.0) * q_h / area } else { 0.0 };

        // 2. Muskingum K and X
        let km = if ck > 0.0 { (p.dx / ck).max(dt) } else { dt };
        let top_width = if section.compound(h) { p.twcc } else { p.bw + 2.0 * section.z * h };
        let q_ref = 0.5 * (input.quc + input.qdp);
        let x = if ck > 0.0 {
            (0.5 * (1.0 - q_ref / (top_width * p.s0 * ck * p.dx))).clamp(0.0, 0.5)
        } else {
            0.5
        };

        // 3. Routing coefficients
        let d = km * (1.0 - x) + dt / 2.0;
        let c1 = (km * x + dt / 2.0) / d;
        let c2 = (dt / 2.0 - km * x) / d;
        let c3 = (km * (1.0 - x) - dt / 2.0) / d;
        let c4 = (input.ql * dt) / d;

        let qdc = (c1 * input.qup + c2 * input.quc + c3 * input.qdp + c4).max(0.0);

        // 4. Depth and velocity consistent with the routed flow
        let depthc = section.normal_depth(qdc, self.max_iterations, self.depth_tolerance)?;
        let (area_c, _) = section.area_and_discharge(depthc);
        let velc = if area_c > 0.0 { qdc / area_c } else { 0.0 };

        Ok(KernelOutput {
            qdc,
            velc,
            depthc,
            ck,
            cn: ck * dt / p.dx,
            x,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn input(qup: f64, quc: f64, qdp: f64, ql: f64, depth_p: f64) -> KernelInput {
        KernelInput { qup, quc, qdp, ql, dt: 300.0, depth_p, params: ChannelParams::default() }
    }

    #[test]
    fn test_dry_cell_stays_dry() {
        let out = MuskingumKernel::default().step(&input(0.0, 0.0, 0.0, 0.0, 0.0)).unwrap();
        assert_eq!(out, KernelOutput::default());
    }

    #[test]
    fn test_steady_state_passes_flow_through() {
        let kernel = MuskingumKernel::default();
        let params = ChannelParams::default();
        let section = Section::new(&params);
        let depth = section.normal_depth(25.0, 200, 1e-8).unwrap();

        let out = kernel.step(&input(25.0, 25.0, 25.0, 0.0, depth)).unwrap();
        assert!((out.qdc - 25.0).abs() < 1e-9, "qdc = {}", out.qdc);
        assert!((out.depthc - depth).abs() < 1e-3);
        assert!(out.velc > 0.0);
        assert!((0.0..=0.5).contains(&out.x));
    }

    #[test]
    fn test_steady_lateral_inflow_is_added() {
        let kernel = MuskingumKernel::default();
        // Converge on the steady state for 10 m^3/s inflow + 2 m^3/s lateral.
        let mut qd = 0.0;
        let mut h = 0.0;
        for _ in 0..500 {
            let out = kernel.step(&input(10.0, 10.0, qd, 2.0, h)).unwrap();
            qd = out.qdc;
            h = out.depthc;
        }
        assert!((qd - 12.0).abs() < 1e-6, "qd = {}", qd);
    }

    #[rstest]
    #[case(ChannelParams { n: 0.0, ..Default::default() })]
    #[case(ChannelParams { s0: -0.01, ..Default::default() })]
    #[case(ChannelParams { bw: 0.0, ..Default::default() })]
    #[case(ChannelParams { dx: 0.0, ..Default::default() })]
    fn test_invalid_geometry_is_a_fault(#[case] params: ChannelParams) {
        let inp = KernelInput { params, ..input(1.0, 1.0, 1.0, 0.0, 0.5) };
        let err = MuskingumKernel::default().step(&inp).unwrap_err();
        assert!(matches!(err, KernelFault::InvalidGeometry(_)));
    }

    #[rstest]
    #[case(input(f64::NAN, 1.0, 1.0, 0.0, 0.5))]
    #[case(input(1.0, f64::INFINITY, 1.0, 0.0, 0.5))]
    #[case(KernelInput { dt: 0.0, ..input(1.0, 1.0, 1.0, 0.0, 0.5) })]
    fn test_non_finite_input_is_a_fault(#[case] inp: KernelInput) {
        let err = MuskingumKernel::default().step(&inp).unwrap_err();
        assert!(matches!(err, KernelFault::InvalidInput(_)));
    }

    #[test]
    fn test_depth_is_monotone_in_flow() {
        let params = ChannelParams::default();
        let section = Section::new(&params);
        let mut last = 0.0;
        for q in [0.5, 5.0, 50.0, 500.0, 5000.0] {
            let h = section.normal_depth(q, 200, 1e-6).unwrap();
            assert!(h > last);
            last = h;
        }
    }

    #[test]
    fn test_closures_satisfy_the_contract() {
        let passthrough = |i: &KernelInput| -> Result<KernelOutput, KernelFault> {
            Ok(KernelOutput { qdc: i.quc + i.ql, ..Default::default() })
        };
        let out = passthrough.step(&input(0.0, 3.0, 0.0, 1.5, 0.0)).unwrap();
        assert_eq!(out.qdc, 4.5);
    }
}
