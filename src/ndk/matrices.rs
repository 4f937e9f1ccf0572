//! NDK matrix precomputation.
//!
//! The circuit is written as one nodal system
//!
//! ```text
//! S0 = [ Nrᵀ Gr Nr + Nxᵀ Gx Nx   Nuᵀ ]
//!      [ Nu                      0   ]
//! ```
//!
//! which is inverted once per sample rate. Variable resistors are kept out of
//! `S0` and folded in later with a low-rank correction through the
//! projectors `Q, Ux, Uo, Un, Uu`, so moving a pot only inverts a
//! `pots x pots` matrix.
//!
//! The resulting discrete state-space model is
//!
//! ```text
//! x[n+1] = A x[n] + B u[n] + C i[n]
//! y[n]   = D x[n] + E u[n] + F i[n]
//! v[n]   = G x[n] + H u[n] + K i[n]
//! ```

use log::debug;
use nalgebra::{DMatrix, DVector, SMatrix};

use super::netlist::NdkNetlist;
use crate::error::{require_sample_rate, Result, SimError};
use crate::solver::linalg::{invert, to_static};

/// Precomputed matrices for one netlist at one sample rate.
#[derive(Debug, Clone)]
pub struct NdkBase {
    sample_rate: f64,
    q: DMatrix<f64>,
    ux: DMatrix<f64>,
    uo: DMatrix<f64>,
    un: DMatrix<f64>,
    uu: DMatrix<f64>,
    a0: DMatrix<f64>,
    b0: DMatrix<f64>,
    c0: DMatrix<f64>,
    d0: DMatrix<f64>,
    e0: DMatrix<f64>,
    f0: DMatrix<f64>,
    g0: DMatrix<f64>,
    h0: DMatrix<f64>,
    k0: DMatrix<f64>,
    two_z_gx: DMatrix<f64>,
}

/// Pad an incidence matrix with zero columns for the source currents.
fn pad(m: &DMatrix<f64>, width: usize) -> DMatrix<f64> {
    let mut padded = DMatrix::zeros(m.nrows(), width);
    padded.view_mut((0, 0), (m.nrows(), m.ncols())).copy_from(m);
    padded
}

impl NdkBase {
    /// Precompute the pot-independent matrices.
    pub fn new(netlist: &NdkNetlist, sample_rate: f64) -> Result<Self> {
        netlist.validate()?;
        let fs = require_sample_rate(sample_rate)?;

        let nodes = netlist.nodes;
        let nu = netlist.num_sources();
        let dim = nodes + nu;

        let gr = DMatrix::from_diagonal(&DVector::from_iterator(
            netlist.resistors.len(),
            netlist.resistors.iter().map(|r| 1.0 / r),
        ));
        let gx_diag = DVector::from_iterator(
            netlist.num_states(),
            netlist.reactive.iter().map(|x| x.conductance(fs)),
        );
        let z_diag = DVector::from_iterator(
            netlist.num_states(),
            netlist.reactive.iter().map(|x| x.sign()),
        );
        let gx = DMatrix::from_diagonal(&gx_diag);
        let z = DMatrix::from_diagonal(&z_diag);

        let mut s0 = DMatrix::<f64>::zeros(dim, dim);
        let conductance =
            netlist.nr.transpose() * &gr * &netlist.nr + netlist.nx.transpose() * &gx * &netlist.nx;
        s0.view_mut((0, 0), (nodes, nodes)).copy_from(&conductance);
        s0.view_mut((0, nodes), (nodes, nu)).copy_from(&netlist.nu.transpose());
        s0.view_mut((nodes, 0), (nu, nodes)).copy_from(&netlist.nu);
        let s0_inv = invert(&s0, &format!("{} S0", netlist.name))?;

        let nx0 = pad(&netlist.nx, dim);
        let nn0 = pad(&netlist.nn, dim);
        let no0 = pad(&netlist.no, dim);
        let nv0 = pad(&netlist.nv, dim);
        let mut zero_i = DMatrix::<f64>::zeros(nu, dim);
        zero_i.view_mut((0, nodes), (nu, nu)).fill_with_identity();

        let s0_nv = &s0_inv * nv0.transpose();
        let s0_nx = &s0_inv * nx0.transpose();
        let s0_u = &s0_inv * zero_i.transpose();
        let s0_nn = &s0_inv * nn0.transpose();

        let two_z_gx = &z * &gx * 2.0;
        let base = Self {
            sample_rate: fs,
            q: &nv0 * &s0_nv,
            ux: &nx0 * &s0_nv,
            uo: &no0 * &s0_nv,
            un: &nn0 * &s0_nv,
            uu: &zero_i * &s0_nv,
            a0: &two_z_gx * &nx0 * &s0_nx - &z,
            b0: &two_z_gx * &nx0 * &s0_u,
            c0: &two_z_gx * &nx0 * &s0_nn,
            d0: &no0 * &s0_nx,
            e0: &no0 * &s0_u,
            f0: &no0 * &s0_nn,
            g0: &nn0 * &s0_nx,
            h0: &nn0 * &s0_u,
            k0: &nn0 * &s0_nn,
            two_z_gx,
        };

        debug!(
            "{}: precomputed NDK matrices at {fs} Hz ({} nodes, {} states, {} nonlinear ports)",
            netlist.name,
            nodes,
            netlist.num_states(),
            netlist.num_nonlinear_ports()
        );
        Ok(base)
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn num_pots(&self) -> usize {
        self.q.nrows()
    }

    /// Fold the pot resistances into a new coefficient set.
    ///
    /// With `M = (Rv + Q)⁻¹`, every matrix is corrected as e.g.
    /// `A = A0 - 2ZGx Ux M Uxᵀ`. Without pots the base matrices are used as is.
    pub fn coefficients<const NX: usize, const NN: usize, const NU: usize, const NO: usize>(
        &self,
        pots: &[f64],
    ) -> Result<NdkCoefficients<NX, NN, NU, NO>> {
        if pots.len() != self.num_pots() {
            return Err(SimError::dimension("pot values", self.num_pots(), pots.len()));
        }
        if let Some(bad) = pots.iter().find(|r| !(r.is_finite() && **r >= 0.0)) {
            return Err(SimError::invalid_parameter(
                "pot",
                "resistance",
                format!("must be non-negative and finite, got {bad}"),
            ));
        }

        let (a, b, c, d, e, f, g, h, k) = if pots.is_empty() {
            (
                self.a0.clone(),
                self.b0.clone(),
                self.c0.clone(),
                self.d0.clone(),
                self.e0.clone(),
                self.f0.clone(),
                self.g0.clone(),
                self.h0.clone(),
                self.k0.clone(),
            )
        } else {
            let rv = DMatrix::from_diagonal(&DVector::from_column_slice(pots));
            let m = invert(&(rv + &self.q), "Rv + Q")?;

            let m_ux = &m * self.ux.transpose();
            let m_uu = &m * self.uu.transpose();
            let m_un = &m * self.un.transpose();
            let zgx_ux = &self.two_z_gx * &self.ux;

            (
                &self.a0 - &zgx_ux * &m_ux,
                &self.b0 - &zgx_ux * &m_uu,
                &self.c0 - &zgx_ux * &m_un,
                &self.d0 - &self.uo * &m_ux,
                &self.e0 - &self.uo * &m_uu,
                &self.f0 - &self.uo * &m_un,
                &self.g0 - &self.un * &m_ux,
                &self.h0 - &self.un * &m_uu,
                &self.k0 - &self.un * &m_un,
            )
        };

        let coefficients = NdkCoefficients {
            a: to_static(&a, "A")?,
            b: to_static(&b, "B")?,
            c: to_static(&c, "C")?,
            d: to_static(&d, "D")?,
            e: to_static(&e, "E")?,
            f: to_static(&f, "F")?,
            g: to_static(&g, "G")?,
            h: to_static(&h, "H")?,
            k: to_static(&k, "K")?,
            pots: pots.to_vec(),
        };
        debug!("rebuilt NDK coefficients for pots {pots:?}");
        Ok(coefficients)
    }
}

/// Immutable state-space coefficient set, tagged with the pot values it was
/// built for.
#[derive(Debug, Clone, PartialEq)]
pub struct NdkCoefficients<const NX: usize, const NN: usize, const NU: usize, const NO: usize> {
    pub a: SMatrix<f64, NX, NX>,
    pub b: SMatrix<f64, NX, NU>,
    pub c: SMatrix<f64, NX, NN>,
    pub d: SMatrix<f64, NO, NX>,
    pub e: SMatrix<f64, NO, NU>,
    pub f: SMatrix<f64, NO, NN>,
    pub g: SMatrix<f64, NN, NX>,
    pub h: SMatrix<f64, NN, NU>,
    pub k: SMatrix<f64, NN, NN>,
    pub pots: Vec<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ndk::netlist::tests::diode_clipper_netlist;
    use crate::ndk::netlist::{Reactive, SourceKind};
    use crate::solver::linalg::from_rows;
    use approx::assert_relative_eq;

    #[test]
    fn test_rc_coefficients() {
        // Series R into C to ground, read at the capacitor
        let (r, c, fs) = (1.0e3, 1.0e-6, 48_000.0);
        let base = NdkBase::new(&diode_clipper_netlist(r, c), fs).unwrap();
        let m = base.coefficients::<1, 1, 1, 1>(&[]).unwrap();

        let gc = 2.0 * fs * c;
        let gr = 1.0 / r;
        // Voltage at the cap node: (Gr u + x + i) / (Gr + Gc)
        assert_relative_eq!(m.d[(0, 0)], 1.0 / (gr + gc), max_relative = 1e-12);
        assert_relative_eq!(m.e[(0, 0)], gr / (gr + gc), max_relative = 1e-12);
        assert_relative_eq!(m.k[(0, 0)], 1.0 / (gr + gc), max_relative = 1e-12);
        // Trapezoidal pole of the RC section
        assert_relative_eq!(m.a[(0, 0)], (gc - gr) / (gc + gr), max_relative = 1e-12);
    }

    fn divider_with_pot() -> NdkNetlist {
        // Source at node 0, fixed 1k from node 0 to node 1, pot from node 1 to ground
        NdkNetlist {
            name: "pot divider".to_string(),
            nodes: 2,
            resistors: vec![1.0e3],
            nr: from_rows(&[&[1.0, -1.0]], 2),
            reactive: vec![Reactive::Capacitor(1.0e-9)],
            nx: from_rows(&[&[0.0, 1.0]], 2),
            sources: vec![SourceKind::Input],
            nu: from_rows(&[&[1.0, 0.0]], 2),
            nn: from_rows(&[&[0.0, 1.0]], 2),
            no: from_rows(&[&[0.0, 1.0]], 2),
            nv: from_rows(&[&[0.0, 1.0]], 2),
            initial_v: vec![0.0],
        }
    }

    #[test]
    fn test_pot_matches_fixed_resistor() {
        let fs = 48_000.0;
        let with_pot = NdkBase::new(&divider_with_pot(), fs).unwrap();
        let from_pot = with_pot.coefficients::<1, 1, 1, 1>(&[3.0e3]).unwrap();

        let mut fixed = divider_with_pot();
        fixed.resistors.push(3.0e3);
        fixed.nr = from_rows(&[&[1.0, -1.0], &[0.0, 1.0]], 2);
        fixed.nv = DMatrix::zeros(0, 2);
        let reference = NdkBase::new(&fixed, fs)
            .unwrap()
            .coefficients::<1, 1, 1, 1>(&[])
            .unwrap();

        assert_relative_eq!(from_pot.a, reference.a, max_relative = 1e-9);
        assert_relative_eq!(from_pot.e, reference.e, max_relative = 1e-9);
        assert_relative_eq!(from_pot.k, reference.k, max_relative = 1e-9);
    }

    #[test]
    fn test_coefficient_shape_and_pot_checks() {
        let base = NdkBase::new(&divider_with_pot(), 48_000.0).unwrap();
        assert!(matches!(
            base.coefficients::<2, 1, 1, 1>(&[1.0e3]),
            Err(SimError::DimensionMismatch { .. })
        ));
        assert!(base.coefficients::<1, 1, 1, 1>(&[]).is_err());
        assert!(base.coefficients::<1, 1, 1, 1>(&[f64::NAN]).is_err());
        assert!(NdkBase::new(&divider_with_pot(), 0.0).is_err());
    }

    #[test]
    fn test_floating_node_is_singular() {
        let mut netlist = divider_with_pot();
        netlist.nodes = 3;
        for m in [&mut netlist.nr, &mut netlist.nx, &mut netlist.nu, &mut netlist.nn, &mut netlist.no, &mut netlist.nv] {
            *m = pad(m, 3);
        }
        assert!(matches!(
            NdkBase::new(&netlist, 48_000.0),
            Err(SimError::SingularMatrix { .. })
        ));
    }
}
