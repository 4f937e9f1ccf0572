//! R-type adaptor: an N-port junction described by a scattering matrix.
//!
//! Series/parallel trees cannot express every topology (a bridged-T network
//! is the classic example). The R-type adaptor connects `DOWN` child ports to
//! `UP` ports facing the root through a scattering matrix
//!
//! ```text
//! [ b_up   ]   [ S11  S12 ] [ a_up   ]
//! [ b_down ] = [ S21  S22 ] [ a_down ]
//! ```
//!
//! Up ports are adapted (S11 = 0), so the upward pass is `b_up = S12 a_down`
//! and the downward pass is `b_down = S21 a_up + S22 a_down`. A matrix with a
//! nonzero S11 block would make `b_up` depend on the root's answer in the
//! same sample, so it is rejected.
//!
//! The matrix is produced by an [`ImpedanceCalculator`] from the children's
//! current port resistances. The owning circuit re-runs the calculator through
//! [`RtypeAdaptor::calc_impedance`] (or `propagate_impedance` on the tree)
//! whenever a child value changes.

use nalgebra::{DMatrix, SMatrix, SVector};

use super::{Wave, WdfPort};
use crate::error::{Result, SimError};

/// Largest S11 magnitude accepted for an adapted up port.
pub const ADAPTED_TOLERANCE: f64 = 1e-9;

/// Scattering matrix split into its up/down blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct ScatteringMatrix<const UP: usize, const DOWN: usize> {
    pub s11: SMatrix<f64, UP, UP>,
    pub s12: SMatrix<f64, UP, DOWN>,
    pub s21: SMatrix<f64, DOWN, UP>,
    pub s22: SMatrix<f64, DOWN, DOWN>,
}

impl<const UP: usize, const DOWN: usize> Default for ScatteringMatrix<UP, DOWN> {
    fn default() -> Self {
        Self {
            s11: SMatrix::zeros(),
            s12: SMatrix::zeros(),
            s21: SMatrix::zeros(),
            s22: SMatrix::zeros(),
        }
    }
}

impl<const UP: usize, const DOWN: usize> ScatteringMatrix<UP, DOWN> {
    /// Partition a full `(UP + DOWN)²` matrix, up ports first.
    pub fn from_full(s: &DMatrix<f64>) -> Result<Self> {
        let n = UP + DOWN;
        if s.nrows() != n || s.ncols() != n {
            return Err(SimError::dimension(
                "scattering matrix",
                n * n,
                s.nrows() * s.ncols(),
            ));
        }

        Ok(Self {
            s11: SMatrix::from_fn(|i, j| s[(i, j)]),
            s12: SMatrix::from_fn(|i, j| s[(i, UP + j)]),
            s21: SMatrix::from_fn(|i, j| s[(UP + i, j)]),
            s22: SMatrix::from_fn(|i, j| s[(UP + i, UP + j)]),
        })
    }

    /// Entry of the full matrix, up ports first.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        match (row < UP, col < UP) {
            (true, true) => self.s11[(row, col)],
            (true, false) => self.s12[(row, col - UP)],
            (false, true) => self.s21[(row - UP, col)],
            (false, false) => self.s22[(row - UP, col - UP)],
        }
    }

    fn set(&mut self, row: usize, col: usize, value: f64) {
        match (row < UP, col < UP) {
            (true, true) => self.s11[(row, col)] = value,
            (true, false) => self.s12[(row, col - UP)] = value,
            (false, true) => self.s21[(row - UP, col)] = value,
            (false, false) => self.s22[(row - UP, col - UP)] = value,
        }
    }
}

/// Rebuilds the scattering matrix from the children's port resistances.
pub trait ImpedanceCalculator<const UP: usize, const DOWN: usize> {
    /// Write the scattering matrix into `s` and return the up-port resistances.
    fn calc(&mut self, down: &[f64; DOWN], s: &mut ScatteringMatrix<UP, DOWN>) -> Result<[f64; UP]>;
}

/// Fixed-size set of child ports owned by an R-type adaptor.
///
/// Implemented for tuples of [`WdfPort`]s of two to six elements.
pub trait DownPorts<const N: usize> {
    fn resistances(&self) -> [f64; N];
    fn reflected(&mut self) -> [f64; N];
    fn incident(&mut self, waves: &[f64; N]);
    fn prepare(&mut self, sample_rate: f64);
    fn reset(&mut self);
    fn propagate_impedance(&mut self);
}

macro_rules! impl_down_ports {
    ($n:literal; $($idx:tt : $name:ident),+) => {
        impl<$($name: WdfPort),+> DownPorts<$n> for ($($name,)+) {
            #[inline]
            fn resistances(&self) -> [f64; $n] {
                [$(self.$idx.port_resistance()),+]
            }

            #[inline]
            fn reflected(&mut self) -> [f64; $n] {
                [$(self.$idx.reflected()),+]
            }

            #[inline]
            fn incident(&mut self, waves: &[f64; $n]) {
                $(self.$idx.incident(waves[$idx]);)+
            }

            fn prepare(&mut self, sample_rate: f64) {
                $(self.$idx.prepare(sample_rate);)+
            }

            fn reset(&mut self) {
                $(self.$idx.reset();)+
            }

            fn propagate_impedance(&mut self) {
                $(self.$idx.propagate_impedance();)+
            }
        }
    };
}

impl_down_ports!(2; 0: A, 1: B);
impl_down_ports!(3; 0: A, 1: B, 2: C);
impl_down_ports!(4; 0: A, 1: B, 2: C, 3: D);
impl_down_ports!(5; 0: A, 1: B, 2: C, 3: D, 4: E);
impl_down_ports!(6; 0: A, 1: B, 2: C, 3: D, 4: E, 5: F);

/// N-port adaptor driven by a scattering matrix.
#[derive(Debug, Clone)]
pub struct RtypeAdaptor<const UP: usize, const DOWN: usize, P, C> {
    pub ports: P,
    calculator: C,
    s: ScatteringMatrix<UP, DOWN>,
    up_resistances: [f64; UP],
    a_down: SVector<f64, DOWN>,
    a_up: SVector<f64, UP>,
    b_up: SVector<f64, UP>,
}

impl<const UP: usize, const DOWN: usize, P, C> RtypeAdaptor<UP, DOWN, P, C>
where
    P: DownPorts<DOWN>,
    C: ImpedanceCalculator<UP, DOWN>,
{
    /// Build the adaptor and compute its initial scattering matrix.
    pub fn new(ports: P, calculator: C) -> Result<Self> {
        let mut adaptor = Self {
            ports,
            calculator,
            s: ScatteringMatrix::default(),
            up_resistances: [0.0; UP],
            a_down: SVector::zeros(),
            a_up: SVector::zeros(),
            b_up: SVector::zeros(),
        };
        adaptor.calc_impedance()?;
        Ok(adaptor)
    }

    /// Store an externally derived scattering matrix, up ports first.
    ///
    /// Up-port resistances are left unchanged. The up ports must be adapted,
    /// so any S11 entry above [`ADAPTED_TOLERANCE`] is an error.
    pub fn set_scattering_matrix(&mut self, s: &DMatrix<f64>) -> Result<()> {
        let s = ScatteringMatrix::<UP, DOWN>::from_full(s)?;
        if let Some(bad) = s.s11.iter().find(|x| !(x.abs() <= ADAPTED_TOLERANCE)) {
            return Err(SimError::InvalidTopology {
                message: format!("up ports must be adapted, S11 has entry {bad}"),
            });
        }
        self.s = s;
        Ok(())
    }

    /// Rebuild the scattering matrix from the children's resistances.
    ///
    /// On failure the previous matrix stays in place.
    pub fn calc_impedance(&mut self) -> Result<()> {
        let down = self.ports.resistances();
        let mut s = self.s.clone();
        self.up_resistances = self.calculator.calc(&down, &mut s)?;
        self.s = s;
        Ok(())
    }

    pub fn scattering(&self) -> &ScatteringMatrix<UP, DOWN> {
        &self.s
    }

    pub fn up_resistances(&self) -> &[f64; UP] {
        &self.up_resistances
    }

    /// Upward pass: collect child waves and return `b_up = S12 a_down`.
    #[inline]
    pub fn reflected_up(&mut self) -> SVector<f64, UP> {
        self.a_down = SVector::from(self.ports.reflected());
        self.b_up = self.s.s12 * self.a_down;
        self.b_up
    }

    /// Downward pass: `b_down = S21 a_up + S22 a_down`, dispatched to the children.
    #[inline]
    pub fn incident_up(&mut self, a_up: &SVector<f64, UP>) {
        self.a_up = *a_up;
        let b_down: [f64; DOWN] = (self.s.s21 * a_up + self.s.s22 * self.a_down).into();
        self.ports.incident(&b_down);
    }
}

impl<const DOWN: usize, P, C> WdfPort for RtypeAdaptor<1, DOWN, P, C>
where
    P: DownPorts<DOWN>,
    C: ImpedanceCalculator<1, DOWN>,
{
    #[inline]
    fn port_resistance(&self) -> f64 {
        self.up_resistances[0]
    }

    #[inline]
    fn reflected(&mut self) -> f64 {
        self.reflected_up()[0]
    }

    #[inline]
    fn incident(&mut self, a: f64) {
        self.incident_up(&SVector::from([a]));
    }

    fn wave(&self) -> Wave {
        Wave {
            a: self.a_up[0],
            b: self.b_up[0],
        }
    }

    fn prepare(&mut self, sample_rate: f64) {
        self.ports.prepare(sample_rate);
        self.refresh();
    }

    fn reset(&mut self) {
        self.ports.reset();
        self.a_down = SVector::zeros();
        self.a_up = SVector::zeros();
        self.b_up = SVector::zeros();
    }

    fn propagate_impedance(&mut self) {
        self.ports.propagate_impedance();
        self.refresh();
    }
}

impl<const UP: usize, const DOWN: usize, P, C> RtypeAdaptor<UP, DOWN, P, C>
where
    P: DownPorts<DOWN>,
    C: ImpedanceCalculator<UP, DOWN>,
{
    fn refresh(&mut self) {
        if let Err(err) = self.calc_impedance() {
            log::warn!("keeping previous scattering matrix: {err}");
        }
    }
}

// ---------------------------------------------------------------------------
// Closed-form junctions
// ---------------------------------------------------------------------------

/// All ports share one voltage. `S = α 1ᵀ - I` with `α_j = 2 G_j / ΣG`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParallelJunction;

impl<const DOWN: usize> ImpedanceCalculator<1, DOWN> for ParallelJunction {
    fn calc(&mut self, down: &[f64; DOWN], s: &mut ScatteringMatrix<1, DOWN>) -> Result<[f64; 1]> {
        let g_up: f64 = down.iter().map(|r| 1.0 / r).sum();
        if !(g_up.is_finite() && g_up > 0.0) {
            return Err(SimError::singular("parallel junction"));
        }

        // With the up port adapted, ΣG over all ports is 2 G_up.
        let alpha = |j: usize| if j == 0 { 1.0 } else { 1.0 / (down[j - 1] * g_up) };
        for row in 0..=DOWN {
            for col in 0..=DOWN {
                let delta = if row == col { 1.0 } else { 0.0 };
                s.set(row, col, alpha(col) - delta);
            }
        }
        Ok([1.0 / g_up])
    }
}

/// All ports carry one current. `S = I - β 1ᵀ` with `β_i = 2 R_i / ΣR`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeriesJunction;

impl<const DOWN: usize> ImpedanceCalculator<1, DOWN> for SeriesJunction {
    fn calc(&mut self, down: &[f64; DOWN], s: &mut ScatteringMatrix<1, DOWN>) -> Result<[f64; 1]> {
        let r_up: f64 = down.iter().sum();
        if !(r_up.is_finite() && r_up > 0.0) {
            return Err(SimError::singular("series junction"));
        }

        let beta = |i: usize| if i == 0 { 1.0 } else { down[i - 1] / r_up };
        for row in 0..=DOWN {
            for col in 0..=DOWN {
                let delta = if row == col { 1.0 } else { 0.0 };
                s.set(row, col, delta - beta(row));
            }
        }
        Ok([r_up])
    }
}

// ---------------------------------------------------------------------------
// Nodal-analysis junction
// ---------------------------------------------------------------------------

/// Terminals of one junction port. `None` is the ground node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortTerminals {
    pub plus: Option<usize>,
    pub minus: Option<usize>,
}

impl PortTerminals {
    pub fn new(plus: Option<usize>, minus: Option<usize>) -> Self {
        Self { plus, minus }
    }

    /// Port from `node` to ground.
    pub fn to_ground(node: usize) -> Self {
        Self::new(Some(node), None)
    }

    /// Port between two internal nodes.
    pub fn between(plus: usize, minus: usize) -> Self {
        Self::new(Some(plus), Some(minus))
    }
}

/// Junction of ideal wires between ports, solved by nodal analysis.
///
/// Each port is replaced by a Thevenin source `a_p` behind `R_p`. Writing KCL
/// at every internal node plus one equation per port gives
///
/// ```text
/// X = [ 0   A ]      A[n, p] = +1 / -1 where port p's plus / minus
///     [ Aᵀ  R ]                 terminal sits on node n
/// ```
///
/// With `Y` the port-current block of `X⁻¹`, the scattering matrix is
/// `S = I - 2 R Y`. The single up port is adapted: it takes the Thevenin
/// resistance of the rest of the junction, found by solving once with that
/// port shorted, which makes its row of `S` vanish on the diagonal.
#[derive(Debug, Clone)]
pub struct WireJunction<const DOWN: usize> {
    nodes: usize,
    ports: Vec<PortTerminals>,
    rhs: DMatrix<f64>,
    resistances: Vec<f64>,
}

impl<const DOWN: usize> WireJunction<DOWN> {
    /// Create a junction over `nodes` internal nodes.
    ///
    /// `ports` lists the up port first, then the down ports in the order of
    /// the adaptor's children.
    pub fn new(nodes: usize, ports: &[PortTerminals]) -> Result<Self> {
        let count = 1 + DOWN;
        if ports.len() != count {
            return Err(SimError::dimension("junction ports", count, ports.len()));
        }
        for (p, t) in ports.iter().enumerate() {
            let out_of_range = [t.plus, t.minus].iter().flatten().any(|&n| n >= nodes);
            if out_of_range || t.plus == t.minus {
                return Err(SimError::InvalidTopology {
                    message: format!("port {p} has invalid terminals {t:?}"),
                });
            }
        }

        Ok(Self {
            nodes,
            ports: ports.to_vec(),
            rhs: DMatrix::zeros(nodes + count, count),
            resistances: vec![0.0; count],
        })
    }

    fn assemble(&self) -> DMatrix<f64> {
        let n = self.nodes;
        let size = n + self.ports.len();
        let mut system = DMatrix::zeros(size, size);
        for (p, t) in self.ports.iter().enumerate() {
            if let Some(k) = t.plus {
                system[(k, n + p)] = 1.0;
                system[(n + p, k)] = 1.0;
            }
            if let Some(k) = t.minus {
                system[(k, n + p)] = -1.0;
                system[(n + p, k)] = -1.0;
            }
            system[(n + p, n + p)] = self.resistances[p];
        }
        system
    }

    fn solve_unit_sources(&mut self) -> Result<()> {
        self.rhs.fill(0.0);
        for p in 0..self.ports.len() {
            self.rhs[(self.nodes + p, p)] = 1.0;
        }
        let solved = self.assemble().lu().solve_mut(&mut self.rhs);
        if solved && self.rhs.iter().all(|y| y.is_finite()) {
            Ok(())
        } else {
            Err(SimError::singular("wire junction"))
        }
    }
}

impl<const DOWN: usize> ImpedanceCalculator<1, DOWN> for WireJunction<DOWN> {
    fn calc(&mut self, down: &[f64; DOWN], s: &mut ScatteringMatrix<1, DOWN>) -> Result<[f64; 1]> {
        self.resistances[1..].copy_from_slice(down);

        // Shorted up port: its current under a unit source is 1 / R_thevenin.
        self.resistances[0] = 0.0;
        self.solve_unit_sources()?;
        let y = self.rhs[(self.nodes, 0)];
        if !(y.is_finite() && y > 0.0) {
            return Err(SimError::singular("wire junction Thevenin resistance"));
        }
        self.resistances[0] = 1.0 / y;

        self.solve_unit_sources()?;

        let count = 1 + DOWN;
        for row in 0..count {
            for col in 0..count {
                let delta = if row == col { 1.0 } else { 0.0 };
                let y = self.rhs[(self.nodes + row, col)];
                s.set(row, col, delta - 2.0 * self.resistances[row] * y);
            }
        }

        Ok([self.resistances[0]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wdf::{process_tree, OpenCircuit, Parallel, ResistiveVoltageSource, Resistor, Series};
    use approx::assert_relative_eq;

    fn full<const UP: usize, const DOWN: usize>(s: &ScatteringMatrix<UP, DOWN>) -> DMatrix<f64> {
        DMatrix::from_fn(UP + DOWN, UP + DOWN, |i, j| s.get(i, j))
    }

    #[test]
    fn test_wire_junction_matches_parallel_formula() {
        let down = [1.0e3, 2.2e3, 470.0];
        let mut closed = ScatteringMatrix::<1, 3>::default();
        let r_closed = ParallelJunction.calc(&down, &mut closed).unwrap();

        let ports = [
            PortTerminals::to_ground(0),
            PortTerminals::to_ground(0),
            PortTerminals::to_ground(0),
            PortTerminals::to_ground(0),
        ];
        let mut wire = WireJunction::<3>::new(1, &ports).unwrap();
        let mut nodal = ScatteringMatrix::<1, 3>::default();
        let r_nodal = wire.calc(&down, &mut nodal).unwrap();

        assert_relative_eq!(r_closed[0], r_nodal[0], max_relative = 1e-12);
        assert_relative_eq!(full(&closed), full(&nodal), epsilon = 1e-12);
    }

    #[test]
    fn test_wire_junction_series_loop_matches_series_formula() {
        // Loop: up port 0 -> n0, down ports n0 -> n1 and n1 -> ground.
        let down = [1.0e3, 3.3e3];
        let ports = [
            PortTerminals::new(None, Some(0)),
            PortTerminals::between(0, 1),
            PortTerminals::to_ground(1),
        ];
        let mut wire = WireJunction::<2>::new(2, &ports).unwrap();
        let mut nodal = ScatteringMatrix::<1, 2>::default();
        let r_nodal = wire.calc(&down, &mut nodal).unwrap();

        let mut closed = ScatteringMatrix::<1, 2>::default();
        SeriesJunction.calc(&down, &mut closed).unwrap();

        assert_relative_eq!(r_nodal[0], 4.3e3, max_relative = 1e-12);
        assert_relative_eq!(full(&closed), full(&nodal), epsilon = 1e-12);
    }

    #[test]
    fn test_adapted_up_port_and_lossless_junction() {
        // Bridged-T with the up port at the output node
        let ports = [
            PortTerminals::to_ground(2),
            PortTerminals::to_ground(0),
            PortTerminals::between(0, 1),
            PortTerminals::between(1, 2),
            PortTerminals::between(0, 2),
            PortTerminals::to_ground(1),
        ];
        let down = [100.0, 10.0e3, 10.0e3, 5.0e3, 2.0e3];
        let mut wire = WireJunction::<5>::new(3, &ports).unwrap();
        let mut s = ScatteringMatrix::<1, 5>::default();
        let r = wire.calc(&down, &mut s).unwrap();

        assert_relative_eq!(s.s11[(0, 0)], 0.0, epsilon = 1e-12);

        // Energy in equals energy out for any incident waves
        let resistances = [r[0], down[0], down[1], down[2], down[3], down[4]];
        let a = DMatrix::from_column_slice(6, 1, &[0.3, -1.0, 0.2, 0.7, -0.1, 0.5]);
        let b = full(&s) * &a;
        let power: f64 = (0..6).map(|k| (a[k] * a[k] - b[k] * b[k]) / resistances[k]).sum();
        assert_relative_eq!(power, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_rtype_parallel_matches_binary_tree() {
        let mut rtype = RtypeAdaptor::<1, 2, _, _>::new(
            (ResistiveVoltageSource::new(1.0e3), Resistor::new(3.0e3)),
            ParallelJunction,
        )
        .unwrap();
        rtype.ports.0.set_voltage(1.0);
        let mut tree = Parallel::new(ResistiveVoltageSource::new(1.0e3), Resistor::new(3.0e3));
        tree.p1.set_voltage(1.0);

        process_tree(&mut rtype, &mut OpenCircuit::default());
        process_tree(&mut tree, &mut OpenCircuit::default());

        assert_relative_eq!(rtype.port_resistance(), tree.port_resistance(), max_relative = 1e-12);
        assert_relative_eq!(rtype.voltage(), tree.voltage(), epsilon = 1e-12);
        assert_relative_eq!(rtype.ports.1.voltage(), tree.p2.voltage(), epsilon = 1e-12);
    }

    #[test]
    fn test_rtype_series_matches_binary_tree() {
        let mut rtype = RtypeAdaptor::<1, 2, _, _>::new(
            (ResistiveVoltageSource::new(1.0e3), Resistor::new(2.0e3)),
            SeriesJunction,
        )
        .unwrap();
        rtype.ports.0.set_voltage(1.0);
        let mut tree = Series::new(ResistiveVoltageSource::new(1.0e3), Resistor::new(2.0e3));
        tree.p1.set_voltage(1.0);

        let mut root_a = crate::wdf::IdealVoltageSource::new(0.25);
        let mut root_b = crate::wdf::IdealVoltageSource::new(0.25);
        process_tree(&mut rtype, &mut root_a);
        process_tree(&mut tree, &mut root_b);

        assert_relative_eq!(rtype.ports.1.voltage(), tree.p2.voltage(), epsilon = 1e-12);
    }

    #[test]
    fn test_set_scattering_matrix_checks_size() {
        let mut rtype = RtypeAdaptor::<1, 2, _, _>::new(
            (Resistor::new(1.0e3), Resistor::new(1.0e3)),
            ParallelJunction,
        )
        .unwrap();
        let down_only = DMatrix::from_fn(3, 3, |i, j| if i == j && i > 0 { 1.0 } else { 0.0 });
        assert!(rtype.set_scattering_matrix(&DMatrix::identity(2, 2)).is_err());
        assert!(rtype.set_scattering_matrix(&down_only).is_ok());
        assert_eq!(rtype.scattering().s22, SMatrix::<f64, 2, 2>::identity());
    }

    #[test]
    fn test_unadapted_up_port_is_rejected() {
        let mut rtype = RtypeAdaptor::<1, 2, _, _>::new(
            (Resistor::new(1.0e3), Resistor::new(1.0e3)),
            ParallelJunction,
        )
        .unwrap();
        let before = rtype.scattering().clone();
        let reflective = DMatrix::from_fn(3, 3, |i, j| if i == j { -0.5 } else { 0.5 });
        assert!(matches!(
            rtype.set_scattering_matrix(&reflective),
            Err(SimError::InvalidTopology { .. })
        ));
        assert_eq!(*rtype.scattering(), before);
    }

    #[test]
    fn test_wire_junction_root_sets_port_voltage() {
        // 1 V behind 1k and a 3k load in parallel, held at 0 V by the root
        let ports = [
            PortTerminals::to_ground(0),
            PortTerminals::to_ground(0),
            PortTerminals::to_ground(0),
        ];
        let mut rtype = RtypeAdaptor::<1, 2, _, _>::new(
            (ResistiveVoltageSource::new(1.0e3), Resistor::new(3.0e3)),
            WireJunction::<2>::new(1, &ports).unwrap(),
        )
        .unwrap();
        rtype.ports.0.set_voltage(1.0);
        assert_relative_eq!(rtype.scattering().s11[(0, 0)], 0.0, epsilon = 1e-12);
        assert_relative_eq!(rtype.port_resistance(), 750.0, max_relative = 1e-12);

        let mut root = crate::wdf::IdealVoltageSource::new(0.0);
        process_tree(&mut rtype, &mut root);
        assert_relative_eq!(rtype.ports.1.voltage(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(rtype.voltage(), 0.0, epsilon = 1e-12);
    }
}
