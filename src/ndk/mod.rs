//! Nodal DK-method state-space solver.
//!
//! A circuit is described by incidence matrices ([`NdkNetlist`]), turned into
//! a discrete nonlinear state-space model once per sample rate
//! ([`NdkBase`]), specialised for the current pot positions
//! ([`NdkCoefficients`]) and run sample by sample with a fixed-iteration
//! multidimensional Newton-Raphson ([`NdkSolver`]).

pub mod handoff;
mod matrices;
mod netlist;
mod solver;

pub use handoff::{CoefficientPublisher, CoefficientReceiver};
pub use matrices::{NdkBase, NdkCoefficients};
pub use netlist::{incidence, NdkNetlist, Reactive, SourceKind};
pub use solver::{BjtPair, DiodePairPort, NdkSolver, NonlinearPorts};
