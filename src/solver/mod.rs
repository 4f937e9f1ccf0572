//! Numerical building blocks shared by every circuit engine.
//!
//! - [`newton`]: bounded, warm-started scalar Newton-Raphson and the
//!   trapezoidal companion update used after it
//! - [`linalg`]: construction-time matrix inversion and conversion to
//!   const-sized matrices
//! - [`bilinear`]: bilinear-transform discretization of first-order filters

pub mod bilinear;
pub mod linalg;
pub mod newton;

pub use bilinear::FirstOrderFilter;
pub use newton::{companion_update, NewtonRaphson, NewtonSolution};
