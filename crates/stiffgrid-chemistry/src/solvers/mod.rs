//! Reference chemistry solvers.

mod euler_implicit;
mod none;
mod ode;

pub use euler_implicit::EulerImplicit;
pub use none::NoChemistry;
pub use ode::Ode;
