use serde::{Serialize, Deserialize};

/// Source of the transcendental functions the activations need.
///
/// The activation family only ever asks for `exp` and `tanh`, so swapping
/// the numeric runtime means implementing these two methods.
pub trait MathBackend {
    fn exp(&self, x: f64) -> f64;
    fn tanh(&self, x: f64) -> f64;
}

/// Backend built on the `f64` intrinsics from `std`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdMath;

impl MathBackend for StdMath {
    fn exp(&self, x: f64) -> f64 {
        x.exp()
    }

    fn tanh(&self, x: f64) -> f64 {
        x.tanh()
    }
}

/// Element-wise activation applied to a layer's pre-activation sums.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ActivationFunction {
    Identity,
    #[default]
    ReLU,
    Sigmoid,
    Tanh,
}

impl ActivationFunction {
    /// Evaluates the activation at `x`.
    ///
    /// Sigmoid lies in the open interval (0, 1) mathematically, but `f64`
    /// rounds it to exactly `1.0` from about `x = 37` and to `0.0` below
    /// about `x = -745`; callers only ever see values in [0, 1].
    pub fn function(&self, x: f64) -> f64 {
        self.function_with(&StdMath, x)
    }

    /// Derivative evaluated at the pre-activation `x`.
    ///
    /// ReLU's derivative at exactly `0.0` is taken to be `1.0`.
    pub fn derivative(&self, x: f64) -> f64 {
        self.derivative_with(&StdMath, x)
    }

    pub fn function_with<M: MathBackend + ?Sized>(&self, math: &M, x: f64) -> f64 {
        match self {
            ActivationFunction::Identity => x,
            ActivationFunction::ReLU => if x < 0.0 { 0.0 } else { x },
            ActivationFunction::Sigmoid => 1.0 / (1.0 + math.exp(-x)),
            ActivationFunction::Tanh => math.tanh(x),
        }
    }

    pub fn derivative_with<M: MathBackend + ?Sized>(&self, math: &M, x: f64) -> f64 {
        match self {
            ActivationFunction::Identity => 1.0,
            ActivationFunction::ReLU => if x < 0.0 { 0.0 } else { 1.0 },
            ActivationFunction::Sigmoid => {
                let fx = self.function_with(math, x);
                fx * (1.0 - fx)
            }
            ActivationFunction::Tanh => {
                let t = math.tanh(x);
                1.0 - t * t
            }
        }
    }
}
