//! Integer cost/productivity functions.
//!
//! A small closed family of polynomial-in-time functions used by cost
//! indicators: constant, linear, and general polynomial. All evaluation
//! is integer-exact; the definite integral over `[a, b]` is an integer.
//!
//! Linear integrals use the exact product form
//! `slope * (b + a) * (b - a) / 2` with floor division applied once at
//! the end, so odd-length windows are handled without drift. Polynomial
//! integrals require every antiderivative coefficient to be an integer;
//! construction rejects coefficients that do not divide.

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// A function of integer time, attached to resources as a cost curve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Function {
    /// `f(t) = value`.
    Constant { value: i64 },
    /// `f(t) = slope * t + intercept`.
    Linear { slope: i64, intercept: i64 },
    /// `f(t) = coefficients[0] + coefficients[1]*t + ... + coefficients[n]*t^n`.
    Polynomial { coefficients: Vec<i64> },
}

impl Function {
    /// Creates a constant function.
    pub fn constant(value: i64) -> Self {
        Self::Constant { value }
    }

    /// Creates a linear function `slope * t + intercept`.
    pub fn linear(slope: i64, intercept: i64) -> Self {
        Self::Linear { slope, intercept }
    }

    /// Creates a polynomial from ascending-degree coefficients.
    ///
    /// Rejects coefficients whose antiderivative term `c_k / (k + 1)`
    /// is not an integer, since cost integrals must be integer-exact.
    pub fn polynomial(coefficients: Vec<i64>) -> Result<Self, ModelError> {
        for (degree, &c) in coefficients.iter().enumerate() {
            let divisor = degree as i64 + 1;
            if c % divisor != 0 {
                return Err(ModelError::NonIntegerCoefficient {
                    coefficient: c,
                    degree,
                    divisor,
                });
            }
        }
        Ok(Self::Polynomial { coefficients })
    }

    /// Evaluates the function at integer time `t`.
    pub fn value_at(&self, t: i64) -> i64 {
        match self {
            Self::Constant { value } => *value,
            Self::Linear { slope, intercept } => slope * t + intercept,
            Self::Polynomial { coefficients } => {
                // Horner evaluation, highest degree first.
                coefficients
                    .iter()
                    .rev()
                    .fold(0i64, |acc, &c| acc * t + c)
            }
        }
    }

    /// Definite integral over `[a, b]`, exact in integers.
    ///
    /// For `Linear` the result is floored once at the end; for
    /// `Polynomial` exactness is guaranteed by construction.
    pub fn integral(&self, a: i64, b: i64) -> i64 {
        match self {
            Self::Constant { value } => value * (b - a),
            Self::Linear { slope, intercept } => {
                (slope * (b + a) * (b - a)).div_euclid(2) + intercept * (b - a)
            }
            Self::Polynomial { coefficients } => {
                let g = Self::antiderivative_coefficients(coefficients);
                Self::eval_poly(&g, b) - Self::eval_poly(&g, a)
            }
        }
    }

    /// Coefficients of the antiderivative, `g[k+1] = c[k] / (k+1)`, `g[0] = 0`.
    ///
    /// Only valid for polynomials accepted by [`Function::polynomial`].
    pub(crate) fn antiderivative_coefficients(coefficients: &[i64]) -> Vec<i64> {
        let mut g = Vec::with_capacity(coefficients.len() + 1);
        g.push(0);
        for (degree, &c) in coefficients.iter().enumerate() {
            g.push(c / (degree as i64 + 1));
        }
        g
    }

    fn eval_poly(coefficients: &[i64], t: i64) -> i64 {
        coefficients.iter().rev().fold(0i64, |acc, &c| acc * t + c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant() {
        let f = Function::constant(5);
        assert_eq!(f.value_at(0), 5);
        assert_eq!(f.value_at(100), 5);
        assert_eq!(f.integral(2, 7), 25);
    }

    #[test]
    fn test_linear_even_window() {
        // f(t) = 2t + 1, integral over [0, 4] = 16 + 4 = 20
        let f = Function::linear(2, 1);
        assert_eq!(f.value_at(3), 7);
        assert_eq!(f.integral(0, 4), 20);
    }

    #[test]
    fn test_linear_odd_window_floors() {
        // f(t) = t, integral over [0, 3] = 4.5 → floored to 4
        let f = Function::linear(1, 0);
        assert_eq!(f.integral(0, 3), 4);
    }

    #[test]
    fn test_polynomial_eval() {
        // f(t) = 1 + 2t + 3t^2
        let f = Function::polynomial(vec![1, 2, 3]).unwrap();
        assert_eq!(f.value_at(0), 1);
        assert_eq!(f.value_at(2), 17);
    }

    #[test]
    fn test_polynomial_integral_exact() {
        // f(t) = 3t^2 → F(t) = t^3, integral over [1, 4] = 64 - 1 = 63
        let f = Function::polynomial(vec![0, 0, 3]).unwrap();
        assert_eq!(f.integral(1, 4), 63);
    }

    #[test]
    fn test_polynomial_rejects_non_integer_antiderivative() {
        // c_1 = 3 is not divisible by 2
        let err = Function::polynomial(vec![0, 3]).unwrap_err();
        assert!(matches!(
            err,
            ModelError::NonIntegerCoefficient { degree: 1, .. }
        ));
    }

    #[test]
    fn test_zero_width_integral() {
        let f = Function::linear(7, 3);
        assert_eq!(f.integral(5, 5), 0);
    }
}
