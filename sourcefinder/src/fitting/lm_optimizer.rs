//! Levenberg-Marquardt least squares for small fixed-size parameter vectors.

use crate::math::linear_solver::solve;

#[derive(Debug, Clone)]
pub struct LmSettings {
    pub max_iterations: usize,
    /// Stop once every parameter step is below this.
    pub convergence_threshold: f64,
    pub initial_lambda: f64,
    pub lambda_up: f64,
    pub lambda_down: f64,
}

impl Default for LmSettings {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            convergence_threshold: 1e-8,
            initial_lambda: 0.001,
            lambda_up: 10.0,
            lambda_down: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Optimum<const N: usize> {
    pub params: [f64; N],
    pub chi2: f64,
    pub converged: bool,
    pub iterations: usize,
}

/// Pixel samples to fit: positions and values.
#[derive(Debug, Clone, Default)]
pub struct FitData {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
}

impl FitData {
    pub fn len(&self) -> usize {
        self.z.len()
    }

    pub fn is_empty(&self) -> bool {
        self.z.is_empty()
    }

    pub fn push(&mut self, x: f64, y: f64, z: f64) {
        self.x.push(x);
        self.y.push(y);
        self.z.push(z);
    }

    fn samples(&self) -> impl Iterator<Item = (f64, f64, f64)> + '_ {
        self.x
            .iter()
            .zip(&self.y)
            .zip(&self.z)
            .map(|((&x, &y), &z)| (x, y, z))
    }
}

/// An analytic surface with `N` parameters.
pub trait ProfileModel<const N: usize> {
    fn evaluate(&self, x: f64, y: f64, params: &[f64; N]) -> f64;

    /// Partial derivatives with respect to each parameter.
    fn jacobian_row(&self, x: f64, y: f64, params: &[f64; N]) -> [f64; N];

    /// Clamps parameters into their valid domain after each step.
    fn constrain(&self, params: &mut [f64; N]);
}

pub fn optimize<const N: usize, M: ProfileModel<N>>(
    model: &M,
    data: &FitData,
    initial_params: [f64; N],
    settings: &LmSettings,
) -> Optimum<N> {
    let mut params = initial_params;
    model.constrain(&mut params);
    let mut lambda = settings.initial_lambda;
    let mut chi2 = compute_chi2(model, data, &params);
    let mut converged = false;
    let mut iterations = 0;

    for iter in 0..settings.max_iterations {
        iterations = iter + 1;

        let (hessian, gradient) = normal_equations(model, data, &params);
        let mut damped = hessian;
        for (i, row) in damped.iter_mut().enumerate() {
            row[i] *= 1.0 + lambda;
        }

        let Some(delta) = solve(&damped, &gradient) else {
            break;
        };

        let mut candidate = params;
        for (p, d) in candidate.iter_mut().zip(delta.iter()) {
            *p += d;
        }
        model.constrain(&mut candidate);

        let candidate_chi2 = compute_chi2(model, data, &candidate);
        if candidate_chi2 < chi2 {
            params = candidate;
            chi2 = candidate_chi2;
            lambda *= settings.lambda_down;

            let max_delta = delta.iter().fold(0.0f64, |a, d| a.max(d.abs()));
            if max_delta < settings.convergence_threshold {
                converged = true;
                break;
            }
        } else {
            lambda *= settings.lambda_up;
            if lambda > 1e10 {
                // No downhill step left.
                converged = true;
                break;
            }
        }
    }

    Optimum {
        params,
        chi2,
        converged,
        iterations,
    }
}

fn compute_chi2<const N: usize, M: ProfileModel<N>>(
    model: &M,
    data: &FitData,
    params: &[f64; N],
) -> f64 {
    data.samples()
        .map(|(x, y, z)| {
            let residual = z - model.evaluate(x, y, params);
            residual * residual
        })
        .sum()
}

/// `JᵀJ` and `Jᵀr`, filling the upper triangle and mirroring it.
#[allow(clippy::needless_range_loop)]
fn normal_equations<const N: usize, M: ProfileModel<N>>(
    model: &M,
    data: &FitData,
    params: &[f64; N],
) -> ([[f64; N]; N], [f64; N]) {
    let mut hessian = [[0.0f64; N]; N];
    let mut gradient = [0.0f64; N];

    for (x, y, z) in data.samples() {
        let row = model.jacobian_row(x, y, params);
        let r = z - model.evaluate(x, y, params);
        for i in 0..N {
            gradient[i] += row[i] * r;
            for j in i..N {
                hessian[i][j] += row[i] * row[j];
            }
        }
    }

    for i in 1..N {
        for j in 0..i {
            hessian[i][j] = hessian[j][i];
        }
    }

    (hessian, gradient)
}
