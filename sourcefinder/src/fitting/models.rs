//! Circular profile models. Parameters are `[x0, y0, amplitude, width, offset]`.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use super::lm_optimizer::ProfileModel;
use crate::math::sigma_to_fwhm;

pub const PROFILE_PARAMS: usize = 5;

const MIN_WIDTH: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ModelFamily {
    Gaussian,
    Moffat,
}

/// `amplitude × exp(-r² / 2σ²) + offset`, width = σ.
#[derive(Debug, Clone, Copy)]
pub struct CircularGaussian;

impl CircularGaussian {
    pub fn fwhm(sigma: f64) -> f64 {
        sigma_to_fwhm(sigma)
    }
}

impl ProfileModel<PROFILE_PARAMS> for CircularGaussian {
    #[inline]
    fn evaluate(&self, x: f64, y: f64, p: &[f64; PROFILE_PARAMS]) -> f64 {
        let [x0, y0, amp, sigma, offset] = *p;
        let r2 = (x - x0).powi(2) + (y - y0).powi(2);
        amp * (-r2 / (2.0 * sigma * sigma)).exp() + offset
    }

    #[inline]
    fn jacobian_row(&self, x: f64, y: f64, p: &[f64; PROFILE_PARAMS]) -> [f64; PROFILE_PARAMS] {
        let [x0, y0, amp, sigma, _] = *p;
        let (dx, dy) = (x - x0, y - y0);
        let r2 = dx * dx + dy * dy;
        let s2 = sigma * sigma;
        let e = (-r2 / (2.0 * s2)).exp();
        [
            amp * e * dx / s2,
            amp * e * dy / s2,
            e,
            amp * e * r2 / (s2 * sigma),
            1.0,
        ]
    }

    fn constrain(&self, p: &mut [f64; PROFILE_PARAMS]) {
        p[3] = p[3].max(MIN_WIDTH);
    }
}

/// `amplitude × (1 + r²/α²)^-β + offset` with fixed β, width = α.
#[derive(Debug, Clone, Copy)]
pub struct CircularMoffat {
    pub beta: f64,
}

impl CircularMoffat {
    pub fn new(beta: f64) -> Self {
        assert!(beta > 0.0, "Moffat beta must be positive, got {}", beta);
        Self { beta }
    }

    pub fn fwhm(&self, alpha: f64) -> f64 {
        2.0 * alpha * (2f64.powf(1.0 / self.beta) - 1.0).sqrt()
    }

    pub fn alpha(&self, fwhm: f64) -> f64 {
        fwhm / (2.0 * (2f64.powf(1.0 / self.beta) - 1.0).sqrt())
    }
}

impl ProfileModel<PROFILE_PARAMS> for CircularMoffat {
    #[inline]
    fn evaluate(&self, x: f64, y: f64, p: &[f64; PROFILE_PARAMS]) -> f64 {
        let [x0, y0, amp, alpha, offset] = *p;
        let r2 = (x - x0).powi(2) + (y - y0).powi(2);
        amp * (1.0 + r2 / (alpha * alpha)).powf(-self.beta) + offset
    }

    #[inline]
    fn jacobian_row(&self, x: f64, y: f64, p: &[f64; PROFILE_PARAMS]) -> [f64; PROFILE_PARAMS] {
        let [x0, y0, amp, alpha, _] = *p;
        let (dx, dy) = (x - x0, y - y0);
        let r2 = dx * dx + dy * dy;
        let a2 = alpha * alpha;
        let u = 1.0 + r2 / a2;
        let u_pow = u.powf(-self.beta);
        let common = 2.0 * amp * self.beta * u_pow / u;
        [
            common * dx / a2,
            common * dy / a2,
            u_pow,
            common * r2 / (a2 * alpha),
            1.0,
        ]
    }

    fn constrain(&self, p: &mut [f64; PROFILE_PARAMS]) {
        p[3] = p[3].max(MIN_WIDTH);
    }
}
