//! Signal-conditioning primitives shared by the windowing, filtering and
//! deconvolution stages: detrending, edge tapers, Gaussian pulses and a few
//! statistics helpers.

use ndarray::{Array1, ArrayViewMut, Ix1};
use std::f64::consts::PI;

/// Computes the Blackman window value for a given sample.
///
/// The implementation follows the mathematical definition as used by Python's
/// numpy library.
///
/// # Arguments
/// - `n`: The current time or sample index.
/// - `m`: The total length of the signal.
///
/// # Returns
/// The computed value of the Blackman window, clamped to [0.0, 1.0].
pub fn blackman_window(n: f64, m: f64) -> f64 {
    let res = 0.42 - 0.5 * (2.0 * PI * n / m).cos() + 0.08 * (4.0 * PI * n / m).cos();
    if res.is_nan() {
        1.0
    } else {
        res.clamp(0.0, 1.0)
    }
}

/// Removes the best-fit line (mean and slope) from a signal in place.
///
/// Seismogram segments carry long-period drift relative to the short analysis
/// window; the deconvolution stages assume zero-mean, trend-free input.
pub fn detrend_linear(signal: &mut ArrayViewMut<f64, Ix1>) {
    let n = signal.len();
    if n < 2 {
        return;
    }
    let nf = n as f64;
    // least-squares line over sample index
    let x_mean = (nf - 1.0) / 2.0;
    let y_mean = signal.iter().sum::<f64>() / nf;
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for (i, y) in signal.iter().enumerate() {
        let dx = i as f64 - x_mean;
        sxy += dx * (y - y_mean);
        sxx += dx * dx;
    }
    let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
    for (i, y) in signal.iter_mut().enumerate() {
        *y -= y_mean + slope * (i as f64 - x_mean);
    }
}

/// Applies a cosine (Tukey) taper to both edges of a signal in place.
///
/// # Arguments
/// - `signal`: A mutable view of the signal to modify.
/// - `fraction`: Fraction of the signal length tapered at EACH edge,
///   clamped to [0, 0.5].
pub fn apply_cosine_taper(signal: &mut ArrayViewMut<f64, Ix1>, fraction: f64) {
    let n = signal.len();
    let fraction = fraction.clamp(0.0, 0.5);
    let edge = (fraction * n as f64).floor() as usize;
    if edge == 0 {
        return;
    }
    for i in 0..edge {
        let w = 0.5 * (1.0 - (PI * i as f64 / edge as f64).cos());
        signal[i] *= w;
        signal[n - 1 - i] *= w;
    }
}

/// Applies Blackman edge tapers to a frequency-domain pass band.
///
/// Bins below `f_low` or above `f_high` are zeroed; bins within `edge_width`
/// of either corner are attenuated with the corresponding half of a Blackman
/// window, so the pass band rolls off without ringing.
pub fn apply_band_edge_taper(
    window: &mut ArrayViewMut<f64, Ix1>,
    frequencies: &Array1<f64>,
    f_low: f64,
    f_high: f64,
    edge_width: f64,
) {
    for (w, f) in window.iter_mut().zip(frequencies.iter()) {
        if *f < f_low || *f > f_high {
            *w = 0.0;
        } else if *f < f_low + edge_width {
            *w *= blackman_window(f - f_low, 2.0 * edge_width);
        } else if *f > f_high - edge_width {
            *w *= blackman_window(f - (f_high - 2.0 * edge_width), 2.0 * edge_width);
        }
    }
}

/// Gaussian low-pass spectrum `exp(-(pi f / a)^2)` evaluated on the given
/// frequency axis. `a` is the pulse-width parameter in Hz; smaller values
/// give broader pulses.
pub fn gaussian_spectrum(frequencies: &Array1<f64>, a: f64) -> Array1<f64> {
    frequencies.mapv(|f| {
        let x = PI * f / a;
        (-x * x).exp()
    })
}

/// Unit-peak Gaussian pulse sampled at `sample_rate`, centered on index
/// `n / 2`, matching the time-domain shape of [`gaussian_spectrum`].
pub fn gaussian_pulse(n: usize, sample_rate: f64, a: f64) -> Array1<f64> {
    let dt = 1.0 / sample_rate;
    let t0 = (n / 2) as f64 * dt;
    Array1::from_iter((0..n).map(|i| {
        let t = i as f64 * dt - t0;
        (-(a * t).powi(2)).exp()
    }))
}

/// Smallest power of two >= `n`.
pub fn next_pow2(n: usize) -> usize {
    let mut m = 1usize;
    while m < n {
        m <<= 1;
    }
    m
}

/// Root-mean-square amplitude of a slice. Returns 0.0 for empty input.
pub fn rms(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|x| x * x).sum::<f64>() / samples.len() as f64).sqrt()
}

/// Pearson correlation coefficient between two equal-length slices.
///
/// Returns 0.0 when either input has zero variance.
pub fn pearson_correlation(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n == 0 {
        return 0.0;
    }
    let nf = n as f64;
    let ma = a[..n].iter().sum::<f64>() / nf;
    let mb = b[..n].iter().sum::<f64>() / nf;
    let mut saa = 0.0;
    let mut sbb = 0.0;
    let mut sab = 0.0;
    for i in 0..n {
        let da = a[i] - ma;
        let db = b[i] - mb;
        saa += da * da;
        sbb += db * db;
        sab += da * db;
    }
    if saa <= 0.0 || sbb <= 0.0 {
        return 0.0;
    }
    sab / (saa * sbb).sqrt()
}
