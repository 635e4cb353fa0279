//! 多項式の最小二乗当てはめと根の計算
//!
//! - 当てはめ: 列スケーリングした Vandermonde 行列に Householder QR を適用
//! - 根: Aberth–Ehrlich 法で全複素根を同時に求める

use std::f64::consts::TAU;
use std::ops::{Add, Div, Mul, Neg, Sub};

use crate::error::{WdlError, WdlResult};

/// Aberth 反復の最大回数
const MAX_ROOT_ITERATIONS: usize = 500;
/// 反復の収束判定（相対ステップ幅）
const ROOT_STEP_TOLERANCE: f64 = 1e-14;
/// 虚部がこれ以下（相対）なら実根とみなす
const REAL_ROOT_TOLERANCE: f64 = 1e-7;
/// 実根の Newton 仕上げ回数
const POLISH_ITERATIONS: usize = 8;
/// R の対角成分がこれ以下（最大値に対する比）ならランク落ち
const RANK_TOLERANCE: f64 = 1e-10;

/// 複素数
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Complex {
    pub re: f64,
    pub im: f64,
}

impl Complex {
    pub const ZERO: Complex = Complex::new(0.0, 0.0);
    pub const ONE: Complex = Complex::new(1.0, 0.0);

    pub const fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }

    pub fn from_polar(r: f64, theta: f64) -> Self {
        Self::new(r * theta.cos(), r * theta.sin())
    }

    pub fn norm(self) -> f64 {
        self.re.hypot(self.im)
    }

    pub fn recip(self) -> Self {
        let d = self.re * self.re + self.im * self.im;
        Self::new(self.re / d, -self.im / d)
    }

    /// 虚部が実部の大きさに対して無視できるか
    pub fn is_real(self) -> bool {
        self.im.abs() <= REAL_ROOT_TOLERANCE * self.norm().max(1.0)
    }
}

impl Add for Complex {
    type Output = Complex;
    fn add(self, rhs: Complex) -> Complex {
        Complex::new(self.re + rhs.re, self.im + rhs.im)
    }
}

impl Sub for Complex {
    type Output = Complex;
    fn sub(self, rhs: Complex) -> Complex {
        Complex::new(self.re - rhs.re, self.im - rhs.im)
    }
}

impl Mul for Complex {
    type Output = Complex;
    fn mul(self, rhs: Complex) -> Complex {
        Complex::new(
            self.re * rhs.re - self.im * rhs.im,
            self.re * rhs.im + self.im * rhs.re,
        )
    }
}

impl Div for Complex {
    type Output = Complex;
    fn div(self, rhs: Complex) -> Complex {
        self * rhs.recip()
    }
}

impl Neg for Complex {
    type Output = Complex;
    fn neg(self) -> Complex {
        Complex::new(-self.re, -self.im)
    }
}

/// 実係数多項式。`coeffs[k]` が `x^k` の係数。
#[derive(Debug, Clone, PartialEq)]
pub struct Polynomial {
    coeffs: Vec<f64>,
}

impl Polynomial {
    /// 昇冪順の係数から作る
    pub fn new(ascending: Vec<f64>) -> Self {
        Self { coeffs: ascending }
    }

    /// 降冪順（最高次が先頭）の係数から作る
    pub fn from_descending(descending: &[f64]) -> Self {
        Self::new(descending.iter().rev().copied().collect())
    }

    /// 昇冪順の係数
    pub fn coefficients(&self) -> &[f64] {
        &self.coeffs
    }

    /// 降冪順の係数（`[a4, a3, a2, a1, a0]` のような表示用）
    pub fn descending(&self) -> Vec<f64> {
        self.coeffs.iter().rev().copied().collect()
    }

    /// 非ゼロ係数を持つ最高次数
    pub fn degree(&self) -> usize {
        self.coeffs.iter().rposition(|&c| c != 0.0).unwrap_or(0)
    }

    pub fn eval(&self, x: f64) -> f64 {
        self.coeffs.iter().rev().fold(0.0, |acc, &c| acc * x + c)
    }

    /// 定数項に `delta` を加えた多項式
    pub fn with_constant_offset(&self, delta: f64) -> Self {
        let mut coeffs = self.coeffs.clone();
        match coeffs.first_mut() {
            Some(c0) => *c0 += delta,
            None => coeffs.push(delta),
        }
        Self::new(coeffs)
    }

    pub fn derivative(&self) -> Self {
        let coeffs = self
            .coeffs
            .iter()
            .enumerate()
            .skip(1)
            .map(|(k, &c)| c * k as f64)
            .collect();
        Self::new(coeffs)
    }

    /// 全ての複素根（重複度込み）
    ///
    /// 次数 0 の多項式（定数）は根を持たないものとして空を返す。
    pub fn roots(&self) -> Vec<Complex> {
        let hi = match self.coeffs.iter().rposition(|&c| c != 0.0) {
            Some(hi) if hi > 0 => hi,
            _ => return Vec::new(),
        };
        let coeffs = &self.coeffs[..=hi];

        // x^k で割り切れる分はちょうど 0 の根
        let lo = coeffs.iter().position(|&c| c != 0.0).unwrap_or(0);
        let mut roots = vec![Complex::ZERO; lo];
        let reduced = &coeffs[lo..];

        match reduced.len() - 1 {
            0 => {}
            1 => roots.push(Complex::new(-reduced[0] / reduced[1], 0.0)),
            _ => roots.extend(aberth(reduced)),
        }
        roots
    }

    /// 実根のみ（Newton 法で仕上げ済み）
    pub fn real_roots(&self) -> Vec<f64> {
        let derivative = self.derivative();
        self.roots()
            .into_iter()
            .filter(|z| z.is_real())
            .map(|z| self.polish(z.re, &derivative))
            .collect()
    }

    fn polish(&self, mut x: f64, derivative: &Polynomial) -> f64 {
        for _ in 0..POLISH_ITERATIONS {
            let fx = self.eval(x);
            let dfx = derivative.eval(x);
            if fx == 0.0 || dfx == 0.0 {
                break;
            }
            let next = x - fx / dfx;
            if !next.is_finite() || self.eval(next).abs() >= fx.abs() {
                break;
            }
            x = next;
        }
        x
    }
}

impl Mul for &Polynomial {
    type Output = Polynomial;

    fn mul(self, rhs: &Polynomial) -> Polynomial {
        if self.coeffs.is_empty() || rhs.coeffs.is_empty() {
            return Polynomial::new(Vec::new());
        }
        let mut out = vec![0.0; self.coeffs.len() + rhs.coeffs.len() - 1];
        for (i, &a) in self.coeffs.iter().enumerate() {
            for (j, &b) in rhs.coeffs.iter().enumerate() {
                out[i + j] += a * b;
            }
        }
        Polynomial::new(out)
    }
}

/// 多項式と導関数を複素点で同時に評価する（Horner 法）
fn eval_with_derivative(coeffs: &[f64], z: Complex) -> (Complex, Complex) {
    let mut p = Complex::ZERO;
    let mut dp = Complex::ZERO;
    for &c in coeffs.iter().rev() {
        dp = dp * z + p;
        p = p * z + Complex::new(c, 0.0);
    }
    (p, dp)
}

/// Aberth–Ehrlich 法。`coeffs` は昇冪順、次数 2 以上、定数項と最高次係数が非ゼロ。
fn aberth(coeffs: &[f64]) -> Vec<Complex> {
    let n = coeffs.len() - 1;
    let lead = coeffs[n];
    let monic: Vec<f64> = coeffs.iter().map(|c| c / lead).collect();

    // 根の積の大きさから初期半径を決める
    let radius = monic[0].abs().powf(1.0 / n as f64);
    let radius = if radius.is_finite() && radius > 0.0 { radius } else { 1.0 };
    let mut z: Vec<Complex> = (0..n)
        .map(|k| Complex::from_polar(radius, TAU * k as f64 / n as f64 + 0.4))
        .collect();

    for iteration in 0..MAX_ROOT_ITERATIONS {
        let mut converged = true;
        for k in 0..n {
            let (p, dp) = eval_with_derivative(&monic, z[k]);
            if p.norm() == 0.0 {
                continue;
            }
            if dp.norm() == 0.0 {
                // 停留点: 少しずらして次の反復に任せる
                z[k] = z[k] + Complex::new(radius * 1e-8, radius * 1e-8);
                converged = false;
                continue;
            }
            let ratio = p / dp;
            let mut repulsion = Complex::ZERO;
            for j in (0..n).filter(|&j| j != k) {
                let diff = z[k] - z[j];
                if diff.norm() > 0.0 {
                    repulsion = repulsion + diff.recip();
                }
            }
            let step = ratio / (Complex::ONE - ratio * repulsion);
            if !(step.re.is_finite() && step.im.is_finite()) {
                continue;
            }
            z[k] = z[k] - step;
            if step.norm() > ROOT_STEP_TOLERANCE * z[k].norm().max(1.0) {
                converged = false;
            }
        }
        if converged {
            log::trace!("aberth converged after {} iterations", iteration + 1);
            return z;
        }
    }
    log::debug!("aberth did not fully converge after {MAX_ROOT_ITERATIONS} iterations");
    z
}

/// 複素根のうち実根で絶対値が最小のものを選ぶ。
///
/// 絶対値が等しい場合は負の方を選ぶ。実根がなければ `None`。
pub fn nearest_real_root(roots: &[Complex]) -> Option<f64> {
    nearest_to_zero(roots.iter().filter(|z| z.is_real()).map(|z| z.re))
}

pub(crate) fn nearest_to_zero(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    values.into_iter().filter(|v| v.is_finite()).min_by(|a, b| {
        a.abs().total_cmp(&b.abs()).then_with(|| a.total_cmp(b))
    })
}

/// 最小二乗で `degree` 次多項式を当てはめる。
///
/// 点数が `degree + 1` 未満、または係数行列がランク落ちしていれば
/// [`WdlError::Singular`]。
pub fn polyfit(xs: &[f64], ys: &[f64], degree: usize) -> WdlResult<Polynomial> {
    if xs.len() != ys.len() {
        return Err(WdlError::Singular(format!(
            "x/y length mismatch: {} vs {}",
            xs.len(),
            ys.len()
        )));
    }
    let n = xs.len();
    let m = degree + 1;
    if n < m {
        return Err(WdlError::Singular(format!(
            "{n} points are not enough for a degree {degree} fit"
        )));
    }
    if xs.iter().chain(ys).any(|v| !v.is_finite()) {
        return Err(WdlError::Singular("non-finite input".to_string()));
    }

    // x を [-1, 1] に縮めてから各列を正規化する
    let x_scale = xs.iter().fold(0.0_f64, |acc, &x| acc.max(x.abs()));
    let x_scale = if x_scale > 0.0 { x_scale } else { 1.0 };
    let mut cols: Vec<Vec<f64>> = (0..m)
        .map(|j| xs.iter().map(|&x| (x / x_scale).powi(j as i32)).collect())
        .collect();
    let mut col_norms = Vec::with_capacity(m);
    for col in &mut cols {
        let norm = col.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm == 0.0 {
            return Err(WdlError::Singular("zero column in design matrix".to_string()));
        }
        col.iter_mut().for_each(|v| *v /= norm);
        col_norms.push(norm);
    }
    let mut rhs = ys.to_vec();

    // Householder QR: cols は R（上三角部分）で、rhs は Q^T y で上書きされる
    for k in 0..m {
        let norm = cols[k][k..].iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm == 0.0 {
            return Err(WdlError::Singular(format!("column {k} is linearly dependent")));
        }
        let alpha = if cols[k][k] > 0.0 { -norm } else { norm };
        let mut v = cols[k][k..].to_vec();
        v[0] -= alpha;
        let v_norm2: f64 = v.iter().map(|x| x * x).sum();

        for col in cols.iter_mut().skip(k) {
            reflect(&v, v_norm2, &mut col[k..]);
        }
        reflect(&v, v_norm2, &mut rhs[k..]);
    }

    let max_diag = (0..m).map(|k| cols[k][k].abs()).fold(0.0_f64, f64::max);
    let tol = max_diag * RANK_TOLERANCE;
    if let Some(k) = (0..m).find(|&k| cols[k][k].abs() <= tol) {
        return Err(WdlError::Singular(format!("rank deficient at column {k}")));
    }

    // 後退代入
    let mut solution = vec![0.0; m];
    for i in (0..m).rev() {
        let tail: f64 = ((i + 1)..m).map(|j| cols[j][i] * solution[j]).sum();
        solution[i] = (rhs[i] - tail) / cols[i][i];
    }

    let coeffs = solution
        .iter()
        .zip(&col_norms)
        .enumerate()
        .map(|(j, (&c, &norm))| c / norm / x_scale.powi(j as i32))
        .collect();
    Ok(Polynomial::new(coeffs))
}

/// `target -= 2 v (v·target) / (v·v)`
fn reflect(v: &[f64], v_norm2: f64, target: &mut [f64]) {
    let dot: f64 = v.iter().zip(target.iter()).map(|(a, b)| a * b).sum();
    let factor = 2.0 * dot / v_norm2;
    for (t, &vi) in target.iter_mut().zip(v) {
        *t -= factor * vi;
    }
}
