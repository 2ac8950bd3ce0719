//! Canonical expanded form used by `simplify` and by the equation solver.
//!
//! An expression is rewritten as a sum of `coefficient * monomial`, where a
//! monomial is a product of atoms raised to integer powers. Atoms are symbols
//! plus every subexpression that is not a polynomial operation: function calls,
//! fractional or symbolic powers, and sums raised to negative or very large
//! powers. Atoms are keyed by their printed form, so two atoms are the same
//! exactly when they print the same.

use super::expr::{Expr, Func};
use num_complex::Complex64;
use std::collections::BTreeMap;

/// Atom key -> nonzero integer exponent.
pub(crate) type Monomial = BTreeMap<String, i64>;

/// Integer powers of multi-term sums above this degree are kept as atoms.
const MAX_EXPANSION_DEGREE: i64 = 8;
/// A sum whose magnitude falls below this fraction of its largest summand is
/// cancellation noise and becomes zero. Also bounds a coefficient's real or
/// imaginary part relative to the coefficient.
const CHOP_RELATIVE: f64 = 1e-13;

#[derive(Debug, Clone, Default)]
pub(crate) struct Poly {
    pub terms: BTreeMap<Monomial, Complex64>,
    pub atoms: BTreeMap<String, Expr>,
}

pub(crate) fn complex_pow(base: Complex64, exp: Complex64) -> Complex64 {
    if exp.im != 0.0 {
        if base == Complex64::new(0.0, 0.0) {
            return Complex64::new(0.0, 0.0);
        }
        return base.powc(exp);
    }
    let e = exp.re;
    if e == e.trunc() && e.abs() <= i32::MAX as f64 {
        return base.powi(e as i32);
    }
    if base.im == 0.0 && base.re >= 0.0 {
        return Complex64::new(base.re.powf(e), 0.0);
    }
    if e == 0.5 {
        return base.sqrt();
    }
    base.powf(e)
}

/// Adds `value` to the coefficient of `mono`, zeroing a result that is only
/// rounding residue of the summands. Non-finite sums are kept.
fn accumulate(terms: &mut BTreeMap<Monomial, Complex64>, mono: Monomial, value: Complex64) {
    let entry = terms.entry(mono).or_insert(Complex64::new(0.0, 0.0));
    let scale = entry.norm().max(value.norm());
    *entry += value;
    if scale.is_finite() && entry.norm() <= CHOP_RELATIVE * scale {
        *entry = Complex64::new(0.0, 0.0);
    }
}

fn is_integer(value: f64) -> bool {
    value.is_finite() && value == value.trunc()
}

impl Poly {
    pub fn constant(value: Complex64) -> Poly {
        let mut poly = Poly::default();
        if value != Complex64::new(0.0, 0.0) {
            poly.terms.insert(Monomial::new(), value);
        }
        poly
    }

    /// A single atom raised to `exponent`.
    pub fn atom_pow(atom: Expr, exponent: i64) -> Poly {
        let key = atom.to_string();
        let mut poly = Poly::default();
        let mut mono = Monomial::new();
        mono.insert(key.clone(), exponent);
        poly.terms.insert(mono, Complex64::new(1.0, 0.0));
        poly.atoms.insert(key, atom);
        poly
    }

    pub fn atom(atom: Expr) -> Poly {
        Poly::atom_pow(atom, 1)
    }

    pub fn from_expr(expr: &Expr) -> Poly {
        let mut poly = to_poly(expr);
        poly.chop();
        poly
    }

    pub fn as_constant(&self) -> Option<Complex64> {
        match self.terms.len() {
            0 => Some(Complex64::new(0.0, 0.0)),
            1 => self
                .terms
                .iter()
                .next()
                .filter(|(mono, _)| mono.is_empty())
                .map(|(_, c)| *c),
            _ => None,
        }
    }

    pub fn has_non_finite(&self) -> bool {
        self.terms
            .values()
            .any(|c| !(c.re.is_finite() && c.im.is_finite()))
    }

    pub fn add_assign(&mut self, other: Poly) {
        self.atoms.extend(other.atoms);
        for (mono, coeff) in other.terms {
            accumulate(&mut self.terms, mono, coeff);
        }
        self.terms.retain(|_, c| *c != Complex64::new(0.0, 0.0));
    }

    pub fn mul(&self, other: &Poly) -> Poly {
        let mut out = Poly::default();
        out.atoms = self.atoms.clone();
        out.atoms.extend(other.atoms.clone());
        for (lm, lc) in &self.terms {
            for (rm, rc) in &other.terms {
                accumulate(&mut out.terms, multiply_monomials(lm, rm), lc * rc);
            }
        }
        out.terms.retain(|_, c| *c != Complex64::new(0.0, 0.0));
        out
    }

    /// Integer power. `None` when the result should stay an atom: a multi-term
    /// sum raised to a negative power or beyond the expansion limit.
    pub fn pow_int(&self, exponent: i64) -> Option<Poly> {
        if exponent == 0 {
            return Some(Poly::constant(Complex64::new(1.0, 0.0)));
        }
        if self.terms.len() == 1 {
            let (mono, coeff) = self.terms.iter().next()?;
            let mut out = Poly::default();
            out.atoms = self.atoms.clone();
            let scaled: Monomial = mono.iter().map(|(k, e)| (k.clone(), e * exponent)).collect();
            let value = complex_pow(*coeff, Complex64::new(exponent as f64, 0.0));
            out.terms.insert(scaled, value);
            return Some(out);
        }
        if self.terms.is_empty() {
            return Some(Poly::constant(complex_pow(
                Complex64::new(0.0, 0.0),
                Complex64::new(exponent as f64, 0.0),
            )));
        }
        if exponent < 0 || exponent > MAX_EXPANSION_DEGREE {
            return None;
        }
        let mut out = self.clone();
        for _ in 1..exponent {
            out = out.mul(self);
        }
        Some(out)
    }

    pub fn mul_monomial(&self, mono: &Monomial) -> Poly {
        let mut out = Poly::default();
        out.atoms = self.atoms.clone();
        for (m, c) in &self.terms {
            out.terms.insert(multiply_monomials(m, mono), *c);
        }
        out
    }

    /// Keys of atoms whose expression satisfies `pred`.
    pub fn atom_keys_where(&self, pred: impl Fn(&Expr) -> bool) -> Vec<String> {
        self.atoms
            .iter()
            .filter(|(key, atom)| self.uses_atom(key) && pred(atom))
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn uses_atom(&self, key: &str) -> bool {
        self.terms.keys().any(|mono| mono.contains_key(key))
    }

    /// Smallest and largest exponent of `key` across all terms (absent = 0).
    pub fn exponent_range(&self, key: &str) -> (i64, i64) {
        let mut min = i64::MAX;
        let mut max = i64::MIN;
        for mono in self.terms.keys() {
            let e = mono.get(key).copied().unwrap_or(0);
            min = min.min(e);
            max = max.max(e);
        }
        if self.terms.is_empty() {
            (0, 0)
        } else {
            (min, max)
        }
    }

    /// Splits the polynomial by the exponent of `key`. Each coefficient has
    /// `key` removed.
    pub fn coefficients_in(&self, key: &str) -> BTreeMap<i64, Poly> {
        let mut out: BTreeMap<i64, Poly> = BTreeMap::new();
        for (mono, coeff) in &self.terms {
            let exp = mono.get(key).copied().unwrap_or(0);
            let mut rest = mono.clone();
            rest.remove(key);
            let entry = out.entry(exp).or_insert_with(|| Poly {
                terms: BTreeMap::new(),
                atoms: self.atoms.clone(),
            });
            entry.terms.insert(rest, *coeff);
        }
        out
    }

    /// Drops real or imaginary parts that are negligible next to the rest of
    /// their coefficient. Whole coefficients only vanish through
    /// cancellation, see [`accumulate`].
    pub fn chop(&mut self) {
        for coeff in self.terms.values_mut() {
            let magnitude = coeff.norm();
            if coeff.im != 0.0 && coeff.im.abs() <= CHOP_RELATIVE * magnitude {
                coeff.im = 0.0;
            }
            if coeff.re != 0.0 && coeff.re.abs() <= CHOP_RELATIVE * magnitude {
                coeff.re = 0.0;
            }
        }
        self.terms.retain(|_, c| *c != Complex64::new(0.0, 0.0));
    }

    pub fn to_expr(&self) -> Expr {
        let mut terms = Vec::with_capacity(self.terms.len());
        let mut constant = None;
        for (mono, coeff) in &self.terms {
            if mono.is_empty() {
                constant = Some(Expr::Num(*coeff));
                continue;
            }
            let mut factors: Vec<Expr> = mono
                .iter()
                .map(|(key, exp)| {
                    let atom = self.atoms.get(key).cloned().unwrap_or_else(|| Expr::symbol(key));
                    if *exp == 1 {
                        atom
                    } else {
                        atom.pow(Expr::real(*exp as f64))
                    }
                })
                .collect();
            if *coeff != Complex64::new(1.0, 0.0) {
                factors.insert(0, Expr::Num(*coeff));
            }
            terms.push(if factors.len() == 1 {
                factors.remove(0)
            } else {
                Expr::Mul(factors)
            });
        }
        if let Some(c) = constant {
            terms.push(c);
        }
        match terms.len() {
            0 => Expr::zero(),
            1 => terms.remove(0),
            _ => Expr::Add(terms),
        }
    }
}

fn multiply_monomials(lhs: &Monomial, rhs: &Monomial) -> Monomial {
    let mut out = lhs.clone();
    for (key, exp) in rhs {
        let entry = out.entry(key.clone()).or_insert(0);
        *entry += exp;
        if *entry == 0 {
            out.remove(key);
        }
    }
    out
}

fn to_poly(expr: &Expr) -> Poly {
    match expr {
        Expr::Num(value) => Poly::constant(*value),
        Expr::Sym(_) => Poly::atom(expr.clone()),
        Expr::Add(items) => {
            let mut acc = Poly::default();
            for item in items {
                acc.add_assign(to_poly(item));
            }
            acc
        }
        Expr::Mul(items) => {
            // Repeated bases are merged before expanding so that `u/u` cancels
            // even when `u` is kept as an atom.
            let mut grouped: Vec<(String, Poly, Complex64)> = Vec::new();
            let mut factors: Vec<Poly> = Vec::with_capacity(items.len());
            for item in items {
                let (base, exp) = match item {
                    Expr::Pow(base, exp) => match exp.as_number() {
                        Some(e) => (&**base, e),
                        None => {
                            factors.push(to_poly(item));
                            continue;
                        }
                    },
                    other => (other, Complex64::new(1.0, 0.0)),
                };
                let mut base_poly = to_poly(base);
                base_poly.chop();
                if base_poly.as_constant().is_some() {
                    // Numeric bases are never merged: 0 * 0^-1 stays undefined.
                    factors.push(power_of_poly(base_poly, exp));
                    continue;
                }
                let key = base_poly.to_expr().to_string();
                match grouped.iter_mut().find(|(k, _, _)| *k == key) {
                    Some(entry) => entry.2 += exp,
                    None => grouped.push((key, base_poly, exp)),
                }
            }
            factors.extend(
                grouped
                    .into_iter()
                    .map(|(_, base, exp)| power_of_poly(base, exp)),
            );
            if factors.iter().any(Poly::has_non_finite) {
                return Poly::constant(Complex64::new(f64::NAN, f64::NAN));
            }
            factors
                .iter()
                .fold(Poly::constant(Complex64::new(1.0, 0.0)), |acc, f| acc.mul(f))
        }
        Expr::Pow(base, exp) => power_to_poly(base, exp),
        Expr::Call(func, arg) => call_to_poly(*func, arg),
    }
}

fn power_to_poly(base: &Expr, exp: &Expr) -> Poly {
    let mut exp_poly = to_poly(exp);
    exp_poly.chop();
    let mut base_poly = to_poly(base);
    base_poly.chop();
    match exp_poly.as_constant() {
        Some(e) => power_of_poly(base_poly, e),
        None => Poly::atom(base_poly.to_expr().pow(exp_poly.to_expr())),
    }
}

fn power_of_poly(base: Poly, exponent: Complex64) -> Poly {
    if let Some(b) = base.as_constant() {
        return Poly::constant(complex_pow(b, exponent));
    }
    let integer = (exponent.im == 0.0 && is_integer(exponent.re) && exponent.re.abs() <= 1e6)
        .then_some(exponent.re as i64);
    let base_expr = base.to_expr();
    // (u^r)^n = u^(r*n) for integer n.
    if let (Some(n), Expr::Pow(inner, inner_exp)) = (integer, &base_expr) {
        if let Some(r) = inner_exp.as_real() {
            let mut inner_poly = to_poly(inner);
            inner_poly.chop();
            return power_of_poly(inner_poly, Complex64::new(r * n as f64, 0.0));
        }
    }
    match integer {
        Some(n) => base
            .pow_int(n)
            .unwrap_or_else(|| Poly::atom_pow(base_expr, n)),
        None => Poly::atom(base_expr.pow(Expr::Num(exponent))),
    }
}

fn call_to_poly(func: Func, arg: &Expr) -> Poly {
    let mut arg_poly = to_poly(arg);
    arg_poly.chop();
    if let Some(value) = arg_poly.as_constant() {
        return Poly::constant(func.eval(value));
    }
    let arg = arg_poly.to_expr();
    match (func, &arg) {
        (Func::Exp, Expr::Call(Func::Ln, inner)) | (Func::Ln, Expr::Call(Func::Exp, inner)) => {
            to_poly(inner)
        }
        _ => Poly::atom(Expr::call(func, arg)),
    }
}

const MAX_SIMPLIFY_PASSES: usize = 8;

/// Canonical simplified form of `expr`. Idempotent.
pub fn simplify(expr: &Expr) -> Expr {
    let mut current = Poly::from_expr(expr).to_expr();
    for _ in 1..MAX_SIMPLIFY_PASSES {
        let next = Poly::from_expr(&current).to_expr();
        if next == current {
            break;
        }
        current = next;
    }
    current
}
