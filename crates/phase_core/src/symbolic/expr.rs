use num_complex::Complex64;
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Elementary functions understood by the parser, simplifier and compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Func {
    Sin,
    Cos,
    Tan,
    Exp,
    Ln,
    Sinh,
    Cosh,
    Tanh,
    Asin,
    Acos,
    Atan,
}

impl Func {
    pub fn from_name(name: &str) -> Option<Func> {
        match name {
            "sin" => Some(Func::Sin),
            "cos" => Some(Func::Cos),
            "tan" => Some(Func::Tan),
            "exp" => Some(Func::Exp),
            "ln" | "log" => Some(Func::Ln),
            "sinh" => Some(Func::Sinh),
            "cosh" => Some(Func::Cosh),
            "tanh" => Some(Func::Tanh),
            "asin" => Some(Func::Asin),
            "acos" => Some(Func::Acos),
            "atan" => Some(Func::Atan),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Func::Sin => "sin",
            Func::Cos => "cos",
            Func::Tan => "tan",
            Func::Exp => "exp",
            Func::Ln => "ln",
            Func::Sinh => "sinh",
            Func::Cosh => "cosh",
            Func::Tanh => "tanh",
            Func::Asin => "asin",
            Func::Acos => "acos",
            Func::Atan => "atan",
        }
    }

    /// Principal-branch complex evaluation.
    pub fn eval(self, z: Complex64) -> Complex64 {
        match self {
            Func::Sin => z.sin(),
            Func::Cos => z.cos(),
            Func::Tan => z.tan(),
            Func::Exp => z.exp(),
            Func::Ln => z.ln(),
            Func::Sinh => z.sinh(),
            Func::Cosh => z.cosh(),
            Func::Tanh => z.tanh(),
            Func::Asin => z.asin(),
            Func::Acos => z.acos(),
            Func::Atan => z.atan(),
        }
    }
}

/// Symbolic expression tree.
///
/// Subtraction, negation and division have no node of their own: `a - b` is
/// `Add([a, Mul([-1, b])])` and `a / b` is `Mul([a, Pow(b, -1)])`. Numbers are
/// complex so that complex equilibria can be represented and detected.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Num(Complex64),
    Sym(String),
    Add(Vec<Expr>),
    Mul(Vec<Expr>),
    Pow(Box<Expr>, Box<Expr>),
    Call(Func, Box<Expr>),
}

impl Expr {
    pub fn real(value: f64) -> Expr {
        Expr::Num(Complex64::new(value, 0.0))
    }

    pub fn complex(re: f64, im: f64) -> Expr {
        Expr::Num(Complex64::new(re, im))
    }

    pub fn zero() -> Expr {
        Expr::real(0.0)
    }

    pub fn one() -> Expr {
        Expr::real(1.0)
    }

    pub fn symbol(name: &str) -> Expr {
        Expr::Sym(name.to_string())
    }

    pub fn call(func: Func, arg: Expr) -> Expr {
        Expr::Call(func, Box::new(arg))
    }

    pub fn pow(self, exponent: Expr) -> Expr {
        Expr::Pow(Box::new(self), Box::new(exponent))
    }

    pub fn powi(self, exponent: i32) -> Expr {
        self.pow(Expr::real(exponent as f64))
    }

    pub fn sqrt(self) -> Expr {
        self.pow(Expr::real(0.5))
    }

    pub fn recip(self) -> Expr {
        self.powi(-1)
    }

    /// The numeric value, if this node is a number.
    pub fn as_number(&self) -> Option<Complex64> {
        match self {
            Expr::Num(value) => Some(*value),
            _ => None,
        }
    }

    /// The real value, if this node is a number with no imaginary part.
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Expr::Num(value) if value.im == 0.0 => Some(value.re),
            _ => None,
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Expr::Num(_))
    }

    /// True when the expression simplifies to exactly zero.
    pub fn is_zero(&self) -> bool {
        matches!(super::simplify(self).as_number(), Some(v) if v == Complex64::new(0.0, 0.0))
    }

    pub fn free_symbols(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_symbols(&mut out);
        out
    }

    fn collect_symbols(&self, out: &mut BTreeSet<String>) {
        match self {
            Expr::Num(_) => {}
            Expr::Sym(name) => {
                out.insert(name.clone());
            }
            Expr::Add(items) | Expr::Mul(items) => {
                for item in items {
                    item.collect_symbols(out);
                }
            }
            Expr::Pow(base, exp) => {
                base.collect_symbols(out);
                exp.collect_symbols(out);
            }
            Expr::Call(_, arg) => arg.collect_symbols(out),
        }
    }

    pub fn contains_symbol(&self, name: &str) -> bool {
        match self {
            Expr::Num(_) => false,
            Expr::Sym(sym) => sym == name,
            Expr::Add(items) | Expr::Mul(items) => items.iter().any(|e| e.contains_symbol(name)),
            Expr::Pow(base, exp) => base.contains_symbol(name) || exp.contains_symbol(name),
            Expr::Call(_, arg) => arg.contains_symbol(name),
        }
    }

    pub fn contains_any(&self, names: &[String]) -> bool {
        names.iter().any(|name| self.contains_symbol(name))
    }

    /// Structural replacement of `name` by `value`. The result is not simplified.
    pub fn substitute(&self, name: &str, value: &Expr) -> Expr {
        match self {
            Expr::Sym(sym) if sym == name => value.clone(),
            Expr::Num(_) | Expr::Sym(_) => self.clone(),
            Expr::Add(items) => Expr::Add(items.iter().map(|e| e.substitute(name, value)).collect()),
            Expr::Mul(items) => Expr::Mul(items.iter().map(|e| e.substitute(name, value)).collect()),
            Expr::Pow(base, exp) => Expr::Pow(
                Box::new(base.substitute(name, value)),
                Box::new(exp.substitute(name, value)),
            ),
            Expr::Call(func, arg) => Expr::Call(*func, Box::new(arg.substitute(name, value))),
        }
    }

    /// Simultaneous replacement: every symbol found in `mapping` is replaced by
    /// its value in a single pass, so values are never substituted into each other.
    pub fn substitute_all(&self, mapping: &BTreeMap<String, Expr>) -> Expr {
        match self {
            Expr::Sym(sym) => mapping.get(sym).cloned().unwrap_or_else(|| self.clone()),
            Expr::Num(_) => self.clone(),
            Expr::Add(items) => Expr::Add(items.iter().map(|e| e.substitute_all(mapping)).collect()),
            Expr::Mul(items) => Expr::Mul(items.iter().map(|e| e.substitute_all(mapping)).collect()),
            Expr::Pow(base, exp) => Expr::Pow(
                Box::new(base.substitute_all(mapping)),
                Box::new(exp.substitute_all(mapping)),
            ),
            Expr::Call(func, arg) => Expr::Call(*func, Box::new(arg.substitute_all(mapping))),
        }
    }

    /// Numeric evaluation with complex arithmetic. Returns `None` when a free
    /// symbol has no value in `values`.
    pub fn eval_complex(&self, values: &BTreeMap<String, Complex64>) -> Option<Complex64> {
        match self {
            Expr::Num(value) => Some(*value),
            Expr::Sym(name) => values.get(name).copied(),
            Expr::Add(items) => items
                .iter()
                .try_fold(Complex64::new(0.0, 0.0), |acc, e| Some(acc + e.eval_complex(values)?)),
            Expr::Mul(items) => items
                .iter()
                .try_fold(Complex64::new(1.0, 0.0), |acc, e| Some(acc * e.eval_complex(values)?)),
            Expr::Pow(base, exp) => {
                let base = base.eval_complex(values)?;
                let exp = exp.eval_complex(values)?;
                Some(super::poly::complex_pow(base, exp))
            }
            Expr::Call(func, arg) => Some(func.eval(arg.eval_complex(values)?)),
        }
    }

    /// Splits a leading negative coefficient off, for display of sums.
    fn split_negative(&self) -> Option<Expr> {
        match self {
            Expr::Num(v) if v.im == 0.0 && v.re < 0.0 => Some(Expr::real(-v.re)),
            Expr::Mul(items) => match items.first() {
                Some(Expr::Num(v)) if v.im == 0.0 && v.re < 0.0 => {
                    let mut rest: Vec<Expr> = items[1..].to_vec();
                    if v.re != -1.0 {
                        rest.insert(0, Expr::real(-v.re));
                    }
                    Some(match rest.len() {
                        0 => Expr::one(),
                        1 if negative_exponent(&rest[0]).is_none() => rest.remove(0),
                        _ => Expr::Mul(rest),
                    })
                }
                _ => None,
            },
            _ => None,
        }
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr::real(value)
    }
}

impl From<&str> for Expr {
    fn from(name: &str) -> Self {
        Expr::symbol(name)
    }
}

impl std::ops::Add for Expr {
    type Output = Expr;
    fn add(self, rhs: Expr) -> Expr {
        Expr::Add(vec![self, rhs])
    }
}

impl std::ops::Sub for Expr {
    type Output = Expr;
    fn sub(self, rhs: Expr) -> Expr {
        Expr::Add(vec![self, -rhs])
    }
}

impl std::ops::Mul for Expr {
    type Output = Expr;
    fn mul(self, rhs: Expr) -> Expr {
        Expr::Mul(vec![self, rhs])
    }
}

impl std::ops::Div for Expr {
    type Output = Expr;
    fn div(self, rhs: Expr) -> Expr {
        Expr::Mul(vec![self, rhs.recip()])
    }
}

impl std::ops::Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::Mul(vec![Expr::real(-1.0), self])
    }
}

impl Serialize for Expr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// --- Display ---

fn fmt_real(value: f64) -> String {
    if value == value.trunc() && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else if value.abs() >= 1e-4 && value.abs() < 1e15 {
        format!("{value}")
    } else {
        format!("{value:e}")
    }
}

fn fmt_number(value: Complex64) -> String {
    if value.im == 0.0 {
        return fmt_real(value.re);
    }
    let imag = match value.im {
        v if v == 1.0 => "I".to_string(),
        v if v == -1.0 => "-I".to_string(),
        v => format!("{}*I", fmt_real(v)),
    };
    if value.re == 0.0 {
        imag
    } else if value.im < 0.0 {
        format!("{} - {}", fmt_real(value.re), imag.trim_start_matches('-'))
    } else {
        format!("{} + {}", fmt_real(value.re), imag)
    }
}

/// Binding strength used to decide where parentheses are needed.
fn precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Add(_) => 1,
        Expr::Mul(_) => 2,
        Expr::Num(v) if v.im != 0.0 && v.re != 0.0 => 1,
        Expr::Num(v) if v.re < 0.0 || v.im < 0.0 => 1,
        Expr::Num(v) if v.im != 0.0 => 2,
        Expr::Pow(_, exp) if exp.as_real() == Some(0.5) => 4,
        Expr::Pow(_, exp) if matches!(exp.as_real(), Some(e) if e < 0.0) => 2,
        Expr::Pow(..) => 3,
        _ => 4,
    }
}

fn wrap(expr: &Expr, min: u8) -> String {
    if precedence(expr) < min {
        format!("({expr})")
    } else {
        expr.to_string()
    }
}

fn negative_exponent(expr: &Expr) -> Option<(Expr, f64)> {
    match expr {
        Expr::Pow(base, exp) => match exp.as_real() {
            Some(e) if e < 0.0 => Some(((**base).clone(), -e)),
            _ => None,
        },
        _ => None,
    }
}

fn fmt_factor_list(factors: &[Expr]) -> String {
    factors
        .iter()
        .map(|f| wrap(f, 3))
        .collect::<Vec<_>>()
        .join("*")
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Num(value) => write!(f, "{}", fmt_number(*value)),
            Expr::Sym(name) => write!(f, "{name}"),
            Expr::Add(terms) => {
                if terms.is_empty() {
                    return write!(f, "0");
                }
                for (i, term) in terms.iter().enumerate() {
                    match (i, term.split_negative()) {
                        (0, Some(abs)) => write!(f, "-{}", wrap(&abs, 2))?,
                        (0, None) => write!(f, "{term}")?,
                        (_, Some(abs)) => write!(f, " - {}", wrap(&abs, 2))?,
                        (_, None) => write!(f, " + {term}")?,
                    }
                }
                Ok(())
            }
            Expr::Mul(factors) => {
                if factors.is_empty() {
                    return write!(f, "1");
                }
                if let Some(abs) = self.split_negative() {
                    return write!(f, "-{}", wrap(&abs, 2));
                }
                let mut numerator = Vec::new();
                let mut denominator = Vec::new();
                for factor in factors {
                    match negative_exponent(factor) {
                        Some((base, e)) if e == 1.0 => denominator.push(base),
                        Some((base, e)) => denominator.push(base.pow(Expr::real(e))),
                        None => numerator.push(factor.clone()),
                    }
                }
                let num = if numerator.is_empty() {
                    "1".to_string()
                } else {
                    fmt_factor_list(&numerator)
                };
                match denominator.len() {
                    0 => write!(f, "{num}"),
                    1 => write!(f, "{num}/{}", wrap(&denominator[0], 3)),
                    _ => write!(f, "{num}/({})", fmt_factor_list(&denominator)),
                }
            }
            Expr::Pow(base, exp) => {
                if exp.as_real() == Some(0.5) {
                    return write!(f, "sqrt({base})");
                }
                if let Some((base, e)) = negative_exponent(self) {
                    return if e == 1.0 {
                        write!(f, "1/{}", wrap(&base, 3))
                    } else {
                        write!(f, "1/{}", wrap(&base.pow(Expr::real(e)), 3))
                    };
                }
                let exp_text = match exp.as_real() {
                    Some(e) if e >= 0.0 => fmt_real(e),
                    _ if matches!(**exp, Expr::Sym(_) | Expr::Call(..)) => exp.to_string(),
                    _ => format!("({exp})"),
                };
                write!(f, "{}^{}", wrap(base, 4), exp_text)
            }
            Expr::Call(func, arg) => write!(f, "{}({arg})", func.name()),
        }
    }
}
