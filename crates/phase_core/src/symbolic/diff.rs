use super::expr::{Expr, Func};
use super::poly::simplify;

/// Partial derivative of `expr` with respect to the symbol `var`, simplified.
pub fn differentiate(expr: &Expr, var: &str) -> Expr {
    simplify(&derive(expr, var))
}

fn derive(expr: &Expr, var: &str) -> Expr {
    if !expr.contains_symbol(var) {
        return Expr::zero();
    }
    match expr {
        Expr::Num(_) => Expr::zero(),
        Expr::Sym(name) => {
            if name == var {
                Expr::one()
            } else {
                Expr::zero()
            }
        }
        Expr::Add(items) => Expr::Add(items.iter().map(|e| derive(e, var)).collect()),
        Expr::Mul(items) => {
            // Product rule: sum over i of (d item_i) * prod_{j != i} item_j.
            let mut terms = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                if !item.contains_symbol(var) {
                    continue;
                }
                let mut factors = Vec::with_capacity(items.len());
                factors.push(derive(item, var));
                factors.extend(
                    items
                        .iter()
                        .enumerate()
                        .filter(|(j, _)| *j != i)
                        .map(|(_, e)| e.clone()),
                );
                terms.push(Expr::Mul(factors));
            }
            Expr::Add(terms)
        }
        Expr::Pow(base, exp) => {
            let base = (**base).clone();
            let exp = (**exp).clone();
            match (base.contains_symbol(var), exp.contains_symbol(var)) {
                // d(u^n) = n*u^(n-1)*u'
                (true, false) => {
                    let lowered = exp.clone() - Expr::one();
                    Expr::Mul(vec![exp, base.clone().pow(lowered), derive(&base, var)])
                }
                // d(a^v) = a^v*ln(a)*v'
                (false, true) => Expr::Mul(vec![
                    base.clone().pow(exp.clone()),
                    Expr::call(Func::Ln, base),
                    derive(&exp, var),
                ]),
                // d(u^v) = u^v*(v'*ln(u) + v*u'/u)
                _ => {
                    let du = derive(&base, var);
                    let dv = derive(&exp, var);
                    let inner = dv * Expr::call(Func::Ln, base.clone())
                        + exp.clone() * du / base.clone();
                    Expr::Mul(vec![base.pow(exp), inner])
                }
            }
        }
        Expr::Call(func, arg) => {
            let u = (**arg).clone();
            let outer = match func {
                Func::Sin => Expr::call(Func::Cos, u.clone()),
                Func::Cos => -Expr::call(Func::Sin, u.clone()),
                Func::Tan => Expr::call(Func::Cos, u.clone()).powi(-2),
                Func::Exp => Expr::call(Func::Exp, u.clone()),
                Func::Ln => u.clone().recip(),
                Func::Sinh => Expr::call(Func::Cosh, u.clone()),
                Func::Cosh => Expr::call(Func::Sinh, u.clone()),
                Func::Tanh => Expr::one() - Expr::call(Func::Tanh, u.clone()).powi(2),
                Func::Asin => (Expr::one() - u.clone().powi(2)).sqrt().recip(),
                Func::Acos => -(Expr::one() - u.clone().powi(2)).sqrt().recip(),
                Func::Atan => (Expr::one() + u.clone().powi(2)).recip(),
            };
            outer * derive(&u, var)
        }
    }
}
