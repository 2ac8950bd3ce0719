use crate::error::{DynamicsError, Result};
use crate::symbolic::{Expr, Func};
use crate::traits::{DynamicalSystem, Scalar};
use std::cell::RefCell;
use std::collections::HashMap;

/// OpCodes for the Stack-based Virtual Machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpCode {
    /// Pushes a constant `f64` value onto the stack.
    LoadConst(f64),
    /// Pushes the value of a state variable (by index) onto the stack.
    /// Indices correspond to the order variables were defined (e.g., 0=x, 1=y).
    LoadVar(usize),
    /// Pushes the value of a parameter (by index) onto the stack.
    LoadParam(usize),
    /// Pops top two values (b, a), pushes (a + b).
    Add,
    /// Pops top two values (b, a), pushes (a - b).
    Sub,
    /// Pops top two values (b, a), pushes (a * b).
    Mul,
    /// Pops top two values (b, a), pushes (a / b).
    Div,
    /// Pops top two values (b, a), pushes (a ^ b).
    Pow,
    /// Pops top value (a), pushes a^n for a fixed integer n.
    PowI(i32),
    /// Pops top value (a), pushes -a.
    Neg,
    Sqrt,
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

/// Represents a compiled sequence of operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bytecode {
    pub ops: Vec<OpCode>,
}

impl Bytecode {
    pub fn new() -> Self {
        Self { ops: Vec::new() }
    }
}

/// Stack-based Virtual Machine for evaluating equations.
///
/// The VM is stateless; `execute` takes all necessary context:
/// - `bytecode`: Instructions to run.
/// - `vars`: Current state vector (read-only).
/// - `params`: Parameter vector (read-only).
/// - `stack`: A mutable buffer for intermediate computations.
///
/// Returns the result of the evaluation (the value left on the stack).
/// Malformed bytecode yields NaN instead of panicking.
pub struct VM;

fn pop<T: Scalar>(stack: &mut Vec<T>) -> T {
    stack.pop().unwrap_or_else(T::nan)
}

impl VM {
    pub fn execute<T: Scalar>(
        bytecode: &Bytecode,
        vars: &[T],
        params: &[T],
        stack: &mut Vec<T>,
    ) -> T {
        stack.clear();

        for op in &bytecode.ops {
            let value = match op {
                OpCode::LoadConst(val) => T::from_f64(*val).unwrap_or_else(T::nan),
                OpCode::LoadVar(idx) => vars.get(*idx).copied().unwrap_or_else(T::nan),
                OpCode::LoadParam(idx) => params.get(*idx).copied().unwrap_or_else(T::nan),
                OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div | OpCode::Pow => {
                    let b = pop(stack);
                    let a = pop(stack);
                    match op {
                        OpCode::Add => a + b,
                        OpCode::Sub => a - b,
                        OpCode::Mul => a * b,
                        OpCode::Div => a / b,
                        _ => a.powf(b),
                    }
                }
                unary => {
                    let a = pop(stack);
                    match unary {
                        OpCode::PowI(n) => a.powi(*n),
                        OpCode::Neg => -a,
                        OpCode::Sqrt => a.sqrt(),
                        OpCode::Sin => a.sin(),
                        OpCode::Cos => a.cos(),
                        OpCode::Tan => a.tan(),
                        OpCode::Exp => a.exp(),
                        OpCode::Ln => a.ln(),
                        OpCode::Sinh => a.sinh(),
                        OpCode::Cosh => a.cosh(),
                        OpCode::Tanh => a.tanh(),
                        OpCode::Asin => a.asin(),
                        OpCode::Acos => a.acos(),
                        OpCode::Atan => a.atan(),
                        _ => T::nan(),
                    }
                }
            };
            stack.push(value);
        }

        pop(stack)
    }
}

/// Compiles a symbolic [`Expr`] into `Bytecode`.
/// Resolves variable and parameter names to indices.
pub struct Compiler {
    pub var_map: HashMap<String, usize>,
    pub param_map: HashMap<String, usize>,
}

impl Compiler {
    pub fn new(var_names: &[String], param_names: &[String]) -> Self {
        let mut var_map = HashMap::new();
        for (i, name) in var_names.iter().enumerate() {
            var_map.insert(name.clone(), i);
        }

        let mut param_map = HashMap::new();
        for (i, name) in param_names.iter().enumerate() {
            param_map.insert(name.clone(), i);
        }

        Self { var_map, param_map }
    }

    pub fn compile(&self, expr: &Expr) -> Result<Bytecode> {
        let mut ops = Vec::new();
        self.compile_recursive(expr, &mut ops)?;
        Ok(Bytecode { ops })
    }

    fn compile_recursive(&self, expr: &Expr, ops: &mut Vec<OpCode>) -> Result<()> {
        match expr {
            Expr::Num(value) => {
                if value.im != 0.0 {
                    return Err(DynamicsError::ComplexCoefficient(expr.to_string()));
                }
                ops.push(OpCode::LoadConst(value.re));
            }
            Expr::Sym(name) => {
                if let Some(&idx) = self.var_map.get(name) {
                    ops.push(OpCode::LoadVar(idx));
                } else if let Some(&idx) = self.param_map.get(name) {
                    ops.push(OpCode::LoadParam(idx));
                } else {
                    return Err(DynamicsError::UnboundSymbol(name.clone()));
                }
            }
            Expr::Add(terms) => {
                let Some((first, rest)) = terms.split_first() else {
                    ops.push(OpCode::LoadConst(0.0));
                    return Ok(());
                };
                self.compile_recursive(first, ops)?;
                for term in rest {
                    match negated(term) {
                        Some(inner) => {
                            self.compile_recursive(&inner, ops)?;
                            ops.push(OpCode::Sub);
                        }
                        None => {
                            self.compile_recursive(term, ops)?;
                            ops.push(OpCode::Add);
                        }
                    }
                }
            }
            Expr::Mul(factors) => {
                if let Some(inner) = negated(expr) {
                    self.compile_recursive(&inner, ops)?;
                    ops.push(OpCode::Neg);
                    return Ok(());
                }
                let mut numerator = Vec::new();
                let mut denominator = Vec::new();
                for factor in factors {
                    match factor {
                        Expr::Pow(base, exp) if exp.as_real() == Some(-1.0) => {
                            denominator.push(&**base)
                        }
                        other => numerator.push(other),
                    }
                }
                match numerator.split_first() {
                    Some((first, rest)) => {
                        self.compile_recursive(first, ops)?;
                        for factor in rest {
                            self.compile_recursive(factor, ops)?;
                            ops.push(OpCode::Mul);
                        }
                    }
                    None => ops.push(OpCode::LoadConst(1.0)),
                }
                for base in denominator {
                    self.compile_recursive(base, ops)?;
                    ops.push(OpCode::Div);
                }
            }
            Expr::Pow(base, exp) => {
                self.compile_recursive(base, ops)?;
                match exp.as_real() {
                    Some(e) if e == 0.5 => ops.push(OpCode::Sqrt),
                    Some(e) if e == e.trunc() && e.abs() <= i32::MAX as f64 => {
                        ops.push(OpCode::PowI(e as i32))
                    }
                    _ => {
                        self.compile_recursive(exp, ops)?;
                        ops.push(OpCode::Pow);
                    }
                }
            }
            Expr::Call(func, arg) => {
                self.compile_recursive(arg, ops)?;
                ops.push(match func {
                    Func::Sin => OpCode::Sin,
                    Func::Cos => OpCode::Cos,
                    Func::Tan => OpCode::Tan,
                    Func::Exp => OpCode::Exp,
                    Func::Ln => OpCode::Ln,
                    Func::Sinh => OpCode::Sinh,
                    Func::Cosh => OpCode::Cosh,
                    Func::Tanh => OpCode::Tanh,
                    Func::Asin => OpCode::Asin,
                    Func::Acos => OpCode::Acos,
                    Func::Atan => OpCode::Atan,
                });
            }
        }
        Ok(())
    }
}

/// `u` when `expr` is `-1 * u`.
fn negated(expr: &Expr) -> Option<Expr> {
    match expr {
        Expr::Mul(factors) if factors.first().and_then(Expr::as_real) == Some(-1.0) => {
            let rest = &factors[1..];
            Some(match rest.len() {
                0 => Expr::one(),
                1 => rest[0].clone(),
                _ => Expr::Mul(rest.to_vec()),
            })
        }
        _ => None,
    }
}

// --- EquationSystem ---

/// A concrete implementation of `DynamicalSystem` that uses the VM.
/// Contains one compiled bytecode expression per state variable.
#[derive(Debug)]
pub struct EquationSystem<T: Scalar> {
    pub equations: Vec<Bytecode>,
    pub params: Vec<T>,
    // Interior mutability for VM stack to avoid allocation in apply.
    // This makes the system !Sync.
    pub stack: RefCell<Vec<T>>,
}

impl<T: Scalar> EquationSystem<T> {
    pub fn new(equations: Vec<Bytecode>, params: Vec<T>) -> Self {
        Self {
            equations,
            params,
            stack: RefCell::new(Vec::with_capacity(64)),
        }
    }
}

impl EquationSystem<f64> {
    /// Compiles `fields` against the given state and parameter names.
    pub fn compile(
        fields: &[Expr],
        var_names: &[String],
        param_names: &[String],
        params: Vec<f64>,
    ) -> Result<Self> {
        if param_names.len() != params.len() {
            return Err(DynamicsError::DimensionMismatch {
                expected: param_names.len(),
                found: params.len(),
            });
        }
        let compiler = Compiler::new(var_names, param_names);
        let equations = fields
            .iter()
            .map(|field| compiler.compile(field))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(equations, params))
    }
}

impl<T: Scalar> DynamicalSystem<T> for EquationSystem<T> {
    fn dimension(&self) -> usize {
        self.equations.len()
    }

    fn apply(&self, _t: T, x: &[T], out: &mut [T]) {
        let mut stack = self.stack.borrow_mut();
        for (i, eq) in self.equations.iter().enumerate() {
            out[i] = VM::execute(eq, x, &self.params, &mut stack);
        }
    }
}
