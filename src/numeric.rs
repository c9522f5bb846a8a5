use std::collections::{BTreeMap, BTreeSet};
use std::f64::consts::PI;

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{ToPrimitive, Zero};
use thiserror::Error;

use crate::expr::{Constant, Expression, Function, Integral};
use crate::simplify::simplify;

/// Значения переменных при численном вычислении.
pub type Bindings = BTreeMap<String, f64>;

/// Число отрезков в составной формуле Симпсона.
pub const QUADRATURE_INTERVALS: usize = 1000;

/// Значения, которые получают параметры задачи (всё, кроме основной переменной) при численной проверке.
const AUXILIARY_VALUES: [f64; 5] = [0.731, 1.618, 2.236, 0.577, 1.414];

#[derive(Clone, Debug, Error, PartialEq)]
pub enum EvalError {
	#[error("symbol `{0}` has no value")]
	UnboundSymbol(String),
	#[error("integral `{0}` cannot be evaluated numerically")]
	UnresolvedIntegral(String),
}

pub fn rational_to_f64(number: &BigRational) -> f64 {
	match (number.numer().to_f64(), number.denom().to_f64()) {
		(Some(numer), Some(denom)) => numer / denom,
		_ => f64::NAN,
	}
}

fn constant_value(constant: Constant) -> f64 {
	match constant {
		Constant::E => std::f64::consts::E,
		Constant::Pi => PI,
		Constant::Infinity => f64::INFINITY,
		Constant::NegInfinity => f64::NEG_INFINITY,
	}
}

fn apply_function(function: Function, value: f64) -> f64 {
	use Function::*;

	match function {
		Sin => value.sin(),
		Cos => value.cos(),
		Tan => value.tan(),
		Cot => 1.0 / value.tan(),
		Arcsin => value.asin(),
		Arccos => value.acos(),
		Arctan => value.atan(),
		Exp => value.exp(),
		Ln => value.ln(),
		Abs => value.abs(),
	}
}

/// Вещественная степень. Отрицательное основание допустимо при рациональном показателе с нечётным знаменателем: `(-8)^(1/3) = -2`.
fn real_power(base: f64, exponent: &Expression, value: f64) -> f64 {
	if base < 0.0 {
		if let Expression::Number(number) = exponent {
			let odd = |n: &BigInt| n.to_i64().map_or(false, |n| n % 2 != 0);
			if !number.is_integer() && odd(number.denom()) {
				let magnitude = (-base).powf(value);
				return if odd(number.numer()) { -magnitude } else { magnitude };
			}
		}
	}
	base.powf(value)
}

/// Составная формула Симпсона на `intervals` отрезках (число округляется вверх до чётного).
pub fn simpson<F>(mut f: F, a: f64, b: f64, intervals: usize) -> Result<f64, EvalError>
where
	F: FnMut(f64) -> Result<f64, EvalError>,
{
	let n = intervals.max(2) + intervals % 2;
	let h = (b - a) / n as f64;
	let mut sum = f(a)? + f(b)?;
	for i in 1..n {
		let weight = if i % 2 == 1 { 4.0 } else { 2.0 };
		sum += weight * f(a + h * i as f64)?;
	}
	Ok(sum * h / 3.0)
}

fn evaluate_integral(integral: &Integral, bindings: &Bindings) -> Result<f64, EvalError> {
	let (lower, upper) = integral
		.bounds
		.as_ref()
		.ok_or_else(|| EvalError::UnresolvedIntegral(Expression::Integral(Box::new(integral.clone())).to_string()))?;
	let a = lower.evaluate(bindings)?;
	let b = upper.evaluate(bindings)?;
	if !a.is_finite() || !b.is_finite() {
		return Err(EvalError::UnresolvedIntegral(Expression::Integral(Box::new(integral.clone())).to_string()));
	}

	let mut inner = bindings.clone();
	simpson(
		|t| {
			inner.insert(integral.var.clone(), t);
			integral.integrand.evaluate(&inner)
		},
		a,
		b,
		QUADRATURE_INTERVALS,
	)
}

impl Expression {
	/// Численное значение при заданных значениях переменных. Выход из области определения даёт `NaN` или бесконечность, а не ошибку.
	pub fn evaluate(&self, bindings: &Bindings) -> Result<f64, EvalError> {
		use Expression::*;

		Ok(match self {
			Number(number) => rational_to_f64(number),
			Constant(constant) => constant_value(*constant),
			Symbol(name) => *bindings.get(name).ok_or_else(|| EvalError::UnboundSymbol(name.clone()))?,
			Sum(terms) => terms.iter().map(|term| term.evaluate(bindings)).sum::<Result<f64, _>>()?,
			Product(factors) => factors.iter().map(|factor| factor.evaluate(bindings)).product::<Result<f64, _>>()?,
			Power(base, exponent) => real_power(base.evaluate(bindings)?, exponent, exponent.evaluate(bindings)?),
			Function(function, arg) => apply_function(*function, arg.evaluate(bindings)?),
			Integral(integral) => evaluate_integral(integral, bindings)?,
		})
	}

	/// Значение при `variable = value`; остальные свободные символы получают фиксированные вспомогательные значения.
	pub fn evaluate_at(&self, variable: &str, value: f64) -> Result<f64, EvalError> {
		self.evaluate(&sample_bindings(&self.free_symbols(), variable, value))
	}

	/// Значение выражения, если в нём нет свободных символов.
	pub fn evaluate_closed(&self) -> Option<f64> {
		if self.is_closed() {
			self.evaluate(&Bindings::new()).ok()
		} else {
			None
		}
	}
}

/// Значения для всех символов: `variable` получает `value`, остальные детерминированно получают вспомогательные значения.
pub fn sample_bindings(symbols: &BTreeSet<String>, variable: &str, value: f64) -> Bindings {
	symbols
		.iter()
		.filter(|symbol| symbol.as_str() != variable)
		.enumerate()
		.map(|(index, symbol)| {
			let shift = (index / AUXILIARY_VALUES.len()) as f64;
			(symbol.clone(), AUXILIARY_VALUES[index % AUXILIARY_VALUES.len()] + shift)
		})
		.chain(std::iter::once((variable.to_string(), value)))
		.collect()
}

/// Наилучшее приближение цепными дробями со знаменателем не больше `max_denominator`, попадающее в относительный допуск.
pub fn rational_approximation(value: f64, max_denominator: i64, tolerance: f64) -> Option<BigRational> {
	if !value.is_finite() || value.abs() > 1e15 {
		return None;
	}
	let sign = if value < 0.0 { -1 } else { 1 };
	let target = value.abs();

	let (mut h0, mut h1) = (0i64, 1i64);
	let (mut k0, mut k1) = (1i64, 0i64);
	let mut rest = target;
	for _ in 0..64 {
		let whole = rest.floor();
		if whole > 1e15 {
			return None;
		}
		let whole = whole as i64;
		let h2 = whole.checked_mul(h1)?.checked_add(h0)?;
		let k2 = whole.checked_mul(k1)?.checked_add(k0)?;
		if k2 > max_denominator {
			return None;
		}
		h0 = h1;
		h1 = h2;
		k0 = k1;
		k1 = k2;

		let approximation = h1 as f64 / k1 as f64;
		if (approximation - target).abs() <= tolerance * target.max(1.0) {
			return Some(BigRational::new(BigInt::from(sign * h1), BigInt::from(k1)));
		}

		let fraction = rest - whole as f64;
		if fraction < 1e-15 {
			return None;
		}
		rest = 1.0 / fraction;
	}
	None
}

/// Превращает численный результат в точную константу: целое или рациональное с небольшим знаменателем, `e^(p/q)`, рациональное кратное `π`, корень из рационального. Иначе возвращает ближайшую дробь.
pub fn recognize_constant(value: f64, tolerance: f64) -> Expression {
	if value.is_nan() {
		return Expression::zero();
	}
	if value.is_infinite() {
		return Expression::Constant(if value > 0.0 { Constant::Infinity } else { Constant::NegInfinity });
	}
	if value.abs() <= tolerance {
		return Expression::zero();
	}

	if let Some(number) = rational_approximation(value, 100, tolerance) {
		return Expression::Number(number);
	}
	if value > 0.0 {
		if let Some(exponent) = rational_approximation(value.ln(), 12, tolerance) {
			if !exponent.is_zero() {
				return simplify(&Expression::function(Function::Exp, Expression::Number(exponent)));
			}
		}
	}
	if let Some(multiple) = rational_approximation(value / PI, 12, tolerance) {
		return simplify(&(Expression::Number(multiple) * Expression::Constant(Constant::Pi)));
	}
	if let Some(square) = rational_approximation(value * value, 100, tolerance) {
		let root = Expression::Number(square).sqrt();
		let root = if value < 0.0 { -root } else { root };
		return simplify(&root);
	}

	rational_approximation(value, 1_000_000_000, 1e-12)
		.or_else(|| BigRational::from_float(value))
		.map(Expression::Number)
		.unwrap_or_else(Expression::zero)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::parsing::parse_expression;

	#[test]
	fn evaluates_with_bindings() {
		let expr = parse_expression("x^2 + a").unwrap();
		let mut bindings = Bindings::new();
		bindings.insert("x".to_string(), 3.0);
		assert_eq!(expr.evaluate(&bindings), Err(EvalError::UnboundSymbol("a".to_string())));
		bindings.insert("a".to_string(), 1.0);
		assert_eq!(expr.evaluate(&bindings), Ok(10.0));
	}

	#[test]
	fn odd_roots_of_negative_numbers() {
		let expr = parse_expression("x^{\\frac{1}{3}}").unwrap();
		let value = simplify(&expr).evaluate_at("x", -8.0).unwrap();
		assert!((value + 2.0).abs() < 1e-12);
	}

	#[test]
	fn definite_integral_by_quadrature() {
		let expr = parse_expression("\\int_{0}^{1} x^2 dx").unwrap();
		let value = expr.evaluate_closed().unwrap();
		assert!((value - 1.0 / 3.0).abs() < 1e-9);
	}

	#[test]
	fn recognizes_constants() {
		assert_eq!(recognize_constant(0.4, 1e-9), Expression::rational(2, 5));
		assert_eq!(recognize_constant(std::f64::consts::E, 1e-9), Expression::Constant(Constant::E));
		assert_eq!(recognize_constant(PI / 2.0, 1e-9).to_string(), "π/2");
		assert_eq!(recognize_constant(2f64.sqrt(), 1e-9).to_string(), "sqrt(2)");
		assert_eq!(recognize_constant(1e-12, 1e-9), Expression::zero());
	}

	#[test]
	fn deterministic_bindings() {
		let symbols = ["a", "b", "x"].iter().map(|s| s.to_string()).collect();
		let bindings = sample_bindings(&symbols, "x", 2.0);
		assert_eq!(bindings["x"], 2.0);
		assert_eq!(bindings["a"], AUXILIARY_VALUES[0]);
		assert_eq!(bindings["b"], AUXILIARY_VALUES[1]);
	}
}
