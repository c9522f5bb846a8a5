use std::cell::Cell;
use std::fmt;

use num_bigint::BigInt;
use num_traits::{Signed, Zero};
use thiserror::Error;
use tracing::{debug, warn};

use crate::diff::derivative;
use crate::error::{ErrorKind, ParseError, StepFailure, StepResult};
use crate::expr::{Constant, Expression, Function};
use crate::normalize::normalize_with;
use crate::numeric::recognize_constant;
use crate::policy::CheckPolicy;
use crate::poly::{coefficients, degree, leading};
use crate::simplify::{numerator_denominator, simplify, simplify_function, simplify_power};

const POSITIVE_INFINITY: &[&str] = &[
	"oo", "+oo", "∞", "+∞", "\\infty", "+\\infty", "infty", "+infty", "infinity", "+infinity", "\\infinity",
	"+\\infinity", "inf", "+inf",
];

const NEGATIVE_INFINITY: &[&str] = &["-oo", "-∞", "-\\infty", "-infty", "-infinity", "-\\infinity", "-inf"];

/// Бесконечность, записанная одним из текстовых способов.
fn infinity_token(raw: &str) -> Option<Constant> {
	let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
	if POSITIVE_INFINITY.contains(&compact.as_str()) {
		Some(Constant::Infinity)
	} else if NEGATIVE_INFINITY.contains(&compact.as_str()) {
		Some(Constant::NegInfinity)
	} else {
		None
	}
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum LimitError {
	#[error("limit of `{0}` does not exist")]
	DoesNotExist(String),
	#[error("cannot determine the limit of `{0}`")]
	Undetermined(String),
	#[error("limit point `{0}` is not a number")]
	BadPoint(String),
	#[error(transparent)]
	Parse(#[from] ParseError),
}

/// Точка, к которой стремится переменная. Конечная точка всегда замкнутое выражение.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum LimitPoint {
	PositiveInfinity,
	NegativeInfinity,
	Finite(Expression),
}

impl LimitPoint {
	pub fn parse(raw: &str, policy: &CheckPolicy) -> Result<LimitPoint, LimitError> {
		match infinity_token(raw) {
			Some(Constant::Infinity) => return Ok(LimitPoint::PositiveInfinity),
			Some(_) => return Ok(LimitPoint::NegativeInfinity),
			None => {},
		}

		match normalize_with(raw, policy)? {
			Expression::Constant(Constant::Infinity) => Ok(LimitPoint::PositiveInfinity),
			Expression::Constant(Constant::NegInfinity) => Ok(LimitPoint::NegativeInfinity),
			value if value.evaluate_closed().map_or(false, f64::is_finite) => Ok(LimitPoint::Finite(value)),
			_ => Err(LimitError::BadPoint(raw.to_string())),
		}
	}

	pub fn to_expression(&self) -> Expression {
		match self {
			LimitPoint::PositiveInfinity => Expression::Constant(Constant::Infinity),
			LimitPoint::NegativeInfinity => Expression::Constant(Constant::NegInfinity),
			LimitPoint::Finite(value) => value.clone(),
		}
	}
}

impl fmt::Display for LimitPoint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.to_expression())
	}
}

/// Предел выражения при `var → point`. В конечной точке предел правосторонний.
pub fn compute_limit(
	expr: &Expression,
	var: &str,
	point: &LimitPoint,
	policy: &CheckPolicy,
) -> Result<Expression, LimitError> {
	if let LimitPoint::Finite(value) = point {
		if !value.evaluate_closed().map_or(false, f64::is_finite) {
			return Err(LimitError::BadPoint(value.to_string()));
		}
	}

	let solver = LimitSolver {
		var,
		point,
		policy,
		lhopital: Cell::new(0),
	};
	let expr = simplify(expr);
	match solver.limit(&expr, 0) {
		Some(value) => {
			debug!(expr = %expr, var, point = %point, value = %value, "limit computed symbolically");
			Ok(value)
		},
		None => {
			debug!(expr = %expr, var, point = %point, "symbolic rules failed, extrapolating numerically");
			solver.extrapolate(&expr)
		},
	}
}

struct LimitSolver<'a> {
	var: &'a str,
	point: &'a LimitPoint,
	policy: &'a CheckPolicy,
	/// Текущая вложенность правила Лопиталя.
	lhopital: Cell<usize>,
}

fn infinity(positive: bool) -> Expression {
	Expression::Constant(if positive { Constant::Infinity } else { Constant::NegInfinity })
}

fn exp_of(value: Expression) -> Expression {
	match value {
		Expression::Constant(Constant::Infinity) => infinity(true),
		Expression::Constant(Constant::NegInfinity) => Expression::zero(),
		value => simplify_function(Function::Exp, value),
	}
}

fn product(factors: Vec<Expression>) -> Expression {
	simplify(&Expression::Product(factors))
}

enum Tendency {
	Converges { value: f64, tolerance: f64 },
	Diverges { positive: bool },
	Erratic,
}

/// Поведение последовательности значений, полученных по мере приближения к точке.
fn tendency(values: &[f64]) -> Tendency {
	if values.len() < 3 || values.iter().any(|value| value.is_nan()) {
		return Tendency::Erratic;
	}
	if values.iter().all(|value| value.is_infinite()) {
		let positive = values[0] > 0.0;
		if values.iter().all(|value| (*value > 0.0) == positive) {
			return Tendency::Diverges { positive };
		}
		return Tendency::Erratic;
	}
	if values.iter().any(|value| value.is_infinite()) {
		return Tendency::Erratic;
	}

	let diffs: Vec<f64> = values.windows(2).map(|pair| (pair[1] - pair[0]).abs()).collect();
	let last = values[values.len() - 1];
	let scale = last.abs().max(1.0);
	let tail = &diffs[diffs.len().saturating_sub(3)..];
	let (best, spread) = tail
		.iter()
		.enumerate()
		.fold((0, f64::INFINITY), |best, (index, diff)| if *diff < best.1 { (index, *diff) } else { best });
	let last_diff = diffs[diffs.len() - 1];
	if spread <= 1e-5 * scale && last_diff <= 1e-3 * scale {
		let offset = diffs.len() - tail.len();
		let value = values[offset + best + 1];
		return Tendency::Converges {
			value,
			tolerance: (spread * 10.0 / scale).max(1e-10),
		};
	}

	let positive = values.iter().all(|value| *value > 0.0);
	let negative = values.iter().all(|value| *value < 0.0);
	let magnitudes: Vec<f64> = values.iter().map(|value| value.abs()).collect();
	let growing = magnitudes.windows(2).all(|pair| pair[1] > pair[0]);
	let steps: Vec<f64> = magnitudes.windows(2).map(|pair| pair[1] - pair[0]).collect();
	let not_slowing = steps.windows(2).all(|pair| pair[1] >= 0.9 * pair[0]);
	if (positive || negative) && growing && not_slowing {
		return Tendency::Diverges { positive };
	}
	Tendency::Erratic
}

impl LimitSolver<'_> {
	fn limit(&self, expr: &Expression, depth: usize) -> Option<Expression> {
		if depth > self.policy.max_limit_depth {
			return None;
		}
		if !expr.depends_on(self.var) {
			return Some(expr.clone());
		}
		if let Some(value) = self.substitution(expr) {
			return Some(value);
		}
		if let Some(value) = self.rational(expr) {
			return Some(value);
		}

		let depth = depth + 1;
		match expr {
			Expression::Symbol(_) => Some(self.point.to_expression()),
			Expression::Sum(terms) => self.sum(terms, depth),
			Expression::Product(_) => self.quotient(expr, depth),
			Expression::Power(base, exponent) => self.power(base, exponent, depth),
			Expression::Function(function, arg) => self.function(*function, arg, depth),
			_ => None,
		}
	}

	/// Непрерывность: в конечной точке достаточно подставить значение, если оно определено.
	fn substitution(&self, expr: &Expression) -> Option<Expression> {
		let point = match self.point {
			LimitPoint::Finite(point) => point,
			_ => return None,
		};
		let value = expr.evaluate_at(self.var, point.evaluate_closed()?).ok()?;
		if !value.is_finite() {
			return None;
		}
		let exact = simplify(&expr.substitute(self.var, point));
		if exact.is_infinite() {
			None
		} else {
			Some(exact)
		}
	}

	/// Отношение многочленов на бесконечности определяется старшими членами.
	fn rational(&self, expr: &Expression) -> Option<Expression> {
		let positive_direction = match self.point {
			LimitPoint::PositiveInfinity => true,
			LimitPoint::NegativeInfinity => false,
			LimitPoint::Finite(_) => return None,
		};
		let (numerator, denominator) = numerator_denominator(expr);
		let numerator = coefficients(&numerator, self.var)?;
		let denominator = coefficients(&denominator, self.var)?;
		let denominator_degree = degree(&denominator)?;
		let numerator_degree = match degree(&numerator) {
			Some(degree) => degree,
			None => return Some(Expression::zero()),
		};
		let ratio = leading(&numerator)? / leading(&denominator)?;

		Some(match numerator_degree.cmp(&denominator_degree) {
			std::cmp::Ordering::Less => Expression::zero(),
			std::cmp::Ordering::Equal => Expression::Number(ratio),
			std::cmp::Ordering::Greater => {
				let odd = (numerator_degree - denominator_degree) % 2 == 1;
				let positive = ratio.is_positive() != (odd && !positive_direction);
				infinity(positive)
			},
		})
	}

	fn sum(&self, terms: &[Expression], depth: usize) -> Option<Expression> {
		let mut finite = Vec::with_capacity(terms.len());
		let mut positive = false;
		let mut negative = false;
		for term in terms {
			match self.limit(term, depth)? {
				Expression::Constant(Constant::Infinity) => positive = true,
				Expression::Constant(Constant::NegInfinity) => negative = true,
				value => finite.push(value),
			}
		}
		match (positive, negative) {
			// ∞ - ∞
			(true, true) => None,
			(true, false) => Some(infinity(true)),
			(false, true) => Some(infinity(false)),
			(false, false) => Some(simplify(&Expression::Sum(finite))),
		}
	}

	fn quotient(&self, expr: &Expression, depth: usize) -> Option<Expression> {
		let (numerator, denominator) = numerator_denominator(expr);
		if denominator.is_one() {
			return self.factors(&numerator, depth);
		}

		let top = self.limit(&numerator, depth)?;
		let bottom = self.limit(&denominator, depth)?;
		match (top.is_infinite(), bottom.is_infinite()) {
			(true, true) => self.lhopital(&numerator, &denominator, depth),
			(false, true) => Some(Expression::zero()),
			(true, false) => {
				let sign = self.sign(&top)? * self.nonzero_sign(&bottom, &denominator)?;
				Some(infinity(sign > 0.0))
			},
			(false, false) if bottom.is_zero() => {
				if top.is_zero() {
					self.lhopital(&numerator, &denominator, depth)
				} else {
					let sign = self.sign(&top)? * self.side_sign(&denominator)?;
					Some(infinity(sign > 0.0))
				}
			},
			(false, false) => Some(simplify(&(top / bottom))),
		}
	}

	fn factors(&self, expr: &Expression, depth: usize) -> Option<Expression> {
		let factors = match expr {
			Expression::Product(factors) => factors,
			other => return self.limit(other, depth),
		};

		let mut values = Vec::with_capacity(factors.len());
		for factor in factors {
			values.push(self.limit(factor, depth)?);
		}

		let infinite = values.iter().any(Expression::is_infinite);
		let vanishing = values.iter().any(Expression::is_zero);
		if infinite && vanishing {
			// 0·∞ сводится к частному: сначала f/(1/g), затем g/(1/f)
			let (large, small): (Vec<_>, Vec<_>) = factors
				.iter()
				.zip(&values)
				.partition(|(_, value)| value.is_infinite());
			let large = product(large.into_iter().map(|(factor, _)| factor.clone()).collect());
			let small = product(small.into_iter().map(|(factor, _)| factor.clone()).collect());
			let reciprocal = |expr: &Expression| simplify_power(expr.clone(), Expression::integer(-1));
			return self
				.lhopital(&small, &reciprocal(&large), depth)
				.or_else(|| self.lhopital(&large, &reciprocal(&small), depth));
		}
		if infinite {
			let sign = values.iter().try_fold(1.0, |sign, value| Some(sign * self.sign(value)?))?;
			return Some(infinity(sign > 0.0));
		}
		Some(product(values))
	}

	fn lhopital(&self, numerator: &Expression, denominator: &Expression, depth: usize) -> Option<Expression> {
		let level = self.lhopital.get();
		if level >= self.policy.max_lhopital_depth {
			return None;
		}
		let numerator = derivative(numerator, self.var).ok()?;
		let denominator = derivative(denominator, self.var).ok()?;
		if denominator.is_zero() {
			return None;
		}

		self.lhopital.set(level + 1);
		let result = self.limit(&simplify(&(numerator / denominator)), depth);
		self.lhopital.set(level);
		result
	}

	fn power(&self, base: &Expression, exponent: &Expression, depth: usize) -> Option<Expression> {
		if exponent.depends_on(self.var) {
			// f^g = exp(g ln f)
			let logarithm = simplify(&(exponent.clone() * Expression::function(Function::Ln, base.clone())));
			return self.limit(&logarithm, depth).map(exp_of);
		}

		let value = exponent.evaluate_at(self.var, 0.0).ok().filter(|value| value.is_finite())?;
		let integer = exponent.as_number().filter(|number| number.is_integer());
		let odd = integer.map(|number| !(number.to_integer() % BigInt::from(2)).is_zero());
		match self.limit(base, depth)? {
			Expression::Constant(Constant::Infinity) => Some(if value > 0.0 { infinity(true) } else { Expression::zero() }),
			Expression::Constant(Constant::NegInfinity) => {
				if value < 0.0 {
					Some(Expression::zero())
				} else {
					odd.map(|odd| infinity(!odd))
				}
			},
			limit if limit.is_zero() && value < 0.0 => {
				let positive = match (self.side_sign(base)? > 0.0, odd) {
					(true, _) => true,
					(false, Some(odd)) => !odd,
					(false, None) => return None,
				};
				Some(infinity(positive))
			},
			limit => {
				let result = simplify_power(limit, exponent.clone());
				let numeric = result.evaluate_at(self.var, 0.0).ok()?;
				if numeric.is_finite() {
					Some(result)
				} else {
					None
				}
			},
		}
	}

	fn function(&self, function: Function, arg: &Expression, depth: usize) -> Option<Expression> {
		use Function::*;

		let half_pi = |sign: i64| Expression::Product(vec![Expression::rational(sign, 2), Expression::Constant(Constant::Pi)]);
		match self.limit(arg, depth)? {
			Expression::Constant(Constant::Infinity) => match function {
				Exp | Ln | Abs => Some(infinity(true)),
				Arctan => Some(half_pi(1)),
				_ => None,
			},
			Expression::Constant(Constant::NegInfinity) => match function {
				Exp => Some(Expression::zero()),
				Abs => Some(infinity(true)),
				Arctan => Some(half_pi(-1)),
				_ => None,
			},
			value => {
				if function == Ln && value.is_zero() {
					return Some(infinity(false));
				}
				let result = simplify_function(function, value);
				let numeric = result.evaluate_at(self.var, 0.0).ok()?;
				if numeric.is_finite() {
					Some(result)
				} else {
					None
				}
			},
		}
	}

	/// Знак значения предела. Ноль и неизвестный знак дают `None`.
	fn sign(&self, value: &Expression) -> Option<f64> {
		match value {
			Expression::Constant(Constant::Infinity) => Some(1.0),
			Expression::Constant(Constant::NegInfinity) => Some(-1.0),
			value => value
				.evaluate_at(self.var, 0.0)
				.ok()
				.filter(|value| value.is_finite() && *value != 0.0)
				.map(f64::signum),
		}
	}

	fn nonzero_sign(&self, value: &Expression, expr: &Expression) -> Option<f64> {
		if value.is_zero() {
			self.side_sign(expr)
		} else {
			self.sign(value)
		}
	}

	/// Знак выражения в ближайшей к точке пробной точке.
	fn side_sign(&self, expr: &Expression) -> Option<f64> {
		let probe = *self.probes().last()?;
		expr.evaluate_at(self.var, probe)
			.ok()
			.filter(|value| value.is_finite() && *value != 0.0)
			.map(f64::signum)
	}

	/// Пробные точки по мере приближения к точке предела.
	fn probes(&self) -> Vec<f64> {
		let mut exponents = self.policy.limit_probe_exponents.clone();
		exponents.sort_unstable();
		let point = match self.point {
			LimitPoint::Finite(point) => point.evaluate_closed(),
			_ => None,
		};
		exponents
			.into_iter()
			.filter_map(|k| match self.point {
				LimitPoint::PositiveInfinity => Some(10f64.powi(k)),
				LimitPoint::NegativeInfinity => Some(-(10f64.powi(k))),
				LimitPoint::Finite(_) => point.map(|point| point + 10f64.powi(-k)),
			})
			.collect()
	}

	fn extrapolate(&self, expr: &Expression) -> Result<Expression, LimitError> {
		let whole = expr.to_string();
		if expr.free_symbols().iter().any(|symbol| symbol != self.var) {
			return Err(LimitError::Undetermined(whole));
		}

		let values = self
			.probes()
			.into_iter()
			.map(|probe| expr.evaluate_at(self.var, probe))
			.collect::<Result<Vec<_>, _>>()
			.map_err(|_| LimitError::Undetermined(whole.clone()))?;

		match tendency(&values) {
			Tendency::Converges { value, tolerance } => {
				let recognized = recognize_constant(value, tolerance);
				debug!(expr = %whole, value, recognized = %recognized, "limit extrapolated");
				Ok(recognized)
			},
			Tendency::Diverges { positive } => Ok(infinity(positive)),
			Tendency::Erratic => {
				warn!(expr = %whole, ?values, "limit does not settle");
				Err(LimitError::DoesNotExist(whole))
			},
		}
	}
}

/// Предел выражения, записанного студентом. Ошибки оформлены как отказ шага.
pub fn check_limit(expr: &str, var: &str, point: &LimitPoint, policy: &CheckPolicy) -> StepResult<Expression> {
	let parsed = normalize_with(expr, policy)
		.map_err(|err| StepFailure::new(ErrorKind::LimitParseError, format!("Ошибка разбора выражения: {}", err)))?;
	compute_limit(&parsed, var, point, policy)
		.map_err(|err| StepFailure::new(ErrorKind::LimitError, format!("Ошибка при вычислении предела: {}", err)))
}

/// Вычисляет предел и сравнивает его с ожидаемым значением из задачи.
pub fn check_limit_against(
	expr: &str,
	var: &str,
	point: &LimitPoint,
	expected: &str,
	policy: &CheckPolicy,
) -> StepResult<Expression> {
	let computed = check_limit(expr, var, point, policy)?;
	let expected_value = parse_limit_value(expected, policy)
		.map_err(|err| StepFailure::new(ErrorKind::LimitParseError, format!("Ошибка разбора выражения: {}", err)))?;
	if limits_equal(&computed, &expected_value, policy) {
		Ok(computed)
	} else {
		Err(StepFailure::new(ErrorKind::LimitError, format!("Ожидаемый предел: {}", expected)))
	}
}

/// Значение предела в записи студента. Бесконечность можно записать любым из текстовых способов.
pub fn parse_limit_value(raw: &str, policy: &CheckPolicy) -> Result<Expression, ParseError> {
	match infinity_token(raw) {
		Some(constant) => Ok(Expression::Constant(constant)),
		None => normalize_with(raw, policy),
	}
}

/// Равны ли два значения предела.
pub fn limits_equal(a: &Expression, b: &Expression, policy: &CheckPolicy) -> bool {
	if a.is_infinite() || b.is_infinite() {
		return a == b;
	}
	let a = simplify(a);
	let b = simplify(b);
	if a == b || simplify(&(a.clone() - b.clone())).is_zero() {
		return true;
	}
	match (a.evaluate_closed(), b.evaluate_closed()) {
		(Some(a), Some(b)) if a.is_finite() && b.is_finite() => !policy.differs(a, b),
		_ => false,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn limit_at(text: &str, point: &str) -> Result<Expression, LimitError> {
		let policy = CheckPolicy::default();
		let point = LimitPoint::parse(point, &policy)?;
		compute_limit(&normalize_with(text, &policy)?, "x", &point, &policy)
	}

	#[test]
	fn points() {
		let policy = CheckPolicy::default();
		assert_eq!(LimitPoint::parse(" + \\infty", &policy), Ok(LimitPoint::PositiveInfinity));
		assert_eq!(LimitPoint::parse("-inf", &policy), Ok(LimitPoint::NegativeInfinity));
		assert_eq!(LimitPoint::parse("\\frac{1}{2}", &policy), Ok(LimitPoint::Finite(Expression::rational(1, 2))));
		assert!(matches!(LimitPoint::parse("y", &policy), Err(LimitError::BadPoint(_))));
	}

	#[test]
	fn rational_functions_at_infinity() {
		assert_eq!(limit_at("\\frac{x^3}{1 - x}", "oo"), Ok(infinity(false)));
		assert_eq!(limit_at("\\frac{x^3}{1 - x}", "-oo"), Ok(infinity(false)));
		assert_eq!(limit_at("\\frac{x^2}{x + 1}", "-oo"), Ok(infinity(false)));
		assert_eq!(limit_at("\\frac{3x + 1}{6x}", "oo"), Ok(Expression::rational(1, 2)));
	}

	#[test]
	fn indeterminate_forms() {
		assert_eq!(limit_at("x e^{-x}", "oo"), Ok(Expression::zero()));
		assert_eq!(limit_at("\\frac{x - \\sin x}{x^3}", "0"), Ok(Expression::rational(1, 6)));
		assert_eq!(limit_at("\\frac{1 - \\cos x}{x^2}", "0"), Ok(Expression::rational(1, 2)));
	}

	#[test]
	fn one_sided_at_finite_point() {
		assert_eq!(limit_at("\\frac{1}{x}", "0"), Ok(infinity(true)));
		assert_eq!(limit_at("\\ln x", "0"), Ok(infinity(false)));
	}

	#[test]
	fn tendencies() {
		assert!(matches!(tendency(&[1.0, 1.5, 1.9, 1.99, 1.999999, 1.99999999]), Tendency::Converges { .. }));
		assert!(matches!(tendency(&[1e2, 1e3, 1e4, 1e5]), Tendency::Diverges { positive: true }));
		assert!(matches!(tendency(&[0.5, -0.8, 0.3, 0.9, -0.1]), Tendency::Erratic));
	}
}
