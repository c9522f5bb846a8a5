use std::fmt;

use itertools::Itertools;
use thiserror::Error;
use tracing::debug;

use crate::diff::derivative;
use crate::error::{ErrorKind, ParseError, StepFailure, StepResult};
use crate::expr::{Constant, Expression, Function, Integral};
use crate::limit::{compute_limit, limits_equal, parse_limit_value, LimitPoint};
use crate::normalize::normalize_with;
use crate::numeric::{recognize_constant, simpson, QUADRATURE_INTERVALS};
use crate::parsing::{parse_expression, substitute_notation};
use crate::policy::CheckPolicy;
use crate::simplify::simplify;
use crate::task::TaskView;

/// Имя, под которым неизвестная функция уравнения Вольтерры попадает в выражение.
pub const UNKNOWN_FUNCTION: &str = "Phi";

#[derive(Clone, Debug, Error, PartialEq)]
pub enum IntegralError {
	#[error(transparent)]
	Parse(#[from] ParseError),
	#[error("unsupported integral task `{0}`")]
	UnsupportedTask(String),
	#[error("unsupported integral equation `{0}`")]
	UnsupportedEquation(String),
}

/// Первообразная, если её даёт один из табличных приёмов. Константа интегрирования не добавляется.
pub fn antiderivative(expr: &Expression, var: &str) -> Option<Expression> {
	integrate(&simplify(expr), var).map(|result| simplify(&result))
}

/// Коэффициент при переменной, если выражение линейно по ней.
fn slope(expr: &Expression, var: &str) -> Option<Expression> {
	let slope = derivative(expr, var).ok()?;
	if slope.is_zero() || slope.depends_on(var) {
		None
	} else {
		Some(slope)
	}
}

fn integrate(expr: &Expression, var: &str) -> Option<Expression> {
	use Expression::*;

	let x = Expression::symbol(var);
	if !expr.depends_on(var) {
		return Some(expr.clone() * x);
	}

	match expr {
		Symbol(_) => Some(x.pow(Expression::integer(2)) / Expression::integer(2)),
		Sum(terms) => terms
			.iter()
			.map(|term| integrate(term, var))
			.collect::<Option<Vec<_>>>()
			.map(Sum),
		Product(factors) => {
			let (varying, constant): (Vec<_>, Vec<_>) = factors.iter().cloned().partition(|factor| factor.depends_on(var));
			match varying.as_slice() {
				[single] => Some(Product(constant) * integrate(single, var)?),
				_ => None,
			}
		},
		Power(base, exponent) if !exponent.depends_on(var) => {
			let a = slope(base, var)?;
			if **exponent == Expression::integer(-1) {
				Some(Expression::function(self::Function::Ln, base.as_ref().clone()) / a)
			} else {
				let raised = exponent.as_ref().clone() + Expression::one();
				Some(base.as_ref().clone().pow(raised.clone()) / (raised * a))
			}
		},
		Power(base, exponent) if !base.depends_on(var) => {
			let a = slope(exponent, var)?;
			Some(expr.clone() / (a * Expression::function(self::Function::Ln, base.as_ref().clone())))
		},
		Function(function, arg) => {
			let a = slope(arg, var)?;
			let arg = arg.as_ref().clone();
			let primitive = match function {
				self::Function::Exp => Expression::function(self::Function::Exp, arg),
				self::Function::Sin => -Expression::function(self::Function::Cos, arg),
				self::Function::Cos => Expression::function(self::Function::Sin, arg),
				self::Function::Ln => arg.clone() * Expression::function(self::Function::Ln, arg.clone()) - arg,
				_ => return None,
			};
			Some(primitive / a)
		},
		_ => None,
	}
}

/// Значение первообразной на границе. Бесконечная граница даёт предел.
fn at_bound(primitive: &Expression, var: &str, bound: &Expression, policy: &CheckPolicy) -> Option<Expression> {
	match bound {
		Expression::Constant(Constant::Infinity) => {
			compute_limit(primitive, var, &LimitPoint::PositiveInfinity, policy).ok()
		},
		Expression::Constant(Constant::NegInfinity) => {
			compute_limit(primitive, var, &LimitPoint::NegativeInfinity, policy).ok()
		},
		bound => Some(simplify(&primitive.substitute(var, bound))),
	}
}

/// Определённый интеграл по формуле Ньютона-Лейбница, иначе по формуле Симпсона с распознаванием константы.
pub fn definite(
	integrand: &Expression,
	var: &str,
	lower: &Expression,
	upper: &Expression,
	policy: &CheckPolicy,
) -> Option<Expression> {
	if let Some(primitive) = antiderivative(integrand, var) {
		let value = at_bound(&primitive, var, upper, policy)
			.zip(at_bound(&primitive, var, lower, policy))
			.map(|(upper, lower)| simplify(&(upper - lower)));
		let defined = |value: &Expression| match value {
			Expression::Sum(terms) => !terms.iter().any(Expression::is_infinite),
			value => value.evaluate_closed().map_or(!value.is_closed(), |number| !number.is_nan()),
		};
		if let Some(value) = value.filter(defined) {
			return Some(value);
		}
	}

	if integrand.free_symbols().iter().any(|symbol| symbol != var) {
		return None;
	}
	let a = lower.evaluate_closed().filter(|a| a.is_finite())?;
	let b = upper.evaluate_closed().filter(|b| b.is_finite())?;
	let value = simpson(|t| integrand.evaluate_at(var, t), a, b, QUADRATURE_INTERVALS).ok()?;
	if !value.is_finite() {
		return None;
	}
	debug!(integrand = %integrand, a, b, value, "integral evaluated by quadrature");
	Some(recognize_constant(value, 1e-8))
}

/// Значение определённого интеграла или первообразная неопределённого.
pub fn evaluate(integral: &Integral, policy: &CheckPolicy) -> Option<Expression> {
	match &integral.bounds {
		Some((lower, upper)) => definite(&integral.integrand, &integral.var, lower, upper, policy),
		None => antiderivative(&integral.integrand, &integral.var),
	}
}

/// Заменяет интегралы их значениями снизу вверх. Интегралы, которые не удалось вычислить, остаются в выражении.
pub fn resolve_integrals(expr: &Expression, policy: &CheckPolicy) -> Expression {
	use Expression::*;

	let resolve = |expr: &Expression| resolve_integrals(expr, policy);
	match expr {
		Number(_) | Constant(_) | Symbol(_) => expr.clone(),
		Sum(terms) => Sum(terms.iter().map(resolve).collect()),
		Product(factors) => Product(factors.iter().map(resolve).collect()),
		Power(base, exponent) => resolve(base.as_ref()).pow(resolve(exponent.as_ref())),
		Function(function, arg) => Expression::function(*function, resolve(arg.as_ref())),
		Integral(integral) => {
			let inner = self::Integral {
				integrand: resolve(&integral.integrand),
				var: integral.var.clone(),
				bounds: integral.bounds.as_ref().map(|(lower, upper)| (resolve(lower), resolve(upper))),
			}
			.simplified();
			match evaluate(&inner, policy) {
				Some(value) => value,
				None => {
					debug!(integral = %Expression::Integral(Box::new(inner.clone())), "integral left unresolved");
					Expression::Integral(Box::new(inner))
				},
			}
		},
	}
}

fn parse_failure(err: impl fmt::Display) -> StepFailure {
	StepFailure::new(ErrorKind::ParseError, format!("Ошибка: {}", err))
}

/// Проверка первообразной: производная ответа должна совпасть с подынтегральной функцией.
/// Слагаемое `+ C` при дифференцировании пропадает.
pub fn check_integral_final(answer: &str, integrand: &str, var: &str, policy: &CheckPolicy) -> StepResult {
	let answer = normalize_with(answer, policy).map_err(parse_failure)?;
	let integrand = normalize_with(integrand, policy).map_err(parse_failure)?;
	check_antiderivative(&answer, &integrand, var, policy)
}

pub fn check_antiderivative(answer: &Expression, integrand: &Expression, var: &str, policy: &CheckPolicy) -> StepResult {
	let derived = derivative(answer, var).map_err(|err| StepFailure::new(ErrorKind::IntegralError, err.to_string()))?;
	let residual = simplify(&(derived.clone() - integrand.clone()));
	if residual.is_zero() {
		return Ok(());
	}

	let values: Vec<f64> = policy
		.sample_points
		.iter()
		.filter_map(|point| residual.evaluate_at(var, *point).ok())
		.filter(|value| policy.is_comparable(*value))
		.collect();
	if !values.is_empty() && values.iter().all(|value| !policy.differs(*value, 0.0)) {
		return Ok(());
	}

	Err(StepFailure::new(
		ErrorKind::IntegralError,
		format!("Производная вашего ответа равна {}, а подынтегральная функция равна {}", derived, integrand),
	))
}

/// Окончательный ответ задачи на определённый интеграл сравнивается с ожидаемым числом.
pub fn check_definite_value(answer: &str, expected: &str, policy: &CheckPolicy) -> StepResult {
	let answer = parse_limit_value(answer, policy).map_err(parse_failure)?;
	let expected_value = parse_limit_value(expected, policy).map_err(parse_failure)?;
	if limits_equal(&answer, &expected_value, policy) {
		Ok(())
	} else {
		Err(StepFailure::new(ErrorKind::IntegralError, format!("Ожидается: {}", expected)))
	}
}

/// Что должно получиться в конце решения интегральной задачи.
#[derive(Clone, Debug, PartialEq)]
pub enum IntegralTarget {
	/// Число, равное определённому интегралу.
	Value(Expression),
	/// Любая первообразная подынтегральной функции.
	Antiderivative { integrand: Expression, var: String },
}

impl IntegralTarget {
	pub fn from_task(task: &TaskView, policy: &CheckPolicy) -> Result<IntegralTarget, IntegralError> {
		let expected = task.expected_value.trim();
		match parse_expression(&task.expression)? {
			Expression::Integral(integral) => match &integral.bounds {
				Some((lower, upper)) => {
					if !expected.is_empty() {
						if let Ok(value) = parse_limit_value(expected, policy) {
							return Ok(IntegralTarget::Value(value));
						}
					}
					let integral = integral.simplified();
					definite(&integral.integrand, &integral.var, &simplify(lower), &simplify(upper), policy)
						.map(IntegralTarget::Value)
						.ok_or_else(|| IntegralError::UnsupportedTask(task.expression.clone()))
				},
				None => Ok(IntegralTarget::Antiderivative {
					integrand: simplify(&integral.integrand),
					var: integral.var.clone(),
				}),
			},
			integrand => Ok(IntegralTarget::Antiderivative {
				integrand: simplify(&integrand),
				var: policy.variable.clone(),
			}),
		}
	}

	pub fn check(&self, answer: &str, policy: &CheckPolicy) -> StepResult {
		match self {
			IntegralTarget::Value(value) => {
				let answer = parse_limit_value(answer, policy).map_err(parse_failure)?;
				if limits_equal(&answer, value, policy) {
					Ok(())
				} else {
					Err(StepFailure::new(ErrorKind::IntegralError, format!("Ожидается: {}", value)))
				}
			},
			IntegralTarget::Antiderivative { integrand, var } => {
				let answer = normalize_with(answer, policy).map_err(parse_failure)?;
				check_antiderivative(&answer, integrand, var, policy)
			},
		}
	}
}

/// Заменяет запись неизвестной функции `\varphi(t)` (а также `\phi`, `φ` от `t`, `s`, `x`, `y`, `u`) на символ `\Phi`.
pub fn mark_unknown_function(raw: &str) -> String {
	const NAMES: [&str; 5] = ["\\varphi", "varphi", "\\phi", "phi", "φ"];
	const ARGUMENTS: [&str; 5] = ["t", "s", "x", "y", "u"];

	let mut text = substitute_notation(raw);
	for name in NAMES.iter() {
		text = text.replace(&format!("{} (", name), &format!("{}(", name));
		for arg in ARGUMENTS.iter() {
			text = text.replace(&format!("{}({})", name, arg), "\\Phi ");
		}
	}
	text
}

/// Упоминается ли в шаге неизвестная функция, в том числе без аргумента (`\varphi''`).
pub fn mentions_unknown_function(raw: &str) -> bool {
	raw.contains("phi") || raw.contains("Phi") || raw.contains('φ')
}

/// Убирает левую часть `φ(x) =`, если она есть.
fn right_hand_side(raw: &str) -> String {
	let marked = mark_unknown_function(raw);
	let trimmed = marked.trim();
	match trimmed.strip_prefix("\\Phi").map(str::trim_start) {
		Some(rest) if rest.starts_with('=') => rest[1..].trim().to_string(),
		_ => trimmed.to_string(),
	}
}

/// Данные уравнения Вольтерры второго рода `φ(x) = f(x) + c ∫₀ˣ (αx + βt) φ(t) dt`, нужные для проверки ответа.
#[derive(Clone, Debug, PartialEq)]
pub struct VolterraConditions {
	/// φ(0) = f(0).
	pub initial_value: Expression,
	/// φ'(0) = f'(0).
	pub initial_derivative: Expression,
	/// Множитель `c` перед интегралом.
	pub coefficient: Expression,
	/// `α` в ядре.
	pub kernel_x: Expression,
	/// `β` в ядре.
	pub kernel_t: Expression,
	/// f''(x).
	pub free_term_second_derivative: Expression,
}

impl Default for VolterraConditions {
	/// Уравнение `φ(x) = x - ∫₀ˣ (x - t) φ(t) dt`, его решение `sin x`.
	fn default() -> Self {
		VolterraConditions {
			initial_value: Expression::zero(),
			initial_derivative: Expression::one(),
			coefficient: Expression::integer(-1),
			kernel_x: Expression::one(),
			kernel_t: Expression::integer(-1),
			free_term_second_derivative: Expression::zero(),
		}
	}
}

impl VolterraConditions {
	pub fn from_task(expression: &str, var: &str) -> Result<VolterraConditions, IntegralError> {
		let unsupported = || IntegralError::UnsupportedEquation(expression.to_string());
		let parsed = simplify(&parse_expression(&right_hand_side(expression))?);

		let terms = match parsed {
			Expression::Sum(terms) => terms,
			other => vec![other],
		};
		let (with_integral, free): (Vec<_>, Vec<_>) = terms.into_iter().partition(Expression::contains_integral);
		let term = match with_integral.as_slice() {
			[term] => term.clone(),
			_ => return Err(unsupported()),
		};
		let factors = match term {
			Expression::Product(factors) => factors,
			other => vec![other],
		};
		let (integrals, rest): (Vec<_>, Vec<_>) =
			factors.into_iter().partition(|factor| matches!(factor, Expression::Integral(_)));
		let integral = match integrals.as_slice() {
			[Expression::Integral(integral)] => integral.as_ref().clone(),
			_ => return Err(unsupported()),
		};
		let coefficient = simplify(&Expression::Product(rest));
		if coefficient.depends_on(var) || coefficient.depends_on(UNKNOWN_FUNCTION) {
			return Err(unsupported());
		}

		match &integral.bounds {
			Some((lower, upper)) if lower.is_zero() && *upper == Expression::symbol(var) => {},
			_ => return Err(unsupported()),
		}

		let t = integral.var.as_str();
		let kernel = derivative(&integral.integrand, UNKNOWN_FUNCTION).map_err(|_| unsupported())?;
		let phi = Expression::symbol(UNKNOWN_FUNCTION);
		let linear = simplify(&(integral.integrand.clone() - kernel.clone() * phi)).is_zero();
		if !linear || kernel.depends_on(UNKNOWN_FUNCTION) {
			return Err(unsupported());
		}
		let kernel_x = derivative(&kernel, var).map_err(|_| unsupported())?;
		let kernel_t = derivative(&kernel, t).map_err(|_| unsupported())?;
		let homogeneous = simplify(&(kernel.clone() - kernel_x.clone() * Expression::symbol(var) - kernel_t.clone() * Expression::symbol(t)));
		if [&kernel_x, &kernel_t].iter().any(|k| k.depends_on(var) || k.depends_on(t)) || !homogeneous.is_zero() {
			return Err(unsupported());
		}

		let free_term = simplify(&Expression::Sum(free));
		let first = derivative(&free_term, var).map_err(|_| unsupported())?;
		let second = derivative(&first, var).map_err(|_| unsupported())?;
		let zero = Expression::zero();
		Ok(VolterraConditions {
			initial_value: simplify(&free_term.substitute(var, &zero)),
			initial_derivative: simplify(&first.substitute(var, &zero)),
			coefficient,
			kernel_x,
			kernel_t,
			free_term_second_derivative: second,
		})
	}

	/// Невязка `φ'' - c((2α+β)φ + (α+β)xφ') - f''`, которая обращается в ноль на решении.
	fn residual(&self, phi: &Expression, first: &Expression, second: &Expression, var: &str) -> Expression {
		let two = Expression::integer(2);
		let own = two * self.kernel_x.clone() + self.kernel_t.clone();
		let mixed = self.kernel_x.clone() + self.kernel_t.clone();
		let integral_part = own * phi.clone() + mixed * Expression::symbol(var) * first.clone();
		simplify(&(second.clone() - self.coefficient.clone() * integral_part - self.free_term_second_derivative.clone()))
	}
}

/// Нарушенное условие уравнения Вольтерры.
#[derive(Clone, Debug, PartialEq)]
pub enum VolterraViolation {
	InitialValue { expected: Expression, actual: Expression },
	InitialDerivative { expected: Expression, actual: Expression },
	Residual { at: f64, value: f64 },
	NotDifferentiable(String),
}

impl fmt::Display for VolterraViolation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		use VolterraViolation::*;

		match self {
			InitialValue { expected, actual } => write!(f, "φ(0) = {}, а должно быть {}", actual, expected),
			InitialDerivative { expected, actual } => write!(f, "φ'(0) = {}, а должно быть {}", actual, expected),
			Residual { at, value } => write!(f, "дифференциальное соотношение нарушено при x={}: невязка {:.6}", at, value),
			NotDifferentiable(message) => write!(f, "не удалось продифференцировать ответ: {}", message),
		}
	}
}

fn same_value(a: &Expression, b: &Expression, var: &str, policy: &CheckPolicy) -> bool {
	if simplify(&(a.clone() - b.clone())).is_zero() {
		return true;
	}
	match (a.evaluate_at(var, 0.0), b.evaluate_at(var, 0.0)) {
		(Ok(a), Ok(b)) if a.is_finite() && b.is_finite() => !policy.differs(a, b),
		_ => false,
	}
}

/// Проверяет φ(0), φ'(0) и дифференциальное соотношение. Возвращает все нарушенные условия по порядку.
pub fn check_volterra(
	phi: &Expression,
	conditions: &VolterraConditions,
	var: &str,
	policy: &CheckPolicy,
) -> Result<(), Vec<VolterraViolation>> {
	let zero = Expression::zero();
	let mut violations = Vec::new();

	let initial = simplify(&phi.substitute(var, &zero));
	if !same_value(&initial, &conditions.initial_value, var, policy) {
		violations.push(VolterraViolation::InitialValue {
			expected: conditions.initial_value.clone(),
			actual: initial,
		});
	}

	let (first, second) = match derivative(phi, var).and_then(|first| Ok((derivative(&first, var)?, first))) {
		Ok((second, first)) => (first, second),
		Err(err) => {
			violations.push(VolterraViolation::NotDifferentiable(err.to_string()));
			return Err(violations);
		},
	};

	let slope = simplify(&first.substitute(var, &zero));
	if !same_value(&slope, &conditions.initial_derivative, var, policy) {
		violations.push(VolterraViolation::InitialDerivative {
			expected: conditions.initial_derivative.clone(),
			actual: slope,
		});
	}

	let residual = conditions.residual(phi, &first, &second, var);
	if !residual.is_zero() {
		let failed = policy.volterra_sample_points.iter().find_map(|at| {
			let value = residual.evaluate_at(var, *at).ok()?;
			let comparable = policy.is_comparable(value) && policy.differs(value, 0.0);
			if comparable {
				Some(VolterraViolation::Residual { at: *at, value })
			} else {
				None
			}
		});
		violations.extend(failed);
	}

	if violations.is_empty() {
		Ok(())
	} else {
		Err(violations)
	}
}

/// Окончательный ответ задачи `integral_volterra_2`. В подсказке перечислены все нарушенные условия.
pub fn check_volterra_final(answer: &str, conditions: &VolterraConditions, policy: &CheckPolicy) -> StepResult {
	let phi = normalize_with(&right_hand_side(answer), policy).map_err(parse_failure)?;
	check_volterra(&phi, conditions, &policy.variable, policy)
		.map_err(|violations| StepFailure::new(ErrorKind::IntegralError, violations.iter().join("; ")))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn canonical(text: &str) -> Expression {
		simplify(&parse_expression(text).unwrap())
	}

	#[test]
	fn table_integrals() {
		let x = |text: &str| antiderivative(&canonical(text), "x").unwrap();
		assert_eq!(x("3x^2"), canonical("x^3"));
		assert_eq!(x("\\frac{1}{x}"), canonical("\\ln x"));
		assert_eq!(x("e^{2x}"), canonical("\\frac{e^{2x}}{2}"));
		assert_eq!(x("\\cos(3x)"), canonical("\\frac{\\sin(3x)}{3}"));
		assert_eq!(antiderivative(&canonical("x e^{x}"), "x"), None);
	}

	#[test]
	fn definite_integrals() {
		let policy = CheckPolicy::default();
		let value = |text: &str| normalize_with(text, &policy).unwrap();
		assert_eq!(value("\\int_{0}^{1} x^2 dx"), Expression::rational(1, 3));
		assert_eq!(value("\\int_{0}^{\\infty} e^{-x} dx"), Expression::one());
		assert_eq!(value("integrate(x*e^{x}, (x, 0, 1))"), Expression::one());
	}

	#[test]
	fn unknown_function() {
		assert_eq!(mark_unknown_function("(x-t)*varphi(t)"), "(x-t)*\\Phi ");
		assert_eq!(right_hand_side("\\varphi(x) = 2x"), "2x");
	}

	#[test]
	fn volterra_task_data() {
		let conditions = VolterraConditions::from_task("x - integrate((x-t)*varphi(t), (t,0,x))", "x").unwrap();
		assert_eq!(conditions, VolterraConditions::default());

		let plus = VolterraConditions::from_task("\\varphi(x) = 3x + \\int_{0}^{x} (x+t)\\varphi(t) dt", "x").unwrap();
		assert_eq!(plus.initial_derivative, Expression::integer(3));
		assert_eq!(plus.coefficient, Expression::one());
		assert_eq!(plus.kernel_t, Expression::one());
	}
}
