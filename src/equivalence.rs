use std::fmt;

use tracing::debug;

use crate::error::{ErrorKind, StepFailure, StepResult};
use crate::expr::Expression;
use crate::normalize::{is_limit_marker, is_limit_notation, normalize_with, LimitNotation};
use crate::parsing::is_equation;
use crate::policy::CheckPolicy;
use crate::simplify::simplify;

/// В каком смысле соседние шаги должны совпадать.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Equivalence {
	/// Выражения равны.
	Exact,
	/// Выражения отличаются на слагаемое, не зависящее от переменной. Так сравниваются первообразные.
	UpToConstant,
	/// Выражения отличаются ненулевым постоянным множителем. Так сравниваются уравнения `A = B`.
	Proportional,
}

/// Точка, в которой численные значения шагов разошлись.
#[derive(Clone, Debug, PartialEq)]
pub struct NumericMismatch {
	pub variable: String,
	pub at: f64,
	pub before: f64,
	pub after: f64,
}

impl fmt::Display for NumericMismatch {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "при {}={}: было {:.6}, стало {:.6}", self.variable, self.at, self.before, self.after)
	}
}

/// Проверка перехода между соседними шагами.
pub fn check_step(prev: &str, curr: &str, policy: &CheckPolicy) -> StepResult {
	check_step_with(prev, curr, Equivalence::Exact, policy)
}

/// Проверка перехода в заданном смысле эквивалентности.
///
/// Две записи `\lim` сначала сравниваются по выражениям под знаком предела. Если те совпали, шаг верен. Если нет,
/// шаг всё равно сравнивается по значениям пределов, а расхождение под знаком предела только уточняет подсказку
/// при ошибке: `\lim (x+1)/x` и `\lim (x+2)/x` считаются эквивалентными.
pub fn check_step_with(prev: &str, curr: &str, mode: Equivalence, policy: &CheckPolicy) -> StepResult {
	if is_limit_marker(prev) || is_limit_marker(curr) {
		return Ok(());
	}

	let mut inner_mismatch = None;
	if is_limit_notation(prev) && is_limit_notation(curr) {
		if let (Some(before), Some(after)) = (LimitNotation::parse(prev), LimitNotation::parse(curr)) {
			if let (Ok(a), Ok(b)) = (before.inner_expression(policy), after.inner_expression(policy)) {
				if simplify(&(a.clone() - b.clone())).is_zero() {
					return Ok(());
				}
				let points = &policy.inner_sample_points;
				if let Err(mismatch) = compare_at(&a, &b, &before.var, points, Equivalence::Exact, policy) {
					inner_mismatch = Some(mismatch);
				}
			}
		}
	}

	let parse_failure = |err: crate::error::ParseError| StepFailure::new(ErrorKind::ParseError, format!("Ошибка разбора: {}", err));
	let before = normalize_with(prev, policy).map_err(parse_failure)?;
	let after = normalize_with(curr, policy).map_err(parse_failure)?;

	let mode = if mode == Equivalence::Exact && is_equation(prev) && is_equation(curr) {
		Equivalence::Proportional
	} else {
		mode
	};

	match compare_expressions(&before, &after, mode, policy) {
		Ok(()) => {
			debug!(prev, curr, ?mode, "step is correct");
			Ok(())
		},
		Err(mismatch) => {
			debug!(prev, curr, ?mode, %mismatch, "step is not equivalent");
			let hint = match inner_mismatch {
				Some(inner) => format!("(внутри предела) {}", inner),
				None => mismatch.to_string(),
			};
			Err(StepFailure::new(ErrorKind::AlgebraicError, hint))
		},
	}
}

/// Переменная для численной проверки: основная переменная политики, а если её нет в выражениях, единственный свободный символ.
fn sampling_variable(a: &Expression, b: &Expression, policy: &CheckPolicy) -> String {
	let mut symbols = a.free_symbols();
	symbols.extend(b.free_symbols());
	if !symbols.contains(&policy.variable) && symbols.len() == 1 {
		symbols.into_iter().next().unwrap_or_else(|| policy.variable.clone())
	} else {
		policy.variable.clone()
	}
}

/// Сравнение канонических выражений: сначала символьное, затем по точкам из политики.
pub fn compare_expressions(
	a: &Expression,
	b: &Expression,
	mode: Equivalence,
	policy: &CheckPolicy,
) -> Result<(), NumericMismatch> {
	let var = sampling_variable(a, b, policy);
	compare_at(a, b, &var, &policy.sample_points, mode, policy)
}

fn compare_at(
	a: &Expression,
	b: &Expression,
	var: &str,
	points: &[f64],
	mode: Equivalence,
	policy: &CheckPolicy,
) -> Result<(), NumericMismatch> {
	let a = simplify(a);
	let b = simplify(b);
	if a == b {
		return Ok(());
	}
	let difference = simplify(&(a.clone() - b.clone()));
	if difference.is_zero() {
		return Ok(());
	}
	match mode {
		Equivalence::UpToConstant if !difference.depends_on(var) => return Ok(()),
		Equivalence::Proportional => {
			let ratio = simplify(&(a.clone() / b.clone()));
			if !ratio.depends_on(var) && !ratio.is_zero() && !ratio.is_infinite() {
				return Ok(());
			}
		},
		_ => {},
	}

	let mut offset = None;
	let mut factor = None;
	for &at in points {
		let (before, after) = match (a.evaluate_at(var, at), b.evaluate_at(var, at)) {
			(Ok(before), Ok(after)) => (before, after),
			_ => continue,
		};
		if !policy.is_comparable(before) || !policy.is_comparable(after) {
			continue;
		}

		let consistent = match mode {
			Equivalence::Exact => !policy.differs(before, after),
			Equivalence::UpToConstant => {
				let shift = before - after;
				!policy.differs(shift, *offset.get_or_insert(shift))
			},
			Equivalence::Proportional => {
				let near_zero = |value: f64| !policy.differs(value, 0.0);
				if near_zero(before) || near_zero(after) {
					near_zero(before) && near_zero(after)
				} else {
					let ratio = before / after;
					!policy.differs(ratio, *factor.get_or_insert(ratio))
				}
			},
		};
		if !consistent {
			return Err(NumericMismatch {
				variable: var.to_string(),
				at,
				before,
				after,
			});
		}
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn mismatch_hint() {
		let mismatch = NumericMismatch {
			variable: "x".to_string(),
			at: 2.0,
			before: 1.0,
			after: 1.5,
		};
		assert_eq!(mismatch.to_string(), "при x=2: было 1.000000, стало 1.500000");
	}

	#[test]
	fn sampling_other_variable() {
		let policy = CheckPolicy::default();
		let a = normalize_with("(t+1)^2", &policy).unwrap();
		let b = normalize_with("t^2 + 2t", &policy).unwrap();
		assert_eq!(sampling_variable(&a, &b, &policy), "t");
		assert_eq!(compare_expressions(&a, &b, Equivalence::UpToConstant, &policy), Ok(()));
		assert!(compare_expressions(&a, &b, Equivalence::Exact, &policy).is_err());
	}

	#[test]
	fn limit_pairs_compare_values() {
		let policy = CheckPolicy::default();
		let before = "\\lim_{x \\to \\infty} \\frac{x+1}{x}";
		assert_eq!(check_step(before, "\\lim_{x \\to \\infty} \\frac{x+2}{x}", &policy), Ok(()));

		let failure = check_step(before, "\\lim_{x \\to \\infty} \\frac{2x}{x}", &policy).unwrap_err();
		assert_eq!(failure.kind, ErrorKind::AlgebraicError);
		assert!(failure.hint.starts_with("(внутри предела)"));
	}

	#[test]
	fn proportional_equations() {
		let policy = CheckPolicy::default();
		assert_eq!(check_step("2x = 4", "x = 2", &policy), Ok(()));
		assert_eq!(check_step("x^2 - 1 = 0", "(x - 1)(x + 1) = 0", &policy), Ok(()));
		assert_eq!(check_step("2x = 4", "x = 3", &policy).unwrap_err().kind, ErrorKind::AlgebraicError);
	}
}
