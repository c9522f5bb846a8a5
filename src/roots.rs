use itertools::Itertools;
use num_rational::BigRational;
use num_traits::{Signed, Zero};
use tracing::debug;

use crate::error::{ErrorKind, ParseError, StepFailure, StepResult};
use crate::expr::Expression;
use crate::limit::limits_equal;
use crate::normalize::normalize_with;
use crate::parsing::take_group;
use crate::policy::CheckPolicy;
use crate::poly::coefficients;
use crate::simplify::simplify;
use crate::task::TaskView;

const EMPTY_SET: [&str; 3] = ["∅", "\\emptyset", "\\varnothing"];
const PLUS_MINUS: [&str; 2] = ["\\pm", "±"];

/// Различные вещественные корни многочлена степени не выше двух (после вынесения степени переменной).
/// `None`, если выражение не такой многочлен или тождественно равно нулю.
pub fn solve_polynomial(expr: &Expression, var: &str) -> Option<Vec<Expression>> {
	let mut polynomial = coefficients(&simplify(expr), var)?;
	if polynomial.is_empty() {
		return None;
	}

	let mut roots = Vec::new();
	let zeros = polynomial.iter().take_while(|c| c.is_zero()).count();
	if zeros > 0 {
		roots.push(Expression::zero());
		polynomial.drain(..zeros);
	}

	let two = BigRational::from_integer(2.into());
	match polynomial.as_slice() {
		[_] => {},
		[c, b] => roots.push(Expression::Number(-c / b)),
		[c, b, a] => {
			let discriminant = b * b - BigRational::from_integer(4.into()) * a * c;
			let denominator = a * &two;
			if discriminant.is_zero() {
				roots.push(Expression::Number(-b / &denominator));
			} else if discriminant.is_positive() {
				let root = Expression::Number(discriminant).sqrt();
				for sign in [1, -1] {
					let numerator = Expression::Number(-b) + Expression::integer(sign) * root.clone();
					roots.push(simplify(&(numerator / Expression::Number(denominator.clone()))));
				}
			}
		},
		_ => return None,
	}
	Some(roots)
}

/// Позиция `\in` как отдельной команды, не `\infty`.
fn membership(text: &str) -> Option<usize> {
	text.match_indices("\\in").map(|(position, _)| position).find(|position| {
		!text[position + 3..].chars().next().map_or(false, char::is_alphabetic)
	})
}

fn strip_set_brackets(raw: &str) -> String {
	let mut text = raw.replace("\\left", "").replace("\\right", "").replace("\\{", "{").replace("\\}", "}");
	if let Some(position) = membership(&text) {
		text = text[position + 3..].to_string();
	}
	loop {
		let trimmed = text.trim();
		let unwrapped = [('{', '}'), ('[', ']'), ('(', ')')].iter().find_map(|(open, close)| {
			take_group(trimmed, *open, *close)
				.filter(|(_, rest)| rest.trim().is_empty())
				.map(|(inner, _)| inner.to_string())
		});
		match unwrapped {
			Some(inner) => text = inner,
			None => return trimmed.to_string(),
		}
	}
}

/// Делит строку по запятым и точкам с запятой вне скобок.
fn split_top_level(text: &str) -> Vec<&str> {
	let mut parts = Vec::new();
	let mut depth = 0i32;
	let mut start = 0;
	for (index, c) in text.char_indices() {
		match c {
			'(' | '[' | '{' => depth += 1,
			')' | ']' | '}' => depth -= 1,
			',' | ';' if depth == 0 => {
				parts.push(&text[start..index]);
				start = index + c.len_utf8();
			},
			_ => {},
		}
	}
	parts.push(&text[start..]);
	parts.into_iter().map(str::trim).filter(|part| !part.is_empty()).collect()
}

fn expand_plus_minus(value: &str) -> Vec<String> {
	match PLUS_MINUS.iter().find(|sign| value.contains(*sign)) {
		Some(sign) => vec![value.replacen(sign, "+", 1), value.replacen(sign, "-", 1)],
		None => vec![value.to_string()],
	}
}

/// Похожа ли запись на множество корней: `x = 2`, `x_1 = 1, x_2 = 3`, `\{1; 3\}`, `∅`, `1 \pm \sqrt{2}`.
pub fn looks_like_solution_set(raw: &str, var: &str, policy: &CheckPolicy) -> bool {
	let text = raw.trim();
	if text.is_empty() {
		return false;
	}
	let marked = EMPTY_SET.iter().chain(PLUS_MINUS.iter()).any(|token| text.contains(token))
		|| text.contains("\\{")
		|| membership(text).is_some()
		|| split_top_level(text).len() > 1;
	if marked {
		return true;
	}
	match text.split_once('=') {
		Some((lhs, rhs)) => {
			let lhs = lhs.trim();
			let named = lhs.strip_prefix(var).map_or(false, |rest| rest.is_empty() || rest.starts_with('_'));
			named && normalize_with(rhs, policy).map_or(false, |value| !value.depends_on(var))
		},
		None => false,
	}
}

/// Разбирает множество корней. Повторяющиеся значения схлопываются.
pub fn parse_solution_set(raw: &str, var: &str, policy: &CheckPolicy) -> Result<Vec<Expression>, ParseError> {
	if EMPTY_SET.iter().any(|token| raw.contains(token)) {
		return Ok(Vec::new());
	}
	let text = strip_set_brackets(raw);

	let mut roots: Vec<Expression> = Vec::new();
	for part in split_top_level(&text) {
		let value = part.rsplit('=').next().unwrap_or(part).trim();
		for candidate in expand_plus_minus(value) {
			let root = normalize_with(&candidate, policy)?;
			if root.depends_on(var) {
				return Err(ParseError::new(raw, format!("root `{}` depends on `{}`", candidate, var)));
			}
			if !roots.iter().any(|known| limits_equal(known, &root, policy)) {
				roots.push(root);
			}
		}
	}
	Ok(roots)
}

/// Совпадают ли множества корней.
pub fn same_roots(a: &[Expression], b: &[Expression], policy: &CheckPolicy) -> bool {
	a.len() == b.len()
		&& a.iter().all(|root| b.iter().any(|other| limits_equal(root, other, policy)))
		&& b.iter().all(|root| a.iter().any(|other| limits_equal(root, other, policy)))
}

fn display_set(roots: &[Expression]) -> String {
	if roots.is_empty() {
		"∅".to_string()
	} else {
		format!("{{{}}}", roots.iter().join(", "))
	}
}

/// Окончательный ответ задачи `algebra`: множество корней сравнивается с ожидаемым. Ожидаемое множество берётся
/// из `expected_value`, если оно там записано, иначе корни `expression` находятся заново.
pub fn check_roots(answer: &str, task: &TaskView, policy: &CheckPolicy) -> StepResult {
	let var = policy.variable.as_str();
	let parse_failure = |err: ParseError| StepFailure::new(ErrorKind::ParseError, format!("Ошибка разбора: {}", err));
	let claimed = parse_solution_set(answer, var, policy).map_err(parse_failure)?;

	let declared = task.expected_value.trim();
	let expected = if looks_like_solution_set(declared, var, policy) {
		parse_solution_set(declared, var, policy)
			.ok()
			.filter(|roots| roots.iter().all(Expression::is_closed))
	} else {
		None
	};
	let equation = normalize_with(&task.expression, policy).map_err(parse_failure)?;
	let expected = expected.or_else(|| solve_polynomial(&equation, var));
	debug!(answer, claimed = %display_set(&claimed), "checking roots");

	match expected {
		Some(expected) if same_roots(&claimed, &expected, policy) => Ok(()),
		Some(expected) => Err(StepFailure::new(
			ErrorKind::AlgebraicError,
			format!("Ожидаемые корни: {}", display_set(&expected)),
		)),
		None => {
			let stray = claimed.iter().find(|root| {
				let value = simplify(&equation.substitute(var, root));
				!value.is_zero()
					&& value
						.evaluate_closed()
						.map_or(true, |value| !value.is_finite() || policy.differs(value, 0.0))
			});
			match stray {
				Some(root) => Err(StepFailure::new(
					ErrorKind::AlgebraicError,
					format!("{} = {} не является корнем уравнения", var, root),
				)),
				None => Ok(()),
			}
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn quadratic_roots() {
		let roots = |text: &str| solve_polynomial(&normalize_with(text, &CheckPolicy::default()).unwrap(), "x");
		let policy = CheckPolicy::default();
		let expected = [Expression::integer(2), Expression::integer(3)];
		assert!(same_roots(&roots("x^2 - 5x + 6").unwrap(), &expected, &policy));
		assert_eq!(roots("x^2 + 1"), Some(vec![]));
		assert_eq!(roots("x^3 - 4x").map(|roots| roots.len()), Some(3));
		assert_eq!(roots("\\sin x"), None);
	}

	#[test]
	fn solution_sets() {
		let policy = CheckPolicy::default();
		let set = |text: &str| parse_solution_set(text, "x", &policy).unwrap();
		assert_eq!(set("x_1 = 2, x_2 = 3"), vec![Expression::integer(2), Expression::integer(3)]);
		assert_eq!(set("\\{2; 3\\}"), vec![Expression::integer(2), Expression::integer(3)]);
		assert!(set("x \\in \\emptyset").is_empty());
		assert_eq!(set("x = 1 \\pm 1").len(), 2);
		assert!(parse_solution_set("x = x + 1", "x", &policy).is_err());
	}

	#[test]
	fn set_detection() {
		let policy = CheckPolicy::default();
		assert!(looks_like_solution_set("x = 2", "x", &policy));
		assert!(looks_like_solution_set("2, 3", "x", &policy));
		assert!(!looks_like_solution_set("0", "x", &policy));
		assert!(!looks_like_solution_set("x^2 = 4", "x", &policy));
		assert!(!looks_like_solution_set("\\infty", "x", &policy));
	}
}
