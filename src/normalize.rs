use tracing::debug;

use crate::error::ParseError;
use crate::expr::Expression;
use crate::integral::resolve_integrals;
use crate::limit::{compute_limit, LimitError, LimitPoint};
use crate::parsing::{parse_expression, substitute_notation, take_group};
use crate::policy::CheckPolicy;
use crate::simplify::simplify;

/// Маркер, отделяющий алгебраические шаги решения от окончательного ответа.
pub const LIMIT_MARKER: &str = "LIMIT";

pub(crate) const ARROWS: [&str; 4] = ["\\rightarrow", "\\to", "->", "→"];

pub fn is_limit_marker(raw: &str) -> bool {
	raw.trim().eq_ignore_ascii_case(LIMIT_MARKER)
}

/// Начинается ли шаг с `\lim`.
pub fn is_limit_notation(raw: &str) -> bool {
	raw.trim_start().starts_with("\\lim")
}

/// Разобранная запись `\lim_{x \to a} f(x)`. Части хранятся в исходном виде.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LimitNotation {
	pub var: String,
	pub point: String,
	pub inner: String,
}

impl LimitNotation {
	pub fn parse(raw: &str) -> Option<LimitNotation> {
		let rest = raw.trim().strip_prefix("\\lim")?.trim_start();
		let rest = rest.strip_prefix('_')?.trim_start();
		let (header, body) = take_group(rest, '{', '}')?;

		let (var, point) = ARROWS
			.iter()
			.filter_map(|arrow| header.find(arrow).map(|position| (position, *arrow)))
			.min_by_key(|(position, _)| *position)
			.map(|(position, arrow)| (&header[..position], &header[position + arrow.len()..]))?;

		let var = var.trim().trim_start_matches('\\').to_string();
		if var.is_empty() || point.trim().is_empty() {
			return None;
		}
		Some(LimitNotation {
			var,
			point: point.trim().to_string(),
			inner: body.trim().to_string(),
		})
	}

	/// Выражение под знаком предела. Если весь остаток строки не разбирается, берётся первая сбалансированная группа скобок.
	pub fn inner_expression(&self, policy: &CheckPolicy) -> Result<Expression, ParseError> {
		let whole = match normalize_with(&self.inner, policy) {
			Ok(expr) => return Ok(expr),
			Err(err) => err,
		};

		let text = substitute_notation(&self.inner);
		let group = text.char_indices().find_map(|(index, c)| {
			let close = match c {
				'(' => ')',
				'[' => ']',
				'{' => '}',
				_ => return None,
			};
			take_group(&text[index..], c, close).map(|(inner, _)| inner)
		});
		match group {
			Some(group) => {
				debug!(inner = %self.inner, group, "falling back to the first group under the limit");
				normalize_with(group, policy).map_err(|_| whole)
			},
			None => Err(whole),
		}
	}

	pub fn evaluate(&self, policy: &CheckPolicy) -> Result<Expression, LimitError> {
		let point = LimitPoint::parse(&self.point, policy)?;
		let inner = self.inner_expression(policy)?;
		compute_limit(&inner, &self.var, &point, policy)
	}
}

/// Каноническая форма шага с политикой по умолчанию.
pub fn normalize(raw: &str) -> Result<Expression, ParseError> {
	normalize_with(raw, &CheckPolicy::default())
}

/// Каноническая форма шага: маркер `LIMIT` даёт ноль, запись `\lim` сразу вычисляется, определённые интегралы заменяются значениями.
pub fn normalize_with(raw: &str, policy: &CheckPolicy) -> Result<Expression, ParseError> {
	if is_limit_marker(raw) {
		return Ok(Expression::zero());
	}

	if is_limit_notation(raw) {
		let notation = LimitNotation::parse(raw).ok_or_else(|| ParseError::new(raw, "malformed limit notation"))?;
		let value = notation.evaluate(policy).map_err(|err| match err {
			LimitError::Parse(err) => err,
			other => ParseError::new(raw, other.to_string()),
		})?;
		debug!(raw, value = %value, "evaluated limit notation");
		return Ok(value);
	}

	let parsed = parse_expression(raw)?;
	let result = simplify(&resolve_integrals(&parsed, policy));
	debug!(raw, normalized = %result, "normalized expression");
	Ok(result)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn marker() {
		assert!(is_limit_marker(" limit "));
		assert!(!is_limit_marker("LIMITS"));
		assert_eq!(normalize("Limit").unwrap(), Expression::zero());
	}

	#[test]
	fn limit_header() {
		let notation = LimitNotation::parse("\\lim_{x \\to \\infty} \\frac{1}{x}").unwrap();
		assert_eq!(notation.var, "x");
		assert_eq!(notation.point, "\\infty");
		assert_eq!(notation.inner, "\\frac{1}{x}");

		let arrow = LimitNotation::parse("\\lim_{t->0}(1+t)").unwrap();
		assert_eq!((arrow.var.as_str(), arrow.point.as_str()), ("t", "0"));

		assert_eq!(LimitNotation::parse("\\lim_{x} x"), None);
	}

	#[test]
	fn inner_group_fallback() {
		let notation = LimitNotation::parse("\\lim_{x \\to 0} (x + 1) \\text{ answer}").unwrap();
		let inner = notation.inner_expression(&CheckPolicy::default()).unwrap();
		assert_eq!(inner, normalize("x + 1").unwrap());
	}
}
