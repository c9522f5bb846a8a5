use num_rational::BigRational;
use num_traits::{One, Signed, ToPrimitive, Zero};

use crate::expr::Expression;

/// Коэффициенты многочлена, начиная со свободного члена. Нулевой многочлен это пустой вектор.
pub type Polynomial = Vec<BigRational>;

const MAX_DEGREE: u32 = 32;

/// Коэффициенты выражения как многочлена от `var` с рациональными коэффициентами. `None`, если выражение не такой многочлен.
pub fn coefficients(expr: &Expression, var: &str) -> Option<Polynomial> {
	use Expression::*;

	let result = match expr {
		Number(number) => vec![number.clone()],
		Symbol(name) if name == var => vec![BigRational::zero(), BigRational::one()],
		Sum(terms) => terms
			.iter()
			.try_fold(Vec::new(), |acc, term| Some(add(&acc, &coefficients(term, var)?)))?,
		Product(factors) => factors
			.iter()
			.try_fold(vec![BigRational::one()], |acc, factor| Some(multiply(&acc, &coefficients(factor, var)?)))?,
		Power(base, exponent) => {
			let exponent = exponent.as_number()?;
			if !exponent.is_integer() || exponent.is_negative() {
				return None;
			}
			let exponent = exponent.to_integer().to_u32().filter(|n| *n <= MAX_DEGREE)?;
			let base = coefficients(base, var)?;
			(0..exponent).fold(vec![BigRational::one()], |acc, _| multiply(&acc, &base))
		},
		_ => return None,
	};
	Some(trim(result))
}

fn trim(mut polynomial: Polynomial) -> Polynomial {
	while polynomial.last().map_or(false, Zero::is_zero) {
		polynomial.pop();
	}
	polynomial
}

fn add(a: &[BigRational], b: &[BigRational]) -> Polynomial {
	let zero = BigRational::zero();
	(0..a.len().max(b.len()))
		.map(|i| a.get(i).unwrap_or(&zero) + b.get(i).unwrap_or(&zero))
		.collect()
}

fn multiply(a: &[BigRational], b: &[BigRational]) -> Polynomial {
	if a.is_empty() || b.is_empty() {
		return Vec::new();
	}
	let mut result = vec![BigRational::zero(); a.len() + b.len() - 1];
	for (i, x) in a.iter().enumerate() {
		for (j, y) in b.iter().enumerate() {
			result[i + j] += x * y;
		}
	}
	result
}

/// Степень ненулевого многочлена.
pub fn degree(polynomial: &[BigRational]) -> Option<usize> {
	polynomial.len().checked_sub(1)
}

/// Старший коэффициент ненулевого многочлена.
pub fn leading(polynomial: &[BigRational]) -> Option<&BigRational> {
	polynomial.last()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::parsing::parse_expression;

	fn rational(n: i64) -> BigRational {
		BigRational::from_integer(n.into())
	}

	#[test]
	fn expands_products() {
		let expr = parse_expression("(x - 1)(x + 2) + 3").unwrap();
		assert_eq!(coefficients(&expr, "x"), Some(vec![rational(1), rational(1), rational(1)]));
	}

	#[test]
	fn rejects_non_polynomials() {
		assert_eq!(coefficients(&parse_expression("\\frac{1}{x}").unwrap(), "x"), None);
		assert_eq!(coefficients(&parse_expression("a x").unwrap(), "x"), None);
		assert_eq!(coefficients(&parse_expression("x - x").unwrap(), "x"), Some(vec![]));
	}
}
