use thiserror::Error;

use crate::expr::{Expression, Function};
use crate::simplify::simplify;

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum DiffError {
	#[error("cannot differentiate indefinite integral `{0}` with respect to a parameter")]
	IndefiniteIntegral(String),
}

/// Производная по `var`, приведённая к канонической форме.
pub fn derivative(expr: &Expression, var: &str) -> Result<Expression, DiffError> {
	Ok(simplify(&derive(expr, var)?))
}

fn derive(expr: &Expression, var: &str) -> Result<Expression, DiffError> {
	use Expression::*;

	if !expr.depends_on(var) {
		return Ok(Expression::zero());
	}

	Ok(match expr {
		Symbol(_) => Expression::one(),
		Sum(terms) => Sum(terms.iter().map(|term| derive(term, var)).collect::<Result<_, _>>()?),
		Product(factors) => {
			let mut terms = Vec::with_capacity(factors.len());
			for (index, factor) in factors.iter().enumerate() {
				if !factor.depends_on(var) {
					continue;
				}
				let mut product = factors.clone();
				product[index] = derive(factor, var)?;
				terms.push(Product(product));
			}
			Sum(terms)
		},
		Power(base, exponent) => {
			let base = base.as_ref().clone();
			let exponent = exponent.as_ref().clone();
			if !exponent.depends_on(var) {
				// (u^n)' = n u^(n-1) u'
				let lowered = base.clone().pow(exponent.clone() - Expression::one());
				exponent * lowered * derive(&base, var)?
			} else if !base.depends_on(var) {
				// (a^v)' = a^v ln(a) v'
				let ln = Expression::function(self::Function::Ln, base.clone());
				base.pow(exponent.clone()) * ln * derive(&exponent, var)?
			} else {
				// (u^v)' = u^v (v' ln u + v u' / u)
				let ln = Expression::function(self::Function::Ln, base.clone());
				let inner = derive(&exponent, var)? * ln + exponent.clone() * derive(&base, var)? / base.clone();
				base.pow(exponent) * inner
			}
		},
		Function(function, arg) => outer_derivative(*function, arg.as_ref().clone()) * derive(arg, var)?,
		Integral(integral) => {
			match &integral.bounds {
				None => {
					if integral.var == var {
						integral.integrand.clone()
					} else {
						return Err(DiffError::IndefiniteIntegral(expr.to_string()));
					}
				},
				Some((lower, upper)) => {
					// Формула Лейбница: f(b) b' - f(a) a' + ∫ ∂f/∂var
					let at_upper = integral.integrand.substitute(&integral.var, upper);
					let at_lower = integral.integrand.substitute(&integral.var, lower);
					let mut terms = vec![
						at_upper * derive(upper, var)?,
						-(at_lower * derive(lower, var)?),
					];
					if integral.var != var && integral.integrand.depends_on(var) {
						terms.push(Expression::integral(
							derive(&integral.integrand, var)?,
							integral.var.clone(),
							Some((lower.clone(), upper.clone())),
						));
					}
					Sum(terms)
				},
			}
		},
		Number(_) | Constant(_) => Expression::zero(),
	})
}

fn outer_derivative(function: Function, arg: Expression) -> Expression {
	use Function::*;

	let minus_one = Expression::integer(-1);
	let one_minus_square = || Expression::one() - arg.clone().pow(Expression::integer(2));
	match function {
		Sin => Expression::function(Cos, arg),
		Cos => -Expression::function(Sin, arg),
		Tan => Expression::function(Cos, arg).pow(Expression::integer(-2)),
		Cot => -Expression::function(Sin, arg).pow(Expression::integer(-2)),
		Arcsin => one_minus_square().pow(Expression::rational(-1, 2)),
		Arccos => -one_minus_square().pow(Expression::rational(-1, 2)),
		Arctan => (Expression::one() + arg.clone().pow(Expression::integer(2))).pow(minus_one),
		Exp => Expression::function(Exp, arg),
		Ln => arg.pow(minus_one),
		Abs => arg.clone() * Expression::function(Abs, arg).pow(minus_one),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::parsing::parse_expression;

	fn d(text: &str) -> Expression {
		derivative(&parse_expression(text).unwrap(), "x").unwrap()
	}

	fn canonical(text: &str) -> Expression {
		simplify(&parse_expression(text).unwrap())
	}

	#[test]
	fn polynomials() {
		assert_eq!(d("x^3 + 5"), canonical("3x^2"));
		assert_eq!(d("x^2 + C"), canonical("2x"));
	}

	#[test]
	fn elementary_functions() {
		assert_eq!(d("\\sin x"), canonical("\\cos x"));
		assert_eq!(d("\\cos x"), canonical("-\\sin x"));
		assert_eq!(d("e^{2x}"), canonical("2e^{2x}"));
		assert_eq!(d("\\ln x"), canonical("\\frac{1}{x}"));
	}

	#[test]
	fn variable_upper_bound() {
		// d/dx ∫₀ˣ (x - t) t dt = ∫₀ˣ t dt
		let derived = d("\\int_{0}^{x} (x - t) t dt");
		assert_eq!(derived, canonical("\\int_{0}^{x} t dt"));
	}

	#[test]
	fn parameter_in_indefinite_integral() {
		let expr = parse_expression("\\int x t dt").unwrap();
		assert!(derivative(&expr, "x").is_err());
		assert_eq!(derivative(&expr, "t").unwrap(), canonical("x t"));
	}
}
