use std::collections::BTreeMap;

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, ToPrimitive, Zero};

use crate::expr::{Constant, Expression, Function, Integral};

/// Предел числа слагаемых при раскрытии скобок. Больше не раскрываем, чтобы патологический ввод не раздувал выражение.
pub const MAX_EXPANSION_TERMS: usize = 64;

/// Наибольший целый показатель, до которого числа и суммы возводятся в степень явно.
const MAX_EXPLICIT_POWER: u32 = 64;

/// Приводит выражение к канонической форме: плоские суммы и произведения, свёрнутые числа, собранные подобные слагаемые и степени с одинаковым основанием, раскрытые скобки в многочленах.
pub fn simplify(expr: &Expression) -> Expression {
	use Expression::*;

	match expr {
		Number(_) | Constant(_) | Symbol(_) => expr.clone(),
		Sum(terms) => simplify_sum(terms.iter().map(simplify).collect()),
		Product(factors) => simplify_product(factors.iter().map(simplify).collect()),
		Power(base, exponent) => simplify_power(simplify(base), simplify(exponent)),
		Function(function, arg) => simplify_function(*function, simplify(arg)),
		Integral(integral) => Expression::integral(
			simplify(&integral.integrand),
			integral.var.clone(),
			integral.bounds.as_ref().map(|(lower, upper)| (simplify(lower), simplify(upper))),
		),
	}
}

/// Разделяет слагаемое на числовой коэффициент и остальное: `3x^2` превращается в `(3, x^2)`.
pub fn split_coefficient(expr: &Expression) -> (BigRational, Expression) {
	match expr {
		Expression::Number(number) => (number.clone(), Expression::one()),
		Expression::Product(factors) => match factors.split_first() {
			Some((Expression::Number(number), rest)) => (number.clone(), product_of(rest.to_vec())),
			_ => (BigRational::one(), expr.clone()),
		},
		_ => (BigRational::one(), expr.clone()),
	}
}

fn with_coefficient(coefficient: BigRational, rest: Expression) -> Expression {
	if coefficient.is_one() {
		return rest;
	}
	match rest {
		Expression::Number(number) => Expression::Number(number * coefficient),
		Expression::Product(mut factors) => {
			factors.insert(0, Expression::Number(coefficient));
			Expression::Product(factors)
		},
		other => Expression::Product(vec![Expression::Number(coefficient), other]),
	}
}

fn product_of(mut factors: Vec<Expression>) -> Expression {
	match factors.len() {
		0 => Expression::one(),
		1 => factors.remove(0),
		_ => Expression::Product(factors),
	}
}

fn sum_of(mut terms: Vec<Expression>) -> Expression {
	match terms.len() {
		0 => Expression::zero(),
		1 => terms.remove(0),
		_ => Expression::Sum(terms),
	}
}

/// Слагаемые уже упрощены.
fn simplify_sum(terms: Vec<Expression>) -> Expression {
	let mut constant = BigRational::zero();
	let mut collected: BTreeMap<Expression, BigRational> = BTreeMap::new();
	let mut positive_infinity = false;
	let mut negative_infinity = false;

	let mut stack = terms;
	while let Some(term) = stack.pop() {
		match term {
			Expression::Sum(inner) => stack.extend(inner),
			Expression::Number(number) => constant += number,
			Expression::Constant(Constant::Infinity) => positive_infinity = true,
			Expression::Constant(Constant::NegInfinity) => negative_infinity = true,
			other => {
				let (coefficient, rest) = split_coefficient(&other);
				*collected.entry(rest).or_insert_with(BigRational::zero) += coefficient;
			},
		}
	}

	match (positive_infinity, negative_infinity) {
		(true, false) => return Expression::Constant(Constant::Infinity),
		(false, true) => return Expression::Constant(Constant::NegInfinity),
		_ => {},
	}

	let mut result = Vec::new();
	if !constant.is_zero() {
		result.push(Expression::Number(constant));
	}
	for (rest, coefficient) in collected {
		if !coefficient.is_zero() {
			result.push(with_coefficient(coefficient, rest));
		}
	}
	if positive_infinity && negative_infinity {
		result.push(Expression::Constant(Constant::Infinity));
		result.push(Expression::Constant(Constant::NegInfinity));
	}
	sum_of(result)
}

fn has_negative_exponent(expr: &Expression) -> bool {
	matches!(expr, Expression::Power(_, exponent) if exponent.is_negative())
}

/// Множители уже упрощены.
fn simplify_product(factors: Vec<Expression>) -> Expression {
	let mut coefficient = BigRational::one();
	let mut powers: BTreeMap<Expression, Vec<Expression>> = BTreeMap::new();
	let mut exponentials = Vec::new();

	let mut stack = factors;
	while let Some(factor) = stack.pop() {
		match factor {
			Expression::Product(inner) => stack.extend(inner),
			Expression::Number(number) => coefficient *= number,
			Expression::Constant(Constant::E) => exponentials.push(Expression::one()),
			Expression::Function(Function::Exp, arg) => exponentials.push(*arg),
			Expression::Power(base, exponent) => powers.entry(*base).or_default().push(*exponent),
			other => powers.entry(other).or_default().push(Expression::one()),
		}
	}

	if coefficient.is_zero() {
		return Expression::zero();
	}

	let mut result = Vec::new();
	for (base, exponents) in powers {
		let exponent = simplify_sum(exponents);
		absorb(simplify_power(base, exponent), &mut coefficient, &mut result);
	}
	if !exponentials.is_empty() {
		let exponent = simplify_sum(exponentials);
		absorb(simplify_function(Function::Exp, exponent), &mut coefficient, &mut result);
	}

	if coefficient.is_zero() {
		return Expression::zero();
	}

	result.sort();

	if let [infinity @ Expression::Constant(Constant::Infinity)] | [infinity @ Expression::Constant(Constant::NegInfinity)] = result.as_slice() {
		let positive = (*infinity == Expression::Constant(Constant::Infinity)) == coefficient.is_positive();
		return Expression::Constant(if positive { Constant::Infinity } else { Constant::NegInfinity });
	}

	let sums = result.iter().filter(|factor| matches!(factor, Expression::Sum(_))).count();
	if sums > 0 && !result.iter().any(has_negative_exponent) {
		let size = result.iter().fold(1usize, |size, factor| match factor {
			Expression::Sum(terms) => size.saturating_mul(terms.len()),
			_ => size,
		});
		if size <= MAX_EXPANSION_TERMS {
			return expand(coefficient, result);
		}
	}

	let mut factors = Vec::with_capacity(result.len() + 1);
	if !coefficient.is_one() {
		factors.push(Expression::Number(coefficient));
	}
	factors.extend(result);
	product_of(factors)
}

/// Результат свёртки степени может оказаться числом или произведением, их множители переносим в общий список.
fn absorb(value: Expression, coefficient: &mut BigRational, result: &mut Vec<Expression>) {
	match value {
		Expression::Number(number) => *coefficient *= number,
		Expression::Product(inner) => {
			for factor in inner {
				match factor {
					Expression::Number(number) => *coefficient *= number,
					other => result.push(other),
				}
			}
		},
		other => result.push(other),
	}
}

/// Раскрывает скобки: каждое слагаемое результата получает по одному слагаемому из каждой суммы.
fn expand(coefficient: BigRational, factors: Vec<Expression>) -> Expression {
	let mut terms = vec![vec![Expression::Number(coefficient)]];
	for factor in factors {
		match factor {
			Expression::Sum(inner) => {
				terms = terms
					.into_iter()
					.flat_map(|term| {
						inner.iter().map(move |summand| {
							let mut term = term.clone();
							term.push(summand.clone());
							term
						})
					})
					.collect();
			},
			other => terms.iter_mut().for_each(|term| term.push(other.clone())),
		}
	}
	simplify_sum(terms.into_iter().map(simplify_product).collect())
}

fn small_integer(number: &BigRational) -> Option<i64> {
	if number.is_integer() {
		number.to_integer().to_i64()
	} else {
		None
	}
}

/// Точный корень степени `degree` из целого, если он существует.
fn exact_root(value: &BigInt, degree: u32) -> Option<BigInt> {
	if value.is_negative() {
		if degree % 2 == 0 {
			return None;
		}
		return exact_root(&-value, degree).map(|root| -root);
	}
	let root = value.nth_root(degree);
	if num_traits::pow(root.clone(), degree as usize) == *value {
		Some(root)
	} else {
		None
	}
}

/// Степень рационального числа, если результат снова рациональный.
fn rational_power(base: &BigRational, exponent: &BigRational) -> Option<BigRational> {
	let numer = exponent.numer().to_i64()?;
	let denom = exponent.denom().to_u32()?;
	if numer.unsigned_abs() > MAX_EXPLICIT_POWER as u64 || denom > 16 {
		return None;
	}
	if base.is_zero() {
		return if numer > 0 { Some(BigRational::zero()) } else { None };
	}

	let root = if denom == 1 {
		base.clone()
	} else {
		let numerator = exact_root(base.numer(), denom)?;
		let denominator = exact_root(base.denom(), denom)?;
		BigRational::new(numerator, denominator)
	};
	let power = num_traits::pow(root, numer.unsigned_abs() as usize);
	Some(if numer < 0 { power.recip() } else { power })
}

/// Основание и показатель уже упрощены.
pub(crate) fn simplify_power(base: Expression, exponent: Expression) -> Expression {
	use Expression::*;

	if exponent.is_zero() || base.is_one() {
		return Expression::one();
	}
	if exponent.is_one() {
		return base;
	}

	match (base, exponent) {
		(Number(base), Number(exponent)) => match rational_power(&base, &exponent) {
			Some(value) => Number(value),
			None => Number(base).pow(Number(exponent)),
		},
		(Constant(self::Constant::E), exponent) => simplify_function(self::Function::Exp, exponent),
		(Constant(self::Constant::Infinity), Number(exponent)) => {
			if exponent.is_positive() {
				Constant(self::Constant::Infinity)
			} else {
				Expression::zero()
			}
		},
		(Function(self::Function::Exp, arg), exponent) => {
			simplify_function(self::Function::Exp, simplify_product(vec![*arg, exponent]))
		},
		(Power(inner, inner_exponent), Number(exponent)) if exponent.is_integer() => {
			let combined = simplify_product(vec![*inner_exponent, Number(exponent)]);
			simplify_power(*inner, combined)
		},
		(Product(factors), Number(exponent)) if exponent.is_integer() => {
			simplify_product(factors.into_iter().map(|factor| simplify_power(factor, Number(exponent.clone()))).collect())
		},
		(Sum(terms), Number(exponent)) => match small_integer(&exponent) {
			Some(n) if n > 1 && (terms.len() as f64).powi(n as i32) <= MAX_EXPANSION_TERMS as f64 => {
				expand(BigRational::one(), vec![Sum(terms); n as usize])
			},
			_ => Sum(terms).pow(Number(exponent)),
		},
		(base, exponent) => base.pow(exponent),
	}
}

fn negated(expr: Expression) -> Expression {
	simplify_product(vec![Expression::integer(-1), expr])
}

/// Аргумент уже упрощён.
pub(crate) fn simplify_function(function: Function, arg: Expression) -> Expression {
	use Function::*;

	let zero = Expression::zero();
	let one = Expression::one();
	let infinity = Expression::Constant(Constant::Infinity);
	let negative_infinity = Expression::Constant(Constant::NegInfinity);
	let pi = Expression::Constant(Constant::Pi);

	match function {
		Exp if arg == zero => return one,
		Exp if arg == one => return Expression::Constant(Constant::E),
		Exp if arg == infinity => return infinity,
		Exp if arg == negative_infinity => return zero,
		Ln if arg == one => return zero,
		Ln if arg == Expression::Constant(Constant::E) => return one,
		Ln if arg == infinity => return infinity,
		Sin | Tan | Arcsin | Arctan if arg == zero => return zero,
		Cos if arg == zero => return one,
		Sin if arg == pi => return zero,
		Cos if arg == pi => return Expression::integer(-1),
		Arctan if arg == infinity => return Expression::Product(vec![Expression::rational(1, 2), pi]),
		Arctan if arg == negative_infinity => return Expression::Product(vec![Expression::rational(-1, 2), pi]),
		Arccos if arg == one => return zero,
		_ => {},
	}

	match (function, arg) {
		(Exp, Expression::Function(Ln, inner)) => *inner,
		(Ln, Expression::Function(Exp, inner)) => *inner,
		(Abs, Expression::Number(number)) => Expression::Number(number.abs()),
		(Abs, constant @ Expression::Constant(Constant::E)) | (Abs, constant @ Expression::Constant(Constant::Pi)) => constant,
		(Abs, Expression::Constant(Constant::NegInfinity)) => infinity,
		(Sin, arg) | (Tan, arg) | (Cot, arg) | (Arcsin, arg) | (Arctan, arg) if arg.is_negative() => {
			negated(simplify_function(function, negated(arg)))
		},
		(Cos, arg) | (Abs, arg) if arg.is_negative() => simplify_function(function, negated(arg)),
		(function, arg) => Expression::function(function, arg),
	}
}

/// Делит выражение на числитель и знаменатель по отрицательным числовым показателям и знаменателю коэффициента.
pub fn numerator_denominator(expr: &Expression) -> (Expression, Expression) {
	let factors = match expr {
		Expression::Product(factors) => factors.clone(),
		other => vec![other.clone()],
	};

	let mut numerator = Vec::new();
	let mut denominator = Vec::new();
	for factor in factors {
		match factor {
			Expression::Number(number) => {
				if !number.numer().is_one() {
					numerator.push(Expression::Number(BigRational::from_integer(number.numer().clone())));
				}
				if !number.denom().is_one() {
					denominator.push(Expression::Number(BigRational::from_integer(number.denom().clone())));
				}
			},
			Expression::Power(base, exponent) if exponent.is_negative() && exponent.as_number().is_some() => {
				denominator.push(simplify_power(*base, negated(*exponent)));
			},
			other => numerator.push(other),
		}
	}

	(simplify_product(numerator), simplify_product(denominator))
}

impl Integral {
	/// Интеграл с упрощёнными подынтегральным выражением и пределами.
	pub fn simplified(&self) -> Integral {
		Integral {
			integrand: simplify(&self.integrand),
			var: self.var.clone(),
			bounds: self.bounds.as_ref().map(|(lower, upper)| (simplify(lower), simplify(upper))),
		}
	}
}
