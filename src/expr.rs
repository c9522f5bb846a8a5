use std::collections::BTreeSet;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};
use serde::{Serialize, Serializer};

/// Именованная математическая константа.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Constant {
	/// Основание натурального логарифма. В выражении выглядит как: `e`, `E`.
	E,
	/// В выражении выглядит как: `\pi`, `pi`, `π`.
	Pi,
	/// Бесконечность появляется только как значение предела или как граница интеграла. В выражении выглядит как: `\infty`, `oo`, `∞`.
	Infinity,
	NegInfinity,
}

/// Элементарная функция одного аргумента.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Function {
	Sin,
	Cos,
	Tan,
	Cot,
	Arcsin,
	Arccos,
	Arctan,
	Exp,
	/// Натуральный логарифм, в выражении пишется и как `\ln`, и как `\log`.
	Ln,
	Abs,
}

impl Function {
	/// Имя, под которым функция печатается.
	pub fn name(self) -> &'static str {
		use Function::*;

		match self {
			Sin => "sin",
			Cos => "cos",
			Tan => "tan",
			Cot => "cot",
			Arcsin => "arcsin",
			Arccos => "arccos",
			Arctan => "arctan",
			Exp => "exp",
			Ln => "ln",
			Abs => "abs",
		}
	}

	/// Распознаёт функцию по любому из поддерживаемых написаний, включая русские `tg`, `ctg`, `arctg`.
	pub fn from_name(name: &str) -> Option<Function> {
		use Function::*;

		Some(match name {
			"sin" => Sin,
			"cos" => Cos,
			"tan" | "tg" => Tan,
			"cot" | "ctg" => Cot,
			"arcsin" | "asin" => Arcsin,
			"arccos" | "acos" => Arccos,
			"arctan" | "arctg" | "atan" => Arctan,
			"exp" => Exp,
			"ln" | "log" => Ln,
			"abs" => Abs,
			_ => return None,
		})
	}
}

/// Каноническое символьное выражение. Сумма и произведение хранятся плоскими списками, вычитание это сумма с множителем `-1`, деление это умножение на степень `-1`. Числа всегда точные рациональные.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Expression {
	Number(BigRational),
	Constant(Constant),
	/// Свободная переменная или параметр: `x`, `t`, `x_1`, `\alpha`.
	Symbol(String),
	Sum(Vec<Expression>),
	Product(Vec<Expression>),
	Power(Box<Expression>, Box<Expression>),
	Function(Function, Box<Expression>),
	Integral(Box<Integral>),
}

/// Интеграл, который ещё не удалось (или не пытались) вычислить.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Integral {
	pub integrand: Expression,
	/// Переменная интегрирования. В определённом интеграле она связана и не считается свободной.
	pub var: String,
	/// Пределы интегрирования, `None` у неопределённого интеграла.
	pub bounds: Option<(Expression, Expression)>,
}

impl Expression {
	pub fn integer(value: i64) -> Self {
		Expression::Number(BigRational::from_integer(BigInt::from(value)))
	}

	/// Знаменатель обязан быть ненулевым, функция используется только с литералами.
	pub fn rational(numer: i64, denom: i64) -> Self {
		Expression::Number(BigRational::new(BigInt::from(numer), BigInt::from(denom)))
	}

	pub fn zero() -> Self {
		Expression::Number(BigRational::zero())
	}

	pub fn one() -> Self {
		Expression::Number(BigRational::one())
	}

	pub fn symbol(name: impl Into<String>) -> Self {
		Expression::Symbol(name.into())
	}

	pub fn function(function: Function, arg: Expression) -> Self {
		Expression::Function(function, Box::new(arg))
	}

	pub fn pow(self, exponent: Expression) -> Self {
		Expression::Power(Box::new(self), Box::new(exponent))
	}

	pub fn sqrt(self) -> Self {
		self.pow(Expression::rational(1, 2))
	}

	pub fn integral(integrand: Expression, var: impl Into<String>, bounds: Option<(Expression, Expression)>) -> Self {
		Expression::Integral(Box::new(Integral {
			integrand,
			var: var.into(),
			bounds,
		}))
	}

	pub fn as_number(&self) -> Option<&BigRational> {
		match self {
			Expression::Number(number) => Some(number),
			_ => None,
		}
	}

	pub fn is_zero(&self) -> bool {
		matches!(self, Expression::Number(number) if number.is_zero())
	}

	pub fn is_one(&self) -> bool {
		matches!(self, Expression::Number(number) if number.is_one())
	}

	pub fn is_infinite(&self) -> bool {
		matches!(self, Expression::Constant(Constant::Infinity) | Expression::Constant(Constant::NegInfinity))
	}

	/// Число с отрицательным знаком или произведение с отрицательным числовым коэффициентом.
	pub fn is_negative(&self) -> bool {
		match self {
			Expression::Number(number) => number.is_negative(),
			Expression::Constant(Constant::NegInfinity) => true,
			Expression::Product(factors) => matches!(factors.first(), Some(Expression::Number(number)) if number.is_negative()),
			_ => false,
		}
	}

	/// Зависит ли выражение от переменной. Переменная интегрирования внутри определённого интеграла связана.
	pub fn depends_on(&self, var: &str) -> bool {
		use Expression::*;

		match self {
			Number(_) | Constant(_) => false,
			Symbol(name) => name == var,
			Sum(items) | Product(items) => items.iter().any(|item| item.depends_on(var)),
			Power(base, exponent) => base.depends_on(var) || exponent.depends_on(var),
			Function(_, arg) => arg.depends_on(var),
			Integral(integral) => match &integral.bounds {
				Some((lower, upper)) => {
					lower.depends_on(var)
						|| upper.depends_on(var)
						|| (integral.var != var && integral.integrand.depends_on(var))
				},
				// неопределённый интеграл есть функция своей переменной
				None => integral.integrand.depends_on(var),
			},
		}
	}

	pub fn free_symbols(&self) -> BTreeSet<String> {
		let mut result = BTreeSet::new();
		self.collect_symbols(&mut result);
		result
	}

	fn collect_symbols(&self, result: &mut BTreeSet<String>) {
		use Expression::*;

		match self {
			Number(_) | Constant(_) => {},
			Symbol(name) => {
				result.insert(name.clone());
			},
			Sum(items) | Product(items) => items.iter().for_each(|item| item.collect_symbols(result)),
			Power(base, exponent) => {
				base.collect_symbols(result);
				exponent.collect_symbols(result);
			},
			Function(_, arg) => arg.collect_symbols(result),
			Integral(integral) => {
				let mut inner = integral.integrand.free_symbols();
				if let Some((lower, upper)) = &integral.bounds {
					inner.remove(&integral.var);
					lower.collect_symbols(result);
					upper.collect_symbols(result);
				}
				result.extend(inner);
			},
		}
	}

	/// Не содержит свободных переменных.
	pub fn is_closed(&self) -> bool {
		self.free_symbols().is_empty()
	}

	pub fn contains_integral(&self) -> bool {
		use Expression::*;

		match self {
			Number(_) | Constant(_) | Symbol(_) => false,
			Sum(items) | Product(items) => items.iter().any(Expression::contains_integral),
			Power(base, exponent) => base.contains_integral() || exponent.contains_integral(),
			Function(_, arg) => arg.contains_integral(),
			Integral(_) => true,
		}
	}

	/// Подставляет `value` вместо свободных вхождений `var`. Результат не упрощается.
	pub fn substitute(&self, var: &str, value: &Expression) -> Expression {
		use Expression::*;

		match self {
			Symbol(name) if name == var => value.clone(),
			Number(_) | Constant(_) | Symbol(_) => self.clone(),
			Sum(items) => Sum(items.iter().map(|item| item.substitute(var, value)).collect()),
			Product(items) => Product(items.iter().map(|item| item.substitute(var, value)).collect()),
			Power(base, exponent) => base.substitute(var, value).pow(exponent.substitute(var, value)),
			Function(function, arg) => Expression::function(*function, arg.substitute(var, value)),
			Integral(integral) => {
				let integrand = if integral.var == var {
					integral.integrand.clone()
				} else {
					integral.integrand.substitute(var, value)
				};
				let bounds = integral.bounds.as_ref().map(|(lower, upper)| {
					(lower.substitute(var, value), upper.substitute(var, value))
				});
				Expression::integral(integrand, integral.var.clone(), bounds)
			},
		}
	}
}

impl From<BigRational> for Expression {
	fn from(number: BigRational) -> Self {
		Expression::Number(number)
	}
}

impl Add for Expression {
	type Output = Expression;

	fn add(self, rhs: Expression) -> Expression {
		Expression::Sum(vec![self, rhs])
	}
}

impl Sub for Expression {
	type Output = Expression;

	fn sub(self, rhs: Expression) -> Expression {
		Expression::Sum(vec![self, -rhs])
	}
}

impl Mul for Expression {
	type Output = Expression;

	fn mul(self, rhs: Expression) -> Expression {
		Expression::Product(vec![self, rhs])
	}
}

impl Div for Expression {
	type Output = Expression;

	fn div(self, rhs: Expression) -> Expression {
		Expression::Product(vec![self, rhs.pow(Expression::integer(-1))])
	}
}

impl Neg for Expression {
	type Output = Expression;

	fn neg(self) -> Expression {
		Expression::Product(vec![Expression::integer(-1), self])
	}
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
enum Precedence {
	Sum,
	Product,
	Power,
	Atom,
}

impl Expression {
	fn precedence(&self) -> Precedence {
		use Expression::*;

		match self {
			Sum(_) => Precedence::Sum,
			Product(_) => Precedence::Product,
			Number(number) if !number.is_integer() || number.is_negative() => Precedence::Product,
			Constant(self::Constant::NegInfinity) => Precedence::Product,
			Power(..) => Precedence::Power,
			_ => Precedence::Atom,
		}
	}

	/// Отделяет знак: `-2x` превращается в `(true, 2x)`.
	fn split_sign(&self) -> (bool, Expression) {
		use Expression::*;

		match self {
			Number(number) if number.is_negative() => (true, Number(-number.clone())),
			Product(factors) => match factors.split_first() {
				Some((Number(number), rest)) if number.is_negative() => {
					let magnitude = -number.clone();
					let mut factors = Vec::with_capacity(factors.len());
					if !magnitude.is_one() {
						factors.push(Number(magnitude));
					}
					factors.extend(rest.iter().cloned());
					let magnitude = match factors.len() {
						0 => Expression::one(),
						1 => factors.remove(0),
						_ => Product(factors),
					};
					(true, magnitude)
				},
				_ => (false, self.clone()),
			},
			_ => (false, self.clone()),
		}
	}

	fn fmt_with(&self, f: &mut fmt::Formatter<'_>, parent: Precedence) -> fmt::Result {
		if self.precedence() < parent {
			write!(f, "(")?;
			self.fmt_bare(f)?;
			write!(f, ")")
		} else {
			self.fmt_bare(f)
		}
	}

	fn fmt_bare(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		use Expression::*;

		match self {
			Number(number) => {
				if number.is_integer() {
					write!(f, "{}", number.numer())
				} else {
					write!(f, "{}/{}", number.numer(), number.denom())
				}
			},
			Constant(constant) => f.write_str(match constant {
				self::Constant::E => "e",
				self::Constant::Pi => "π",
				self::Constant::Infinity => "∞",
				self::Constant::NegInfinity => "-∞",
			}),
			Symbol(name) => {
				if name.chars().count() > 1 && !name.contains('_') {
					write!(f, "\\{}", name)
				} else {
					f.write_str(name)
				}
			},
			Sum(terms) => {
				for (index, term) in terms.iter().enumerate() {
					let (negative, magnitude) = term.split_sign();
					match (index, negative) {
						(0, true) => write!(f, "-")?,
						(0, false) => {},
						(_, true) => write!(f, " - ")?,
						(_, false) => write!(f, " + ")?,
					}
					magnitude.fmt_with(f, Precedence::Product)?;
				}
				Ok(())
			},
			Product(factors) => fmt_product(factors, f),
			Power(base, exponent) => {
				if exponent.as_number().map_or(false, |number| *number == BigRational::new(1.into(), 2.into())) {
					write!(f, "sqrt(")?;
					base.fmt_bare(f)?;
					return write!(f, ")");
				}
				base.fmt_with(f, Precedence::Atom)?;
				write!(f, "^")?;
				exponent.fmt_with(f, Precedence::Atom)
			},
			Function(function, arg) => {
				write!(f, "{}(", function.name())?;
				arg.fmt_bare(f)?;
				write!(f, ")")
			},
			Integral(integral) => match &integral.bounds {
				Some((lower, upper)) => write!(f, "integrate({}, ({}, {}, {}))", integral.integrand, integral.var, lower, upper),
				None => write!(f, "integrate({}, {})", integral.integrand, integral.var),
			},
		}
	}
}

fn fmt_product(factors: &[Expression], f: &mut fmt::Formatter<'_>) -> fmt::Result {
	let mut coefficient = BigRational::one();
	let mut numerator = Vec::new();
	let mut denominator = Vec::new();
	for factor in factors {
		match factor {
			Expression::Number(number) => coefficient *= number,
			Expression::Power(base, exponent) if exponent.is_negative() => {
				if let Expression::Number(number) = exponent.as_ref() {
					let positive = -number.clone();
					if positive.is_one() {
						denominator.push(base.as_ref().clone());
					} else {
						denominator.push(base.as_ref().clone().pow(Expression::Number(positive)));
					}
				} else {
					numerator.push(factor.clone());
				}
			},
			other => numerator.push(other.clone()),
		}
	}

	if coefficient.is_negative() {
		write!(f, "-")?;
		coefficient = -coefficient;
	}
	if !coefficient.numer().is_one() || numerator.is_empty() {
		numerator.insert(0, Expression::Number(BigRational::from_integer(coefficient.numer().clone())));
	}
	if !coefficient.denom().is_one() {
		denominator.insert(0, Expression::Number(BigRational::from_integer(coefficient.denom().clone())));
	}

	for (index, factor) in numerator.iter().enumerate() {
		if index > 0 {
			write!(f, "*")?;
		}
		factor.fmt_with(f, Precedence::Product)?;
	}
	match denominator.len() {
		0 => Ok(()),
		1 => {
			write!(f, "/")?;
			denominator[0].fmt_with(f, Precedence::Power)
		},
		_ => {
			write!(f, "/(")?;
			for (index, factor) in denominator.iter().enumerate() {
				if index > 0 {
					write!(f, "*")?;
				}
				factor.fmt_with(f, Precedence::Product)?;
			}
			write!(f, ")")
		},
	}
}

impl fmt::Display for Expression {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.fmt_bare(f)
	}
}

impl Serialize for Expression {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.collect_str(self)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn x() -> Expression {
		Expression::symbol("x")
	}

	#[test]
	fn integral_binds_its_variable() {
		let integral = Expression::integral(x() * Expression::symbol("t"), "t", Some((Expression::zero(), x())));
		assert!(integral.depends_on("x"));
		assert!(!integral.depends_on("t"));
		assert_eq!(integral.free_symbols().into_iter().collect::<Vec<_>>(), vec!["x".to_string()]);

		let substituted = integral.substitute("t", &Expression::integer(5));
		assert_eq!(substituted, integral);
	}

	#[test]
	fn display() {
		let expr = Expression::Sum(vec![
			Expression::integer(1),
			Expression::Product(vec![Expression::integer(-2), x()]),
			x().pow(Expression::integer(2)),
		]);
		assert_eq!(expr.to_string(), "1 - 2*x + x^2");

		let fraction = Expression::Product(vec![
			Expression::rational(2, 3),
			x(),
			Expression::Sum(vec![x(), Expression::one()]).pow(Expression::integer(-1)),
		]);
		assert_eq!(fraction.to_string(), "2*x/(3*(x + 1))");

		assert_eq!(Expression::function(Function::Ln, x().sqrt()).to_string(), "ln(sqrt(x))");
		assert_eq!(Expression::symbol("varphi").to_string(), "\\varphi");
	}
}
