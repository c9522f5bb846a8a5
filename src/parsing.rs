use itertools::Itertools;
use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::pow;

use crate::error::ParseError;
use crate::expr::{Constant, Expression, Function};

/// Замены обозначений, которые выполняются до разбора. Порядок важен: `\rightarrow` должен уйти раньше `\right`.
const NOTATION_SUBSTITUTIONS: &[(&str, &str)] = &[
	("\\rightarrow", "→"),
	("\\left", ""),
	("\\right", ""),
	("\\dfrac", "\\frac"),
	("\\tfrac", "\\frac"),
	("\\cdot", "*"),
	("\\times", "*"),
	("\\ast", "*"),
	("\\ln", "\\log"),
	("\\mathrm{d}", "d"),
	("\\,", " "),
	("\\;", " "),
	("\\:", " "),
	("\\!", ""),
	("\\qquad", " "),
	("\\quad", " "),
	("{,}", "."),
	("\\infinity", "oo"),
	("\\infty", "oo"),
	("∞", "oo"),
	("π", "\\pi"),
	("·", "*"),
	("×", "*"),
	("−", "-"),
];

/// Приводит запись студента к виду, который понимает грамматика: убирает оформление, заменяет синонимы и раскрывает `e^{u}` в `\exp(u)`.
pub fn substitute_notation(raw: &str) -> String {
	let text = NOTATION_SUBSTITUTIONS
		.iter()
		.fold(raw.trim().to_string(), |text, (from, to)| text.replace(from, to));
	replace_exponential_shorthand(&text)
}

fn replace_exponential_shorthand(text: &str) -> String {
	let mut result = String::with_capacity(text.len());
	let mut rest = text;
	while let Some(position) = rest.find("e^{") {
		let (before, after) = rest.split_at(position);
		result.push_str(before);

		// `e` на конце команды вроде `\angle^{2}` не экспонента
		let inside_command = before.trim_end_matches(|c: char| c.is_ascii_alphabetic()).ends_with('\\');
		if inside_command {
			result.push_str("e^{");
			rest = &after[3..];
			continue;
		}

		match take_group(&after[2..], '{', '}') {
			Some((inner, tail)) => {
				result.push_str("\\exp(");
				result.push_str(&replace_exponential_shorthand(inner));
				result.push(')');
				rest = tail;
			},
			None => {
				result.push_str(after);
				rest = "";
			},
		}
	}
	result.push_str(rest);
	result
}

/// Отделяет сбалансированную группу в начале строки. Возвращает содержимое группы без скобок и остаток строки.
pub(crate) fn take_group(text: &str, open: char, close: char) -> Option<(&str, &str)> {
	let mut chars = text.char_indices();
	match chars.next() {
		Some((_, c)) if c == open => {},
		_ => return None,
	}

	let mut depth = 1usize;
	for (index, c) in chars {
		if c == open {
			depth += 1;
		} else if c == close {
			depth -= 1;
			if depth == 0 {
				return Some((&text[open.len_utf8()..index], &text[index + close.len_utf8()..]));
			}
		}
	}
	None
}

fn parse_decimal(text: &str) -> Option<BigRational> {
	let (integer, fraction) = match text.split_once('.') {
		Some((integer, fraction)) => (integer, fraction),
		None => (text, ""),
	};
	let numer: BigInt = format!("{}{}", integer, fraction).parse().ok()?;
	let denom: BigInt = pow(BigInt::from(10), fraction.len());
	Some(BigRational::new(numer, denom))
}

fn logarithm(arg: Expression, base: Expression) -> Expression {
	Expression::function(Function::Ln, arg) / Expression::function(Function::Ln, base)
}

fn applied(function: Function, power: Option<Expression>, arg: Expression) -> Expression {
	let call = Expression::function(function, arg);
	match power {
		Some(power) => call.pow(power),
		None => call,
	}
}

peg::parser!(
	grammar display_notation() for str {
		pub rule statement() -> Expression
			= _ l:sum() r:(_ "=" _ r:sum() { r })? _ {
				match r {
					Some(r) => l - r,
					None => l,
				}
			}

		rule sum() -> Expression
			= first:signed_term() rest:(_ op:$("+" / "-") _ t:signed_term() { (op, t) })* {
				rest.into_iter().fold(first, |acc, (op, t)| if op == "+" { acc + t } else { acc - t })
			}

		rule signed_term() -> Expression
			= "-" _ t:term() { -t }
			/ "+" _ t:term() { t }
			/ term()

		rule term() -> Expression
			= first:factor() rest:(
				_ op:$("*" / "/") _ f:signed_factor() { (op, f) }
				/ _ !differential() f:factor() { ("*", f) }
			)* {
				rest.into_iter().fold(first, |acc, (op, f)| if op == "/" { acc / f } else { acc * f })
			}

		rule signed_factor() -> Expression
			= "-" _ f:factor() { -f }
			/ factor()

		// `dx` в конце интеграла не должен становиться множителем
		rule differential()
			= "d" ['a'..='z' | 'A'..='Z'] !['a'..='z' | 'A'..='Z' | '(' | '_' | '^']

		rule factor() -> Expression
			= base:atom() power:(_ "**" _ e:long_exponent() { e } / _ "^" _ e:exponent() { e })? {
				match power {
					Some(exponent) => base.pow(exponent),
					None => base,
				}
			}

		rule exponent() -> Expression
			= "{" _ e:sum() _ "}" { e }
			/ "(" _ e:sum() _ ")" { e }
			/ "-" _ e:exponent() { -e }
			/ digit()
			/ atom()

		rule long_exponent() -> Expression
			= "-" _ e:atom() { -e }
			/ atom()

		#[cache]
		rule atom() -> Expression
			= "(" _ e:sum() _ ")" { e }
			/ "[" _ e:sum() _ "]" { e }
			/ "{" _ e:sum() _ "}" { e }
			/ "|" _ e:sum() _ "|" { Expression::function(Function::Abs, e) }
			/ fraction()
			/ square_root()
			/ integral()
			/ function_call()
			/ constant()
			/ number()
			/ greek()
			/ symbol()

		rule fraction() -> Expression
			= "\\frac" _ n:group() _ d:group() { n / d }

		rule group() -> Expression
			= "{" _ e:sum() _ "}" { e }
			/ digit()
			/ symbol()

		rule square_root() -> Expression
			= "\\sqrt" _ "[" _ n:sum() _ "]" _ e:group() { e.pow(Expression::one() / n) }
			/ "\\sqrt" _ e:group() { e.sqrt() }
			/ "sqrt" _ "(" _ e:sum() _ ")" { e.sqrt() }

		rule integral() -> Expression
			= "\\int" _ b:bounds()? _ body:sum() _ "d" v:letter() {
				Expression::integral(body, v, b)
			}
			/ "integrate" _ "(" _ body:sum() _ "," _ "(" _ v:letter() _ "," _ a:sum() _ "," _ b:sum() _ ")" _ ")" {
				Expression::integral(body, v, Some((a, b)))
			}
			/ "integrate" _ "(" _ body:sum() _ "," _ v:letter() _ ")" {
				Expression::integral(body, v, None)
			}

		rule bounds() -> (Expression, Expression)
			= "_" _ a:bound() _ "^" _ b:bound() { (a, b) }

		rule bound() -> Expression
			= "{" _ e:sum() _ "}" { e }
			/ "-" _ b:bound() { -b }
			/ digit()
			/ constant()
			/ greek()
			/ symbol()

		rule function_call() -> Expression
			= "\\log_" _ base:bound() _ arg:function_argument() { logarithm(arg, base) }
			/ "\\lg" !letter_char() _ arg:function_argument() { logarithm(arg, Expression::integer(10)) }
			/ f:function_name() _ power:("^" _ p:exponent() { p })? _ arg:function_argument() {
				applied(f, power, arg)
			}

		rule function_name() -> Function
			= "\\"? name:$(
				"arcsin" / "arccos" / "arctan" / "arctg" / "asin" / "acos" / "atan"
				/ "sin" / "cos" / "tan" / "tg" / "cot" / "ctg" / "exp" / "log" / "ln" / "abs"
			) !letter_char() {? Function::from_name(name).ok_or("function") }

		rule function_argument() -> Expression
			= "(" _ e:sum() _ ")" { e }
			/ "{" _ e:sum() _ "}" { e }
			/ n:number() _ f:factor() { n * f }
			/ factor()

		rule constant() -> Expression
			= "\\pi" !letter_char() { Expression::Constant(Constant::Pi) }
			/ "pi" !letter_char() { Expression::Constant(Constant::Pi) }
			/ "oo" { Expression::Constant(Constant::Infinity) }
			/ "E" !letter_char() { Expression::Constant(Constant::E) }
			/ "e" !letter_char() { Expression::Constant(Constant::E) }

		rule number() -> Expression
			= n:$(['0'..='9']+ ("." ['0'..='9']+)?) {?
				parse_decimal(n).map(Expression::Number).ok_or("number")
			}

		rule digit() -> Expression
			= d:$(['0'..='9']) {? d.parse::<i64>().map(Expression::integer).map_err(|_| "digit") }

		rule greek() -> Expression
			= "\\" name:$(
				"alpha" / "beta" / "gamma" / "delta" / "varepsilon" / "epsilon" / "zeta" / "eta"
				/ "vartheta" / "theta" / "kappa" / "lambda" / "mu" / "nu" / "xi" / "rho" / "sigma"
				/ "tau" / "varphi" / "phi" / "Phi" / "chi" / "psi" / "omega"
			) !letter_char() { Expression::symbol(name) }

		rule symbol() -> Expression
			= l:$(letter_char()) s:subscript()? {
				match s {
					Some(s) => Expression::symbol(format!("{}_{}", l, s)),
					None => Expression::symbol(l),
				}
			}

		rule subscript() -> String
			= "_" _ "{" _ s:$(['a'..='z' | 'A'..='Z' | '0'..='9']+) _ "}" { s.to_string() }
			/ "_" s:$(['a'..='z' | '0'..='9']) { s.to_string() }

		rule letter() -> String
			= l:$(letter_char()) { l.to_string() }

		rule letter_char()
			= ['a'..='z' | 'A'..='Z']

		rule _() = quiet!{[' ' | '\n' | '\t' | '\r']*}
	}
);

/// Разбирает выражение в отображаемой записи без вычисления пределов и интегралов.
pub fn parse_expression(raw: &str) -> Result<Expression, ParseError> {
	let input = substitute_notation(raw);
	if input.is_empty() {
		return Err(ParseError::new(raw, "empty expression"));
	}

	display_notation::statement(&input).map_err(|err| {
		let message = format!("expected {}", err.expected.tokens().join(", "));
		ParseError::at(raw, input.clone(), message, err.location.offset)
	})
}

/// Записан ли шаг как уравнение `A = B`.
pub fn is_equation(raw: &str) -> bool {
	raw.contains('=')
}

impl std::str::FromStr for Expression {
	type Err = ParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		parse_expression(s)
	}
}
