use mathcheck::expr::Constant;
use mathcheck::limit::{check_limit_against, parse_limit_value};
use mathcheck::{check_limit, limits_equal, CheckPolicy, ErrorKind, Expression, LimitPoint, StepResult};

fn limit(expr: &str, point: &str) -> StepResult<Expression> {
	let policy = CheckPolicy::default();
	let point = LimitPoint::parse(point, &policy).unwrap();
	check_limit(expr, "x", &point, &policy)
}

macro_rules! limit_is {
	($expr:expr, $point:expr, $value:expr) => {
		let value = limit($expr, $point).unwrap();
		assert!(
			limits_equal(&value, &$value, &CheckPolicy::default()),
			"lim {} = {}, expected {}",
			$expr,
			value,
			$value
		);
	};
}

#[test]
fn reciprocal_at_infinity() {
	let policy = CheckPolicy::default();
	assert_eq!(limit("1/x", "oo"), Ok(Expression::zero()));
	assert!(check_limit_against("1/x", "x", &LimitPoint::PositiveInfinity, "0", &policy).is_ok());

	let failure = check_limit_against("1/x", "x", &LimitPoint::PositiveInfinity, "1", &policy).unwrap_err();
	assert_eq!(failure.kind, ErrorKind::LimitError);
	assert!(failure.hint.contains("Ожидаемый предел"));
}

#[test]
fn classic_limits() {
	limit_is!("\\frac{\\sin x}{x}", "0", Expression::one());
	limit_is!("\\left(1 + \\frac{1}{x}\\right)^x", "\\infty", Expression::Constant(Constant::E));
	limit_is!("\\frac{2x^2 + 3x}{5x^2 - 1}", "oo", Expression::rational(2, 5));
	limit_is!("\\frac{e^{x} - 1}{x}", "0", Expression::one());
	limit_is!("x^{\\frac{1}{x}}", "oo", Expression::one());
	limit_is!("\\arctan x", "-oo", -(Expression::Constant(Constant::Pi) / Expression::integer(2)));
}

#[test]
fn infinite_limits() {
	let infinity = Expression::Constant(Constant::Infinity);
	assert_eq!(limit("x^2", "-oo"), Ok(infinity.clone()));
	assert_eq!(limit("e^{x}", "+\\infty"), Ok(infinity));
	assert_eq!(limit("e^{x}", "-\\infty"), Ok(Expression::zero()));
	assert_eq!(limit("-x^3", "oo"), Ok(Expression::Constant(Constant::NegInfinity)));
}

#[test]
fn failures() {
	let failure = limit("\\sin x", "oo").unwrap_err();
	assert_eq!(failure.kind, ErrorKind::LimitError);
	assert!(failure.hint.starts_with("Ошибка при вычислении предела"));

	let failure = limit("\\frac{1}{", "oo").unwrap_err();
	assert_eq!(failure.kind, ErrorKind::LimitParseError);
}

#[test]
fn limit_values() {
	let policy = CheckPolicy::default();
	let value = |text: &str| parse_limit_value(text, &policy).unwrap();
	assert_eq!(value("∞"), Expression::Constant(Constant::Infinity));
	assert_eq!(value("-\\infty"), Expression::Constant(Constant::NegInfinity));
	assert!(limits_equal(&value("0.4"), &value("\\frac{2}{5}"), &policy));
	assert!(limits_equal(&value("e^{2}"), &value("\\exp(2)"), &policy));
	assert!(!limits_equal(&value("oo"), &value("-oo"), &policy));
	assert!(!limits_equal(&value("1"), &value("oo"), &policy));
}
