use mathcheck::expr::Constant;
use mathcheck::{normalize, Expression};

macro_rules! same {
	($a:expr, $b:expr) => {
		assert_eq!(normalize($a).unwrap(), normalize($b).unwrap(), "{} != {}", $a, $b);
	};
}

#[test]
fn notation() {
	same!("\\frac{1}{2} x", "x/2");
	same!("2 \\cdot x + x", "3x");
	same!("\\left( x + 1 \\right)^2", "(x+1)^2");
	same!("e^{2x}", "\\exp(2x)");
	same!("0{,}5", "\\frac{1}{2}");
	same!("\\ln x", "log(x)");
	same!("x**2", "x^{2}");
}

#[test]
fn marker_and_limits() {
	assert_eq!(normalize("LIMIT").unwrap(), Expression::zero());
	assert_eq!(normalize("  limit ").unwrap(), Expression::zero());
	assert_eq!(normalize("\\lim_{x \\to \\infty} \\frac{1}{x}").unwrap(), Expression::zero());
	assert_eq!(
		normalize("\\lim_{x \\to 0} \\frac{\\sin x}{x}").unwrap(),
		Expression::one()
	);
	assert_eq!(
		normalize("\\lim_{x \\to \\infty} x^2").unwrap(),
		Expression::Constant(Constant::Infinity)
	);
}

#[test]
fn integrals() {
	assert_eq!(normalize("\\int_{0}^{2} x dx").unwrap(), Expression::integer(2));
	same!("\\int 2x dx", "x^2");
}

#[test]
fn nested_brackets() {
	let nested = format!("{}x + 1{}", "(".repeat(30), ")".repeat(30));
	same!(nested.as_str(), "x + 1");
	same!("{[(((x)))]}^{2}", "x^2");
}

#[test]
fn errors() {
	let err = normalize("x + ").unwrap_err();
	assert_eq!(err.raw, "x + ");
	assert!(normalize("\\lim_{x} x").is_err());
	assert!(normalize("").is_err());
}
