use std::collections::BTreeMap;

use chrono::{TimeZone, Utc};
use mathcheck::{
	verify_request, verify_sequence, Category, CheckPolicy, CheckRequest, ErrorKind, Expression, RequestError,
	SolutionStatus, TaskView, Verification,
};

fn limits_task(limit_var: &str, expected_value: &str) -> TaskView {
	TaskView {
		title: "lim".to_string(),
		expression: "(2*x**2 + 3*x)/(5*x**2 - 1)".to_string(),
		limit_var: Some(limit_var.to_string()),
		expected_value: expected_value.to_string(),
		category: Category::Limits,
		..TaskView::default()
	}
}

fn task(category: Category, expression: &str, expected_value: &str) -> TaskView {
	TaskView {
		expression: expression.to_string(),
		expected_value: expected_value.to_string(),
		category,
		..TaskView::default()
	}
}

macro_rules! verify {
	($task:expr, [$($step:expr),* $(,)?]) => {
		verify!($task, [$($step),*], None)
	};
	($task:expr, [$($step:expr),* $(,)?], $boundary:expr) => {
		verify_sequence(&$task, &[$($step.to_string()),*], $boundary, &CheckPolicy::default()).unwrap()
	};
}

fn error_steps(verification: &Verification) -> Vec<(usize, ErrorKind)> {
	verification.errors.iter().map(|error| (error.step, error.kind)).collect()
}

#[test]
fn limits_completed() {
	let verification = verify!(
		limits_task("x→oo", "2/5"),
		["\\frac{2x^2+3x}{5x^2-1}", "\\frac{2 + \\frac{3}{x}}{5 - \\frac{1}{x^2}}", "LIMIT", "\\frac{2}{5}"]
	);
	assert!(verification.errors.is_empty());
	assert_eq!(verification.status, SolutionStatus::Completed);
	assert_eq!(verification.marker, Some(2));
	assert!(!verification.boundary_inferred);
	assert_eq!(verification.computed_target, Some(Expression::rational(2, 5)));
	assert!(verification.message().starts_with("Решение верное. Предел ="));
}

#[test]
fn algebraic_error_is_keyed_by_later_step() {
	let verification = verify!(
		limits_task("x→oo", ""),
		["\\frac{2x^2+3x}{5x^2-1}", "\\frac{2 + 3x}{5 - \\frac{1}{x^2}}", "LIMIT", "\\frac{2}{5}"]
	);
	assert_eq!(error_steps(&verification), vec![(2, ErrorKind::AlgebraicError)]);
	assert_eq!(verification.errors[0].error, "Некорректное преобразование");
	assert_eq!(verification.status, SolutionStatus::Error);
	assert_eq!(verification.computed_target, None);
}

#[test]
fn positive_axis_at_infinity() {
	let verification = verify!(
		limits_task("x→oo", ""),
		["\\frac{\\sqrt{x^2 + 1}}{x}", "\\sqrt{1 + \\frac{1}{x^2}}", "LIMIT", "1"]
	);
	assert!(verification.errors.iter().all(|error| error.step != 2));

	let verification = verify!(limits_task("x→0", ""), ["\\sqrt{x^2}", "x", "LIMIT", "0"]);
	assert_eq!(error_steps(&verification), vec![(2, ErrorKind::AlgebraicError)]);
}

#[test]
fn every_pair_is_checked() {
	let verification = verify!(limits_task("x→oo", ""), ["x", "2x", "2x", "3x", "LIMIT", "oo"]);
	assert_eq!(
		error_steps(&verification),
		vec![(2, ErrorKind::AlgebraicError), (4, ErrorKind::AlgebraicError)]
	);
}

#[test]
fn wrong_final_answer() {
	let verification = verify!(limits_task("x→oo", ""), ["\\frac{x+1}{x}", "1 + \\frac{1}{x}", "LIMIT", "2"]);
	assert_eq!(error_steps(&verification), vec![(4, ErrorKind::LimitError)]);
	assert_eq!(verification.errors[0].error, "Некорректный окончательный ответ");
	assert!(verification.errors[0].hint.starts_with("Итоговое выражение должно равняться"));

	let verification = verify!(limits_task("x→oo", ""), ["\\frac{x+1}{x}", "LIMIT", "\\frac{1}{"]);
	assert_eq!(error_steps(&verification), vec![(3, ErrorKind::LimitParseError)]);
	assert_eq!(verification.errors[0].error, "Ошибка в анализе окончательного ответа");
}

#[test]
fn infinite_final_answer() {
	let verification = verify!(limits_task("x→oo", "oo"), ["x^2 + x", "x(x + 1)", "LIMIT", "\\infty"]);
	assert_eq!(verification.status, SolutionStatus::Completed);
}

#[test]
fn limit_stage_failures() {
	let verification = verify!(limits_task("x→oo", ""), ["\\sin x", "\\sin(x)", "LIMIT", "0"]);
	assert_eq!(error_steps(&verification), vec![(3, ErrorKind::LimitError)]);
	assert_eq!(verification.errors[0].error, "Ошибка при вычислении предела");

	let verification = verify!(limits_task("x→oo", "1"), ["\\frac{1}{x}", "LIMIT", "0"]);
	assert_eq!(error_steps(&verification), vec![(2, ErrorKind::LimitError)]);
	assert_eq!(verification.errors[0].hint, "Ожидаемый предел: 1");
}

#[test]
fn limit_point_from_task() {
	let verification = verify!(limits_task("x→0", ""), ["\\frac{\\sin x}{x}", "LIMIT", "1"]);
	assert_eq!(verification.status, SolutionStatus::Completed);

	let verification = verify!(limits_task("-", ""), ["\\frac{1}{x}", "LIMIT", "0"]);
	assert_eq!(verification.status, SolutionStatus::Completed);
}

#[test]
fn inferred_boundary() {
	let verification = verify!(limits_task("x→oo", ""), ["\\frac{1}{x}", "0"]);
	assert!(verification.boundary_inferred);
	assert_eq!(verification.marker, Some(1));
	assert_eq!(verification.steps, vec!["\\frac{1}{x}", "LIMIT", "0"]);
	assert_eq!(verification.status, SolutionStatus::Completed);

	let no_inference = CheckPolicy {
		infer_limit_marker: false,
		..CheckPolicy::default()
	};
	let steps = ["\\frac{1}{x}".to_string(), "\\frac{2}{2x}".to_string()];
	let verification = verify_sequence(&limits_task("x→oo", ""), &steps, None, &no_inference).unwrap();
	assert_eq!(verification.marker, None);
	assert_eq!(verification.computed_target, None);
	assert_eq!(verification.status, SolutionStatus::Completed);
}

#[test]
fn explicit_boundary() {
	let verification = verify!(
		limits_task("x→oo", ""),
		["\\frac{x+1}{x}", "1 + \\frac{1}{x}", "1"],
		Some(2)
	);
	assert!(!verification.boundary_inferred);
	assert_eq!(verification.steps, vec!["\\frac{x+1}{x}", "1 + \\frac{1}{x}", "LIMIT", "1"]);
	assert_eq!(verification.status, SolutionStatus::Completed);

	let steps = ["x".to_string(), "x".to_string()];
	assert_eq!(
		verify_sequence(&limits_task("x→oo", ""), &steps, Some(5), &CheckPolicy::default()),
		Err(RequestError::BoundaryOutOfRange { boundary: 5, len: 2 })
	);
	assert_eq!(
		verify_sequence(&limits_task("x→oo", ""), &steps, Some(0), &CheckPolicy::default()),
		Err(RequestError::NoAlgebraicSteps)
	);
}

#[test]
fn limit_notation_chain() {
	let verification = verify!(
		limits_task("x→oo", ""),
		["\\lim_{x \\to \\infty} \\frac{x+1}{x}", "\\lim_{x \\to \\infty} \\left(1 + \\frac{1}{x}\\right)", "1"]
	);
	assert_eq!(verification.marker, None);
	assert_eq!(verification.status, SolutionStatus::Completed);

	let verification = verify!(
		limits_task("x→oo", ""),
		["\\lim_{x \\to \\infty} \\frac{x+1}{x}", "\\lim_{x \\to \\infty} \\left(1 + \\frac{1}{x}\\right)", "2"]
	);
	assert_eq!(error_steps(&verification), vec![(3, ErrorKind::AlgebraicError)]);
}

#[test]
fn idempotent() {
	let task = limits_task("x→oo", "");
	let steps = ["\\frac{x+1}{x}".to_string(), "1 + x".to_string(), "1".to_string()];
	let policy = CheckPolicy::default();
	let first = verify_sequence(&task, &steps, None, &policy).unwrap();
	let second = verify_sequence(&task, &steps, None, &policy).unwrap();
	assert_eq!(first, second);
}

#[test]
fn too_few_steps() {
	let steps = ["x".to_string()];
	assert_eq!(
		verify_sequence(&limits_task("x→oo", ""), &steps, None, &CheckPolicy::default()),
		Err(RequestError::TooFewSteps(1))
	);
}

#[test]
fn integral_tasks() {
	let indefinite = task(Category::Integral, "\\int 2x dx", "");
	let verification = verify!(indefinite, ["\\int 2x dx", "x^2 + C"]);
	assert_eq!(verification.status, SolutionStatus::Completed);

	let verification = verify!(indefinite, ["\\int 2x dx", "x^3"]);
	assert_eq!(error_steps(&verification), vec![(2, ErrorKind::AlgebraicError)]);

	let definite = task(Category::Integral, "\\int_{0}^{1} x^2 dx", "0.333333333333333");
	let verification = verify!(definite, ["\\int_{0}^{1} x^2 dx", "\\frac{1}{3}"]);
	assert_eq!(verification.status, SolutionStatus::Completed);

	let verification = verify!(definite, ["\\int_{0}^{1} x^2 dx", "\\frac{1}{2}"]);
	assert_eq!(error_steps(&verification), vec![(2, ErrorKind::AlgebraicError)]);
}

#[test]
fn volterra_tasks() {
	let equation = task(
		Category::IntegralVolterra2,
		"x - integrate((x-t)*varphi(t), (t,0,x))",
		"",
	);
	let verification = verify!(
		equation,
		[
			"\\varphi(x) = x - \\int_{0}^{x} (x-t)\\varphi(t) dt",
			"\\varphi'' + \\varphi = 0",
			"\\varphi(x) = \\sin x",
		]
	);
	assert_eq!(verification.status, SolutionStatus::Completed);

	let verification = verify!(equation, ["\\varphi'' + \\varphi = 0", "\\varphi(x) = \\cos x"]);
	assert_eq!(error_steps(&verification), vec![(2, ErrorKind::IntegralError)]);
	assert!(verification.errors[0].hint.starts_with("φ(0) = 1"));
}

#[test]
fn algebra_tasks() {
	let equation = task(Category::Algebra, "x**2 - 5*x + 6", "[2, 3]");
	let verification = verify!(equation, ["x^2 - 5x + 6 = 0", "(x - 2)(x - 3) = 0", "x_1 = 2, x_2 = 3"]);
	assert_eq!(verification.status, SolutionStatus::Completed);

	let verification = verify!(equation, ["x^2 - 5x + 6 = 0", "(x - 2)(x - 3) = 0", "x = 2"]);
	assert_eq!(error_steps(&verification), vec![(3, ErrorKind::AlgebraicError)]);
	assert_eq!(verification.errors[0].error, "Неверные корни");

	let generated = task(Category::Algebra, "2*x**2 - 3*x + 1", "0");
	let verification = verify!(generated, ["2x^2 - 3x + 1 = 0", "x \\in \\{\\frac{1}{2}; 1\\}"]);
	assert_eq!(verification.status, SolutionStatus::Completed);
}

#[test]
fn request_through_catalog() {
	let mut catalog = BTreeMap::new();
	catalog.insert(1u64, limits_task("x→oo", "0"));
	let policy = CheckPolicy::default();

	let request: CheckRequest = serde_json::from_str(r#"{"taskId": 1, "steps": ["\\frac{1}{x}", "LIMIT", "0"]}"#).unwrap();
	let verification = verify_request(&catalog, &request, &policy).unwrap();
	assert_eq!(verification.status, SolutionStatus::Completed);

	let missing = CheckRequest {
		task_id: None,
		..request.clone()
	};
	assert_eq!(verify_request(&catalog, &missing, &policy), Err(RequestError::MissingTaskId));

	let unknown = CheckRequest {
		task_id: Some(7),
		..request
	};
	assert_eq!(verify_request(&catalog, &unknown, &policy), Err(RequestError::TaskNotFound(7)));
}

#[test]
fn persisted_rows() {
	let verification = verify!(limits_task("x→oo", ""), ["\\frac{x+1}{x}", "1 + x", "LIMIT", "1"]);
	let created_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
	let record = verification.into_record(created_at);

	assert_eq!(record.status, SolutionStatus::Error);
	assert_eq!(record.created_at, created_at);
	let numbers = record.steps.iter().map(|step| step.step_number).collect::<Vec<_>>();
	assert_eq!(numbers, vec![1, 2, 3, 4]);
	assert!(record.steps.iter().all(|step| !step.is_correct));
	assert_eq!(record.steps[1].error_type, Some(ErrorKind::AlgebraicError));
	assert!(!record.steps[1].hint.is_empty());
	assert_eq!(record.steps[0].error_type, None);
	assert_eq!(record.steps[0].hint, "");
	assert_eq!(record.steps[2].input_expr, "LIMIT");
}
