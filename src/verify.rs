use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::equivalence::{check_step_with, Equivalence};
use crate::error::{ErrorKind, StepFailure};
use crate::expr::Expression;
use crate::integral::{check_volterra_final, mentions_unknown_function, IntegralTarget, VolterraConditions};
use crate::limit::{check_limit, limits_equal, parse_limit_value, LimitPoint};
use crate::normalize::{is_limit_marker, LIMIT_MARKER};
use crate::policy::CheckPolicy;
use crate::roots::{check_roots, looks_like_solution_set};
use crate::task::{Category, CheckRequest, SolutionRecord, SolutionStatus, StepRecord, TaskCatalog, TaskView, TransitionError};

/// Ошибка в конкретном шаге решения. `step` считается с единицы в дополненной маркером последовательности.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StepError {
	pub step: usize,
	pub kind: ErrorKind,
	pub error: String,
	pub hint: String,
}

impl StepError {
	fn new(step: usize, error: &str, failure: StepFailure) -> Self {
		StepError {
			step,
			kind: failure.kind,
			error: error.to_string(),
			hint: failure.hint,
		}
	}
}

/// Результат проверки всего решения.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Verification {
	/// Шаги в том виде, в каком они проверялись, вместе с маркером `LIMIT`.
	pub steps: Vec<String>,
	/// Индекс маркера с нуля.
	pub marker: Option<usize>,
	/// Маркер вставлен в середину наугад.
	pub boundary_inferred: bool,
	pub errors: Vec<StepError>,
	/// Вычисленный предел, если до него дошла проверка.
	pub computed_target: Option<Expression>,
	pub status: SolutionStatus,
}

impl Verification {
	pub fn is_correct(&self) -> bool {
		self.errors.is_empty()
	}

	pub fn message(&self) -> String {
		match (&self.computed_target, self.is_correct()) {
			(Some(value), true) => format!("Решение верное. Предел = {}", value),
			(None, true) => "Решение верное".to_string(),
			(_, false) => format!("Найдено ошибок: {}", self.errors.len()),
		}
	}

	/// Строки для сохранения: по одной на каждый элемент проверенной последовательности.
	pub fn into_record(self, created_at: DateTime<Utc>) -> SolutionRecord {
		let is_correct = self.errors.is_empty();
		let errors = self.errors;
		let steps = self
			.steps
			.into_iter()
			.enumerate()
			.map(|(index, input_expr)| {
				let step_number = index + 1;
				let error = errors.iter().find(|error| error.step == step_number);
				StepRecord {
					step_number,
					input_expr,
					is_correct,
					error_type: error.map(|error| error.kind),
					hint: error.map(|error| error.hint.clone()).unwrap_or_default(),
				}
			})
			.collect();
		SolutionRecord {
			status: self.status,
			created_at,
			steps,
		}
	}
}

/// Запрос нельзя проверить. Такие ошибки не сохраняются.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RequestError {
	#[error("request has no task id")]
	MissingTaskId,
	#[error("task {0} not found")]
	TaskNotFound(u64),
	#[error("solution must have at least two steps, got {0}")]
	TooFewSteps(usize),
	#[error("boundary {boundary} is out of range for {len} steps")]
	BoundaryOutOfRange { boundary: usize, len: usize },
	#[error("no algebraic steps before the limit marker")]
	NoAlgebraicSteps,
	#[error(transparent)]
	Transition(#[from] TransitionError),
}

const WRONG_STEP: &str = "Некорректное преобразование";
const UNPARSED_STEP: &str = "Ошибка разбора выражения";

/// Проверяет соседние пары. Номер ошибки это номер второго шага пары с учётом `offset`.
fn check_chain(steps: &[String], offset: usize, mode: Equivalence, policy: &CheckPolicy, errors: &mut Vec<StepError>) {
	for (index, (prev, curr)) in steps.iter().tuple_windows().enumerate() {
		if let Err(failure) = check_step_with(prev, curr, mode, policy) {
			let title = match failure.kind {
				ErrorKind::ParseError => UNPARSED_STEP,
				_ => WRONG_STEP,
			};
			errors.push(StepError::new(offset + index + 2, title, failure));
		}
	}
}

/// Где заканчиваются алгебраические шаги: явный индекс, затем маркер в решении, затем середина (только для пределов
/// без записи `\lim`).
fn resolve_boundary(
	steps: &[String],
	boundary: Option<usize>,
	policy: &CheckPolicy,
) -> Result<(Vec<String>, Option<usize>, bool), RequestError> {
	let mut steps = steps.to_vec();
	if let Some(boundary) = boundary {
		if boundary > steps.len() {
			return Err(RequestError::BoundaryOutOfRange {
				boundary,
				len: steps.len(),
			});
		}
		if !steps.get(boundary).map_or(false, |step| is_limit_marker(step)) {
			steps.insert(boundary, LIMIT_MARKER.to_string());
		}
		return Ok((steps, Some(boundary), false));
	}

	if let Some(marker) = steps.iter().position(|step| is_limit_marker(step)) {
		return Ok((steps, Some(marker), false));
	}

	if policy.infer_limit_marker && !steps.iter().any(|step| step.contains("\\lim")) {
		let middle = steps.len() / 2;
		warn!(middle, "no limit marker in the solution, inserting one in the middle");
		steps.insert(middle, LIMIT_MARKER.to_string());
		return Ok((steps, Some(middle), true));
	}
	Ok((steps, None, false))
}

fn verify_limits(
	task: &TaskView,
	steps: &[String],
	boundary: Option<usize>,
	policy: &CheckPolicy,
) -> Result<Verification, RequestError> {
	let (steps, marker, boundary_inferred) = resolve_boundary(steps, boundary, policy)?;
	let algebraic = &steps[..marker.unwrap_or(steps.len())];
	let last_algebraic = algebraic.last().ok_or(RequestError::NoAlgebraicSteps)?;

	let (var, point) = task.limit_target(policy);
	let chain_policy = match point {
		LimitPoint::PositiveInfinity => policy.positive_samples(),
		_ => policy.clone(),
	};

	let mut errors = Vec::new();
	check_chain(algebraic, 0, Equivalence::Exact, &chain_policy, &mut errors);

	let mut computed_target = None;
	if let Some(marker) = marker.filter(|_| errors.is_empty()) {
		match check_limit(last_algebraic, &var, &point, policy) {
			Ok(value) => {
				debug!(%var, %point, %value, "computed limit");
				check_expected_limit(task, &value, marker, policy, &mut errors);
				if marker + 1 < steps.len() && errors.is_empty() {
					check_final_limit(&steps, &value, policy, &mut errors);
				}
				computed_target = Some(value);
			},
			Err(failure) => errors.push(StepError::new(marker + 1, "Ошибка при вычислении предела", failure)),
		}
	}

	Ok(Verification {
		steps,
		marker,
		boundary_inferred,
		errors,
		computed_target,
		status: SolutionStatus::InProgress,
	})
}

/// Предел из решения сравнивается с ответом, записанным в задаче.
fn check_expected_limit(task: &TaskView, value: &Expression, marker: usize, policy: &CheckPolicy, errors: &mut Vec<StepError>) {
	let declared = task.expected_value.trim();
	if declared.is_empty() {
		return;
	}
	match parse_limit_value(declared, policy) {
		Ok(expected) if limits_equal(value, &expected, policy) => {},
		Ok(_) => errors.push(StepError::new(
			marker + 1,
			"Ошибка при вычислении предела",
			StepFailure::new(ErrorKind::LimitError, format!("Ожидаемый предел: {}", declared)),
		)),
		Err(err) => debug!(%err, "task expected value is not a limit value"),
	}
}

fn check_final_limit(steps: &[String], value: &Expression, policy: &CheckPolicy, errors: &mut Vec<StepError>) {
	let answer = match steps.last() {
		Some(answer) => answer,
		None => return,
	};
	match parse_limit_value(answer, policy) {
		Ok(claimed) if limits_equal(&claimed, value, policy) => {},
		Ok(_) => errors.push(StepError::new(
			steps.len(),
			"Некорректный окончательный ответ",
			StepFailure::new(ErrorKind::LimitError, format!("Итоговое выражение должно равняться {}", value)),
		)),
		Err(err) => errors.push(StepError::new(
			steps.len(),
			"Ошибка в анализе окончательного ответа",
			StepFailure::new(ErrorKind::LimitParseError, format!("Ошибка: {}", err)),
		)),
	}
}

fn verify_integral(task: &TaskView, steps: &[String], policy: &CheckPolicy) -> Verification {
	let mut errors = Vec::new();
	let target = IntegralTarget::from_task(task, policy);
	let mode = match &target {
		Ok(IntegralTarget::Antiderivative { .. }) => Equivalence::UpToConstant,
		_ => Equivalence::Exact,
	};
	check_chain(steps, 0, mode, policy, &mut errors);

	if errors.is_empty() {
		let answer = steps.last().map(String::as_str).unwrap_or_default();
		let outcome = target
			.map_err(|err| StepFailure::new(ErrorKind::ParseError, format!("Ошибка разбора задачи: {}", err)))
			.and_then(|target| target.check(answer, policy));
		if let Err(failure) = outcome {
			errors.push(StepError::new(steps.len(), "Неверный результат интегрирования", failure));
		}
	}

	finished_steps(steps, errors)
}

fn verify_volterra(task: &TaskView, steps: &[String], policy: &CheckPolicy) -> Verification {
	let mut errors = Vec::new();
	for (index, (prev, curr)) in steps.iter().tuple_windows().enumerate() {
		if mentions_unknown_function(prev) || mentions_unknown_function(curr) {
			continue;
		}
		check_chain(&[prev.clone(), curr.clone()], index, Equivalence::Exact, policy, &mut errors);
	}

	if errors.is_empty() {
		let conditions = VolterraConditions::from_task(&task.expression, &policy.variable).unwrap_or_else(|err| {
			warn!(%err, "using the default Volterra equation");
			VolterraConditions::default()
		});
		let answer = steps.last().map(String::as_str).unwrap_or_default();
		if let Err(failure) = check_volterra_final(answer, &conditions, policy) {
			errors.push(StepError::new(steps.len(), "Решение не удовлетворяет уравнению", failure));
		}
	}

	finished_steps(steps, errors)
}

fn verify_algebra(task: &TaskView, steps: &[String], policy: &CheckPolicy) -> Verification {
	let mut errors = Vec::new();
	let answer = steps.last().filter(|answer| looks_like_solution_set(answer, &policy.variable, policy));
	let chain = match answer {
		Some(_) => &steps[..steps.len() - 1],
		None => steps,
	};
	check_chain(chain, 0, Equivalence::Exact, policy, &mut errors);

	if let Some(answer) = answer.filter(|_| errors.is_empty()) {
		if let Err(failure) = check_roots(answer, task, policy) {
			errors.push(StepError::new(steps.len(), "Неверные корни", failure));
		}
	}

	finished_steps(steps, errors)
}

fn finished_steps(steps: &[String], errors: Vec<StepError>) -> Verification {
	Verification {
		steps: steps.to_vec(),
		marker: None,
		boundary_inferred: false,
		errors,
		computed_target: None,
		status: SolutionStatus::InProgress,
	}
}

/// Проверяет решение задачи целиком: алгебраические шаги, переход к пределу и окончательный ответ.
pub fn verify_sequence(
	task: &TaskView,
	steps: &[String],
	boundary: Option<usize>,
	policy: &CheckPolicy,
) -> Result<Verification, RequestError> {
	if steps.len() < 2 {
		return Err(RequestError::TooFewSteps(steps.len()));
	}

	let mut verification = match task.category {
		Category::Limits => verify_limits(task, steps, boundary, policy)?,
		Category::Integral => verify_integral(task, steps, policy),
		Category::IntegralVolterra2 => verify_volterra(task, steps, policy),
		Category::Algebra => verify_algebra(task, steps, policy),
	};
	verification.status = verification.status.finish(verification.errors.is_empty())?;

	info!(
		category = ?task.category,
		steps = verification.steps.len(),
		errors = verification.errors.len(),
		inferred = verification.boundary_inferred,
		status = %verification.status,
		"verified solution"
	);
	Ok(verification)
}

/// Проверка запроса от клиента: задача берётся из каталога.
pub fn verify_request<C: TaskCatalog + ?Sized>(
	catalog: &C,
	request: &CheckRequest,
	policy: &CheckPolicy,
) -> Result<Verification, RequestError> {
	let id = request.task_id.ok_or(RequestError::MissingTaskId)?;
	let task = catalog.task(id).ok_or(RequestError::TaskNotFound(id))?;
	verify_sequence(task, &request.steps, request.boundary, policy)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn strings(steps: &[&str]) -> Vec<String> {
		steps.iter().map(|step| step.to_string()).collect()
	}

	#[test]
	fn boundaries() {
		let policy = CheckPolicy::default();
		let steps = strings(&["a", "b", "c"]);

		let (steps_with_marker, marker, inferred) = resolve_boundary(&steps, None, &policy).unwrap();
		assert_eq!((marker, inferred), (Some(1), true));
		assert_eq!(steps_with_marker, strings(&["a", "LIMIT", "b", "c"]));

		let (_, marker, inferred) = resolve_boundary(&steps, Some(2), &policy).unwrap();
		assert_eq!((marker, inferred), (Some(2), false));

		let marked = strings(&["a", "b", "limit", "c"]);
		let (same, marker, _) = resolve_boundary(&marked, None, &policy).unwrap();
		assert_eq!((same, marker), (marked.clone(), Some(2)));

		assert_eq!(
			resolve_boundary(&steps, Some(4), &policy),
			Err(RequestError::BoundaryOutOfRange { boundary: 4, len: 3 })
		);

		let limits = strings(&["\\lim_{x \\to 0} x", "0"]);
		assert_eq!(resolve_boundary(&limits, None, &policy).unwrap().1, None);
	}

	#[test]
	fn record_rows() {
		let verification = Verification {
			steps: strings(&["x", "LIMIT", "1"]),
			marker: Some(1),
			boundary_inferred: false,
			errors: vec![StepError {
				step: 3,
				kind: ErrorKind::LimitError,
				error: "Некорректный окончательный ответ".to_string(),
				hint: "Итоговое выражение должно равняться oo".to_string(),
			}],
			computed_target: None,
			status: SolutionStatus::Error,
		};
		let record = verification.into_record(Utc::now());
		assert_eq!(record.steps.len(), 3);
		assert!(record.steps.iter().all(|step| !step.is_correct));
		assert_eq!(record.steps[0].error_type, None);
		assert_eq!(record.steps[2].error_type, Some(ErrorKind::LimitError));
		assert_eq!(record.steps[1].step_number, 2);
	}
}
