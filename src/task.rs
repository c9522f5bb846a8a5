use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::error::ErrorKind;
use crate::limit::LimitPoint;
use crate::normalize::ARROWS;
use crate::policy::CheckPolicy;

/// Тип задачи. От него зависит, как проверяется окончательный ответ.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
	#[default]
	Limits,
	Integral,
	#[serde(rename = "integral_volterra_2")]
	IntegralVolterra2,
	Algebra,
}

/// Задача в том виде, в каком её видит проверка. Во время проверки не меняется.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskView {
	pub title: String,
	pub description: String,
	pub expression: String,
	/// Запись вида `x→oo`.
	#[serde(alias = "limitVar")]
	pub limit_var: Option<String>,
	#[serde(alias = "expectedValue")]
	pub expected_value: String,
	pub category: Category,
}

impl TaskView {
	/// Переменная и точка предела из `limit_var`. Если поле пустое или испорчено, берётся `x → +∞`.
	pub fn limit_target(&self, policy: &CheckPolicy) -> (String, LimitPoint) {
		let fallback = || (policy.variable.clone(), LimitPoint::PositiveInfinity);

		let raw = match self.limit_var.as_deref().map(str::trim) {
			Some(raw) if !raw.is_empty() && raw != "-" => raw,
			_ => return fallback(),
		};
		let split = ARROWS
			.iter()
			.filter_map(|arrow| raw.find(arrow).map(|position| (position, arrow.len())))
			.min_by_key(|(position, _)| *position)
			.map(|(position, len)| (raw[..position].trim(), raw[position + len..].trim()));

		match split {
			Some((var, point)) if !var.is_empty() => match LimitPoint::parse(point, policy) {
				Ok(point) => (var.to_string(), point),
				Err(err) => {
					warn!(limit_var = raw, %err, "bad limit point, using x -> oo");
					fallback()
				},
			},
			_ => {
				warn!(limit_var = raw, "malformed limit variable, using x -> oo");
				fallback()
			},
		}
	}
}

/// Состояние решения. Из `InProgress` можно перейти ровно один раз.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolutionStatus {
	#[default]
	InProgress,
	Completed,
	Error,
}

impl SolutionStatus {
	pub fn as_str(self) -> &'static str {
		use SolutionStatus::*;

		match self {
			InProgress => "in_progress",
			Completed => "completed",
			Error => "error",
		}
	}

	pub fn is_terminal(self) -> bool {
		self != SolutionStatus::InProgress
	}

	/// Завершает решение: `Completed`, если ошибок нет, иначе `Error`.
	pub fn finish(self, success: bool) -> Result<SolutionStatus, TransitionError> {
		if self.is_terminal() {
			return Err(TransitionError { from: self });
		}
		Ok(if success { SolutionStatus::Completed } else { SolutionStatus::Error })
	}
}

impl fmt::Display for SolutionStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
#[error("solution is already {from}")]
pub struct TransitionError {
	pub from: SolutionStatus,
}

/// Строка шага решения для сохранения.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
	/// Начинается с единицы, без пропусков.
	pub step_number: usize,
	pub input_expr: String,
	pub is_correct: bool,
	pub error_type: Option<ErrorKind>,
	pub hint: String,
}

/// Решение вместе со своими шагами.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolutionRecord {
	pub status: SolutionStatus,
	pub created_at: DateTime<Utc>,
	pub steps: Vec<StepRecord>,
}

/// Откуда берутся задачи по идентификатору.
pub trait TaskCatalog {
	fn task(&self, id: u64) -> Option<&TaskView>;
}

impl TaskCatalog for BTreeMap<u64, TaskView> {
	fn task(&self, id: u64) -> Option<&TaskView> {
		self.get(&id)
	}
}

impl TaskCatalog for HashMap<u64, TaskView> {
	fn task(&self, id: u64) -> Option<&TaskView> {
		self.get(&id)
	}
}

/// Запрос на проверку решения.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckRequest {
	#[serde(alias = "taskId")]
	pub task_id: Option<u64>,
	pub steps: Vec<String>,
	/// Индекс маркера `LIMIT` (с нуля), если его указал клиент.
	pub boundary: Option<usize>,
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::expr::Expression;

	#[test]
	fn task_json() {
		let task: TaskView = serde_json::from_str(
			r#"{"expression": "x - integrate((x-t)*varphi(t), (t,0,x))", "limitVar": "-", "category": "integral_volterra_2"}"#,
		)
		.unwrap();
		assert_eq!(task.category, Category::IntegralVolterra2);
		assert_eq!(task.limit_var.as_deref(), Some("-"));
		assert_eq!(task.expected_value, "");
	}

	#[test]
	fn limit_targets() {
		let policy = CheckPolicy::default();
		let target = |limit_var: Option<&str>| {
			let task = TaskView {
				limit_var: limit_var.map(str::to_string),
				..TaskView::default()
			};
			task.limit_target(&policy)
		};
		assert_eq!(target(Some("t→-oo")), ("t".to_string(), LimitPoint::NegativeInfinity));
		assert_eq!(target(Some("x -> 0")), ("x".to_string(), LimitPoint::Finite(Expression::zero())));
		assert_eq!(target(None), ("x".to_string(), LimitPoint::PositiveInfinity));
		assert_eq!(target(Some("garbage")), ("x".to_string(), LimitPoint::PositiveInfinity));
	}

	#[test]
	fn status_transitions() {
		assert_eq!(SolutionStatus::InProgress.finish(true), Ok(SolutionStatus::Completed));
		assert_eq!(SolutionStatus::InProgress.finish(false), Ok(SolutionStatus::Error));
		assert_eq!(
			SolutionStatus::Completed.finish(true),
			Err(TransitionError {
				from: SolutionStatus::Completed
			})
		);
	}
}
